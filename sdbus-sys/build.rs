extern crate pkg_config;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Keep the version in sync with package.metadata.pkg-config in Cargo.toml.
    if let Err(e) = pkg_config::Config::new().atleast_version("221").probe("libsystemd") {
        eprintln!("pkg_config failed: {}", e);
        eprintln!(
            "One possible solution is to check whether packages\n\
            'libsystemd-dev' and 'pkg-config' are installed:\n\
            On Ubuntu:\n\
            sudo apt install libsystemd-dev pkg-config\n\
            On Fedora:\n\
            sudo dnf install systemd-devel pkgconf-pkg-config\n"
        );
        panic!();
    }
}
