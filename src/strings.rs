//! Strings with a specific D-Bus format, such as a valid object path,
//! interface name or error name.
//!
//! All of them are thin wrappers around `Cow<str>`, so a compiled-in
//! constant can be borrowed without allocation.

use std::borrow::Cow;
use std::{fmt, ops};

macro_rules! dstring_wrapper {
    ($(#[$comments:meta])* $t: ident, $n: ident) => {

$(#[$comments])*
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct $t<'a>(Cow<'a, str>);

impl<'m> $t<'m> {
    #[cfg(feature = "no-string-validation")]
    fn check_valid(_: &str) -> Result<(), String> { Ok(()) }

    #[cfg(not(feature = "no-string-validation"))]
    fn check_valid(s: &str) -> Result<(), String> {
        validity::$n(s.as_bytes()).map_err(|_| format!("'{}' is not a valid {}", s, stringify!($t)))
    }

    /// Creates a new instance of this struct.
    ///
    /// Note: If the no-string-validation feature is activated, this string
    /// will not be checked for conformance with the D-Bus specification.
    pub fn new<S: Into<Cow<'m, str>>>(s: S) -> Result<$t<'m>, String> {
        let s = s.into();
        $t::check_valid(&s)?;
        Ok($t(s))
    }

    /// Makes sure this string does not contain borrows.
    pub fn into_static(self) -> $t<'static> {
        $t(Cow::Owned(self.0.into_owned()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

/// #Panics
///
/// If given string is not valid.
impl<'m> From<String> for $t<'m> { fn from(s: String) -> $t<'m> { $t::new(s).unwrap() } }

/// #Panics
///
/// If given string is not valid.
impl<'m> From<&'m String> for $t<'m> { fn from(s: &'m String) -> $t<'m> { $t::new(s.as_str()).unwrap() } }

/// #Panics
///
/// If given string is not valid.
impl<'m> From<&'m str> for $t<'m> { fn from(s: &'m str) -> $t<'m> { $t::new(s).unwrap() } }

impl<'inner, 'm> From<&'m $t<'inner>> for $t<'m> {
    fn from(borrow: &'m $t<'inner>) -> $t<'m> { $t(Cow::Borrowed(borrow.as_str())) }
}

impl<'m> From<$t<'m>> for String {
    fn from(s: $t<'m>) -> String { s.0.into_owned() }
}

impl<'m> ops::Deref for $t<'m> {
    type Target = str;
    fn deref(&self) -> &str { &self.0 }
}

impl<'m> AsRef<str> for $t<'m> {
    fn as_ref(&self) -> &str { &self.0 }
}

impl<'m> fmt::Display for $t<'m> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <str as fmt::Display>::fmt(self, f)
    }
}

}}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be a valid
    /// D-Bus signature: zero or more complete types, such as `xx` or `a{sv}`.
    Signature, is_valid_signature_multi
);

impl Signature<'static> {
    /// Makes a D-Bus signature that corresponds to A.
    pub fn make<A: crate::arg::Arg>() -> Signature<'static> { A::signature() }

    /// The empty signature, used for methods without arguments.
    pub fn empty() -> Signature<'static> { Signature(Cow::Borrowed("")) }

    pub(crate) fn from_static(s: &'static str) -> Signature<'static> { Signature(Cow::Borrowed(s)) }

    pub(crate) fn from_string_unchecked(s: String) -> Signature<'static> { Signature(Cow::Owned(s)) }
}

impl<'a> Signature<'a> {
    /// True if this signature consists of exactly one complete type.
    pub fn is_single(&self) -> bool {
        validity::is_valid_signature_single(self.0.as_bytes()).is_ok()
    }
}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be
    /// a valid D-Bus object path.
    Path, is_valid_object_path
);

impl<'a> Default for Path<'a> {
    fn default() -> Path<'a> { Path(Cow::Borrowed("/")) }
}

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be
    /// a valid D-Bus member, i e, a signal, method or property name.
    Member, is_valid_member_name
);

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be
    /// a valid D-Bus interface name.
    Interface, is_valid_interface_name
);

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be
    /// a valid D-Bus bus name.
    BusName, is_valid_bus_name
);

dstring_wrapper!(
    /// A wrapper around a string that is guaranteed to be
    /// a valid D-Bus error name.
    ErrorName, is_valid_error_name
);

#[allow(dead_code)]
mod validity {
    const BASIC_TYPES: &[u8] = b"ybnqiuxtdhsog";
    const MAX_NAME: usize = 255;
    const MAX_DEPTH: u8 = 32;

    fn first_char(b: u8) -> bool { b.is_ascii_alphabetic() || b == b'_' }

    fn name_char(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' }

    fn dotted(s: &[u8], first: fn(u8) -> bool, rest: fn(u8) -> bool) -> Result<(), ()> {
        if s.is_empty() || s.len() > MAX_NAME { return Err(()) }
        let mut elements = 0;
        for elem in s.split(|&b| b == b'.') {
            let (&c, tail) = elem.split_first().ok_or(())?;
            if !first(c) || !tail.iter().all(|&b| rest(b)) { return Err(()) }
            elements += 1;
        }
        if elements > 1 { Ok(()) } else { Err(()) }
    }

    pub fn is_valid_member_name(s: &[u8]) -> Result<(), ()> {
        if s.len() > MAX_NAME { return Err(()) }
        let (&c, tail) = s.split_first().ok_or(())?;
        if first_char(c) && tail.iter().all(|&b| name_char(b)) { Ok(()) } else { Err(()) }
    }

    pub fn is_valid_interface_name(s: &[u8]) -> Result<(), ()> {
        dotted(s, first_char, name_char)
    }

    pub fn is_valid_error_name(s: &[u8]) -> Result<(), ()> { is_valid_interface_name(s) }

    pub fn is_valid_bus_name(s: &[u8]) -> Result<(), ()> {
        fn hyphen_first(b: u8) -> bool { first_char(b) || b == b'-' }
        fn hyphen_rest(b: u8) -> bool { name_char(b) || b == b'-' }
        match s.split_first() {
            Some((&b':', unique)) if s.len() <= MAX_NAME => dotted(unique, hyphen_rest, hyphen_rest),
            _ => dotted(s, hyphen_first, hyphen_rest),
        }
    }

    pub fn is_valid_object_path(s: &[u8]) -> Result<(), ()> {
        match s {
            b"/" => Ok(()),
            [b'/', rest @ ..] => {
                let ok = rest.split(|&b| b == b'/').all(|seg| !seg.is_empty() && seg.iter().all(|&b| name_char(b)));
                if ok { Ok(()) } else { Err(()) }
            }
            _ => Err(()),
        }
    }

    /// Length of the complete type at the start of `s`.
    fn single(s: &[u8], arrs: u8, structs: u8) -> Option<usize> {
        let c = *s.first()?;
        if BASIC_TYPES.contains(&c) || c == b'v' { return Some(1) }
        match c {
            b'a' if arrs < MAX_DEPTH => {
                if s.get(1) == Some(&b'{') {
                    if !BASIC_TYPES.contains(s.get(2)?) { return None }
                    let end = 3 + single(&s[3..], arrs + 1, structs)?;
                    if s.get(end)? == &b'}' { Some(end + 1) } else { None }
                } else {
                    Some(1 + single(&s[1..], arrs + 1, structs)?)
                }
            }
            b'(' if structs < MAX_DEPTH => {
                let end = 1 + multi(&s[1..], arrs, structs + 1)?;
                if end > 1 && s.get(end)? == &b')' { Some(end + 1) } else { None }
            }
            _ => None,
        }
    }

    /// Length of the run of complete types at the start of `s`, stopping at a `)`.
    fn multi(s: &[u8], arrs: u8, structs: u8) -> Option<usize> {
        let mut pos = 0;
        while pos < s.len() && s[pos] != b')' {
            pos += single(&s[pos..], arrs, structs)?;
        }
        Some(pos)
    }

    pub fn is_valid_signature_single(s: &[u8]) -> Result<(), ()> {
        if s.len() > MAX_NAME { return Err(()) }
        match single(s, 0, 0) {
            Some(n) if n == s.len() => Ok(()),
            _ => Err(()),
        }
    }

    pub fn is_valid_signature_multi(s: &[u8]) -> Result<(), ()> {
        if s.len() > MAX_NAME { return Err(()) }
        match multi(s, 0, 0) {
            Some(n) if n == s.len() => Ok(()),
            _ => Err(()),
        }
    }

    #[test]
    fn names() {
        assert!(is_valid_member_name(b"").is_err());
        assert!(is_valid_member_name(b"LastResult").is_ok());
        assert!(is_valid_member_name(b"1Multiply").is_err());
        assert!(is_valid_interface_name(b"net.poettering.Calculator").is_ok());
        assert!(is_valid_interface_name(b"Calculator").is_err());
        assert!(is_valid_interface_name(b"net..Calculator").is_err());
        assert!(is_valid_interface_name(b"net.poettering.").is_err());
        assert!(is_valid_error_name(b"net.poettering.Calculator.Error.DivisionByZero").is_ok());
        assert!(is_valid_bus_name(b":1.54").is_ok());
        assert!(is_valid_bus_name(b"net.poettering-calc").is_ok());
        assert!(is_valid_bus_name(b"1.54").is_err());
    }

    #[test]
    fn object_path() {
        assert!(is_valid_object_path(b"").is_err());
        assert!(is_valid_object_path(b"/").is_ok());
        assert!(is_valid_object_path(b"/calc").is_ok());
        assert!(is_valid_object_path(b"/calc/").is_err());
        assert!(is_valid_object_path(b"/a//b").is_err());
        assert!(is_valid_object_path(b"/net/poettering/Calculator").is_ok());
        assert!(is_valid_object_path(b"/12.43").is_err());
    }

    #[test]
    fn signature() {
        assert!(is_valid_signature_single(b"").is_err());
        assert!(is_valid_signature_single(b"x").is_ok());
        assert!(is_valid_signature_single(b"xx").is_err());
        assert!(is_valid_signature_single(b"a{sv}").is_ok());
        assert!(is_valid_signature_single(b"a{vs}").is_err());
        assert!(is_valid_signature_single(b"()").is_err());
        assert!(is_valid_signature_single(b"(sa{sv}(i))").is_ok());
        assert!(is_valid_signature_single(b"(sa{sv}(i)").is_err());
        assert!(is_valid_signature_multi(b"").is_ok());
        assert!(is_valid_signature_multi(b"sa{sv}as").is_ok());
        assert!(is_valid_signature_multi(b"xx)").is_err());
    }
}

#[test]
fn some_path() {
    let p1: Path = "/calc".into();
    assert_eq!(&*p1, "/calc");
    let p2 = Path::new("##invalid##");
    #[cfg(not(feature = "no-string-validation"))]
    assert_eq!(p2, Err("'##invalid##' is not a valid Path".into()));
    #[cfg(feature = "no-string-validation")]
    assert!(p2.is_ok());
}

#[test]
fn reborrow_member() {
    let m1 = Member::from("Multiply");
    let m2 = Member::from(&m1);
    assert_eq!(m1, m2);
    assert_eq!(m2.into_static().as_str(), "Multiply");
}

#[test]
fn single_or_multi_signature() {
    assert!(Signature::from("x").is_single());
    assert!(!Signature::from("xx").is_single());
    assert!(!Signature::empty().is_single());
}
