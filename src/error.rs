//! Errors: the (name, description) pairs that cross the bus, and the local error type.

use crate::arg::ArgError;
use crate::strings::ErrorName;
use crate::Message;
use std::fmt;

/// Error name used when an enumeration string has no matching enumerator.
pub const INVALID_ENUM_STRING: &str = "xyz.openbmc_project.sdbusplus.Error.InvalidEnumString";

const INVALID_ENUM_DESCRIPTION: &str =
    "An enumeration mapping was attempted for which no valid enumeration value exists.";

/// A D-Bus Method Error, containing an error name and a description.
///
/// This is the only thing about a failed method call that reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodErr(ErrorName<'static>, String);

impl MethodErr {
    /// Create an error with a custom name and description.
    pub fn new<N: Into<ErrorName<'static>>, D: Into<String>>(name: N, description: D) -> MethodErr {
        MethodErr(name.into(), description.into())
    }

    /// Create an Invalid Args MethodErr.
    pub fn invalid_arg<T: fmt::Debug + ?Sized>(a: &T) -> MethodErr {
        ("org.freedesktop.DBus.Error.InvalidArgs", format!("Invalid argument {:?}", a)).into()
    }

    /// Create a MethodErr for a message body that could not be read.
    pub fn malformed(e: &ArgError) -> MethodErr {
        ("org.freedesktop.DBus.Error.InvalidArgs", e.to_string()).into()
    }

    /// Create a MethodErr that there are not enough arguments given.
    pub fn no_arg() -> MethodErr {
        ("org.freedesktop.DBus.Error.InvalidArgs", "Not enough arguments").into()
    }

    /// Create a MethodErr that the method failed in the way specified.
    pub fn failed<T: fmt::Display + ?Sized>(a: &T) -> MethodErr {
        ("org.freedesktop.DBus.Error.Failed", a.to_string()).into()
    }

    /// Create a MethodErr that the Object path was unknown.
    pub fn no_path<T: fmt::Display + ?Sized>(a: &T) -> MethodErr {
        ("org.freedesktop.DBus.Error.UnknownObject", format!("Unknown object path {}", a)).into()
    }

    /// Create a MethodErr that the Interface was unknown.
    pub fn no_interface<T: fmt::Display + ?Sized>(a: &T) -> MethodErr {
        ("org.freedesktop.DBus.Error.UnknownInterface", format!("Unknown interface {}", a)).into()
    }

    /// Create a MethodErr that the Method was unknown.
    pub fn no_method<T: fmt::Display + ?Sized>(a: &T) -> MethodErr {
        ("org.freedesktop.DBus.Error.UnknownMethod", format!("Unknown method {}", a)).into()
    }

    /// Create a MethodErr that the Property was unknown.
    pub fn no_property<T: fmt::Display + ?Sized>(a: &T) -> MethodErr {
        ("org.freedesktop.DBus.Error.UnknownProperty", format!("Unknown property {}", a)).into()
    }

    /// Create a MethodErr that the Property was read-only.
    pub fn ro_property<T: fmt::Display + ?Sized>(a: &T) -> MethodErr {
        ("org.freedesktop.DBus.Error.PropertyReadOnly", format!("Property {} is read only", a)).into()
    }

    /// Create a MethodErr for a string that names no enumerator.
    pub fn invalid_enum() -> MethodErr {
        (INVALID_ENUM_STRING, INVALID_ENUM_DESCRIPTION).into()
    }

    /// Error name accessor
    pub fn errorname(&self) -> &ErrorName<'static> { &self.0 }

    /// Description accessor
    pub fn description(&self) -> &str { &self.1 }

    /// Creates an error reply from a method call message.
    pub fn to_message(&self, msg: &Message) -> Message { msg.error(&self.0, &self.1) }
}

impl<T: Into<ErrorName<'static>>, M: Into<String>> From<(T, M)> for MethodErr {
    fn from((t, m): (T, M)) -> MethodErr { MethodErr(t.into(), m.into()) }
}

impl From<ArgError> for MethodErr {
    fn from(e: ArgError) -> MethodErr {
        match e {
            ArgError::InvalidEnumValue { .. } => MethodErr::invalid_enum(),
            e => MethodErr::malformed(&e),
        }
    }
}

impl fmt::Display for MethodErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0, self.1)
    }
}

impl std::error::Error for MethodErr {}

/// A declared error of an interface: a fixed (name, description) pair.
///
/// Use `dbus_errors!` to declare these.
pub trait DbusError: fmt::Debug {
    /// The namespaced error name, e g `net.poettering.Calculator.Error.DivisionByZero`.
    fn name(&self) -> &'static str;
    /// The human readable description sent along with the name.
    fn description(&self) -> &'static str;
}

/// Declares the error table of an interface.
///
/// Each variant gets a fixed error name and description, a `DbusError` implementation,
/// and a conversion into `MethodErr` so handlers can use `?` on it.
///
/// ```
/// sdbus_vtable::dbus_errors! {
///     pub enum CalcError {
///         DivisionByZero => ("net.poettering.Calculator.Error.DivisionByZero",
///             "An attempt to divide by zero was attempted."),
///     }
/// }
/// let e: sdbus_vtable::MethodErr = CalcError::DivisionByZero.into();
/// assert_eq!(e.description(), "An attempt to divide by zero was attempted.");
/// ```
#[macro_export]
macro_rules! dbus_errors {
    ($(#[$m: meta])* $vis: vis enum $name: ident {
        $( $(#[$vm: meta])* $var: ident => ($ename: expr, $edesc: expr), )+
    }) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name { $( $(#[$vm])* $var, )+ }

        impl $crate::DbusError for $name {
            fn name(&self) -> &'static str {
                match self { $( $name::$var => $ename, )+ }
            }
            fn description(&self) -> &'static str {
                match self { $( $name::$var => $edesc, )+ }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}: {}", $crate::DbusError::name(self), $crate::DbusError::description(self))
            }
        }

        impl ::std::error::Error for $name {}

        impl ::std::convert::From<$name> for $crate::MethodErr {
            fn from(e: $name) -> $crate::MethodErr {
                $crate::MethodErr::new($crate::DbusError::name(&e), $crate::DbusError::description(&e))
            }
        }
    }
}

/// Errors that stay inside the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A string was not a valid bus name, path, interface or member.
    #[error("{0}")]
    InvalidName(String),
    /// Something is already registered for this interface at this path.
    #[error("interface {interface} is already registered at {path}")]
    AlreadyRegistered { path: String, interface: String },
    /// A message body did not have the expected arguments.
    #[error(transparent)]
    Arg(#[from] ArgError),
    /// A D-Bus error, either returned by a remote method or produced locally
    /// by the same code path that would have sent it on the bus.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] MethodErr),
    /// The underlying bus connection failed.
    #[error("bus failure in {call}: {message}")]
    Bus { call: &'static str, message: String },
}

impl Error {
    /// The error name, if this error would be sent as a D-Bus error.
    pub fn name(&self) -> Option<&str> {
        match self {
            Error::Dbus(e) => Some(e.errorname().as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    dbus_errors! {
        enum TestError {
            Broken => ("org.example.Error.Broken", "It is broken."),
            Gone => ("org.example.Error.Gone", "It is gone."),
        }
    }

    #[test]
    fn declared_errors() {
        let e: MethodErr = TestError::Gone.into();
        assert_eq!(&**e.errorname(), "org.example.Error.Gone");
        assert_eq!(e.description(), "It is gone.");
        assert_eq!(TestError::Broken.to_string(), "org.example.Error.Broken: It is broken.");
    }

    #[test]
    fn arg_errors_map_to_wire_names() {
        let e: MethodErr = ArgError::MissingArgument { position: 1 }.into();
        assert_eq!(&**e.errorname(), "org.freedesktop.DBus.Error.InvalidArgs");
        let e: MethodErr = ArgError::InvalidEnumValue { value: "Bogus".into() }.into();
        assert_eq!(&**e.errorname(), INVALID_ENUM_STRING);
        assert_eq!(e.description(), INVALID_ENUM_DESCRIPTION);
    }

    #[test]
    fn error_reply() {
        let call = Message::new_method_call("a.b", "/calc", "a.b", "Divide").unwrap();
        let reply = MethodErr::no_method("Divide").to_message(&call);
        assert_eq!(reply.error_name().as_deref(), Some("org.freedesktop.DBus.Error.UnknownMethod"));
        assert_eq!(reply.read1::<&str>(), Ok("Unknown method Divide"));
    }
}
