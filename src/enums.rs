//! Enumerations that travel on the bus as namespaced strings.

use crate::arg::ArgError;

/// An enumeration with a fixed table of wire strings, one row per enumerator.
///
/// Declare these with `wire_enum!`, which also makes the type usable as a
/// method argument, return value or property (signature `s`).
pub trait WireEnum: Sized + Copy + PartialEq + 'static {
    /// Every enumerator together with its wire string.
    const TABLE: &'static [(&'static str, Self)];

    /// Looks up the enumerator for a wire string. Only an exact match is accepted.
    fn from_wire_str(s: &str) -> Result<Self, ArgError> {
        Self::TABLE.iter()
            .find(|(name, _)| *name == s)
            .map(|&(_, v)| v)
            .ok_or_else(|| ArgError::InvalidEnumValue { value: s.into() })
    }

    /// The wire string of this enumerator.
    fn to_wire_str(self) -> &'static str {
        match Self::TABLE.iter().find(|(_, v)| *v == self) {
            Some(&(name, _)) => name,
            None => unreachable!("enumerator missing from its wire string table"),
        }
    }
}

/// Declares an enumeration and its wire string table.
///
/// ```
/// sdbus_vtable::wire_enum! {
///     pub enum State {
///         Success => "net.poettering.Calculator.State.Success",
///         Error => "net.poettering.Calculator.State.Error",
///     }
/// }
/// use sdbus_vtable::WireEnum;
/// assert_eq!(State::from_wire_str("net.poettering.Calculator.State.Error").unwrap(), State::Error);
/// ```
#[macro_export]
macro_rules! wire_enum {
    ($(#[$m: meta])* $vis: vis enum $name: ident {
        $( $(#[$vm: meta])* $var: ident => $wire: expr, )+
    }) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name { $( $(#[$vm])* $var, )+ }

        impl $crate::WireEnum for $name {
            const TABLE: &'static [(&'static str, Self)] = &[ $( ($wire, $name::$var), )+ ];
        }

        impl $crate::arg::Arg for $name {
            const ARG_TYPE: $crate::arg::ArgType = $crate::arg::ArgType::String;
            fn signature() -> $crate::Signature<'static> { <String as $crate::arg::Arg>::signature() }
        }

        impl $crate::arg::Append for $name {
            fn append_by_ref(&self, ia: &mut $crate::arg::IterAppend) {
                ia.append($crate::WireEnum::to_wire_str(*self))
            }
        }

        impl<'a> $crate::arg::Get<'a> for $name {
            fn get(i: &mut $crate::arg::Iter<'a>) -> Result<Self, $crate::arg::ArgError> {
                let s: &str = i.get()?;
                $crate::WireEnum::from_wire_str(s)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::WireEnum::to_wire_str(*self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::arg::ArgError;
            fn from_str(s: &str) -> Result<Self, Self::Err> { $crate::WireEnum::from_wire_str(s) }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arg::{MessageItem, Arg};

    wire_enum! {
        enum Light {
            Red => "org.example.Light.Red",
            Green => "org.example.Light.Green",
        }
    }

    #[test]
    fn every_enumerator_round_trips() {
        for &(_, v) in Light::TABLE {
            assert_eq!(Light::from_wire_str(v.to_wire_str()), Ok(v));
        }
    }

    #[test]
    fn unknown_strings_never_default() {
        for s in &["", "Red", "org.example.Light.red", "org.example.Light.Red ", "org.example.Light.Blue"] {
            assert_eq!(Light::from_wire_str(s), Err(ArgError::InvalidEnumValue { value: s.to_string() }));
        }
    }

    #[test]
    fn travels_as_string() {
        assert_eq!(&*Light::signature(), "s");
        let item = MessageItem::from_arg(&Light::Green);
        assert_eq!(item, MessageItem::Str("org.example.Light.Green".into()));
        assert_eq!(item.inner::<Light>(), Ok(Light::Green));
        assert!(MessageItem::Str("Green".into()).inner::<Light>().is_err());
        assert_eq!("org.example.Light.Red".parse::<Light>(), Ok(Light::Red));
    }
}
