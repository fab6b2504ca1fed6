//! Types and traits for getting a message's arguments, or appending a message with arguments.
//!
//! A message body is a list of `MessageItem`s. The `Arg`, `Append` and `Get` traits
//! map Rust types onto that list, and encode the D-Bus type system into Rust's type
//! system: the signature of a type is known without looking at a value.
//!
//! **Append / Get a**:
//!
//! `bool, u8, u16, u32, u64, i16, i32, i64, f64` - the corresponding D-Bus basic type
//!
//! `&str`, `String` - a D-Bus string.
//!
//! `Vec<T>` - a D-Bus array.
//!
//! `HashMap<K, V>`, `BTreeMap<K, V>` - a D-Bus dict (array of dict entries).
//!
//! `Variant<T>` - a D-Bus variant. `Variant<MessageItem>` allows you to examine the inner type.
//!
//! `(T1, T2)` - tuples are D-Bus structs. Implemented up to 8.
//!
//! `Path` - a D-Bus object path.
//!
//! `Signature` - a D-Bus signature.
//!
//! Whole argument lists (method parameters, return values, signal payloads) go through
//! `ArgAll`, `ReadAll` and `AppendAll`, which are implemented for tuples of up to 8 elements.

mod basic_impl;
mod array_impl;
mod variantstruct_impl;
mod messageitem;

pub use self::messageitem::MessageItem;
pub use self::variantstruct_impl::Variant;

use crate::Signature;

/// Types that can represent a D-Bus message argument implement this trait.
///
/// Types should also implement either Append or Get to be useful.
pub trait Arg {
    /// The corresponding D-Bus argument type code.
    const ARG_TYPE: ArgType;
    /// The corresponding D-Bus type signature for this type.
    fn signature() -> Signature<'static>;
}

/// Types that can be appended to a message as arguments implement this trait.
pub trait Append {
    /// Performs the append operation by borrowing self.
    fn append_by_ref(&self, ia: &mut IterAppend);

    /// Performs the append operation by consuming self.
    fn append(self, ia: &mut IterAppend) where Self: Sized { self.append_by_ref(ia) }
}

/// Types that can be retrieved from a message as arguments implement this trait.
///
/// `get` looks at the item under the cursor and does not advance it.
pub trait Get<'a>: Sized {
    /// Performs the get operation.
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Type of Argument
///
/// use this to figure out, e g, which type of argument is at the current position of Iter.
#[repr(u8)]
pub enum ArgType {
    /// Dicts are Arrays of dict entries, so Dict types will have Array as ArgType.
    Array = b'a',
    /// Variant
    Variant = b'v',
    /// bool
    Boolean = b'b',
    /// Invalid arg type - this is also the ArgType returned when there are no more arguments available.
    Invalid = 0,
    /// String
    String = b's',
    /// Dict entry; you'll usually not encounter this one as dicts are arrays of dict entries.
    DictEntry = b'e',
    /// u8
    Byte = b'y',
    /// i16
    Int16 = b'n',
    /// u16
    UInt16 = b'q',
    /// i32
    Int32 = b'i',
    /// u32
    UInt32 = b'u',
    /// i64
    Int64 = b'x',
    /// u64
    UInt64 = b't',
    /// f64
    Double = b'd',
    /// D-Bus object path
    ObjectPath = b'o',
    /// D-Bus signature
    Signature = b'g',
    /// Struct
    Struct = b'r',
}

impl ArgType {
    /// Converts a signature character to an ArgType.
    pub fn from_sig_char(c: char) -> Result<ArgType, String> {
        Ok(match c {
            'a' => ArgType::Array,
            'v' => ArgType::Variant,
            'b' => ArgType::Boolean,
            's' => ArgType::String,
            'y' => ArgType::Byte,
            'n' => ArgType::Int16,
            'q' => ArgType::UInt16,
            'i' => ArgType::Int32,
            'u' => ArgType::UInt32,
            'x' => ArgType::Int64,
            't' => ArgType::UInt64,
            'd' => ArgType::Double,
            'o' => ArgType::ObjectPath,
            'g' => ArgType::Signature,
            'r' | '(' => ArgType::Struct,
            'e' | '{' => ArgType::DictEntry,
            _ => return Err(format!("Invalid ArgType {:?}", c)),
        })
    }

    /// Name of this type, for error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ArgType::Array => "array",
            ArgType::Variant => "variant",
            ArgType::Boolean => "boolean",
            ArgType::Invalid => "nothing",
            ArgType::String => "string",
            ArgType::DictEntry => "dict entry",
            ArgType::Byte => "byte",
            ArgType::Int16 => "int16",
            ArgType::UInt16 => "uint16",
            ArgType::Int32 => "int32",
            ArgType::UInt32 => "uint32",
            ArgType::Int64 => "int64",
            ArgType::UInt64 => "uint64",
            ArgType::Double => "double",
            ArgType::ObjectPath => "object path",
            ArgType::Signature => "signature",
            ArgType::Struct => "struct",
        }
    }
}

/// Error reading a message body into Rust types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgError {
    /// The argument at this position has the wrong type.
    #[error("D-Bus argument type mismatch at position {position}: expected {}, found {}", .expected.as_str(), .found.as_str())]
    TypeMismatch { position: u32, expected: ArgType, found: ArgType },
    /// The message ended before all arguments were read.
    #[error("D-Bus argument missing at position {position}")]
    MissingArgument { position: u32 },
    /// The message has more arguments than the receiver expects.
    #[error("Expected {expected} D-Bus arguments, found {found}")]
    TooManyArguments { expected: usize, found: usize },
    /// A string that is not in an enumeration's table.
    #[error("'{value}' is not a valid enumeration value")]
    InvalidEnumValue { value: String },
}

/// Cursor for reading arguments out of a message body (or out of a container inside it).
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    items: &'a [MessageItem],
    pos: usize,
}

impl<'a> Iter<'a> {
    /// Creates a new iterator over a list of items.
    pub fn new(items: &'a [MessageItem]) -> Iter<'a> { Iter { items, pos: 0 } }

    /// The item at the current position, if any.
    pub fn current(&self) -> Option<&'a MessageItem> { self.items.get(self.pos) }

    /// The ArgType at the current position, or `ArgType::Invalid` past the end.
    pub fn arg_type(&self) -> ArgType {
        self.current().map(|m| m.arg_type()).unwrap_or(ArgType::Invalid)
    }

    /// Moves to the next item. Returns false if there are no more items.
    pub fn next(&mut self) -> bool {
        if self.pos < self.items.len() { self.pos += 1 }
        self.pos < self.items.len()
    }

    /// Number of items not yet read.
    pub fn remaining(&self) -> usize { self.items.len() - self.pos }

    /// Gets the current item, without advancing.
    pub fn get<T: Get<'a>>(&mut self) -> Result<T, ArgError> { T::get(self) }

    /// Reads the current item and advances to the next one.
    pub fn read<T: Get<'a>>(&mut self) -> Result<T, ArgError> {
        if self.current().is_none() {
            return Err(ArgError::MissingArgument { position: self.pos as u32 });
        }
        let r = T::get(self)?;
        self.pos += 1;
        Ok(r)
    }

    /// Fails if there are items left.
    pub fn finish(&self) -> Result<(), ArgError> {
        if self.pos == self.items.len() { Ok(()) }
        else { Err(ArgError::TooManyArguments { expected: self.pos, found: self.items.len() }) }
    }

    /// Error for the item at the current position not being `expected`.
    pub fn mismatch(&self, expected: ArgType) -> ArgError {
        ArgError::TypeMismatch { position: self.pos as u32, expected, found: self.arg_type() }
    }
}

/// Helper struct for appending one or more arguments to a message body.
#[derive(Debug)]
pub struct IterAppend<'a>(&'a mut Vec<MessageItem>);

impl<'a> IterAppend<'a> {
    /// Creates a new IterAppend appending to the end of `items`.
    pub fn new(items: &'a mut Vec<MessageItem>) -> IterAppend<'a> { IterAppend(items) }

    /// Appends the argument.
    pub fn append<T: Append>(&mut self, a: T) { a.append(self) }

    /// Appends the argument without consuming it.
    pub fn append_by_ref<T: Append + ?Sized>(&mut self, a: &T) { a.append_by_ref(self) }

    /// Appends an already built item.
    pub fn push(&mut self, item: MessageItem) { self.0.push(item) }

    /// Runs `f` against a fresh list and returns what it appended, for building containers.
    pub fn append_container<F: FnOnce(&mut IterAppend)>(&mut self, f: F) -> Vec<MessageItem> {
        let mut v = vec!();
        f(&mut IterAppend::new(&mut v));
        v
    }
}

/// Types that can be used to describe a whole argument list, e g method
/// parameters or a signal payload.
pub trait ArgAll {
    /// A tuple of &'static str, one for each argument name.
    #[allow(non_camel_case_types)]
    type strs;
    /// Calls `cb` with the name and signature of each argument, in order.
    fn strs_sig<F: FnMut(&'static str, Signature<'static>)>(a: Self::strs, cb: F);

    /// The concatenated signature of all arguments, e g `xx`.
    fn signature_all() -> Signature<'static>;
}

/// Types that can be read as a whole argument list.
pub trait ReadAll: Sized {
    /// Performs the read operation.
    fn read(i: &mut Iter) -> Result<Self, ArgError>;
}

/// Types that can be appended as a whole argument list.
pub trait AppendAll {
    /// Performs the append operation.
    fn append(&self, ia: &mut IterAppend);
}

impl ArgAll for () {
    type strs = ();
    fn strs_sig<F: FnMut(&'static str, Signature<'static>)>(_: Self::strs, _: F) {}
    fn signature_all() -> Signature<'static> { Signature::empty() }
}

impl ReadAll for () {
    fn read(_: &mut Iter) -> Result<Self, ArgError> { Ok(()) }
}

impl AppendAll for () {
    fn append(&self, _: &mut IterAppend) {}
}

macro_rules! str_of { ($t: ident) => { &'static str } }

macro_rules! argall_impl {
    ( $($n: ident $t: ident,)+ ) => {

impl<$($t: Arg),*> ArgAll for ($($t,)*) {
    type strs = ($(str_of!($t),)*);
    fn strs_sig<Q: FnMut(&'static str, Signature<'static>)>(z: Self::strs, mut cb: Q) {
        let ( $($n,)*) = z;
        $( cb($n, $t::signature()); )*
    }
    fn signature_all() -> Signature<'static> {
        let mut s = String::new();
        $( s.push_str(&$t::signature()); )*
        Signature::from_string_unchecked(s)
    }
}

impl<$($t: for<'z> Get<'z>),*> ReadAll for ($($t,)*) {
    fn read(ii: &mut Iter) -> Result<Self, ArgError> {
        Ok(($( ii.read::<$t>()?, )*))
    }
}

impl<$($t: Append),*> AppendAll for ($($t,)*) {
    fn append(&self, ia: &mut IterAppend) {
        let ( $($n,)*) = self;
        $( ia.append_by_ref($n); )*
    }
}

}} // macro_rules end

argall_impl!(a A,);
argall_impl!(a A, b B,);
argall_impl!(a A, b B, c C,);
argall_impl!(a A, b B, c C, d D,);
argall_impl!(a A, b B, c C, d D, e E,);
argall_impl!(a A, b B, c C, d D, e E, f F,);
argall_impl!(a A, b B, c C, d D, e E, f F, g G,);
argall_impl!(a A, b B, c C, d D, e E, f F, g G, h H,);

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn read_write_body() {
        let mut body = vec!();
        {
            let mut ia = IterAppend::new(&mut body);
            ia.append(6i64);
            ia.append("net.poettering.Calculator.State.Success");
            ia.append(vec!(1u8, 2, 3));
            ia.append(Variant(7i64));
        }
        let mut i = Iter::new(&body);
        assert_eq!(i.arg_type(), ArgType::Int64);
        assert_eq!(i.read::<i64>(), Ok(6));
        let s: &str = i.read().unwrap();
        assert_eq!(s, "net.poettering.Calculator.State.Success");
        assert_eq!(i.read::<Vec<u8>>(), Ok(vec!(1, 2, 3)));
        assert_eq!(i.read::<Variant<i64>>(), Ok(Variant(7)));
        assert_eq!(i.read::<i64>(), Err(ArgError::MissingArgument { position: 4 }));
        assert!(i.finish().is_ok());
    }

    #[test]
    fn mismatch_reports_position() {
        let body = vec!(MessageItem::Int64(10), MessageItem::Str("zero".into()));
        let r = <(i64, i64) as ReadAll>::read(&mut Iter::new(&body));
        assert_eq!(r, Err(ArgError::TypeMismatch { position: 1, expected: ArgType::Int64, found: ArgType::String }));
    }

    #[test]
    fn argall_signatures() {
        let mut names = vec!();
        <(i64, i64) as ArgAll>::strs_sig(("x", "y"), |n, s| names.push((n, s.to_string())));
        assert_eq!(names, vec!(("x", "x".to_string()), ("y", "x".to_string())));
        assert_eq!(&*<(String, HashMap<String, Variant<MessageItem>>, Vec<String>)>::signature_all(), "sa{sv}as");
        assert_eq!(&*<()>::signature_all(), "");
    }

    #[test]
    fn too_many() {
        let body = vec!(MessageItem::Int64(1), MessageItem::Int64(2), MessageItem::Int64(3));
        let mut i = Iter::new(&body);
        let _: (i64, i64) = ReadAll::read(&mut i).unwrap();
        assert_eq!(i.finish(), Err(ArgError::TooManyArguments { expected: 2, found: 3 }));
    }
}
