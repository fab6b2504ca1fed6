use super::{Append, ArgType, Get, Iter, IterAppend, ArgError};
use crate::{Path, Signature};

/// A dynamically typed D-Bus value.
///
/// Every message body is a list of these. Use the `Append` and `Get` traits
/// to convert between them and ordinary Rust types.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageItem {
    /// An array of items, all with the element signature `sig`.
    /// The signature is kept so that empty arrays still have a type.
    Array { sig: Signature<'static>, items: Vec<MessageItem> },
    /// A dictionary (array of dict entries).
    Dict { key_sig: Signature<'static>, value_sig: Signature<'static>, items: Vec<(MessageItem, MessageItem)> },
    /// A D-Bus struct.
    Struct(Vec<MessageItem>),
    /// A variant can contain any other type.
    Variant(Box<MessageItem>),
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Double(f64),
    Str(String),
    ObjectPath(Path<'static>),
    Signature(Signature<'static>),
}

impl MessageItem {
    /// Builds the item for a single Rust value.
    pub fn from_arg<T: Append + ?Sized>(t: &T) -> MessageItem {
        let mut v = Vec::with_capacity(1);
        t.append_by_ref(&mut IterAppend::new(&mut v));
        match (v.pop(), v.is_empty()) {
            (Some(item), true) => item,
            _ => unreachable!("an Append implementation must produce exactly one item"),
        }
    }

    /// Converts this item into a Rust value.
    pub fn inner<'a, T: Get<'a>>(&'a self) -> Result<T, ArgError> {
        T::get(&mut Iter::new(std::slice::from_ref(self)))
    }

    /// The type code of this item.
    pub fn arg_type(&self) -> ArgType {
        match self {
            MessageItem::Array { .. } | MessageItem::Dict { .. } => ArgType::Array,
            MessageItem::Struct(_) => ArgType::Struct,
            MessageItem::Variant(_) => ArgType::Variant,
            MessageItem::Bool(_) => ArgType::Boolean,
            MessageItem::Byte(_) => ArgType::Byte,
            MessageItem::Int16(_) => ArgType::Int16,
            MessageItem::Int32(_) => ArgType::Int32,
            MessageItem::Int64(_) => ArgType::Int64,
            MessageItem::UInt16(_) => ArgType::UInt16,
            MessageItem::UInt32(_) => ArgType::UInt32,
            MessageItem::UInt64(_) => ArgType::UInt64,
            MessageItem::Double(_) => ArgType::Double,
            MessageItem::Str(_) => ArgType::String,
            MessageItem::ObjectPath(_) => ArgType::ObjectPath,
            MessageItem::Signature(_) => ArgType::Signature,
        }
    }

    /// The full type signature of this item, e g `a{sv}`.
    pub fn signature(&self) -> Signature<'static> {
        match self {
            MessageItem::Array { sig, .. } => Signature::from_string_unchecked(format!("a{}", sig)),
            MessageItem::Dict { key_sig, value_sig, .. } =>
                Signature::from_string_unchecked(format!("a{{{}{}}}", key_sig, value_sig)),
            MessageItem::Struct(v) => {
                let mut s = String::from("(");
                for item in v { s.push_str(&item.signature()) }
                s.push(')');
                Signature::from_string_unchecked(s)
            }
            _ => Signature::from_string_unchecked((self.arg_type() as u8 as char).to_string()),
        }
    }
}

impl Append for MessageItem {
    fn append_by_ref(&self, ia: &mut IterAppend) { ia.push(self.clone()) }
    fn append(self, ia: &mut IterAppend) { ia.push(self) }
}

impl<'a> Get<'a> for MessageItem {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        i.current().cloned().ok_or_else(|| i.mismatch(ArgType::Variant))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::arg::Variant;
    use std::collections::HashMap;

    #[test]
    fn signatures() {
        assert_eq!(&*MessageItem::Int64(5).signature(), "x");
        assert_eq!(&*MessageItem::from_arg(&vec!("a", "b")).signature(), "as");
        let mut m = HashMap::new();
        m.insert("LastResult".to_string(), Variant(MessageItem::Int64(0)));
        assert_eq!(&*MessageItem::from_arg(&m).signature(), "a{sv}");
        assert_eq!(&*MessageItem::from_arg(&(1i64, "x", true)).signature(), "(xsb)");
    }

    #[test]
    fn empty_array_keeps_type() {
        let v: Vec<i64> = vec!();
        let item = MessageItem::from_arg(&v);
        assert_eq!(&*item.signature(), "ax");
        assert_eq!(item.inner::<Vec<i64>>(), Ok(vec!()));
        assert!(item.inner::<Vec<String>>().is_err());
    }
}
