use super::*;
use crate::{Path, Signature};

// Implementation for basic types.

macro_rules! integer_impl {
    ($t: ident, $item: ident, $s: ident, $f: expr) => {

impl Arg for $t {
    const ARG_TYPE: ArgType = ArgType::$s;
    #[inline]
    fn signature() -> Signature<'static> { Signature::from_static($f) }
}

impl Append for $t {
    fn append_by_ref(&self, ia: &mut IterAppend) { ia.push(MessageItem::$item(*self)) }
}

impl<'a> Get<'a> for $t {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        match i.current() {
            Some(MessageItem::$item(v)) => Ok(*v),
            _ => Err(i.mismatch(ArgType::$s)),
        }
    }
}

}} // End of macro_rules

integer_impl!(u8, Byte, Byte, "y");
integer_impl!(i16, Int16, Int16, "n");
integer_impl!(u16, UInt16, UInt16, "q");
integer_impl!(i32, Int32, Int32, "i");
integer_impl!(u32, UInt32, UInt32, "u");
integer_impl!(i64, Int64, Int64, "x");
integer_impl!(u64, UInt64, UInt64, "t");
integer_impl!(f64, Double, Double, "d");
integer_impl!(bool, Bool, Boolean, "b");

impl Arg for str {
    const ARG_TYPE: ArgType = ArgType::String;
    fn signature() -> Signature<'static> { Signature::from_static("s") }
}

impl Append for str {
    fn append_by_ref(&self, ia: &mut IterAppend) { ia.push(MessageItem::Str(self.into())) }
}

impl<'a> Get<'a> for &'a str {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        match i.current() {
            Some(MessageItem::Str(s)) => Ok(s.as_str()),
            _ => Err(i.mismatch(ArgType::String)),
        }
    }
}

impl Arg for String {
    const ARG_TYPE: ArgType = ArgType::String;
    fn signature() -> Signature<'static> { Signature::from_static("s") }
}

impl Append for String {
    fn append_by_ref(&self, ia: &mut IterAppend) { ia.push(MessageItem::Str(self.clone())) }
    fn append(self, ia: &mut IterAppend) { ia.push(MessageItem::Str(self)) }
}

impl<'a> Get<'a> for String {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> { <&'a str as Get<'a>>::get(i).map(String::from) }
}

impl<'a, T: Arg + ?Sized> Arg for &'a T {
    const ARG_TYPE: ArgType = T::ARG_TYPE;
    fn signature() -> Signature<'static> { T::signature() }
}

impl<'a, T: Append + ?Sized> Append for &'a T {
    fn append_by_ref(&self, ia: &mut IterAppend) { (**self).append_by_ref(ia) }
}

impl<'p> Arg for Path<'p> {
    const ARG_TYPE: ArgType = ArgType::ObjectPath;
    fn signature() -> Signature<'static> { Signature::from_static("o") }
}

impl<'p> Append for Path<'p> {
    fn append_by_ref(&self, ia: &mut IterAppend) { ia.push(MessageItem::ObjectPath(self.clone().into_static())) }
}

impl<'a> Get<'a> for Path<'a> {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        match i.current() {
            Some(MessageItem::ObjectPath(p)) => Ok(Path::from(p)),
            _ => Err(i.mismatch(ArgType::ObjectPath)),
        }
    }
}

impl<'s> Arg for Signature<'s> {
    const ARG_TYPE: ArgType = ArgType::Signature;
    fn signature() -> Signature<'static> { Signature::from_static("g") }
}

impl<'s> Append for Signature<'s> {
    fn append_by_ref(&self, ia: &mut IterAppend) { ia.push(MessageItem::Signature(self.clone().into_static())) }
}

impl<'a> Get<'a> for Signature<'a> {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        match i.current() {
            Some(MessageItem::Signature(s)) => Ok(Signature::from(s)),
            _ => Err(i.mismatch(ArgType::Signature)),
        }
    }
}

#[test]
fn basic_signatures() {
    assert_eq!(&*i64::signature(), "x");
    assert_eq!(&*<&str>::signature(), "s");
    assert_eq!(&*Path::signature(), "o");
    assert_eq!(bool::ARG_TYPE, ArgType::Boolean);
}

#[test]
fn wrong_basic_type() {
    let items = [MessageItem::Int32(3)];
    let mut i = Iter::new(&items);
    assert_eq!(i.get::<i64>(), Err(ArgError::TypeMismatch { position: 0, expected: ArgType::Int64, found: ArgType::Int32 }));
    assert_eq!(i.get::<i32>(), Ok(3));
}
