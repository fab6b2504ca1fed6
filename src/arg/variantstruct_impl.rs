use super::*;
use crate::Signature;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
/// A simple wrapper to specify a D-Bus variant.
///
/// See the argument guide and module level documentation for details and examples.
pub struct Variant<T>(pub T);

impl<T> Arg for Variant<T> {
    const ARG_TYPE: ArgType = ArgType::Variant;
    fn signature() -> Signature<'static> { Signature::from_static("v") }
}

impl<T: Append> Append for Variant<T> {
    fn append_by_ref(&self, ia: &mut IterAppend) {
        ia.push(MessageItem::Variant(Box::new(MessageItem::from_arg(&self.0))))
    }
}

impl<'a, T: Get<'a>> Get<'a> for Variant<T> {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        match i.current() {
            Some(MessageItem::Variant(inner)) => inner.inner().map(Variant),
            _ => Err(i.mismatch(ArgType::Variant)),
        }
    }
}

macro_rules! struct_impl {
    ( $($n: ident $t: ident,)+ ) => {

/// Tuples are represented as D-Bus structs.
impl<$($t: Arg),*> Arg for ($($t,)*) {
    const ARG_TYPE: ArgType = ArgType::Struct;
    fn signature() -> Signature<'static> {
        let mut s = String::from("(");
        $( s.push_str(&$t::signature()); )*
        s.push_str(")");
        Signature::from_string_unchecked(s)
    }
}

impl<$($t: Append),*> Append for ($($t,)*) {
    fn append_by_ref(&self, ia: &mut IterAppend) {
        let ( $($n,)*) = self;
        let items = ia.append_container(|s| { $( s.append_by_ref($n); )* });
        ia.push(MessageItem::Struct(items));
    }
}

impl<'z, $($t: Get<'z>),*> Get<'z> for ($($t,)*) {
    fn get(ii: &mut Iter<'z>) -> Result<Self, ArgError> {
        let items = match ii.current() {
            Some(MessageItem::Struct(items)) => items,
            _ => return Err(ii.mismatch(ArgType::Struct)),
        };
        let mut si = Iter::new(items);
        let r = ($( si.read::<$t>()?, )*);
        si.finish()?;
        Ok(r)
    }
}

}} // macro_rules end

struct_impl!(a A,);
struct_impl!(a A, b B,);
struct_impl!(a A, b B, c C,);
struct_impl!(a A, b B, c C, d D,);
struct_impl!(a A, b B, c C, d D, e E,);
struct_impl!(a A, b B, c C, d D, e E, f F,);
struct_impl!(a A, b B, c C, d D, e E, f F, g G,);
struct_impl!(a A, b B, c C, d D, e E, f F, g G, h H,);

#[test]
fn variant_of_dynamic_item() {
    let item = MessageItem::from_arg(&Variant(MessageItem::Int64(42)));
    assert_eq!(&*item.signature(), "v");
    let Variant(inner): Variant<MessageItem> = item.inner().unwrap();
    assert_eq!(inner, MessageItem::Int64(42));
    assert_eq!(item.inner::<Variant<i64>>(), Ok(Variant(42)));
    assert!(item.inner::<Variant<String>>().is_err());
}

#[test]
fn struct_signature() {
    assert_eq!(&*<(i64, String, Variant<u8>)>::signature(), "(xsv)");
    let item = MessageItem::from_arg(&(5i64, "x"));
    assert_eq!(item.inner::<(i64, String)>(), Ok((5, "x".to_string())));
}
