use super::*;
use crate::Signature;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

impl<T: Arg> Arg for Vec<T> {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> { Signature::from_string_unchecked(format!("a{}", T::signature())) }
}

impl<T: Arg + Append> Append for Vec<T> {
    fn append_by_ref(&self, ia: &mut IterAppend) {
        let items = ia.append_container(|s| for x in self { s.append_by_ref(x) });
        ia.push(MessageItem::Array { sig: T::signature(), items });
    }
}

impl<'a, T: Arg + Get<'a>> Get<'a> for Vec<T> {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> {
        let items = match i.current() {
            Some(MessageItem::Array { sig, items }) if *sig == T::signature() => items,
            _ => return Err(i.mismatch(ArgType::Array)),
        };
        let mut si = Iter::new(items);
        let mut v = Vec::with_capacity(items.len());
        while si.remaining() > 0 { v.push(si.read()?) }
        Ok(v)
    }
}

fn dict_signature<K: Arg, V: Arg>() -> Signature<'static> {
    Signature::from_string_unchecked(format!("a{{{}{}}}", K::signature(), V::signature()))
}

fn append_dict<'b, K, V, I>(ia: &mut IterAppend, entries: I)
where K: Arg + Append + 'b, V: Arg + Append + 'b, I: Iterator<Item=(&'b K, &'b V)> {
    let items = entries.map(|(k, v)| (MessageItem::from_arg(k), MessageItem::from_arg(v))).collect();
    ia.push(MessageItem::Dict { key_sig: K::signature(), value_sig: V::signature(), items });
}

fn get_dict<'a, K, V>(i: &Iter<'a>) -> Result<Vec<(K, V)>, ArgError>
where K: Arg + Get<'a>, V: Arg + Get<'a> {
    match i.current() {
        Some(MessageItem::Dict { key_sig, value_sig, items })
            if *key_sig == K::signature() && *value_sig == V::signature() => {
            items.iter().map(|(k, v)| -> Result<(K, V), ArgError> { Ok((k.inner()?, v.inner()?)) }).collect()
        }
        _ => Err(i.mismatch(ArgType::Array)),
    }
}

impl<K: Arg, V: Arg, S> Arg for HashMap<K, V, S> {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> { dict_signature::<K, V>() }
}

impl<K: Arg + Append + Eq + Hash, V: Arg + Append, S> Append for HashMap<K, V, S> {
    fn append_by_ref(&self, ia: &mut IterAppend) { append_dict(ia, self.iter()) }
}

impl<'a, K: Arg + Get<'a> + Eq + Hash, V: Arg + Get<'a>> Get<'a> for HashMap<K, V> {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> { Ok(get_dict(i)?.into_iter().collect()) }
}

impl<K: Arg, V: Arg> Arg for BTreeMap<K, V> {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> { dict_signature::<K, V>() }
}

impl<K: Arg + Append + Ord, V: Arg + Append> Append for BTreeMap<K, V> {
    fn append_by_ref(&self, ia: &mut IterAppend) { append_dict(ia, self.iter()) }
}

impl<'a, K: Arg + Get<'a> + Ord, V: Arg + Get<'a>> Get<'a> for BTreeMap<K, V> {
    fn get(i: &mut Iter<'a>) -> Result<Self, ArgError> { Ok(get_dict(i)?.into_iter().collect()) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dict_roundtrip_keeps_order() {
        let mut m = BTreeMap::new();
        m.insert("Status".to_string(), 1u32);
        m.insert("LastResult".to_string(), 2u32);
        let item = MessageItem::from_arg(&m);
        match &item {
            MessageItem::Dict { items, .. } => assert_eq!(items[0].0, MessageItem::Str("LastResult".into())),
            _ => panic!("expected a dict, got {:?}", item),
        }
        assert_eq!(item.inner::<BTreeMap<String, u32>>(), Ok(m));
        assert!(item.inner::<BTreeMap<String, i64>>().is_err());
    }

    #[test]
    fn array_of_wrong_element_type() {
        let item = MessageItem::from_arg(&vec!(1i32, 2));
        assert_eq!(item.inner::<Vec<i32>>(), Ok(vec!(1, 2)));
        assert_eq!(item.inner::<Vec<i64>>(),
            Err(ArgError::TypeMismatch { position: 0, expected: ArgType::Array, found: ArgType::Array }));
    }
}
