//! The dispatch table of an interface, and the trampolines that run it.
//!
//! An `IfaceDesc` is built once per interface with an `IfaceBuilder`, and then shared
//! (read-only) by every object that implements the interface. Each method entry holds a
//! trampoline that reads the typed arguments out of the incoming call, runs the handler,
//! and writes the typed return values into the reply. Parameter and return signatures
//! are computed from the same argument tuples the trampoline uses, so the two cannot
//! disagree.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::arg::{Append, AppendAll, Arg, ArgAll, Get, MessageItem, ReadAll};
use crate::strings::{Interface, Member, Path, Signature};
use crate::{Message, MethodErr};

type MethodCb<T> = Box<dyn Fn(&Context, &mut T) -> Result<Message, MethodErr> + Send + Sync + 'static>;
type GetPropCb<T> = Box<dyn Fn(&T) -> Result<MessageItem, MethodErr> + Send + Sync + 'static>;
type SetPropCb<T> = Box<dyn Fn(&mut T, &MessageItem) -> Result<(), MethodErr> + Send + Sync + 'static>;

struct CallbackDbg<C>(C);

impl<C> fmt::Debug for CallbackDbg<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "Callback") }
}

/// The incoming method call, as seen by a method handler.
#[derive(Debug)]
pub struct Context<'a> {
    message: &'a Message,
}

impl<'a> Context<'a> {
    pub(crate) fn new(message: &'a Message) -> Self { Context { message } }

    pub fn message(&self) -> &'a Message { self.message }

    pub fn path(&self) -> Option<Path<'a>> { self.message.path() }

    pub fn member(&self) -> Option<Member<'a>> { self.message.member() }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations(Vec<(String, String)>);

impl Annotations {
    fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let (name, value) = (name.into(), value.into());
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(x) => x.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    fn introspect(&self, indent: &str) -> String {
        self.0.iter().fold(String::new(), |aa, (ak, av)| {
            format!("{}{}<annotation name=\"{}\" value=\"{}\"/>\n", aa, indent, ak, av)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Argument {
    name: Cow<'static, str>,
    sig: Signature<'static>,
}

#[derive(Debug, Clone, PartialEq)]
struct Arguments(Vec<Argument>);

impl Arguments {
    fn build<A: ArgAll>(names: A::strs) -> Arguments {
        let mut v = vec!();
        A::strs_sig(names, |name, sig| v.push(Argument { name: name.into(), sig }));
        Arguments(v)
    }

    fn signature(&self) -> Signature<'static> {
        Signature::from_string_unchecked(self.0.iter().map(|a| a.sig.as_str()).collect())
    }

    fn introspect(&self, indent: &str, dir: &str) -> String {
        self.0.iter().fold(String::new(), |aa, a| {
            let n = if a.name.is_empty() { String::new() } else { format!("name=\"{}\" ", a.name) };
            format!("{}{}<arg {}type=\"{}\"{}/>\n", aa, indent, n, a.sig, dir)
        })
    }
}

/// One method entry of the dispatch table.
#[derive(Debug)]
pub struct MethodDesc<T> {
    name: Member<'static>,
    input_args: Arguments,
    output_args: Arguments,
    annotations: Annotations,
    cb: CallbackDbg<MethodCb<T>>,
}

impl<T> MethodDesc<T> {
    pub fn name(&self) -> &Member<'static> { &self.name }

    /// Parameter signature, e g `xx`.
    pub fn input_signature(&self) -> Signature<'static> { self.input_args.signature() }

    /// Return value signature, e g `x`.
    pub fn output_signature(&self) -> Signature<'static> { self.output_args.signature() }

    pub fn annotations(&self) -> &Annotations { &self.annotations }

    /// Adds an annotation to this method.
    pub fn annotate<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.annotations.insert(name, value);
        self
    }

    /// Marks this method as deprecated.
    pub fn deprecated(&mut self) -> &mut Self { self.annotate("org.freedesktop.DBus.Deprecated", "true") }
}

/// One signal entry of the dispatch table. Only the payload signature is stored;
/// emitting is up to the object.
#[derive(Debug)]
pub struct SignalDesc {
    name: Member<'static>,
    args: Arguments,
    annotations: Annotations,
}

impl SignalDesc {
    pub fn name(&self) -> &Member<'static> { &self.name }

    /// Payload signature.
    pub fn signature(&self) -> Signature<'static> { self.args.signature() }

    pub fn annotations(&self) -> &Annotations { &self.annotations }

    /// Adds an annotation to this signal.
    pub fn annotate<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.annotations.insert(name, value);
        self
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Debug)]
/// The possible access characteristics a Property can have.
pub enum Access {
    /// The Property can only be read (Get).
    Read,
    /// The Property can be read or written.
    ReadWrite,
    /// The Property can only be written (Set).
    Write,
}

impl Access {
    fn introspect(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::ReadWrite => "readwrite",
            Access::Write => "write",
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Ord, PartialOrd, Debug)]
/// What happens when a property changes. Mirrors the
/// `org.freedesktop.DBus.Property.EmitsChangedSignal` annotation.
pub enum EmitsChangedSignal {
    /// PropertiesChanged is sent with the new value.
    True,
    /// PropertiesChanged is sent with the property name in the invalidated list, without value.
    Invalidates,
    /// The property never changes.
    Const,
    /// Changes are not announced.
    False,
}

impl Default for EmitsChangedSignal {
    fn default() -> Self { EmitsChangedSignal::True }
}

impl EmitsChangedSignal {
    fn annotation(&self) -> Option<&'static str> {
        match self {
            EmitsChangedSignal::True => None,
            EmitsChangedSignal::Invalidates => Some("invalidates"),
            EmitsChangedSignal::Const => Some("const"),
            EmitsChangedSignal::False => Some("false"),
        }
    }
}

/// One property entry of the dispatch table.
#[derive(Debug)]
pub struct PropDesc<T> {
    name: Member<'static>,
    sig: Signature<'static>,
    emits: EmitsChangedSignal,
    annotations: Annotations,
    get_cb: Option<CallbackDbg<GetPropCb<T>>>,
    set_cb: Option<CallbackDbg<SetPropCb<T>>>,
}

impl<T> PropDesc<T> {
    pub fn name(&self) -> &Member<'static> { &self.name }

    pub fn signature(&self) -> &Signature<'static> { &self.sig }

    pub fn emits_changed(&self) -> EmitsChangedSignal { self.emits }

    pub fn annotations(&self) -> &Annotations { &self.annotations }

    /// A property without setter is read-only.
    pub fn access(&self) -> Access {
        match (&self.get_cb, &self.set_cb) {
            (Some(_), Some(_)) => Access::ReadWrite,
            (None, Some(_)) => Access::Write,
            _ => Access::Read,
        }
    }
}

/// Builder for one property, returned from `IfaceBuilder::property`.
#[derive(Debug)]
pub struct PropBuilder<'a, T: 'static, V: 'static>(&'a mut PropDesc<T>, PhantomData<&'static V>);

impl<T: Send + 'static, V: Arg + Append + for<'z> Get<'z> + 'static> PropBuilder<'_, T, V> {
    /// Adds a getter, which is called for Get, GetAll and local reads.
    pub fn get<CB>(self, cb: CB) -> Self
    where CB: Fn(&T) -> Result<V, MethodErr> + Send + Sync + 'static {
        self.0.get_cb = Some(CallbackDbg(Box::new(move |data| {
            cb(data).map(|v| MessageItem::from_arg(&v))
        })));
        self
    }

    /// Adds a setter, which makes the property writable.
    ///
    /// The setter is responsible for storing the value and for announcing the change,
    /// usually through a `PropertyCell`.
    pub fn set<CB>(self, cb: CB) -> Self
    where CB: Fn(&mut T, V) -> Result<(), MethodErr> + Send + Sync + 'static {
        self.0.set_cb = Some(CallbackDbg(Box::new(move |data, item| {
            let v: V = item.inner()?;
            cb(data, v)
        })));
        self
    }

    /// Sets how changes of this property are announced.
    pub fn emits_changed_signal(self, emits: EmitsChangedSignal) -> Self {
        self.0.emits = emits;
        self
    }

    /// Adds an annotation to this property.
    pub fn annotate<N: Into<String>, W: Into<String>>(self, name: N, value: W) -> Self {
        self.0.annotations.insert(name, value);
        self
    }
}

/// The dispatch table of one interface.
#[derive(Debug)]
pub struct IfaceDesc<T> {
    name: Interface<'static>,
    annotations: Annotations,
    methods: Vec<MethodDesc<T>>,
    signals: Vec<SignalDesc>,
    properties: Vec<PropDesc<T>>,
}

/// Fills in an `IfaceDesc`; see `IfaceDesc::new`.
#[derive(Debug)]
pub struct IfaceBuilder<T: 'static>(IfaceDesc<T>);

fn upsert<'a, X, F: Fn(&X) -> bool>(v: &'a mut Vec<X>, matches: F, x: X) -> &'a mut X {
    let idx = match v.iter().position(|old| matches(old)) {
        Some(idx) => { v[idx] = x; idx }
        None => { v.push(x); v.len() - 1 }
    };
    &mut v[idx]
}

impl<T: Send + 'static> IfaceBuilder<T> {
    /// Adds a method. `input_args` and `output_args` are tuples of argument names;
    /// their types come from the handler.
    pub fn method<IA, OA, N, CB>(&mut self, name: N, input_args: IA::strs, output_args: OA::strs, cb: CB) -> &mut MethodDesc<T>
    where IA: ArgAll + ReadAll, OA: ArgAll + AppendAll,
    N: Into<Member<'static>>,
    CB: Fn(&Context, &mut T, IA) -> Result<OA, MethodErr> + Send + Sync + 'static {
        let boxed: MethodCb<T> = Box::new(move |ctx, data| {
            let ia: IA = ctx.message().read_all()?;
            let oa = cb(ctx, data, ia)?;
            let mut reply = ctx.message().method_return();
            reply.append_all(&oa);
            Ok(reply)
        });
        let name = name.into();
        let m = MethodDesc {
            input_args: Arguments::build::<IA>(input_args),
            output_args: Arguments::build::<OA>(output_args),
            annotations: Default::default(),
            cb: CallbackDbg(boxed),
            name: name.clone(),
        };
        upsert(&mut self.0.methods, |x| x.name == name, m)
    }

    /// Adds a property of type `V`. Call `get` and optionally `set` on the result.
    pub fn property<V: Arg, N: Into<Member<'static>>>(&mut self, name: N) -> PropBuilder<'_, T, V> {
        let name = name.into();
        let p = PropDesc {
            name: name.clone(),
            sig: V::signature(),
            emits: Default::default(),
            annotations: Default::default(),
            get_cb: None,
            set_cb: None,
        };
        PropBuilder(upsert(&mut self.0.properties, |x| x.name == name, p), PhantomData)
    }

    /// Declares a signal with payload `A`.
    pub fn signal<A, N>(&mut self, name: N, args: A::strs) -> &mut SignalDesc
    where A: ArgAll, N: Into<Member<'static>> {
        let name = name.into();
        let s = SignalDesc { name: name.clone(), args: Arguments::build::<A>(args), annotations: Default::default() };
        upsert(&mut self.0.signals, |x| x.name == name, s)
    }

    /// Adds an annotation to the interface.
    pub fn annotate<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.0.annotations.insert(name, value);
        self
    }
}

fn guarded<R, F: FnOnce() -> Result<R, MethodErr>>(what: fmt::Arguments, f: F) -> Result<R, MethodErr> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(_) => {
            error!("{} panicked", what);
            Err(MethodErr::failed("Internal error"))
        }
    }
}

impl<T: Send + 'static> IfaceDesc<T> {
    /// Builds the dispatch table for interface `name`.
    pub fn new<N, F>(name: N, f: F) -> IfaceDesc<T>
    where N: Into<Interface<'static>>, F: FnOnce(&mut IfaceBuilder<T>) {
        let mut b = IfaceBuilder(IfaceDesc {
            name: name.into(),
            annotations: Default::default(),
            methods: vec!(),
            signals: vec!(),
            properties: vec!(),
        });
        f(&mut b);
        b.0
    }
}

impl<T> IfaceDesc<T> {
    pub fn name(&self) -> &Interface<'static> { &self.name }

    pub fn annotations(&self) -> &Annotations { &self.annotations }

    /// Methods in declaration order.
    pub fn methods(&self) -> impl Iterator<Item=&MethodDesc<T>> { self.methods.iter() }

    /// Signals in declaration order.
    pub fn signals(&self) -> impl Iterator<Item=&SignalDesc> { self.signals.iter() }

    /// Properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item=&PropDesc<T>> { self.properties.iter() }

    pub fn method(&self, name: &str) -> Option<&MethodDesc<T>> { self.methods.iter().find(|m| &*m.name == name) }

    pub fn signal(&self, name: &str) -> Option<&SignalDesc> { self.signals.iter().find(|s| &*s.name == name) }

    pub fn property(&self, name: &str) -> Option<&PropDesc<T>> { self.properties.iter().find(|p| &*p.name == name) }

    /// Runs the method trampoline for `msg` and returns the reply.
    ///
    /// Every failure, including a panicking handler, comes back as a `MethodErr`.
    pub fn call_method(&self, data: &mut T, msg: &Message) -> Result<Message, MethodErr> {
        let member = msg.member().ok_or_else(|| MethodErr::no_method(""))?;
        let m = self.method(&member).ok_or_else(|| MethodErr::no_method(&member))?;
        debug!(interface = %self.name, method = %member, "dispatching method call");
        let ctx = Context::new(msg);
        let r = guarded(format_args!("method {}.{}", self.name, member), || (m.cb.0)(&ctx, data));
        if let Err(e) = &r { debug!(interface = %self.name, method = %member, error = %e.errorname(), "method failed") }
        r
    }

    /// Reads a property through its getter.
    pub fn get_property(&self, data: &T, name: &str) -> Result<MessageItem, MethodErr> {
        let p = self.property(name).ok_or_else(|| MethodErr::no_property(name))?;
        let cb = p.get_cb.as_ref().ok_or_else(|| MethodErr::failed(&format!("Property {} is write only", name)))?;
        guarded(format_args!("getter of {}.{}", self.name, name), || (cb.0)(data))
    }

    /// Writes a property through its setter. `value` is the bare value, not wrapped in a variant.
    pub fn set_property(&self, data: &mut T, name: &str, value: &MessageItem) -> Result<(), MethodErr> {
        let p = self.property(name).ok_or_else(|| MethodErr::no_property(name))?;
        let cb = p.set_cb.as_ref().ok_or_else(|| MethodErr::ro_property(name))?;
        debug!(interface = %self.name, property = name, "setting property");
        guarded(format_args!("setter of {}.{}", self.name, name), || (cb.0)(data, value))
    }

    /// Reads all readable properties, in declaration order.
    pub fn get_all(&self, data: &T) -> Result<Vec<(String, MessageItem)>, MethodErr> {
        self.properties.iter()
            .filter(|p| p.get_cb.is_some())
            .map(|p| -> Result<_, MethodErr> { Ok((p.name.to_string(), self.get_property(data, &p.name)?)) })
            .collect()
    }

    /// Introspection XML for this interface.
    pub fn introspect(&self, indent: &str) -> String {
        let inner = format!("{}  ", indent);
        let args_indent = format!("{}    ", indent);
        let mut methods: Vec<_> = self.methods.iter().collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        let mut props: Vec<_> = self.properties.iter().collect();
        props.sort_by(|a, b| a.name.cmp(&b.name));
        let mut signals: Vec<_> = self.signals.iter().collect();
        signals.sort_by(|a, b| a.name.cmp(&b.name));

        let mut s = format!("{}<interface name=\"{}\">\n", indent, self.name);
        for m in methods {
            let contents = format!("{}{}{}",
                m.input_args.introspect(&args_indent, " direction=\"in\""),
                m.output_args.introspect(&args_indent, " direction=\"out\""),
                m.annotations.introspect(&args_indent));
            s += &element(&inner, "method", &m.name, "", &contents);
        }
        for p in props {
            let mut anns = p.annotations.clone();
            if let Some(v) = p.emits.annotation() {
                anns.insert("org.freedesktop.DBus.Property.EmitsChangedSignal", v);
            }
            let params = format!(" type=\"{}\" access=\"{}\"", p.sig, p.access().introspect());
            s += &element(&inner, "property", &p.name, &params, &anns.introspect(&args_indent));
        }
        for sig in signals {
            let contents = format!("{}{}", sig.args.introspect(&args_indent, ""), sig.annotations.introspect(&args_indent));
            s += &element(&inner, "signal", &sig.name, "", &contents);
        }
        s += &self.annotations.introspect(&inner);
        s += &format!("{}</interface>\n", indent);
        s
    }
}

fn element(indent: &str, kind: &str, name: &str, params: &str, contents: &str) -> String {
    if contents.is_empty() {
        format!("{}<{} name=\"{}\"{}/>\n", indent, kind, name, params)
    } else {
        format!("{}<{} name=\"{}\"{}>\n{}{}</{}>\n", indent, kind, name, params, contents, indent, kind)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Default)]
    struct Echo {
        count: i32,
        name: String,
    }

    fn echo_iface() -> IfaceDesc<Echo> {
        IfaceDesc::new("com.example.echo", |b: &mut IfaceBuilder<Echo>| {
            b.method("Echo", ("request",), ("reply",), |_, e: &mut Echo, (request,): (String,)| {
                e.count += 1;
                Ok((request,))
            });
            b.method("Boom", (), (), |_, _: &mut Echo, _: ()| -> Result<(), MethodErr> {
                panic!("boom")
            });
            b.property::<i32, _>("EchoCount").get(|e| Ok(e.count)).emits_changed_signal(EmitsChangedSignal::False);
            b.property::<String, _>("Name").get(|e| Ok(e.name.clone())).set(|e, v| { e.name = v; Ok(()) });
            b.property::<u8, _>("Secret").set(|_, _| Ok(()));
            b.signal::<(String,), _>("Echoed", ("data",));
        })
    }

    fn call(member: &str) -> Message {
        let mut m = Message::new_method_call("com.example.echoserver", "/echo", "com.example.echo", member).unwrap();
        m.set_serial(3);
        m
    }

    #[test]
    fn signature_table() {
        let i = echo_iface();
        let methods: Vec<_> = i.methods().map(|m| (m.name().to_string(), m.input_signature().to_string(), m.output_signature().to_string())).collect();
        assert_eq!(methods, vec!(
            ("Echo".to_string(), "s".to_string(), "s".to_string()),
            ("Boom".to_string(), "".to_string(), "".to_string()),
        ));
        assert_eq!(&*i.signal("Echoed").unwrap().signature(), "s");
        assert_eq!(i.property("EchoCount").unwrap().access(), Access::Read);
        assert_eq!(i.property("Name").unwrap().access(), Access::ReadWrite);
        assert_eq!(i.property("Secret").unwrap().access(), Access::Write);
    }

    #[test]
    fn trampoline() {
        let i = echo_iface();
        let mut e = Echo::default();
        let reply = i.call_method(&mut e, &call("Echo").append1("hello")).unwrap();
        assert_eq!(reply.get_reply_serial(), Some(3));
        assert_eq!(reply.read1::<&str>(), Ok("hello"));
        assert_eq!(e.count, 1);

        let err = i.call_method(&mut e, &call("Echo").append1(5i32)).unwrap_err();
        assert_eq!(&**err.errorname(), "org.freedesktop.DBus.Error.InvalidArgs");
        let err = i.call_method(&mut e, &call("Echo")).unwrap_err();
        assert_eq!(&**err.errorname(), "org.freedesktop.DBus.Error.InvalidArgs");
        let err = i.call_method(&mut e, &call("Echo").append2("a", "b")).unwrap_err();
        assert_eq!(&**err.errorname(), "org.freedesktop.DBus.Error.InvalidArgs");
        assert_eq!(e.count, 1);

        let err = i.call_method(&mut e, &call("Nope")).unwrap_err();
        assert_eq!(&**err.errorname(), "org.freedesktop.DBus.Error.UnknownMethod");
    }

    #[test]
    fn panicking_handler_is_a_generic_error() {
        let i = echo_iface();
        let err = i.call_method(&mut Echo::default(), &call("Boom")).unwrap_err();
        assert_eq!(&**err.errorname(), "org.freedesktop.DBus.Error.Failed");
        assert!(!err.description().contains("boom"));
    }

    #[test]
    fn properties() {
        let i = echo_iface();
        let mut e = Echo::default();
        i.set_property(&mut e, "Name", &MessageItem::Str("x".into())).unwrap();
        assert_eq!(i.get_property(&e, "Name"), Ok(MessageItem::Str("x".into())));

        let ro = i.set_property(&mut e, "EchoCount", &MessageItem::Int32(3)).unwrap_err();
        assert_eq!(&**ro.errorname(), "org.freedesktop.DBus.Error.PropertyReadOnly");
        let bad = i.set_property(&mut e, "Name", &MessageItem::Int32(3)).unwrap_err();
        assert_eq!(&**bad.errorname(), "org.freedesktop.DBus.Error.InvalidArgs");
        let unknown = i.get_property(&e, "Bogus").unwrap_err();
        assert_eq!(&**unknown.errorname(), "org.freedesktop.DBus.Error.UnknownProperty");

        let all = i.get_all(&e).unwrap();
        assert_eq!(all, vec!(
            ("EchoCount".to_string(), MessageItem::Int32(0)),
            ("Name".to_string(), MessageItem::Str("x".into())),
        ));
    }

    #[test]
    fn introspection() {
        let expected = r##"  <interface name="com.example.echo">
    <method name="Boom"/>
    <method name="Echo">
      <arg name="request" type="s" direction="in"/>
      <arg name="reply" type="s" direction="out"/>
    </method>
    <property name="EchoCount" type="i" access="read">
      <annotation name="org.freedesktop.DBus.Property.EmitsChangedSignal" value="false"/>
    </property>
    <property name="Name" type="s" access="readwrite"/>
    <property name="Secret" type="y" access="write"/>
    <signal name="Echoed">
      <arg name="data" type="s"/>
    </signal>
  </interface>
"##;
        assert_eq!(echo_iface().introspect("  "), expected);
    }
}
