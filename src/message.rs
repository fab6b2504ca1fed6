//! Bus messages: method calls, method returns, errors and signals.

use crate::arg::{Append, AppendAll, Get, Iter, IterAppend, MessageItem, ReadAll, ArgError};
use crate::strings::{BusName, ErrorName, Interface, Member, Path};
use crate::{Error, MethodErr};

/// One of the four different message types.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub enum MessageType {
    /// This is a method call D-Bus message
    MethodCall = 1,
    /// This is a method return Ok D-Bus message, used when the method call message was successfully processed
    MethodReturn = 2,
    /// This is a method return with error D-Bus message, used when the method call message could not be handled
    Error = 3,
    /// This is a signal, usually sent to whoever wants to listen
    Signal = 4,
}

/// A D-Bus message. A message contains headers - usually destination address, path, interface and member,
/// and a list of arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    msg_type: MessageType,
    serial: u32,
    reply_serial: Option<u32>,
    path: Option<Path<'static>>,
    interface: Option<Interface<'static>>,
    member: Option<Member<'static>>,
    error_name: Option<ErrorName<'static>>,
    sender: Option<BusName<'static>>,
    destination: Option<BusName<'static>>,
    no_reply: bool,
    body: Vec<MessageItem>,
}

impl Message {
    fn empty(msg_type: MessageType) -> Message {
        Message {
            msg_type,
            serial: 0,
            reply_serial: None,
            path: None,
            interface: None,
            member: None,
            error_name: None,
            sender: None,
            destination: None,
            no_reply: false,
            body: vec!(),
        }
    }

    /// Creates a new method call message, validating all names.
    pub fn new_method_call<D, P, I, M>(destination: D, path: P, iface: I, method: M) -> Result<Message, String>
    where D: Into<String>, P: Into<String>, I: Into<String>, M: Into<String> {
        Ok(Message::method_call(&BusName::new(destination.into())?, &Path::new(path.into())?,
            &Interface::new(iface.into())?, &Member::new(method.into())?))
    }

    /// Creates a new method call message.
    pub fn method_call(destination: &BusName, path: &Path, iface: &Interface, method: &Member) -> Message {
        let mut m = Message::empty(MessageType::MethodCall);
        m.destination = Some(destination.clone().into_static());
        m.path = Some(path.clone().into_static());
        m.interface = Some(iface.clone().into_static());
        m.member = Some(method.clone().into_static());
        m
    }

    /// Creates a new signal message.
    pub fn signal(path: &Path, iface: &Interface, name: &Member) -> Message {
        let mut m = Message::empty(MessageType::Signal);
        m.path = Some(path.clone().into_static());
        m.interface = Some(iface.clone().into_static());
        m.member = Some(name.clone().into_static());
        m
    }

    /// Creates a method return (reply) for this method call.
    pub fn method_return(&self) -> Message {
        let mut m = Message::empty(MessageType::MethodReturn);
        m.reply_serial = Some(self.serial);
        m.destination = self.sender.clone();
        m
    }

    /// Creates an error reply for this method call.
    pub fn error(&self, error_name: &ErrorName, error_message: &str) -> Message {
        let mut m = Message::empty(MessageType::Error);
        m.reply_serial = Some(self.serial);
        m.destination = self.sender.clone();
        m.error_name = Some(error_name.clone().into_static());
        m.body.push(MessageItem::Str(error_message.into()));
        m
    }

    /// Builds a message from headers and body received from a transport.
    pub fn from_parts(msg_type: MessageType, path: Option<Path<'static>>, interface: Option<Interface<'static>>,
        member: Option<Member<'static>>, body: Vec<MessageItem>) -> Message {
        let mut m = Message::empty(msg_type);
        m.path = path;
        m.interface = interface;
        m.member = member;
        m.body = body;
        m
    }

    /// Appends one argument to this message.
    /// Use in builder style: e g `m.method_return().append1(7i32)`
    pub fn append1<A: Append>(mut self, a: A) -> Self {
        IterAppend::new(&mut self.body).append(a);
        self
    }

    /// Appends two arguments to this message.
    pub fn append2<A1: Append, A2: Append>(mut self, a1: A1, a2: A2) -> Self {
        {
            let mut ia = IterAppend::new(&mut self.body);
            ia.append(a1);
            ia.append(a2);
        }
        self
    }

    /// Appends three arguments to this message.
    pub fn append3<A1: Append, A2: Append, A3: Append>(mut self, a1: A1, a2: A2, a3: A3) -> Self {
        {
            let mut ia = IterAppend::new(&mut self.body);
            ia.append(a1);
            ia.append(a2);
            ia.append(a3);
        }
        self
    }

    /// Appends a whole argument list.
    pub fn append_all<A: AppendAll>(&mut self, a: &A) {
        a.append(&mut IterAppend::new(&mut self.body))
    }

    /// Appends already built items.
    pub fn append_items(&mut self, v: &[MessageItem]) {
        self.body.extend_from_slice(v)
    }

    /// Gets the first argument from the message, if that argument is of type G1.
    pub fn get1<'a, G1: Get<'a>>(&'a self) -> Option<G1> {
        self.iter_init().get().ok()
    }

    /// Reads the first argument from the message.
    pub fn read1<'a, G1: Get<'a>>(&'a self) -> Result<G1, ArgError> {
        self.iter_init().read()
    }

    /// Reads the first two arguments from the message.
    pub fn read2<'a, G1: Get<'a>, G2: Get<'a>>(&'a self) -> Result<(G1, G2), ArgError> {
        let mut i = self.iter_init();
        Ok((i.read()?, i.read()?))
    }

    /// Reads the whole argument list. Fails if the message has more, or fewer,
    /// arguments than `R` describes.
    pub fn read_all<R: ReadAll>(&self) -> Result<R, ArgError> {
        let mut i = self.iter_init();
        let r = R::read(&mut i)?;
        i.finish()?;
        Ok(r)
    }

    /// Returns a struct for retreiving the arguments from a message.
    pub fn iter_init(&self) -> Iter<'_> { Iter::new(&self.body) }

    /// Gets the MessageItems that make up the message.
    pub fn get_items(&self) -> Vec<MessageItem> { self.body.clone() }

    /// The message body.
    pub fn items(&self) -> &[MessageItem] { &self.body }

    /// Gets the MessageType of the Message.
    pub fn msg_type(&self) -> MessageType { self.msg_type }

    /// Gets the serial number, 0 if the message has not been sent yet.
    pub fn get_serial(&self) -> u32 { self.serial }

    /// Sets the serial number, done by the bus when sending.
    pub fn set_serial(&mut self, val: u32) { self.serial = val }

    /// Gets the serial of the method call this message replies to.
    pub fn get_reply_serial(&self) -> Option<u32> { self.reply_serial }

    pub fn sender(&self) -> Option<BusName<'_>> { self.sender.as_ref().map(BusName::from) }

    pub fn set_sender(&mut self, sender: Option<BusName>) { self.sender = sender.map(|s| s.into_static()) }

    pub fn destination(&self) -> Option<BusName<'_>> { self.destination.as_ref().map(BusName::from) }

    pub fn set_destination(&mut self, dest: Option<BusName>) { self.destination = dest.map(|s| s.into_static()) }

    pub fn path(&self) -> Option<Path<'_>> { self.path.as_ref().map(Path::from) }

    pub fn interface(&self) -> Option<Interface<'_>> { self.interface.as_ref().map(Interface::from) }

    pub fn member(&self) -> Option<Member<'_>> { self.member.as_ref().map(Member::from) }

    /// Gets the name of the error, if this is an error message.
    pub fn error_name(&self) -> Option<ErrorName<'_>> { self.error_name.as_ref().map(ErrorName::from) }

    /// If true, the caller does not want a reply to this method call.
    pub fn get_no_reply(&self) -> bool { self.no_reply }

    pub fn set_no_reply(&mut self, v: bool) { self.no_reply = v }

    /// When the remote end returns an error, the message itself is correct but its contents
    /// is an error. This method will transform such an error to a D-Bus Error or otherwise
    /// return the original message.
    pub fn as_result(&self) -> Result<&Message, Error> {
        match (&self.msg_type, &self.error_name) {
            (MessageType::Error, Some(name)) => {
                let text = self.get1::<&str>().unwrap_or("");
                Err(MethodErr::from((name.clone(), text)).into())
            }
            _ => Ok(self),
        }
    }
}

/// Helper methods for structs representing a Signal
pub trait SignalArgs {
    /// D-Bus name of signal
    const NAME: &'static str;

    /// D-Bus name of interface this signal belongs to
    const INTERFACE: &'static str;

    /// Returns a message that emits the signal.
    fn to_emit_message(&self, path: &Path) -> Message where Self: AppendAll + Sized {
        let mut m = Message::signal(path, &Interface::from(Self::INTERFACE), &Member::from(Self::NAME));
        m.append_all(self);
        m
    }

    /// If the message is a signal of the correct type, return its arguments, otherwise return None.
    ///
    /// This does not check sender and path of the message, which is likely relevant to you as well.
    fn from_message(m: &Message) -> Option<Self> where Self: Sized + ReadAll {
        if m.msg_type() != MessageType::Signal { None }
        else if m.interface().as_deref() != Some(Self::INTERFACE) { None }
        else if m.member().as_deref() != Some(Self::NAME) { None }
        else { m.read_all().ok() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn call_and_reply() {
        let mut m = Message::new_method_call("net.poettering.Calculator", "/calc", "net.poettering.Calculator", "Multiply")
            .unwrap().append2(6i64, 7i64);
        m.set_serial(17);
        m.set_sender(Some(":1.5".into()));
        assert_eq!(m.read_all::<(i64, i64)>(), Ok((6, 7)));
        assert!(m.read_all::<(i64,)>().is_err());

        let r = m.method_return().append1(42i64);
        assert_eq!(r.get_reply_serial(), Some(17));
        assert_eq!(r.destination().as_deref(), Some(":1.5"));
        assert_eq!(r.read1::<i64>(), Ok(42));
        assert!(r.as_result().is_ok());
    }

    #[test]
    fn error_reply_as_result() {
        let m = Message::new_method_call("a.b", "/", "a.b", "C").unwrap();
        let e = m.error(&"org.freedesktop.DBus.Error.Failed".into(), "went wrong");
        assert_eq!(e.msg_type(), MessageType::Error);
        match e.as_result() {
            Err(Error::Dbus(me)) => {
                assert_eq!(&**me.errorname(), "org.freedesktop.DBus.Error.Failed");
                assert_eq!(me.description(), "went wrong");
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    #[cfg(not(feature = "no-string-validation"))]
    fn invalid_names_are_rejected() {
        assert!(Message::new_method_call("a.b", "no-slash", "a.b", "C").is_err());
        assert!(Message::new_method_call("a.b", "/", "ab", "C").is_err());
    }
}
