// This is the binding of net.poettering.Calculator, in the form an interface
// description compiler emits it. Edit the interface description, not this file.

use std::sync::Arc;

use sdbus_vtable as sdbus;
#[allow(unused_imports)]
use sdbus::arg;
use sdbus::{Emitter, IfaceBuilder, IfaceDesc, MethodErr, PropertyCell, Server};

pub const INTERFACE: &str = "net.poettering.Calculator";

sdbus::wire_enum! {
    pub enum State {
        Success => "net.poettering.Calculator.State.Success",
        Error => "net.poettering.Calculator.State.Error",
    }
}

impl Default for State {
    fn default() -> Self { State::Success }
}

sdbus::dbus_errors! {
    pub enum CalculatorError {
        DivisionByZero => ("net.poettering.Calculator.Error.DivisionByZero",
            "An attempt to divide by zero was attempted."),
    }
}

/// Signal indicating the LastReset property has been set to zero by the 'Clear' method.
#[derive(Debug, Clone, PartialEq)]
pub struct NetPoetteringCalculatorCleared {
    /// Value of LastReset prior to Clear.
    pub unnamed: i64,
}

impl arg::AppendAll for NetPoetteringCalculatorCleared {
    fn append(&self, i: &mut arg::IterAppend) {
        arg::Append::append_by_ref(&self.unnamed, i);
    }
}

impl arg::ReadAll for NetPoetteringCalculatorCleared {
    fn read(i: &mut arg::Iter) -> Result<Self, arg::ArgError> {
        Ok(NetPoetteringCalculatorCleared {
            unnamed: i.read()?,
        })
    }
}

impl sdbus::SignalArgs for NetPoetteringCalculatorCleared {
    const NAME: &'static str = "Cleared";
    const INTERFACE: &'static str = "net.poettering.Calculator";
}

/// A value of any of the interface's property types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertiesVariant {
    State(State),
    Int64(i64),
}

impl From<PropertiesVariant> for arg::MessageItem {
    fn from(v: PropertiesVariant) -> arg::MessageItem {
        match v {
            PropertiesVariant::State(x) => arg::MessageItem::from_arg(&x),
            PropertiesVariant::Int64(x) => arg::MessageItem::from_arg(&x),
        }
    }
}

/// Property storage and signal emission, shared by every implementation.
#[derive(Debug)]
pub struct NetPoetteringCalculatorBase {
    last_result: PropertyCell<i64>,
    status: PropertyCell<State>,
    emitter: Emitter,
}

impl NetPoetteringCalculatorBase {
    pub fn new(emitter: Emitter) -> Self {
        NetPoetteringCalculatorBase {
            last_result: PropertyCell::new("LastResult", 0),
            status: PropertyCell::new("Status", State::Success),
            emitter,
        }
    }

    pub fn emitter(&self) -> &Emitter { &self.emitter }

    /// Get value of LastResult
    pub fn last_result(&self) -> i64 { *self.last_result.get() }

    /// Set value of LastResult
    pub fn set_last_result(&mut self, value: i64) -> i64 {
        self.last_result.set(value, &self.emitter);
        *self.last_result.get()
    }

    /// Get value of Status
    pub fn status(&self) -> State { *self.status.get() }

    /// Set value of Status
    pub fn set_status(&mut self, value: State) -> State {
        self.status.set(value, &self.emitter);
        *self.status.get()
    }

    /// Send signal 'Cleared'
    pub fn cleared(&self, unnamed: i64) {
        self.emitter.emit(&NetPoetteringCalculatorCleared { unnamed });
    }
}

pub trait NetPoetteringCalculator {
    fn base(&self) -> &NetPoetteringCalculatorBase;
    fn base_mut(&mut self) -> &mut NetPoetteringCalculatorBase;

    /// Multiplies two integers 'x' and 'y' and returns the result.
    fn multiply(&mut self, x: i64, y: i64) -> Result<i64, MethodErr>;
    /// Divides two integers 'x' and 'y' and returns the result.
    fn divide(&mut self, x: i64, y: i64) -> Result<i64, MethodErr>;
    /// Reset the LastResult property to zero.
    fn clear(&mut self) -> Result<(), MethodErr>;

    fn last_result(&self) -> i64 { self.base().last_result() }
    fn set_last_result(&mut self, value: i64) -> Result<i64, MethodErr> { Ok(self.base_mut().set_last_result(value)) }
    fn status(&self) -> State { self.base().status() }
    fn set_status(&mut self, value: State) -> Result<State, MethodErr> { Ok(self.base_mut().set_status(value)) }
}

pub fn register_net_poettering_calculator<T>() -> IfaceDesc<T>
where T: NetPoetteringCalculator + Send + 'static
{
    IfaceDesc::new(INTERFACE, |b: &mut IfaceBuilder<T>| {
        b.method("Multiply", ("x", "y",), ("z",), |_, t: &mut T, (x, y,)| {
            t.multiply(x, y,)
                .map(|x| (x,))
        });
        b.method("Divide", ("x", "y",), ("z",), |_, t: &mut T, (x, y,)| {
            t.divide(x, y,)
                .map(|x| (x,))
        });
        b.method("Clear", (), (), |_, t: &mut T, ()| {
            t.clear()
        });
        b.signal::<(i64,), _>("Cleared", ("unnamed",));
        b.property::<i64, _>("LastResult")
            .get(|t: &T| Ok(t.last_result()))
            .set(|t: &mut T, value| t.set_last_result(value).map(|_| ()));
        b.property::<State, _>("Status")
            .get(|t: &T| Ok(t.status()))
            .set(|t: &mut T, value| t.set_status(value).map(|_| ()));
    })
}

/// Puts an object onto the bus at `path`, then applies the initial property values
/// in `vals`, in iteration order.
pub fn new_net_poettering_calculator<T, F, I>(bus: Arc<dyn sdbus::Bus>, path: sdbus::Path<'static>,
    desc: Arc<IfaceDesc<T>>, vals: I, make: F) -> Result<Server<T>, sdbus::Error>
where T: NetPoetteringCalculator + Send + 'static,
    F: FnOnce(NetPoetteringCalculatorBase) -> T,
    I: IntoIterator<Item=(String, PropertiesVariant)>
{
    let vals = vals.into_iter().map(|(k, v)| (k, arg::MessageItem::from(v)));
    Server::with_props(bus, path, desc, vals, |e| make(NetPoetteringCalculatorBase::new(e)))
}
