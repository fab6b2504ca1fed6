//! The `net.poettering.Calculator` interface from the sd-bus documentation.
//!
//! `generated` holds the binding (enum and error tables, the server trait, property
//! storage and the dispatch table). `SimpleCalculator` is a complete implementation of it.

mod generated;
pub use crate::generated::*;

mod simple;
pub use crate::simple::SimpleCalculator;
