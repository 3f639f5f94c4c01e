//! Bidirectional actions
//!
//! - [`BidiAction`]: a named worker function with typed input, output, init and
//!   stream values
//! - [`Connection`]: one running invocation of an action
//! - [`ActionRegistry`]: name-keyed registry with introspectable descriptors

mod connection;
mod definition;
mod registry;

pub use connection::{Connection, ConnectionState};
pub use definition::{
    ActionDescriptor, BidiAction, BidiFuture, BidiOptions, SchemaSlot, TypeDescriptor, WorkerFn,
};
pub use registry::{ActionRegistry, Registrable, RegistryError};
