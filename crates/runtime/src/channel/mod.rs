//! Duplex channel pair
//!
//! This module contains the message-passing primitives a connection is built on:
//! - [`handoff`] channels with rendezvous (unbuffered) or bounded semantics
//! - [`InputStream`], the worker's view of caller input
//! - [`Responder`], the worker's output sink with explicit turn boundaries

mod handoff;
mod stream;

pub use handoff::{handoff, ChannelClosed, HandoffReceiver, HandoffSender};
pub use stream::{Frame, InputStream, Responder};
