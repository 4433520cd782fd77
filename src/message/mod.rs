//! Message and result envelopes.
//!
//! A [`Message`] carries an identifier, a routing name, an opaque payload and
//! immutable [`Metadata`]. A [`CommandResult`] answers one message with either
//! a JSON success payload or a [`DispatchError`](crate::DispatchError).

mod command;
#[allow(clippy::module_inception)]
mod message;
mod metadata;
mod result;

pub use command::Command;
pub use message::Message;
pub use metadata::{Metadata, CORRELATION_ID};
pub use result::CommandResult;
