/// Protocol types for the wire format and token management
///
/// This module defines the JSON messages exchanged between peers and the
/// token namespace shared by request ids and exported callbacks.
mod message;
mod token;

pub use message::{Message, Serialized};
pub use token::{CounterIdGenerator, IdGenerator, IdGeneratorPtr, Token};
