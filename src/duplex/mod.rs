//! Duplex implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Duplex` trait. Peer code must not depend on implementation-specific types;
//! it only ever sees a `DuplexPtr`.

pub mod memory;
mod stream;

pub use memory::{MemoryDuplex, MemoryHub};
pub use stream::{StreamDuplex, MAX_FRAME_SIZE};
