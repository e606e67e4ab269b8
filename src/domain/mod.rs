//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! concrete channels, sockets, or infrastructure concerns.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod duplex;

// --- Duplex domain re-exports ---

pub use duplex::{
    //
    Duplex,
    DuplexPtr,
    Inbox,
};
