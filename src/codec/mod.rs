//! Event log serialization.
//!
//! This module handles:
//! - Writing an `EventLog` in the line-oriented text format
//! - Reading logs back, interning names once per decoder

pub mod interner;
pub mod wire;

// Re-export main types and functions
pub use interner::NameInterner;
pub use wire::{
    deserialize, serialize, serialize_to_string, write_log, Decoder, EncodeOptions, NameEncoding,
    TimeResolution,
};
