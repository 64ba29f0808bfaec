//! Structural XML event stream.
//!
//! The importer consumes the document as a pull-based sequence of open,
//! close and text events. `event` defines the event type and its attribute
//! accessors; `reader` runs the tokenizer on a dedicated thread ahead of
//! consumption, bounded by a configurable lookahead depth.

pub mod event;
pub mod reader;

pub use event::{Element, XmlEvent};
pub use reader::TokenSource;
