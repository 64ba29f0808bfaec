//! Dirload: Bulk XML Import for the dird Directory Service
//!
//! Parses a structured XML document describing directory objects and their
//! fields, builds an in-memory model with deferred cross-object references,
//! and drives a two-phase registration protocol against a remote
//! transactional session.

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod session;
pub mod tooling;
pub mod types;
pub mod upload;
pub mod xml;
