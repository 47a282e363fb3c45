//! Threat feed loading, metadata, and validation.
//!
//! - [`database`] parses threat CSVs (multi-ecosystem and legacy formats)
//!   into an ecosystem-scoped index of compromised versions.
//! - [`metadata`] reads the leading `#` comment block of a feed and the
//!   recommended-field checklist.
//! - [`validator`] runs standalone integrity checks over a single feed.

pub mod database;
pub mod metadata;
pub mod validator;
