//! Wire formats and their registry.
//!
//! - [`FormatId`]: 64-bit id derived from a format name
//! - provider traits: one per role a format can play
//! - [`FormatRegistry`]: providers by role, in registration order
//! - [`PlaintextFormat`]: the built-in unsecured format

mod cache;
mod id;
mod plaintext;
mod provider;
mod registry;

pub use cache::*;
pub use id::*;
pub use plaintext::{PlaintextFormat, read_unicast_response, write_unicast_response};
pub(crate) use plaintext::check_unsecured;
pub use provider::*;
pub use registry::*;
