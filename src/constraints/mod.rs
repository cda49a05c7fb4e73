//! Invocation constraints and their reduction to protocol parameters.
//!
//! - [`InvocationConstraint`] / [`InvocationConstraints`]: caller input
//! - [`ConstraintReducer`]: collapses one constraint kind to acceptable values
//! - [`DiscoveryConstraints`]: resolved negotiation policy
//! - [`ConnectionContext`]: per-attempt record for one unicast format

mod constraint;
mod context;
mod discovery;
mod reducer;

pub use constraint::*;
pub use context::*;
pub use discovery::*;
pub use reducer::*;
