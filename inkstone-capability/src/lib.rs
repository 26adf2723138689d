//! Capability model for Inkstone plugins.
//!
//! This crate defines the vocabulary the sandbox speaks:
//! - [`Capability`]: a hierarchical, dot-namespaced permission identifier
//! - [`CapabilityInfo`] and [`RiskLevel`]: descriptive metadata per capability
//! - The static registry of every capability the host knows about
//!
//! Granting a coarse capability implies every finer capability nested under
//! it: `editor` covers `editor.buffer` and `editor.cursor`. The registry is
//! built once and never mutated, so it is read without locking.

mod capability;
mod registry;

pub use capability::{is_child_of, implies_capability, Capability};
pub use registry::{
    all_capabilities, children_of, get_capability_info, high_risk_capabilities,
    is_valid_capability, registered, CapabilityInfo, RiskLevel,
};
