//! Cross-provider identity reconciliation over the id map.

pub mod engine;
pub mod policy;

pub use engine::{IdentityMergeEngine, MergeFailure, MergePath, MergeReport};
pub use policy::{MergeField, MergePolicies, MergePolicy};
