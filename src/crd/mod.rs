//! Custom Resource Definitions validated by the webhook.
//!
//! - `CloneSet`: replica-managed workload with in-place update support

mod cloneset;

pub use cloneset::*;
