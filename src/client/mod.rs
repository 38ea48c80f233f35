//! Cluster access used during validation.
//!
//! - `pod_reader`: read-only pod lookups for scale-target checks

mod pod_reader;

pub use pod_reader::{KubePodReader, LookupError, PodReader, PodRef};
