//! Easel Canvas - Layered Document State Machine
//!
//! This crate provides the canvas state machine for the Easel
//! synchronization engine:
//! - State: Layered document mutated by applying commands in order
//! - Layer: Pixel buffer plus metadata (opacity, blend mode, ACL tier, ...)
//! - Annotation: Floating text annotations
//! - Snapshot: Versioned full-state container tagged with a sequence number
//! - Error: Recoverable command application failures
//!
//! `apply` failures never corrupt state: `InvalidCommand` and
//! `UnknownTarget` are skipped and logged by callers so that every replica
//! converges on the same state regardless of which commands it could apply.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod annotation;
pub mod error;
pub mod layer;
pub mod snapshot;
pub mod state;

// Re-export main types
pub use annotation::Annotation;
pub use error::{Error, Result};
pub use layer::Layer;
pub use snapshot::{Snapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use state::{CanvasState, MAX_DIMENSION};
