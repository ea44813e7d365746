//! Client-side session logic for Easel
//!
//! Implements optimistic local execution over a confirmed canvas state:
//! local commands render immediately on a speculative copy while a fork
//! queue tracks what the server has not yet acknowledged. Remote commands
//! are reconciled by rewinding to confirmed state and replaying the fork,
//! and undo is expressed as compensating commands submitted through the
//! same pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fork;
pub mod session;
pub mod undo;

pub use error::{Error, Result};
pub use fork::{ForkConfig, LocalFork, PendingCommand};
pub use session::{ClientSession, Submission, SyncStatus};
pub use undo::{UndoGroup, UndoManager};
