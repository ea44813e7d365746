//! Easel Protocol - Command Model and Wire Types
//!
//! This crate defines the shared vocabulary of the Easel synchronization
//! engine:
//! - Command: Typed, serializable edit operations
//! - SequencedCommand: A command stamped with its server-assigned position
//!   in the canonical total order
//! - Wire: WebSocket client/server message types
//!
//! Commands reference layers and annotations by stable id so that
//! concurrent structural edits commute when replayed in sequence order.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod wire;

// Re-export main types
pub use command::{
    AccessTier, AnnotationId, BlendMode, CanvasTransform, Color, Command, LayerId, LayerImage,
    Rect, SequencedCommand, UserId, PROTOCOL_VERSION,
};
pub use wire::{ClientMessage, ServerMessage};
