//! Canvas Command Model
//!
//! This module defines the typed edit operations that make up session
//! history. Commands are immutable once created; the server wraps an
//! accepted command in a [`SequencedCommand`] carrying its position in the
//! total order.

use serde::{Deserialize, Serialize};

/// Protocol version negotiated at join time.
pub const PROTOCOL_VERSION: u32 = 1;

/// Stable identifier for a layer.
///
/// Commands always address layers by id, never by stack position, so that
/// concurrent structural edits commute when replayed in server order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LayerId(pub u32);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Stable identifier for an annotation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AnnotationId(pub u32);

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "annotation#{}", self.0)
    }
}

/// Session-scoped user identifier, assigned by the server at join time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u16);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user#{}", self.0)
    }
}

/// An axis-aligned rectangle in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub w: u32,
    /// Height in pixels
    pub h: u32,
}

impl Rect {
    /// Create a new rectangle
    #[must_use]
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Number of pixels covered by this rectangle
    #[must_use]
    pub fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }

    /// Whether the rectangle covers no pixels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// A 32-bit ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    /// Fully transparent black
    pub const TRANSPARENT: Color = Color(0);
    /// Opaque white
    pub const WHITE: Color = Color(0xFFFF_FFFF);
}

/// Layer compositing mode.
///
/// The engine only transports and stores the mode; compositing itself is a
/// renderer concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Normal alpha blending
    #[default]
    Normal,
    /// Multiply
    Multiply,
    /// Screen
    Screen,
    /// Overlay
    Overlay,
    /// Additive
    Add,
    /// Erase (destination-out)
    Erase,
}

/// Per-layer access classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Session operators only
    Operator,
    /// Trusted users and above
    Trusted,
    /// Registered users and above
    Registered,
    /// Anyone in the session
    #[default]
    Everyone,
}

/// Whole-canvas orientation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasTransform {
    /// Mirror left-right
    FlipHorizontal,
    /// Mirror top-bottom
    FlipVertical,
    /// Rotate 90 degrees clockwise
    RotateCw,
    /// Rotate 90 degrees counterclockwise
    RotateCcw,
}

impl CanvasTransform {
    /// The transform that undoes this one
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Self::FlipHorizontal => Self::FlipHorizontal,
            Self::FlipVertical => Self::FlipVertical,
            Self::RotateCw => Self::RotateCcw,
            Self::RotateCcw => Self::RotateCw,
        }
    }
}

/// Full pixel content and metadata of one layer.
///
/// Carried by [`Command::RestoreLayer`], which compensates for a layer
/// deletion during undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerImage {
    /// Layer id being restored
    pub id: LayerId,
    /// Layer title
    pub title: String,
    /// Opacity, 0-255
    pub opacity: u8,
    /// Compositing mode
    pub blend: BlendMode,
    /// Hidden from view
    pub hidden: bool,
    /// Censored content flag
    pub censored: bool,
    /// Locked against edits
    pub locked: bool,
    /// Access tier required to edit
    pub tier: AccessTier,
    /// Group this layer belongs to (None = top level)
    pub parent: Option<LayerId>,
    /// ARGB pixel data, row-major, canvas-sized
    pub pixels: Vec<u32>,
}

/// A single typed edit operation.
///
/// Every variant has a deterministic `apply` on the canvas state machine
/// and, where feasible, an inverse computed against the state it is undone
/// from. Variants reference layers and annotations by stable id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Fill a rectangular region of a layer with a solid color
    FillRegion {
        /// Target layer
        layer: LayerId,
        /// Region to fill
        rect: Rect,
        /// Fill color
        color: Color,
    },

    /// Replace a rectangular region of a layer with explicit pixel data
    PutImage {
        /// Target layer
        layer: LayerId,
        /// Region to replace
        rect: Rect,
        /// ARGB pixels, row-major, exactly `rect.area()` entries
        pixels: Vec<u32>,
    },

    /// Create a new, empty layer
    CreateLayer {
        /// Id for the new layer
        id: LayerId,
        /// Layer title
        title: String,
        /// Insert directly above this layer (None = top of stack)
        insert_above: Option<LayerId>,
    },

    /// Delete a layer
    DeleteLayer {
        /// Layer to delete
        id: LayerId,
    },

    /// Re-insert a previously deleted layer with its full content
    RestoreLayer {
        /// Layer content and metadata
        layer: LayerImage,
        /// Id of the layer that was directly above the restored position;
        /// the layer is inserted below it, or on top if absent
        above: Option<LayerId>,
    },

    /// Duplicate an existing layer
    DuplicateLayer {
        /// Layer to copy
        source: LayerId,
        /// Id for the copy
        new_id: LayerId,
    },

    /// Reorder the layer stack.
    ///
    /// Layers are sorted by their position in `order`; layers not listed
    /// keep their relative order below the listed ones, and unknown ids are
    /// ignored, so concurrent creates and deletes commute.
    ReorderLayers {
        /// Desired bottom-to-top ordering
        order: Vec<LayerId>,
    },

    /// Move a layer into a group, or back to the top level.
    ///
    /// Grouping is structural metadata over the flat stack; the stack
    /// order itself is unchanged.
    SetLayerParent {
        /// Layer to move
        id: LayerId,
        /// Group to move it into (None = top level)
        parent: Option<LayerId>,
    },

    /// Change a layer's title
    RetitleLayer {
        /// Target layer
        id: LayerId,
        /// New title
        title: String,
    },

    /// Change layer attributes; `None` fields are left untouched
    SetLayerAttributes {
        /// Target layer
        id: LayerId,
        /// New opacity
        opacity: Option<u8>,
        /// New blend mode
        blend: Option<BlendMode>,
        /// New hidden flag
        hidden: Option<bool>,
        /// New censor flag
        censored: Option<bool>,
        /// New lock flag
        locked: Option<bool>,
        /// New access tier
        tier: Option<AccessTier>,
    },

    /// Grow or shrink the canvas by per-edge offsets (positive grows)
    ResizeCanvas {
        /// Pixels added above
        top: i32,
        /// Pixels added to the right
        right: i32,
        /// Pixels added below
        bottom: i32,
        /// Pixels added to the left
        left: i32,
    },

    /// Flip or rotate the whole canvas
    TransformCanvas {
        /// Orientation change
        transform: CanvasTransform,
    },

    /// Set the canvas background color
    SetBackground {
        /// New background
        color: Color,
    },

    /// Set or clear the shared selection rectangle
    SetSelection {
        /// New selection (None clears it)
        rect: Option<Rect>,
    },

    /// Create a text annotation
    CreateAnnotation {
        /// Id for the new annotation
        id: AnnotationId,
        /// Placement
        rect: Rect,
        /// Initial text
        text: String,
    },

    /// Edit an annotation; `None` fields are left untouched
    EditAnnotation {
        /// Target annotation
        id: AnnotationId,
        /// New placement
        rect: Option<Rect>,
        /// New text
        text: Option<String>,
        /// New background color
        background: Option<Color>,
    },

    /// Delete an annotation
    DeleteAnnotation {
        /// Annotation to delete
        id: AnnotationId,
    },

    /// Marks the boundary of an interactive action for undo grouping.
    /// Applying it never changes canvas state.
    UndoPoint,

    /// Set or clear a session metadata entry (e.g. "last edited by")
    SetMetadata {
        /// Metadata key
        key: String,
        /// New value (None removes the entry)
        value: Option<String>,
    },
}

impl Command {
    /// Get the command kind as a string, matching the wire tag
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FillRegion { .. } => "fill_region",
            Self::PutImage { .. } => "put_image",
            Self::CreateLayer { .. } => "create_layer",
            Self::DeleteLayer { .. } => "delete_layer",
            Self::RestoreLayer { .. } => "restore_layer",
            Self::DuplicateLayer { .. } => "duplicate_layer",
            Self::ReorderLayers { .. } => "reorder_layers",
            Self::SetLayerParent { .. } => "set_layer_parent",
            Self::RetitleLayer { .. } => "retitle_layer",
            Self::SetLayerAttributes { .. } => "set_layer_attributes",
            Self::ResizeCanvas { .. } => "resize_canvas",
            Self::TransformCanvas { .. } => "transform_canvas",
            Self::SetBackground { .. } => "set_background",
            Self::SetSelection { .. } => "set_selection",
            Self::CreateAnnotation { .. } => "create_annotation",
            Self::EditAnnotation { .. } => "edit_annotation",
            Self::DeleteAnnotation { .. } => "delete_annotation",
            Self::UndoPoint => "undo_point",
            Self::SetMetadata { .. } => "set_metadata",
        }
    }

    /// Whether this command participates in undo.
    ///
    /// Markers and metadata bookkeeping are skipped when a group is
    /// inverted; everything else must produce an inverse or the group is
    /// reported unavailable.
    #[must_use]
    pub fn is_undoable(&self) -> bool {
        !matches!(self, Self::UndoPoint | Self::SetMetadata { .. })
    }

    /// The layer this command targets, if it targets exactly one
    #[must_use]
    pub fn target_layer(&self) -> Option<LayerId> {
        match self {
            Self::FillRegion { layer, .. } | Self::PutImage { layer, .. } => Some(*layer),
            Self::DeleteLayer { id }
            | Self::RetitleLayer { id, .. }
            | Self::SetLayerParent { id, .. }
            | Self::SetLayerAttributes { id, .. } => Some(*id),
            Self::DuplicateLayer { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// Serialized size of this command in bytes, as counted against
    /// history and fork byte budgets
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        postcard::to_allocvec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// A command accepted by the server and stamped with its place in the
/// canonical total order. Created only by the session actor; immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedCommand {
    /// Server-assigned sequence number, gap-free from 1 per session
    pub sequence: u64,
    /// User who issued the command
    pub user_id: UserId,
    /// Client-chosen id used to match acknowledgments against the local fork
    pub client_local_id: u64,
    /// The command itself
    pub command: Command,
}

impl SequencedCommand {
    /// Create a sequenced command
    #[must_use]
    pub fn new(sequence: u64, user_id: UserId, client_local_id: u64, command: Command) -> Self {
        Self {
            sequence,
            user_id,
            client_local_id,
            command,
        }
    }

    /// Serialized size in bytes, as counted against history budgets
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        postcard::to_allocvec(self).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind_matches_wire_tag() {
        let cmd = Command::FillRegion {
            layer: LayerId(1),
            rect: Rect::new(0, 0, 4, 4),
            color: Color::WHITE,
        };
        assert_eq!(cmd.kind(), "fill_region");

        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"kind\":\"fill_region\""));
    }

    #[test]
    fn test_command_round_trip() {
        let cmd = Command::SetLayerAttributes {
            id: LayerId(3),
            opacity: Some(128),
            blend: Some(BlendMode::Multiply),
            hidden: None,
            censored: Some(true),
            locked: None,
            tier: Some(AccessTier::Trusted),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let parsed: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn test_undo_point_is_not_undoable() {
        assert!(!Command::UndoPoint.is_undoable());
        assert!(!Command::SetMetadata {
            key: "last_edited_by".into(),
            value: Some("ada".into()),
        }
        .is_undoable());
        assert!(Command::DeleteLayer { id: LayerId(1) }.is_undoable());
    }

    #[test]
    fn test_target_layer() {
        let cmd = Command::FillRegion {
            layer: LayerId(7),
            rect: Rect::new(0, 0, 1, 1),
            color: Color::TRANSPARENT,
        };
        assert_eq!(cmd.target_layer(), Some(LayerId(7)));
        assert_eq!(Command::UndoPoint.target_layer(), None);
    }

    #[test]
    fn test_transform_inverse() {
        assert_eq!(
            CanvasTransform::RotateCw.inverse(),
            CanvasTransform::RotateCcw
        );
        assert_eq!(
            CanvasTransform::FlipHorizontal.inverse(),
            CanvasTransform::FlipHorizontal
        );
    }

    #[test]
    fn test_sequenced_command_encoded_len() {
        let sc = SequencedCommand::new(1, UserId(1), 1, Command::UndoPoint);
        assert!(sc.encoded_len() > 0);
    }

    #[test]
    fn test_rect_area() {
        assert_eq!(Rect::new(-2, -2, 4, 4).area(), 16);
        assert!(Rect::new(0, 0, 0, 5).is_empty());
    }
}
