//! Canvas Annotations

use easel_protocol::{AnnotationId, Color, Rect};
use serde::{Deserialize, Serialize};

/// A floating text annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Stable identifier
    pub id: AnnotationId,

    /// Placement on the canvas
    pub rect: Rect,

    /// Text content
    pub text: String,

    /// Background color
    pub background: Color,
}

impl Annotation {
    /// Create a new annotation
    #[must_use]
    pub fn new(id: AnnotationId, rect: Rect, text: impl Into<String>) -> Self {
        Self {
            id,
            rect,
            text: text.into(),
            background: Color::TRANSPARENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_creation() {
        let ann = Annotation::new(AnnotationId(1), Rect::new(10, 10, 100, 40), "note");
        assert_eq!(ann.text, "note");
        assert_eq!(ann.background, Color::TRANSPARENT);
    }
}
