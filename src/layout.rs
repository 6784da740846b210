//! Bit layouts for method inputs and outputs
//!
//! A layout is a named, typed record of bit fields. Layout equality is
//! structural: field names, widths, and field order all participate, so two
//! independently built layouts compare equal iff they describe the same wire
//! shape.

use serde::{Deserialize, Serialize};

/// One field of a record layout
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Width in bits
    pub width: u32,
    /// Whether a multi-bit field may be merged by the default boolean-OR
    /// reducer on a nonexclusive method
    pub reducible: bool,
}

impl Field {
    /// A plain field
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
            reducible: false,
        }
    }

    /// A field explicitly tagged as OR-reducible regardless of width
    pub fn reducible(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
            reducible: true,
        }
    }
}

/// A named record of bit fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Layout {
    /// Fields in declaration order
    pub fields: Vec<Field>,
}

impl Layout {
    /// The empty layout (no wires)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Layout from `(name, width)` pairs
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, width)| Field::new(name, width))
                .collect(),
        }
    }

    /// Layout from prebuilt fields
    pub fn from_fields(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Total width in bits
    pub fn width(&self) -> u32 {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// True when the layout has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True when every field can be merged by boolean OR: single-bit, or
    /// explicitly tagged reducible
    pub fn or_reducible(&self) -> bool {
        self.fields.iter().all(|f| f.width == 1 || f.reducible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        let a = Layout::new([("data", 8u32), ("valid", 1)]);
        let b = Layout::new([("data", 8u32), ("valid", 1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn field_order_matters() {
        let a = Layout::new([("data", 8u32), ("valid", 1)]);
        let b = Layout::new([("valid", 1u32), ("data", 8)]);
        assert_ne!(a, b);
    }

    #[test]
    fn width_mismatch_breaks_equality() {
        let a = Layout::new([("data", 8u32)]);
        let b = Layout::new([("data", 16u32)]);
        assert_ne!(a, b);
    }

    #[test]
    fn or_reducible_accepts_tagged_wide_fields() {
        let narrow = Layout::new([("flag", 1u32)]);
        assert!(narrow.or_reducible());

        let wide = Layout::new([("mask", 4u32)]);
        assert!(!wide.or_reducible());

        let tagged = Layout::from_fields(vec![Field::reducible("mask", 4)]);
        assert!(tagged.or_reducible());
    }

    #[test]
    fn total_width_sums_fields() {
        let layout = Layout::new([("a", 3u32), ("b", 5)]);
        assert_eq!(layout.width(), 8);
        assert!(Layout::empty().is_empty());
    }
}
