//! Type tags used to check parent assignments.
//!
//! The engine does not interpret values; it only needs to know whether a
//! parent may occupy a slot. Every node carries one [`TypeTag`] and every slot
//! declares a [`SlotType`] that decides which tags it accepts.

use std::fmt;

/// A named tag describing the kind of value a node provides.
///
/// Tags compare by name, so hosts usually declare them as constants:
///
/// ```
/// # use blackboard::TypeTag;
/// const BOOL: TypeTag = TypeTag::new("bool");
/// assert_eq!(BOOL.name(), "bool");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TypeTag(&'static str);

impl TypeTag {
    /// Create a tag with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The tag's name.
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The declared type of a parent slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotType {
    /// Accepts a parent of any type.
    Any,
    /// Accepts only parents carrying exactly this tag.
    Exactly(TypeTag),
    /// Accepts parents carrying any of these tags.
    OneOf(Vec<TypeTag>),
}

impl SlotType {
    /// Returns true if a parent tagged `tag` may occupy this slot.
    pub fn accepts(&self, tag: TypeTag) -> bool {
        match self {
            SlotType::Any => true,
            SlotType::Exactly(expected) => *expected == tag,
            SlotType::OneOf(tags) => tags.contains(&tag),
        }
    }
}

impl From<TypeTag> for SlotType {
    fn from(tag: TypeTag) -> Self {
        SlotType::Exactly(tag)
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Any => f.write_str("any"),
            SlotType::Exactly(tag) => write!(f, "{}", tag),
            SlotType::OneOf(tags) => {
                let names: Vec<&str> = tags.iter().map(|t| t.name()).collect();
                write!(f, "one of [{}]", names.join(", "))
            }
        }
    }
}
