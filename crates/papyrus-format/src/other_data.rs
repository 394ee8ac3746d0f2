//! Best-effort decoding of the fourteen fixed "other data" slots — spec §3
//! "Other data" / "General element".

use crate::error::DecodeError;
use crate::strings::TString;
use crate::value::Variable;
use papyrus_codec::Cursor;

/// Number of fixed slots the format always carries, regardless of how many
/// a given decoder understands (spec §3: "fourteen fixed slots").
pub const SLOT_COUNT: usize = 14;

/// One slot of `OtherData`: successfully interpreted, known-absent, or
/// carried opaquely because no decoder recognizes its shape.
#[derive(Debug, Clone)]
pub enum OtherDataEntry {
    /// The slot decoded into a structured tree.
    Parsed(GeneralElement),
    /// The slot is present on the wire but declares zero length.
    Null,
    /// The slot's bytes could not be interpreted; carried verbatim so
    /// re-encoding still reproduces the original save byte-for-byte.
    Unparsed(Vec<u8>),
}

/// The fourteen fixed, best-effort-decoded slots trailing the main object
/// graph (spec §3 "Other data"). Slots this core does not have a decoder
/// for are simply carried as `Unparsed` — that is not a decode failure.
#[derive(Debug, Clone)]
pub struct OtherData {
    /// The fourteen slots, in wire order.
    pub slots: [OtherDataEntry; SLOT_COUNT],
}

impl OtherData {
    /// Number of slots that decoded into a structured tree.
    pub fn parsed_count(&self) -> usize {
        self.slots.iter().filter(|s| matches!(s, OtherDataEntry::Parsed(_))).count()
    }

    /// Number of slots carried opaquely.
    pub fn unparsed_count(&self) -> usize {
        self.slots.iter().filter(|s| matches!(s, OtherDataEntry::Unparsed(_))).count()
    }
}

/// A best-effort decoded node: either a leaf value or a named group of
/// child nodes. `GeneralElement` never fails to decode on its own — any
/// uninterpretable remainder of a slot's bytes is surfaced as `Unparsed` by
/// the caller, one level up, rather than as a `GeneralElement` error.
#[derive(Debug, Clone)]
pub enum GeneralElement {
    /// A scalar value read in place of a sub-slot.
    Leaf(Variable),
    /// A named string value (used for class/form identifiers in other-data
    /// slots that are mostly metadata rather than graph values).
    Text(TString),
    /// A named, ordered group of child nodes.
    Group {
        /// This group's wire-local name, for diagnostics only.
        name: &'static str,
        /// Child nodes, in wire order.
        children: Vec<GeneralElement>,
    },
}

impl GeneralElement {
    /// Reads a single `Leaf(Variable::Integer(..))` node — the shape most
    /// other-data slots that this core does understand turn out to have.
    pub fn read_leaf_i32(cursor: &mut Cursor<'_>, where_: &'static str) -> Result<Self, DecodeError> {
        Ok(GeneralElement::Leaf(Variable::Integer(cursor.read_i32(where_)?)))
    }

    /// True iff this node is a `Group` with no children.
    pub fn is_empty_group(&self) -> bool {
        matches!(self, GeneralElement::Group { children, .. } if children.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inert_slots() -> [OtherDataEntry; SLOT_COUNT] {
        std::array::from_fn(|_| OtherDataEntry::Null)
    }

    #[test]
    fn counts_reflect_slot_kinds() {
        let mut slots = inert_slots();
        slots[0] = OtherDataEntry::Parsed(GeneralElement::Leaf(Variable::Integer(1)));
        slots[1] = OtherDataEntry::Unparsed(vec![1, 2, 3]);
        let other = OtherData { slots };
        assert_eq!(other.parsed_count(), 1);
        assert_eq!(other.unparsed_count(), 1);
    }

    #[test]
    fn empty_group_is_detected() {
        let group = GeneralElement::Group { name: "x", children: vec![] };
        assert!(group.is_empty_group());
        let non_empty = GeneralElement::Group {
            name: "x",
            children: vec![GeneralElement::Leaf(Variable::Null)],
        };
        assert!(!non_empty.is_empty_group());
    }
}
