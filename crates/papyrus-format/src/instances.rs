//! Defined instances — spec §3 "Defined instances" (`ScriptInstance`,
//! `StructInstance`, `Reference`) and their separately-loaded data blobs.

use crate::eid::Eid;
use crate::strings::TString;
use crate::value::Variable;

/// The preamble fields every defined-instance kind reads before any data
/// blob pass (spec §4.3 steps 6-8).
#[derive(Debug, Clone)]
pub struct InstancePreamble {
    /// This instance's element identifier.
    pub id: Eid,
    /// The class name as read from the wire (may not resolve).
    pub class_name: TString,
    /// A 16-bit unknown field present on every preamble kind.
    pub unknown16: u16,
    /// The game-native `RefID` this instance is bound to (zero = unattached).
    pub ref_id: u32,
    /// A trailing unknown byte present on every preamble kind.
    pub unknown8: u8,
    /// Present only under Fallout 4 when `unknown16 & 0b11 == 3`.
    pub fo4_conditional_byte: Option<u8>,
}

/// The data blob shared by `ScriptInstance`, `StructInstance`, and
/// `Reference`: a flag byte, state name, two unknown integers, and the
/// ordered variable vector.
#[derive(Debug, Clone)]
pub struct InstanceData {
    /// Instance flags (bit layout is opaque to the core; preserved verbatim).
    pub flags: u8,
    /// Current Papyrus state name.
    pub state: TString,
    /// First unknown integer.
    pub unknown1: i32,
    /// Second unknown integer.
    pub unknown2: i32,
    /// Ordered variable vector; length must be `0` or equal to the resolved
    /// class's extended member count (spec §3 global invariant).
    pub variables: Vec<Variable>,
}

/// A live Papyrus script instance.
#[derive(Debug, Clone)]
pub struct ScriptInstance {
    /// Shared preamble.
    pub preamble: InstancePreamble,
    /// Data blob, loaded in the second decode pass.
    pub data: Option<InstanceData>,
    /// Resolved class name, if `preamble.class_name` matched a known script.
    pub resolved_class: Option<TString>,
}

/// A live Papyrus struct instance (Fallout 4 only).
#[derive(Debug, Clone)]
pub struct StructInstance {
    /// Shared preamble.
    pub preamble: InstancePreamble,
    /// Data blob, loaded in the second decode pass.
    pub data: Option<InstanceData>,
    /// Resolved class name, if `preamble.class_name` matched a known struct.
    pub resolved_class: Option<TString>,
}

/// A live in-world object reference carrying Papyrus state.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Shared preamble.
    pub preamble: InstancePreamble,
    /// Data blob, loaded in the second decode pass.
    pub data: Option<InstanceData>,
    /// Resolved class name, if `preamble.class_name` matched a known script.
    pub resolved_class: Option<TString>,
}

/// Shared behavior for the three defined-instance kinds, used by the
/// integrity auditor and the cross-reference engine so they can treat all
/// three uniformly.
pub trait DefinedInstance {
    /// This instance's element identifier.
    fn id(&self) -> Eid;
    /// The class name as read from the wire.
    fn class_name(&self) -> &TString;
    /// Whether the class name resolved to a known definition.
    fn is_undefined(&self) -> bool;
    /// The loaded data blob, if the data-blob pass reached this instance.
    fn data(&self) -> Option<&InstanceData>;
    /// The bound `RefID` (zero = unattached).
    fn ref_id(&self) -> u32;
    /// The full preamble, for the re-encoder (needs every wire field, not
    /// just the ones the auditor/cross-reference engine read through the
    /// rest of this trait).
    fn preamble(&self) -> &InstancePreamble;
    /// Sets the resolved class name, once lookup against the loaded
    /// `scripts`/`structs` tables has run (spec §4.3 step 4: "every script
    /// resolves `parent` by lookup"; the same resolution applies to every
    /// instance kind's `class_name` against its defining table).
    fn set_resolved_class(&mut self, resolved: Option<TString>);
    /// True iff this instance is unattached (spec §4.6 "any unattached instance").
    fn is_unattached(&self) -> bool {
        self.ref_id() == 0
    }
    /// True iff `data` is present, has members in its declaring class, but
    /// no loaded variables at all ("memberless").
    fn is_memberless(&self, expected_member_count: usize) -> bool {
        match self.data() {
            Some(d) => d.variables.is_empty() && expected_member_count > 0,
            None => false,
        }
    }
    /// True iff `data.variables.len()` is neither `0` nor `expected_member_count`
    /// ("definition mismatch").
    fn is_definition_mismatch(&self, expected_member_count: usize) -> bool {
        match self.data() {
            Some(d) => !d.variables.is_empty() && d.variables.len() != expected_member_count,
            None => false,
        }
    }
}

macro_rules! impl_defined_instance {
    ($ty:ident) => {
        impl DefinedInstance for $ty {
            fn id(&self) -> Eid {
                self.preamble.id
            }
            fn class_name(&self) -> &TString {
                &self.preamble.class_name
            }
            fn is_undefined(&self) -> bool {
                self.resolved_class.is_none()
            }
            fn data(&self) -> Option<&InstanceData> {
                self.data.as_ref()
            }
            fn ref_id(&self) -> u32 {
                self.preamble.ref_id
            }
            fn preamble(&self) -> &InstancePreamble {
                &self.preamble
            }
            fn set_resolved_class(&mut self, resolved: Option<TString>) {
                self.resolved_class = resolved;
            }
        }
    };
}

impl_defined_instance!(ScriptInstance);
impl_defined_instance!(StructInstance);
impl_defined_instance!(Reference);
