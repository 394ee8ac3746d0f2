//! Active scripts (threads), stack frames, and opcodes — spec §3 "Active
//! script (thread)", "Stack frame", "Opcode instruction".

use crate::eid::Eid;
use crate::error::FormatError;
use crate::strings::TString;
use crate::value::{FunctionLocal, FunctionParam, TypeTag, Variable};

/// The one-byte fragment-task discriminator and its payload (spec §3
/// "Active script"). Unknown discriminants are a `FormatError`, not a
/// silent skip.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentTask {
    /// Quest-stage fragment: the stage index that triggered it.
    QuestStage {
        /// Stage number.
        stage: i32,
        /// Fragment index within the stage.
        fragment_index: i32,
    },
    /// Scene phase-fragment results.
    ScenePhaseResults {
        /// Phase index.
        phase: i32,
    },
    /// Scene action-fragment results.
    SceneActionResults {
        /// Action index.
        action_index: i32,
        /// Index of the actor this fragment ran on.
        actor_index: i32,
    },
    /// Scene-level fragment results.
    SceneResults,
    /// Terminal (in-game computer) run results.
    TerminalRunResults {
        /// Index of the chosen terminal entry.
        entry_index: i32,
    },
    /// Dialogue topic-info fragment.
    TopicInfo {
        /// The topic response index.
        response_index: i32,
    },
    /// A second, otherwise-unnamed fragment-task shape the format defines.
    Type2 {
        /// The single 32-bit payload field this shape carries.
        value: i32,
    },
}

impl FragmentTask {
    /// This task's one-byte wire discriminator.
    pub fn discriminant(&self) -> u8 {
        match self {
            FragmentTask::QuestStage { .. } => 0,
            FragmentTask::ScenePhaseResults { .. } => 1,
            FragmentTask::SceneActionResults { .. } => 2,
            FragmentTask::SceneResults => 3,
            FragmentTask::TerminalRunResults { .. } => 4,
            FragmentTask::TopicInfo { .. } => 5,
            FragmentTask::Type2 { .. } => 6,
        }
    }

    /// True for the one game variant / fragment-task combination that also
    /// carries a following attached-EID (spec §3: "optional attached-EID
    /// (only for one game variant under certain fragment conditions)").
    pub fn carries_attached_eid(&self, is_fallout4: bool) -> bool {
        is_fallout4 && matches!(self, FragmentTask::Type2 { .. })
    }
}

/// A function-parameter or local-variable value tag (spec §3 "Opcode
/// instruction" / "Parameter"). `Term` is never serialized; it exists only
/// so the pretty-printer can render a resolved identifier in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// No value.
    Null,
    /// A resolved identifier (variable slot reference).
    Identifier(TString),
    /// A string literal.
    String(TString),
    /// An integer literal.
    Integer(i32),
    /// A float literal.
    Float(f32),
    /// A boolean literal.
    Boolean(bool),
    /// An opaque byte the format carries but does not interpret further.
    Unknown8(u8),
    /// Pretty-printing-only: a resolved display term. Never serialized.
    Term(String),
}

impl Parameter {
    /// This parameter's wire type ordinal, or `None` for the
    /// pretty-printing-only `Term` variant.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            Parameter::Null => Some(0),
            Parameter::Identifier(_) => Some(1),
            Parameter::String(_) => Some(2),
            Parameter::Integer(_) => Some(3),
            Parameter::Float(_) => Some(4),
            Parameter::Boolean(_) => Some(5),
            Parameter::Unknown8(_) => Some(6),
            Parameter::Term(_) => None,
        }
    }
}

/// A decoded opcode, identified by its one-byte ordinal. Operand counts and
/// "has extra terms" behavior are dictated by `OpcodeKind::describe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpcodeKind {
    /// No-op. Also the sentinel value `terminate_undefined_threads` writes
    /// over every instruction of a terminated thread.
    Nop = 0,
    IAdd = 1,
    FAdd = 2,
    ISub = 3,
    FSub = 4,
    IMul = 5,
    FMul = 6,
    IDiv = 7,
    FDiv = 8,
    IMod = 9,
    Not = 10,
    CompareEq = 11,
    CompareLt = 12,
    CompareLe = 13,
    CompareGt = 14,
    CompareGe = 15,
    Jmp = 16,
    JmpT = 17,
    JmpF = 18,
    Return = 19,
    StrCat = 20,
    PropGet = 21,
    PropSet = 22,
    ArrayCreate = 23,
    ArrayLength = 24,
    ArrayGetElement = 25,
    ArraySetElement = 26,
    /// Instance method call; the last fixed operand is an argument count
    /// followed by that many extra parameters (spec §4.3 "has extra terms").
    CallMethod = 27,
    /// Parent-class method call; same "has extra terms" shape as `CallMethod`.
    CallParent = 28,
    /// Static method call; same "has extra terms" shape as `CallMethod`.
    CallStatic = 29,
    Cast = 30,
}

impl OpcodeKind {
    /// Decodes an opcode from its wire byte.
    pub fn from_byte(b: u8) -> Result<Self, FormatError> {
        use OpcodeKind::*;
        Ok(match b {
            0 => Nop,
            1 => IAdd,
            2 => FAdd,
            3 => ISub,
            4 => FSub,
            5 => IMul,
            6 => FMul,
            7 => IDiv,
            8 => FDiv,
            9 => IMod,
            10 => Not,
            11 => CompareEq,
            12 => CompareLt,
            13 => CompareLe,
            14 => CompareGt,
            15 => CompareGe,
            16 => Jmp,
            17 => JmpT,
            18 => JmpF,
            19 => Return,
            20 => StrCat,
            21 => PropGet,
            22 => PropSet,
            23 => ArrayCreate,
            24 => ArrayLength,
            25 => ArrayGetElement,
            26 => ArraySetElement,
            27 => CallMethod,
            28 => CallParent,
            29 => CallStatic,
            30 => Cast,
            other => return Err(FormatError::new("opcode", format!("invalid opcode byte {other}"))),
        })
    }

    /// Number of *fixed* parameter slots this opcode always carries.
    pub fn fixed_arity(self) -> usize {
        use OpcodeKind::*;
        match self {
            Nop => 0,
            Not | ArrayLength | Return => 1,
            IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IMod | CompareEq | CompareLt
            | CompareLe | CompareGt | CompareGe | StrCat | PropGet | ArrayCreate | Cast => 2,
            Jmp | JmpT | JmpF | PropSet | ArrayGetElement => 2,
            ArraySetElement => 3,
            CallMethod | CallParent | CallStatic => 4,
        }
    }

    /// True iff the last fixed operand is read as an integer count of
    /// additional `Parameter`s that follow (spec §4.3 "has extra terms").
    pub fn has_extra_terms(self) -> bool {
        matches!(self, OpcodeKind::CallMethod | OpcodeKind::CallParent | OpcodeKind::CallStatic)
    }
}

/// A single decoded instruction: opcode plus its operand parameters
/// (fixed slots, with any extra terms already appended).
#[derive(Debug, Clone, PartialEq)]
pub struct OpcodeInstruction {
    /// The opcode.
    pub opcode: OpcodeKind,
    /// All operand parameters, fixed slots first, extra terms appended.
    pub params: Vec<Parameter>,
}

impl OpcodeInstruction {
    /// The shared NOP sentinel instruction `terminate_undefined_threads`
    /// writes over every opcode of a terminated thread (spec §9).
    pub fn nop_sentinel() -> Self {
        OpcodeInstruction { opcode: OpcodeKind::Nop, params: Vec::new() }
    }
}

/// Carries: flag, function-type tag, script-name, base-name, event-name,
/// optional status string, opcode-version bytes, return-type, docstring,
/// user/function flags, parameters, locals, opcode vector, instruction
/// pointer, owner, and declared-length variable vector (spec §3 "Stack frame").
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Frame flags; bit 0 gates the optional status string.
    pub flags: u8,
    /// The function kind this frame is executing.
    pub function_type: TypeTag,
    /// Owning script's name.
    pub script_name: TString,
    /// The base (declaring) script's name.
    pub base_name: TString,
    /// The Papyrus event/function name.
    pub event_name: TString,
    /// Present iff `flags & 1 == 0` and `function_type == Null`.
    pub status: Option<TString>,
    /// Opcode-format version, major.
    pub opcode_version_major: u8,
    /// Opcode-format version, minor.
    pub opcode_version_minor: u8,
    /// Declared return type name.
    pub return_type: TString,
    /// Function docstring.
    pub docstring: TString,
    /// 32-bit user flags, preserved verbatim.
    pub user_flags: u32,
    /// 8-bit function flags; bit 0 = static, bit 1 = native (spec §3).
    pub function_flags: u8,
    /// Declared function parameters.
    pub params: Vec<FunctionParam>,
    /// Declared function locals.
    pub locals: Vec<FunctionLocal>,
    /// Decoded opcode stream.
    pub opcodes: Vec<OpcodeInstruction>,
    /// Current instruction pointer; must satisfy `0 <= ptr <= opcodes.len()`.
    pub instruction_pointer: u32,
    /// This frame's owner value.
    pub owner: Variable,
    /// Locally-scoped variable vector, of declared length.
    pub variables: Vec<Variable>,
}

impl StackFrame {
    /// True iff this frame's function is `static` (function-flags bit 0).
    pub fn is_static(&self) -> bool {
        self.function_flags & 0b0000_0001 != 0
    }

    /// True iff this frame's function is `native` (function-flags bit 1).
    pub fn is_native(&self) -> bool {
        self.function_flags & 0b0000_0010 != 0
    }

    /// True iff `instruction_pointer` lies within `[0, opcodes.len()]`
    /// (spec §8 testable property 7).
    pub fn instruction_pointer_in_bounds(&self) -> bool {
        (self.instruction_pointer as usize) <= self.opcodes.len()
    }
}

/// An active Papyrus thread (spec §3 "Active script").
#[derive(Debug, Clone)]
pub struct ActiveScript {
    /// This thread's element identifier.
    pub id: Eid,
    /// One-byte thread kind, preserved verbatim.
    pub kind: u8,
    /// Data blob, loaded in the second decode pass.
    pub data: Option<ActiveScriptData>,
    /// Resolved owner value (the first frame's owner variable), filled in
    /// once data-blob decoding completes for every thread.
    pub owner: Option<Variable>,
    /// The suspended stack attached to this thread, if any, resolved from
    /// the union of the two suspended-stack maps.
    pub suspended_stack: Option<Eid>,
}

impl ActiveScript {
    /// True iff this thread has no stack frames left — "terminated" in the
    /// sense `terminate_undefined_threads` cares about requires every
    /// opcode to already be NOP, which this alone does not determine; this
    /// helper only reports whether the frame vector itself is empty.
    pub fn has_no_frames(&self) -> bool {
        self.data.as_ref().is_none_or(|d| d.frames.is_empty())
    }
}

/// The data blob for an `ActiveScript` (spec §3).
#[derive(Debug, Clone)]
pub struct ActiveScriptData {
    /// Format major version.
    pub version_major: u8,
    /// Format minor version.
    pub version_minor: u8,
    /// This thread's owner value, as read from the blob (pre-resolution).
    pub owner: Variable,
    /// Thread flags, preserved verbatim.
    pub flags: u8,
    /// A trailing unknown byte, preserved verbatim.
    pub unknown: u8,
    /// The fragment-task payload, if this thread carries one.
    pub fragment_task: Option<FragmentTask>,
    /// Present only for Fallout 4 under the fragment conditions described
    /// by `FragmentTask::carries_attached_eid`.
    pub attached: Option<Eid>,
    /// This thread's stack frames.
    pub frames: Vec<StackFrame>,
    /// Present iff `frames` is non-empty.
    pub trailing_byte: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrips_bytes() {
        for b in 0..=30u8 {
            assert_eq!(OpcodeKind::from_byte(b).unwrap() as u8, b);
        }
        assert!(OpcodeKind::from_byte(31).is_err());
    }

    #[test]
    fn call_opcodes_have_extra_terms() {
        assert!(OpcodeKind::CallMethod.has_extra_terms());
        assert!(OpcodeKind::CallStatic.has_extra_terms());
        assert!(!OpcodeKind::IAdd.has_extra_terms());
    }

    #[test]
    fn function_flag_bits_decode_static_and_native() {
        let frame = StackFrame {
            flags: 0,
            function_type: TypeTag::Null,
            script_name: crate::strings::StringTable::new(crate::strings::IndexWidth::Wide).intern(""),
            base_name: crate::strings::StringTable::new(crate::strings::IndexWidth::Wide).intern(""),
            event_name: crate::strings::StringTable::new(crate::strings::IndexWidth::Wide).intern(""),
            status: None,
            opcode_version_major: 1,
            opcode_version_minor: 0,
            return_type: crate::strings::StringTable::new(crate::strings::IndexWidth::Wide).intern(""),
            docstring: crate::strings::StringTable::new(crate::strings::IndexWidth::Wide).intern(""),
            user_flags: 0,
            function_flags: 0b11,
            params: vec![],
            locals: vec![],
            opcodes: vec![],
            instruction_pointer: 0,
            owner: Variable::Null,
            variables: vec![],
        };
        assert!(frame.is_static());
        assert!(frame.is_native());
        assert!(frame.instruction_pointer_in_bounds());
    }
}
