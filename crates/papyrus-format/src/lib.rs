//! papyrus-format — the Papyrus VM-state object graph: decode, re-encode,
//! and the host-invoked mutation contracts that keep a loaded graph
//! re-encodable (spec §3, §4).
//!
//! A `Papyrus` value is always fully constructed, even from truncated or
//! malformed input — `parse` never panics and never returns early; it sets
//! `truncated`/`broken` on the graph it hands back instead. Downstream
//! layers (cross-reference, audit) read those flags rather than an error
//! channel.

#![deny(missing_docs)]

mod arrays;
mod classes;
mod context;
mod decode;
mod eid;
mod encode;
mod error;
mod instances;
mod messages;
mod mutate;
mod other_data;
mod size;
mod strings;
mod threads;
mod value;

pub use arrays::ArrayInfo;
pub use classes::{Script, Struct};
pub use context::{ChangeFormRef, EssContext, GameVariant};
pub use eid::{Eid, EidInterner};
pub use error::{DecodeError, DecodeResult, ElementError, FormatError, ListError};
pub use instances::{DefinedInstance, InstanceData, InstancePreamble, Reference, ScriptInstance, StructInstance};
pub use messages::{FunctionMessage, FunctionMessageData, QueuedUnbind, SuspendedStack};
pub use mutate::MutationReport;
pub use other_data::{GeneralElement, OtherData, OtherDataEntry, SLOT_COUNT};
pub use strings::{IndexWidth, StringTable, TString};
pub use threads::{
    ActiveScript, ActiveScriptData, FragmentTask, OpcodeInstruction, OpcodeKind, Parameter, StackFrame,
};
pub use value::{FunctionLocal, FunctionParam, MemberDescriptor, TypeTag, Variable};

use indexmap::IndexMap;

/// The complete decoded object graph of one Papyrus VM-state block (spec
/// §3 "top-level layout"). Every field mirrors one section of the binary
/// layout table in spec §6; `truncated`/`broken` record whether decoding
/// reached the end of the recipe cleanly.
#[derive(Debug)]
pub struct Papyrus {
    /// Leading header word.
    pub header: u16,
    /// The interned string table. Frozen once decoded; every later field
    /// only resolves indices against it.
    pub strings: StringTable,
    /// Script class definitions, keyed by name.
    pub scripts: IndexMap<TString, Script>,
    /// Struct class definitions (Fallout 4 only), keyed by name.
    pub structs: IndexMap<TString, Struct>,
    /// Live script instances, keyed by element identifier.
    pub script_instances: IndexMap<Eid, ScriptInstance>,
    /// Live in-world references, keyed by element identifier.
    pub references: IndexMap<Eid, Reference>,
    /// Live struct instances (Fallout 4 only), keyed by element identifier.
    pub struct_instances: IndexMap<Eid, StructInstance>,
    /// Heap arrays, keyed by element identifier.
    pub arrays: IndexMap<Eid, ArrayInfo>,
    /// The element identifier of the Papyrus runtime's own pseudo-object.
    pub papyrus_runtime: Eid,
    /// Active Papyrus threads, keyed by element identifier.
    pub active_scripts: IndexMap<Eid, ActiveScript>,
    /// Queued function-call messages.
    pub function_messages: Vec<FunctionMessage>,
    /// First of the two suspended-stack maps (wire order).
    pub suspended_stacks_1: IndexMap<Eid, SuspendedStack>,
    /// Second of the two suspended-stack maps (wire order).
    pub suspended_stacks_2: IndexMap<Eid, SuspendedStack>,
    /// Leading unknown 32-bit field.
    pub unk1: u32,
    /// Trailing unknown 32-bit field, present iff `unk1 != 0`.
    pub unk2: Option<u32>,
    /// Element identifiers the decode recipe could not otherwise classify.
    pub unknown_ids: Vec<Eid>,
    /// Queued unbinds, keyed by the instance identifier they target.
    pub unbinds: IndexMap<Eid, QueuedUnbind>,
    /// Trailing save-file-version word (Skyrim only).
    pub save_file_version: Option<u16>,
    /// Best-effort reparse of the fourteen "other data" slots.
    pub other_data: Option<OtherData>,
    /// The raw bytes `other_data` was reparsed from, kept verbatim so
    /// re-encoding reproduces them even where reparsing did not.
    pub arrays_trailer: Vec<u8>,
    /// Set when the stream ran out of bytes before the recipe completed.
    pub truncated: bool,
    /// Set when a byte sequence violated an expected tag, magic, or count.
    pub broken: bool,
}

impl Papyrus {
    /// An empty graph with every collection cleared, used as the decode
    /// target before `parse` fills it in.
    pub fn empty() -> Self {
        Self {
            header: 0,
            strings: StringTable::new(IndexWidth::Narrow),
            scripts: IndexMap::new(),
            structs: IndexMap::new(),
            script_instances: IndexMap::new(),
            references: IndexMap::new(),
            struct_instances: IndexMap::new(),
            arrays: IndexMap::new(),
            papyrus_runtime: Eid::ZERO,
            active_scripts: IndexMap::new(),
            function_messages: Vec::new(),
            suspended_stacks_1: IndexMap::new(),
            suspended_stacks_2: IndexMap::new(),
            unk1: 0,
            unk2: None,
            unknown_ids: Vec::new(),
            unbinds: IndexMap::new(),
            save_file_version: None,
            other_data: None,
            arrays_trailer: Vec::new(),
            truncated: false,
            broken: false,
        }
    }

    /// Decodes a Papyrus VM-state block from `bytes` under `ctx`. Never
    /// fails outright: see the `truncated`/`broken` fields on the result.
    pub fn parse(bytes: &[u8], ctx: &EssContext) -> Papyrus {
        decode::parse(bytes, ctx)
    }

    /// Re-encodes this graph back to its binary layout (spec §4.4). Fails
    /// only if the graph's own invariants have been broken by an
    /// out-of-contract mutation (see `mutate`).
    pub fn write(&self, ctx: &EssContext) -> DecodeResult<Vec<u8>> {
        encode::write(self, ctx)
    }

    /// The exact byte size `write` would produce, computed independently of
    /// the write path itself (spec §4.4, §8 testable property 2).
    pub fn calculate_size(&self, ctx: &EssContext) -> usize {
        size::calculate_size(self, ctx)
    }

    /// True iff decoding reached the end of the recipe without truncation
    /// or format errors.
    pub fn is_clean(&self) -> bool {
        !self.truncated && !self.broken
    }

    /// Removes every `ScriptInstance` whose `RefID` is zero, cascading to
    /// queued unbinds that target a removed instance (spec §4.7). Callers
    /// must discard any previously built cross-reference index afterward.
    pub fn remove_unattached_instances(&mut self) -> MutationReport {
        mutate::remove_unattached_instances(self)
    }

    /// Removes every script/struct/instance/reference whose class is
    /// unresolved, and zeroes every active script whose class is
    /// unresolved and not already terminated (spec §4.7). Callers must
    /// discard any previously built cross-reference index afterward.
    pub fn remove_undefined_elements(&mut self) -> MutationReport {
        mutate::remove_undefined_elements(self)
    }

    /// Replaces every opcode of every frame belonging to `thread_ids` with
    /// the shared NOP sentinel (spec §4.7, §9).
    pub fn terminate_undefined_threads(&mut self, thread_ids: &[Eid]) -> MutationReport {
        mutate::terminate_undefined_threads(self, thread_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inert_ctx(variant: GameVariant) -> EssContext {
        EssContext::inert(variant, variant == GameVariant::Fallout4, variant == GameVariant::Fallout4)
    }

    #[test]
    fn empty_input_is_reported_as_truncated() {
        let ctx = inert_ctx(GameVariant::Skyrim);
        let graph = Papyrus::parse(&[], &ctx);
        assert!(graph.truncated);
        assert!(!graph.broken);
    }

    #[test]
    fn garbage_header_still_yields_a_graph() {
        let ctx = inert_ctx(GameVariant::Fallout4);
        let graph = Papyrus::parse(&[0xFF; 4], &ctx);
        assert!(graph.truncated || graph.broken || graph.is_clean());
    }
}
