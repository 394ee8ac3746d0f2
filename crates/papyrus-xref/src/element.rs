//! `Element` — a uniform handle over every node kind the cross-reference
//! engine can point at (spec §4.5 "general referrer index").
//!
//! The engine never touches node payloads directly; it only ever talks in
//! `Element` keys so the referrer/plugin indices stay decoupled from
//! `papyrus_format`'s concrete node types.

use papyrus_format::{Eid, TString};

/// One addressable node in the cross-reference graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    /// A script class definition, keyed by name.
    Script(TString),
    /// A struct class definition, keyed by name.
    Struct(TString),
    /// A live script instance.
    ScriptInstance(Eid),
    /// A live in-world reference.
    Reference(Eid),
    /// A live struct instance.
    StructInstance(Eid),
    /// A heap array.
    Array(Eid),
    /// An active script (thread).
    ActiveScript(Eid),
    /// A queued function message, keyed by its position in the wire-order
    /// vector (function messages carry no element identifier of their own).
    FunctionMessage(usize),
    /// A suspended stack.
    SuspendedStack(Eid),
    /// A queued unbind, keyed by the instance it targets.
    Unbind(Eid),
    /// A savegame plugin, identified by name. Root of the plugin-reachability
    /// index; never a referent of anything else in the graph.
    Plugin(String),
    /// An external change-form record, keyed by its `RefID`. Owned outside
    /// this core (spec glossary "Change-form"); only ever a referent, never
    /// a referrer, since the core never inspects its contents.
    ChangeForm(u32),
}

impl Element {
    /// True for the three "defined instance" kinds `findReferees` filters to
    /// (spec §4.5: "filtered to defined-instance types").
    pub fn is_defined_instance(&self) -> bool {
        matches!(self, Element::ScriptInstance(_) | Element::Reference(_) | Element::StructInstance(_))
    }

    /// True for the plugin-root kind.
    pub fn is_plugin(&self) -> bool {
        matches!(self, Element::Plugin(_))
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Script(n) => write!(f, "Script({n})"),
            Element::Struct(n) => write!(f, "Struct({n})"),
            Element::ScriptInstance(id) => write!(f, "ScriptInstance({id})"),
            Element::Reference(id) => write!(f, "Reference({id})"),
            Element::StructInstance(id) => write!(f, "StructInstance({id})"),
            Element::Array(id) => write!(f, "Array({id})"),
            Element::ActiveScript(id) => write!(f, "ActiveScript({id})"),
            Element::FunctionMessage(i) => write!(f, "FunctionMessage(#{i})"),
            Element::SuspendedStack(id) => write!(f, "SuspendedStack({id})"),
            Element::Unbind(id) => write!(f, "Unbind({id})"),
            Element::Plugin(name) => write!(f, "Plugin({name})"),
            Element::ChangeForm(ref_id) => write!(f, "ChangeForm({ref_id:#010x})"),
        }
    }
}
