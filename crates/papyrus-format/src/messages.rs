//! Queued function messages, suspended stacks, and queued unbinds — spec §3
//! "Function message", "Suspended stack", "Queued unbind".

use crate::eid::Eid;
use crate::strings::TString;
use crate::value::Variable;

/// A function call queued for dispatch but not yet attached to any active
/// thread (spec §3 "Function message"): a flag byte, an EID present only
/// for the flag values that name one, a second flag-set byte, and — iff
/// that flag-set is non-zero — a `FunctionMessageData` blob.
#[derive(Debug, Clone)]
pub struct FunctionMessage {
    /// Message flag. Values `0..=2` carry `target`; other values do not.
    pub flag: u8,
    /// Present iff `flag <= 2`.
    pub target: Option<Eid>,
    /// Second, independent flag byte gating `data`.
    pub flag_set: u8,
    /// Present iff `flag_set != 0`.
    pub data: Option<FunctionMessageData>,
}

impl FunctionMessage {
    /// True iff `flag` names one of the variants that carries `target`.
    pub fn carries_target(flag: u8) -> bool {
        flag <= 2
    }
}

/// The data blob shared by `FunctionMessage` and `SuspendedStack`: one
/// unknown byte, a script name, an event name, the owner value, and a
/// length-prefixed variable vector.
#[derive(Debug, Clone)]
pub struct FunctionMessageData {
    /// A trailing unknown byte, preserved verbatim.
    pub unknown: u8,
    /// Name of the script the call is dispatched against.
    pub script_name: TString,
    /// Name of the event or function being invoked.
    pub event_name: TString,
    /// The value the call is dispatched against.
    pub owner: Variable,
    /// The call's variable vector, in declaration order.
    pub variables: Vec<Variable>,
}

/// A Papyrus call stack parked between sessions, independent of any
/// `ActiveScript` (spec §3 "Suspended stack"). The graph owns two such
/// EID-keyed maps (the wire layout's `suspended_stacks_1`/`_2`), which are
/// semantically unioned when resolving a thread's suspension state — which
/// map a given stack came from does not otherwise affect its semantics.
#[derive(Debug, Clone)]
pub struct SuspendedStack {
    /// The element identifier this stack is parked under.
    pub id: Eid,
    /// Flag byte gating `data`.
    pub flag: u8,
    /// Present iff `flag != 0`.
    pub data: Option<FunctionMessageData>,
}

/// A script instance queued for destruction once its owning thread finishes
/// unwinding (spec §3 "Queued unbind"). Spec §9 demotes an unresolved
/// `instance_id` to a `Warning` rather than a fatal error: saves with a
/// dangling queued unbind load and audit cleanly.
#[derive(Debug, Clone, Copy)]
pub struct QueuedUnbind {
    /// The script instance queued for destruction.
    pub instance_id: Eid,
    /// A trailing 32-bit field, preserved verbatim.
    pub unknown: u32,
}

impl QueuedUnbind {
    /// True iff `instance_id` resolves under `is_known_instance`.
    pub fn resolves(&self, is_known_instance: impl Fn(Eid) -> bool) -> bool {
        is_known_instance(self.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_unbind_resolves_against_known_instances() {
        let known = Eid::from_raw(5);
        let unbind = QueuedUnbind { instance_id: known, unknown: 0 };
        assert!(unbind.resolves(|id| id == known));
        assert!(!unbind.resolves(|id| id == Eid::from_raw(6)));
    }

    #[test]
    fn function_message_target_presence_follows_flag() {
        assert!(FunctionMessage::carries_target(0));
        assert!(FunctionMessage::carries_target(2));
        assert!(!FunctionMessage::carries_target(3));
    }
}
