//! The per-instance canary integer field — spec §4.6 "any script whose
//! per-instance canary integer field `::iPapyrusDataVerification_var`
//! transitioned non-zero → zero".
//!
//! The canary is an ordinary `Int` member like any other; it needs no
//! host-supplied data, only a by-name lookup against the instance's
//! resolved class's extended members.

use indexmap::IndexMap;
use papyrus_format::{DefinedInstance, Eid, Papyrus, Variable};

const CANARY_MEMBER_NAME: &str = "::iPapyrusDataVerification_var";

/// Canary values keyed by `"{script_name}@{instance_id}"`, snapshotted so a
/// later audit run can detect a non-zero-to-zero transition.
pub type CanarySnapshot = IndexMap<String, i32>;

/// Reads every script instance's canary field, if its resolved class
/// declares one.
pub fn snapshot(graph: &Papyrus) -> CanarySnapshot {
    let mut out = CanarySnapshot::new();
    for instance in graph.script_instances.values() {
        if instance.is_undefined() {
            continue;
        }
        let Some(class) = graph.scripts.get(instance.class_name()) else { continue };
        let extended = class.extended_members(&graph.scripts);
        let Some(index) = extended.iter().position(|m| m.name.as_str() == CANARY_MEMBER_NAME) else {
            continue;
        };
        let Some(data) = instance.data() else { continue };
        let Some(value) = data.variables.get(index).and_then(as_integer) else { continue };
        out.insert(key(instance.class_name().as_str(), instance.id()), value);
    }
    out
}

fn key(script: &str, id: Eid) -> String {
    format!("{script}@{id}")
}

fn as_integer(v: &Variable) -> Option<i32> {
    match v {
        Variable::Integer(n) => Some(*n),
        Variable::Variant(inner) => as_integer(inner),
        _ => None,
    }
}

/// Every `(script_name, previous_value)` pair whose canary transitioned
/// non-zero to zero between `previous` and `current`.
pub fn zeroed_transitions(previous: &CanarySnapshot, current: &CanarySnapshot) -> Vec<(String, i32)> {
    let mut out = Vec::new();
    for (key, &prev_value) in previous {
        if prev_value == 0 {
            continue;
        }
        if current.get(key) == Some(&0) {
            let script = key.split('@').next().unwrap_or(key).to_string();
            out.push((script, prev_value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_transitions_finds_only_nonzero_to_zero() {
        let mut prev = CanarySnapshot::new();
        prev.insert("S@1".to_string(), 0x1234);
        prev.insert("S@2".to_string(), 0);
        let mut cur = CanarySnapshot::new();
        cur.insert("S@1".to_string(), 0);
        cur.insert("S@2".to_string(), 0);

        let found = zeroed_transitions(&prev, &cur);
        assert_eq!(found, vec![("S".to_string(), 0x1234)]);
    }
}
