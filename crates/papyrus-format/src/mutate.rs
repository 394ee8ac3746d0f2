//! Host-invoked graph mutations — spec §4.7. Never run during decode;
//! each operation leaves the graph re-encodable and the caller is
//! responsible for discarding any cross-reference index built before it.

use crate::eid::Eid;
use crate::instances::DefinedInstance;
use crate::threads::OpcodeInstruction;
use crate::Papyrus;

/// What one mutation actually changed, for the caller's own logging or
/// undo bookkeeping. Every field defaults empty when a mutation had no
/// effect on an already-clean graph.
#[derive(Debug, Clone, Default)]
pub struct MutationReport {
    /// Element identifiers of instances removed from the graph.
    pub removed_instances: Vec<Eid>,
    /// Element identifiers of queued unbinds removed as a cascade of
    /// removing the instance they targeted.
    pub removed_unbinds: Vec<Eid>,
    /// Element identifiers of elements (instances/references) removed for
    /// carrying an unresolved class.
    pub removed_elements: Vec<Eid>,
    /// Element identifiers of active scripts zeroed for carrying an
    /// unresolved owner class.
    pub zeroed_threads: Vec<Eid>,
    /// Element identifiers of active scripts terminated (every opcode
    /// replaced with the NOP sentinel).
    pub terminated_threads: Vec<Eid>,
}

/// Removes every `ScriptInstance` whose `RefID` is zero, cascading to any
/// queued unbind that targeted one of the removed instances.
pub fn remove_unattached_instances(graph: &mut Papyrus) -> MutationReport {
    let mut report = MutationReport::default();

    let unattached: Vec<Eid> =
        graph.script_instances.iter().filter(|(_, instance)| instance.is_unattached()).map(|(id, _)| *id).collect();

    for id in &unattached {
        graph.script_instances.shift_remove(id);
        report.removed_instances.push(*id);
    }

    let cascaded: Vec<Eid> = graph.unbinds.keys().copied().filter(|id| unattached.contains(id)).collect();
    for id in &cascaded {
        graph.unbinds.shift_remove(id);
        report.removed_unbinds.push(*id);
    }

    report
}

/// Removes every script/struct instance and reference whose class did not
/// resolve, then zeroes every active script whose owner's class is itself
/// unresolved and whose thread has not already been terminated.
pub fn remove_undefined_elements(graph: &mut Papyrus) -> MutationReport {
    let mut report = MutationReport::default();

    let undefined_instances: Vec<Eid> =
        graph.script_instances.iter().filter(|(_, i)| i.is_undefined()).map(|(id, _)| *id).collect();
    for id in &undefined_instances {
        graph.script_instances.shift_remove(id);
        report.removed_elements.push(*id);
    }

    let undefined_struct_instances: Vec<Eid> =
        graph.struct_instances.iter().filter(|(_, i)| i.is_undefined()).map(|(id, _)| *id).collect();
    for id in &undefined_struct_instances {
        graph.struct_instances.shift_remove(id);
        report.removed_elements.push(*id);
    }

    let undefined_references: Vec<Eid> =
        graph.references.iter().filter(|(_, r)| r.is_undefined()).map(|(id, _)| *id).collect();
    for id in &undefined_references {
        graph.references.shift_remove(id);
        report.removed_elements.push(*id);
    }

    let to_zero: Vec<Eid> = graph
        .active_scripts
        .iter()
        .filter(|(_, script)| owner_class_is_unresolved(graph, script.owner.as_ref()) && !is_terminated(script))
        .map(|(id, _)| *id)
        .collect();
    for id in &to_zero {
        if let Some(script) = graph.active_scripts.get_mut(id) {
            script.owner = None;
            script.data = None;
        }
        report.zeroed_threads.push(*id);
    }

    report
}

fn owner_class_is_unresolved(graph: &Papyrus, owner: Option<&crate::value::Variable>) -> bool {
    use crate::value::Variable;
    match owner {
        Some(Variable::Ref { class_name, .. }) | Some(Variable::Struct { class_name, .. }) => {
            !graph.scripts.contains_key(class_name) && !graph.structs.contains_key(class_name)
        }
        _ => false,
    }
}

fn is_terminated(script: &crate::threads::ActiveScript) -> bool {
    match &script.data {
        None => true,
        Some(data) => data.frames.iter().all(|frame| frame.opcodes.iter().all(|op| op.opcode == crate::threads::OpcodeKind::Nop)),
    }
}

/// Replaces every opcode of every frame belonging to `thread_ids` with the
/// shared NOP sentinel, leaving frame metadata (names, params, locals,
/// variables) untouched.
pub fn terminate_undefined_threads(graph: &mut Papyrus, thread_ids: &[Eid]) -> MutationReport {
    let mut report = MutationReport::default();

    for id in thread_ids {
        if let Some(script) = graph.active_scripts.get_mut(id) {
            if let Some(data) = &mut script.data {
                for frame in &mut data.frames {
                    for op in &mut frame.opcodes {
                        *op = OpcodeInstruction::nop_sentinel();
                    }
                }
                report.terminated_threads.push(*id);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instances::{InstancePreamble, ScriptInstance};
    use crate::strings::{IndexWidth, StringTable};

    #[test]
    fn unattached_instances_are_removed_and_unbinds_cascade() {
        let mut graph = Papyrus::empty();
        let mut table = StringTable::new(IndexWidth::Wide);
        let id = Eid::from_raw(5);
        graph.script_instances.insert(
            id,
            ScriptInstance {
                preamble: InstancePreamble {
                    id,
                    class_name: table.intern("Quest01"),
                    unknown16: 0,
                    ref_id: 0,
                    unknown8: 0,
                    fo4_conditional_byte: None,
                },
                data: None,
                resolved_class: None,
            },
        );
        graph.unbinds.insert(id, crate::messages::QueuedUnbind { instance_id: id, unknown: 0 });

        let report = remove_unattached_instances(&mut graph);
        assert_eq!(report.removed_instances, vec![id]);
        assert_eq!(report.removed_unbinds, vec![id]);
        assert!(graph.script_instances.is_empty());
        assert!(graph.unbinds.is_empty());
    }

    #[test]
    fn terminate_undefined_threads_nops_every_opcode() {
        use crate::threads::{ActiveScript, ActiveScriptData, OpcodeKind};
        use crate::value::Variable;

        let id = Eid::from_raw(9);
        let mut table = StringTable::new(IndexWidth::Wide);
        let frame = crate::threads::StackFrame {
            flags: 0,
            function_type: crate::value::TypeTag::Null,
            script_name: table.intern("S"),
            base_name: table.intern("S"),
            event_name: table.intern("E"),
            status: None,
            opcode_version_major: 1,
            opcode_version_minor: 0,
            return_type: table.intern(""),
            docstring: table.intern(""),
            user_flags: 0,
            function_flags: 0,
            params: vec![],
            locals: vec![],
            opcodes: vec![OpcodeInstruction { opcode: OpcodeKind::IAdd, params: vec![] }],
            instruction_pointer: 0,
            owner: Variable::Null,
            variables: vec![],
        };
        let mut graph = Papyrus::empty();
        graph.active_scripts.insert(
            id,
            ActiveScript {
                id,
                kind: 0,
                data: Some(ActiveScriptData {
                    version_major: 1,
                    version_minor: 0,
                    owner: Variable::Null,
                    flags: 0,
                    unknown: 0,
                    fragment_task: None,
                    attached: None,
                    frames: vec![frame],
                    trailing_byte: None,
                }),
                owner: None,
                suspended_stack: None,
            },
        );

        let report = terminate_undefined_threads(&mut graph, &[id]);
        assert_eq!(report.terminated_threads, vec![id]);
        let data = graph.active_scripts.get(&id).unwrap().data.as_ref().unwrap();
        assert!(data.frames[0].opcodes.iter().all(|op| op.opcode == OpcodeKind::Nop));
    }
}
