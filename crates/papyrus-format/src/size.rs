//! Independent size calculation — spec §4.4 "the re-encoder asserts that
//! `bytes_written == calculate_size()` at the top level and for every
//! sub-component that exposes a size; mismatch is a bug, not a data error".
//!
//! Every function here derives a byte count from field shapes alone, the
//! same way `encode` derives bytes from field values — the two walk the
//! graph in the same order but never share code, so `write(graph).len() ==
//! calculate_size(graph)` is an actual cross-check rather than a tautology.

use indexmap::IndexMap;

use crate::classes::{Script, Struct};
use crate::context::EssContext;
use crate::eid::Eid;
use crate::instances::{DefinedInstance, InstanceData};
use crate::messages::{FunctionMessage, FunctionMessageData, SuspendedStack};
use crate::strings::StringTable;
use crate::threads::{ActiveScriptData, FragmentTask, OpcodeInstruction, Parameter, StackFrame};
use crate::value::{MemberDescriptor, Variable};
use crate::Papyrus;

/// Computes the exact byte size `encode::write` would produce for `graph`
/// under `ctx`, without writing any bytes.
pub fn calculate_size(graph: &Papyrus, ctx: &EssContext) -> usize {
    let eid_size = ctx.eid_width().byte_size();
    let strings = &graph.strings;

    let mut total = 2; // header
    total += strings.encoded_size();

    total += 4; // script_count
    if ctx.has_structs() {
        total += 4; // struct_count
    }
    for script in graph.scripts.values() {
        total += size_script(strings, script);
    }
    if ctx.has_structs() {
        for s in graph.structs.values() {
            total += size_struct(strings, s);
        }
    }

    total += size_preamble_map(strings, eid_size, &graph.script_instances);
    total += size_preamble_map(strings, eid_size, &graph.references);
    if ctx.has_structs() {
        total += size_preamble_map(strings, eid_size, &graph.struct_instances);
    }

    total += 4; // arrays count
    for array in graph.arrays.values() {
        total += eid_size + 1; // id + element type tag
        if let Some(name) = &array.element_class_name {
            total += strings.index_size(name);
        }
        total += 4; // declared_length
    }

    total += eid_size; // papyrus_runtime

    total += 4; // active_scripts count
    total += graph.active_scripts.len() * (eid_size + 1);

    total += size_instance_blobs(strings, eid_size, &graph.script_instances);
    total += size_instance_blobs(strings, eid_size, &graph.references);
    if ctx.has_structs() {
        total += size_instance_blobs(strings, eid_size, &graph.struct_instances);
    }
    for array in graph.arrays.values() {
        total += eid_size;
        if let Some(data) = &array.data {
            total += data.iter().map(|v| size_variable(strings, eid_size, v)).sum::<usize>();
        }
    }
    for script in graph.active_scripts.values() {
        total += eid_size;
        if let Some(data) = &script.data {
            total += size_active_script_data(strings, ctx, data);
        }
    }

    total += 4; // function_messages count
    for msg in &graph.function_messages {
        total += size_function_message(strings, eid_size, msg);
    }

    total += size_suspended_stacks(strings, eid_size, &graph.suspended_stacks_1);
    total += size_suspended_stacks(strings, eid_size, &graph.suspended_stacks_2);

    total += 4; // unk1
    if graph.unk1 != 0 {
        total += 4; // unk2
    }
    total += 4 + graph.unknown_ids.len() * eid_size;

    total += 4 + graph.unbinds.len() * (eid_size + 4);

    if ctx.has_save_file_version_trailer() {
        total += 2;
    }

    total += graph.arrays_trailer.len();

    total
}

fn size_members(strings: &StringTable, members: &[MemberDescriptor]) -> usize {
    4 + members.iter().map(|m| strings.index_size(&m.name) + strings.index_size(&m.type_name)).sum::<usize>()
}

fn size_script(strings: &StringTable, script: &Script) -> usize {
    strings.index_size(&script.name) + strings.index_size(&script.parent_name) + size_members(strings, &script.members)
}

fn size_struct(strings: &StringTable, s: &Struct) -> usize {
    strings.index_size(&s.name) + size_members(strings, &s.members)
}

fn size_preamble_map<T: DefinedInstance>(strings: &StringTable, eid_size: usize, map: &IndexMap<Eid, T>) -> usize {
    let mut total = 4;
    for instance in map.values() {
        let preamble = instance.preamble();
        total += eid_size + strings.index_size(&preamble.class_name) + 2 + 4 + 1;
        if preamble.fo4_conditional_byte.is_some() {
            total += 1;
        }
    }
    total
}

fn size_instance_data(strings: &StringTable, eid_size: usize, data: &InstanceData) -> usize {
    1 + strings.index_size(&data.state)
        + 4
        + 4
        + 4
        + data.variables.iter().map(|v| size_variable(strings, eid_size, v)).sum::<usize>()
}

fn size_instance_blobs<T: DefinedInstance>(strings: &StringTable, eid_size: usize, map: &IndexMap<Eid, T>) -> usize {
    let mut total = 0;
    for instance in map.values() {
        total += eid_size;
        if let Some(data) = instance.data() {
            total += size_instance_data(strings, eid_size, data);
        }
    }
    total
}

fn size_variable(strings: &StringTable, eid_size: usize, v: &Variable) -> usize {
    1 + match v {
        Variable::Null => 0,
        Variable::Integer(_) => 4,
        Variable::Float(_) => 4,
        Variable::Boolean(_) => 1,
        Variable::String(s) => strings.index_size(s),
        Variable::Ref { class_name, .. } | Variable::Struct { class_name, .. } => strings.index_size(class_name) + eid_size,
        Variable::Array { class_name, .. } => class_name.as_ref().map_or(0, |n| strings.index_size(n)) + eid_size,
        Variable::Variant(inner) => size_variable(strings, eid_size, inner),
    }
}

fn size_fragment_task(task: &FragmentTask) -> usize {
    1 + match task {
        FragmentTask::QuestStage { .. } => 8,
        FragmentTask::ScenePhaseResults { .. } => 4,
        FragmentTask::SceneActionResults { .. } => 8,
        FragmentTask::SceneResults => 0,
        FragmentTask::TerminalRunResults { .. } => 4,
        FragmentTask::TopicInfo { .. } => 4,
        FragmentTask::Type2 { .. } => 4,
    }
}

fn size_opcode(strings: &StringTable, instr: &OpcodeInstruction) -> usize {
    1 + instr.params.iter().map(|p| size_parameter(strings, p)).sum::<usize>()
}

fn size_parameter(strings: &StringTable, p: &Parameter) -> usize {
    1 + match p {
        Parameter::Null => 0,
        Parameter::Identifier(s) | Parameter::String(s) => strings.index_size(s),
        Parameter::Integer(_) => 4,
        Parameter::Float(_) => 4,
        Parameter::Boolean(_) => 1,
        Parameter::Unknown8(_) => 1,
        Parameter::Term(_) => 0,
    }
}

fn size_stack_frame(strings: &StringTable, eid_size: usize, frame: &StackFrame) -> usize {
    let mut total = 4 // variable count
        + 1 // flags
        + 1 // function type
        + strings.index_size(&frame.script_name)
        + strings.index_size(&frame.base_name)
        + strings.index_size(&frame.event_name);
    if let Some(status) = &frame.status {
        total += strings.index_size(status);
    }
    total += 1 + 1; // opcode version
    total += strings.index_size(&frame.return_type);
    total += strings.index_size(&frame.docstring);
    total += 4; // user flags
    total += 1; // function flags

    total += 2 + frame.params.iter().map(|p| strings.index_size(&p.name) + strings.index_size(&p.type_name)).sum::<usize>();
    total += 2 + frame.locals.iter().map(|l| strings.index_size(&l.name) + strings.index_size(&l.type_name)).sum::<usize>();

    total += 2 + frame.opcodes.iter().map(|op| size_opcode(strings, op)).sum::<usize>();

    total += 4; // instruction pointer
    total += size_variable(strings, eid_size, &frame.owner);
    total += frame.variables.iter().map(|v| size_variable(strings, eid_size, v)).sum::<usize>();

    total
}

fn size_active_script_data(strings: &StringTable, ctx: &EssContext, data: &ActiveScriptData) -> usize {
    let eid_size = ctx.eid_width().byte_size();
    let mut total = 1 + 1; // version
    total += size_variable(strings, eid_size, &data.owner);
    total += 1 + 1; // flags + unknown

    if let Some(task) = &data.fragment_task {
        total += size_fragment_task(task);
    }
    if data.attached.is_some() {
        total += ctx.eid_width().byte_size();
    }

    total += 2 + data.frames.iter().map(|f| size_stack_frame(strings, eid_size, f)).sum::<usize>();
    if data.trailing_byte.is_some() {
        total += 1;
    }
    total
}

fn size_function_message_data(strings: &StringTable, eid_size: usize, data: &FunctionMessageData) -> usize {
    1 + strings.index_size(&data.script_name)
        + strings.index_size(&data.event_name)
        + size_variable(strings, eid_size, &data.owner)
        + 4
        + data.variables.iter().map(|v| size_variable(strings, eid_size, v)).sum::<usize>()
}

fn size_function_message(strings: &StringTable, eid_size: usize, msg: &FunctionMessage) -> usize {
    let mut total = 1; // flag
    if msg.target.is_some() {
        total += eid_size;
    }
    total += 1; // flag_set
    if let Some(data) = &msg.data {
        total += size_function_message_data(strings, eid_size, data);
    }
    total
}

fn size_suspended_stacks(strings: &StringTable, eid_size: usize, map: &IndexMap<Eid, SuspendedStack>) -> usize {
    let mut total = 4;
    for stack in map.values() {
        total += eid_size + 1;
        if let Some(data) = &stack.data {
            total += size_function_message_data(strings, eid_size, data);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GameVariant;
    use crate::encode;

    #[test]
    fn empty_graph_size_matches_encoded_length() {
        let ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        let graph = Papyrus::empty();
        let bytes = encode::write(&graph, &ctx).unwrap();
        assert_eq!(calculate_size(&graph, &ctx), bytes.len());
    }

    #[test]
    fn fallout4_empty_graph_size_matches_encoded_length() {
        let ctx = EssContext::inert(GameVariant::Fallout4, true, true);
        let graph = Papyrus::empty();
        let bytes = encode::write(&graph, &ctx).unwrap();
        assert_eq!(calculate_size(&graph, &ctx), bytes.len());
    }
}
