//! The mirror re-encoder — spec §4.4: the exact read order of `decode`,
//! reversed into the exact write order, with the same length-prefix widths
//! and the same Skyrim-only trailing version word.

use indexmap::IndexMap;
use papyrus_codec::Writer;

use crate::classes::{Script, Struct};
use crate::context::EssContext;
use crate::eid::Eid;
use crate::error::{DecodeResult, FormatError};
use crate::instances::{DefinedInstance, InstanceData};
use crate::messages::{FunctionMessage, FunctionMessageData, SuspendedStack};
use crate::strings::StringTable;
use crate::threads::{ActiveScriptData, FragmentTask, OpcodeInstruction, Parameter, StackFrame};
use crate::value::{MemberDescriptor, Variable};
use crate::Papyrus;

/// Re-encodes `graph` back to its binary layout. The arrays trailer is
/// written back verbatim rather than re-derived from `other_data` — only
/// the slots a decoder actually understood are ever mutated in place, and
/// `other_data` itself carries no write path for that reason.
pub fn write(graph: &Papyrus, ctx: &EssContext) -> DecodeResult<Vec<u8>> {
    if graph.strings.string_table_bug {
        return Err(FormatError::new("string table", "string-table bug: re-encode refused").into());
    }

    let mut w = Writer::new();

    w.write_u16(graph.header);
    graph.strings.encode(&mut w);

    w.write_u32(graph.scripts.len() as u32);
    for script in graph.scripts.values() {
        encode_script(&mut w, &graph.strings, script);
    }

    if ctx.has_structs() {
        w.write_u32(graph.structs.len() as u32);
        for s in graph.structs.values() {
            encode_struct(&mut w, &graph.strings, s);
        }
    }

    encode_preamble_map(&mut w, ctx, &graph.strings, &graph.script_instances);
    encode_preamble_map(&mut w, ctx, &graph.strings, &graph.references);
    if ctx.has_structs() {
        encode_preamble_map(&mut w, ctx, &graph.strings, &graph.struct_instances);
    }

    w.write_u32(graph.arrays.len() as u32);
    for array in graph.arrays.values() {
        w.write_eid_raw(array.id.raw(), ctx.eid_width());
        w.write_u8(array.element_type.ordinal());
        if let Some(name) = &array.element_class_name {
            graph.strings.write_index(&mut w, name);
        }
        w.write_u32(array.declared_length);
    }

    w.write_eid_raw(graph.papyrus_runtime.raw(), ctx.eid_width());

    w.write_u32(graph.active_scripts.len() as u32);
    for script in graph.active_scripts.values() {
        w.write_eid_raw(script.id.raw(), ctx.eid_width());
        w.write_u8(script.kind);
    }

    encode_instance_blobs(&mut w, ctx, &graph.strings, &graph.script_instances);
    encode_instance_blobs(&mut w, ctx, &graph.strings, &graph.references);
    if ctx.has_structs() {
        encode_instance_blobs(&mut w, ctx, &graph.strings, &graph.struct_instances);
    }
    for array in graph.arrays.values() {
        w.write_eid_raw(array.id.raw(), ctx.eid_width());
        if let Some(data) = &array.data {
            for v in data {
                encode_variable(&mut w, ctx, &graph.strings, v);
            }
        }
    }
    for script in graph.active_scripts.values() {
        w.write_eid_raw(script.id.raw(), ctx.eid_width());
        if let Some(data) = &script.data {
            encode_active_script_data(&mut w, ctx, &graph.strings, data);
        }
    }

    w.write_u32(graph.function_messages.len() as u32);
    for msg in &graph.function_messages {
        encode_function_message(&mut w, ctx, &graph.strings, msg);
    }

    encode_suspended_stacks(&mut w, ctx, &graph.strings, &graph.suspended_stacks_1);
    encode_suspended_stacks(&mut w, ctx, &graph.strings, &graph.suspended_stacks_2);

    w.write_u32(graph.unk1);
    if graph.unk1 != 0 {
        w.write_u32(graph.unk2.unwrap_or(0));
    }
    w.write_u32(graph.unknown_ids.len() as u32);
    for id in &graph.unknown_ids {
        w.write_eid_raw(id.raw(), ctx.eid_width());
    }

    w.write_u32(graph.unbinds.len() as u32);
    for unbind in graph.unbinds.values() {
        w.write_eid_raw(unbind.instance_id.raw(), ctx.eid_width());
        w.write_u32(unbind.unknown);
    }

    if ctx.has_save_file_version_trailer() {
        w.write_u16(graph.save_file_version.unwrap_or(0));
    }

    w.write_bytes(&graph.arrays_trailer);

    let bytes = w.into_vec();
    debug_assert_eq!(
        bytes.len(),
        crate::size::calculate_size(graph, ctx),
        "bytes_written must equal calculate_size() (spec §4.4); a mismatch is a bug, not a data error"
    );
    Ok(bytes)
}

fn encode_members(w: &mut Writer, strings: &StringTable, members: &[MemberDescriptor]) {
    w.write_u32(members.len() as u32);
    for m in members {
        strings.write_index(w, &m.name);
        strings.write_index(w, &m.type_name);
    }
}

fn encode_script(w: &mut Writer, strings: &StringTable, script: &Script) {
    strings.write_index(w, &script.name);
    strings.write_index(w, &script.parent_name);
    encode_members(w, strings, &script.members);
}

fn encode_struct(w: &mut Writer, strings: &StringTable, s: &Struct) {
    strings.write_index(w, &s.name);
    encode_members(w, strings, &s.members);
}

fn encode_preamble_map<T: DefinedInstance>(w: &mut Writer, ctx: &EssContext, strings: &StringTable, map: &IndexMap<Eid, T>) {
    w.write_u32(map.len() as u32);
    for (id, instance) in map {
        let preamble = instance.preamble();
        w.write_eid_raw(id.raw(), ctx.eid_width());
        strings.write_index(w, &preamble.class_name);
        w.write_u16(preamble.unknown16);
        w.write_u32(preamble.ref_id);
        w.write_u8(preamble.unknown8);
        if let Some(b) = preamble.fo4_conditional_byte {
            w.write_u8(b);
        }
    }
}

fn encode_instance_blobs<T: DefinedInstance>(w: &mut Writer, ctx: &EssContext, strings: &StringTable, map: &IndexMap<Eid, T>) {
    for (id, instance) in map {
        w.write_eid_raw(id.raw(), ctx.eid_width());
        if let Some(data) = instance.data() {
            encode_instance_data(w, ctx, strings, data);
        }
    }
}

fn encode_instance_data(w: &mut Writer, ctx: &EssContext, strings: &StringTable, data: &InstanceData) {
    w.write_u8(data.flags);
    strings.write_index(w, &data.state);
    w.write_i32(data.unknown1);
    w.write_i32(data.unknown2);
    w.write_u32(data.variables.len() as u32);
    for v in &data.variables {
        encode_variable(w, ctx, strings, v);
    }
}

fn encode_variable(w: &mut Writer, ctx: &EssContext, strings: &StringTable, v: &Variable) {
    w.write_u8(v.tag().ordinal());
    match v {
        Variable::Null => {}
        Variable::Integer(n) => w.write_i32(*n),
        Variable::Float(f) => w.write_f32(*f),
        Variable::Boolean(b) => w.write_bool(*b),
        Variable::String(s) => strings.write_index(w, s),
        Variable::Ref { class_name, target } => {
            strings.write_index(w, class_name);
            w.write_eid_raw(target.raw(), ctx.eid_width());
        }
        Variable::Struct { class_name, target } => {
            strings.write_index(w, class_name);
            w.write_eid_raw(target.raw(), ctx.eid_width());
        }
        Variable::Array { element_type, class_name, target } => {
            if let Some(name) = class_name {
                let _ = element_type;
                strings.write_index(w, name);
            }
            w.write_eid_raw(target.raw(), ctx.eid_width());
        }
        Variable::Variant(inner) => encode_variable(w, ctx, strings, inner),
    }
}

fn encode_active_script_data(w: &mut Writer, ctx: &EssContext, strings: &StringTable, data: &ActiveScriptData) {
    w.write_u8(data.version_major);
    w.write_u8(data.version_minor);
    encode_variable(w, ctx, strings, &data.owner);
    w.write_u8(data.flags);
    w.write_u8(data.unknown);

    if let Some(task) = &data.fragment_task {
        encode_fragment_task(w, task);
    }
    if let Some(attached) = &data.attached {
        w.write_eid_raw(attached.raw(), ctx.eid_width());
    }

    w.write_u16(data.frames.len() as u16);
    for frame in &data.frames {
        encode_stack_frame(w, ctx, strings, frame);
    }
    if let Some(b) = data.trailing_byte {
        w.write_u8(b);
    }
}

fn encode_fragment_task(w: &mut Writer, task: &FragmentTask) {
    w.write_u8(task.discriminant());
    match task {
        FragmentTask::QuestStage { stage, fragment_index } => {
            w.write_i32(*stage);
            w.write_i32(*fragment_index);
        }
        FragmentTask::ScenePhaseResults { phase } => w.write_i32(*phase),
        FragmentTask::SceneActionResults { action_index, actor_index } => {
            w.write_i32(*action_index);
            w.write_i32(*actor_index);
        }
        FragmentTask::SceneResults => {}
        FragmentTask::TerminalRunResults { entry_index } => w.write_i32(*entry_index),
        FragmentTask::TopicInfo { response_index } => w.write_i32(*response_index),
        FragmentTask::Type2 { value } => w.write_i32(*value),
    }
}

fn encode_stack_frame(w: &mut Writer, ctx: &EssContext, strings: &StringTable, frame: &StackFrame) {
    w.write_u32(frame.variables.len() as u32);
    w.write_u8(frame.flags);
    w.write_u8(frame.function_type.ordinal());
    strings.write_index(w, &frame.script_name);
    strings.write_index(w, &frame.base_name);
    strings.write_index(w, &frame.event_name);
    if let Some(status) = &frame.status {
        strings.write_index(w, status);
    }
    w.write_u8(frame.opcode_version_major);
    w.write_u8(frame.opcode_version_minor);
    strings.write_index(w, &frame.return_type);
    strings.write_index(w, &frame.docstring);
    w.write_u32(frame.user_flags);
    w.write_u8(frame.function_flags);

    w.write_u16(frame.params.len() as u16);
    for p in &frame.params {
        strings.write_index(w, &p.name);
        strings.write_index(w, &p.type_name);
    }
    w.write_u16(frame.locals.len() as u16);
    for l in &frame.locals {
        strings.write_index(w, &l.name);
        strings.write_index(w, &l.type_name);
    }

    w.write_u16(frame.opcodes.len() as u16);
    for op in &frame.opcodes {
        encode_opcode(w, strings, op);
    }

    w.write_u32(frame.instruction_pointer);
    encode_variable(w, ctx, strings, &frame.owner);
    for v in &frame.variables {
        encode_variable(w, ctx, strings, v);
    }
}

fn encode_opcode(w: &mut Writer, strings: &StringTable, instr: &OpcodeInstruction) {
    w.write_u8(instr.opcode as u8);
    for p in &instr.params {
        encode_parameter(w, strings, p);
    }
}

fn encode_parameter(w: &mut Writer, strings: &StringTable, p: &Parameter) {
    let ordinal = p.ordinal().expect("encode never sees a pretty-printing-only Term parameter");
    w.write_u8(ordinal);
    match p {
        Parameter::Null => {}
        Parameter::Identifier(s) | Parameter::String(s) => strings.write_index(w, s),
        Parameter::Integer(n) => w.write_i32(*n),
        Parameter::Float(f) => w.write_f32(*f),
        Parameter::Boolean(b) => w.write_bool(*b),
        Parameter::Unknown8(b) => w.write_u8(*b),
        Parameter::Term(_) => unreachable!("filtered by the ordinal() check above"),
    }
}

fn encode_function_message_data(w: &mut Writer, ctx: &EssContext, strings: &StringTable, data: &FunctionMessageData) {
    w.write_u8(data.unknown);
    strings.write_index(w, &data.script_name);
    strings.write_index(w, &data.event_name);
    encode_variable(w, ctx, strings, &data.owner);
    w.write_u32(data.variables.len() as u32);
    for v in &data.variables {
        encode_variable(w, ctx, strings, v);
    }
}

fn encode_function_message(w: &mut Writer, ctx: &EssContext, strings: &StringTable, msg: &FunctionMessage) {
    w.write_u8(msg.flag);
    if let Some(target) = &msg.target {
        w.write_eid_raw(target.raw(), ctx.eid_width());
    }
    w.write_u8(msg.flag_set);
    if let Some(data) = &msg.data {
        encode_function_message_data(w, ctx, strings, data);
    }
}

fn encode_suspended_stacks(w: &mut Writer, ctx: &EssContext, strings: &StringTable, map: &IndexMap<Eid, SuspendedStack>) {
    w.write_u32(map.len() as u32);
    for stack in map.values() {
        w.write_eid_raw(stack.id.raw(), ctx.eid_width());
        w.write_u8(stack.flag);
        if let Some(data) = &stack.data {
            encode_function_message_data(w, ctx, strings, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GameVariant;

    #[test]
    fn empty_graph_roundtrips_through_parse() {
        let ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        let graph = Papyrus::empty();
        let bytes = write(&graph, &ctx).unwrap();
        let reparsed = Papyrus::parse(&bytes, &ctx);
        assert_eq!(reparsed.header, graph.header);
        assert_eq!(reparsed.scripts.len(), graph.scripts.len());
    }

    #[test]
    fn string_table_bug_refuses_re_encode() {
        let ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        let mut graph = Papyrus::empty();
        graph.strings = StringTable::decode(
            &mut papyrus_codec::Cursor::new(&[0x64, 0x00]),
            crate::strings::IndexWidth::Narrow,
            true,
        )
        .unwrap();
        assert!(graph.strings.string_table_bug);
        assert!(write(&graph, &ctx).is_err());
    }
}
