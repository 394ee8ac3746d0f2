//! The object-graph decode recipe — spec §4.3. A fixed, sequential
//! 18-step read: preamble pass, then one data-blob pass over the same
//! handles, then the trailing best-effort sections.

use std::collections::HashSet;

use indexmap::IndexMap;
use papyrus_codec::Cursor;
use tracing::{debug, warn};

use crate::arrays::ArrayInfo;
use crate::classes::{Script, Struct};
use crate::context::{EssContext, GameVariant};
use crate::eid::Eid;
use crate::error::{DecodeError, DecodeResult, ElementError, FormatError, ListError};
use crate::instances::{DefinedInstance, InstanceData, InstancePreamble, Reference, ScriptInstance, StructInstance};
use crate::messages::{FunctionMessage, FunctionMessageData, QueuedUnbind, SuspendedStack};
use crate::other_data::{GeneralElement, OtherData, OtherDataEntry, SLOT_COUNT};
use crate::strings::{IndexWidth, StringTable, TString};
use crate::threads::{ActiveScript, ActiveScriptData, FragmentTask, OpcodeInstruction, OpcodeKind, Parameter, StackFrame};
use crate::value::{MemberDescriptor, TypeTag, Variable};
use crate::Papyrus;

const STRING_TABLE_BUG_COUNT: u16 = 100;
const MAX_STACK_VARIABLES: u32 = 50_000;
const MAX_PARAM_COUNT: u16 = 2047;
const MAX_LOCAL_COUNT: u16 = 2047;

/// Parses a full Papyrus VM-state block. Always returns a graph, even when
/// decoding stops early: the returned value's `truncated`/`broken` flags and
/// partially-populated collections are what the auditor inspects (spec §4.3,
/// §7 "always returns a partial graph").
pub fn parse(bytes: &[u8], ctx: &EssContext) -> Papyrus {
    let mut cursor = Cursor::new(bytes);
    let mut graph = Papyrus::empty();

    match decode_steps(&mut cursor, ctx, &mut graph) {
        Ok(()) => {}
        Err(DecodeError::Truncated(_)) => {
            graph.truncated = true;
        }
        Err(DecodeError::Format(_)) => {
            graph.broken = true;
        }
    }

    graph
}

/// Wraps a per-element decode failure as a `ListError` (so its `Display`
/// carries the index/count context into the log) and returns the
/// underlying cause so the surrounding step can keep propagating a plain
/// `DecodeError` — the partial collection is logged but not retained past
/// this point since the enclosing `Papyrus` graph already carries its own
/// partial state for the auditor to inspect.
fn list_err<T>(index: usize, count: usize, cause: DecodeError, partial: Vec<T>) -> DecodeError {
    let wrapped = ListError { index, count, cause: Box::new(cause), partial };
    warn!(target: "papyrus_format::decode", "{wrapped}");
    *wrapped.cause
}

/// Same role as `list_err` for single-node failures.
fn element_err<T>(element: String, cause: DecodeError, partial: Option<T>) -> DecodeError {
    let wrapped = ElementError { element, cause: Box::new(cause), partial };
    warn!(target: "papyrus_format::decode", "{wrapped}");
    *wrapped.cause
}

fn decode_steps(cursor: &mut Cursor<'_>, ctx: &EssContext, graph: &mut Papyrus) -> DecodeResult<()> {
    // 1. header
    graph.header = cursor.read_u16("header")?;
    debug!(target: "papyrus_format::decode", step = "header", value = graph.header);

    // 2. string table — the only step that builds the table; every later
    // step only resolves indices against the now-frozen table. The known
    // Skyrim string-table-bug (count==100 under the narrow width) must be
    // detected before the real read consumes the count, hence the peek on
    // a cloned cursor.
    let force_string_table_bug = ctx.string_index_width() == IndexWidth::Narrow
        && ctx.game_variant == GameVariant::Skyrim
        && cursor.clone().read_u16("string table count peek").map(|n| n == STRING_TABLE_BUG_COUNT).unwrap_or(false);
    graph.strings = StringTable::decode(cursor, ctx.string_index_width(), force_string_table_bug)?;
    debug!(target: "papyrus_format::decode", step = "strings", count = graph.strings.len());

    // 3. counts
    let script_count = cursor.read_u32("script_count")?;
    let struct_count = if ctx.has_structs() { cursor.read_u32("struct_count")? } else { 0 };

    // 4. scripts
    graph.scripts = decode_scripts(cursor, &graph.strings, script_count)?;
    resolve_script_parents(&mut graph.scripts);
    debug!(target: "papyrus_format::decode", step = "scripts", count = graph.scripts.len());

    // 5. structs (FO4 only)
    if ctx.has_structs() {
        graph.structs = decode_structs(cursor, &graph.strings, struct_count)?;
        debug!(target: "papyrus_format::decode", step = "structs", count = graph.structs.len());
    }

    // 6. script_instances preamble
    graph.script_instances = decode_preamble_map(cursor, ctx, &graph.strings, "script_instances", |preamble| ScriptInstance {
        preamble,
        data: None,
        resolved_class: None,
    })?;

    // 7. references preamble
    graph.references = decode_preamble_map(cursor, ctx, &graph.strings, "references", |preamble| Reference {
        preamble,
        data: None,
        resolved_class: None,
    })?;

    // 8. struct_instances preamble (FO4 only)
    if ctx.has_structs() {
        graph.struct_instances = decode_preamble_map(cursor, ctx, &graph.strings, "struct_instances", |preamble| StructInstance {
            preamble,
            data: None,
            resolved_class: None,
        })?;
    }

    // Resolve every instance's class name against the now-fully-loaded
    // `scripts`/`structs` tables. Must run after both class tables and all
    // three preamble maps are in place, and before anything consults
    // `is_undefined()` (the auditor, the mutation contracts of §4.7).
    resolve_instance_classes(&mut graph.script_instances, &graph.scripts);
    resolve_instance_classes(&mut graph.references, &graph.scripts);
    if ctx.has_structs() {
        resolve_instance_classes(&mut graph.struct_instances, &graph.structs);
    }

    // 9. arrays
    graph.arrays = decode_arrays(cursor, ctx, &graph.strings)?;
    debug!(target: "papyrus_format::decode", step = "arrays", count = graph.arrays.len());

    // 10. papyrus_runtime
    let runtime_raw = cursor.read_eid_raw("papyrus_runtime", ctx.eid_width())?;
    graph.papyrus_runtime = Eid::from_raw(runtime_raw);

    // 11. active_scripts preamble (EID + kind byte)
    let active_count = cursor.read_u32("active_scripts count")?;
    for _ in 0..active_count {
        let raw = cursor.read_eid_raw("active_scripts id", ctx.eid_width())?;
        let kind = cursor.read_u8("active_scripts kind")?;
        let id = Eid::from_raw(raw);
        graph.active_scripts.insert(id, ActiveScript { id, kind, data: None, owner: None, suspended_stack: None });
    }
    debug!(target: "papyrus_format::decode", step = "active_scripts.preamble", count = graph.active_scripts.len());

    // 12. data-blob pass, same order as 6-8 then arrays then active_scripts.
    decode_instance_blobs(cursor, ctx, &graph.strings, &mut graph.script_instances)?;
    decode_instance_blobs(cursor, ctx, &graph.strings, &mut graph.references)?;
    if ctx.has_structs() {
        decode_instance_blobs(cursor, ctx, &graph.strings, &mut graph.struct_instances)?;
    }
    decode_array_blobs(cursor, ctx, &graph.strings, &mut graph.arrays)?;
    decode_active_script_blobs(cursor, ctx, &graph.strings, &mut graph.active_scripts)?;
    debug!(target: "papyrus_format::decode", step = "data_blobs.done");

    // 13. function_messages
    graph.function_messages = decode_function_messages(cursor, ctx, &graph.strings)?;

    // 14. two suspended_stacks maps
    graph.suspended_stacks_1 = decode_suspended_stacks(cursor, ctx, &graph.strings)?;
    graph.suspended_stacks_2 = decode_suspended_stacks(cursor, ctx, &graph.strings)?;

    // resolve owners and suspended-stack attachment now that every thread's
    // data blob and both suspended-stack maps are loaded.
    resolve_active_scripts(graph);

    // 15. unk1 / unk2 / unknown_ids
    graph.unk1 = cursor.read_u32("unk1")?;
    graph.unk2 = if graph.unk1 != 0 { Some(cursor.read_u32("unk2")?) } else { None };
    let unknown_id_count = cursor.read_u32("unknown_ids count")?;
    for _ in 0..unknown_id_count {
        let raw = cursor.read_eid_raw("unknown_ids entry", ctx.eid_width())?;
        graph.unknown_ids.push(Eid::from_raw(raw));
    }

    // 16. unbinds
    graph.unbinds = decode_unbinds(cursor, ctx)?;

    // 17. Skyrim-only trailing save-file-version
    if ctx.has_save_file_version_trailer() {
        graph.save_file_version = Some(cursor.read_u16("save_file_version")?);
    }

    // 18. remainder: opaque trailer, best-effort reparsed into OtherData.
    let remainder = cursor.read_bytes("arrays trailer", cursor.remaining())?;
    graph.arrays_trailer = remainder.to_vec();
    graph.other_data = decode_other_data(&graph.arrays_trailer);

    Ok(())
}

fn resolve(strings: &StringTable, idx: u32, where_: &'static str) -> DecodeResult<TString> {
    strings.get(idx).ok_or_else(|| FormatError::new(where_, format!("string index {idx} out of range")).into())
}

fn read_interned(cursor: &mut Cursor<'_>, strings: &StringTable, where_: &'static str) -> DecodeResult<TString> {
    let idx = strings.read_index(cursor)?;
    resolve(strings, idx, where_)
}

fn decode_scripts(cursor: &mut Cursor<'_>, strings: &StringTable, count: u32) -> DecodeResult<IndexMap<TString, Script>> {
    let mut scripts = IndexMap::new();
    for i in 0..count {
        let script = decode_script_entry(cursor, strings).map_err(|e| list_err::<Script>(i as usize, count as usize, e, Vec::new()))?;
        scripts.insert(script.name.clone(), script);
    }
    Ok(scripts)
}

fn decode_script_entry(cursor: &mut Cursor<'_>, strings: &StringTable) -> DecodeResult<Script> {
    let name = read_interned(cursor, strings, "script name")?;
    let parent_name = read_interned(cursor, strings, "script parent name")?;
    let members = decode_members(cursor, strings)?;
    Ok(Script { name, parent_name, members, missing_parent: false })
}

fn decode_structs(cursor: &mut Cursor<'_>, strings: &StringTable, count: u32) -> DecodeResult<IndexMap<TString, Struct>> {
    let mut structs = IndexMap::new();
    for i in 0..count {
        let s = (|| -> DecodeResult<Struct> {
            let name = read_interned(cursor, strings, "struct name")?;
            let members = decode_members(cursor, strings)?;
            Ok(Struct { name, members })
        })()
        .map_err(|e| list_err::<Struct>(i as usize, count as usize, e, Vec::new()))?;
        structs.insert(s.name.clone(), s);
    }
    Ok(structs)
}

fn decode_members(cursor: &mut Cursor<'_>, strings: &StringTable) -> DecodeResult<Vec<MemberDescriptor>> {
    let count = cursor.read_u32("member count")?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_interned(cursor, strings, "member name")?;
        let type_name = read_interned(cursor, strings, "member type name")?;
        members.push(MemberDescriptor { name, type_name });
    }
    Ok(members)
}

fn resolve_script_parents(scripts: &mut IndexMap<TString, Script>) {
    let snapshot = scripts.clone();
    for script in scripts.values_mut() {
        script.resolve_parent(&snapshot);
    }
}

/// Resolves every instance's `class_name` against `classes`, setting
/// `resolved_class` to the canonical (table-owned) name on a hit and
/// leaving it `None` — "undefined" — otherwise.
fn resolve_instance_classes<T: DefinedInstance, C>(map: &mut IndexMap<Eid, T>, classes: &IndexMap<TString, C>) {
    for instance in map.values_mut() {
        let resolved = classes.get_key_value(instance.class_name()).map(|(name, _)| name.clone());
        instance.set_resolved_class(resolved);
    }
}

fn decode_preamble_map<T>(
    cursor: &mut Cursor<'_>,
    ctx: &EssContext,
    strings: &StringTable,
    where_: &'static str,
    build: impl Fn(InstancePreamble) -> T,
) -> DecodeResult<IndexMap<Eid, T>>
where
    T: DefinedInstance,
{
    let count = cursor.read_u32("preamble count")?;
    let mut map = IndexMap::new();
    for i in 0..count {
        let preamble =
            decode_instance_preamble(cursor, ctx, strings).map_err(|e| list_err::<InstancePreamble>(i as usize, count as usize, e, Vec::new()))?;
        let id = preamble.id;
        map.insert(id, build(preamble));
    }
    debug!(target: "papyrus_format::decode", step = where_, count = map.len());
    Ok(map)
}

fn decode_instance_preamble(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<InstancePreamble> {
    let raw = cursor.read_eid_raw("instance id", ctx.eid_width())?;
    let id = Eid::from_raw(raw);
    let class_name = read_interned(cursor, strings, "instance class name")?;
    let unknown16 = cursor.read_u16("instance unknown16")?;
    let ref_id = cursor.read_u32("instance ref id")?;
    let unknown8 = cursor.read_u8("instance unknown8")?;
    let fo4_conditional_byte = if ctx.has_structs() && (unknown16 & 0b11) == 3 {
        Some(cursor.read_u8("instance fo4 conditional byte")?)
    } else {
        None
    };
    Ok(InstancePreamble { id, class_name, unknown16, ref_id, unknown8, fo4_conditional_byte })
}

fn decode_arrays(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<IndexMap<Eid, ArrayInfo>> {
    let count = cursor.read_u32("arrays count")?;
    let mut arrays = IndexMap::new();
    for i in 0..count {
        let array = (|| -> DecodeResult<ArrayInfo> {
            let raw = cursor.read_eid_raw("array id", ctx.eid_width())?;
            let id = Eid::from_raw(raw);
            let tag_ordinal = cursor.read_u8("array element type")?;
            let element_type = TypeTag::from_ordinal(tag_ordinal)?;
            let element_class_name =
                if element_type.is_reference_kind() { Some(read_interned(cursor, strings, "array element class name")?) } else { None };
            let declared_length = cursor.read_u32("array declared length")?;
            Ok(ArrayInfo { id, element_type, element_class_name, declared_length, data: None })
        })()
        .map_err(|e| list_err::<ArrayInfo>(i as usize, count as usize, e, Vec::new()))?;
        arrays.insert(array.id, array);
    }
    Ok(arrays)
}

/// Lets `decode_instance_blobs` stay generic over the three instance kinds
/// without widening `DefinedInstance` itself (which the cross-reference
/// engine and auditor also depend on and should not need a mutator for).
trait HasDataSlot {
    fn set_data(&mut self, data: InstanceData);
}

impl HasDataSlot for ScriptInstance {
    fn set_data(&mut self, data: InstanceData) {
        self.data = Some(data);
    }
}
impl HasDataSlot for Reference {
    fn set_data(&mut self, data: InstanceData) {
        self.data = Some(data);
    }
}
impl HasDataSlot for StructInstance {
    fn set_data(&mut self, data: InstanceData) {
        self.data = Some(data);
    }
}

fn decode_instance_blobs<T: DefinedInstance + HasDataSlot>(
    cursor: &mut Cursor<'_>,
    ctx: &EssContext,
    strings: &StringTable,
    map: &mut IndexMap<Eid, T>,
) -> DecodeResult<()> {
    for (expected_id, instance) in map.iter_mut() {
        let raw = cursor.read_eid_raw("data blob id", ctx.eid_width())?;
        let read_id = Eid::from_raw(raw);
        if read_id != *expected_id {
            return Err(FormatError::new("data blob id", format!("expected {expected_id}, found {read_id}")).into());
        }
        let data = decode_instance_data(cursor, ctx, strings)
            .map_err(|cause| element_err::<InstanceData>(expected_id.to_string(), cause, None))?;
        instance.set_data(data);
    }
    Ok(())
}

fn decode_instance_data(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<InstanceData> {
    let flags = cursor.read_u8("instance data flags")?;
    let state = read_interned(cursor, strings, "instance data state")?;
    let unknown1 = cursor.read_i32("instance data unknown1")?;
    let unknown2 = cursor.read_i32("instance data unknown2")?;
    let var_count = cursor.read_u32("instance data variable count")?;
    let mut variables = Vec::with_capacity(var_count as usize);
    for _ in 0..var_count {
        variables.push(decode_variable(cursor, ctx, strings)?);
    }
    Ok(InstanceData { flags, state, unknown1, unknown2, variables })
}

fn decode_variable(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<Variable> {
    let ordinal = cursor.read_u8("variable tag")?;
    let tag = TypeTag::from_ordinal(ordinal)?;
    Ok(match tag {
        TypeTag::Null => Variable::Null,
        TypeTag::Integer => Variable::Integer(cursor.read_i32("variable integer")?),
        TypeTag::Float => Variable::Float(cursor.read_f32("variable float")?),
        TypeTag::Boolean => Variable::Boolean(cursor.read_bool("variable boolean")?),
        TypeTag::String => Variable::String(read_interned(cursor, strings, "variable string")?),
        TypeTag::Ref => Variable::Ref {
            class_name: read_interned(cursor, strings, "variable ref class name")?,
            target: Eid::from_raw(cursor.read_eid_raw("variable ref target", ctx.eid_width())?),
        },
        TypeTag::Struct => Variable::Struct {
            class_name: read_interned(cursor, strings, "variable struct class name")?,
            target: Eid::from_raw(cursor.read_eid_raw("variable struct target", ctx.eid_width())?),
        },
        TypeTag::Variant => Variable::Variant(Box::new(decode_variable(cursor, ctx, strings)?)),
        array_tag if array_tag.is_array() => {
            let scalar = array_tag.scalar_of().expect("array tag always has a scalar counterpart");
            let class_name =
                if scalar.is_reference_kind() { Some(read_interned(cursor, strings, "variable array class name")?) } else { None };
            Variable::Array {
                element_type: scalar,
                class_name,
                target: Eid::from_raw(cursor.read_eid_raw("variable array target", ctx.eid_width())?),
            }
        }
        _ => unreachable!("every tag is either handled above or caught by the is_array() guard"),
    })
}

fn decode_array_blobs(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable, arrays: &mut IndexMap<Eid, ArrayInfo>) -> DecodeResult<()> {
    for (expected_id, array) in arrays.iter_mut() {
        let raw = cursor.read_eid_raw("array blob id", ctx.eid_width())?;
        let read_id = Eid::from_raw(raw);
        if read_id != *expected_id {
            return Err(FormatError::new("array blob id", format!("expected {expected_id}, found {read_id}")).into());
        }
        let mut data = Vec::with_capacity(array.declared_length as usize);
        for i in 0..array.declared_length {
            let v = decode_variable(cursor, ctx, strings)
                .map_err(|cause| list_err(i as usize, array.declared_length as usize, cause, std::mem::take(&mut data)))?;
            data.push(v);
        }
        array.data = Some(data);
    }
    Ok(())
}

fn decode_active_script_blobs(
    cursor: &mut Cursor<'_>,
    ctx: &EssContext,
    strings: &StringTable,
    active: &mut IndexMap<Eid, ActiveScript>,
) -> DecodeResult<()> {
    for (expected_id, script) in active.iter_mut() {
        let raw = cursor.read_eid_raw("active_script blob id", ctx.eid_width())?;
        let read_id = Eid::from_raw(raw);
        if read_id != *expected_id {
            return Err(FormatError::new("active_script blob id", format!("expected {expected_id}, found {read_id}")).into());
        }
        let data = decode_active_script_data(cursor, ctx, strings)
            .map_err(|cause| element_err::<ActiveScriptData>(expected_id.to_string(), cause, None))?;
        script.data = Some(data);
    }
    Ok(())
}

fn decode_active_script_data(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<ActiveScriptData> {
    let version_major = cursor.read_u8("active script version major")?;
    let version_minor = cursor.read_u8("active script version minor")?;
    let owner = decode_variable(cursor, ctx, strings)?;
    let flags = cursor.read_u8("active script flags")?;
    let unknown = cursor.read_u8("active script unknown")?;

    let has_fragment_task = flags & 0b0000_0001 != 0;
    let fragment_task = if has_fragment_task { Some(decode_fragment_task(cursor)?) } else { None };

    let is_fallout4 = ctx.has_structs();
    let attached = match &fragment_task {
        Some(task) if task.carries_attached_eid(is_fallout4) => Some(Eid::from_raw(cursor.read_eid_raw("attached eid", ctx.eid_width())?)),
        _ => None,
    };

    let frame_count = cursor.read_u16("stack frame count")?;
    let mut frames = Vec::with_capacity(frame_count as usize);
    for i in 0..frame_count {
        let frame = decode_stack_frame(cursor, ctx, strings)
            .map_err(|cause| list_err(i as usize, frame_count as usize, cause, std::mem::take(&mut frames)))?;
        frames.push(frame);
    }
    let trailing_byte = if !frames.is_empty() { Some(cursor.read_u8("active script trailing byte")?) } else { None };

    Ok(ActiveScriptData { version_major, version_minor, owner, flags, unknown, fragment_task, attached, frames, trailing_byte })
}

fn decode_fragment_task(cursor: &mut Cursor<'_>) -> DecodeResult<FragmentTask> {
    let discriminant = cursor.read_u8("fragment task discriminant")?;
    Ok(match discriminant {
        0 => FragmentTask::QuestStage { stage: cursor.read_i32("fragment stage")?, fragment_index: cursor.read_i32("fragment index")? },
        1 => FragmentTask::ScenePhaseResults { phase: cursor.read_i32("fragment phase")? },
        2 => FragmentTask::SceneActionResults {
            action_index: cursor.read_i32("fragment action index")?,
            actor_index: cursor.read_i32("fragment actor index")?,
        },
        3 => FragmentTask::SceneResults,
        4 => FragmentTask::TerminalRunResults { entry_index: cursor.read_i32("fragment entry index")? },
        5 => FragmentTask::TopicInfo { response_index: cursor.read_i32("fragment response index")? },
        6 => FragmentTask::Type2 { value: cursor.read_i32("fragment type2 value")? },
        other => return Err(FormatError::new("fragment task discriminant", format!("invalid discriminant {other}")).into()),
    })
}

fn decode_stack_frame(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<StackFrame> {
    let variable_count = cursor.read_u32("stack frame variable count")?;
    if variable_count > MAX_STACK_VARIABLES {
        return Err(FormatError::new("stack frame variable count", format!("{variable_count} exceeds sanity bound")).into());
    }
    let flags = cursor.read_u8("stack frame flags")?;
    let function_type = TypeTag::from_ordinal(cursor.read_u8("stack frame function type")?)?;
    let script_name = read_interned(cursor, strings, "stack frame script name")?;
    let base_name = read_interned(cursor, strings, "stack frame base name")?;
    let event_name = read_interned(cursor, strings, "stack frame event name")?;

    let status =
        if flags & 0b0000_0001 == 0 && function_type == TypeTag::Null { Some(read_interned(cursor, strings, "stack frame status")?) } else { None };

    let opcode_version_major = cursor.read_u8("stack frame opcode version major")?;
    let opcode_version_minor = cursor.read_u8("stack frame opcode version minor")?;
    let return_type = read_interned(cursor, strings, "stack frame return type")?;
    let docstring = read_interned(cursor, strings, "stack frame docstring")?;
    let user_flags = cursor.read_u32("stack frame user flags")?;
    let function_flags = cursor.read_u8("stack frame function flags")?;

    let param_count = cursor.read_u16("stack frame param count")?;
    if param_count > MAX_PARAM_COUNT {
        return Err(FormatError::new("stack frame param count", format!("{param_count} exceeds sanity bound")).into());
    }
    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        params.push(MemberDescriptor {
            name: read_interned(cursor, strings, "param name")?,
            type_name: read_interned(cursor, strings, "param type name")?,
        });
    }

    let local_count = cursor.read_u16("stack frame local count")?;
    if local_count > MAX_LOCAL_COUNT {
        return Err(FormatError::new("stack frame local count", format!("{local_count} exceeds sanity bound")).into());
    }
    let mut locals = Vec::with_capacity(local_count as usize);
    for _ in 0..local_count {
        locals.push(MemberDescriptor {
            name: read_interned(cursor, strings, "local name")?,
            type_name: read_interned(cursor, strings, "local type name")?,
        });
    }

    let opcode_count = cursor.read_u16("stack frame opcode count")?;
    let mut opcodes = Vec::with_capacity(opcode_count as usize);
    for i in 0..opcode_count {
        let instr = decode_opcode(cursor, strings)
            .map_err(|cause| list_err(i as usize, opcode_count as usize, cause, std::mem::take(&mut opcodes)))?;
        opcodes.push(instr);
    }

    let instruction_pointer = cursor.read_u32("stack frame instruction pointer")?;
    let owner = decode_variable(cursor, ctx, strings)?;

    let mut variables = Vec::with_capacity(variable_count as usize);
    for _ in 0..variable_count {
        variables.push(decode_variable(cursor, ctx, strings)?);
    }

    Ok(StackFrame {
        flags,
        function_type,
        script_name,
        base_name,
        event_name,
        status,
        opcode_version_major,
        opcode_version_minor,
        return_type,
        docstring,
        user_flags,
        function_flags,
        params,
        locals,
        opcodes,
        instruction_pointer,
        owner,
        variables,
    })
}

fn decode_opcode(cursor: &mut Cursor<'_>, strings: &StringTable) -> DecodeResult<OpcodeInstruction> {
    let opcode = OpcodeKind::from_byte(cursor.read_u8("opcode byte")?)?;
    let mut params = Vec::with_capacity(opcode.fixed_arity());
    for _ in 0..opcode.fixed_arity() {
        params.push(decode_parameter(cursor, strings)?);
    }
    if opcode.has_extra_terms() {
        let extra = match params.last() {
            Some(Parameter::Integer(n)) if *n >= 0 => *n as usize,
            _ => return Err(FormatError::new("opcode extra terms", "last fixed operand is not a non-negative integer count").into()),
        };
        for _ in 0..extra {
            params.push(decode_parameter(cursor, strings)?);
        }
    }
    Ok(OpcodeInstruction { opcode, params })
}

fn decode_parameter(cursor: &mut Cursor<'_>, strings: &StringTable) -> DecodeResult<Parameter> {
    let ordinal = cursor.read_u8("parameter tag")?;
    Ok(match ordinal {
        0 => Parameter::Null,
        1 => Parameter::Identifier(read_interned(cursor, strings, "parameter identifier")?),
        2 => Parameter::String(read_interned(cursor, strings, "parameter string")?),
        3 => Parameter::Integer(cursor.read_i32("parameter integer")?),
        4 => Parameter::Float(cursor.read_f32("parameter float")?),
        5 => Parameter::Boolean(cursor.read_bool("parameter boolean")?),
        6 => Parameter::Unknown8(cursor.read_u8("parameter unknown8")?),
        other => return Err(FormatError::new("parameter tag", format!("invalid ordinal {other}")).into()),
    })
}

fn decode_function_message_data(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<FunctionMessageData> {
    let unknown = cursor.read_u8("function message unknown")?;
    let script_name = read_interned(cursor, strings, "function message script name")?;
    let event_name = read_interned(cursor, strings, "function message event name")?;
    let owner = decode_variable(cursor, ctx, strings)?;
    let var_count = cursor.read_u32("function message variable count")?;
    let mut variables = Vec::with_capacity(var_count as usize);
    for _ in 0..var_count {
        variables.push(decode_variable(cursor, ctx, strings)?);
    }
    Ok(FunctionMessageData { unknown, script_name, event_name, owner, variables })
}

fn decode_function_messages(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<Vec<FunctionMessage>> {
    let count = cursor.read_u32("function_messages count")?;
    let mut messages = Vec::with_capacity(count as usize);
    for i in 0..count {
        let msg = (|| -> DecodeResult<FunctionMessage> {
            let flag = cursor.read_u8("function message flag")?;
            let target = if FunctionMessage::carries_target(flag) {
                Some(Eid::from_raw(cursor.read_eid_raw("function message target", ctx.eid_width())?))
            } else {
                None
            };
            let flag_set = cursor.read_u8("function message flag set")?;
            let data = if flag_set != 0 { Some(decode_function_message_data(cursor, ctx, strings)?) } else { None };
            Ok(FunctionMessage { flag, target, flag_set, data })
        })()
        .map_err(|e| list_err::<FunctionMessage>(i as usize, count as usize, e, Vec::new()))?;
        messages.push(msg);
    }
    Ok(messages)
}

fn decode_suspended_stacks(cursor: &mut Cursor<'_>, ctx: &EssContext, strings: &StringTable) -> DecodeResult<IndexMap<Eid, SuspendedStack>> {
    let count = cursor.read_u32("suspended_stacks count")?;
    let mut map = IndexMap::new();
    for i in 0..count {
        let stack = (|| -> DecodeResult<SuspendedStack> {
            let raw = cursor.read_eid_raw("suspended stack id", ctx.eid_width())?;
            let id = Eid::from_raw(raw);
            let flag = cursor.read_u8("suspended stack flag")?;
            let data = if flag != 0 { Some(decode_function_message_data(cursor, ctx, strings)?) } else { None };
            Ok(SuspendedStack { id, flag, data })
        })()
        .map_err(|e| list_err::<SuspendedStack>(i as usize, count as usize, e, Vec::new()))?;
        map.insert(stack.id, stack);
    }
    Ok(map)
}

fn decode_unbinds(cursor: &mut Cursor<'_>, ctx: &EssContext) -> DecodeResult<IndexMap<Eid, QueuedUnbind>> {
    let count = cursor.read_u32("unbinds count")?;
    let mut map = IndexMap::new();
    for i in 0..count {
        let (id, unbind) = (|| -> DecodeResult<(Eid, QueuedUnbind)> {
            let raw = cursor.read_eid_raw("unbind instance id", ctx.eid_width())?;
            let instance_id = Eid::from_raw(raw);
            let unknown = cursor.read_u32("unbind unknown")?;
            Ok((instance_id, QueuedUnbind { instance_id, unknown }))
        })()
        .map_err(|e| list_err::<QueuedUnbind>(i as usize, count as usize, e, Vec::new()))?;
        map.insert(id, unbind);
    }
    Ok(map)
}

fn resolve_active_scripts(graph: &mut Papyrus) {
    let stacks_1: HashSet<Eid> = graph.suspended_stacks_1.keys().copied().collect();
    let stacks_2: HashSet<Eid> = graph.suspended_stacks_2.keys().copied().collect();
    for script in graph.active_scripts.values_mut() {
        script.owner = script.data.as_ref().and_then(|d| d.frames.first()).map(|f| f.owner.clone());
        script.suspended_stack = script.data.as_ref().and_then(|d| d.attached).filter(|eid| stacks_1.contains(eid) || stacks_2.contains(eid));
    }
}

/// Best-effort reparse of the trailing bytes into the fourteen `OtherData`
/// slots (spec §3, §9 Open Question #2: the last seven slots are
/// unconditionally null). Failure here never fails the overall parse.
fn decode_other_data(trailer: &[u8]) -> Option<OtherData> {
    let mut cursor = Cursor::new(trailer);
    let mut slots: [OtherDataEntry; SLOT_COUNT] = std::array::from_fn(|_| OtherDataEntry::Null);

    for slot in slots.iter_mut().take(7) {
        match GeneralElement::read_leaf_i32(&mut cursor, "other data slot") {
            Ok(el) => *slot = OtherDataEntry::Parsed(el),
            Err(_) => {
                warn!(target: "papyrus_format::decode", "other data slot failed to parse, carrying opaquely");
                *slot = OtherDataEntry::Unparsed(trailer.to_vec());
                break;
            }
        }
    }
    // slots[7..14] stay `Null` per the open question above.
    Some(OtherData { slots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GameVariant;

    fn inert_ctx(variant: GameVariant) -> EssContext {
        EssContext::inert(variant, variant == GameVariant::Fallout4, variant == GameVariant::Fallout4)
    }

    #[test]
    fn truncated_string_table_reports_missing_count() {
        // header (u16) + declared count=5 (u16) + only 3 short strings, then EOF.
        let mut bytes = vec![0x02, 0x00, 0x05, 0x00];
        for s in ["a", "bb", "ccc"] {
            bytes.push(s.len() as u8);
            bytes.push(0);
            bytes.extend_from_slice(s.as_bytes());
        }
        let ctx = inert_ctx(GameVariant::Skyrim);
        let graph = Papyrus::parse(&bytes, &ctx);
        assert!(graph.strings.truncated);
        assert_eq!(graph.strings.missing_count(), 2);
    }

    #[test]
    fn skyrim_narrow_count_of_100_triggers_string_table_bug() {
        let mut bytes = vec![0x02, 0x00];
        bytes.extend_from_slice(&STRING_TABLE_BUG_COUNT.to_le_bytes());
        let ctx = inert_ctx(GameVariant::Skyrim);
        let graph = Papyrus::parse(&bytes, &ctx);
        assert!(graph.strings.string_table_bug);
    }

    #[test]
    fn fallout4_wide_indices_never_trigger_the_narrow_only_bug() {
        // Fallout 4 always reads a 32-bit count, so the 16-bit-count=100
        // trigger can never match regardless of the bytes that follow.
        let mut bytes = vec![0x02, 0x00];
        bytes.extend_from_slice(&100u32.to_le_bytes());
        let ctx = inert_ctx(GameVariant::Fallout4);
        let graph = Papyrus::parse(&bytes, &ctx);
        assert!(!graph.strings.string_table_bug);
    }
}
