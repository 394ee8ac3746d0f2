//! Fatal and warning classifiers — spec §4.6.

use papyrus_format::{DefinedInstance, GameVariant, OpcodeKind, Papyrus, Variable};

use crate::messages::{FatalMessage, WarningMessage};
use crate::summary::EssSummary;

/// Every fatal classifier, in the order spec §4.6 lists them.
pub fn fatal_messages(graph: &Papyrus, summary: &EssSummary) -> Vec<FatalMessage> {
    let mut out = Vec::new();

    if graph.broken {
        out.push(FatalMessage::BrokenBlock);
    }
    if summary.plugin_count == 255 || summary.plugin_count == 256 {
        out.push(FatalMessage::PluginCountExtreme(summary.plugin_count));
    }
    if graph.truncated {
        out.push(FatalMessage::Truncated { where_: "Papyrus block", missing: None });
    }
    if graph.strings.truncated {
        out.push(FatalMessage::Truncated {
            where_: "string-table",
            missing: Some(graph.strings.missing_count()),
        });
    }
    if summary.ess_truncated {
        out.push(FatalMessage::Truncated { where_: "ESS file", missing: None });
    }
    if summary.formid_array_truncated {
        out.push(FatalMessage::Truncated { where_: "formID array", missing: None });
    }
    if graph.strings.string_table_bug {
        out.push(FatalMessage::StringTableBug);
    }

    out
}

/// Every warning classifier, in the order spec §4.6 lists them. Each
/// variant fires at most once, carrying an aggregate count rather than one
/// message per offending node.
pub fn warning_messages(graph: &Papyrus, summary: &EssSummary) -> Vec<WarningMessage> {
    let mut out = Vec::new();

    let unattached_threshold = if summary.game_variant == GameVariant::Fallout4 { 2 } else { 0 };
    let unattached = count_all_instances(graph, |i| i.is_unattached());
    if unattached > unattached_threshold {
        out.push(WarningMessage::UnattachedInstances(unattached));
    }

    let undefined = count_all_instances(graph, |i| i.is_undefined());
    if undefined > 0 {
        out.push(WarningMessage::UndefinedElements(undefined));
    }

    let undefined_threads = graph
        .active_scripts
        .values()
        .filter(|t| owner_class_is_unresolved(graph, t.owner.as_ref()) && !thread_is_terminated(t))
        .count();
    if undefined_threads > 0 {
        out.push(WarningMessage::UndefinedNonTerminatedThreads(undefined_threads));
    }

    let missing_parent = graph.scripts.values().filter(|s| s.missing_parent).count();
    if missing_parent > 0 {
        out.push(WarningMessage::MissingParent(missing_parent));
    }

    let empty_parent_name = graph.scripts.values().filter(|s| s.has_empty_parent_name()).count();
    if empty_parent_name > 0 {
        out.push(WarningMessage::EmptyParentName(empty_parent_name));
    }

    let stack_count = graph.suspended_stacks_1.len() + graph.suspended_stacks_2.len();
    let frame_count: usize =
        graph.active_scripts.values().filter_map(|t| t.data.as_ref()).map(|d| d.frames.len()).sum();
    if stack_count > 50 || frame_count > 150 {
        out.push(WarningMessage::StackOrFrameCountHigh { stacks: stack_count, frames: frame_count });
    }

    let deep_threads = graph
        .active_scripts
        .values()
        .filter(|t| t.data.as_ref().is_some_and(|d| d.frames.len() >= 100))
        .count();
    if deep_threads > 0 {
        out.push(WarningMessage::DeepThread { count: deep_threads });
    }

    let memberless = count_all_instances(graph, |i| i.is_memberless(expected_member_count(graph, i)));
    if memberless > 0 {
        out.push(WarningMessage::MemberlessInstances(memberless));
    }

    let mismatched = count_all_instances(graph, |i| i.is_definition_mismatch(expected_member_count(graph, i)));
    if mismatched > 0 {
        out.push(WarningMessage::DefinitionMismatchInstances(mismatched));
    }

    out
}

fn expected_member_count(graph: &Papyrus, instance: &dyn DefinedInstance) -> usize {
    if let Some(script) = graph.scripts.get(instance.class_name()) {
        return script.extended_members(&graph.scripts).len();
    }
    graph.structs.get(instance.class_name()).map(|s| s.members.len()).unwrap_or(0)
}

/// Applies `pred` across every defined-instance collection (script
/// instances, references, struct instances), summing the matches. The
/// three collections hold distinct concrete types, so this counts each one
/// separately rather than trying to iterate them uniformly.
fn count_all_instances(graph: &Papyrus, pred: impl Fn(&dyn DefinedInstance) -> bool) -> usize {
    let script_instances = graph.script_instances.values().filter(|i| pred(*i)).count();
    let references = graph.references.values().filter(|i| pred(*i)).count();
    let struct_instances = graph.struct_instances.values().filter(|i| pred(*i)).count();
    script_instances + references + struct_instances
}

fn owner_class_is_unresolved(graph: &Papyrus, owner: Option<&Variable>) -> bool {
    match owner {
        Some(Variable::Ref { class_name, .. }) | Some(Variable::Struct { class_name, .. }) => {
            !graph.scripts.contains_key(class_name) && !graph.structs.contains_key(class_name)
        }
        _ => false,
    }
}

fn thread_is_terminated(script: &papyrus_format::ActiveScript) -> bool {
    match &script.data {
        None => true,
        Some(data) => data.frames.iter().all(|frame| frame.opcodes.iter().all(|op| op.opcode == OpcodeKind::Nop)),
    }
}
