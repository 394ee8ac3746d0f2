//! The integrity auditor ("worrier") — spec §4.6: aggregates a decoded
//! `Papyrus` graph (and outer-ESS facts the core doesn't carry) into a
//! save-permitted / save-forbidden verdict and a human-readable report.
//!
//! The auditor never mutates the graph it inspects; `papyrus-format`'s
//! mutation contracts (§4.7) are a separate, host-invoked step.

#![forbid(unsafe_code)]

mod canary;
mod classify;
mod messages;
mod summary;

pub use messages::{FatalMessage, WarningMessage};
pub use summary::EssSummary;

use papyrus_format::Papyrus;

use canary::CanarySnapshot;

/// The auditor's complete verdict for one decoded graph.
#[derive(Debug, Clone)]
pub struct AuditReport {
    /// Fatal findings. Non-empty iff `disable_saving`.
    pub fatal: Vec<FatalMessage>,
    /// Non-fatal findings. Non-empty iff `should_worry`.
    pub warnings: Vec<WarningMessage>,
    /// Set when the block is structurally unrecoverable.
    pub disable_saving: bool,
    /// Set when any non-fatal anomaly was detected.
    pub should_worry: bool,
    snapshot: Snapshot,
}

/// State carried forward purely so a later audit run can perform the
/// sequential-save comparison (spec §4.6) without re-deriving it from a
/// graph the caller may no longer have in memory.
#[derive(Debug, Clone)]
struct Snapshot {
    summary: EssSummary,
    canary: CanarySnapshot,
}

impl AuditReport {
    /// Runs every fatal and warning classifier against `graph`/`summary`,
    /// additionally comparing against `previous` when the two saves are
    /// sequential (spec §4.6 "sequential save" rule).
    #[tracing::instrument(skip(graph, previous), fields(plugin_count = summary.plugin_count))]
    pub fn audit(graph: &Papyrus, summary: &EssSummary, previous: Option<&AuditReport>) -> AuditReport {
        let fatal = classify::fatal_messages(graph, summary);
        let mut warnings = classify::warning_messages(graph, summary);
        let canary_now = canary::snapshot(graph);

        if let Some(previous) = previous {
            if summary.is_sequential_to(&previous.snapshot.summary) {
                append_sequential_warnings(&mut warnings, graph, summary, &canary_now, &previous.snapshot);
            } else {
                tracing::debug!("previous report is not sequential to this save; skipping comparison");
            }
        }

        let disable_saving = !fatal.is_empty();
        let should_worry = !warnings.is_empty();

        if disable_saving {
            tracing::warn!(count = fatal.len(), "audit found fatal issues, disabling saving");
        } else if should_worry {
            tracing::debug!(count = warnings.len(), "audit found non-fatal anomalies");
        }

        AuditReport {
            fatal,
            warnings,
            disable_saving,
            should_worry,
            snapshot: Snapshot { summary: summary.clone(), canary: canary_now },
        }
    }
}

fn append_sequential_warnings(
    warnings: &mut Vec<WarningMessage>,
    graph: &Papyrus,
    summary: &EssSummary,
    canary_now: &CanarySnapshot,
    previous: &Snapshot,
) {
    if previous.summary.savefile_data_len > 0 && summary.savefile_data_len < previous.summary.savefile_data_len {
        let shrink = (previous.summary.savefile_data_len - summary.savefile_data_len) as f64
            / previous.summary.savefile_data_len as f64;
        if shrink >= 0.05 {
            warnings.push(WarningMessage::SavefileShrink(shrink));
        }
    }

    for (script, previous_value) in canary::zeroed_transitions(&previous.canary, canary_now) {
        warnings.push(WarningMessage::ZeroedCanary { script, previous: previous_value });
    }

    let current_namespaces: std::collections::HashSet<&str> =
        graph.scripts.keys().map(|name| EssSummary::namespace_of(name.as_str())).collect();
    for namespace in &previous.summary.namespaces_with_resident_change_forms {
        if !current_namespaces.contains(namespace.as_str()) {
            warnings.push(WarningMessage::CanaryNamespaceLoss(namespace.clone()));
        }
    }
}
