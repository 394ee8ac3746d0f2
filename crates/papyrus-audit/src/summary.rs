//! `EssSummary` — the handful of outer-savegame-header facts the auditor
//! needs but the Papyrus block itself does not carry (spec §4.6 consumes
//! "the decoded ESS", a wider thing than the Papyrus core's own graph).
//!
//! Everything here is host-supplied, the same collaborator-boundary
//! discipline `EssContext` uses for decode: the core never reaches into the
//! plugin list, the formID array, or change-form records itself.

use indexmap::IndexSet;
use papyrus_format::GameVariant;

/// Outer-ESS facts the auditor's fatal/warning classifiers read in addition
/// to the decoded `Papyrus` graph.
#[derive(Debug, Clone)]
pub struct EssSummary {
    /// Originating game.
    pub game_variant: GameVariant,
    /// In-world save name (the name shown in the load menu), used for
    /// sequential-save identification.
    pub save_name: String,
    /// Save number, used for sequential-save identification.
    pub save_number: u32,
    /// Number of plugins loaded into this save.
    pub plugin_count: u32,
    /// Set iff the outer ESS file itself was truncated (distinct from the
    /// Papyrus block's own `truncated`/`broken` flags).
    pub ess_truncated: bool,
    /// Set iff the change-form (`formID`) array was truncated.
    pub formid_array_truncated: bool,
    /// Total on-disk size of the savegame's data section, used for the
    /// sequential-save shrink check.
    pub savefile_data_len: u64,
    /// Script-name namespaces (the portion of a script name before its
    /// first `:`) whose instances are currently backed by a resident
    /// change-form, as the outer savegame reader sees the plugin/change-form
    /// tables.
    pub namespaces_with_resident_change_forms: IndexSet<String>,
}

impl EssSummary {
    /// The namespace portion of a Papyrus script name: the substring before
    /// its first `:`, or the whole name if it carries none. Matches the
    /// `Namespace:ScriptName` convention used throughout both games'
    /// scripts (e.g. `SKI_ConfigBase:MCM`).
    pub fn namespace_of(script_name: &str) -> &str {
        script_name.split(':').next().unwrap_or(script_name)
    }

    /// Two summaries describe a "sequential" pair of saves (spec §4.6): same
    /// game, same in-world name, strictly increasing save number, and the
    /// difference is less than 10.
    pub fn is_sequential_to(&self, previous: &EssSummary) -> bool {
        self.game_variant == previous.game_variant
            && self.save_name == previous.save_name
            && self.save_number > previous.save_number
            && self.save_number - previous.save_number < 10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_of_splits_on_first_colon() {
        assert_eq!(EssSummary::namespace_of("SKI_ConfigBase:MCM"), "SKI_ConfigBase");
        assert_eq!(EssSummary::namespace_of("PlainScript"), "PlainScript");
    }

    #[test]
    fn sequential_requires_same_game_and_name_and_close_save_numbers() {
        let a = EssSummary {
            game_variant: GameVariant::Skyrim,
            save_name: "CommanderShepard".into(),
            save_number: 12,
            plugin_count: 10,
            ess_truncated: false,
            formid_array_truncated: false,
            savefile_data_len: 1000,
            namespaces_with_resident_change_forms: IndexSet::new(),
        };
        let mut b = a.clone();
        b.save_number = 13;
        assert!(b.is_sequential_to(&a));

        let mut too_far = a.clone();
        too_far.save_number = 30;
        assert!(!too_far.is_sequential_to(&a));

        let mut other_name = a.clone();
        other_name.save_name = "Someone Else".into();
        other_name.save_number = 13;
        assert!(!other_name.is_sequential_to(&a));
    }
}
