//! `EssContext` — the immutable game-variant switches threaded through every
//! decode/encode call (spec §6, §9 "Game-variant switches").

use crate::eid::Eid;
use papyrus_codec::EidWidth;

/// The savegame's originating game, dictating every variance point in the
/// decode recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameVariant {
    /// The Elder Scrolls V: Skyrim (and Special/Anniversary Edition).
    Skyrim,
    /// Fallout 4.
    Fallout4,
}

/// A resolved change-form, as owned by the outer savegame reader. The core
/// never inspects this beyond passing it back to `ModelBuilder`/report hooks.
#[derive(Debug, Clone)]
pub struct ChangeFormRef {
    /// Plugin this form originates from, if known.
    pub plugin: Option<String>,
    /// Opaque external form identifier.
    pub ref_id: u32,
}

/// Collaborator context supplied by the outer savegame reader (spec §6).
/// Every variance point a decode/encode call needs is threaded through this
/// struct — nothing is read from globals or thread-locals.
pub struct EssContext {
    /// Which game produced this save.
    pub game_variant: GameVariant,
    /// True when element identifiers are 64-bit (Fallout 4).
    pub eid_is_64bit: bool,
    /// True when string-table indices are encoded as 32-bit values.
    pub string_index_is_32bit: bool,
    /// Looks up a change-form by external `RefID`.
    pub lookup_change_form: Box<dyn Fn(u32) -> Option<ChangeFormRef>>,
    /// Resolves the plugin that contributed a given `RefID`.
    pub plugin_for_refid: Box<dyn Fn(u32) -> Option<String>>,
    /// Fallback identifier search used by the auditor's HTML hyperlinker.
    pub broad_spectrum_search: Box<dyn Fn(u64) -> Vec<String>>,
}

impl EssContext {
    /// The EID width dictated by `eid_is_64bit`.
    pub fn eid_width(&self) -> EidWidth {
        if self.eid_is_64bit {
            EidWidth::Bits64
        } else {
            EidWidth::Bits32
        }
    }

    /// The string-table index width dictated by `string_index_is_32bit`.
    pub fn string_index_width(&self) -> crate::strings::IndexWidth {
        if self.string_index_is_32bit {
            crate::strings::IndexWidth::Wide
        } else {
            crate::strings::IndexWidth::Narrow
        }
    }

    /// True iff this save carries the Fallout-4-only `structs`/`struct_instances`
    /// sections.
    pub fn has_structs(&self) -> bool {
        self.game_variant == GameVariant::Fallout4
    }

    /// True iff this save carries the Skyrim-only trailing save-file-version word.
    pub fn has_save_file_version_trailer(&self) -> bool {
        self.game_variant == GameVariant::Skyrim
    }

    /// A context with inert collaborator callbacks, for tests and for callers
    /// who have no outer savegame-header plugin/change-form data available.
    pub fn inert(game_variant: GameVariant, eid_is_64bit: bool, string_index_is_32bit: bool) -> Self {
        Self {
            game_variant,
            eid_is_64bit,
            string_index_is_32bit,
            lookup_change_form: Box::new(|_| None),
            plugin_for_refid: Box::new(|_| None),
            broad_spectrum_search: Box::new(|_| Vec::new()),
        }
    }
}

impl std::fmt::Debug for EssContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EssContext")
            .field("game_variant", &self.game_variant)
            .field("eid_is_64bit", &self.eid_is_64bit)
            .field("string_index_is_32bit", &self.string_index_is_32bit)
            .finish_non_exhaustive()
    }
}

/// Resolves a raw wire value to an `Eid`, honoring sentinel semantics.
pub fn eid_from_raw(raw: u64) -> Eid {
    Eid::from_raw(raw)
}
