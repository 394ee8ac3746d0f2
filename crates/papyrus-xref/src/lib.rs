//! Cross-reference engine over a decoded Papyrus object graph: the general
//! referrer index and the plugin-reachability fixed point (spec §4.5).
//!
//! Both indices are derived data — neither is touched by `papyrus-format`'s
//! decode/encode path, and both must be invalidated after any of
//! `papyrus-format`'s mutation contracts runs.

#![forbid(unsafe_code)]

mod element;
mod plugin;
mod referrer;

pub use element::Element;
pub use plugin::PluginIndex;
pub use referrer::ReferrerIndex;

use std::cell::OnceCell;

use indexmap::IndexSet;
use papyrus_format::{EssContext, Papyrus};

/// Lazily-built, cached view over a graph's cross-reference indices.
///
/// Each index is computed at most once, on first access, and held until
/// [`CrossReference::invalidate`] is called — which callers must do after
/// running any of `papyrus-format`'s mutation contracts, since those change
/// the edge set the indices were built from.
pub struct CrossReference<'g> {
    graph: &'g Papyrus,
    referrer: OnceCell<ReferrerIndex>,
    plugin: OnceCell<PluginIndex>,
}

impl<'g> CrossReference<'g> {
    /// Wraps `graph` with no indices built yet.
    pub fn new(graph: &'g Papyrus) -> Self {
        CrossReference { graph, referrer: OnceCell::new(), plugin: OnceCell::new() }
    }

    /// The general referrer index, building it on first access. `ctx`
    /// supplies the change-form lookup the index's "plugin → change-form"
    /// edges are grounded on (spec §4.5).
    pub fn referrer(&self, ctx: &EssContext) -> &ReferrerIndex {
        self.referrer.get_or_init(|| ReferrerIndex::build(self.graph, ctx))
    }

    /// The plugin-reachability index, building it (and the referrer index,
    /// if not already built) on first access.
    pub fn plugin(&self, ctx: &EssContext) -> &PluginIndex {
        let referrer = self.referrer(ctx);
        self.plugin.get_or_init(|| PluginIndex::build(self.graph, referrer, ctx))
    }

    /// Drops both cached indices. Call after any structural mutation of the
    /// wrapped graph (spec §4.7: "invalidates any cached cross-reference
    /// data").
    pub fn invalidate(&mut self) {
        self.referrer = OnceCell::new();
        self.plugin = OnceCell::new();
    }

    /// spec §4.5 `findReferees(x)`: the union of `x`'s direct referrers and
    /// their own direct referrers in turn, filtered to defined-instance
    /// elements.
    pub fn find_referees(&self, x: &Element, ctx: &EssContext) -> IndexSet<Element> {
        let index = self.referrer(ctx);
        let direct = index.referrers_of(x);
        let mut out: IndexSet<Element> = direct.iter().filter(|e| e.is_defined_instance()).cloned().collect();
        for referrer in &direct {
            for secondary in index.referrers_of(referrer) {
                if secondary.is_defined_instance() {
                    out.insert(secondary);
                }
            }
        }
        out
    }
}
