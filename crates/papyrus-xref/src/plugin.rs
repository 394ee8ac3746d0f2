//! Plugin-reachability index — spec §4.5: a clean/extend fixed point over
//! per-plugin reachable sets, seeded from the graph elements a plugin's
//! `RefID`s resolve to.

use indexmap::{IndexMap, IndexSet};
use papyrus_format::{DefinedInstance, EssContext, Papyrus};

use crate::element::Element;
use crate::referrer::ReferrerIndex;

/// The per-plugin reachable sets after the clean/extend fixed point, plus
/// the elements eliminated along the way for being shared by more than one
/// plugin (spec §4.5 "Clean": "attributes shared game objects to no single
/// plugin").
#[derive(Debug, Default)]
pub struct PluginIndex {
    reachable: IndexMap<String, IndexSet<Element>>,
    eliminated: IndexSet<Element>,
}

impl PluginIndex {
    /// Seeds one root set per plugin from every defined instance whose
    /// `RefID` resolves to that plugin under `ctx.plugin_for_refid`, then
    /// runs clean/extend to a fixed point (spec §4.5).
    pub fn build(graph: &Papyrus, referrers: &ReferrerIndex, ctx: &EssContext) -> Self {
        let mut reachable: IndexMap<String, IndexSet<Element>> = IndexMap::new();

        seed(&mut reachable, &graph.script_instances, Element::ScriptInstance, ctx);
        seed(&mut reachable, &graph.references, Element::Reference, ctx);
        seed(&mut reachable, &graph.struct_instances, Element::StructInstance, ctx);

        let mut eliminated: IndexSet<Element> = IndexSet::new();
        let forward = referrers.forward_map();

        loop {
            let mut changed = false;

            // Clean: every unordered pair's intersection is shared, hence
            // attributable to neither plugin.
            let names: Vec<String> = reachable.keys().cloned().collect();
            for i in 0..names.len() {
                for j in (i + 1)..names.len() {
                    let inter: Vec<Element> = {
                        let a = &reachable[&names[i]];
                        let b = &reachable[&names[j]];
                        a.intersection(b).cloned().collect()
                    };
                    if inter.is_empty() {
                        continue;
                    }
                    changed = true;
                    for e in inter {
                        reachable.get_mut(&names[i]).expect("name from reachable.keys()").shift_remove(&e);
                        reachable.get_mut(&names[j]).expect("name from reachable.keys()").shift_remove(&e);
                        eliminated.insert(e);
                    }
                }
            }

            // Extend: one further hop from each plugin's current set, never
            // stepping onto an eliminated element.
            for name in &names {
                let current: Vec<Element> = reachable[name].iter().cloned().collect();
                let mut additions = IndexSet::new();
                for e in &current {
                    if let Some(refs) = forward.get(e) {
                        for r in refs {
                            if !eliminated.contains(r) && !reachable[name].contains(r) {
                                additions.insert(r.clone());
                            }
                        }
                    }
                }
                if !additions.is_empty() {
                    changed = true;
                    reachable.get_mut(name).expect("name from reachable.keys()").extend(additions);
                }
            }

            if !changed {
                break;
            }
        }

        PluginIndex { reachable, eliminated }
    }

    /// The elements reachable from `plugin` after the fixed point, or an
    /// empty set if the plugin had no seeded roots.
    pub fn reachable(&self, plugin: &str) -> IndexSet<Element> {
        self.reachable.get(plugin).cloned().unwrap_or_default()
    }

    /// Every plugin name that had at least one seeded root.
    pub fn plugins(&self) -> impl Iterator<Item = &str> {
        self.reachable.keys().map(String::as_str)
    }

    /// Elements eliminated for being shared by more than one plugin.
    pub fn eliminated(&self) -> &IndexSet<Element> {
        &self.eliminated
    }

    /// spec §8 testable property 9: disjointness of every distinct pair of
    /// plugin-reachable sets after the fixed point.
    pub fn is_disjoint(&self) -> bool {
        let names: Vec<&String> = self.reachable.keys().collect();
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                if !self.reachable[names[i]].is_disjoint(&self.reachable[names[j]]) {
                    return false;
                }
            }
        }
        true
    }
}

fn seed<T: DefinedInstance>(
    reachable: &mut IndexMap<String, IndexSet<Element>>,
    map: &indexmap::IndexMap<papyrus_format::Eid, T>,
    ctor: impl Fn(papyrus_format::Eid) -> Element,
    ctx: &EssContext,
) {
    for instance in map.values() {
        if let Some(plugin) = (ctx.plugin_for_refid)(instance.ref_id()) {
            reachable.entry(plugin).or_default().insert(ctor(instance.id()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papyrus_format::GameVariant;

    fn ctx_with_plugin(owner: &'static str) -> EssContext {
        let mut ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        ctx.plugin_for_refid = Box::new(move |refid| if refid != 0 { Some(owner.to_string()) } else { None });
        ctx
    }

    #[test]
    fn unattached_instances_seed_no_plugin() {
        let graph = Papyrus::empty();
        let ctx = ctx_with_plugin("Dawnguard.esm");
        let referrers = ReferrerIndex::build(&graph, &ctx);
        let index = PluginIndex::build(&graph, &referrers, &ctx);
        assert_eq!(index.plugins().count(), 0);
    }

    #[test]
    fn disjointness_holds_on_an_empty_graph() {
        let graph = Papyrus::empty();
        let ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        let referrers = ReferrerIndex::build(&graph, &ctx);
        let index = PluginIndex::build(&graph, &referrers, &ctx);
        assert!(index.is_disjoint());
    }
}
