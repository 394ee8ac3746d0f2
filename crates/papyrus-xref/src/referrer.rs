//! The general referrer index — spec §4.5: `Map<Element, Set<Element>>`
//! where an entry `(a, {b,c,...})` means "a references each of b,c,...".
//! Built once by walking the fully-materialized graph.

use indexmap::{IndexMap, IndexSet};
use papyrus_format::{DefinedInstance, Eid, EssContext, Papyrus, Variable};

use crate::element::Element;

/// Both directions of the referrer relation, built together so
/// `referents_of`/`referrers_of` are both O(1) lookups after construction.
#[derive(Debug, Default)]
pub struct ReferrerIndex {
    /// `a -> {elements a references}`.
    referents: IndexMap<Element, IndexSet<Element>>,
    /// `b -> {elements that reference b}`.
    referrers: IndexMap<Element, IndexSet<Element>>,
}

impl ReferrerIndex {
    /// Walks `graph` once, producing the complete referrer relation (spec
    /// §4.5's enumerated edge list). `ctx` supplies the change-form lookup
    /// used for the "every change-form with a plugin origin" edge.
    pub fn build(graph: &Papyrus, ctx: &EssContext) -> Self {
        let mut index = ReferrerIndex::default();

        for (id, instance) in &graph.script_instances {
            index.instance_edges(graph, Element::ScriptInstance(*id), instance, Element::Script);
            index.add_change_form_edge(instance.ref_id(), ctx);
        }
        for (id, reference) in &graph.references {
            index.instance_edges(graph, Element::Reference(*id), reference, Element::Script);
            index.add_change_form_edge(reference.ref_id(), ctx);
        }
        for (id, instance) in &graph.struct_instances {
            index.instance_edges(graph, Element::StructInstance(*id), instance, Element::Struct);
            index.add_change_form_edge(instance.ref_id(), ctx);
        }

        for (id, array) in &graph.arrays {
            let from = Element::Array(*id);
            if array.element_type.is_reference_kind() {
                if let Some(vars) = &array.data {
                    for v in vars {
                        index.add_variable_edge(graph, from.clone(), v);
                    }
                }
            }
        }

        for (id, thread) in &graph.active_scripts {
            let from = Element::ActiveScript(*id);
            if let Some(owner) = &thread.owner {
                index.add_variable_edge(graph, from.clone(), owner);
            }
            if let Some(attached) = thread.data.as_ref().and_then(|d| d.attached) {
                index.add_edge(from.clone(), Element::ActiveScript(attached));
            }
            if let Some(data) = &thread.data {
                for frame in &data.frames {
                    index.add_script_edge(graph, from.clone(), &frame.script_name);
                    index.add_variable_edge(graph, from.clone(), &frame.owner);
                    for v in &frame.variables {
                        index.add_variable_edge(graph, from.clone(), v);
                    }
                }
            }
            if let Some(stack_id) = thread.suspended_stack {
                index.add_edge(Element::SuspendedStack(stack_id), Element::ActiveScript(*id));
            }
        }

        for (i, msg) in graph.function_messages.iter().enumerate() {
            let from = Element::FunctionMessage(i);
            if let Some(target) = msg.target {
                index.add_edge(from.clone(), Element::ActiveScript(target));
            }
            if let Some(data) = &msg.data {
                index.add_variable_edge(graph, from.clone(), &data.owner);
                for v in &data.variables {
                    index.add_variable_edge(graph, from.clone(), v);
                }
            }
        }

        for (id, stack) in graph.suspended_stacks_1.iter().chain(graph.suspended_stacks_2.iter()) {
            let from = Element::SuspendedStack(*id);
            if let Some(data) = &stack.data {
                index.add_script_edge(graph, from.clone(), &data.script_name);
                index.add_variable_edge(graph, from.clone(), &data.owner);
                for v in &data.variables {
                    index.add_variable_edge(graph, from.clone(), v);
                }
            }
        }

        for (id, unbind) in &graph.unbinds {
            index.add_edge(Element::Unbind(*id), Element::ScriptInstance(unbind.instance_id));
        }

        index
    }

    fn instance_edges<T: DefinedInstance>(
        &mut self,
        graph: &Papyrus,
        from: Element,
        instance: &T,
        class_ctor: impl Fn(papyrus_format::TString) -> Element,
    ) {
        if !instance.is_undefined() {
            self.add_edge(from.clone(), class_ctor(instance.class_name().clone()));
        }
        if let Some(data) = instance.data() {
            for v in &data.variables {
                self.add_variable_edge(graph, from.clone(), v);
            }
        }
    }

    /// spec §4.5: "every change-form with a plugin origin → (plugin →
    /// change-form)". `ref_id` zero (unattached) never resolves to a
    /// change-form, matching `lookup_change_form`'s own contract.
    fn add_change_form_edge(&mut self, ref_id: u32, ctx: &EssContext) {
        if ref_id == 0 {
            return;
        }
        if let Some(change_form) = (ctx.lookup_change_form)(ref_id) {
            if let Some(plugin) = change_form.plugin {
                self.add_edge(Element::Plugin(plugin), Element::ChangeForm(change_form.ref_id));
            }
        }
    }

    /// Adds `from -> Element::Script(name)` when `name` resolves to a loaded
    /// script; an unresolved name (dangling frame/suspended-stack reference)
    /// yields no edge, matching `resolve_target_element`'s own contract.
    fn add_script_edge(&mut self, graph: &Papyrus, from: Element, name: &papyrus_format::TString) {
        if graph.scripts.contains_key(name) {
            self.add_edge(from, Element::Script(name.clone()));
        }
    }

    fn add_variable_edge(&mut self, graph: &Papyrus, from: Element, v: &Variable) {
        match v {
            Variable::Ref { target, .. } | Variable::Struct { target, .. } | Variable::Array { target, .. } => {
                if let Some(to) = resolve_target_element(graph, *target) {
                    self.add_edge(from, to);
                }
            }
            Variable::Variant(inner) => self.add_variable_edge(graph, from, inner),
            _ => {}
        }
    }

    fn add_edge(&mut self, from: Element, to: Element) {
        self.referents.entry(from.clone()).or_default().insert(to.clone());
        self.referrers.entry(to).or_default().insert(from);
    }

    /// Elements `from` directly references.
    pub fn referents_of(&self, from: &Element) -> IndexSet<Element> {
        self.referents.get(from).cloned().unwrap_or_default()
    }

    /// Elements that directly reference `target`.
    pub fn referrers_of(&self, target: &Element) -> IndexSet<Element> {
        self.referrers.get(target).cloned().unwrap_or_default()
    }

    /// Full forward adjacency map, for the plugin-reachability engine's
    /// "extend" step.
    pub(crate) fn forward_map(&self) -> &IndexMap<Element, IndexSet<Element>> {
        &self.referents
    }

    /// spec §8 testable property 8: for every reference-typed variable with a
    /// resolved target, the target is present in `general_index[owner_of(v)]`.
    pub fn contains_edge(&self, from: &Element, to: &Element) -> bool {
        self.referents.get(from).is_some_and(|set| set.contains(to))
    }
}

/// Resolves a raw target `Eid` to whichever collection actually holds it.
/// `Ref`/`Struct` variables carry no tag distinguishing a `ScriptInstance`
/// target from a `Reference` target, so resolution must consult the graph
/// rather than the variable's own shape; an id absent from every collection
/// (dangling, or the zero sentinel) yields no edge at all.
fn resolve_target_element(graph: &Papyrus, target: Eid) -> Option<Element> {
    if target.is_zero() {
        return None;
    }
    if graph.script_instances.contains_key(&target) {
        Some(Element::ScriptInstance(target))
    } else if graph.references.contains_key(&target) {
        Some(Element::Reference(target))
    } else if graph.struct_instances.contains_key(&target) {
        Some(Element::StructInstance(target))
    } else if graph.arrays.contains_key(&target) {
        Some(Element::Array(target))
    } else if graph.active_scripts.contains_key(&target) {
        Some(Element::ActiveScript(target))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papyrus_format::GameVariant;

    fn inert_ctx() -> EssContext {
        EssContext::inert(GameVariant::Skyrim, false, false)
    }

    #[test]
    fn empty_graph_has_empty_index() {
        let graph = Papyrus::empty();
        let index = ReferrerIndex::build(&graph, &inert_ctx());
        assert!(index.referents_of(&Element::Array(Eid::from_raw(1))).is_empty());
    }

    #[test]
    fn unbind_references_its_target_instance() {
        let mut graph = Papyrus::empty();
        let id = Eid::from_raw(42);
        graph.unbinds.insert(id, papyrus_format::QueuedUnbind { instance_id: id, unknown: 0 });
        let index = ReferrerIndex::build(&graph, &inert_ctx());
        assert!(index.contains_edge(&Element::Unbind(id), &Element::ScriptInstance(id)));
        assert!(index.referrers_of(&Element::ScriptInstance(id)).contains(&Element::Unbind(id)));
    }

    #[test]
    fn change_form_with_plugin_origin_is_recorded() {
        use crate::element::Element;
        use papyrus_format::{ChangeFormRef, InstanceData, InstancePreamble, Reference};

        let mut graph = Papyrus::empty();
        let class_name = graph.strings.intern("SomeScript");
        let id = Eid::from_raw(1);
        graph.references.insert(
            id,
            Reference {
                preamble: InstancePreamble {
                    id,
                    class_name: class_name.clone(),
                    unknown16: 0,
                    ref_id: 0x01_00_07_77,
                    unknown8: 0,
                    fo4_conditional_byte: None,
                },
                data: Some(InstanceData { flags: 0, state: graph.strings.intern(""), unknown1: 0, unknown2: 0, variables: vec![] }),
                resolved_class: Some(class_name),
            },
        );

        let mut ctx = inert_ctx();
        ctx.lookup_change_form =
            Box::new(|ref_id| Some(ChangeFormRef { plugin: Some("Dawnguard.esm".to_string()), ref_id }));

        let index = ReferrerIndex::build(&graph, &ctx);
        assert!(index.contains_edge(&Element::Plugin("Dawnguard.esm".to_string()), &Element::ChangeForm(0x01_00_07_77)));
    }

    #[test]
    fn thread_references_its_suspended_stack_and_frame_script() {
        use papyrus_format::{ActiveScript, ActiveScriptData, Script, StackFrame, TypeTag, Variable};

        let mut graph = Papyrus::empty();
        let script_name = graph.strings.intern("SomeScript");
        graph.scripts.insert(
            script_name.clone(),
            Script { name: script_name.clone(), parent_name: graph.strings.intern(""), members: vec![], missing_parent: false },
        );

        let frame = StackFrame {
            flags: 0,
            function_type: TypeTag::Null,
            script_name: script_name.clone(),
            base_name: graph.strings.intern(""),
            event_name: graph.strings.intern(""),
            status: None,
            opcode_version_major: 1,
            opcode_version_minor: 0,
            return_type: graph.strings.intern(""),
            docstring: graph.strings.intern(""),
            user_flags: 0,
            function_flags: 0,
            params: vec![],
            locals: vec![],
            opcodes: vec![],
            instruction_pointer: 0,
            owner: Variable::Null,
            variables: vec![],
        };

        let thread_id = Eid::from_raw(7);
        let stack_id = Eid::from_raw(9);
        graph.suspended_stacks_1.insert(stack_id, papyrus_format::SuspendedStack { id: stack_id, flag: 0, data: None });
        graph.active_scripts.insert(
            thread_id,
            ActiveScript {
                id: thread_id,
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
                suspended_stack: Some(stack_id),
            },
        );

        let index = ReferrerIndex::build(&graph, &inert_ctx());
        assert!(index.contains_edge(&Element::SuspendedStack(stack_id), &Element::ActiveScript(thread_id)));
        assert!(index.contains_edge(&Element::ActiveScript(thread_id), &Element::Script(script_name)));
    }
}
