//! End-to-end scenario tests (spec §8 "S1"-"S6") and the cross-crate
//! testable properties that don't fit naturally inside any one crate's own
//! `#[cfg(test)]` module: referrer correctness, plugin-index disjointness,
//! and auditor determinism, each exercised over a full decode/audit/xref
//! pipeline rather than a single layer in isolation.

#[cfg(test)]
mod scenarios {
    use indexmap::IndexSet;
    use papyrus_audit::{AuditReport, EssSummary, FatalMessage, WarningMessage};
    use papyrus_codec::{EidWidth, Writer};
    use papyrus_format::{
        ActiveScript, ActiveScriptData, DefinedInstance, Eid, EssContext, FragmentTask, GameVariant, InstanceData,
        InstancePreamble, MemberDescriptor, Papyrus, Script, ScriptInstance, Struct, StructInstance, TypeTag, Variable,
    };

    fn summary(game_variant: GameVariant, save_number: u32) -> EssSummary {
        EssSummary {
            game_variant,
            save_name: "CommanderShepard".into(),
            save_number,
            plugin_count: 3,
            ess_truncated: false,
            formid_array_truncated: false,
            savefile_data_len: 1_000_000,
            namespaces_with_resident_change_forms: IndexSet::new(),
        }
    }

    /// S1: an empty but fully well-formed block parses cleanly, its
    /// `calculate_size` matches the input length exactly, it round-trips
    /// byte-for-byte, and the auditor raises no worries.
    #[test]
    fn s1_empty_valid_block_round_trips_and_audits_clean() {
        let ctx = EssContext::inert(GameVariant::Fallout4, true, true);

        let mut w = Writer::new();
        w.write_u16(0x0002); // header
        w.write_u32(0); // string table count (wide index width)
        w.write_u32(0); // script_count
        w.write_u32(0); // struct_count (Fallout 4 only)
        w.write_u32(0); // script_instances preamble count
        w.write_u32(0); // references preamble count
        w.write_u32(0); // struct_instances preamble count (Fallout 4 only)
        w.write_u32(0); // arrays count
        w.write_eid_raw(0, EidWidth::Bits64); // papyrus_runtime
        w.write_u32(0); // active_scripts preamble count
        w.write_u32(0); // function_messages count
        w.write_u32(0); // suspended_stacks_1 count
        w.write_u32(0); // suspended_stacks_2 count
        w.write_u32(0); // unk1 (== 0, so no unk2 follows)
        w.write_u32(0); // unknown_ids count
        w.write_u32(0); // unbinds count
        let bytes = w.into_vec();

        let graph = Papyrus::parse(&bytes, &ctx);
        assert!(graph.is_clean(), "well-formed empty block must not be truncated or broken");
        assert_eq!(graph.calculate_size(&ctx), bytes.len());
        assert_eq!(graph.write(&ctx).unwrap(), bytes);

        let report = AuditReport::audit(&graph, &summary(GameVariant::Fallout4, 1), None);
        assert!(!report.disable_saving);
        assert!(!report.should_worry);
        assert!(report.fatal.is_empty());
        assert!(report.warnings.is_empty());
    }

    /// S2: a string table declaring five entries but supplying only three
    /// before the buffer runs out yields a partial graph whose `truncated`
    /// flags are set and whose audit disables saving with the seed message
    /// text from spec §8.
    #[test]
    fn s2_truncated_string_table_disables_saving() {
        let mut w = Writer::new();
        w.write_u16(0x0002);
        w.write_u16(5); // declared count, narrow index width
        for s in ["a", "bb", "ccc"] {
            w.write_wstring(s.as_bytes());
        }
        let bytes = w.into_vec();

        let ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        let graph = Papyrus::parse(&bytes, &ctx);

        assert!(graph.strings.truncated);
        assert_eq!(graph.strings.missing_count(), 2);
        assert!(graph.truncated, "running out of bytes after the string table must truncate the whole parse");

        let report = AuditReport::audit(&graph, &summary(GameVariant::Skyrim, 1), None);
        assert!(report.disable_saving);
        assert!(report.fatal.contains(&FatalMessage::Truncated { where_: "string-table", missing: Some(2) }));
        assert_eq!(
            report.fatal.iter().find(|m| matches!(m, FatalMessage::Truncated { where_: "string-table", .. })).unwrap().to_string(),
            "Truncated string-table, 2 strings missing"
        );
    }

    /// S3: the historical Skyrim narrow-count-of-100 trigger sets the
    /// string-table-bug flag, the auditor treats it as fatal, and the
    /// re-encoder refuses to run at all.
    #[test]
    fn s3_string_table_bug_is_fatal_and_refuses_re_encode() {
        let mut w = Writer::new();
        w.write_u16(0x0002);
        w.write_u16(100); // the known Skyrim STB trigger count
        let bytes = w.into_vec();

        let ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        let graph = Papyrus::parse(&bytes, &ctx);

        assert!(graph.strings.string_table_bug);

        let report = AuditReport::audit(&graph, &summary(GameVariant::Skyrim, 1), None);
        assert!(report.disable_saving);
        assert!(report.fatal.contains(&FatalMessage::StringTableBug));

        assert!(graph.write(&ctx).is_err(), "a string-table-bug graph must refuse to re-encode");
    }

    /// S4: a script instance whose class name never resolves is reported
    /// as undefined, and the auditor raises exactly the warning spec §8
    /// names ("1 undefined element").
    #[test]
    fn s4_undefined_script_instance_warns() {
        let mut graph = Papyrus::empty();
        let class_name = graph.strings.intern("UnknownScript");
        let id = Eid::from_raw(11);
        graph.script_instances.insert(
            id,
            ScriptInstance {
                preamble: InstancePreamble { id, class_name, unknown16: 0, ref_id: 7, unknown8: 0, fo4_conditional_byte: None },
                data: None,
                resolved_class: None,
            },
        );
        assert!(graph.script_instances[&id].is_undefined());

        let report = AuditReport::audit(&graph, &summary(GameVariant::Skyrim, 1), None);
        assert!(!report.disable_saving);
        assert!(report.should_worry);
        assert!(report.warnings.contains(&WarningMessage::UndefinedElements(1)));
        assert_eq!(report.warnings.iter().find(|w| matches!(w, WarningMessage::UndefinedElements(_))).unwrap().to_string(), "1 undefined element");
    }

    fn graph_with_canary(script_name: &str, id: Eid, canary: i32) -> Papyrus {
        let mut graph = Papyrus::empty();
        let name = graph.strings.intern(script_name);
        let canary_name = graph.strings.intern("::iPapyrusDataVerification_var");
        let int_type = graph.strings.intern("Int");
        graph.scripts.insert(
            name.clone(),
            Script { name: name.clone(), parent_name: graph.strings.intern(""), members: vec![MemberDescriptor { name: canary_name, type_name: int_type }], missing_parent: false },
        );
        graph.script_instances.insert(
            id,
            ScriptInstance {
                preamble: InstancePreamble { id, class_name: name.clone(), unknown16: 0, ref_id: 1, unknown8: 0, fo4_conditional_byte: None },
                data: Some(InstanceData { flags: 0, state: graph.strings.intern(""), unknown1: 0, unknown2: 0, variables: vec![Variable::Integer(canary)] }),
                resolved_class: Some(name),
            },
        );
        graph
    }

    /// S5: a per-instance canary field transitioning non-zero to zero
    /// across two sequential saves of the same script instance is flagged
    /// by the auditor, carrying the previous value in its message.
    #[test]
    fn s5_canary_transition_is_flagged_across_sequential_saves() {
        let id = Eid::from_raw(900);
        let previous_graph = graph_with_canary("TestQuest", id, 0x1234);
        let previous_summary = summary(GameVariant::Skyrim, 10);
        // The script's empty parent name independently earns an
        // `EmptyParentName` warning every run; only the sequential-save
        // comparison (exercised below) is under test here.
        let previous_report = AuditReport::audit(&previous_graph, &previous_summary, None);

        let current_graph = graph_with_canary("TestQuest", id, 0);
        let current_summary = summary(GameVariant::Skyrim, 11);
        assert!(current_summary.is_sequential_to(&previous_summary));

        let current_report = AuditReport::audit(&current_graph, &current_summary, Some(&previous_report));
        assert!(current_report.should_worry);
        let found = current_report.warnings.iter().find(|w| matches!(w, WarningMessage::ZeroedCanary { .. })).expect("zeroed canary warning");
        assert_eq!(found.to_string(), "1 zeroed canary (TestQuest: 0x1234\u{2192}0)");
    }

    /// S6: a Fallout-4-variant block with a struct, a matching struct
    /// instance, and an active script carrying a `Type2` fragment task
    /// (which on Fallout 4 additionally carries an attached EID) round-trips
    /// byte-exact, and the struct instance's variable count matches its
    /// declaring struct's member count.
    #[test]
    fn s6_fallout4_round_trip_with_struct_and_fragment_task() {
        let ctx = EssContext::inert(GameVariant::Fallout4, true, true);
        let mut graph = Papyrus::empty();
        graph.strings = papyrus_format::StringTable::new(papyrus_format::IndexWidth::Wide);

        let struct_name = graph.strings.intern("Point");
        let x_name = graph.strings.intern("x");
        let y_name = graph.strings.intern("y");
        let float_type = graph.strings.intern("Float");
        let members = vec![
            MemberDescriptor { name: x_name, type_name: float_type.clone() },
            MemberDescriptor { name: y_name, type_name: float_type },
        ];
        graph.structs.insert(struct_name.clone(), Struct { name: struct_name.clone(), members: members.clone() });

        let struct_instance_id = Eid::from_raw(50);
        graph.struct_instances.insert(
            struct_instance_id,
            StructInstance {
                preamble: InstancePreamble {
                    id: struct_instance_id,
                    class_name: struct_name.clone(),
                    unknown16: 0,
                    ref_id: 3,
                    unknown8: 0,
                    fo4_conditional_byte: None,
                },
                data: Some(InstanceData {
                    flags: 0,
                    state: graph.strings.intern(""),
                    unknown1: 0,
                    unknown2: 0,
                    variables: vec![Variable::Float(1.0), Variable::Float(2.0)],
                }),
                resolved_class: Some(struct_name.clone()),
            },
        );

        let thread_id = Eid::from_raw(7);
        graph.active_scripts.insert(
            thread_id,
            ActiveScript {
                id: thread_id,
                kind: 1,
                data: Some(ActiveScriptData {
                    version_major: 1,
                    version_minor: 1,
                    owner: Variable::Null,
                    flags: 0b0000_0001, // has_fragment_task
                    unknown: 0,
                    fragment_task: Some(FragmentTask::Type2 { value: 99 }),
                    attached: Some(struct_instance_id),
                    frames: vec![],
                    trailing_byte: None,
                }),
                owner: None,
                suspended_stack: None,
            },
        );

        let bytes = graph.write(&ctx).expect("well-formed graph must re-encode");
        assert_eq!(bytes.len(), graph.calculate_size(&ctx));

        let reparsed = Papyrus::parse(&bytes, &ctx);
        assert!(reparsed.is_clean());
        assert_eq!(reparsed.write(&ctx).unwrap(), bytes, "round-trip must be byte-exact");

        let reparsed_struct = &reparsed.structs[&struct_name];
        let reparsed_instance = &reparsed.struct_instances[&struct_instance_id];
        assert_eq!(reparsed_instance.data.as_ref().unwrap().variables.len(), reparsed_struct.members.len());

        let reparsed_thread = &reparsed.active_scripts[&thread_id];
        assert_eq!(reparsed_thread.data.as_ref().unwrap().fragment_task, Some(FragmentTask::Type2 { value: 99 }));
        assert_eq!(reparsed_thread.data.as_ref().unwrap().attached, Some(struct_instance_id));
    }

    /// TypeTag ordinal sanity used by S6's manual `Variable::Float` construction
    /// exists purely to document which tag `Float` round-trips through.
    #[test]
    fn float_variable_tag_is_float() {
        assert_eq!(Variable::Float(1.0).tag(), TypeTag::Float);
    }
}

#[cfg(test)]
mod cross_crate_properties {
    use indexmap::IndexSet;
    use papyrus_audit::{AuditReport, EssSummary};
    use papyrus_format::{
        Eid, EssContext, GameVariant, InstanceData, InstancePreamble, Papyrus, Reference, ScriptInstance, Variable,
    };
    use papyrus_xref::{CrossReference, Element};

    fn bare_summary() -> EssSummary {
        EssSummary {
            game_variant: GameVariant::Skyrim,
            save_name: "Player".into(),
            save_number: 1,
            plugin_count: 2,
            ess_truncated: false,
            formid_array_truncated: false,
            savefile_data_len: 1,
            namespaces_with_resident_change_forms: IndexSet::new(),
        }
    }

    /// spec §8 testable property 8: for every reference-typed `Variable`
    /// with a resolved target, the target shows up in the general
    /// referrer index keyed by the owning element.
    #[test]
    fn referrer_index_records_every_resolved_reference_edge() {
        let mut graph = Papyrus::empty();
        let class_name = graph.strings.intern("Quest01");

        let target_id = Eid::from_raw(2);
        graph.script_instances.insert(
            target_id,
            ScriptInstance {
                preamble: InstancePreamble { id: target_id, class_name: class_name.clone(), unknown16: 0, ref_id: 1, unknown8: 0, fo4_conditional_byte: None },
                data: None,
                resolved_class: Some(class_name.clone()),
            },
        );

        let owner_id = Eid::from_raw(1);
        graph.script_instances.insert(
            owner_id,
            ScriptInstance {
                preamble: InstancePreamble { id: owner_id, class_name: class_name.clone(), unknown16: 0, ref_id: 1, unknown8: 0, fo4_conditional_byte: None },
                data: Some(InstanceData {
                    flags: 0,
                    state: graph.strings.intern(""),
                    unknown1: 0,
                    unknown2: 0,
                    variables: vec![Variable::Ref { class_name: class_name.clone(), target: target_id }],
                }),
                resolved_class: Some(class_name),
            },
        );

        let xref = CrossReference::new(&graph);
        let ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        let index = xref.referrer(&ctx);
        assert!(index.contains_edge(&Element::ScriptInstance(owner_id), &Element::ScriptInstance(target_id)));
        assert!(index.referrers_of(&Element::ScriptInstance(target_id)).contains(&Element::ScriptInstance(owner_id)));
    }

    /// spec §8 testable property 9: after the clean/extend fixed point,
    /// every distinct pair of plugin-reachable sets is disjoint — an
    /// object reachable from two plugins is eliminated from both.
    #[test]
    fn plugin_index_eliminates_shared_reachable_elements() {
        let mut graph = Papyrus::empty();
        let class_name = graph.strings.intern("SharedScript");

        let shared_id = Eid::from_raw(100);
        graph.references.insert(
            shared_id,
            Reference {
                preamble: InstancePreamble { id: shared_id, class_name: class_name.clone(), unknown16: 0, ref_id: 0, unknown8: 0, fo4_conditional_byte: None },
                data: None,
                resolved_class: Some(class_name.clone()),
            },
        );

        // Two plugin-owned references, each holding a Ref variable pointing
        // at the same shared reference: after one "extend" hop both plugins
        // reach `shared_id`, so "clean" must eliminate it from both.
        let plugin_a_id = Eid::from_raw(1);
        graph.references.insert(
            plugin_a_id,
            Reference {
                preamble: InstancePreamble { id: plugin_a_id, class_name: class_name.clone(), unknown16: 0, ref_id: 0x01_00_00_01, unknown8: 0, fo4_conditional_byte: None },
                data: Some(InstanceData {
                    flags: 0,
                    state: graph.strings.intern(""),
                    unknown1: 0,
                    unknown2: 0,
                    variables: vec![Variable::Ref { class_name: class_name.clone(), target: shared_id }],
                }),
                resolved_class: Some(class_name.clone()),
            },
        );
        let plugin_b_id = Eid::from_raw(2);
        graph.references.insert(
            plugin_b_id,
            Reference {
                preamble: InstancePreamble { id: plugin_b_id, class_name: class_name.clone(), unknown16: 0, ref_id: 0x02_00_00_01, unknown8: 0, fo4_conditional_byte: None },
                data: Some(InstanceData {
                    flags: 0,
                    state: graph.strings.intern(""),
                    unknown1: 0,
                    unknown2: 0,
                    variables: vec![Variable::Ref { class_name, target: shared_id }],
                }),
                resolved_class: graph.references[&shared_id].resolved_class.clone(),
            },
        );

        let mut ctx = EssContext::inert(GameVariant::Skyrim, false, false);
        ctx.plugin_for_refid = Box::new(|refid| match refid >> 24 {
            1 => Some("PluginA.esp".to_string()),
            2 => Some("PluginB.esp".to_string()),
            _ => None,
        });

        let xref = CrossReference::new(&graph);
        let plugin_index = xref.plugin(&ctx);
        assert!(plugin_index.is_disjoint());
        assert!(plugin_index.eliminated().contains(&Element::Reference(shared_id)));
        assert!(!plugin_index.reachable("PluginA.esp").contains(&Element::Reference(shared_id)));
        assert!(!plugin_index.reachable("PluginB.esp").contains(&Element::Reference(shared_id)));
    }

    /// spec §8 testable property 10: running the auditor twice on the same
    /// (current, previous) pair yields equal reports.
    #[test]
    fn auditor_is_deterministic_across_repeated_runs() {
        let mut graph = Papyrus::empty();
        graph.truncated = true; // gives the report some actual content to compare

        let previous = AuditReport::audit(&Papyrus::empty(), &bare_summary(), None);
        let first = AuditReport::audit(&graph, &bare_summary(), Some(&previous));
        let second = AuditReport::audit(&graph, &bare_summary(), Some(&previous));

        assert_eq!(first.fatal, second.fatal);
        assert_eq!(first.warnings, second.warnings);
        assert_eq!(first.disable_saving, second.disable_saving);
        assert_eq!(first.should_worry, second.should_worry);
    }
}
