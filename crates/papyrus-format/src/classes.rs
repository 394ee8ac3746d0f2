//! Class definitions — spec §3 "Class definitions" (`Script`, `Struct`).

use crate::strings::TString;
use crate::value::MemberDescriptor;
use indexmap::IndexMap;

/// A script class definition: name, parent name, and ordered members.
/// Scripts form a single-inheritance chain resolved after load by looking
/// up the parent name.
#[derive(Debug, Clone)]
pub struct Script {
    /// This script's name.
    pub name: TString,
    /// The parent script's name, as read from the wire (may not resolve).
    pub parent_name: TString,
    /// This script's own members, not including inherited ones.
    pub members: Vec<MemberDescriptor>,
    /// Set after resolution if `parent_name` did not match a known script.
    pub missing_parent: bool,
}

impl Script {
    /// Resolves `parent_name` against `scripts`, setting `missing_parent`
    /// when the lookup fails. Called once after every script in the table
    /// has been decoded.
    pub fn resolve_parent(&mut self, scripts: &IndexMap<TString, Script>) -> Option<TString> {
        if self.parent_name.as_str().is_empty() {
            self.missing_parent = false;
            return None;
        }
        match scripts.get_key_value(&self.parent_name) {
            Some((key, _)) => {
                self.missing_parent = false;
                Some(key.clone())
            }
            None => {
                self.missing_parent = true;
                None
            }
        }
    }

    /// True iff `parent_name` is empty (spec §4.6 "any script with empty
    /// parent name").
    pub fn has_empty_parent_name(&self) -> bool {
        self.parent_name.as_str().is_empty()
    }

    /// This script's members concatenated after every ancestor's members,
    /// root-most first. `scripts` must contain every script in the save so
    /// ancestor lookups succeed; an unresolved ancestor simply stops the
    /// chain (the script's `missing_parent` flag already records that).
    pub fn extended_members(&self, scripts: &IndexMap<TString, Script>) -> Vec<MemberDescriptor> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        let mut visited = std::collections::HashSet::new();
        while let Some(script) = current {
            if !visited.insert(script.name.clone()) {
                break; // defensive: a cycle in parent names must not loop forever
            }
            chain.push(script);
            current = scripts.get(&script.parent_name);
        }
        let mut members = Vec::new();
        for script in chain.into_iter().rev() {
            members.extend(script.members.iter().cloned());
        }
        members
    }
}

/// A struct class definition: name and ordered members (Fallout-4 only).
#[derive(Debug, Clone)]
pub struct Struct {
    /// This struct's name.
    pub name: TString,
    /// Ordered member descriptors.
    pub members: Vec<MemberDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::{IndexWidth, StringTable};

    fn tstring(table: &mut StringTable, s: &str) -> TString {
        table.intern(s)
    }

    #[test]
    fn extended_members_concatenate_ancestor_first() {
        let mut table = StringTable::new(IndexWidth::Wide);
        let base_name = tstring(&mut table, "Base");
        let child_name = tstring(&mut table, "Child");

        let base = Script {
            name: base_name.clone(),
            parent_name: tstring(&mut table, ""),
            members: vec![MemberDescriptor { name: tstring(&mut table, "hp"), type_name: tstring(&mut table, "Int") }],
            missing_parent: false,
        };
        let child = Script {
            name: child_name.clone(),
            parent_name: base_name.clone(),
            members: vec![MemberDescriptor { name: tstring(&mut table, "mana"), type_name: tstring(&mut table, "Int") }],
            missing_parent: false,
        };

        let mut scripts = IndexMap::new();
        scripts.insert(base.name.clone(), base);
        scripts.insert(child.name.clone(), child.clone());

        let extended = child.extended_members(&scripts);
        assert_eq!(extended.len(), 2);
        assert_eq!(extended[0].name.as_str(), "hp");
        assert_eq!(extended[1].name.as_str(), "mana");
    }

    #[test]
    fn unresolved_parent_sets_missing_parent_flag() {
        let mut table = StringTable::new(IndexWidth::Wide);
        let mut orphan = Script {
            name: tstring(&mut table, "Orphan"),
            parent_name: tstring(&mut table, "GhostParent"),
            members: vec![],
            missing_parent: false,
        };
        let scripts = IndexMap::new();
        let resolved = orphan.resolve_parent(&scripts);
        assert!(resolved.is_none());
        assert!(orphan.missing_parent);
    }
}
