//! Heap arrays — spec §3 "Heap array" (`ArrayInfo`).

use crate::eid::Eid;
use crate::strings::TString;
use crate::value::{TypeTag, Variable};

/// A heap array: element type, optional element class name, declared
/// length, and a separately-loaded vector of exactly that many `Variable`s.
#[derive(Debug, Clone)]
pub struct ArrayInfo {
    /// This array's element identifier.
    pub id: Eid,
    /// Element type of every value in `data`.
    pub element_type: TypeTag,
    /// Element class name, present iff `element_type` is reference-kind.
    pub element_class_name: Option<TString>,
    /// Declared length, read in the preamble pass.
    pub declared_length: u32,
    /// The elements themselves, loaded in the data-blob pass.
    pub data: Option<Vec<Variable>>,
}

impl ArrayInfo {
    /// True iff `data` is loaded and its length equals `declared_length`
    /// (spec §8 testable property 6).
    pub fn length_is_consistent(&self) -> bool {
        match &self.data {
            Some(v) => v.len() as u32 == self.declared_length,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_consistency_holds_when_counts_match() {
        let array = ArrayInfo {
            id: Eid::from_raw(9),
            element_type: TypeTag::Integer,
            element_class_name: None,
            declared_length: 2,
            data: Some(vec![Variable::Integer(1), Variable::Integer(2)]),
        };
        assert!(array.length_is_consistent());
    }

    #[test]
    fn length_consistency_fails_when_counts_differ() {
        let array = ArrayInfo {
            id: Eid::from_raw(9),
            element_type: TypeTag::Integer,
            element_class_name: None,
            declared_length: 3,
            data: Some(vec![Variable::Integer(1)]),
        };
        assert!(!array.length_is_consistent());
    }
}
