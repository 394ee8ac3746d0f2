//! Type tags, variables, and member descriptors — spec §3.

use crate::eid::Eid;
use crate::error::FormatError;
use crate::strings::TString;

/// One of the fifteen wire type tags: eight scalar kinds (`Null` through
/// `Struct`) and seven "array-of-T" counterparts, one per non-`Null` scalar.
/// Ordinal 7 (`Struct`) is the last scalar tag; ordinals 8 and up are array
/// tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// No value.
    Null = 0,
    /// Reference to an object instance.
    Ref = 1,
    /// Interned string.
    String = 2,
    /// 32-bit signed integer.
    Integer = 3,
    /// 32-bit float.
    Float = 4,
    /// Boolean.
    Boolean = 5,
    /// Nested polymorphic value.
    Variant = 6,
    /// Reference to a struct instance.
    Struct = 7,
    /// Array of `Ref`.
    ArrayRef = 8,
    /// Array of `String`.
    ArrayString = 9,
    /// Array of `Integer`.
    ArrayInteger = 10,
    /// Array of `Float`.
    ArrayFloat = 11,
    /// Array of `Boolean`.
    ArrayBoolean = 12,
    /// Array of `Variant`.
    ArrayVariant = 13,
    /// Array of `Struct`.
    ArrayStruct = 14,
}

impl TypeTag {
    /// Decodes a tag from its wire ordinal.
    pub fn from_ordinal(ordinal: u8) -> Result<Self, FormatError> {
        use TypeTag::*;
        Ok(match ordinal {
            0 => Null,
            1 => Ref,
            2 => String,
            3 => Integer,
            4 => Float,
            5 => Boolean,
            6 => Variant,
            7 => Struct,
            8 => ArrayRef,
            9 => ArrayString,
            10 => ArrayInteger,
            11 => ArrayFloat,
            12 => ArrayBoolean,
            13 => ArrayVariant,
            14 => ArrayStruct,
            other => {
                return Err(FormatError::new("type tag", format!("invalid ordinal {other}")));
            }
        })
    }

    /// This tag's wire ordinal.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// True for the seven `ArrayOfT` tags (ordinal >= 8).
    pub fn is_array(self) -> bool {
        self.ordinal() >= TypeTag::ArrayRef.ordinal()
    }

    /// True for a reference-kind tag (`Ref` or `Struct`, scalar or array).
    pub fn is_reference_kind(self) -> bool {
        matches!(self, TypeTag::Ref | TypeTag::Struct | TypeTag::ArrayRef | TypeTag::ArrayStruct)
    }

    /// The `ArrayOfT` tag for this scalar tag, if one exists (`Null` has none).
    pub fn array_of(self) -> Option<TypeTag> {
        if self.is_array() || self == TypeTag::Null {
            return None;
        }
        TypeTag::from_ordinal(self.ordinal() + 7).ok()
    }

    /// The scalar tag this array tag is an array of, if this is an array tag.
    pub fn scalar_of(self) -> Option<TypeTag> {
        if !self.is_array() {
            return None;
        }
        TypeTag::from_ordinal(self.ordinal() - 7).ok()
    }
}

/// The polymorphic value cell held by every container (spec §3 "Variable").
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    /// Absence of a value.
    Null,
    /// 32-bit signed integer.
    Integer(i32),
    /// 32-bit float.
    Float(f32),
    /// Boolean.
    Boolean(bool),
    /// Interned string.
    String(TString),
    /// Reference to an object instance.
    Ref {
        /// Static class name of the reference.
        class_name: TString,
        /// Target element identifier (zero sentinel = unset).
        target: Eid,
    },
    /// Reference to a struct instance. Same shape as `Ref`, distinct tag.
    Struct {
        /// Static class name of the struct.
        class_name: TString,
        /// Target element identifier (zero sentinel = unset).
        target: Eid,
    },
    /// Handle to a heap array.
    Array {
        /// Element type of the referenced array.
        element_type: TypeTag,
        /// Static element class name, if the element type is reference-kind.
        class_name: Option<TString>,
        /// The array's element identifier.
        target: Eid,
    },
    /// A nested value, one level of indirection deep.
    Variant(Box<Variable>),
}

impl Variable {
    /// This value's wire type tag.
    pub fn tag(&self) -> TypeTag {
        match self {
            Variable::Null => TypeTag::Null,
            Variable::Integer(_) => TypeTag::Integer,
            Variable::Float(_) => TypeTag::Float,
            Variable::Boolean(_) => TypeTag::Boolean,
            Variable::String(_) => TypeTag::String,
            Variable::Ref { .. } => TypeTag::Ref,
            Variable::Struct { .. } => TypeTag::Struct,
            Variable::Array { element_type, .. } => {
                element_type.array_of().unwrap_or(TypeTag::ArrayVariant)
            }
            Variable::Variant(_) => TypeTag::Variant,
        }
    }

    /// The EID this value references, if it is a `Ref`, `Struct`, or `Array`.
    pub fn target_eid(&self) -> Option<Eid> {
        match self {
            Variable::Ref { target, .. } | Variable::Struct { target, .. } | Variable::Array { target, .. } => {
                Some(*target)
            }
            _ => None,
        }
    }
}

/// A (name, type-name) pair owned by a class definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    /// Member name.
    pub name: TString,
    /// Declared type name (e.g. `"Int"`, `"MyQuest"`, `"Float[]"`).
    pub type_name: TString,
}

/// A function parameter descriptor — same shape as `MemberDescriptor`, with
/// its own `Display` in the pretty-printer (spec §3 "Stack frame").
pub type FunctionParam = MemberDescriptor;

/// A function local descriptor — same shape as `MemberDescriptor`.
pub type FunctionLocal = MemberDescriptor;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_roundtrips_ordinals() {
        for ord in 0..=14u8 {
            let tag = TypeTag::from_ordinal(ord).unwrap();
            assert_eq!(tag.ordinal(), ord);
        }
        assert!(TypeTag::from_ordinal(15).is_err());
    }

    #[test]
    fn array_kind_starts_at_ordinal_eight() {
        assert!(!TypeTag::Struct.is_array());
        assert!(TypeTag::ArrayRef.is_array());
    }

    #[test]
    fn array_of_and_scalar_of_are_inverses() {
        for scalar in [
            TypeTag::Ref,
            TypeTag::String,
            TypeTag::Integer,
            TypeTag::Float,
            TypeTag::Boolean,
            TypeTag::Variant,
            TypeTag::Struct,
        ] {
            let array = scalar.array_of().unwrap();
            assert!(array.is_array());
            assert_eq!(array.scalar_of().unwrap(), scalar);
        }
        assert!(TypeTag::Null.array_of().is_none());
    }
}
