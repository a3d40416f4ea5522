use std::fmt;

use crate::metadata::typesystem::CilPrimitiveKind;

/// Kind of a type definition, as far as code generation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Reference type deriving from `System.Object`
    Class,
    /// Value type deriving from `System.ValueType`
    ValueType,
    /// Interface, always a reference type
    Interface,
}

/// A type as written in a member signature, before it is bound to a loaded module.
///
/// Signatures refer to other types by full metadata name (`Ns.Outer+Inner`1`) and an
/// optional defining assembly. Without an assembly the name is looked up in the declaring
/// module first, then in the core library. Generic parameters are positional, as in
/// ECMA-335 II.23.2.12 (`!n` for the declaring type, `!!n` for the method).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    /// A named type, possibly a generic instantiation
    Named {
        /// Simple name of the defining assembly, `None` for the declaring module or core library
        assembly: Option<String>,
        /// Full metadata name
        name: String,
        /// Generic arguments, in declaration order
        args: Vec<TypeSignature>,
    },
    /// Generic parameter of the declaring type (`!n`)
    TypeParameter(u32),
    /// Generic parameter of the method (`!!n`)
    MethodParameter(u32),
    /// Array with the given rank
    Array {
        /// Element type
        element: Box<TypeSignature>,
        /// Number of dimensions, at least 1
        rank: u32,
    },
}

impl TypeSignature {
    /// A non-generic named type looked up in the declaring module, then the core library
    pub fn named(name: impl Into<String>) -> Self {
        TypeSignature::Named {
            assembly: None,
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A generic instantiation of a named type
    pub fn generic(name: impl Into<String>, args: Vec<TypeSignature>) -> Self {
        TypeSignature::Named {
            assembly: None,
            name: name.into(),
            args,
        }
    }

    /// A named type defined in another assembly
    pub fn in_assembly(assembly: impl Into<String>, name: impl Into<String>) -> Self {
        TypeSignature::Named {
            assembly: Some(assembly.into()),
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// An array of `element` with the given rank
    #[must_use]
    pub fn array(element: TypeSignature, rank: u32) -> Self {
        TypeSignature::Array {
            element: Box::new(element),
            rank,
        }
    }
}

impl From<&str> for TypeSignature {
    fn from(name: &str) -> Self {
        TypeSignature::named(name)
    }
}

impl From<CilPrimitiveKind> for TypeSignature {
    fn from(kind: CilPrimitiveKind) -> Self {
        TypeSignature::named(kind.clr_full_name())
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Named {
                assembly,
                name,
                args,
            } => {
                if let Some(assembly) = assembly {
                    write!(f, "[{assembly}]")?;
                }
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeSignature::TypeParameter(index) => write!(f, "!{index}"),
            TypeSignature::MethodParameter(index) => write!(f, "!!{index}"),
            TypeSignature::Array { element, rank } => {
                write!(f, "{element}[{}]", ",".repeat(rank.saturating_sub(1) as usize))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_display() {
        let sig = TypeSignature::generic(
            "System.Nullable`1",
            vec![TypeSignature::from(CilPrimitiveKind::I4)],
        );
        assert_eq!(sig.to_string(), "System.Nullable`1<System.Int32>");

        let sig = TypeSignature::array(TypeSignature::TypeParameter(0), 2);
        assert_eq!(sig.to_string(), "!0[,]");

        let sig = TypeSignature::in_assembly("B", "B");
        assert_eq!(sig.to_string(), "[B]B");
    }
}
