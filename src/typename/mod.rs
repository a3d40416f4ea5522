//! Assembly-qualified type names.
//!
//! Debugger inspection contexts describe the runtime type of a pseudo-variable either as a
//! live handle or as an assembly-qualified type name in reflection syntax, such as
//!
//! ```text
//! System.Collections.Generic.List`1[[System.Int32, mscorlib]], mscorlib, Version=4.0.0.0
//! Ns.Outer+Inner`1[System.String][,]
//! ```
//!
//! This module parses such names into a [`TypeStructuralReference`] tree. Parsing is purely
//! syntactic; mapping the tree onto loaded modules is the job of [`crate::resolver`].
//!
//! # Grammar
//!
//! ```text
//! AssemblyQualifiedName := TypeSpec [ ',' AssemblyName ]
//! TypeSpec    := NamePath [ GenericArgs ] Suffix*
//! NamePath    := Segment ( '+' Segment )*
//! Segment     := Identifier [ '`' Digits ]
//! GenericArgs := '[' GenericArg ( ',' GenericArg )* ']'
//! GenericArg  := '[' AssemblyQualifiedName ']' | TypeSpec
//! Suffix      := '[' ','* ']' | '[*]' | '*' | '&'
//! ```
//!
//! Identifiers may escape the metacharacters `, + [ ] * & \` and the backtick with a
//! backslash; an escaped backtick is part of the name and never starts an arity. Arities
//! run from 1 to [`MAX_GENERIC_ARITY`]. Generic arguments are only recognized after a
//! segment with an arity, and their number must match the total arity of the path.
//!
//! # Examples
//!
//! ```rust
//! use exprscope::typename::{TypeOrigin, TypeStructuralReference, TypeSuffix};
//!
//! let reference = TypeStructuralReference::parse("C+S`1[[System.Int32, mscorlib]][,], A")?;
//! assert_eq!(reference.full_name(), "C+S`1");
//! assert_eq!(reference.arity(), 1);
//! assert_eq!(reference.generic_args[0].full_name(), "System.Int32");
//! assert_eq!(reference.suffixes, vec![TypeSuffix::Array(2)]);
//! assert_eq!(reference.array_rank(), 2);
//! assert!(matches!(&reference.origin, TypeOrigin::Assembly(a) if a.name == "A"));
//! # Ok::<(), exprscope::typename::TypeNameError>(())
//! ```

mod parser;

use std::{fmt, str::FromStr};

use thiserror::Error;

pub use parser::TypeNameParser;

use crate::metadata::{identity::AssemblyIdentityRef, module::ModuleId, typesystem::split_arity};

/// Default limit for generic argument nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Largest array rank the runtime supports
pub const MAX_ARRAY_RANK: u32 = 32;

/// Largest generic arity accepted on one name segment, the generic parameter table limit
pub const MAX_GENERIC_ARITY: usize = u16::MAX as usize;

/// Failure to parse an assembly-qualified type name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeNameError {
    /// Input ended in the middle of a construct
    #[error("Unexpected end of type name")]
    UnexpectedEnd,

    /// A character that does not fit the grammar at this point
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter {
        /// The offending character
        character: char,
        /// Character offset into the input
        position: usize,
    },

    /// A name segment without any identifier characters
    #[error("Empty name at position {0}")]
    EmptyName(usize),

    /// A backtick not followed by a decimal arity in `1..=MAX_GENERIC_ARITY`
    #[error("Invalid generic arity at position {0}")]
    InvalidArity(usize),

    /// Number of generic arguments differs from the declared arity
    #[error("Expected {expected} generic arguments, found {found}")]
    ArityMismatch {
        /// Total arity of the name path
        expected: usize,
        /// Number of arguments supplied
        found: usize,
    },

    /// Array rank outside 1..=32
    #[error("Invalid array rank {0}")]
    InvalidArrayRank(u32),

    /// The assembly part is empty or not a display name
    #[error("Invalid assembly name '{0}'")]
    InvalidAssemblyName(String),

    /// The `Version` component is not a valid version
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    /// The `Culture` component is not a valid culture name
    #[error("Invalid culture '{0}'")]
    InvalidCulture(String),

    /// The `PublicKeyToken` component is not 16 hex digits or `null`
    #[error("Invalid public key token '{0}'")]
    InvalidPublicKeyToken(String),

    /// Generic arguments are nested deeper than the configured limit
    #[error("Type name nesting exceeds {0} levels")]
    NestingTooDeep(usize),
}

/// A type modifier following the name and generic arguments, applied left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeSuffix {
    /// Array of the given rank. `[]` and `[*]` both have rank 1
    Array(u32),
    /// Unmanaged pointer (`*`)
    Pointer,
    /// Managed reference (`&`)
    ByRef,
}

/// Where a type reference should be looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeOrigin {
    /// A named assembly, from the assembly-qualified name
    Assembly(AssemblyIdentityRef),
    /// A specific loaded module, for references built from live handles
    Module(ModuleId),
    /// No origin given: the context module first, then the core library
    Unqualified,
}

/// One `+`-separated segment of a type name: the unescaped identifier and its own arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameSegment {
    /// Identifier without the arity suffix, escapes removed
    pub name: String,
    /// Generic parameters declared by this segment
    pub arity: usize,
}

impl NameSegment {
    /// Create a segment from its parts
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        NameSegment {
            name: name.into(),
            arity,
        }
    }

    /// Split a metadata segment such as `S`1` into name and arity
    #[must_use]
    pub fn from_metadata_name(segment: &str) -> Self {
        let (name, arity) = split_arity(segment);
        NameSegment::new(name, arity)
    }

    /// The segment as it appears in metadata, `S`1` for a generic segment
    #[must_use]
    pub fn metadata_name(&self) -> String {
        if self.arity == 0 {
            self.name.clone()
        } else {
            format!("{}`{}", self.name, self.arity)
        }
    }
}

pub(crate) fn total_arity(path: &[NameSegment]) -> usize {
    path.iter()
        .fold(0usize, |total, segment| total.saturating_add(segment.arity))
}

/// Parsed form of an assembly-qualified type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeStructuralReference {
    /// Nesting path, outermost first. The first segment carries the namespace
    pub path: Vec<NameSegment>,
    /// Generic arguments, as many as the total arity of `path`
    pub generic_args: Vec<TypeStructuralReference>,
    /// Array, pointer and by-ref modifiers, innermost first
    pub suffixes: Vec<TypeSuffix>,
    /// Lookup origin
    pub origin: TypeOrigin,
}

impl TypeStructuralReference {
    /// Create an unqualified reference from a full metadata name such as `Ns.C+S`1`
    pub fn new(full_name: &str) -> Self {
        TypeStructuralReference {
            path: full_name.split('+').map(NameSegment::from_metadata_name).collect(),
            generic_args: Vec::new(),
            suffixes: Vec::new(),
            origin: TypeOrigin::Unqualified,
        }
    }

    /// Parse an assembly-qualified type name with the default nesting limit.
    ///
    /// # Errors
    /// Returns a [`TypeNameError`] describing the first syntax problem.
    pub fn parse(input: &str) -> Result<Self, TypeNameError> {
        Self::parse_with_max_depth(input, DEFAULT_MAX_DEPTH)
    }

    /// Parse an assembly-qualified type name with an explicit nesting limit.
    ///
    /// # Errors
    /// Returns a [`TypeNameError`] describing the first syntax problem.
    pub fn parse_with_max_depth(input: &str, max_depth: usize) -> Result<Self, TypeNameError> {
        TypeNameParser::new(input, max_depth).parse()
    }

    /// Replace the generic arguments
    #[must_use]
    pub fn with_args(mut self, args: Vec<TypeStructuralReference>) -> Self {
        self.generic_args = args;
        self
    }

    /// Append a suffix
    #[must_use]
    pub fn with_suffix(mut self, suffix: TypeSuffix) -> Self {
        self.suffixes.push(suffix);
        self
    }

    /// Replace the origin
    #[must_use]
    pub fn with_origin(mut self, origin: TypeOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// The full metadata name, nesting separated by `+`
    #[must_use]
    pub fn full_name(&self) -> String {
        self.path
            .iter()
            .map(NameSegment::metadata_name)
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Namespace of the outermost segment, empty for the global namespace
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.path
            .first()
            .and_then(|first| first.name.rfind('.').map(|dot| &first.name[..dot]))
            .unwrap_or("")
    }

    /// Total generic arity over all segments
    #[must_use]
    pub fn arity(&self) -> usize {
        total_arity(&self.path)
    }

    /// Rank of the outermost array suffix, 0 if the outermost suffix is not an array
    #[must_use]
    pub fn array_rank(&self) -> u32 {
        match self.suffixes.last() {
            Some(TypeSuffix::Array(rank)) => *rank,
            _ => 0,
        }
    }

    /// Returns true if any suffix is a pointer or by-ref
    #[must_use]
    pub fn has_indirection(&self) -> bool {
        self.suffixes
            .iter()
            .any(|suffix| matches!(suffix, TypeSuffix::Pointer | TypeSuffix::ByRef))
    }

    /// The type name without its assembly part
    #[must_use]
    pub fn type_name(&self) -> String {
        let mut name = String::new();
        self.write_type_spec(&mut name);
        name
    }

    fn write_type_spec(&self, out: &mut String) {
        for (i, segment) in self.path.iter().enumerate() {
            if i > 0 {
                out.push('+');
            }
            escape_into(&segment.name, out);
            if segment.arity > 0 {
                out.push('`');
                out.push_str(&segment.arity.to_string());
            }
        }

        if !self.generic_args.is_empty() {
            out.push('[');
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                match &arg.origin {
                    TypeOrigin::Assembly(_) => {
                        out.push('[');
                        out.push_str(&arg.to_string());
                        out.push(']');
                    }
                    _ => arg.write_type_spec(out),
                }
            }
            out.push(']');
        }

        for suffix in &self.suffixes {
            match suffix {
                TypeSuffix::Array(rank) => {
                    out.push('[');
                    out.push_str(&",".repeat(rank.saturating_sub(1) as usize));
                    out.push(']');
                }
                TypeSuffix::Pointer => out.push('*'),
                TypeSuffix::ByRef => out.push('&'),
            }
        }
    }
}

fn escape_into(name: &str, out: &mut String) {
    for c in name.chars() {
        if parser::is_metacharacter(c) {
            out.push('\\');
        }
        out.push(c);
    }
}

impl fmt::Display for TypeStructuralReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())?;
        if let TypeOrigin::Assembly(assembly) = &self.origin {
            write!(f, ", {assembly}")?;
        }
        Ok(())
    }
}

impl FromStr for TypeStructuralReference {
    type Err = TypeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_accessors() {
        let reference = TypeStructuralReference::new("Ns.Outer`1+Inner`2")
            .with_suffix(TypeSuffix::Array(1))
            .with_suffix(TypeSuffix::Array(3));
        assert_eq!(reference.namespace(), "Ns");
        assert_eq!(reference.arity(), 3);
        assert_eq!(reference.array_rank(), 3);
        assert!(!reference.has_indirection());
        assert_eq!(reference.type_name(), "Ns.Outer`1+Inner`2[][,,]");
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let text = "A`1[[B`1[[System.Object, mscorlib]], B]], A";
        let reference = TypeStructuralReference::parse(text).unwrap();
        let reparsed = TypeStructuralReference::parse(&reference.to_string()).unwrap();
        assert_eq!(reference, reparsed);
    }

    #[test]
    fn test_display_escapes_metacharacters() {
        let reference = TypeStructuralReference::parse(r"Odd\,Name").unwrap();
        assert_eq!(reference.path, vec![NameSegment::new("Odd,Name", 0)]);
        assert_eq!(reference.type_name(), r"Odd\,Name");
    }
}
