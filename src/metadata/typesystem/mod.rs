//! .NET type model for expression binding.
//!
//! This module provides the type definitions of a module snapshot and the resolved type
//! handle [`CilType`] that the binder and code generator work with.
//!
//! # Key Components
//!
//! - [`TypeDefinition`]: A type defined in a loaded module, with its members
//! - [`TypeSignature`]: A type as written in a member signature, not yet bound to a module
//! - [`CilType`]: A fully resolved type (named instantiation or array)
//! - [`ModuleBuilder`] / [`TypeBuilder`]: Construct module snapshots
//! - [`CilPrimitiveKind`]: Built-in types spelled with a keyword
//!
//! # Naming
//!
//! Definitions are keyed by their metadata name, where nesting is separated by `+` and
//! generic arity is written with a backtick: `Ns.C+S`1`. [`CilType`] displays in
//! host-language spelling instead: `int`, `int?`, `Ns.C.S<int>`, `int[,]`.
//!
//! # Examples
//!
//! ```rust
//! use exprscope::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};
//! use exprscope::metadata::typesystem::CilPrimitiveKind;
//!
//! let mut modules = ModuleSet::new();
//! modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
//!
//! let int = modules.primitive(CilPrimitiveKind::I4)?;
//! assert_eq!(int.to_string(), "int");
//! assert!(int.is_value_type());
//! # Ok::<(), exprscope::Error>(())
//! ```

mod base;
mod builder;
mod primitives;

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

pub use base::{TypeKind, TypeSignature};
pub use builder::{ModuleBuilder, TypeBuilder};
pub use primitives::CilPrimitiveKind;

use crate::metadata::{module::ModuleId, token::Token};

/// Full metadata name of the nullable wrapper, displayed as `T?`
pub const NULLABLE_TYPE_NAME: &str = "System.Nullable`1";

/// A field of a type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Declared field type
    pub signature: TypeSignature,
    /// Static fields are accessed with `ldsfld`/`stsfld`
    pub is_static: bool,
}

/// A read-only property of a type definition, exposed through its `get` accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    /// Property name
    pub name: String,
    /// Declared property type
    pub signature: TypeSignature,
    /// Static properties are called without a receiver
    pub is_static: bool,
}

/// A parameter of a method definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    /// Parameter name
    pub name: String,
    /// Declared type, without the by-reference marker
    pub signature: TypeSignature,
    /// `ref`/`out` parameter
    pub by_ref: bool,
}

/// A method of a type definition.
///
/// ```rust
/// use exprscope::metadata::typesystem::{MethodDefinition, TypeSignature};
///
/// let method = MethodDefinition::static_method("F")
///     .with_generic_params(&["T"])
///     .ref_param("t", TypeSignature::MethodParameter(0))
///     .returns(TypeSignature::MethodParameter(0));
/// assert!(method.is_static);
/// assert!(method.params[0].by_ref);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDefinition {
    /// Method name
    pub name: String,
    /// Static methods are called without a receiver
    pub is_static: bool,
    /// Names of the method's own generic parameters
    pub generic_params: Vec<String>,
    /// Parameters, in declaration order
    pub params: Vec<ParameterDefinition>,
    /// Return type, `None` for `void`
    pub returns: Option<TypeSignature>,
}

impl MethodDefinition {
    /// An instance method without parameters returning `void`
    pub fn instance(name: impl Into<String>) -> Self {
        MethodDefinition {
            name: name.into(),
            is_static: false,
            generic_params: Vec::new(),
            params: Vec::new(),
            returns: None,
        }
    }

    /// A static method without parameters returning `void`
    pub fn static_method(name: impl Into<String>) -> Self {
        MethodDefinition {
            is_static: true,
            ..Self::instance(name)
        }
    }

    /// Declare the method's generic parameters
    #[must_use]
    pub fn with_generic_params(mut self, names: &[&str]) -> Self {
        self.generic_params = names.iter().map(|name| (*name).to_string()).collect();
        self
    }

    /// Append a by-value parameter
    #[must_use]
    pub fn param(mut self, name: &str, signature: impl Into<TypeSignature>) -> Self {
        self.params.push(ParameterDefinition {
            name: name.to_string(),
            signature: signature.into(),
            by_ref: false,
        });
        self
    }

    /// Append a `ref` parameter
    #[must_use]
    pub fn ref_param(mut self, name: &str, signature: impl Into<TypeSignature>) -> Self {
        self.params.push(ParameterDefinition {
            name: name.to_string(),
            signature: signature.into(),
            by_ref: true,
        });
        self
    }

    /// Set the return type
    #[must_use]
    pub fn returns(mut self, signature: impl Into<TypeSignature>) -> Self {
        self.returns = Some(signature.into());
        self
    }
}

/// A type defined in a loaded module.
///
/// Nested types list their enclosing types outermost first in `enclosing`. Following the CLI
/// convention, `generic_params` holds every generic parameter in scope, those re-declared
/// from enclosing types first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    /// `TypeDef` token, unique within the defining module
    pub token: Token,
    /// Namespace, empty for the global namespace and for nested types' own segment
    pub namespace: String,
    /// Simple name including the arity suffix (e.g. "S`1")
    pub name: String,
    /// Names of enclosing types, outermost first, including their arity suffixes
    pub enclosing: Vec<String>,
    /// Class, value type or interface
    pub kind: TypeKind,
    /// Generic parameter names
    pub generic_params: Vec<String>,
    /// Base type, `None` for `System.Object` and interfaces
    pub base: Option<TypeSignature>,
    /// Fields
    pub fields: Vec<FieldDefinition>,
    /// Properties
    pub properties: Vec<PropertyDefinition>,
    /// Methods
    pub methods: Vec<MethodDefinition>,
    /// Set for the core library's built-in types
    pub primitive: Option<CilPrimitiveKind>,
}

impl TypeDefinition {
    /// Returns the full metadata name, e.g. "Ns.C+S`1"
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut name = String::new();
        if !self.namespace.is_empty() {
            name.push_str(&self.namespace);
            name.push('.');
        }
        for outer in &self.enclosing {
            name.push_str(outer);
            name.push('+');
        }
        name.push_str(&self.name);
        name
    }

    /// Name segments from the outermost enclosing type to this type
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.enclosing
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.name.as_str()))
    }

    /// Returns true for `System.Nullable`1`
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.enclosing.is_empty()
            && self.namespace == "System"
            && self.name == "Nullable`1"
            && self.kind == TypeKind::ValueType
    }

    /// Find a field by exact name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Find a property by exact name
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|property| property.name == name)
    }

    /// All methods with the given name
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDefinition> {
        self.methods.iter().filter(move |method| method.name == name)
    }
}

/// Split the backtick arity suffix off a metadata name segment ("S`1" -> ("S", 1)).
#[must_use]
pub fn split_arity(segment: &str) -> (&str, usize) {
    if let Some(position) = segment.rfind('`') {
        if let Ok(arity) = segment[position + 1..].parse::<usize>() {
            return (&segment[..position], arity);
        }
    }
    (segment, 0)
}

/// A named type bound to its defining module, with generic arguments.
#[derive(Debug, Clone)]
pub struct NamedType {
    /// Module that defines the type
    pub module: ModuleId,
    /// The definition, shared with the module snapshot
    pub definition: Arc<TypeDefinition>,
    /// Generic arguments, one per entry of `definition.generic_params`
    pub args: Vec<CilType>,
}

impl PartialEq for NamedType {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module
            && self.definition.token == other.definition.token
            && self.args == other.args
    }
}

impl Eq for NamedType {}

impl Hash for NamedType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module.hash(state);
        self.definition.token.hash(state);
        self.args.hash(state);
    }
}

/// A fully resolved type.
///
/// Equality is structural over the defining module, the definition token and the generic
/// arguments, so two resolutions of the same instantiation compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CilType {
    /// Named type or generic instantiation
    Named(NamedType),
    /// Array type
    Array {
        /// Element type
        element: Box<CilType>,
        /// Number of dimensions, at least 1
        rank: u32,
    },
}

impl CilType {
    /// Create a named type
    #[must_use]
    pub fn named(module: ModuleId, definition: Arc<TypeDefinition>, args: Vec<CilType>) -> Self {
        CilType::Named(NamedType {
            module,
            definition,
            args,
        })
    }

    /// Create an array of `element`
    #[must_use]
    pub fn array(element: CilType, rank: u32) -> Self {
        CilType::Array {
            element: Box::new(element),
            rank,
        }
    }

    /// The definition of a named type, `None` for arrays
    #[must_use]
    pub fn definition(&self) -> Option<&Arc<TypeDefinition>> {
        match self {
            CilType::Named(named) => Some(&named.definition),
            CilType::Array { .. } => None,
        }
    }

    /// Generic arguments of a named type, empty for arrays
    #[must_use]
    pub fn generic_args(&self) -> &[CilType] {
        match self {
            CilType::Named(named) => &named.args,
            CilType::Array { .. } => &[],
        }
    }

    /// The built-in kind of this type, if any
    #[must_use]
    pub fn primitive(&self) -> Option<CilPrimitiveKind> {
        self.definition().and_then(|definition| definition.primitive)
    }

    /// Returns true if this type is a value type
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(self.definition(), Some(definition) if definition.kind == TypeKind::ValueType)
    }

    /// Returns true if values of this type are object references
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        !self.is_value_type()
    }

    /// Returns true for instantiations of `System.Nullable`1`
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self.definition(), Some(definition) if definition.is_nullable())
    }

    /// Returns true for `System.Object`
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.primitive() == Some(CilPrimitiveKind::Object)
    }

    /// Returns true for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        matches!(self.definition(), Some(definition) if definition.kind == TypeKind::Interface)
    }

    /// Full metadata name of a named type, or the display name of an array
    #[must_use]
    pub fn metadata_name(&self) -> String {
        match self.definition() {
            Some(definition) => definition.full_name(),
            None => self.to_string(),
        }
    }

    fn fmt_named(named: &NamedType, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let definition = &named.definition;
        if let Some(kind) = definition.primitive {
            return write!(f, "{kind}");
        }
        if definition.is_nullable() && named.args.len() == 1 {
            return write!(f, "{}?", named.args[0]);
        }

        if !definition.namespace.is_empty() {
            write!(f, "{}.", definition.namespace)?;
        }

        let mut remaining = named.args.as_slice();
        for (i, segment) in definition.segments().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            let (name, arity) = split_arity(segment);
            write!(f, "{name}")?;

            let take = arity.min(remaining.len());
            if take > 0 {
                let (own, rest) = remaining.split_at(take);
                write!(f, "<")?;
                for (j, arg) in own.iter().enumerate() {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")?;
                remaining = rest;
            }
        }
        Ok(())
    }
}

impl fmt::Display for CilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CilType::Named(named) => Self::fmt_named(named, f),
            CilType::Array { .. } => {
                let mut ranks = Vec::new();
                let mut current = self;
                while let CilType::Array { element, rank } = current {
                    ranks.push(*rank);
                    current = element;
                }
                write!(f, "{current}")?;
                for rank in ranks {
                    write!(f, "[{}]", ",".repeat(rank.saturating_sub(1) as usize))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};

    fn snapshot() -> ModuleSet {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        modules.add(
            ModuleBuilder::named("A")
                .class("C", |t| t)
                .value_type("C+S`1", |t| t.generic_params(&["T"]))
                .class("N.Outer`1+Inner`1", |t| t.generic_params(&["T", "U"]))
                .build(),
        );
        modules
    }

    #[test]
    fn test_split_arity() {
        assert_eq!(split_arity("S`1"), ("S", 1));
        assert_eq!(split_arity("Dictionary`2"), ("Dictionary", 2));
        assert_eq!(split_arity("C"), ("C", 0));
        assert_eq!(split_arity("odd`name"), ("odd`name", 0));
    }

    #[test]
    fn test_definition_names() {
        let modules = snapshot();
        let a = modules.find_module("A").unwrap();
        let s = a.type_by_name("C+S`1").unwrap();
        assert_eq!(s.full_name(), "C+S`1");
        assert_eq!(s.segments().collect::<Vec<_>>(), vec!["C", "S`1"]);
        assert_eq!(s.kind, TypeKind::ValueType);

        let inner = a.type_by_name("N.Outer`1+Inner`1").unwrap();
        assert_eq!(inner.namespace, "N");
        assert_eq!(inner.enclosing, vec!["Outer`1".to_string()]);
    }

    #[test]
    fn test_display_host_spelling() {
        let modules = snapshot();
        let a = modules.find_module("A").unwrap();
        let int = modules.primitive(CilPrimitiveKind::I4).unwrap();
        let string = modules.primitive(CilPrimitiveKind::String).unwrap();

        let s = CilType::named(a.id, a.type_by_name("C+S`1").unwrap(), vec![int.clone()]);
        assert_eq!(s.to_string(), "C.S<int>");
        assert!(s.is_value_type());

        let inner = CilType::named(
            a.id,
            a.type_by_name("N.Outer`1+Inner`1").unwrap(),
            vec![int.clone(), string.clone()],
        );
        assert_eq!(inner.to_string(), "N.Outer<int>.Inner<string>");

        let nullable = modules.core_type(NULLABLE_TYPE_NAME, vec![int.clone()]).unwrap();
        assert_eq!(nullable.to_string(), "int?");
        assert!(nullable.is_nullable());

        assert_eq!(CilType::array(int.clone(), 2).to_string(), "int[,]");
        assert_eq!(
            CilType::array(CilType::array(int, 2), 1).to_string(),
            "int[][,]"
        );

        let io = modules.core_type("System.IO.IOException", vec![]).unwrap();
        assert_eq!(io.to_string(), "System.IO.IOException");
        assert!(io.is_reference_type());
    }

    #[test]
    fn test_structural_equality() {
        let modules = snapshot();
        let first = modules.primitive(CilPrimitiveKind::Object).unwrap();
        let second = modules.core_type("System.Object", vec![]).unwrap();
        assert_eq!(first, second);
        assert!(first.is_object());
        assert_ne!(first, modules.primitive(CilPrimitiveKind::String).unwrap());
    }
}
