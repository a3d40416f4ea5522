//! Builders for module snapshots.
//!
//! This module provides [`ModuleBuilder`] and [`TypeBuilder`], a fluent API for describing
//! the types of a loaded module. Debugger hosts use it to mirror the modules of the
//! suspended process; tests use it to set up scenarios without any binary input.
//!
//! # Example
//!
//! ```rust
//! use exprscope::metadata::typesystem::{CilPrimitiveKind, MethodDefinition, ModuleBuilder};
//!
//! let module = ModuleBuilder::named("A")
//!     .class("C", |t| {
//!         t.field("o", CilPrimitiveKind::Object).method(
//!             MethodDefinition::static_method("M").returns(CilPrimitiveKind::I4),
//!         )
//!     })
//!     .value_type("C+S`1", |t| t.generic_params(&["T"]))
//!     .build();
//!
//! assert_eq!(module.name(), "A");
//! assert!(module.type_by_name("C+S`1").is_some());
//! ```

use crate::metadata::{
    identity::{AssemblyIdentity, AssemblyVersion},
    module::LoadedModule,
    token::Token,
    typesystem::{
        split_arity, CilPrimitiveKind, FieldDefinition, MethodDefinition, PropertyDefinition,
        TypeDefinition, TypeKind, TypeSignature,
    },
};

/// Provides a fluent API for building a single type definition
pub struct TypeBuilder {
    definition: TypeDefinition,
    explicit_base: bool,
}

impl TypeBuilder {
    fn new(full_name: &str, kind: TypeKind) -> Self {
        let mut segments: Vec<String> = full_name.split('+').map(str::to_string).collect();
        let mut namespace = String::new();
        if let Some(first) = segments.first_mut() {
            if let Some(dot) = first.rfind('.') {
                namespace = first[..dot].to_string();
                *first = first[dot + 1..].to_string();
            }
        }
        let name = segments.pop().unwrap_or_default();

        TypeBuilder {
            definition: TypeDefinition {
                token: Token::new(0),
                namespace,
                name,
                enclosing: segments,
                kind,
                generic_params: Vec::new(),
                base: None,
                fields: Vec::new(),
                properties: Vec::new(),
                methods: Vec::new(),
                primitive: None,
            },
            explicit_base: false,
        }
    }

    /// Name the generic parameters in scope, outer type's first
    #[must_use]
    pub fn generic_params(mut self, names: &[&str]) -> Self {
        self.definition.generic_params = names.iter().map(|name| (*name).to_string()).collect();
        self
    }

    /// Set the base type
    #[must_use]
    pub fn extends(mut self, base: impl Into<TypeSignature>) -> Self {
        self.definition.base = Some(base.into());
        self.explicit_base = true;
        self
    }

    /// Add an instance field
    #[must_use]
    pub fn field(mut self, name: &str, signature: impl Into<TypeSignature>) -> Self {
        self.definition.fields.push(FieldDefinition {
            name: name.to_string(),
            signature: signature.into(),
            is_static: false,
        });
        self
    }

    /// Add a static field
    #[must_use]
    pub fn static_field(mut self, name: &str, signature: impl Into<TypeSignature>) -> Self {
        self.definition.fields.push(FieldDefinition {
            name: name.to_string(),
            signature: signature.into(),
            is_static: true,
        });
        self
    }

    /// Add an instance property with a getter
    #[must_use]
    pub fn property(mut self, name: &str, signature: impl Into<TypeSignature>) -> Self {
        self.definition.properties.push(PropertyDefinition {
            name: name.to_string(),
            signature: signature.into(),
            is_static: false,
        });
        self
    }

    /// Add a static property with a getter
    #[must_use]
    pub fn static_property(mut self, name: &str, signature: impl Into<TypeSignature>) -> Self {
        self.definition.properties.push(PropertyDefinition {
            name: name.to_string(),
            signature: signature.into(),
            is_static: true,
        });
        self
    }

    /// Add a method
    #[must_use]
    pub fn method(mut self, method: MethodDefinition) -> Self {
        self.definition.methods.push(method);
        self
    }

    /// Mark the type as one of the core library's built-in types
    #[must_use]
    pub fn primitive(mut self, kind: CilPrimitiveKind) -> Self {
        self.definition.primitive = Some(kind);
        self
    }

    fn finish(mut self, token: Token) -> TypeDefinition {
        let definition = &mut self.definition;
        definition.token = token;

        let arity: usize = definition
            .segments()
            .map(|segment| split_arity(segment).1)
            .sum();
        for index in definition.generic_params.len()..arity {
            definition.generic_params.push(format!("T{index}"));
        }

        if !self.explicit_base && definition.primitive != Some(CilPrimitiveKind::Object) {
            definition.base = match definition.kind {
                TypeKind::Class => Some(TypeSignature::from(CilPrimitiveKind::Object)),
                TypeKind::ValueType => Some(TypeSignature::named("System.ValueType")),
                TypeKind::Interface => None,
            };
        }

        self.definition
    }
}

/// Provides a fluent API for building a [`LoadedModule`]
pub struct ModuleBuilder {
    identity: AssemblyIdentity,
    types: Vec<TypeBuilder>,
}

impl ModuleBuilder {
    /// Create a builder for the module with the given identity
    #[must_use]
    pub fn new(identity: AssemblyIdentity) -> Self {
        ModuleBuilder {
            identity,
            types: Vec::new(),
        }
    }

    /// Create a builder for a culture-neutral, unsigned module with version 1.0.0.0
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self::new(AssemblyIdentity::simple(
            name,
            AssemblyVersion::new(1, 0, 0, 0),
        ))
    }

    /// Add a reference type deriving from `System.Object` unless `extends` says otherwise
    #[must_use]
    pub fn class(self, full_name: &str, build: impl FnOnce(TypeBuilder) -> TypeBuilder) -> Self {
        self.add(full_name, TypeKind::Class, build)
    }

    /// Add a value type deriving from `System.ValueType`
    #[must_use]
    pub fn value_type(
        self,
        full_name: &str,
        build: impl FnOnce(TypeBuilder) -> TypeBuilder,
    ) -> Self {
        self.add(full_name, TypeKind::ValueType, build)
    }

    /// Add an interface
    #[must_use]
    pub fn interface(
        self,
        full_name: &str,
        build: impl FnOnce(TypeBuilder) -> TypeBuilder,
    ) -> Self {
        self.add(full_name, TypeKind::Interface, build)
    }

    fn add(
        mut self,
        full_name: &str,
        kind: TypeKind,
        build: impl FnOnce(TypeBuilder) -> TypeBuilder,
    ) -> Self {
        self.types.push(build(TypeBuilder::new(full_name, kind)));
        self
    }

    /// Assign `TypeDef` tokens in declaration order and build the module
    #[must_use]
    pub fn build(self) -> LoadedModule {
        let definitions = self
            .types
            .into_iter()
            .zip(1u32..)
            .map(|(builder, row)| builder.finish(Token::type_def(row)))
            .collect();
        LoadedModule::new(self.identity, definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_follow_declaration_order() {
        let module = ModuleBuilder::named("A")
            .class("A", |t| t)
            .class("B", |t| t)
            .build();

        let a = module.type_by_name("A").unwrap();
        let b = module.type_by_name("B").unwrap();
        assert_eq!(a.token, Token::type_def(1));
        assert_eq!(b.token, Token::type_def(2));
        assert_eq!(module.type_by_token(Token::type_def(2)).unwrap().name, "B");
    }

    #[test]
    fn test_default_base_types() {
        let module = ModuleBuilder::named("A")
            .class("C", |t| t)
            .value_type("S", |t| t)
            .interface("I", |t| t)
            .class("D", |t| t.extends("C"))
            .build();

        assert_eq!(
            module.type_by_name("C").unwrap().base,
            Some(TypeSignature::named("System.Object"))
        );
        assert_eq!(
            module.type_by_name("S").unwrap().base,
            Some(TypeSignature::named("System.ValueType"))
        );
        assert_eq!(module.type_by_name("I").unwrap().base, None);
        assert_eq!(
            module.type_by_name("D").unwrap().base,
            Some(TypeSignature::named("C"))
        );
    }

    #[test]
    fn test_generic_params_are_padded_to_arity() {
        let module = ModuleBuilder::named("A")
            .class("Ns.Outer`1+Inner`2", |t| t.generic_params(&["T"]))
            .build();

        let inner = module.type_by_name("Ns.Outer`1+Inner`2").unwrap();
        assert_eq!(inner.generic_params, vec!["T", "T1", "T2"]);
        assert_eq!(inner.namespace, "Ns");
        assert_eq!(inner.name, "Inner`2");
    }
}
