//! Module snapshot of a suspended process.
//!
//! This module provides the [`ModuleSet`], an ordered, immutable snapshot of every module
//! loaded in the debuggee, and [`LoadedModule`], one entry of that snapshot.
//!
//! # Lookup Architecture
//!
//! Each module keeps two indices over its type definitions:
//!
//! - **Token-based lookup**: `TypeDef` row to definition
//! - **Name-based lookup**: full metadata name (`Ns.C+S`1`) to definition
//!
//! The set itself is searched by module id or by simple assembly name. The *core library*
//! is the first module that defines `System.Object`.
//!
//! # Thread Safety
//!
//! A [`ModuleSet`] is built once per request and never mutated afterwards. It is
//! `Send + Sync`, so independent compilations may share one snapshot.
//!
//! # Examples
//!
//! ```rust
//! use exprscope::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};
//! use exprscope::metadata::typesystem::ModuleBuilder;
//!
//! let mut modules = ModuleSet::new();
//! modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
//! let a = modules.add(ModuleBuilder::named("A").class("C", |t| t).build());
//!
//! assert_eq!(modules.core_library().map(|m| m.name()), Some("mscorlib"));
//! assert!(modules.module(a).and_then(|m| m.type_by_name("C")).is_some());
//! ```

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    metadata::{
        identity::{AssemblyIdentity, AssemblyIdentityRef},
        token::Token,
        typesystem::{CilPrimitiveKind, CilType, TypeDefinition, TypeSignature},
    },
    Error, Result,
};

/// Full metadata name of the type that identifies the core library
pub const CORE_LIBRARY_ROOT_TYPE: &str = "System.Object";

/// Opaque identifier of a module within one [`ModuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// One loaded module: its assembly identity and the types it defines.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Position in the owning [`ModuleSet`], assigned by [`ModuleSet::add`]
    pub id: ModuleId,
    /// Identity of the assembly this module belongs to
    pub identity: AssemblyIdentity,
    types: Vec<Arc<TypeDefinition>>,
    by_name: FxHashMap<String, usize>,
}

impl LoadedModule {
    /// Create a module from its identity and type definitions.
    ///
    /// When two definitions share a full name the first one wins.
    #[must_use]
    pub fn new(identity: AssemblyIdentity, definitions: Vec<TypeDefinition>) -> Self {
        let mut by_name = FxHashMap::default();
        let mut types = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let full_name = definition.full_name();
            if by_name.contains_key(&full_name) {
                log::warn!(
                    "duplicate type definition '{}' in module '{}' ignored",
                    full_name,
                    identity.name
                );
                continue;
            }
            by_name.insert(full_name, types.len());
            types.push(Arc::new(definition));
        }

        LoadedModule {
            id: ModuleId::default(),
            identity,
            types,
            by_name,
        }
    }

    /// Simple assembly name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Look up a type definition by full metadata name
    #[must_use]
    pub fn type_by_name(&self, full_name: &str) -> Option<Arc<TypeDefinition>> {
        self.by_name
            .get(full_name)
            .map(|&index| self.types[index].clone())
    }

    /// Look up a type definition by `TypeDef` token
    #[must_use]
    pub fn type_by_token(&self, token: Token) -> Option<Arc<TypeDefinition>> {
        self.types
            .iter()
            .find(|definition| definition.token == token)
            .cloned()
    }

    /// All type definitions, in declaration order
    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeDefinition>> {
        self.types.iter()
    }

    /// Number of type definitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if the module defines no types
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Ordered snapshot of loaded modules.
#[derive(Debug, Clone, Default)]
pub struct ModuleSet {
    modules: Vec<LoadedModule>,
}

impl ModuleSet {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module and return the id assigned to it
    pub fn add(&mut self, mut module: LoadedModule) -> ModuleId {
        #[allow(clippy::cast_possible_truncation)]
        let id = ModuleId(self.modules.len() as u32);
        module.id = id;
        self.modules.push(module);
        id
    }

    /// Look up a module by id
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&LoadedModule> {
        self.modules.get(id.0 as usize)
    }

    /// All modules, in load order
    #[must_use]
    pub fn modules(&self) -> &[LoadedModule] {
        &self.modules
    }

    /// Number of loaded modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no module is loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All modules whose simple name matches, ignoring case
    pub fn modules_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LoadedModule> {
        self.modules
            .iter()
            .filter(move |module| module.name().eq_ignore_ascii_case(name))
    }

    /// The first module whose simple name matches, ignoring case
    #[must_use]
    pub fn find_module(&self, name: &str) -> Option<&LoadedModule> {
        self.modules
            .iter()
            .find(|module| module.name().eq_ignore_ascii_case(name))
    }

    /// The module defining `System.Object`
    #[must_use]
    pub fn core_library(&self) -> Option<&LoadedModule> {
        self.modules
            .iter()
            .find(|module| module.type_by_name(CORE_LIBRARY_ROOT_TYPE).is_some())
    }

    /// Instantiate a type of the core library.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] if there is no core library or it lacks the type, and
    /// [`Error::UnsupportedType`] if the argument count does not match the definition.
    pub fn core_type(&self, full_name: &str, args: Vec<CilType>) -> Result<CilType> {
        let core = self
            .core_library()
            .ok_or_else(|| Error::TypeNotFound(full_name.to_string()))?;
        let definition = core
            .type_by_name(full_name)
            .ok_or_else(|| Error::TypeNotFound(full_name.to_string()))?;
        if definition.generic_params.len() != args.len() {
            return Err(Error::UnsupportedType(full_name.to_string()));
        }
        Ok(CilType::named(core.id, definition, args))
    }

    /// The core library's definition of a built-in type.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] if the core library does not define it.
    pub fn primitive(&self, kind: CilPrimitiveKind) -> Result<CilType> {
        self.core_type(kind.clr_full_name(), Vec::new())
    }

    /// Bind a member signature to loaded types.
    ///
    /// Names without an assembly are looked up in `scope` first, then in the core library.
    /// Generic parameters are substituted from `type_args` (`!n`) and `method_args` (`!!n`).
    ///
    /// # Errors
    /// Returns [`Error::MissingAssembly`] for a named assembly that is not loaded,
    /// [`Error::TypeNotFound`] for an unknown name and [`Error::UnsupportedType`] for an
    /// argument count mismatch. An out-of-range generic parameter is reported as
    /// [`Error::Malformed`].
    pub fn resolve_signature(
        &self,
        signature: &TypeSignature,
        scope: ModuleId,
        type_args: &[CilType],
        method_args: &[CilType],
    ) -> Result<CilType> {
        match signature {
            TypeSignature::Named {
                assembly,
                name,
                args,
            } => {
                let (module, definition) = match assembly {
                    Some(assembly) => {
                        let module = self.find_module(assembly).ok_or_else(|| {
                            Error::MissingAssembly(vec![AssemblyIdentityRef::named(
                                assembly.as_str(),
                            )])
                        })?;
                        let definition = module
                            .type_by_name(name)
                            .ok_or_else(|| Error::TypeNotFound(name.clone()))?;
                        (module.id, definition)
                    }
                    None => self
                        .module(scope)
                        .and_then(|module| module.type_by_name(name).map(|d| (module.id, d)))
                        .or_else(|| {
                            self.core_library()
                                .and_then(|core| core.type_by_name(name).map(|d| (core.id, d)))
                        })
                        .ok_or_else(|| Error::TypeNotFound(name.clone()))?,
                };

                if definition.generic_params.len() != args.len() {
                    return Err(Error::UnsupportedType(name.clone()));
                }

                let args = args
                    .iter()
                    .map(|arg| self.resolve_signature(arg, scope, type_args, method_args))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CilType::named(module, definition, args))
            }
            TypeSignature::TypeParameter(index) => type_args
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| malformed_error!("type parameter !{} out of range", index)),
            TypeSignature::MethodParameter(index) => method_args
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| malformed_error!("method type parameter !!{} out of range", index)),
            TypeSignature::Array { element, rank } => Ok(CilType::array(
                self.resolve_signature(element, scope, type_args, method_args)?,
                *rank,
            )),
        }
    }

    /// The direct base type of `ty`, with the base signature instantiated.
    ///
    /// Arrays derive from `System.Array` when the core library defines it, otherwise from
    /// `System.Object`.
    ///
    /// # Errors
    /// Returns an error if the base signature cannot be bound.
    pub fn base_type(&self, ty: &CilType) -> Result<Option<CilType>> {
        match ty {
            CilType::Named(named) => match &named.definition.base {
                Some(base) => self
                    .resolve_signature(base, named.module, &named.args, &[])
                    .map(Some),
                None => Ok(None),
            },
            CilType::Array { .. } => match self.core_type("System.Array", Vec::new()) {
                Ok(array) => Ok(Some(array)),
                Err(_) => self.primitive(CilPrimitiveKind::Object).map(Some),
            },
        }
    }

    /// Returns true if `derived` is `base` or inherits from it through the base chain.
    ///
    /// # Errors
    /// Returns an error if a base signature in the chain cannot be bound, or the chain
    /// exceeds `max_depth`.
    pub fn derives_from(&self, derived: &CilType, base: &CilType, max_depth: usize) -> Result<bool> {
        let mut current = Some(derived.clone());
        let mut depth = 0;
        while let Some(ty) = current {
            if &ty == base {
                return Ok(true);
            }
            depth += 1;
            if depth > max_depth {
                return Err(Error::RecursionLimit(max_depth));
            }
            current = self.base_type(&ty)?;
        }
        Ok(false)
    }
}
