//! Module resolution of structural type references.
//!
//! The [`ModuleResolver`] maps a [`TypeStructuralReference`] onto a concrete [`CilType`]
//! against a [`ModuleSet`] snapshot. It searches every loaded module, not only the ones the
//! compilation's module references: a debuggee can hand out objects whose types come from
//! assemblies the current method never mentions.
//!
//! # Resolution Rules
//!
//! - **Assembly origin**: the modules accepted by the [`AssemblyMatchPolicy`] are searched,
//!   those with the referenced version first. No accepted module yields
//!   [`ResolutionOutcome::MissingAssembly`], the host may load it and retry.
//! - **Module origin**: that module only.
//! - **Unqualified**: the context module, then the core library.
//! - A type that is absent, has a different number of generic parameters, or carries a
//!   pointer or by-ref suffix yields [`ResolutionOutcome::UnsupportedType`].
//! - Generic arguments resolve recursively; the first failing argument decides the outcome.
//!
//! # Examples
//!
//! ```rust
//! use exprscope::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};
//! use exprscope::resolver::{ModuleResolver, ResolutionOutcome};
//! use exprscope::typename::TypeStructuralReference;
//!
//! let mut modules = ModuleSet::new();
//! modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
//!
//! let reference = TypeStructuralReference::parse("System.Int32[,], mscorlib, Version=2.0.0.0")?;
//! match ModuleResolver::new(&modules).resolve(&reference) {
//!     ResolutionOutcome::Resolved(ty) => assert_eq!(ty.to_string(), "int[,]"),
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! let missing = TypeStructuralReference::parse("B, B")?;
//! assert!(matches!(
//!     ModuleResolver::new(&modules).resolve(&missing),
//!     ResolutionOutcome::MissingAssembly(_)
//! ));
//! # Ok::<(), exprscope::typename::TypeNameError>(())
//! ```

mod policy;

pub use policy::{AssemblyMatchPolicy, AssemblyMatching, ExactMatch, NameOnlyMatch};

use crate::{
    metadata::{
        identity::AssemblyIdentityRef,
        module::{LoadedModule, ModuleId, ModuleSet},
        typesystem::CilType,
    },
    typename::{TypeOrigin, TypeStructuralReference, TypeSuffix, DEFAULT_MAX_DEPTH},
    Error, Result,
};

/// Result of resolving one structural reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The reference names a loaded type
    Resolved(CilType),
    /// The type cannot be represented; loading more assemblies would not help
    UnsupportedType(String),
    /// Assemblies needed by the type or its generic arguments are not loaded, each listed once
    MissingAssembly(Vec<AssemblyIdentityRef>),
}

impl ResolutionOutcome {
    /// Returns true for [`ResolutionOutcome::Resolved`]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionOutcome::Resolved(_))
    }

    /// Convert into a result, mapping failures to the matching [`Error`] variant.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedType`] or [`Error::MissingAssembly`].
    pub fn into_result(self) -> Result<CilType> {
        match self {
            ResolutionOutcome::Resolved(ty) => Ok(ty),
            ResolutionOutcome::UnsupportedType(name) => Err(Error::UnsupportedType(name)),
            ResolutionOutcome::MissingAssembly(identities) => Err(Error::MissingAssembly(identities)),
        }
    }
}

/// Resolves structural references against a module snapshot
pub struct ModuleResolver<'a> {
    modules: &'a ModuleSet,
    context_module: Option<ModuleId>,
    policy: &'a dyn AssemblyMatchPolicy,
    max_depth: usize,
}

impl<'a> ModuleResolver<'a> {
    /// Create a resolver with the default [`NameOnlyMatch`] policy and no context module
    #[must_use]
    pub fn new(modules: &'a ModuleSet) -> Self {
        ModuleResolver {
            modules,
            context_module: None,
            policy: AssemblyMatching::NameOnly.policy(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the module searched first for unqualified references
    #[must_use]
    pub fn with_context_module(mut self, module: ModuleId) -> Self {
        self.context_module = Some(module);
        self
    }

    /// Replace the assembly matching policy
    #[must_use]
    pub fn with_policy(mut self, policy: &'a dyn AssemblyMatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Limit the generic argument nesting followed before giving up
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve a reference to a loaded type
    #[must_use]
    pub fn resolve(&self, reference: &TypeStructuralReference) -> ResolutionOutcome {
        self.resolve_at(reference, 1)
    }

    fn resolve_at(&self, reference: &TypeStructuralReference, depth: usize) -> ResolutionOutcome {
        if depth > self.max_depth || reference.has_indirection() {
            return ResolutionOutcome::UnsupportedType(reference.type_name());
        }

        // Missing assemblies are collected over the whole argument tree so the host can
        // load all of them before retrying
        let mut missing = Vec::new();
        let found = match self.candidates(&reference.origin) {
            Ok(candidates) => {
                let full_name = reference.full_name();
                let Some(found) = candidates.iter().find_map(|module| {
                    module
                        .type_by_name(&full_name)
                        .map(|definition| (module.id, definition))
                }) else {
                    log::debug!(
                        "type '{}' not found in {} candidate module(s)",
                        full_name,
                        candidates.len()
                    );
                    return ResolutionOutcome::UnsupportedType(reference.type_name());
                };
                if found.1.generic_params.len() != reference.generic_args.len() {
                    return ResolutionOutcome::UnsupportedType(reference.type_name());
                }
                Some(found)
            }
            Err(ResolutionOutcome::MissingAssembly(identities)) => {
                merge_missing(&mut missing, identities);
                None
            }
            Err(outcome) => return outcome,
        };

        let mut args = Vec::with_capacity(reference.generic_args.len());
        for arg in &reference.generic_args {
            match self.resolve_at(arg, depth + 1) {
                ResolutionOutcome::Resolved(ty) => args.push(ty),
                ResolutionOutcome::MissingAssembly(identities) => {
                    merge_missing(&mut missing, identities);
                }
                unsupported @ ResolutionOutcome::UnsupportedType(_) => return unsupported,
            }
        }

        let Some((module, definition)) = found.filter(|_| missing.is_empty()) else {
            return ResolutionOutcome::MissingAssembly(missing);
        };

        let mut ty = CilType::named(module, definition, args);
        for suffix in &reference.suffixes {
            if let TypeSuffix::Array(rank) = suffix {
                ty = CilType::array(ty, *rank);
            }
        }

        log::trace!("resolved '{}' to '{}' in {}", reference, ty, module);
        ResolutionOutcome::Resolved(ty)
    }

    fn candidates(
        &self,
        origin: &TypeOrigin,
    ) -> std::result::Result<Vec<&'a LoadedModule>, ResolutionOutcome> {
        match origin {
            TypeOrigin::Assembly(reference) => {
                let mut matching: Vec<&LoadedModule> = self
                    .modules
                    .modules()
                    .iter()
                    .filter(|module| self.policy.matches(reference, &module.identity))
                    .collect();
                if matching.is_empty() {
                    return Err(ResolutionOutcome::MissingAssembly(vec![reference.clone()]));
                }
                matching.sort_by_key(|module| reference.version != Some(module.identity.version));
                Ok(matching)
            }
            TypeOrigin::Module(id) => match self.modules.module(*id) {
                Some(module) => Ok(vec![module]),
                None => Err(ResolutionOutcome::UnsupportedType(id.to_string())),
            },
            TypeOrigin::Unqualified => {
                let mut modules = Vec::with_capacity(2);
                if let Some(context) = self.context_module.and_then(|id| self.modules.module(id)) {
                    modules.push(context);
                }
                if let Some(core) = self.modules.core_library() {
                    if modules.iter().all(|module| module.id != core.id) {
                        modules.push(core);
                    }
                }
                Ok(modules)
            }
        }
    }
}

fn merge_missing(missing: &mut Vec<AssemblyIdentityRef>, identities: Vec<AssemblyIdentityRef>) {
    for identity in identities {
        if !missing.contains(&identity) {
            missing.push(identity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        corlib,
        identity::{AssemblyIdentity, AssemblyVersion},
        typesystem::ModuleBuilder,
    };

    fn snapshot() -> (ModuleSet, ModuleId) {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        let a = modules.add(
            ModuleBuilder::new(AssemblyIdentity::simple(
                "A",
                AssemblyVersion::new(2, 1, 2, 1),
            ))
            .class("A`1", |t| t.generic_params(&["T"]))
            .value_type("S", |t| t)
            .build(),
        );
        modules.add(ModuleBuilder::named("B").class("B", |t| t).build());
        (modules, a)
    }

    fn resolve(modules: &ModuleSet, text: &str) -> ResolutionOutcome {
        let reference = TypeStructuralReference::parse(text).unwrap();
        ModuleResolver::new(modules).resolve(&reference)
    }

    #[test]
    fn test_resolve_generic_across_assemblies() {
        let (modules, _) = snapshot();
        let outcome = resolve(
            &modules,
            "A`1[[B, B, Version=1.0.0.0]], A, Version=1.1.1.1, Culture=neutral, PublicKeyToken=null",
        );
        match outcome {
            ResolutionOutcome::Resolved(ty) => assert_eq!(ty.to_string(), "A<B>"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_exact_policy_rejects_version_skew() {
        let (modules, _) = snapshot();
        let reference = TypeStructuralReference::parse("S, A, Version=1.1.1.1").unwrap();
        let outcome = ModuleResolver::new(&modules)
            .with_policy(&ExactMatch)
            .resolve(&reference);
        assert_eq!(
            outcome,
            ResolutionOutcome::MissingAssembly(vec![
                AssemblyIdentityRef::parse("A, Version=1.1.1.1").unwrap()
            ])
        );
    }

    #[test]
    fn test_missing_assembly_in_argument_propagates() {
        let (modules, _) = snapshot();
        let outcome = resolve(&modules, "A`1[[C, C]], A");
        assert_eq!(
            outcome,
            ResolutionOutcome::MissingAssembly(vec![AssemblyIdentityRef::named("C")])
        );
    }

    #[test]
    fn test_collects_every_missing_assembly() {
        let (modules, _) = snapshot();
        let outcome = resolve(&modules, "X`2[[C, C],[D`1[[C, C]], D]], E");
        assert_eq!(
            outcome,
            ResolutionOutcome::MissingAssembly(vec![
                AssemblyIdentityRef::named("E"),
                AssemblyIdentityRef::named("C"),
                AssemblyIdentityRef::named("D"),
            ])
        );

        // An unsupported argument takes precedence over missing assemblies
        assert!(matches!(
            resolve(&modules, "A`1[[System.Int32*, mscorlib]], Nowhere"),
            ResolutionOutcome::UnsupportedType(_)
        ));
    }

    #[test]
    fn test_nested_generic_with_array_argument() {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        modules.add(
            ModuleBuilder::new(AssemblyIdentity::simple("A", AssemblyVersion::new(2, 1, 2, 1)))
                .class("A`1", |t| t.generic_params(&["T"]))
                .build(),
        );
        modules.add(
            ModuleBuilder::new(AssemblyIdentity::simple("B", AssemblyVersion::new(1, 2, 2, 2)))
                .class("B`1", |t| t.generic_params(&["T"]))
                .build(),
        );

        let text = "B`1[[A`1[[System.Object, mscorlib, Version=2.0.0.0]][], A, Version=1.1.1.1]][,], B, Version=1.2.2.2";
        match resolve(&modules, text) {
            ResolutionOutcome::Resolved(ty) => assert_eq!(ty.to_string(), "B<A<object>[]>[,]"),
            other => panic!("unexpected {other:?}"),
        }

        let reference = TypeStructuralReference::parse(text).unwrap();
        let reparsed = TypeStructuralReference::parse(&reference.to_string()).unwrap();
        assert_eq!(reparsed, reference);
    }

    #[test]
    fn test_unsupported_types() {
        let (modules, _) = snapshot();
        assert!(matches!(
            resolve(&modules, "Missing, A"),
            ResolutionOutcome::UnsupportedType(_)
        ));
        assert!(matches!(
            resolve(&modules, "System.Int32*, mscorlib"),
            ResolutionOutcome::UnsupportedType(_)
        ));
        assert!(matches!(
            resolve(&modules, "System.Int32&"),
            ResolutionOutcome::UnsupportedType(_)
        ));
    }

    #[test]
    fn test_generic_parameter_count_mismatch() {
        let (modules, _) = snapshot();
        let reference = TypeStructuralReference::new("A`1").with_origin(TypeOrigin::Assembly(
            AssemblyIdentityRef::named("A"),
        ));
        assert_eq!(
            ModuleResolver::new(&modules).resolve(&reference),
            ResolutionOutcome::UnsupportedType("A`1".to_string())
        );
    }

    #[test]
    fn test_unqualified_searches_context_then_core() {
        let (modules, a) = snapshot();
        let resolver = ModuleResolver::new(&modules).with_context_module(a);

        let s = resolver.resolve(&TypeStructuralReference::new("S"));
        assert!(matches!(&s, ResolutionOutcome::Resolved(ty) if ty.to_string() == "S"));

        let int = resolver.resolve(&TypeStructuralReference::new("System.Int32"));
        assert!(matches!(&int, ResolutionOutcome::Resolved(ty) if ty.to_string() == "int"));

        // B lives in neither the context module nor the core library
        assert!(matches!(
            resolver.resolve(&TypeStructuralReference::new("B")),
            ResolutionOutcome::UnsupportedType(_)
        ));
    }

    #[test]
    fn test_module_origin() {
        let (modules, a) = snapshot();
        let reference = TypeStructuralReference::new("S").with_origin(TypeOrigin::Module(a));
        assert!(ModuleResolver::new(&modules).resolve(&reference).is_resolved());

        let reference =
            TypeStructuralReference::new("S").with_origin(TypeOrigin::Module(ModuleId(42)));
        assert!(matches!(
            ModuleResolver::new(&modules).resolve(&reference),
            ResolutionOutcome::UnsupportedType(_)
        ));
    }

    #[test]
    fn test_prefers_exact_version_among_duplicates() {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        let old = modules.add(
            ModuleBuilder::new(AssemblyIdentity::simple("D", AssemblyVersion::new(1, 0, 0, 0)))
                .class("T", |t| t)
                .build(),
        );
        let new = modules.add(
            ModuleBuilder::new(AssemblyIdentity::simple("D", AssemblyVersion::new(2, 0, 0, 0)))
                .class("T", |t| t)
                .build(),
        );

        let module_of = |text: &str| match resolve(&modules, text) {
            ResolutionOutcome::Resolved(CilType::Named(named)) => named.module,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(module_of("T, D, Version=2.0.0.0"), new);
        assert_eq!(module_of("T, D, Version=1.0.0.0"), old);
        assert_eq!(module_of("T, D"), old);
    }

    #[test]
    fn test_into_result() {
        let (modules, _) = snapshot();
        let error = resolve(&modules, "X, Nowhere").into_result().unwrap_err();
        assert_eq!(error.missing_assemblies(), [AssemblyIdentityRef::named("Nowhere")]);
    }
}
