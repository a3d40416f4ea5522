//! Binding of pseudo-variable lexemes to typed intrinsic accessor calls.

use thiserror::Error;

use crate::{
    metadata::{
        identity::AssemblyIdentityRef,
        module::{ModuleId, ModuleSet},
        typesystem::{CilPrimitiveKind, CilType},
    },
    pseudovar::{
        classify,
        intrinsics::{IntrinsicCall, EXCEPTION_TYPE_NAME},
        InspectionContext, InspectionType, PseudoVariableKind, TypeHandle,
    },
    resolver::{AssemblyMatchPolicy, ModuleResolver, ResolutionOutcome},
    typename::{TypeNameError, TypeStructuralReference, DEFAULT_MAX_DEPTH},
    Error,
};

/// Why a recognized pseudo-variable could not be bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The context type cannot be represented here
    #[error("'{0}' is a type not supported by the language")]
    UnsupportedType(String),
    /// Assemblies needed by the context type are not loaded
    #[error("Assemblies not loaded: {}", AssemblyIdentityRef::display_list(.0))]
    MissingAssembly(Vec<AssemblyIdentityRef>),
    /// The context type name did not parse
    #[error("Malformed type descriptor - {0}")]
    MalformedTypeDescriptor(TypeNameError),
}

impl From<BindingError> for Error {
    fn from(error: BindingError) -> Self {
        match error {
            BindingError::UnsupportedType(name) => Error::UnsupportedType(name),
            BindingError::MissingAssembly(identities) => Error::MissingAssembly(identities),
            BindingError::MalformedTypeDescriptor(error) => Error::MalformedTypeDescriptor(error),
        }
    }
}

/// Where a bound name came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource {
    /// A `$`/`@` pseudo-variable
    PseudoVariable(PseudoVariableKind),
    /// A variable the user declared in the debugger
    DeclaredVariable(String),
}

/// One bound occurrence of a pseudo-variable or declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundPseudoVariable {
    /// The lexeme as written
    pub lexeme: String,
    /// What the lexeme denotes
    pub source: BindingSource,
    /// Static type of the occurrence
    pub ty: CilType,
    /// The accessor call backing the occurrence
    pub call: IntrinsicCall,
    /// What the accessor returns (or references, for address-backed occurrences)
    pub accessor_type: CilType,
    /// Only declared variables are assignable
    pub assignable: bool,
}

impl BoundPseudoVariable {
    /// Returns true if reads go through an address returned by the accessor
    #[must_use]
    pub fn is_address_backed(&self) -> bool {
        self.call.returns_address()
    }

    /// Returns true if a read must narrow the accessor's result to [`Self::ty`]
    #[must_use]
    pub fn requires_conversion(&self) -> bool {
        !self.is_address_backed() && self.ty != self.accessor_type
    }
}

/// Result of offering a lexeme to the binder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The lexeme is a pseudo-variable or declared variable
    Bound(BoundPseudoVariable),
    /// The host should report the name as undefined
    NotRecognized,
    /// The lexeme was recognized but its type could not be bound
    Failed(BindingError),
}

/// Binds lexemes against one inspection context and module snapshot.
///
/// ```rust
/// use exprscope::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};
/// use exprscope::pseudovar::{BindOutcome, InspectionContext, PseudoVariableBinder};
///
/// let mut modules = ModuleSet::new();
/// modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
/// let context = InspectionContext::new().with("$ReturnValue", "System.String");
///
/// let binder = PseudoVariableBinder::new(&modules, &context);
/// match binder.bind("$returnvalue") {
///     BindOutcome::Bound(bound) => assert_eq!(bound.ty.to_string(), "string"),
///     other => panic!("{other:?}"),
/// }
/// assert_eq!(binder.bind("$ReturnValue1"), BindOutcome::NotRecognized);
/// ```
pub struct PseudoVariableBinder<'a> {
    modules: &'a ModuleSet,
    context: &'a InspectionContext,
    resolver: ModuleResolver<'a>,
    max_type_name_depth: usize,
}

impl<'a> PseudoVariableBinder<'a> {
    /// Create a binder with the default resolver settings
    #[must_use]
    pub fn new(modules: &'a ModuleSet, context: &'a InspectionContext) -> Self {
        PseudoVariableBinder {
            modules,
            context,
            resolver: ModuleResolver::new(modules),
            max_type_name_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Module searched first for unqualified type names
    #[must_use]
    pub fn with_context_module(mut self, module: ModuleId) -> Self {
        self.resolver = self.resolver.with_context_module(module);
        self
    }

    /// Replace the assembly matching policy
    #[must_use]
    pub fn with_policy(mut self, policy: &'a dyn AssemblyMatchPolicy) -> Self {
        self.resolver = self.resolver.with_policy(policy);
        self
    }

    /// Limit generic nesting in context type names
    #[must_use]
    pub fn with_max_type_name_depth(mut self, max_depth: usize) -> Self {
        self.max_type_name_depth = max_depth;
        self.resolver = self.resolver.with_max_depth(max_depth);
        self
    }

    /// Bind one lexeme.
    ///
    /// Sigil-prefixed lexemes are classified; plain identifiers are looked up as declared
    /// variables. Nothing here reports an undefined name, that is left to the caller.
    #[must_use]
    pub fn bind(&self, lexeme: &str) -> BindOutcome {
        let kind = classify(lexeme);
        log::trace!("classified '{}' as {:?}", lexeme, kind);

        let outcome = match &kind {
            PseudoVariableKind::None => self.bind_declared_variable(lexeme),
            PseudoVariableKind::Exception | PseudoVariableKind::StowedException => {
                self.bind_exception(lexeme, &kind)
            }
            _ => self.bind_object(lexeme, &kind),
        };

        if let BindOutcome::Failed(error) = &outcome {
            log::debug!("binding '{}' failed: {}", lexeme, error);
        }
        outcome
    }

    fn bind_exception(&self, lexeme: &str, kind: &PseudoVariableKind) -> BindOutcome {
        let accessor_type = match self.core_type(EXCEPTION_TYPE_NAME) {
            Ok(ty) => ty,
            Err(error) => return BindOutcome::Failed(error),
        };
        let ty = match self.context.lookup(kind) {
            Some(entry) => match self.resolve_inspection_type(entry) {
                Ok(ty) => ty,
                Err(error) => return BindOutcome::Failed(error),
            },
            None => accessor_type.clone(),
        };
        self.bound(lexeme, kind, ty, accessor_type)
    }

    fn bind_object(&self, lexeme: &str, kind: &PseudoVariableKind) -> BindOutcome {
        let entry = self.context.lookup(kind);
        let always_recognized = matches!(kind, PseudoVariableKind::Address(_));
        if entry.is_none() && !always_recognized && !self.context.answers_by_default(kind) {
            return BindOutcome::NotRecognized;
        }

        let accessor_type = match self.core_type(CilPrimitiveKind::Object.clr_full_name()) {
            Ok(ty) => ty,
            Err(error) => return BindOutcome::Failed(error),
        };
        let ty = match entry {
            Some(entry) => match self.resolve_inspection_type(entry) {
                Ok(ty) => ty,
                Err(error) => return BindOutcome::Failed(error),
            },
            None => accessor_type.clone(),
        };
        self.bound(lexeme, kind, ty, accessor_type)
    }

    fn bound(
        &self,
        lexeme: &str,
        kind: &PseudoVariableKind,
        ty: CilType,
        accessor_type: CilType,
    ) -> BindOutcome {
        let Some(call) = IntrinsicCall::for_kind(kind) else {
            return BindOutcome::NotRecognized;
        };
        BindOutcome::Bound(BoundPseudoVariable {
            lexeme: lexeme.to_string(),
            source: BindingSource::PseudoVariable(kind.clone()),
            ty,
            call,
            accessor_type,
            assignable: false,
        })
    }

    fn bind_declared_variable(&self, lexeme: &str) -> BindOutcome {
        let Some(entry) = self.context.declared_variable(lexeme) else {
            return BindOutcome::NotRecognized;
        };
        match self.resolve_inspection_type(entry) {
            Ok(ty) => BindOutcome::Bound(BoundPseudoVariable {
                lexeme: lexeme.to_string(),
                source: BindingSource::DeclaredVariable(lexeme.to_string()),
                call: IntrinsicCall::variable_address(lexeme, ty.clone()),
                accessor_type: ty.clone(),
                ty,
                assignable: true,
            }),
            Err(error) => BindOutcome::Failed(error),
        }
    }

    /// Resolve the runtime type recorded for an inspection entry.
    ///
    /// # Errors
    /// Returns a [`BindingError`] describing why the type cannot be used.
    pub fn resolve_inspection_type(
        &self,
        entry: &InspectionType,
    ) -> std::result::Result<CilType, BindingError> {
        let outcome = match entry {
            InspectionType::Handle(handle) => return self.resolve_handle(*handle),
            InspectionType::Reference(reference) => self.resolver.resolve(reference),
            InspectionType::QualifiedName(name) => {
                let reference =
                    TypeStructuralReference::parse_with_max_depth(name, self.max_type_name_depth)
                        .map_err(BindingError::MalformedTypeDescriptor)?;
                self.resolver.resolve(&reference)
            }
        };
        match outcome {
            ResolutionOutcome::Resolved(ty) => Ok(ty),
            ResolutionOutcome::UnsupportedType(name) => Err(BindingError::UnsupportedType(name)),
            ResolutionOutcome::MissingAssembly(identities) => {
                Err(BindingError::MissingAssembly(identities))
            }
        }
    }

    fn resolve_handle(&self, handle: TypeHandle) -> std::result::Result<CilType, BindingError> {
        let module = self
            .modules
            .module(handle.module)
            .ok_or_else(|| BindingError::UnsupportedType(format!("{} in {}", handle.token, handle.module)))?;
        let definition = module
            .type_by_token(handle.token)
            .ok_or_else(|| BindingError::UnsupportedType(format!("{} in {}", handle.token, handle.module)))?;

        // An open generic handle has no arguments to instantiate it with
        if !definition.generic_params.is_empty() {
            return Err(BindingError::UnsupportedType(definition.full_name()));
        }
        Ok(CilType::named(module.id, definition, Vec::new()))
    }

    fn core_type(&self, full_name: &str) -> std::result::Result<CilType, BindingError> {
        self.modules
            .core_type(full_name, Vec::new())
            .map_err(|_| BindingError::UnsupportedType(full_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            corlib,
            identity::{AssemblyIdentity, AssemblyVersion},
            token::Token,
            typesystem::ModuleBuilder,
        },
        pseudovar::intrinsics::{IntrinsicArgument, IntrinsicMethod},
    };

    fn snapshot() -> (ModuleSet, ModuleId) {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        let app = modules.add(
            ModuleBuilder::new(AssemblyIdentity::simple("App", AssemblyVersion::new(1, 0, 0, 0)))
                .class("C", |t| t)
                .class("G`1", |t| t.generic_params(&["T"]))
                .build(),
        );
        (modules, app)
    }

    fn bound(outcome: BindOutcome) -> BoundPseudoVariable {
        match outcome {
            BindOutcome::Bound(bound) => bound,
            other => panic!("expected a binding, got {other:?}"),
        }
    }

    #[test]
    fn test_exception_without_context_entry() {
        let (modules, _) = snapshot();
        let context = InspectionContext::new();
        let binder = PseudoVariableBinder::new(&modules, &context);

        let exception = bound(binder.bind("$exception"));
        assert_eq!(exception.ty.to_string(), "System.Exception");
        assert!(!exception.requires_conversion());
        assert!(!exception.assignable);
        assert_eq!(exception.call.method, IntrinsicMethod::GetException);
    }

    #[test]
    fn test_exception_narrowed_by_context() {
        let (modules, _) = snapshot();
        let context = InspectionContext::new()
            .with("$stowedexception", "System.InvalidOperationException, mscorlib");
        let binder = PseudoVariableBinder::new(&modules, &context);

        let stowed = bound(binder.bind("$stowedexception"));
        assert_eq!(stowed.ty.to_string(), "System.InvalidOperationException");
        assert_eq!(stowed.accessor_type.to_string(), "System.Exception");
        assert!(stowed.requires_conversion());
    }

    #[test]
    fn test_return_value_requires_entry() {
        let (modules, _) = snapshot();
        let context = InspectionContext::new().with("$ReturnValue2", "System.String");
        let binder = PseudoVariableBinder::new(&modules, &context);

        assert_eq!(binder.bind("$ReturnValue"), BindOutcome::NotRecognized);
        let value = bound(binder.bind("$returnvalue2"));
        assert_eq!(value.call.argument, IntrinsicArgument::Int32(2));
        assert_eq!(value.ty.to_string(), "string");
        assert_eq!(binder.bind("$ReturnValue2A"), BindOutcome::NotRecognized);
    }

    #[test]
    fn test_debugger_default_context() {
        let (modules, _) = snapshot();
        let context = InspectionContext::debugger_default();
        let binder = PseudoVariableBinder::new(&modules, &context);

        let value = bound(binder.bind("$ReturnValue7"));
        assert_eq!(value.ty.to_string(), "object");
        assert!(!value.requires_conversion());
        assert!(matches!(binder.bind("$3"), BindOutcome::Bound(_)));
        assert_eq!(binder.bind("x"), BindOutcome::NotRecognized);
    }

    #[test]
    fn test_address_always_recognized() {
        let (modules, _) = snapshot();
        let context = InspectionContext::new().with("0xff", "System.String");
        let binder = PseudoVariableBinder::new(&modules, &context);

        let address = bound(binder.bind("@0x10"));
        assert_eq!(address.ty.to_string(), "object");
        assert_eq!(address.call.argument, IntrinsicArgument::UInt64(0x10));

        let typed = bound(binder.bind("@0xFF"));
        assert_eq!(typed.ty.to_string(), "string");
    }

    #[test]
    fn test_declared_variable_is_assignable() {
        let (modules, app) = snapshot();
        let context = InspectionContext::new().with("x", "C");
        let binder = PseudoVariableBinder::new(&modules, &context).with_context_module(app);

        let x = bound(binder.bind("x"));
        assert!(x.assignable);
        assert!(x.is_address_backed());
        assert!(!x.requires_conversion());
        assert_eq!(x.source, BindingSource::DeclaredVariable("x".into()));
        assert_eq!(
            x.call.to_string(),
            "C Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetVariableAddress<C>(string)"
        );
    }

    #[test]
    fn test_binding_failures() {
        let (modules, app) = snapshot();
        let context = InspectionContext::new()
            .with("1", "C, Missing, Version=1.0.0.0")
            .with("2", "NoSuchType, App")
            .with("3", "G`1[[")
            .with(
                "4",
                TypeHandle {
                    module: app,
                    token: Token::type_def(2),
                },
            );
        let binder = PseudoVariableBinder::new(&modules, &context);

        assert!(matches!(
            binder.bind("$1"),
            BindOutcome::Failed(BindingError::MissingAssembly(_))
        ));
        assert!(matches!(
            binder.bind("$2"),
            BindOutcome::Failed(BindingError::UnsupportedType(_))
        ));
        assert!(matches!(
            binder.bind("$3"),
            BindOutcome::Failed(BindingError::MalformedTypeDescriptor(_))
        ));
        assert_eq!(
            binder.bind("$4"),
            BindOutcome::Failed(BindingError::UnsupportedType("G`1".into()))
        );
    }

    #[test]
    fn test_handle_resolution() {
        let (modules, app) = snapshot();
        let context = InspectionContext::new().with(
            "$exception",
            TypeHandle {
                module: app,
                token: Token::type_def(1),
            },
        );
        let binder = PseudoVariableBinder::new(&modules, &context);
        assert_eq!(bound(binder.bind("$exception")).ty.to_string(), "C");

        let error: Error = BindingError::UnsupportedType("T".into()).into();
        assert_eq!(error, Error::UnsupportedType("T".into()));
    }
}
