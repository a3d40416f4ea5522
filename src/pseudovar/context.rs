use rustc_hash::FxHashMap;

use crate::{
    metadata::{module::ModuleId, token::Token},
    pseudovar::PseudoVariableKind,
    typename::TypeStructuralReference,
};

/// A live type handle: the defining module and the `TypeDef` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    /// Module that defines the type
    pub module: ModuleId,
    /// `TypeDef` token within that module
    pub token: Token,
}

/// How the debugger describes the runtime type of an inspection entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InspectionType {
    /// A non-generic type defined in a loaded module
    Handle(TypeHandle),
    /// An already parsed reference
    Reference(TypeStructuralReference),
    /// An assembly-qualified type name in reflection syntax, parsed on use
    QualifiedName(String),
}

impl From<TypeHandle> for InspectionType {
    fn from(handle: TypeHandle) -> Self {
        InspectionType::Handle(handle)
    }
}

impl From<TypeStructuralReference> for InspectionType {
    fn from(reference: TypeStructuralReference) -> Self {
        InspectionType::Reference(reference)
    }
}

impl From<&str> for InspectionType {
    fn from(name: &str) -> Self {
        InspectionType::QualifiedName(name.to_string())
    }
}

impl From<String> for InspectionType {
    fn from(name: String) -> Self {
        InspectionType::QualifiedName(name)
    }
}

/// Debugger-supplied names and their runtime types for one evaluation.
///
/// Entries are keyed by the canonical spelling of [`PseudoVariableKind::context_key`]:
/// `$exception`, `$stowedexception`, `$ReturnValue`, `$ReturnValueN`, object id digits
/// (`23` for `$23`), lowercase `0x...` addresses, and plain identifiers for variables the
/// user declared in the debugger.
///
/// ```rust
/// use exprscope::pseudovar::{InspectionContext, PseudoVariableKind};
///
/// let context = InspectionContext::new()
///     .with("$ReturnValue2", "System.String, mscorlib")
///     .with("x", "System.Int32, mscorlib");
///
/// assert!(context.lookup(&PseudoVariableKind::ReturnValue(2)).is_some());
/// assert!(context.lookup(&PseudoVariableKind::ReturnValue(1)).is_none());
/// assert!(context.declared_variable("x").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InspectionContext {
    entries: FxHashMap<String, InspectionType>,
    debugger_default: bool,
}

impl InspectionContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The debugger's default context.
    ///
    /// Besides its explicit entries, it answers every return-value, object-id and address
    /// lookup with `System.Object`. It never invents declared variables or exceptions.
    #[must_use]
    pub fn debugger_default() -> Self {
        InspectionContext {
            entries: FxHashMap::default(),
            debugger_default: true,
        }
    }

    /// Add an entry, replacing any previous entry with the same key
    #[must_use]
    pub fn with(mut self, name: &str, ty: impl Into<InspectionType>) -> Self {
        self.insert(name, ty);
        self
    }

    /// Add an entry, replacing any previous entry with the same key
    pub fn insert(&mut self, name: &str, ty: impl Into<InspectionType>) {
        self.entries.insert(name.to_string(), ty.into());
    }

    /// Returns true for contexts created by [`InspectionContext::debugger_default`]
    #[must_use]
    pub fn is_debugger_default(&self) -> bool {
        self.debugger_default
    }

    /// Look up the entry registered for a pseudo-variable
    #[must_use]
    pub fn lookup(&self, kind: &PseudoVariableKind) -> Option<&InspectionType> {
        kind.context_key().and_then(|key| self.entries.get(&key))
    }

    /// Returns true if this context accepts `kind` without an explicit entry
    #[must_use]
    pub fn answers_by_default(&self, kind: &PseudoVariableKind) -> bool {
        self.debugger_default
            && matches!(
                kind,
                PseudoVariableKind::ReturnValue(_)
                    | PseudoVariableKind::ObjectId(_)
                    | PseudoVariableKind::Address(_)
            )
    }

    /// Look up a variable declared in the debugger by its identifier
    #[must_use]
    pub fn declared_variable(&self, name: &str) -> Option<&InspectionType> {
        if name.starts_with(['$', '@']) {
            return None;
        }
        self.entries.get(name)
    }

    /// Number of explicit entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no explicit entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pseudovar::classify;

    #[test]
    fn test_lookup_uses_canonical_keys() {
        let context = InspectionContext::new()
            .with("$ReturnValue", "System.Int32")
            .with("23", "System.Type")
            .with("0x1ab", "System.String");

        assert!(context.lookup(&classify("$returnvalue")).is_some());
        assert!(context.lookup(&classify("$ReturnValue0")).is_some());
        assert!(context.lookup(&classify("$23")).is_some());
        assert!(context.lookup(&classify("@0X1AB")).is_some());
        assert!(context.lookup(&classify("$exception")).is_none());
        assert!(context.lookup(&PseudoVariableKind::None).is_none());
    }

    #[test]
    fn test_declared_variables_are_plain_identifiers() {
        let context = InspectionContext::new()
            .with("x", "System.Int32")
            .with("$exception", "System.IO.IOException");

        assert!(context.declared_variable("x").is_some());
        assert!(context.declared_variable("$exception").is_none());
        assert!(context.declared_variable("y").is_none());
    }

    #[test]
    fn test_debugger_default_answers() {
        let context = InspectionContext::debugger_default();
        assert!(context.is_debugger_default());
        assert!(context.answers_by_default(&PseudoVariableKind::ReturnValue(4)));
        assert!(context.answers_by_default(&classify("$12")));
        assert!(context.answers_by_default(&classify("@0x10")));
        assert!(!context.answers_by_default(&PseudoVariableKind::Exception));
        assert!(!context.answers_by_default(&PseudoVariableKind::None));
        assert!(context.declared_variable("x").is_none());

        assert!(!InspectionContext::new().answers_by_default(&PseudoVariableKind::ReturnValue(0)));
    }

    #[test]
    fn test_insert_replaces() {
        let mut context = InspectionContext::new();
        context.insert("x", "System.Int32");
        context.insert(
            "x",
            TypeHandle {
                module: ModuleId(1),
                token: Token::type_def(1),
            },
        );
        assert_eq!(context.len(), 1);
        assert!(matches!(
            context.declared_variable("x"),
            Some(InspectionType::Handle(_))
        ));
    }
}
