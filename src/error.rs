use std::fmt;

use thiserror::Error;

use crate::{metadata::identity::AssemblyIdentityRef, typename::TypeNameError};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// How an expression was used when it turned out not to be assignable.
///
/// The host language reports the two situations with different diagnostics, so the
/// distinction is preserved on [`Error::NotAssignable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentUsage {
    /// Left-hand side of a plain or compound assignment
    AssignmentTarget,
    /// Argument passed with `ref` or `out`
    RefArgument,
}

impl fmt::Display for AssignmentUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentUsage::AssignmentTarget => write!(
                f,
                "The left-hand side of an assignment must be a variable, property or indexer"
            ),
            AssignmentUsage::RefArgument => {
                write!(f, "A ref or out argument must be an assignable variable")
            }
        }
    }
}

/// The generic Error type, which covers every failure an expression compilation can report.
///
/// Each variant is a stable error kind the debugger host can match on. Diagnostic text is
/// provided through `Display` for convenience; formatting and localization of the final
/// message is left to the host.
///
/// # Error Categories
///
/// ## Pseudo-variable binding
/// - [`Error::UndefinedName`] - Lexeme is neither an ordinary name nor a known pseudo-variable
/// - [`Error::LegacySyntaxRejected`] - The retired `23#` object-id form was used
/// - [`Error::NotAssignable`] - Assignment or `ref` use of a read-only pseudo-variable
///
/// ## Type resolution
/// - [`Error::UnsupportedType`] - Type cannot be represented in this binding context
/// - [`Error::MissingAssembly`] - Defining assembly is not among the loaded modules
/// - [`Error::MalformedTypeDescriptor`] - Assembly-qualified type name failed to parse
///
/// ## Host language
/// - [`Error::Syntax`], [`Error::UndefinedGlobalName`], [`Error::MemberNotFound`],
///   [`Error::TypeArgumentsNotAllowed`], [`Error::MethodNameExpected`],
///   [`Error::NoConversion`], [`Error::OperatorNotApplicable`], [`Error::ArgumentMismatch`],
///   [`Error::TypeNotFound`], [`Error::SideEffectsNotAllowed`]
///
/// ## Internal
/// - [`Error::RecursionLimit`] - Maximum nesting depth exceeded
/// - [`Error::Malformed`] - Internal invariant violated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The name does not exist in the current context.
    ///
    /// Raised with the literal lexeme text when neither the host's ordinary lookup nor
    /// the pseudo-variable binder recognizes a simple name.
    #[error("The name '{0}' does not exist in the current context")]
    UndefinedName(String),

    /// The legacy `id#` object-id syntax was used.
    ///
    /// Detected by the lexer, before any classification is attempted.
    #[error("'id#' syntax is no longer supported. Use '$id' instead.")]
    LegacySyntaxRejected {
        /// Character offset of the rejected literal
        position: usize,
    },

    /// Assignment or by-reference use of an expression that is not a variable.
    #[error("{usage}")]
    NotAssignable {
        /// How the expression was used
        usage: AssignmentUsage,
    },

    /// The type exists conceptually but cannot be represented in this binding context.
    ///
    /// Carries the name of the offending type. Never accompanied by a missing-assembly
    /// hint, loading more assemblies would not help.
    #[error("'{0}' is a type not supported by the language")]
    UnsupportedType(String),

    /// Assemblies defining a type or its generic arguments are not among the loaded modules.
    ///
    /// Lists every missing identity, without duplicates. The host may load them and retry
    /// the same request.
    #[error("Assemblies not loaded: {}", AssemblyIdentityRef::display_list(.0))]
    MissingAssembly(Vec<AssemblyIdentityRef>),

    /// An assembly-qualified type name could not be parsed.
    #[error("Malformed type descriptor - {0}")]
    MalformedTypeDescriptor(#[from] TypeNameError),

    /// The expression text could not be parsed.
    #[error("Syntax error at {position}: {message}")]
    Syntax {
        /// Character offset of the offending token
        position: usize,
        /// What the parser expected
        message: String,
    },

    /// A `global::` qualified name does not exist.
    #[error("The type or namespace name '{0}' could not be found in the global namespace")]
    UndefinedGlobalName(String),

    /// Member access on a type that has no such member.
    #[error("'{type_name}' does not contain a definition for '{member}'")]
    MemberNotFound {
        /// Display name of the receiver type
        type_name: String,
        /// Name of the member that was looked up
        member: String,
    },

    /// Type arguments were supplied to a variable.
    #[error("The variable '{0}' cannot be used with type arguments")]
    TypeArgumentsNotAllowed(String),

    /// Something that is not a method was invoked.
    #[error("Method name expected")]
    MethodNameExpected,

    /// No conversion exists between two types.
    #[error("Cannot convert type '{from}' to '{to}'")]
    NoConversion {
        /// Source type display name
        from: String,
        /// Target type display name
        to: String,
    },

    /// A binary operator was applied to unsupported operand types.
    #[error("Operator '{operator}' cannot be applied to operands of type '{left}' and '{right}'")]
    OperatorNotApplicable {
        /// Operator token
        operator: String,
        /// Left operand type display name
        left: String,
        /// Right operand type display name
        right: String,
    },

    /// The arguments of a call do not match the called method.
    #[error("No overload for method '{0}' takes these arguments")]
    ArgumentMismatch(String),

    /// A type name used in a cast could not be found.
    #[error("The type or namespace name '{0}' could not be found")]
    TypeNotFound(String),

    /// The expression has side effects but was compiled without permission for them.
    #[error("Expression has side effects and cannot be evaluated")]
    SideEffectsNotAllowed,

    /// Recursion limit reached.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// An internal invariant was violated.
    ///
    /// Includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },
}

impl Error {
    /// Returns the missing assembly identities carried by this error, empty if none.
    #[must_use]
    pub fn missing_assemblies(&self) -> &[AssemblyIdentityRef] {
        match self {
            Error::MissingAssembly(identities) => identities,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_assignable_messages_differ_by_usage() {
        let target = Error::NotAssignable {
            usage: AssignmentUsage::AssignmentTarget,
        };
        let by_ref = Error::NotAssignable {
            usage: AssignmentUsage::RefArgument,
        };

        assert_eq!(
            target.to_string(),
            "The left-hand side of an assignment must be a variable, property or indexer"
        );
        assert_eq!(
            by_ref.to_string(),
            "A ref or out argument must be an assignable variable"
        );
    }

    #[test]
    fn test_undefined_name_echoes_lexeme() {
        let error = Error::UndefinedName("$RETURNVALUE".to_string());
        assert_eq!(
            error.to_string(),
            "The name '$RETURNVALUE' does not exist in the current context"
        );
        assert!(error.missing_assemblies().is_empty());
    }

    #[test]
    fn test_malformed_macro_records_location() {
        let error = malformed_error!("stack underflow at {}", 3);
        match error {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "stack underflow at 3");
                assert!(file.ends_with("error.rs"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
