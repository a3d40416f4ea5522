//! Expression compiler for the debugger's immediate window.
//!
//! This module turns the text a user types while the debuggee is suspended into a small
//! CIL method the debugger can run in the debuggee:
//!
//! ```text
//! source ──► lexer ──► parser ──► Binder ──► CodeGenerator ──► CompiledMethod
//!                                   │
//!                                   └─ PseudoVariableBinder (for unresolved simple names)
//! ```
//!
//! - [`lexer`] / [`parser`] produce an [`syntax::Expr`] tree
//! - [`Binder`] resolves names against the suspended [`MethodContext`], falling back to
//!   the pseudo-variable binder, and types every node
//! - [`emit`] lowers the bound tree to CIL, calling the debugger's intrinsic accessors for
//!   pseudo-variables
//!
//! # Usage
//!
//! ```rust
//! use exprscope::compiler::{EvaluationFlags, ExpressionCompiler, MethodContext};
//! use exprscope::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};
//! use exprscope::metadata::typesystem::{MethodDefinition, ModuleBuilder};
//! use exprscope::pseudovar::InspectionContext;
//!
//! let mut modules = ModuleSet::new();
//! modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
//! let app = modules.add(
//!     ModuleBuilder::named("App")
//!         .class("C", |t| t.method(MethodDefinition::static_method("M")))
//!         .build(),
//! );
//!
//! let method = MethodContext::new(&modules, app, "C", "M")?;
//! let compiler = ExpressionCompiler::new(&modules, &method);
//! let context = InspectionContext::new().with("$ReturnValue", "System.Int32");
//!
//! let result = compiler
//!     .compile_expression(&context, "$ReturnValue", EvaluationFlags::empty())
//!     .map_err(|failure| failure.error)?;
//! assert_eq!(result.properties.result_type.unwrap().to_string(), "int");
//! # Ok::<(), exprscope::Error>(())
//! ```

use bitflags::bitflags;
use thiserror::Error;

pub mod bound;
pub mod emit;
pub mod lexer;
pub mod parser;
pub mod syntax;

mod binder;
mod config;
mod context;

pub use binder::Binder;
pub use config::CompilerConfig;
pub use context::{LocalSlot, MethodContext, ParameterSlot};

use crate::{
    compiler::{
        bound::BoundExpr,
        emit::{CodeGenerator, CompiledMethod},
        parser::ExpressionParser,
        syntax::Expr,
    },
    metadata::{
        identity::AssemblyIdentityRef,
        module::ModuleSet,
        typesystem::{CilPrimitiveKind, CilType},
    },
    pseudovar::InspectionContext,
    Error, Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Options for one evaluation request
    pub struct EvaluationFlags : u32 {
        /// Compile a root assignment as an expression producing the assigned value
        const TREAT_AS_EXPRESSION = 0x0001;
        /// Reject any expression that writes state
        const NO_SIDE_EFFECTS = 0x0002;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Properties of a compiled expression's result
    pub struct ResultFlags : u32 {
        /// The result is not a variable and cannot be edited in the watch window
        const READ_ONLY = 0x0001;
        /// The result type is `bool`
        const BOOLEAN_RESULT = 0x0002;
    }
}

/// What the debugger needs to know about a compiled expression's result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultProperties {
    /// Static result type, `None` for statements
    pub result_type: Option<CilType>,
    /// Result flags
    pub flags: ResultFlags,
}

impl ResultProperties {
    fn of(expr: &BoundExpr) -> Self {
        let mut flags = ResultFlags::empty();
        if !expr.is_assignable() {
            flags |= ResultFlags::READ_ONLY;
        }
        if expr.ty.as_ref().and_then(CilType::primitive) == Some(CilPrimitiveKind::Boolean) {
            flags |= ResultFlags::BOOLEAN_RESULT;
        }
        ResultProperties {
            result_type: expr.ty.clone(),
            flags,
        }
    }

    fn statement() -> Self {
        ResultProperties {
            result_type: None,
            flags: ResultFlags::READ_ONLY,
        }
    }
}

/// A successfully compiled expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileResult {
    /// The generated method
    pub method: CompiledMethod,
    /// Result type and flags
    pub properties: ResultProperties,
}

/// A failed compilation.
///
/// Assemblies the request needed but the snapshot lacks are listed separately so the
/// debugger can load them and retry.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct CompileFailure {
    /// The first error encountered
    pub error: Error,
    /// Identities of assemblies that must be loaded before retrying
    pub missing_assemblies: Vec<AssemblyIdentityRef>,
}

impl From<Error> for CompileFailure {
    fn from(error: Error) -> Self {
        let missing_assemblies = error.missing_assemblies().to_vec();
        CompileFailure {
            error,
            missing_assemblies,
        }
    }
}

/// Compiles expressions in the scope of one suspended method.
///
/// The compiler only borrows the module snapshot and method context; it holds no mutable
/// state, so one instance can serve concurrent requests.
pub struct ExpressionCompiler<'a> {
    modules: &'a ModuleSet,
    method: &'a MethodContext,
    config: CompilerConfig,
}

impl<'a> ExpressionCompiler<'a> {
    /// Create a compiler with the default configuration
    #[must_use]
    pub fn new(modules: &'a ModuleSet, method: &'a MethodContext) -> Self {
        ExpressionCompiler {
            modules,
            method,
            config: CompilerConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `source` against the pseudo-variables and declared variables in `context`.
    ///
    /// A root assignment compiles as a `void` statement unless
    /// [`EvaluationFlags::TREAT_AS_EXPRESSION`] is set.
    ///
    /// # Errors
    /// Returns a [`CompileFailure`] carrying the first syntax or binding error.
    pub fn compile_expression(
        &self,
        context: &InspectionContext,
        source: &str,
        flags: EvaluationFlags,
    ) -> std::result::Result<CompileResult, CompileFailure> {
        self.try_compile_expression(context, source, flags)
            .map_err(|error| {
                log::debug!("failed to compile '{}': {}", source, error);
                CompileFailure::from(error)
            })
    }

    /// Compile the statement `target = source`.
    ///
    /// # Errors
    /// Returns a [`CompileFailure`] if either side fails to parse or bind, or `target` is
    /// not assignable.
    pub fn compile_assignment(
        &self,
        context: &InspectionContext,
        target: &str,
        source: &str,
    ) -> std::result::Result<CompileResult, CompileFailure> {
        self.try_compile_assignment(context, target, source)
            .map_err(|error| {
                log::debug!("failed to compile '{} = {}': {}", target, source, error);
                CompileFailure::from(error)
            })
    }

    fn binder<'b>(&'b self, context: &'b InspectionContext, flags: EvaluationFlags) -> Binder<'b> {
        let binder = Binder::new(self.modules, self.method, context, &self.config);
        if flags.contains(EvaluationFlags::NO_SIDE_EFFECTS) {
            binder.without_side_effects()
        } else {
            binder
        }
    }

    fn generator(&self) -> CodeGenerator {
        CodeGenerator::new(
            self.method
                .locals()
                .iter()
                .map(|local| local.ty.clone())
                .collect(),
        )
    }

    fn try_compile_expression(
        &self,
        context: &InspectionContext,
        source: &str,
        flags: EvaluationFlags,
    ) -> Result<CompileResult> {
        let expr = ExpressionParser::new(source, self.config.max_expression_depth)?.parse()?;
        let binder = self.binder(context, flags);
        let mut bound = binder.bind(&expr)?;

        if expr.is_assignment() && !flags.contains(EvaluationFlags::TREAT_AS_EXPRESSION) {
            let method = self.generator().compile_statement(&bound)?;
            log::debug!("compiled statement '{}' ({} bytes)", source, method.code_size);
            return Ok(CompileResult {
                method,
                properties: ResultProperties::statement(),
            });
        }

        if bound.is_null_literal() {
            let object = self.modules.primitive(CilPrimitiveKind::Object)?;
            bound = binder.convert(bound, &object, false)?;
        }
        let properties = ResultProperties::of(&bound);
        let method = self.generator().compile_expression(&bound)?;
        log::debug!("compiled '{}' ({} bytes)", source, method.code_size);
        Ok(CompileResult { method, properties })
    }

    fn try_compile_assignment(
        &self,
        context: &InspectionContext,
        target: &str,
        source: &str,
    ) -> Result<CompileResult> {
        let depth = self.config.max_expression_depth;
        let target = ExpressionParser::new(target, depth)?.parse()?;
        let value = ExpressionParser::new(source, depth)?.parse()?;
        let assignment = Expr::Assign {
            position: target.position(),
            target: Box::new(target),
            op: None,
            value: Box::new(value),
        };

        let bound = self.binder(context, EvaluationFlags::empty()).bind(&assignment)?;
        let method = self.generator().compile_statement(&bound)?;
        Ok(CompileResult {
            method,
            properties: ResultProperties::statement(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AssignmentUsage,
        metadata::{
            corlib,
            identity::AssemblyVersion,
            module::ModuleId,
            typesystem::{MethodDefinition, ModuleBuilder},
        },
    };

    fn snapshot() -> (ModuleSet, ModuleId) {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        let app = modules.add(
            ModuleBuilder::named("App")
                .class("C", |t| {
                    t.method(MethodDefinition::static_method("M").param("a", CilPrimitiveKind::I4))
                })
                .build(),
        );
        (modules, app)
    }

    #[test]
    fn test_result_flags() {
        let (modules, app) = snapshot();
        let method = MethodContext::new(&modules, app, "C", "M").unwrap();
        let compiler = ExpressionCompiler::new(&modules, &method);
        let context = InspectionContext::new().with("$ReturnValue", "System.Boolean");

        let result = compiler
            .compile_expression(&context, "$ReturnValue", EvaluationFlags::empty())
            .unwrap();
        assert_eq!(
            result.properties.flags,
            ResultFlags::READ_ONLY | ResultFlags::BOOLEAN_RESULT
        );

        let result = compiler
            .compile_expression(&context, "a", EvaluationFlags::empty())
            .unwrap();
        assert_eq!(result.properties.flags, ResultFlags::empty());
        assert_eq!(result.method.mnemonics(), ["ldarg.0", "ret"]);
    }

    #[test]
    fn test_root_assignment_is_a_statement() {
        let (modules, app) = snapshot();
        let method = MethodContext::new(&modules, app, "C", "M").unwrap();
        let compiler = ExpressionCompiler::new(&modules, &method);
        let context = InspectionContext::new();

        let statement = compiler
            .compile_expression(&context, "a = 1", EvaluationFlags::empty())
            .unwrap();
        assert_eq!(statement.properties.result_type, None);
        assert_eq!(statement.method.mnemonics(), ["ldc.i4.1", "starg.s", "ret"]);

        let expression = compiler
            .compile_expression(&context, "a = 1", EvaluationFlags::TREAT_AS_EXPRESSION)
            .unwrap();
        assert_eq!(
            expression.method.mnemonics(),
            ["ldc.i4.1", "dup", "starg.s", "ret"]
        );
    }

    #[test]
    fn test_no_side_effects() {
        let (modules, app) = snapshot();
        let method = MethodContext::new(&modules, app, "C", "M").unwrap();
        let compiler = ExpressionCompiler::new(&modules, &method);

        let failure = compiler
            .compile_expression(&InspectionContext::new(), "a += 1", EvaluationFlags::NO_SIDE_EFFECTS)
            .unwrap_err();
        assert_eq!(failure.error, Error::SideEffectsNotAllowed);
        assert!(failure.missing_assemblies.is_empty());
    }

    #[test]
    fn test_assignment_to_pseudo_variable_rejected() {
        let (modules, app) = snapshot();
        let method = MethodContext::new(&modules, app, "C", "M").unwrap();
        let compiler = ExpressionCompiler::new(&modules, &method);
        let context = InspectionContext::new().with("$exception", "System.Exception");

        let failure = compiler
            .compile_assignment(&context, "$exception", "null")
            .unwrap_err();
        assert_eq!(
            failure.error,
            Error::NotAssignable {
                usage: AssignmentUsage::AssignmentTarget
            }
        );
    }

    #[test]
    fn test_null_literal_is_object() {
        let (modules, app) = snapshot();
        let method = MethodContext::new(&modules, app, "C", "M").unwrap();
        let compiler = ExpressionCompiler::new(&modules, &method);

        let result = compiler
            .compile_expression(&InspectionContext::new(), "null", EvaluationFlags::empty())
            .unwrap();
        assert_eq!(result.properties.result_type.unwrap().to_string(), "object");
        assert_eq!(result.method.mnemonics(), ["ldnull", "ret"]);
    }
}
