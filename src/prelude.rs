//! # exprscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the exprscope library. Import this module to get quick access to everything needed
//! to build a module snapshot and compile expressions against it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all exprscope operations
pub use crate::Error;

/// The result type used throughout exprscope
pub use crate::Result;

/// How a non-assignable expression was used
pub use crate::error::AssignmentUsage;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Expression compilation
pub use crate::compiler::{
    CompileFailure, CompileResult, CompilerConfig, EvaluationFlags, ExpressionCompiler,
    MethodContext, ResultFlags, ResultProperties,
};

/// Generated code
pub use crate::compiler::emit::{CompiledInstruction, CompiledMethod, Operand};

// ================================================================================================
// Metadata Snapshot
// ================================================================================================

/// Synthetic core library
pub use crate::metadata::corlib;

/// Assembly identities
pub use crate::metadata::identity::{
    AssemblyIdentity, AssemblyIdentityRef, AssemblyVersion, PublicKeyToken,
};

/// Loaded modules
pub use crate::metadata::module::{LoadedModule, ModuleId, ModuleSet};

/// Metadata token of a type definition
pub use crate::metadata::token::Token;

/// Type definitions, signatures and resolved types
pub use crate::metadata::typesystem::{
    CilPrimitiveKind, CilType, MethodDefinition, ModuleBuilder, TypeBuilder, TypeDefinition,
    TypeKind, TypeSignature,
};

// ================================================================================================
// Pseudo-Variables and Type Names
// ================================================================================================

/// Pseudo-variable binding
pub use crate::pseudovar::{
    classify, BindOutcome, BindingError, BoundPseudoVariable, InspectionContext,
    InspectionType, PseudoVariableBinder, PseudoVariableKind,
};

/// Type name resolution
pub use crate::resolver::{AssemblyMatching, ModuleResolver, ResolutionOutcome};

/// Type name parsing
pub use crate::typename::{TypeNameError, TypeStructuralReference};
