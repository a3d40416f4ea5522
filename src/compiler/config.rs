//! Expression compiler configuration
//!
//! This module provides the knobs that control how tolerant the compiler is when binding
//! type names reported by the debugger, and how deeply nested input it accepts.

use crate::resolver::AssemblyMatching;

/// Configuration for one [`crate::compiler::ExpressionCompiler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfig {
    /// How assembly references in context type names are matched against loaded modules
    pub assembly_matching: AssemblyMatching,

    /// Maximum generic nesting of an assembly-qualified type name (default: 64)
    pub max_type_name_depth: usize,

    /// Maximum syntactic nesting of an expression (default: 128)
    pub max_expression_depth: usize,

    /// Maximum base-type chain followed during conversions and member lookup (default: 64)
    pub max_inheritance_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            assembly_matching: AssemblyMatching::NameOnly,
            max_type_name_depth: 64,
            max_expression_depth: 128,
            max_inheritance_depth: 64,
        }
    }
}

impl CompilerConfig {
    /// Requires every component of an assembly reference to match the loaded module
    ///
    /// Useful in tests; a debuggee running against a newer dependency will fail to bind.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            assembly_matching: AssemblyMatching::Exact,
            ..Self::default()
        }
    }

    /// Name-only assembly matching with generous nesting limits
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            assembly_matching: AssemblyMatching::NameOnly,
            max_type_name_depth: 256,
            max_expression_depth: 512,
            max_inheritance_depth: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_config_presets() {
        let strict = CompilerConfig::strict();
        assert_eq!(strict.assembly_matching, AssemblyMatching::Exact);
        assert_eq!(strict.max_type_name_depth, 64);

        let lenient = CompilerConfig::lenient();
        assert_eq!(lenient.assembly_matching, AssemblyMatching::NameOnly);
        assert!(lenient.max_expression_depth > CompilerConfig::default().max_expression_depth);
    }

    #[test]
    fn test_default_config() {
        let default = CompilerConfig::default();
        assert_eq!(default.assembly_matching, AssemblyMatching::NameOnly);
        assert_eq!(default.max_inheritance_depth, 64);
    }
}
