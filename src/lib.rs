// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # exprscope
//!
//! Pseudo-variable resolution and expression compilation for a .NET debugger's expression
//! evaluator.
//!
//! While the debuggee is suspended, the user types expressions such as
//! `$exception.Message`, `(int)$ReturnValue - 2` or `$1.BaseType` into a watch or immediate
//! window. `exprscope` binds these against a snapshot of the debuggee's loaded modules and
//! compiles them into a small CIL method the debugger executes in the debuggee. Every
//! pseudo-variable becomes a call to one of the debugger's intrinsic accessor methods.
//!
//! ## Quick Start
//!
//! ```rust
//! use exprscope::prelude::*;
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
//! let context = InspectionContext::new()
//!     .with("$exception", "System.IO.IOException, mscorlib, Version=4.0.0.0");
//!
//! let result = compiler
//!     .compile_expression(&context, "$exception", EvaluationFlags::empty())
//!     .map_err(|failure| failure.error)?;
//! assert_eq!(
//!     result.method.mnemonics(),
//!     ["call", "castclass", "ret"]
//! );
//! # Ok::<(), exprscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`pseudovar`] - Classifies `$`/`@` lexemes, looks up their types in an
//!   [`pseudovar::InspectionContext`] and binds them to intrinsic accessor calls
//! - [`typename`] - Parser for the assembly-qualified type names the debugger reports
//! - [`resolver`] - Binds parsed type names to loaded modules under an assembly matching
//!   policy
//! - [`metadata`] - The module snapshot: identities, type definitions, signatures
//! - [`compiler`] - Lexer, parser, host binder and CIL emitter around the pieces above
//! - [`Error`] and [`Result`] - Error handling shared by all of the above
//!
//! ## Thread safety
//!
//! Binding and compilation are pure functions of their inputs. A [`metadata::module::ModuleSet`],
//! an [`pseudovar::InspectionContext`] and an [`compiler::ExpressionCompiler`] can be shared
//! between threads and used for independent requests concurrently.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use exprscope::prelude::*;
///
/// let context = InspectionContext::new().with("$ReturnValue", "System.String");
/// assert_eq!(context.len(), 1);
/// ```
pub mod prelude;

/// Expression compilation: lexer, parser, host binder and CIL emitter
pub mod compiler;

/// Snapshot of the debuggee's loaded modules
pub mod metadata;

/// Pseudo-variable classification and binding
pub mod pseudovar;

/// Type name resolution against the module snapshot
pub mod resolver;

/// Assembly-qualified type name parsing
pub mod typename;

/// `exprscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use exprscope::{Error, Result};
///
/// fn lookup(name: &str) -> Result<()> {
///     Err(Error::UndefinedName(name.to_string()))
/// }
///
/// assert!(lookup("x").is_err());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `exprscope` Error type
///
/// The main error type for all operations in this crate. Errors are values: every failure
/// the debugger shows to the user is one of these variants.
pub use error::Error;
