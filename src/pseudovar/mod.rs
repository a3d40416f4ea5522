//! Debugger pseudo-variables.
//!
//! The expression evaluator understands a handful of names that do not exist in the
//! debuggee's source: `$exception`, `$stowedexception`, `$ReturnValue` and `$ReturnValueN`,
//! object ids such as `$23`, raw addresses such as `@0x1f`, and variables the user declared
//! in the debugger. This module decides what such a lexeme denotes and binds it to the
//! intrinsic accessor that fetches its value at runtime.
//!
//! # Key Components
//!
//! - [`classify`] - Pure classification of a lexeme into a [`PseudoVariableKind`]
//! - [`InspectionContext`] - The runtime types the debugger reports for each name
//! - [`intrinsics`] - The fixed accessor catalog
//! - [`PseudoVariableBinder`] - Produces a typed [`BoundPseudoVariable`] for one occurrence
//!
//! # Examples
//!
//! ```rust
//! use exprscope::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};
//! use exprscope::pseudovar::{BindOutcome, InspectionContext, PseudoVariableBinder};
//!
//! let mut modules = ModuleSet::new();
//! modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
//! let context = InspectionContext::new().with("$exception", "System.IO.IOException");
//!
//! let binder = PseudoVariableBinder::new(&modules, &context);
//! if let BindOutcome::Bound(bound) = binder.bind("$exception") {
//!     assert_eq!(bound.ty.to_string(), "System.IO.IOException");
//!     assert!(bound.requires_conversion());
//!     assert!(!bound.assignable);
//! }
//! ```

mod binder;
mod classify;
mod context;
pub mod intrinsics;

pub use binder::{BindOutcome, BindingError, BindingSource, BoundPseudoVariable, PseudoVariableBinder};
pub use classify::{classify, PseudoVariableKind};
pub use context::{InspectionContext, InspectionType, TypeHandle};
