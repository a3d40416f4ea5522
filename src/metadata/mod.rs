//! Metadata model of the suspended process.
//!
//! This module contains the snapshot of loaded modules that expressions are bound against.
//! It is deliberately small: the debugger host mirrors what it knows about the debuggee into
//! these types, and the binder never reads binary metadata itself.
//!
//! # Key Components
//!
//! - [`identity`] - Assembly identities, both loaded and as referenced by type names
//! - [`module`] - The [`module::ModuleSet`] snapshot and its [`module::LoadedModule`]s
//! - [`token`] - Metadata table row references
//! - [`typesystem`] - Type definitions, member signatures and the resolved [`typesystem::CilType`]
//! - [`corlib`] - A synthetic core library
//!
//! # Examples
//!
//! ```rust
//! use exprscope::metadata::{corlib, identity::AssemblyVersion, module::ModuleSet};
//! use exprscope::metadata::typesystem::ModuleBuilder;
//!
//! let mut modules = ModuleSet::new();
//! modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
//! modules.add(ModuleBuilder::named("A").class("C", |t| t).build());
//!
//! let exception = modules.core_type("System.Exception", vec![])?;
//! assert_eq!(exception.to_string(), "System.Exception");
//! # Ok::<(), exprscope::Error>(())
//! ```

/// Synthetic core library
pub mod corlib;
/// Assembly identity of loaded modules and type references
pub mod identity;
/// Module snapshot
pub mod module;
/// Commonly used metadata token type
pub mod token;
/// Implementation of the .NET type model
pub mod typesystem;
