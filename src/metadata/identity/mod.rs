//! Assembly identity for loaded modules and assembly-qualified type names.
//!
//! This module provides the identity types that tie a type reference to the module that
//! defines it. Resolution is keyed primarily by simple name; version, culture and public
//! key token are carried so that stricter matching policies can consult them.
//!
//! # ECMA-335 References
//!
//! - **Section II.6.3**: Referencing assemblies - defines assembly reference format
//! - **Section II.6.2.1.3**: PublicKeyToken - defines public key token format
//!
//! # Key Components
//!
//! - [`AssemblyIdentity`] - Identity of an assembly loaded in the debuggee
//! - [`AssemblyIdentityRef`] - Identity as written in an assembly-qualified type name
//! - [`AssemblyVersion`] - Four-part version numbering with parsing and comparison
//! - [`PublicKeyToken`] - 8-byte strong name token
//!
//! # Thread Safety
//!
//! All types in this module are plain owned values and are `Send + Sync`.

pub use assembly::{AssemblyIdentity, AssemblyIdentityRef, AssemblyVersion, PublicKeyToken};

mod assembly;
