//! Assembly matching policies.
//!
//! A policy decides whether a loaded assembly satisfies an assembly reference taken from a
//! type name. The debugger default is [`NameOnlyMatch`]: the debuggee may well run against
//! a different version than the one a type name was recorded with, and refusing to bind
//! because of that would only make the expression fail.

use crate::metadata::identity::{AssemblyIdentity, AssemblyIdentityRef};

/// Decides whether a loaded assembly satisfies a reference.
///
/// Implementations must be deterministic; the resolver may call them any number of times
/// per request, from any thread.
pub trait AssemblyMatchPolicy: Send + Sync {
    /// Returns true if `identity` satisfies `reference`
    fn matches(&self, reference: &AssemblyIdentityRef, identity: &AssemblyIdentity) -> bool;
}

/// Case-insensitive simple-name match; version, culture and token are advisory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameOnlyMatch;

impl AssemblyMatchPolicy for NameOnlyMatch {
    fn matches(&self, reference: &AssemblyIdentityRef, identity: &AssemblyIdentity) -> bool {
        if !reference.name.eq_ignore_ascii_case(&identity.name) {
            return false;
        }
        if !reference.matches_exactly(identity) {
            log::debug!(
                "reference '{}' bound to loaded assembly '{}' by simple name",
                reference,
                identity
            );
        }
        true
    }
}

/// Every component present in the reference must equal the loaded identity's.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl AssemblyMatchPolicy for ExactMatch {
    fn matches(&self, reference: &AssemblyIdentityRef, identity: &AssemblyIdentity) -> bool {
        reference.matches_exactly(identity)
    }
}

static NAME_ONLY: NameOnlyMatch = NameOnlyMatch;
static EXACT: ExactMatch = ExactMatch;

/// Built-in policy selection, as stored in [`crate::compiler::CompilerConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblyMatching {
    /// [`NameOnlyMatch`]
    #[default]
    NameOnly,
    /// [`ExactMatch`]
    Exact,
}

impl AssemblyMatching {
    /// The policy implementing this selection
    #[must_use]
    pub fn policy(&self) -> &'static dyn AssemblyMatchPolicy {
        match self {
            AssemblyMatching::NameOnly => &NAME_ONLY,
            AssemblyMatching::Exact => &EXACT,
        }
    }
}
