//! Assembly identity for cross-module type resolution.
//!
//! Two related identity types live here:
//!
//! - [`AssemblyIdentity`] - the complete identity of an assembly that is actually loaded in
//!   the debuggee (name, version, culture, public key token).
//! - [`AssemblyIdentityRef`] - the identity as *referenced* by an assembly-qualified type
//!   name supplied at runtime. Every component but the name is optional, and only the name is
//!   authoritative: version, culture and token are advisory and must not prevent a loaded
//!   assembly of the same name from satisfying the reference (version-skew tolerance).
//!
//! # Display Name Format
//!
//! ```text
//! AssemblyName[, Version=Major.Minor.Build.Revision][, Culture=culture][, PublicKeyToken=token]
//! ```
//!
//! # Examples
//!
//! ```rust
//! use exprscope::metadata::identity::{AssemblyIdentityRef, AssemblyVersion};
//!
//! let mscorlib = AssemblyIdentityRef::parse(
//!     "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
//! )?;
//! assert_eq!(mscorlib.name, "mscorlib");
//! assert_eq!(mscorlib.version, Some(AssemblyVersion::new(4, 0, 0, 0)));
//! assert!(mscorlib.culture.is_none());
//! # Ok::<(), exprscope::typename::TypeNameError>(())
//! ```

use std::{fmt, str::FromStr};

use crate::typename::TypeNameError;

/// Four-part version numbering for .NET assemblies.
///
/// Versions are compared component-wise in order: major, minor, build, revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version component.
    pub major: u16,
    /// Minor version component.
    pub minor: u16,
    /// Build version component.
    pub build: u16,
    /// Revision version component.
    pub revision: u16,
}

impl AssemblyVersion {
    /// Sentinel value representing an unknown or unspecified version (0.0.0.0).
    pub const UNKNOWN: Self = Self {
        major: 0,
        minor: 0,
        build: 0,
        revision: 0,
    };

    /// Create a new assembly version with the specified components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse assembly version from string representation.
    ///
    /// Supports one to four dot-separated components; missing components default to 0.
    ///
    /// # Errors
    /// Returns [`TypeNameError::InvalidVersion`] if the string is empty, has more than four
    /// components, or a component is not a 16-bit unsigned integer.
    pub fn parse(version_str: &str) -> Result<Self, TypeNameError> {
        let invalid = || TypeNameError::InvalidVersion(version_str.to_string());

        let parts: Vec<&str> = version_str.trim().split('.').collect();
        if parts.len() > 4 {
            return Err(invalid());
        }

        let mut components = [0u16; 4];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            components[i] = part.parse::<u16>().map_err(|_| invalid())?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl FromStr for AssemblyVersion {
    type Err = TypeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The 8-byte public key token of a strong-named assembly.
///
/// Displayed as 16 lowercase hex digits in byte order, e.g. `b77a5c561934e089`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyToken(pub [u8; 8]);

impl PublicKeyToken {
    /// Parse a token from its hex representation.
    ///
    /// # Errors
    /// Returns [`TypeNameError::InvalidPublicKeyToken`] if the value is not exactly 16 hex digits.
    pub fn parse(value: &str) -> Result<Self, TypeNameError> {
        let invalid = || TypeNameError::InvalidPublicKeyToken(value.to_string());

        let bytes = hex::decode(value.trim()).map_err(|_| invalid())?;
        let token: [u8; 8] = bytes.try_into().map_err(|_| invalid())?;
        Ok(PublicKeyToken(token))
    }
}

impl fmt::Display for PublicKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Complete identity of a loaded assembly.
///
/// # Equality Semantics
///
/// Two identities are equal when all components are equal. Name comparison for
/// *resolution* purposes is a separate concern handled by
/// [`crate::resolver::AssemblyMatchPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyIdentity {
    /// Simple assembly name (e.g., "mscorlib", "System.Core").
    pub name: String,
    /// Four-part version number.
    pub version: AssemblyVersion,
    /// Culture for satellite assemblies, `None` for culture-neutral ones.
    pub culture: Option<String>,
    /// Public key token of strong-named assemblies.
    pub public_key_token: Option<PublicKeyToken>,
}

impl AssemblyIdentity {
    /// Create a new assembly identity with the specified components.
    pub fn new(
        name: impl Into<String>,
        version: AssemblyVersion,
        culture: Option<String>,
        public_key_token: Option<PublicKeyToken>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            culture,
            public_key_token,
        }
    }

    /// Create a culture-neutral, unsigned identity.
    pub fn simple(name: impl Into<String>, version: AssemblyVersion) -> Self {
        Self::new(name, version, None, None)
    }

    /// Parse a loaded assembly identity from its display name.
    ///
    /// Components absent from the display name default to version 0.0.0.0, neutral culture
    /// and no token.
    ///
    /// # Errors
    /// Returns an error if the display name cannot be parsed.
    pub fn parse(display_name: &str) -> Result<Self, TypeNameError> {
        let reference = AssemblyIdentityRef::parse(display_name)?;
        Ok(Self {
            name: reference.name,
            version: reference.version.unwrap_or(AssemblyVersion::UNKNOWN),
            culture: reference.culture,
            public_key_token: reference.public_key_token,
        })
    }

    /// Generate the display name string for this identity.
    ///
    /// ```rust
    /// use exprscope::metadata::identity::{AssemblyIdentity, AssemblyVersion};
    ///
    /// let identity = AssemblyIdentity::simple("MyLibrary", AssemblyVersion::new(1, 2, 3, 4));
    /// assert_eq!(
    ///     identity.display_name(),
    ///     "MyLibrary, Version=1.2.3.4, Culture=neutral, PublicKeyToken=null"
    /// );
    /// ```
    #[must_use]
    pub fn display_name(&self) -> String {
        let token = self
            .public_key_token
            .map_or_else(|| "null".to_string(), |token| token.to_string());

        format!(
            "{}, Version={}, Culture={}, PublicKeyToken={}",
            self.name,
            self.version,
            self.culture.as_deref().unwrap_or("neutral"),
            token
        )
    }

    /// Convert to a reference carrying every component of this identity.
    #[must_use]
    pub fn to_reference(&self) -> AssemblyIdentityRef {
        AssemblyIdentityRef {
            name: self.name.clone(),
            version: Some(self.version),
            culture: self.culture.clone(),
            public_key_token: self.public_key_token,
        }
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for AssemblyIdentity {
    type Err = TypeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An assembly identity as referenced by an assembly-qualified type name.
///
/// The name is the primary resolution key. Version, culture and public key token are
/// informational; whether they participate in matching is decided by the resolver's
/// [`crate::resolver::AssemblyMatchPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyIdentityRef {
    /// Simple assembly name.
    pub name: String,
    /// Referenced version, if specified.
    pub version: Option<AssemblyVersion>,
    /// Referenced culture, `None` for neutral or unspecified.
    pub culture: Option<String>,
    /// Referenced public key token, `None` for `null` or unspecified.
    pub public_key_token: Option<PublicKeyToken>,
}

impl AssemblyIdentityRef {
    /// Create a reference that only names the assembly.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            culture: None,
            public_key_token: None,
        }
    }

    /// Quoted display names of `identities`, comma separated, for diagnostics
    #[must_use]
    pub fn display_list(identities: &[AssemblyIdentityRef]) -> String {
        identities
            .iter()
            .map(|identity| format!("'{identity}'"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parse a display name into a reference.
    ///
    /// Recognized keys are `Version`, `Culture` and `PublicKeyToken` (case-insensitive);
    /// other keys such as `ProcessorArchitecture` or `Retargetable` are accepted and ignored.
    ///
    /// # Errors
    /// Returns an error if the name is empty, a component lacks `=`, or a recognized
    /// component has a malformed value.
    pub fn parse(display_name: &str) -> Result<Self, TypeNameError> {
        let mut parts = display_name.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default();
        if name.is_empty() || name.contains(['[', ']', '=']) {
            return Err(TypeNameError::InvalidAssemblyName(display_name.to_string()));
        }

        let mut reference = Self::named(name);
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                return Err(TypeNameError::InvalidAssemblyName(display_name.to_string()));
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "version" => reference.version = Some(AssemblyVersion::parse(value)?),
                "culture" => {
                    if value.is_empty()
                        || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                    {
                        return Err(TypeNameError::InvalidCulture(value.to_string()));
                    }
                    if !value.eq_ignore_ascii_case("neutral") {
                        reference.culture = Some(value.to_string());
                    }
                }
                "publickeytoken" => {
                    if !value.eq_ignore_ascii_case("null") {
                        reference.public_key_token = Some(PublicKeyToken::parse(value)?);
                    }
                }
                _ => {}
            }
        }

        Ok(reference)
    }

    /// Check whether every component present in this reference equals the identity's.
    #[must_use]
    pub fn matches_exactly(&self, identity: &AssemblyIdentity) -> bool {
        self.name.eq_ignore_ascii_case(&identity.name)
            && self.version.map_or(true, |v| v == identity.version)
            && self.culture == identity.culture
            && self
                .public_key_token
                .map_or(true, |t| Some(t) == identity.public_key_token)
    }
}

impl fmt::Display for AssemblyIdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = self.version {
            write!(f, ", Version={version}")?;
        }
        write!(
            f,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        )?;
        match self.public_key_token {
            Some(token) => write!(f, ", PublicKeyToken={token}"),
            None => write!(f, ", PublicKeyToken=null"),
        }
    }
}

impl FromStr for AssemblyIdentityRef {
    type Err = TypeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSCORLIB: &str =
        "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089";

    #[test]
    fn test_assembly_version_parse_partial() {
        assert_eq!(
            AssemblyVersion::parse("1.2.3").unwrap(),
            AssemblyVersion::new(1, 2, 3, 0)
        );
        assert_eq!(
            AssemblyVersion::parse("1").unwrap(),
            AssemblyVersion::new(1, 0, 0, 0)
        );
    }

    #[test]
    fn test_assembly_version_parse_invalid() {
        assert!(AssemblyVersion::parse("").is_err());
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.2.abc.4").is_err());
        assert!(AssemblyVersion::parse("1.2.99999.4").is_err());
        assert!(AssemblyVersion::parse("1..2").is_err());
    }

    #[test]
    fn test_assembly_version_ordering() {
        let v1 = AssemblyVersion::new(1, 0, 0, 0);
        let v1_1 = AssemblyVersion::new(1, 1, 0, 0);
        let v2 = AssemblyVersion::new(2, 0, 0, 0);

        assert!(v1 < v1_1);
        assert!(v1_1 < v2);
        assert_eq!(v2.to_string(), "2.0.0.0");
    }

    #[test]
    fn test_public_key_token_round_trip() {
        let token = PublicKeyToken::parse("b77a5c561934e089").unwrap();
        assert_eq!(token.0[0], 0xb7);
        assert_eq!(token.0[7], 0x89);
        assert_eq!(token.to_string(), "b77a5c561934e089");
    }

    #[test]
    fn test_public_key_token_invalid() {
        assert!(matches!(
            PublicKeyToken::parse("b77a5c"),
            Err(TypeNameError::InvalidPublicKeyToken(_))
        ));
        assert!(PublicKeyToken::parse("zz7a5c561934e089").is_err());
    }

    #[test]
    fn test_reference_parse_full() {
        let reference = AssemblyIdentityRef::parse(MSCORLIB).unwrap();
        assert_eq!(reference.name, "mscorlib");
        assert_eq!(reference.version, Some(AssemblyVersion::new(4, 0, 0, 0)));
        assert_eq!(reference.culture, None);
        assert_eq!(
            reference.public_key_token.map(|t| t.to_string()).as_deref(),
            Some("b77a5c561934e089")
        );
        assert_eq!(reference.to_string(), MSCORLIB);
    }

    #[test]
    fn test_reference_parse_name_only() {
        let reference = AssemblyIdentityRef::parse("397300B0-A").unwrap();
        assert_eq!(reference, AssemblyIdentityRef::named("397300B0-A"));
    }

    #[test]
    fn test_reference_parse_ignores_unknown_keys() {
        let reference =
            AssemblyIdentityRef::parse("System, Version=4.0.0.0, ProcessorArchitecture=MSIL")
                .unwrap();
        assert_eq!(reference.name, "System");
    }

    #[test]
    fn test_reference_parse_invalid() {
        assert!(matches!(
            AssemblyIdentityRef::parse(""),
            Err(TypeNameError::InvalidAssemblyName(_))
        ));
        assert!(matches!(
            AssemblyIdentityRef::parse("A, Version"),
            Err(TypeNameError::InvalidAssemblyName(_))
        ));
        assert!(matches!(
            AssemblyIdentityRef::parse("A, Version=x.y"),
            Err(TypeNameError::InvalidVersion(_))
        ));
        assert!(matches!(
            AssemblyIdentityRef::parse("A, Culture=en US"),
            Err(TypeNameError::InvalidCulture(_))
        ));
        assert!(matches!(
            AssemblyIdentityRef::parse("A, PublicKeyToken=123"),
            Err(TypeNameError::InvalidPublicKeyToken(_))
        ));
    }

    #[test]
    fn test_identity_display_name() {
        let identity = AssemblyIdentity::parse(MSCORLIB).unwrap();
        assert_eq!(identity.display_name(), MSCORLIB);
        assert_eq!(identity.to_reference().to_string(), MSCORLIB);
    }

    #[test]
    fn test_matches_exactly() {
        let loaded = AssemblyIdentity::parse(MSCORLIB).unwrap();

        let same = AssemblyIdentityRef::parse(MSCORLIB).unwrap();
        assert!(same.matches_exactly(&loaded));

        let name_only = AssemblyIdentityRef::named("MSCORLIB");
        assert!(name_only.matches_exactly(&loaded));

        let other_version =
            AssemblyIdentityRef::parse("mscorlib, Version=2.0.0.0, Culture=neutral").unwrap();
        assert!(!other_version.matches_exactly(&loaded));
    }
}
