use std::fmt;

use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// The built-in runtime types that the host language spells with a keyword and that map to
/// dedicated CIL load/store instructions.
///
/// Only the core library's definitions carry a primitive kind, a user module defining its
/// own `System.Int32` gets an ordinary named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum CilPrimitiveKind {
    /// System.Boolean - true/false value
    Boolean,
    /// System.Char - Unicode 16-bit character
    Char,
    /// System.SByte - signed 8-bit integer
    I1,
    /// System.Byte - unsigned 8-bit integer
    U1,
    /// System.Int16 - signed 16-bit integer
    I2,
    /// System.UInt16 - unsigned 16-bit integer
    U2,
    /// System.Int32 - signed 32-bit integer
    I4,
    /// System.UInt32 - unsigned 32-bit integer
    U4,
    /// System.Int64 - signed 64-bit integer
    I8,
    /// System.UInt64 - unsigned 64-bit integer
    U8,
    /// System.Single - 32-bit floating point
    R4,
    /// System.Double - 64-bit floating point
    R8,
    /// System.IntPtr - native sized signed integer
    I,
    /// System.UIntPtr - native sized unsigned integer
    U,
    /// System.Object - base class for all reference types
    Object,
    /// System.String - immutable string of Unicode characters
    String,
}

impl CilPrimitiveKind {
    /// Full CLR name, e.g. `System.Int32`
    #[must_use]
    pub fn clr_full_name(&self) -> &'static str {
        match self {
            CilPrimitiveKind::Boolean => "System.Boolean",
            CilPrimitiveKind::Char => "System.Char",
            CilPrimitiveKind::I1 => "System.SByte",
            CilPrimitiveKind::U1 => "System.Byte",
            CilPrimitiveKind::I2 => "System.Int16",
            CilPrimitiveKind::U2 => "System.UInt16",
            CilPrimitiveKind::I4 => "System.Int32",
            CilPrimitiveKind::U4 => "System.UInt32",
            CilPrimitiveKind::I8 => "System.Int64",
            CilPrimitiveKind::U8 => "System.UInt64",
            CilPrimitiveKind::R4 => "System.Single",
            CilPrimitiveKind::R8 => "System.Double",
            CilPrimitiveKind::I => "System.IntPtr",
            CilPrimitiveKind::U => "System.UIntPtr",
            CilPrimitiveKind::Object => "System.Object",
            CilPrimitiveKind::String => "System.String",
        }
    }

    /// Look up a primitive by its full CLR name
    #[must_use]
    pub fn from_full_name(name: &str) -> Option<Self> {
        Self::iter().find(|kind| kind.clr_full_name() == name)
    }

    /// The host-language keyword for this type, if it has one.
    ///
    /// Native integers have no keyword and display with their CLR name.
    #[must_use]
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            CilPrimitiveKind::Boolean => Some("bool"),
            CilPrimitiveKind::Char => Some("char"),
            CilPrimitiveKind::I1 => Some("sbyte"),
            CilPrimitiveKind::U1 => Some("byte"),
            CilPrimitiveKind::I2 => Some("short"),
            CilPrimitiveKind::U2 => Some("ushort"),
            CilPrimitiveKind::I4 => Some("int"),
            CilPrimitiveKind::U4 => Some("uint"),
            CilPrimitiveKind::I8 => Some("long"),
            CilPrimitiveKind::U8 => Some("ulong"),
            CilPrimitiveKind::R4 => Some("float"),
            CilPrimitiveKind::R8 => Some("double"),
            CilPrimitiveKind::Object => Some("object"),
            CilPrimitiveKind::String => Some("string"),
            CilPrimitiveKind::I | CilPrimitiveKind::U => None,
        }
    }

    /// Look up a primitive by its host-language keyword
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::iter().find(|kind| kind.keyword() == Some(keyword))
    }

    /// Returns true for every primitive except `object` and `string`
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        !matches!(self, CilPrimitiveKind::Object | CilPrimitiveKind::String)
    }

    /// Returns true for the types that support the binary arithmetic operators
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            CilPrimitiveKind::Boolean | CilPrimitiveKind::Object | CilPrimitiveKind::String
        )
    }

    /// Returns true for unsigned integers, which select the `.un` arithmetic forms
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            CilPrimitiveKind::Char
                | CilPrimitiveKind::U1
                | CilPrimitiveKind::U2
                | CilPrimitiveKind::U4
                | CilPrimitiveKind::U8
                | CilPrimitiveKind::U
        )
    }

    /// Indirect load through a managed reference (`ldind.*`)
    #[must_use]
    pub fn ldind(&self) -> &'static str {
        match self {
            CilPrimitiveKind::Boolean | CilPrimitiveKind::U1 => "ldind.u1",
            CilPrimitiveKind::Char | CilPrimitiveKind::U2 => "ldind.u2",
            CilPrimitiveKind::I1 => "ldind.i1",
            CilPrimitiveKind::I2 => "ldind.i2",
            CilPrimitiveKind::I4 => "ldind.i4",
            CilPrimitiveKind::U4 => "ldind.u4",
            CilPrimitiveKind::I8 | CilPrimitiveKind::U8 => "ldind.i8",
            CilPrimitiveKind::R4 => "ldind.r4",
            CilPrimitiveKind::R8 => "ldind.r8",
            CilPrimitiveKind::I | CilPrimitiveKind::U => "ldind.i",
            CilPrimitiveKind::Object | CilPrimitiveKind::String => "ldind.ref",
        }
    }

    /// Indirect store through a managed reference (`stind.*`)
    #[must_use]
    pub fn stind(&self) -> &'static str {
        match self {
            CilPrimitiveKind::Boolean | CilPrimitiveKind::I1 | CilPrimitiveKind::U1 => "stind.i1",
            CilPrimitiveKind::Char | CilPrimitiveKind::I2 | CilPrimitiveKind::U2 => "stind.i2",
            CilPrimitiveKind::I4 | CilPrimitiveKind::U4 => "stind.i4",
            CilPrimitiveKind::I8 | CilPrimitiveKind::U8 => "stind.i8",
            CilPrimitiveKind::R4 => "stind.r4",
            CilPrimitiveKind::R8 => "stind.r8",
            CilPrimitiveKind::I | CilPrimitiveKind::U => "stind.i",
            CilPrimitiveKind::Object | CilPrimitiveKind::String => "stind.ref",
        }
    }

    /// Single-dimensional array element load (`ldelem.*`)
    #[must_use]
    pub fn ldelem(&self) -> &'static str {
        match self {
            CilPrimitiveKind::Boolean | CilPrimitiveKind::U1 => "ldelem.u1",
            CilPrimitiveKind::Char | CilPrimitiveKind::U2 => "ldelem.u2",
            CilPrimitiveKind::I1 => "ldelem.i1",
            CilPrimitiveKind::I2 => "ldelem.i2",
            CilPrimitiveKind::I4 => "ldelem.i4",
            CilPrimitiveKind::U4 => "ldelem.u4",
            CilPrimitiveKind::I8 | CilPrimitiveKind::U8 => "ldelem.i8",
            CilPrimitiveKind::R4 => "ldelem.r4",
            CilPrimitiveKind::R8 => "ldelem.r8",
            CilPrimitiveKind::I | CilPrimitiveKind::U => "ldelem.i",
            CilPrimitiveKind::Object | CilPrimitiveKind::String => "ldelem.ref",
        }
    }

    /// Single-dimensional array element store (`stelem.*`)
    #[must_use]
    pub fn stelem(&self) -> &'static str {
        match self {
            CilPrimitiveKind::Boolean | CilPrimitiveKind::I1 | CilPrimitiveKind::U1 => "stelem.i1",
            CilPrimitiveKind::Char | CilPrimitiveKind::I2 | CilPrimitiveKind::U2 => "stelem.i2",
            CilPrimitiveKind::I4 | CilPrimitiveKind::U4 => "stelem.i4",
            CilPrimitiveKind::I8 | CilPrimitiveKind::U8 => "stelem.i8",
            CilPrimitiveKind::R4 => "stelem.r4",
            CilPrimitiveKind::R8 => "stelem.r8",
            CilPrimitiveKind::I | CilPrimitiveKind::U => "stelem.i",
            CilPrimitiveKind::Object | CilPrimitiveKind::String => "stelem.ref",
        }
    }
}

impl fmt::Display for CilPrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword().unwrap_or(self.clr_full_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_lookup_covers_every_kind() {
        assert_eq!(CilPrimitiveKind::iter().count(), CilPrimitiveKind::COUNT);
        for kind in CilPrimitiveKind::iter() {
            assert_eq!(
                CilPrimitiveKind::from_full_name(kind.clr_full_name()),
                Some(kind)
            );
        }
        assert_eq!(CilPrimitiveKind::from_full_name("System.Exception"), None);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(CilPrimitiveKind::from_keyword("int"), Some(CilPrimitiveKind::I4));
        assert_eq!(
            CilPrimitiveKind::from_keyword("object"),
            Some(CilPrimitiveKind::Object)
        );
        assert_eq!(CilPrimitiveKind::from_keyword("nint"), None);
        assert_eq!(CilPrimitiveKind::I.to_string(), "System.IntPtr");
        assert_eq!(CilPrimitiveKind::U8.to_string(), "ulong");
    }

    #[test]
    fn test_indirect_access_mnemonics() {
        assert_eq!(CilPrimitiveKind::I4.ldind(), "ldind.i4");
        assert_eq!(CilPrimitiveKind::I4.stind(), "stind.i4");
        assert_eq!(CilPrimitiveKind::Boolean.ldind(), "ldind.u1");
        assert_eq!(CilPrimitiveKind::Boolean.stind(), "stind.i1");
        assert_eq!(CilPrimitiveKind::String.ldind(), "ldind.ref");
        assert_eq!(CilPrimitiveKind::Object.stelem(), "stelem.ref");
    }

    #[test]
    fn test_classification() {
        assert!(CilPrimitiveKind::I4.is_value_type());
        assert!(!CilPrimitiveKind::String.is_value_type());
        assert!(CilPrimitiveKind::R8.is_numeric());
        assert!(!CilPrimitiveKind::Boolean.is_numeric());
        assert!(CilPrimitiveKind::U4.is_unsigned());
        assert!(!CilPrimitiveKind::I4.is_unsigned());
    }
}
