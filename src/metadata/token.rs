use std::fmt;

/// Metadata token of a type definition inside one loaded module.
///
/// The high byte names the metadata table (always `TypeDef` for tokens produced by
/// [`crate::metadata::typesystem::ModuleBuilder`]) and the low 24 bits hold the 1-based row.
/// A token only identifies a type together with the [`crate::metadata::module::ModuleId`] of
/// the module it came from.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

const ROW_MASK: u32 = 0x00FF_FFFF;

impl Token {
    /// Table id of the `TypeDef` table
    pub const TYPE_DEF_TABLE: u8 = 0x02;

    /// Wrap a raw token value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// `TypeDef` token for a 1-based row
    #[must_use]
    pub fn type_def(row: u32) -> Self {
        Token((u32::from(Self::TYPE_DEF_TABLE) << 24) | (row & ROW_MASK))
    }

    /// Raw value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table id
    #[must_use]
    pub fn table(&self) -> u8 {
        self.0.to_be_bytes()[0]
    }

    /// 1-based row, 0 for an unassigned token
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & ROW_MASK
    }

    /// True until the builder assigns a row
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({self}, row {})", self.row())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_def_rows() {
        let token = Token::type_def(5);
        assert_eq!(token.value(), 0x0200_0005);
        assert_eq!(token.table(), Token::TYPE_DEF_TABLE);
        assert_eq!(token.row(), 5);
        assert!(!token.is_null());

        assert!(Token::default().is_null());
        assert!(Token::type_def(0).is_null());
    }

    #[test]
    fn test_formatting() {
        let token = Token::type_def(1);
        assert_eq!(token.to_string(), "0x02000001");
        assert_eq!(format!("{token:?}"), "Token(0x02000001, row 1)");
    }
}
