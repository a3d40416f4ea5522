use std::fmt;

/// The kind of a debugger pseudo-variable, decided from its lexeme alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PseudoVariableKind {
    /// `$exception`, the exception currently being thrown
    Exception,
    /// `$stowedexception`, the stowed exception of a WinRT failure
    StowedException,
    /// `$ReturnValue` (index 0) or `$ReturnValueN`, a recent method's return value
    ReturnValue(u32),
    /// `$N`, an object id created by the user; holds the digits
    ObjectId(String),
    /// `@0x...`, the object at a raw address
    Address(u64),
    /// Not a pseudo-variable
    None,
}

impl PseudoVariableKind {
    /// Key of this pseudo-variable's entry in an inspection context.
    ///
    /// Returns `None` for [`PseudoVariableKind::None`].
    #[must_use]
    pub fn context_key(&self) -> Option<String> {
        match self {
            PseudoVariableKind::Exception => Some(EXCEPTION.to_string()),
            PseudoVariableKind::StowedException => Some(STOWED_EXCEPTION.to_string()),
            PseudoVariableKind::ReturnValue(0) => Some(RETURN_VALUE.to_string()),
            PseudoVariableKind::ReturnValue(index) => Some(format!("{RETURN_VALUE}{index}")),
            PseudoVariableKind::ObjectId(alias) => Some(alias.clone()),
            PseudoVariableKind::Address(address) => Some(format!("0x{address:x}")),
            PseudoVariableKind::None => None,
        }
    }

    /// Returns true unless this is [`PseudoVariableKind::None`]
    #[must_use]
    pub fn is_pseudo_variable(&self) -> bool {
        !matches!(self, PseudoVariableKind::None)
    }
}

impl fmt::Display for PseudoVariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PseudoVariableKind::Exception => write!(f, "{EXCEPTION}"),
            PseudoVariableKind::StowedException => write!(f, "{STOWED_EXCEPTION}"),
            PseudoVariableKind::ReturnValue(0) => write!(f, "{RETURN_VALUE}"),
            PseudoVariableKind::ReturnValue(index) => write!(f, "{RETURN_VALUE}{index}"),
            PseudoVariableKind::ObjectId(alias) => write!(f, "${alias}"),
            PseudoVariableKind::Address(address) => write!(f, "@0x{address:x}"),
            PseudoVariableKind::None => write!(f, "<none>"),
        }
    }
}

const EXCEPTION: &str = "$exception";
const STOWED_EXCEPTION: &str = "$stowedexception";
const RETURN_VALUE: &str = "$ReturnValue";
const RETURN_VALUE_LOWER: &str = "$returnvalue";

/// Classify a raw lexeme.
///
/// Rules apply in order and the first match wins. Casing is exact: only the listed
/// spellings are recognized, so `$Exception` and `$RETURNVALUE` are ordinary (undefined)
/// names.
///
/// ```rust
/// use exprscope::pseudovar::{classify, PseudoVariableKind};
///
/// assert_eq!(classify("$exception"), PseudoVariableKind::Exception);
/// assert_eq!(classify("$returnvalue21"), PseudoVariableKind::ReturnValue(21));
/// assert_eq!(classify("$33"), PseudoVariableKind::ObjectId("33".to_string()));
/// assert_eq!(classify("@0x1F"), PseudoVariableKind::Address(0x1f));
/// assert_eq!(classify("$03"), PseudoVariableKind::None);
/// assert_eq!(classify("$ReturnValue3A"), PseudoVariableKind::None);
/// ```
#[must_use]
pub fn classify(lexeme: &str) -> PseudoVariableKind {
    if lexeme == EXCEPTION {
        return PseudoVariableKind::Exception;
    }
    if lexeme == STOWED_EXCEPTION {
        return PseudoVariableKind::StowedException;
    }

    if let Some(suffix) = lexeme
        .strip_prefix(RETURN_VALUE)
        .or_else(|| lexeme.strip_prefix(RETURN_VALUE_LOWER))
    {
        return classify_return_value(suffix);
    }

    if let Some(digits) = lexeme.strip_prefix('$') {
        if is_object_id(digits) {
            return PseudoVariableKind::ObjectId(digits.to_string());
        }
        return PseudoVariableKind::None;
    }

    if let Some(hex) = lexeme
        .strip_prefix("@0x")
        .or_else(|| lexeme.strip_prefix("@0X"))
    {
        if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            if let Ok(address) = u64::from_str_radix(hex, 16) {
                return PseudoVariableKind::Address(address);
            }
        }
    }

    PseudoVariableKind::None
}

fn classify_return_value(suffix: &str) -> PseudoVariableKind {
    if suffix.is_empty() {
        return PseudoVariableKind::ReturnValue(0);
    }
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return PseudoVariableKind::None;
    }
    match suffix.parse::<i32>() {
        Ok(index) if index >= 0 => PseudoVariableKind::ReturnValue(index.unsigned_abs()),
        _ => PseudoVariableKind::None,
    }
}

fn is_object_id(digits: &str) -> bool {
    !digits.is_empty()
        && !digits.starts_with('0')
        && digits.bytes().all(|b| b.is_ascii_digit())
}
