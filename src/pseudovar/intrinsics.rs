//! Intrinsic accessor catalog.
//!
//! Every pseudo-variable read or write compiles to a call into the debugger's intrinsic
//! methods class, which the runtime services from the suspended process. The set is fixed.

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::{
    metadata::typesystem::{CilPrimitiveKind, CilType},
    pseudovar::PseudoVariableKind,
};

/// Type that declares the intrinsic accessors
pub const INTRINSIC_METHODS_TYPE: &str = "Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods";

/// Name of the type the exception accessors return
pub const EXCEPTION_TYPE_NAME: &str = "System.Exception";

/// What an accessor returns, before any narrowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorReturn {
    /// `System.Exception`
    Exception,
    /// `object`
    Object,
    /// A managed reference to the method's type argument
    ReferenceToTypeArgument,
}

/// The fixed set of accessors, named as they are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum IntrinsicMethod {
    /// `System.Exception GetException()`
    GetException,
    /// `System.Exception GetStowedException()`
    GetStowedException,
    /// `object GetReturnValue(int)`
    GetReturnValue,
    /// `object GetObjectByAlias(string)`
    GetObjectByAlias,
    /// `object GetObjectAtAddress(ulong)`
    GetObjectAtAddress,
    /// `ref T GetVariableAddress<T>(string)`
    GetVariableAddress,
}

impl IntrinsicMethod {
    /// The accessor serving a pseudo-variable kind, `None` for [`PseudoVariableKind::None`]
    #[must_use]
    pub fn for_kind(kind: &PseudoVariableKind) -> Option<Self> {
        match kind {
            PseudoVariableKind::Exception => Some(IntrinsicMethod::GetException),
            PseudoVariableKind::StowedException => Some(IntrinsicMethod::GetStowedException),
            PseudoVariableKind::ReturnValue(_) => Some(IntrinsicMethod::GetReturnValue),
            PseudoVariableKind::ObjectId(_) => Some(IntrinsicMethod::GetObjectByAlias),
            PseudoVariableKind::Address(_) => Some(IntrinsicMethod::GetObjectAtAddress),
            PseudoVariableKind::None => None,
        }
    }

    /// Declared method name
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// The single parameter's type, if the accessor takes one
    #[must_use]
    pub fn parameter(&self) -> Option<CilPrimitiveKind> {
        match self {
            IntrinsicMethod::GetException | IntrinsicMethod::GetStowedException => None,
            IntrinsicMethod::GetReturnValue => Some(CilPrimitiveKind::I4),
            IntrinsicMethod::GetObjectByAlias | IntrinsicMethod::GetVariableAddress => {
                Some(CilPrimitiveKind::String)
            }
            IntrinsicMethod::GetObjectAtAddress => Some(CilPrimitiveKind::U8),
        }
    }

    /// What the accessor returns
    #[must_use]
    pub fn returns(&self) -> AccessorReturn {
        match self {
            IntrinsicMethod::GetException | IntrinsicMethod::GetStowedException => {
                AccessorReturn::Exception
            }
            IntrinsicMethod::GetReturnValue
            | IntrinsicMethod::GetObjectByAlias
            | IntrinsicMethod::GetObjectAtAddress => AccessorReturn::Object,
            IntrinsicMethod::GetVariableAddress => AccessorReturn::ReferenceToTypeArgument,
        }
    }

    /// Returns true for the accessor taking a type argument
    #[must_use]
    pub fn is_generic(&self) -> bool {
        matches!(self, IntrinsicMethod::GetVariableAddress)
    }

    /// Open signature, e.g. `object Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetReturnValue(int)`
    #[must_use]
    pub fn signature(&self) -> String {
        let returns = match self.returns() {
            AccessorReturn::Exception => EXCEPTION_TYPE_NAME,
            AccessorReturn::Object => "object",
            AccessorReturn::ReferenceToTypeArgument => "ref T",
        };
        let generic = if self.is_generic() { "<T>" } else { "" };
        let parameter = self.parameter().map(|p| p.to_string()).unwrap_or_default();
        format!(
            "{returns} {INTRINSIC_METHODS_TYPE}.{}{generic}({parameter})",
            self.name()
        )
    }
}

/// Literal argument pushed before an accessor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntrinsicArgument {
    /// Niladic accessor
    None,
    /// `ldc.i4` index
    Int32(i32),
    /// `ldstr` alias or variable name
    String(String),
    /// `ldc.i8` address, reinterpreted as unsigned
    UInt64(u64),
}

/// A fully instantiated accessor call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrinsicCall {
    /// The accessor
    pub method: IntrinsicMethod,
    /// Its literal argument
    pub argument: IntrinsicArgument,
    /// Type argument of [`IntrinsicMethod::GetVariableAddress`]
    pub type_argument: Option<CilType>,
}

impl IntrinsicCall {
    /// The call reading a pseudo-variable.
    ///
    /// Returns `None` for [`PseudoVariableKind::None`] and for return-value indices beyond
    /// the accessor's `int` parameter.
    #[must_use]
    pub fn for_kind(kind: &PseudoVariableKind) -> Option<Self> {
        let method = IntrinsicMethod::for_kind(kind)?;
        let argument = match kind {
            PseudoVariableKind::ReturnValue(index) => {
                IntrinsicArgument::Int32(i32::try_from(*index).ok()?)
            }
            PseudoVariableKind::ObjectId(alias) => IntrinsicArgument::String(alias.clone()),
            PseudoVariableKind::Address(address) => IntrinsicArgument::UInt64(*address),
            _ => IntrinsicArgument::None,
        };
        Some(IntrinsicCall {
            method,
            argument,
            type_argument: None,
        })
    }

    /// The call fetching the address of a variable declared in the debugger
    #[must_use]
    pub fn variable_address(name: &str, ty: CilType) -> Self {
        IntrinsicCall {
            method: IntrinsicMethod::GetVariableAddress,
            argument: IntrinsicArgument::String(name.to_string()),
            type_argument: Some(ty),
        }
    }

    /// Returns true if the call yields a managed reference instead of a value
    #[must_use]
    pub fn returns_address(&self) -> bool {
        self.method.returns() == AccessorReturn::ReferenceToTypeArgument
    }
}

impl fmt::Display for IntrinsicCall {
    /// Instantiated signature as it appears in an IL listing.
    ///
    /// The by-ref return of `GetVariableAddress<T>` is shown as the bare type argument.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.type_argument, self.method.returns()) {
            (Some(ty), AccessorReturn::ReferenceToTypeArgument) => write!(f, "{ty} ")?,
            (_, AccessorReturn::Exception) => write!(f, "{EXCEPTION_TYPE_NAME} ")?,
            _ => write!(f, "object ")?,
        }
        write!(f, "{INTRINSIC_METHODS_TYPE}.{}", self.method.name())?;
        if let Some(ty) = &self.type_argument {
            write!(f, "<{ty}>")?;
        }
        write!(f, "(")?;
        if let Some(parameter) = self.method.parameter() {
            write!(f, "{parameter}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        corlib, identity::AssemblyVersion, module::ModuleSet, typesystem::CilPrimitiveKind,
    };
    use strum::IntoEnumIterator;

    #[test]
    fn test_catalog_signatures() {
        let signatures: Vec<String> = IntrinsicMethod::iter().map(|m| m.signature()).collect();
        assert_eq!(signatures.len(), IntrinsicMethod::COUNT);
        assert_eq!(
            signatures[0],
            "System.Exception Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetException()"
        );
        assert_eq!(
            signatures[4],
            "object Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetObjectAtAddress(ulong)"
        );
        assert_eq!(
            signatures[5],
            "ref T Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetVariableAddress<T>(string)"
        );
    }

    #[test]
    fn test_calls_for_kinds() {
        let call = IntrinsicCall::for_kind(&PseudoVariableKind::ReturnValue(2)).unwrap();
        assert_eq!(call.argument, IntrinsicArgument::Int32(2));
        assert_eq!(
            call.to_string(),
            "object Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetReturnValue(int)"
        );

        let call = IntrinsicCall::for_kind(&PseudoVariableKind::ObjectId("23".into())).unwrap();
        assert_eq!(call.argument, IntrinsicArgument::String("23".into()));
        assert!(!call.returns_address());

        assert!(IntrinsicCall::for_kind(&PseudoVariableKind::None).is_none());
        assert!(IntrinsicCall::for_kind(&PseudoVariableKind::ReturnValue(u32::MAX)).is_none());
    }

    #[test]
    fn test_variable_address_display() {
        let mut modules = ModuleSet::new();
        modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
        let int = modules.primitive(CilPrimitiveKind::I4).unwrap();

        let call = IntrinsicCall::variable_address("x", int);
        assert!(call.returns_address());
        assert_eq!(
            call.to_string(),
            "int Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetVariableAddress<int>(string)"
        );
    }
}
