//! Bound (typed) expression tree.

use std::fmt;

use crate::{
    compiler::syntax::BinaryOp, metadata::typesystem::CilPrimitiveKind,
    metadata::typesystem::CilType, pseudovar::BoundPseudoVariable,
};

/// A constant value after binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstantValue {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Any constant that fits in a 32-bit stack slot
    Int32(i32),
    /// 64-bit constants; `ulong` values are stored by bit pattern
    Int64(i64),
    /// String literal
    String(String),
}

/// How a value is converted to another type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// Same type
    Identity,
    /// `null` to a reference type
    NullLiteral,
    /// Reference to a base class, no code
    ImplicitReference,
    /// Value type to `object` or a base class (`box`)
    Boxing,
    /// Reference to a value type (`unbox.any`)
    Unboxing,
    /// Reference to a derived class or interface (`castclass`)
    ExplicitReference,
    /// Between numeric types
    Numeric(CilPrimitiveKind),
}

/// A method reference as it appears in an IL listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    /// Declaring type
    pub declaring: CilType,
    /// Method name
    pub name: String,
    /// Static method
    pub is_static: bool,
    /// Method type arguments
    pub generic_args: Vec<CilType>,
    /// Instantiated parameter types and their by-ref flags
    pub params: Vec<(CilType, bool)>,
    /// Instantiated return type, `None` for `void`
    pub returns: Option<CilType>,
}

impl MethodRef {
    /// Values popped by a call, including the receiver
    #[must_use]
    pub fn stack_pops(&self) -> u16 {
        let receiver = u16::from(!self.is_static);
        u16::try_from(self.params.len()).unwrap_or(u16::MAX).saturating_add(receiver)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.returns {
            Some(ty) => write!(f, "{ty} ")?,
            None => write!(f, "void ")?,
        }
        write!(f, "{}.{}", self.declaring, self.name)?;
        if !self.generic_args.is_empty() {
            let args: Vec<String> = self.generic_args.iter().map(ToString::to_string).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(ty, by_ref)| if *by_ref { format!("ref {ty}") } else { ty.to_string() })
            .collect();
        write!(f, "({})", params.join(", "))
    }
}

/// A field reference; displays as `int S.F`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    /// Declaring type
    pub declaring: CilType,
    /// Field name
    pub name: String,
    /// Instantiated field type
    pub ty: CilType,
    /// Static field
    pub is_static: bool,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.ty, self.declaring, self.name)
    }
}

/// A property getter; displays as `bool int?.HasValue.get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    /// Declaring type
    pub declaring: CilType,
    /// Property name
    pub name: String,
    /// Instantiated property type
    pub ty: CilType,
    /// Static property
    pub is_static: bool,
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.get", self.ty, self.declaring, self.name)
    }
}

/// A call argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundArgument {
    /// The argument
    pub expr: BoundExpr,
    /// Passed by reference
    pub by_ref: bool,
}

/// Bound node payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundKind {
    /// Constant
    Constant(ConstantValue),
    /// Local slot of the suspended method
    Local(u16),
    /// Argument of the suspended method
    Parameter {
        /// Argument index, `this` included
        index: u16,
        /// Declared `ref`/`out`, the argument holds an address
        by_ref: bool,
    },
    /// `this`
    This,
    /// Pseudo-variable or declared variable
    PseudoVariable(BoundPseudoVariable),
    /// Field access
    Field {
        /// Receiver, `None` for static fields
        receiver: Option<Box<BoundExpr>>,
        /// The field
        field: FieldRef,
    },
    /// Property read
    Property {
        /// Receiver, `None` for static properties
        receiver: Option<Box<BoundExpr>>,
        /// The property
        property: PropertyRef,
    },
    /// Method call
    Call {
        /// Receiver, `None` for static methods
        receiver: Option<Box<BoundExpr>>,
        /// The method
        method: MethodRef,
        /// Arguments in order
        args: Vec<BoundArgument>,
    },
    /// Array element
    ArrayElement {
        /// The array
        array: Box<BoundExpr>,
        /// One index per dimension
        indices: Vec<BoundExpr>,
    },
    /// Conversion to [`BoundExpr::ty`]
    Conversion {
        /// Kind of conversion
        kind: ConversionKind,
        /// Converted value
        operand: Box<BoundExpr>,
    },
    /// Arithmetic negation
    Negate(Box<BoundExpr>),
    /// Arithmetic on two operands of the same type
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<BoundExpr>,
        /// Right operand
        right: Box<BoundExpr>,
    },
    /// `left ?? right`, both already converted to the result type
    Coalesce {
        /// Tested operand
        left: Box<BoundExpr>,
        /// Fallback
        right: Box<BoundExpr>,
    },
    /// `target = value`
    Assignment {
        /// Assignable target
        target: Box<BoundExpr>,
        /// Value converted to the target type
        value: Box<BoundExpr>,
    },
    /// `target op= value`
    CompoundAssignment {
        /// Operator
        op: BinaryOp,
        /// Assignable target
        target: Box<BoundExpr>,
        /// Right operand converted to the target type
        value: Box<BoundExpr>,
    },
}

/// A typed expression node.
///
/// `ty` is `None` only for the `null` literal and calls to `void` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundExpr {
    /// Payload
    pub kind: BoundKind,
    /// Static type
    pub ty: Option<CilType>,
}

impl BoundExpr {
    /// Create a node
    #[must_use]
    pub fn new(kind: BoundKind, ty: Option<CilType>) -> Self {
        BoundExpr { kind, ty }
    }

    /// Returns true if the expression denotes a storage location that may be written
    #[must_use]
    pub fn is_assignable(&self) -> bool {
        match &self.kind {
            BoundKind::Local(_) | BoundKind::Parameter { .. } | BoundKind::ArrayElement { .. } => {
                true
            }
            BoundKind::PseudoVariable(bound) => bound.assignable,
            BoundKind::Field { receiver, .. } => match receiver {
                None => true,
                Some(receiver) => match &receiver.ty {
                    Some(ty) if ty.is_value_type() => receiver.is_assignable(),
                    _ => true,
                },
            },
            _ => false,
        }
    }

    /// Returns true if the expression has a storage location whose address can be taken
    #[must_use]
    pub fn has_address(&self) -> bool {
        match &self.kind {
            BoundKind::PseudoVariable(bound) => bound.is_address_backed(),
            _ => self.is_assignable(),
        }
    }

    /// Returns true for the `null` literal
    #[must_use]
    pub fn is_null_literal(&self) -> bool {
        matches!(self.kind, BoundKind::Constant(ConstantValue::Null))
    }
}
