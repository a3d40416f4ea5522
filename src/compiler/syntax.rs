//! Expression syntax tree.

use std::fmt;

use strum::Display;

use crate::metadata::typesystem::CilPrimitiveKind;

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOp {
    /// `+`
    #[strum(to_string = "+")]
    Add,
    /// `-`
    #[strum(to_string = "-")]
    Subtract,
    /// `*`
    #[strum(to_string = "*")]
    Multiply,
    /// `/`
    #[strum(to_string = "/")]
    Divide,
}

impl BinaryOp {
    /// Arithmetic instruction implementing the operator
    #[must_use]
    pub fn mnemonic(&self, unsigned: bool) -> &'static str {
        match (self, unsigned) {
            (BinaryOp::Add, _) => "add",
            (BinaryOp::Subtract, _) => "sub",
            (BinaryOp::Multiply, _) => "mul",
            (BinaryOp::Divide, false) => "div",
            (BinaryOp::Divide, true) => "div.un",
        }
    }
}

/// Literal constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Integer literal, typed by magnitude during binding
    Integer(u64),
    /// String literal
    String(String),
}

/// How an argument is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    /// By value
    Value,
    /// `ref`
    Ref,
    /// `out`
    Out,
}

/// One call argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Passing mode
    pub kind: ArgumentKind,
    /// Argument expression
    pub expr: Expr,
}

/// A type as written in a cast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSyntax {
    /// Predefined type keyword
    Keyword(CilPrimitiveKind),
    /// Dotted name, each segment with its own type arguments
    Named {
        /// Written with a `global::` prefix
        global: bool,
        /// Name segments
        segments: Vec<(String, Vec<TypeSyntax>)>,
    },
    /// `T?`
    Nullable(Box<TypeSyntax>),
    /// `T[]`, `T[,]`
    Array {
        /// Element type
        element: Box<TypeSyntax>,
        /// Number of dimensions
        rank: u32,
    },
}

impl fmt::Display for TypeSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSyntax::Keyword(kind) => write!(f, "{kind}"),
            TypeSyntax::Named { global, segments } => {
                if *global {
                    write!(f, "global::")?;
                }
                for (i, (name, args)) in segments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                    if !args.is_empty() {
                        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                        write!(f, "<{}>", args.join(", "))?;
                    }
                }
                Ok(())
            }
            TypeSyntax::Nullable(inner) => write!(f, "{inner}?"),
            TypeSyntax::Array { element, rank } => {
                write!(f, "{element}[{}]", ",".repeat(rank.saturating_sub(1) as usize))
            }
        }
    }
}

/// Expression nodes; every node records the character offset it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Simple name, optionally with type arguments (`x`, `$ReturnValue`, `F<int>`)
    Name {
        /// Lexeme as written, without the verbatim `@`
        name: String,
        /// Explicit type arguments
        type_args: Vec<TypeSyntax>,
        /// Start offset
        position: usize,
    },
    /// `global::name`
    Global {
        /// Name after `::`
        name: String,
        /// Start offset
        position: usize,
    },
    /// Literal constant
    Literal {
        /// Value
        value: Literal,
        /// Start offset
        position: usize,
    },
    /// `this`
    This {
        /// Start offset
        position: usize,
    },
    /// `target.name`
    Member {
        /// Receiver
        target: Box<Expr>,
        /// Member name
        name: String,
        /// Explicit type arguments
        type_args: Vec<TypeSyntax>,
        /// Start offset
        position: usize,
    },
    /// `target(args)`
    Invoke {
        /// Invoked expression
        target: Box<Expr>,
        /// Arguments
        args: Vec<Argument>,
        /// Start offset
        position: usize,
    },
    /// `target[indices]`
    Index {
        /// Indexed expression
        target: Box<Expr>,
        /// Index expressions
        indices: Vec<Expr>,
        /// Start offset
        position: usize,
    },
    /// `(T)operand`
    Cast {
        /// Target type
        ty: TypeSyntax,
        /// Converted expression
        operand: Box<Expr>,
        /// Start offset
        position: usize,
    },
    /// `-operand`
    Negate {
        /// Negated expression
        operand: Box<Expr>,
        /// Start offset
        position: usize,
    },
    /// `left op right`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
        /// Start offset
        position: usize,
    },
    /// `left ?? right`
    Coalesce {
        /// Tested operand
        left: Box<Expr>,
        /// Fallback
        right: Box<Expr>,
        /// Start offset
        position: usize,
    },
    /// `target = value` or `target op= value`
    Assign {
        /// Assigned expression
        target: Box<Expr>,
        /// Compound operator, `None` for plain assignment
        op: Option<BinaryOp>,
        /// Assigned value
        value: Box<Expr>,
        /// Start offset
        position: usize,
    },
}

impl Expr {
    /// Start offset of the node
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Expr::Name { position, .. }
            | Expr::Global { position, .. }
            | Expr::Literal { position, .. }
            | Expr::This { position }
            | Expr::Member { position, .. }
            | Expr::Invoke { position, .. }
            | Expr::Index { position, .. }
            | Expr::Cast { position, .. }
            | Expr::Negate { position, .. }
            | Expr::Binary { position, .. }
            | Expr::Coalesce { position, .. }
            | Expr::Assign { position, .. } => *position,
        }
    }

    /// Returns true if evaluating the node itself writes state
    #[must_use]
    pub fn is_assignment(&self) -> bool {
        matches!(self, Expr::Assign { .. })
    }
}
