//! CIL generation for bound expressions.
//!
//! [`IlEncoder`] is the low-level instruction encoder; [`CodeGenerator`] lowers a bound
//! expression tree onto it. The result is a [`CompiledMethod`], printable as the familiar
//! IL listing:
//!
//! ```text
//! {
//!   // Code size       14 (0xe)
//!   .maxstack  2
//!   IL_0000:  ldc.i4.0
//!   IL_0001:  call       "object Microsoft.VisualStudio.Debugger.Clr.IntrinsicMethods.GetReturnValue(int)"
//!   IL_0006:  unbox.any  "int"
//!   IL_000b:  ldc.i4.2
//!   IL_000c:  sub
//!   IL_000d:  ret
//! }
//! ```

mod codegen;
mod encoder;

use std::fmt;

pub use codegen::CodeGenerator;
pub use encoder::{
    opcode_lookup, FlowKind, IlEncoder, Label, OpcodeInfo, Operand, OperandKind, StackEffect,
};

use crate::metadata::typesystem::CilType;

/// One instruction of a finished method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    /// Byte offset from the start of the body
    pub offset: u32,
    /// Opcode value
    pub opcode: u16,
    /// Mnemonic
    pub mnemonic: &'static str,
    /// Operand with branch targets resolved
    pub operand: Operand,
}

impl fmt::Display for CompiledInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operand == Operand::None {
            write!(f, "IL_{:04x}:  {}", self.offset, self.mnemonic)
        } else {
            write!(f, "IL_{:04x}:  {:<10} {}", self.offset, self.mnemonic, self.operand)
        }
    }
}

/// A generated method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMethod {
    /// Instructions in order
    pub instructions: Vec<CompiledInstruction>,
    /// `.maxstack`
    pub max_stack: u16,
    /// Local slots, the suspended method's locals first
    pub locals: Vec<CilType>,
    /// Body size in bytes
    pub code_size: u32,
    /// Return type, `None` for `void`
    pub return_type: Option<CilType>,
}

impl CompiledMethod {
    /// Instruction mnemonics in order
    #[must_use]
    pub fn mnemonics(&self) -> Vec<&'static str> {
        self.instructions.iter().map(|instruction| instruction.mnemonic).collect()
    }

    /// Render the method as an IL listing
    #[must_use]
    pub fn listing(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CompiledMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "  // Code size {:>8} (0x{:x})", self.code_size, self.code_size)?;
        writeln!(f, "  .maxstack  {}", self.max_stack)?;
        if !self.locals.is_empty() {
            let locals: Vec<String> = self
                .locals
                .iter()
                .enumerate()
                .map(|(index, ty)| format!("{ty} V_{index}"))
                .collect();
            writeln!(f, "  .locals init ({})", locals.join(",\n                "))?;
        }
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        write!(f, "}}")
    }
}
