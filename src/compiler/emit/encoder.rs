//! Symbolic CIL instruction encoder.
//!
//! [`IlEncoder`] collects instructions by mnemonic, tracks the evaluation stack, resolves
//! branch labels and chooses the short branch forms where the displacement allows it.
//! Member and type operands stay symbolic: they are recorded as the display text an IL
//! listing would show, since the generated method is handed to the host as a listing plus
//! a description of the members it references.
//!
//! # Label Resolution
//!
//! Branches are recorded against a [`Label`] and laid out when the encoder is finished.
//! Every branch starts out in its short form; layout widens the ones whose displacement
//! does not fit in a signed byte and repeats until no branch changes.
//!
//! ```rust
//! use exprscope::compiler::emit::{IlEncoder, Operand};
//!
//! let mut encoder = IlEncoder::new();
//! let end = encoder.new_label();
//! encoder.load_int32(0)?;
//! encoder.emit("dup", Operand::None)?;
//! encoder.emit_branch("brtrue", end)?;
//! encoder.emit("pop", Operand::None)?;
//! encoder.load_int32(1)?;
//! encoder.define_label(end)?;
//! encoder.emit_return(true)?;
//!
//! let method = encoder.finish(None)?;
//! assert_eq!(method.max_stack, 2);
//! assert_eq!(method.code_size, 7);
//! # Ok::<(), exprscope::Error>(())
//! ```

use std::{fmt, sync::OnceLock};

use rustc_hash::FxHashMap;

use crate::{
    compiler::emit::{CompiledInstruction, CompiledMethod},
    metadata::typesystem::CilType,
    Result,
};

/// Operand encoding of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// Signed byte immediate
    Int8,
    /// 32-bit immediate
    Int32,
    /// 64-bit immediate
    Int64,
    /// User string token
    String,
    /// Member or type token
    Token,
    /// Signed byte branch displacement
    Branch8,
    /// 32-bit branch displacement
    Branch32,
    /// Byte-sized local or argument index
    Variable8,
    /// 16-bit local or argument index
    Variable16,
}

impl OperandKind {
    /// Encoded operand size in bytes
    #[must_use]
    pub fn size(&self) -> u32 {
        match self {
            OperandKind::None => 0,
            OperandKind::Int8 | OperandKind::Branch8 | OperandKind::Variable8 => 1,
            OperandKind::Variable16 => 2,
            OperandKind::Int32 | OperandKind::String | OperandKind::Token | OperandKind::Branch32 => 4,
            OperandKind::Int64 => 8,
        }
    }
}

/// Stack behaviour of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Pops and pushes a fixed number of values
    Fixed(u8, u8),
    /// Depends on the operand, the caller supplies it
    Variable,
}

/// Control flow after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Falls through
    Next,
    /// Unconditional branch
    Branch,
    /// Conditional branch
    ConditionalBranch,
    /// Method return
    Return,
}

/// Static description of one opcode
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    /// Opcode value, two-byte opcodes carry the `0xFE` prefix in the high byte
    pub opcode: u16,
    /// Operand encoding
    pub operand: OperandKind,
    /// Stack behaviour
    pub stack: StackEffect,
    /// Control flow
    pub flow: FlowKind,
}

impl OpcodeInfo {
    /// Total encoded size, opcode and operand
    #[must_use]
    pub fn size(&self) -> u32 {
        let opcode = if self.opcode > 0xFF { 2 } else { 1 };
        opcode + self.operand.size()
    }
}

const fn op(opcode: u16, operand: OperandKind, pops: u8, pushes: u8) -> OpcodeInfo {
    OpcodeInfo {
        opcode,
        operand,
        stack: StackEffect::Fixed(pops, pushes),
        flow: FlowKind::Next,
    }
}

const fn var(opcode: u16, operand: OperandKind, flow: FlowKind) -> OpcodeInfo {
    OpcodeInfo {
        opcode,
        operand,
        stack: StackEffect::Variable,
        flow,
    }
}

const fn branch(opcode: u16, operand: OperandKind, pops: u8, flow: FlowKind) -> OpcodeInfo {
    OpcodeInfo {
        opcode,
        operand,
        stack: StackEffect::Fixed(pops, 0),
        flow,
    }
}

/// Every instruction the code generator can produce
const OPCODES: &[(&str, OpcodeInfo)] = &[
    ("nop", op(0x00, OperandKind::None, 0, 0)),
    ("ldarg.0", op(0x02, OperandKind::None, 0, 1)),
    ("ldarg.1", op(0x03, OperandKind::None, 0, 1)),
    ("ldarg.2", op(0x04, OperandKind::None, 0, 1)),
    ("ldarg.3", op(0x05, OperandKind::None, 0, 1)),
    ("ldloc.0", op(0x06, OperandKind::None, 0, 1)),
    ("ldloc.1", op(0x07, OperandKind::None, 0, 1)),
    ("ldloc.2", op(0x08, OperandKind::None, 0, 1)),
    ("ldloc.3", op(0x09, OperandKind::None, 0, 1)),
    ("stloc.0", op(0x0A, OperandKind::None, 1, 0)),
    ("stloc.1", op(0x0B, OperandKind::None, 1, 0)),
    ("stloc.2", op(0x0C, OperandKind::None, 1, 0)),
    ("stloc.3", op(0x0D, OperandKind::None, 1, 0)),
    ("ldarg.s", op(0x0E, OperandKind::Variable8, 0, 1)),
    ("ldarga.s", op(0x0F, OperandKind::Variable8, 0, 1)),
    ("starg.s", op(0x10, OperandKind::Variable8, 1, 0)),
    ("ldloc.s", op(0x11, OperandKind::Variable8, 0, 1)),
    ("ldloca.s", op(0x12, OperandKind::Variable8, 0, 1)),
    ("stloc.s", op(0x13, OperandKind::Variable8, 1, 0)),
    ("ldnull", op(0x14, OperandKind::None, 0, 1)),
    ("ldc.i4.m1", op(0x15, OperandKind::None, 0, 1)),
    ("ldc.i4.0", op(0x16, OperandKind::None, 0, 1)),
    ("ldc.i4.1", op(0x17, OperandKind::None, 0, 1)),
    ("ldc.i4.2", op(0x18, OperandKind::None, 0, 1)),
    ("ldc.i4.3", op(0x19, OperandKind::None, 0, 1)),
    ("ldc.i4.4", op(0x1A, OperandKind::None, 0, 1)),
    ("ldc.i4.5", op(0x1B, OperandKind::None, 0, 1)),
    ("ldc.i4.6", op(0x1C, OperandKind::None, 0, 1)),
    ("ldc.i4.7", op(0x1D, OperandKind::None, 0, 1)),
    ("ldc.i4.8", op(0x1E, OperandKind::None, 0, 1)),
    ("ldc.i4.s", op(0x1F, OperandKind::Int8, 0, 1)),
    ("ldc.i4", op(0x20, OperandKind::Int32, 0, 1)),
    ("ldc.i8", op(0x21, OperandKind::Int64, 0, 1)),
    ("dup", op(0x25, OperandKind::None, 1, 2)),
    ("pop", op(0x26, OperandKind::None, 1, 0)),
    ("call", var(0x28, OperandKind::Token, FlowKind::Next)),
    ("ret", var(0x2A, OperandKind::None, FlowKind::Return)),
    ("br.s", branch(0x2B, OperandKind::Branch8, 0, FlowKind::Branch)),
    ("brfalse.s", branch(0x2C, OperandKind::Branch8, 1, FlowKind::ConditionalBranch)),
    ("brtrue.s", branch(0x2D, OperandKind::Branch8, 1, FlowKind::ConditionalBranch)),
    ("br", branch(0x38, OperandKind::Branch32, 0, FlowKind::Branch)),
    ("brfalse", branch(0x39, OperandKind::Branch32, 1, FlowKind::ConditionalBranch)),
    ("brtrue", branch(0x3A, OperandKind::Branch32, 1, FlowKind::ConditionalBranch)),
    ("ldind.i1", op(0x46, OperandKind::None, 1, 1)),
    ("ldind.u1", op(0x47, OperandKind::None, 1, 1)),
    ("ldind.i2", op(0x48, OperandKind::None, 1, 1)),
    ("ldind.u2", op(0x49, OperandKind::None, 1, 1)),
    ("ldind.i4", op(0x4A, OperandKind::None, 1, 1)),
    ("ldind.u4", op(0x4B, OperandKind::None, 1, 1)),
    ("ldind.i8", op(0x4C, OperandKind::None, 1, 1)),
    ("ldind.i", op(0x4D, OperandKind::None, 1, 1)),
    ("ldind.r4", op(0x4E, OperandKind::None, 1, 1)),
    ("ldind.r8", op(0x4F, OperandKind::None, 1, 1)),
    ("ldind.ref", op(0x50, OperandKind::None, 1, 1)),
    ("stind.ref", op(0x51, OperandKind::None, 2, 0)),
    ("stind.i1", op(0x52, OperandKind::None, 2, 0)),
    ("stind.i2", op(0x53, OperandKind::None, 2, 0)),
    ("stind.i4", op(0x54, OperandKind::None, 2, 0)),
    ("stind.i8", op(0x55, OperandKind::None, 2, 0)),
    ("stind.r4", op(0x56, OperandKind::None, 2, 0)),
    ("stind.r8", op(0x57, OperandKind::None, 2, 0)),
    ("add", op(0x58, OperandKind::None, 2, 1)),
    ("sub", op(0x59, OperandKind::None, 2, 1)),
    ("mul", op(0x5A, OperandKind::None, 2, 1)),
    ("div", op(0x5B, OperandKind::None, 2, 1)),
    ("div.un", op(0x5C, OperandKind::None, 2, 1)),
    ("neg", op(0x65, OperandKind::None, 1, 1)),
    ("conv.i1", op(0x67, OperandKind::None, 1, 1)),
    ("conv.i2", op(0x68, OperandKind::None, 1, 1)),
    ("conv.i4", op(0x69, OperandKind::None, 1, 1)),
    ("conv.i8", op(0x6A, OperandKind::None, 1, 1)),
    ("conv.r4", op(0x6B, OperandKind::None, 1, 1)),
    ("conv.r8", op(0x6C, OperandKind::None, 1, 1)),
    ("conv.u4", op(0x6D, OperandKind::None, 1, 1)),
    ("conv.u8", op(0x6E, OperandKind::None, 1, 1)),
    ("callvirt", var(0x6F, OperandKind::Token, FlowKind::Next)),
    ("ldobj", op(0x71, OperandKind::Token, 1, 1)),
    ("ldstr", op(0x72, OperandKind::String, 0, 1)),
    ("castclass", op(0x74, OperandKind::Token, 1, 1)),
    ("isinst", op(0x75, OperandKind::Token, 1, 1)),
    ("conv.r.un", op(0x76, OperandKind::None, 1, 1)),
    ("ldfld", op(0x7B, OperandKind::Token, 1, 1)),
    ("ldflda", op(0x7C, OperandKind::Token, 1, 1)),
    ("stfld", op(0x7D, OperandKind::Token, 2, 0)),
    ("ldsfld", op(0x7E, OperandKind::Token, 0, 1)),
    ("ldsflda", op(0x7F, OperandKind::Token, 0, 1)),
    ("stsfld", op(0x80, OperandKind::Token, 1, 0)),
    ("stobj", op(0x81, OperandKind::Token, 2, 0)),
    ("box", op(0x8C, OperandKind::Token, 1, 1)),
    ("ldelema", op(0x8F, OperandKind::Token, 2, 1)),
    ("ldelem.i1", op(0x90, OperandKind::None, 2, 1)),
    ("ldelem.u1", op(0x91, OperandKind::None, 2, 1)),
    ("ldelem.i2", op(0x92, OperandKind::None, 2, 1)),
    ("ldelem.u2", op(0x93, OperandKind::None, 2, 1)),
    ("ldelem.i4", op(0x94, OperandKind::None, 2, 1)),
    ("ldelem.u4", op(0x95, OperandKind::None, 2, 1)),
    ("ldelem.i8", op(0x96, OperandKind::None, 2, 1)),
    ("ldelem.i", op(0x97, OperandKind::None, 2, 1)),
    ("ldelem.r4", op(0x98, OperandKind::None, 2, 1)),
    ("ldelem.r8", op(0x99, OperandKind::None, 2, 1)),
    ("ldelem.ref", op(0x9A, OperandKind::None, 2, 1)),
    ("stelem.i", op(0x9B, OperandKind::None, 3, 0)),
    ("stelem.i1", op(0x9C, OperandKind::None, 3, 0)),
    ("stelem.i2", op(0x9D, OperandKind::None, 3, 0)),
    ("stelem.i4", op(0x9E, OperandKind::None, 3, 0)),
    ("stelem.i8", op(0x9F, OperandKind::None, 3, 0)),
    ("stelem.r4", op(0xA0, OperandKind::None, 3, 0)),
    ("stelem.r8", op(0xA1, OperandKind::None, 3, 0)),
    ("stelem.ref", op(0xA2, OperandKind::None, 3, 0)),
    ("ldelem", op(0xA3, OperandKind::Token, 2, 1)),
    ("stelem", op(0xA4, OperandKind::Token, 3, 0)),
    ("unbox.any", op(0xA5, OperandKind::Token, 1, 1)),
    ("conv.u2", op(0xD1, OperandKind::None, 1, 1)),
    ("conv.u1", op(0xD2, OperandKind::None, 1, 1)),
    ("conv.i", op(0xD3, OperandKind::None, 1, 1)),
    ("conv.u", op(0xE0, OperandKind::None, 1, 1)),
    ("ldarg", op(0xFE09, OperandKind::Variable16, 0, 1)),
    ("ldarga", op(0xFE0A, OperandKind::Variable16, 0, 1)),
    ("starg", op(0xFE0B, OperandKind::Variable16, 1, 0)),
    ("ldloc", op(0xFE0C, OperandKind::Variable16, 0, 1)),
    ("ldloca", op(0xFE0D, OperandKind::Variable16, 0, 1)),
    ("stloc", op(0xFE0E, OperandKind::Variable16, 1, 0)),
];

static OPCODE_LOOKUP: OnceLock<FxHashMap<&'static str, OpcodeInfo>> = OnceLock::new();

/// Mnemonic to opcode lookup, built on first use
pub fn opcode_lookup() -> &'static FxHashMap<&'static str, OpcodeInfo> {
    OPCODE_LOOKUP.get_or_init(|| OPCODES.iter().copied().collect())
}

fn opcode(mnemonic: &str) -> Result<(&'static str, OpcodeInfo)> {
    opcode_lookup()
        .get_key_value(mnemonic)
        .map(|(name, info)| (*name, *info))
        .ok_or_else(|| malformed_error!("Unknown instruction mnemonic: {}", mnemonic))
}

/// Maps long-form branch mnemonics to their short-form equivalents.
fn short_form(mnemonic: &str) -> Option<&'static str> {
    match mnemonic {
        "br" => Some("br.s"),
        "brfalse" => Some("brfalse.s"),
        "brtrue" => Some("brtrue.s"),
        _ => None,
    }
}

/// A branch target, created by [`IlEncoder::new_label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// Byte immediate (`ldc.i4.s`)
    Int8(i8),
    /// 32-bit immediate (`ldc.i4`)
    Int32(i32),
    /// 64-bit immediate (`ldc.i8`)
    Int64(i64),
    /// String literal (`ldstr`)
    String(String),
    /// Method, field or type, as displayed in a listing
    Member(String),
    /// Local slot
    Local(u16),
    /// Argument slot
    Argument(u16),
    /// Unresolved branch target
    Label(Label),
    /// Resolved branch target offset
    Target(u32),
}

impl Operand {
    fn fits(&self, kind: OperandKind) -> bool {
        matches!(
            (self, kind),
            (Operand::None, OperandKind::None)
                | (Operand::Int8(_), OperandKind::Int8)
                | (Operand::Int32(_), OperandKind::Int32)
                | (Operand::Int64(_), OperandKind::Int64)
                | (Operand::String(_), OperandKind::String)
                | (Operand::Member(_), OperandKind::Token)
                | (
                    Operand::Local(_) | Operand::Argument(_),
                    OperandKind::Variable8 | OperandKind::Variable16
                )
        )
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int8(value) => write!(f, "{value}"),
            Operand::Int32(value) => write!(f, "{value}"),
            Operand::Int64(value) => write!(f, "0x{value:x}"),
            Operand::String(value) | Operand::Member(value) => write!(f, "\"{value}\""),
            Operand::Local(index) | Operand::Argument(index) => write!(f, "V_{index}"),
            Operand::Label(label) => write!(f, "L_{}", label.0),
            Operand::Target(offset) => write!(f, "IL_{offset:04x}"),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingInstruction {
    mnemonic: &'static str,
    operand: Operand,
    /// Long form to fall back to when a short branch does not reach
    long_form: Option<&'static str>,
}

/// Core CIL instruction encoder.
///
/// Keeps the evaluation stack depth as instructions are appended and records the depth
/// expected at every branch target. Code after an unconditional branch or return is
/// unreachable until the next label is defined.
///
/// Not thread-safe; every compilation owns its own encoder.
#[derive(Debug, Default)]
pub struct IlEncoder {
    instructions: Vec<PendingInstruction>,
    /// Label id to the index of the instruction that follows it
    labels: Vec<Option<usize>>,
    locals: Vec<CilType>,
    current_stack_depth: i32,
    max_stack_depth: u16,
    label_stack_depths: FxHashMap<Label, i32>,
    unreachable: bool,
}

impl IlEncoder {
    /// Create an empty encoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder whose first local slots are already taken
    #[must_use]
    pub fn with_locals(locals: Vec<CilType>) -> Self {
        IlEncoder {
            locals,
            ..Self::default()
        }
    }

    /// Append a local slot and return its index.
    ///
    /// # Errors
    /// Returns an error if the method already has 65535 locals.
    pub fn declare_local(&mut self, ty: CilType) -> Result<u16> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| malformed_error!("Too many locals: {}", self.locals.len()))?;
        self.locals.push(ty);
        Ok(index)
    }

    /// Emit an instruction with a fixed stack effect.
    ///
    /// # Errors
    /// Returns an error for unknown mnemonics, operands of the wrong kind, branch or call
    /// instructions, and stack underflow.
    pub fn emit(&mut self, mnemonic: &str, operand: Operand) -> Result<()> {
        let (mnemonic, info) = opcode(mnemonic)?;
        let StackEffect::Fixed(pops, pushes) = info.stack else {
            return Err(malformed_error!("'{}' needs an explicit stack effect", mnemonic));
        };
        if info.flow != FlowKind::Next {
            return Err(malformed_error!("'{}' must be emitted as a branch", mnemonic));
        }
        if !operand.fits(info.operand) {
            return Err(malformed_error!(
                "Operand {:?} does not fit '{}'",
                operand,
                mnemonic
            ));
        }

        self.push(mnemonic, operand, None);
        self.update_stack_depth(pops, pushes)
    }

    /// Emit `call` or `callvirt` for a member with the given stack effect.
    ///
    /// # Errors
    /// Returns an error for any other mnemonic, or on stack underflow.
    pub fn emit_call(&mut self, mnemonic: &str, member: String, pops: u16, pushes: u16) -> Result<()> {
        let (mnemonic, info) = opcode(mnemonic)?;
        if info.stack != StackEffect::Variable || info.operand != OperandKind::Token {
            return Err(malformed_error!("'{}' is not a call instruction", mnemonic));
        }
        self.push(mnemonic, Operand::Member(member), None);

        let pops = u8::try_from(pops).map_err(|_| malformed_error!("Too many arguments: {}", pops))?;
        let pushes = u8::try_from(pushes).map_err(|_| malformed_error!("Too many results: {}", pushes))?;
        self.update_stack_depth(pops, pushes)
    }

    /// Emit a branch to `label`, given in its long form.
    ///
    /// # Errors
    /// Returns an error if `mnemonic` is not a branch or the stack depth disagrees with an
    /// earlier branch to the same label.
    pub fn emit_branch(&mut self, mnemonic: &str, label: Label) -> Result<()> {
        let (long, info) = opcode(mnemonic)?;
        let Some(short) = short_form(long) else {
            return Err(malformed_error!("'{}' is not a long-form branch", mnemonic));
        };
        let StackEffect::Fixed(pops, _) = info.stack else {
            return Err(malformed_error!("'{}' has no fixed stack effect", mnemonic));
        };
        self.label_index(label)?;

        self.push(short, Operand::Label(label), Some(long));
        self.update_stack_depth(pops, 0)?;
        self.record_label_stack_depth(label)?;
        if info.flow == FlowKind::Branch {
            self.unreachable = true;
        }
        Ok(())
    }

    /// Emit `ret`; `has_value` pops the return value.
    ///
    /// # Errors
    /// Returns an error if the stack does not hold exactly the return value.
    pub fn emit_return(&mut self, has_value: bool) -> Result<()> {
        self.push("ret", Operand::None, None);
        self.update_stack_depth(u8::from(has_value), 0)?;
        if self.current_stack_depth != 0 && !self.unreachable {
            return Err(malformed_error!(
                "Stack not empty at return: depth {}",
                self.current_stack_depth
            ));
        }
        self.unreachable = true;
        Ok(())
    }

    /// Allocate a new, undefined label
    pub fn new_label(&mut self) -> Label {
        let label = Label(u32::try_from(self.labels.len()).unwrap_or(u32::MAX));
        self.labels.push(None);
        label
    }

    /// Place `label` before the next instruction.
    ///
    /// # Errors
    /// Returns an error for a label defined twice or a stack depth mismatch between the
    /// branches to it and the fall-through path.
    pub fn define_label(&mut self, label: Label) -> Result<()> {
        let index = self.label_index(label)?;
        if self.labels[index].is_some() {
            return Err(malformed_error!("Duplicate label: L_{}", label.0));
        }
        self.labels[index] = Some(self.instructions.len());

        if let Some(&expected) = self.label_stack_depths.get(&label) {
            if self.unreachable {
                self.current_stack_depth = expected;
            } else if self.current_stack_depth != expected {
                return Err(malformed_error!(
                    "Stack depth mismatch at L_{}: expected {}, found {}",
                    label.0,
                    expected,
                    self.current_stack_depth
                ));
            }
        }
        self.unreachable = false;
        Ok(())
    }

    /// Push a 32-bit constant using the shortest form
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_int32(&mut self, value: i32) -> Result<()> {
        match value {
            -1 => self.emit("ldc.i4.m1", Operand::None),
            0 => self.emit("ldc.i4.0", Operand::None),
            1 => self.emit("ldc.i4.1", Operand::None),
            2 => self.emit("ldc.i4.2", Operand::None),
            3 => self.emit("ldc.i4.3", Operand::None),
            4 => self.emit("ldc.i4.4", Operand::None),
            5 => self.emit("ldc.i4.5", Operand::None),
            6 => self.emit("ldc.i4.6", Operand::None),
            7 => self.emit("ldc.i4.7", Operand::None),
            8 => self.emit("ldc.i4.8", Operand::None),
            _ => match i8::try_from(value) {
                Ok(byte) => self.emit("ldc.i4.s", Operand::Int8(byte)),
                Err(_) => self.emit("ldc.i4", Operand::Int32(value)),
            },
        }
    }

    /// Push a 64-bit constant
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_int64(&mut self, value: i64) -> Result<()> {
        self.emit("ldc.i8", Operand::Int64(value))
    }

    /// Push a local
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_local(&mut self, index: u16) -> Result<()> {
        const SHORT: [&str; 4] = ["ldloc.0", "ldloc.1", "ldloc.2", "ldloc.3"];
        self.emit_variable(&SHORT, "ldloc.s", "ldloc", Operand::Local(index), index)
    }

    /// Pop into a local
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn store_local(&mut self, index: u16) -> Result<()> {
        const SHORT: [&str; 4] = ["stloc.0", "stloc.1", "stloc.2", "stloc.3"];
        self.emit_variable(&SHORT, "stloc.s", "stloc", Operand::Local(index), index)
    }

    /// Push the address of a local
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_local_address(&mut self, index: u16) -> Result<()> {
        self.emit_variable(&[], "ldloca.s", "ldloca", Operand::Local(index), index)
    }

    /// Push an argument
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_argument(&mut self, index: u16) -> Result<()> {
        const SHORT: [&str; 4] = ["ldarg.0", "ldarg.1", "ldarg.2", "ldarg.3"];
        self.emit_variable(&SHORT, "ldarg.s", "ldarg", Operand::Argument(index), index)
    }

    /// Pop into an argument
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn store_argument(&mut self, index: u16) -> Result<()> {
        self.emit_variable(&[], "starg.s", "starg", Operand::Argument(index), index)
    }

    /// Push the address of an argument
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_argument_address(&mut self, index: u16) -> Result<()> {
        self.emit_variable(&[], "ldarga.s", "ldarga", Operand::Argument(index), index)
    }

    fn emit_variable(
        &mut self,
        short: &[&str],
        byte_form: &str,
        long_form: &str,
        operand: Operand,
        index: u16,
    ) -> Result<()> {
        if let Some(mnemonic) = short.get(usize::from(index)) {
            return self.emit(mnemonic, Operand::None);
        }
        if index <= u16::from(u8::MAX) {
            self.emit(byte_form, operand)
        } else {
            self.emit(long_form, operand)
        }
    }

    /// Maximum stack depth reached so far
    #[must_use]
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack_depth
    }

    /// Current stack depth
    #[must_use]
    pub fn current_stack_depth(&self) -> i32 {
        self.current_stack_depth
    }

    /// Lay out the method and resolve every label.
    ///
    /// # Errors
    /// Returns an error if a branch targets a label that was never defined.
    pub fn finish(mut self, return_type: Option<CilType>) -> Result<CompiledMethod> {
        let targets = self
            .labels
            .iter()
            .enumerate()
            .map(|(id, index)| index.ok_or_else(|| malformed_error!("Undefined label: L_{}", id)))
            .collect::<Result<Vec<_>>>()?;

        let offsets = loop {
            let offsets = self.layout()?;
            let mut widened = false;
            for (i, instruction) in self.instructions.iter_mut().enumerate() {
                let (Some(long), Operand::Label(label)) = (instruction.long_form, &instruction.operand)
                else {
                    continue;
                };
                if opcode(instruction.mnemonic)?.1.operand != OperandKind::Branch8 {
                    continue;
                }
                let target = offsets[targets[label.0 as usize]];
                let next = offsets[i + 1];
                let displacement = i64::from(target) - i64::from(next);
                if i8::try_from(displacement).is_err() {
                    instruction.mnemonic = long;
                    widened = true;
                }
            }
            if !widened {
                break offsets;
            }
        };

        let code_size = offsets.last().copied().unwrap_or(0);
        let instructions = self
            .instructions
            .into_iter()
            .zip(offsets.iter())
            .map(|(instruction, &offset)| {
                let operand = match instruction.operand {
                    Operand::Label(label) => Operand::Target(offsets[targets[label.0 as usize]]),
                    other => other,
                };
                Ok(CompiledInstruction {
                    offset,
                    opcode: opcode(instruction.mnemonic)?.1.opcode,
                    mnemonic: instruction.mnemonic,
                    operand,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledMethod {
            instructions,
            max_stack: self.max_stack_depth,
            locals: self.locals,
            code_size,
            return_type,
        })
    }

    /// Instruction offsets, with one extra entry for the end of the method
    fn layout(&self) -> Result<Vec<u32>> {
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset = 0u32;
        for instruction in &self.instructions {
            offsets.push(offset);
            offset += opcode(instruction.mnemonic)?.1.size();
        }
        offsets.push(offset);
        Ok(offsets)
    }

    fn push(&mut self, mnemonic: &'static str, operand: Operand, long_form: Option<&'static str>) {
        self.instructions.push(PendingInstruction {
            mnemonic,
            operand,
            long_form,
        });
    }

    fn label_index(&self, label: Label) -> Result<usize> {
        let index = label.0 as usize;
        if index >= self.labels.len() {
            return Err(malformed_error!("Unknown label: L_{}", label.0));
        }
        Ok(index)
    }

    fn update_stack_depth(&mut self, pops: u8, pushes: u8) -> Result<()> {
        self.current_stack_depth += i32::from(pushes) - i32::from(pops);

        // Depth is meaningless in unreachable code
        if self.current_stack_depth < 0 {
            if !self.unreachable {
                return Err(malformed_error!(
                    "Stack underflow: depth became {} after instruction with {} pops, {} pushes",
                    self.current_stack_depth,
                    pops,
                    pushes
                ));
            }
            self.current_stack_depth = 0;
        }

        let depth = u16::try_from(self.current_stack_depth)
            .map_err(|_| malformed_error!("Stack depth exceeds u16 range"))?;
        self.max_stack_depth = self.max_stack_depth.max(depth);
        Ok(())
    }

    fn record_label_stack_depth(&mut self, label: Label) -> Result<()> {
        match self.label_stack_depths.get(&label) {
            Some(&expected) if expected != self.current_stack_depth => Err(malformed_error!(
                "Stack depth mismatch for branch to L_{}: expected {}, found {}",
                label.0,
                expected,
                self.current_stack_depth
            )),
            Some(_) => Ok(()),
            None => {
                self.label_stack_depths.insert(label, self.current_stack_depth);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_opcode_table_has_no_duplicates() {
        assert_eq!(opcode_lookup().len(), OPCODES.len());
        assert_eq!(opcode("ldloc").unwrap().1.size(), 4);
        assert_eq!(opcode("ldstr").unwrap().1.size(), 5);
        assert_eq!(opcode("ldc.i8").unwrap().1.size(), 9);
    }

    #[test]
    fn test_shortest_constant_forms() -> Result<()> {
        let mut encoder = IlEncoder::new();
        encoder.load_int32(-1)?;
        encoder.load_int32(8)?;
        encoder.load_int32(100)?;
        encoder.load_int32(1000)?;
        let method = encoder.finish(None)?;

        let mnemonics: Vec<_> = method.instructions.iter().map(|i| i.mnemonic).collect();
        assert_eq!(mnemonics, ["ldc.i4.m1", "ldc.i4.8", "ldc.i4.s", "ldc.i4"]);
        assert_eq!(method.code_size, 1 + 1 + 2 + 5);
        assert_eq!(method.max_stack, 4);
        Ok(())
    }

    #[test]
    fn test_variable_forms() -> Result<()> {
        let mut encoder = IlEncoder::new();
        encoder.load_argument(0)?;
        encoder.store_argument(0)?;
        encoder.load_local_address(3)?;
        encoder.store_local(300)?;
        let method = encoder.finish(None)?;

        let mnemonics: Vec<_> = method.instructions.iter().map(|i| i.mnemonic).collect();
        assert_eq!(mnemonics, ["ldarg.0", "starg.s", "ldloca.s", "stloc"]);
        assert_eq!(method.instructions[1].operand, Operand::Argument(0));
        assert_eq!(method.instructions[3].opcode, 0xFE0E);
        Ok(())
    }

    #[test]
    fn test_forward_branch_resolution() -> Result<()> {
        let mut encoder = IlEncoder::new();
        let end = encoder.new_label();
        encoder.emit("ldnull", Operand::None)?;
        encoder.emit("dup", Operand::None)?;
        encoder.emit_branch("brtrue", end)?;
        encoder.emit("pop", Operand::None)?;
        encoder.emit("ldstr", Operand::String("x".to_string()))?;
        encoder.define_label(end)?;
        encoder.emit_return(true)?;
        let method = encoder.finish(None)?;

        assert_eq!(method.instructions[2].mnemonic, "brtrue.s");
        assert_eq!(method.instructions[2].operand, Operand::Target(0x0a));
        assert_eq!(method.code_size, 11);
        assert_eq!(method.max_stack, 2);
        Ok(())
    }

    #[test]
    fn test_long_branch_when_out_of_range() -> Result<()> {
        let mut encoder = IlEncoder::new();
        let end = encoder.new_label();
        encoder.emit_branch("br", end)?;
        for _ in 0..30 {
            encoder.emit("ldstr", Operand::String(String::new()))?;
            encoder.emit("pop", Operand::None)?;
        }
        encoder.define_label(end)?;
        encoder.emit_return(false)?;
        let method = encoder.finish(None)?;

        assert_eq!(method.instructions[0].mnemonic, "br");
        assert_eq!(method.instructions[0].operand, Operand::Target(5 + 30 * 6));
        Ok(())
    }

    #[test]
    fn test_stack_errors() {
        let mut encoder = IlEncoder::new();
        assert!(matches!(
            encoder.emit("pop", Operand::None),
            Err(Error::Malformed { .. })
        ));

        let mut encoder = IlEncoder::new();
        assert!(encoder.emit("ldnull", Operand::None).is_ok());
        assert!(encoder.emit_return(false).is_err());
    }

    #[test]
    fn test_invalid_usage() {
        let mut encoder = IlEncoder::new();
        assert!(encoder.emit("bogus", Operand::None).is_err());
        assert!(encoder.emit("ldstr", Operand::Int32(1)).is_err());
        assert!(encoder.emit("call", Operand::Member("M".into())).is_err());
        assert!(encoder.emit_call("add", "M".into(), 0, 0).is_err());

        let mut encoder = IlEncoder::new();
        let label = encoder.new_label();
        assert!(encoder.define_label(label).is_ok());
        assert!(encoder.define_label(label).is_err());

        let mut encoder = IlEncoder::new();
        let label = encoder.new_label();
        assert!(encoder.emit_branch("br", label).is_ok());
        assert!(encoder.finish(None).is_err());
    }
}
