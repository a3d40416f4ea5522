use crate::{
    compiler::{
        bound::{BoundExpr, BoundKind, ConstantValue, ConversionKind, FieldRef},
        emit::{CompiledMethod, IlEncoder, Operand},
        syntax::BinaryOp,
    },
    metadata::typesystem::{CilPrimitiveKind, CilType},
    pseudovar::{intrinsics::IntrinsicArgument, BoundPseudoVariable},
    Result,
};

/// Where a store writes, after its address or receiver is on the stack
enum StoreTarget {
    /// `stind.*` / `stobj` through a managed reference
    Indirect(CilType),
    /// `stfld`
    Field(FieldRef),
    /// `stsfld`
    StaticField(FieldRef),
    /// `stelem.*` or the multi-dimensional `Set` accessor
    Element { element: CilType, rank: u32 },
}

/// Lowers a bound expression into a method body.
///
/// Locals of the suspended method are declared first so that slot numbers match; every
/// temporary the lowering needs is appended after them.
pub struct CodeGenerator {
    encoder: IlEncoder,
}

impl CodeGenerator {
    /// Create a generator whose first local slots mirror `locals`
    #[must_use]
    pub fn new(locals: Vec<CilType>) -> Self {
        CodeGenerator {
            encoder: IlEncoder::with_locals(locals),
        }
    }

    /// Compile `expr` into a method returning its value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tree cannot be lowered, which indicates a
    /// binder bug.
    pub fn compile_expression(mut self, expr: &BoundExpr) -> Result<CompiledMethod> {
        self.emit_value(expr)?;
        let has_value = expr.ty.is_some() || expr.is_null_literal();
        self.encoder.emit_return(has_value)?;
        self.encoder.finish(expr.ty.clone())
    }

    /// Compile `expr` into a `void` method, discarding any value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tree cannot be lowered.
    pub fn compile_statement(mut self, expr: &BoundExpr) -> Result<CompiledMethod> {
        self.emit_discarded(expr)?;
        self.encoder.emit_return(false)?;
        self.encoder.finish(None)
    }

    fn emit_discarded(&mut self, expr: &BoundExpr) -> Result<()> {
        match &expr.kind {
            BoundKind::Assignment { target, value } => self.emit_assignment(target, value, false),
            BoundKind::CompoundAssignment { op, target, value } => {
                self.emit_compound_assignment(*op, target, value, false)
            }
            _ => {
                self.emit_value(expr)?;
                if expr.ty.is_some() || expr.is_null_literal() {
                    self.encoder.emit("pop", Operand::None)?;
                }
                Ok(())
            }
        }
    }

    fn emit_value(&mut self, expr: &BoundExpr) -> Result<()> {
        match &expr.kind {
            BoundKind::Constant(value) => self.emit_constant(value),
            BoundKind::Local(index) => self.encoder.load_local(*index),
            BoundKind::Parameter { index, by_ref } => {
                self.encoder.load_argument(*index)?;
                if *by_ref {
                    self.emit_load_indirect(expect_type(expr)?)?;
                }
                Ok(())
            }
            BoundKind::This => {
                self.encoder.load_argument(0)?;
                let ty = expect_type(expr)?;
                if ty.is_value_type() {
                    self.encoder.emit("ldobj", Operand::Member(ty.to_string()))?;
                }
                Ok(())
            }
            BoundKind::PseudoVariable(bound) => self.emit_pseudo_variable(bound),
            BoundKind::Field { receiver, field } => match receiver {
                None => self.encoder.emit("ldsfld", Operand::Member(field.to_string())),
                Some(receiver) => {
                    self.emit_receiver(receiver, false)?;
                    self.encoder.emit("ldfld", Operand::Member(field.to_string()))
                }
            },
            BoundKind::Property { receiver, property } => {
                let mnemonic = match receiver {
                    None => "call",
                    Some(receiver) => {
                        self.emit_receiver(receiver, true)?;
                        call_mnemonic(receiver)
                    }
                };
                let pops = u16::from(receiver.is_some());
                self.encoder.emit_call(mnemonic, property.to_string(), pops, 1)
            }
            BoundKind::Call {
                receiver,
                method,
                args,
            } => {
                let mnemonic = match receiver {
                    None => "call",
                    Some(receiver) => {
                        self.emit_receiver(receiver, true)?;
                        call_mnemonic(receiver)
                    }
                };
                for arg in args {
                    if arg.by_ref {
                        self.emit_address(&arg.expr)?;
                    } else {
                        self.emit_value(&arg.expr)?;
                    }
                }
                let pushes = u16::from(method.returns.is_some());
                self.encoder
                    .emit_call(mnemonic, method.to_string(), method.stack_pops(), pushes)
            }
            BoundKind::ArrayElement { array, indices } => {
                self.emit_value(array)?;
                for index in indices {
                    self.emit_value(index)?;
                }
                let element = expect_type(expr)?;
                if indices.len() == 1 {
                    self.emit_element_load(element)
                } else {
                    let pops = array_accessor_pops(indices.len(), 1)?;
                    let accessor = array_accessor(element, indices.len(), "Get");
                    self.encoder.emit_call("call", accessor, pops, 1)
                }
            }
            BoundKind::Conversion { kind, operand } => {
                self.emit_value(operand)?;
                self.emit_conversion(*kind, operand.ty.as_ref(), expect_type(expr)?)
            }
            BoundKind::Negate(operand) => {
                self.emit_value(operand)?;
                self.encoder.emit("neg", Operand::None)
            }
            BoundKind::Binary { op, left, right } => {
                self.emit_value(left)?;
                self.emit_value(right)?;
                self.encoder.emit(op.mnemonic(is_unsigned(expr.ty.as_ref())), Operand::None)
            }
            BoundKind::Coalesce { left, right } => {
                let end = self.encoder.new_label();
                self.emit_value(left)?;
                self.encoder.emit("dup", Operand::None)?;
                self.encoder.emit_branch("brtrue", end)?;
                self.encoder.emit("pop", Operand::None)?;
                self.emit_value(right)?;
                self.encoder.define_label(end)
            }
            BoundKind::Assignment { target, value } => self.emit_assignment(target, value, true),
            BoundKind::CompoundAssignment { op, target, value } => {
                self.emit_compound_assignment(*op, target, value, true)
            }
        }
    }

    fn emit_constant(&mut self, value: &ConstantValue) -> Result<()> {
        match value {
            ConstantValue::Null => self.encoder.emit("ldnull", Operand::None),
            ConstantValue::Boolean(value) => self.encoder.load_int32(i32::from(*value)),
            ConstantValue::Int32(value) => self.encoder.load_int32(*value),
            ConstantValue::Int64(value) => self.encoder.load_int64(*value),
            ConstantValue::String(value) => self.encoder.emit("ldstr", Operand::String(value.clone())),
        }
    }

    /// Push the accessor argument and call the accessor, leaving its raw result
    fn emit_intrinsic_call(&mut self, bound: &BoundPseudoVariable) -> Result<()> {
        let pops = match &bound.call.argument {
            IntrinsicArgument::None => 0,
            IntrinsicArgument::Int32(index) => {
                self.encoder.load_int32(*index)?;
                1
            }
            IntrinsicArgument::String(name) => {
                self.encoder.emit("ldstr", Operand::String(name.clone()))?;
                1
            }
            IntrinsicArgument::UInt64(address) => {
                self.encoder.load_int64(i64::from_ne_bytes(address.to_ne_bytes()))?;
                1
            }
        };
        self.encoder.emit_call("call", bound.call.to_string(), pops, 1)
    }

    fn emit_pseudo_variable(&mut self, bound: &BoundPseudoVariable) -> Result<()> {
        self.emit_intrinsic_call(bound)?;
        if bound.is_address_backed() {
            return self.emit_load_indirect(&bound.ty);
        }
        if bound.requires_conversion() {
            let mnemonic = if bound.ty.is_value_type() {
                "unbox.any"
            } else {
                "castclass"
            };
            self.encoder.emit(mnemonic, Operand::Member(bound.ty.to_string()))?;
        }
        Ok(())
    }

    /// Push a receiver; value types go by address when one exists or `needs_address` is set
    fn emit_receiver(&mut self, receiver: &BoundExpr, needs_address: bool) -> Result<()> {
        match &receiver.ty {
            Some(ty) if ty.is_value_type() && (needs_address || receiver.has_address()) => {
                self.emit_address(receiver)
            }
            _ => self.emit_value(receiver),
        }
    }

    /// Push a managed reference to the storage of `expr`, spilling rvalues to a temporary
    fn emit_address(&mut self, expr: &BoundExpr) -> Result<()> {
        match &expr.kind {
            BoundKind::Local(index) => self.encoder.load_local_address(*index),
            BoundKind::Parameter { index, by_ref: true } => self.encoder.load_argument(*index),
            BoundKind::Parameter { index, by_ref: false } => {
                self.encoder.load_argument_address(*index)
            }
            BoundKind::PseudoVariable(bound) if bound.is_address_backed() => {
                self.emit_intrinsic_call(bound)
            }
            BoundKind::Field {
                receiver: None,
                field,
            } => self.encoder.emit("ldsflda", Operand::Member(field.to_string())),
            BoundKind::Field {
                receiver: Some(receiver),
                field,
            } if receiver.ty.as_ref().is_some_and(CilType::is_reference_type)
                || receiver.has_address() =>
            {
                self.emit_receiver(receiver, true)?;
                self.encoder.emit("ldflda", Operand::Member(field.to_string()))
            }
            BoundKind::ArrayElement { array, indices } => {
                self.emit_value(array)?;
                for index in indices {
                    self.emit_value(index)?;
                }
                let element = expect_type(expr)?;
                if indices.len() == 1 {
                    self.encoder.emit("ldelema", Operand::Member(element.to_string()))
                } else {
                    let pops = array_accessor_pops(indices.len(), 1)?;
                    let accessor = array_accessor(element, indices.len(), "Address");
                    self.encoder.emit_call("call", accessor, pops, 1)
                }
            }
            _ => {
                let ty = expect_type(expr)?.clone();
                self.emit_value(expr)?;
                let temp = self.encoder.declare_local(ty)?;
                self.encoder.store_local(temp)?;
                self.encoder.load_local_address(temp)
            }
        }
    }

    /// Push what a store to `target` needs below the value
    fn emit_store_prefix(&mut self, target: &BoundExpr) -> Result<StoreTarget> {
        let ty = expect_type(target)?;
        match &target.kind {
            BoundKind::PseudoVariable(bound) if bound.is_address_backed() => {
                self.emit_intrinsic_call(bound)?;
                Ok(StoreTarget::Indirect(ty.clone()))
            }
            BoundKind::Parameter { index, by_ref: true } => {
                self.encoder.load_argument(*index)?;
                Ok(StoreTarget::Indirect(ty.clone()))
            }
            BoundKind::Field { receiver, field } => match receiver {
                None => Ok(StoreTarget::StaticField(field.clone())),
                Some(receiver) => {
                    self.emit_receiver(receiver, true)?;
                    Ok(StoreTarget::Field(field.clone()))
                }
            },
            BoundKind::ArrayElement { array, indices } => {
                self.emit_value(array)?;
                for index in indices {
                    self.emit_value(index)?;
                }
                let rank = u32::try_from(indices.len())
                    .map_err(|_| malformed_error!("Array rank out of range: {}", indices.len()))?;
                Ok(StoreTarget::Element {
                    element: ty.clone(),
                    rank,
                })
            }
            other => Err(malformed_error!("Cannot store to {:?}", other)),
        }
    }

    fn emit_store(&mut self, target: StoreTarget) -> Result<()> {
        match target {
            StoreTarget::Indirect(ty) => self.emit_store_indirect(&ty),
            StoreTarget::Field(field) => self.encoder.emit("stfld", Operand::Member(field.to_string())),
            StoreTarget::StaticField(field) => {
                self.encoder.emit("stsfld", Operand::Member(field.to_string()))
            }
            StoreTarget::Element { element, rank: 1 } => match element.primitive() {
                Some(kind) => self.encoder.emit(kind.stelem(), Operand::None),
                None if element.is_value_type() => {
                    self.encoder.emit("stelem", Operand::Member(element.to_string()))
                }
                None => self.encoder.emit("stelem.ref", Operand::None),
            },
            StoreTarget::Element { element, rank } => {
                let rank = rank as usize;
                let pops = array_accessor_pops(rank, 2)?;
                let accessor = array_accessor(&element, rank, "Set");
                self.encoder.emit_call("call", accessor, pops, 0)
            }
        }
    }

    fn emit_assignment(&mut self, target: &BoundExpr, value: &BoundExpr, used: bool) -> Result<()> {
        match &target.kind {
            BoundKind::Local(index) => {
                self.emit_value(value)?;
                if used {
                    self.encoder.emit("dup", Operand::None)?;
                }
                self.encoder.store_local(*index)
            }
            BoundKind::Parameter {
                index,
                by_ref: false,
            } => {
                self.emit_value(value)?;
                if used {
                    self.encoder.emit("dup", Operand::None)?;
                }
                self.encoder.store_argument(*index)
            }
            _ => {
                let store = self.emit_store_prefix(target)?;
                self.emit_value(value)?;
                let temp = if used {
                    self.spill_copy(expect_type(target)?)?
                } else {
                    None
                };
                self.emit_store(store)?;
                if let Some(temp) = temp {
                    self.encoder.load_local(temp)?;
                }
                Ok(())
            }
        }
    }

    fn emit_compound_assignment(
        &mut self,
        op: BinaryOp,
        target: &BoundExpr,
        value: &BoundExpr,
        used: bool,
    ) -> Result<()> {
        let ty = expect_type(target)?;
        let mnemonic = op.mnemonic(is_unsigned(Some(ty)));
        match &target.kind {
            BoundKind::Local(index) => {
                self.encoder.load_local(*index)?;
                self.emit_value(value)?;
                self.encoder.emit(mnemonic, Operand::None)?;
                if used {
                    self.encoder.emit("dup", Operand::None)?;
                }
                self.encoder.store_local(*index)
            }
            BoundKind::Parameter {
                index,
                by_ref: false,
            } => {
                self.encoder.load_argument(*index)?;
                self.emit_value(value)?;
                self.encoder.emit(mnemonic, Operand::None)?;
                if used {
                    self.encoder.emit("dup", Operand::None)?;
                }
                self.encoder.store_argument(*index)
            }
            _ => {
                self.emit_address(target)?;
                self.encoder.emit("dup", Operand::None)?;
                self.emit_load_indirect(ty)?;
                self.emit_value(value)?;
                self.encoder.emit(mnemonic, Operand::None)?;
                let temp = if used { self.spill_copy(ty)? } else { None };
                self.emit_store_indirect(ty)?;
                if let Some(temp) = temp {
                    self.encoder.load_local(temp)?;
                }
                Ok(())
            }
        }
    }

    /// `dup; stloc temp`, keeping the stored value for the result
    fn spill_copy(&mut self, ty: &CilType) -> Result<Option<u16>> {
        self.encoder.emit("dup", Operand::None)?;
        let temp = self.encoder.declare_local(ty.clone())?;
        self.encoder.store_local(temp)?;
        Ok(Some(temp))
    }

    fn emit_load_indirect(&mut self, ty: &CilType) -> Result<()> {
        match ty.primitive() {
            Some(kind) => self.encoder.emit(kind.ldind(), Operand::None),
            None if ty.is_value_type() => self.encoder.emit("ldobj", Operand::Member(ty.to_string())),
            None => self.encoder.emit("ldind.ref", Operand::None),
        }
    }

    fn emit_store_indirect(&mut self, ty: &CilType) -> Result<()> {
        match ty.primitive() {
            Some(kind) => self.encoder.emit(kind.stind(), Operand::None),
            None if ty.is_value_type() => self.encoder.emit("stobj", Operand::Member(ty.to_string())),
            None => self.encoder.emit("stind.ref", Operand::None),
        }
    }

    fn emit_element_load(&mut self, element: &CilType) -> Result<()> {
        match element.primitive() {
            Some(kind) => self.encoder.emit(kind.ldelem(), Operand::None),
            None if element.is_value_type() => {
                self.encoder.emit("ldelem", Operand::Member(element.to_string()))
            }
            None => self.encoder.emit("ldelem.ref", Operand::None),
        }
    }

    fn emit_conversion(
        &mut self,
        kind: ConversionKind,
        from: Option<&CilType>,
        to: &CilType,
    ) -> Result<()> {
        match kind {
            ConversionKind::Identity
            | ConversionKind::NullLiteral
            | ConversionKind::ImplicitReference => Ok(()),
            ConversionKind::Boxing => {
                let from = from.ok_or_else(|| malformed_error!("Boxing without a source type"))?;
                self.encoder.emit("box", Operand::Member(from.to_string()))
            }
            ConversionKind::Unboxing => self.encoder.emit("unbox.any", Operand::Member(to.to_string())),
            ConversionKind::ExplicitReference => {
                self.encoder.emit("castclass", Operand::Member(to.to_string()))
            }
            ConversionKind::Numeric(target) => {
                let source = from
                    .and_then(CilType::primitive)
                    .ok_or_else(|| malformed_error!("Numeric conversion from a non-numeric type"))?;
                match numeric_conversion(source, target) {
                    Some(mnemonic) => self.encoder.emit(mnemonic, Operand::None),
                    None => Ok(()),
                }
            }
        }
    }
}

fn expect_type(expr: &BoundExpr) -> Result<&CilType> {
    expr.ty
        .as_ref()
        .ok_or_else(|| malformed_error!("Expression has no type: {:?}", expr.kind))
}

fn call_mnemonic(receiver: &BoundExpr) -> &'static str {
    match &receiver.ty {
        Some(ty) if ty.is_value_type() => "call",
        _ => "callvirt",
    }
}

fn is_unsigned(ty: Option<&CilType>) -> bool {
    ty.and_then(CilType::primitive)
        .is_some_and(|kind| kind.is_unsigned())
}

/// `T[*,*].Get` and friends, the runtime-provided accessors of multi-dimensional arrays
fn array_accessor(element: &CilType, rank: usize, name: &str) -> String {
    format!("{element}[{}].{name}", vec!["*"; rank].join(","))
}

fn array_accessor_pops(rank: usize, extra: usize) -> Result<u16> {
    u16::try_from(rank + extra).map_err(|_| malformed_error!("Array rank out of range: {}", rank))
}

/// Width in bytes of a numeric primitive, pointer-sized integers count as 8
fn width(kind: CilPrimitiveKind) -> u8 {
    match kind {
        CilPrimitiveKind::Boolean | CilPrimitiveKind::I1 | CilPrimitiveKind::U1 => 1,
        CilPrimitiveKind::Char | CilPrimitiveKind::I2 | CilPrimitiveKind::U2 => 2,
        CilPrimitiveKind::I4 | CilPrimitiveKind::U4 | CilPrimitiveKind::R4 => 4,
        _ => 8,
    }
}

/// Instruction converting the stack value of `from` to `to`, if one is needed
fn numeric_conversion(from: CilPrimitiveKind, to: CilPrimitiveKind) -> Option<&'static str> {
    use CilPrimitiveKind as K;

    if from == to {
        return None;
    }
    let from_float = matches!(from, K::R4 | K::R8);
    match to {
        K::R8 if from.is_unsigned() => Some("conv.r.un"),
        K::R8 => Some("conv.r8"),
        K::R4 => Some("conv.r4"),
        K::I8 if from == K::U8 => None,
        K::U8 if from == K::I8 => None,
        K::I8 | K::U8 if from.is_unsigned() && !from_float => Some("conv.u8"),
        K::I8 => Some("conv.i8"),
        K::U8 if from_float => Some("conv.u8"),
        K::U8 => Some("conv.i8"),
        K::I4 if width(from) <= 4 && !from_float => None,
        K::I4 => Some("conv.i4"),
        K::U4 if width(from) <= 4 && !from_float => None,
        K::U4 => Some("conv.u4"),
        K::I | K::U if from_float || width(from) == 8 => {
            Some(if to == K::I { "conv.i" } else { "conv.u" })
        }
        K::I => Some(if from.is_unsigned() { "conv.u" } else { "conv.i" }),
        K::U => Some("conv.u"),
        K::I1 | K::U1 | K::I2 | K::U2 | K::Char => {
            let widening = !from_float
                && width(from) < width(to)
                && (from.is_unsigned() || !to.is_unsigned());
            if widening {
                return None;
            }
            Some(match to {
                K::I1 => "conv.i1",
                K::U1 => "conv.u1",
                K::I2 => "conv.i2",
                _ => "conv.u2",
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_conversions() {
        use CilPrimitiveKind as K;

        assert_eq!(numeric_conversion(K::I4, K::I8), Some("conv.i8"));
        assert_eq!(numeric_conversion(K::U4, K::I8), Some("conv.u8"));
        assert_eq!(numeric_conversion(K::I8, K::I4), Some("conv.i4"));
        assert_eq!(numeric_conversion(K::U1, K::I4), None);
        assert_eq!(numeric_conversion(K::I4, K::U1), Some("conv.u1"));
        assert_eq!(numeric_conversion(K::U1, K::I2), None);
        assert_eq!(numeric_conversion(K::I1, K::U2), Some("conv.u2"));
        assert_eq!(numeric_conversion(K::U8, K::R8), Some("conv.r.un"));
        assert_eq!(numeric_conversion(K::R8, K::R4), Some("conv.r4"));
        assert_eq!(numeric_conversion(K::I8, K::U8), None);
    }
}
