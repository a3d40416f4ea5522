//! Host-language binder.
//!
//! Turns a parsed [`Expr`] into a typed [`BoundExpr`]. Simple names are looked up in the
//! order the host language defines: locals, parameters and members of the containing type
//! first, and only then the pseudo-variable binder. Qualified names (`global::x`, `this.x`,
//! `a.b`) never reach the pseudo-variable binder.

use std::sync::Arc;

use crate::{
    compiler::{
        bound::{
            BoundArgument, BoundExpr, BoundKind, ConstantValue, ConversionKind, FieldRef, MethodRef,
            PropertyRef,
        },
        config::CompilerConfig,
        context::MethodContext,
        syntax::{Argument, ArgumentKind, BinaryOp, Expr, Literal, TypeSyntax},
    },
    error::AssignmentUsage,
    metadata::{
        module::{ModuleId, ModuleSet},
        typesystem::{
            CilPrimitiveKind, CilType, MethodDefinition, TypeDefinition, TypeSignature,
            NULLABLE_TYPE_NAME,
        },
    },
    pseudovar::{BindOutcome, InspectionContext, PseudoVariableBinder},
    Error, Result,
};

/// Display name used for the type of the `null` literal
const NULL_TYPE_NAME: &str = "<null>";

/// A member found by name on a type or one of its bases
enum Member {
    Field(FieldRef),
    Property(PropertyRef),
    Methods(CilType, Vec<MethodDefinition>),
}

/// The left side of a member access
enum Receiver {
    Value(BoundExpr),
    Type(CilType),
}

/// Binds expressions written in the scope of a suspended method.
pub struct Binder<'a> {
    modules: &'a ModuleSet,
    method: &'a MethodContext,
    config: &'a CompilerConfig,
    pseudo: PseudoVariableBinder<'a>,
    allow_side_effects: bool,
}

impl<'a> Binder<'a> {
    /// Create a binder for `method`, answering pseudo-variables from `inspection`
    #[must_use]
    pub fn new(
        modules: &'a ModuleSet,
        method: &'a MethodContext,
        inspection: &'a InspectionContext,
        config: &'a CompilerConfig,
    ) -> Self {
        let pseudo = PseudoVariableBinder::new(modules, inspection)
            .with_context_module(method.module())
            .with_policy(config.assembly_matching.policy())
            .with_max_type_name_depth(config.max_type_name_depth);
        Binder {
            modules,
            method,
            config,
            pseudo,
            allow_side_effects: true,
        }
    }

    /// Reject assignments with [`Error::SideEffectsNotAllowed`]
    #[must_use]
    pub fn without_side_effects(mut self) -> Self {
        self.allow_side_effects = false;
        self
    }

    /// Bind an expression.
    ///
    /// # Errors
    /// Returns the first binding error encountered, in evaluation order.
    pub fn bind(&self, expr: &Expr) -> Result<BoundExpr> {
        match expr {
            Expr::Name {
                name, type_args, ..
            } => self.bind_name(name, type_args),
            Expr::Global { name, .. } => Err(Error::UndefinedGlobalName(name.clone())),
            Expr::Literal { value, .. } => self.bind_literal(value),
            Expr::This { position } => self.bind_this(*position),
            Expr::Member {
                target,
                name,
                type_args,
                ..
            } => self.bind_member(target, name, type_args),
            Expr::Invoke { target, args, .. } => self.bind_invoke(target, args),
            Expr::Index {
                target, indices, ..
            } => self.bind_index(target, indices),
            Expr::Cast { ty, operand, .. } => {
                let ty = self.resolve_type(ty)?;
                let operand = self.bind(operand)?;
                self.convert(operand, &ty, true)
            }
            Expr::Negate { operand, .. } => self.bind_negate(operand),
            Expr::Binary {
                op, left, right, ..
            } => self.bind_binary(*op, left, right),
            Expr::Coalesce { left, right, .. } => self.bind_coalesce(left, right),
            Expr::Assign {
                target, op, value, ..
            } => self.bind_assign(target, *op, value),
        }
    }

    /// Bind the target of an assignment.
    ///
    /// # Errors
    /// Returns [`Error::NotAssignable`] if the expression is not a variable.
    pub fn bind_assignment_target(&self, expr: &Expr) -> Result<BoundExpr> {
        let target = self.bind(expr)?;
        if !target.is_assignable() {
            return Err(Error::NotAssignable {
                usage: AssignmentUsage::AssignmentTarget,
            });
        }
        Ok(target)
    }

    fn bind_name(&self, name: &str, type_args: &[TypeSyntax]) -> Result<BoundExpr> {
        let bound = self
            .bind_simple_name(name)?
            .ok_or_else(|| Error::UndefinedName(name.to_string()))?;
        if !type_args.is_empty() {
            return Err(Error::TypeArgumentsNotAllowed(name.to_string()));
        }
        Ok(bound)
    }

    /// Bind an unqualified name.
    ///
    /// Lookup order is locals, then parameters, then members of the containing type, and
    /// last the pseudo-variable binder. Returns `None` when nothing answers to `name`.
    ///
    /// # Errors
    /// Returns the pseudo-variable binder's failure when it recognised the name but could
    /// not resolve its type.
    pub fn bind_simple_name(&self, name: &str) -> Result<Option<BoundExpr>> {
        if let Some((index, local)) = self.method.local(name) {
            return Ok(Some(BoundExpr::new(BoundKind::Local(index), Some(local.ty.clone()))));
        }
        if let Some((index, param)) = self.method.parameter(name) {
            return Ok(Some(BoundExpr::new(
                BoundKind::Parameter {
                    index,
                    by_ref: param.by_ref,
                },
                Some(param.ty.clone()),
            )));
        }

        let containing = self.method.containing_type();
        match self.lookup_member(containing, name, false)? {
            Some(Member::Field(field)) if field.is_static || !self.method.is_static() => {
                let receiver = (!field.is_static).then(|| Box::new(self.this()));
                let ty = field.ty.clone();
                return Ok(Some(BoundExpr::new(BoundKind::Field { receiver, field }, Some(ty))));
            }
            Some(Member::Property(property)) if property.is_static || !self.method.is_static() => {
                let receiver = (!property.is_static).then(|| Box::new(self.this()));
                let ty = property.ty.clone();
                return Ok(Some(BoundExpr::new(
                    BoundKind::Property { receiver, property },
                    Some(ty),
                )));
            }
            _ => {}
        }

        match self.pseudo.bind(name) {
            BindOutcome::Bound(bound) => {
                let ty = bound.ty.clone();
                Ok(Some(BoundExpr::new(BoundKind::PseudoVariable(bound), Some(ty))))
            }
            BindOutcome::NotRecognized => Ok(None),
            BindOutcome::Failed(error) => Err(error.into()),
        }
    }

    fn this(&self) -> BoundExpr {
        BoundExpr::new(BoundKind::This, Some(self.method.containing_type().clone()))
    }

    fn bind_this(&self, position: usize) -> Result<BoundExpr> {
        if self.method.is_static() {
            return Err(Error::Syntax {
                position,
                message: "Keyword 'this' is not valid in a static method".to_string(),
            });
        }
        Ok(self.this())
    }

    fn bind_literal(&self, value: &Literal) -> Result<BoundExpr> {
        match value {
            Literal::Null => Ok(BoundExpr::new(BoundKind::Constant(ConstantValue::Null), None)),
            Literal::Boolean(value) => Ok(BoundExpr::new(
                BoundKind::Constant(ConstantValue::Boolean(*value)),
                Some(self.modules.primitive(CilPrimitiveKind::Boolean)?),
            )),
            Literal::String(value) => Ok(BoundExpr::new(
                BoundKind::Constant(ConstantValue::String(value.clone())),
                Some(self.modules.primitive(CilPrimitiveKind::String)?),
            )),
            Literal::Integer(value) => {
                let kind = if i32::try_from(*value).is_ok() {
                    CilPrimitiveKind::I4
                } else if u32::try_from(*value).is_ok() {
                    CilPrimitiveKind::U4
                } else if i64::try_from(*value).is_ok() {
                    CilPrimitiveKind::I8
                } else {
                    CilPrimitiveKind::U8
                };
                self.integer_constant(i128::from(*value), kind)
            }
        }
    }

    fn integer_constant(&self, value: i128, kind: CilPrimitiveKind) -> Result<BoundExpr> {
        let constant = match kind {
            CilPrimitiveKind::I8 | CilPrimitiveKind::U8 => {
                ConstantValue::Int64(i64::from_ne_bytes((value as u64).to_ne_bytes()))
            }
            _ => ConstantValue::Int32(i32::from_ne_bytes((value as u32).to_ne_bytes())),
        };
        Ok(BoundExpr::new(
            BoundKind::Constant(constant),
            Some(self.modules.primitive(kind)?),
        ))
    }

    fn bind_receiver(&self, expr: &Expr) -> Result<Receiver> {
        match self.bind(expr) {
            Ok(bound) => Ok(Receiver::Value(bound)),
            Err(error @ Error::UndefinedName(_)) => {
                let Some(segments) = dotted_path(expr) else {
                    return Err(error);
                };
                let syntax = TypeSyntax::Named {
                    global: false,
                    segments: segments.into_iter().map(|s| (s, Vec::new())).collect(),
                };
                match self.resolve_type(&syntax) {
                    Ok(ty) => Ok(Receiver::Type(ty)),
                    Err(_) => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    fn bind_member(&self, target: &Expr, name: &str, type_args: &[TypeSyntax]) -> Result<BoundExpr> {
        let (receiver, ty) = match self.bind_receiver(target)? {
            Receiver::Value(receiver) => {
                let Some(ty) = receiver.ty.clone() else {
                    return Err(Error::MemberNotFound {
                        type_name: NULL_TYPE_NAME.to_string(),
                        member: name.to_string(),
                    });
                };
                (Some(receiver), ty)
            }
            Receiver::Type(ty) => (None, ty),
        };

        let not_found = || Error::MemberNotFound {
            type_name: ty.to_string(),
            member: name.to_string(),
        };
        let bound = match self.lookup_member(&ty, name, false)? {
            Some(Member::Field(field)) => {
                let receiver = instance_receiver(receiver, field.is_static).ok_or_else(not_found)?;
                let field_ty = field.ty.clone();
                BoundExpr::new(BoundKind::Field { receiver, field }, Some(field_ty))
            }
            Some(Member::Property(property)) => {
                let receiver =
                    instance_receiver(receiver, property.is_static).ok_or_else(not_found)?;
                let property_ty = property.ty.clone();
                BoundExpr::new(BoundKind::Property { receiver, property }, Some(property_ty))
            }
            Some(Member::Methods(..)) => {
                return Err(Error::NoConversion {
                    from: format!("method group '{name}'"),
                    to: CilPrimitiveKind::Object.to_string(),
                })
            }
            None => return Err(not_found()),
        };
        if !type_args.is_empty() {
            return Err(Error::TypeArgumentsNotAllowed(name.to_string()));
        }
        Ok(bound)
    }

    fn bind_invoke(&self, target: &Expr, args: &[Argument]) -> Result<BoundExpr> {
        let (declaring, methods, receiver, name, type_args) = match target {
            Expr::Name {
                name, type_args, ..
            } => {
                let shadowed =
                    self.method.local(name).is_some() || self.method.parameter(name).is_some();
                let containing = self.method.containing_type();
                match self.lookup_member(containing, name, true)? {
                    Some(Member::Methods(declaring, methods)) if !shadowed => {
                        let receiver = (!self.method.is_static()).then(|| self.this());
                        (declaring, methods, receiver, name, type_args)
                    }
                    _ => {
                        self.bind_name(name, type_args)?;
                        return Err(Error::MethodNameExpected);
                    }
                }
            }
            Expr::Member {
                target,
                name,
                type_args,
                ..
            } => {
                let (receiver, ty) = match self.bind_receiver(target)? {
                    Receiver::Value(receiver) => match receiver.ty.clone() {
                        Some(ty) => (Some(receiver), ty),
                        None => {
                            return Err(Error::MemberNotFound {
                                type_name: NULL_TYPE_NAME.to_string(),
                                member: name.clone(),
                            })
                        }
                    },
                    Receiver::Type(ty) => (None, ty),
                };
                match self.lookup_member(&ty, name, true)? {
                    Some(Member::Methods(declaring, methods)) => {
                        (declaring, methods, receiver, name, type_args)
                    }
                    Some(_) => return Err(Error::MethodNameExpected),
                    None => {
                        return Err(Error::MemberNotFound {
                            type_name: ty.to_string(),
                            member: name.clone(),
                        })
                    }
                }
            }
            other => {
                self.bind(other)?;
                return Err(Error::MethodNameExpected);
            }
        };

        let type_args = type_args
            .iter()
            .map(|arg| self.resolve_type(arg))
            .collect::<Result<Vec<_>>>()?;
        let args = args
            .iter()
            .map(|arg| {
                let bound = self.bind(&arg.expr)?;
                let by_ref = arg.kind != ArgumentKind::Value;
                if by_ref && !bound.is_assignable() {
                    return Err(Error::NotAssignable {
                        usage: AssignmentUsage::RefArgument,
                    });
                }
                Ok((bound, by_ref))
            })
            .collect::<Result<Vec<_>>>()?;

        self.resolve_overload(&declaring, &methods, receiver, name, &type_args, &args)
    }

    fn resolve_overload(
        &self,
        declaring: &CilType,
        methods: &[MethodDefinition],
        receiver: Option<BoundExpr>,
        name: &str,
        type_args: &[CilType],
        args: &[(BoundExpr, bool)],
    ) -> Result<BoundExpr> {
        let scope = scope_of(declaring, self.method.module());
        'candidates: for method in methods {
            if method.params.len() != args.len() || (!method.is_static && receiver.is_none()) {
                continue;
            }

            let method_args = if !type_args.is_empty() {
                if type_args.len() != method.generic_params.len() {
                    continue;
                }
                type_args.to_vec()
            } else if method.generic_params.is_empty() {
                Vec::new()
            } else {
                match infer_method_args(method, args) {
                    Some(inferred) => inferred,
                    None => continue,
                }
            };

            let mut params = Vec::with_capacity(method.params.len());
            let mut bound_args = Vec::with_capacity(args.len());
            for (param, (arg, by_ref)) in method.params.iter().zip(args) {
                let ty = self.modules.resolve_signature(
                    &param.signature,
                    scope,
                    declaring.generic_args(),
                    &method_args,
                )?;
                if param.by_ref != *by_ref {
                    continue 'candidates;
                }
                let expr = if *by_ref {
                    if arg.ty.as_ref() != Some(&ty) {
                        continue 'candidates;
                    }
                    arg.clone()
                } else {
                    match self.try_convert(arg.clone(), &ty, false)? {
                        Some(converted) => converted,
                        None => continue 'candidates,
                    }
                };
                bound_args.push(BoundArgument {
                    expr,
                    by_ref: *by_ref,
                });
                params.push((ty, *by_ref));
            }

            let returns = method
                .returns
                .as_ref()
                .map(|signature| {
                    self.modules.resolve_signature(
                        signature,
                        scope,
                        declaring.generic_args(),
                        &method_args,
                    )
                })
                .transpose()?;
            let method_ref = MethodRef {
                declaring: declaring.clone(),
                name: method.name.clone(),
                is_static: method.is_static,
                generic_args: method_args,
                params,
                returns: returns.clone(),
            };
            let receiver = if method.is_static {
                None
            } else {
                receiver.map(Box::new)
            };
            log::trace!("bound call to {}", method_ref);
            return Ok(BoundExpr::new(
                BoundKind::Call {
                    receiver,
                    method: method_ref,
                    args: bound_args,
                },
                returns,
            ));
        }
        Err(Error::ArgumentMismatch(name.to_string()))
    }

    fn bind_index(&self, target: &Expr, indices: &[Expr]) -> Result<BoundExpr> {
        let array = self.bind(target)?;
        let Some(CilType::Array { element, rank }) = array.ty.clone() else {
            return Err(Error::OperatorNotApplicable {
                operator: "[]".to_string(),
                left: type_name(array.ty.as_ref()),
                right: String::new(),
            });
        };
        if indices.len() != rank as usize {
            return Err(Error::ArgumentMismatch(format!("{}[]", element)));
        }

        let int = self.modules.primitive(CilPrimitiveKind::I4)?;
        let indices = indices
            .iter()
            .map(|index| {
                let index = self.bind(index)?;
                self.convert(index, &int, false)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundExpr::new(
            BoundKind::ArrayElement {
                array: Box::new(array),
                indices,
            },
            Some(*element),
        ))
    }

    fn bind_negate(&self, operand: &Expr) -> Result<BoundExpr> {
        if let Expr::Literal {
            value: Literal::Integer(value),
            ..
        } = operand
        {
            let negated = -i128::from(*value);
            let kind = if i32::try_from(negated).is_ok() {
                CilPrimitiveKind::I4
            } else if i64::try_from(negated).is_ok() {
                CilPrimitiveKind::I8
            } else {
                return Err(Error::OperatorNotApplicable {
                    operator: "-".to_string(),
                    left: CilPrimitiveKind::U8.to_string(),
                    right: String::new(),
                });
            };
            return self.integer_constant(negated, kind);
        }

        let operand = self.promote(self.bind(operand)?)?;
        match operand.ty.as_ref().and_then(numeric_kind) {
            Some(kind) if !kind.is_unsigned() => {
                let ty = operand.ty.clone();
                Ok(BoundExpr::new(BoundKind::Negate(Box::new(operand)), ty))
            }
            _ => Err(Error::OperatorNotApplicable {
                operator: "-".to_string(),
                left: type_name(operand.ty.as_ref()),
                right: String::new(),
            }),
        }
    }

    fn bind_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<BoundExpr> {
        let left = self.promote(self.bind(left)?)?;
        let right = self.promote(self.bind(right)?)?;
        let not_applicable = |left: &BoundExpr, right: &BoundExpr| Error::OperatorNotApplicable {
            operator: op.to_string(),
            left: type_name(left.ty.as_ref()),
            right: type_name(right.ty.as_ref()),
        };

        let (Some(left_ty), Some(right_ty)) = (left.ty.clone(), right.ty.clone()) else {
            return Err(not_applicable(&left, &right));
        };
        if numeric_kind(&left_ty).is_none() || numeric_kind(&right_ty).is_none() {
            return Err(not_applicable(&left, &right));
        }

        let (left, right, ty) = if left_ty == right_ty {
            (left, right, left_ty)
        } else if self.implicitly_convertible(&left, &right_ty)? {
            (self.convert(left, &right_ty, false)?, right, right_ty)
        } else if self.implicitly_convertible(&right, &left_ty)? {
            let right = self.convert(right, &left_ty, false)?;
            (left, right, left_ty)
        } else {
            return Err(not_applicable(&left, &right));
        };

        Ok(BoundExpr::new(
            BoundKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            Some(ty),
        ))
    }

    fn bind_coalesce(&self, left: &Expr, right: &Expr) -> Result<BoundExpr> {
        let left = self.bind(left)?;
        let right = self.bind(right)?;
        let not_applicable = |left: &BoundExpr, right: &BoundExpr| Error::OperatorNotApplicable {
            operator: "??".to_string(),
            left: type_name(left.ty.as_ref()),
            right: type_name(right.ty.as_ref()),
        };

        let left_ty = match &left.ty {
            Some(ty) if ty.is_reference_type() => ty.clone(),
            _ => return Err(not_applicable(&left, &right)),
        };

        if self.implicitly_convertible(&right, &left_ty)? {
            let right = self.convert(right, &left_ty, false)?;
            return Ok(coalesce(left, right, left_ty));
        }
        if let Some(right_ty) = right.ty.clone() {
            if self
                .classify_conversion(Some(&left_ty), &right_ty, false)?
                .is_some()
            {
                let left = self.convert(left, &right_ty, false)?;
                return Ok(coalesce(left, right, right_ty));
            }
        }
        Err(not_applicable(&left, &right))
    }

    fn bind_assign(&self, target: &Expr, op: Option<BinaryOp>, value: &Expr) -> Result<BoundExpr> {
        if !self.allow_side_effects {
            return Err(Error::SideEffectsNotAllowed);
        }
        let target = self.bind_assignment_target(target)?;
        let ty = target
            .ty
            .clone()
            .ok_or_else(|| malformed_error!("Assignable expression without a type"))?;
        let value = self.bind(value)?;

        match op {
            None => {
                let value = self.convert(value, &ty, false)?;
                Ok(BoundExpr::new(
                    BoundKind::Assignment {
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    Some(ty),
                ))
            }
            Some(op) => {
                if numeric_kind(&ty).is_none() {
                    return Err(Error::OperatorNotApplicable {
                        operator: format!("{op}="),
                        left: ty.to_string(),
                        right: type_name(value.ty.as_ref()),
                    });
                }
                let value = self.convert(value, &ty, false)?;
                Ok(BoundExpr::new(
                    BoundKind::CompoundAssignment {
                        op,
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    Some(ty),
                ))
            }
        }
    }

    /// Widen `sbyte`, `byte`, `short`, `ushort` and `char` to `int` for arithmetic
    fn promote(&self, expr: BoundExpr) -> Result<BoundExpr> {
        match expr.ty.as_ref().and_then(numeric_kind) {
            Some(
                CilPrimitiveKind::I1
                | CilPrimitiveKind::U1
                | CilPrimitiveKind::I2
                | CilPrimitiveKind::U2
                | CilPrimitiveKind::Char,
            ) => {
                let int = self.modules.primitive(CilPrimitiveKind::I4)?;
                self.convert(expr, &int, false)
            }
            _ => Ok(expr),
        }
    }

    /// Convert `expr` to `to`, implicitly or as a cast.
    ///
    /// # Errors
    /// Returns [`Error::NoConversion`] if no conversion of the requested kind exists.
    pub fn convert(&self, expr: BoundExpr, to: &CilType, explicit: bool) -> Result<BoundExpr> {
        let from = type_name(expr.ty.as_ref());
        self.try_convert(expr, to, explicit)?
            .ok_or_else(|| Error::NoConversion {
                from,
                to: to.to_string(),
            })
    }

    fn try_convert(&self, expr: BoundExpr, to: &CilType, explicit: bool) -> Result<Option<BoundExpr>> {
        if let Some(folded) = self.fold_constant(&expr, to)? {
            return Ok(Some(folded));
        }
        let Some(kind) = self.classify_conversion(expr.ty.as_ref(), to, explicit)? else {
            return Ok(None);
        };
        if kind == ConversionKind::Identity {
            return Ok(Some(expr));
        }
        Ok(Some(BoundExpr::new(
            BoundKind::Conversion {
                kind,
                operand: Box::new(expr),
            },
            Some(to.clone()),
        )))
    }

    fn implicitly_convertible(&self, expr: &BoundExpr, to: &CilType) -> Result<bool> {
        if self.fold_constant(expr, to)?.is_some() {
            return Ok(true);
        }
        Ok(self.classify_conversion(expr.ty.as_ref(), to, false)?.is_some())
    }

    /// An integer constant retyped to an integral `to` it fits in
    fn fold_constant(&self, expr: &BoundExpr, to: &CilType) -> Result<Option<BoundExpr>> {
        let value = match (&expr.kind, expr.ty.as_ref().and_then(CilType::primitive)) {
            (BoundKind::Constant(ConstantValue::Int32(value)), Some(CilPrimitiveKind::U4)) => {
                i128::from(u32::from_ne_bytes(value.to_ne_bytes()))
            }
            (BoundKind::Constant(ConstantValue::Int32(value)), _) => i128::from(*value),
            (BoundKind::Constant(ConstantValue::Int64(value)), Some(CilPrimitiveKind::U8)) => {
                i128::from(u64::from_ne_bytes(value.to_ne_bytes()))
            }
            (BoundKind::Constant(ConstantValue::Int64(value)), _) => i128::from(*value),
            _ => return Ok(None),
        };
        match to.primitive() {
            Some(kind) if integral_range(kind).is_some_and(|(min, max)| (min..=max).contains(&value)) => {
                self.integer_constant(value, kind).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// The conversion from `from` (`None` for the `null` literal) to `to`, if one exists
    fn classify_conversion(
        &self,
        from: Option<&CilType>,
        to: &CilType,
        explicit: bool,
    ) -> Result<Option<ConversionKind>> {
        let Some(from) = from else {
            return Ok(to.is_reference_type().then_some(ConversionKind::NullLiteral));
        };
        if from == to {
            return Ok(Some(ConversionKind::Identity));
        }

        if let (Some(source), Some(target)) = (numeric_kind(from), numeric_kind(to)) {
            let allowed = explicit || implicit_numeric(source, target);
            return Ok(allowed.then_some(ConversionKind::Numeric(target)));
        }

        let depth = self.config.max_inheritance_depth;
        if from.is_value_type() {
            let boxing = to.is_reference_type()
                && (to.is_object()
                    || self.modules.derives_from(from, to, depth)?
                    || (explicit && to.is_interface()));
            return Ok(boxing.then_some(ConversionKind::Boxing));
        }

        if to.is_reference_type() {
            if to.is_object() || self.modules.derives_from(from, to, depth)? {
                return Ok(Some(ConversionKind::ImplicitReference));
            }
            let downcast = explicit
                && (to.is_interface()
                    || from.is_interface()
                    || self.modules.derives_from(to, from, depth)?);
            return Ok(downcast.then_some(ConversionKind::ExplicitReference));
        }

        let unboxing =
            explicit && (from.is_interface() || self.modules.derives_from(to, from, depth)?);
        Ok(unboxing.then_some(ConversionKind::Unboxing))
    }

    /// Resolve a type written in a cast or as a type argument.
    ///
    /// # Errors
    /// Returns [`Error::TypeNotFound`] if no loaded module defines the type.
    pub fn resolve_type(&self, syntax: &TypeSyntax) -> Result<CilType> {
        match syntax {
            TypeSyntax::Keyword(kind) => self.modules.primitive(*kind),
            TypeSyntax::Nullable(inner) => {
                let inner = self.resolve_type(inner)?;
                self.modules.core_type(NULLABLE_TYPE_NAME, vec![inner])
            }
            TypeSyntax::Array { element, rank } => {
                Ok(CilType::array(self.resolve_type(element)?, *rank))
            }
            TypeSyntax::Named { segments, .. } => {
                let args = segments
                    .iter()
                    .flat_map(|(_, args)| args.iter())
                    .map(|arg| self.resolve_type(arg))
                    .collect::<Result<Vec<_>>>()?;

                for split in (0..segments.len()).rev() {
                    let (namespace, types) = segments.split_at(split);
                    if namespace.iter().any(|(_, args)| !args.is_empty()) {
                        continue;
                    }
                    let namespace: Vec<&str> = namespace.iter().map(|(name, _)| name.as_str()).collect();
                    let nested: Vec<String> = types
                        .iter()
                        .map(|(name, args)| {
                            if args.is_empty() {
                                name.clone()
                            } else {
                                format!("{name}`{}", args.len())
                            }
                        })
                        .collect();
                    let full_name = if namespace.is_empty() {
                        nested.join("+")
                    } else {
                        format!("{}.{}", namespace.join("."), nested.join("+"))
                    };
                    if let Some((module, definition)) = self.find_type(&full_name) {
                        if definition.generic_params.len() != args.len() {
                            return Err(Error::UnsupportedType(full_name));
                        }
                        return Ok(CilType::named(module, definition, args));
                    }
                }
                Err(Error::TypeNotFound(syntax.to_string()))
            }
        }
    }

    /// Context module first, then the core library, then every other module in load order
    fn find_type(&self, full_name: &str) -> Option<(ModuleId, Arc<TypeDefinition>)> {
        let context = self.method.module();
        let core = self.modules.core_library().map(|module| module.id);
        let preferred = std::iter::once(context).chain(core);
        preferred
            .filter_map(|id| self.modules.module(id))
            .chain(self.modules.modules().iter())
            .find_map(|module| module.type_by_name(full_name).map(|d| (module.id, d)))
    }

    /// Walk the base chain for `name`; methods win over fields and properties when `invoked`
    fn lookup_member(&self, ty: &CilType, name: &str, invoked: bool) -> Result<Option<Member>> {
        let mut current = Some(ty.clone());
        let mut depth = 0;
        while let Some(declaring) = current {
            if let CilType::Named(named) = &declaring {
                let definition = &named.definition;
                let methods: Vec<MethodDefinition> = definition.methods_named(name).cloned().collect();
                if invoked && !methods.is_empty() {
                    return Ok(Some(Member::Methods(declaring.clone(), methods)));
                }
                if let Some(field) = definition.field(name) {
                    let field_ty = self.modules.resolve_signature(
                        &field.signature,
                        named.module,
                        &named.args,
                        &[],
                    )?;
                    return Ok(Some(Member::Field(FieldRef {
                        declaring: declaring.clone(),
                        name: field.name.clone(),
                        ty: field_ty,
                        is_static: field.is_static,
                    })));
                }
                if let Some(property) = definition.property(name) {
                    let property_ty = self.modules.resolve_signature(
                        &property.signature,
                        named.module,
                        &named.args,
                        &[],
                    )?;
                    return Ok(Some(Member::Property(PropertyRef {
                        declaring: declaring.clone(),
                        name: property.name.clone(),
                        ty: property_ty,
                        is_static: property.is_static,
                    })));
                }
                if !methods.is_empty() {
                    return Ok(Some(Member::Methods(declaring.clone(), methods)));
                }
            }

            depth += 1;
            if depth > self.config.max_inheritance_depth {
                return Err(Error::RecursionLimit(self.config.max_inheritance_depth));
            }
            current = self.modules.base_type(&declaring)?;
        }
        Ok(None)
    }
}

fn coalesce(left: BoundExpr, right: BoundExpr, ty: CilType) -> BoundExpr {
    BoundExpr::new(
        BoundKind::Coalesce {
            left: Box::new(left),
            right: Box::new(right),
        },
        Some(ty),
    )
}

/// Receiver to keep for a member; `None` when an instance member is reached through a type
fn instance_receiver(receiver: Option<BoundExpr>, is_static: bool) -> Option<Option<Box<BoundExpr>>> {
    match (receiver, is_static) {
        (_, true) => Some(None),
        (Some(receiver), false) => Some(Some(Box::new(receiver))),
        (None, false) => None,
    }
}

fn scope_of(ty: &CilType, fallback: ModuleId) -> ModuleId {
    match ty {
        CilType::Named(named) => named.module,
        CilType::Array { .. } => fallback,
    }
}

fn type_name(ty: Option<&CilType>) -> String {
    ty.map_or_else(|| NULL_TYPE_NAME.to_string(), ToString::to_string)
}

fn numeric_kind(ty: &CilType) -> Option<CilPrimitiveKind> {
    ty.primitive().filter(CilPrimitiveKind::is_numeric)
}

/// `a.b.c` as a list of names, if the expression is only simple names and member accesses
fn dotted_path(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Name {
            name, type_args, ..
        } if type_args.is_empty() => Some(vec![name.clone()]),
        Expr::Member {
            target,
            name,
            type_args,
            ..
        } if type_args.is_empty() => {
            let mut path = dotted_path(target)?;
            path.push(name.clone());
            Some(path)
        }
        _ => None,
    }
}

/// Method type arguments inferred from argument types, `None` if inference fails
fn infer_method_args(method: &MethodDefinition, args: &[(BoundExpr, bool)]) -> Option<Vec<CilType>> {
    let mut inferred = vec![None; method.generic_params.len()];
    for (param, (arg, _)) in method.params.iter().zip(args) {
        if let Some(ty) = &arg.ty {
            if !infer_from(&param.signature, ty, &mut inferred) {
                return None;
            }
        }
    }
    inferred.into_iter().collect()
}

fn infer_from(signature: &TypeSignature, ty: &CilType, inferred: &mut [Option<CilType>]) -> bool {
    match signature {
        TypeSignature::MethodParameter(index) => match inferred.get_mut(*index as usize) {
            Some(slot) => match slot {
                Some(existing) => existing == ty,
                None => {
                    *slot = Some(ty.clone());
                    true
                }
            },
            None => false,
        },
        TypeSignature::Array { element, rank } => match ty {
            CilType::Array {
                element: actual,
                rank: actual_rank,
            } if actual_rank == rank => infer_from(element, actual, inferred),
            _ => true,
        },
        TypeSignature::Named { args, .. } => args
            .iter()
            .zip(ty.generic_args())
            .all(|(signature, ty)| infer_from(signature, ty, inferred)),
        TypeSignature::TypeParameter(_) => true,
    }
}

/// Inclusive value range of an integral primitive
fn integral_range(kind: CilPrimitiveKind) -> Option<(i128, i128)> {
    let range = match kind {
        CilPrimitiveKind::I1 => (i128::from(i8::MIN), i128::from(i8::MAX)),
        CilPrimitiveKind::U1 => (0, i128::from(u8::MAX)),
        CilPrimitiveKind::I2 => (i128::from(i16::MIN), i128::from(i16::MAX)),
        CilPrimitiveKind::U2 | CilPrimitiveKind::Char => (0, i128::from(u16::MAX)),
        CilPrimitiveKind::I4 => (i128::from(i32::MIN), i128::from(i32::MAX)),
        CilPrimitiveKind::U4 => (0, i128::from(u32::MAX)),
        CilPrimitiveKind::I8 => (i128::from(i64::MIN), i128::from(i64::MAX)),
        CilPrimitiveKind::U8 => (0, i128::from(u64::MAX)),
        _ => return None,
    };
    Some(range)
}

/// Implicit numeric conversions of the host language
fn implicit_numeric(from: CilPrimitiveKind, to: CilPrimitiveKind) -> bool {
    use CilPrimitiveKind as K;

    match from {
        K::I1 => matches!(to, K::I2 | K::I4 | K::I8 | K::R4 | K::R8),
        K::U1 => matches!(to, K::I2 | K::U2 | K::I4 | K::U4 | K::I8 | K::U8 | K::R4 | K::R8),
        K::I2 => matches!(to, K::I4 | K::I8 | K::R4 | K::R8),
        K::U2 | K::Char => matches!(to, K::I4 | K::U4 | K::I8 | K::U8 | K::R4 | K::R8)
            || (from == K::Char && to == K::U2),
        K::I4 => matches!(to, K::I8 | K::R4 | K::R8),
        K::U4 => matches!(to, K::I8 | K::U8 | K::R4 | K::R8),
        K::I8 | K::U8 => matches!(to, K::R4 | K::R8),
        K::R4 => to == K::R8,
        _ => false,
    }
}
