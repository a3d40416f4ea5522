//! Type resolution, conversions and member access in the host binder.

use exprscope::prelude::*;

fn snapshot() -> (ModuleSet, ModuleId) {
    let mut modules = ModuleSet::new();
    modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
    let app = modules.add(
        ModuleBuilder::named("App")
            .class("C", |t| {
                t.method(MethodDefinition::static_method("M"))
                    .method(MethodDefinition::instance("N"))
            })
            .value_type("C+S`1", |t| {
                t.generic_params(&["T"])
                    .field("Item", TypeSignature::TypeParameter(0))
            })
            .class("Holder", |t| {
                t.static_field("Count", CilPrimitiveKind::I4)
                    .static_property("Name", CilPrimitiveKind::String)
            })
            .build(),
    );
    // Never referenced by App, still visible to the debugger
    modules.add(
        ModuleBuilder::named("Other")
            .class("O", |t| t.property("P", CilPrimitiveKind::I4))
            .build(),
    );
    (modules, app)
}

fn compile(
    method: &MethodContext,
    modules: &ModuleSet,
    context: &InspectionContext,
    source: &str,
    flags: EvaluationFlags,
) -> Result<CompileResult> {
    ExpressionCompiler::new(modules, method)
        .compile_expression(context, source, flags)
        .map_err(|failure| failure.error)
}

#[test]
fn nested_generic_value_type() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let context = InspectionContext::new()
        .with("$ReturnValue", "C+S`1[[System.Int32, mscorlib]], App");

    let result = compile(
        &method,
        &modules,
        &context,
        "((C.S<int>)$ReturnValue).Item",
        EvaluationFlags::empty(),
    )
    .unwrap();
    assert_eq!(
        result.method.mnemonics(),
        ["ldc.i4.0", "call", "unbox.any", "ldfld", "ret"]
    );
    assert_eq!(
        result.method.instructions[2].operand,
        Operand::Member("C.S<int>".to_string())
    );
    assert_eq!(
        result.method.instructions[3].operand,
        Operand::Member("int C.S<int>.Item".to_string())
    );
}

#[test]
fn types_outside_module_references() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let context = InspectionContext::new().with("1", "O, Other");

    let result = compile(&method, &modules, &context, "$1.P", EvaluationFlags::empty()).unwrap();
    assert_eq!(
        result.method.mnemonics(),
        ["ldstr", "call", "castclass", "callvirt", "ret"]
    );
    assert_eq!(
        result.method.instructions[3].operand,
        Operand::Member("int O.P.get".to_string())
    );
}

#[test]
fn cast_to_unknown_type() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let context = InspectionContext::debugger_default();

    assert_eq!(
        compile(&method, &modules, &context, "(Missing)$1", EvaluationFlags::empty()).unwrap_err(),
        Error::TypeNotFound("Missing".to_string())
    );
    assert_eq!(
        compile(&method, &modules, &context, "(string)1", EvaluationFlags::empty()).unwrap_err(),
        Error::NoConversion {
            from: "int".to_string(),
            to: "string".to_string()
        }
    );
}

#[test]
fn static_members_through_type_name() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let context = InspectionContext::new();

    let read = compile(&method, &modules, &context, "Holder.Count", EvaluationFlags::empty())
        .unwrap();
    assert_eq!(read.method.mnemonics(), ["ldsfld", "ret"]);
    assert_eq!(read.properties.flags, ResultFlags::empty());

    let write = compile(&method, &modules, &context, "Holder.Count = 2", EvaluationFlags::empty())
        .unwrap();
    assert_eq!(write.method.mnemonics(), ["ldc.i4.2", "stsfld", "ret"]);

    let property = compile(&method, &modules, &context, "Holder.Name", EvaluationFlags::empty())
        .unwrap();
    assert_eq!(property.method.mnemonics(), ["call", "ret"]);
    assert!(property.properties.flags.contains(ResultFlags::READ_ONLY));
}

#[test]
fn numeric_promotion_with_declared_long() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let context = InspectionContext::new().with("y", "System.Int64, mscorlib");

    let result = compile(&method, &modules, &context, "y + 1", EvaluationFlags::empty()).unwrap();
    assert_eq!(
        result.method.mnemonics(),
        ["ldstr", "call", "ldind.i8", "ldc.i8", "add", "ret"]
    );
    assert_eq!(result.properties.result_type.unwrap().to_string(), "long");
}

#[test]
fn negative_literal_folds() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();

    let result = compile(
        &method,
        &modules,
        &InspectionContext::new(),
        "-2147483648",
        EvaluationFlags::empty(),
    )
    .unwrap();
    assert_eq!(result.method.mnemonics(), ["ldc.i4", "ret"]);
    assert_eq!(result.method.instructions[0].operand, Operand::Int32(i32::MIN));
    assert_eq!(result.properties.result_type.unwrap().to_string(), "int");
}

#[test]
fn coalesce_boxes_value_type_fallback() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let context = InspectionContext::debugger_default();

    let result = compile(&method, &modules, &context, "$ReturnValue ?? 1", EvaluationFlags::empty())
        .unwrap();
    assert_eq!(
        result.method.mnemonics(),
        ["ldc.i4.0", "call", "dup", "brtrue.s", "pop", "ldc.i4.1", "box", "ret"]
    );
}

#[test]
fn operators_on_unsupported_operands() {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let context = InspectionContext::new().with("x", "System.Int32, mscorlib");

    assert_eq!(
        compile(&method, &modules, &context, "x ?? 1", EvaluationFlags::empty()).unwrap_err(),
        Error::OperatorNotApplicable {
            operator: "??".to_string(),
            left: "int".to_string(),
            right: "int".to_string()
        }
    );
    assert_eq!(
        compile(&method, &modules, &context, "\"a\" + 1", EvaluationFlags::empty()).unwrap_err(),
        Error::OperatorNotApplicable {
            operator: "+".to_string(),
            left: "string".to_string(),
            right: "int".to_string()
        }
    );
}

#[test]
fn locals_of_the_suspended_method() {
    let (modules, app) = snapshot();
    let int = modules.primitive(CilPrimitiveKind::I4).unwrap();
    let method = MethodContext::new(&modules, app, "C", "M")
        .unwrap()
        .with_local("loc", int);

    let result = compile(
        &method,
        &modules,
        &InspectionContext::new(),
        "loc += 3",
        EvaluationFlags::empty(),
    )
    .unwrap();
    assert_eq!(
        result.method.mnemonics(),
        ["ldloc.0", "ldc.i4.3", "add", "stloc.0", "ret"]
    );
    assert_eq!(result.method.locals.len(), 1);
    assert!(result.method.listing().contains(".locals init (int V_0)"));
}

#[test]
fn this_in_instance_and_static_methods() {
    let (modules, app) = snapshot();
    let context = InspectionContext::new();

    let instance = MethodContext::new(&modules, app, "C", "N").unwrap();
    let result = compile(&instance, &modules, &context, "this", EvaluationFlags::empty()).unwrap();
    assert_eq!(result.method.mnemonics(), ["ldarg.0", "ret"]);
    assert!(result.properties.flags.contains(ResultFlags::READ_ONLY));

    let stat = MethodContext::new(&modules, app, "C", "M").unwrap();
    assert!(matches!(
        compile(&stat, &modules, &context, "this", EvaluationFlags::empty()).unwrap_err(),
        Error::Syntax { position: 0, .. }
    ));
}
