#![no_main]

use exprscope::prelude::*;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    let mut modules = ModuleSet::new();
    modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
    let app = modules.add(
        ModuleBuilder::named("App")
            .class("C", |t| t.method(MethodDefinition::instance("M")))
            .build(),
    );
    let Ok(method) = MethodContext::new(&modules, app, "C", "M") else {
        return;
    };

    let compiler = ExpressionCompiler::new(&modules, &method);
    let context = InspectionContext::debugger_default();
    let _ = compiler.compile_expression(&context, source, EvaluationFlags::empty());
});
