//! Benchmarks for pseudo-variable handling.
//!
//! Covers the three stages a watch window evaluation goes through:
//! - Lexeme classification
//! - Binding against an inspection context (type name parsing and resolution)
//! - Full expression compilation to CIL

extern crate exprscope;

use criterion::{criterion_group, criterion_main, Criterion};
use exprscope::prelude::*;
use std::hint::black_box;

fn snapshot() -> (ModuleSet, ModuleId) {
    let mut modules = ModuleSet::new();
    modules.add(corlib::build(AssemblyVersion::new(4, 0, 0, 0)));
    let app = modules.add(
        ModuleBuilder::named("App")
            .class("C", |t| t.method(MethodDefinition::static_method("M")))
            .build(),
    );
    (modules, app)
}

/// Benchmark classifying a mix of pseudo-variable and plain lexemes.
fn bench_classify(c: &mut Criterion) {
    let lexemes = [
        "$exception",
        "$stowedexception",
        "$ReturnValue12",
        "$1234",
        "@0x7ffd1234",
        "$unknown",
        "local",
    ];

    c.bench_function("pseudovar_classify", |b| {
        b.iter(|| {
            for lexeme in &lexemes {
                black_box(classify(black_box(lexeme)));
            }
        });
    });
}

/// Benchmark binding a return value whose type is a nested generic instantiation.
/// Type: System.Nullable`1[[System.Int32, mscorlib]]
fn bench_bind_generic(c: &mut Criterion) {
    let (modules, app) = snapshot();
    let context = InspectionContext::new().with(
        "$ReturnValue",
        "System.Nullable`1[[System.Int32, mscorlib, Version=4.0.0.0]], mscorlib",
    );
    let binder = PseudoVariableBinder::new(&modules, &context).with_context_module(app);

    c.bench_function("pseudovar_bind_nullable", |b| {
        b.iter(|| black_box(binder.bind(black_box("$ReturnValue"))));
    });
}

/// Benchmark binding the exception pseudo-variable.
fn bench_bind_exception(c: &mut Criterion) {
    let (modules, app) = snapshot();
    let context =
        InspectionContext::new().with("$exception", "System.IO.IOException, mscorlib");
    let binder = PseudoVariableBinder::new(&modules, &context).with_context_module(app);

    c.bench_function("pseudovar_bind_exception", |b| {
        b.iter(|| black_box(binder.bind(black_box("$exception"))));
    });
}

/// Benchmark compiling a small expression end to end.
/// Expression: (int)$ReturnValue - 2
fn bench_compile(c: &mut Criterion) {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let compiler = ExpressionCompiler::new(&modules, &method);
    let context = InspectionContext::debugger_default();

    c.bench_function("pseudovar_compile_cast", |b| {
        b.iter(|| {
            let result = compiler
                .compile_expression(&context, black_box("(int)$ReturnValue - 2"), EvaluationFlags::empty())
                .unwrap();
            black_box(result)
        });
    });
}

/// Benchmark compiling an expression that coalesces two exception accessors.
fn bench_compile_coalesce(c: &mut Criterion) {
    let (modules, app) = snapshot();
    let method = MethodContext::new(&modules, app, "C", "M").unwrap();
    let compiler = ExpressionCompiler::new(&modules, &method);
    let context = InspectionContext::new()
        .with("$exception", "System.IO.IOException, mscorlib")
        .with("$stowedexception", "System.Exception, mscorlib");

    c.bench_function("pseudovar_compile_coalesce", |b| {
        b.iter(|| {
            let result = compiler
                .compile_expression(
                    &context,
                    black_box("($exception ?? $stowedexception).Message"),
                    EvaluationFlags::empty(),
                )
                .unwrap();
            black_box(result)
        });
    });
}

criterion_group!(
    benches,
    bench_classify,
    bench_bind_generic,
    bench_bind_exception,
    bench_compile,
    bench_compile_coalesce
);
criterion_main!(benches);
