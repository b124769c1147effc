//! End-to-end pipeline tests (analyze -> lower -> emit) against
//! hand-constructed ASTs. A real HLSL parser is out of scope, so each test
//! builds the tree directly with the same arena-push style the unit tests
//! throughout `src/` use, then drives it through [`ashley::compile`].

use ashley::ast::{
    CodeBlock, Expr, FunctionDecl, GlobalDecl, IdentifierRef, Literal, NodeFlags, PrimitiveType, Program, Semantic,
    SourceSpan, Stmnt, TypeCache, TypeDenoter, TypeSpecifier, VarDecl, VarDeclStmnt, VariableSemantic,
};
use ashley::rewriter::ConversionFlags;
use ashley::{compile, Options, ShaderInput};

fn push_type_specifier(program: &mut Program, ty: TypeDenoter) -> ashley::ast::Id<TypeSpecifier> {
    program.type_specifiers.push(TypeSpecifier {
        span: SourceSpan::default(),
        denoter: Some(ty),
        unresolved_name: None,
        struct_decl: None,
    })
}

fn push_param(
    program: &mut Program,
    ident: &str,
    ty: TypeDenoter,
    semantic: Option<VariableSemantic>,
    is_out: bool,
) -> ashley::ast::Id<VarDeclStmnt> {
    let ts = push_type_specifier(program, ty);
    let vd = program.var_decls.push(VarDecl {
        span: SourceSpan::default(),
        ident: ident.into(),
        type_specifier: ts,
        array_dims: vec![],
        semantic,
        register: None,
        pack_offset: None,
        initializer: None,
        is_parameter: true,
        is_uniform: false,
        is_out_param: is_out,
        is_const: false,
        flags: NodeFlags::default(),
    });
    program.var_decl_stmnts.push(VarDeclStmnt { span: SourceSpan::default(), type_specifier: ts, var_decls: vec![vd], flags: NodeFlags::default() })
}

/// `void main(in float4 pos : SV_Position, out float4 color : SV_Target0) { color = pos; }`
/// A minimal fragment entry point: one builtin-semantic input, one
/// target-semantic output, a single assignment copying one into the other.
/// As a fragment-stage *input*, `SV_Position` resolves to `gl_FragCoord`
/// (`gl_Position` is a vertex/geometry/tessellation *output* builtin and is
/// never legal as a fragment input).
#[test]
fn fragment_entry_point_emits_target_and_fragcoord_globals() {
    let mut program = Program::new();

    let pos_semantic = VariableSemantic { semantic: Semantic::FragCoord, user_name: None };
    let pos_param = push_param(&mut program, "pos", TypeDenoter::vector(PrimitiveType::Float, 4), Some(pos_semantic), false);
    let pos_var = program.var_decl_stmnts[pos_param].var_decls[0];

    let color_semantic = VariableSemantic { semantic: Semantic::Target(0), user_name: None };
    let color_param =
        push_param(&mut program, "color", TypeDenoter::vector(PrimitiveType::Float, 4), Some(color_semantic), true);
    let color_var = program.var_decl_stmnts[color_param].var_decls[0];

    let pos_ident = program.exprs.push(Expr::Identifier {
        ident: "pos".into(),
        symbol_ref: Some(IdentifierRef::Var(pos_var)),
        ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
    });
    let color_ident = program.exprs.push(Expr::Identifier {
        ident: "color".into(),
        symbol_ref: Some(IdentifierRef::Var(color_var)),
        ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
    });
    let assign = program.exprs.push(Expr::Assignment {
        op: ashley::ast::AssignOp::Set,
        lvalue: color_ident,
        rvalue: pos_ident,
        ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
    });
    let assign_stmnt = program.stmnts.push(Stmnt::Expr { expr: assign });
    let block = program.code_blocks.push(CodeBlock { stmnts: vec![assign_stmnt] });

    let void_ts = push_type_specifier(&mut program, TypeDenoter::Void);
    let func = program.function_decls.push(FunctionDecl {
        span: SourceSpan::default(),
        ident: "main".into(),
        return_type: void_ts,
        parameters: vec![pos_param, color_param],
        code_block: block,
        struct_decl_ref: None,
        num_threads: None,
        return_semantic: None,
        flags: NodeFlags::default(),
    });
    program.globals.push(GlobalDecl::Function(func));

    let input = ShaderInput { stage: ashley::ast::ShaderStage::Fragment, entry_point_name: "main".to_string() };
    let (output, reports) = compile(&mut program, &input, &Options::default()).expect("compile should succeed");
    assert!(reports.iter().all(|r| r.severity != ashley::diagnostics::Severity::Error));
    assert!(output.source.contains("void main()"));
    assert!(output.source.contains("gl_FragCoord"), "expected a gl_FragCoord reference in:\n{}", output.source);
    assert!(!output.source.contains("gl_Position"), "gl_Position is not a legal fragment-stage builtin:\n{}", output.source);
    assert!(output.source.contains("layout(location = 0)"));
}

/// Binding `SV_Position` to a fragment-stage *output* (or a vertex-stage
/// input) is a semantic-mapping failure, not a silent fallback to a plain
/// global — `gl_Position` only exists as a vertex/geometry/tessellation
/// output builtin (§4.4 "unmapped semantics are errors").
#[test]
fn position_semantic_on_fragment_output_is_a_mapping_error() {
    let mut program = Program::new();

    let pos_semantic = VariableSemantic { semantic: Semantic::Position, user_name: None };
    let pos_param = push_param(&mut program, "pos", TypeDenoter::vector(PrimitiveType::Float, 4), Some(pos_semantic), true);

    let void_ts = push_type_specifier(&mut program, TypeDenoter::Void);
    let empty_block = program.code_blocks.push(CodeBlock { stmnts: vec![] });
    let func = program.function_decls.push(FunctionDecl {
        span: SourceSpan::default(),
        ident: "main".into(),
        return_type: void_ts,
        parameters: vec![pos_param],
        code_block: empty_block,
        struct_decl_ref: None,
        num_threads: None,
        return_semantic: None,
        flags: NodeFlags::default(),
    });
    program.globals.push(GlobalDecl::Function(func));

    let input = ShaderInput { stage: ashley::ast::ShaderStage::Fragment, entry_point_name: "main".to_string() };
    let err = compile(&mut program, &input, &Options::default()).unwrap_err();
    assert!(matches!(err, ashley::CompileError::EmitFailed(_)));
}

/// An unreachable function (never called from the entry point) is dropped
/// from emitted output and counted in `Statistics::skipped_declaration_count`
/// (§3.4 reachability, SPEC_FULL.md §6).
#[test]
fn unreachable_function_is_elided_from_output() {
    let mut program = Program::new();

    let void_ts = push_type_specifier(&mut program, TypeDenoter::Void);
    let empty_block = program.code_blocks.push(CodeBlock { stmnts: vec![] });
    let dead_fn = program.function_decls.push(FunctionDecl {
        span: SourceSpan::default(),
        ident: "unused_helper".into(),
        return_type: void_ts,
        parameters: vec![],
        code_block: empty_block,
        struct_decl_ref: None,
        num_threads: None,
        return_semantic: None,
        flags: NodeFlags::default(),
    });
    program.globals.push(GlobalDecl::Function(dead_fn));

    let main_block = program.code_blocks.push(CodeBlock { stmnts: vec![] });
    let main_fn = program.function_decls.push(FunctionDecl {
        span: SourceSpan::default(),
        ident: "main".into(),
        return_type: void_ts,
        parameters: vec![],
        code_block: main_block,
        struct_decl_ref: None,
        num_threads: None,
        return_semantic: None,
        flags: NodeFlags::default(),
    });
    program.globals.push(GlobalDecl::Function(main_fn));

    let input = ShaderInput { stage: ashley::ast::ShaderStage::Fragment, entry_point_name: "main".to_string() };
    let mut options = Options::default();
    options.collect_statistics = true;
    let (output, _) = compile(&mut program, &input, &options).expect("compile should succeed");
    assert!(!output.source.contains("unused_helper"));
    let stats = output.statistics.expect("statistics were requested");
    assert_eq!(stats.skipped_declaration_count, 1);
    assert_eq!(stats.emitted_declaration_count, 1);
}

/// `mul(v, v)` between two same-dimension vectors narrows to `dot` (§4.2,
/// §4.3's `ConvertMatrixLayout` call-site handling) and the rewriter's
/// `log10` lowering both run as part of the same `compile()` call.
#[test]
fn mul_of_two_vectors_narrows_to_dot_call() {
    let mut program = Program::new();

    let vec4 = TypeDenoter::vector(PrimitiveType::Float, 4);
    let a_ts = push_type_specifier(&mut program, vec4.clone());
    let a_var = program.var_decls.push(VarDecl {
        span: SourceSpan::default(),
        ident: "a".into(),
        type_specifier: a_ts,
        array_dims: vec![],
        semantic: None,
        register: None,
        pack_offset: None,
        initializer: None,
        is_parameter: false,
        is_uniform: false,
        is_out_param: false,
        is_const: false,
        flags: NodeFlags::default(),
    });
    let a_decl_stmnt = program.var_decl_stmnts.push(VarDeclStmnt {
        span: SourceSpan::default(),
        type_specifier: a_ts,
        var_decls: vec![a_var],
        flags: NodeFlags::default(),
    });
    let a_decl_stmnt_id = program.stmnts.push(Stmnt::VarDecl(a_decl_stmnt));

    let a_ident = |program: &mut Program| {
        program.exprs.push(Expr::Identifier {
            ident: "a".into(),
            symbol_ref: Some(IdentifierRef::Var(a_var)),
            ty: TypeCache { cached: Some(vec4.clone()) },
        })
    };
    let mul_ident = program.exprs.push(Expr::Identifier { ident: "mul".into(), symbol_ref: None, ty: TypeCache::default() });
    let lhs = a_ident(&mut program);
    let rhs = a_ident(&mut program);
    let scalar = TypeDenoter::Base { elem: PrimitiveType::Float, rows: 1, cols: 1 };
    let call = program.exprs.push(Expr::Call {
        prefix: mul_ident,
        arguments: vec![lhs, rhs],
        call_ref: Some(ashley::ast::CallRef::Intrinsic(ashley::intrinsics::Intrinsic::Mul)),
        ty: TypeCache { cached: Some(scalar) },
    });
    let call_stmnt = program.stmnts.push(Stmnt::Expr { expr: call });

    let block = program.code_blocks.push(CodeBlock { stmnts: vec![a_decl_stmnt_id, call_stmnt] });
    let void_ts = push_type_specifier(&mut program, TypeDenoter::Void);
    let func = program.function_decls.push(FunctionDecl {
        span: SourceSpan::default(),
        ident: "main".into(),
        return_type: void_ts,
        parameters: vec![],
        code_block: block,
        struct_decl_ref: None,
        num_threads: None,
        return_semantic: None,
        flags: NodeFlags::default(),
    });
    program.globals.push(GlobalDecl::Function(func));

    let input = ShaderInput { stage: ashley::ast::ShaderStage::Fragment, entry_point_name: "main".to_string() };
    let mut options = Options::default();
    options.conversion_flags = ConversionFlags::CONVERT_MATRIX_LAYOUT;
    let (output, reports) = compile(&mut program, &input, &options).expect("compile should succeed");
    assert!(reports.iter().all(|r| r.severity != ashley::diagnostics::Severity::Error));
    assert!(output.source.contains("dot("), "expected a dot() call in:\n{}", output.source);
}

/// `void main() { float k = 1.0; }` — `k` is declared and initialized but
/// never read before its block scope closes, so `compile()` still succeeds
/// but reports exactly one unused-variable warning naming it (§3.3, §8
/// scenario 6).
#[test]
fn unused_local_variable_emits_exactly_one_warning() {
    let mut program = Program::new();

    let float_ts = push_type_specifier(&mut program, TypeDenoter::FLOAT);
    let one = program.exprs.push(Expr::Literal { value: Literal::Float(1.0), ty: TypeCache::default() });
    let k = program.var_decls.push(VarDecl {
        span: SourceSpan::default(),
        ident: "k".into(),
        type_specifier: float_ts,
        array_dims: vec![],
        semantic: None,
        register: None,
        pack_offset: None,
        initializer: Some(one),
        is_parameter: false,
        is_uniform: false,
        is_out_param: false,
        is_const: false,
        flags: NodeFlags::default(),
    });
    let k_decl_stmnt = program.var_decl_stmnts.push(VarDeclStmnt {
        span: SourceSpan::default(),
        type_specifier: float_ts,
        var_decls: vec![k],
        flags: NodeFlags::default(),
    });
    let k_stmnt = program.stmnts.push(Stmnt::VarDecl(k_decl_stmnt));
    let block = program.code_blocks.push(CodeBlock { stmnts: vec![k_stmnt] });

    let void_ts = push_type_specifier(&mut program, TypeDenoter::Void);
    let func = program.function_decls.push(FunctionDecl {
        span: SourceSpan::default(),
        ident: "main".into(),
        return_type: void_ts,
        parameters: vec![],
        code_block: block,
        struct_decl_ref: None,
        num_threads: None,
        return_semantic: None,
        flags: NodeFlags::default(),
    });
    program.globals.push(GlobalDecl::Function(func));

    let input = ShaderInput { stage: ashley::ast::ShaderStage::Fragment, entry_point_name: "main".to_string() };
    let (_, reports) = compile(&mut program, &input, &Options::default()).expect("compile should succeed");
    let unused: Vec<_> = reports
        .iter()
        .filter(|r| r.category == ashley::diagnostics::Category::UnusedVariable)
        .collect();
    assert_eq!(unused.len(), 1);
    assert!(unused[0].message.contains('k'));
    assert!(reports.iter().all(|r| r.severity != ashley::diagnostics::Severity::Error));
}

/// `void main() { float4 color; float brightness; float4 result = color *
/// brightness; }` — a scalar operand broadcasts against a vector in `*`/`/`
/// (spec §3.2's "vector dimension = max(lhs, rhs) when compatible", mirrored
/// from `ExprConverter.cpp`'s `matchTypeSize` exception for `Mul`/`Div`).
/// Unlike `mul_of_two_vectors_narrows_to_dot_call`, this binary expression's
/// `TypeCache` starts empty, so `compile()` must run genuine binary-operator
/// inference rather than read back a pre-seeded type.
#[test]
fn scalar_times_vector_infers_vector_type_without_error() {
    let mut program = Program::new();

    let vec4 = TypeDenoter::vector(PrimitiveType::Float, 4);
    let color_ts = push_type_specifier(&mut program, vec4.clone());
    let color_var = program.var_decls.push(VarDecl {
        span: SourceSpan::default(),
        ident: "color".into(),
        type_specifier: color_ts,
        array_dims: vec![],
        semantic: None,
        register: None,
        pack_offset: None,
        initializer: None,
        is_parameter: false,
        is_uniform: false,
        is_out_param: false,
        is_const: false,
        flags: NodeFlags::default(),
    });
    let color_decl_stmnt = program.var_decl_stmnts.push(VarDeclStmnt {
        span: SourceSpan::default(),
        type_specifier: color_ts,
        var_decls: vec![color_var],
        flags: NodeFlags::default(),
    });
    let color_decl_stmnt_id = program.stmnts.push(Stmnt::VarDecl(color_decl_stmnt));

    let brightness_ts = push_type_specifier(&mut program, TypeDenoter::FLOAT);
    let brightness_var = program.var_decls.push(VarDecl {
        span: SourceSpan::default(),
        ident: "brightness".into(),
        type_specifier: brightness_ts,
        array_dims: vec![],
        semantic: None,
        register: None,
        pack_offset: None,
        initializer: None,
        is_parameter: false,
        is_uniform: false,
        is_out_param: false,
        is_const: false,
        flags: NodeFlags::default(),
    });
    let brightness_decl_stmnt = program.var_decl_stmnts.push(VarDeclStmnt {
        span: SourceSpan::default(),
        type_specifier: brightness_ts,
        var_decls: vec![brightness_var],
        flags: NodeFlags::default(),
    });
    let brightness_decl_stmnt_id = program.stmnts.push(Stmnt::VarDecl(brightness_decl_stmnt));

    let color_ident = program.exprs.push(Expr::Identifier {
        ident: "color".into(),
        symbol_ref: Some(IdentifierRef::Var(color_var)),
        ty: TypeCache::default(),
    });
    let brightness_ident = program.exprs.push(Expr::Identifier {
        ident: "brightness".into(),
        symbol_ref: Some(IdentifierRef::Var(brightness_var)),
        ty: TypeCache::default(),
    });
    let mul = program.exprs.push(Expr::Binary {
        op: ashley::ast::BinaryOp::Mul,
        lhs: color_ident,
        rhs: brightness_ident,
        ty: TypeCache::default(),
    });

    let result_ts = push_type_specifier(&mut program, vec4.clone());
    let result_var = program.var_decls.push(VarDecl {
        span: SourceSpan::default(),
        ident: "result".into(),
        type_specifier: result_ts,
        array_dims: vec![],
        semantic: None,
        register: None,
        pack_offset: None,
        initializer: Some(mul),
        is_parameter: false,
        is_uniform: false,
        is_out_param: false,
        is_const: false,
        flags: NodeFlags::default(),
    });
    let result_decl_stmnt = program.var_decl_stmnts.push(VarDeclStmnt {
        span: SourceSpan::default(),
        type_specifier: result_ts,
        var_decls: vec![result_var],
        flags: NodeFlags::default(),
    });
    let result_decl_stmnt_id = program.stmnts.push(Stmnt::VarDecl(result_decl_stmnt));

    let block = program.code_blocks.push(CodeBlock {
        stmnts: vec![color_decl_stmnt_id, brightness_decl_stmnt_id, result_decl_stmnt_id],
    });
    let void_ts = push_type_specifier(&mut program, TypeDenoter::Void);
    let func = program.function_decls.push(FunctionDecl {
        span: SourceSpan::default(),
        ident: "main".into(),
        return_type: void_ts,
        parameters: vec![],
        code_block: block,
        struct_decl_ref: None,
        num_threads: None,
        return_semantic: None,
        flags: NodeFlags::default(),
    });
    program.globals.push(GlobalDecl::Function(func));

    let input = ShaderInput { stage: ashley::ast::ShaderStage::Fragment, entry_point_name: "main".to_string() };
    let (_, reports) = compile(&mut program, &input, &Options::default()).expect("compile should succeed");
    assert!(reports.iter().all(|r| r.severity != ashley::diagnostics::Severity::Error));
}

/// An entry point that does not exist among the program's declarations is a
/// [`ashley::CompileError::NoSuchEntryPoint`], not a panic.
#[test]
fn missing_entry_point_is_a_compile_error() {
    let mut program = Program::new();
    let input = ShaderInput { stage: ashley::ast::ShaderStage::Fragment, entry_point_name: "psMain".to_string() };
    let err = compile(&mut program, &input, &Options::default()).unwrap_err();
    assert!(matches!(err, ashley::CompileError::NoSuchEntryPoint(name) if name == "psMain"));
}
