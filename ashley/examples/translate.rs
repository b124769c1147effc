//! Minimal end-to-end demo: hand-builds a tiny fragment shader AST (no
//! HLSL parser involved, since one is an external collaborator this crate
//! doesn't own) and prints the GLSL `compile()` produces for it.

use ashley::ast::{
    AssignOp, CodeBlock, Expr, FunctionDecl, GlobalDecl, IdentifierRef, NodeFlags, PrimitiveType, Program, Semantic,
    ShaderStage, SourceSpan, Stmnt, TypeCache, TypeDenoter, TypeSpecifier, VarDecl, VarDeclStmnt, VariableSemantic,
};
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
    semantic: Semantic,
    is_out: bool,
) -> ashley::ast::Id<VarDeclStmnt> {
    let ts = push_type_specifier(program, ty);
    let vd = program.var_decls.push(VarDecl {
        span: SourceSpan::default(),
        ident: ident.into(),
        type_specifier: ts,
        array_dims: vec![],
        semantic: Some(VariableSemantic { semantic, user_name: None }),
        register: None,
        pack_offset: None,
        initializer: None,
        is_parameter: true,
        is_uniform: false,
        is_out_param: is_out,
        is_const: false,
        flags: NodeFlags::default(),
    });
    program.var_decl_stmnts.push(VarDeclStmnt {
        span: SourceSpan::default(),
        type_specifier: ts,
        var_decls: vec![vd],
        flags: NodeFlags::default(),
    })
}

/// Builds `void main(in float4 pos : SV_Position, out float4 color : SV_Target0) { color = pos; }`.
///
/// As a fragment-stage *input*, `SV_Position` resolves to `gl_FragCoord`,
/// not `gl_Position` (that builtin is a vertex/geometry/tessellation
/// *output* only) — see [`Semantic::FragCoord`].
fn build_program() -> Program {
    let mut program = Program::new();
    let vec4 = TypeDenoter::vector(PrimitiveType::Float, 4);

    let pos_param = push_param(&mut program, "pos", vec4.clone(), Semantic::FragCoord, false);
    let pos_var = program.var_decl_stmnts[pos_param].var_decls[0];
    let color_param = push_param(&mut program, "color", vec4.clone(), Semantic::Target(0), true);
    let color_var = program.var_decl_stmnts[color_param].var_decls[0];

    let pos_ident = program.exprs.push(Expr::Identifier {
        ident: "pos".into(),
        symbol_ref: Some(IdentifierRef::Var(pos_var)),
        ty: TypeCache { cached: Some(vec4.clone()) },
    });
    let color_ident = program.exprs.push(Expr::Identifier {
        ident: "color".into(),
        symbol_ref: Some(IdentifierRef::Var(color_var)),
        ty: TypeCache { cached: Some(vec4.clone()) },
    });
    let assign = program.exprs.push(Expr::Assignment {
        op: AssignOp::Set,
        lvalue: color_ident,
        rvalue: pos_ident,
        ty: TypeCache { cached: Some(vec4) },
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
    program
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut program = build_program();
    let input = ShaderInput { stage: ShaderStage::Fragment, entry_point_name: "main".to_string() };
    let (output, reports) = compile(&mut program, &input, &Options::default())
        .map_err(|e| anyhow::anyhow!("translation failed: {e}"))?;

    for report in &reports {
        eprintln!("{}: {}", report.severity, report.message);
    }
    print!("{}", output.source);
    Ok(())
}
