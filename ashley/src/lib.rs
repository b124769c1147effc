//! `ashley`: a source-to-source HLSL-like -> GLSL-like shader cross-compiler
//! core. This crate owns the typed AST, the semantic analyzer, the
//! AST-rewriting lowering visitor and the emitter; a lexer/parser, a
//! pretty-printer and CLI flag parsing stay external collaborators (see
//! `examples/translate.rs` for a minimal caller that supplies a hand-built
//! AST in place of a real parser).

pub mod analyzer;
pub mod ast;
pub mod diagnostics;
pub mod emitter;
pub mod intrinsics;
pub mod reference_analyzer;
pub mod rewriter;
pub mod symbol_table;
pub mod visitor;

use ast::{GlobalDecl, NodeFlags, Program, ShaderStage};
use diagnostics::{Category, Report, ReportHandler};
use emitter::{EmitOptions, EmitOutput, GlslKeywords, Statistics};
use rewriter::ConversionFlags;

/// Everything the pipeline needs to know about the program being compiled,
/// beyond the AST itself (§6).
#[derive(Debug, Clone)]
pub struct ShaderInput {
    pub stage: ShaderStage,
    /// Identifier of the function to treat as the shader's entry point.
    /// `compile()` resolves this against `program.globals` and fails with
    /// [`CompileError::NoSuchEntryPoint`] if no function declaration with
    /// this name exists.
    pub entry_point_name: String,
}

pub struct ShaderOutput {
    pub source: String,
    pub statistics: Option<Statistics>,
}

/// Flat, directly constructed configuration (no builder: the option set is
/// small and fixed, per the teacher's own preference for plain structs).
#[derive(Debug, Clone)]
pub struct Options {
    pub target_version: u32,
    pub allow_extensions: bool,
    /// Prefix applied to every synthesized global (entry-point in/out
    /// variable) name, to avoid collisions with a caller's own globals.
    pub prefix: String,
    pub conversion_flags: ConversionFlags,
    pub collect_statistics: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            target_version: 450,
            allow_extensions: true,
            prefix: String::new(),
            conversion_flags: ConversionFlags::default(),
            collect_statistics: false,
        }
    }
}

/// Two-tier error handling (§7): semantic errors during analysis are
/// accumulated as [`Report`]s and never abort the pass early; this type is
/// reserved for what `compile()` itself cannot recover from, or for a
/// downstream pass whose "first error is fatal" rule (rewriter, emitter)
/// was tripped.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("no function named `{0}` found for the requested entry point")]
    NoSuchEntryPoint(String),
    #[error("semantic analysis failed")]
    AnalysisFailed(#[source] ReportsError),
    #[error("lowering or emission failed")]
    EmitFailed(#[source] ReportsError),
}

/// Wraps an accumulated [`ReportHandler`] so it can be threaded through
/// `thiserror`'s `#[source]` without pulling in `std::error::Error` for
/// `Report` itself (reports are data, not exceptions).
#[derive(Debug)]
pub struct ReportsError(pub ReportHandler);

impl std::fmt::Display for ReportsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} report(s)", self.0.reports().len())
    }
}

impl std::error::Error for ReportsError {}

/// Runs the full pipeline — resolve entry point, analyze, then (inside the
/// emitter) reference-mark, rewrite, and emit — matching
/// `GLSLGenerator.cpp`'s `GenerateCodePrimary`, which owns the reachability
/// pass and the expression converter internally rather than leaving the
/// caller to sequence them (§4.4).
///
/// Returns the accumulated analyzer reports alongside a successful output,
/// since warnings (e.g. unused variables) don't prevent a translation from
/// succeeding.
pub fn compile(
    program: &mut Program,
    input: &ShaderInput,
    options: &Options,
) -> Result<(ShaderOutput, Vec<Report>), CompileError> {
    resolve_entry_point(program, input)?;

    let (had_errors, analyzer_reports) = analyzer::analyze(program);
    if had_errors {
        return Err(CompileError::AnalysisFailed(ReportsError(analyzer_reports)));
    }

    let keywords = GlslKeywords::default();
    let emit_options = EmitOptions {
        target_version: options.target_version,
        allow_extensions: options.allow_extensions,
        prefix: options.prefix.as_str().into(),
        line_marks: false,
        conversion_flags: options.conversion_flags,
        collect_statistics: options.collect_statistics,
    };
    let EmitOutput { source, statistics } = emitter::emit(program, input.stage, &keywords, &emit_options)
        .map_err(|reports| CompileError::EmitFailed(ReportsError(reports)))?;

    Ok((ShaderOutput { source, statistics }, analyzer_reports.into_reports()))
}

/// Looks `input.entry_point_name` up among `program`'s top-level function
/// declarations, sets `program.entry_point`, and flags it
/// [`NodeFlags::IS_ENTRY_POINT`]. `ShaderStage` governs which attributes are
/// legal on the resolved function (SPEC_FULL.md §6): `numthreads` is only
/// legal on a `Compute`-stage entry point, which the emitter itself also
/// checks (`emit_entry_point_globals`) as a defense against a caller that
/// skips `compile()` and drives the emitter directly.
fn resolve_entry_point(program: &mut Program, input: &ShaderInput) -> Result<(), CompileError> {
    let found = program.globals.iter().find_map(|g| match g {
        GlobalDecl::Function(f) if program.function_decls[*f].ident == input.entry_point_name => Some(*f),
        _ => None,
    });
    let Some(f) = found else {
        return Err(CompileError::NoSuchEntryPoint(input.entry_point_name.clone()));
    };
    if input.stage != ShaderStage::Compute && program.function_decls[f].num_threads.is_some() {
        return Err(CompileError::AnalysisFailed(ReportsError({
            let mut reports = ReportHandler::new();
            reports.push(Report::error(
                Category::TypeError,
                "`numthreads` is only legal on a compute-stage entry point",
            ));
            reports
        })));
    }
    program.entry_point = Some(f);
    program.function_decls[f].flags.insert(NodeFlags::IS_ENTRY_POINT);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{
        CodeBlock, FunctionDecl, Literal, PrimitiveType, SourceSpan, Stmnt, TypeDenoter, TypeSpecifier,
    };

    fn build_trivial_vertex_program() -> Program {
        let mut program = Program::new();
        let ret_spec = program.type_specifiers.push(TypeSpecifier {
            span: SourceSpan::default(),
            denoter: Some(TypeDenoter::vector(PrimitiveType::Float, 4)),
            unresolved_name: None,
            struct_decl: None,
        });
        let ret_expr = program.exprs.push(ast::Expr::Literal {
            value: Literal::Float(0.0),
            ty: Default::default(),
        });
        let return_stmnt = program.stmnts.push(Stmnt::Return { expr: Some(ret_expr), flags: NodeFlags::default() });
        let block = program.code_blocks.push(CodeBlock { stmnts: vec![return_stmnt] });
        let func = program.function_decls.push(FunctionDecl {
            span: SourceSpan::default(),
            ident: "main".into(),
            return_type: ret_spec,
            parameters: vec![],
            code_block: block,
            struct_decl_ref: None,
            num_threads: None,
            return_semantic: None,
            flags: NodeFlags::default(),
        });
        program.globals.push(GlobalDecl::Function(func));
        program
    }

    #[test]
    fn compile_rejects_unknown_entry_point() {
        let mut program = build_trivial_vertex_program();
        let input = ShaderInput { stage: ShaderStage::Vertex, entry_point_name: "vsMain".to_string() };
        let err = compile(&mut program, &input, &Options::default()).unwrap_err();
        assert!(matches!(err, CompileError::NoSuchEntryPoint(name) if name == "vsMain"));
    }

    #[test]
    fn compile_rejects_numthreads_outside_compute() {
        let mut program = build_trivial_vertex_program();
        if let GlobalDecl::Function(f) = program.globals[0] {
            program.function_decls[f].num_threads = Some([8, 8, 1]);
        }
        let input = ShaderInput { stage: ShaderStage::Vertex, entry_point_name: "main".to_string() };
        let err = compile(&mut program, &input, &Options::default()).unwrap_err();
        assert!(matches!(err, CompileError::AnalysisFailed(_)));
    }

    #[test]
    fn compile_succeeds_for_trivial_vertex_entry_point() {
        let mut program = build_trivial_vertex_program();
        let input = ShaderInput { stage: ShaderStage::Vertex, entry_point_name: "main".to_string() };
        let (output, reports) = compile(&mut program, &input, &Options::default()).unwrap();
        assert!(reports.iter().all(|r| r.severity != diagnostics::Severity::Error));
        assert!(output.source.contains("void main()"));
    }
}
