//! GLSL text emitter (§4.4): the final stage consuming the decorated,
//! lowered AST and producing target source text.
//!
//! Grounded on `GLSLGenerator.cpp`'s `GenerateCodePrimary`: reachability
//! marking and the rewriter both run *inside* this module's top-level
//! [`emit`] entry point rather than as separately sequenced caller-driven
//! passes, matching the original's own construct-and-run of both from its
//! code generation entry point.

use crate::ast::*;
use crate::diagnostics::{Category, Report, ReportHandler};
use crate::intrinsics::Intrinsic;
use crate::reference_analyzer::mark_reachable;
use crate::rewriter::{rewrite, ConversionFlags};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Target-keyword table (§1, §4.4)
// ---------------------------------------------------------------------------

/// The pure mapping from [`Intrinsic`] to its GLSL spelling that the spec
/// treats abstractly as "a target-keyword table injected into the
/// emitter". Seeded from `GLSLGenerator.cpp`'s `texFuncMap_`/intrinsic
/// dispatch; `SampleCmp`/`SampleCmpLevelZero` are deliberately absent
/// (spec §9 Open Question, see `DESIGN.md`).
pub struct GlslKeywords {
    names: HashMap<Intrinsic, &'static str>,
}

impl Default for GlslKeywords {
    fn default() -> GlslKeywords {
        use Intrinsic::*;
        let mut names = HashMap::new();
        names.insert(Abs, "abs");
        names.insert(Clamp, "clamp");
        names.insert(Cross, "cross");
        names.insert(Dot, "dot");
        names.insert(Lerp, "mix");
        names.insert(Log, "log");
        names.insert(Min, "min");
        names.insert(Max, "max");
        names.insert(Normalize, "normalize");
        names.insert(Pow, "pow");
        names.insert(Rsqrt, "inversesqrt");
        names.insert(Sqrt, "sqrt");
        names.insert(Transpose, "transpose");
        names.insert(Load, "texelFetch");
        names.insert(Sample, "texture");
        names.insert(SampleBias, "textureOffset");
        names.insert(SampleGrad, "textureGrad");
        names.insert(SampleLevel, "textureLod");
        names.insert(Not, "not");
        names.insert(Equal, "equal");
        names.insert(NotEqual, "notEqual");
        names.insert(LessThan, "lessThan");
        names.insert(LessThanEqual, "lessThanEqual");
        names.insert(GreaterThan, "greaterThan");
        names.insert(GreaterThanEqual, "greaterThanEqual");
        names.insert(ImageLoad, "imageLoad");
        names.insert(ImageStore, "imageStore");
        names.insert(TexelFetch, "texelFetch");
        GlslKeywords { names }
    }
}

impl GlslKeywords {
    pub fn lookup(&self, intrinsic: Intrinsic) -> Option<&'static str> {
        self.names.get(&intrinsic).copied()
    }
}

/// `semantic → builtin-name` (§4.4), direction- and stage-aware: a builtin
/// system-value semantic only binds to its GLSL builtin in the direction
/// and stage it actually exists in (`gl_Position` is a vertex/geometry/
/// tessellation *output*, never a fragment input; `gl_FragCoord` is a
/// fragment-stage *input*, never an output). Binding one in the wrong
/// direction or stage is a semantic-mapping failure (§4.4 "unmapped
/// semantics are errors"), not a silent fallback to a plain global.
enum BuiltinSemantic {
    Name(&'static str),
    WrongDirectionOrStage,
    NotBuiltin,
}

fn builtin_semantic(semantic: Semantic, stage: ShaderStage, is_out: bool) -> BuiltinSemantic {
    use BuiltinSemantic::*;
    match semantic {
        Semantic::Position => {
            if is_out && !matches!(stage, ShaderStage::Fragment | ShaderStage::Compute) {
                Name("gl_Position")
            } else {
                WrongDirectionOrStage
            }
        }
        Semantic::VertexId => {
            if !is_out && stage == ShaderStage::Vertex {
                Name("gl_VertexID")
            } else {
                WrongDirectionOrStage
            }
        }
        Semantic::InstanceId => {
            if !is_out && stage == ShaderStage::Vertex {
                Name("gl_InstanceID")
            } else {
                WrongDirectionOrStage
            }
        }
        Semantic::FragCoord => {
            if !is_out && stage == ShaderStage::Fragment {
                Name("gl_FragCoord")
            } else {
                WrongDirectionOrStage
            }
        }
        Semantic::Depth => {
            if is_out && stage == ShaderStage::Fragment {
                Name("gl_FragDepth")
            } else {
                WrongDirectionOrStage
            }
        }
        Semantic::Target(_) | Semantic::UserDefined => NotBuiltin,
    }
}

struct ExtensionRequirement {
    intrinsic: Intrinsic,
    min_version: u32,
    extension: &'static str,
}

/// Scanned against `Program`'s referenced-intrinsics set to compute the
/// header's `#extension` lines (§4.4 first bullet).
const EXTENSION_TABLE: &[ExtensionRequirement] = &[
    ExtensionRequirement { intrinsic: Intrinsic::ImageLoad, min_version: 420, extension: "GL_ARB_shader_image_load_store" },
    ExtensionRequirement { intrinsic: Intrinsic::ImageStore, min_version: 420, extension: "GL_ARB_shader_image_load_store" },
    ExtensionRequirement { intrinsic: Intrinsic::TexelFetch, min_version: 130, extension: "GL_EXT_gpu_shader4" },
];

// ---------------------------------------------------------------------------
// Statistics (§6, opt-in output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub name: SmolStr,
    pub binding_index: u32,
}

#[derive(Debug, Clone)]
pub struct UniformBufferBinding {
    pub name: SmolStr,
    pub binding_index: u32,
}

/// Opt-in readout of the emit pass, per spec §6. The emitted/skipped counts
/// are a direct, low-cost projection of the reachability pass already
/// required by §3.4 (SPEC_FULL.md §6 supplement).
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub texture_bindings: Vec<TextureBinding>,
    pub uniform_buffer_bindings: Vec<UniformBufferBinding>,
    pub entry_point_name: String,
    pub emitted_declaration_count: u32,
    pub skipped_declaration_count: u32,
}

// ---------------------------------------------------------------------------
// Entry point / options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub target_version: u32,
    pub allow_extensions: bool,
    pub prefix: SmolStr,
    pub line_marks: bool,
    pub conversion_flags: ConversionFlags,
    pub collect_statistics: bool,
}

impl Default for EmitOptions {
    fn default() -> EmitOptions {
        EmitOptions {
            target_version: 450,
            allow_extensions: true,
            prefix: SmolStr::default(),
            line_marks: false,
            conversion_flags: ConversionFlags::default(),
            collect_statistics: false,
        }
    }
}

pub struct EmitOutput {
    pub source: String,
    pub statistics: Option<Statistics>,
}

/// Runs reference marking, the rewriter, and text emission over `program`
/// in that order (§4.4's supplement: these are owned by this entry point,
/// not separately sequenced by the caller). Returns the first fatal error
/// for the pass, if any — rewriter/emitter errors are fatal for the whole
/// pass per §7, unlike the analyzer's accumulate-and-continue policy.
pub fn emit(
    program: &mut Program,
    stage: ShaderStage,
    keywords: &GlslKeywords,
    options: &EmitOptions,
) -> Result<EmitOutput, ReportHandler> {
    let span = tracing::debug_span!("emit", stage = ?stage, version = options.target_version);
    let _enter = span.enter();

    let reach = mark_reachable(program);
    tracing::trace!(intrinsics = reach.used_intrinsics.len(), "reachability marked");

    let rewrite_reports = rewrite(program, options.conversion_flags);
    if rewrite_reports.had_errors() {
        return Err(rewrite_reports);
    }

    let mut emitter = Emitter {
        program,
        stage,
        keywords,
        options,
        out: String::new(),
        indent: 0,
        reports: ReportHandler::new(),
        entry_renames: HashMap::new(),
        statistics: Statistics::default(),
    };
    emitter.reports.extend(rewrite_reports);
    emitter.run(&reach.used_intrinsics);

    if emitter.reports.had_errors() {
        return Err(emitter.reports);
    }
    Ok(EmitOutput {
        source: emitter.out,
        statistics: if options.collect_statistics { Some(emitter.statistics) } else { None },
    })
}

/// Owned, arena-free copy of the one `Expr` node `render_expr` is about to
/// print, so that recursing into child ids never holds a borrow of
/// `program.exprs` open across a `&mut self` call.
enum ExprSnapshot {
    Null,
    Literal(Literal),
    Identifier(SmolStr),
    ObjectAccess(Id<Expr>, SmolStr),
    ArrayIndex(Id<Expr>, Vec<Id<Expr>>),
    Call(Id<Expr>, Vec<Id<Expr>>, Option<CallRef>),
    Cast(Id<TypeSpecifier>, Id<Expr>),
    Bracket(Id<Expr>),
    Unary(UnaryOp, Id<Expr>),
    PostUnary(PostUnaryOp, Id<Expr>),
    Binary(BinaryOp, Id<Expr>, Id<Expr>),
    Ternary(Id<Expr>, Id<Expr>, Id<Expr>),
    Assignment(AssignOp, Id<Expr>, Id<Expr>),
    Sequence(Vec<Id<Expr>>),
    InitializerList(Vec<Id<Expr>>),
    TypeSpecifier(Id<TypeSpecifier>),
}

struct Emitter<'p> {
    program: &'p mut Program,
    stage: ShaderStage,
    keywords: &'p GlslKeywords,
    options: &'p EmitOptions,
    out: String,
    indent: u32,
    reports: ReportHandler,
    /// Entry-point parameter identifiers rewritten to either a builtin name
    /// or a prefixed global, consulted whenever an `Identifier` expression
    /// is printed (§4.4: "parameters are projected onto global in/out
    /// variables ... or locals initialized from builtin variables").
    entry_renames: HashMap<SmolStr, String>,
    statistics: Statistics,
}

impl<'p> Emitter<'p> {
    fn run(&mut self, used_intrinsics: &std::collections::HashSet<Intrinsic>) {
        self.emit_header(used_intrinsics);
        self.emit_entry_point_globals();

        let globals = self.program.globals.clone();
        let mut first = true;
        for g in globals {
            if !self.is_reachable(g) {
                self.statistics.skipped_declaration_count += 1;
                continue;
            }
            if !first {
                self.out.push('\n');
            }
            first = false;
            self.statistics.emitted_declaration_count += 1;
            self.emit_global(g);
        }
    }

    fn is_reachable(&self, g: GlobalDecl) -> bool {
        match g {
            GlobalDecl::Var(s) => self.program.var_decl_stmnts[s]
                .var_decls
                .iter()
                .any(|&v| self.program.var_decls[v].flags.contains(NodeFlags::IS_REACHABLE)),
            GlobalDecl::Buffer(s) => self.program.buffer_decl_stmnts[s]
                .buffer_decls
                .iter()
                .any(|&b| self.program.buffer_decls[b].flags.contains(NodeFlags::IS_REACHABLE)),
            GlobalDecl::Sampler(s) => self.program.sampler_decl_stmnts[s]
                .sampler_decls
                .iter()
                .any(|&sd| self.program.sampler_decls[sd].flags.contains(NodeFlags::IS_REACHABLE)),
            GlobalDecl::Struct(s) => {
                self.program.struct_decls[self.program.struct_decl_stmnts[s].struct_decl]
                    .flags
                    .contains(NodeFlags::IS_REACHABLE)
            }
            GlobalDecl::Alias(_) => true,
            GlobalDecl::Function(f) => self.program.function_decls[f].flags.contains(NodeFlags::IS_REACHABLE),
        }
    }

    // -----------------------------------------------------------------
    // Header
    // -----------------------------------------------------------------

    fn emit_header(&mut self, used_intrinsics: &std::collections::HashSet<Intrinsic>) {
        writeln!(self.out, "#version {}", self.options.target_version).unwrap();
        for req in EXTENSION_TABLE {
            if !used_intrinsics.contains(&req.intrinsic) {
                continue;
            }
            if self.options.target_version >= req.min_version {
                continue;
            }
            if !self.options.allow_extensions {
                self.reports.push(Report::error(
                    Category::SemanticMapping,
                    format!(
                        "intrinsic `{}` requires GLSL {} or extension `{}`, but extensions are disallowed",
                        req.intrinsic, req.min_version, req.extension
                    ),
                ));
                continue;
            }
            writeln!(self.out, "#extension {} : require", req.extension).unwrap();
        }
        writeln!(self.out, "// stage: {:?}", self.stage).unwrap();
        writeln!(self.out, "// generated by ashley").unwrap();
        self.out.push('\n');
    }

    // -----------------------------------------------------------------
    // Entry-point parameter projection (§4.4)
    // -----------------------------------------------------------------

    fn emit_entry_point_globals(&mut self) {
        let Some(entry) = self.program.entry_point else {
            self.reports.push(Report::error(Category::SemanticMapping, "no entry point resolved"));
            return;
        };
        self.statistics.entry_point_name = "main".to_string();

        if self.stage == ShaderStage::Compute {
            if let Some([x, y, z]) = self.program.function_decls[entry].num_threads {
                writeln!(self.out, "layout(local_size_x = {x}, local_size_y = {y}, local_size_z = {z}) in;").unwrap();
                self.out.push('\n');
            }
        } else if self.program.function_decls[entry].num_threads.is_some() {
            self.reports.push(Report::error(
                Category::TypeError,
                "`numthreads` is only legal on a compute-stage entry point",
            ));
        }

        let params = self.program.function_decls[entry].parameters.clone();
        for p in params {
            let var_decls = self.program.var_decl_stmnts[p].var_decls.clone();
            for vd in var_decls {
                self.project_entry_param(vd);
            }
        }
    }

    /// Projects one entry-point parameter onto either a global `in`/`out`
    /// variable (no semantic, or a user-defined one) or a rename to a
    /// target builtin (a system-value semantic) — see `builtin_name`.
    fn project_entry_param(&mut self, vd: Id<VarDecl>) {
        let ident = self.program.var_decls[vd].ident.clone();
        let is_out = self.program.var_decls[vd].is_out_param;
        let semantic = self.program.var_decls[vd].semantic.clone();
        let ty = self.type_of_var(vd);

        match semantic.as_ref().map(|s| s.semantic) {
            Some(sem) => match builtin_semantic(sem, self.stage, is_out) {
                BuiltinSemantic::Name(name) => {
                    self.entry_renames.insert(ident, name.to_string());
                }
                BuiltinSemantic::WrongDirectionOrStage => {
                    self.reports.push(Report::error(
                        Category::SemanticMapping,
                        format!(
                            "semantic `{:?}` cannot be bound to {} `{}` on a {:?}-stage entry point",
                            sem,
                            if is_out { "output parameter" } else { "input parameter" },
                            ident,
                            self.stage
                        ),
                    ));
                }
                BuiltinSemantic::NotBuiltin => match sem {
                    Semantic::Target(index) => {
                        let global_name = format!("{}{}", self.options.prefix, ident);
                        writeln!(
                            self.out,
                            "layout(location = {index}) {} {} {};",
                            io_qual(is_out),
                            self.emit_type(&ty),
                            global_name
                        )
                        .unwrap();
                        self.entry_renames.insert(ident, global_name);
                    }
                    _ => {
                        let global_name = format!("{}{}", self.options.prefix, ident);
                        writeln!(self.out, "{} {} {};", io_qual(is_out), self.emit_type(&ty), global_name).unwrap();
                        self.entry_renames.insert(ident, global_name);
                    }
                },
            },
            None => {
                let global_name = format!("{}{}", self.options.prefix, ident);
                writeln!(self.out, "{} {} {};", io_qual(is_out), self.emit_type(&ty), global_name).unwrap();
                self.entry_renames.insert(ident, global_name);
            }
        }
    }

    fn type_of_var(&self, vd: Id<VarDecl>) -> TypeDenoter {
        let spec = self.program.var_decls[vd].type_specifier;
        self.program.type_specifiers[spec].denoter.clone().unwrap_or(TypeDenoter::Error)
    }

    // -----------------------------------------------------------------
    // Global declarations
    // -----------------------------------------------------------------

    fn emit_global(&mut self, g: GlobalDecl) {
        match g {
            GlobalDecl::Var(s) => self.emit_var_decl_stmnt(s, true),
            GlobalDecl::Buffer(s) => self.emit_buffer_decl_stmnt(s),
            GlobalDecl::Sampler(s) => self.emit_sampler_decl_stmnt(s),
            GlobalDecl::Struct(s) => self.emit_struct_decl(self.program.struct_decl_stmnts[s].struct_decl),
            GlobalDecl::Alias(_) => {}
            GlobalDecl::Function(f) => self.emit_function(f),
        }
    }

    fn emit_struct_decl(&mut self, id: Id<StructDecl>) {
        let ident = self.program.struct_decls[id].ident.clone();
        writeln!(self.out, "struct {} {{", ident).unwrap();
        self.indent += 1;
        let members = self.program.struct_decls[id].members.clone();
        for m in members {
            self.emit_var_decl_stmnt(m, false);
        }
        self.indent -= 1;
        writeln!(self.out, "}};").unwrap();
    }

    fn emit_var_decl_stmnt(&mut self, id: Id<VarDeclStmnt>, top_level: bool) {
        let ty = self.program.type_specifiers[self.program.var_decl_stmnts[id].type_specifier]
            .denoter
            .clone()
            .unwrap_or(TypeDenoter::Error);
        let var_decls = self.program.var_decl_stmnts[id].var_decls.clone();
        for vd in var_decls {
            self.indented();
            let qualifier = if top_level && self.program.var_decls[vd].is_uniform { "uniform " } else { "" };
            let ident = self.program.var_decls[vd].ident.clone();
            write!(self.out, "{}{} {}", qualifier, self.emit_type(&ty), ident).unwrap();
            let array_dims = self.program.var_decls[vd].array_dims.clone();
            for dim in array_dims {
                write!(self.out, "[{}]", self.render_expr(dim)).unwrap();
            }
            if let Some(init) = self.program.var_decls[vd].initializer {
                write!(self.out, " = {}", self.render_expr(init)).unwrap();
            }
            writeln!(self.out, ";").unwrap();
        }
    }

    fn emit_buffer_decl_stmnt(&mut self, id: Id<BufferDeclStmnt>) {
        let decls = self.program.buffer_decl_stmnts[id].buffer_decls.clone();
        for b in decls {
            let ident = self.program.buffer_decls[b].ident.clone();
            let register = self.program.buffer_decls[b].register;
            let binding = register.map(|r| r.slot).unwrap_or(0);
            if self.options.collect_statistics {
                self.statistics
                    .uniform_buffer_bindings
                    .push(UniformBufferBinding { name: ident.clone(), binding_index: binding });
            }
            let ty = self.program.buffer_decls[b].ty.clone();
            match &ty {
                TypeDenoter::Buffer { kind: BufferKind::Constant, struct_ref: Some(sref), .. } => {
                    writeln!(self.out, "layout(binding = {binding}, std140) uniform {}Block {{", ident).unwrap();
                    self.indent += 1;
                    let members = self.program.struct_decls[*sref].members.clone();
                    for m in members {
                        self.emit_var_decl_stmnt(m, false);
                    }
                    self.indent -= 1;
                    writeln!(self.out, "}} {};", ident).unwrap();
                }
                TypeDenoter::Buffer { kind: BufferKind::StructuredReadOnly, generic, .. } => {
                    let elem = generic.as_deref().cloned().unwrap_or(TypeDenoter::Error);
                    writeln!(self.out, "layout(binding = {binding}, std430) readonly buffer {}Block {{", ident).unwrap();
                    writeln!(self.out, "    {} {}[];", self.emit_type(&elem), ident).unwrap();
                    writeln!(self.out, "}};").unwrap();
                }
                TypeDenoter::Buffer { kind: BufferKind::StructuredReadWrite, generic, .. } => {
                    let elem = generic.as_deref().cloned().unwrap_or(TypeDenoter::Error);
                    writeln!(self.out, "layout(binding = {binding}, std430) buffer {}Block {{", ident).unwrap();
                    writeln!(self.out, "    {} {}[];", self.emit_type(&elem), ident).unwrap();
                    writeln!(self.out, "}};").unwrap();
                }
                TypeDenoter::Buffer { kind: BufferKind::Image { .. }, .. } => {
                    if self.options.collect_statistics {
                        self.statistics
                            .texture_bindings
                            .push(TextureBinding { name: ident.clone(), binding_index: binding });
                    }
                    writeln!(self.out, "layout(binding = {binding}, rgba32f) uniform {} {};", self.emit_type(&ty), ident).unwrap();
                }
                TypeDenoter::Buffer { kind: BufferKind::TexelBuffer, .. } => {
                    if self.options.collect_statistics {
                        self.statistics
                            .texture_bindings
                            .push(TextureBinding { name: ident.clone(), binding_index: binding });
                    }
                    writeln!(self.out, "layout(binding = {binding}) uniform {} {};", self.emit_type(&ty), ident).unwrap();
                }
                _ => {
                    writeln!(self.out, "uniform {} {};", self.emit_type(&ty), ident).unwrap();
                }
            }
        }
    }

    fn emit_sampler_decl_stmnt(&mut self, id: Id<SamplerDeclStmnt>) {
        let decls = self.program.sampler_decl_stmnts[id].sampler_decls.clone();
        for s in decls {
            let ident = self.program.sampler_decls[s].ident.clone();
            let ty = self.program.sampler_decls[s].ty.clone();
            let binding = self.program.sampler_decls[s].register.map(|r| r.slot).unwrap_or(0);
            if self.options.collect_statistics {
                self.statistics.texture_bindings.push(TextureBinding { name: ident.clone(), binding_index: binding });
            }
            writeln!(self.out, "layout(binding = {binding}) uniform {} {};", self.emit_type(&ty), ident).unwrap();
        }
    }

    fn emit_function(&mut self, id: Id<FunctionDecl>) {
        let is_entry = Some(id) == self.program.entry_point;
        let name: String = if is_entry { "main".to_string() } else { self.program.function_decls[id].ident.to_string() };
        let ret_spec = self.program.function_decls[id].return_type;
        let mut ret_ty = self.program.type_specifiers[ret_spec].denoter.clone().unwrap_or(TypeDenoter::Void);
        let return_semantic = self.program.function_decls[id].return_semantic.clone();

        if is_entry && return_semantic.is_some() {
            // A non-void entry point with a return semantic is lowered to a
            // void `main` that assigns the builtin instead of returning.
            ret_ty = TypeDenoter::Void;
        }

        if is_entry {
            writeln!(self.out, "void main() {{").unwrap();
        } else {
            let params = self.program.function_decls[id].parameters.clone();
            let param_strs: Vec<String> = params
                .iter()
                .flat_map(|&p| self.program.var_decl_stmnts[p].var_decls.clone())
                .map(|vd| {
                    let ty = self.type_of_var(vd);
                    let qual = if self.program.var_decls[vd].is_out_param { "out " } else { "" };
                    format!("{}{} {}", qual, self.emit_type(&ty), self.program.var_decls[vd].ident)
                })
                .collect();
            writeln!(self.out, "{} {}({}) {{", self.emit_type(&ret_ty), name, param_strs.join(", ")).unwrap();
        }

        self.indent += 1;
        let entry_return_builtin = if is_entry {
            return_semantic.and_then(|s| match builtin_semantic(s.semantic, self.stage, true) {
                BuiltinSemantic::Name(name) => Some(name),
                BuiltinSemantic::WrongDirectionOrStage => {
                    self.reports.push(Report::error(
                        Category::SemanticMapping,
                        format!(
                            "semantic `{:?}` cannot be bound to the return value of a {:?}-stage entry point",
                            s.semantic, self.stage
                        ),
                    ));
                    None
                }
                BuiltinSemantic::NotBuiltin => None,
            })
        } else {
            None
        };
        let block = self.program.function_decls[id].code_block;
        let stmnts = self.program.code_blocks[block].stmnts.clone();
        for s in stmnts {
            self.emit_stmnt(s, entry_return_builtin);
        }
        if !self.program.function_decls[id].flags.contains(NodeFlags::IS_END_OF_FUNCTION) {
            self.indented();
            writeln!(self.out, "return;").unwrap();
        }
        self.indent -= 1;
        writeln!(self.out, "}}").unwrap();
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn emit_stmnt(&mut self, id: Id<Stmnt>, entry_return_builtin: Option<&'static str>) {
        match self.program.stmnts[id].clone() {
            Stmnt::Null => {}
            Stmnt::CodeBlock(block) => {
                self.indented();
                writeln!(self.out, "{{").unwrap();
                self.indent += 1;
                let stmnts = self.program.code_blocks[block].stmnts.clone();
                for s in stmnts {
                    self.emit_stmnt(s, entry_return_builtin);
                }
                self.indent -= 1;
                self.indented();
                writeln!(self.out, "}}").unwrap();
            }
            Stmnt::For { init, condition, iteration, body } => {
                self.indented();
                write!(self.out, "for (").unwrap();
                if let Some(i) = init {
                    write!(self.out, "{}", self.render_stmnt_inline(i)).unwrap();
                }
                write!(self.out, "; ").unwrap();
                if let Some(c) = condition {
                    write!(self.out, "{}", self.render_expr(c)).unwrap();
                }
                write!(self.out, "; ").unwrap();
                if let Some(it) = iteration {
                    write!(self.out, "{}", self.render_expr(it)).unwrap();
                }
                writeln!(self.out, ")").unwrap();
                self.emit_body(body, entry_return_builtin);
            }
            Stmnt::While { condition, body } => {
                self.indented();
                writeln!(self.out, "while ({})", self.render_expr(condition)).unwrap();
                self.emit_body(body, entry_return_builtin);
            }
            Stmnt::DoWhile { body, condition } => {
                self.indented();
                writeln!(self.out, "do").unwrap();
                self.emit_body(body, entry_return_builtin);
                self.indented();
                writeln!(self.out, "while ({});", self.render_expr(condition)).unwrap();
            }
            Stmnt::If { condition, then_body, else_body } => {
                self.indented();
                writeln!(self.out, "if ({})", self.render_expr(condition)).unwrap();
                self.emit_body(then_body, entry_return_builtin);
                if let Some(e) = else_body {
                    self.indented();
                    writeln!(self.out, "else").unwrap();
                    self.emit_body(e, entry_return_builtin);
                }
            }
            Stmnt::Switch { selector, cases } => {
                self.indented();
                writeln!(self.out, "switch ({}) {{", self.render_expr(selector)).unwrap();
                self.indent += 1;
                for case in cases {
                    self.indented();
                    match case.expr {
                        Some(e) => writeln!(self.out, "case {}:", self.render_expr(e)).unwrap(),
                        None => writeln!(self.out, "default:").unwrap(),
                    }
                    self.indent += 1;
                    for s in case.stmnts {
                        self.emit_stmnt(s, entry_return_builtin);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.indented();
                writeln!(self.out, "}}").unwrap();
            }
            Stmnt::Expr { expr } => {
                self.indented();
                writeln!(self.out, "{};", self.render_expr(expr)).unwrap();
            }
            Stmnt::Return { expr, flags } => {
                self.indented();
                let is_end_of_function = flags.contains(NodeFlags::IS_END_OF_FUNCTION);
                match (expr, entry_return_builtin) {
                    (Some(e), Some(builtin)) => {
                        writeln!(self.out, "{} = {};", builtin, self.render_expr(e)).unwrap();
                        if !is_end_of_function {
                            self.indented();
                            writeln!(self.out, "return;").unwrap();
                        }
                    }
                    (Some(e), None) => writeln!(self.out, "return {};", self.render_expr(e)).unwrap(),
                    (None, _) => writeln!(self.out, "return;").unwrap(),
                }
            }
            Stmnt::CtrlTransfer(t) => {
                self.indented();
                let kw = match t {
                    CtrlTransfer::Break => "break",
                    CtrlTransfer::Continue => "continue",
                    CtrlTransfer::Discard => "discard",
                };
                writeln!(self.out, "{};", kw).unwrap();
            }
            Stmnt::VarDecl(s) => self.emit_var_decl_stmnt(s, false),
        }
    }

    fn emit_body(&mut self, id: Id<Stmnt>, entry_return_builtin: Option<&'static str>) {
        if matches!(self.program.stmnts[id], Stmnt::CodeBlock(_)) {
            self.emit_stmnt(id, entry_return_builtin);
        } else {
            self.indent += 1;
            self.emit_stmnt(id, entry_return_builtin);
            self.indent -= 1;
        }
    }

    fn render_stmnt_inline(&mut self, id: Id<Stmnt>) -> String {
        match self.program.stmnts[id].clone() {
            Stmnt::Expr { expr } => self.render_expr(expr),
            Stmnt::VarDecl(s) => {
                let ty = self.program.type_specifiers[self.program.var_decl_stmnts[s].type_specifier]
                    .denoter
                    .clone()
                    .unwrap_or(TypeDenoter::Error);
                let mut parts = Vec::new();
                for vd in self.program.var_decl_stmnts[s].var_decls.clone() {
                    let ident = self.program.var_decls[vd].ident.clone();
                    match self.program.var_decls[vd].initializer {
                        Some(init) => parts.push(format!("{} {} = {}", self.emit_type(&ty), ident, self.render_expr(init))),
                        None => parts.push(format!("{} {}", self.emit_type(&ty), ident)),
                    }
                }
                parts.join(", ")
            }
            _ => String::new(),
        }
    }

    fn indented(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    /// `Expr` carries no blanket `Clone` impl (its `TypeCache` is mutated
    /// in place by other passes), so each arm first lifts out an owned
    /// snapshot of the fields this renders and only then recurses — that
    /// way the borrow of `self.program.exprs` never overlaps a recursive
    /// `&mut self` call.
    fn render_expr(&mut self, id: Id<Expr>) -> String {
        let snapshot = match &self.program.exprs[id] {
            Expr::Null => ExprSnapshot::Null,
            Expr::Literal { value, .. } => ExprSnapshot::Literal(value.clone()),
            Expr::Identifier { ident, .. } => ExprSnapshot::Identifier(ident.clone()),
            Expr::ObjectAccess { prefix, ident, .. } => ExprSnapshot::ObjectAccess(*prefix, ident.clone()),
            Expr::ArrayIndex { prefix, indices, .. } => ExprSnapshot::ArrayIndex(*prefix, indices.clone()),
            Expr::Call { prefix, arguments, call_ref, .. } => {
                ExprSnapshot::Call(*prefix, arguments.clone(), *call_ref)
            }
            Expr::Cast { type_specifier, expr, .. } => ExprSnapshot::Cast(*type_specifier, *expr),
            Expr::Bracket { expr, .. } => ExprSnapshot::Bracket(*expr),
            Expr::Unary { op, expr, .. } => ExprSnapshot::Unary(*op, *expr),
            Expr::PostUnary { op, expr, .. } => ExprSnapshot::PostUnary(*op, *expr),
            Expr::Binary { op, lhs, rhs, .. } => ExprSnapshot::Binary(*op, *lhs, *rhs),
            Expr::Ternary { condition, then_expr, else_expr, .. } => {
                ExprSnapshot::Ternary(*condition, *then_expr, *else_expr)
            }
            Expr::Assignment { op, lvalue, rvalue, .. } => ExprSnapshot::Assignment(*op, *lvalue, *rvalue),
            Expr::Sequence { exprs, .. } => ExprSnapshot::Sequence(exprs.clone()),
            Expr::InitializerList { exprs, .. } => ExprSnapshot::InitializerList(exprs.clone()),
            Expr::TypeSpecifier { type_specifier, .. } => ExprSnapshot::TypeSpecifier(*type_specifier),
        };

        match snapshot {
            ExprSnapshot::Null => String::new(),
            ExprSnapshot::Literal(value) => match value {
                Literal::Bool(b) => b.to_string(),
                Literal::Int(i) => i.to_string(),
                Literal::UInt(u) => format!("{}u", u),
                Literal::Float(f) => {
                    if f.fract() == 0.0 {
                        format!("{:.1}", f)
                    } else {
                        f.to_string()
                    }
                }
                Literal::String(s) => format!("\"{}\"", s),
            },
            ExprSnapshot::Identifier(ident) => self.rename(&ident),
            ExprSnapshot::ObjectAccess(prefix, ident) => format!("{}.{}", self.render_expr(prefix), ident),
            ExprSnapshot::ArrayIndex(prefix, indices) => {
                let mut s = self.render_expr(prefix);
                for i in indices {
                    write!(s, "[{}]", self.render_expr(i)).unwrap();
                }
                s
            }
            ExprSnapshot::Call(prefix, arguments, call_ref) => self.render_call(prefix, arguments, call_ref),
            ExprSnapshot::Cast(type_specifier, expr) => {
                let ty = self.program.type_specifiers[type_specifier].denoter.clone().unwrap_or(TypeDenoter::Error);
                format!("{}({})", self.emit_type(&ty), self.render_expr(expr))
            }
            ExprSnapshot::Bracket(expr) => format!("({})", self.render_expr(expr)),
            ExprSnapshot::Unary(op, expr) => format!("{}{}", unary_op_str(op), self.render_expr(expr)),
            ExprSnapshot::PostUnary(op, expr) => {
                format!("{}{}", self.render_expr(expr), post_unary_op_str(op))
            }
            ExprSnapshot::Binary(op, lhs, rhs) => {
                format!("{} {} {}", self.render_expr(lhs), binary_op_str(op), self.render_expr(rhs))
            }
            ExprSnapshot::Ternary(condition, then_expr, else_expr) => {
                format!("{} ? {} : {}", self.render_expr(condition), self.render_expr(then_expr), self.render_expr(else_expr))
            }
            ExprSnapshot::Assignment(op, lvalue, rvalue) => {
                format!("{} {} {}", self.render_expr(lvalue), assign_op_str(op), self.render_expr(rvalue))
            }
            ExprSnapshot::Sequence(exprs) => {
                exprs.into_iter().map(|e| self.render_expr(e)).collect::<Vec<_>>().join(", ")
            }
            ExprSnapshot::InitializerList(exprs) => {
                format!("{{ {} }}", exprs.into_iter().map(|e| self.render_expr(e)).collect::<Vec<_>>().join(", "))
            }
            ExprSnapshot::TypeSpecifier(type_specifier) => {
                let ty = self.program.type_specifiers[type_specifier].denoter.clone().unwrap_or(TypeDenoter::Error);
                self.emit_type(&ty)
            }
        }
    }

    fn render_call(&mut self, prefix: Id<Expr>, arguments: Vec<Id<Expr>>, call_ref: Option<CallRef>) -> String {
        let args: Vec<String> = arguments.iter().map(|&a| self.render_expr(a)).collect();
        match call_ref {
            Some(CallRef::Intrinsic(Intrinsic::Saturate)) => {
                format!("clamp({}, 0.0, 1.0)", args.join(", "))
            }
            Some(CallRef::Intrinsic(Intrinsic::SinCos)) => {
                let s = args.first().cloned().unwrap_or_default();
                let sin_out = args.get(1).cloned().unwrap_or_default();
                let cos_out = args.get(2).cloned().unwrap_or_default();
                format!("/* sincos */ {sin_out} = sin({s}), {cos_out} = cos({s})")
            }
            Some(CallRef::Intrinsic(intrinsic)) => match self.keywords.lookup(intrinsic) {
                Some(name) => format!("{}({})", name, args.join(", ")),
                None => {
                    self.reports.push(Report::error(
                        Category::SemanticMapping,
                        format!("intrinsic `{}` has no mapping in the target dialect", intrinsic),
                    ));
                    format!("{}({})", intrinsic, args.join(", "))
                }
            },
            Some(CallRef::TypeConstructor) => {
                let name = self.render_expr(prefix);
                format!("{}({})", name, args.join(", "))
            }
            Some(CallRef::Function(f)) => {
                let name = if Some(f) == self.program.entry_point {
                    "main".to_string()
                } else {
                    self.program.function_decls[f].ident.to_string()
                };
                format!("{}({})", name, args.join(", "))
            }
            None => format!("{}({})", self.render_expr(prefix), args.join(", ")),
        }
    }

    fn rename(&self, ident: &SmolStr) -> String {
        self.entry_renames.get(ident).cloned().unwrap_or_else(|| ident.to_string())
    }

    // -----------------------------------------------------------------
    // Type rendering
    // -----------------------------------------------------------------

    fn emit_type(&self, ty: &TypeDenoter) -> String {
        match ty {
            TypeDenoter::Void => "void".to_string(),
            TypeDenoter::Error => "/* error */".to_string(),
            TypeDenoter::Base { .. } | TypeDenoter::Sampler { .. } => ty.to_string(&self.program.alias_decls),
            TypeDenoter::Struct { name, .. } => name.to_string(),
            TypeDenoter::Alias { decl_ref, .. } => {
                self.emit_type(&self.program.alias_decls[*decl_ref].aliased_type.clone())
            }
            TypeDenoter::Array { sub, dims } => {
                let mut s = self.emit_type(sub);
                for &d in dims {
                    if d == 0 {
                        s.push_str("[]");
                    } else {
                        write!(s, "[{d}]").unwrap();
                    }
                }
                s
            }
            TypeDenoter::Buffer { kind, generic, .. } => self.emit_buffer_type(kind, generic.as_deref()),
        }
    }

    fn emit_buffer_type(&self, kind: &BufferKind, generic: Option<&TypeDenoter>) -> String {
        match kind {
            BufferKind::Image { dim, array } => {
                format!("image{}{}", image_dim_str(*dim), if *array { "Array" } else { "" })
            }
            BufferKind::TexelBuffer => "samplerBuffer".to_string(),
            BufferKind::StructuredReadOnly | BufferKind::StructuredReadWrite => {
                generic.map(|g| self.emit_type(g)).unwrap_or_else(|| "float".to_string())
            }
            BufferKind::Constant => "/* cbuffer */".to_string(),
        }
    }
}

fn io_qual(is_out: bool) -> &'static str {
    if is_out {
        "out"
    } else {
        "in"
    }
}

fn image_dim_str(dim: ImageDimension) -> &'static str {
    match dim {
        ImageDimension::Dim1D => "1D",
        ImageDimension::Dim2D => "2D",
        ImageDimension::Dim3D => "3D",
        ImageDimension::Cube => "Cube",
    }
}

fn unary_op_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Negate => "-",
        UnaryOp::LogicalNot => "!",
        UnaryOp::BitNot => "~",
    }
}

fn post_unary_op_str(op: PostUnaryOp) -> &'static str {
    match op {
        PostUnaryOp::Increment => "++",
        PostUnaryOp::Decrement => "--",
    }
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::LogicalAnd => "&&",
        BinaryOp::LogicalOr => "||",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

fn assign_op_str(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Set => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Mod => "%=",
        AssignOp::BitAnd => "&=",
        AssignOp::BitOr => "|=",
        AssignOp::BitXor => "^=",
        AssignOp::Shl => "<<=",
        AssignOp::Shr => ">>=",
    }
}
