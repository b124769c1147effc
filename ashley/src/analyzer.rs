//! Semantic decoration pass (§4.1): name binding, type inference, implicit
//! cast validation, overload resolution and constant evaluation. Grounded
//! on `Analyzer.cpp`'s single forward walk with a scope opened at every
//! code block/function/struct/uniform-buffer boundary.
//!
//! Declarations are analyzed in three sub-passes over `Program::globals` so
//! that a function body can reference a struct, alias, buffer or sibling
//! function declared later in the source — `Analyzer::DecorateAST` in the
//! original hoists type and signature declarations ahead of body analysis
//! for the same reason. Semantic errors never unwind: every `analyze_*`
//! method pushes to `self.reports` and returns a best-effort `TypeDenoter`
//! (usually `TypeDenoter::Error`) so the caller can keep going, per §7's
//! "continue analyzing siblings" propagation policy. Only a genuine
//! internal-consistency violation (an `Id` that doesn't resolve, a stack
//! underflow) panics — those are bugs in this crate, not in the shader
//! source being compiled.

use crate::ast::*;
use crate::diagnostics::{Category, Report, ReportHandler};
use crate::intrinsics::Intrinsic;
use crate::symbol_table::{AlreadyDeclared, Binding, SymbolTable};
use smallvec::SmallVec;
use smol_str::SmolStr;

mod const_eval;
pub use const_eval::{evaluate_const, ConstValue};

pub struct Analyzer<'p> {
    program: &'p mut Program,
    symbols: SymbolTable,
    reports: ReportHandler,
    function_stack: Vec<Id<FunctionDecl>>,
    struct_stack: Vec<Id<StructDecl>>,
}

/// Runs the full decoration pass over `program` and reports whether any
/// error-severity [`Report`] was produced.
pub fn analyze(program: &mut Program) -> (bool, ReportHandler) {
    let span = tracing::debug_span!("analyze", globals = program.globals.len());
    let _enter = span.enter();

    let mut analyzer = Analyzer::new(program);
    analyzer.run();
    let had_errors = analyzer.reports.had_errors();
    tracing::trace!(reports = analyzer.reports.reports().len(), had_errors, "decoration complete");
    (had_errors, analyzer.reports)
}

impl<'p> Analyzer<'p> {
    pub fn new(program: &'p mut Program) -> Analyzer<'p> {
        Analyzer {
            program,
            symbols: SymbolTable::new(),
            reports: ReportHandler::new(),
            function_stack: Vec::new(),
            struct_stack: Vec::new(),
        }
    }

    fn run(&mut self) {
        let globals = self.program.globals.clone();

        // Pass 1: struct and alias declarations, since other declarations'
        // type specifiers may name them.
        for g in &globals {
            match *g {
                GlobalDecl::Struct(s) => self.analyze_struct_decl_stmnt(s),
                GlobalDecl::Alias(a) => self.analyze_alias_decl_stmnt(a),
                _ => {}
            }
        }
        // Pass 2: buffers, samplers, global variables, function signatures.
        for g in &globals {
            match *g {
                GlobalDecl::Buffer(b) => self.analyze_buffer_decl_stmnt(b),
                GlobalDecl::Sampler(s) => self.analyze_sampler_decl_stmnt(s),
                GlobalDecl::Var(v) => self.analyze_var_decl_stmnt(v),
                GlobalDecl::Function(f) => self.declare_function_signature(f),
                _ => {}
            }
        }
        // Pass 3: function bodies.
        for g in &globals {
            if let GlobalDecl::Function(f) = *g {
                tracing::trace!(function = %self.program.function_decls[f].ident, "decorating function body");
                self.analyze_function_body(f);
            }
        }
    }

    pub fn into_reports(self) -> ReportHandler {
        self.reports
    }

    // -----------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------

    fn analyze_struct_decl_stmnt(&mut self, id: Id<StructDeclStmnt>) {
        let struct_decl = self.program.struct_decl_stmnts[id].struct_decl;
        let ident = self.program.struct_decls[struct_decl].ident.clone();
        if let Err(_) = self.symbols.declare(ident.clone(), Binding::Struct(struct_decl)) {
            self.report_redeclaration(&ident, self.program.struct_decls[struct_decl].span);
        }
        let members = self.program.struct_decls[struct_decl].members.clone();
        self.symbols.push_scope();
        self.struct_stack.push(struct_decl);
        for m in members {
            self.analyze_var_decl_stmnt(m);
        }
        self.struct_stack.pop();
        self.symbols.pop_scope();
    }

    fn analyze_alias_decl_stmnt(&mut self, id: Id<AliasDeclStmnt>) {
        let decls = self.program.alias_decl_stmnts[id].alias_decls.clone();
        for a in decls {
            let ident = self.program.alias_decls[a].ident.clone();
            if let Err(_) = self.symbols.declare(ident.clone(), Binding::Alias(a)) {
                self.report_redeclaration(&ident, self.program.alias_decls[a].span);
            }
        }
    }

    fn analyze_buffer_decl_stmnt(&mut self, id: Id<BufferDeclStmnt>) {
        let decls = self.program.buffer_decl_stmnts[id].buffer_decls.clone();
        for b in decls {
            let ident = self.program.buffer_decls[b].ident.clone();
            if let Err(_) = self.symbols.declare(ident.clone(), Binding::Buffer(b)) {
                self.report_redeclaration(&ident, self.program.buffer_decls[b].span);
            }
        }
    }

    fn analyze_sampler_decl_stmnt(&mut self, id: Id<SamplerDeclStmnt>) {
        let decls = self.program.sampler_decl_stmnts[id].sampler_decls.clone();
        for s in decls {
            let ident = self.program.sampler_decls[s].ident.clone();
            if let Err(_) = self.symbols.declare(ident.clone(), Binding::Sampler(s)) {
                self.report_redeclaration(&ident, self.program.sampler_decls[s].span);
            }
        }
    }

    fn analyze_var_decl_stmnt(&mut self, id: Id<VarDeclStmnt>) {
        let type_spec = self.program.var_decl_stmnts[id].type_specifier;
        let declared_ty = self.resolve_type_specifier(type_spec);
        let var_decls = self.program.var_decl_stmnts[id].var_decls.clone();
        for vd in var_decls {
            self.analyze_var_decl(vd, &declared_ty);
        }
    }

    fn analyze_var_decl(&mut self, id: Id<VarDecl>, declared_ty: &TypeDenoter) {
        let ident = self.program.var_decls[id].ident.clone();
        let span = self.program.var_decls[id].span;
        let is_parameter = self.program.var_decls[id].is_parameter;
        let is_uniform = self.program.var_decls[id].is_uniform;
        let is_out_param = self.program.var_decls[id].is_out_param;

        if is_out_param && is_uniform {
            self.reports.push(
                Report::error(
                    Category::TypeError,
                    format!("parameter `{}` cannot be both `out` and `uniform`", ident),
                )
                .with_area(span),
            );
        }

        let ty = self.var_decl_full_type(id, declared_ty);

        if let Some(init) = self.program.var_decls[id].initializer {
            let init_ty = self.analyze_expr(init);
            if !init_ty.is_castable_to(&ty, &self.program.alias_decls) {
                self.report_bad_cast(&init_ty, &ty, span, "variable initializer");
            }
        }

        if !is_parameter {
            if let Err(AlreadyDeclared { .. }) = self.symbols.declare(ident.clone(), Binding::Var(id)) {
                self.report_redeclaration(&ident, span);
            }
        } else {
            // Parameters shadow freely; a duplicate parameter name in the
            // same signature is still worth flagging.
            let _ = self.symbols.declare(ident.clone(), Binding::Var(id));
        }
        let _ = ty;
    }

    /// The full type of a declarator: its declared type plus any array
    /// dimensions written on this particular declarator (`float a[3], b;`
    /// gives `a` an array type and `b` a plain one even though they share a
    /// type specifier).
    fn var_decl_full_type(&mut self, id: Id<VarDecl>, declared_ty: &TypeDenoter) -> TypeDenoter {
        let dims = self.program.var_decls[id].array_dims.clone();
        if dims.is_empty() {
            return declared_ty.clone();
        }
        let dims: SmallVec<[u32; 2]> = dims.iter().map(|&e| self.eval_array_dim(e)).collect();
        TypeDenoter::Array { sub: Box::new(declared_ty.clone()), dims }
    }

    fn eval_array_dim(&mut self, expr: Id<Expr>) -> u32 {
        match const_eval::evaluate_const(self.program, expr) {
            Ok(ConstValue::Int(n)) if n >= 0 => n as u32,
            Ok(ConstValue::Int(_)) => {
                self.reports.push(Report::error(Category::TypeError, "array dimension must not be negative"));
                0
            }
            _ => {
                self.reports
                    .push(Report::error(Category::TypeError, "expected constant expression for array dimension"));
                0
            }
        }
    }

    fn declare_function_signature(&mut self, id: Id<FunctionDecl>) {
        let ident = self.program.function_decls[id].ident.clone();
        self.symbols.declare_function(ident, id);
    }

    fn analyze_function_body(&mut self, id: Id<FunctionDecl>) {
        let return_type_spec = self.program.function_decls[id].return_type;
        self.resolve_type_specifier(return_type_spec);

        self.function_stack.push(id);
        self.symbols.push_scope();

        let struct_ref = self.program.function_decls[id].struct_decl_ref;
        if let Some(sid) = struct_ref {
            self.struct_stack.push(sid);
        }

        let params = self.program.function_decls[id].parameters.clone();
        for p in params {
            let p_ty_spec = self.program.var_decl_stmnts[p].type_specifier;
            let p_ty = self.resolve_type_specifier(p_ty_spec);
            let decls = self.program.var_decl_stmnts[p].var_decls.clone();
            for vd in decls {
                self.analyze_var_decl(vd, &p_ty);
            }
        }

        let block = self.program.function_decls[id].code_block;
        self.analyze_code_block(block);

        if let Some(_) = struct_ref {
            self.struct_stack.pop();
        }
        let released = self.symbols.pop_scope();
        self.warn_unused(released);
        self.function_stack.pop();

        self.mark_control_paths(id);
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn analyze_code_block(&mut self, id: Id<CodeBlock>) {
        self.symbols.push_scope();
        let stmnts = self.program.code_blocks[id].stmnts.clone();
        for s in stmnts {
            self.analyze_stmnt(s);
        }
        let released = self.symbols.pop_scope();
        self.warn_unused(released);
    }

    fn analyze_stmnt(&mut self, id: Id<Stmnt>) {
        // Grab a variant-shaped snapshot of the ids we need, since `Stmnt`
        // doesn't implement `Copy` and we need `&mut self` for recursion.
        match self.program.stmnts[id] {
            Stmnt::Null | Stmnt::CtrlTransfer(_) => {}
            Stmnt::CodeBlock(block) => self.analyze_code_block(block),
            Stmnt::For { init, condition, iteration, body } => {
                self.symbols.push_scope();
                if let Some(init) = init {
                    self.analyze_stmnt(init);
                }
                if let Some(cond) = condition {
                    self.require_scalar_condition(cond);
                }
                if let Some(it) = iteration {
                    self.analyze_expr(it);
                }
                self.analyze_stmnt(body);
                let released = self.symbols.pop_scope();
                self.warn_unused(released);
            }
            Stmnt::While { condition, body } => {
                self.require_scalar_condition(condition);
                self.analyze_stmnt(body);
            }
            Stmnt::DoWhile { body, condition } => {
                self.analyze_stmnt(body);
                self.require_scalar_condition(condition);
            }
            Stmnt::If { condition, then_body, else_body } => {
                self.require_scalar_condition(condition);
                self.analyze_stmnt(then_body);
                if let Some(e) = else_body {
                    self.analyze_stmnt(e);
                }
            }
            Stmnt::Switch { selector, .. } => {
                self.analyze_expr(selector);
                let cases = match &self.program.stmnts[id] {
                    Stmnt::Switch { cases, .. } => cases.iter().map(|c| (c.expr, c.stmnts.clone())).collect::<Vec<_>>(),
                    _ => unreachable!(),
                };
                for (expr, stmnts) in cases {
                    if let Some(e) = expr {
                        self.analyze_expr(e);
                    }
                    for s in stmnts {
                        self.analyze_stmnt(s);
                    }
                }
            }
            Stmnt::Expr { expr } => {
                self.analyze_expr(expr);
            }
            Stmnt::Return { expr, .. } => {
                let ret_ty = self.current_return_type();
                match expr {
                    Some(e) => {
                        let ty = self.analyze_expr(e);
                        if !ty.is_castable_to(&ret_ty, &self.program.alias_decls) {
                            self.report_bad_cast(&ty, &ret_ty, SourceSpan::default(), "return statement");
                        }
                    }
                    None => {
                        if !matches!(ret_ty, TypeDenoter::Void) {
                            self.reports.push(Report::error(
                                Category::TypeError,
                                "missing return value in non-void function",
                            ));
                        }
                    }
                }
            }
            Stmnt::VarDecl(stmnt) => self.analyze_var_decl_stmnt(stmnt),
        }
    }

    fn require_scalar_condition(&mut self, cond: Id<Expr>) {
        let ty = self.analyze_expr(cond);
        let ok = ty.is_scalar() || matches!(ty, TypeDenoter::Error);
        if !ok {
            self.reports.push(Report::error(
                Category::TypeError,
                format!("condition must be scalar bool, got `{}`", ty.to_string(&self.program.alias_decls)),
            ));
        }
    }

    fn current_return_type(&mut self) -> TypeDenoter {
        match self.function_stack.last() {
            Some(&f) => {
                let spec = self.program.function_decls[f].return_type;
                self.resolve_type_specifier(spec)
            }
            None => TypeDenoter::Error,
        }
    }

    fn warn_unused(&mut self, released: Vec<(SmolStr, Binding)>) {
        for (name, binding) in released {
            if let Binding::Var(id) = binding {
                let var = &self.program.var_decls[id];
                let exempt = var.flags.contains(NodeFlags::IS_READ_FROM)
                    || var.flags.contains(NodeFlags::IS_STATIC)
                    || var.is_parameter
                    || var.is_uniform;
                if !exempt {
                    self.reports.push(
                        Report::warning(Category::UnusedVariable, format!("unused variable `{}`", name))
                            .with_area(var.span),
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    pub fn analyze_expr(&mut self, id: Id<Expr>) -> TypeDenoter {
        if let Some(ty) = self.program.cached_expr_type(id) {
            return ty;
        }
        let ty = self.infer_expr(id);
        self.program.set_cached_expr_type(id, ty.clone());
        ty
    }

    fn infer_expr(&mut self, id: Id<Expr>) -> TypeDenoter {
        // Split the match into a read of the shape we need, since most
        // arms need `&mut self` to recurse.
        enum Shape {
            Null,
            Literal(Literal),
            ObjectAccess { prefix: Id<Expr>, ident: SmolStr },
            ArrayIndex { prefix: Id<Expr>, indices: Vec<Id<Expr>> },
            Call { prefix: Id<Expr>, arguments: Vec<Id<Expr>> },
            Cast { type_specifier: Id<TypeSpecifier>, expr: Id<Expr> },
            Bracket { expr: Id<Expr> },
            Unary { op: UnaryOp, expr: Id<Expr> },
            PostUnary { expr: Id<Expr> },
            Binary { op: BinaryOp, lhs: Id<Expr>, rhs: Id<Expr> },
            Ternary { condition: Id<Expr>, then_expr: Id<Expr>, else_expr: Id<Expr> },
            Assignment { op: AssignOp, lvalue: Id<Expr>, rvalue: Id<Expr> },
            Sequence { exprs: Vec<Id<Expr>> },
            InitializerList { exprs: Vec<Id<Expr>> },
            TypeSpecifierExpr { type_specifier: Id<TypeSpecifier> },
            Identifier { ident: SmolStr },
        }

        let shape = match &self.program.exprs[id] {
            Expr::Null => Shape::Null,
            Expr::Literal { value, .. } => Shape::Literal(value.clone()),
            Expr::ObjectAccess { prefix, ident, .. } => Shape::ObjectAccess { prefix: *prefix, ident: ident.clone() },
            Expr::ArrayIndex { prefix, indices, .. } => {
                Shape::ArrayIndex { prefix: *prefix, indices: indices.clone() }
            }
            Expr::Call { prefix, arguments, .. } => Shape::Call { prefix: *prefix, arguments: arguments.clone() },
            Expr::Cast { type_specifier, expr, .. } => {
                Shape::Cast { type_specifier: *type_specifier, expr: *expr }
            }
            Expr::Bracket { expr, .. } => Shape::Bracket { expr: *expr },
            Expr::Unary { op, expr, .. } => Shape::Unary { op: *op, expr: *expr },
            Expr::PostUnary { expr, .. } => Shape::PostUnary { expr: *expr },
            Expr::Binary { op, lhs, rhs, .. } => Shape::Binary { op: *op, lhs: *lhs, rhs: *rhs },
            Expr::Ternary { condition, then_expr, else_expr, .. } => {
                Shape::Ternary { condition: *condition, then_expr: *then_expr, else_expr: *else_expr }
            }
            Expr::Assignment { op, lvalue, rvalue, .. } => {
                Shape::Assignment { op: *op, lvalue: *lvalue, rvalue: *rvalue }
            }
            Expr::Sequence { exprs, .. } => Shape::Sequence { exprs: exprs.clone() },
            Expr::InitializerList { exprs, .. } => Shape::InitializerList { exprs: exprs.clone() },
            Expr::TypeSpecifier { type_specifier, .. } => Shape::TypeSpecifierExpr { type_specifier: *type_specifier },
            Expr::Identifier { ident, .. } => Shape::Identifier { ident: ident.clone() },
        };

        match shape {
            Shape::Null => TypeDenoter::Void,
            Shape::Literal(lit) => literal_type(&lit),
            Shape::ObjectAccess { prefix, ident } => self.infer_object_access(id, prefix, &ident),
            Shape::ArrayIndex { prefix, indices } => self.infer_array_index(prefix, &indices),
            Shape::Call { prefix, arguments } => self.infer_call(id, prefix, &arguments),
            Shape::Cast { type_specifier, expr } => {
                let target = self.resolve_type_specifier(type_specifier);
                let source = self.analyze_expr(expr);
                if !source.is_castable_to(&target, &self.program.alias_decls)
                    && !matches!(source, TypeDenoter::Error)
                {
                    self.report_bad_cast(&source, &target, SourceSpan::default(), "explicit cast");
                }
                target
            }
            Shape::Bracket { expr } => self.analyze_expr(expr),
            Shape::Unary { op, expr } => self.infer_unary(op, expr),
            Shape::PostUnary { expr } => self.analyze_expr(expr),
            Shape::Binary { op, lhs, rhs } => self.infer_binary(op, lhs, rhs),
            Shape::Ternary { condition, then_expr, else_expr } => self.infer_ternary(condition, then_expr, else_expr),
            Shape::Assignment { op, lvalue, rvalue } => self.infer_assignment(op, lvalue, rvalue),
            Shape::Sequence { exprs } => exprs.last().map(|&e| self.analyze_expr(e)).unwrap_or(TypeDenoter::Void),
            Shape::InitializerList { exprs } => self.infer_initializer_list(&exprs),
            Shape::TypeSpecifierExpr { type_specifier } => self.resolve_type_specifier(type_specifier),
            Shape::Identifier { ident } => self.infer_identifier(id, &ident),
        }
    }

    fn infer_identifier(&mut self, id: Id<Expr>, ident: &str) -> TypeDenoter {
        if let Some(binding) = self.lookup_value(ident) {
            let (ty, symbol_ref) = match binding {
                Binding::Var(v) => {
                    self.program.var_decls[v].flags.insert(NodeFlags::IS_READ_FROM);
                    (self.var_decl_full_type_cached(v), IdentifierRef::Var(v))
                }
                Binding::Buffer(b) => (self.program.buffer_decls[b].ty.clone(), IdentifierRef::Buffer(b)),
                Binding::Sampler(s) => (self.program.sampler_decls[s].ty.clone(), IdentifierRef::Sampler(s)),
                Binding::Struct(_) | Binding::Alias(_) | Binding::Functions(_) => {
                    self.reports.push(Report::error(
                        Category::TypeError,
                        format!("`{}` does not name a value", ident),
                    ));
                    return TypeDenoter::Error;
                }
            };
            if let Expr::Identifier { symbol_ref: slot, .. } = &mut self.program.exprs[id] {
                *slot = Some(symbol_ref);
            }
            ty
        } else {
            self.report_undeclared(ident);
            TypeDenoter::Error
        }
    }

    fn lookup_value(&self, ident: &str) -> Option<Binding> {
        if let Some(&sid) = self.struct_stack.last() {
            let members = &self.program.struct_decls[sid].members;
            for &m in members {
                for &vd in &self.program.var_decl_stmnts[m].var_decls {
                    if self.program.var_decls[vd].ident == ident {
                        return Some(Binding::Var(vd));
                    }
                }
            }
        }
        self.symbols.lookup(ident).cloned()
    }

    fn var_decl_full_type_cached(&mut self, id: Id<VarDecl>) -> TypeDenoter {
        let spec = self.program.var_decls[id].type_specifier;
        let declared = self.resolve_type_specifier(spec);
        self.var_decl_full_type(id, &declared)
    }

    fn infer_object_access(&mut self, id: Id<Expr>, prefix: Id<Expr>, ident: &str) -> TypeDenoter {
        let prefix_ty = self.analyze_expr(prefix);
        let aliased = prefix_ty.aliased(&self.program.alias_decls).clone();
        match &aliased {
            TypeDenoter::Struct { decl_ref, .. } => {
                let decl_ref = *decl_ref;
                let member = self.find_struct_member(decl_ref, ident);
                match member {
                    Some(vd) => {
                        self.program.var_decls[vd].flags.insert(NodeFlags::IS_READ_FROM);
                        if let Expr::ObjectAccess { symbol_ref, .. } = &mut self.program.exprs[id] {
                            *symbol_ref = Some(ObjectAccessRef::StructMember(vd));
                        }
                        self.var_decl_full_type_cached(vd)
                    }
                    None => {
                        let extra = self.struct_member_names(decl_ref);
                        let suggestion = self.symbols.suggest(ident, extra.iter());
                        self.report_no_such_member(ident, suggestion);
                        TypeDenoter::Error
                    }
                }
            }
            TypeDenoter::Base { elem, rows: 1, cols } if *cols >= 1 => {
                match swizzle_indices(ident, *cols) {
                    Some(idx) => {
                        let len = idx.len() as u8;
                        if let Expr::ObjectAccess { symbol_ref, .. } = &mut self.program.exprs[id] {
                            *symbol_ref = Some(ObjectAccessRef::Swizzle(idx));
                        }
                        if len == 1 {
                            TypeDenoter::Base { elem: *elem, rows: 1, cols: 1 }
                        } else {
                            TypeDenoter::vector(*elem, len)
                        }
                    }
                    None => {
                        self.reports.push(Report::error(
                            Category::TypeError,
                            format!("`{}` is not a valid swizzle on a {}-component vector", ident, cols),
                        ));
                        TypeDenoter::Error
                    }
                }
            }
            TypeDenoter::Error => TypeDenoter::Error,
            other => {
                self.reports.push(Report::error(
                    Category::TypeError,
                    format!("cannot access member `{}` of type `{}`", ident, other.to_string(&self.program.alias_decls)),
                ));
                TypeDenoter::Error
            }
        }
    }

    fn find_struct_member(&self, sid: Id<StructDecl>, ident: &str) -> Option<Id<VarDecl>> {
        for &m in &self.program.struct_decls[sid].members {
            for &vd in &self.program.var_decl_stmnts[m].var_decls {
                if self.program.var_decls[vd].ident == ident {
                    return Some(vd);
                }
            }
        }
        None
    }

    fn struct_member_names(&self, sid: Id<StructDecl>) -> Vec<SmolStr> {
        let mut names = Vec::new();
        for &m in &self.program.struct_decls[sid].members {
            for &vd in &self.program.var_decl_stmnts[m].var_decls {
                names.push(self.program.var_decls[vd].ident.clone());
            }
        }
        names
    }

    fn infer_array_index(&mut self, prefix: Id<Expr>, indices: &[Id<Expr>]) -> TypeDenoter {
        let prefix_ty = self.analyze_expr(prefix);
        for &idx in indices {
            let idx_ty = self.analyze_expr(idx);
            if !idx_ty.is_numeric() && !matches!(idx_ty, TypeDenoter::Error) {
                self.reports.push(Report::error(Category::TypeError, "array index must be numeric"));
            }
        }
        let aliased = prefix_ty.aliased(&self.program.alias_decls).clone();
        let mut cur = aliased;
        for _ in indices {
            cur = match cur.sub() {
                Some(next) => next,
                None => match cur {
                    TypeDenoter::Buffer { generic: Some(g), .. } => (*g).clone(),
                    TypeDenoter::Error => return TypeDenoter::Error,
                    other => {
                        self.reports.push(Report::error(
                            Category::TypeError,
                            format!("type `{}` cannot be indexed", other.to_string(&self.program.alias_decls)),
                        ));
                        return TypeDenoter::Error;
                    }
                },
            };
        }
        cur
    }

    fn infer_call(&mut self, id: Id<Expr>, prefix: Id<Expr>, arguments: &[Id<Expr>]) -> TypeDenoter {
        let arg_types: Vec<TypeDenoter> = arguments.iter().map(|&a| self.analyze_expr(a)).collect();

        // The call target is named either by a bare identifier (function or
        // intrinsic) or by a type-specifier-as-expression (constructor).
        let target_name = match &self.program.exprs[prefix] {
            Expr::Identifier { ident, .. } => Some(ident.clone()),
            Expr::TypeSpecifier { .. } => None,
            _ => {
                self.reports.push(Report::error(Category::TypeError, "call target must be a name or type"));
                return TypeDenoter::Error;
            }
        };

        if let Expr::TypeSpecifier { type_specifier, .. } = self.program.exprs[prefix] {
            let ty = self.resolve_type_specifier(type_specifier);
            if let Expr::Call { call_ref, .. } = &mut self.program.exprs[id] {
                *call_ref = Some(CallRef::TypeConstructor);
            }
            return ty;
        }

        let name = target_name.unwrap();

        if let Some(intrinsic) = Intrinsic::by_name(&name) {
            if let Expr::Call { call_ref, .. } = &mut self.program.exprs[id] {
                *call_ref = Some(CallRef::Intrinsic(intrinsic));
            }
            return intrinsic.return_type(&arg_types).unwrap_or_else(|| {
                self.reports.push(Report::error(
                    Category::SemanticMapping,
                    format!("intrinsic `{}` is not valid for these argument types", name),
                ));
                TypeDenoter::Error
            });
        }

        // Type-constructor call named after a primitive, e.g. `float4(...)`.
        if let Some(ty) = primitive_type_name(&name) {
            if let Expr::Call { call_ref, .. } = &mut self.program.exprs[id] {
                *call_ref = Some(CallRef::TypeConstructor);
            }
            return ty;
        }

        let candidates = self.symbols.lookup(&name).and_then(|b| b.as_functions()).map(|f| f.to_vec());
        let Some(candidates) = candidates else {
            let suggestion = self.symbols.suggest(&name, std::iter::empty());
            self.report_no_overload(&name, suggestion);
            return TypeDenoter::Error;
        };

        match self.resolve_overload(&candidates, &arg_types) {
            OverloadResolution::Matched(f) => {
                if let Expr::Call { call_ref, .. } = &mut self.program.exprs[id] {
                    *call_ref = Some(CallRef::Function(f));
                }
                let spec = self.program.function_decls[f].return_type;
                self.resolve_type_specifier(spec)
            }
            OverloadResolution::Ambiguous => {
                self.reports.push(Report::error(
                    Category::OverloadResolution,
                    format!("call to `{}` is ambiguous", name),
                ));
                TypeDenoter::Error
            }
            OverloadResolution::NoMatch => {
                self.reports.push(Report::error(
                    Category::OverloadResolution,
                    format!("no overload of `{}` matches the given arguments", name),
                ));
                TypeDenoter::Error
            }
        }
    }

    /// §3.3 overload resolution rule: exact match beats implicit-cast
    /// match; among implicit-cast matches, fewer total casts wins, ties
    /// broken by earliest declaration.
    fn resolve_overload(&self, candidates: &[Id<FunctionDecl>], args: &[TypeDenoter]) -> OverloadResolution {
        let mut best: Option<(u32, Id<FunctionDecl>)> = None;
        let mut exact_matches = 0u32;
        for &f in candidates {
            let params = &self.program.function_decls[f].parameters;
            let param_types: Vec<TypeDenoter> = params
                .iter()
                .flat_map(|&p| self.program.var_decl_stmnts[p].var_decls.iter())
                .map(|&vd| {
                    self.program.type_specifiers[self.program.var_decls[vd].type_specifier]
                        .denoter
                        .clone()
                        .unwrap_or(TypeDenoter::Error)
                })
                .collect();
            if param_types.len() != args.len() {
                continue;
            }
            let mut casts = 0u32;
            let mut ok = true;
            let mut exact = true;
            for (arg, param) in args.iter().zip(param_types.iter()) {
                if arg.equals(param, &self.program.alias_decls) {
                    continue;
                }
                exact = false;
                if arg.is_castable_to(param, &self.program.alias_decls) {
                    casts += 1;
                } else {
                    ok = false;
                    break;
                }
            }
            if !ok {
                continue;
            }
            if exact {
                exact_matches += 1;
                best = Some((0, f));
                if exact_matches > 1 {
                    return OverloadResolution::Ambiguous;
                }
                continue;
            }
            if exact_matches > 0 {
                continue;
            }
            if best.as_ref().map_or(true, |(c, _)| casts < *c) {
                best = Some((casts, f));
            }
        }
        match best {
            Some((_, f)) => OverloadResolution::Matched(f),
            None => OverloadResolution::NoMatch,
        }
    }

    fn infer_unary(&mut self, op: UnaryOp, expr: Id<Expr>) -> TypeDenoter {
        let ty = self.analyze_expr(expr);
        match op {
            UnaryOp::LogicalNot => match ty.vector_dim() {
                Some(d) if d > 1 => TypeDenoter::vector(PrimitiveType::Bool, d),
                _ => TypeDenoter::BOOL,
            },
            UnaryOp::Negate | UnaryOp::BitNot => ty,
        }
    }

    fn infer_binary(&mut self, op: BinaryOp, lhs: Id<Expr>, rhs: Id<Expr>) -> TypeDenoter {
        let lty = self.analyze_expr(lhs);
        let rty = self.analyze_expr(rhs);
        if matches!(lty, TypeDenoter::Error) || matches!(rty, TypeDenoter::Error) {
            return TypeDenoter::Error;
        }
        use BinaryOp::*;
        match op {
            LogicalAnd | LogicalOr => TypeDenoter::BOOL,
            Eq | Ne | Lt | Le | Gt | Ge => match (lty.vector_dim(), rty.vector_dim()) {
                (Some(d), _) | (_, Some(d)) if d > 1 => TypeDenoter::vector(PrimitiveType::Bool, d),
                _ => TypeDenoter::BOOL,
            },
            Add | Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | Shl | Shr => {
                // `matchTypeSize` is only relaxed for `Mul`/`Div`, mirroring
                // `ExprConverter.cpp`'s `FindCommonTypeDenoter`: a scalar
                // operand broadcasts against the other's vector dimension
                // (`color * brightness`), but every other operator still
                // requires both operands to already be the same shape.
                let match_type_size = !matches!(op, Mul | Div);
                match TypeDenoter::find_common(&lty, &rty, match_type_size) {
                    Some(common) => common,
                    None => {
                        self.reports.push(Report::error(
                            Category::TypeError,
                            format!(
                                "mismatched operand types `{}` and `{}`",
                                lty.to_string(&self.program.alias_decls),
                                rty.to_string(&self.program.alias_decls)
                            ),
                        ));
                        TypeDenoter::Error
                    }
                }
            }
        }
    }

    fn infer_ternary(&mut self, condition: Id<Expr>, then_expr: Id<Expr>, else_expr: Id<Expr>) -> TypeDenoter {
        let cond_ty = self.analyze_expr(condition);
        if !cond_ty.is_scalar() && !cond_ty.is_vector() && !matches!(cond_ty, TypeDenoter::Error) {
            self.reports.push(Report::error(Category::TypeError, "ternary condition must be scalar or vector"));
        }
        let t = self.analyze_expr(then_expr);
        let e = self.analyze_expr(else_expr);
        TypeDenoter::find_common(&t, &e, true).unwrap_or_else(|| {
            self.reports.push(Report::error(Category::TypeError, "ternary branches have incompatible types"));
            TypeDenoter::Error
        })
    }

    fn infer_assignment(&mut self, _op: AssignOp, lvalue: Id<Expr>, rvalue: Id<Expr>) -> TypeDenoter {
        let lty = self.analyze_expr(lvalue);
        let rty = self.analyze_expr(rvalue);
        if !rty.is_castable_to(&lty, &self.program.alias_decls)
            && !matches!(lty, TypeDenoter::Error)
            && !matches!(rty, TypeDenoter::Error)
        {
            self.report_bad_cast(&rty, &lty, SourceSpan::default(), "assignment");
        }
        lty
    }

    fn infer_initializer_list(&mut self, exprs: &[Id<Expr>]) -> TypeDenoter {
        let mut common: Option<TypeDenoter> = None;
        for &e in exprs {
            let ty = self.analyze_expr(e);
            common = Some(match common {
                None => ty,
                Some(c) => TypeDenoter::find_common(&c, &ty, true).unwrap_or(c),
            });
        }
        TypeDenoter::Array {
            sub: Box::new(common.unwrap_or(TypeDenoter::Error)),
            dims: SmallVec::from_slice(&[exprs.len() as u32]),
        }
    }

    // -----------------------------------------------------------------
    // Type specifiers
    // -----------------------------------------------------------------

    fn resolve_type_specifier(&mut self, id: Id<TypeSpecifier>) -> TypeDenoter {
        if let Some(denoter) = &self.program.type_specifiers[id].denoter {
            return denoter.clone();
        }
        let name = self.program.type_specifiers[id].unresolved_name.clone();
        let resolved = match name {
            Some(name) => match self.symbols.lookup(&name).cloned() {
                Some(Binding::Struct(sid)) => {
                    self.program.type_specifiers[id].struct_decl = Some(sid);
                    TypeDenoter::Struct { name: name.clone(), decl_ref: sid }
                }
                Some(Binding::Alias(aid)) => TypeDenoter::Alias { name: name.clone(), decl_ref: aid },
                _ => {
                    let suggestion = self.symbols.suggest(&name, std::iter::empty());
                    self.report_undeclared_type(&name, suggestion);
                    TypeDenoter::Error
                }
            },
            None => TypeDenoter::Error,
        };
        self.program.type_specifiers[id].denoter = Some(resolved.clone());
        resolved
    }

    // -----------------------------------------------------------------
    // End-of-scope / control-path marking (§4.1, spec invariant 4)
    // -----------------------------------------------------------------

    fn mark_control_paths(&mut self, id: Id<FunctionDecl>) {
        let block = self.program.function_decls[id].code_block;
        let all_return = self.mark_block_control_paths(block);
        if all_return {
            self.program.function_decls[id].flags.insert(NodeFlags::IS_END_OF_FUNCTION);
        }
    }

    /// Marks the terminal statement(s) of `block` with `IS_END_OF_FUNCTION`
    /// and returns whether every control path through the block returns.
    fn mark_block_control_paths(&mut self, block: Id<CodeBlock>) -> bool {
        let stmnts = self.program.code_blocks[block].stmnts.clone();
        match stmnts.last() {
            Some(&last) => self.mark_stmnt_control_paths(last),
            None => false,
        }
    }

    fn mark_stmnt_control_paths(&mut self, id: Id<Stmnt>) -> bool {
        match &mut self.program.stmnts[id] {
            Stmnt::Return { flags, .. } => {
                flags.insert(NodeFlags::IS_END_OF_FUNCTION);
                true
            }
            Stmnt::CodeBlock(block) => {
                let block = *block;
                self.mark_block_control_paths(block)
            }
            Stmnt::If { then_body, else_body, .. } => {
                let (then_body, else_body) = (*then_body, *else_body);
                let then_ok = self.mark_stmnt_control_paths(then_body);
                let else_ok = match else_body {
                    Some(e) => self.mark_stmnt_control_paths(e),
                    None => false,
                };
                then_ok && else_ok
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------
    // Reporting helpers
    // -----------------------------------------------------------------

    fn report_redeclaration(&mut self, ident: &str, span: SourceSpan) {
        self.reports.push(Report::error(Category::TypeError, format!("redeclaration of `{}`", ident)).with_area(span));
    }

    fn report_undeclared(&mut self, ident: &str) {
        let extra: Vec<SmolStr> =
            self.struct_stack.last().map(|&s| self.struct_member_names(s)).unwrap_or_default();
        let suggestion = self.symbols.suggest(ident, extra.iter());
        match suggestion {
            Some(s) => self.reports.push(Report::error(
                Category::UndeclaredIdentifier,
                format!("undeclared identifier `{}` — did you mean `{}`?", ident, s),
            )),
            None => self
                .reports
                .push(Report::error(Category::UndeclaredIdentifier, format!("undeclared identifier `{}`", ident))),
        }
    }

    fn report_undeclared_type(&mut self, ident: &str, suggestion: Option<SmolStr>) {
        match suggestion {
            Some(s) => self.reports.push(Report::error(
                Category::UndeclaredIdentifier,
                format!("unknown type `{}` — did you mean `{}`?", ident, s),
            )),
            None => self
                .reports
                .push(Report::error(Category::UndeclaredIdentifier, format!("unknown type `{}`", ident))),
        }
    }

    fn report_no_such_member(&mut self, ident: &str, suggestion: Option<SmolStr>) {
        match suggestion {
            Some(s) => self.reports.push(Report::error(
                Category::UndeclaredIdentifier,
                format!("no member `{}` — did you mean `{}`?", ident, s),
            )),
            None => self
                .reports
                .push(Report::error(Category::UndeclaredIdentifier, format!("no member `{}`", ident))),
        }
    }

    fn report_no_overload(&mut self, name: &str, suggestion: Option<SmolStr>) {
        match suggestion {
            Some(s) => self.reports.push(Report::error(
                Category::OverloadResolution,
                format!("no function named `{}` — did you mean `{}`?", name, s),
            )),
            None => self
                .reports
                .push(Report::error(Category::OverloadResolution, format!("no function named `{}`", name))),
        }
    }

    fn report_bad_cast(&mut self, from: &TypeDenoter, to: &TypeDenoter, span: SourceSpan, context: &str) {
        self.reports.push(
            Report::error(
                Category::TypeError,
                format!(
                    "cannot implicitly convert `{}` to `{}` in {}",
                    from.to_string(&self.program.alias_decls),
                    to.to_string(&self.program.alias_decls),
                    context
                ),
            )
            .with_area(span),
        );
    }
}

enum OverloadResolution {
    Matched(Id<FunctionDecl>),
    Ambiguous,
    NoMatch,
}

fn literal_type(lit: &Literal) -> TypeDenoter {
    match lit {
        Literal::Bool(_) => TypeDenoter::BOOL,
        Literal::Int(_) => TypeDenoter::INT,
        Literal::UInt(_) => TypeDenoter::UINT,
        Literal::Float(_) => TypeDenoter::FLOAT,
        Literal::String(_) => TypeDenoter::Error,
    }
}

fn primitive_type_name(name: &str) -> Option<TypeDenoter> {
    let (elem, rest): (PrimitiveType, &str) = if let Some(r) = name.strip_prefix("bool") {
        (PrimitiveType::Bool, r)
    } else if let Some(r) = name.strip_prefix("uint") {
        (PrimitiveType::UnsignedInt, r)
    } else if let Some(r) = name.strip_prefix("int") {
        (PrimitiveType::Int, r)
    } else if let Some(r) = name.strip_prefix("double") {
        (PrimitiveType::Double, r)
    } else if let Some(r) = name.strip_prefix("float") {
        (PrimitiveType::Float, r)
    } else {
        return None;
    };
    match rest {
        "" => Some(TypeDenoter::Base { elem, rows: 1, cols: 1 }),
        "2" => Some(TypeDenoter::vector(elem, 2)),
        "3" => Some(TypeDenoter::vector(elem, 3)),
        "4" => Some(TypeDenoter::vector(elem, 4)),
        "2x2" => Some(TypeDenoter::matrix(elem, 2, 2)),
        "3x3" => Some(TypeDenoter::matrix(elem, 3, 3)),
        "4x4" => Some(TypeDenoter::matrix(elem, 4, 4)),
        "3x4" => Some(TypeDenoter::matrix(elem, 3, 4)),
        "4x3" => Some(TypeDenoter::matrix(elem, 4, 3)),
        _ => None,
    }
}

/// Decodes a swizzle mask (`xyzw`/`rgba`/`stpq`) of length 1..=4 over a
/// vector of width `src_dim`. `None` if any character is invalid or out of
/// range for the source vector.
fn swizzle_indices(ident: &str, src_dim: u8) -> Option<SmallVec<[u8; 4]>> {
    if ident.is_empty() || ident.len() > 4 {
        return None;
    }
    let sets = [b"xyzw", b"rgba", b"stpq"];
    let bytes = ident.as_bytes();
    let set = sets.iter().find(|s| s.contains(&bytes[0]))?;
    let mut out = SmallVec::new();
    for &b in bytes {
        let pos = set.iter().position(|&c| c == b)?;
        if pos as u8 >= src_dim {
            return None;
        }
        out.push(pos as u8);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_type_name_parses_vector_and_matrix() {
        assert!(matches!(primitive_type_name("float"), Some(TypeDenoter::Base { rows: 1, cols: 1, .. })));
        assert!(matches!(primitive_type_name("float4"), Some(TypeDenoter::Base { rows: 1, cols: 4, .. })));
        assert!(matches!(primitive_type_name("float4x4"), Some(TypeDenoter::Base { rows: 4, cols: 4, .. })));
        assert!(primitive_type_name("not_a_type").is_none());
    }

    #[test]
    fn swizzle_indices_decodes_xyzw() {
        let idx = swizzle_indices("xy", 4).unwrap();
        assert_eq!(idx.as_slice(), &[0, 1]);
        assert!(swizzle_indices("xyzw", 2).is_none());
        assert!(swizzle_indices("xr", 4).is_none());
    }
}
