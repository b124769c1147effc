//! AST rewriter (lowering), §4.3.
//!
//! Grounded 1:1 on `ExprConverter.cpp`: the flag-gated per-expression
//! conversions below walk in the same pre-visit/post-visit shape as the
//! original's `ConvertExpr(expr, AllPreVisit)` / `ConvertExpr(expr,
//! AllPostVisit)` pairs bracketing `VISIT_DEFAULT`, reimplemented on top of
//! [`AstVisitor::walk_expr`] instead of an overriding virtual-visit surface.
//!
//! `Expr` carries no per-node flags field of its own (only declarations and
//! statements do) — `wasConverted` (spec invariant 8) falls out of the
//! one-shot replacement discipline instead: every conversion below replaces
//! `id`'s arena slot with a brand new node and returns its id, and
//! `walk_expr` never re-descends into a node it has already produced, so a
//! freshly produced node is never re-entered.

use crate::ast::*;
use crate::diagnostics::ReportHandler;
use crate::intrinsics::Intrinsic;
use crate::visitor::AstVisitor;
use smol_str::SmolStr;
use std::collections::HashSet;

bitflags::bitflags! {
    pub struct ConversionFlags: u32 {
        const CONVERT_LOG10                  = 1 << 0;
        const CONVERT_VECTOR_COMPARE         = 1 << 1;
        const CONVERT_IMAGE_ACCESS           = 1 << 2;
        const CONVERT_SAMPLER_BUFFER_ACCESS  = 1 << 3;
        const CONVERT_VECTOR_SUBSCRIPTS      = 1 << 4;
        const CONVERT_UNARY_EXPR             = 1 << 5;
        const CONVERT_IMPLICIT_CASTS         = 1 << 6;
        const CONVERT_INITIALIZER            = 1 << 7;
        const CONVERT_MATRIX_LAYOUT          = 1 << 8;
        const ALL = Self::CONVERT_LOG10.bits
            | Self::CONVERT_VECTOR_COMPARE.bits
            | Self::CONVERT_IMAGE_ACCESS.bits
            | Self::CONVERT_SAMPLER_BUFFER_ACCESS.bits
            | Self::CONVERT_VECTOR_SUBSCRIPTS.bits
            | Self::CONVERT_UNARY_EXPR.bits
            | Self::CONVERT_IMPLICIT_CASTS.bits
            | Self::CONVERT_INITIALIZER.bits
            | Self::CONVERT_MATRIX_LAYOUT.bits;
    }
}

impl Default for ConversionFlags {
    fn default() -> ConversionFlags {
        ConversionFlags::ALL
    }
}

/// Runs the rewriter over every reachable function body and global
/// initializer in `program`. Rewriter and Emitter passes treat the first
/// error as fatal for the pass (§7); a `had_errors` report handler is
/// returned either way so the caller can tell the two cases apart.
pub fn rewrite(program: &mut Program, flags: ConversionFlags) -> ReportHandler {
    let span = tracing::debug_span!("rewrite", flags = ?flags);
    let _enter = span.enter();

    let lvalue_ids = collect_lvalue_ids(program);
    let mut rewriter = AstRewriter {
        flags,
        reports: ReportHandler::new(),
        fatal: false,
        lvalue_ids,
        current_return_type: None,
        hoist_counter: 0,
    };
    rewriter.run(program);
    tracing::trace!(hoisted = rewriter.hoist_counter, fatal = rewriter.fatal, "lowering complete");
    rewriter.reports
}

/// Every `Expr` id that is the lvalue slot of some `Assignment` in the
/// (pre-rewrite) program. Collected up front over the static arena rather
/// than tracked with a push/pop guard during traversal: ids are stable and
/// no assignment nodes are created by the rewriter itself, so one linear
/// scan before rewriting starts sees every one that will ever matter. An
/// id in this set is never converted by the "read" half of
/// `ConvertImageAccess`/`ConvertSamplerBufferAccess` — the `Assignment`
/// that owns it is responsible for deciding how it's lowered instead.
fn collect_lvalue_ids(program: &Program) -> HashSet<Id<Expr>> {
    program
        .exprs
        .iter_ids()
        .filter_map(|(_, e)| match e {
            Expr::Assignment { lvalue, .. } => Some(*lvalue),
            _ => None,
        })
        .collect()
}

struct AstRewriter {
    flags: ConversionFlags,
    reports: ReportHandler,
    /// Set on the first fatal error; later top-level items are skipped
    /// rather than risking a cascade of nonsense rewrites over already
    /// broken state. Nothing in this crate's conversions currently reports
    /// a rewrite-time error (the analyzer has already rejected anything
    /// that would make one of these lowerings ill-typed), so this stays
    /// false in practice; it exists so a future conversion that can fail
    /// has somewhere to signal it.
    fatal: bool,
    lvalue_ids: HashSet<Id<Expr>>,
    /// The enclosing function's resolved return type, set for the duration
    /// of `rewrite_function` so `Stmnt::Return` can cast its operand
    /// without needing a parent pointer.
    current_return_type: Option<TypeDenoter>,
    /// Disambiguates synthetic locals introduced by the image-store index
    /// hoist (§4.3's open issue).
    hoist_counter: u32,
}

impl AstRewriter {
    fn run(&mut self, program: &mut Program) {
        let globals = program.globals.clone();
        for global in globals {
            if self.fatal {
                break;
            }
            match global {
                GlobalDecl::Var(stmnt) => self.rewrite_var_decl_stmnt(program, stmnt),
                GlobalDecl::Function(func) => self.rewrite_function(program, func),
                GlobalDecl::Buffer(_) | GlobalDecl::Sampler(_) | GlobalDecl::Struct(_) | GlobalDecl::Alias(_) => {}
            }
        }
    }

    fn rewrite_function(&mut self, program: &mut Program, id: Id<FunctionDecl>) {
        let ret_spec = program.function_decls[id].return_type;
        self.current_return_type = program.type_specifiers[ret_spec].denoter.clone();

        let params = program.function_decls[id].parameters.clone();
        for p in params {
            self.rewrite_var_decl_stmnt(program, p);
        }
        let block = program.function_decls[id].code_block;
        self.rewrite_code_block(program, block);

        self.current_return_type = None;
    }

    fn rewrite_var_decl_stmnt(&mut self, program: &mut Program, id: Id<VarDeclStmnt>) {
        let decls = program.var_decl_stmnts[id].var_decls.clone();
        for vd in decls {
            self.rewrite_var_decl(program, vd);
        }
    }

    fn rewrite_var_decl(&mut self, program: &mut Program, id: Id<VarDecl>) {
        let Some(init) = program.var_decls[id].initializer else { return };
        let mut new_init = self.rewrite_expr(program, init);
        if let Some(target) = self.declared_type_of(program, id) {
            if self.flags.contains(ConversionFlags::CONVERT_INITIALIZER) {
                new_init = self.convert_initializer_list(program, new_init, &target);
            }
            if self.flags.contains(ConversionFlags::CONVERT_IMPLICIT_CASTS) {
                new_init = self.convert_to_target_type(program, new_init, &target, true);
            }
        }
        program.var_decls[id].initializer = Some(new_init);
    }

    /// Resolves `var`'s own declared type, skipping array dims (a rewriter
    /// concern only cares about the element type here — array-typed
    /// initializers are lowered element-wise by `ConvertInitializer`, not by
    /// a single top-level cast).
    fn declared_type_of(&self, program: &Program, var: Id<VarDecl>) -> Option<TypeDenoter> {
        program.type_specifiers[program.var_decls[var].type_specifier].denoter.clone()
    }

    fn rewrite_code_block(&mut self, program: &mut Program, id: Id<CodeBlock>) {
        let stmnts = program.code_blocks[id].stmnts.clone();
        let mut out = Vec::with_capacity(stmnts.len());
        for s in stmnts {
            if self.fatal {
                break;
            }
            self.rewrite_stmnt(program, s, &mut out);
            out.push(s);
        }
        program.code_blocks[id].stmnts = out;
    }

    /// Rewrites the statement in place, pushing any hoisted statement (the
    /// image-store index-temp fix, §4.3's open issue) onto `out` before it.
    fn rewrite_stmnt(&mut self, program: &mut Program, id: Id<Stmnt>, out: &mut Vec<Id<Stmnt>>) {
        match program.stmnts[id] {
            Stmnt::Null | Stmnt::CtrlTransfer(_) => {}
            Stmnt::CodeBlock(block) => self.rewrite_code_block(program, block),
            Stmnt::For { init, condition, iteration, body } => {
                if let Some(i) = init {
                    let mut nested = vec![];
                    self.rewrite_stmnt(program, i, &mut nested);
                    out.extend(nested);
                }
                if let Some(c) = condition {
                    let nc = self.rewrite_expr(program, c);
                    if let Stmnt::For { condition, .. } = &mut program.stmnts[id] {
                        *condition = Some(nc);
                    }
                }
                if let Some(it) = iteration {
                    let nit = self.rewrite_expr(program, it);
                    if let Stmnt::For { iteration, .. } = &mut program.stmnts[id] {
                        *iteration = Some(nit);
                    }
                }
                self.rewrite_stmnt_in_place(program, body);
            }
            Stmnt::While { condition, body } => {
                let nc = self.rewrite_expr(program, condition);
                if let Stmnt::While { condition, .. } = &mut program.stmnts[id] {
                    *condition = nc;
                }
                self.rewrite_stmnt_in_place(program, body);
            }
            Stmnt::DoWhile { body, condition } => {
                self.rewrite_stmnt_in_place(program, body);
                let nc = self.rewrite_expr(program, condition);
                if let Stmnt::DoWhile { condition, .. } = &mut program.stmnts[id] {
                    *condition = nc;
                }
            }
            Stmnt::If { condition, then_body, else_body } => {
                let nc = self.rewrite_expr(program, condition);
                if let Stmnt::If { condition, .. } = &mut program.stmnts[id] {
                    *condition = nc;
                }
                self.rewrite_stmnt_in_place(program, then_body);
                if let Some(e) = else_body {
                    self.rewrite_stmnt_in_place(program, e);
                }
            }
            Stmnt::Switch { selector, .. } => {
                let nsel = self.rewrite_expr(program, selector);
                if let Stmnt::Switch { selector, .. } = &mut program.stmnts[id] {
                    *selector = nsel;
                }
                let case_count = match &program.stmnts[id] {
                    Stmnt::Switch { cases, .. } => cases.len(),
                    _ => unreachable!(),
                };
                for i in 0..case_count {
                    let stmnts = match &program.stmnts[id] {
                        Stmnt::Switch { cases, .. } => cases[i].stmnts.clone(),
                        _ => unreachable!(),
                    };
                    let mut rewritten = Vec::with_capacity(stmnts.len());
                    for s in stmnts {
                        self.rewrite_stmnt(program, s, &mut rewritten);
                        rewritten.push(s);
                    }
                    if let Stmnt::Switch { cases, .. } = &mut program.stmnts[id] {
                        cases[i].stmnts = rewritten;
                    }
                }
            }
            Stmnt::Expr { expr } => {
                self.maybe_hoist_image_index(program, expr, out);
                let new_expr = self.rewrite_expr(program, expr);
                if let Stmnt::Expr { expr } = &mut program.stmnts[id] {
                    *expr = new_expr;
                }
            }
            Stmnt::Return { expr, .. } => {
                if let Some(e) = expr {
                    let new_e = self.rewrite_expr(program, e);
                    if let Stmnt::Return { expr, .. } = &mut program.stmnts[id] {
                        *expr = Some(new_e);
                    }
                    if self.flags.contains(ConversionFlags::CONVERT_IMPLICIT_CASTS) {
                        if let Some(ret_ty) = self.current_return_type.clone() {
                            let final_e = self.convert_to_target_type(program, new_e, &ret_ty, true);
                            if final_e != new_e {
                                if let Stmnt::Return { expr, .. } = &mut program.stmnts[id] {
                                    *expr = Some(final_e);
                                }
                            }
                        }
                    }
                }
            }
            Stmnt::VarDecl(stmnt) => self.rewrite_var_decl_stmnt(program, stmnt),
        }
    }

    fn rewrite_stmnt_in_place(&mut self, program: &mut Program, id: Id<Stmnt>) {
        let mut nested = vec![];
        self.rewrite_stmnt(program, id, &mut nested);
        if !nested.is_empty() {
            // A loop/if body is a single statement slot; wrap the hoisted
            // temp and the original statement in a synthetic block so the
            // hoist has somewhere to live without an enclosing statement
            // list. There is no parent slot to splice into here (`id` is
            // embedded by value in the caller's `Stmnt` variant), so the
            // block takes over `id`'s own arena slot instead.
            nested.push(id);
            let block = program.code_blocks.push(CodeBlock { stmnts: nested });
            program.stmnts[id] = Stmnt::CodeBlock(block);
        }
    }

    /// Hoists a compound image-store's index expression into a preceding
    /// synthetic local when it is not side-effect-free (§4.3's open issue,
    /// resolved per `DESIGN.md`: hoist rather than double-evaluate).
    fn maybe_hoist_image_index(&mut self, program: &mut Program, expr: Id<Expr>, out: &mut Vec<Id<Stmnt>>) {
        if !self.flags.contains(ConversionFlags::CONVERT_IMAGE_ACCESS) {
            return;
        }
        let lvalue = match &program.exprs[expr] {
            Expr::Assignment { lvalue, .. } => *lvalue,
            _ => return,
        };
        let (prefix, idx) = match &program.exprs[lvalue] {
            Expr::ArrayIndex { prefix, indices, .. } if indices.len() == 1 => (*prefix, indices[0]),
            _ => return,
        };
        let prefix_ty = expr_type(program, prefix);
        if !is_image_buffer(&prefix_ty) {
            return;
        }
        if is_side_effect_free(program, idx) {
            return;
        }

        let idx_ty = expr_type(program, idx);
        let name: SmolStr = format!("_hoisted_idx{}", self.hoist_counter).into();
        self.hoist_counter += 1;

        let ts = program.type_specifiers.push(TypeSpecifier {
            span: SourceSpan::default(),
            denoter: Some(idx_ty.clone()),
            unresolved_name: None,
            struct_decl: None,
        });
        let var = program.var_decls.push(VarDecl {
            span: SourceSpan::default(),
            ident: name.clone(),
            type_specifier: ts,
            array_dims: vec![],
            semantic: None,
            register: None,
            pack_offset: None,
            initializer: Some(idx),
            is_parameter: false,
            is_uniform: false,
            is_out_param: false,
            is_const: false,
            flags: NodeFlags::default(),
        });
        let stmnt = program.var_decl_stmnts.push(VarDeclStmnt {
            span: SourceSpan::default(),
            type_specifier: ts,
            var_decls: vec![var],
            flags: NodeFlags::default(),
        });
        out.push(program.stmnts.push(Stmnt::VarDecl(stmnt)));

        let new_idx_ref = program.exprs.push(Expr::Identifier {
            ident: name,
            symbol_ref: Some(IdentifierRef::Var(var)),
            ty: TypeCache { cached: Some(idx_ty) },
        });
        if let Expr::ArrayIndex { indices, .. } = &mut program.exprs[lvalue] {
            indices[0] = new_idx_ref;
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn rewrite_expr(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        self.walk_expr(program, id)
    }

    /// `log10(x)` → `(log(x) / log(10))` with the `10` literal cast to
    /// `x`'s base type (no-op cast when that base type is already `float`,
    /// a literal's default type, matching the literal scenario in spec §8).
    fn convert_log10(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        let x = match &program.exprs[id] {
            Expr::Call { call_ref: Some(CallRef::Intrinsic(Intrinsic::Log10)), arguments, .. }
                if arguments.len() == 1 =>
            {
                arguments[0]
            }
            _ => return id,
        };
        let ty = expr_type(program, id);
        let elem = expr_type(program, x).base_elem().unwrap_or(PrimitiveType::Float);
        let scalar_ty = TypeDenoter::Base { elem, rows: 1, cols: 1 };

        let ten = push_literal_float(program, 10.0);
        let ten_cast =
            if elem == PrimitiveType::Float { ten } else { push_cast(program, scalar_ty.clone(), ten) };

        let log_x = push_intrinsic_call(program, Intrinsic::Log, vec![x], ty.clone());
        let log_ten = push_intrinsic_call(program, Intrinsic::Log, vec![ten_cast], scalar_ty);
        let div = push_binary(program, BinaryOp::Div, log_x, log_ten, ty.clone());
        push_bracket(program, div, ty)
    }

    /// Unary `!v` on a vector → `not(v)`; binary compare on a vector →
    /// `equal`/`lessThan`/… ; ternary with a vector condition → `lerp`.
    fn convert_vector_compare(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        match &program.exprs[id] {
            Expr::Unary { op: UnaryOp::LogicalNot, expr, .. } => {
                let expr = *expr;
                let operand_ty = expr_type(program, expr);
                match operand_ty.vector_dim() {
                    Some(d) if d > 1 => {
                        let ret_ty = TypeDenoter::vector(PrimitiveType::Bool, d);
                        push_intrinsic_call(program, Intrinsic::Not, vec![expr], ret_ty)
                    }
                    _ => id,
                }
            }
            Expr::Binary { op, lhs, rhs, .. } if is_compare_op(*op) => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let lty = expr_type(program, lhs);
                let rty = expr_type(program, rhs);
                let dim = lty
                    .vector_dim()
                    .filter(|&d| d > 1)
                    .or_else(|| rty.vector_dim().filter(|&d| d > 1));
                match dim {
                    Some(d) => {
                        let ret_ty = TypeDenoter::vector(PrimitiveType::Bool, d);
                        push_intrinsic_call(program, compare_intrinsic(op), vec![lhs, rhs], ret_ty)
                    }
                    None => id,
                }
            }
            Expr::Ternary { condition, then_expr, else_expr, .. } => {
                let (condition, then_expr, else_expr) = (*condition, *then_expr, *else_expr);
                let cond_ty = expr_type(program, condition);
                match cond_ty.vector_dim() {
                    Some(d) if d > 1 => {
                        let ret_ty = expr_type(program, id);
                        push_intrinsic_call(program, Intrinsic::Lerp, vec![then_expr, else_expr, condition], ret_ty)
                    }
                    _ => id,
                }
            }
            _ => id,
        }
    }

    /// `rwTex[idx]` read → `imageLoad(rwTex, castInt(idx))`; plain write →
    /// `imageStore(rwTex, castInt(idx), castVec4(expr))`; compound write →
    /// `imageStore(rwTex, idx, imageLoad(rwTex, idx) OP castVec4(expr))`.
    fn convert_image_access(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        match &program.exprs[id] {
            Expr::ArrayIndex { prefix, indices, .. } if indices.len() == 1 && !self.lvalue_ids.contains(&id) => {
                let prefix = *prefix;
                let idx = indices[0];
                let prefix_ty = expr_type(program, prefix);
                if !is_image_buffer(&prefix_ty) {
                    return id;
                }
                let ret_ty = TypeDenoter::vector(PrimitiveType::Float, 4);
                let idx_cast = self.cast_index_to_int(program, idx);
                push_intrinsic_call(program, Intrinsic::ImageLoad, vec![prefix, idx_cast], ret_ty)
            }
            Expr::Assignment { op, lvalue, rvalue, .. } => {
                let (op, lvalue, rvalue) = (*op, *lvalue, *rvalue);
                let (prefix, idx) = match &program.exprs[lvalue] {
                    Expr::ArrayIndex { prefix, indices, .. } if indices.len() == 1 => (*prefix, indices[0]),
                    _ => return id,
                };
                let prefix_ty = expr_type(program, prefix);
                if !is_image_buffer(&prefix_ty) {
                    return id;
                }
                let vec4_ty = TypeDenoter::vector(PrimitiveType::Float, 4);
                let idx_cast = self.cast_index_to_int(program, idx);
                if op == AssignOp::Set {
                    let rv_cast = self.convert_to_target_type(program, rvalue, &vec4_ty, true);
                    push_intrinsic_call(program, Intrinsic::ImageStore, vec![prefix, idx_cast, rv_cast], TypeDenoter::VOID)
                } else {
                    let bin_op = assign_op_to_binary(op);
                    let idx_cast_for_load = self.cast_index_to_int(program, idx);
                    let rv_cast = self.convert_to_target_type(program, rvalue, &vec4_ty, true);
                    let load =
                        push_intrinsic_call(program, Intrinsic::ImageLoad, vec![prefix, idx_cast_for_load], vec4_ty.clone());
                    let combined = push_binary(program, bin_op, load, rv_cast, vec4_ty);
                    push_intrinsic_call(program, Intrinsic::ImageStore, vec![prefix, idx_cast, combined], TypeDenoter::VOID)
                }
            }
            _ => id,
        }
    }

    /// `buf[idx]` on a typed `Buffer<T>` → `texelFetch(buf, idx)`.
    fn convert_sampler_buffer_access(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        match &program.exprs[id] {
            Expr::ArrayIndex { prefix, indices, .. } if indices.len() == 1 && !self.lvalue_ids.contains(&id) => {
                let prefix = *prefix;
                let idx = indices[0];
                let prefix_ty = expr_type(program, prefix);
                if !is_texel_buffer(&prefix_ty) {
                    return id;
                }
                let ret_ty = TypeDenoter::vector(PrimitiveType::Float, 4);
                push_intrinsic_call(program, Intrinsic::TexelFetch, vec![prefix, idx], ret_ty)
            }
            _ => id,
        }
    }

    /// `scalar.xxx` → `vecN(scalar)`.
    fn convert_vector_subscript(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        match &program.exprs[id] {
            Expr::ObjectAccess { prefix, symbol_ref: Some(ObjectAccessRef::Swizzle(idx)), .. } if idx.len() > 1 => {
                let prefix = *prefix;
                let len = idx.len() as u8;
                let prefix_ty = expr_type(program, prefix);
                if !prefix_ty.is_scalar() {
                    return id;
                }
                let elem = prefix_ty.base_elem().unwrap_or(PrimitiveType::Float);
                push_constructor_call(program, TypeDenoter::vector(elem, len), vec![prefix])
            }
            _ => id,
        }
    }

    /// Wraps nested unary `- -x` into `-(-x)` for emitter disambiguation.
    fn convert_nested_unary(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        let inner = match &program.exprs[id] {
            Expr::Unary { expr, .. } => *expr,
            _ => return id,
        };
        let is_nested_unary = matches!(&program.exprs[inner], Expr::Unary { .. });
        if is_nested_unary {
            let inner_ty = expr_type(program, inner);
            let bracket = push_bracket(program, inner, inner_ty);
            if let Expr::Unary { expr, .. } = &mut program.exprs[id] {
                *expr = bracket;
            }
        }
        id
    }

    /// Cast insertion (§4.3): assignment rvalues, binary operands whose
    /// dimensions or element kinds disagree, ternary branches, and
    /// arguments passed to a user-defined function call.
    fn convert_implicit_casts(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        match program.exprs[id] {
            Expr::Assignment { op: AssignOp::Set, lvalue, rvalue, .. } => {
                let lty = expr_type(program, lvalue);
                let new_rv = self.convert_to_target_type(program, rvalue, &lty, true);
                if new_rv != rvalue {
                    if let Expr::Assignment { rvalue, .. } = &mut program.exprs[id] {
                        *rvalue = new_rv;
                    }
                }
                id
            }
            Expr::Binary { op, lhs, rhs, .. }
                if matches!(
                    op,
                    BinaryOp::Add
                        | BinaryOp::Sub
                        | BinaryOp::Mul
                        | BinaryOp::Div
                        | BinaryOp::Mod
                        | BinaryOp::BitAnd
                        | BinaryOp::BitOr
                        | BinaryOp::BitXor
                ) =>
            {
                let lty = expr_type(program, lhs);
                let rty = expr_type(program, rhs);
                if !lty.is_numeric() || !rty.is_numeric() {
                    return id;
                }
                let lc = lty.vector_dim().unwrap_or(1);
                let rc = rty.vector_dim().unwrap_or(1);
                if lc != rc {
                    // Dimension mismatch only ever survives analysis for
                    // `*`/`/` by a scalar (§4.3's explicit exception);
                    // GLSL already overloads those operators for that case.
                    return id;
                }
                let (le, re) = match (lty.base_elem(), rty.base_elem()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return id,
                };
                if le == re {
                    return id;
                }
                let common = if le.promotion_rank() >= re.promotion_rank() { le } else { re };
                let target = TypeDenoter::Base { elem: common, rows: 1, cols: lc };
                let new_lhs =
                    if le != common { self.convert_to_target_type(program, lhs, &target, true) } else { lhs };
                let new_rhs =
                    if re != common { self.convert_to_target_type(program, rhs, &target, true) } else { rhs };
                if new_lhs != lhs || new_rhs != rhs {
                    if let Expr::Binary { lhs, rhs, .. } = &mut program.exprs[id] {
                        *lhs = new_lhs;
                        *rhs = new_rhs;
                    }
                }
                id
            }
            Expr::Ternary { then_expr, else_expr, .. } => {
                let tty = expr_type(program, then_expr);
                let ety = expr_type(program, else_expr);
                if let Some(common) = TypeDenoter::find_common(&tty, &ety, true) {
                    let new_then = self.convert_to_target_type(program, then_expr, &common, true);
                    let new_else = self.convert_to_target_type(program, else_expr, &common, true);
                    if new_then != then_expr || new_else != else_expr {
                        if let Expr::Ternary { then_expr, else_expr, .. } = &mut program.exprs[id] {
                            *then_expr = new_then;
                            *else_expr = new_else;
                        }
                    }
                }
                id
            }
            Expr::Call { call_ref: Some(CallRef::Function(f)), .. } => {
                self.cast_call_arguments(program, id, f);
                id
            }
            _ => id,
        }
    }

    fn cast_call_arguments(&mut self, program: &mut Program, id: Id<Expr>, f: Id<FunctionDecl>) {
        let params = program.function_decls[f].parameters.clone();
        let mut param_types = Vec::new();
        for p in &params {
            for &vd in &program.var_decl_stmnts[*p].var_decls.clone() {
                let spec = program.var_decls[vd].type_specifier;
                param_types.push(program.type_specifiers[spec].denoter.clone().unwrap_or(TypeDenoter::Error));
            }
        }
        let args = match &program.exprs[id] {
            Expr::Call { arguments, .. } => arguments.clone(),
            _ => return,
        };
        let mut new_args = Vec::with_capacity(args.len());
        for (i, &a) in args.iter().enumerate() {
            match param_types.get(i) {
                Some(pty) => new_args.push(self.convert_to_target_type(program, a, pty, true)),
                None => new_args.push(a),
            }
        }
        if new_args != args {
            if let Expr::Call { arguments, .. } = &mut program.exprs[id] {
                *arguments = new_args;
            }
        }
    }

    /// Lowers an initializer list to a constructor call matching the
    /// declared type, e.g. `float3 v = { 1, 2, 3 };` → `vec3 v = vec3(1, 2,
    /// 3);`.
    fn convert_initializer_list(&mut self, program: &mut Program, init: Id<Expr>, declared: &TypeDenoter) -> Id<Expr> {
        let elems = match &program.exprs[init] {
            Expr::InitializerList { exprs, .. } => exprs.clone(),
            _ => return init,
        };
        push_constructor_call(program, declared.clone(), elems)
    }

    /// `mul(a,b)` with `ConvertMatrixLayout`: vector×vector narrows to
    /// `dot(a,b)` (the target dialect's `*` doesn't contract two vectors);
    /// otherwise becomes the infix `(b * a)`, swapping operand order to
    /// flip row-major/column-major convention. Runs pre-visit, since the
    /// swap needs the call's original argument order before any of those
    /// arguments are themselves rewritten — the node this produces is then
    /// walked normally, so its new children still go through the rest of
    /// the pipeline.
    fn convert_matrix_layout(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        let (a, b) = match &program.exprs[id] {
            Expr::Call { call_ref: Some(CallRef::Intrinsic(Intrinsic::Mul)), arguments, .. } if arguments.len() == 2 => {
                (arguments[0], arguments[1])
            }
            _ => return id,
        };
        let aty = expr_type(program, a);
        let bty = expr_type(program, b);
        let ret_ty = expr_type(program, id);
        if aty.is_vector() && bty.is_vector() {
            return push_intrinsic_call(program, Intrinsic::Dot, vec![a, b], ret_ty);
        }
        let mul = push_binary(program, BinaryOp::Mul, b, a, ret_ty.clone());
        push_bracket(program, mul, ret_ty)
    }

    fn cast_index_to_int(&mut self, program: &mut Program, idx: Id<Expr>) -> Id<Expr> {
        let ty = expr_type(program, idx);
        if ty.base_elem() == Some(PrimitiveType::Int) {
            return idx;
        }
        let target = match ty.vector_dim() {
            Some(d) if d > 1 => TypeDenoter::vector(PrimitiveType::Int, d),
            _ => TypeDenoter::INT,
        };
        push_constructor_call(program, target, vec![idx])
    }

    /// Cast-insertion rule (§4.3): no-op if `child` is already `target`'s
    /// type; a scalar source broadcasts into a wider vector/matrix target
    /// (`vec4(1.0)`); a narrower same-rank vector zero-extends
    /// (`vec4(v2, 0.0, 0.0)`); anything else gets a single-argument
    /// (possibly truncating) constructor call.
    fn convert_to_target_type(
        &mut self,
        program: &mut Program,
        child: Id<Expr>,
        target: &TypeDenoter,
        size_match_required: bool,
    ) -> Id<Expr> {
        let source = expr_type(program, child);
        if source.equals(target, &program.alias_decls) {
            return child;
        }
        if !source.is_numeric() || !target.is_numeric() {
            return child;
        }
        let (sr, sc) = match source {
            TypeDenoter::Base { rows, cols, .. } => (rows, cols),
            _ => return child,
        };
        let (tr, tc) = match target {
            TypeDenoter::Base { rows, cols, .. } => (*rows, *cols),
            _ => return child,
        };
        if sr != tr || sc != tc {
            if !size_match_required {
                return child;
            }
            if sr == 1 && sc == 1 {
                return push_constructor_call(program, target.clone(), vec![child]);
            }
            if tr == sr && tc > sc {
                let mut args = vec![child];
                for _ in 0..(tc - sc) {
                    args.push(push_literal_float(program, 0.0));
                }
                return push_constructor_call(program, target.clone(), args);
            }
            return push_constructor_call(program, target.clone(), vec![child]);
        }
        push_constructor_call(program, target.clone(), vec![child])
    }
}

impl AstVisitor for AstRewriter {
    fn pre_visit_expr(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        if self.fatal {
            return id;
        }
        if self.flags.contains(ConversionFlags::CONVERT_MATRIX_LAYOUT) {
            return self.convert_matrix_layout(program, id);
        }
        id
    }

    fn post_visit_expr(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        if self.fatal {
            return id;
        }
        let mut id = id;
        if self.flags.contains(ConversionFlags::CONVERT_LOG10) {
            id = self.convert_log10(program, id);
        }
        if self.flags.contains(ConversionFlags::CONVERT_VECTOR_COMPARE) {
            id = self.convert_vector_compare(program, id);
        }
        if self.flags.contains(ConversionFlags::CONVERT_IMAGE_ACCESS) {
            id = self.convert_image_access(program, id);
        }
        if self.flags.contains(ConversionFlags::CONVERT_SAMPLER_BUFFER_ACCESS) {
            id = self.convert_sampler_buffer_access(program, id);
        }
        if self.flags.contains(ConversionFlags::CONVERT_VECTOR_SUBSCRIPTS) {
            id = self.convert_vector_subscript(program, id);
        }
        if self.flags.contains(ConversionFlags::CONVERT_UNARY_EXPR) {
            id = self.convert_nested_unary(program, id);
        }
        if self.flags.contains(ConversionFlags::CONVERT_IMPLICIT_CASTS) {
            id = self.convert_implicit_casts(program, id);
        }
        program.reset_type_denoter(id);
        id
    }
}

// ---------------------------------------------------------------------------
// Node-construction helpers
// ---------------------------------------------------------------------------

fn expr_type(program: &Program, id: Id<Expr>) -> TypeDenoter {
    program.cached_expr_type(id).unwrap_or(TypeDenoter::Error)
}

fn push_type_specifier(program: &mut Program, ty: TypeDenoter) -> Id<TypeSpecifier> {
    program.type_specifiers.push(TypeSpecifier {
        span: SourceSpan::default(),
        denoter: Some(ty),
        unresolved_name: None,
        struct_decl: None,
    })
}

fn push_type_expr(program: &mut Program, ty: TypeDenoter) -> Id<Expr> {
    let ts = push_type_specifier(program, ty.clone());
    program.exprs.push(Expr::TypeSpecifier { type_specifier: ts, ty: TypeCache { cached: Some(ty) } })
}

fn push_constructor_call(program: &mut Program, ty: TypeDenoter, args: Vec<Id<Expr>>) -> Id<Expr> {
    let prefix = push_type_expr(program, ty.clone());
    program.exprs.push(Expr::Call {
        prefix,
        arguments: args,
        call_ref: Some(CallRef::TypeConstructor),
        ty: TypeCache { cached: Some(ty) },
    })
}

fn push_intrinsic_call(program: &mut Program, intrinsic: Intrinsic, args: Vec<Id<Expr>>, ret_ty: TypeDenoter) -> Id<Expr> {
    let prefix = program.exprs.push(Expr::Identifier {
        ident: intrinsic.to_string().into(),
        symbol_ref: None,
        ty: TypeCache::default(),
    });
    program.exprs.push(Expr::Call {
        prefix,
        arguments: args,
        call_ref: Some(CallRef::Intrinsic(intrinsic)),
        ty: TypeCache { cached: Some(ret_ty) },
    })
}

fn push_cast(program: &mut Program, ty: TypeDenoter, inner: Id<Expr>) -> Id<Expr> {
    let ts = push_type_specifier(program, ty.clone());
    program.exprs.push(Expr::Cast { type_specifier: ts, expr: inner, ty: TypeCache { cached: Some(ty) } })
}

fn push_literal_float(program: &mut Program, v: f64) -> Id<Expr> {
    program.exprs.push(Expr::Literal { value: Literal::Float(v), ty: TypeCache { cached: Some(TypeDenoter::FLOAT) } })
}

fn push_binary(program: &mut Program, op: BinaryOp, lhs: Id<Expr>, rhs: Id<Expr>, ty: TypeDenoter) -> Id<Expr> {
    program.exprs.push(Expr::Binary { op, lhs, rhs, ty: TypeCache { cached: Some(ty) } })
}

fn push_bracket(program: &mut Program, inner: Id<Expr>, ty: TypeDenoter) -> Id<Expr> {
    program.exprs.push(Expr::Bracket { expr: inner, ty: TypeCache { cached: Some(ty) } })
}

fn is_side_effect_free(program: &Program, id: Id<Expr>) -> bool {
    match &program.exprs[id] {
        Expr::Null | Expr::Literal { .. } | Expr::Identifier { .. } => true,
        Expr::ObjectAccess { prefix, .. } => is_side_effect_free(program, *prefix),
        Expr::ArrayIndex { prefix, indices, .. } => {
            is_side_effect_free(program, *prefix) && indices.iter().all(|&i| is_side_effect_free(program, i))
        }
        Expr::Bracket { expr, .. } | Expr::Cast { expr, .. } | Expr::Unary { expr, .. } => {
            is_side_effect_free(program, *expr)
        }
        Expr::Binary { lhs, rhs, .. } => is_side_effect_free(program, *lhs) && is_side_effect_free(program, *rhs),
        Expr::Ternary { condition, then_expr, else_expr, .. } => {
            is_side_effect_free(program, *condition)
                && is_side_effect_free(program, *then_expr)
                && is_side_effect_free(program, *else_expr)
        }
        _ => false,
    }
}

fn is_image_buffer(ty: &TypeDenoter) -> bool {
    matches!(ty, TypeDenoter::Buffer { kind: BufferKind::Image { .. }, .. })
}

fn is_texel_buffer(ty: &TypeDenoter) -> bool {
    matches!(ty, TypeDenoter::Buffer { kind: BufferKind::TexelBuffer, .. })
}

fn is_compare_op(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
}

fn compare_intrinsic(op: BinaryOp) -> Intrinsic {
    match op {
        BinaryOp::Eq => Intrinsic::Equal,
        BinaryOp::Ne => Intrinsic::NotEqual,
        BinaryOp::Lt => Intrinsic::LessThan,
        BinaryOp::Le => Intrinsic::LessThanEqual,
        BinaryOp::Gt => Intrinsic::GreaterThan,
        BinaryOp::Ge => Intrinsic::GreaterThanEqual,
        _ => unreachable!("not a comparison operator"),
    }
}

fn assign_op_to_binary(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Div => BinaryOp::Div,
        AssignOp::Mod => BinaryOp::Mod,
        AssignOp::BitAnd => BinaryOp::BitAnd,
        AssignOp::BitOr => BinaryOp::BitOr,
        AssignOp::BitXor => BinaryOp::BitXor,
        AssignOp::Shl => BinaryOp::Shl,
        AssignOp::Shr => BinaryOp::Shr,
        AssignOp::Set => unreachable!("plain `=` has no binary-op equivalent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_var(program: &mut Program, ident: &str, ty: TypeDenoter, init: Option<Id<Expr>>) -> Id<VarDecl> {
        let ts = push_type_specifier(program, ty);
        program.var_decls.push(VarDecl {
            span: SourceSpan::default(),
            ident: ident.into(),
            type_specifier: ts,
            array_dims: vec![],
            semantic: None,
            register: None,
            pack_offset: None,
            initializer: init,
            is_parameter: false,
            is_uniform: false,
            is_out_param: false,
            is_const: false,
            flags: NodeFlags::default(),
        })
    }

    fn identifier(program: &mut Program, var: Id<VarDecl>, ident: &str, ty: TypeDenoter) -> Id<Expr> {
        program.exprs.push(Expr::Identifier {
            ident: ident.into(),
            symbol_ref: Some(IdentifierRef::Var(var)),
            ty: TypeCache { cached: Some(ty) },
        })
    }

    #[test]
    fn log10_lowers_to_log_division() {
        let mut program = Program::new();
        let x_var = push_var(&mut program, "x", TypeDenoter::FLOAT, None);
        let x = identifier(&mut program, x_var, "x", TypeDenoter::FLOAT);
        let log10_ident =
            program.exprs.push(Expr::Identifier { ident: "log10".into(), symbol_ref: None, ty: TypeCache::default() });
        let call = program.exprs.push(Expr::Call {
            prefix: log10_ident,
            arguments: vec![x],
            call_ref: Some(CallRef::Intrinsic(Intrinsic::Log10)),
            ty: TypeCache { cached: Some(TypeDenoter::FLOAT) },
        });

        let mut rewriter = AstRewriter {
            flags: ConversionFlags::CONVERT_LOG10,
            reports: ReportHandler::new(),
            fatal: false,
            lvalue_ids: HashSet::new(),
            current_return_type: None,
            hoist_counter: 0,
        };
        let result = rewriter.rewrite_expr(&mut program, call);
        match &program.exprs[result] {
            Expr::Bracket { expr, .. } => match &program.exprs[*expr] {
                Expr::Binary { op: BinaryOp::Div, lhs, rhs, .. } => {
                    assert!(matches!(
                        &program.exprs[*lhs],
                        Expr::Call { call_ref: Some(CallRef::Intrinsic(Intrinsic::Log)), .. }
                    ));
                    assert!(matches!(
                        &program.exprs[*rhs],
                        Expr::Call { call_ref: Some(CallRef::Intrinsic(Intrinsic::Log)), .. }
                    ));
                }
                other => panic!("expected division, got {:?}", other),
            },
            other => panic!("expected bracket, got {:?}", other),
        }
    }

    #[test]
    fn vector_compare_lowers_binary_lt_to_lessthan_call() {
        let mut program = Program::new();
        let a_var = push_var(&mut program, "a", TypeDenoter::vector(PrimitiveType::Float, 4), None);
        let b_var = push_var(&mut program, "b", TypeDenoter::vector(PrimitiveType::Float, 4), None);
        let a = identifier(&mut program, a_var, "a", TypeDenoter::vector(PrimitiveType::Float, 4));
        let b = identifier(&mut program, b_var, "b", TypeDenoter::vector(PrimitiveType::Float, 4));
        let cmp = program.exprs.push(Expr::Binary {
            op: BinaryOp::Lt,
            lhs: a,
            rhs: b,
            ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Bool, 4)) },
        });

        let mut rewriter = AstRewriter {
            flags: ConversionFlags::CONVERT_VECTOR_COMPARE,
            reports: ReportHandler::new(),
            fatal: false,
            lvalue_ids: HashSet::new(),
            current_return_type: None,
            hoist_counter: 0,
        };
        let result = rewriter.rewrite_expr(&mut program, cmp);
        match &program.exprs[result] {
            Expr::Call { call_ref: Some(CallRef::Intrinsic(Intrinsic::LessThan)), arguments, .. } => {
                assert_eq!(arguments.len(), 2);
            }
            other => panic!("expected lessThan(...) call, got {:?}", other),
        }
    }

    #[test]
    fn matrix_layout_swaps_mul_to_infix_multiply() {
        let mut program = Program::new();
        let m_var = push_var(&mut program, "M", TypeDenoter::matrix(PrimitiveType::Float, 4, 4), None);
        let v_var = push_var(&mut program, "v", TypeDenoter::vector(PrimitiveType::Float, 4), None);
        let m = identifier(&mut program, m_var, "M", TypeDenoter::matrix(PrimitiveType::Float, 4, 4));
        let v = identifier(&mut program, v_var, "v", TypeDenoter::vector(PrimitiveType::Float, 4));
        let mul_ident =
            program.exprs.push(Expr::Identifier { ident: "mul".into(), symbol_ref: None, ty: TypeCache::default() });
        let call = program.exprs.push(Expr::Call {
            prefix: mul_ident,
            arguments: vec![m, v],
            call_ref: Some(CallRef::Intrinsic(Intrinsic::Mul)),
            ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
        });

        let mut rewriter = AstRewriter {
            flags: ConversionFlags::CONVERT_MATRIX_LAYOUT,
            reports: ReportHandler::new(),
            fatal: false,
            lvalue_ids: HashSet::new(),
            current_return_type: None,
            hoist_counter: 0,
        };
        let result = rewriter.rewrite_expr(&mut program, call);
        match &program.exprs[result] {
            Expr::Bracket { expr, .. } => match &program.exprs[*expr] {
                Expr::Binary { op: BinaryOp::Mul, lhs, rhs, .. } => {
                    assert_eq!(*lhs, v);
                    assert_eq!(*rhs, m);
                }
                other => panic!("expected binary multiply, got {:?}", other),
            },
            other => panic!("expected bracket, got {:?}", other),
        }
    }

    #[test]
    fn image_store_compound_assign_lowers_to_load_store() {
        let mut program = Program::new();
        let tex_ty = TypeDenoter::Buffer {
            generic: Some(Box::new(TypeDenoter::vector(PrimitiveType::Float, 4))),
            kind: BufferKind::Image { dim: ImageDimension::Dim2D, array: false },
            struct_ref: None,
        };
        let tex_var = push_var(&mut program, "t", tex_ty.clone(), None);
        let uv_var = push_var(&mut program, "uv", TypeDenoter::vector(PrimitiveType::UnsignedInt, 2), None);
        let tex = identifier(&mut program, tex_var, "t", tex_ty);
        let uv = identifier(&mut program, uv_var, "uv", TypeDenoter::vector(PrimitiveType::UnsignedInt, 2));
        let index = program.exprs.push(Expr::ArrayIndex {
            prefix: tex,
            indices: vec![uv],
            ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
        });
        let one = push_literal_float(&mut program, 1.0);
        let assign = program.exprs.push(Expr::Assignment {
            op: AssignOp::Add,
            lvalue: index,
            rvalue: one,
            ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
        });

        let lvalue_ids = collect_lvalue_ids(&program);
        let mut rewriter = AstRewriter {
            flags: ConversionFlags::CONVERT_IMAGE_ACCESS,
            reports: ReportHandler::new(),
            fatal: false,
            lvalue_ids,
            current_return_type: None,
            hoist_counter: 0,
        };
        let result = rewriter.rewrite_expr(&mut program, assign);
        match &program.exprs[result] {
            Expr::Call { call_ref: Some(CallRef::Intrinsic(Intrinsic::ImageStore)), arguments, .. } => {
                assert_eq!(arguments.len(), 3);
                assert!(matches!(
                    &program.exprs[arguments[2]],
                    Expr::Binary { op: BinaryOp::Add, .. }
                ));
            }
            other => panic!("expected imageStore(...) call, got {:?}", other),
        }
    }

    /// The index expression is a call (`abs(uv)`), which `is_side_effect_free`
    /// treats as effectful, so `rewrite_stmnt` must hoist it into a synthetic
    /// local rather than duplicating it across the `imageLoad`/`imageStore`
    /// pair §4.3's open issue warns about. Exercised through `rewrite_stmnt`
    /// (not `rewrite_expr` directly) since `maybe_hoist_image_index` only runs
    /// from the statement-level `Stmnt::Expr` arm.
    #[test]
    fn image_store_compound_assign_hoists_non_side_effect_free_index() {
        let mut program = Program::new();
        let tex_ty = TypeDenoter::Buffer {
            generic: Some(Box::new(TypeDenoter::vector(PrimitiveType::Float, 4))),
            kind: BufferKind::Image { dim: ImageDimension::Dim2D, array: false },
            struct_ref: None,
        };
        let tex_var = push_var(&mut program, "t", tex_ty.clone(), None);
        let uv_var = push_var(&mut program, "uv", TypeDenoter::vector(PrimitiveType::UnsignedInt, 2), None);
        let tex = identifier(&mut program, tex_var, "t", tex_ty);
        let uv = identifier(&mut program, uv_var, "uv", TypeDenoter::vector(PrimitiveType::UnsignedInt, 2));
        let idx_call =
            push_intrinsic_call(&mut program, Intrinsic::Abs, vec![uv], TypeDenoter::vector(PrimitiveType::UnsignedInt, 2));
        let index = program.exprs.push(Expr::ArrayIndex {
            prefix: tex,
            indices: vec![idx_call],
            ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
        });
        let one = push_literal_float(&mut program, 1.0);
        let assign = program.exprs.push(Expr::Assignment {
            op: AssignOp::Add,
            lvalue: index,
            rvalue: one,
            ty: TypeCache { cached: Some(TypeDenoter::vector(PrimitiveType::Float, 4)) },
        });
        let stmnt = program.stmnts.push(Stmnt::Expr { expr: assign });

        let lvalue_ids = collect_lvalue_ids(&program);
        let mut rewriter = AstRewriter {
            flags: ConversionFlags::CONVERT_IMAGE_ACCESS,
            reports: ReportHandler::new(),
            fatal: false,
            lvalue_ids,
            current_return_type: None,
            hoist_counter: 0,
        };
        let mut out = vec![];
        rewriter.rewrite_stmnt(&mut program, stmnt, &mut out);

        assert_eq!(out.len(), 1, "the non-side-effect-free index must be hoisted into one synthetic statement");
        let hoisted_var = match &program.stmnts[out[0]] {
            Stmnt::VarDecl(s) => {
                assert_eq!(program.var_decl_stmnts[*s].var_decls.len(), 1);
                program.var_decl_stmnts[*s].var_decls[0]
            }
            other => panic!("expected hoisted var-decl statement, got {:?}", other),
        };
        assert!(program.var_decls[hoisted_var].ident.starts_with("_hoisted_idx"));
        assert_eq!(program.var_decls[hoisted_var].initializer, Some(idx_call));

        match &program.stmnts[stmnt] {
            Stmnt::Expr { expr } => match &program.exprs[*expr] {
                Expr::Call { call_ref: Some(CallRef::Intrinsic(Intrinsic::ImageStore)), arguments, .. } => {
                    assert_eq!(arguments.len(), 3);
                    // The store's index is `ivec2(_hoisted_idxN)`, not the
                    // original call — the call only ever runs once, inside
                    // the hoisted initializer.
                    match &program.exprs[arguments[1]] {
                        Expr::Call { call_ref: Some(CallRef::TypeConstructor), arguments: ctor_args, .. } => {
                            assert_eq!(ctor_args.len(), 1);
                            match &program.exprs[ctor_args[0]] {
                                Expr::Identifier { symbol_ref: Some(IdentifierRef::Var(v)), .. } => {
                                    assert_eq!(*v, hoisted_var);
                                }
                                other => panic!("expected hoisted identifier, got {:?}", other),
                            }
                        }
                        other => panic!("expected int-vector constructor call, got {:?}", other),
                    }
                }
                other => panic!("expected imageStore(...) call, got {:?}", other),
            },
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn scalar_broadcasts_into_vector_without_zero_padding() {
        let mut program = Program::new();
        let lit = push_literal_float(&mut program, 1.0);
        let mut rewriter = AstRewriter {
            flags: ConversionFlags::CONVERT_IMPLICIT_CASTS,
            reports: ReportHandler::new(),
            fatal: false,
            lvalue_ids: HashSet::new(),
            current_return_type: None,
            hoist_counter: 0,
        };
        let target = TypeDenoter::vector(PrimitiveType::Float, 4);
        let result = rewriter.convert_to_target_type(&mut program, lit, &target, true);
        match &program.exprs[result] {
            Expr::Call { arguments, .. } => assert_eq!(arguments.len(), 1),
            other => panic!("expected a single-argument constructor call, got {:?}", other),
        }
    }
}
