//! Reachability pass (§4.2): marks every declaration transitively
//! referenced from the entry point with `NodeFlags::IS_REACHABLE`, and
//! collects the set of HLSL intrinsics the reachable code actually calls.
//!
//! Grounded on `ReferenceAnalyzer.cpp`'s depth-first walk from the entry
//! function, guarded against revisiting a declaration by checking the flag
//! itself before recursing — the flag doubles as the visited-set, so a
//! function called from two call sites is only walked once.

use crate::ast::*;
use crate::intrinsics::Intrinsic;
use std::collections::HashSet;

pub struct ReachabilityResult {
    pub used_intrinsics: HashSet<Intrinsic>,
}

/// Walks from `program.entry_point`, marking every transitively referenced
/// declaration `IS_REACHABLE`. A program with no entry point marks nothing
/// reachable; the emitter is expected to have already reported that as an
/// error before calling this.
pub fn mark_reachable(program: &mut Program) -> ReachabilityResult {
    let mut analyzer = ReferenceAnalyzer { program, used_intrinsics: HashSet::new() };
    if let Some(entry) = program_entry_point(analyzer.program) {
        analyzer.visit_function(entry);
    }
    ReachabilityResult { used_intrinsics: analyzer.used_intrinsics }
}

fn program_entry_point(program: &Program) -> Option<Id<FunctionDecl>> {
    program.entry_point
}

struct ReferenceAnalyzer<'p> {
    program: &'p mut Program,
    used_intrinsics: HashSet<Intrinsic>,
}

impl<'p> ReferenceAnalyzer<'p> {
    fn visit_function(&mut self, id: Id<FunctionDecl>) {
        if self.program.function_decls[id].flags.contains(NodeFlags::IS_REACHABLE) {
            return;
        }
        self.program.function_decls[id].flags.insert(NodeFlags::IS_REACHABLE);

        let ret_spec = self.program.function_decls[id].return_type;
        self.visit_type_specifier(ret_spec);

        if let Some(struct_ref) = self.program.function_decls[id].struct_decl_ref {
            self.visit_struct(struct_ref);
        }

        let params = self.program.function_decls[id].parameters.clone();
        for p in params {
            self.visit_var_decl_stmnt(p);
        }

        let block = self.program.function_decls[id].code_block;
        self.visit_code_block(block);
    }

    fn visit_struct(&mut self, id: Id<StructDecl>) {
        if self.program.struct_decls[id].flags.contains(NodeFlags::IS_REACHABLE) {
            return;
        }
        self.program.struct_decls[id].flags.insert(NodeFlags::IS_REACHABLE);
        let members = self.program.struct_decls[id].members.clone();
        for m in members {
            self.visit_var_decl_stmnt(m);
        }
    }

    fn visit_var_decl_stmnt(&mut self, id: Id<VarDeclStmnt>) {
        let spec = self.program.var_decl_stmnts[id].type_specifier;
        self.visit_type_specifier(spec);
        let decls = self.program.var_decl_stmnts[id].var_decls.clone();
        for vd in decls {
            self.visit_var_decl(vd);
        }
    }

    fn visit_var_decl(&mut self, id: Id<VarDecl>) {
        self.program.var_decls[id].flags.insert(NodeFlags::IS_REACHABLE);
        let dims = self.program.var_decls[id].array_dims.clone();
        for e in dims {
            self.visit_expr(e);
        }
        if let Some(init) = self.program.var_decls[id].initializer {
            self.visit_expr(init);
        }
    }

    fn visit_type_specifier(&mut self, id: Id<TypeSpecifier>) {
        match self.program.type_specifiers[id].denoter.clone() {
            Some(TypeDenoter::Struct { decl_ref, .. }) => self.visit_struct(decl_ref),
            Some(TypeDenoter::Alias { decl_ref, .. }) => {
                // The alias's own target may itself name a struct; walk it
                // by constructing its denoter rather than re-resolving a
                // type specifier (aliases have no backing TypeSpecifier).
                self.visit_aliased_type(decl_ref);
            }
            _ => {}
        }
    }

    fn visit_aliased_type(&mut self, id: Id<AliasDecl>) {
        let mut target = self.program.alias_decls[id].aliased_type.clone();
        loop {
            match target {
                TypeDenoter::Struct { decl_ref, .. } => {
                    self.visit_struct(decl_ref);
                    return;
                }
                TypeDenoter::Alias { decl_ref, .. } => {
                    target = self.program.alias_decls[decl_ref].aliased_type.clone();
                }
                _ => return,
            }
        }
    }

    fn visit_code_block(&mut self, id: Id<CodeBlock>) {
        let stmnts = self.program.code_blocks[id].stmnts.clone();
        for s in stmnts {
            self.visit_stmnt(s);
        }
    }

    fn visit_stmnt(&mut self, id: Id<Stmnt>) {
        match self.program.stmnts[id] {
            Stmnt::Null | Stmnt::CtrlTransfer(_) => {}
            Stmnt::CodeBlock(block) => self.visit_code_block(block),
            Stmnt::For { init, condition, iteration, body } => {
                if let Some(init) = init {
                    self.visit_stmnt(init);
                }
                if let Some(c) = condition {
                    self.visit_expr(c);
                }
                if let Some(it) = iteration {
                    self.visit_expr(it);
                }
                self.visit_stmnt(body);
            }
            Stmnt::While { condition, body } => {
                self.visit_expr(condition);
                self.visit_stmnt(body);
            }
            Stmnt::DoWhile { body, condition } => {
                self.visit_stmnt(body);
                self.visit_expr(condition);
            }
            Stmnt::If { condition, then_body, else_body } => {
                self.visit_expr(condition);
                self.visit_stmnt(then_body);
                if let Some(e) = else_body {
                    self.visit_stmnt(e);
                }
            }
            Stmnt::Switch { selector, .. } => {
                self.visit_expr(selector);
                let cases = match &self.program.stmnts[id] {
                    Stmnt::Switch { cases, .. } => {
                        cases.iter().map(|c| (c.expr, c.stmnts.clone())).collect::<Vec<_>>()
                    }
                    _ => unreachable!(),
                };
                for (expr, stmnts) in cases {
                    if let Some(e) = expr {
                        self.visit_expr(e);
                    }
                    for s in stmnts {
                        self.visit_stmnt(s);
                    }
                }
            }
            Stmnt::Expr { expr } => self.visit_expr(expr),
            Stmnt::Return { expr, .. } => {
                if let Some(e) = expr {
                    self.visit_expr(e);
                }
            }
            Stmnt::VarDecl(stmnt) => self.visit_var_decl_stmnt(stmnt),
        }
    }

    fn visit_expr(&mut self, id: Id<Expr>) {
        match self.program.exprs[id] {
            Expr::Null | Expr::Literal { .. } | Expr::Identifier { .. } => {
                self.visit_identifier_ref(id);
            }
            Expr::ObjectAccess { prefix, .. } => {
                self.visit_expr(prefix);
                self.visit_object_access_ref(id);
            }
            Expr::ArrayIndex { prefix, .. } => {
                self.visit_expr(prefix);
                let indices = match &self.program.exprs[id] {
                    Expr::ArrayIndex { indices, .. } => indices.clone(),
                    _ => unreachable!(),
                };
                for idx in indices {
                    self.visit_expr(idx);
                }
            }
            Expr::Call { prefix, .. } => {
                self.visit_expr(prefix);
                let arguments = match &self.program.exprs[id] {
                    Expr::Call { arguments, .. } => arguments.clone(),
                    _ => unreachable!(),
                };
                for a in arguments {
                    self.visit_expr(a);
                }
                self.visit_call_ref(id);
            }
            Expr::Cast { type_specifier, expr, .. } => {
                self.visit_type_specifier(type_specifier);
                self.visit_expr(expr);
            }
            Expr::Bracket { expr, .. }
            | Expr::Unary { expr, .. }
            | Expr::PostUnary { expr, .. } => self.visit_expr(expr),
            Expr::Binary { lhs, rhs, .. } => {
                self.visit_expr(lhs);
                self.visit_expr(rhs);
            }
            Expr::Ternary { condition, then_expr, else_expr, .. } => {
                self.visit_expr(condition);
                self.visit_expr(then_expr);
                self.visit_expr(else_expr);
            }
            Expr::Assignment { lvalue, rvalue, .. } => {
                self.visit_expr(lvalue);
                self.visit_expr(rvalue);
            }
            Expr::Sequence { .. } => {
                let exprs = match &self.program.exprs[id] {
                    Expr::Sequence { exprs, .. } => exprs.clone(),
                    _ => unreachable!(),
                };
                for e in exprs {
                    self.visit_expr(e);
                }
            }
            Expr::InitializerList { .. } => {
                let exprs = match &self.program.exprs[id] {
                    Expr::InitializerList { exprs, .. } => exprs.clone(),
                    _ => unreachable!(),
                };
                for e in exprs {
                    self.visit_expr(e);
                }
            }
            Expr::TypeSpecifier { type_specifier, .. } => self.visit_type_specifier(type_specifier),
        }
    }

    fn visit_identifier_ref(&mut self, id: Id<Expr>) {
        if let Expr::Identifier { symbol_ref: Some(r), .. } = &self.program.exprs[id] {
            match *r {
                IdentifierRef::Var(v) => {
                    self.program.var_decls[v].flags.insert(NodeFlags::IS_REACHABLE);
                }
                IdentifierRef::Buffer(b) => {
                    self.program.buffer_decls[b].flags.insert(NodeFlags::IS_REACHABLE);
                    if let Some(struct_ref) = self.program.buffer_decls[b].ty.struct_ref_of() {
                        self.visit_struct(struct_ref);
                    }
                }
                IdentifierRef::Sampler(s) => {
                    self.program.sampler_decls[s].flags.insert(NodeFlags::IS_REACHABLE);
                }
            }
        }
    }

    fn visit_object_access_ref(&mut self, id: Id<Expr>) {
        if let Expr::ObjectAccess { symbol_ref: Some(ObjectAccessRef::StructMember(v)), .. } = &self.program.exprs[id]
        {
            self.program.var_decls[*v].flags.insert(NodeFlags::IS_REACHABLE);
        }
    }

    fn visit_call_ref(&mut self, id: Id<Expr>) {
        match &self.program.exprs[id] {
            Expr::Call { call_ref: Some(CallRef::Function(f)), .. } => {
                self.visit_function(*f);
            }
            Expr::Call { call_ref: Some(CallRef::Intrinsic(intrinsic)), .. } => {
                self.used_intrinsics.insert(*intrinsic);
            }
            _ => {}
        }
    }
}

impl TypeDenoter {
    fn struct_ref_of(&self) -> Option<Id<StructDecl>> {
        match self {
            TypeDenoter::Buffer { struct_ref, .. } => *struct_ref,
            TypeDenoter::Struct { decl_ref, .. } => Some(*decl_ref),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeFlags, SourceSpan, TypeCache};

    fn make_leaf_function(program: &mut Program, ident: &str) -> Id<FunctionDecl> {
        let ret = program.type_specifiers.push(TypeSpecifier {
            span: SourceSpan::default(),
            denoter: Some(TypeDenoter::VOID),
            unresolved_name: None,
            struct_decl: None,
        });
        let block = program.code_blocks.push(CodeBlock { stmnts: vec![] });
        program.function_decls.push(FunctionDecl {
            span: SourceSpan::default(),
            ident: ident.into(),
            return_type: ret,
            parameters: vec![],
            code_block: block,
            struct_decl_ref: None,
            num_threads: None,
            return_semantic: None,
            flags: NodeFlags::default(),
        })
    }

    #[test]
    fn unreferenced_function_stays_unreachable() {
        let mut program = Program::new();
        let entry = make_leaf_function(&mut program, "main");
        let dead = make_leaf_function(&mut program, "unused");
        program.entry_point = Some(entry);

        mark_reachable(&mut program);

        assert!(program.function_decls[entry].flags.contains(NodeFlags::IS_REACHABLE));
        assert!(!program.function_decls[dead].flags.contains(NodeFlags::IS_REACHABLE));
    }

    #[test]
    fn called_function_becomes_reachable() {
        let mut program = Program::new();
        let callee = make_leaf_function(&mut program, "helper");

        let callee_ident = program.exprs.push(Expr::Identifier {
            ident: "helper".into(),
            symbol_ref: None,
            ty: TypeCache::default(),
        });
        let call = program.exprs.push(Expr::Call {
            prefix: callee_ident,
            arguments: vec![],
            call_ref: Some(CallRef::Function(callee)),
            ty: TypeCache::default(),
        });
        let call_stmnt = program.stmnts.push(Stmnt::Expr { expr: call });

        let ret = program.type_specifiers.push(TypeSpecifier {
            span: SourceSpan::default(),
            denoter: Some(TypeDenoter::VOID),
            unresolved_name: None,
            struct_decl: None,
        });
        let block = program.code_blocks.push(CodeBlock { stmnts: vec![call_stmnt] });
        let entry = program.function_decls.push(FunctionDecl {
            span: SourceSpan::default(),
            ident: "main".into(),
            return_type: ret,
            parameters: vec![],
            code_block: block,
            struct_decl_ref: None,
            num_threads: None,
            return_semantic: None,
            flags: NodeFlags::default(),
        });
        program.entry_point = Some(entry);

        mark_reachable(&mut program);

        assert!(program.function_decls[callee].flags.contains(NodeFlags::IS_REACHABLE));
    }
}
