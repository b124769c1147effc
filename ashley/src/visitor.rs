//! Shared AST traversal substrate.
//!
//! Design Notes §9 calls for tagged-union dispatch with pre-/post-visit
//! hooks in place of the original's overriding-virtual-visitor surface, plus
//! scoped-guard push/pop wrappers for the "current function"/"current
//! struct"/"current l-value" context the original carried as mutable
//! visitor-member state. [`AstVisitor::walk_expr`] is the one traversal every
//! pass that needs to look at (or replace) sub-expressions shares: the
//! reference analyzer walks it read-only, the rewriter overrides
//! `post_visit_expr` to return a replacement node.

use crate::ast::{Expr, Id, Program};

/// Pushes `value` onto `stack` and pops it on drop, restoring the context on
/// every exit path (including `?`/panic-unwind) the way the original's
/// member-stack push/pop pairs had to be restored manually. A `pop()` that
/// finds the stack empty is an internal-error invariant violation elsewhere
/// in this crate, never here: the guard is the only thing that pops.
pub struct ScopeGuard<'a, T> {
    stack: &'a mut Vec<T>,
}

impl<'a, T> ScopeGuard<'a, T> {
    pub fn new(stack: &'a mut Vec<T>, value: T) -> ScopeGuard<'a, T> {
        stack.push(value);
        ScopeGuard { stack }
    }
}

impl<'a, T> Drop for ScopeGuard<'a, T> {
    fn drop(&mut self) {
        self.stack.pop().expect("scope stack underflow (internal error)");
    }
}

/// Tagged-union dispatch over [`Expr`] with pre-/post-visit hooks.
///
/// `pre_visit_expr`/`post_visit_expr` return the [`Id<Expr>`] that should be
/// used from this point on — the default no-op implementation returns the
/// id unchanged, so a read-only pass (reference analysis, type inference)
/// never needs to override them. A rewriting pass overrides `post_visit_expr`
/// to push a new node into the arena and return its id; `walk_expr` writes
/// the returned ids back into the parent node's fields itself, which is what
/// makes "replace the pointer in the parent slot" (spec §4.3) fall out of
/// the traversal rather than needing parent back-pointers.
pub trait AstVisitor {
    fn pre_visit_expr(&mut self, _program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        id
    }

    fn post_visit_expr(&mut self, _program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        id
    }

    /// Visits `id` and all its children in pre-order/post-order, returning
    /// the (possibly replaced) id for the subtree rooted at `id`.
    fn walk_expr(&mut self, program: &mut Program, id: Id<Expr>) -> Id<Expr> {
        let id = self.pre_visit_expr(program, id);
        match &program.exprs[id] {
            Expr::Null
            | Expr::Literal { .. }
            | Expr::Identifier { .. }
            | Expr::TypeSpecifier { .. } => {}
            Expr::ObjectAccess { prefix, .. } => {
                let prefix = *prefix;
                let new_prefix = self.walk_expr(program, prefix);
                if let Expr::ObjectAccess { prefix, .. } = &mut program.exprs[id] {
                    *prefix = new_prefix;
                }
            }
            Expr::ArrayIndex { prefix, indices, .. } => {
                let prefix = *prefix;
                let indices = indices.clone();
                let new_prefix = self.walk_expr(program, prefix);
                let new_indices: Vec<_> =
                    indices.into_iter().map(|e| self.walk_expr(program, e)).collect();
                if let Expr::ArrayIndex { prefix, indices, .. } = &mut program.exprs[id] {
                    *prefix = new_prefix;
                    *indices = new_indices;
                }
            }
            Expr::Call { prefix, arguments, .. } => {
                let prefix = *prefix;
                let arguments = arguments.clone();
                let new_prefix = self.walk_expr(program, prefix);
                let new_args: Vec<_> =
                    arguments.into_iter().map(|e| self.walk_expr(program, e)).collect();
                if let Expr::Call { prefix, arguments, .. } = &mut program.exprs[id] {
                    *prefix = new_prefix;
                    *arguments = new_args;
                }
            }
            Expr::Cast { expr, .. } => {
                let e = *expr;
                let new_e = self.walk_expr(program, e);
                if let Expr::Cast { expr, .. } = &mut program.exprs[id] {
                    *expr = new_e;
                }
            }
            Expr::Bracket { expr, .. } => {
                let e = *expr;
                let new_e = self.walk_expr(program, e);
                if let Expr::Bracket { expr, .. } = &mut program.exprs[id] {
                    *expr = new_e;
                }
            }
            Expr::Unary { expr, .. } => {
                let e = *expr;
                let new_e = self.walk_expr(program, e);
                if let Expr::Unary { expr, .. } = &mut program.exprs[id] {
                    *expr = new_e;
                }
            }
            Expr::PostUnary { expr, .. } => {
                let e = *expr;
                let new_e = self.walk_expr(program, e);
                if let Expr::PostUnary { expr, .. } = &mut program.exprs[id] {
                    *expr = new_e;
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                let (l, r) = (*lhs, *rhs);
                let nl = self.walk_expr(program, l);
                let nr = self.walk_expr(program, r);
                if let Expr::Binary { lhs, rhs, .. } = &mut program.exprs[id] {
                    *lhs = nl;
                    *rhs = nr;
                }
            }
            Expr::Ternary { condition, then_expr, else_expr, .. } => {
                let (c, t, e) = (*condition, *then_expr, *else_expr);
                let nc = self.walk_expr(program, c);
                let nt = self.walk_expr(program, t);
                let ne = self.walk_expr(program, e);
                if let Expr::Ternary { condition, then_expr, else_expr, .. } = &mut program.exprs[id] {
                    *condition = nc;
                    *then_expr = nt;
                    *else_expr = ne;
                }
            }
            Expr::Assignment { lvalue, rvalue, .. } => {
                let (lv, rv) = (*lvalue, *rvalue);
                let nlv = self.walk_expr(program, lv);
                let nrv = self.walk_expr(program, rv);
                if let Expr::Assignment { lvalue, rvalue, .. } = &mut program.exprs[id] {
                    *lvalue = nlv;
                    *rvalue = nrv;
                }
            }
            Expr::Sequence { exprs, .. } => {
                let exprs = exprs.clone();
                let new_exprs: Vec<_> = exprs.into_iter().map(|e| self.walk_expr(program, e)).collect();
                if let Expr::Sequence { exprs, .. } = &mut program.exprs[id] {
                    *exprs = new_exprs;
                }
            }
            Expr::InitializerList { exprs, .. } => {
                let exprs = exprs.clone();
                let new_exprs: Vec<_> = exprs.into_iter().map(|e| self.walk_expr(program, e)).collect();
                if let Expr::InitializerList { exprs, .. } = &mut program.exprs[id] {
                    *exprs = new_exprs;
                }
            }
        }
        self.post_visit_expr(program, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_guard_pops_on_drop() {
        let mut stack: Vec<i32> = vec![];
        {
            let _guard = ScopeGuard::new(&mut stack, 1);
            assert_eq!(stack, vec![1]);
        }
        assert_eq!(stack, Vec::<i32>::new());
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn popping_empty_stack_is_internal_error() {
        let mut stack: Vec<i32> = vec![];
        stack.pop().expect("scope stack underflow (internal error)");
    }

    struct CountingVisitor {
        visits: u32,
    }
    impl AstVisitor for CountingVisitor {
        fn post_visit_expr(&mut self, _program: &mut Program, id: Id<Expr>) -> Id<Expr> {
            self.visits += 1;
            id
        }
    }

    #[test]
    fn walk_expr_visits_every_descendant() {
        use crate::ast::{BinaryOp, Literal, TypeCache};
        let mut program = Program::new();
        let lhs = program.exprs.push(Expr::Literal { value: Literal::Int(1), ty: TypeCache::default() });
        let rhs = program.exprs.push(Expr::Literal { value: Literal::Int(2), ty: TypeCache::default() });
        let bin = program.exprs.push(Expr::Binary { op: BinaryOp::Add, lhs, rhs, ty: TypeCache::default() });
        let mut v = CountingVisitor { visits: 0 };
        v.walk_expr(&mut program, bin);
        assert_eq!(v.visits, 3);
    }
}
