//! Lexically scoped symbol table (§3.3).
//!
//! A stack of scopes, each mapping an identifier to a [`Binding`]. Variables,
//! aliases and structs bind to at most one declaration per scope; functions
//! bind to an ordered overload set, disambiguated later by argument types.
//! Grounded on `Analyzer::Register`/`Analyzer::Fetch*`'s scope-stack
//! discipline and `Analyzer::FetchSimilarIdent`'s two-tier
//! (struct-then-scope-chain) suggestion search.

use crate::ast::{AliasDecl, BufferDecl, FunctionDecl, Id, SamplerDecl, StructDecl, VarDecl};
use indexmap::IndexMap;
use smallvec::SmallVec;
use smol_str::SmolStr;

#[derive(Debug, Clone)]
pub enum Binding {
    Var(Id<VarDecl>),
    Buffer(Id<BufferDecl>),
    Sampler(Id<SamplerDecl>),
    Struct(Id<StructDecl>),
    Alias(Id<AliasDecl>),
    /// Never empty: a name only enters the table as `Functions` once its
    /// first declaration is registered.
    Functions(SmallVec<[Id<FunctionDecl>; 2]>),
}

impl Binding {
    pub fn as_var(&self) -> Option<Id<VarDecl>> {
        match self {
            Binding::Var(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_functions(&self) -> Option<&[Id<FunctionDecl>]> {
        match self {
            Binding::Functions(ids) => Some(ids),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    bindings: IndexMap<SmolStr, Binding>,
}

/// Error returned by [`SymbolTable::declare`] when `name` is already bound
/// in the *current* scope to something other than a function overload.
#[derive(Debug, Clone)]
pub struct AlreadyDeclared {
    pub existing: Binding,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable { scopes: vec![Scope::default()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Closes the current scope and returns every binding it introduced, in
    /// declaration order, so the caller (the analyzer's on-release hook) can
    /// run "declared but never read" checks over the vars that just went
    /// out of scope.
    pub fn pop_scope(&mut self) -> Vec<(SmolStr, Binding)> {
        let scope = self.scopes.pop().expect("symbol table scope underflow (internal error)");
        scope.bindings.into_iter().collect()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn current(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("symbol table has no open scope (internal error)")
    }

    /// Registers a non-function declaration in the current scope. Fails if
    /// the name is already bound in this scope (shadowing an outer scope's
    /// binding of the same name is always allowed).
    pub fn declare(&mut self, name: SmolStr, binding: Binding) -> Result<(), AlreadyDeclared> {
        if let Some(existing) = self.current().bindings.get(&name) {
            return Err(AlreadyDeclared { existing: existing.clone() });
        }
        self.current().bindings.insert(name, binding);
        Ok(())
    }

    /// Registers one overload of a function in the current scope, appending
    /// to the name's overload set if one already exists there.
    pub fn declare_function(&mut self, name: SmolStr, decl: Id<FunctionDecl>) {
        match self.current().bindings.get_mut(&name) {
            Some(Binding::Functions(set)) => set.push(decl),
            Some(_) => {
                // A non-function already claimed this name in this scope;
                // the caller is expected to have reported that error via
                // `declare` before ever reaching here for a colliding name.
                self.current().bindings.insert(name, Binding::Functions(SmallVec::from_slice(&[decl])));
            }
            None => {
                self.current().bindings.insert(name, Binding::Functions(SmallVec::from_slice(&[decl])));
            }
        }
    }

    /// Innermost-to-outermost lookup through the scope chain.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.bindings.get(name))
    }

    /// All identifiers currently visible, innermost scope first, for the
    /// "did you mean X?" suggestion search.
    pub fn visible_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.scopes.iter().rev().flat_map(|scope| scope.bindings.keys())
    }

    /// Closest visible identifier to `name` within edit distance 2, per
    /// `Analyzer::FetchSimilarIdent`. `extra` supplies additional candidates
    /// not in the scope chain (e.g. the active struct's member names, which
    /// the analyzer fetches from a separate member table).
    pub fn suggest<'a>(&'a self, name: &str, extra: impl Iterator<Item = &'a SmolStr>) -> Option<SmolStr> {
        let mut best: Option<(u32, SmolStr)> = None;
        for candidate in self.visible_names().chain(extra) {
            if candidate.as_str() == name {
                continue;
            }
            let dist = edit_distance(name, candidate);
            if dist <= 2 && best.as_ref().map_or(true, |(d, _)| dist < *d) {
                best = Some((dist, candidate.clone()));
            }
        }
        best.map(|(_, name)| name)
    }
}

/// Levenshtein edit distance. Hand-rolled per SPEC_FULL.md §3.3 — not worth
/// a dependency for one function over short shader identifiers.
fn edit_distance(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut row: Vec<u32> = (0..=m as u32).collect();
    for i in 1..=n {
        let mut prev_diag = row[0];
        row[0] = i as u32;
        for j in 1..=m {
            let cur = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + prev_diag.min(row[j - 1]).min(row[j])
            };
            prev_diag = cur;
        }
    }
    row[m]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Arena, NodeFlags, SourceSpan, TypeSpecifier};

    fn dummy_var_id() -> Id<VarDecl> {
        let mut type_specifiers: Arena<TypeSpecifier> = Arena::new();
        let ty = type_specifiers.push(TypeSpecifier {
            span: SourceSpan::default(),
            denoter: None,
            unresolved_name: None,
            struct_decl: None,
        });
        let mut arena: Arena<VarDecl> = Arena::new();
        arena.push(VarDecl {
            span: SourceSpan::default(),
            ident: "v".into(),
            type_specifier: ty,
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
        })
    }

    fn dummy_function_decl(funcs: &mut Arena<FunctionDecl>) -> Id<FunctionDecl> {
        let mut code_blocks: Arena<crate::ast::CodeBlock> = Arena::new();
        let block = code_blocks.push(crate::ast::CodeBlock { stmnts: vec![] });
        let mut type_specifiers: Arena<TypeSpecifier> = Arena::new();
        let ret = type_specifiers.push(TypeSpecifier {
            span: SourceSpan::default(),
            denoter: None,
            unresolved_name: None,
            struct_decl: None,
        });
        funcs.push(FunctionDecl {
            span: SourceSpan::default(),
            ident: "f".into(),
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
    fn shadowing_an_outer_scope_is_allowed() {
        let mut table = SymbolTable::new();
        let outer = dummy_var_id();
        table.declare("x".into(), Binding::Var(outer)).unwrap();
        table.push_scope();
        let inner = dummy_var_id();
        assert!(table.declare("x".into(), Binding::Var(inner)).is_ok());
        assert_eq!(table.lookup("x").unwrap().as_var(), Some(inner));
        table.pop_scope();
        assert_eq!(table.lookup("x").unwrap().as_var(), Some(outer));
    }

    #[test]
    fn redeclaring_in_same_scope_fails() {
        let mut table = SymbolTable::new();
        table.declare("x".into(), Binding::Var(dummy_var_id())).unwrap();
        assert!(table.declare("x".into(), Binding::Var(dummy_var_id())).is_err());
    }

    #[test]
    fn function_overloads_accumulate_in_declaration_order() {
        let mut table = SymbolTable::new();
        let mut funcs: Arena<FunctionDecl> = Arena::new();
        let f1 = dummy_function_decl(&mut funcs);
        let f2 = dummy_function_decl(&mut funcs);
        table.declare_function("f".into(), f1);
        table.declare_function("f".into(), f2);
        assert_eq!(table.lookup("f").unwrap().as_functions(), Some(&[f1, f2][..]));
    }

    #[test]
    fn suggest_finds_close_misspelling() {
        let mut table = SymbolTable::new();
        table.declare("position".into(), Binding::Var(dummy_var_id())).unwrap();
        let suggestion = table.suggest("positoin", std::iter::empty());
        assert_eq!(suggestion, Some(SmolStr::from("position")));
    }

    #[test]
    fn suggest_returns_none_when_nothing_close() {
        let table = SymbolTable::new();
        assert_eq!(table.suggest("zzzzzzzzzz", std::iter::empty()), None);
    }
}
