//! Typed source AST and type denoter lattice.
//!
//! Node storage follows the arena-of-typed-indices pattern: every node kind
//! lives in its own `Arena<T>`, cross-references between nodes are stable
//! `Id<T>` indices rather than pointers, and the whole arena set is freed in
//! one shot at the end of a compilation.

use indexmap::IndexSet;
use smallvec::SmallVec;
use smol_str::SmolStr;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    num::NonZeroU32,
    ops::{Index, IndexMut, Range},
};

// ---------------------------------------------------------------------------
// Id / Arena substrate
// ---------------------------------------------------------------------------

#[repr(transparent)]
pub struct Id<T>(NonZeroU32, PhantomData<fn() -> T>);

impl<T> Id<T> {
    pub fn index(&self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub fn dummy() -> Id<T> {
        unsafe { Id(NonZeroU32::new_unchecked(u32::MAX), PhantomData) }
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Id(self.0, PhantomData)
    }
}
impl<T> Copy for Id<T> {}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}
impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

#[derive(Debug)]
pub struct IdRange<T>(Id<T>, Id<T>);

impl<T> IdRange<T> {
    pub fn range(&self) -> Range<usize> {
        self.0.index()..self.1.index()
    }
}

impl<T> Clone for IdRange<T> {
    fn clone(&self) -> Self {
        IdRange(self.0, self.1)
    }
}
impl<T> Copy for IdRange<T> {}

#[derive(Debug)]
pub struct Arena<T> {
    pub items: Vec<T>,
}

impl<T> Arena<T> {
    pub fn new() -> Arena<T> {
        Arena { items: vec![] }
    }

    pub fn push(&mut self, item: T) -> Id<T> {
        self.items.push(item);
        unsafe { Id(NonZeroU32::new_unchecked(self.items.len() as u32), PhantomData) }
    }

    pub fn last_id(&self) -> Option<Id<T>> {
        if self.items.is_empty() {
            None
        } else {
            unsafe { Some(Id(NonZeroU32::new_unchecked(self.items.len() as u32), PhantomData)) }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = (Id<T>, &T)> + '_ {
        self.items.iter().enumerate().map(|(i, v)| {
            (unsafe { Id(NonZeroU32::new_unchecked((i + 1) as u32), PhantomData) }, v)
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;
    fn index(&self, index: Id<T>) -> &Self::Output {
        &self.items[index.index()]
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    fn index_mut(&mut self, index: Id<T>) -> &mut Self::Output {
        &mut self.items[index.index()]
    }
}

impl<T> Index<IdRange<T>> for Arena<T> {
    type Output = [T];
    fn index(&self, index: IdRange<T>) -> &Self::Output {
        &self.items[index.range()]
    }
}

#[derive(Debug)]
pub struct UniqueArena<T> {
    set: IndexSet<T>,
}

impl<T: Hash + Eq> UniqueArena<T> {
    pub fn new() -> UniqueArena<T> {
        UniqueArena { set: IndexSet::new() }
    }

    pub fn add(&mut self, item: T) -> Id<T> {
        let index = self.set.insert_full(item).0;
        unsafe { Id(NonZeroU32::new_unchecked((index + 1) as u32), PhantomData) }
    }
}

impl<T> Index<Id<T>> for UniqueArena<T> {
    type Output = T;
    fn index(&self, index: Id<T>) -> &Self::Output {
        &self.set[index.index()]
    }
}

// ---------------------------------------------------------------------------
// Decoration flags
// ---------------------------------------------------------------------------

bitflags::bitflags! {
    /// Per-node decoration bits, set incrementally by the analyzer,
    /// reference-analyzer and rewriter passes.
    #[derive(Default)]
    pub struct NodeFlags: u32 {
        const IS_REACHABLE            = 1 << 0;
        const IS_ENTRY_POINT          = 1 << 1;
        const IS_SECONDARY_ENTRY_POINT = 1 << 2;
        const IS_SHADER_INPUT         = 1 << 3;
        const IS_SHADER_OUTPUT        = 1 << 4;
        const IS_END_OF_FUNCTION      = 1 << 5;
        const WAS_CONVERTED           = 1 << 6;
        const DISABLE_CODE_GEN        = 1 << 7;
        const IS_READ_FROM            = 1 << 8;
        const IS_STATIC               = 1 << 9;
    }
}

// ---------------------------------------------------------------------------
// Type denoter lattice
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, strum::Display)]
pub enum PrimitiveType {
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "uint")]
    UnsignedInt,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "double")]
    Double,
}

impl PrimitiveType {
    /// Position in the implicit numeric promotion ladder used by
    /// [`TypeDenoter::find_common`]: bool < int < uint < float < double.
    pub fn promotion_rank(self) -> u8 {
        match self {
            PrimitiveType::Bool => 0,
            PrimitiveType::Int => 1,
            PrimitiveType::UnsignedInt => 2,
            PrimitiveType::Float => 3,
            PrimitiveType::Double => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ImageDimension {
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BufferKind {
    /// `cbuffer`/ constant buffer, GLSL uniform block.
    Constant,
    /// Read-only structured/byte-address buffer, GLSL `readonly buffer`.
    StructuredReadOnly,
    /// Read-write structured/byte-address buffer, GLSL `buffer`.
    StructuredReadWrite,
    /// `RWBuffer<T>`/`RWTexture1D..3D<T>` and array/MS variants — a
    /// random-access image resource, lowered through `imageLoad`/
    /// `imageStore` rather than plain indexing (§4.3 `ConvertImageAccess`).
    Image { dim: ImageDimension, array: bool },
    /// `Buffer<T>` — a read-only typed texel buffer, lowered through
    /// `texelFetch`/`Load` (§4.3 `ConvertSamplerBufferAccess`).
    TexelBuffer,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StructField {
    pub name: SmolStr,
    pub ty: Id<TypeDenoter>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StructTypeDef {
    pub name: SmolStr,
    pub fields: Vec<StructField>,
}

/// A resolved type. Cross-references (`Struct`/`Alias` backrefs) are
/// excluded from structural equality and from [`TypeDenoter::copy`] — two
/// denoters naming the same struct by different backref ids are still the
/// same type.
#[derive(Clone, Debug)]
pub enum TypeDenoter {
    Void,
    Base {
        elem: PrimitiveType,
        /// rows=1,cols=1 -> scalar; rows=1,cols>1 -> vector; rows>1 -> matrix.
        rows: u8,
        cols: u8,
    },
    Buffer {
        /// Element type of a structured/byte-address buffer's template
        /// argument, e.g. the `float4` in `StructuredBuffer<float4>`. A
        /// plain boxed value like `Array::sub` rather than an arena id:
        /// there is no `Arena<TypeDenoter>` in `Program` to index into.
        generic: Option<Box<TypeDenoter>>,
        kind: BufferKind,
        struct_ref: Option<Id<StructDecl>>,
    },
    Sampler {
        dim: ImageDimension,
        shadow: bool,
        array: bool,
    },
    Struct {
        name: SmolStr,
        decl_ref: Id<StructDecl>,
    },
    Alias {
        name: SmolStr,
        decl_ref: Id<AliasDecl>,
    },
    Array {
        sub: Box<TypeDenoter>,
        /// 0 means "unspecified length" (trailing unsized array / runtime array).
        dims: SmallVec<[u32; 2]>,
    },
    /// Produced only by failed resolution; propagates silently through
    /// further inference so one bad declaration doesn't cascade into a
    /// flood of unrelated type errors.
    Error,
}

impl TypeDenoter {
    pub const VOID: TypeDenoter = TypeDenoter::Void;
    pub const BOOL: TypeDenoter = TypeDenoter::Base { elem: PrimitiveType::Bool, rows: 1, cols: 1 };
    pub const INT: TypeDenoter = TypeDenoter::Base { elem: PrimitiveType::Int, rows: 1, cols: 1 };
    pub const UINT: TypeDenoter =
        TypeDenoter::Base { elem: PrimitiveType::UnsignedInt, rows: 1, cols: 1 };
    pub const FLOAT: TypeDenoter = TypeDenoter::Base { elem: PrimitiveType::Float, rows: 1, cols: 1 };
    pub const DOUBLE: TypeDenoter = TypeDenoter::Base { elem: PrimitiveType::Double, rows: 1, cols: 1 };

    pub fn vector(elem: PrimitiveType, dim: u8) -> TypeDenoter {
        TypeDenoter::Base { elem, rows: 1, cols: dim }
    }

    pub fn matrix(elem: PrimitiveType, rows: u8, cols: u8) -> TypeDenoter {
        TypeDenoter::Base { elem, rows, cols }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, TypeDenoter::Base { rows: 1, cols: 1, .. })
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, TypeDenoter::Base { rows: 1, cols, .. } if *cols > 1)
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, TypeDenoter::Base { rows, .. } if *rows > 1)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeDenoter::Base { .. })
    }

    pub fn vector_dim(&self) -> Option<u8> {
        match self {
            TypeDenoter::Base { rows: 1, cols, .. } => Some(*cols),
            _ => None,
        }
    }

    pub fn base_elem(&self) -> Option<PrimitiveType> {
        match self {
            TypeDenoter::Base { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Resolves through `Alias` chains to the underlying denoter.
    ///
    /// Aliases can chain (an alias of an alias); `aliased` follows every
    /// link. A cycle is an internal-consistency violation the analyzer
    /// should have rejected at declaration time, so this simply stops after
    /// a bounded number of hops and returns the last-seen denoter rather
    /// than looping.
    pub fn aliased<'a>(&'a self, aliases: &'a Arena<AliasDecl>) -> &'a TypeDenoter {
        let mut cur = self;
        let mut hops = 0;
        while let TypeDenoter::Alias { decl_ref, .. } = cur {
            if hops > 64 {
                return cur;
            }
            cur = &aliases[*decl_ref].aliased_type;
            hops += 1;
        }
        cur
    }

    /// The element type denoter reached by indexing once (array subtype,
    /// vector component scalar, matrix row vector). `None` for non-indexable
    /// types.
    pub fn sub(&self) -> Option<TypeDenoter> {
        match self {
            TypeDenoter::Array { sub, dims } => {
                if dims.len() > 1 {
                    Some(TypeDenoter::Array { sub: sub.clone(), dims: dims[1..].into() })
                } else {
                    Some((**sub).clone())
                }
            }
            TypeDenoter::Base { elem, rows, cols } if *rows > 1 => {
                Some(TypeDenoter::Base { elem: *elem, rows: 1, cols: *cols })
            }
            TypeDenoter::Base { elem, cols, .. } if *cols > 1 => {
                Some(TypeDenoter::Base { elem: *elem, rows: 1, cols: 1 })
            }
            TypeDenoter::Buffer { generic: Some(g), .. } => Some((**g).clone()),
            _ => None,
        }
    }

    /// Structural equality, ignoring struct/alias backref identity — two
    /// `Struct` denoters are equal iff they name the same struct, and a
    /// `Struct`/`Alias` pair are equal iff the alias resolves to that struct.
    pub fn equals(&self, other: &TypeDenoter, aliases: &Arena<AliasDecl>) -> bool {
        let a = self.aliased(aliases);
        let b = other.aliased(aliases);
        match (a, b) {
            (TypeDenoter::Void, TypeDenoter::Void) => true,
            (TypeDenoter::Error, TypeDenoter::Error) => true,
            (
                TypeDenoter::Base { elem: e1, rows: r1, cols: c1 },
                TypeDenoter::Base { elem: e2, rows: r2, cols: c2 },
            ) => e1 == e2 && r1 == r2 && c1 == c2,
            (TypeDenoter::Struct { decl_ref: d1, .. }, TypeDenoter::Struct { decl_ref: d2, .. }) => {
                d1 == d2
            }
            (
                TypeDenoter::Sampler { dim: d1, shadow: s1, array: a1 },
                TypeDenoter::Sampler { dim: d2, shadow: s2, array: a2 },
            ) => d1 == d2 && s1 == s2 && a1 == a2,
            (
                TypeDenoter::Buffer { generic: g1, kind: k1, .. },
                TypeDenoter::Buffer { generic: g2, kind: k2, .. },
            ) => k1 == k2 && g1.is_some() == g2.is_some(),
            (TypeDenoter::Array { sub: s1, dims: d1 }, TypeDenoter::Array { sub: s2, dims: d2 }) => {
                d1 == d2 && s1.equals(s2, aliases)
            }
            _ => false,
        }
    }

    pub fn is_castable_to(&self, target: &TypeDenoter, aliases: &Arena<AliasDecl>) -> bool {
        let a = self.aliased(aliases);
        let b = target.aliased(aliases);
        if a.equals(b, aliases) {
            return true;
        }
        match (a, b) {
            (TypeDenoter::Error, _) | (_, TypeDenoter::Error) => true,
            // Row dimension must match exactly (no matrix-row broadcast);
            // the column (vector) dimension may differ if either side is 1,
            // i.e. a scalar broadcasts to any vector width.
            (
                TypeDenoter::Base { rows: r1, cols: c1, .. },
                TypeDenoter::Base { rows: r2, cols: c2, .. },
            ) => r1 == r2 && (c1 == c2 || *c1 == 1 || *c2 == 1),
            (TypeDenoter::Array { sub: s1, dims: d1 }, TypeDenoter::Array { sub: s2, dims: d2 }) => {
                d1 == d2 && s1.is_castable_to(s2, aliases)
            }
            (TypeDenoter::Struct { .. }, TypeDenoter::Struct { .. }) => false,
            _ => false,
        }
    }

    /// Numeric promotion used to type binary/ternary expressions: wider
    /// base type wins. When `match_type_size` is set, vector/matrix
    /// dimensions must match exactly. When it is clear (mirroring the
    /// original's `matchTypeSize = false` for `Mul`/`Div`), a plain scalar
    /// operand broadcasts against the other operand's dimensions instead of
    /// forcing a mismatch — `float4 * float` is common HLSL and must type
    /// as `float4`, not an error.
    pub fn find_common(a: &TypeDenoter, b: &TypeDenoter, match_type_size: bool) -> Option<TypeDenoter> {
        match (a, b) {
            (
                TypeDenoter::Base { elem: e1, rows: r1, cols: c1 },
                TypeDenoter::Base { elem: e2, rows: r2, cols: c2 },
            ) => {
                let elem = if e1.promotion_rank() >= e2.promotion_rank() { *e1 } else { *e2 };
                if r1 == r2 && c1 == c2 {
                    return Some(TypeDenoter::Base { elem, rows: *r1, cols: *c1 });
                }
                if match_type_size {
                    return None;
                }
                let a_scalar = *r1 == 1 && *c1 == 1;
                let b_scalar = *r2 == 1 && *c2 == 1;
                if a_scalar && !b_scalar {
                    Some(TypeDenoter::Base { elem, rows: *r2, cols: *c2 })
                } else if b_scalar && !a_scalar {
                    Some(TypeDenoter::Base { elem, rows: *r1, cols: *c1 })
                } else {
                    None
                }
            }
            (TypeDenoter::Error, other) | (other, TypeDenoter::Error) => Some(other.clone()),
            _ => None,
        }
    }

    pub fn to_string(&self, aliases: &Arena<AliasDecl>) -> String {
        match self {
            TypeDenoter::Void => "void".to_string(),
            TypeDenoter::Error => "<error-type>".to_string(),
            TypeDenoter::Base { elem, rows, cols } => match (*rows, *cols) {
                (1, 1) => elem.to_string(),
                (1, c) => format!("{}{}", vec_prefix(*elem), c),
                (r, c) => format!("{}mat{}x{}", vec_prefix(*elem), r, c),
            },
            TypeDenoter::Sampler { dim, shadow, array } => {
                let base = match dim {
                    ImageDimension::Dim1D => "sampler1D",
                    ImageDimension::Dim2D => "sampler2D",
                    ImageDimension::Dim3D => "sampler3D",
                    ImageDimension::Cube => "samplerCube",
                };
                format!(
                    "{}{}{}",
                    base,
                    if *array { "Array" } else { "" },
                    if *shadow { "Shadow" } else { "" }
                )
            }
            TypeDenoter::Struct { name, .. } => name.to_string(),
            TypeDenoter::Alias { name, decl_ref } => {
                format!("{} (= {})", name, aliases[*decl_ref].aliased_type.to_string(aliases))
            }
            TypeDenoter::Buffer { kind, .. } => match kind {
                BufferKind::Constant => "cbuffer".to_string(),
                BufferKind::StructuredReadOnly => "StructuredBuffer".to_string(),
                BufferKind::StructuredReadWrite => "RWStructuredBuffer".to_string(),
                BufferKind::Image { dim, array } => format!(
                    "RWTexture{}{}",
                    match dim {
                        ImageDimension::Dim1D => "1D",
                        ImageDimension::Dim2D => "2D",
                        ImageDimension::Dim3D => "3D",
                        ImageDimension::Cube => "Cube",
                    },
                    if *array { "Array" } else { "" }
                ),
                BufferKind::TexelBuffer => "Buffer".to_string(),
            },
            TypeDenoter::Array { sub, dims } => {
                let mut s = sub.to_string(aliases);
                for d in dims {
                    s.push('[');
                    if *d != 0 {
                        s.push_str(&d.to_string());
                    }
                    s.push(']');
                }
                s
            }
        }
    }

    /// Deep copy excluding backrefs (struct/alias decl ids are preserved as
    /// plain values, not rebuilt — there's nothing to deep-copy about an
    /// `Id<T>`).
    pub fn copy(&self) -> TypeDenoter {
        self.clone()
    }
}

fn vec_prefix(elem: PrimitiveType) -> &'static str {
    match elem {
        PrimitiveType::Bool => "bvec",
        PrimitiveType::Int => "ivec",
        PrimitiveType::UnsignedInt => "uvec",
        PrimitiveType::Float => "vec",
        PrimitiveType::Double => "dvec",
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceSpan {
    pub file: u32,
    pub start: u32,
    pub end: u32,
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct VarDecl {
    pub span: SourceSpan,
    pub ident: SmolStr,
    pub type_specifier: Id<TypeSpecifier>,
    pub array_dims: Vec<Id<Expr>>,
    pub semantic: Option<VariableSemantic>,
    pub register: Option<Register>,
    pub pack_offset: Option<PackOffset>,
    pub initializer: Option<Id<Expr>>,
    pub is_parameter: bool,
    pub is_uniform: bool,
    pub is_out_param: bool,
    pub is_const: bool,
    pub flags: NodeFlags,
}

#[derive(Debug)]
pub struct BufferDecl {
    pub span: SourceSpan,
    pub ident: SmolStr,
    pub ty: TypeDenoter,
    pub array_dims: Vec<Id<Expr>>,
    pub register: Option<Register>,
    pub flags: NodeFlags,
}

#[derive(Debug)]
pub struct SamplerDecl {
    pub span: SourceSpan,
    pub ident: SmolStr,
    pub ty: TypeDenoter,
    pub array_dims: Vec<Id<Expr>>,
    pub register: Option<Register>,
    pub flags: NodeFlags,
}

#[derive(Debug)]
pub struct StructDecl {
    pub span: SourceSpan,
    pub ident: SmolStr,
    pub members: Vec<Id<VarDeclStmnt>>,
    pub flags: NodeFlags,
}

#[derive(Debug)]
pub struct AliasDecl {
    pub span: SourceSpan,
    pub ident: SmolStr,
    pub aliased_type: TypeDenoter,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub span: SourceSpan,
    pub ident: SmolStr,
    pub return_type: Id<TypeSpecifier>,
    pub parameters: Vec<Id<VarDeclStmnt>>,
    pub code_block: Id<CodeBlock>,
    pub struct_decl_ref: Option<Id<StructDecl>>,
    pub num_threads: Option<[u32; 3]>,
    /// `: SV_Position`-style semantic attached to the function itself rather
    /// than to a parameter — only meaningful on the entry point.
    pub return_semantic: Option<VariableSemantic>,
    pub flags: NodeFlags,
}

// ---------------------------------------------------------------------------
// Declaration statements
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct VarDeclStmnt {
    pub span: SourceSpan,
    pub type_specifier: Id<TypeSpecifier>,
    pub var_decls: Vec<Id<VarDecl>>,
    pub flags: NodeFlags,
}

#[derive(Debug)]
pub struct BufferDeclStmnt {
    pub span: SourceSpan,
    pub buffer_decls: Vec<Id<BufferDecl>>,
}

#[derive(Debug)]
pub struct SamplerDeclStmnt {
    pub span: SourceSpan,
    pub sampler_decls: Vec<Id<SamplerDecl>>,
}

#[derive(Debug)]
pub struct StructDeclStmnt {
    pub span: SourceSpan,
    pub struct_decl: Id<StructDecl>,
}

#[derive(Debug)]
pub struct AliasDeclStmnt {
    pub span: SourceSpan,
    pub alias_decls: Vec<Id<AliasDecl>>,
}

/// Top-level items. Order is preserved for source-order emission (§4.4).
#[derive(Debug, Clone, Copy)]
pub enum GlobalDecl {
    Var(Id<VarDeclStmnt>),
    Buffer(Id<BufferDeclStmnt>),
    Sampler(Id<SamplerDeclStmnt>),
    Struct(Id<StructDeclStmnt>),
    Alias(Id<AliasDeclStmnt>),
    Function(Id<FunctionDecl>),
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CodeBlock {
    pub stmnts: Vec<Id<Stmnt>>,
}

#[derive(Debug, Clone)]
pub enum Stmnt {
    Null,
    CodeBlock(Id<CodeBlock>),
    For {
        init: Option<Id<Stmnt>>,
        condition: Option<Id<Expr>>,
        iteration: Option<Id<Expr>>,
        body: Id<Stmnt>,
    },
    While {
        condition: Id<Expr>,
        body: Id<Stmnt>,
    },
    DoWhile {
        body: Id<Stmnt>,
        condition: Id<Expr>,
    },
    If {
        condition: Id<Expr>,
        then_body: Id<Stmnt>,
        else_body: Option<Id<Stmnt>>,
    },
    Switch {
        selector: Id<Expr>,
        cases: Vec<SwitchCase>,
    },
    Expr {
        expr: Id<Expr>,
    },
    Return {
        expr: Option<Id<Expr>>,
        flags: NodeFlags,
    },
    CtrlTransfer(CtrlTransfer),
    VarDecl(Id<VarDeclStmnt>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CtrlTransfer {
    Break,
    Continue,
    Discard,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` denotes the `default:` case.
    pub expr: Option<Id<Expr>>,
    pub stmnts: Vec<Id<Stmnt>>,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(SmolStr),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitNot,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PostUnaryOp {
    Increment,
    Decrement,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Default)]
pub struct TypeCache {
    pub cached: Option<TypeDenoter>,
}

#[derive(Debug)]
pub enum Expr {
    Null,
    Literal {
        value: Literal,
        ty: TypeCache,
    },
    /// `a.b.c` — a chain of object accesses off a prefix expression.
    ObjectAccess {
        prefix: Id<Expr>,
        ident: SmolStr,
        /// Resolved after analysis: which kind of member this name denotes.
        symbol_ref: Option<ObjectAccessRef>,
        ty: TypeCache,
    },
    ArrayIndex {
        prefix: Id<Expr>,
        indices: Vec<Id<Expr>>,
        ty: TypeCache,
    },
    Call {
        prefix: Id<Expr>,
        arguments: Vec<Id<Expr>>,
        call_ref: Option<CallRef>,
        ty: TypeCache,
    },
    Cast {
        type_specifier: Id<TypeSpecifier>,
        expr: Id<Expr>,
        ty: TypeCache,
    },
    /// `(expr)` — always emitted with literal parens.
    Bracket {
        expr: Id<Expr>,
        ty: TypeCache,
    },
    Unary {
        op: UnaryOp,
        expr: Id<Expr>,
        ty: TypeCache,
    },
    PostUnary {
        op: PostUnaryOp,
        expr: Id<Expr>,
        ty: TypeCache,
    },
    Binary {
        op: BinaryOp,
        lhs: Id<Expr>,
        rhs: Id<Expr>,
        ty: TypeCache,
    },
    Ternary {
        condition: Id<Expr>,
        then_expr: Id<Expr>,
        else_expr: Id<Expr>,
        ty: TypeCache,
    },
    Assignment {
        op: AssignOp,
        lvalue: Id<Expr>,
        rvalue: Id<Expr>,
        ty: TypeCache,
    },
    Sequence {
        exprs: Vec<Id<Expr>>,
        ty: TypeCache,
    },
    InitializerList {
        exprs: Vec<Id<Expr>>,
        ty: TypeCache,
    },
    /// A type name used as an expression (e.g. `float3(0)` constructor call
    /// prefix); resolved to a concrete [`TypeDenoter`] during analysis.
    TypeSpecifier {
        type_specifier: Id<TypeSpecifier>,
        ty: TypeCache,
    },
    /// Variable/parameter reference by name. Resolved to a symbol during
    /// analysis; before analysis `symbol_ref` is `None`.
    Identifier {
        ident: SmolStr,
        symbol_ref: Option<IdentifierRef>,
        ty: TypeCache,
    },
}

#[derive(Debug, Copy, Clone)]
pub enum IdentifierRef {
    Var(Id<VarDecl>),
    Buffer(Id<BufferDecl>),
    Sampler(Id<SamplerDecl>),
}

#[derive(Debug, Clone)]
pub enum ObjectAccessRef {
    StructMember(Id<VarDecl>),
    /// Vector swizzle such as `.xy` / `.rgba`; stores the selected
    /// component indices (0..=3) in source order.
    Swizzle(SmallVec<[u8; 4]>),
}

#[derive(Debug, Copy, Clone)]
pub enum CallRef {
    Function(Id<FunctionDecl>),
    Intrinsic(crate::intrinsics::Intrinsic),
    /// Type-constructor call, e.g. `float3(a, b, c)`.
    TypeConstructor,
}

// ---------------------------------------------------------------------------
// Auxiliary nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TypeSpecifier {
    pub span: SourceSpan,
    /// `None` until the analyzer resolves the written type name. Base,
    /// vector, matrix, sampler and buffer types need no symbol lookup and
    /// arrive from the parser with this already populated; a named
    /// struct-or-alias type arrives with `denoter: None` and
    /// `unresolved_name: Some(name)` instead, for the analyzer to resolve.
    pub denoter: Option<TypeDenoter>,
    /// The identifier as written, for a type the parser could not resolve
    /// by itself (struct or alias name) — `None` once `denoter` is set.
    pub unresolved_name: Option<SmolStr>,
    pub struct_decl: Option<Id<StructDecl>>,
}

#[derive(Debug, Copy, Clone)]
pub struct Register {
    pub slot: u32,
    pub space: u32,
}

#[derive(Debug, Copy, Clone)]
pub struct PackOffset {
    pub component_offset: u32,
    pub component: Option<u8>,
}

/// `SV_*`/semantic bindings on a parameter, return value, or struct member.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Semantic {
    Position,
    VertexId,
    InstanceId,
    FragCoord,
    Target(u8),
    Depth,
    UserDefined,
}

#[derive(Debug, Clone)]
pub struct VariableSemantic {
    pub semantic: Semantic,
    pub user_name: Option<SmolStr>,
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Program {
    pub var_decls: Arena<VarDecl>,
    pub var_decl_stmnts: Arena<VarDeclStmnt>,
    pub buffer_decls: Arena<BufferDecl>,
    pub buffer_decl_stmnts: Arena<BufferDeclStmnt>,
    pub sampler_decls: Arena<SamplerDecl>,
    pub sampler_decl_stmnts: Arena<SamplerDeclStmnt>,
    pub struct_decls: Arena<StructDecl>,
    pub struct_decl_stmnts: Arena<StructDeclStmnt>,
    pub alias_decls: Arena<AliasDecl>,
    pub alias_decl_stmnts: Arena<AliasDeclStmnt>,
    pub function_decls: Arena<FunctionDecl>,
    pub code_blocks: Arena<CodeBlock>,
    pub stmnts: Arena<Stmnt>,
    pub exprs: Arena<Expr>,
    pub type_specifiers: Arena<TypeSpecifier>,
    pub globals: Vec<GlobalDecl>,
    pub entry_point: Option<Id<FunctionDecl>>,
    /// Registered source text, keyed by the same file ids [`SourceSpan::file`]
    /// carries, so a `Report`'s area can be rendered without the analyzer or
    /// emitter depending on real file I/O.
    pub source_files: crate::diagnostics::SourceFiles,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    /// Invalidates the memoized type of `expr`. The rewriter calls this on
    /// every node it replaces or mutates in place; there are no parent
    /// pointers in this arena model, so callers are responsible for
    /// invalidating enclosing expressions they know about.
    pub fn reset_type_denoter(&mut self, expr: Id<Expr>) {
        if let Some(cache) = expr_type_cache_mut(&mut self.exprs[expr]) {
            cache.cached = None;
        }
    }

    /// The memoized type of `expr`, if `get_type_denoter` has already run
    /// for it since the last `reset_type_denoter`.
    pub fn cached_expr_type(&self, expr: Id<Expr>) -> Option<TypeDenoter> {
        expr_type_cache(&self.exprs[expr]).and_then(|c| c.cached.clone())
    }

    pub fn set_cached_expr_type(&mut self, expr: Id<Expr>, ty: TypeDenoter) {
        if let Some(cache) = expr_type_cache_mut(&mut self.exprs[expr]) {
            cache.cached = Some(ty);
        }
    }
}

fn expr_type_cache(expr: &Expr) -> Option<&TypeCache> {
    match expr {
        Expr::Literal { ty, .. }
        | Expr::ObjectAccess { ty, .. }
        | Expr::ArrayIndex { ty, .. }
        | Expr::Call { ty, .. }
        | Expr::Cast { ty, .. }
        | Expr::Bracket { ty, .. }
        | Expr::Unary { ty, .. }
        | Expr::PostUnary { ty, .. }
        | Expr::Binary { ty, .. }
        | Expr::Ternary { ty, .. }
        | Expr::Assignment { ty, .. }
        | Expr::Sequence { ty, .. }
        | Expr::InitializerList { ty, .. }
        | Expr::TypeSpecifier { ty, .. }
        | Expr::Identifier { ty, .. } => Some(ty),
        Expr::Null => None,
    }
}

fn expr_type_cache_mut(expr: &mut Expr) -> Option<&mut TypeCache> {
    match expr {
        Expr::Literal { ty, .. }
        | Expr::ObjectAccess { ty, .. }
        | Expr::ArrayIndex { ty, .. }
        | Expr::Call { ty, .. }
        | Expr::Cast { ty, .. }
        | Expr::Bracket { ty, .. }
        | Expr::Unary { ty, .. }
        | Expr::PostUnary { ty, .. }
        | Expr::Binary { ty, .. }
        | Expr::Ternary { ty, .. }
        | Expr::Assignment { ty, .. }
        | Expr::Sequence { ty, .. }
        | Expr::InitializerList { ty, .. }
        | Expr::TypeSpecifier { ty, .. }
        | Expr::Identifier { ty, .. } => Some(ty),
        Expr::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_ids_are_stable_across_pushes() {
        let mut arena: Arena<i32> = Arena::new();
        let a = arena.push(1);
        let b = arena.push(2);
        assert_eq!(arena[a], 1);
        assert_eq!(arena[b], 2);
    }

    #[test]
    fn find_common_promotes_to_wider_type() {
        let f = TypeDenoter::FLOAT;
        let i = TypeDenoter::INT;
        let common = TypeDenoter::find_common(&f, &i, true).unwrap();
        assert!(matches!(common, TypeDenoter::Base { elem: PrimitiveType::Float, .. }));
    }

    #[test]
    fn find_common_rejects_dimension_mismatch() {
        let v2 = TypeDenoter::vector(PrimitiveType::Float, 2);
        let v3 = TypeDenoter::vector(PrimitiveType::Float, 3);
        assert!(TypeDenoter::find_common(&v2, &v3, true).is_none());
    }

    #[test]
    fn find_common_broadcasts_scalar_against_vector_when_size_match_not_required() {
        let v4 = TypeDenoter::vector(PrimitiveType::Float, 4);
        let scalar = TypeDenoter::FLOAT;
        let common = TypeDenoter::find_common(&v4, &scalar, false).unwrap();
        assert!(matches!(common, TypeDenoter::Base { elem: PrimitiveType::Float, rows: 1, cols: 4 }));
        let common = TypeDenoter::find_common(&scalar, &v4, false).unwrap();
        assert!(matches!(common, TypeDenoter::Base { elem: PrimitiveType::Float, rows: 1, cols: 4 }));
    }

    #[test]
    fn find_common_still_rejects_mismatched_vectors_when_size_match_not_required() {
        let v2 = TypeDenoter::vector(PrimitiveType::Float, 2);
        let v3 = TypeDenoter::vector(PrimitiveType::Float, 3);
        assert!(TypeDenoter::find_common(&v2, &v3, false).is_none());
    }

    #[test]
    fn alias_resolves_transitively() {
        let mut aliases: Arena<AliasDecl> = Arena::new();
        let inner = aliases.push(AliasDecl {
            span: SourceSpan::default(),
            ident: "Inner".into(),
            aliased_type: TypeDenoter::FLOAT,
        });
        let outer = TypeDenoter::Alias { name: "Outer".into(), decl_ref: inner };
        assert!(matches!(outer.aliased(&aliases), TypeDenoter::Base { elem: PrimitiveType::Float, .. }));
    }

    #[test]
    fn struct_equality_ignores_name_mismatch_but_not_decl_ref() {
        let mut structs: Arena<StructDecl> = Arena::new();
        let s1 = structs.push(StructDecl {
            span: SourceSpan::default(),
            ident: "S".into(),
            members: vec![],
            flags: NodeFlags::default(),
        });
        let s2 = structs.push(StructDecl {
            span: SourceSpan::default(),
            ident: "T".into(),
            members: vec![],
            flags: NodeFlags::default(),
        });
        let aliases: Arena<AliasDecl> = Arena::new();
        let a = TypeDenoter::Struct { name: "S".into(), decl_ref: s1 };
        let b = TypeDenoter::Struct { name: "S-alt-name".into(), decl_ref: s1 };
        let c = TypeDenoter::Struct { name: "T".into(), decl_ref: s2 };
        assert!(a.equals(&b, &aliases));
        assert!(!a.equals(&c, &aliases));
    }
}
