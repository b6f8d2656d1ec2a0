use crate::kernels::qtype::QDType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantError {
    #[error("scale must be finite and positive, got {0}")]
    InvalidScale(f32),
    #[error("zero point {zero_point} is outside the {dtype} range")]
    ZeroPointOutOfRange { zero_point: i32, dtype: QDType },
    #[error("data length {len} does not match shape {shape:?}")]
    DataLength { len: usize, shape: Vec<usize> },
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },
    #[error("dtype mismatch: {lhs} vs {rhs}")]
    DTypeMismatch { lhs: QDType, rhs: QDType },
    #[error("{op}: expected rank {expected}, got {got}")]
    InvalidRank { op: &'static str, expected: &'static str, got: usize },
    #[error("{op}: invalid window: {reason}")]
    InvalidWindow { op: &'static str, reason: String },
    #[error("topk: k = {k} must be within 1..={len}")]
    InvalidTopK { k: usize, len: usize },
    #[error("dim {dim} out of range for rank {rank}")]
    InvalidDim { dim: i64, rank: usize },
}

pub type Result<T> = std::result::Result<T, QuantError>;
