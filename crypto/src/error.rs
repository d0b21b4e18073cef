use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("scalar is outside the prime-order subgroup range")]
    InvalidScalar,

    #[error("point is not on the curve")]
    PointNotOnCurve,

    #[error("point is not in the prime-order subgroup")]
    PointNotInSubgroup,

    #[error("inverse of zero")]
    InverseOfZero,

    #[error("memo rejected")]
    MemoReject,
}
