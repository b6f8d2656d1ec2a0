use crate::qtensor::QStorage;
use std::fmt;

/// Runtime tag for the code type of a quantized tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QDType {
    QInt8,
    QUInt8,
    QInt32,
}

impl QDType {
    pub fn min_code(self) -> i64 {
        match self {
            QDType::QInt8 => i8::MIN as i64,
            QDType::QUInt8 => u8::MIN as i64,
            QDType::QInt32 => i32::MIN as i64,
        }
    }

    pub fn max_code(self) -> i64 {
        match self {
            QDType::QInt8 => i8::MAX as i64,
            QDType::QUInt8 => u8::MAX as i64,
            QDType::QInt32 => i32::MAX as i64,
        }
    }
}

impl fmt::Display for QDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QDType::QInt8 => write!(f, "qint8"),
            QDType::QUInt8 => write!(f, "quint8"),
            QDType::QInt32 => write!(f, "qint32"),
        }
    }
}

/// Native integer backing a quantized code.
///
/// `LANES` is the number of codes held by one 256-bit register and `Lanes`
/// is the array type used for a full lane group. A lane group dequantizes
/// into `FLOAT_VECS` vectors of eight f32 values.
pub trait QuantInt: Copy + Ord + Default + Send + Sync + fmt::Debug + 'static {
    const DTYPE: QDType;
    const MIN: Self;
    const MAX: Self;
    const LANES: usize;
    const FLOAT_VECS: usize;
    /// Window sums of this type fit in an i32 accumulator.
    const FAST_ACCUM: bool;

    type Lanes: Copy + Default + AsRef<[Self]> + AsMut<[Self]>;

    fn to_i32(self) -> i32;
    fn to_i64(self) -> i64;
    fn to_f32(self) -> f32;
    /// Clamps to `[MIN, MAX]` and narrows.
    fn saturate_i64(v: i64) -> Self;
    fn into_storage(data: Vec<Self>) -> QStorage;
    fn from_storage(storage: &QStorage) -> Option<&[Self]>;
}

impl QuantInt for i8 {
    const DTYPE: QDType = QDType::QInt8;
    const MIN: Self = i8::MIN;
    const MAX: Self = i8::MAX;
    const LANES: usize = 32;
    const FLOAT_VECS: usize = 4;
    const FAST_ACCUM: bool = true;

    type Lanes = [i8; 32];

    #[inline]
    fn to_i32(self) -> i32 {
        self as i32
    }
    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn saturate_i64(v: i64) -> Self {
        v.clamp(i8::MIN as i64, i8::MAX as i64) as i8
    }
    fn into_storage(data: Vec<Self>) -> QStorage {
        QStorage::QInt8(data)
    }
    fn from_storage(storage: &QStorage) -> Option<&[Self]> {
        match storage {
            QStorage::QInt8(data) => Some(data.as_slice()),
            _ => None,
        }
    }
}

impl QuantInt for u8 {
    const DTYPE: QDType = QDType::QUInt8;
    const MIN: Self = u8::MIN;
    const MAX: Self = u8::MAX;
    const LANES: usize = 32;
    const FLOAT_VECS: usize = 4;
    const FAST_ACCUM: bool = true;

    type Lanes = [u8; 32];

    #[inline]
    fn to_i32(self) -> i32 {
        self as i32
    }
    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn saturate_i64(v: i64) -> Self {
        v.clamp(u8::MIN as i64, u8::MAX as i64) as u8
    }
    fn into_storage(data: Vec<Self>) -> QStorage {
        QStorage::QUInt8(data)
    }
    fn from_storage(storage: &QStorage) -> Option<&[Self]> {
        match storage {
            QStorage::QUInt8(data) => Some(data.as_slice()),
            _ => None,
        }
    }
}

impl QuantInt for i32 {
    const DTYPE: QDType = QDType::QInt32;
    const MIN: Self = i32::MIN;
    const MAX: Self = i32::MAX;
    const LANES: usize = 8;
    const FLOAT_VECS: usize = 1;
    const FAST_ACCUM: bool = false;

    type Lanes = [i32; 8];

    #[inline]
    fn to_i32(self) -> i32 {
        self
    }
    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn saturate_i64(v: i64) -> Self {
        v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }
    fn into_storage(data: Vec<Self>) -> QStorage {
        QStorage::QInt32(data)
    }
    fn from_storage(storage: &QStorage) -> Option<&[Self]> {
        match storage {
            QStorage::QInt32(data) => Some(data.as_slice()),
            _ => None,
        }
    }
}
