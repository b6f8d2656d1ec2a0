use crate::error::{QuantError, Result};
use crate::kernels::qtype::{QDType, QuantInt};
use crate::kernels::quantize::{dequantize_slice, quantize_slice};
use crate::tensor::QParams;

/// Owned code buffer tagged with its element type.
#[derive(Debug, Clone, PartialEq)]
pub enum QStorage {
    QInt8(Vec<i8>),
    QUInt8(Vec<u8>),
    QInt32(Vec<i32>),
}

/// Binds the typed buffer inside a [`QStorage`] to `$data` and evaluates
/// `$body` once per element type.
#[macro_export]
macro_rules! dispatch_qint {
    ($storage:expr, $data:ident => $body:expr) => {
        match $storage {
            $crate::qtensor::QStorage::QInt8($data) => $body,
            $crate::qtensor::QStorage::QUInt8($data) => $body,
            $crate::qtensor::QStorage::QInt32($data) => $body,
        }
    };
}

/// Two-operand form of [`dispatch_qint!`]; `$mismatch` is evaluated when
/// the element types differ.
#[macro_export]
macro_rules! dispatch_qint_pair {
    ($lhs:expr, $rhs:expr, ($a:ident, $b:ident) => $body:expr, _ => $mismatch:expr) => {
        match ($lhs, $rhs) {
            ($crate::qtensor::QStorage::QInt8($a), $crate::qtensor::QStorage::QInt8($b)) => $body,
            ($crate::qtensor::QStorage::QUInt8($a), $crate::qtensor::QStorage::QUInt8($b)) => $body,
            ($crate::qtensor::QStorage::QInt32($a), $crate::qtensor::QStorage::QInt32($b)) => $body,
            _ => $mismatch,
        }
    };
}

impl QStorage {
    pub fn dtype(&self) -> QDType {
        match self {
            QStorage::QInt8(_) => QDType::QInt8,
            QStorage::QUInt8(_) => QDType::QUInt8,
            QStorage::QInt32(_) => QDType::QInt32,
        }
    }

    pub fn len(&self) -> usize {
        dispatch_qint!(self, data => data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryFormat {
    /// Row-major over the logical shape.
    #[default]
    Contiguous,
    /// Rank-4 `[N, C, H, W]` stored as NHWC.
    ChannelsLast,
}

/// Owned quantized tensor. `shape` is always the logical shape; `format`
/// says how the codes are laid out in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct QTensor {
    pub(crate) storage: QStorage,
    pub(crate) shape: Vec<usize>,
    pub(crate) params: QParams,
    pub(crate) format: MemoryFormat,
}

pub(crate) fn validate_params(params: QParams, dtype: QDType) -> Result<()> {
    if !(params.scale.is_finite() && params.scale > 0.0) {
        return Err(QuantError::InvalidScale(params.scale));
    }
    let zp = params.zero_point as i64;
    if zp < dtype.min_code() || zp > dtype.max_code() {
        return Err(QuantError::ZeroPointOutOfRange {
            zero_point: params.zero_point,
            dtype,
        });
    }
    Ok(())
}

impl QTensor {
    pub fn from_storage(
        storage: QStorage,
        shape: Vec<usize>,
        params: QParams,
        format: MemoryFormat,
    ) -> Result<Self> {
        validate_params(params, storage.dtype())?;
        let len: usize = shape.iter().product();
        if storage.len() != len {
            return Err(QuantError::DataLength {
                len: storage.len(),
                shape,
            });
        }
        if format == MemoryFormat::ChannelsLast && shape.len() != 4 {
            return Err(QuantError::InvalidRank {
                op: "channels_last",
                expected: "4",
                got: shape.len(),
            });
        }
        Ok(Self {
            storage,
            shape,
            params,
            format,
        })
    }

    /// Row-major tensor from raw codes.
    pub fn from_codes<T: QuantInt>(data: Vec<T>, shape: Vec<usize>, params: QParams) -> Result<Self> {
        Self::from_storage(T::into_storage(data), shape, params, MemoryFormat::Contiguous)
    }

    /// Quantizes row-major real values.
    pub fn quantize(values: &[f32], shape: Vec<usize>, params: QParams, dtype: QDType) -> Result<Self> {
        validate_params(params, dtype)?;
        let storage = match dtype {
            QDType::QInt8 => QStorage::QInt8(quantize_vec(values, params)),
            QDType::QUInt8 => QStorage::QUInt8(quantize_vec(values, params)),
            QDType::QInt32 => QStorage::QInt32(quantize_vec(values, params)),
        };
        Self::from_storage(storage, shape, params, MemoryFormat::Contiguous)
    }

    /// Real values in logical row-major order.
    pub fn dequantize(&self) -> Vec<f32> {
        let contiguous = self.to_contiguous();
        let mut out = Vec::new();
        dispatch_qint!(&contiguous.storage, data => dequantize_slice(data, self.params, &mut out));
        out
    }

    pub fn dtype(&self) -> QDType {
        self.storage.dtype()
    }
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
    pub fn params(&self) -> QParams {
        self.params
    }
    pub fn scale(&self) -> f32 {
        self.params.scale
    }
    pub fn zero_point(&self) -> i32 {
        self.params.zero_point
    }
    pub fn format(&self) -> MemoryFormat {
        self.format
    }

    /// Codes in memory order, if the element type is `T`.
    pub fn codes<T: QuantInt>(&self) -> Option<&[T]> {
        T::from_storage(&self.storage)
    }

    pub fn to_channels_last(&self) -> Result<QTensor> {
        if self.shape.len() != 4 {
            return Err(QuantError::InvalidRank {
                op: "to_channels_last",
                expected: "4",
                got: self.shape.len(),
            });
        }
        if self.format == MemoryFormat::ChannelsLast {
            return Ok(self.clone());
        }
        let [n, c, h, w] = [self.shape[0], self.shape[1], self.shape[2], self.shape[3]];
        let storage = dispatch_qint!(&self.storage, data => QuantInt::into_storage(nchw_to_nhwc(data, n, c, h, w)));
        Ok(QTensor {
            storage,
            shape: self.shape.clone(),
            params: self.params,
            format: MemoryFormat::ChannelsLast,
        })
    }

    pub fn to_contiguous(&self) -> QTensor {
        if self.format == MemoryFormat::Contiguous {
            return self.clone();
        }
        let [n, c, h, w] = [self.shape[0], self.shape[1], self.shape[2], self.shape[3]];
        let storage = dispatch_qint!(&self.storage, data => QuantInt::into_storage(nhwc_to_nchw(data, n, c, h, w)));
        QTensor {
            storage,
            shape: self.shape.clone(),
            params: self.params,
            format: MemoryFormat::Contiguous,
        }
    }
}

fn quantize_vec<T: QuantInt>(values: &[f32], params: QParams) -> Vec<T> {
    let mut out = Vec::new();
    quantize_slice(values, params, &mut out);
    out
}

pub(crate) fn nchw_to_nhwc<T: Copy>(src: &[T], n: usize, c: usize, h: usize, w: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(src.len());
    for b in 0..n {
        for y in 0..h {
            for x in 0..w {
                for ch in 0..c {
                    out.push(src[((b * c + ch) * h + y) * w + x]);
                }
            }
        }
    }
    out
}

pub(crate) fn nhwc_to_nchw<T: Copy>(src: &[T], n: usize, c: usize, h: usize, w: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(src.len());
    for b in 0..n {
        for ch in 0..c {
            for y in 0..h {
                for x in 0..w {
                    out.push(src[((b * h + y) * w + x) * c + ch]);
                }
            }
        }
    }
    out
}
