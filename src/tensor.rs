use crate::kernels::qtype::QuantInt;
use std::borrow::Cow;

/// Affine quantization pair: a code `q` stands for `scale * (q - zero_point)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QParams {
    pub const fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }
}

#[derive(Debug, Clone)]
pub struct TensorView<'a, T: Clone = f32> {
    pub data: Cow<'a, [T]>,
    pub shape: Cow<'a, [usize]>,
}

impl<'a, T: Clone> TensorView<'a, T> {
    pub fn from_slice(data: &'a [T], shape: Vec<usize>) -> Self {
        let len: usize = shape.iter().product();
        assert_eq!(data.len(), len, "Data length mismatch");
        Self {
            data: Cow::Borrowed(data),
            shape: Cow::Owned(shape),
        }
    }
}

/// Borrowed quantized array: codes, physical shape and its quantization pair.
#[derive(Debug, Clone)]
pub struct QTensorView<'a, T: QuantInt> {
    pub data: Cow<'a, [T]>,
    pub shape: Cow<'a, [usize]>,
    pub params: QParams,
}

impl<'a, T: QuantInt> QTensorView<'a, T> {
    pub fn new(data: &'a [T], shape: &'a [usize], params: QParams) -> Self {
        let len: usize = shape.iter().product();
        assert_eq!(data.len(), len, "Data length mismatch");
        Self {
            data: Cow::Borrowed(data),
            shape: Cow::Borrowed(shape),
            params,
        }
    }
    pub fn from_owned(data: Vec<T>, shape: Vec<usize>, params: QParams) -> Self {
        let len: usize = shape.iter().product();
        assert_eq!(data.len(), len, "Data length mismatch");
        Self {
            data: Cow::Owned(data),
            shape: Cow::Owned(shape),
            params,
        }
    }
    pub fn from_slice(data: &'a [T], shape: Vec<usize>, params: QParams) -> Self {
        let len: usize = shape.iter().product();
        assert_eq!(data.len(), len, "Data length mismatch");
        Self {
            data: Cow::Borrowed(data),
            shape: Cow::Owned(shape),
            params,
        }
    }
    pub fn scale(&self) -> f32 {
        self.params.scale
    }
    pub fn zero_point(&self) -> i32 {
        self.params.zero_point
    }
}
