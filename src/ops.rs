//! Checked entry points over [`QTensor`]. Each operator validates its
//! arguments, resolves the element type and hands typed slices to the
//! kernels in [`crate::kernels`].

use crate::config::kernel_config;
use crate::error::{QuantError, Result};
use crate::kernels::qtype::QuantInt;
use crate::kernels::{self, InputStrides, PoolWindow};
use crate::qtensor::{nhwc_to_nchw, validate_params, MemoryFormat, QStorage, QTensor};
use crate::tensor::{QParams, QTensorView};
use crate::{dispatch_qint, dispatch_qint_pair};

/// Output of [`topk`]: selected codes plus their positions along `dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopK {
    pub values: QTensor,
    pub indices: Vec<i64>,
}

pub fn relu(x: &QTensor) -> QTensor {
    log::trace!("relu: shape={:?} dtype={}", x.shape, x.dtype());
    let storage = dispatch_qint!(&x.storage, data => {
        let mut out = Vec::new();
        kernels::qrelu(&QTensorView::new(data.as_slice(), &x.shape, x.params), &mut out);
        QuantInt::into_storage(out)
    });
    QTensor {
        storage,
        shape: x.shape.clone(),
        params: x.params,
        format: x.format,
    }
}

pub fn relu6(x: &QTensor) -> QTensor {
    log::trace!("relu6: shape={:?} dtype={}", x.shape, x.dtype());
    let storage = dispatch_qint!(&x.storage, data => {
        let mut out = Vec::new();
        kernels::qrelu6(&QTensorView::new(data.as_slice(), &x.shape, x.params), &mut out);
        QuantInt::into_storage(out)
    });
    QTensor {
        storage,
        shape: x.shape.clone(),
        params: x.params,
        format: x.format,
    }
}

/// `a + b` requantized to `(scale, zero_point)`. Shapes must match or
/// broadcast; operands in different memory formats are made contiguous.
pub fn add(a: &QTensor, b: &QTensor, scale: f32, zero_point: i32) -> Result<QTensor> {
    add_impl(a, b, QParams::new(scale, zero_point), false)
}

/// `max(a + b, 0)` requantized to `(scale, zero_point)`.
pub fn add_relu(a: &QTensor, b: &QTensor, scale: f32, zero_point: i32) -> Result<QTensor> {
    add_impl(a, b, QParams::new(scale, zero_point), true)
}

fn add_impl(a: &QTensor, b: &QTensor, out_params: QParams, relu: bool) -> Result<QTensor> {
    if a.dtype() != b.dtype() {
        return Err(QuantError::DTypeMismatch {
            lhs: a.dtype(),
            rhs: b.dtype(),
        });
    }
    validate_params(out_params, a.dtype())?;
    log::trace!(
        "add: lhs={:?} rhs={:?} out={:?} relu={relu}",
        a.shape,
        b.shape,
        out_params
    );

    if a.shape == b.shape && a.format == b.format {
        let storage = dispatch_qint_pair!(&a.storage, &b.storage, (x, y) => {
            add_typed(x, &a.shape, a.params, y, &b.shape, b.params, out_params, relu)
        }, _ => unreachable!("dtypes checked above"));
        return QTensor::from_storage(storage, a.shape.clone(), out_params, a.format);
    }

    let out_shape = kernels::utils::broadcast_shapes(&a.shape, &b.shape).ok_or_else(|| {
        QuantError::ShapeMismatch {
            lhs: a.shape.clone(),
            rhs: b.shape.clone(),
        }
    })?;
    let (a, b) = (a.to_contiguous(), b.to_contiguous());
    let a_shape = left_pad(&a.shape, out_shape.len());
    let b_shape = left_pad(&b.shape, out_shape.len());
    let storage = dispatch_qint_pair!(&a.storage, &b.storage, (x, y) => {
        add_typed(x, &a_shape, a.params, y, &b_shape, b.params, out_params, relu)
    }, _ => unreachable!("dtypes checked above"));
    QTensor::from_storage(storage, out_shape, out_params, MemoryFormat::Contiguous)
}

#[allow(clippy::too_many_arguments)]
fn add_typed<T: QuantInt>(
    a: &[T],
    a_shape: &[usize],
    a_params: QParams,
    b: &[T],
    b_shape: &[usize],
    b_params: QParams,
    out_params: QParams,
    relu: bool,
) -> QStorage {
    let a = QTensorView::new(a, a_shape, a_params);
    let b = QTensorView::new(b, b_shape, b_params);
    let backend = kernel_config().backend;
    let mut out = Vec::new();
    if relu {
        kernels::qadd_relu(&a, &b, out_params, backend, &mut out);
    } else {
        kernels::qadd(&a, &b, out_params, backend, &mut out);
    }
    T::into_storage(out)
}

fn left_pad(shape: &[usize], rank: usize) -> Vec<usize> {
    let mut padded = vec![1; rank - shape.len()];
    padded.extend_from_slice(shape);
    padded
}

/// Pooling input normalised to a rank-4 channels-last tensor.
struct PoolInput {
    nhwc: QTensor,
    dims: [usize; 4],
    rank3: bool,
}

impl PoolInput {
    fn new(op: &'static str, x: &QTensor) -> Result<Self> {
        let (dims, rank3) = pool_dims(op, x)?;
        let nhwc = if rank3 {
            let batched = QTensor {
                shape: dims.to_vec(),
                ..x.clone()
            };
            batched.to_channels_last()?
        } else {
            x.to_channels_last()?
        };
        Ok(Self { nhwc, dims, rank3 })
    }

    fn view<'a, T: QuantInt>(&self, data: &'a [T]) -> QTensorView<'a, T> {
        let [n, c, h, w] = self.dims;
        QTensorView::from_slice(data, vec![n, h, w, c], self.nhwc.params)
    }

    /// Wraps NHWC kernel output. Rank-3 input gives a contiguous `[C, H, W]` result.
    fn finish(&self, storage: QStorage, out_h: usize, out_w: usize, params: QParams) -> Result<QTensor> {
        let [n, c, _, _] = self.dims;
        if self.rank3 {
            let storage = dispatch_qint!(&storage, data => {
                QuantInt::into_storage(nhwc_to_nchw(data, 1, c, out_h, out_w))
            });
            return QTensor::from_storage(storage, vec![c, out_h, out_w], params, MemoryFormat::Contiguous);
        }
        QTensor::from_storage(storage, vec![n, c, out_h, out_w], params, MemoryFormat::ChannelsLast)
    }
}

fn pool_dims(op: &'static str, x: &QTensor) -> Result<([usize; 4], bool)> {
    match *x.shape.as_slice() {
        [c, h, w] => Ok(([1, c, h, w], true)),
        [n, c, h, w] => Ok(([n, c, h, w], false)),
        _ => Err(QuantError::InvalidRank {
            op,
            expected: "3 or 4",
            got: x.shape.len(),
        }),
    }
}

fn check_window(
    op: &'static str,
    window: &PoolWindow,
    in_h: usize,
    in_w: usize,
    ceil_mode: bool,
) -> Result<(usize, usize)> {
    let invalid = |reason: String| Err(QuantError::InvalidWindow { op, reason });
    if window.kernel_h == 0 || window.kernel_w == 0 {
        return invalid(format!("kernel size must be positive, got ({}, {})", window.kernel_h, window.kernel_w));
    }
    if window.stride_h == 0 || window.stride_w == 0 {
        return invalid(format!("stride must be positive, got ({}, {})", window.stride_h, window.stride_w));
    }
    if window.dilation_h == 0 || window.dilation_w == 0 {
        return invalid(format!(
            "dilation must be positive, got ({}, {})",
            window.dilation_h, window.dilation_w
        ));
    }
    if window.pad_h > window.kernel_h / 2 || window.pad_w > window.kernel_w / 2 {
        return invalid(format!(
            "padding ({}, {}) must be at most half the kernel size",
            window.pad_h, window.pad_w
        ));
    }
    match window.output_size(in_h, in_w, ceil_mode) {
        Some(size) => Ok(size),
        None => invalid(format!("window does not fit a {in_h}x{in_w} input")),
    }
}

/// 2D max pooling. Accepts `[C, H, W]` or `[N, C, H, W]` in either memory
/// format; rank-4 output is channels-last with the input parameters.
pub fn max_pool2d(
    x: &QTensor,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    dilation: (usize, usize),
    ceil_mode: bool,
) -> Result<QTensor> {
    let input = PoolInput::new("max_pool2d", x)?;
    let [_, _, in_h, in_w] = input.dims;
    let window = PoolWindow::new(kernel, stride, padding, dilation);
    let (out_h, out_w) = check_window("max_pool2d", &window, in_h, in_w, ceil_mode)?;
    log::trace!("max_pool2d: dims={:?} window={window:?} out={out_h}x{out_w}", input.dims);

    let storage = dispatch_qint!(&input.nhwc.storage, data => {
        let mut out = Vec::new();
        kernels::qmax_pool2d_nhwc(&input.view(data), window, out_h, out_w, &mut out);
        QuantInt::into_storage(out)
    });
    input.finish(storage, out_h, out_w, x.params)
}

/// 2D average pooling. Padded positions count as real zero; the divisor is
/// `divisor_override` if given, else the window area (padded area when
/// `count_include_pad`). Output keeps the input parameters.
#[allow(clippy::too_many_arguments)]
pub fn avg_pool2d(
    x: &QTensor,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    ceil_mode: bool,
    count_include_pad: bool,
    divisor_override: Option<i64>,
) -> Result<QTensor> {
    let input = PoolInput::new("avg_pool2d", x)?;
    let [_, _, in_h, in_w] = input.dims;
    let window = PoolWindow::new(kernel, stride, padding, (1, 1));
    let (out_h, out_w) = check_window("avg_pool2d", &window, in_h, in_w, ceil_mode)?;
    if divisor_override == Some(0) {
        return Err(QuantError::InvalidWindow {
            op: "avg_pool2d",
            reason: "divisor_override must be non-zero".to_string(),
        });
    }
    let backend = kernel_config().backend;
    log::trace!(
        "avg_pool2d: dims={:?} window={window:?} out={out_h}x{out_w} backend={backend}",
        input.dims
    );

    let storage = dispatch_qint!(&input.nhwc.storage, data => {
        let mut out = Vec::new();
        kernels::qavg_pool2d_nhwc(
            &input.view(data),
            window,
            out_h,
            out_w,
            count_include_pad,
            divisor_override,
            x.params,
            backend,
            &mut out,
        );
        QuantInt::into_storage(out)
    });
    input.finish(storage, out_h, out_w, x.params)
}

/// Adaptive 2D average pooling to `(out_h, out_w)`. Reads either memory
/// format in place; output keeps the input parameters.
pub fn adaptive_avg_pool2d(x: &QTensor, output_size: (usize, usize)) -> Result<QTensor> {
    let op = "adaptive_avg_pool2d";
    let (dims, rank3) = pool_dims(op, x)?;
    let [n, c, in_h, in_w] = dims;
    let (out_h, out_w) = output_size;
    if out_h == 0 || out_w == 0 {
        return Err(QuantError::InvalidWindow {
            op,
            reason: format!("output size must be positive, got ({out_h}, {out_w})"),
        });
    }
    if in_h == 0 || in_w == 0 {
        return Err(QuantError::InvalidWindow {
            op,
            reason: format!("empty {in_h}x{in_w} input"),
        });
    }
    let strides = match x.format {
        MemoryFormat::ChannelsLast => InputStrides::channels_last(c, in_h, in_w),
        MemoryFormat::Contiguous => InputStrides::contiguous(c, in_h, in_w),
    };
    let backend = kernel_config().backend;
    log::trace!("{op}: dims={dims:?} strides={strides:?} out={out_h}x{out_w} backend={backend}");

    let storage = dispatch_qint!(&x.storage, data => {
        let mut out = Vec::new();
        kernels::qadaptive_avg_pool2d_strided(
            data.as_slice(),
            x.params,
            dims,
            strides,
            out_h,
            out_w,
            x.params,
            backend,
            &mut out,
        );
        QuantInt::into_storage(out)
    });

    if rank3 {
        let storage = dispatch_qint!(&storage, data => {
            QuantInt::into_storage(nhwc_to_nchw(data, 1, c, out_h, out_w))
        });
        return QTensor::from_storage(storage, vec![c, out_h, out_w], x.params, MemoryFormat::Contiguous);
    }
    QTensor::from_storage(storage, vec![n, c, out_h, out_w], x.params, MemoryFormat::ChannelsLast)
}

/// The `k` largest (or smallest) entries along `dim`, counted from the end
/// when negative. Values keep the input parameters; output is contiguous.
pub fn topk(x: &QTensor, k: usize, dim: i64, largest: bool, sorted: bool) -> Result<TopK> {
    let rank = x.shape.len();
    let axis = normalize_dim(dim, rank)?;
    let len = x.shape[axis];
    if k < 1 || k > len {
        return Err(QuantError::InvalidTopK { k, len });
    }
    log::trace!("topk: shape={:?} k={k} dim={axis} largest={largest} sorted={sorted}", x.shape);

    let x = x.to_contiguous();
    let mut indices = Vec::new();
    let (storage, shape) = dispatch_qint!(&x.storage, data => {
        let mut values = Vec::new();
        let view = QTensorView::new(data.as_slice(), &x.shape, x.params);
        let (_, idx) = kernels::qtopk(&view, k, axis, largest, sorted, &mut values, &mut indices);
        let shape = idx.shape.to_vec();
        (QuantInt::into_storage(values), shape)
    });
    Ok(TopK {
        values: QTensor::from_storage(storage, shape, x.params, MemoryFormat::Contiguous)?,
        indices,
    })
}

fn normalize_dim(dim: i64, rank: usize) -> Result<usize> {
    let r = rank as i64;
    let d = if dim < 0 { dim + r } else { dim };
    if d < 0 || d >= r {
        return Err(QuantError::InvalidDim { dim, rank });
    }
    Ok(d as usize)
}
