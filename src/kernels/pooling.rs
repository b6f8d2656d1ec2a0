use crate::config::SimdBackend;
use crate::kernels::qtype::QuantInt;
use crate::kernels::utils;
use crate::kernels::vec::{loadu, maximum, splat, store};
use crate::tensor::{QParams, QTensorView};
use std::ops::Range;

/// Window geometry for 2D pooling. Padding is applied symmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolWindow {
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
}

impl PoolWindow {
    pub fn new(
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        dilation: (usize, usize),
    ) -> Self {
        Self {
            kernel_h: kernel.0,
            kernel_w: kernel.1,
            stride_h: stride.0,
            stride_w: stride.1,
            pad_h: padding.0,
            pad_w: padding.1,
            dilation_h: dilation.0,
            dilation_w: dilation.1,
        }
    }

    /// Output `(height, width)` for an `in_h x in_w` input, or `None` when
    /// the window does not fit even once.
    pub fn output_size(&self, in_h: usize, in_w: usize, ceil_mode: bool) -> Option<(usize, usize)> {
        let oh = pooling_output_size(in_h, self.kernel_h, self.pad_h, self.stride_h, self.dilation_h, ceil_mode)?;
        let ow = pooling_output_size(in_w, self.kernel_w, self.pad_w, self.stride_w, self.dilation_w, ceil_mode)?;
        Some((oh, ow))
    }
}

pub fn pooling_output_size(
    input: usize,
    kernel: usize,
    pad: usize,
    stride: usize,
    dilation: usize,
    ceil_mode: bool,
) -> Option<usize> {
    if kernel == 0 || stride == 0 || dilation == 0 {
        return None;
    }
    let (input, pad, stride) = (input as i64, pad as i64, stride as i64);
    let effective = (dilation * (kernel - 1)) as i64 + 1;
    let numerator = input + 2 * pad - effective + if ceil_mode { stride - 1 } else { 0 };
    let mut out = numerator.div_euclid(stride) + 1;
    // the last window must start inside the input or the left padding
    if ceil_mode && (out - 1) * stride >= input + pad {
        out -= 1;
    }
    (out >= 1).then_some(out as usize)
}

/// Input coordinates `start, start + dilation, .. < end` covered by output
/// coordinate `o`. Leading coordinates that fall in the padding are skipped
/// by stepping `start` forward in units of the dilation.
#[inline]
fn dilated_range(o: usize, stride: usize, pad: usize, kernel: usize, dilation: usize, in_size: usize) -> (usize, usize) {
    let mut start = (o * stride) as i64 - pad as i64;
    let end = (start + ((kernel - 1) * dilation) as i64 + 1).min(in_size as i64);
    while start < 0 {
        start += dilation as i64;
    }
    (start as usize, end.max(0) as usize)
}

/// `[floor(o * in / out), ceil((o + 1) * in / out))`
#[inline]
pub fn adaptive_range(o: usize, in_size: usize, out_size: usize) -> Range<usize> {
    let start = (o * in_size) / out_size;
    let end = ((o + 1) * in_size).div_ceil(out_size);
    start..end
}

/// Quantized 2D max pooling over channel-last data.
/// Input shape: [N, H, W, C]
/// Output shape: [N, out_h, out_w, C], same quantization parameters.
pub fn qmax_pool2d_nhwc<'a, T: QuantInt>(
    x: &QTensorView<'_, T>,
    window: PoolWindow,
    out_h: usize,
    out_w: usize,
    out: &'a mut Vec<T>,
) -> QTensorView<'a, T> {
    let shape = &x.shape;
    assert!(shape.len() == 4, "qmax_pool2d_nhwc: expected rank-4 input");
    let (batch, in_h, in_w, channels) = (shape[0], shape[1], shape[2], shape[3]);
    let PoolWindow {
        kernel_h: kh,
        kernel_w: kw,
        stride_h: sh,
        stride_w: sw,
        pad_h: ph,
        pad_w: pw,
        dilation_h: dh,
        dilation_w: dw,
    } = window;

    let total = batch * out_h * out_w * channels;
    utils::ensure_capacity(out, total);

    let lanes = T::LANES;
    let lowest = splat::<T>(T::MIN);
    let data = &x.data;

    for b in 0..batch {
        let i_p = &data[b * in_h * in_w * channels..(b + 1) * in_h * in_w * channels];
        for row in 0..out_h {
            let (h_start, h_end) = dilated_range(row, sh, ph, kh, dh, in_h);
            for col in 0..out_w {
                let (w_start, w_end) = dilated_range(col, sw, pw, kw, dw, in_w);
                let o_off = ((b * out_h + row) * out_w + col) * channels;
                let o_p = &mut out[o_off..o_off + channels];

                let mut c = 0;
                // four lane groups at a time
                while c + 4 * lanes <= channels {
                    let mut accs = [lowest; 4];
                    for y in (h_start..h_end).step_by(dh) {
                        for xw in (w_start..w_end).step_by(dw) {
                            let base = (y * in_w + xw) * channels + c;
                            for (i, acc) in accs.iter_mut().enumerate() {
                                *acc = maximum::<T>(*acc, &loadu::<T>(&i_p[base + i * lanes..]));
                            }
                        }
                    }
                    for (i, acc) in accs.iter().enumerate() {
                        store::<T>(acc, &mut o_p[c + i * lanes..]);
                    }
                    c += 4 * lanes;
                }

                while c + lanes <= channels {
                    let mut acc = lowest;
                    for y in (h_start..h_end).step_by(dh) {
                        for xw in (w_start..w_end).step_by(dw) {
                            let base = (y * in_w + xw) * channels + c;
                            acc = maximum::<T>(acc, &loadu::<T>(&i_p[base..]));
                        }
                    }
                    store::<T>(&acc, &mut o_p[c..]);
                    c += lanes;
                }

                for c in c..channels {
                    let mut max_val = T::MIN;
                    for y in (h_start..h_end).step_by(dh) {
                        for xw in (w_start..w_end).step_by(dw) {
                            max_val = max_val.max(i_p[(y * in_w + xw) * channels + c]);
                        }
                    }
                    o_p[c] = max_val;
                }
            }
        }
    }

    QTensorView::from_slice(out, vec![batch, out_h, out_w, channels], x.params)
}

/// Rectangular reduction window for the average-pooling kernels, in element
/// strides relative to the batch origin.
#[derive(Debug, Clone)]
struct WindowSpan {
    rows: Range<usize>,
    cols: Range<usize>,
    row_stride: usize,
    col_stride: usize,
    channel_stride: usize,
}

const ACC_LANES: usize = 8;

#[inline]
fn requantize_acc<T: QuantInt>(acc: i64, multiplier: f32, zero_point: i32) -> T {
    let v = (acc as f64 * multiplier as f64 + zero_point as f64).round_ties_even();
    T::saturate_i64(v as i64)
}

fn window_sum_lanes_portable<T: QuantInt>(input: &[T], win: &WindowSpan, c: usize, init: i32) -> [i32; ACC_LANES] {
    let mut acc = [init; ACC_LANES];
    for ih in win.rows.clone() {
        for iw in win.cols.clone() {
            let base = ih * win.row_stride + iw * win.col_stride + c;
            let vals = &input[base..base + ACC_LANES];
            for (a, v) in acc.iter_mut().zip(vals) {
                *a += v.to_i32();
            }
        }
    }
    acc
}

fn window_sum_lanes<T: QuantInt>(
    backend: SimdBackend,
    input: &[T],
    win: &WindowSpan,
    c: usize,
    init: i32,
) -> [i32; ACC_LANES] {
    #[cfg(target_arch = "x86_64")]
    if backend == SimdBackend::Avx2 && backend.is_available() && !win.rows.is_empty() && !win.cols.is_empty() {
        let last = (win.rows.end - 1) * win.row_stride + (win.cols.end - 1) * win.col_stride + c + ACC_LANES;
        assert!(last <= input.len(), "window_sum_lanes: window exceeds input");
        let base = input[c..].as_ptr();
        // SAFETY: AVX2 was detected and every 8-lane load ends at or before `last`.
        use crate::kernels::qtype::QDType;
        match T::DTYPE {
            QDType::QInt8 => unsafe {
                return crate::kernels::avx::window_sum_i8x8(
                    base as *const i8,
                    win.rows.clone(),
                    win.cols.clone(),
                    win.row_stride,
                    win.col_stride,
                    init,
                );
            },
            QDType::QUInt8 => unsafe {
                return crate::kernels::avx::window_sum_u8x8(
                    base as *const u8,
                    win.rows.clone(),
                    win.cols.clone(),
                    win.row_stride,
                    win.col_stride,
                    init,
                );
            },
            QDType::QInt32 => {}
        }
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = backend;
    window_sum_lanes_portable(input, win, c, init)
}

/// Reduces one output position across all channels: the int32 lane path
/// covers groups of eight contiguous 8-bit channels, everything else goes
/// through a 64-bit scalar accumulator. Both requantize identically.
#[allow(clippy::too_many_arguments)]
fn avg_pool_channels<T: QuantInt>(
    backend: SimdBackend,
    input: &[T],
    win: &WindowSpan,
    channels: usize,
    input_zero_point_m_size: i64,
    output_zero_point: i32,
    multiplier: f32,
    o_p: &mut [T],
) {
    let mut c = 0;
    if T::FAST_ACCUM && win.channel_stride == 1 && backend != SimdBackend::Scalar {
        let init = input_zero_point_m_size as i32;
        while c + ACC_LANES <= channels {
            let acc = window_sum_lanes(backend, input, win, c, init);
            for (i, &a) in acc.iter().enumerate() {
                o_p[c + i] = requantize_acc::<T>(a as i64, multiplier, output_zero_point);
            }
            c += ACC_LANES;
        }
    }
    for c in c..channels {
        let mut acc = input_zero_point_m_size;
        for ih in win.rows.clone() {
            for iw in win.cols.clone() {
                acc += input[ih * win.row_stride + iw * win.col_stride + c * win.channel_stride].to_i64();
            }
        }
        o_p[c] = requantize_acc::<T>(acc, multiplier, output_zero_point);
    }
}

/// Quantized 2D average pooling over channel-last data.
/// Input shape: [N, H, W, C]
/// Output shape: [N, out_h, out_w, C] quantized with `out_params`.
///
/// Padded positions contribute real 0. The divisor is `divisor_override`
/// when given, otherwise the clipped window area, or the padded window area
/// when `count_include_pad` is set. Dilation is ignored.
#[allow(clippy::too_many_arguments)]
pub fn qavg_pool2d_nhwc<'a, T: QuantInt>(
    x: &QTensorView<'_, T>,
    window: PoolWindow,
    out_h: usize,
    out_w: usize,
    count_include_pad: bool,
    divisor_override: Option<i64>,
    out_params: QParams,
    backend: SimdBackend,
    out: &'a mut Vec<T>,
) -> QTensorView<'a, T> {
    let shape = &x.shape;
    assert!(shape.len() == 4, "qavg_pool2d_nhwc: expected rank-4 input");
    let (batch, in_h, in_w, channels) = (shape[0], shape[1], shape[2], shape[3]);
    let (kh, kw) = (window.kernel_h as i64, window.kernel_w as i64);
    let (sh, sw) = (window.stride_h as i64, window.stride_w as i64);
    let (ph, pw) = (window.pad_h as i64, window.pad_w as i64);
    let (ih_len, iw_len) = (in_h as i64, in_w as i64);

    let total = batch * out_h * out_w * channels;
    utils::ensure_capacity(out, total);

    let input_zero_point = x.zero_point() as i64;
    let scale_ratio = x.scale() / out_params.scale;
    let plane = in_h * in_w * channels;

    for b in 0..batch {
        let i_p = &x.data[b * plane..(b + 1) * plane];
        for oh in 0..out_h {
            for ow in 0..out_w {
                let mut hstart = oh as i64 * sh - ph;
                let mut wstart = ow as i64 * sw - pw;
                let mut hend = (hstart + kh).min(ih_len + ph);
                let mut wend = (wstart + kw).min(iw_len + pw);
                let pool_size = (hend - hstart) * (wend - wstart);
                hstart = hstart.max(0);
                wstart = wstart.max(0);
                hend = hend.min(ih_len);
                wend = wend.min(iw_len);
                let size = (hend - hstart).max(0) * (wend - wstart).max(0);

                let divide_factor = match divisor_override {
                    Some(d) => d,
                    None if count_include_pad => pool_size,
                    None => size,
                };
                let multiplier = scale_ratio / divide_factor as f32;

                let win = WindowSpan {
                    rows: hstart as usize..hend.max(hstart) as usize,
                    cols: wstart as usize..wend.max(wstart) as usize,
                    row_stride: in_w * channels,
                    col_stride: channels,
                    channel_stride: 1,
                };
                let o_off = ((b * out_h + oh) * out_w + ow) * channels;
                avg_pool_channels(
                    backend,
                    i_p,
                    &win,
                    channels,
                    -input_zero_point * size,
                    out_params.zero_point,
                    multiplier,
                    &mut out[o_off..o_off + channels],
                );
            }
        }
    }

    QTensorView::from_slice(out, vec![batch, out_h, out_w, channels], out_params)
}

/// Element strides of a logical `[N, C, H, W]` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputStrides {
    pub batch: usize,
    pub channel: usize,
    pub height: usize,
    pub width: usize,
}

impl InputStrides {
    /// Strides of an NHWC buffer.
    pub fn channels_last(channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch: height * width * channels,
            channel: 1,
            height: width * channels,
            width: channels,
        }
    }

    /// Strides of an NCHW buffer.
    pub fn contiguous(channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch: channels * height * width,
            channel: height * width,
            height: width,
            width: 1,
        }
    }
}

/// Quantized 2D adaptive average pooling reading an arbitrarily strided
/// input of logical shape `dims = [N, C, H, W]`.
/// Output shape: [N, out_h, out_w, C] (channel-last) quantized with `out_params`.
#[allow(clippy::too_many_arguments)]
pub fn qadaptive_avg_pool2d_strided<'a, T: QuantInt>(
    input: &[T],
    in_params: QParams,
    dims: [usize; 4],
    strides: InputStrides,
    out_h: usize,
    out_w: usize,
    out_params: QParams,
    backend: SimdBackend,
    out: &'a mut Vec<T>,
) -> QTensorView<'a, T> {
    let [batch, channels, in_h, in_w] = dims;
    let total = batch * out_h * out_w * channels;
    utils::ensure_capacity(out, total);
    let input_zero_point = in_params.zero_point as i64;
    let scale_ratio = in_params.scale / out_params.scale;

    for b in 0..batch {
        let i_p = &input[b * strides.batch..];
        for oh in 0..out_h {
            let rows = adaptive_range(oh, in_h, out_h);
            for ow in 0..out_w {
                let cols = adaptive_range(ow, in_w, out_w);
                let size = (rows.len() * cols.len()) as i64;
                let multiplier = scale_ratio / size as f32;
                let win = WindowSpan {
                    rows: rows.clone(),
                    cols,
                    row_stride: strides.height,
                    col_stride: strides.width,
                    channel_stride: strides.channel,
                };
                let o_off = ((b * out_h + oh) * out_w + ow) * channels;
                avg_pool_channels(
                    backend,
                    i_p,
                    &win,
                    channels,
                    -input_zero_point * size,
                    out_params.zero_point,
                    multiplier,
                    &mut out[o_off..o_off + channels],
                );
            }
        }
    }

    QTensorView::from_slice(out, vec![batch, out_h, out_w, channels], out_params)
}

/// Quantized 2D adaptive average pooling over channel-last data.
/// Input shape: [N, H, W, C]
/// Output shape: [N, out_h, out_w, C]
pub fn qadaptive_avg_pool2d_nhwc<'a, T: QuantInt>(
    x: &QTensorView<'_, T>,
    out_h: usize,
    out_w: usize,
    out_params: QParams,
    backend: SimdBackend,
    out: &'a mut Vec<T>,
) -> QTensorView<'a, T> {
    let shape = &x.shape;
    assert!(shape.len() == 4, "qadaptive_avg_pool2d_nhwc: expected rank-4 input");
    let (batch, in_h, in_w, channels) = (shape[0], shape[1], shape[2], shape[3]);
    qadaptive_avg_pool2d_strided(
        &x.data,
        x.params,
        [batch, channels, in_h, in_w],
        InputStrides::channels_last(channels, in_h, in_w),
        out_h,
        out_w,
        out_params,
        backend,
        out,
    )
}
