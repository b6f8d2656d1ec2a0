use crate::config::SimdBackend;
use crate::kernels::elementwise::{binary_kernel_broadcast, binary_kernel_vec};
use crate::kernels::qtype::QuantInt;
use crate::kernels::quantize::{dequantize_lanes, dequantize_val_fma, quantize_lanes, quantize_val_inv};
use crate::kernels::utils;
use crate::kernels::vec::{f32x8_add, f32x8_max, f32x8_splat, F32x8, MAX_FLOAT_VECS};
use crate::tensor::{QParams, QTensorView};

/// Quantized add: dequantizes both operands, sums in f32 and requantizes
/// into `out_params`. Every `backend` gives bit-identical output.
pub fn qadd<'a, T: QuantInt>(
    a: &QTensorView<'_, T>,
    b: &QTensorView<'_, T>,
    out_params: QParams,
    backend: SimdBackend,
    out: &'a mut Vec<T>,
) -> QTensorView<'a, T> {
    qadd_impl::<T, false>(a, b, out_params, backend, out)
}

/// Quantized add with ReLU fused before requantization.
pub fn qadd_relu<'a, T: QuantInt>(
    a: &QTensorView<'_, T>,
    b: &QTensorView<'_, T>,
    out_params: QParams,
    backend: SimdBackend,
    out: &'a mut Vec<T>,
) -> QTensorView<'a, T> {
    qadd_impl::<T, true>(a, b, out_params, backend, out)
}

fn qadd_impl<'a, T: QuantInt, const RELU_FUSED: bool>(
    a: &QTensorView<'_, T>,
    b: &QTensorView<'_, T>,
    out_params: QParams,
    backend: SimdBackend,
    out: &'a mut Vec<T>,
) -> QTensorView<'a, T> {
    let zero_point = out_params.zero_point;
    let inv_scale = 1.0 / out_params.scale;
    let (a_scale, a_zero_point) = (a.scale(), a.zero_point());
    let (b_scale, b_zero_point) = (b.scale(), b.zero_point());

    // The dequantize bias is -scale * zero_point so every path is a single
    // fused multiply-add per element; scalar tail and lane body must round
    // identically, including for 32-bit codes past f32's integer range.
    let a_premul = -a_scale * a_zero_point as f32;
    let b_premul = -b_scale * b_zero_point as f32;
    let a_scale_vec = f32x8_splat(a_scale);
    let b_scale_vec = f32x8_splat(b_scale);
    let a_premul_vec = f32x8_splat(a_premul);
    let b_premul_vec = f32x8_splat(b_premul);
    let zero_vec = f32x8_splat(0.0);

    let op = |x: T, y: T| -> T {
        let da = dequantize_val_fma(a_scale, a_premul, x);
        let db = dequantize_val_fma(b_scale, b_premul, y);
        let mut c = da + db;
        if RELU_FUSED {
            c = c.max(0.0);
        }
        quantize_val_inv::<T>(inv_scale, zero_point, c)
    };

    if a.shape == b.shape {
        let len = a.data.len();
        utils::ensure_capacity(out, len);
        if backend == SimdBackend::Scalar {
            for ((dst, &x), &y) in out.iter_mut().zip(a.data.iter()).zip(b.data.iter()) {
                *dst = op(x, y);
            }
            return QTensorView::from_slice(out, a.shape.to_vec(), out_params);
        }
        let vop = |x: T::Lanes, y: T::Lanes| -> T::Lanes {
            let mut da = [[0.0f32; 8]; MAX_FLOAT_VECS];
            let mut db = [[0.0f32; 8]; MAX_FLOAT_VECS];
            dequantize_lanes::<T>(backend, &x, &a_scale_vec, &a_premul_vec, &mut da);
            dequantize_lanes::<T>(backend, &y, &b_scale_vec, &b_premul_vec, &mut db);
            // An 8-bit lane group spans four f32 vectors; all of them are
            // summed before the single requantize back into one lane group.
            let mut retvals: [F32x8; MAX_FLOAT_VECS] = [[0.0; 8]; MAX_FLOAT_VECS];
            for i in 0..T::FLOAT_VECS {
                let mut c = f32x8_add(&da[i], &db[i]);
                if RELU_FUSED {
                    c = f32x8_max(&c, &zero_vec);
                }
                retvals[i] = c;
            }
            quantize_lanes::<T>(&retvals[..T::FLOAT_VECS], zero_point, inv_scale)
        };
        binary_kernel_vec(&a.data, &b.data, out, op, vop);
        return QTensorView::from_slice(out, a.shape.to_vec(), out_params);
    }

    let out_shape = utils::broadcast_shapes(&a.shape, &b.shape)
        .expect("qadd: operand shapes are not broadcastable");
    let total: usize = out_shape.iter().product();
    utils::ensure_capacity(out, total);
    binary_kernel_broadcast(&a.data, &a.shape, &b.data, &b.shape, out, &out_shape, op);
    QTensorView::from_slice(out, out_shape, out_params)
}
