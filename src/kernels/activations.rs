use crate::kernels::elementwise::unary_kernel_vec;
use crate::kernels::qtype::QuantInt;
use crate::kernels::quantize::quantize_val;
use crate::kernels::utils;
use crate::kernels::vec::{maximum, minimum, splat};
use crate::tensor::QTensorView;

/// Quantized ReLU: `max(q, zero_point)`, computed on codes.
/// Output keeps the input shape and quantization parameters.
pub fn qrelu<'a, T: QuantInt>(x: &QTensorView<'_, T>, out: &'a mut Vec<T>) -> QTensorView<'a, T> {
    let zero_point = T::saturate_i64(x.zero_point() as i64);
    let zero_point_vec = splat::<T>(zero_point);
    utils::ensure_capacity(out, x.data.len());
    unary_kernel_vec(
        &x.data,
        out,
        |value| value.max(zero_point),
        |value| maximum::<T>(value, &zero_point_vec),
    );
    QTensorView::from_slice(out, x.shape.to_vec(), x.params)
}

/// Quantized ReLU6: `min(max(q, zero_point), quantize(6.0))`.
pub fn qrelu6<'a, T: QuantInt>(x: &QTensorView<'_, T>, out: &'a mut Vec<T>) -> QTensorView<'a, T> {
    let zero_point = T::saturate_i64(x.zero_point() as i64);
    let six = quantize_val::<T>(x.scale(), x.zero_point(), 6.0);
    let zero_point_vec = splat::<T>(zero_point);
    let six_vec = splat::<T>(six);
    utils::ensure_capacity(out, x.data.len());
    unary_kernel_vec(
        &x.data,
        out,
        |value| value.max(zero_point).min(six),
        |value| minimum::<T>(maximum::<T>(value, &zero_point_vec), &six_vec),
    );
    QTensorView::from_slice(out, x.shape.to_vec(), x.params)
}
