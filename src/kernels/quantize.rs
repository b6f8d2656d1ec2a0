use crate::config::SimdBackend;
use crate::kernels::qtype::QuantInt;
use crate::kernels::utils;
use crate::kernels::vec::{f32x8_fmadd, F32x8, FLOAT_LANES};
use crate::tensor::QParams;

/// `real -> code`: nearest code (ties to even) offset by `zero_point`,
/// saturated to the range of `T`.
#[inline]
pub fn quantize_val<T: QuantInt>(scale: f32, zero_point: i32, value: f32) -> T {
    quantize_val_inv::<T>(1.0 / scale, zero_point, value)
}

/// Same as [`quantize_val`] with the reciprocal scale already computed.
#[inline]
pub fn quantize_val_inv<T: QuantInt>(inv_scale: f32, zero_point: i32, value: f32) -> T {
    let rounded = (value * inv_scale).round_ties_even() as i64;
    T::saturate_i64(rounded.saturating_add(zero_point as i64))
}

/// `code -> real`.
#[inline]
pub fn dequantize_val<T: QuantInt>(scale: f32, zero_point: i32, value: T) -> f32 {
    (value.to_i64() - zero_point as i64) as f32 * scale
}

/// `code -> real` as `q * scale + premul` with a single rounding, where
/// `premul` is `-scale * zero_point`. This is the per-lane formula of
/// [`dequantize_lanes`], so scalar tails and lane groups agree bit for bit.
#[inline]
pub fn dequantize_val_fma<T: QuantInt>(scale: f32, premul: f32, value: T) -> f32 {
    value.to_f32().mul_add(scale, premul)
}

/// Dequantizes one lane group into `T::FLOAT_VECS` float vectors as
/// `q * scale + premul`, where `premul` holds `-scale * zero_point`.
#[inline]
pub fn dequantize_lanes<T: QuantInt>(
    backend: SimdBackend,
    v: &T::Lanes,
    scale: &F32x8,
    premul: &F32x8,
    out: &mut [F32x8],
) {
    assert!(out.len() >= T::FLOAT_VECS, "dequantize_lanes: output too short");
    #[cfg(target_arch = "x86_64")]
    if backend == SimdBackend::Avx2 && backend.is_available() {
        use crate::kernels::avx;
        use crate::kernels::qtype::QDType;
        let src = v.as_ref().as_ptr();
        // SAFETY: AVX2 and FMA were detected; `src` holds a full lane group
        // and `out` has room for `T::FLOAT_VECS` vectors.
        unsafe {
            match T::DTYPE {
                QDType::QInt8 => avx::dequantize_i8x32(src as *const i8, scale, premul, out),
                QDType::QUInt8 => avx::dequantize_u8x32(src as *const u8, scale, premul, out),
                QDType::QInt32 => avx::dequantize_i32x8(src as *const i32, scale, premul, out),
            }
        }
        return;
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = backend;
    let codes = v.as_ref();
    for (j, dst) in out.iter_mut().enumerate().take(T::FLOAT_VECS) {
        let mut x = [0.0f32; FLOAT_LANES];
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = codes[j * FLOAT_LANES + i].to_f32();
        }
        *dst = f32x8_fmadd(&x, scale, premul);
    }
}

/// Packs `T::FLOAT_VECS` float vectors back into a single lane group of codes.
#[inline]
pub fn quantize_lanes<T: QuantInt>(vals: &[F32x8], zero_point: i32, inv_scale: f32) -> T::Lanes {
    let mut out = T::Lanes::default();
    let codes = out.as_mut();
    for (j, v) in vals.iter().enumerate().take(T::FLOAT_VECS) {
        for (i, &x) in v.iter().enumerate() {
            codes[j * FLOAT_LANES + i] = quantize_val_inv::<T>(inv_scale, zero_point, x);
        }
    }
    out
}

pub fn quantize_slice<T: QuantInt>(src: &[f32], params: QParams, out: &mut Vec<T>) {
    utils::ensure_capacity(out, src.len());
    let inv_scale = 1.0 / params.scale;
    for (dst, &x) in out.iter_mut().zip(src) {
        *dst = quantize_val_inv::<T>(inv_scale, params.zero_point, x);
    }
}

pub fn dequantize_slice<T: QuantInt>(src: &[T], params: QParams, out: &mut Vec<f32>) {
    utils::ensure_capacity(out, src.len());
    for (dst, &q) in out.iter_mut().zip(src) {
        *dst = dequantize_val(params.scale, params.zero_point, q);
    }
}
