#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Widens eight codes starting at `src` to f32 and applies `x * scale + premul`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
unsafe fn fmadd_store(codes: __m256i, scale: __m256, premul: __m256, dst: &mut [f32; 8]) {
    unsafe {
        let r = _mm256_fmadd_ps(_mm256_cvtepi32_ps(codes), scale, premul);
        _mm256_storeu_ps(dst.as_mut_ptr(), r);
    }
}

/// Dequantizes 32 signed 8-bit codes into four f32 vectors.
///
/// # Safety
/// CPU must support AVX2 and FMA, `src` must point at 32 readable codes and
/// `out` must hold at least four vectors.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn dequantize_i8x32(src: *const i8, scale: &[f32; 8], premul: &[f32; 8], out: &mut [[f32; 8]]) {
    unsafe {
        let s = _mm256_loadu_ps(scale.as_ptr());
        let p = _mm256_loadu_ps(premul.as_ptr());
        for (j, dst) in out.iter_mut().take(4).enumerate() {
            let codes = _mm256_cvtepi8_epi32(_mm_loadl_epi64(src.add(j * 8) as *const __m128i));
            fmadd_store(codes, s, p, dst);
        }
    }
}

/// Unsigned counterpart of [`dequantize_i8x32`].
///
/// # Safety
/// Same contract as [`dequantize_i8x32`].
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn dequantize_u8x32(src: *const u8, scale: &[f32; 8], premul: &[f32; 8], out: &mut [[f32; 8]]) {
    unsafe {
        let s = _mm256_loadu_ps(scale.as_ptr());
        let p = _mm256_loadu_ps(premul.as_ptr());
        for (j, dst) in out.iter_mut().take(4).enumerate() {
            let codes = _mm256_cvtepu8_epi32(_mm_loadl_epi64(src.add(j * 8) as *const __m128i));
            fmadd_store(codes, s, p, dst);
        }
    }
}

/// Dequantizes eight 32-bit codes into one f32 vector.
///
/// # Safety
/// CPU must support AVX2 and FMA, `src` must point at 8 readable codes and
/// `out` must not be empty.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
pub unsafe fn dequantize_i32x8(src: *const i32, scale: &[f32; 8], premul: &[f32; 8], out: &mut [[f32; 8]]) {
    unsafe {
        let s = _mm256_loadu_ps(scale.as_ptr());
        let p = _mm256_loadu_ps(premul.as_ptr());
        let codes = _mm256_loadu_si256(src as *const __m256i);
        fmadd_store(codes, s, p, &mut out[0]);
    }
}
