#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// Sums eight adjacent 8-bit channels over a 2D window into int32 lanes.
/// `base` points at channel 0 of the window origin's batch; element
/// `(ih, iw, lane)` lives at `base + ih * row_stride + iw * col_stride + lane`.
///
/// # Safety
/// CPU must support AVX2 and every `base + offset .. base + offset + 8` in
/// the window must be readable.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
pub unsafe fn window_sum_i8x8(
    base: *const i8,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
    row_stride: usize,
    col_stride: usize,
    init: i32,
) -> [i32; 8] {
    unsafe {
        let mut acc = _mm256_set1_epi32(init);
        for ih in rows {
            for iw in cols.clone() {
                let p = base.add(ih * row_stride + iw * col_stride);
                let vals = _mm256_cvtepi8_epi32(_mm_loadl_epi64(p as *const __m128i));
                acc = _mm256_add_epi32(acc, vals);
            }
        }
        let mut out = [0i32; 8];
        _mm256_storeu_si256(out.as_mut_ptr() as *mut __m256i, acc);
        out
    }
}

/// Unsigned counterpart of [`window_sum_i8x8`].
///
/// # Safety
/// Same contract as [`window_sum_i8x8`].
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
pub unsafe fn window_sum_u8x8(
    base: *const u8,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
    row_stride: usize,
    col_stride: usize,
    init: i32,
) -> [i32; 8] {
    unsafe {
        let mut acc = _mm256_set1_epi32(init);
        for ih in rows {
            for iw in cols.clone() {
                let p = base.add(ih * row_stride + iw * col_stride);
                let vals = _mm256_cvtepu8_epi32(_mm_loadl_epi64(p as *const __m128i));
                acc = _mm256_add_epi32(acc, vals);
            }
        }
        let mut out = [0i32; 8];
        _mm256_storeu_si256(out.as_mut_ptr() as *mut __m256i, acc);
        out
    }
}
