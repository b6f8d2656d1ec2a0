//! Lane-group helpers over fixed-size arrays.
//!
//! A lane group is one 256-bit register worth of codes (`QuantInt::Lanes`).
//! The loops are written over whole arrays so they lower to packed
//! instructions on x86_64, aarch64 and wasm32 alike.

use crate::kernels::qtype::QuantInt;

pub const FLOAT_LANES: usize = 8;
/// Largest `QuantInt::FLOAT_VECS` of any code type.
pub const MAX_FLOAT_VECS: usize = 4;

pub type F32x8 = [f32; FLOAT_LANES];

#[inline(always)]
pub fn splat<T: QuantInt>(v: T) -> T::Lanes {
    let mut out = T::Lanes::default();
    out.as_mut().fill(v);
    out
}

/// Loads `T::LANES` codes from the front of `src`.
#[inline(always)]
pub fn loadu<T: QuantInt>(src: &[T]) -> T::Lanes {
    let mut out = T::Lanes::default();
    out.as_mut().copy_from_slice(&src[..T::LANES]);
    out
}

#[inline(always)]
pub fn store<T: QuantInt>(v: &T::Lanes, dst: &mut [T]) {
    dst[..T::LANES].copy_from_slice(v.as_ref());
}

#[inline(always)]
pub fn maximum<T: QuantInt>(a: T::Lanes, b: &T::Lanes) -> T::Lanes {
    let mut a = a;
    for (x, &y) in a.as_mut().iter_mut().zip(b.as_ref()) {
        *x = (*x).max(y);
    }
    a
}

#[inline(always)]
pub fn minimum<T: QuantInt>(a: T::Lanes, b: &T::Lanes) -> T::Lanes {
    let mut a = a;
    for (x, &y) in a.as_mut().iter_mut().zip(b.as_ref()) {
        *x = (*x).min(y);
    }
    a
}

#[inline(always)]
pub fn f32x8_splat(v: f32) -> F32x8 {
    [v; FLOAT_LANES]
}

#[inline(always)]
pub fn f32x8_add(a: &F32x8, b: &F32x8) -> F32x8 {
    let mut out = *a;
    for (x, &y) in out.iter_mut().zip(b) {
        *x += y;
    }
    out
}

#[inline(always)]
pub fn f32x8_max(a: &F32x8, b: &F32x8) -> F32x8 {
    let mut out = *a;
    for (x, &y) in out.iter_mut().zip(b) {
        *x = x.max(y);
    }
    out
}

/// `a * b + c` per lane with a single rounding.
#[inline(always)]
pub fn f32x8_fmadd(a: &F32x8, b: &F32x8, c: &F32x8) -> F32x8 {
    let mut out = [0.0f32; FLOAT_LANES];
    for i in 0..FLOAT_LANES {
        out[i] = a[i].mul_add(b[i], c[i]);
    }
    out
}
