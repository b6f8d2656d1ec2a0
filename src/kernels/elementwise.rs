//! Drives a scalar body and a lane-group body over flat code buffers.
//!
//! Full lane groups go through the vector body; the tail shorter than
//! `T::LANES` goes through the scalar body. Both bodies must agree.

use crate::kernels::qtype::QuantInt;
use crate::kernels::utils;
use crate::kernels::vec::{loadu, store};

pub fn unary_kernel_vec<T, F, V>(input: &[T], out: &mut [T], op: F, vop: V)
where
    T: QuantInt,
    F: Fn(T) -> T,
    V: Fn(T::Lanes) -> T::Lanes,
{
    assert_eq!(input.len(), out.len(), "unary_kernel_vec: length mismatch");
    let len = input.len();
    let simd_end = len - len % T::LANES;
    for (src, dst) in input[..simd_end]
        .chunks_exact(T::LANES)
        .zip(out[..simd_end].chunks_exact_mut(T::LANES))
    {
        store::<T>(&vop(loadu::<T>(src)), dst);
    }
    for i in simd_end..len {
        out[i] = op(input[i]);
    }
}

pub fn binary_kernel_vec<T, F, V>(a: &[T], b: &[T], out: &mut [T], op: F, vop: V)
where
    T: QuantInt,
    F: Fn(T, T) -> T,
    V: Fn(T::Lanes, T::Lanes) -> T::Lanes,
{
    assert_eq!(a.len(), b.len(), "binary_kernel_vec: length mismatch");
    assert_eq!(a.len(), out.len(), "binary_kernel_vec: length mismatch");
    let len = a.len();
    let simd_end = len - len % T::LANES;
    let lanes = T::LANES;
    let mut i = 0;
    while i < simd_end {
        let va = loadu::<T>(&a[i..]);
        let vb = loadu::<T>(&b[i..]);
        store::<T>(&vop(va, vb), &mut out[i..]);
        i += lanes;
    }
    for j in simd_end..len {
        out[j] = op(a[j], b[j]);
    }
}

/// Equal-rank broadcasting: every dim of `a` and `b` either matches
/// `out_shape` or is 1. Walks the output in row-major order.
pub fn binary_kernel_broadcast<T, F>(
    a: &[T],
    a_shape: &[usize],
    b: &[T],
    b_shape: &[usize],
    out: &mut [T],
    out_shape: &[usize],
    op: F,
) where
    T: QuantInt,
    F: Fn(T, T) -> T,
{
    let rank = out_shape.len();
    assert!(a_shape.len() == rank && b_shape.len() == rank, "broadcast: rank mismatch");
    let total: usize = out_shape.iter().product();
    assert_eq!(out.len(), total, "broadcast: output length mismatch");
    if total == 0 {
        return;
    }
    let a_strides = utils::broadcast_strides(a_shape, out_shape);
    let b_strides = utils::broadcast_strides(b_shape, out_shape);
    let mut coords = vec![0usize; rank];
    let mut a_off = 0usize;
    let mut b_off = 0usize;
    for dst in out.iter_mut() {
        *dst = op(a[a_off], b[b_off]);
        // odometer increment, innermost dim fastest
        for d in (0..rank).rev() {
            coords[d] += 1;
            a_off += a_strides[d];
            b_off += b_strides[d];
            if coords[d] < out_shape[d] {
                break;
            }
            a_off -= a_strides[d] * coords[d];
            b_off -= b_strides[d] * coords[d];
            coords[d] = 0;
        }
    }
}
