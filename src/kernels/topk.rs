use crate::kernels::qtype::QuantInt;
use crate::kernels::utils;
use crate::tensor::{QTensorView, TensorView};
use std::cmp::Ordering;

/// Slices at least this many times longer than `k` take the partial-sort route.
const PARTIAL_SORT_RATIO: usize = 64;

/// Brings the `k` elements that come first under `cmp` to the front of
/// `v`, in order, leaving the rest in unspecified order.
fn partial_sort_by<E, F>(v: &mut [E], k: usize, cmp: F)
where
    F: Fn(&E, &E) -> Ordering,
{
    if k == 0 {
        return;
    }
    // heap[0] is the worst of the current best k
    for i in (0..k / 2).rev() {
        sift_down(&mut v[..k], i, &cmp);
    }
    for i in k..v.len() {
        if cmp(&v[i], &v[0]) == Ordering::Less {
            v.swap(0, i);
            sift_down(&mut v[..k], 0, &cmp);
        }
    }
    v[..k].sort_unstable_by(&cmp);
}

fn sift_down<E, F>(heap: &mut [E], mut i: usize, cmp: &F)
where
    F: Fn(&E, &E) -> Ordering,
{
    let len = heap.len();
    loop {
        let left = 2 * i + 1;
        if left >= len {
            break;
        }
        let right = left + 1;
        let mut child = left;
        if right < len && cmp(&heap[left], &heap[right]) == Ordering::Less {
            child = right;
        }
        if cmp(&heap[i], &heap[child]) != Ordering::Less {
            break;
        }
        heap.swap(i, child);
        i = child;
    }
}

/// Orders `queue` so its first `k` entries are the `k` largest (or smallest)
/// codes. Comparison looks at the code only, so equal codes come out in
/// no particular index order.
fn select_top_k<T: QuantInt>(queue: &mut [(T, i64)], k: usize, largest: bool, sorted: bool) {
    let n = queue.len();
    if k == 0 || n == 0 {
        return;
    }
    let cmp = |x: &(T, i64), y: &(T, i64)| {
        if largest {
            y.0.cmp(&x.0)
        } else {
            x.0.cmp(&y.0)
        }
    };
    if k * PARTIAL_SORT_RATIO <= n {
        partial_sort_by(queue, k, cmp);
    } else {
        queue.select_nth_unstable_by(k - 1, cmp);
        if sorted {
            queue[..k].sort_unstable_by(cmp);
        }
    }
}

/// TopK on quantized codes along `dim`.
/// Values keep the input quantization parameters; indices are positions
/// along `dim`. Both outputs have the input shape with `dim` replaced by `k`.
pub fn qtopk<'a, 'b, T: QuantInt>(
    x: &QTensorView<'_, T>,
    k: usize,
    dim: usize,
    largest: bool,
    sorted: bool,
    values_buf: &'a mut Vec<T>,
    indices_buf: &'b mut Vec<i64>,
) -> (QTensorView<'a, T>, TensorView<'b, i64>) {
    let shape = &x.shape;
    assert!(dim < shape.len(), "qtopk: dim out of range");
    let n = shape[dim];
    assert!(k <= n, "qtopk: k larger than the selected dimension");
    let outer: usize = shape[..dim].iter().product();
    let inner: usize = shape[dim + 1..].iter().product();

    let mut out_shape = shape.to_vec();
    out_shape[dim] = k;
    let total = outer * k * inner;
    utils::ensure_capacity(values_buf, total);
    utils::ensure_capacity(indices_buf, total);

    let data = &x.data;
    let mut queue: Vec<(T, i64)> = Vec::with_capacity(n);

    for o in 0..outer {
        for i in 0..inner {
            queue.clear();
            queue.extend((0..n).map(|j| (data[(o * n + j) * inner + i], j as i64)));
            select_top_k(&mut queue, k, largest, sorted);
            for (j, &(v, idx)) in queue[..k].iter().enumerate() {
                let off = (o * k + j) * inner + i;
                values_buf[off] = v;
                indices_buf[off] = idx;
            }
        }
    }

    let values = QTensorView::from_slice(values_buf, out_shape.clone(), x.params);
    let indices = TensorView::from_slice(indices_buf, out_shape);
    (values, indices)
}
