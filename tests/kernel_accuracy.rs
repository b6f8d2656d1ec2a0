// Kernel accuracy tests - compare quantized kernels with brute-force references
use approx::assert_abs_diff_eq;
use qkernels::config::SimdBackend;
use qkernels::kernels::*;
use qkernels::ops;
use qkernels::tensor::{QParams, QTensorView};
use qkernels::{MemoryFormat, QDType, QTensor, QuantInt};

const BACKENDS: [SimdBackend; 3] = [SimdBackend::Avx2, SimdBackend::Portable, SimdBackend::Scalar];

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect()
}

/// Codes spread over `±32768 * step`, well outside the 8-bit range.
fn pseudo_random_i32(len: usize, seed: u32, step: i32) -> Vec<i32> {
    pseudo_random(len * 2, seed)
        .chunks_exact(2)
        .map(|p| (u16::from_le_bytes([p[0], p[1]]) as i32 - 32768) * step)
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn reference_max_pool<T: QuantInt>(
    data: &[T],
    dims: [usize; 4],
    k: usize,
    s: usize,
    p: usize,
    d: usize,
    out_h: usize,
    out_w: usize,
) -> Vec<T> {
    let [n, h, w, c] = dims;
    let mut out = Vec::with_capacity(n * out_h * out_w * c);
    for b in 0..n {
        for oy in 0..out_h {
            for ox in 0..out_w {
                for ch in 0..c {
                    let mut m = T::MIN;
                    for ky in 0..k {
                        for kx in 0..k {
                            let iy = (oy * s + ky * d) as i64 - p as i64;
                            let ix = (ox * s + kx * d) as i64 - p as i64;
                            if iy < 0 || ix < 0 || iy >= h as i64 || ix >= w as i64 {
                                continue;
                            }
                            let v = data[((b * h + iy as usize) * w + ix as usize) * c + ch];
                            m = m.max(v);
                        }
                    }
                    out.push(m);
                }
            }
        }
    }
    out
}

#[test]
fn test_max_pool_dilated_padded_matches_reference() {
    init();
    // 133 channels: one 4-group tier (128), no single-group tier, 5 scalar tail
    let (n, h, w, c) = (2, 7, 6, 133);
    let data: Vec<i8> = pseudo_random(n * h * w * c, 7).into_iter().map(|v| v as i8).collect();
    let x = QTensorView::from_owned(data.clone(), vec![n, h, w, c], QParams::new(0.1, -3));

    for &(k, s, p, d, ceil) in &[(3, 1, 1, 2, false), (3, 2, 1, 1, true), (2, 2, 1, 1, true), (3, 2, 0, 2, false)] {
        let window = PoolWindow::new((k, k), (s, s), (p, p), (d, d));
        let (out_h, out_w) = window.output_size(h, w, ceil).unwrap();
        let mut out = Vec::new();
        let y = qmax_pool2d_nhwc(&x, window, out_h, out_w, &mut out);
        let expected = reference_max_pool(&data, [n, h, w, c], k, s, p, d, out_h, out_w);
        assert_eq!(y.shape.as_ref(), &[n, out_h, out_w, c]);
        assert_eq!(y.params, x.params);
        assert_eq!(y.data.as_ref(), expected.as_slice(), "k={k} s={s} p={p} d={d} ceil={ceil}");
    }
}

#[allow(clippy::too_many_arguments)]
fn reference_avg_pool<T: QuantInt>(
    data: &[T],
    params: QParams,
    dims: [usize; 4],
    k: usize,
    s: usize,
    p: usize,
    out_h: usize,
    out_w: usize,
    count_include_pad: bool,
    divisor_override: Option<i64>,
) -> Vec<f64> {
    let [n, h, w, c] = dims;
    let (k, s, p) = (k as i64, s as i64, p as i64);
    let (hi, wi) = (h as i64, w as i64);
    let mut out = Vec::new();
    for b in 0..n {
        for oy in 0..out_h as i64 {
            for ox in 0..out_w as i64 {
                let (hs, ws) = (oy * s - p, ox * s - p);
                let (he, we) = ((hs + k).min(hi + p), (ws + k).min(wi + p));
                let pool_size = (he - hs) * (we - ws);
                let (hs, ws, he, we) = (hs.max(0), ws.max(0), he.min(hi), we.min(wi));
                let count = (he - hs).max(0) * (we - ws).max(0);
                let divisor = divisor_override.unwrap_or(if count_include_pad { pool_size } else { count });
                for ch in 0..c {
                    let mut sum = 0.0f64;
                    for iy in hs..he {
                        for ix in ws..we {
                            let q = data[((b * h + iy as usize) * w + ix as usize) * c + ch].to_i64() as f64;
                            sum += params.scale as f64 * (q - params.zero_point as f64);
                        }
                    }
                    out.push(sum / divisor as f64);
                }
            }
        }
    }
    out
}

#[test]
fn test_avg_pool_matches_reference() {
    init();
    let (n, h, w, c) = (1, 6, 5, 19);
    let params = QParams::new(0.05, 128);
    let data = pseudo_random(n * h * w * c, 11);
    let x = QTensorView::from_owned(data.clone(), vec![n, h, w, c], params);

    let cases = [
        (3, 2, 1, true, true, None),
        (3, 2, 1, true, false, None),
        (2, 1, 0, false, false, None),
        (3, 1, 1, false, true, Some(16)),
    ];
    for &(k, s, p, ceil, include_pad, divisor) in &cases {
        let window = PoolWindow::new((k, k), (s, s), (p, p), (1, 1));
        let (out_h, out_w) = window.output_size(h, w, ceil).unwrap();
        let expected = reference_avg_pool(&data, params, [n, h, w, c], k, s, p, out_h, out_w, include_pad, divisor);
        for backend in BACKENDS {
            let mut out = Vec::new();
            let y = qavg_pool2d_nhwc(&x, window, out_h, out_w, include_pad, divisor, params, backend, &mut out);
            assert_eq!(y.data.len(), expected.len());
            for (&q, &e) in y.data.iter().zip(&expected) {
                let got = dequantize_val(params.scale, params.zero_point, q) as f64;
                assert_abs_diff_eq!(got, e, epsilon = params.scale as f64 * 0.5 + 1e-4);
            }
        }
    }
}

#[test]
fn test_avg_pool_backends_bit_identical() {
    // 8-bit channels take the lane path for 16 of 21 channels on Avx2/Portable
    let (h, w, c) = (5, 5, 21);
    let params = QParams::new(0.02, -5);
    let data: Vec<i8> = pseudo_random(h * w * c, 3).into_iter().map(|v| v as i8).collect();
    let x = QTensorView::from_owned(data, vec![1, h, w, c], params);
    let window = PoolWindow::new((3, 3), (2, 2), (1, 1), (1, 1));
    let (out_h, out_w) = window.output_size(h, w, false).unwrap();
    let out_params = QParams::new(0.015, 2);

    let mut results = Vec::new();
    for backend in BACKENDS {
        let mut out = Vec::new();
        qavg_pool2d_nhwc(&x, window, out_h, out_w, false, None, out_params, backend, &mut out);
        results.push(out);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn test_max_pool_i32_matches_reference() {
    init();
    // 45 channels of 32-bit codes: a 4-group tier (32), one single group (8), 5 scalar tail
    let (n, h, w, c) = (1, 6, 7, 45);
    let data = pseudo_random_i32(n * h * w * c, 21, 40_000);
    let x = QTensorView::from_owned(data.clone(), vec![n, h, w, c], QParams::new(0.001, 1000));

    for &(k, s, p, d, ceil) in &[(3, 2, 1, 1, true), (2, 1, 0, 2, false), (3, 1, 1, 1, false)] {
        let window = PoolWindow::new((k, k), (s, s), (p, p), (d, d));
        let (out_h, out_w) = window.output_size(h, w, ceil).unwrap();
        let mut out = Vec::new();
        let y = qmax_pool2d_nhwc(&x, window, out_h, out_w, &mut out);
        let expected = reference_max_pool(&data, [n, h, w, c], k, s, p, d, out_h, out_w);
        assert_eq!(y.data.as_ref(), expected.as_slice(), "k={k} s={s} p={p} d={d} ceil={ceil}");
    }
}

#[test]
fn test_avg_pool_i32_matches_reference() {
    init();
    let (n, h, w, c) = (2, 5, 6, 11);
    let params = QParams::new(0.001, -2500);
    let data = pseudo_random_i32(n * h * w * c, 17, 30);
    let x = QTensorView::from_owned(data.clone(), vec![n, h, w, c], params);
    let out_params = QParams::new(0.0015, 40);

    for &(k, s, p, ceil, include_pad) in &[(3, 2, 1, true, true), (3, 2, 1, false, false), (2, 2, 0, false, true)] {
        let window = PoolWindow::new((k, k), (s, s), (p, p), (1, 1));
        let (out_h, out_w) = window.output_size(h, w, ceil).unwrap();
        let expected = reference_avg_pool(&data, params, [n, h, w, c], k, s, p, out_h, out_w, include_pad, None);
        let mut results = Vec::new();
        for backend in BACKENDS {
            let mut out = Vec::new();
            let y = qavg_pool2d_nhwc(&x, window, out_h, out_w, include_pad, None, out_params, backend, &mut out);
            for (&q, &e) in y.data.iter().zip(&expected) {
                let got = dequantize_val(out_params.scale, out_params.zero_point, q) as f64;
                assert_abs_diff_eq!(got, e, epsilon = out_params.scale as f64 * 0.5 + 2e-4);
            }
            results.push(out);
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }
}

#[test]
fn test_avg_pool_i32_sum_wider_than_i32() {
    // four codes near 2e9 per window: the sum only fits in 64 bits
    let (h, w, c) = (2, 2, 3);
    let base = 2_000_000_000i32;
    let mut data = vec![0i32; h * w * c];
    for iy in 0..h {
        for ix in 0..w {
            for ch in 0..c {
                data[(iy * w + ix) * c + ch] = base + ch as i32 + 2 * (iy * w + ix) as i32;
            }
        }
    }
    let params = QParams::new(1.0, 0);
    let x = QTensorView::from_owned(data, vec![1, h, w, c], params);
    let window = PoolWindow::new((2, 2), (2, 2), (0, 0), (1, 1));
    for backend in BACKENDS {
        let mut out = Vec::new();
        let y = qavg_pool2d_nhwc(&x, window, 1, 1, true, None, params, backend, &mut out);
        assert_eq!(y.data.as_ref(), &[base + 3, base + 4, base + 5], "{backend}");
    }
}

#[test]
fn test_adaptive_pool_i32_matches_reference() {
    init();
    // 7x5 -> 3x2 has overlapping windows on both axes
    let (h, w, c) = (7, 5, 13);
    let (out_h, out_w) = (3, 2);
    let params = QParams::new(0.002, 700);
    let data = pseudo_random_i32(h * w * c, 29, 25);
    let x = QTensorView::from_owned(data.clone(), vec![1, h, w, c], params);
    let out_params = QParams::new(0.004, -12);

    let mut results = Vec::new();
    for backend in BACKENDS {
        let mut out = Vec::new();
        let y = qadaptive_avg_pool2d_nhwc(&x, out_h, out_w, out_params, backend, &mut out);
        assert_eq!(y.shape.as_ref(), &[1, out_h, out_w, c]);
        for oy in 0..out_h {
            for ox in 0..out_w {
                let (ys, xs) = (adaptive_range(oy, h, out_h), adaptive_range(ox, w, out_w));
                let area = (ys.len() * xs.len()) as f64;
                for ch in 0..c {
                    let mut sum = 0.0f64;
                    for iy in ys.clone() {
                        for ix in xs.clone() {
                            sum += 0.002 * (data[(iy * w + ix) * c + ch] as f64 - 700.0);
                        }
                    }
                    let got = dequantize_val(0.004, -12, y.data[(oy * out_w + ox) * c + ch]) as f64;
                    assert_abs_diff_eq!(got, sum / area, epsilon = 0.002 + 2e-4);
                }
            }
        }
        results.push(out);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[1], results[2]);
}

#[test]
fn test_adaptive_pool_divisible_partitions_input() {
    init();
    let (h, w, c) = (6, 4, 9);
    let (out_h, out_w) = (3, 2);
    // every input cell lies in exactly one window
    let mut hits = vec![0; h * w];
    for oy in 0..out_h {
        for ox in 0..out_w {
            for iy in adaptive_range(oy, h, out_h) {
                for ix in adaptive_range(ox, w, out_w) {
                    hits[iy * w + ix] += 1;
                }
            }
        }
    }
    assert!(hits.iter().all(|&n| n == 1));

    let params = QParams::new(0.1, 10);
    let data = pseudo_random(h * w * c, 5);
    let x = QTensorView::from_owned(data.clone(), vec![1, h, w, c], params);
    for backend in BACKENDS {
        let mut out = Vec::new();
        let y = qadaptive_avg_pool2d_nhwc(&x, out_h, out_w, params, backend, &mut out);
        assert_eq!(y.shape.as_ref(), &[1, out_h, out_w, c]);
        for oy in 0..out_h {
            for ox in 0..out_w {
                for ch in 0..c {
                    let mut sum = 0.0f64;
                    for iy in 2 * oy..2 * oy + 2 {
                        for ix in 2 * ox..2 * ox + 2 {
                            let q = data[(iy * w + ix) * c + ch] as f64;
                            sum += 0.1 * (q - 10.0);
                        }
                    }
                    let got = dequantize_val(0.1, 10, y.data[(oy * out_w + ox) * c + ch]) as f64;
                    assert_abs_diff_eq!(got, sum / 4.0, epsilon = 0.05 + 1e-4);
                }
            }
        }
    }
}

#[test]
fn test_adaptive_pool_overlapping_windows() {
    // 5 -> 3 gives windows [0,2), [1,4), [3,5)
    assert_eq!(adaptive_range(0, 5, 3), 0..2);
    assert_eq!(adaptive_range(1, 5, 3), 1..4);
    assert_eq!(adaptive_range(2, 5, 3), 3..5);

    let data: Vec<u8> = vec![10, 20, 30, 40, 50];
    let x = QTensorView::from_owned(data, vec![1, 1, 5, 1], QParams::new(1.0, 0));
    let mut out = Vec::new();
    let y = qadaptive_avg_pool2d_nhwc(&x, 1, 3, QParams::new(1.0, 0), SimdBackend::Scalar, &mut out);
    assert_eq!(y.data.as_ref(), &[15, 30, 45]);
}

#[test]
fn test_relu_is_idempotent() {
    let x = QTensor::quantize(
        &[-1.0, -0.25, 0.0, 0.3, 7.5, 2.0],
        vec![2, 3],
        QParams::new(0.05, 20),
        QDType::QUInt8,
    )
    .unwrap();
    let once = ops::relu(&x);
    assert_eq!(ops::relu(&once), once);
    let once6 = ops::relu6(&x);
    assert_eq!(ops::relu6(&once6), once6);
    let deq = once6.dequantize();
    assert!(deq.iter().all(|&v| (0.0..=6.0).contains(&v)));
}

#[test]
fn test_add_reruns_into_dirty_buffer() {
    let len = 70;
    let a = QTensorView::from_owned(pseudo_random(len, 31), vec![len], QParams::new(0.04, 120));
    let b = QTensorView::from_owned(pseudo_random(len, 37), vec![len], QParams::new(0.03, 90));
    let out_params = QParams::new(0.06, 110);
    for backend in BACKENDS {
        // same length as the output, so nothing is reallocated or cleared
        let mut out = vec![0xAAu8; len];
        let first = qadd(&a, &b, out_params, backend, &mut out).data.to_vec();
        assert_eq!(qadd(&a, &b, out_params, backend, &mut out).data.as_ref(), first.as_slice());
        let fused = qadd_relu(&a, &b, out_params, backend, &mut out).data.to_vec();
        assert!(fused.iter().zip(&first).all(|(&f, &q)| f == q.max(110)));
        assert_eq!(qadd_relu(&a, &b, out_params, backend, &mut out).data.as_ref(), fused.as_slice());
    }
}

#[test]
fn test_pooling_reruns_into_dirty_buffer() {
    let (h, w, c) = (6, 6, 37);
    let params = QParams::new(0.05, -4);
    let data: Vec<i8> = pseudo_random(h * w * c, 41).into_iter().map(|v| v as i8).collect();
    let x = QTensorView::from_owned(data, vec![1, h, w, c], params);
    let window = PoolWindow::new((3, 3), (2, 2), (1, 1), (1, 1));
    let (out_h, out_w) = window.output_size(h, w, true).unwrap();
    let out_len = out_h * out_w * c;

    let mut out = vec![i8::MAX; out_len];
    let first = qmax_pool2d_nhwc(&x, window, out_h, out_w, &mut out).data.to_vec();
    assert_eq!(qmax_pool2d_nhwc(&x, window, out_h, out_w, &mut out).data.as_ref(), first.as_slice());

    for backend in BACKENDS {
        let mut out = vec![i8::MIN; out_len];
        let first = qavg_pool2d_nhwc(&x, window, out_h, out_w, false, None, params, backend, &mut out)
            .data
            .to_vec();
        let again = qavg_pool2d_nhwc(&x, window, out_h, out_w, false, None, params, backend, &mut out);
        assert_eq!(again.data.as_ref(), first.as_slice(), "{backend}");

        let mut out = vec![i8::MIN; 2 * 3 * c];
        let first = qadaptive_avg_pool2d_nhwc(&x, 2, 3, params, backend, &mut out).data.to_vec();
        let again = qadaptive_avg_pool2d_nhwc(&x, 2, 3, params, backend, &mut out);
        assert_eq!(again.data.as_ref(), first.as_slice(), "{backend}");
    }
}

#[test]
fn test_topk_reruns_into_dirty_buffers() {
    let (rows, n, k) = (3, 40, 6);
    let x = QTensorView::from_owned(pseudo_random(rows * n, 43), vec![rows, n], QParams::new(0.1, 0));
    for &largest in &[true, false] {
        let mut values = vec![0u8; rows * k];
        let mut indices = vec![-1i64; rows * k];
        let (first_v, first_i) = {
            let (v, i) = qtopk(&x, k, 1, largest, true, &mut values, &mut indices);
            (v.data.to_vec(), i.data.to_vec())
        };
        let (v, i) = qtopk(&x, k, 1, largest, true, &mut values, &mut indices);
        assert_eq!(v.data.as_ref(), first_v.as_slice());
        assert_eq!(i.data.as_ref(), first_i.as_slice());
    }
}

#[test]
fn test_max_pool_unit_window_is_identity() {
    let values: Vec<f32> = (0..2 * 3 * 4 * 5).map(|v| (v as f32 - 60.0) * 0.1).collect();
    let x = QTensor::quantize(&values, vec![2, 3, 4, 5], QParams::new(0.1, 0), QDType::QInt8).unwrap();
    let y = ops::max_pool2d(&x, (1, 1), (1, 1), (0, 0), (1, 1), false).unwrap();
    assert_eq!(y.format(), MemoryFormat::ChannelsLast);
    assert_eq!(y.to_contiguous(), x);
}

#[test]
fn test_ops_avg_pool_matches_kernel() {
    init();
    let (n, c, h, w) = (1, 3, 4, 4);
    let data: Vec<u8> = pseudo_random(n * c * h * w, 9);
    let params = QParams::new(0.1, 100);
    let x = QTensor::from_codes(data, vec![n, c, h, w], params).unwrap();
    let y = ops::avg_pool2d(&x, (2, 2), (2, 2), (0, 0), false, true, None).unwrap();
    assert_eq!(y.shape(), &[1, 3, 2, 2]);
    assert_eq!(y.params(), params);

    let nhwc = x.to_channels_last().unwrap();
    let view = QTensorView::from_slice(nhwc.codes::<u8>().unwrap(), vec![n, h, w, c], params);
    let window = PoolWindow::new((2, 2), (2, 2), (0, 0), (1, 1));
    let mut out = Vec::new();
    qavg_pool2d_nhwc(&view, window, 2, 2, true, None, params, SimdBackend::Scalar, &mut out);
    assert_eq!(y.codes::<u8>().unwrap(), out.as_slice());
}

#[test]
fn test_topk_examples() {
    let x = QTensor::from_codes(vec![5i8, 1, 9, 3, 7], vec![5], QParams::new(1.0, 0)).unwrap();
    let top = ops::topk(&x, 3, 0, true, true).unwrap();
    assert_eq!(top.values.codes::<i8>().unwrap(), &[9, 7, 5]);
    assert_eq!(top.indices, vec![2, 4, 0]);
    assert_eq!(top.values.params(), x.params());

    let bottom = ops::topk(&x, 2, -1, false, true).unwrap();
    assert_eq!(bottom.values.codes::<i8>().unwrap(), &[1, 3]);
    assert_eq!(bottom.indices, vec![1, 3]);

    let all = ops::topk(&x, 5, 0, false, true).unwrap();
    assert_eq!(all.values.codes::<i8>().unwrap(), &[1, 3, 5, 7, 9]);
}

#[test]
fn test_topk_channels_last_uses_logical_order() {
    // logical [1, 2, 1, 3]: channel 0 = [4, 8, 6], channel 1 = [1, 2, 3]
    let x = QTensor::from_codes(vec![4u8, 8, 6, 1, 2, 3], vec![1, 2, 1, 3], QParams::new(0.5, 0)).unwrap();
    let cl = x.to_channels_last().unwrap();
    let top = ops::topk(&cl, 1, 3, true, true).unwrap();
    assert_eq!(top.values.shape(), &[1, 2, 1, 1]);
    assert_eq!(top.values.codes::<u8>().unwrap(), &[8, 3]);
    assert_eq!(top.indices, vec![1, 2]);
}
