pub mod activations;
#[cfg(target_arch = "x86_64")]
pub mod avx;
pub mod elementwise;
pub mod math;
pub mod pooling;
pub mod qtype;
pub mod quantize;
pub mod topk;
pub mod utils;
pub mod vec;
pub use activations::{qrelu, qrelu6};
pub use math::{qadd, qadd_relu};
pub use pooling::{
    adaptive_range, pooling_output_size, qadaptive_avg_pool2d_nhwc, qadaptive_avg_pool2d_strided,
    qavg_pool2d_nhwc, qmax_pool2d_nhwc, InputStrides, PoolWindow,
};
pub use quantize::*;
pub use topk::qtopk;
