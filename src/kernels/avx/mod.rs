pub mod pooling;
pub mod quantize;
pub use pooling::*;
pub use quantize::*;
