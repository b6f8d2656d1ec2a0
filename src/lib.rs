pub mod config;
pub mod error;
pub mod kernels;
pub mod ops;
pub mod qtensor;
pub mod tensor;

pub use config::{kernel_config, KernelConfig, SimdBackend};
pub use error::QuantError;
pub use kernels::qtype::{QDType, QuantInt};
pub use qtensor::{MemoryFormat, QStorage, QTensor};
pub use tensor::{QParams, QTensorView, TensorView};
