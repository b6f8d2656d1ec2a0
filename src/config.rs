use std::fmt;
use std::sync::OnceLock;

/// Environment variable that pins the SIMD backend (`avx2`, `portable`, `scalar`).
pub const SIMD_ENV_VAR: &str = "QKERNELS_SIMD";

/// Code path used by the pooling and add kernels. Every backend produces
/// bit-identical output; they differ only in speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimdBackend {
    /// AVX2 widening loads with int32 lane accumulation and FMA dequantize
    /// (x86_64 with AVX2 and FMA only).
    Avx2,
    /// Fixed-width int32 lane arrays left to the auto-vectorizer.
    Portable,
    /// One element at a time; pooling accumulates in 64 bits.
    Scalar,
}

impl SimdBackend {
    pub fn is_available(self) -> bool {
        match self {
            SimdBackend::Avx2 => avx2_detected(),
            SimdBackend::Portable | SimdBackend::Scalar => true,
        }
    }

    pub fn detect() -> Self {
        if avx2_detected() {
            SimdBackend::Avx2
        } else {
            SimdBackend::Portable
        }
    }
}

impl fmt::Display for SimdBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimdBackend::Avx2 => write!(f, "avx2"),
            SimdBackend::Portable => write!(f, "portable"),
            SimdBackend::Scalar => write!(f, "scalar"),
        }
    }
}

impl std::str::FromStr for SimdBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avx2" => Ok(SimdBackend::Avx2),
            "portable" => Ok(SimdBackend::Portable),
            "scalar" => Ok(SimdBackend::Scalar),
            other => Err(format!("unknown SIMD backend `{other}`")),
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn avx2_detected() -> bool {
    is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")
}

#[cfg(not(target_arch = "x86_64"))]
fn avx2_detected() -> bool {
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub backend: SimdBackend,
}

impl KernelConfig {
    /// Resolves the backend from `QKERNELS_SIMD`, falling back to CPU detection.
    pub fn from_env() -> Self {
        let requested = std::env::var(SIMD_ENV_VAR).ok();
        Self::resolve(requested.as_deref())
    }

    fn resolve(requested: Option<&str>) -> Self {
        let backend = match requested.map(str::parse::<SimdBackend>) {
            Some(Ok(b)) if b.is_available() => b,
            Some(Ok(b)) => {
                let fallback = SimdBackend::detect();
                log::warn!("{SIMD_ENV_VAR}={b} is not supported on this CPU, using {fallback}");
                fallback
            }
            Some(Err(e)) => {
                let fallback = SimdBackend::detect();
                log::warn!("{SIMD_ENV_VAR}: {e}, using {fallback}");
                fallback
            }
            None => SimdBackend::detect(),
        };
        log::debug!("kernel SIMD backend: {backend}");
        Self { backend }
    }
}

static KERNEL_CONFIG: OnceLock<KernelConfig> = OnceLock::new();

/// Process-wide configuration, resolved on first use.
pub fn kernel_config() -> &'static KernelConfig {
    KERNEL_CONFIG.get_or_init(KernelConfig::from_env)
}
