//! Resource value types and unit parsers.
//!
//! A [`Resources`] triple carries CPU cores, memory in GiB, and GPU
//! count. CPU and memory are decimal with milli-unit precision; GPU
//! counts are integers. Parsers accept the native unit strings of the
//! backends (Kubernetes `2000m` / `4Gi`, Slurm TRES `cpu=…,mem=…`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the resource unit parsers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// CPU quantity could not be parsed.
    #[error("invalid cpu quantity: {0:?}")]
    InvalidCpu(String),

    /// Memory quantity could not be parsed.
    #[error("invalid memory quantity: {0:?}")]
    InvalidMemory(String),

    /// GPU count could not be parsed.
    #[error("invalid gpu count: {0:?}")]
    InvalidGpu(String),

    /// TRES entry could not be parsed.
    #[error("invalid TRES entry: {0:?}")]
    InvalidTres(String),
}

/// A resource request or capacity: CPU cores, memory in GiB, GPU cards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    /// CPU cores (fractional, milli precision).
    pub cpu: f64,

    /// Memory in GiB (fractional, Mi precision).
    pub memory: f64,

    /// Number of GPU cards.
    pub gpu: u32,
}

impl Resources {
    /// Create a resource triple.
    pub fn new(cpu: f64, memory: f64, gpu: u32) -> Self {
        Self { cpu, memory, gpu }
    }

    /// The zero request.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Check whether all components are zero.
    pub fn is_zero(&self) -> bool {
        self.cpu == 0.0 && self.memory == 0.0 && self.gpu == 0
    }

    /// Componentwise addition.
    pub fn add(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu + other.cpu,
            memory: self.memory + other.memory,
            gpu: self.gpu + other.gpu,
        }
    }

    /// Componentwise subtraction, saturating at zero.
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu: (self.cpu - other.cpu).max(0.0),
            memory: (self.memory - other.memory).max(0.0),
            gpu: self.gpu.saturating_sub(other.gpu),
        }
    }

    /// Componentwise less-or-equal against a limit.
    ///
    /// A small epsilon absorbs the floating-point error accumulated by
    /// repeated reserve/release cycles on the fractional components.
    pub fn fits(&self, limit: &Resources) -> bool {
        const EPS: f64 = 1e-9;
        self.cpu <= limit.cpu + EPS && self.memory <= limit.memory + EPS && self.gpu <= limit.gpu
    }

    /// Scale the fractional components and the GPU count.
    pub fn scale(&self, factor: f64) -> Resources {
        Resources {
            cpu: self.cpu * factor,
            memory: self.memory * factor,
            gpu: (f64::from(self.gpu) * factor).floor() as u32,
        }
    }
}

impl std::ops::Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources::add(&self, &rhs)
    }
}

impl std::fmt::Display for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cpu={} memory={} gpu={}",
            format_cpu(self.cpu),
            format_memory(self.memory),
            self.gpu
        )
    }
}

/// Parse a Kubernetes-style CPU quantity (`"2"`, `"2.5"`, `"2000m"`) to cores.
pub fn parse_cpu(s: &str) -> Result<f64, ResourceError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ResourceError::InvalidCpu(s.to_string()));
    }

    if let Some(milli) = s.strip_suffix('m') {
        let value: f64 = milli
            .parse()
            .map_err(|_| ResourceError::InvalidCpu(s.to_string()))?;
        if value < 0.0 {
            return Err(ResourceError::InvalidCpu(s.to_string()));
        }
        return Ok(value / 1000.0);
    }

    let value: f64 = s
        .parse()
        .map_err(|_| ResourceError::InvalidCpu(s.to_string()))?;
    if value < 0.0 {
        return Err(ResourceError::InvalidCpu(s.to_string()));
    }
    Ok(value)
}

/// Parse a Kubernetes-style memory quantity to GiB.
///
/// Accepts `Ki`/`Mi`/`Gi`/`Ti` binary suffixes or a bare byte count.
pub fn parse_memory(s: &str) -> Result<f64, ResourceError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ResourceError::InvalidMemory(s.to_string()));
    }

    let (number, factor) = if let Some(n) = s.strip_suffix("Ti") {
        (n, 1024.0)
    } else if let Some(n) = s.strip_suffix("Gi") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("Mi") {
        (n, 1.0 / 1024.0)
    } else if let Some(n) = s.strip_suffix("Ki") {
        (n, 1.0 / (1024.0 * 1024.0))
    } else {
        // Bare number: bytes.
        (s, 1.0 / (1024.0 * 1024.0 * 1024.0))
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| ResourceError::InvalidMemory(s.to_string()))?;
    if value < 0.0 {
        return Err(ResourceError::InvalidMemory(s.to_string()));
    }
    Ok(value * factor)
}

/// Parse a GPU count (`"2"` or `"gpu:2"`).
pub fn parse_gpu(s: &str) -> Result<u32, ResourceError> {
    let s = s.trim();
    let number = s.strip_prefix("gpu:").unwrap_or(s);
    number
        .trim()
        .parse()
        .map_err(|_| ResourceError::InvalidGpu(s.to_string()))
}

/// Parse a Slurm TRES string (`"cpu=1000,mem=500G,gres/gpu=10"`).
///
/// Unknown keys are skipped; malformed values on known keys fail.
pub fn parse_tres(tres: &str) -> Result<Resources, ResourceError> {
    let mut resources = Resources::zero();

    for item in tres.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let Some((key, value)) = item.split_once('=') else {
            return Err(ResourceError::InvalidTres(item.to_string()));
        };
        let value = value.trim();

        match key.trim() {
            "cpu" => {
                resources.cpu = value
                    .parse()
                    .map_err(|_| ResourceError::InvalidTres(item.to_string()))?;
            }
            "mem" => {
                resources.memory = parse_tres_memory(value)
                    .ok_or_else(|| ResourceError::InvalidTres(item.to_string()))?;
            }
            "gres/gpu" => {
                resources.gpu = value
                    .parse()
                    .map_err(|_| ResourceError::InvalidTres(item.to_string()))?;
            }
            _ => {}
        }
    }

    Ok(resources)
}

/// Slurm TRES memory values carry decimal `T`/`G`/`M`/`K` suffixes; bare
/// values are MiB (Slurm's native accounting unit).
fn parse_tres_memory(value: &str) -> Option<f64> {
    let (number, factor) = if let Some(n) = value.strip_suffix('T') {
        (n, 1024.0)
    } else if let Some(n) = value.strip_suffix('G') {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix('M') {
        (n, 1.0 / 1024.0)
    } else if let Some(n) = value.strip_suffix('K') {
        (n, 1.0 / (1024.0 * 1024.0))
    } else {
        (value, 1.0 / 1024.0)
    };
    let parsed: f64 = number.trim().parse().ok()?;
    if parsed < 0.0 {
        return None;
    }
    Some(parsed * factor)
}

/// Canonical CPU rendering: whole cores as `"2"`, fractional as `"2500m"`.
pub fn format_cpu(cores: f64) -> String {
    let milli = (cores * 1000.0).round() as i64;
    if milli % 1000 == 0 {
        format!("{}", milli / 1000)
    } else {
        format!("{milli}m")
    }
}

/// Canonical memory rendering: whole GiB as `"4Gi"`, fractional as `"512Mi"`.
pub fn format_memory(gib: f64) -> String {
    let mib = (gib * 1024.0).round() as i64;
    if mib % 1024 == 0 {
        format!("{}Gi", mib / 1024)
    } else {
        format!("{mib}Mi")
    }
}
