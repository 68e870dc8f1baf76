//! Hardware provider and thread-count auto-selection.
//!
//! Models can run on different backends depending on the host. The default
//! is picked once at startup: an NVIDIA accelerator selects `cuda`, an
//! Apple Neural Engine selects `coreml`, anything else runs on `cpu`. The
//! user may override globally or per-subsystem.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ColloquyError;

/// Hardware backend identifier handed to the model collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Cpu,
    Cuda,
    CoreMl,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl FromStr for Provider {
    type Err = ColloquyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(ColloquyError::Config(format!(
                "unknown provider '{other}' (expected cpu, cuda, or coreml)"
            ))),
        }
    }
}

/// Detect the default provider for this host.
pub fn detect() -> Provider {
    if nvidia_present() {
        info!("NVIDIA accelerator detected; defaulting to cuda");
        return Provider::Cuda;
    }
    if apple_neural_engine_present() {
        info!("Apple Neural Engine detected; defaulting to coreml");
        return Provider::CoreMl;
    }
    Provider::Cpu
}

/// Resolve an optional per-subsystem override against the global override
/// and auto-detection.
pub fn resolve(subsystem: Option<Provider>, global: Option<Provider>) -> Provider {
    subsystem.or(global).unwrap_or_else(detect)
}

fn nvidia_present() -> bool {
    // Discrete and SoC drivers both surface here on Linux.
    if Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidia0").exists() {
        return true;
    }
    // Fall back to the management tool being installed.
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join("nvidia-smi");
                candidate.is_file()
            })
        })
        .unwrap_or(false)
}

fn apple_neural_engine_present() -> bool {
    cfg!(all(target_os = "macos", target_arch = "aarch64"))
}

/// Resolve a thread-count setting: 0 selects the auto value
/// `max(1, online_cpus / 3)`.
pub fn auto_threads(requested: usize) -> usize {
    if requested != 0 {
        return requested;
    }
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 3).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parses_known_names() {
        assert_eq!("cpu".parse::<Provider>().unwrap(), Provider::Cpu);
        assert_eq!("CUDA".parse::<Provider>().unwrap(), Provider::Cuda);
        assert_eq!(" coreml ".parse::<Provider>().unwrap(), Provider::CoreMl);
        assert!("npu".parse::<Provider>().is_err());
    }

    #[test]
    fn provider_display_round_trips() {
        for p in [Provider::Cpu, Provider::Cuda, Provider::CoreMl] {
            assert_eq!(p.to_string().parse::<Provider>().unwrap(), p);
        }
    }

    #[test]
    fn explicit_thread_count_wins() {
        assert_eq!(auto_threads(4), 4);
        assert_eq!(auto_threads(1), 1);
    }

    #[test]
    fn zero_selects_at_least_one_thread() {
        assert!(auto_threads(0) >= 1);
    }

    #[test]
    fn subsystem_override_beats_global() {
        assert_eq!(
            resolve(Some(Provider::Cuda), Some(Provider::Cpu)),
            Provider::Cuda
        );
        assert_eq!(resolve(None, Some(Provider::CoreMl)), Provider::CoreMl);
    }
}
