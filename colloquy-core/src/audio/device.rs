//! Audio device enumeration and output-rate queries.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::{ColloquyError, Result};

/// Metadata about an audio device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default device for its direction.
    pub is_default: bool,
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if enumeration fails or no devices exist.
pub fn list_input_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    match host.input_devices() {
        Ok(devices) => collect(devices, default_name),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            Vec::new()
        }
    }
}

/// List all available audio output devices on the system.
pub fn list_output_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    match host.output_devices() {
        Ok(devices) => collect(devices, default_name),
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            Vec::new()
        }
    }
}

fn collect(devices: impl Iterator<Item = cpal::Device>, default_name: Option<String>) -> Vec<DeviceInfo> {
    devices
        .enumerate()
        .map(|(idx, device)| {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Audio Device {}", idx + 1));
            let is_default = default_name.as_deref() == Some(name.as_str());
            DeviceInfo { name, is_default }
        })
        .collect()
}

/// Native sample rate of the default output device.
///
/// Queried once at player construction; playback audio is resampled from
/// the synthesizer rate to this rate.
pub fn default_output_rate() -> Result<u32> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(ColloquyError::NoDefaultOutputDevice)?;
    let config = device
        .default_output_config()
        .map_err(|e| ColloquyError::AudioDevice(e.to_string()))?;
    Ok(config.sample_rate().0)
}
