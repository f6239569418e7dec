use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{ParleyError, Result};

fn device_name(device: &Device) -> Option<String> {
    device
        .description()
        .ok()
        .map(|desc| desc.name().to_string())
}

/// Find an input device by name, or the host default when `name` is `None`.
pub fn input_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        host.input_devices()
            .map_err(|e| {
                ParleyError::Acquisition(format!("failed to enumerate input devices: {e}"))
            })?
            .find(|d| device_name(d).as_deref() == Some(name))
            .ok_or_else(|| ParleyError::Acquisition(format!("input device not found: {name}")))
    } else {
        host.default_input_device().ok_or_else(|| {
            ParleyError::Acquisition("no default input device available".to_string())
        })
    }
}

/// Find an output device by name, or the host default when `name` is `None`.
pub fn output_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = name {
        host.output_devices()
            .map_err(|e| {
                ParleyError::Acquisition(format!("failed to enumerate output devices: {e}"))
            })?
            .find(|d| device_name(d).as_deref() == Some(name))
            .ok_or_else(|| ParleyError::Acquisition(format!("output device not found: {name}")))
    } else {
        host.default_output_device().ok_or_else(|| {
            ParleyError::Acquisition("no default output device available".to_string())
        })
    }
}

pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| ParleyError::Audio(format!("failed to enumerate input devices: {e}")))?;
    Ok(devices.filter_map(|d| device_name(&d)).collect())
}

pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| ParleyError::Audio(format!("failed to enumerate output devices: {e}")))?;
    Ok(devices.filter_map(|d| device_name(&d)).collect())
}

#[must_use]
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| device_name(&d))
}

#[must_use]
pub fn default_output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| device_name(&d))
}
