//! Audio output device enumeration.

use serde::{Deserialize, Serialize};

/// Metadata about an audio output device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default output device.
    pub is_default: bool,
}

/// Sort for presentation: default device first, then by name.
pub fn sort_devices(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// List all available audio output devices on the system.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(devices) => {
            let mut list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    DeviceInfo { name, is_default }
                })
                .collect::<Vec<_>>();

            sort_devices(&mut list);
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            if let Some(default) = host.default_output_device() {
                let name = default
                    .name()
                    .unwrap_or_else(|_| "Default Output Device".to_string());
                vec![DeviceInfo {
                    name,
                    is_default: true,
                }]
            } else {
                vec![]
            }
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::{sort_devices, DeviceInfo};

    #[test]
    fn default_device_sorts_first() {
        let mut devices = vec![
            DeviceInfo {
                name: "Aux Out".into(),
                is_default: false,
            },
            DeviceInfo {
                name: "Speakers".into(),
                is_default: true,
            },
            DeviceInfo {
                name: "HDMI".into(),
                is_default: false,
            },
        ];

        sort_devices(&mut devices);
        assert_eq!(devices[0].name, "Speakers");
        assert_eq!(devices[1].name, "Aux Out");
        assert_eq!(devices[2].name, "HDMI");
    }
}
