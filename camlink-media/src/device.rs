//! Camera discovery

use crate::capture::{DeviceKind, MediaBackend};
use crate::constraints::CaptureConstraints;
use crate::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A camera the user can pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Opaque device identifier
    pub id: String,
    /// Display label
    pub label: String,
}

/// Lists cameras after unlocking permission
#[derive(Clone)]
pub struct DeviceEnumerator {
    backend: Arc<dyn MediaBackend>,
}

impl DeviceEnumerator {
    /// Create an enumerator over `backend`
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }

    /// List video inputs.
    ///
    /// A throwaway stream is requested first so the platform prompts for
    /// permission and reveals device labels; it is stopped right away.
    pub async fn list_devices(&self) -> MediaResult<Vec<DeviceDescriptor>> {
        match self.backend.request_stream(&CaptureConstraints::any()).await {
            Ok(probe) => probe.stop(),
            Err(e @ MediaError::PermissionDenied { .. }) => return Err(e),
            Err(e) => {
                // Enumeration still tells us whether any camera exists
                warn!("Permission probe failed: {}", e);
            }
        }

        let listed = self
            .backend
            .enumerate_devices()
            .await
            .map_err(|e| match e {
                MediaError::PermissionDenied { .. }
                | MediaError::DeviceEnumerationFailed { .. } => e,
                other => MediaError::DeviceEnumerationFailed {
                    reason: other.to_string(),
                },
            })?;

        let devices: Vec<DeviceDescriptor> = listed
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .enumerate()
            .map(|(index, d)| DeviceDescriptor {
                label: if d.label.is_empty() {
                    format!("Camera {}", index + 1)
                } else {
                    d.label
                },
                id: d.device_id,
            })
            .collect();

        if devices.is_empty() {
            return Err(MediaError::NoDevice);
        }

        info!("Found {} camera(s)", devices.len());
        Ok(devices)
    }
}

impl std::fmt::Debug for DeviceEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEnumerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MediaDeviceInfo, SyntheticBackend, SyntheticConfig};

    #[tokio::test]
    async fn test_lists_only_cameras_and_releases_probe() {
        let backend = SyntheticBackend::new(SyntheticConfig {
            devices: vec![
                MediaDeviceInfo::video_input("front", "Front Camera"),
                MediaDeviceInfo::video_input("usb", ""),
            ],
            ..SyntheticConfig::default()
        });
        let enumerator = DeviceEnumerator::new(Arc::new(backend.clone()));

        let devices = enumerator.list_devices().await.unwrap();
        assert_eq!(
            devices,
            vec![
                DeviceDescriptor {
                    id: "front".to_string(),
                    label: "Front Camera".to_string()
                },
                DeviceDescriptor {
                    id: "usb".to_string(),
                    label: "Camera 2".to_string()
                },
            ]
        );
        assert_eq!(backend.acquire_count(), 1);
        assert_eq!(backend.live_count(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let backend = SyntheticBackend::default();
        backend.set_permission(false);
        let enumerator = DeviceEnumerator::new(Arc::new(backend));
        assert!(matches!(
            enumerator.list_devices().await,
            Err(MediaError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_enumeration_failure() {
        let backend = SyntheticBackend::default();
        backend.fail_next_enumeration("NotReadableError: device list unavailable");
        let enumerator = DeviceEnumerator::new(Arc::new(backend.clone()));

        let err = enumerator.list_devices().await.unwrap_err();
        assert!(matches!(err, MediaError::DeviceEnumerationFailed { .. }));
        assert!(err.to_string().contains("device list unavailable"));
        assert!(!err.is_recoverable());
        assert_eq!(backend.live_count(), 0);

        assert_eq!(enumerator.list_devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_video_inputs() {
        let backend = SyntheticBackend::new(SyntheticConfig {
            devices: vec![MediaDeviceInfo {
                device_id: "mic".to_string(),
                kind: DeviceKind::AudioInput,
                label: "Mic".to_string(),
            }],
            ..SyntheticConfig::default()
        });
        let enumerator = DeviceEnumerator::new(Arc::new(backend));
        assert!(matches!(
            enumerator.list_devices().await,
            Err(MediaError::NoDevice)
        ));
    }
}
