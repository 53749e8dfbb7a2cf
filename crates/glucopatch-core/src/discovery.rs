//! Device discovery and selection.
//!
//! [`discover`] scans through a [`Transport`] and hands the candidates to a
//! [`DeviceChooser`], which plays the role of the platform device picker.

use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DiscoveryError, Error, Result};
use crate::transport::{DiscoveredDevice, DiscoveryFilter, Transport};
use glucopatch_types::uuids::GLUCOPATCH_SERVICE;

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
    /// Which devices to report.
    pub filter: DiscoveryFilter,
    /// The service the caller intends to use.
    pub service: Uuid,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            filter: DiscoveryFilter::default(),
            service: GLUCOPATCH_SERVICE,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Set the discovery filter.
    #[must_use]
    pub fn filter(mut self, filter: DiscoveryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Report every device in range.
    #[must_use]
    pub fn all_devices(self) -> Self {
        self.filter(DiscoveryFilter::AcceptAll)
    }

    /// Set the declared service.
    #[must_use]
    pub fn service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }
}

/// Picks one device from the scan results.
///
/// Candidates arrive sorted strongest signal first and are never empty.
pub trait DeviceChooser: Send + Sync {
    fn choose(
        &self,
        candidates: &[DiscoveredDevice],
    ) -> std::result::Result<DiscoveredDevice, DiscoveryError>;
}

/// Picks the first (strongest) candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl DeviceChooser for FirstMatch {
    fn choose(
        &self,
        candidates: &[DiscoveredDevice],
    ) -> std::result::Result<DiscoveredDevice, DiscoveryError> {
        candidates
            .first()
            .cloned()
            .ok_or(DiscoveryError::Cancelled)
    }
}

/// Picks the candidate whose identifier or name equals the given string
/// (names compared case-insensitively).
#[derive(Debug, Clone)]
pub struct ByIdentifier(pub String);

impl DeviceChooser for ByIdentifier {
    fn choose(
        &self,
        candidates: &[DiscoveredDevice],
    ) -> std::result::Result<DiscoveredDevice, DiscoveryError> {
        let wanted = self.0.as_str();
        candidates
            .iter()
            .find(|d| {
                d.id.eq_ignore_ascii_case(wanted)
                    || d.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(wanted))
            })
            .cloned()
            .ok_or_else(|| DiscoveryError::NotFound {
                identifier: wanted.to_string(),
            })
    }
}

/// Sort candidates strongest signal first; devices without RSSI go last.
pub fn sort_by_signal(devices: &mut [DiscoveredDevice]) {
    devices.sort_by(|a, b| b.rssi.unwrap_or(i16::MIN).cmp(&a.rssi.unwrap_or(i16::MIN)));
}

/// Scan and return every candidate passing the filter, strongest first.
///
/// An empty list is not an error.
pub async fn scan<T: Transport + ?Sized>(
    transport: &T,
    options: &ScanOptions,
) -> Result<Vec<DiscoveredDevice>> {
    let mut devices = transport
        .scan(&options.filter, options.service, options.duration)
        .await
        .map_err(|e| Error::Discovery(DiscoveryError::ScanFailed(e.to_string())))?;
    sort_by_signal(&mut devices);
    Ok(devices)
}

/// Scan, then let `chooser` pick one device.
///
/// Fails with [`DiscoveryError::NoMatchingDevice`] when nothing passed the
/// filter, or with whatever the chooser reports (for example
/// [`DiscoveryError::Cancelled`]).
#[tracing::instrument(level = "info", skip_all, fields(filter = %options.filter))]
pub async fn discover<T: Transport + ?Sized>(
    transport: &T,
    options: &ScanOptions,
    chooser: &dyn DeviceChooser,
) -> Result<DiscoveredDevice> {
    let candidates = scan(transport, options).await?;
    if candidates.is_empty() {
        warn!("No device matching {}", options.filter);
        return Err(Error::Discovery(DiscoveryError::NoMatchingDevice {
            filter: options.filter.to_string(),
        }));
    }

    let device = chooser.choose(&candidates).map_err(Error::Discovery)?;
    info!(device = %device.display_name(), id = %device.id, "Device selected");
    Ok(device)
}
