//! Error type shared by the capture, enumeration and transport layers.
//!
//! Only `Startup` is fatal. Every other variant is recovered where it
//! happens: logged, the affected field degrades to an empty value and the
//! next tick tries again.

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Packet capture cannot run here (no device, no libpcap, disabled).
    #[error("packet capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The OS refused access to a capture handle or a system table.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The feature has no implementation on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    /// A best-effort system query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// Serializing or delivering a payload to viewers failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The process cannot start (bad configuration, bind failure).
    #[error("startup failed: {0}")]
    Startup(String),
}

impl MonitorError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::CaptureUnavailable(_) => "CaptureUnavailable",
            MonitorError::PermissionDenied(_) => "PermissionDenied",
            MonitorError::Unsupported(_) => "Unsupported",
            MonitorError::Query(_) => "Query",
            MonitorError::Transport(_) => "Transport",
            MonitorError::Startup(_) => "Startup",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, MonitorError::Startup(_))
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => MonitorError::PermissionDenied(err.to_string()),
            _ => MonitorError::Query(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Transport(err.to_string())
    }
}

#[cfg(feature = "capture")]
impl From<pcap::Error> for MonitorError {
    fn from(err: pcap::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("permission") || lowered.contains("not permitted") {
            MonitorError::PermissionDenied(message)
        } else {
            MonitorError::CaptureUnavailable(message)
        }
    }
}

#[cfg(target_os = "linux")]
impl From<procfs::ProcError> for MonitorError {
    fn from(err: procfs::ProcError) -> Self {
        if matches!(err, procfs::ProcError::PermissionDenied(_)) {
            MonitorError::PermissionDenied(err.to_string())
        } else {
            MonitorError::Query(err.to_string())
        }
    }
}
