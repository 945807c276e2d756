// src/sniff.rs
use crossbeam_channel::{unbounded, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::MonitorError;
use crate::models::domain::PacketSummary;
use crate::stats::Aggregator;

/// A live feed of packet observations.
pub trait CaptureSource: Send {
    fn name(&self) -> String;

    /// Blocks, sending one summary per observed packet, until `running` is
    /// cleared, the receiver goes away or the handle fails.
    fn run(
        self: Box<Self>,
        sender: Sender<PacketSummary>,
        running: Arc<AtomicBool>,
    ) -> Result<(), MonitorError>;
}

/// Result of the one-time availability check made at startup.
pub struct CaptureProbe {
    source: Option<Box<dyn CaptureSource>>,
}

impl CaptureProbe {
    /// Opens the capture device. Failure is a degraded capability, logged here
    /// once and never again.
    pub fn open(interface: Option<&str>, enabled: bool) -> Self {
        if !enabled {
            info!("packet capture disabled by configuration");
            return Self::unavailable();
        }
        match live::open(interface) {
            Ok(source) => {
                info!(device = %source.name(), "packet capture enabled");
                Self::from_source(source)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kind = e.kind(),
                    "packet capture disabled, serving connection and interface stats only"
                );
                Self::unavailable()
            }
        }
    }

    pub fn from_source(source: Box<dyn CaptureSource>) -> Self {
        CaptureProbe { source: Some(source) }
    }

    pub fn unavailable() -> Self {
        CaptureProbe { source: None }
    }

    pub fn is_available(&self) -> bool {
        self.source.is_some()
    }

    /// Spawns the capture thread and the recorder thread feeding `aggregator`.
    /// Returns `None` when capture is unavailable.
    pub fn start(self, aggregator: Arc<Aggregator>, running: Arc<AtomicBool>) -> Option<CaptureWorkers> {
        let source = self.source?;
        let (tx, rx) = unbounded::<PacketSummary>();

        let capture = thread::spawn(move || {
            let name = source.name();
            match source.run(tx, running) {
                Ok(()) => debug!(device = %name, "packet capture finished"),
                Err(e) => error!(device = %name, error = %e, "packet capture stopped"),
            }
        });

        let recorder = thread::spawn(move || {
            for summary in rx {
                aggregator.record(summary);
            }
        });

        Some(CaptureWorkers { capture, recorder })
    }
}

pub struct CaptureWorkers {
    capture: JoinHandle<()>,
    recorder: JoinHandle<()>,
}

impl CaptureWorkers {
    /// Waits for both threads. The recorder finishes once the source is done
    /// and every summary it sent has been recorded.
    pub fn join(self) {
        if self.capture.join().is_err() {
            error!("capture thread panicked");
        }
        if self.recorder.join().is_err() {
            error!("recorder thread panicked");
        }
    }
}

/// Capture devices as (name, description).
pub fn list_devices() -> Result<Vec<(String, Option<String>)>, MonitorError> {
    live::list_devices()
}

#[cfg(feature = "capture")]
mod live {
    use super::CaptureSource;
    use crate::config::{CAPTURE_SNAPLEN, CAPTURE_TIMEOUT_MS};
    use crate::error::MonitorError;
    use crate::models::domain::PacketSummary;
    use crate::parser::{summarize, LinkLayer};
    use crossbeam_channel::Sender;
    use pcap::{Active, Capture, Device};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const DLT_EN10MB: i32 = 1;
    const DLT_RAW: [i32; 5] = [12, 14, 101, 228, 229];

    struct PcapSource {
        cap: Capture<Active>,
        device: String,
        link: LinkLayer,
    }

    pub fn open(interface: Option<&str>) -> Result<Box<dyn CaptureSource>, MonitorError> {
        let device = match interface {
            Some(name) => Device::list()?
                .into_iter()
                .find(|device| device.name == name)
                .ok_or_else(|| MonitorError::CaptureUnavailable(format!("no capture device named {name}")))?,
            None => Device::lookup()?
                .ok_or_else(|| MonitorError::CaptureUnavailable("no capture device found".into()))?,
        };
        let name = device.name.clone();

        let cap = Capture::from_device(device)?
            .promisc(false)
            .snaplen(CAPTURE_SNAPLEN)
            .timeout(CAPTURE_TIMEOUT_MS)
            .immediate_mode(true)
            .open()?;

        let link = match cap.get_datalink().0 {
            DLT_EN10MB => LinkLayer::Ethernet,
            raw if DLT_RAW.contains(&raw) => LinkLayer::RawIp,
            other => {
                return Err(MonitorError::CaptureUnavailable(format!(
                    "unsupported link type {other} on {name}"
                )))
            }
        };

        Ok(Box::new(PcapSource { cap, device: name, link }))
    }

    pub fn list_devices() -> Result<Vec<(String, Option<String>)>, MonitorError> {
        Ok(Device::list()?
            .into_iter()
            .map(|device| (device.name, device.desc))
            .collect())
    }

    impl CaptureSource for PcapSource {
        fn name(&self) -> String {
            self.device.clone()
        }

        fn run(
            mut self: Box<Self>,
            sender: Sender<PacketSummary>,
            running: Arc<AtomicBool>,
        ) -> Result<(), MonitorError> {
            let link = self.link;
            while running.load(Ordering::SeqCst) {
                match self.cap.next_packet() {
                    Ok(packet) => {
                        let summary = summarize(packet.data, packet.header.len, link);
                        if sender.send(summary).is_err() {
                            break;
                        }
                    }
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        }
    }
}

#[cfg(not(feature = "capture"))]
mod live {
    use super::CaptureSource;
    use crate::error::MonitorError;

    pub fn open(_interface: Option<&str>) -> Result<Box<dyn CaptureSource>, MonitorError> {
        Err(MonitorError::CaptureUnavailable(
            "built without the `capture` feature".into(),
        ))
    }

    pub fn list_devices() -> Result<Vec<(String, Option<String>)>, MonitorError> {
        Err(MonitorError::CaptureUnavailable(
            "built without the `capture` feature".into(),
        ))
    }
}
