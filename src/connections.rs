//! Connection Enumerator: OS socket tables and interface counters.
//!
//! Both queries are synchronous and best-effort. They return a
//! [`MonitorError`] instead of a partial value; the caller decides on the
//! fallback (empty list, zeroed counters).

use std::fmt::Debug;
use sysinfo::Networks;

use crate::error::MonitorError;
use crate::models::domain::{ConnectionRecord, InterfaceCounters};

pub trait ConnectionEnumerator: Send + Sync {
    fn list_connections(&self) -> Result<Vec<ConnectionRecord>, MonitorError>;

    fn interface_counters(&self) -> Result<InterfaceCounters, MonitorError>;
}

/// Reads the live system: procfs socket tables on Linux, sysinfo counters
/// everywhere.
#[derive(Debug, Default)]
pub struct SystemEnumerator {
    #[cfg(target_os = "linux")]
    partial_access_reported: std::sync::atomic::AtomicBool,
}

impl SystemEnumerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionEnumerator for SystemEnumerator {
    #[cfg(target_os = "linux")]
    fn list_connections(&self) -> Result<Vec<ConnectionRecord>, MonitorError> {
        use std::sync::atomic::Ordering;

        let (records, denied) = linux::list_connections()?;
        if denied > 0 && !self.partial_access_reported.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                processes = denied,
                "limited permissions, owning process unknown for some connections"
            );
        }
        Ok(records)
    }

    #[cfg(not(target_os = "linux"))]
    fn list_connections(&self) -> Result<Vec<ConnectionRecord>, MonitorError> {
        Err(MonitorError::Unsupported("connection enumeration"))
    }

    fn interface_counters(&self) -> Result<InterfaceCounters, MonitorError> {
        let networks = Networks::new_with_refreshed_list();
        if networks.iter().next().is_none() {
            return Err(MonitorError::Query("no network interfaces visible".into()));
        }
        Ok(networks
            .iter()
            .fold(InterfaceCounters::default(), |mut total, (_name, data)| {
                total.bytes_sent += data.total_transmitted();
                total.bytes_received += data.total_received();
                total.packets_sent += data.total_packets_transmitted();
                total.packets_received += data.total_packets_received();
                total
            }))
    }
}

/// Uppercase snake-case label for a socket state, e.g. `FinWait1` -> `FIN_WAIT1`.
pub fn status_label(state: &impl Debug) -> String {
    let name = format!("{state:?}");
    let mut label = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            label.push('_');
        }
        label.push(ch.to_ascii_uppercase());
    }
    label
}

#[cfg(target_os = "linux")]
mod linux {
    use procfs::process::{all_processes, FDTarget};
    use std::collections::HashMap;
    use std::net::SocketAddr;

    use super::status_label;
    use crate::error::MonitorError;
    use crate::models::domain::ConnectionRecord;

    const UDP_STATUS: &str = "NONE";

    /// Socket records plus the number of processes whose fds were unreadable.
    pub fn list_connections() -> Result<(Vec<ConnectionRecord>, usize), MonitorError> {
        let (owners, denied) = socket_owners()?;
        let owner = |inode: u64| owners.get(&inode).copied();
        let mut records = Vec::new();

        let tcp = procfs::net::tcp()?
            .into_iter()
            .chain(procfs::net::tcp6().unwrap_or_default());
        for entry in tcp {
            records.push(ConnectionRecord {
                local: entry.local_address,
                remote: remote(entry.remote_address),
                status: status_label(&entry.state),
                pid: owner(entry.inode),
            });
        }

        let udp = procfs::net::udp()?
            .into_iter()
            .chain(procfs::net::udp6().unwrap_or_default());
        for entry in udp {
            records.push(ConnectionRecord {
                local: entry.local_address,
                remote: remote(entry.remote_address),
                status: UDP_STATUS.to_string(),
                pid: owner(entry.inode),
            });
        }

        Ok((records, denied))
    }

    fn remote(addr: SocketAddr) -> Option<SocketAddr> {
        (!addr.ip().is_unspecified() || addr.port() != 0).then_some(addr)
    }

    fn socket_owners() -> Result<(HashMap<u64, u32>, usize), MonitorError> {
        let mut owners = HashMap::new();
        let mut denied = 0;

        for process in all_processes()?.flatten() {
            let Ok(pid) = u32::try_from(process.pid()) else {
                continue;
            };
            match process.fd() {
                Ok(fds) => {
                    for fd in fds.flatten() {
                        if let FDTarget::Socket(inode) = fd.target {
                            owners.insert(inode, pid);
                        }
                    }
                }
                Err(_) => denied += 1,
            }
        }

        Ok((owners, denied))
    }

}
