//! Machine identity detection.

use rcmd_common::{Error, MachineId, Result};

/// Resolve the id an agent publishes under.
///
/// A non-empty `configured` value wins; otherwise the host name is used.
/// Only the first DNS label is kept since `.` is not allowed in store keys.
pub fn detect_machine_id(configured: &str) -> Result<MachineId> {
    if !configured.trim().is_empty() {
        return MachineId::new(configured)
            .ok_or_else(|| Error::Config(format!("invalid agent.machine_id: {:?}", configured)));
    }

    let host = hostname().ok_or_else(|| {
        Error::Config("cannot determine host name; set agent.machine_id".to_string())
    })?;
    machine_id_from_host(&host)
        .ok_or_else(|| Error::Config(format!("host name {:?} is not a usable machine id", host)))
}

/// Normalize a host name into a machine id.
pub fn machine_id_from_host(host: &str) -> Option<MachineId> {
    let label = host.trim().split('.').next().unwrap_or_default();
    MachineId::new(label)
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on
    // success when the name fits.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return std::env::var("HOSTNAME").ok();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .ok()
        .filter(|h| !h.trim().is_empty())
}
