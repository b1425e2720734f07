//! Machine identity.
//!
//! Every agent publishes under `machines/<id>/`. Host names differ in case
//! between platforms and tools, so the id is normalized once at construction
//! and compared as-is afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, lower-cased machine identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    /// Normalize a raw host name into a machine id.
    ///
    /// Returns `None` for names that would produce an unusable store path:
    /// empty after trimming, or containing path separators or characters the
    /// store rejects in keys (`.`, `#`, `$`, `[`, `]`).
    pub fn new(raw: &str) -> Option<Self> {
        let id = raw.trim().to_lowercase();
        if id.is_empty() || id.contains(['/', '.', '#', '$', '[', ']']) {
            return None;
        }
        Some(MachineId(id))
    }

    /// Borrow the normalized id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MachineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for MachineId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineId::new(s).ok_or_else(|| format!("invalid machine id: {:?}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_id_is_lowercased() {
        let id = MachineId::new("  DESKTOP-A1B2 ").unwrap();
        assert_eq!(id.as_str(), "desktop-a1b2");
        assert_eq!(id.to_string(), "desktop-a1b2");
    }

    #[test]
    fn test_machine_id_rejects_unusable_keys() {
        assert!(MachineId::new("").is_none());
        assert!(MachineId::new("   ").is_none());
        assert!(MachineId::new("a/b").is_none());
        assert!(MachineId::new("host.local").is_none());
        assert!(MachineId::new("x[1]").is_none());
    }

    #[test]
    fn test_machine_id_from_str() {
        let id: MachineId = "M1".parse().unwrap();
        assert_eq!(id, MachineId::new("m1").unwrap());
        assert!("".parse::<MachineId>().is_err());
    }

    #[test]
    fn test_machine_id_serializes_transparently() {
        let id = MachineId::new("m1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"m1\"");
    }
}
