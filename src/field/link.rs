//! Local network link drivers.
//!
//! The connectivity manager only needs two things from a link: a way to kick
//! off bring-up, and a cheap "is it up right now" check it can poll.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ConnectivityError;

pub const DEFAULT_SYSFS_NET: &str = "/sys/class/net";

pub trait LinkDriver {
    /// Start bringing the link up. Returns once the request is issued; the
    /// caller polls `is_up` for the outcome.
    fn begin(&mut self) -> Result<(), ConnectivityError>;

    fn is_up(&self) -> bool;

    /// Human-readable link description (interface, address) for logs.
    fn describe(&self) -> String;
}

/// Linux interface state read from sysfs, with an optional bring-up command
/// (e.g. `nmcli device connect wlan0`).
#[derive(Clone, Debug)]
pub struct SysfsLink {
    interface: String,
    sysfs_root: PathBuf,
    bring_up_command: Vec<String>,
}

impl SysfsLink {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_NET),
            bring_up_command: Vec::new(),
        }
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn with_bring_up_command(mut self, argv: Vec<String>) -> Self {
        self.bring_up_command = argv;
        self
    }

    fn read_attr(&self, name: &str) -> Option<String> {
        let path = self.interface_dir().join(name);
        std::fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn interface_dir(&self) -> PathBuf {
        self.sysfs_root.join(&self.interface)
    }
}

impl LinkDriver for SysfsLink {
    fn begin(&mut self) -> Result<(), ConnectivityError> {
        if !self.interface_dir().exists() {
            return Err(ConnectivityError::Link(format!(
                "no such interface: {}",
                self.interface
            )));
        }
        let Some((program, args)) = self.bring_up_command.split_first() else {
            return Ok(());
        };
        log::info!("Bringing up {} via {}", self.interface, program);
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| ConnectivityError::Link(format!("failed to run {program}: {e}")))?;
        if !status.success() {
            return Err(ConnectivityError::Link(format!(
                "{program} exited with {status}"
            )));
        }
        Ok(())
    }

    fn is_up(&self) -> bool {
        match self.read_attr("operstate").as_deref() {
            Some("up") => true,
            // Some drivers never report operstate; fall back to carrier.
            Some("unknown") => self.read_attr("carrier").as_deref() == Some("1"),
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self.read_attr("address") {
            Some(mac) => format!("{} ({})", self.interface, mac),
            None => self.interface.clone(),
        }
    }
}

/// For hosts whose network is managed elsewhere: always up.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostManagedLink;

impl LinkDriver for HostManagedLink {
    fn begin(&mut self) -> Result<(), ConnectivityError> {
        Ok(())
    }

    fn is_up(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        "host-managed network".to_string()
    }
}

/// Either link kind, chosen from configuration.
#[derive(Clone, Debug)]
pub enum ConfiguredLink {
    Sysfs(SysfsLink),
    HostManaged(HostManagedLink),
}

impl ConfiguredLink {
    pub fn from_interface(interface: Option<&str>, root: Option<&Path>, argv: Vec<String>) -> Self {
        match interface {
            Some(name) => {
                let mut link = SysfsLink::new(name).with_bring_up_command(argv);
                if let Some(root) = root {
                    link = link.with_sysfs_root(root);
                }
                ConfiguredLink::Sysfs(link)
            }
            None => ConfiguredLink::HostManaged(HostManagedLink),
        }
    }
}

impl LinkDriver for ConfiguredLink {
    fn begin(&mut self) -> Result<(), ConnectivityError> {
        match self {
            ConfiguredLink::Sysfs(link) => link.begin(),
            ConfiguredLink::HostManaged(link) => link.begin(),
        }
    }

    fn is_up(&self) -> bool {
        match self {
            ConfiguredLink::Sysfs(link) => link.is_up(),
            ConfiguredLink::HostManaged(link) => link.is_up(),
        }
    }

    fn describe(&self) -> String {
        match self {
            ConfiguredLink::Sysfs(link) => link.describe(),
            ConfiguredLink::HostManaged(link) => link.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_interface(root: &Path, name: &str, operstate: &str, carrier: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("operstate"), format!("{operstate}\n")).unwrap();
        std::fs::write(dir.join("carrier"), format!("{carrier}\n")).unwrap();
        std::fs::write(dir.join("address"), "aa:bb:cc:dd:ee:ff\n").unwrap();
    }

    #[test]
    fn operstate_up_is_up() {
        let dir = tempfile::tempdir().unwrap();
        fake_interface(dir.path(), "wlan0", "up", "1");
        let link = SysfsLink::new("wlan0").with_sysfs_root(dir.path());
        assert!(link.is_up());
        assert_eq!(link.describe(), "wlan0 (aa:bb:cc:dd:ee:ff)");
    }

    #[test]
    fn operstate_down_is_down() {
        let dir = tempfile::tempdir().unwrap();
        fake_interface(dir.path(), "wlan0", "down", "0");
        let link = SysfsLink::new("wlan0").with_sysfs_root(dir.path());
        assert!(!link.is_up());
    }

    #[test]
    fn unknown_operstate_falls_back_to_carrier() {
        let dir = tempfile::tempdir().unwrap();
        fake_interface(dir.path(), "tun0", "unknown", "1");
        fake_interface(dir.path(), "tun1", "unknown", "0");
        assert!(SysfsLink::new("tun0").with_sysfs_root(dir.path()).is_up());
        assert!(!SysfsLink::new("tun1").with_sysfs_root(dir.path()).is_up());
    }

    #[test]
    fn missing_interface_fails_begin() {
        let dir = tempfile::tempdir().unwrap();
        let mut link = SysfsLink::new("wlan9").with_sysfs_root(dir.path());
        assert!(!link.is_up());
        assert!(matches!(link.begin(), Err(ConnectivityError::Link(_))));
    }

    #[cfg(unix)]
    #[test]
    fn bring_up_command_status_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        fake_interface(dir.path(), "wlan0", "down", "0");
        let mut ok = SysfsLink::new("wlan0")
            .with_sysfs_root(dir.path())
            .with_bring_up_command(vec!["true".to_string()]);
        assert!(ok.begin().is_ok());
        let mut failing = SysfsLink::new("wlan0")
            .with_sysfs_root(dir.path())
            .with_bring_up_command(vec!["false".to_string()]);
        assert!(matches!(failing.begin(), Err(ConnectivityError::Link(_))));
    }

    #[test]
    fn no_interface_means_host_managed() {
        let link = ConfiguredLink::from_interface(None, None, Vec::new());
        assert!(link.is_up());
        assert!(matches!(link, ConfiguredLink::HostManaged(_)));
    }
}
