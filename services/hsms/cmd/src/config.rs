//! Configuration handling for the HSMS service.
//!
//! Settings come from the `hsms:` section of a YAML file, then from
//! `HSMS_*` environment variables. Command line flags are applied last by
//! the binary.

use anyhow::{Context, Result};
use hsms_session::{DebugOptions, Role, SessionConfig, Timers};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use tracing::{info, warn};

/// HSMS service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HsmsConfig {
    /// Peer address (active) or listen address (passive)
    pub ip: IpAddr,
    /// TCP port
    pub port: u16,
    /// Session id
    pub device: u16,
    /// Connection role
    pub mode: Role,
    /// Protocol timers in seconds
    pub timers: Timers,
    /// Debug switches
    pub debug: DebugOptions,
    /// Answer every primary that expects a reply with an empty reply
    pub echo: bool,
}

impl Default for HsmsConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            device: 0,
            mode: Role::Active,
            timers: Timers::default(),
            debug: DebugOptions::default(),
            echo: false,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    hsms: Option<HsmsConfig>,
}

impl HsmsConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let root: RootConfig = serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?;
                info!("Loaded configuration from {:?}", path);
                root.hsms.unwrap_or_default()
            }
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_environment_overrides()?;

        info!(
            "Final hsms configuration: {}:{} device={} mode={:?}",
            config.ip, config.port, config.device, config.mode
        );
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(ip) = lookup("HSMS_IP") {
            self.ip = ip.parse().with_context(|| format!("Invalid HSMS_IP '{}'", ip))?;
            info!("IP overridden by environment: {}", self.ip);
        }

        if let Some(port) = lookup("HSMS_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("Invalid HSMS_PORT '{}'", port))?;
            info!("Port overridden by environment: {}", self.port);
        }

        if let Some(device) = lookup("HSMS_DEVICE") {
            self.device = device
                .parse()
                .with_context(|| format!("Invalid HSMS_DEVICE '{}'", device))?;
            info!("Device overridden by environment: {}", self.device);
        }

        if let Some(mode) = lookup("HSMS_MODE") {
            self.mode = mode.parse().map_err(anyhow::Error::msg)?;
            info!("Mode overridden by environment: {:?}", self.mode);
        }

        Ok(())
    }

    /// Socket address built from `ip` and `port`
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Session settings for this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            address: self.address(),
            device: self.device,
            role: self.mode,
            timers: self.timers,
            debug: self.debug,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = HsmsConfig::default();
        assert_eq!(config.address(), "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.device, 0);
        assert_eq!(config.mode, Role::Active);
        assert_eq!(config.timers.t3(), Duration::from_secs(45));
        assert!(!config.echo);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
hsms:
  ip: 10.0.0.5
  port: 5555
  device: 37
  mode: passive
  echo: true
  timers:
    t3: 1200
    t7: 3
    link_test: 30
  debug:
    suppress_link_test_rsp: true
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = HsmsConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(config.ip, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(config.port, 5555);
        assert_eq!(config.device, 37);
        assert_eq!(config.mode, Role::Passive);
        assert!(config.echo);
        assert_eq!(config.timers.t3(), Duration::from_secs(120));
        assert_eq!(config.timers.t7(), Duration::from_secs(3));
        assert_eq!(config.timers.t6(), Duration::from_secs(5));
        assert_eq!(config.timers.link_test(), Some(Duration::from_secs(30)));
        assert!(config.debug.suppress_link_test_rsp);
        assert!(!config.debug.suppress_select_req);
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"other:\n  key: value\n").unwrap();

        let config = HsmsConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.timers, Timers::default());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"hsms:\n  port: not-a-port\n").unwrap();

        assert!(HsmsConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("HSMS_IP", "192.168.1.20"),
            ("HSMS_PORT", "6000"),
            ("HSMS_DEVICE", "12"),
            ("HSMS_MODE", "Passive"),
        ]
        .into_iter()
        .collect();

        let mut config = HsmsConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.address(), "192.168.1.20:6000".parse().unwrap());
        assert_eq!(config.device, 12);
        assert_eq!(config.mode, Role::Passive);

        let session = config.session_config();
        assert_eq!(session.role, Role::Passive);
        assert_eq!(session.device, 12);
    }

    #[test]
    fn test_invalid_environment_value() {
        let mut config = HsmsConfig::default();
        assert!(config
            .apply_overrides(|key| (key == "HSMS_MODE").then(|| "sideways".to_string()))
            .is_err());
    }
}
