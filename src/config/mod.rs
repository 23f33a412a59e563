//! Test configuration
//!
//! Resolved parameters for one provisioning test run. The binary builds a
//! [`TestConfig`] from command line flags and environment variables; library
//! users can build one directly with [`TestConfig::new`] and the `with_*`
//! setters.

use crate::TesterError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default time to wait for servers to become ACTIVE
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);

/// Default time to wait for servers to report their test result
pub const DEFAULT_CALLHOME_TIMEOUT: Duration = Duration::from_secs(300);

/// Default delay between two server polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Network reference that asks the provider to auto-allocate a network
pub const AUTO_NETWORK: &str = "auto";

/// Dialect of the shim script injected into the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShimType {
    /// POSIX shell (bash) for Linux guests
    #[value(alias = "posix-shell")]
    Bash,
    /// PowerShell for Windows guests
    #[value(name = "powershell", alias = "windows-shell")]
    PowerShell,
}

impl fmt::Display for ShimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShimType::Bash => write!(f, "bash"),
            ShimType::PowerShell => write!(f, "powershell"),
        }
    }
}

impl FromStr for ShimType {
    type Err = TesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" | "posix-shell" => Ok(ShimType::Bash),
            "powershell" | "windows-shell" => Ok(ShimType::PowerShell),
            other => Err(TesterError::Config(format!(
                "invalid shim script type: {}",
                other
            ))),
        }
    }
}

/// First-boot agent running inside the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InitType {
    /// cloud-init (Linux guests)
    CloudInit,
    /// cloudbase-init (Windows guests)
    CloudbaseInit,
}

impl fmt::Display for InitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitType::CloudInit => write!(f, "cloud-init"),
            InitType::CloudbaseInit => write!(f, "cloudbase-init"),
        }
    }
}

impl FromStr for InitType {
    type Err = TesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud-init" => Ok(InitType::CloudInit),
            "cloudbase-init" => Ok(InitType::CloudbaseInit),
            other => Err(TesterError::Config(format!(
                "unsupported cloud-init type: {}",
                other
            ))),
        }
    }
}

/// When the test servers are torn down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Teardown {
    /// Delete servers only when the test fails or is interrupted
    #[default]
    OnFailure,
    /// Delete servers after every run, including successful ones
    Always,
}

/// Resolved parameters for a provisioning test
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Image id or name
    pub image: String,
    /// Flavor name or id
    pub flavor: String,
    /// Network id or name, or `auto`
    pub network: Option<String>,
    pub availability_zone: Option<String>,
    /// Number of servers to boot
    pub count: u32,
    pub build_timeout: Duration,
    pub callhome_timeout: Duration,
    pub poll_interval: Duration,
    /// Script run inside every guest; must exit 0 for success
    pub test_script: Option<PathBuf>,
    /// Directory receiving console logs when the test fails
    pub console_logs: Option<PathBuf>,
    pub shim_type: ShimType,
    pub init_type: InitType,
    pub teardown: Teardown,
}

impl TestConfig {
    /// Create a configuration with defaults for everything but image and flavor
    pub fn new(image: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            flavor: flavor.into(),
            network: None,
            availability_zone: None,
            count: 1,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            callhome_timeout: DEFAULT_CALLHOME_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            test_script: None,
            console_logs: None,
            shim_type: ShimType::Bash,
            init_type: InitType::CloudInit,
            teardown: Teardown::OnFailure,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_availability_zone(mut self, az: impl Into<String>) -> Self {
        self.availability_zone = Some(az.into());
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn with_callhome_timeout(mut self, timeout: Duration) -> Self {
        self.callhome_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_test_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_script = Some(path.into());
        self
    }

    pub fn with_console_logs(mut self, dir: impl Into<PathBuf>) -> Self {
        self.console_logs = Some(dir.into());
        self
    }

    pub fn with_shim_type(mut self, shim_type: ShimType) -> Self {
        self.shim_type = shim_type;
        self
    }

    pub fn with_init_type(mut self, init_type: InitType) -> Self {
        self.init_type = init_type;
        self
    }

    pub fn with_teardown(mut self, teardown: Teardown) -> Self {
        self.teardown = teardown;
        self
    }

    /// Network reference to resolve, if any (`auto` needs no lookup)
    pub fn network_to_resolve(&self) -> Option<&str> {
        self.network
            .as_deref()
            .filter(|network| *network != AUTO_NETWORK)
    }

    /// Check required parameters
    pub fn validate(&self) -> Result<(), TesterError> {
        if self.image.trim().is_empty() || self.flavor.trim().is_empty() {
            return Err(TesterError::Config(
                "flavor and image id are required".to_string(),
            ));
        }
        if self.count == 0 {
            return Err(TesterError::Config(
                "server count must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(TesterError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TestConfig::new("cirros", "m1.tiny");
        assert_eq!(config.count, 1);
        assert_eq!(config.shim_type, ShimType::Bash);
        assert_eq!(config.init_type, InitType::CloudInit);
        assert_eq!(config.teardown, Teardown::OnFailure);
        assert_eq!(config.build_timeout, DEFAULT_BUILD_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_image() {
        let config = TestConfig::new("", "m1.tiny");
        assert!(matches!(config.validate(), Err(TesterError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_count() {
        let config = TestConfig::new("cirros", "m1.tiny").with_count(0);
        assert!(matches!(config.validate(), Err(TesterError::Config(_))));
    }

    #[test]
    fn test_network_to_resolve() {
        let config = TestConfig::new("cirros", "m1.tiny");
        assert_eq!(config.network_to_resolve(), None);

        let config = config.with_network("auto");
        assert_eq!(config.network_to_resolve(), None);

        let config = config.with_network("private");
        assert_eq!(config.network_to_resolve(), Some("private"));
    }

    #[test]
    fn test_shim_type_from_str() {
        assert_eq!("bash".parse::<ShimType>().unwrap(), ShimType::Bash);
        assert_eq!("posix-shell".parse::<ShimType>().unwrap(), ShimType::Bash);
        assert_eq!(
            "windows-shell".parse::<ShimType>().unwrap(),
            ShimType::PowerShell
        );
        assert!(matches!(
            "zsh".parse::<ShimType>(),
            Err(TesterError::Config(_))
        ));
    }

    #[test]
    fn test_init_type_from_str() {
        assert_eq!(
            "cloudbase-init".parse::<InitType>().unwrap(),
            InitType::CloudbaseInit
        );
        assert!(matches!(
            "ignition".parse::<InitType>(),
            Err(TesterError::Config(_))
        ));
    }

    #[test]
    fn test_display_matches_cli_names() {
        assert_eq!(ShimType::PowerShell.to_string(), "powershell");
        assert_eq!(InitType::CloudbaseInit.to_string(), "cloudbase-init");
    }
}
