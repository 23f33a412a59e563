//! Boot payload (user data) assembly
//!
//! Wraps a rendered shim script in the format the guest's first-boot agent
//! understands:
//!
//! - cloud-init: a `#cloud-config` document writing the shim (and the user
//!   test script, if any) and running the shim from `runcmd`
//! - cloudbase-init: the shim inline, behind a `#ps1_sysnative` marker

pub mod cloud_config;

pub use cloud_config::{CloudConfig, CloudConfigBuilder, WriteFileConfig};

use crate::TesterError;
use crate::config::{InitType, ShimType};
use tracing::debug;

/// Guest path of the shim script
pub const TEST_SHIM_PATH: &str = "/run_test.sh";

/// Guest path of the user test script
pub const USER_TEST_SCRIPT_PATH: &str = "/user_test.sh";

/// Marker telling cloudbase-init to run the payload with 64-bit PowerShell
pub const PS1_SYSNATIVE_MARKER: &str = "#ps1_sysnative";

/// Mode for the scripts written by cloud-init
const SCRIPT_MODE: &str = "0750";

/// Build the user data for a shim dialect and init agent combination
///
/// cloudbase-init only runs PowerShell payloads, so pairing it with the bash
/// shim is rejected.
pub fn build_userdata(
    shim_type: ShimType,
    init_type: InitType,
    shim: &str,
    user_script: Option<&str>,
) -> Result<String, TesterError> {
    debug!("Building {} user data for {} shim", init_type, shim_type);

    match init_type {
        InitType::CloudInit => {
            let mut builder = CloudConfigBuilder::new();
            builder.add_write_file(TEST_SHIM_PATH, shim, SCRIPT_MODE);
            if let Some(script) = user_script {
                builder.add_write_file(USER_TEST_SCRIPT_PATH, script, SCRIPT_MODE);
            }
            match shim_type {
                ShimType::Bash => {
                    // The shim reports through curl
                    builder.add_package("curl");
                    builder.add_runcmd(["/bin/bash", TEST_SHIM_PATH]);
                }
                ShimType::PowerShell => {
                    builder.add_runcmd(["/usr/bin/env", "powershell", "-File", TEST_SHIM_PATH]);
                }
            }
            builder.generate()
        }
        InitType::CloudbaseInit => match shim_type {
            ShimType::PowerShell => Ok(format!("{}\n{}", PS1_SYSNATIVE_MARKER, shim)),
            ShimType::Bash => Err(TesterError::Config(format!(
                "unsupported shim type {} for {}",
                shim_type, init_type
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloudbase_init_payload() {
        let userdata = build_userdata(
            ShimType::PowerShell,
            InitType::CloudbaseInit,
            "Report 0",
            None,
        )
        .unwrap();
        assert_eq!(userdata, "#ps1_sysnative\nReport 0");
    }

    #[test]
    fn test_cloudbase_init_rejects_bash() {
        let result = build_userdata(ShimType::Bash, InitType::CloudbaseInit, "echo", None);
        assert!(matches!(result, Err(TesterError::Config(_))));
    }

    #[test]
    fn test_cloud_init_bash_installs_curl() {
        let userdata =
            build_userdata(ShimType::Bash, InitType::CloudInit, "echo", None).unwrap();
        let config = CloudConfig::from_yaml(&userdata).unwrap();

        assert_eq!(config.packages, vec!["curl"]);
        assert_eq!(config.write_files.len(), 1);
        assert_eq!(
            config.runcmd,
            vec![vec!["/bin/bash", TEST_SHIM_PATH]]
        );
    }

    #[test]
    fn test_cloud_init_powershell_runcmd() {
        let userdata =
            build_userdata(ShimType::PowerShell, InitType::CloudInit, "Report 0", None).unwrap();
        let config = CloudConfig::from_yaml(&userdata).unwrap();

        assert!(config.packages.is_empty());
        assert_eq!(
            config.runcmd,
            vec![vec!["/usr/bin/env", "powershell", "-File", TEST_SHIM_PATH]]
        );
    }
}
