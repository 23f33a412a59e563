//! Rollback records of the provisioning test

use crate::workflow::RollbackAction;
use std::path::PathBuf;

/// Cleanup recorded by the provisioning test
///
/// Servers are referenced by id and looked up again when the rollback
/// executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningRollback {
    /// Delete every listed server
    DeleteServers { server_ids: Vec<String> },
    /// Write each server's console output to `console-output-{id}.txt`
    SaveConsoleLogs {
        server_ids: Vec<String>,
        dir: PathBuf,
    },
}

impl RollbackAction for ProvisioningRollback {
    fn description(&self) -> String {
        match self {
            ProvisioningRollback::DeleteServers { server_ids } => {
                format!("delete servers: {}", server_ids.join(" "))
            }
            ProvisioningRollback::SaveConsoleLogs { server_ids, dir } => format!(
                "save console logs of {} servers to {}",
                server_ids.len(),
                dir.display()
            ),
        }
    }
}

/// File name of a server's console log
pub fn console_log_name(server_id: &str) -> String {
    format!("console-output-{}.txt", server_id)
}
