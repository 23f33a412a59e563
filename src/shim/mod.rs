//! Call-home shim scripts
//!
//! The shim runs inside the guest at first boot. It executes the user test
//! script (when one was supplied), then reports the outcome by POSTing to
//! `{endpoint}/servers/{instance_id}/metadata` with the caller's token:
//!
//! - exit code 0: `{status_key}` is set to the ok value
//! - anything else: `{exitcode_key}` is set to the exit code, then
//!   `{status_key}` is set to the error value
//!
//! Each dialect is a [`ShimRenderer`] implementation.

pub mod bash;
pub mod powershell;

pub use bash::BashShim;
pub use powershell::PowerShellShim;

use crate::TesterError;
use crate::config::ShimType;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::Serialize;

/// Inputs shared by every shim dialect
#[derive(Debug, Clone, Serialize)]
pub struct ShimParams {
    /// Token placed in the `X-Auth-Token` header of the report
    pub auth_token: String,
    /// Compute API base URL, without trailing slash
    pub endpoint: String,
    /// Guest path where the user test script is written
    pub user_script_path: String,
    pub status_key: String,
    pub status_ok: String,
    pub status_error: String,
    pub exitcode_key: String,
    /// Base64 of the user test script, empty when there is none
    pub user_script_b64: String,
}

impl ShimParams {
    pub fn new(auth_token: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            auth_token: auth_token.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            user_script_path: String::new(),
            status_key: String::new(),
            status_ok: String::new(),
            status_error: String::new(),
            exitcode_key: String::new(),
            user_script_b64: String::new(),
        }
    }

    pub fn with_user_script_path(mut self, path: impl Into<String>) -> Self {
        self.user_script_path = path.into();
        self
    }

    /// Set the metadata key and values the shim reports with
    pub fn with_status_keys(
        mut self,
        status_key: impl Into<String>,
        status_ok: impl Into<String>,
        status_error: impl Into<String>,
        exitcode_key: impl Into<String>,
    ) -> Self {
        self.status_key = status_key.into();
        self.status_ok = status_ok.into();
        self.status_error = status_error.into();
        self.exitcode_key = exitcode_key.into();
        self
    }

    /// Embed the user test script body (base64 encoded)
    pub fn with_user_script(mut self, content: &str) -> Self {
        self.user_script_b64 = BASE64.encode(content);
        self
    }
}

/// A shim script dialect
pub trait ShimRenderer: Send + Sync {
    /// Dialect produced by this renderer
    fn shim_type(&self) -> ShimType;

    /// Render the guest script text
    fn render(&self, params: &ShimParams) -> Result<String, TesterError>;
}

/// Get the renderer for a shim dialect
pub fn renderer_for(shim_type: ShimType) -> Box<dyn ShimRenderer> {
    match shim_type {
        ShimType::Bash => Box::new(BashShim),
        ShimType::PowerShell => Box::new(PowerShellShim),
    }
}

/// Render a shim from a dialect name such as `bash` or `powershell`
pub fn render_named(script_type: &str, params: &ShimParams) -> Result<String, TesterError> {
    let shim_type: ShimType = script_type.parse()?;
    renderer_for(shim_type).render(params)
}
