//! Cloud-config document types and builder
//!
//! Produces the `#cloud-config` YAML handed to the server as user data.
//! Only the directives the tester needs are modelled.

use crate::TesterError;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

/// Header line identifying a cloud-config document
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Cloud-config document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Packages to install
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,

    /// Files to write
    pub write_files: Vec<WriteFileConfig>,

    /// Commands to run, each as an argument vector
    pub runcmd: Vec<Vec<String>>,
}

/// File to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileConfig {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl WriteFileConfig {
    /// Decode `content` according to `encoding`
    pub fn decoded_content(&self) -> Result<Vec<u8>, TesterError> {
        match self.encoding.as_deref() {
            Some("b64") => BASE64
                .decode(&self.content)
                .map_err(|e| TesterError::Config(format!("Invalid base64: {}", e))),
            Some(other) => Err(TesterError::Config(format!(
                "Unknown encoding: {}",
                other
            ))),
            None => Ok(self.content.clone().into_bytes()),
        }
    }
}

impl CloudConfig {
    /// Parse cloud-config from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let yaml = yaml
            .strip_prefix(CLOUD_CONFIG_HEADER)
            .map(|s| s.trim_start())
            .unwrap_or(yaml);

        serde_yaml::from_str(yaml)
    }

    /// Check if this looks like a cloud-config (starts with #cloud-config)
    pub fn is_cloud_config(data: &str) -> bool {
        data.trim_start().starts_with(CLOUD_CONFIG_HEADER)
    }

    /// Serialize to a document starting with the `#cloud-config` header
    pub fn to_document(&self) -> Result<String, TesterError> {
        Ok(format!(
            "{}\n{}",
            CLOUD_CONFIG_HEADER,
            serde_yaml::to_string(self)?
        ))
    }
}

/// Accumulates write_files and runcmd directives in order
///
/// No validation happens here: callers are responsible for writing files
/// before the command that uses them.
#[derive(Debug, Clone, Default)]
pub struct CloudConfigBuilder {
    config: CloudConfig,
}

impl CloudConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; content is stored base64 encoded
    pub fn add_write_file(
        &mut self,
        path: impl Into<String>,
        content: impl AsRef<[u8]>,
        mode: impl Into<String>,
    ) -> &mut Self {
        self.config.write_files.push(WriteFileConfig {
            path: path.into(),
            content: BASE64.encode(content),
            encoding: Some("b64".to_string()),
            permissions: Some(mode.into()),
        });
        self
    }

    /// Add a command given as an argument vector
    pub fn add_runcmd<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .runcmd
            .push(args.into_iter().map(Into::into).collect());
        self
    }

    /// Add a package to install before runcmd executes
    pub fn add_package(&mut self, name: impl Into<String>) -> &mut Self {
        self.config.packages.push(name.into());
        self
    }

    /// The document built so far
    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Serialize into a cloud-config document
    pub fn generate(&self) -> Result<String, TesterError> {
        self.config.to_document()
    }
}
