//! Compute API collaborator
//!
//! The provisioning test talks to the cloud only through [`ComputeApi`]:
//! resolve image/flavor/network references, create and poll servers, fetch
//! console output and clean up. [`openstack::NovaClient`] implements it over
//! the OpenStack REST APIs and [`mock::MockCompute`] in memory for tests.

pub mod mock;
pub mod openstack;

use crate::TesterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server status once it has booted
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Glance image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Nova flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Tenant network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Server as reported by the compute API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Server {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    /// Value of a metadata key, if set
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Network attachment of a new server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Nics {
    /// Let the API decide (no `networks` in the request)
    #[default]
    Unspecified,
    /// Ask the provider to auto-allocate a network
    Auto,
    /// Attach to the given network id
    Network(String),
}

/// Parameters for creating one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateServerRequest {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    pub nics: Nics,
    /// Raw user data; clients encode it as the API requires
    pub userdata: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub availability_zone: Option<String>,
}

/// Operations the provisioning test needs from the cloud
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Token used for API calls, handed to the guest for reporting
    fn auth_token(&self) -> &str;

    /// Compute API base URL
    fn endpoint(&self) -> &str;

    /// Resolve an image id or name
    async fn find_image(&self, reference: &str) -> Result<Image, TesterError>;

    /// Resolve a network id or name
    async fn find_network(&self, reference: &str) -> Result<Network, TesterError>;

    /// Resolve a flavor name (or id)
    async fn find_flavor(&self, name: &str) -> Result<Flavor, TesterError>;

    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server, TesterError>;

    async fn get_server(&self, id: &str) -> Result<Server, TesterError>;

    async fn delete_server(&self, id: &str) -> Result<(), TesterError>;

    async fn get_console_output(&self, id: &str) -> Result<String, TesterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_meta() {
        let mut server = Server {
            id: "abc".to_string(),
            status: "BUILD".to_string(),
            ..Default::default()
        };
        assert!(!server.is_active());
        assert_eq!(server.meta("SimpleTestStatus"), None);

        server.status = STATUS_ACTIVE.to_string();
        server
            .metadata
            .insert("SimpleTestStatus".to_string(), "pending".to_string());
        assert!(server.is_active());
        assert_eq!(server.meta("SimpleTestStatus"), Some("pending"));
    }

    #[test]
    fn test_server_deserialize_defaults() {
        let server: Server = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(server.id, "abc");
        assert!(server.status.is_empty());
        assert!(server.metadata.is_empty());
    }
}
