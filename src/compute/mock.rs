//! Mock compute API for testing
//!
//! Servers get ids `server-1`, `server-2`, ... in creation order. Every
//! `get_server` call consumes the next [`MockPoll`] of that server's script;
//! the last poll repeats once the script is exhausted. Servers without a
//! script boot straight to ACTIVE and report `complete`.
//!
//! # Example
//! ```
//! use nova_servertester::compute::mock::{MockCompute, MockPoll};
//!
//! let mock = MockCompute::new()
//!     .with_image("img-1", "cirros")
//!     .with_flavor("1", "m1.tiny")
//!     .with_script(2, vec![MockPoll::building(), MockPoll::error(7)]);
//! ```

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{ComputeApi, CreateServerRequest, Flavor, Image, Network, STATUS_ACTIVE, Server};
use crate::TesterError;

/// Metadata key the mock polls report under
const STATUS_KEY: &str = "SimpleTestStatus";
const EXITCODE_KEY: &str = "SimpleTestExitStatus";

/// One observed state of a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPoll {
    pub status: String,
    /// Metadata merged into the server when this poll is observed
    pub metadata: BTreeMap<String, String>,
}

impl MockPoll {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    /// Still building
    pub fn building() -> Self {
        Self::new("BUILD")
    }

    /// Active, test still running
    pub fn active() -> Self {
        Self::new(STATUS_ACTIVE)
    }

    /// Active, test reported success
    pub fn complete() -> Self {
        Self::active().with_meta(STATUS_KEY, "complete")
    }

    /// Active, test reported failure with an exit code
    pub fn error(exit_code: i32) -> Self {
        Self::active()
            .with_meta(EXITCODE_KEY, &exit_code.to_string())
            .with_meta(STATUS_KEY, "error")
    }

    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug)]
struct MockServer {
    server: Server,
    script: VecDeque<MockPoll>,
}

#[derive(Debug, Default)]
struct MockState {
    servers: BTreeMap<String, MockServer>,
    created: Vec<CreateServerRequest>,
    deleted: Vec<String>,
    get_calls: Vec<String>,
}

/// In-memory compute API
pub struct MockCompute {
    token: String,
    endpoint: String,
    images: Vec<Image>,
    flavors: Vec<Flavor>,
    networks: Vec<Network>,
    scripts: HashMap<usize, Vec<MockPoll>>,
    create_failure: Option<usize>,
    console_output: String,
    console_failures: BTreeSet<usize>,
    delete_failures: BTreeSet<usize>,
    state: Mutex<MockState>,
}

impl MockCompute {
    /// Create a mock with no images, flavors or networks
    pub fn new() -> Self {
        Self {
            token: "mock-token".to_string(),
            endpoint: "http://mock-nova:8774/v2.1".to_string(),
            images: Vec::new(),
            flavors: Vec::new(),
            networks: Vec::new(),
            scripts: HashMap::new(),
            create_failure: None,
            console_output: "mock console output\n".to_string(),
            console_failures: BTreeSet::new(),
            delete_failures: BTreeSet::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_image(mut self, id: &str, name: &str) -> Self {
        self.images.push(Image {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_flavor(mut self, id: &str, name: &str) -> Self {
        self.flavors.push(Flavor {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_network(mut self, id: &str, name: &str) -> Self {
        self.networks.push(Network {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Set the poll script of the `index`-th created server (1-based)
    pub fn with_script(mut self, index: usize, polls: Vec<MockPoll>) -> Self {
        self.scripts.insert(index, polls);
        self
    }

    /// Make creation of the `index`-th server (1-based) fail
    pub fn with_create_failure(mut self, index: usize) -> Self {
        self.create_failure = Some(index);
        self
    }

    pub fn with_console_output(mut self, output: &str) -> Self {
        self.console_output = output.to_string();
        self
    }

    /// Make console output retrieval fail for the `index`-th server
    pub fn with_console_failure(mut self, index: usize) -> Self {
        self.console_failures.insert(index);
        self
    }

    /// Make deletion fail for the `index`-th server
    pub fn with_delete_failure(mut self, index: usize) -> Self {
        self.delete_failures.insert(index);
        self
    }

    /// Id the `index`-th created server gets
    pub fn server_id(index: usize) -> String {
        format!("server-{}", index)
    }

    /// Creation requests received so far
    pub fn created(&self) -> Vec<CreateServerRequest> {
        self.lock().created.clone()
    }

    /// Ids of servers deleted so far, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Ids passed to `get_server`, in call order
    pub fn get_calls(&self) -> Vec<String> {
        self.lock().get_calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn index_of(id: &str) -> Option<usize> {
        id.strip_prefix("server-")?.parse().ok()
    }
}

impl Default for MockCompute {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputeApi for MockCompute {
    fn auth_token(&self) -> &str {
        &self.token
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn find_image(&self, reference: &str) -> Result<Image, TesterError> {
        self.images
            .iter()
            .find(|i| i.id == reference || i.name == reference)
            .cloned()
            .ok_or_else(|| TesterError::not_found("Image", reference))
    }

    async fn find_network(&self, reference: &str) -> Result<Network, TesterError> {
        self.networks
            .iter()
            .find(|n| n.id == reference || n.name == reference)
            .cloned()
            .ok_or_else(|| TesterError::not_found("Network", reference))
    }

    async fn find_flavor(&self, name: &str) -> Result<Flavor, TesterError> {
        self.flavors
            .iter()
            .find(|f| f.name == name || f.id == name)
            .cloned()
            .ok_or_else(|| TesterError::not_found("Flavor", name))
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<Server, TesterError> {
        let mut state = self.lock();
        let index = state.created.len() + 1;
        state.created.push(request.clone());

        if self.create_failure == Some(index) {
            return Err(TesterError::Api {
                status: 500,
                message: format!("mock failure creating {}", request.name),
            });
        }

        let server = Server {
            id: Self::server_id(index),
            name: request.name.clone(),
            status: "BUILD".to_string(),
            metadata: request.metadata.clone(),
        };
        let script = self
            .scripts
            .get(&index)
            .cloned()
            .unwrap_or_else(|| vec![MockPoll::complete()]);
        state.servers.insert(
            server.id.clone(),
            MockServer {
                server: server.clone(),
                script: script.into(),
            },
        );
        Ok(server)
    }

    async fn get_server(&self, id: &str) -> Result<Server, TesterError> {
        let mut state = self.lock();
        state.get_calls.push(id.to_string());

        let entry = state
            .servers
            .get_mut(id)
            .ok_or_else(|| TesterError::not_found("Server", id))?;

        let poll = if entry.script.len() > 1 {
            entry.script.pop_front()
        } else {
            entry.script.front().cloned()
        };
        if let Some(poll) = poll {
            entry.server.status = poll.status;
            entry.server.metadata.extend(poll.metadata);
        }
        Ok(entry.server.clone())
    }

    async fn delete_server(&self, id: &str) -> Result<(), TesterError> {
        let mut state = self.lock();
        if let Some(index) = Self::index_of(id) {
            if self.delete_failures.contains(&index) {
                return Err(TesterError::Api {
                    status: 500,
                    message: format!("mock failure deleting {}", id),
                });
            }
        }
        state.servers.remove(id);
        state.deleted.push(id.to_string());
        Ok(())
    }

    async fn get_console_output(&self, id: &str) -> Result<String, TesterError> {
        let state = self.lock();
        if !state.servers.contains_key(id) {
            return Err(TesterError::not_found("Server", id));
        }
        match Self::index_of(id) {
            Some(index) if self.console_failures.contains(&index) => Err(TesterError::Api {
                status: 409,
                message: format!("console unavailable for {}", id),
            }),
            _ => Ok(self.console_output.clone()),
        }
    }
}
