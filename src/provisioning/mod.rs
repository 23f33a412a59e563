//! Server provisioning acceptance test
//!
//! Boots `count` servers whose user data carries a call-home shim, then waits
//! for every server to become ACTIVE and to report its test result through
//! server metadata. Steps, in order:
//!
//! 1. `Prepare` - validate the configuration and resolve image, network and flavor
//! 2. `PrepareUserdata` - render the shim and wrap it for the guest's init agent
//! 3. `CreateServers` - create the servers tagged `SimpleTestStatus=pending`
//! 4. `WaitForActive` - poll until all servers are ACTIVE (build timeout)
//! 5. `WaitForCallhome` - poll until all servers report `complete` (callhome timeout)
//!
//! Servers are deleted (after saving console logs, if configured) when the
//! test fails or is interrupted, and also after success with
//! [`Teardown::Always`].

pub mod rollback;

pub use rollback::{ProvisioningRollback, console_log_name};

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::TesterError;
use crate::compute::{ComputeApi, CreateServerRequest, Flavor, Image, Network, Nics};
use crate::config::{AUTO_NETWORK, Teardown, TestConfig};
use crate::shim::{ShimParams, renderer_for};
use crate::userdata::{USER_TEST_SCRIPT_PATH, build_userdata};
use crate::workflow::{
    RollbackLog, RunOn, Transition, Workflow, WorkflowOutcome, WorkflowRunner, WorkflowStep,
};

/// Metadata key the shim reports the test status under
pub const STATUS_KEY: &str = "SimpleTestStatus";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETE: &str = "complete";
pub const STATUS_ERROR: &str = "error";

/// Metadata key the shim reports a non-zero exit code under
pub const EXITCODE_KEY: &str = "SimpleTestExitStatus";

const WORKFLOW_NAME: &str = "ProvisioningTest";

/// Steps of the provisioning test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
    Prepare,
    PrepareUserdata,
    CreateServers,
    WaitForActive,
    WaitForCallhome,
}

impl WorkflowStep for ProvisioningStep {
    fn name(&self) -> &'static str {
        match self {
            ProvisioningStep::Prepare => "prepare",
            ProvisioningStep::PrepareUserdata => "prepare_userdata",
            ProvisioningStep::CreateServers => "create_servers",
            ProvisioningStep::WaitForActive => "wait_for_active",
            ProvisioningStep::WaitForCallhome => "wait_for_callhome",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ProvisioningStep::Prepare => "Checks API connectivity and validates parameters",
            ProvisioningStep::PrepareUserdata => {
                "Prepare userdata scripts that allow servers to report their state"
            }
            ProvisioningStep::CreateServers => "Creates test servers according to configuration",
            ProvisioningStep::WaitForActive => "Wait until all servers reach ACTIVE status",
            ProvisioningStep::WaitForCallhome => {
                "Wait until all servers have reported ok state through the compute API"
            }
        }
    }
}

/// The provisioning test workflow
pub struct ProvisioningTest {
    api: Arc<dyn ComputeApi>,
    config: TestConfig,
    image: Option<Image>,
    flavor: Option<Flavor>,
    network: Option<Network>,
    userdata: Option<String>,
    servers: Vec<String>,
}

impl ProvisioningTest {
    pub fn new(api: Arc<dyn ComputeApi>, config: TestConfig) -> Self {
        Self {
            api,
            config,
            image: None,
            flavor: None,
            network: None,
            userdata: None,
            servers: Vec::new(),
        }
    }

    /// Wrap into a runner positioned at the first step
    pub fn into_runner(self) -> WorkflowRunner<Self> {
        WorkflowRunner::new(self, ProvisioningStep::Prepare)
    }

    /// Name of the `index`-th server (1-based)
    pub fn server_name(index: u32) -> String {
        format!("test-server-{}-{}", WORKFLOW_NAME, index)
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Ids of the servers created by this test
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// User data rendered for the servers
    pub fn userdata(&self) -> Option<&str> {
        self.userdata.as_deref()
    }

    fn teardown_policy(&self) -> RunOn {
        match self.config.teardown {
            Teardown::Always => RunOn::Always,
            Teardown::OnFailure => RunOn::Failure,
        }
    }

    fn nics(&self) -> Nics {
        match (&self.network, self.config.network.as_deref()) {
            (Some(network), _) => Nics::Network(network.id.clone()),
            (None, Some(AUTO_NETWORK)) => Nics::Auto,
            _ => Nics::Unspecified,
        }
    }

    async fn prepare(&mut self) -> Result<Transition<ProvisioningStep>, TesterError> {
        self.config.validate()?;

        let image = self.api.find_image(&self.config.image).await?;
        info!("Image: {} {}", image.id, image.name);
        self.image = Some(image);

        if let Some(reference) = self.config.network_to_resolve() {
            let network = self.api.find_network(reference).await?;
            info!("Network: {} {}", network.id, network.name);
            self.network = Some(network);
        }

        let flavor = self.api.find_flavor(&self.config.flavor).await?;
        info!("Flavor: {} {}", flavor.id, flavor.name);
        self.flavor = Some(flavor);

        Ok(Transition::Next(ProvisioningStep::PrepareUserdata))
    }

    async fn prepare_userdata(&mut self) -> Result<Transition<ProvisioningStep>, TesterError> {
        let user_script = match &self.config.test_script {
            Some(path) => Some(fs::read_to_string(path).await.inspect_err(|e| {
                error!("Failed to read test script {}: {}", path.display(), e);
            })?),
            None => None,
        };

        let mut params = ShimParams::new(self.api.auth_token(), self.api.endpoint())
            .with_user_script_path(USER_TEST_SCRIPT_PATH)
            .with_status_keys(STATUS_KEY, STATUS_COMPLETE, STATUS_ERROR, EXITCODE_KEY);
        if let Some(script) = &user_script {
            params = params.with_user_script(script);
        }

        let shim = renderer_for(self.config.shim_type).render(&params)?;
        let userdata = build_userdata(
            self.config.shim_type,
            self.config.init_type,
            &shim,
            user_script.as_deref(),
        )?;
        debug!("User data is {} bytes", userdata.len());
        self.userdata = Some(userdata);

        Ok(Transition::Next(ProvisioningStep::CreateServers))
    }

    async fn create_servers(
        &mut self,
        rollbacks: &mut RollbackLog<ProvisioningRollback>,
    ) -> Result<Transition<ProvisioningStep>, TesterError> {
        let (image_id, flavor_id) = match (&self.image, &self.flavor) {
            (Some(image), Some(flavor)) => (image.id.clone(), flavor.id.clone()),
            _ => {
                return Err(TesterError::Config(
                    "image and flavor must be resolved before creating servers".to_string(),
                ));
            }
        };
        let policy = self.teardown_policy();
        let metadata = BTreeMap::from([(STATUS_KEY.to_string(), STATUS_PENDING.to_string())]);

        let mut created = Vec::new();
        for index in 1..=self.config.count {
            let request = CreateServerRequest {
                name: Self::server_name(index),
                image_id: image_id.clone(),
                flavor_id: flavor_id.clone(),
                nics: self.nics(),
                userdata: self.userdata.clone(),
                metadata: metadata.clone(),
                availability_zone: self.config.availability_zone.clone(),
            };
            let server = self.api.create_server(&request).await?;
            debug!("Created server {} ({})", server.id, request.name);

            // Registered per server so a later failure or interrupt still
            // cleans up everything created so far
            rollbacks.push_with(
                ProvisioningRollback::DeleteServers {
                    server_ids: vec![server.id.clone()],
                },
                policy,
            );
            created.push(server.id);
        }
        info!("Created servers: {}", created.join(" "));

        if let Some(dir) = &self.config.console_logs {
            rollbacks.push_with(
                ProvisioningRollback::SaveConsoleLogs {
                    server_ids: created.clone(),
                    dir: dir.clone(),
                },
                policy,
            );
        }
        self.servers = created;

        Ok(Transition::Next(ProvisioningStep::WaitForActive))
    }

    async fn wait_for_active(&mut self) -> Result<Transition<ProvisioningStep>, TesterError> {
        let timeout = self.config.build_timeout;
        let start = Instant::now();
        let mut waiting: VecDeque<String> = self.servers.iter().cloned().collect();

        while let Some(id) = waiting.pop_front() {
            if start.elapsed() > timeout {
                return Err(TesterError::Timeout(format!(
                    "timed out after {}s while waiting for servers to transition into ACTIVE",
                    timeout.as_secs()
                )));
            }

            let server = self.api.get_server(&id).await?;
            if server.is_active() {
                info!("Server {}: active", server.id);
            } else {
                debug!("Server {}: {}", server.id, server.status);
                waiting.push_back(id);
            }

            if !waiting.is_empty() {
                sleep(self.config.poll_interval).await;
            }
        }

        Ok(Transition::Next(ProvisioningStep::WaitForCallhome))
    }

    async fn wait_for_callhome(&mut self) -> Result<Transition<ProvisioningStep>, TesterError> {
        let timeout = self.config.callhome_timeout;
        let start = Instant::now();
        let mut waiting: VecDeque<String> = self.servers.iter().cloned().collect();

        while let Some(id) = waiting.pop_front() {
            if start.elapsed() > timeout {
                waiting.push_front(id);
                error!(
                    "Timed out while waiting for servers: {}",
                    waiting.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
                );
                return Err(TesterError::Timeout(format!(
                    "timed out after {}s while waiting for servers to call home",
                    timeout.as_secs()
                )));
            }

            let server = self.api.get_server(&id).await?;
            match server.meta(STATUS_KEY) {
                Some(STATUS_COMPLETE) => info!("Server {}: success", server.id),
                Some(STATUS_ERROR) => {
                    let exit_code = server.meta(EXITCODE_KEY).map(str::to_string);
                    error!(
                        "Server {}: error code: {}",
                        server.id,
                        exit_code.as_deref().unwrap_or("unknown")
                    );
                    return Err(TesterError::remote_reported(&id, exit_code));
                }
                _ => waiting.push_back(id),
            }

            if !waiting.is_empty() {
                sleep(self.config.poll_interval).await;
            }
        }

        Ok(Transition::Done)
    }

    async fn delete_servers(&self, server_ids: &[String]) -> Result<(), TesterError> {
        let mut first_error = None;
        for id in server_ids {
            match self.api.delete_server(id).await {
                Ok(()) => info!("Deleted server {}", id),
                Err(e) => {
                    warn!("Failed to delete server {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn save_console_logs(&self, server_ids: &[String], dir: &Path) -> Result<(), TesterError> {
        fs::create_dir_all(dir).await?;

        for id in server_ids {
            let path = dir.join(console_log_name(id));
            let saved = match self.api.get_console_output(id).await {
                Ok(log) => fs::write(&path, log).await.map_err(TesterError::from),
                Err(e) => Err(e),
            };
            match saved {
                Ok(()) => info!("Saved console log of {} to {}", id, path.display()),
                Err(e) => error!("error while saving logs of {}: {}", id, e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Workflow for ProvisioningTest {
    type Step = ProvisioningStep;
    type Rollback = ProvisioningRollback;

    fn name(&self) -> &str {
        WORKFLOW_NAME
    }

    async fn execute(
        &mut self,
        step: ProvisioningStep,
        rollbacks: &mut RollbackLog<ProvisioningRollback>,
    ) -> Result<Transition<ProvisioningStep>, TesterError> {
        match step {
            ProvisioningStep::Prepare => self.prepare().await,
            ProvisioningStep::PrepareUserdata => self.prepare_userdata().await,
            ProvisioningStep::CreateServers => self.create_servers(rollbacks).await,
            ProvisioningStep::WaitForActive => self.wait_for_active().await,
            ProvisioningStep::WaitForCallhome => self.wait_for_callhome().await,
        }
    }

    async fn rollback(&mut self, action: &ProvisioningRollback) -> Result<(), TesterError> {
        match action {
            ProvisioningRollback::DeleteServers { server_ids } => {
                self.delete_servers(server_ids).await
            }
            ProvisioningRollback::SaveConsoleLogs { server_ids, dir } => {
                self.save_console_logs(server_ids, dir).await
            }
        }
    }
}

/// Run a provisioning test until it completes, fails or `interrupt` resolves
pub async fn run_provisioning_test<F>(
    api: Arc<dyn ComputeApi>,
    config: TestConfig,
    interrupt: F,
) -> Result<WorkflowOutcome, TesterError>
where
    F: Future<Output = String>,
{
    ProvisioningTest::new(api, config)
        .into_runner()
        .run_until(interrupt)
        .await
}
