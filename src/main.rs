//! nova-servertester - boots test servers and waits for them to call home
//!
//! Exit status is 0 when every server reported success, 1 otherwise.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use nova_servertester::TesterError;
use nova_servertester::compute::openstack::NovaClient;
use nova_servertester::config::{InitType, ShimType, Teardown, TestConfig};
use nova_servertester::provisioning::run_provisioning_test;
use nova_servertester::workflow::WorkflowOutcome;

#[derive(Parser)]
#[command(name = "nova-servertester")]
#[command(author, version, about = "Boot servers and wait for them to report a test result", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Image id or name to boot
    #[arg(long, env = "TEST_IMAGE_ID")]
    image_id: String,

    /// Flavor name
    #[arg(long, env = "TEST_FLAVOR")]
    flavor: String,

    /// Network id or name, or "auto" for provider auto-allocation
    #[arg(long, env = "TEST_NETWORK")]
    network: Option<String>,

    /// Script executed inside every server; must exit 0
    #[arg(long, env = "TEST_TEST_SCRIPT")]
    test_script: Option<PathBuf>,

    /// Directory receiving console logs of failed runs
    #[arg(long, env = "TEST_CONSOLE_LOGS")]
    console_logs: Option<PathBuf>,

    #[arg(long, env = "TEST_AVAILABILITY_ZONE")]
    availability_zone: Option<String>,

    /// Number of servers to boot
    #[arg(long, env = "TEST_COUNT", default_value_t = 1)]
    count: u32,

    /// Seconds to wait for servers to become ACTIVE
    #[arg(long, env = "TEST_BUILD_TIMEOUT", default_value_t = 300)]
    build_timeout: u64,

    /// Seconds to wait for servers to report their result
    #[arg(long, env = "TEST_CALLHOME_TIMEOUT", default_value_t = 300)]
    callhome_timeout: u64,

    /// Seconds between two server polls
    #[arg(long, env = "TEST_POLL_INTERVAL", default_value_t = 1)]
    poll_interval: u64,

    /// Seconds after which a single API request is abandoned
    #[arg(long, env = "TEST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    #[arg(long, env = "TEST_SHIM_SCRIPT_TYPE", value_enum, default_value_t = ShimType::Bash)]
    shim_type: ShimType,

    #[arg(long, env = "TEST_CLOUD_INIT_TYPE", value_enum, default_value_t = InitType::CloudInit)]
    cloud_init_type: InitType,

    /// When to delete the test servers
    #[arg(long, env = "TEST_TEARDOWN", value_enum, default_value_t = Teardown::OnFailure)]
    teardown: Teardown,

    /// Pre-issued API token
    #[arg(long, env = "OS_AUTH_TOKEN", hide_env_values = true)]
    os_token: String,

    /// Compute API endpoint, including the project if the cloud requires it
    #[arg(long, env = "OS_COMPUTE_API")]
    compute_endpoint: String,

    /// Image API endpoint
    #[arg(long, env = "OS_IMAGE_API")]
    image_endpoint: Option<String>,

    /// Network API endpoint
    #[arg(long, env = "OS_NETWORK_API")]
    network_endpoint: Option<String>,
}

impl Cli {
    fn test_config(&self) -> TestConfig {
        let mut config = TestConfig::new(&self.image_id, &self.flavor)
            .with_count(self.count)
            .with_build_timeout(Duration::from_secs(self.build_timeout))
            .with_callhome_timeout(Duration::from_secs(self.callhome_timeout))
            .with_poll_interval(Duration::from_secs(self.poll_interval))
            .with_shim_type(self.shim_type)
            .with_init_type(self.cloud_init_type)
            .with_teardown(self.teardown);

        if let Some(network) = &self.network {
            config = config.with_network(network);
        }
        if let Some(az) = &self.availability_zone {
            config = config.with_availability_zone(az);
        }
        if let Some(script) = &self.test_script {
            config = config.with_test_script(script);
        }
        if let Some(dir) = &self.console_logs {
            config = config.with_console_logs(dir);
        }
        config
    }

    fn client(&self) -> Result<NovaClient, TesterError> {
        let mut client = NovaClient::new(
            &self.os_token,
            &self.compute_endpoint,
            Duration::from_secs(self.api_timeout),
        )?;
        if let Some(url) = &self.image_endpoint {
            client = client.with_image_endpoint(url);
        }
        if let Some(url) = &self.network_endpoint {
            client = client.with_network_endpoint(url);
        }
        Ok(client)
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Resolves with the name of the first termination signal received
async fn shutdown_signal() -> String {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT".to_string(),
                _ = sigterm.recv() => "SIGTERM".to_string(),
            },
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT".to_string()
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT".to_string()
    }
}

async fn run(cli: Cli) -> Result<WorkflowOutcome, TesterError> {
    let config = cli.test_config();
    let client = cli.client()?;

    info!(
        "Testing {} server(s) of image {} with flavor {}",
        config.count, config.image, config.flavor
    );
    run_provisioning_test(Arc::new(client), config, shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(WorkflowOutcome::Completed) => {
            info!("All servers reported success");
            ExitCode::SUCCESS
        }
        Ok(WorkflowOutcome::Stopped) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}
