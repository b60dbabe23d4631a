use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pod_extensions::extensions::EnvInjector;
use pod_extensions::manager::options::{
    DEFAULT_CERT_ROTATION_THRESHOLD_DAYS, DEFAULT_OPERATOR_FINGERPRINT, DEFAULT_WEBHOOK_PORT,
};
use pod_extensions::{ExtensionManager, FailurePolicy, ManagerOptions};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the extension manager
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Operator namespace
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Address the API server reaches the webhook server on
    #[arg(long, env = "WEBHOOK_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Webhook server port
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    port: u16,

    /// Kubeconfig path, in-cluster configuration when omitted
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Failure policy of the generated webhooks (Fail or Ignore)
    #[arg(long, env = "FAILURE_POLICY", default_value = "Fail")]
    failure_policy: FailurePolicy,

    /// Only mutate Pods labelled source_type=APP
    #[arg(long, env = "FILTER_APPS", default_value_t = true, action = clap::ArgAction::Set)]
    filter_apps: bool,

    /// Prefix of every generated name
    #[arg(long, env = "OPERATOR_FINGERPRINT", default_value = DEFAULT_OPERATOR_FINGERPRINT)]
    fingerprint: String,

    /// Secret holding the serving certificate
    #[arg(long, env = "SETUP_CERTIFICATE_NAME")]
    setup_certificate_name: Option<String>,

    /// Directory the serving certificate is written to
    #[arg(long, env = "CERT_DIR")]
    cert_dir: Option<PathBuf>,

    /// Service routing the API server to the webhook, instead of host and port
    #[arg(long, env = "SERVICE_NAME")]
    service_name: Option<String>,

    /// Regenerate the certificate when it expires within this many days
    #[arg(long, env = "CERT_ROTATION_THRESHOLD_DAYS", default_value_t = DEFAULT_CERT_ROTATION_THRESHOLD_DAYS)]
    cert_rotation_threshold_days: u32,

    /// Seconds between certificate checks while serving, 0 disables them
    #[arg(long, env = "CERT_CHECK_INTERVAL_SECS", default_value_t = 3600)]
    cert_check_interval_secs: u64,

    /// Also mutate Pods on UPDATE
    #[arg(long, env = "REGISTER_UPDATE")]
    register_update: bool,

    /// Environment variable injected into every app container
    #[arg(long = "inject-env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    inject_env: Vec<(String, String)>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

impl RunArgs {
    fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            namespace: self.namespace.clone(),
            host: self.host.clone(),
            port: self.port,
            kube_config: self.kubeconfig.clone(),
            failure_policy: self.failure_policy,
            filter_apps: self.filter_apps,
            operator_fingerprint: self.fingerprint.clone(),
            setup_certificate_name: self.setup_certificate_name.clone().unwrap_or_default(),
            cert_dir: self.cert_dir.clone(),
            service_name: self.service_name.clone(),
            register_update: self.register_update,
            cert_rotation_threshold_days: self.cert_rotation_threshold_days,
            cert_check_interval: (self.cert_check_interval_secs > 0)
                .then(|| Duration::from_secs(self.cert_check_interval_secs)),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("pod-extension-manager v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_manager(run_args).await,
    }
}

async fn run_manager(args: RunArgs) -> anyhow::Result<()> {
    let _telemetry = pod_extensions::telemetry::init_telemetry(args.log_json)?;

    info!(
        "Starting pod-extension-manager v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut manager = ExtensionManager::new(args.manager_options());

    let injector = args
        .inject_env
        .iter()
        .fold(EnvInjector::new(), |injector, (key, value)| {
            injector.with_var(key, value)
        });
    if injector.is_empty() {
        warn!("No extensions configured, webhooks will admit Pods unchanged");
    } else {
        manager.add_extension(injector);
    }

    manager.start().await?;
    Ok(())
}
