//! Metal extension - control plane webhooks and health checks for metal shoots

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use metal_common::client::{KubeSeedClient, SeedClient};
use metal_common::kube_utils::create_client;
use metal_common::telemetry::{init_telemetry, TelemetryConfig};
use metal_common::{ControllerConfiguration, ImageVector};
use metal_health::{default_registrations, HealthAggregator, SecretShootClientFactory};
use metal_webhook::registration::{mutating_webhook_configuration, WebhookEndpoint};
use metal_webhook::server::{start_server, ServerConfig};
use metal_webhook::{default_mutators, WebhookState};

/// Time given to in-flight admission requests on shutdown
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Metal cloud-provider extension
#[derive(Parser, Debug)]
#[command(name = "metal-extension", version, about, long_about = None)]
struct Cli {
    /// Path to the ControllerConfiguration file
    #[arg(long, env = "CONFIG_FILE", global = true)]
    config_file: Option<PathBuf>,

    /// Kubeconfig of the seed; in-cluster config when unset
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the admission webhooks
    Webhook(WebhookArgs),

    /// Run the health checks
    Health,

    /// Serve the webhooks and run the health checks
    Run(WebhookArgs),

    /// Print the MutatingWebhookConfiguration for the served webhooks
    WebhookConfig(WebhookConfigArgs),
}

/// Admission server arguments
#[derive(Args, Debug, Clone)]
struct WebhookArgs {
    /// Port of the admission server
    #[arg(long, default_value_t = 9443)]
    webhook_port: u16,

    /// Address the admission server binds to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind_address: IpAddr,

    /// Directory holding tls.crt and tls.key
    #[arg(long, env = "TLS_CERT_DIR", default_value = "/etc/webhook/certs")]
    tls_cert_dir: PathBuf,
}

/// Webhook registration arguments
#[derive(Args, Debug)]
struct WebhookConfigArgs {
    /// Name of the configuration object
    #[arg(long, default_value = "gardener-extension-provider-metal")]
    name: String,

    /// Namespace of the Service in front of the admission server
    #[arg(long)]
    service_namespace: String,

    /// Name of the Service
    #[arg(long, default_value = "gardener-extension-provider-metal")]
    service_name: String,

    /// Port of the Service
    #[arg(long, default_value_t = 443)]
    service_port: i32,

    /// PEM file with the CA that signed the serving certificate
    #[arg(long)]
    ca_bundle_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|e| anyhow!("failed to install crypto provider: {e:?}"))?;

    let cli = Cli::parse();

    match &cli.command {
        Commands::WebhookConfig(args) => print_webhook_config(args),
        Commands::Webhook(args) => serve(&cli, Some(args.clone()), false).await,
        Commands::Health => serve(&cli, None, true).await,
        Commands::Run(args) => serve(&cli, Some(args.clone()), true).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ControllerConfiguration> {
    let path = cli
        .config_file
        .as_deref()
        .ok_or_else(|| anyhow!("--config-file or CONFIG_FILE is required"))?;
    ControllerConfiguration::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

/// Run the selected components until a shutdown signal or a component fails
async fn serve(cli: &Cli, webhook: Option<WebhookArgs>, health: bool) -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::default())?;

    let config = Arc::new(load_config(cli)?);
    let client = create_client(cli.kubeconfig.as_deref()).await?;
    let seed: Arc<dyn SeedClient> = Arc::new(KubeSeedClient::new(client));

    let cancel = CancellationToken::new();
    let handle = axum_server::Handle::new();
    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    if let Some(args) = webhook {
        let images = Arc::new(ImageVector::load()?);
        let state = Arc::new(WebhookState::new(
            config.clone(),
            images,
            seed.clone(),
            default_mutators(),
        )?);
        let server_config = ServerConfig {
            addr: SocketAddr::new(args.bind_address, args.webhook_port),
            cert_dir: args.tls_cert_dir,
        };
        let handle = handle.clone();
        tasks.spawn(async move { Ok(start_server(server_config, state, handle).await?) });
    }

    if health {
        let factory = Arc::new(SecretShootClientFactory::new(seed.clone()));
        let aggregator = Arc::new(HealthAggregator::new(
            config.clone(),
            seed.clone(),
            factory,
            default_registrations(),
        )?);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            aggregator.run(cancel).await;
            Ok(())
        });
    }

    let result = tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            info!("Shutdown signal received");
            Ok(())
        }
        Some(joined) = tasks.join_next() => match joined {
            Ok(Ok(())) => Err(anyhow!("component stopped unexpectedly")),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(e.into()),
        },
    };

    cancel.cancel();
    handle.graceful_shutdown(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Component failed during shutdown"),
            Err(e) => warn!(error = %e, "Component panicked during shutdown"),
        }
    }

    info!("Shutdown complete");
    result
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::select! {
        ctrl_c = tokio::signal::ctrl_c() => ctrl_c.context("failed to listen for SIGINT"),
        _ = terminate.recv() => Ok(()),
    }
}

fn print_webhook_config(args: &WebhookConfigArgs) -> anyhow::Result<()> {
    let ca_bundle = std::fs::read(&args.ca_bundle_file)
        .with_context(|| format!("failed to read {}", args.ca_bundle_file.display()))?;
    let endpoint = WebhookEndpoint {
        name: args.name.clone(),
        service_namespace: args.service_namespace.clone(),
        service_name: args.service_name.clone(),
        port: args.service_port,
        ca_bundle,
    };
    let config = mutating_webhook_configuration(&endpoint, &default_mutators());
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
