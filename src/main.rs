//! kubetorio - runs Server custom resources as game-server Deployments

use clap::Parser;
use k8s_openapi::api::apps::v1::Deployment;
use kube::CustomResourceExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kubetorio::{Operator, OperatorConfig, Server, ServerDeployment};

/// Reconcile Server resources into Deployments
#[derive(Parser, Debug)]
#[command(name = "kubetorio", version, about, long_about = None)]
struct Cli {
    /// Print the Server CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// Only watch this namespace (overrides WATCH_NAMESPACE)
    #[arg(long, short = 'n')]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Server::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let mut config = OperatorConfig::from_env()?;
    if let Some(namespace) = cli.namespace {
        config.namespace = Some(namespace);
    }

    Operator::<Server, Deployment>::new(config)
        .desired_state(ServerDeployment)
        .run()
        .await?;

    Ok(())
}
