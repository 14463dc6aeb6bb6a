use anyhow::Result;
use futures::StreamExt;
use oxmetric_plugin::clients::SecretData;
use oxmetric_plugin::config::PluginConfig;
use oxmetric_plugin::service::{CollectorService, ListResourcesParams};
use oxmetric_plugin::snapshot::{Snapshot, SnapshotClients};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const API_KEY_ENV: &str = "OXMETRIC_API_KEY";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  oxmetric-plugin init                                   Print the plugin capability");
    eprintln!("  oxmetric-plugin collect <snapshot.json> [config.toml]  Run one collection cycle against a snapshot");
    eprintln!();
    eprintln!("The api key is read from ${API_KEY_ENV}.");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("oxmetric=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init") => run_init(),
        Some("collect") => {
            let snapshot_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("collect requires a <snapshot.json> argument")
            })?;
            run_collect(snapshot_path, args.get(3).map(String::as_str)).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            anyhow::bail!("missing or unknown command")
        }
    }
}

fn load_config(path: Option<&str>) -> Result<PluginConfig> {
    match path {
        Some(path) => PluginConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path, e)),
        None => Ok(PluginConfig::default()),
    }
}

fn run_init() -> Result<()> {
    let clients = SnapshotClients::new(Snapshot::default());
    let service = CollectorService::new(Arc::new(clients), PluginConfig::default())?;
    let response = service.init(&Value::Null);
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string(&response)?)?;
    Ok(())
}

async fn run_collect(snapshot_path: &str, config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = Snapshot::load(snapshot_path)?;
    let service = CollectorService::new(Arc::new(SnapshotClients::new(snapshot)), config)?;

    let params = ListResourcesParams {
        options: Value::Object(Default::default()),
        secret_data: SecretData {
            api_key: std::env::var(API_KEY_ENV).ok(),
            ..Default::default()
        },
        filter: Value::Object(Default::default()),
    };

    let records = service.list_resources(params).await?;
    futures::pin_mut!(records);

    let mut out = std::io::stdout().lock();
    let mut emitted = 0usize;
    while let Some(record) = records.next().await {
        writeln!(out, "{}", serde_json::to_string(&record?)?)?;
        emitted += 1;
    }
    out.flush()?;

    tracing::info!(emitted, "Collection cycle complete");
    Ok(())
}
