use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cfgsync_core::{ConfigKey, RawChange, RawEntry, Resource, ResourceEvent};
use cfgsync_processor::{new_cluster_info_update_processor, new_felix_config_update_processor, register_all, UpdateProcessor};
use cfgsync_store::{spawn_sync, SyncConfig};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cfgsyncctl", version, about = "cfgsync CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Kind {
    ClusterInfo,
    Felix,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compose the view of one scope from a file of raw entries
    Process {
        #[arg(long, value_enum)]
        kind: Kind,
        /// JSON or YAML list of raw entries ("-" for stdin)
        #[arg(long)]
        entries: PathBuf,
        /// Node to compose the view for; omit for the global view
        #[arg(long, env = "CFGSYNC_NODE")]
        node: Option<String>,
    },
    /// Split a resource back into raw entries
    Decompose {
        #[arg(long, value_enum)]
        kind: Kind,
        /// JSON or YAML resource ("-" for stdin)
        #[arg(long)]
        resource: PathBuf,
    },
    /// Feed a file of changes through the syncer and print events and the final views
    Replay {
        #[arg(long, value_enum)]
        kind: Kind,
        /// JSON or YAML list of raw changes ("-" for stdin)
        #[arg(long)]
        changes: PathBuf,
    },
    /// Print the store path for a setting, or parse one
    Key {
        /// Setting name
        #[arg(required_unless_present = "parse")]
        name: Option<String>,
        #[arg(long, conflicts_with = "parse")]
        node: Option<String>,
        /// Store path to parse instead
        #[arg(long)]
        parse: Option<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("CFGSYNC_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CFGSYNC_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid CFGSYNC_METRICS_ADDR; expected host:port");
        }
    }
}

/// Read a JSON or YAML document; YAML is picked by file extension.
fn read_doc<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading stdin")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    let yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
    if yaml {
        serde_yaml::from_str(&text).with_context(|| format!("parsing {} as YAML", path.display()))
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing {} as JSON", path.display()))
    }
}

fn print_event<S: Serialize>(output: Output, ev: &ResourceEvent<S>) -> Result<()> {
    match output {
        Output::Human => match ev {
            ResourceEvent::Updated { resource } => println!(
                "+ {}/{} rv={}",
                resource.type_meta.kind,
                resource.name(),
                resource.metadata.resource_version.as_deref().unwrap_or("-")
            ),
            ResourceEvent::Deleted { key, revision } => println!("- {}/{} rv={}", key.kind, key.name, revision),
        },
        Output::Json => println!("{}", serde_json::to_string(ev)?),
    }
    Ok(())
}

fn run_process<P>(p: &P, output: Output, entries: &Path, node: Option<&str>) -> Result<()>
where
    P: UpdateProcessor,
    P::Spec: Serialize,
{
    let entries: Vec<RawEntry> = read_doc(entries)?;
    info!(kind = p.identity().kind, entries = entries.len(), node = ?node, "process invoked");
    let out = p.process(&entries, node);
    for d in &out.diagnostics {
        warn!(key = %d.key, error = %d.error, "value not converted");
    }
    match output {
        Output::Human if out.is_empty() => println!("no settings in scope"),
        Output::Human => {
            for ev in &out.events {
                print_event(output, ev)?;
                if let ResourceEvent::Updated { resource } = ev {
                    println!("{}", serde_json::to_string_pretty(&resource.spec)?);
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&out.events)?),
    }
    Ok(())
}

fn run_decompose<P>(p: &P, output: Output, resource: &Path) -> Result<()>
where
    P: UpdateProcessor,
    P::Spec: DeserializeOwned,
{
    let resource: Resource<P::Spec> = read_doc(resource)?;
    let mut entries = p.decompose(&resource)?;
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    match output {
        Output::Human => {
            for e in &entries {
                println!("{} = {} (rv={})", e.key, e.value.as_deref().unwrap_or(""), e.revision);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(())
}

async fn run_replay<P>(p: P, output: Output, changes: &Path) -> Result<()>
where
    P: UpdateProcessor + 'static,
    P::Spec: Clone + PartialEq + Serialize + Send + Sync + 'static,
{
    let changes: Vec<RawChange> = read_doc(changes)?;
    let cfg = SyncConfig::from_env();
    info!(kind = p.identity().kind, changes = changes.len(), queue_cap = cfg.queue_cap, "replay invoked");
    let (tx, handle, mut events) = spawn_sync(Arc::new(p), cfg);
    let feeder = tokio::spawn(async move {
        for c in changes {
            if tx.send(c).await.is_err() {
                break;
            }
        }
    });
    while let Some(ev) = events.recv().await {
        print_event(output, &ev)?;
    }
    feeder.await?;

    let snap = handle.current();
    match output {
        Output::Human => {
            println!("epoch {}: {} resource(s)", snap.epoch, snap.resources.len());
            for r in &snap.resources {
                println!("{} {}", r.name(), serde_json::to_string(&r.spec)?);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&snap.resources)?),
    }
    Ok(())
}

fn run_key(name: Option<String>, node: Option<String>, parse: Option<String>) -> Result<()> {
    if let Some(path) = parse {
        let key = ConfigKey::from_str(&path)?;
        match key.node() {
            Some(n) => println!("node={} name={}", n, key.name()),
            None => println!("global name={}", key.name()),
        }
        return Ok(());
    }
    let Some(name) = name else { bail!("a setting name is required") };
    let key = match node {
        Some(n) => ConfigKey::per_node(n, name),
        None => ConfigKey::global(name),
    };
    println!("{}", key);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    register_all()?;

    match cli.command {
        Commands::Process { kind, entries, node } => match kind {
            Kind::ClusterInfo => run_process(&new_cluster_info_update_processor()?, cli.output, &entries, node.as_deref()),
            Kind::Felix => run_process(&new_felix_config_update_processor()?, cli.output, &entries, node.as_deref()),
        },
        Commands::Decompose { kind, resource } => match kind {
            Kind::ClusterInfo => run_decompose(&new_cluster_info_update_processor()?, cli.output, &resource),
            Kind::Felix => run_decompose(&new_felix_config_update_processor()?, cli.output, &resource),
        },
        Commands::Replay { kind, changes } => match kind {
            Kind::ClusterInfo => run_replay(new_cluster_info_update_processor()?, cli.output, &changes).await,
            Kind::Felix => run_replay(new_felix_config_update_processor()?, cli.output, &changes).await,
        },
        Commands::Key { name, node, parse } => run_key(name, node, parse),
    }
}
