//! `vidshardd`, the vidshard daemon.
//!
//! One binary for every role in a vidshard deployment.
//!
//! # Usage
//!
//! ```text
//! vidshardd storage ./data                          # storage node on localhost:8090
//! vidshardd storage --port 9001 ./node1             # second node
//! vidshardd storage --memory --port 9002            # in-memory node
//! vidshardd router --nodes localhost:8090,localhost:9001
//! vidshardd router --http 0.0.0.0:8081 --node localhost:8090
//! vidshardd admin --router localhost:8080 list
//! vidshardd admin --router localhost:8080 add localhost:9002
//! vidshardd -c vidshard.toml router                 # start with a config file
//! ```

mod config;
mod gateway;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use vidshard_net::{RpcClient, RpcServer, TcpConnector};
use vidshard_router::{ContentRouter, MembershipManager, RouterService, RouterState};
use vidshard_store::{ContentStore, FileStore, MemoryStore, StorageServer};
use vidshard_types::{NodeAddr, parse_node_list};

use config::CliConfig;
use gateway::Gateway;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "vidshardd",
    version,
    about = "Sharded video segment storage daemon"
)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a storage node.
    Storage {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,

        /// Port to bind.
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep content in memory instead of on disk.
        #[arg(short, long)]
        memory: bool,

        /// Directory under which content is stored as `<video_id>/<filename>`.
        base_dir: Option<PathBuf>,
    },

    /// Run the router: content RPC, admin RPC and the optional HTTP gateway.
    Router {
        /// RPC listen address (e.g. "0.0.0.0:8080").
        #[arg(short, long)]
        listen: Option<String>,

        /// HTTP gateway listen address. The gateway is off unless set.
        #[arg(long)]
        http: Option<String>,

        /// Storage node to register at startup. Can be specified multiple times.
        #[arg(short, long)]
        node: Vec<String>,

        /// Comma-separated storage nodes to register at startup.
        #[arg(long)]
        nodes: Option<String>,
    },

    /// Manage a running router's membership.
    Admin {
        /// Router RPC address.
        #[arg(short, long, env = "VIDSHARD_ROUTER", default_value = "localhost:8080")]
        router: String,

        /// Seconds to wait for an add or remove, which returns only after
        /// the migration finishes. Overrides `[net] admin_timeout_ms`.
        #[arg(short, long)]
        timeout: Option<u64>,

        #[command(subcommand)]
        action: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List registered storage nodes.
    List,
    /// Register a storage node and migrate the keys it now owns.
    Add {
        /// Node address (`host:port`).
        addr: String,
    },
    /// Deregister a storage node and migrate its keys away.
    Remove {
        /// Node address (`host:port`).
        addr: String,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Storage {
            host,
            port,
            memory,
            base_dir,
        } => {
            // CLI args override config file values.
            if let Some(host) = host {
                config.storage.host = host;
            }
            if let Some(port) = port {
                config.storage.port = port;
            }
            if base_dir.is_some() {
                config.storage.base_dir = base_dir;
            }
            if memory {
                config.storage.backend = "memory".to_string();
            }
            if config.storage.backend != "memory" && config.storage.base_dir.is_none() {
                Cli::command()
                    .error(
                        clap::error::ErrorKind::MissingRequiredArgument,
                        "the storage base directory is required: vidshardd storage <BASE_DIR>",
                    )
                    .exit();
            }
            cmd_storage(config).await
        }
        Commands::Router {
            listen,
            http,
            node,
            nodes,
        } => {
            if let Some(addr) = listen {
                config.router.listen_addr = addr;
            }
            if http.is_some() {
                config.router.http_addr = http;
            }
            let mut cli_nodes = node;
            if let Some(list) = nodes {
                cli_nodes.extend(parse_node_list(&list).into_iter().map(|n| n.to_string()));
            }
            if !cli_nodes.is_empty() {
                config.router.nodes = cli_nodes;
            }
            cmd_router(config).await
        }
        Commands::Admin {
            router,
            timeout,
            action,
        } => {
            if let Some(secs) = timeout {
                config.net.admin_timeout_ms = Some(secs.saturating_mul(1000));
            }
            cmd_admin(&config, &router, action).await
        }
    }
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler: run until killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// -----------------------------------------------------------------------
// vidshardd storage
// -----------------------------------------------------------------------

async fn cmd_storage(config: CliConfig) -> Result<()> {
    let store: Arc<dyn ContentStore> = match (config.storage.backend.as_str(), &config.storage.base_dir)
    {
        ("memory", _) => {
            info!("using in-memory content store");
            Arc::new(MemoryStore::new())
        }
        (_, Some(dir)) => {
            info!(path = %dir.display(), "using file content store");
            Arc::new(FileStore::new(dir).context("failed to initialize file store")?)
        }
        (_, None) => anyhow::bail!("storage base directory is not set"),
    };

    let addr = config.storage_addr();
    let server = RpcServer::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %server.local_addr()?, "storage node ready");

    server
        .serve_with_shutdown(Arc::new(StorageServer::new(store)), shutdown_signal())
        .await
        .context("storage server failed")?;
    Ok(())
}

// -----------------------------------------------------------------------
// vidshardd router
// -----------------------------------------------------------------------

async fn cmd_router(config: CliConfig) -> Result<()> {
    let nodes: Vec<NodeAddr> = config.router.nodes.iter().map(NodeAddr::new).collect();
    info!(
        listen = %config.router.listen_addr,
        http = ?config.router.http_addr,
        nodes = nodes.len(),
        migration_concurrency = config.migration_concurrency(),
        "router configuration"
    );

    let state = RouterState::new();
    let connector = Arc::new(TcpConnector::new(config.client_config()));
    let membership = Arc::new(
        MembershipManager::new(state.clone(), connector)
            .with_concurrency(config.migration_concurrency()),
    );
    membership
        .bootstrap(&nodes)
        .await
        .context("failed to register startup nodes")?;

    let content = ContentRouter::new(state);

    let gateway = match config.router.http_addr.clone() {
        Some(addr) => {
            let gateway = Gateway::new(content.clone());
            Some(tokio::spawn(async move {
                gateway.serve_with_shutdown(&addr, shutdown_signal()).await
            }))
        }
        None => None,
    };

    let server = RpcServer::bind(&config.router.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.router.listen_addr))?;
    info!(addr = %server.local_addr()?, "router ready");
    server
        .serve_with_shutdown(
            Arc::new(RouterService::new(content, membership)),
            shutdown_signal(),
        )
        .await
        .context("router server failed")?;

    if let Some(handle) = gateway {
        handle
            .await
            .context("gateway task panicked")?
            .context("content gateway failed")?;
    }
    Ok(())
}

// -----------------------------------------------------------------------
// vidshardd admin
// -----------------------------------------------------------------------

async fn cmd_admin(config: &CliConfig, router: &str, action: AdminCommands) -> Result<()> {
    let client = RpcClient::new(NodeAddr::new(router), config.admin_client_config());

    match action {
        AdminCommands::List => {
            let nodes = client.list_nodes().await.context("list nodes failed")?;
            if nodes.is_empty() {
                println!("no nodes registered");
            }
            for node in nodes {
                println!("{node}");
            }
        }
        AdminCommands::Add { addr } => {
            let summary = client
                .add_node(&NodeAddr::new(addr.trim()))
                .await
                .context("add node failed")?;
            println!(
                "added {}: migrated {}, failed {}, orphaned {}",
                addr.trim(),
                summary.migrated_file_count,
                summary.failed_file_count,
                summary.orphaned_file_count
            );
        }
        AdminCommands::Remove { addr } => {
            let summary = client
                .remove_node(&NodeAddr::new(addr.trim()))
                .await
                .context("remove node failed")?;
            println!(
                "removed {}: migrated {}, failed {}, orphaned {}",
                addr.trim(),
                summary.migrated_file_count,
                summary.failed_file_count,
                summary.orphaned_file_count
            );
        }
    }
    Ok(())
}
