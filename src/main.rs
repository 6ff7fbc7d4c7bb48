//! LLM Mock Server - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use llm_mock_server::config::DEFAULT_CLIENT;
use llm_mock_server::{ChannelTransport, MockServer, MockServerConfig, RequestDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "llm-mock-server",
    about = "Mock LLM API server - endpoint rules, request mutation, and context broadcast",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "llm-mock.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Route a request and print the result (e.g. --route GET /users?page=1)
    #[arg(long, num_args = 2, value_names = ["METHOD", "URI"])]
    route: Option<Vec<String>>,

    /// Client whose rules are used with --route
    #[arg(long, default_value = DEFAULT_CLIENT)]
    client: String,

    /// Subscribe to every active context and print N ticks of data
    #[arg(long, value_name = "N")]
    ticks: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", include_str!("../demos/default-config.yaml"));
        return Ok(());
    }

    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockServerConfig::from_file(&args.config)
            .with_context(|| format!("failed to load {}", args.config.display()))?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no rules)");
        MockServerConfig::default()
    };

    if args.validate {
        config.validate()?;
        let rules: usize = config.client_rules().map(|(_, rules)| rules.len()).sum();
        println!(
            "Configuration is valid ({} rules, {} contexts)",
            rules,
            config.contexts.len()
        );
        return Ok(());
    }

    let transport = Arc::new(ChannelTransport::default());
    let server = MockServer::new(config, Arc::clone(&transport))?;

    if let Some(route) = &args.route {
        let (method, uri) = (&route[0], &route[1]);
        let request = RequestDescriptor::new(method, uri)?;
        let routed = match server.engine(&args.client) {
            Some(engine) => engine.route(request),
            None => anyhow::bail!("Unknown client: {}", args.client),
        };
        print!("{}", routed);
        return Ok(());
    }

    let ticks = args.ticks.unwrap_or(0);
    if ticks == 0 {
        info!("Nothing to do; use --route or --ticks");
        return Ok(());
    }

    let connection = "cli";
    let mut events = transport.connect(connection);
    let gateway = server.gateway();
    gateway.on_connect(connection);
    for context in gateway.query_contexts(connection).await? {
        gateway.on_subscribe(connection, &context).await?;
    }

    let mut interval = tokio::time::interval(server.tick_interval());
    for _ in 0..ticks {
        interval.tick().await;
        server.publisher().tick().await;
        while let Ok(delivery) = events.try_recv() {
            println!("{} {}", delivery.event, delivery.payload);
        }
    }

    gateway.on_disconnect(connection, None);
    transport.disconnect(connection);
    Ok(())
}
