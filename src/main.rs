use std::net::SocketAddr;

use document_cluster::api;
use document_cluster::context::ClusterContext;
use document_cluster::health;
use document_cluster::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> --query <addr:port> [--name <name>] [--join <addr:port>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:7061 --query 127.0.0.1:8061", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:7062 --query 127.0.0.1:8062 --join 127.0.0.1:7061",
            args[0]
        );

        std::process::exit(1);
    }

    let settings = parse_args(&args)?;

    tracing::info!("Starting node {} on {}", settings.name, settings.bind_addr);

    let ctx = ClusterContext::start(settings).await?;

    health::monitor::start(ctx.clone());

    // Seed joins are best effort; retry policy belongs to the operator
    for seed in ctx.settings.seed_nodes.clone() {
        if let Err(e) = ctx.join(seed).await {
            tracing::warn!("Could not join seed node {}: {}", seed, e);
        }
    }

    let app = api::http::router(ctx.clone());

    tracing::info!("External API listening on {}", ctx.settings.query_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(ctx.settings.query_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<Settings> {
    let mut bind_addr: Option<SocketAddr> = None;
    let mut query_addr: Option<SocketAddr> = None;
    let mut name: Option<String> = None;
    let mut seed_nodes: Vec<SocketAddr> = vec![];

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(flag_value(args, i)?.parse()?);
                i += 2;
            }
            "--query" => {
                query_addr = Some(flag_value(args, i)?.parse()?);
                i += 2;
            }
            "--name" => {
                name = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--join" => {
                seed_nodes.push(flag_value(args, i)?.parse()?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;
    let query_addr = query_addr.ok_or_else(|| anyhow::anyhow!("--query is required"))?;
    let name = name.unwrap_or_else(|| format!("node-{}", bind_addr.port()));

    let mut settings = Settings::for_node(&name, bind_addr, query_addr);
    settings.seed_nodes = seed_nodes;

    Ok(settings)
}

fn flag_value<'a>(args: &'a [String], i: usize) -> anyhow::Result<&'a str> {
    args.get(i + 1)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow::anyhow!("{} requires a value", args[i]))
}
