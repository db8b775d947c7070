use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "lbctl")]
#[command(about = "Management CLI for the HTTP load balancer", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:8001")]
    url: String,

    /// Admin API key. Required, either here or through `LB_ADMIN_KEY`.
    #[arg(short, long, env = "LB_ADMIN_KEY", hide_env_values = true)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show balancer status
    Status,
    /// List backends with liveness and counters
    Backends,
    /// Register a backend
    Add { address: String },
    /// Deregister a backend by id
    Remove { id: u64 },
    /// Push a liveness report for a backend
    Mark {
        id: u64,
        #[arg(long, conflicts_with = "unhealthy", required_unless_present = "unhealthy")]
        healthy: bool,
        #[arg(long)]
        unhealthy: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Backends => client.get(format!("{base}/admin/backends")),
        Commands::Add { address } => client
            .post(format!("{base}/admin/backends"))
            .json(&json!({ "address": address })),
        Commands::Remove { id } => client.delete(format!("{base}/admin/backends/{id}")),
        Commands::Mark { id, healthy, .. } => client
            .post(format!("{base}/admin/backends/{id}/health"))
            .json(&json!({ "healthy": healthy })),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("{}", text);
        }
        std::process::exit(1);
    }

    let body = res.bytes().await?;
    if body.is_empty() {
        println!("{}", status);
        return Ok(());
    }

    let json: Value = serde_json::from_slice(&body)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
