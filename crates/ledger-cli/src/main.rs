use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the proof-of-work text ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the pending pool
    Submit {
        /// Transaction text
        data: String,
    },
    /// Mine the pending transactions into a new block
    Mine,
    /// Cancel the block currently being mined
    Cancel,
    /// Print the whole chain and pending pool
    Chain,
    /// Print a single block
    Block { index: u64 },
    /// Print chain statistics
    Stats,
    /// Check chain integrity
    Validate,
    /// Case-insensitive search over mined transactions
    Search { query: String },
    /// Set the mining difficulty
    Difficulty { value: i64 },
}

impl Command {
    /// HTTP method, path below `/api`, and optional JSON body.
    fn request(&self) -> (reqwest::Method, String, Option<Value>) {
        use reqwest::Method;
        match self {
            Command::Submit { data } => (
                Method::POST,
                "/transaction".into(),
                Some(json!({ "data": data })),
            ),
            Command::Mine => (Method::POST, "/mine".into(), None),
            Command::Cancel => (Method::POST, "/mine/cancel".into(), None),
            Command::Chain => (Method::GET, "/blockchain".into(), None),
            Command::Block { index } => (Method::GET, format!("/blocks/{index}"), None),
            Command::Stats => (Method::GET, "/stats".into(), None),
            Command::Validate => (Method::GET, "/validate".into(), None),
            Command::Search { .. } => (Method::GET, "/search".into(), None),
            Command::Difficulty { value } => (
                Method::POST,
                "/difficulty".into(),
                Some(json!({ "difficulty": value })),
            ),
        }
    }
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {status}");
    match serde_json::from_str::<Value>(&body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let (method, path, body) = cli.cmd.request();
    let url = format!("{}/api{path}", cli.node.trim_end_matches('/'));
    debug!("{method} {url}");

    let client = Client::new();
    let mut req = client.request(method, &url);
    if let Command::Search { query } = &cli.cmd {
        req = req.query(&[("q", query)]);
    }
    if let Some(body) = body {
        req = req.json(&body);
    }
    let res = req
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    print_response(res).await
}
