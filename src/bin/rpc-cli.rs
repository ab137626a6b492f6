use clap::{Parser, Subcommand};
use serde_json::Value;

use chain_rpc_proxy::rpc::{RpcPayload, RpcRequest, RpcResponse};

#[derive(Parser)]
#[command(name = "rpc-cli")]
#[command(about = "Send JSON-RPC calls through a chain-rpc-proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Chain to route the call to
    #[arg(short, long, default_value_t = 1, allow_hyphen_values = true)]
    chain: i64,

    /// Send the chain ID in this query parameter instead of the body
    #[arg(short, long)]
    query_param: Option<String>,

    /// Request id
    #[arg(long, default_value_t = 1)]
    id: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the upstream for its chain ID
    ChainId,
    /// Call an arbitrary method
    Call {
        method: String,
        /// Positional params as a JSON array
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut request = match cli.command {
        Commands::ChainId => RpcRequest::new(cli.id, "eth_chainId"),
        Commands::Call { method, params } => {
            let request = RpcRequest::new(cli.id, method);
            match params {
                Some(raw) => request.with_params(serde_json::from_str::<Vec<Value>>(&raw)?),
                None => request,
            }
        }
    };

    let mut url = reqwest::Url::parse(&cli.url)?;
    match &cli.query_param {
        Some(param) => {
            url.query_pairs_mut()
                .append_pair(param, &cli.chain.to_string());
        }
        None => request = request.with_chain_id(cli.chain),
    }

    let res = reqwest::Client::new()
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(request.encode()?)
        .send()
        .await?;

    let status = res.status();
    let text = res.text().await?;
    let response: RpcResponse<Value> = match serde_json::from_str(&text) {
        Ok(response) => response,
        Err(_) => {
            eprintln!("Error: proxy returned status {}", status);
            eprintln!("Response: {}", text);
            std::process::exit(1);
        }
    };

    match &response.payload {
        RpcPayload::Result(result) => println!("{}", serde_json::to_string_pretty(result)?),
        RpcPayload::Error(error) => {
            eprintln!("RPC error {}: {}", error.code, error.message);
            std::process::exit(1);
        }
    }

    Ok(())
}
