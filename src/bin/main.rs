//! Tipjar CLI - one-shot session commands and the HTTP server
//!
//!   tipjar status                         → session snapshot
//!   tipjar history [query]                → tip records, newest first
//!   tipjar summary                        → sent/received totals
//!   tipjar send <to> <amount> [message]   → submit a tip, print hash
//!   tipjar fee <to> <amount> [message]    → advisory fee
//!   tipjar link                           → shareable tip link
//!   tipjar serve                          → HTTP API
//!
//! Every command talks to the node at `TIPJAR_RPC_URL` and uses its first
//! managed account as the wallet.

use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tipjar::config::{load_dotenv, parse_chain_id};
use tipjar::link::{explorer_tx_url, TipLink};
use tipjar::logging::init_logging;
use tipjar::units::format_amount;
use tipjar::{LogEventSource, NodeWallet, RpcClient, SessionManager, TipEventSource, TipJar, TipJarConfig, WalletProvider};
use tracing::{debug, info};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("tipjar {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let Some(command) = opts.command.clone() else {
        print_usage();
        return;
    };

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))
        .and_then(|rt| rt.block_on(run(&command, &opts)));

    match result {
        Ok(output) => println!("{}", render(&output, &opts)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": e}), &opts));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, opts: &ParsedArgs) -> String {
    let pretty = !opts.json && (opts.pretty || std::io::stdout().is_terminal());
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

async fn run(command: &str, opts: &ParsedArgs) -> Result<Value, String> {
    match command {
        "status" => cmd_status(opts).await,
        "history" | "ls" => cmd_history(opts).await,
        "summary" => cmd_summary(opts).await,
        "send" => cmd_send(opts).await,
        "fee" => cmd_fee(opts).await,
        "link" => cmd_link(opts).await,
        "serve" => cmd_serve(opts).await,
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    // Network options
    rpc_url: Option<String>,
    chain_id: Option<u64>,
    contract: Option<String>,
    native: bool,
    // Link options
    amount: Option<String>,
    message: Option<String>,
    origin: Option<String>,
    // Send options
    wait: bool,
    // Server options
    port: Option<u16>,
    // Output options
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        load_dotenv(".env");

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            let mut takes_value = true;
            match arg.as_str() {
                "--rpc" | "-r" => opts.rpc_url = value,
                "--chain-id" => opts.chain_id = value.as_deref().and_then(parse_chain_id),
                "--contract" | "-c" => opts.contract = value,
                "--amount" | "-a" => opts.amount = value,
                "--message" | "-m" => opts.message = value,
                "--origin" | "-o" => opts.origin = value,
                "--port" | "-p" => opts.port = value.and_then(|v| v.parse().ok()),
                _ => {
                    takes_value = false;
                    match arg.as_str() {
                        "--help" | "-h" => opts.help = true,
                        "--version" | "-V" => opts.version = true,
                        "--json" => opts.json = true,
                        "--pretty" => opts.pretty = true,
                        "--native" => opts.native = true,
                        "--wait" | "-w" => opts.wait = true,
                        _ if !arg.starts_with('-') => positional.push(arg.clone()),
                        _ => {} // Ignore unknown flags
                    }
                }
            }
            i += if takes_value { 2 } else { 1 };
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.positional = positional;

        // Environment variables have lower priority than CLI args
        if opts.port.is_none() {
            opts.port = env::var("TIPJAR_PORT").ok().and_then(|p| p.parse().ok());
        }

        opts
    }

    fn config(&self) -> Result<TipJarConfig, String> {
        let mut config = TipJarConfig::from_env().map_err(|e| e.to_string())?;
        if let Some(url) = &self.rpc_url {
            config.network.rpc_urls = vec![url.clone()];
        }
        if let Some(chain_id) = self.chain_id {
            config.network.chain_id = chain_id;
        }
        if let Some(contract) = &self.contract {
            let address = tipjar::units::parse_address(contract).map_err(|e| format!("--contract: {}", e))?;
            config = config.with_contract(address);
        }
        if self.native {
            config = config.native_transfers();
        }
        Ok(config)
    }

    fn arg(&self, index: usize, name: &str) -> Result<&str, String> {
        self.positional.get(index).map(String::as_str).ok_or_else(|| format!("missing <{}>", name))
    }

    /// Message: third positional onwards, or `--message`.
    fn tip_message(&self) -> String {
        if self.positional.len() > 2 {
            self.positional[2..].join(" ")
        } else {
            self.message.clone().unwrap_or_default()
        }
    }
}

fn build_manager(config: TipJarConfig) -> Result<SessionManager, String> {
    let rpc = RpcClient::from_config(&config).map_err(|e| e.to_string())?;
    debug!("Using RPC endpoint {}", rpc.url());
    let wallet = NodeWallet::new(rpc.clone());
    wallet.start(config.network_poll);
    let wallet: Arc<dyn WalletProvider> = Arc::new(wallet);
    let events: Arc<dyn TipEventSource> =
        Arc::new(LogEventSource::new(rpc.clone(), TipJar::new(config.contract), config.event_poll));
    Ok(SessionManager::new(config, Some(wallet), Arc::new(rpc), Some(events)))
}

async fn connected(opts: &ParsedArgs) -> Result<SessionManager, String> {
    let manager = build_manager(opts.config()?)?;
    manager.connect().await.map_err(|e| e.to_string())?;
    Ok(manager)
}

async fn cmd_status(opts: &ParsedArgs) -> Result<Value, String> {
    let manager = connected(opts).await?;
    serde_json::to_value(manager.snapshot()).map_err(|e| e.to_string())
}

async fn cmd_history(opts: &ParsedArgs) -> Result<Value, String> {
    let manager = connected(opts).await?;
    let query = opts.positional.join(" ");
    let transactions = manager.search(&query);
    Ok(json!({"transactions": transactions, "count": transactions.len()}))
}

async fn cmd_summary(opts: &ParsedArgs) -> Result<Value, String> {
    let manager = connected(opts).await?;
    serde_json::to_value(manager.summary()).map_err(|e| e.to_string())
}

async fn cmd_send(opts: &ParsedArgs) -> Result<Value, String> {
    let to = opts.arg(0, "to")?;
    let amount = opts.arg(1, "amount")?;
    let manager = connected(opts).await?;
    let hash = manager.send_tip(to, amount, &opts.tip_message()).await.map_err(|e| e.to_string())?;
    info!("Tip submitted: {}", hash);

    let mut confirmed = false;
    if opts.wait {
        let mut rx = manager.subscribe();
        let wait = rx.wait_for(|snap| snap.transactions.iter().any(|r| r.hash == Some(hash) && r.confirmed));
        confirmed = tokio::time::timeout(Duration::from_secs(120), wait)
            .await
            .map_err(|_| "timed out waiting for confirmation".to_string())?
            .is_ok();
    }

    let explorer = manager.config().network.explorer_url().map(|base| explorer_tx_url(base, hash));
    Ok(json!({"hash": hash, "confirmed": confirmed, "explorer_url": explorer}))
}

async fn cmd_fee(opts: &ParsedArgs) -> Result<Value, String> {
    let to = opts.arg(0, "to")?;
    let amount = opts.arg(1, "amount")?;
    let manager = connected(opts).await?;
    let fee = manager.estimate_fee(to, amount, &opts.tip_message()).await;
    Ok(json!({"fee": format_amount(fee), "fee_wei": fee.to_string()}))
}

async fn cmd_link(opts: &ParsedArgs) -> Result<Value, String> {
    let manager = connected(opts).await?;
    let session = manager.session().ok_or("wallet not connected")?;
    let link = TipLink::new(session.address)
        .with_amount(opts.amount.as_deref().unwrap_or_default())
        .map_err(|e| e.to_string())?
        .with_message(opts.message.as_deref().unwrap_or_default());
    let origin = opts.origin.as_deref().unwrap_or("http://localhost:3000");
    Ok(json!({"url": link.url(origin), "link": link}))
}

async fn cmd_serve(opts: &ParsedArgs) -> Result<Value, String> {
    use tipjar::{create_router, install_signal_handlers};

    let port = opts.port.unwrap_or(8080);
    let manager = build_manager(opts.config()?)?;
    let shutdown = install_signal_handlers(manager.clone());

    let router = create_router(manager, "tipjar");
    let addr = format!("0.0.0.0:{}", port);

    info!("Tipjar server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /health              - Health check");
    info!("  GET  /session             - Session snapshot");
    info!("  POST /connect             - Connect wallet");
    info!("  POST /tips                - Send a tip");
    debug!("  GET  /transactions?q=     - Tip history");
    debug!("  GET  /summary             - Totals");
    debug!("  GET  /link                - Tip link");
    debug!("  POST /switch-network      - Switch to target chain");
    debug!("  POST /fee-estimate        - Advisory fee");
    debug!("  POST /disconnect          - Disconnect wallet");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind: {}", e))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(json!({"status": "stopped"}))
}

fn print_usage() {
    println!(
        r#"tipjar - Tip jar wallet session

USAGE:
    tipjar <command> [args] [options]

COMMANDS:
    status                          Connect and print the session snapshot
    history [query]                 Tip records, newest first (alias: ls)
    summary                         Sent/received totals
    send <to> <amount> [message]    Send a tip (amount in display units)
    fee <to> <amount> [message]     Advisory network fee
    link                            Shareable tip link for the wallet
    serve                           Start HTTP server

NETWORK OPTIONS:
    --rpc, -r <url>                 RPC endpoint (env: TIPJAR_RPC_URL)
    --chain-id <id>                 Target chain id (env: TIPJAR_CHAIN_ID)
    --contract, -c <addr>           TipJar contract (env: TIPJAR_CONTRACT)
    --native                        Plain native transfers, no contract

SEND / LINK OPTIONS:
    --wait, -w                      Wait for confirmation after send
    --amount, -a <amount>           Suggested amount for link
    --message, -m <text>            Message for link or send
    --origin, -o <url>              Link origin (default: http://localhost:3000)

SERVER OPTIONS:
    --port, -p <port>               Server port (default: 8080, env: TIPJAR_PORT)

OUTPUT OPTIONS:
    --json                          Raw JSON output
    --pretty                        Pretty-print JSON
    --version, -V                   Print version

ENVIRONMENT:
    RUST_LOG                        Log filter (default: info, HTTP stack at warn)
    TIPJAR_LOG_FORMAT               compact | pretty | json (default: compact)
    TIPJAR_LOG_JSON=1               Same as TIPJAR_LOG_FORMAT=json"#
    );
}
