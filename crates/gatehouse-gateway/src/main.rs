//! Gatehouse gateway — entry point.
//!
//! Loads the configuration file, validates it, and starts the axum-based
//! gateway in front of the configured origin.
//!
//! # Usage
//!
//! ```text
//! gatehouse-gateway [CONFIG]
//! ```
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEHOUSE_CONFIG` | `gatehouse.toml` | Config file, when no argument is given. |
//! | `GATEHOUSE_<FIELD>` | *(none)* | Overrides a config field, `__` separates nested keys (`GATEHOUSE_SUPABASE__ANON_KEY`). |
//! | `GATEHOUSE_LOG_FORMAT` | `text` | `json` for JSON log lines. |
//! | `RUST_LOG` | `gatehouse_gateway=info` | Log filter. |

use gatehouse_gateway::auth::SupabaseSessionLookup;
use gatehouse_gateway::error::{GatewayError, GatewayResult};
use gatehouse_gateway::server::GatewayServer;
use gatehouse_kernel::GatewayConfig;
use gatehouse_kernel::config::load_config;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "gatehouse.toml";

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "gateway stopped");
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gatehouse_gateway=info"));
    let json = std::env::var("GATEHOUSE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run() -> GatewayResult<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GATEHOUSE_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config: GatewayConfig = load_config(&path)?;
    let compiled = config.compile()?;

    let supabase = compiled.supabase.clone().ok_or_else(|| {
        GatewayError::Internal(format!("'{path}' has no [supabase] section"))
    })?;
    let lookup = SupabaseSessionLookup::new(&supabase, compiled.auth_timeout)?
        .with_secure_cookies(compiled.production);

    info!(
        config = %path,
        gateway = %compiled.id,
        production = compiled.production,
        "configuration loaded"
    );

    GatewayServer::new(compiled, Arc::new(lookup))
        .start(&config.listen_addr)
        .await
}
