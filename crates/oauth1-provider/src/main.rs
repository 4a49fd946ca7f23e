//! OAuth 1.0a provider server - Entry Point
//!
//! Serves the token endpoints over HTTP, backed by the in-memory store.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oauth1_provider::storage::{memory::MemoryStore, Consumer};
use oauth1_provider::{Config, Provider};

#[derive(Parser, Debug)]
#[command(name = "oauth1-provider")]
#[command(about = "OAuth 1.0a provider server")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Protection realm announced in challenges
    #[arg(long, default_value = "http://localhost/", env = "OAUTH_REALM")]
    realm: String,

    /// Seed consumer key (demo/testing)
    #[arg(long, env = "OAUTH_CONSUMER_KEY")]
    consumer_key: Option<String>,

    /// Seed consumer secret (demo/testing)
    #[arg(long, env = "OAUTH_CONSUMER_SECRET")]
    consumer_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        realm = %cli.realm,
        "Starting OAuth 1.0a provider"
    );

    let store = MemoryStore::new();
    if let (Some(key), Some(secret)) = (cli.consumer_key, cli.consumer_secret) {
        tracing::info!(consumer_key = %key, "Seeding consumer");
        store
            .add_consumer(Consumer {
                consumer_key: key,
                consumer_secret: secret,
                name: Some("Seed consumer".to_string()),
                publisher: None,
                app_type: None,
                category: None,
                website_url: None,
                email: None,
                description: None,
                callback_url: None,
                enabled: true,
            })
            .await;
    }

    let provider = Provider::from_memory(Config::new(cli.realm), store);
    oauth1_provider::http::serve(provider, cli.port).await
}
