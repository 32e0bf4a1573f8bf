//! The SSH `ProxyCommand` helper binary.
//!
//! Logs go to stderr; stdout carries the SSH byte stream.
//!
//! ```text
//! Host *.corp.example.org
//!   ProxyCommand ssh-relay-helper --cookie-server-url=https://cookies.example.org/endpoint --host=%h --port=%p
//! ```

use std::process::ExitCode;

use clap::Parser;
use eyre::Context as _;
use ssh_relay_helper::{Error, cookie, session};
use tracing_subscriber::EnvFilter;

/// The configuration for the relay helper.
#[derive(Parser, Debug)]
struct HelperConfig {
    /// URL of the Cookie Server endpoint authorizing this client.
    #[clap(long, env = "SSH_RELAY_COOKIE_SERVER_URL")]
    cookie_server_url: Option<String>,

    /// Relay endpoint (`host:port`) to use directly, skipping the Cookie
    /// Server.
    #[clap(long, env = "SSH_RELAY_RELAY", conflicts_with = "cookie_server_url")]
    relay: Option<String>,

    /// The SSH host to reach through the relay.
    #[clap(long, env = "SSH_RELAY_HOST")]
    host: String,

    /// The SSH port to reach through the relay.
    #[clap(long, env = "SSH_RELAY_PORT", default_value = "22")]
    port: u16,

    /// Extension id presented as the WebSocket origin.
    #[clap(
        long,
        env = "SSH_RELAY_EXT_ID",
        default_value = "pnhechapfaindjhompbnflcldabbghjo"
    )]
    ext_id: String,
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("can install");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ssh_relay_helper=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = HelperConfig::parse();
    match run(config).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            tracing::error!("{err:?}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(config: HelperConfig) -> eyre::Result<()> {
    let steering = match (&config.relay, &config.cookie_server_url) {
        (Some(relay), _) => cookie::Steering {
            endpoint: relay.clone(),
            cookies: None,
        },
        (None, Some(url)) => cookie::fetch_steering(url)
            .await
            .context("while asking the cookie server")?,
        (None, None) => eyre::bail!("either --relay or --cookie-server-url is required"),
    };

    let origin = format!("chrome-extension://{}", config.ext_id);
    let ws = session::connect(
        &steering.endpoint,
        &config.host,
        config.port,
        &origin,
        steering.cookies.as_deref(),
    )
    .await
    .context("while connecting to the relay")?;

    let mut session = session::Session::new();
    match session
        .run(ws, tokio::io::stdin(), tokio::io::stdout())
        .await
    {
        // either end hanging up is a normal exit for a ProxyCommand
        Err(Error::ConnectionClosed) | Ok(()) => Ok(()),
        Err(err) => Err(err).context("session failed"),
    }
}
