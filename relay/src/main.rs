//! The SSH-over-WebSocket relay server binary.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser as _;
use eyre::Context as _;
use ssh_relay::config::RelayConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("can install");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ssh_relay=debug,info")),
        )
        .init();

    let config = RelayConfig::parse();
    ssh_relay::metrics::describe_metrics();
    match run(config).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            // we don't want to double print the error, therefore we just return FAILURE
            tracing::error!("{err:?}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(config: RelayConfig) -> eyre::Result<()> {
    tracing::info!("starting relay with config: {config:#?}");
    let router = ssh_relay::build_router(&config)?;

    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down..");
            handle.graceful_shutdown(Some(Duration::from_secs(10)));
        }
    });

    match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => {
            let tls = ssh_relay::tls::server_config(
                cert,
                key,
                &config.tls_client_ca,
                config.tls_client_auth,
            )
            .context("while loading TLS material")?;
            let rustls_config = axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(tls));
            tracing::info!("relay listening on https://{}", config.bind_addr);
            let mut server = axum_server::bind_rustls(config.bind_addr, rustls_config).handle(handle);
            if let Some(timeout) = config.read_header_timeout {
                server
                    .http_builder()
                    .http1()
                    .timer(hyper_util::rt::TokioTimer::new())
                    .header_read_timeout(timeout);
            }
            server.serve(router.into_make_service()).await?;
        }
        _ => {
            tracing::warn!("TLS material not configured, serving plain HTTP");
            tracing::info!("relay listening on http://{}", config.bind_addr);
            let mut server = axum_server::bind(config.bind_addr).handle(handle);
            if let Some(timeout) = config.read_header_timeout {
                server
                    .http_builder()
                    .http1()
                    .timer(hyper_util::rt::TokioTimer::new())
                    .header_read_timeout(timeout);
            }
            server.serve(router.into_make_service()).await?;
        }
    }
    Ok(())
}
