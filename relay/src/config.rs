//! Configuration for the relay server.
//!
//! Parsed from command-line arguments or environment variables using `clap`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use relay_types::ProtocolVersion;

use crate::tls::ClientAuthPolicy;

/// The configuration for the SSH-over-WebSocket relay.
#[derive(Parser, Debug)]
pub struct RelayConfig {
    /// The bind address of the relay server.
    #[clap(long, env = "SSH_RELAY_BIND_ADDR", default_value = "0.0.0.0:8022")]
    pub bind_addr: SocketAddr,

    /// Name of the cookie carrying the client's origin.
    #[clap(long, env = "SSH_RELAY_ORIGIN_COOKIE_NAME", default_value = "origin")]
    pub origin_cookie_name: String,

    /// Maximum number of concurrent sessions.
    ///
    /// Zero or negative disables the cap.
    #[clap(long, env = "SSH_RELAY_MAX_SESSIONS", default_value = "0")]
    pub max_sessions: i64,

    /// Maximum lifetime of a session; unset disables expiry.
    #[clap(
        long,
        env = "SSH_RELAY_MAX_SESSION_AGE",
        value_parser = humantime::parse_duration
    )]
    pub max_session_age: Option<Duration>,

    /// Relay protocol versions to serve.
    ///
    /// Endpoints of versions not listed are not registered.
    #[clap(
        long,
        env = "SSH_RELAY_PROTOCOL_VERSIONS",
        value_delimiter = ',',
        default_value = "v1,v4"
    )]
    pub protocol_versions: Vec<ProtocolVersion>,

    /// Max message size the websocket connections accept.
    ///
    /// The default fits one full framed-protocol chunk plus its 4-byte
    /// counter prefix.
    #[clap(
        long,
        env = "SSH_RELAY_WS_MAX_MESSAGE_SIZE",
        default_value = "16777220"
    )]
    pub ws_max_message_size: usize,

    /// `Strict-Transport-Security` max-age; unset disables the header.
    #[clap(
        long,
        env = "SSH_RELAY_HSTS_MAX_AGE",
        value_parser = humantime::parse_duration
    )]
    pub hsts_max_age: Option<Duration>,

    /// Whether the HSTS policy extends to subdomains.
    #[clap(long, env = "SSH_RELAY_HSTS_INCLUDE_SUBDOMAINS")]
    pub hsts_include_subdomains: bool,

    /// Path to the PEM-encoded server certificate chain.
    ///
    /// The relay serves plain HTTP when unset.
    #[clap(long, env = "SSH_RELAY_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// Path to the PEM-encoded server private key.
    #[clap(long, env = "SSH_RELAY_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// PEM files with CA certificates for client-certificate verification.
    #[clap(long, env = "SSH_RELAY_TLS_CLIENT_CA")]
    pub tls_client_ca: Vec<PathBuf>,

    /// Client-certificate policy for mutual TLS.
    #[clap(
        long,
        env = "SSH_RELAY_TLS_CLIENT_AUTH",
        value_enum,
        default_value_t = ClientAuthPolicy::RequireAndVerifyClientCert
    )]
    pub tls_client_auth: ClientAuthPolicy,

    /// Timeout for reading a request's headers.
    ///
    /// Unset leaves the transport default.
    #[clap(
        long,
        env = "SSH_RELAY_READ_HEADER_TIMEOUT",
        value_parser = humantime::parse_duration
    )]
    pub read_header_timeout: Option<Duration>,
}
