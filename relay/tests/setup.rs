//! Shared helpers for the relay test suite.
//!
//! Tests run the relay router behind an `axum_test::TestServer` with the
//! real HTTP transport (WebSocket upgrades need it) and stand in for the SSH
//! server with a plain TCP listener.

use std::time::Duration;

use axum_test::{TestResponse, TestServer, TestWebSocket};
use relay_types::ProtocolVersion;
use ssh_relay::config::RelayConfig;
use ssh_relay::tls::ClientAuthPolicy;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

pub const ORIGIN: &str = "chrome-extension://foo";
pub const COOKIE: &str = "origin=chrome-extension://foo";

pub struct TestRelay {
    pub server: TestServer,
    pub ssh_port: u16,
    accepted: mpsc::Receiver<TcpStream>,
}

impl TestRelay {
    pub async fn start(max_sessions: i64, max_session_age: Option<Duration>) -> Self {
        Self::start_with_config(test_config(max_sessions, max_session_age)).await
    }

    pub async fn start_with_config(config: RelayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ssh_port = listener.local_addr().unwrap().port();
        let (tx, accepted) = mpsc::channel(8);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                if tx.send(stream).await.is_err() {
                    break;
                }
            }
        });
        let router = ssh_relay::build_router(&config).unwrap();
        let server = TestServer::builder()
            .http_transport()
            .build(router)
            .expect("can build test-server");
        TestRelay {
            server,
            ssh_port,
            accepted,
        }
    }

    /// The server end of the next SSH connection the relay dialed.
    pub async fn accept_ssh(&mut self) -> TcpStream {
        tokio::time::timeout(Duration::from_secs(5), self.accepted.recv())
            .await
            .expect("no SSH connection was dialed")
            .expect("listener task died")
    }

    /// Issues a `/proxy` request for the test SSH server.
    pub async fn proxy(&self) -> TestResponse {
        self.server
            .get("/proxy")
            .add_query_param("host", "127.0.0.1")
            .add_query_param("port", self.ssh_port)
            .add_header("cookie", COOKIE)
            .await
    }

    /// Opens a `/v4/connect` WebSocket to the test SSH server.
    pub async fn v4_connect(&self) -> TestWebSocket {
        self.server
            .get_websocket("/v4/connect")
            .add_query_param("host", "127.0.0.1")
            .add_query_param("port", self.ssh_port)
            .add_header("cookie", COOKIE)
            .add_header("origin", ORIGIN)
            .await
            .into_websocket()
            .await
    }
}

pub fn test_config(max_sessions: i64, max_session_age: Option<Duration>) -> RelayConfig {
    RelayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        origin_cookie_name: "origin".to_owned(),
        max_sessions,
        max_session_age,
        protocol_versions: vec![ProtocolVersion::V1, ProtocolVersion::V4],
        ws_max_message_size: 16777220,
        hsts_max_age: None,
        hsts_include_subdomains: false,
        tls_cert: None,
        tls_key: None,
        tls_client_ca: Vec::new(),
        tls_client_auth: ClientAuthPolicy::NoClientCert,
        read_header_timeout: None,
    }
}
