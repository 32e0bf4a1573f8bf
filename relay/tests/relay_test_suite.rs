use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use uuid::Uuid;

use crate::setup::{COOKIE, ORIGIN, TestRelay};

mod setup;

fn ack_frame(ack: u64) -> Bytes {
    let mut frame = vec![0x00, 0x07];
    frame.extend_from_slice(&ack.to_be_bytes());
    Bytes::from(frame)
}

#[tokio::test]
async fn proxy_returns_the_session_id() {
    let relay = TestRelay::start(0, None).await;
    let response = relay.proxy().await;
    response.assert_status_ok();
    Uuid::try_parse(&response.text()).expect("body is a canonical UUID");
    assert_eq!(response.header("access-control-allow-origin"), ORIGIN);
    assert_eq!(response.header("access-control-allow-credentials"), "true");
}

#[tokio::test]
async fn responses_carry_no_cache_headers() {
    let relay = TestRelay::start(0, None).await;
    let response = relay.proxy().await;
    assert_eq!(
        response.header("cache-control"),
        "no-store, no-cache, must-revalidate, max-age=0"
    );
    assert_eq!(response.header("pragma"), "no-cache");
}

#[tokio::test]
async fn hsts_policy_is_sent_when_configured() {
    let mut config = setup::test_config(0, None);
    config.hsts_max_age = Some(Duration::from_secs(3600));
    config.hsts_include_subdomains = true;
    let relay = TestRelay::start_with_config(config).await;
    let response = relay.proxy().await;
    assert_eq!(
        response.header("strict-transport-security"),
        "max-age=3600; includeSubDomains"
    );
}

#[tokio::test]
async fn proxy_without_origin_cookie_is_rejected() {
    let relay = TestRelay::start(0, None).await;
    let response = relay
        .server
        .get("/proxy")
        .add_query_param("host", "127.0.0.1")
        .add_query_param("port", relay.ssh_port)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proxy_to_an_unreachable_host_is_a_bad_gateway() {
    let relay = TestRelay::start(0, None).await;
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);
    let response = relay
        .server
        .get("/proxy")
        .add_query_param("host", "127.0.0.1")
        .add_query_param("port", port)
        .add_header("cookie", COOKIE)
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn unknown_sids_are_rejected() {
    let relay = TestRelay::start(0, None).await;
    let response = relay
        .server
        .get_websocket("/connect")
        .add_query_param("sid", "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee")
        .add_query_param("ack", 0)
        .add_query_param("pos", 0)
        .add_query_param("try", 1)
        .add_header("cookie", COOKIE)
        .add_header("origin", ORIGIN)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_resumption_params_are_rejected() {
    let relay = TestRelay::start(0, None).await;
    let sid = relay.proxy().await.text();
    let response = relay
        .server
        .get_websocket("/connect")
        .add_query_param("sid", &sid)
        .add_query_param("ack", 1)
        .add_query_param("pos", 0)
        .add_query_param("try", 1)
        .add_header("cookie", COOKIE)
        .add_header("origin", ORIGIN)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connect_with_a_foreign_origin_is_rejected() {
    let relay = TestRelay::start(0, None).await;
    let sid = relay.proxy().await.text();
    let response = relay
        .server
        .get_websocket("/connect")
        .add_query_param("sid", &sid)
        .add_query_param("ack", 0)
        .add_query_param("pos", 0)
        .add_query_param("try", 1)
        .add_header("cookie", COOKIE)
        .add_header("origin", "chrome-extension://bar")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn framed_sessions_relay_bytes() {
    let mut relay = TestRelay::start(0, None).await;
    let sid = relay.proxy().await.text();
    let mut ssh = relay.accept_ssh().await;
    let mut ws = relay
        .server
        .get_websocket("/connect")
        .add_query_param("sid", &sid)
        .add_query_param("ack", 0)
        .add_query_param("pos", 0)
        .add_query_param("try", 1)
        .add_header("cookie", COOKIE)
        .add_header("origin", ORIGIN)
        .await
        .into_websocket()
        .await;

    // ssh -> ws: a zero counter prefix followed by the payload
    ssh.write_all(&[0xab, 0xcd, 0xef]).await.unwrap();
    let frame = ws.receive_bytes().await;
    assert_eq!(&frame[..], &[0x00, 0x00, 0x00, 0x00, 0xab, 0xcd, 0xef]);

    // ws -> ssh: the counter prefix is stripped
    ws.send_bytes(Bytes::from_static(&[0x00, 0x00, 0x00, 0x00, b'h', b'i']))
        .await;
    let mut buf = [0u8; 2];
    ssh.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hi");
}

#[tokio::test]
async fn framed_sessions_ignore_latency_annotations() {
    let mut relay = TestRelay::start(0, None).await;
    let sid = relay.proxy().await.text();
    let mut ssh = relay.accept_ssh().await;
    let mut ws = relay
        .server
        .get_websocket("/connect")
        .add_query_param("sid", &sid)
        .add_query_param("ack", 0)
        .add_query_param("pos", 0)
        .add_query_param("try", 1)
        .add_header("cookie", COOKIE)
        .add_header("origin", ORIGIN)
        .await
        .into_websocket()
        .await;

    ws.send_text("A:12").await;
    ws.send_text("R:34").await;
    // the session stays up and keeps relaying
    ws.send_bytes(Bytes::from_static(&[0x00, 0x00, 0x00, 0x00, 0x2a])).await;
    let mut buf = [0u8; 1];
    ssh.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x2a]);
}

#[tokio::test]
async fn error_flagged_counters_terminate_framed_sessions() {
    let mut relay = TestRelay::start(0, None).await;
    let sid = relay.proxy().await.text();
    let mut ssh = relay.accept_ssh().await;
    let mut ws = relay
        .server
        .get_websocket("/connect")
        .add_query_param("sid", &sid)
        .add_query_param("ack", 0)
        .add_query_param("pos", 0)
        .add_query_param("try", 1)
        .add_header("cookie", COOKIE)
        .add_header("origin", ORIGIN)
        .await
        .into_websocket()
        .await;

    ws.send_bytes(Bytes::from_static(&[0xff, 0x00, 0x00, 0x00])).await;
    // the relay aborts the session and closes the SSH leg
    let mut buf = [0u8; 1];
    assert_eq!(ssh.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn tagged_sessions_announce_the_session_id() {
    let relay = TestRelay::start(0, None).await;
    let mut ws = relay.v4_connect().await;
    let frame = ws.receive_bytes().await;
    assert_eq!(&frame[..6], &[0x00, 0x01, 0x00, 0x00, 0x00, 0x24]);
    let sid = std::str::from_utf8(&frame[6..]).unwrap();
    Uuid::try_parse(sid).expect("SID is a canonical UUID");
}

#[tokio::test]
async fn v4_upgrades_advertise_the_ssh_subprotocol() {
    let relay = TestRelay::start(0, None).await;
    let response = relay
        .server
        .get_websocket("/v4/connect")
        .add_query_param("host", "127.0.0.1")
        .add_query_param("port", relay.ssh_port)
        .add_header("cookie", COOKIE)
        .add_header("origin", ORIGIN)
        .add_header("sec-websocket-protocol", "ssh")
        .await;
    response.assert_status(StatusCode::SWITCHING_PROTOCOLS);
    assert_eq!(response.header("sec-websocket-protocol"), "ssh");
}

#[tokio::test]
async fn v4_connect_with_a_foreign_origin_fails_the_upgrade() {
    let relay = TestRelay::start(0, None).await;
    let response = relay
        .server
        .get_websocket("/v4/connect")
        .add_query_param("host", "127.0.0.1")
        .add_query_param("port", relay.ssh_port)
        .add_header("cookie", COOKIE)
        .add_header("origin", "chrome-extension://bar")
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn tagged_sessions_ack_received_data() {
    let mut relay = TestRelay::start(0, None).await;
    let mut ws = relay.v4_connect().await;
    let _connect_success = ws.receive_bytes().await;
    let mut ssh = relay.accept_ssh().await;

    // ws -> ssh: a 16 byte DATA command lands on the SSH socket
    let payload = [0x5a; 16];
    let mut frame = vec![0x00, 0x04, 0x00, 0x00, 0x00, 0x10];
    frame.extend_from_slice(&payload);
    ws.send_bytes(Bytes::from(frame)).await;
    let mut buf = [0u8; 16];
    ssh.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, payload);

    // and is acked with the cumulative read count
    let ack = ws.receive_bytes().await;
    assert_eq!(
        &ack[..],
        &[0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10]
    );

    // ssh -> ws: bytes come back wrapped in DATA commands
    ssh.write_all(&[0xab, 0xcd]).await.unwrap();
    let data = ws.receive_bytes().await;
    assert_eq!(&data[..], &[0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0xab, 0xcd]);
}

#[tokio::test]
async fn reverse_acks_terminate_tagged_sessions() {
    let mut relay = TestRelay::start(0, None).await;
    let mut ws = relay.v4_connect().await;
    let _connect_success = ws.receive_bytes().await;
    let mut ssh = relay.accept_ssh().await;

    // move the relay's acked write count forward, then walk it backwards
    ssh.write_all(&[1, 2, 3, 4]).await.unwrap();
    let _data = ws.receive_bytes().await;
    ws.send_bytes(ack_frame(4)).await;
    ws.send_bytes(ack_frame(2)).await;

    // the relay aborts the session and closes the SSH leg
    let mut buf = [0u8; 1];
    assert_eq!(ssh.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn reconnect_commands_terminate_tagged_sessions() {
    let mut relay = TestRelay::start(0, None).await;
    let mut ws = relay.v4_connect().await;
    let _connect_success = ws.receive_bytes().await;
    let mut ssh = relay.accept_ssh().await;

    let mut frame = vec![0x00, 0x02];
    frame.extend_from_slice(&0u64.to_be_bytes());
    ws.send_bytes(Bytes::from(frame)).await;

    let mut buf = [0u8; 1];
    assert_eq!(ssh.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn the_session_cap_maps_to_service_unavailable() {
    let relay = TestRelay::start(1, Some(Duration::from_millis(200))).await;
    relay.proxy().await.assert_status_ok();
    relay
        .proxy()
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    // once the first session expires and is reaped, a slot frees up
    tokio::time::sleep(Duration::from_millis(500)).await;
    relay.proxy().await.assert_status_ok();
}
