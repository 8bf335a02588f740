//! End-to-end tests through a running proxy.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use socks_proxy::dns::StaticResolver;
use socks_proxy::observability::metrics as keys;

mod common;

use common::*;

#[tokio::test]
async fn ipv4_connect_relays_both_ways() {
    let echo = start_echo_server().await;
    let proxy = start_proxy(test_config(), Arc::new(StaticResolver::default())).await;

    let (mut stream, reply) = request(proxy.addr, &connect_ipv4(echo)).await;
    assert_eq!(reply, REPLY_SUCCEEDED);

    stream.write_all(b"hello").await.unwrap();
    let mut echoed = [0u8; 5];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello");

    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    assert_eq!(eventually_counter(&proxy.emitter, keys::BYTES_SENT, 5).await, 5);
    assert_eq!(eventually_counter(&proxy.emitter, keys::BYTES_RECEIVED, 5).await, 5);
    assert_eq!(proxy.emitter.timing_count(keys::TARGET_DIAL_DURATION), 1);
    proxy.stop().await;
}

#[tokio::test]
async fn domain_connect_uses_resolver() {
    let echo = start_echo_server().await;
    let resolver = StaticResolver::default().with("echo.test", IpAddr::from([127, 0, 0, 1]));
    let proxy = start_proxy(test_config(), Arc::new(resolver)).await;

    let (mut stream, reply) = request(proxy.addr, &connect_domain("echo.test", echo.port())).await;
    assert_eq!(reply, REPLY_SUCCEEDED);

    stream.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
    proxy.stop().await;
}

#[tokio::test]
async fn unresolvable_domain_is_refused() {
    let proxy = start_proxy(test_config(), Arc::new(StaticResolver::default())).await;

    let (mut stream, reply) = request(proxy.addr, &connect_domain("missing.test", 80)).await;
    assert_eq!(reply, REPLY_CONNECTION_REFUSED);

    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest).await;
    assert!(rest.is_empty());
    assert_eq!(eventually_counter(&proxy.emitter, keys::ERRORS_DNS_RESOLVE, 1).await, 1);
    proxy.stop().await;
}

#[tokio::test]
async fn refused_target_gets_refused_reply() {
    let target = closed_port().await;
    let proxy = start_proxy(test_config(), Arc::new(StaticResolver::default())).await;

    let (_stream, reply) = request(proxy.addr, &connect_ipv4(target)).await;
    assert_eq!(reply, REPLY_CONNECTION_REFUSED);

    assert_eq!(eventually_counter(&proxy.emitter, keys::ERRORS_CONNECTION_REFUSED, 1).await, 1);
    assert_eq!(proxy.emitter.timing_count(keys::TARGET_DIAL_DURATION), 0);
    proxy.stop().await;
}

#[tokio::test]
async fn bind_and_udp_associate_are_not_supported() {
    let proxy = start_proxy(test_config(), Arc::new(StaticResolver::default())).await;

    for command in [2u8, 3] {
        let mut unsupported = connect_ipv4("127.0.0.1:80".parse().unwrap());
        unsupported[1] = command;
        let (_stream, reply) = request(proxy.addr, &unsupported).await;
        assert_eq!(reply, REPLY_COMMAND_NOT_SUPPORTED, "command {command}");
    }

    assert_eq!(eventually_counter(&proxy.emitter, keys::ERRORS_COMMAND, 2).await, 2);
    proxy.stop().await;
}

#[tokio::test]
async fn wrong_greeting_version_gets_general_failure() {
    let proxy = start_proxy(test_config(), Arc::new(StaticResolver::default())).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    stream.write_all(&[4, 1, 0]).await.unwrap();
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, REPLY_GENERAL_FAILURE);

    assert_eq!(eventually_counter(&proxy.emitter, keys::ERRORS_VERSION, 1).await, 1);
    proxy.stop().await;
}

#[tokio::test]
async fn unauthorized_client_is_closed_silently() {
    let mut config = test_config();
    config.listener.allowed_ip = Some("10.0.0.5".parse().unwrap());
    let proxy = start_proxy(config, Arc::new(StaticResolver::default())).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    let mut received = Vec::new();
    let _ = stream.read_to_end(&mut received).await;
    assert!(received.is_empty());

    assert_eq!(eventually_counter(&proxy.emitter, keys::ERRORS_UNAUTHORIZED_IP, 1).await, 1);
    assert_eq!(proxy.emitter.counter(keys::ERRORS_GREETING), 0);
    proxy.stop().await;
}

#[tokio::test]
async fn client_half_close_still_receives_response() {
    let target = start_reply_after_eof_server(b"done").await;
    let proxy = start_proxy(test_config(), Arc::new(StaticResolver::default())).await;

    let (mut stream, reply) = request(proxy.addr, &connect_ipv4(target)).await;
    assert_eq!(reply, REPLY_SUCCEEDED);

    stream.write_all(b"request").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"done");

    assert_eq!(eventually_counter(&proxy.emitter, keys::BYTES_SENT, 7).await, 7);
    assert_eq!(eventually_counter(&proxy.emitter, keys::BYTES_RECEIVED, 4).await, 4);
    assert_eq!(proxy.emitter.counter(keys::ERRORS_COPY_TO_TARGET), 0);
    assert_eq!(proxy.emitter.counter(keys::ERRORS_COPY_TO_CLIENT), 0);
    proxy.stop().await;
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let proxy = start_proxy(test_config(), Arc::new(StaticResolver::default())).await;
    let addr = proxy.addr;
    proxy.stop().await;

    assert!(TcpStream::connect(addr).await.is_err());
}
