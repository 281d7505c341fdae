mod common;

use common::init_logging;
use futures_util::StreamExt;
use rustylight::protocol::Method;
use rustylight::{Model, Property, Scanner};
use serde_json::json;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;

fn reply(port: u16) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Cache-Control: max-age=3600\r\n\
         Location: yeelight://127.0.0.1:{}\r\n\
         id: 0x0000000002dfb19a\r\n\
         model: stripe\r\n\
         support: get_prop set_power toggle set_rgb\r\n\
         power: off\r\n\
         name: shelf\r\n",
        port
    )
}

/// Answers every probe three times, each time announcing a different port.
async fn spawn_responder() -> SocketAddrV4 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = match socket.local_addr().unwrap() {
        SocketAddr::V4(v4) => v4,
        SocketAddr::V6(_) => unreachable!(),
    };

    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            let probe = String::from_utf8_lossy(&buf[..len]);
            if !probe.contains("wifi_bulb") {
                continue;
            }
            for port in [55443, 55444, 55445] {
                let _ = socket.send_to(reply(port).as_bytes(), from).await;
            }
        }
    });
    addr
}

#[tokio::test]
async fn repeated_replies_yield_one_device() {
    init_logging();
    let target = spawn_responder().await;
    let scanner = Scanner::new()
        .with_target(target)
        .with_timeout(Duration::from_millis(300));

    let mut events = Box::pin(scanner.stream());
    let found = scanner.discover_on([Ipv4Addr::LOCALHOST]).await.unwrap();

    assert_eq!(found.len(), 1);
    let device = &found[0];
    assert_eq!(device.hostname, "127.0.0.1");
    assert_eq!(device.model, Model::Stripe);
    assert_eq!(device.id.as_deref(), Some("0x0000000002dfb19a"));
    assert!(device.supports(Method::SetRgbColor));
    assert!(!device.supports(Method::SetScene));
    assert_eq!(device.properties.get(&Property::Name), Some(&json!("shelf")));

    let first = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.hostname, "127.0.0.1");
    let second = tokio::time::timeout(Duration::from_millis(200), events.next()).await;
    assert!(second.is_err(), "only one event per hostname");
}

#[tokio::test]
async fn silent_network_finds_nothing() {
    init_logging();
    // Bound but never answering.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = match silent.local_addr().unwrap() {
        SocketAddr::V4(v4) => v4,
        SocketAddr::V6(_) => unreachable!(),
    };

    let found = Scanner::new()
        .with_target(target)
        .with_attempts(1)
        .with_timeout(Duration::from_millis(150))
        .discover_on([Ipv4Addr::LOCALHOST])
        .await
        .unwrap();
    assert!(found.is_empty());
}
