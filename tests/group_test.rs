mod common;

use common::{FakeBulb, init_logging};
use futures_util::StreamExt;
use rustylight::{Device, DeviceEvent, DeviceGroup, Method, Transition};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn commands_fan_out_to_every_member() {
    init_logging();
    let first = FakeBulb::start().await;
    let second = FakeBulb::start().await;

    let group = DeviceGroup::new("hall");
    group.add(first.device().build()).await.unwrap();
    group
        .add(Device::builder("localhost").port(second.addr.port()).build())
        .await
        .unwrap();

    let mut events = Box::pin(group.stream());
    assert!(group.connect_all().await);
    assert!(group.list().await.values().all(|connected| *connected));

    let mut connected_hosts = Vec::new();
    while connected_hosts.len() < 2 {
        let event = tokio::time::timeout(Duration::from_secs(2), events.next())
            .await
            .expect("connected events")
            .unwrap();
        if matches!(event.event, DeviceEvent::Connected) {
            connected_hosts.push(event.hostname);
        }
    }
    connected_hosts.sort();
    assert_eq!(connected_hosts, vec!["127.0.0.1", "localhost"]);

    assert!(group.set_brightness(40, Transition::smooth_ms(200)).await);
    for bulb in [&first, &second] {
        let sent = bulb.received_for(Method::SetBrightness);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].params, vec![json!(40), json!("smooth"), json!(200)]);
    }

    group.disconnect_all().await;
    assert!(group.list().await.values().all(|connected| !*connected));
}

#[tokio::test]
async fn removed_members_are_left_alone() {
    init_logging();
    let bulb = FakeBulb::start().await;
    let group = DeviceGroup::new("porch");
    group.add(bulb.device().build()).await.unwrap();

    let device = group.remove("127.0.0.1").await.unwrap();
    assert!(group.toggle().await);
    assert!(device.connect().await.unwrap());
    assert!(bulb.received_for(Method::Toggle).is_empty());
    device.disconnect().await;
}
