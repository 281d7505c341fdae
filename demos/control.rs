/**
 * Device Control Example
 *
 * This example connects to a Yeelight device, runs a few commands and prints
 * the notifications it pushes back.
 *
 * Usage: cargo run --example control -- <host> [port]
 */
use futures_util::StreamExt;
use rustylight::{ColorFlow, Device, DeviceEvent, FlowEndAction, Property, Rgb, Transition};
use std::time::Duration;

#[tokio::main]
async fn main() {
    env_logger::init();
    println!("--- Rustylight - Device Control ---");

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.1.20".to_string());
    let port = args.next().and_then(|p| p.parse().ok()).unwrap_or(55443);

    // 1. Build the device with automatic reconnection
    let device = Device::builder(host.as_str())
        .port(port)
        .reconnect(true)
        .build();

    // 2. Print notifications in the background
    let stream = device.stream();
    tokio::spawn(async move {
        tokio::pin!(stream);
        while let Some(event) = stream.next().await {
            match event {
                DeviceEvent::Notification(n) => println!("[EVENT] {}: {:?}", n.method, n.params),
                DeviceEvent::Error(e) => eprintln!("[ERROR] {}", e),
                other => println!("[EVENT] {:?}", other),
            }
        }
    });

    // 3. Connect and seed the property cache
    match device.connect().await {
        Ok(true) => println!("[INFO] Connected to {}:{}", host, port),
        Ok(false) => {
            eprintln!("[ERROR] Device at {}:{} did not respond", host, port);
            return;
        }
        Err(e) => {
            eprintln!("[ERROR] Connection failed: {}", e);
            return;
        }
    }
    println!(
        "[INFO] Power: {:?}, Brightness: {:?}",
        device.property(Property::Power),
        device.property(Property::Bright)
    );

    // 4. Run a few commands
    let smooth = Transition::smooth_ms(500);
    let steps = [
        ("turn on", device.turn_on(smooth).await),
        ("brightness 60", device.set_brightness(60, smooth).await),
        ("warm white", device.set_color_temperature(2700, smooth).await),
        ("red", device.set_rgb_color(Rgb::new(255, 0, 0), smooth).await),
    ];
    for (label, outcome) in steps {
        match outcome {
            Ok(ok) => println!("[INFO] {} -> {}", label, ok),
            Err(e) => eprintln!("[ERROR] {} failed: {}", label, e),
        }
    }

    // 5. A short color flow that ends where it started
    let flow = ColorFlow::new()
        .rgb(Rgb::new(0, 0, 255), 80, Duration::from_millis(800))
        .temperature(4000, 50, Duration::from_millis(800))
        .repeat(2)
        .end_action(FlowEndAction::Recover);
    if let Err(e) = device.start_color_flow(&flow).await {
        eprintln!("[ERROR] Color flow failed: {}", e);
    }

    tokio::time::sleep(Duration::from_secs(5)).await;
    device.disconnect().await;
    println!("[INFO] Done. Stats: {:?}", device.stats());
}
