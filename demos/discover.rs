/**
 * Discovery Example (Async Stream)
 *
 * This example demonstrates how to find Yeelight devices on the local network
 * and print them as replies arrive.
 */
use tokio_stream::StreamExt;
use rustylight::Scanner;
use std::time::Duration;

#[tokio::main]
async fn main() {
    env_logger::init();
    println!("--- Rustylight - Discovery ---");
    println!("[INFO] Probing the network for Yeelight devices...");

    // 1. Create a scanner with a two second listen window
    let scanner = Scanner::new().with_timeout(Duration::from_secs(2));

    // 2. Print devices in real time while the scan runs
    let stream = scanner.stream();
    let printer = tokio::spawn(async move {
        tokio::pin!(stream);
        let mut count = 0;
        while let Some(device) = stream.next().await {
            count += 1;
            println!(
                "[{}] Found Device: HOST={}:{}, ID={:?}, MODEL={}",
                count, device.hostname, device.port, device.id, device.model
            );
        }
    });

    // 3. Wait for the scan to finish
    match scanner.discover().await {
        Ok(found) => println!("[INFO] Scan finished. Total devices found: {}", found.len()),
        Err(e) => eprintln!("[ERROR] Discovery failed: {}", e),
    }
    drop(scanner);
    let _ = printer.await;
}
