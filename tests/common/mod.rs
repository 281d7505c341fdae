//! Simulated Yeelight bulb listening on loopback TCP.

#![allow(dead_code)]

use parking_lot::Mutex;
use rustylight::protocol::{Command, CommandResult, decode_command};
use rustylight::{DeviceBuilder, Method, Property};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// How the bulb answers one command.
pub enum Reply {
    Ok(Value),
    Error(i64, &'static str),
    Delayed(Duration, Value),
    Ignore,
}

enum Control {
    Send(String),
    Close,
}

type Handler = Arc<dyn Fn(&Command) -> Reply + Send + Sync>;

pub struct FakeBulb {
    pub addr: SocketAddr,
    control: mpsc::UnboundedSender<Control>,
    received: Arc<Mutex<Vec<Command>>>,
    connections: Arc<AtomicUsize>,
}

/// Answers `get_prop` from a fixed table and everything else with `["ok"]`.
pub fn default_reply(cmd: &Command) -> Reply {
    match cmd.method {
        Method::GetProp => Reply::Ok(prop_values(cmd)),
        _ => Reply::Ok(json!(["ok"])),
    }
}

pub fn prop_values(cmd: &Command) -> Value {
    let values: Vec<Value> = cmd
        .params
        .iter()
        .map(|p| {
            let value = match p.as_str().and_then(Property::from_wire) {
                Some(Property::Power) => "on",
                Some(Property::Bright) => "80",
                Some(Property::Ct) => "4000",
                Some(Property::ColorMode) => "2",
                Some(Property::Name) => "desk",
                _ => "",
            };
            json!(value)
        })
        .collect();
    Value::Array(values)
}

impl FakeBulb {
    pub async fn start() -> Self {
        Self::with_handler(default_reply).await
    }

    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Command) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (control, mut control_rx) = mpsc::unbounded_channel();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handler: Handler = Arc::new(handler);

        let log = received.clone();
        let count = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                let (reader, writer) = stream.into_split();
                let writer = Arc::new(tokio::sync::Mutex::new(writer));
                let mut lines = BufReader::new(reader).lines();

                loop {
                    tokio::select! {
                        line = lines.next_line() => {
                            let Ok(Some(line)) = line else { break };
                            let Ok(cmd) = decode_command(&line) else { continue };
                            log.lock().push(cmd.clone());
                            match handler(&cmd) {
                                Reply::Ok(v) => {
                                    write_line(&writer, result_line(CommandResult::ok(cmd.id, v))).await;
                                }
                                Reply::Error(code, msg) => {
                                    write_line(&writer, result_line(CommandResult::failed(cmd.id, code, msg))).await;
                                }
                                Reply::Delayed(delay, v) => {
                                    let writer = writer.clone();
                                    tokio::spawn(async move {
                                        tokio::time::sleep(delay).await;
                                        write_line(&writer, result_line(CommandResult::ok(cmd.id, v))).await;
                                    });
                                }
                                Reply::Ignore => {}
                            }
                        }
                        ctl = control_rx.recv() => {
                            match ctl {
                                Some(Control::Send(text)) => write_line(&writer, text).await,
                                Some(Control::Close) | None => break,
                            }
                        }
                    }
                }
                let _ = writer.lock().await.shutdown().await;
            }
        });

        Self {
            addr,
            control,
            received,
            connections,
        }
    }

    pub fn device(&self) -> DeviceBuilder {
        DeviceBuilder::new(self.addr.ip().to_string()).port(self.addr.port())
    }

    /// Writes a raw line to the current connection.
    pub fn push_line(&self, line: &str) {
        let _ = self.control.send(Control::Send(line.to_string()));
    }

    /// Drops the current connection; the bulb keeps accepting new ones.
    pub fn close_connection(&self) {
        let _ = self.control.send(Control::Close);
    }

    pub fn received(&self) -> Vec<Command> {
        self.received.lock().clone()
    }

    pub fn received_for(&self, method: Method) -> Vec<Command> {
        self.received()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn result_line(result: CommandResult) -> String {
    serde_json::to_string(&result).unwrap()
}

async fn write_line(writer: &tokio::sync::Mutex<OwnedWriteHalf>, text: String) {
    let mut guard = writer.lock().await;
    let _ = guard.write_all(format!("{}\r\n", text).as_bytes()).await;
}
