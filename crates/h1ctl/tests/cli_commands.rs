#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::Command;
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use h1ctl::frame::encode_json_message;
use serde_json::{json, Value};

/// Loopback stand-in for the recorder. Answers one client connection and
/// returns every command it received once the client hangs up.
struct FakeDevice {
    port: u16,
    thread: JoinHandle<Vec<Value>>,
}

impl FakeDevice {
    fn start(answer: fn(&Value) -> Option<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        let thread = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept should succeed");
            let mut seen = Vec::new();
            while let Some(command) = read_command(&mut stream) {
                if let Some(reply) = answer(&command) {
                    write_reply(&mut stream, &reply);
                }
                seen.push(command);
            }
            seen
        });
        Self { port, thread }
    }

    fn commands(self) -> Vec<Value> {
        self.thread.join().expect("device thread should not panic")
    }
}

fn read_command(stream: &mut TcpStream) -> Option<Value> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).ok()?;
    let mut payload = vec![0u8; (u32::from_be_bytes(len) as usize).checked_sub(4)?];
    stream.read_exact(&mut payload).ok()?;
    serde_json::from_slice(payload.get(4..)?).ok()
}

fn write_reply(stream: &mut TcpStream, reply: &Value) {
    let mut buf = BytesMut::new();
    encode_json_message(reply.to_string().as_bytes(), &mut buf).expect("encode reply");
    let _ = stream.write_all(&buf);
}

fn ack(command: &Value) -> Option<Value> {
    Some(json!({"command": command["command"], "status": 0}))
}

fn h1ctl(port: u16) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_h1ctl"));
    cmd.env_remove("H1CTL_HOST")
        .env("H1CTL_PORT", port.to_string())
        .args(["--log-level", "error", "--format", "json"]);
    cmd
}

const FAST: [&str; 6] = [
    "--poll-interval",
    "5ms",
    "--retry-interval",
    "10ms",
    "--retry-attempts",
    "50",
];

#[test]
fn record_workflow_against_fake_device() {
    let device = FakeDevice::start(ack);

    let output = h1ctl(device.port)
        .args(["record", "127.0.0.1", "--camera", "2", "--count", "2", "--clip-length", "0"])
        .args(["--warm-up", "10ms", "--inter-clip", "10ms", "--upload-delay", "10ms"])
        .arg("--upload")
        .args(FAST)
        .output()
        .expect("record should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_slice(&output.stdout).expect("json report on stdout");
    assert_eq!(report["camera"], 2);
    assert_eq!(report["sequence"]["clips"], 2);
    assert_eq!(report["sequence"]["start_failures"], 0);
    assert_eq!(report["upload"]["status"], 0);

    assert_eq!(
        device.commands(),
        vec![
            json!({"command": "record", "camera": 2}),
            json!({"command": "stoprecord", "camera": 2}),
            json!({"command": "record", "camera": 2}),
            json!({"command": "stoprecord", "camera": 2}),
            json!({"command": "upload", "icv": true}),
        ]
    );
}

#[test]
fn status_prints_reply_fields() {
    let device = FakeDevice::start(|_| {
        Some(json!({"command": "status", "status": 0, "recording": false}))
    });

    let output = h1ctl(device.port)
        .args(["status", "127.0.0.1"])
        .args(FAST)
        .output()
        .expect("status should run");

    assert!(output.status.success());
    let reply: Value = serde_json::from_slice(&output.stdout).expect("json reply on stdout");
    assert_eq!(reply["host"], "127.0.0.1");
    assert_eq!(reply["command"], "status");
    assert_eq!(reply["recording"], false);
    assert_eq!(device.commands(), vec![json!({"command": "status"})]);
}

#[test]
fn rejected_command_exits_with_failure() {
    let device = FakeDevice::start(|cmd| Some(json!({"command": cmd["command"], "status": 7})));

    let output = h1ctl(device.port)
        .args(["send", "127.0.0.1", "--command", "bookmark", "--field", "camera=1"])
        .args(FAST)
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("status 7"));
    assert_eq!(
        device.commands(),
        vec![json!({"command": "bookmark", "camera": 1})]
    );
}

#[test]
fn unanswered_command_times_out_with_124() {
    let device = FakeDevice::start(|_| None);

    let output = h1ctl(device.port)
        .args(["ping", "127.0.0.1", "--retry-attempts", "3", "--retry-interval", "10ms"])
        .output()
        .expect("ping should run");

    assert_eq!(output.status.code(), Some(124));
    assert_eq!(device.commands().len(), 1);
}

#[test]
fn refused_connection_exits_with_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let output = h1ctl(port)
        .args(["record", "127.0.0.1", "--warm-up", "10ms"])
        .output()
        .expect("record should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_h1ctl"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with(&format!("h1ctl {}", env!("CARGO_PKG_VERSION"))));
}
