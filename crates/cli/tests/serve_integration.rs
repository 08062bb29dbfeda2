//! Integration tests for the `osb-broker serve` HTTP API.
//!
//! Each test starts the broker as a child process on a unique port with a
//! temporary config and catalog, then speaks raw HTTP to it.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tempfile::TempDir;

const SERVICE_ID: &str = "0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";
const PLAN_ID: &str = "5e6f7a8b-9c0d-4e1f-8a2b-3c4d5e6f7a8b";
const USER: &str = "broker";
const PASSWORD: &str = "hunter2";

/// Base port is derived from the process id so separate test binaries
/// don't collide on the same range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 21000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// A running broker; killed when dropped.
struct Broker {
    child: Child,
    port: u16,
    _dir: TempDir,
}

impl Drop for Broker {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn start_broker() -> Broker {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("services.json");
    fs::write(
        &catalog,
        json!({
            "services": [{
                "id": SERVICE_ID,
                "name": "csb-db",
                "description": "a database",
                "bindable": true,
                "plans": [{"id": PLAN_ID, "name": "small"}],
                "provision_input_variables": [{"field_name": "size", "type": "string", "details": "size"}]
            }]
        })
        .to_string(),
    )
    .unwrap();

    let config = dir.path().join("broker.toml");
    fs::write(
        &config,
        format!(
            "[api]\nhost = \"127.0.0.1\"\nuser = \"{USER}\"\npassword = \"{PASSWORD}\"\n\n[catalog]\npaths = [{:?}]\n",
            catalog.display().to_string()
        ),
    )
    .unwrap();

    let port = next_port();
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_osb-broker"));
    cmd.arg("--config")
        .arg(&config)
        .arg("serve")
        .arg("--port")
        .arg(port.to_string());
    for var in [
        "SECURITY_USER_NAME",
        "SECURITY_USER_PASSWORD",
        "CH_CRED_HUB_URL",
        "CH_UAA_URL",
    ] {
        cmd.env_remove(var);
    }
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = cmd.spawn().expect("failed to start osb-broker");
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Broker {
        child,
        port,
        _dir: dir,
    }
}

/// Send one request and return (status, parsed JSON body).
fn request(broker: &Broker, method: &str, path: &str, body: Option<Value>, auth: bool) -> (u16, Value) {
    let mut stream = TcpStream::connect(("127.0.0.1", broker.port)).expect("failed to connect");
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let mut head = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        broker.port,
        body.len()
    );
    if auth {
        let token = BASE64.encode(format!("{USER}:{PASSWORD}"));
        head.push_str(&format!("Authorization: Basic {token}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes()).unwrap();
    stream.write_all(body.as_bytes()).unwrap();

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    parse_response(&response)
}

fn parse_response(response: &str) -> (u16, Value) {
    let (headers, body) = response.split_once("\r\n\r\n").unwrap_or((response, ""));
    let status = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = if headers.to_lowercase().contains("transfer-encoding: chunked") {
        decode_chunked(body)
    } else {
        body.to_string()
    };
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

fn decode_chunked(mut data: &str) -> String {
    let mut result = String::new();
    while let Some(line_end) = data.find("\r\n") {
        let Ok(size) = usize::from_str_radix(data[..line_end].trim(), 16) else {
            break;
        };
        if size == 0 {
            break;
        }
        let start = line_end + 2;
        let end = (start + size).min(data.len());
        result.push_str(&data[start..end]);
        data = data.get(end + 2..).unwrap_or("");
    }
    result
}

#[test]
fn catalog_requires_basic_auth() {
    let broker = start_broker();

    let (status, body) = request(&broker, "GET", "/v2/catalog", None, false);
    assert_eq!(status, 401);
    assert_eq!(body["description"], "unauthorized");

    let (status, body) = request(&broker, "GET", "/v2/catalog", None, true);
    assert_eq!(status, 200);
    assert_eq!(body["services"][0]["id"], SERVICE_ID);
    assert_eq!(body["services"][0]["name"], "csb-db");
}

#[test]
fn lifecycle_over_http() {
    let broker = start_broker();
    let instance = "/v2/service_instances/inst-1";

    let (status, body) = request(
        &broker,
        "PUT",
        &format!("{instance}?accepts_incomplete=true"),
        Some(json!({
            "service_id": SERVICE_ID,
            "plan_id": PLAN_ID,
            "parameters": {"size": "large"}
        })),
        true,
    );
    assert_eq!(status, 202, "{body}");
    assert_eq!(body["operation"], "tf:inst-1:");

    let (status, body) = request(&broker, "GET", &format!("{instance}/last_operation"), None, true);
    assert_eq!(status, 200);
    assert_eq!(body["state"], "succeeded");

    let binding = format!("{instance}/service_bindings/bind-1");
    let (status, body) = request(
        &broker,
        "PUT",
        &binding,
        Some(json!({"service_id": SERVICE_ID, "plan_id": PLAN_ID})),
        true,
    );
    assert_eq!(status, 201, "{body}");
    assert!(body["credentials"].is_object());

    let (status, _) = request(
        &broker,
        "PUT",
        &binding,
        Some(json!({"service_id": SERVICE_ID, "plan_id": PLAN_ID})),
        true,
    );
    assert_eq!(status, 409);

    let query = format!("service_id={SERVICE_ID}&plan_id={PLAN_ID}");
    let (status, body) = request(&broker, "DELETE", &format!("{binding}?{query}"), None, true);
    assert_eq!(status, 200);
    assert_eq!(body, json!({}));

    let (status, body) = request(
        &broker,
        "DELETE",
        &format!("{instance}?accepts_incomplete=true&{query}"),
        None,
        true,
    );
    assert_eq!(status, 202, "{body}");

    let (status, body) = request(&broker, "GET", &format!("{instance}/last_operation"), None, true);
    assert_eq!(status, 200);
    assert_eq!(body["state"], "succeeded");

    let (status, _) = request(&broker, "GET", &format!("{instance}/last_operation"), None, true);
    assert_eq!(status, 410);
}

#[test]
fn unknown_parameters_are_rejected() {
    let broker = start_broker();
    let (status, body) = request(
        &broker,
        "PUT",
        "/v2/service_instances/inst-2?accepts_incomplete=true",
        Some(json!({
            "service_id": SERVICE_ID,
            "plan_id": PLAN_ID,
            "parameters": {"colour": "blue"}
        })),
        true,
    );
    assert_eq!(status, 400);
    assert!(body["description"].as_str().unwrap().contains("colour"));
}
