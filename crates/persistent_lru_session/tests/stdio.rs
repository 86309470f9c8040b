use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};

use serde_json::{json, Value};

struct SessionServer {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<std::process::ChildStdout>,
}

impl SessionServer {
    fn start() -> Self {
        let bin = env!("CARGO_BIN_EXE_lru-session");
        let mut child = Command::new(bin)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .expect("spawn session server");

        let stdin = child.stdin.take().expect("take stdin");
        let stdout = child.stdout.take().expect("take stdout");

        Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        }
    }

    fn send(&mut self, message: &Value) -> Value {
        self.notify(message);

        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read response");
        assert!(!line.trim().is_empty(), "empty response");
        serde_json::from_str(&line).expect("parse response")
    }

    fn notify(&mut self, message: &Value) {
        let text = serde_json::to_string(message).expect("serialize request");
        let stdin = self.stdin.as_mut().expect("stdin available");
        writeln!(stdin, "{}", text).expect("write request");
        stdin.flush().expect("flush request");
    }

    fn call(&mut self, id: u64, method: &str, params: Value) -> Value {
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
    }

    fn shutdown(mut self) {
        self.stdin.take();
        let _ = self.child.wait();
    }
}

fn create(server: &mut SessionServer, capacity: i64) {
    let response = server.call(1, "cache/create", json!({ "capacity": capacity }));
    assert_eq!(response["result"]["version"], 0);
    assert_eq!(response["result"]["capacity"], capacity);
}

#[test]
fn initialize_lists_methods() {
    let mut server = SessionServer::start();
    let response = server.call(1, "initialize", json!({}));

    assert_eq!(response["result"]["serverInfo"]["name"], "lru-session");
    let methods = response["result"]["methods"]
        .as_array()
        .expect("methods array");
    for name in ["cache/create", "cache/put", "cache/get", "cache/checkout"] {
        assert!(methods.iter().any(|method| method == name));
    }

    let response = server.call(2, "ping", json!({}));
    assert_eq!(response["result"], json!({}));

    server.shutdown();
}

#[test]
fn put_get_evicts_least_recently_used() {
    let mut server = SessionServer::start();
    create(&mut server, 2);

    let response = server.call(2, "cache/put", json!({ "key": "a", "value": 1 }));
    assert_eq!(response["result"]["version"], 1);
    assert_eq!(response["result"]["evicted"], Value::Null);

    server.call(3, "cache/put", json!({ "key": "b", "value": 2 }));

    let response = server.call(4, "cache/get", json!({ "key": "a" }));
    assert_eq!(response["result"]["hit"], true);
    assert_eq!(response["result"]["value"], 1);
    assert_eq!(response["result"]["version"], 3);

    let response = server.call(5, "cache/put", json!({ "key": "c", "value": 3 }));
    assert_eq!(response["result"]["evicted"], json!({ "key": "b", "value": 2 }));
    assert_eq!(response["result"]["len"], 2);

    let response = server.call(6, "cache/snapshot", json!({}));
    assert_eq!(response["result"]["version"], 4);
    assert_eq!(
        response["result"]["entries"],
        json!([{ "key": "a", "value": 1 }, { "key": "c", "value": 3 }])
    );

    server.shutdown();
}

#[test]
fn miss_and_peek_do_not_commit() {
    let mut server = SessionServer::start();
    create(&mut server, 2);
    server.call(2, "cache/put", json!({ "key": "a", "value": "x" }));

    let response = server.call(3, "cache/get", json!({ "key": "zzz" }));
    assert_eq!(response["result"]["hit"], false);
    assert_eq!(response["result"]["version"], 1);

    let response = server.call(4, "cache/peek", json!({ "key": "a" }));
    assert_eq!(response["result"]["value"], "x");
    assert_eq!(response["result"]["version"], 1);

    let response = server.call(5, "cache/remove", json!({ "key": "missing" }));
    assert_eq!(response["result"]["removed"], Value::Null);
    assert_eq!(response["result"]["version"], 1);

    let response = server.call(6, "cache/remove", json!({ "key": "a" }));
    assert_eq!(response["result"]["removed"], "x");
    assert_eq!(response["result"]["version"], 2);

    server.shutdown();
}

#[test]
fn old_versions_remain_readable_and_checkout_appends() {
    let mut server = SessionServer::start();
    create(&mut server, 1);
    server.call(2, "cache/put", json!({ "key": "x", "value": 1 }));
    let response = server.call(3, "cache/put", json!({ "key": "y", "value": 2 }));
    assert_eq!(response["result"]["evicted"], json!({ "key": "x", "value": 1 }));

    let response = server.call(4, "cache/snapshot", json!({ "version": 1 }));
    assert_eq!(response["result"]["entries"], json!([{ "key": "x", "value": 1 }]));

    let response = server.call(5, "cache/checkout", json!({ "version": 1 }));
    assert_eq!(response["result"], json!({ "version": 3, "from": 1 }));

    let response = server.call(6, "cache/history", json!({}));
    assert_eq!(response["result"]["head"], 3);
    let versions = response["result"]["versions"].as_array().expect("versions");
    assert_eq!(versions.len(), 4);
    assert_eq!(versions[2]["next_stamp"], 2);
    assert_eq!(versions[3]["next_stamp"], 1);

    let response = server.call(7, "cache/get", json!({ "key": "x" }));
    assert_eq!(response["result"]["value"], 1);

    server.shutdown();
}

#[test]
fn zero_capacity_reports_offered_pair() {
    let mut server = SessionServer::start();
    create(&mut server, 0);

    let response = server.call(2, "cache/put", json!({ "key": 7, "value": true }));
    assert_eq!(response["result"]["evicted"], json!({ "key": "7", "value": true }));
    assert_eq!(response["result"]["len"], 0);

    server.shutdown();
}

#[test]
fn errors_use_jsonrpc_codes() {
    let mut server = SessionServer::start();

    let response = server.call(1, "cache/get", json!({ "key": "a" }));
    assert_eq!(response["error"]["code"], -32002);

    let response = server.call(2, "cache/create", json!({ "capacity": -1 }));
    assert_eq!(response["error"]["code"], -32602);

    create(&mut server, 1);

    let response = server.call(3, "cache/put", json!({ "key": "a" }));
    assert_eq!(response["error"]["code"], -32602);

    let response = server.call(4, "cache/put", json!({ "key": [1], "value": 1 }));
    assert_eq!(response["error"]["code"], -32602);

    let response = server.call(5, "cache/checkout", json!({ "version": 9 }));
    assert_eq!(response["error"]["code"], -32602);

    let response = server.call(6, "cache/unknown", json!({}));
    assert_eq!(response["error"]["code"], -32601);

    let response = server.send(&json!({ "jsonrpc": "2.0", "id": 7 }));
    assert_eq!(response["error"]["code"], -32600);

    server.shutdown();
}

#[test]
fn notifications_apply_without_reply() {
    let mut server = SessionServer::start();
    create(&mut server, 2);

    server.notify(&json!({
        "jsonrpc": "2.0",
        "method": "cache/put",
        "params": { "key": "quiet", "value": 1 }
    }));

    let response = server.call(2, "cache/peek", json!({ "key": "quiet" }));
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"]["value"], 1);

    server.shutdown();
}

#[test]
fn content_length_framing_is_mirrored() {
    let mut server = SessionServer::start();

    let body = serde_json::to_string(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "ping"
    }))
    .expect("serialize request");
    {
        let stdin = server.stdin.as_mut().expect("stdin available");
        write!(stdin, "Content-Length: {}\r\n\r\n{}", body.len(), body).expect("write request");
        stdin.flush().expect("flush request");
    }

    let mut header = String::new();
    server.stdout.read_line(&mut header).expect("read header");
    let length: usize = header
        .trim()
        .strip_prefix("Content-Length:")
        .expect("content length header")
        .trim()
        .parse()
        .expect("length");
    let mut blank = String::new();
    server.stdout.read_line(&mut blank).expect("read separator");
    assert_eq!(blank, "\r\n");

    let mut buffer = vec![0u8; length];
    server.stdout.read_exact(&mut buffer).expect("read body");
    let response: Value = serde_json::from_slice(&buffer).expect("parse response");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"], json!({}));

    server.shutdown();
}

#[test]
fn malformed_messages_get_error_replies() {
    let mut server = SessionServer::start();

    {
        let stdin = server.stdin.as_mut().expect("stdin available");
        writeln!(stdin, "{{not json").expect("write request");
        stdin.flush().expect("flush request");
    }
    let mut line = String::new();
    server.stdout.read_line(&mut line).expect("read response");
    let response: Value = serde_json::from_str(&line).expect("parse response");
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    let response = server.send(&json!([{ "jsonrpc": "2.0", "id": 2, "method": "ping" }]));
    assert_eq!(response["error"]["code"], -32600);
    assert_eq!(response["id"], Value::Null);

    let response = server.call(3, "ping", json!({}));
    assert_eq!(response["id"], 3);

    server.shutdown();
}

#[test]
fn oversized_content_length_exits_cleanly() {
    let bin = env!("CARGO_BIN_EXE_lru-session");
    let mut child = Command::new(bin)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn session server");

    {
        let mut stdin = child.stdin.take().expect("take stdin");
        write!(stdin, "Content-Length: 18446744073709551615\r\n\r\n{{}}").expect("write request");
    }

    let output = child.wait_with_output().expect("wait for server");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Content-Length"), "stderr: {}", stderr);
    assert!(!stderr.contains("panicked"), "stderr: {}", stderr);
}

#[test]
fn max_versions_bounds_history() {
    let mut server = SessionServer::start();
    let response = server.call(
        1,
        "cache/create",
        json!({ "capacity": 4, "max_versions": 2 }),
    );
    assert_eq!(response["result"]["max_versions"], 2);

    for (id, key) in [(2, "a"), (3, "b"), (4, "c")] {
        server.call(id, "cache/put", json!({ "key": key, "value": id }));
    }

    let response = server.call(5, "cache/history", json!({}));
    assert_eq!(response["result"]["head"], 3);
    assert_eq!(response["result"]["oldest"], 2);
    let versions = response["result"]["versions"].as_array().expect("versions");
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version"], 2);

    let response = server.call(6, "cache/snapshot", json!({ "version": 1 }));
    assert_eq!(response["error"]["code"], -32602);

    let response = server.call(7, "cache/create", json!({ "capacity": 1, "max_versions": 0 }));
    assert_eq!(response["error"]["code"], -32602);

    server.shutdown();
}
