#![cfg(unix)]
#![allow(clippy::unwrap_used)]
// Integration tests for `HelperClient` against a fake helper socket.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use vpnbypass_helper::{Error, HelperClient, HostsEntry, RouteExecutor, RouteSpec};

// ── Helpers ─────────────────────────────────────────────────────────

/// Spawn a fake helper that answers each request with `respond(request)`
/// and records every request it saw.
fn fake_helper(
    dir: &tempfile::TempDir,
    respond: impl Fn(&Value) -> Value + Send + Sync + 'static,
) -> (PathBuf, Arc<Mutex<Vec<Value>>>) {
    let path = dir.path().join("helper.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_task = Arc::clone(&seen);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                continue;
            }
            let request: Value = serde_json::from_str(line.trim_end()).unwrap();
            let mut reply = serde_json::to_vec(&respond(&request)).unwrap();
            reply.push(b'\n');
            seen_task.lock().unwrap().push(request);
            write_half.write_all(&reply).await.unwrap();
        }
    });

    (path, seen)
}

fn client(path: PathBuf) -> HelperClient {
    HelperClient::new(path, Duration::from_secs(2), Duration::from_secs(5))
}

const GW: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn version_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (path, seen) = fake_helper(&dir, |_| json!({ "ok": true, "version": "1.4.0" }));

    let version = client(path).version().await.unwrap();

    assert_eq!(version, "1.4.0");
    assert_eq!(seen.lock().unwrap()[0], json!({ "op": "get_version" }));
}

#[tokio::test]
async fn add_batch_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let (path, seen) = fake_helper(&dir, |req| {
        let n = req["routes"].as_array().map_or(0, Vec::len);
        json!({
            "ok": false,
            "success_count": n - 1,
            "failure_count": 1,
            "error": "route: writing to routing socket: File exists"
        })
    });

    let routes = vec![
        RouteSpec::host(Ipv4Addr::new(1, 2, 3, 4), GW),
        RouteSpec::network("91.108.4.0/22", GW),
    ];
    let outcome = client(path).add_routes_batch(&routes).await.unwrap();

    assert_eq!(outcome.success_count, 1);
    assert_eq!(outcome.failure_count, 1);
    assert!(outcome.error.unwrap().contains("File exists"));

    let request = &seen.lock().unwrap()[0];
    assert_eq!(request["op"], "add_routes_batch");
    assert_eq!(request["routes"][1]["is_network"], true);
}

#[tokio::test]
async fn empty_batch_does_not_touch_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.sock");

    let outcome = client(path).remove_routes_batch(&[]).await.unwrap();

    assert_eq!(outcome.success_count, 0);
    assert!(outcome.is_clean());
}

#[tokio::test]
async fn rejection_carries_helper_text() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = fake_helper(&dir, |_| json!({ "ok": false, "error": "not authorized" }));

    let err = client(path)
        .update_hosts_file(&[HostsEntry {
            domain: "web.telegram.org".into(),
            ip: Ipv4Addr::new(149, 154, 167, 99),
        }])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Rejected { ref message } if message == "not authorized"));
}

#[tokio::test]
async fn missing_socket_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.sock");

    let helper = client(path);
    assert!(!helper.is_installed());

    let err = helper.flush_dns_cache().await.unwrap_err();
    assert!(err.is_unavailable(), "expected Unavailable, got: {err:?}");
}

#[tokio::test]
async fn garbage_reply_is_deserialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helper.sock");
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 256];
        let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
        stream.write_all(b"definitely not json\n").await.unwrap();
    });

    let err = client(path).remove_route("1.2.3.4").await.unwrap_err();

    assert!(
        matches!(err, Error::Deserialization { ref body, .. } if body == "definitely not json"),
        "got: {err:?}"
    );
}
