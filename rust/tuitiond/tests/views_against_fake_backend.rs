mod common;

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;

fn spawn_sidecar(api_url: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_tuitiond");
    let mut child = Command::new(exe)
        .env("TUITION_API_URL", api_url)
        .env_remove("TUITION_API_TOKEN")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tuitiond");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn f(v: &serde_json::Value) -> f64 {
    v.as_f64().expect("number")
}

fn ids(items: &serde_json::Value) -> Vec<String> {
    items
        .as_array()
        .expect("items array")
        .iter()
        .map(|i| i["_id"].as_str().expect("_id").to_string())
        .collect()
}

#[test]
fn fees_view_filters_and_totals_visible_rows() {
    let backend = common::start();
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&backend.base_url);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "fees.view",
        json!({ "filters": { "classId": "c1", "month": "2025-11" } }),
    );
    assert_eq!(ids(&res["items"]), vec!["f1", "f2", "f4"]);
    assert_eq!(f(&res["totals"]["collected"]), 1900.0);
    assert_eq!(f(&res["totals"]["pending"]), 2500.0);
    assert_eq!(res["items"][1]["derivedStatus"], "partial");
    assert_eq!(f(&res["items"][1]["balance"]), 1000.0);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "fees.view",
        json!({ "filters": { "status": "Partial", "search": "VIK" } }),
    );
    assert_eq!(ids(&res["items"]), vec!["f2"]);

    // Back-to-back loads of one view each get their own full answer.
    for n in 0..3 {
        let res = request_ok(&mut stdin, &mut reader, &format!("again-{}", n), "fees.view", json!({}));
        assert_eq!(res["count"], 4);
        assert!(res.get("superseded").is_none());
    }

    // Every view above was served from cache.
    assert_eq!(backend.state.hits("fees"), 1);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn fee_update_invalidates_cached_lists() {
    let backend = common::start();
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&backend.base_url);
    let view = json!({ "filters": { "classId": "c1", "month": "2025-11" } });

    let before = request_ok(&mut stdin, &mut reader, "1", "fees.view", view.clone());
    assert_eq!(f(&before["totals"]["collected"]), 1900.0);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "fees.update",
        json!({ "id": "f2", "patch": { "paidINR": 1400 } }),
    );
    assert_eq!(f(&updated["paidINR"]), 1400.0);

    // The refetch runs in the background; stale rows may be served meanwhile.
    let mut collected = 0.0;
    for n in 0..40 {
        let res = request_ok(&mut stdin, &mut reader, &format!("poll-{}", n), "fees.view", view.clone());
        collected = f(&res["totals"]["collected"]);
        if collected == 2900.0 {
            assert_eq!(f(&res["totals"]["pending"]), 1500.0);
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(collected, 2900.0);
    assert!(backend.state.hits("fees") >= 2);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn expenses_and_tests_views_carry_metrics() {
    let backend = common::start();
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&backend.base_url);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "expenses.view",
        json!({ "filters": { "month": "2025-11" } }),
    );
    assert_eq!(ids(&res["items"]), vec!["e1", "e2", "e3"]);
    assert_eq!(f(&res["amountTotal"]), 13800.0);
    assert_eq!(res["categories"][0]["category"], "Rent");
    assert_eq!(res["categories"][2]["category"], "Other");

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "expenses.view",
        json!({ "filters": { "category": "Other" } }),
    );
    assert_eq!(ids(&res["items"]), vec!["e3"]);

    let res = request_ok(&mut stdin, &mut reader, "3", "tests.view", json!({}));
    assert_eq!(ids(&res["items"]), vec!["t1", "t2"]);
    assert_eq!(f(&res["items"][0]["averagePercentage"]), 90.0);
    assert_eq!(f(&res["items"][1]["averagePercentage"]), 125.0);
    assert_eq!(res["items"][1]["warningCount"], 1);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classlogs.view",
        json!({ "filters": { "search": "quad" } }),
    );
    assert_eq!(ids(&res["items"]), vec!["l1"]);
    assert_eq!(res["items"][0]["presentCount"], 1);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn overviews_rank_and_summarise() {
    let backend = common::start();
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&backend.base_url);

    let res = request_ok(&mut stdin, &mut reader, "1", "classes.overview", json!({ "classId": "c1" }));
    assert_eq!(res["class"]["name"], "Maths X");
    assert_eq!(res["counts"], json!({ "studentCount": 3, "logCount": 1, "testCount": 1 }));
    let ranking: Vec<&str> = res["ranking"]
        .as_array()
        .expect("ranking")
        .iter()
        .map(|r| r["studentId"].as_str().expect("id"))
        .collect();
    assert_eq!(ranking, vec!["s2", "s1", "s3"]);

    let res = request_ok(&mut stdin, &mut reader, "2", "students.overview", json!({ "studentId": "s1" }));
    assert_eq!(res["classRank"], 2);
    assert_eq!(res["testSummary"]["testsTaken"], 1);
    assert_eq!(f(&res["testSummary"]["averagePercentage"]), 80.0);
    assert_eq!(res["testSummary"]["band"], "good");
    assert_eq!(ids(&res["fees"]), vec!["f1"]);
    assert_eq!(f(&res["feeTotals"]["pending"]), 0.0);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.view",
        json!({ "filters": { "search": "iyer" } }),
    );
    assert_eq!(ids(&res["items"]), vec!["c1"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn session_and_backend_errors_use_the_error_envelope() {
    let backend = common::start();
    let (mut child, mut stdin, mut reader) = spawn_sidecar(&backend.base_url);

    let resp = request(&mut stdin, &mut reader, "1", "session.me", json!({}));
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "api_error");
    assert_eq!(resp["error"]["details"]["status"], 401);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.login",
        json!({ "email": "admin@example.com", "password": "secret" }),
    );
    assert_eq!(res["token"], common::TOKEN);

    let res = request_ok(&mut stdin, &mut reader, "3", "session.me", json!({}));
    assert_eq!(res["email"], "admin@example.com");

    let res = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert_eq!(res["authenticated"], true);

    let resp = request(&mut stdin, &mut reader, "5", "classes.get", json!({ "id": "nope" }));
    assert_eq!(resp["error"]["code"], "api_error");
    assert_eq!(resp["error"]["message"], "Class not found");
    assert_eq!(resp["error"]["details"]["status"], 404);

    let resp = request(&mut stdin, &mut reader, "6", "fees.bulkGenerate", json!({ "classId": "c1", "month": "2025-13" }));
    assert_eq!(resp["error"]["code"], "bad_params");

    let _ = request_ok(&mut stdin, &mut reader, "7", "session.logout", json!({}));
    let res = request_ok(&mut stdin, &mut reader, "8", "health", json!({}));
    assert_eq!(res["authenticated"], false);

    drop(stdin);
    let _ = child.wait();
}
