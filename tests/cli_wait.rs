//! End-to-end tests for `cloudjobs wait` and `cloudjobs list` against a local
//! job endpoint.

use assert_cmd::cargo::cargo_bin_cmd;
use cloudjobs::test_support::{HttpReply, TestServer, serve_http};
use predicates::prelude::*;

async fn endpoint(replies: Vec<HttpReply>) -> TestServer {
    serve_http(replies)
        .await
        .unwrap_or_else(|err| panic!("bind test server: {err}"))
}

fn run(endpoint: String, args: &'static [&'static str]) -> assert_cmd::assert::Assert {
    let mut cmd = cargo_bin_cmd!("cloudjobs");
    cmd.env("CLOUDJOBS_ENDPOINT", endpoint)
        .env("CLOUDJOBS_POLL_INTERVAL_MS", "10")
        .env("CLOUDJOBS_JOB_TIMEOUT_SECS", "5")
        .env("CLOUDJOBS_MAX_POLL_ATTEMPTS", "5")
        .env_remove("CLOUDJOBS_AUTH_TOKEN")
        .args(args)
        .assert()
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_prints_the_result_of_a_finished_job() {
    let server = endpoint(vec![
        HttpReply::json(200, r#"{"jobid":"7","jobstatus":0}"#),
        HttpReply::json(
            200,
            r#"{"jobid":"7","jobstatus":1,"jobresultcode":0,"jobresult":{"name":"vm-1"}}"#,
        ),
    ])
    .await;
    let url = server.endpoint();

    tokio::task::spawn_blocking(move || {
        run(url, &["wait", "--mapper", "cloudstack", "7"])
            .success()
            .stdout("{\"name\":\"vm-1\"}\n");
    })
    .await
    .unwrap_or_else(|err| panic!("cli task: {err}"));

    assert!(
        server
            .requests()
            .iter()
            .all(|request| request.starts_with("GET /jobs/7 "))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_reports_a_failed_job_and_exits_non_zero() {
    let server = endpoint(vec![HttpReply::json(
        200,
        r#"{"jobid":"8","jobstatus":2,"jobresultcode":530,"error":{"errorcode":431,"errortext":"bad template"}}"#,
    )])
    .await;
    let url = server.endpoint();

    tokio::task::spawn_blocking(move || {
        run(url, &["wait", "--mapper", "cloudstack", "8"])
            .code(1)
            .stdout("")
            .stderr(predicate::str::contains("bad template (code 431)"))
            .stderr(predicate::str::contains("1 of 1 job(s) did not succeed"));
    })
    .await
    .unwrap_or_else(|err| panic!("cli task: {err}"));
}

#[tokio::test(flavor = "multi_thread")]
async fn list_flags_inconsistent_jobs() {
    let server = endpoint(vec![HttpReply::json(
        200,
        r#"[{"jobid":"1","jobstatus":1},{"jobid":"2","jobstatus":2}]"#,
    )])
    .await;
    let url = server.endpoint();

    tokio::task::spawn_blocking(move || {
        run(url, &["list", "--mapper", "cloudstack"])
            .code(1)
            .stdout(predicate::str::contains("1\tSUCCEEDED\n"))
            .stdout(predicate::str::contains("2\tINCONSISTENT\t"));
    })
    .await
    .unwrap_or_else(|err| panic!("cli task: {err}"));
}
