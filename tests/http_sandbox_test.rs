//! HTTP sandbox adapter against a mock SandboxFusion server.

use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use response_verifier::adapters::sandbox::{HttpSandbox, HttpSandboxConfig};
use response_verifier::domain::models::{TestCases, Verdict, VerificationTask};
use response_verifier::domain::ports::{RunOutcome, Sandbox, SandboxError, SandboxRequest};
use response_verifier::services::{ExecutionSettings, SandboxClient};

fn sandbox(url: &str) -> HttpSandbox {
    HttpSandbox::new(HttpSandboxConfig {
        endpoint: url.to_string(),
        language: "python".to_string(),
        compile_timeout_secs: 10,
        run_timeout_secs: 5,
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn finished(stdout: &str) -> String {
    json!({
        "status": "Success",
        "message": "",
        "compile_result": null,
        "run_result": {
            "status": "Finished",
            "execution_time": 0.01,
            "return_code": 0,
            "stdout": stdout,
            "stderr": ""
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_successful_run_sends_protocol_fields() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/run_code")
        .match_body(Matcher::PartialJson(json!({
            "code": "print(input())",
            "stdin": "7",
            "language": "python",
            "run_timeout": 5.0,
            "files": {},
            "fetch_files": []
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(finished("7\n"))
        .create_async()
        .await;

    let report = sandbox(&server.url())
        .submit(&SandboxRequest::new("print(input())", "7"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(report.outcome, RunOutcome::Finished);
    assert_eq!(report.stdout, "7\n");
}

#[tokio::test]
async fn test_payload_too_large() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run_code")
        .with_status(413)
        .create_async()
        .await;

    let err = sandbox(&server.url())
        .submit(&SandboxRequest::new("x = 1", ""))
        .await
        .unwrap_err();
    assert_eq!(err, SandboxError::PayloadTooLarge);
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run_code")
        .with_status(500)
        .with_body("internal failure")
        .create_async()
        .await;

    let err = sandbox(&server.url())
        .submit(&SandboxRequest::new("x = 1", ""))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SandboxError::Http {
            status: 500,
            body: "internal failure".into()
        }
    );
}

#[tokio::test]
async fn test_malformed_reply() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run_code")
        .with_status(200)
        .with_body("<html>gateway</html>")
        .create_async()
        .await;

    let err = sandbox(&server.url())
        .submit(&SandboxRequest::new("x = 1", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::MalformedReply(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint() {
    let err = sandbox("http://127.0.0.1:1")
        .submit(&SandboxRequest::new("x = 1", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Unreachable(_)));
}

#[tokio::test]
async fn test_client_turns_oversized_payload_into_skipped_verdict() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run_code")
        .with_status(413)
        .create_async()
        .await;

    let client = SandboxClient::new(Arc::new(sandbox(&server.url())), ExecutionSettings::default()).unwrap();
    let task = VerificationTask {
        response_id: "r1".into(),
        problem_id: "p1".into(),
        code: "print(input())".into(),
        test_cases: TestCases::stdio([("a", "a")]),
        attempt: 0,
        preamble: None,
        setup_error: None,
    };

    let result = client.execute(&task).await;
    assert_eq!(result.verdict, Verdict::Skipped);
    assert_eq!(result.details["reason"], "request_too_large");
}
