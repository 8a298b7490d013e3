use mockito::{Matcher, Server};
use serde_json::json;

use super::GitHubClient;
use crate::auth::Token;
use crate::error::CiFixError;
use crate::providers::{CiProvider, Conclusion, LogPayload, RunFilter, RunState};

const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

fn runs_body() -> String {
    json!({
        "total_count": 1,
        "workflow_runs": [{
            "id": 42,
            "name": "Build WinUnlock",
            "head_branch": "dev",
            "head_sha": SHA,
            "status": "completed",
            "conclusion": "failure",
            "workflow_id": 5,
            "run_number": 17,
            "event": "push",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:06:00Z",
            "html_url": "https://github.com/acme/app/actions/runs/42"
        }]
    })
    .to_string()
}

fn client(server: &Server, token: Option<&str>) -> GitHubClient {
    GitHubClient::new(&server.url(), "acme/app", token.map(Token::from)).unwrap()
}

#[test]
fn test_client_rejects_bad_repo_paths() {
    for path in ["invalid-path", "owner/repo/extra", "/repo", "owner/"] {
        let err = GitHubClient::new("https://api.github.com", path, None).err();
        assert!(
            matches!(err, Some(CiFixError::Config(ref msg)) if msg.contains("owner/repo")),
            "path {path}"
        );
    }
}

#[test]
fn test_client_splits_owner_and_repo() {
    let client =
        GitHubClient::new("https://api.github.com", "acme/app", Some(Token::from("t"))).unwrap();
    assert_eq!(client.owner(), "acme");
    assert_eq!(client.repo(), "app");
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_list_runs_sends_filter_and_credentials() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/acme/app/actions/runs")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("branch".into(), "dev".into()),
            Matcher::UrlEncoded("per_page".into(), "1".into()),
        ]))
        .match_header("authorization", "Bearer secret")
        .match_header("accept", "application/vnd.github+json")
        .match_header("x-github-api-version", "2022-11-28")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(runs_body())
        .create_async()
        .await;

    let client = client(&server, Some("secret"));
    let run = client
        .latest_run(&RunFilter::for_branch("dev"))
        .await
        .unwrap()
        .unwrap();

    mock.assert_async().await;
    assert_eq!(run.id, 42);
    assert_eq!(run.head_sha, SHA);
    assert_eq!(run.state(), RunState::Completed(Conclusion::Failure));
    assert_eq!(run.workflow_id, Some(5));
}

#[tokio::test]
async fn test_list_runs_scoped_to_workflow() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/acme/app/actions/workflows/5/runs")
        .match_query(Matcher::UrlEncoded("branch".into(), "main".into()))
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(runs_body())
        .create_async()
        .await;

    let client = client(&server, None);
    let filter = RunFilter::for_branch("main").with_workflow(Some(5));
    let runs = CiProvider::list_runs(&client, &filter).await.unwrap();

    mock.assert_async().await;
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn test_base_url_path_prefix_is_kept() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/repos/acme/app/actions/workflows")
        .with_status(200)
        .with_body(
            json!({
                "total_count": 1,
                "workflows": [{
                    "id": 5,
                    "name": "Build WinUnlock",
                    "path": ".github/workflows/build.yml",
                    "state": "active"
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let base = format!("{}/api/v3", server.url());
    let client = GitHubClient::new(&base, "acme/app", None).unwrap();
    let workflows = CiProvider::list_workflows(&client).await.unwrap();

    mock.assert_async().await;
    assert_eq!(workflows[0].id, 5);
    assert_eq!(workflows[0].path, ".github/workflows/build.yml");
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/app/actions/runs/42")
        .with_status(401)
        .with_body(r#"{"message":"Bad credentials"}"#)
        .create_async()
        .await;

    let err = CiProvider::get_run(&client(&server, Some("stale")), 42)
        .await
        .unwrap_err();

    assert!(matches!(err, CiFixError::Auth { status: 401 }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient_api_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/app/actions/runs/42/jobs")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let err = CiProvider::list_jobs(&client(&server, None), 42)
        .await
        .unwrap_err();

    match &err {
        CiFixError::Api { status, message } => {
            assert_eq!(*status, 502);
            assert_eq!(message, "upstream unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_json_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/app/actions/runs/42")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let err = CiProvider::get_run(&client(&server, None), 42)
        .await
        .unwrap_err();
    assert!(matches!(err, CiFixError::Json(_)));
}

#[tokio::test]
async fn test_list_jobs_parses_steps() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/app/actions/runs/42/jobs")
        .match_query(Matcher::UrlEncoded("per_page".into(), "100".into()))
        .with_status(200)
        .with_body(
            json!({
                "total_count": 2,
                "jobs": [
                    {
                        "id": 1, "run_id": 42, "name": "lint",
                        "status": "completed", "conclusion": "success",
                        "started_at": "2024-05-01T10:00:00Z",
                        "completed_at": "2024-05-01T10:01:00Z",
                        "steps": []
                    },
                    {
                        "id": 2, "run_id": 42, "name": "build-windows",
                        "status": "completed", "conclusion": "failure",
                        "started_at": "2024-05-01T10:00:00Z",
                        "completed_at": null,
                        "steps": [
                            {"name": "Compile", "status": "completed", "conclusion": "failure", "number": 4}
                        ]
                    }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let jobs = CiProvider::list_jobs(&client(&server, None), 42).await.unwrap();

    assert_eq!(jobs.len(), 2);
    assert!(!jobs[0].failed());
    assert!(jobs[1].failed());
    assert_eq!(jobs[1].failed_steps().next().map(|s| s.step_name), Some("Compile".to_string()));
}

#[tokio::test]
async fn test_job_log_text_and_archive_payloads() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/app/actions/jobs/7/logs")
        .with_status(200)
        .with_body("2024-05-01T10:00:00.0000000Z src/foo.cpp:10:5: error: boom\n")
        .create_async()
        .await;
    server
        .mock("GET", "/repos/acme/app/actions/jobs/8/logs")
        .with_status(200)
        .with_body(b"PK\x03\x04\x14\x00\x00\x00".to_vec())
        .create_async()
        .await;

    let client = client(&server, None);

    let LogPayload::Text(text) = CiProvider::fetch_job_log(&client, 7).await.unwrap() else {
        panic!("expected a text log");
    };
    assert!(text.contains("error: boom"));

    let archive = CiProvider::fetch_job_log(&client, 8).await.unwrap();
    assert_eq!(
        archive,
        LogPayload::Undecodable {
            bytes: 8,
            reason: "zip archive"
        }
    );
}

#[tokio::test]
async fn test_expired_job_log_is_an_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/app/actions/jobs/9/logs")
        .with_status(410)
        .with_body("Gone")
        .create_async()
        .await;

    let err = CiProvider::fetch_job_log(&client(&server, None), 9)
        .await
        .unwrap_err();
    assert!(matches!(err, CiFixError::Api { status: 410, .. }));
}
