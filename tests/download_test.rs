mod common;

use clipit_cli::api::ApiError;
use clipit_cli::download::{DirSaveSink, RetrieveError, Retriever};
use clipit_cli::model::{Job, JobStatus};
use common::client;
use std::sync::Arc;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base(server: &MockServer) -> String {
    format!("{}/api", server.uri())
}

fn job(id: &str, url: Option<&str>, status: JobStatus) -> Job {
    Job {
        external_id: id.to_string(),
        original_url: url.map(str::to_string),
        status,
        progress: if status == JobStatus::Completed { 100 } else { 0 },
    }
}

#[tokio::test]
async fn retrieve_saves_a_completed_artifact_under_the_derived_name() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let (api, session, _nav) = client(&base(&server), dir.path().join("token"));
    session.login("tok").unwrap();

    Mock::given(method("GET"))
        .and(path("/api/jobs/download/job-1"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3, 4]))
        .expect(1)
        .mount(&server)
        .await;

    let retriever = Retriever::new(api, Arc::new(DirSaveSink::new(out.path().to_path_buf())));
    let completed = job("job-1", Some("https://x.com/abc1234567890"), JobStatus::Completed);

    let saved = retriever.retrieve(&completed).await.unwrap();
    assert_eq!(saved.file_name().unwrap(), "clipit-1234567890.mp4");
    assert_eq!(std::fs::read(&saved).unwrap(), vec![1u8, 2, 3, 4]);
}

#[tokio::test]
async fn retrieve_without_source_url_names_after_the_job_id() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let (api, _session, _nav) = client(&base(&server), dir.path().join("token"));

    Mock::given(method("GET"))
        .and(path("/api/jobs/download/job-2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;

    let retriever = Retriever::new(api, Arc::new(DirSaveSink::new(out.path().to_path_buf())));
    let completed = job("job-2", None, JobStatus::Completed);

    let saved = retriever.retrieve(&completed).await.unwrap();
    assert_eq!(saved.file_name().unwrap(), "clipit-job-2.mp4");
}

#[tokio::test]
async fn retrieve_is_a_no_op_for_unfinished_jobs() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let (api, _session, _nav) = client(&base(&server), dir.path().join("token"));

    // The artifact endpoint must never be hit.
    Mock::given(method("GET"))
        .and(path("/api/jobs/download/job-3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let retriever = Retriever::new(api, Arc::new(DirSaveSink::new(out.path().to_path_buf())));

    for status in [JobStatus::Pending, JobStatus::Downloading, JobStatus::Processing, JobStatus::Failed] {
        let err = retriever
            .retrieve(&job("job-3", None, status))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieveError::NotReady(_)));
    }
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn retrieve_surfaces_server_failures_without_saving() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let out = tempdir().unwrap();
    let (api, _session, _nav) = client(&base(&server), dir.path().join("token"));

    Mock::given(method("GET"))
        .and(path("/api/jobs/download/job-4"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let retriever = Retriever::new(api, Arc::new(DirSaveSink::new(out.path().to_path_buf())));
    let err = retriever
        .retrieve(&job("job-4", None, JobStatus::Completed))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrieveError::Api(ApiError::Server { .. })));
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}
