use super::test_helpers::{
    TEST_BASE_URL, create_test_manager, create_test_manager_with, wait_for_job, wait_for_removal,
};
use super::*;
use crate::types::{Job, JobEvent, JobId, JobState, JobStatus, Resolution};
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};


fn request(link: &str, hint: &str) -> CreateJobRequest {
    CreateJobRequest {
        link: Some(link.to_string()),
        filename_hint: Some(hint.to_string()),
        headers: None,
    }
}

/// Store a job directly, bypassing intake and the worker
async fn stored_job(manager: &JobManager, state: JobState) -> Job {
    let id = JobId::new();
    let filename = format!("{}-manual.bin", id.short_prefix());
    let job = Job {
        id,
        state,
        source_link: "https://example.com/manual.bin".into(),
        headers: HashMap::new(),
        file_path: manager.config.storage.download_dir.join(&filename),
        temp_path: manager.config.storage.temp_dir.join(&filename),
        final_url: format!("{}/downloads/{}", TEST_BASE_URL, filename),
        redirect_url: format!("{}/dl/{}", TEST_BASE_URL, id),
        filename,
        created_at: chrono::Utc::now(),
        finished_at: None,
    };
    manager.store.put(job.clone()).await.unwrap();
    job
}

/// Mock serving `body` at `/file.bin`
async fn serve_file(body: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;
    server
}
