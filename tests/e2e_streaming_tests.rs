//! End-to-end tests for the streaming endpoint.

mod common;

use std::time::{Duration, Instant};

use common::server::{TestServer, TestServerOptions};
use common::stubs;

use vizbeat_server::analysis::AnalysisBackend;

#[tokio::test]
async fn streams_pipeline_bytes_with_live_headers() {
    let tools_dir = tempfile::tempdir().unwrap();
    let fixture = tools_dir.path().join("fixture.wav");
    stubs::write_fixture_wav(&fixture);
    let expected = std::fs::read(&fixture).unwrap();

    let retrieval = stubs::retrieval_stub(tools_dir.path(), &fixture);
    let transcode = stubs::passthrough_transcode_stub(tools_dir.path());

    let server = TestServer::spawn(TestServerOptions {
        retrieval_tool: retrieval,
        transcode_tool: transcode,
        backend: AnalysisBackend::Available,
        first_chunk_timeout: Duration::from_secs(5),
    })
    .await;

    let response = reqwest::get(format!(
        "{}/stream/dQw4w9WgXcQ?token=opaque-token",
        server.base_url
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "audio/mpeg"
    );
    assert_eq!(
        response.headers()["cache-control"].to_str().unwrap(),
        "no-store"
    );
    assert_eq!(
        response.headers()["accept-ranges"].to_str().unwrap(),
        "none"
    );

    let body = response.bytes().await.unwrap();
    assert_eq!(body.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn stalled_pipeline_is_a_502_within_the_bound() {
    let tools_dir = tempfile::tempdir().unwrap();
    let retrieval = stubs::stalled_retrieval_stub(tools_dir.path());
    let transcode = stubs::passthrough_transcode_stub(tools_dir.path());

    let server = TestServer::spawn(TestServerOptions {
        retrieval_tool: retrieval,
        transcode_tool: transcode,
        backend: AnalysisBackend::Available,
        first_chunk_timeout: Duration::from_secs(1),
    })
    .await;

    let start = Instant::now();
    let response = reqwest::get(format!("{}/stream/dQw4w9WgXcQ", server.base_url))
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    // Configured bound plus diagnostics collection, with margin; never an
    // indefinite hang or an empty 200.
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn empty_pipeline_output_is_a_502() {
    let tools_dir = tempfile::tempdir().unwrap();
    let retrieval = stubs::write_stub(
        tools_dir.path(),
        "retrieval-stub.sh",
        "#!/bin/sh\necho 'video is private' >&2\nexit 1\n",
    );
    let transcode = stubs::passthrough_transcode_stub(tools_dir.path());

    let server = TestServer::spawn(TestServerOptions {
        retrieval_tool: retrieval,
        transcode_tool: transcode,
        backend: AnalysisBackend::Available,
        first_chunk_timeout: Duration::from_secs(5),
    })
    .await;

    let response = reqwest::get(format!("{}/stream/dQw4w9WgXcQ", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn invalid_stream_reference_is_a_400() {
    let tools_dir = tempfile::tempdir().unwrap();
    let retrieval = stubs::stalled_retrieval_stub(tools_dir.path());
    let transcode = stubs::passthrough_transcode_stub(tools_dir.path());

    let server = TestServer::spawn(TestServerOptions {
        retrieval_tool: retrieval,
        transcode_tool: transcode,
        backend: AnalysisBackend::Available,
        first_chunk_timeout: Duration::from_secs(1),
    })
    .await;

    let response = reqwest::get(format!("{}/stream/definitely-not-an-id", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}
