//! HTTP synthesizer against a mock provider endpoint.

use voxcache::quality::{QualityPolicy, Tier};
use voxcache::synth::{HttpSynthesizer, SpeechSynthesizer};
use voxcache::{Error, ProviderErrorKind};

#[tokio::test]
async fn posts_one_request_per_chunk_and_concatenates_audio() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/audio/speech")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_body(vec![0xAA, 0xBB, 0xCC])
        .expect(2)
        .create_async()
        .await;

    let synth = HttpSynthesizer::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .unwrap();
    let params = QualityPolicy::new().resolve(Tier::Free, None);

    let chunks = vec!["First sentence. ".to_string(), "Second one.".to_string()];
    let out = synth.synthesize(&chunks, "alloy", &params).await.unwrap();

    mock.assert_async().await;
    assert_eq!(out.audio.len(), 6, "two chunks of three bytes each");
    assert_eq!(out.unit_count, 4);
    assert!(out.cost > 0.0);
    assert!(out.duration_seconds > 0.0);
}

#[tokio::test]
async fn quota_status_maps_to_quota_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/audio/speech")
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;

    let synth = HttpSynthesizer::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .unwrap();
    let params = QualityPolicy::new().resolve(Tier::Free, None);

    let err = synth
        .synthesize(&["Hi there.".to_string()], "alloy", &params)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Provider {
            kind: ProviderErrorKind::Quota,
            ..
        }
    ));
}

#[tokio::test]
async fn server_errors_map_to_network_and_are_retryable() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/audio/speech")
        .with_status(503)
        .create_async()
        .await;

    let synth = HttpSynthesizer::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .unwrap();
    let params = QualityPolicy::new().resolve(Tier::Free, None);

    let err = synth
        .synthesize(&["Hi there.".to_string()], "alloy", &params)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Provider {
            kind: ProviderErrorKind::Network,
            ..
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn empty_audio_is_malformed_output() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/audio/speech")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let synth = HttpSynthesizer::builder()
        .api_key("test-key")
        .base_url(server.url())
        .build()
        .unwrap();
    let params = QualityPolicy::new().resolve(Tier::Free, None);

    let err = synth
        .synthesize(&["Hi there.".to_string()], "alloy", &params)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Provider {
            kind: ProviderErrorKind::MalformedOutput,
            ..
        }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn builder_requires_an_api_key() {
    // No key argument and (in CI) no TTS_API_KEY either.
    if std::env::var("TTS_API_KEY").is_ok() {
        return;
    }
    let err = HttpSynthesizer::builder().build().unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn debug_output_redacts_the_api_key() {
    let synth = HttpSynthesizer::builder()
        .api_key("sk-super-secret")
        .build()
        .unwrap();
    let rendered = format!("{:?}", synth);
    assert!(!rendered.contains("sk-super-secret"));
    assert!(rendered.contains("***"));
}
