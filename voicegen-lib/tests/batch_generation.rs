use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use voicegen_lib::batch::{self, BatchRunner};
use voicegen_lib::{ColumnLayout, ElevenLabsClient, Settings, Sheet, SpeechCache, VoiceCatalog};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Speech as the API returns it: an MP3 clip
fn speech_body() -> Vec<u8> {
    include_bytes!("data/line.mp3").to_vec()
}

fn script() -> Sheet {
    let row = |cells: &[&str]| -> Vec<Option<String>> {
        cells
            .iter()
            .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
            .collect()
    };
    Sheet::from_rows(
        "Script",
        vec![
            row(&["Character", "Line", "File"]),
            row(&["Alice", "Good morning.", "alice_001"]),
            row(&["Bob", "Morning!", "bob_001"]),
            row(&["Alice", "Broken line", "alice_002"]),
            row(&["Narrator", "Not assigned", "narr_001"]),
        ],
    )
}

async fn mount_voices(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/voices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "voices": [
                {"voice_id": "v-rachel", "name": "Rachel"},
                {"voice_id": "v-adam", "name": "Adam"}
            ]
        })))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> ElevenLabsClient {
    let settings = Settings {
        base_url: format!("{}/v1", server.uri()),
        ..Settings::default()
    };
    ElevenLabsClient::new("sk-test", &settings).unwrap()
}

#[tokio::test]
async fn generates_wav_per_line_and_keeps_going_after_failure() {
    let server = MockServer::start().await;
    mount_voices(&server).await;

    let body = speech_body();
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/v-rachel"))
        .respond_with(move |req: &Request| {
            let text: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
            if text["text"] == "Broken line" {
                ResponseTemplate::new(500).set_body_string("synthesis failed")
            } else {
                ResponseTemplate::new(200).set_body_bytes(body.clone())
            }
        })
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/v-adam"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(speech_body()))
        .mount(&server)
        .await;

    let client = client(&server);
    let catalog = VoiceCatalog::fetch(&client).await.unwrap();
    let assignments = vec![
        "Alice=Rachel".parse().unwrap(),
        "Bob=Adam".parse().unwrap(),
    ];
    let tasks = batch::plan(&script(), &ColumnLayout::default(), &catalog, &assignments).unwrap();
    assert_eq!(tasks.len(), 3);

    let out = tempfile::tempdir().unwrap();
    let report = BatchRunner::new(client, None)
        .run(&tasks, &out.path().join("voices"))
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "alice_002");
    assert!(report.failures[0].error.contains("500"));

    let alice = out.path().join("voices").join("alice_001.wav");
    let reader = hound::WavReader::open(&alice).unwrap();
    assert_eq!(reader.spec().sample_rate, 44_100);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert!(out.path().join("voices").join("bob_001.wav").exists());
    assert!(!out.path().join("voices").join("narr_001.wav").exists());
}

#[tokio::test]
async fn cached_speech_is_not_requested_twice() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let body = speech_body();

    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/v-adam"))
        .respond_with(move |_: &Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_bytes(body.clone())
        })
        .mount(&server)
        .await;
    mount_voices(&server).await;

    let client = client(&server);
    let catalog = VoiceCatalog::fetch(&client).await.unwrap();
    let tasks = batch::plan(
        &script(),
        &ColumnLayout::default(),
        &catalog,
        &["Bob=Adam".parse().unwrap()],
    )
    .unwrap();

    let cache_dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let cache = SpeechCache::new(cache_dir.path().to_path_buf()).unwrap();
    let runner = BatchRunner::new(client, Some(cache));

    runner.run(&tasks, out.path()).await.unwrap();
    let report = runner.run(&tasks, out.path()).await.unwrap();

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
