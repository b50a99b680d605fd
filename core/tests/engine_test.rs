#![cfg(unix)]

// End-to-end checks against a stub engine script that speaks the same
// argument vocabulary as the real synthesis CLI.

use std::path::PathBuf;

use orator_core::{Orator, OratorConfig, OratorError, SynthesisRequest};
use tempfile::TempDir;

fn write_stub_engine(dir: &TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("stub-engine.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

// Honors --list-narrator, --list-emotion and a say run that writes the
// file named by -o.
const WORKING_ENGINE: &str = r#"
if [ "$1" = "--list-narrator" ]; then
    printf 'Alice\nBob\n'
    exit 0
fi
if [ "$1" = "--list-emotion" ]; then
    printf 'happy\nsad\n'
    exit 0
fi
out=""
prev=""
for a in "$@"; do
    if [ "$prev" = "-o" ]; then out="$a"; fi
    prev="$a"
done
printf 'fake-wav' > "$out"
"#;

const BROKEN_ENGINE: &str = r#"
echo '[debug] warming up voice model' >&2
echo 'synthesis core dumped' >&2
exit 3
"#;

fn config_for(engine: PathBuf, dir: &TempDir) -> OratorConfig {
    let mut cfg = OratorConfig::default();
    cfg.engine.bin = engine;
    cfg.artifacts.temp_dir = dir.path().to_path_buf();
    cfg.retry.max_attempts = 2;
    cfg.retry.delay_ms = 10;
    cfg
}

#[tokio::test]
async fn speak_produces_a_tracked_artifact() {
    let dir = TempDir::new().unwrap();
    let engine = write_stub_engine(&dir, WORKING_ENGINE);
    let orator = Orator::new(config_for(engine, &dir));

    let request = SynthesisRequest {
        text: "hello world".to_string(),
        narrator: Some("Alice".to_string()),
        ..Default::default()
    };
    let path = orator.speak(request).await.unwrap();

    assert_eq!(path.parent().unwrap(), dir.path());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "fake-wav");

    orator.release_artifact(&path).await;
    assert!(!path.exists());
}

#[tokio::test]
async fn broken_engine_exhausts_the_retry_budget() {
    let dir = TempDir::new().unwrap();
    let engine = write_stub_engine(&dir, BROKEN_ENGINE);
    let orator = Orator::new(config_for(engine, &dir));

    let result = orator
        .speak(SynthesisRequest {
            text: "doomed".to_string(),
            ..Default::default()
        })
        .await;

    match result {
        Err(OratorError::SynthesisExhausted { attempts, cause }) => {
            assert_eq!(attempts, 2);
            match *cause {
                OratorError::ProcessFailed { code, ref stderr } => {
                    assert_eq!(code, 3);
                    // Diagnostic noise is filtered before surfacing.
                    assert_eq!(stderr, "synthesis core dumped");
                }
                ref other => panic!("expected ProcessFailed cause, got {other:?}"),
            }
        }
        other => panic!("expected SynthesisExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn narrator_listing_feeds_the_validity_cache() {
    let dir = TempDir::new().unwrap();
    let engine = write_stub_engine(&dir, WORKING_ENGINE);
    let orator = Orator::new(config_for(engine, &dir));

    assert_eq!(
        orator.engine.list_narrators().await.unwrap(),
        vec!["Alice", "Bob"]
    );
    assert_eq!(
        orator.engine.list_emotions("Alice").await.unwrap(),
        vec!["happy", "sad"]
    );

    assert!(orator.narrator_is_valid(Some("Alice")).await);
    assert!(orator.narrator_is_valid(None).await);
    assert!(!orator.narrator_is_valid(Some("Mallory")).await);
}

#[tokio::test]
async fn queued_speaks_run_serially_in_order() {
    let dir = TempDir::new().unwrap();
    let engine = write_stub_engine(&dir, WORKING_ENGINE);
    let orator = std::sync::Arc::new(Orator::new(config_for(engine, &dir)));

    let mut tasks = Vec::new();
    for i in 0..3 {
        let orator = std::sync::Arc::clone(&orator);
        tasks.push(tokio::spawn(async move {
            orator
                .speak(SynthesisRequest {
                    text: format!("utterance {i}"),
                    ..Default::default()
                })
                .await
        }));
    }

    for task in tasks {
        let path = task.await.unwrap().unwrap();
        assert!(path.exists());
    }

    let status = orator.queue_status().await;
    assert_eq!(status.pending, 0);
}

#[tokio::test]
async fn shutdown_reclaims_outstanding_artifacts() {
    let dir = TempDir::new().unwrap();
    let engine = write_stub_engine(&dir, WORKING_ENGINE);
    let mut orator = Orator::new(config_for(engine, &dir));
    orator.start();

    let path = orator
        .speak(SynthesisRequest {
            text: "short lived".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(path.exists());

    orator.shutdown().await;
    assert!(!path.exists());
}
