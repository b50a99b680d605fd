#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use orator_core::config::SupervisorConfig;
use orator_core::{OratorError, ProcessSupervisor, RunOptions};
use tokio::time::sleep;

fn sh() -> PathBuf {
    PathBuf::from("/bin/sh")
}

fn sh_args(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

fn supervisor(max_processes: usize) -> ProcessSupervisor {
    ProcessSupervisor::new(&SupervisorConfig {
        max_processes,
        kill_grace_ms: 1_000,
        debug_marker: "[debug]".to_string(),
    })
}

#[tokio::test]
async fn captures_stdout_on_success() {
    let sup = supervisor(5);
    let out = sup
        .run(
            &sh(),
            &sh_args("echo hello"),
            RunOptions::with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(out.trim(), "hello");
    assert_eq!(sup.running(), 0);
}

#[tokio::test]
async fn pipes_stdin_to_the_child() {
    let sup = supervisor(5);
    let out = sup
        .run(
            Path::new("/bin/cat"),
            &[],
            RunOptions {
                timeout: Duration::from_secs(5),
                stdin: Some("hello from stdin".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(out, "hello from stdin");
}

#[tokio::test]
async fn rejects_spawn_beyond_the_cap_then_accepts_again() {
    let sup = Arc::new(supervisor(5));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let sup = Arc::clone(&sup);
        tasks.push(tokio::spawn(async move {
            sup.run(
                &sh(),
                &sh_args("sleep 0.4"),
                RunOptions::with_timeout(Duration::from_secs(5)),
            )
            .await
        }));
    }

    // Let all five children actually spawn.
    sleep(Duration::from_millis(150)).await;
    assert_eq!(sup.running(), 5);

    let sixth = sup
        .run(
            &sh(),
            &sh_args("echo too-many"),
            RunOptions::with_timeout(Duration::from_secs(5)),
        )
        .await;
    assert!(matches!(sixth, Err(OratorError::AdmissionRejected(5))));

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Slots freed; new spawns are admitted again.
    let out = sup
        .run(
            &sh(),
            &sh_args("echo room-again"),
            RunOptions::with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(out.trim(), "room-again");
}

#[tokio::test]
async fn over_timeout_process_is_killed_and_releases_its_slot() {
    let sup = supervisor(1);
    let started = Instant::now();

    let result = sup
        .run(
            &sh(),
            &sh_args("sleep 10"),
            RunOptions::with_timeout(Duration::from_millis(200)),
        )
        .await;

    assert!(matches!(result, Err(OratorError::ProcessTimeout(200))));
    // Graceful termination should land well before the sleep would end.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(sup.running(), 0);

    // The single slot is usable again.
    let out = sup
        .run(
            &sh(),
            &sh_args("echo recovered"),
            RunOptions::with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(out.trim(), "recovered");
}

#[tokio::test]
async fn nonzero_exit_reports_code_and_filtered_stderr() {
    let sup = supervisor(5);
    let result = sup
        .run(
            &sh(),
            &sh_args("echo '[debug] internal chatter' >&2; echo 'engine blew up' >&2; exit 7"),
            RunOptions::with_timeout(Duration::from_secs(5)),
        )
        .await;

    match result {
        Err(OratorError::ProcessFailed { code, stderr }) => {
            assert_eq!(code, 7);
            assert_eq!(stderr, "engine blew up");
        }
        other => panic!("expected ProcessFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error_not_an_exit_failure() {
    let sup = supervisor(5);
    let result = sup
        .run(
            Path::new("/nonexistent/no-such-engine"),
            &[],
            RunOptions::with_timeout(Duration::from_secs(5)),
        )
        .await;
    assert!(matches!(result, Err(OratorError::SpawnFailed(_))));
    assert_eq!(sup.running(), 0);
}
