//! Tests for running commands through the controller.

use nix::sys::signal::Signal;
use spawnctl::config::SpawnOptions;
use spawnctl::spawn::{ErrorKind, LifecycleState, OutputEvent, Spawn, SpawnError};

fn spawn_for(command: &[&str]) -> Spawn {
    let spawn = Spawn::new();
    spawn.set_command(command.iter().copied()).unwrap();
    spawn
}

#[tokio::test]
async fn runs_true() {
    let spawn = spawn_for(&["true"]);
    let resolved = spawn.run().unwrap().await.unwrap();

    assert_eq!(resolved.output(), vec![OutputEvent::Close(Some(0))]);
    assert_eq!(resolved.exit_code(), Some(0));
    assert_eq!(spawn.state(), LifecycleState::Finished);
    assert!(spawn.errors().is_empty());
}

#[tokio::test]
async fn resolves_with_the_same_controller() {
    let spawn = spawn_for(&["true"]);
    let resolved = spawn.run().unwrap().await.unwrap();

    // Both handles observe the same state.
    assert!(resolved.finished());
    assert_eq!(resolved.command(), spawn.command());
    assert_eq!(resolved.output(), spawn.output());
}

#[tokio::test]
async fn captures_printf_lines() {
    let spawn = spawnctl::run(["printf", "%s\n%s\n", "one", "two"], SpawnOptions::default())
        .await
        .unwrap();

    assert_eq!(*spawn.stdout_lines(), vec!["one", "two"]);
    assert!(spawn.stderr_lines().is_empty());
    assert_eq!(spawn.exit_code(), Some(0));
    assert_eq!(spawn.output().last(), Some(&OutputEvent::Close(Some(0))));
}

#[tokio::test]
async fn false_rejects_with_exit_code() {
    let spawn = spawn_for(&["false"]);
    let err = spawn.run().unwrap().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnexpectedExitCode);
    assert!(err.to_string().contains("exited with"));
    assert!(err.to_string().contains("\"1\""));
    assert_eq!(spawn.exit_code(), Some(1));
    assert!(spawn.finished());
}

#[tokio::test]
async fn missing_binary_rejects_with_not_found() {
    let spawn = spawn_for(&["definately-not-a-binary-4rU"]);
    let err = spawn.run().unwrap().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommandNotFound);
    assert!(err.to_string().contains("Command not found"));
    assert!(spawn.finished());
    assert_eq!(spawn.errors().len(), 1);

    let output = spawn.output();
    assert_eq!(output.len(), 2);
    assert!(matches!(&output[0], OutputEvent::Error(msg) if msg.contains("Command not found")));
    assert_eq!(output[1], OutputEvent::Close(None));
}

#[tokio::test]
async fn missing_binary_rejects_even_when_ignoring_exit_codes() {
    let spawn = spawn_for(&["definately-not-a-binary-4rU"]);
    spawn.ignore_exit_code(true).unwrap();
    let err = spawn.run().unwrap().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommandNotFound);
}

#[tokio::test]
async fn not_found_error_captures_launch_context() {
    let spawn = spawn_for(&["definately-not-a-binary-4rU", "--flag"]);
    let err = spawn.run().unwrap().await.unwrap_err();

    let context = err.launch_context().unwrap();
    assert_eq!(context.command, vec!["definately-not-a-binary-4rU", "--flag"]);
    assert_eq!(context.path, std::env::var("PATH").ok());
}

#[tokio::test]
async fn second_run_fails_without_affecting_first() {
    let spawn = spawn_for(&["true"]);
    let first = spawn.run().unwrap();

    assert!(matches!(spawn.run(), Err(SpawnError::AlreadyRunning)));

    let resolved = first.await.unwrap();
    assert_eq!(resolved.exit_code(), Some(0));
}

#[tokio::test]
async fn ignore_exit_code_resolves() {
    let spawn = spawn_for(&["false"]);
    spawn.ignore_exit_code(true).unwrap();

    let resolved = spawn.run().unwrap().await.unwrap();
    assert_eq!(resolved.exit_code(), Some(1));
}

#[tokio::test]
async fn expected_exit_code_one_resolves() {
    let spawn = spawn_for(&["false"]);
    spawn.set_expected_exit_code(1).unwrap();

    assert!(spawn.run().unwrap().await.is_ok());
}

#[tokio::test]
async fn expected_exit_code_mismatch_rejects_success() {
    let spawn = spawn_for(&["true"]);
    spawn.set_expected_exit_code(1).unwrap();

    let err = spawn.run().unwrap().await.unwrap_err();
    assert!(matches!(
        err,
        SpawnError::UnexpectedExitCode {
            code: Some(0),
            expected: 1
        }
    ));
}

#[test]
fn non_numeric_expected_exit_code_fails_before_spawn() {
    let spawn = spawn_for(&["true"]);
    let err = spawn.set_expected_exit_code_str("a").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("exit code should be an integer"));
    assert_eq!(spawn.expected_exit_code(), 0);
    assert!(!spawn.started());
}

#[tokio::test]
async fn numeric_string_expected_exit_code() {
    let spawn = spawn_for(&["sh", "-c", "exit 3"]);
    spawn.set_expected_exit_code_str("3").unwrap();
    assert!(spawn.run().unwrap().await.is_ok());
}

#[tokio::test]
async fn runs_fixed_path() {
    let spawn = spawn_for(&["/bin/sh", "-c", "true"]);
    let completion = tokio_test::assert_ok!(spawn.run());
    tokio_test::assert_ok!(completion.await);
}

#[tokio::test]
async fn captures_stderr_separately() {
    let spawn = spawn_for(&["sh", "-c", "echo out; echo err >&2; echo more"]);
    spawn.run().unwrap().await.unwrap();

    assert_eq!(*spawn.stdout_lines(), vec!["out", "more"]);
    assert_eq!(*spawn.stderr_lines(), vec!["err"]);
    assert_eq!(spawn.output().len(), 4);
    assert_eq!(spawn.output().last(), Some(&OutputEvent::Close(Some(0))));
}

#[tokio::test]
async fn keeps_partial_last_line() {
    let spawn = spawn_for(&["printf", "a\nb"]);
    spawn.run().unwrap().await.unwrap();

    assert_eq!(
        spawn.output(),
        vec![
            OutputEvent::Stdout("a\n".to_string()),
            OutputEvent::Stdout("b".to_string()),
            OutputEvent::Close(Some(0)),
        ]
    );
}

#[tokio::test]
async fn configuration_is_frozen_after_start() {
    let spawn = spawn_for(&["true"]);
    let completion = spawn.run().unwrap();

    assert!(matches!(spawn.set_command(["false"]), Err(SpawnError::AlreadyRunning)));
    assert!(matches!(spawn.set_timeout_in(5), Err(SpawnError::AlreadyRunning)));
    assert!(matches!(spawn.ignore_exit_code(true), Err(SpawnError::AlreadyRunning)));
    assert_eq!(spawn.command(), vec!["true"]);

    completion.await.unwrap();
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let spawn = Spawn::new();
    assert!(matches!(spawn.run(), Err(SpawnError::Validation(_))));
    assert_eq!(spawn.state(), LifecycleState::Created);
}

#[test]
fn kill_before_start_is_noop() {
    let spawn = spawn_for(&["sleep", "1"]);
    assert!(spawn.kill(Signal::SIGTERM).is_none());
    assert!(spawn.terminate().is_none());
    assert!(!spawn.started());
    assert!(spawn.output().is_empty());
}

#[tokio::test]
async fn kill_after_finish_is_noop() {
    let spawn = spawn_for(&["true"]);
    spawn.run().unwrap().await.unwrap();

    assert!(spawn.kill(Signal::SIGTERM).is_none());
    assert_eq!(spawn.output(), vec![OutputEvent::Close(Some(0))]);
}

#[tokio::test]
async fn kill_running_process() {
    let spawn = spawn_for(&["sleep", "5"]);
    let completion = spawn.run().unwrap();

    assert!(spawn.running());
    assert!(spawn.pid().is_some());
    assert!(matches!(spawn.kill(Signal::SIGTERM), Some(Ok(()))));

    let err = completion.await.unwrap_err();
    assert!(matches!(
        err,
        SpawnError::UnexpectedExitCode {
            code: Some(143),
            ..
        }
    ));
    assert_eq!(spawn.exit_code(), Some(143));
    assert_eq!(spawn.signal(), Some(15));
    assert!(spawn.pid().is_none());
}

#[tokio::test]
async fn sigkill_maps_to_137() {
    let spawn = spawn_for(&["sleep", "5"]);
    spawn.ignore_exit_code(true).unwrap();
    let completion = spawn.run().unwrap();

    assert!(matches!(spawn.kill(Signal::SIGKILL), Some(Ok(()))));
    let resolved = completion.await.unwrap();
    assert_eq!(resolved.exit_code(), Some(137));
}

#[tokio::test]
async fn dropped_completion_still_runs() {
    let spawn = spawn_for(&["true"]);
    drop(spawn.run().unwrap());

    for _ in 0..100 {
        if spawn.finished() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(spawn.finished());
    assert_eq!(spawn.exit_code(), Some(0));
}

#[tokio::test]
async fn kill_is_noop_once_child_is_reaped() {
    // The background sleep keeps stdout open, so the run stays Running
    // after the shell itself has exited and been reaped.
    let spawn = spawn_for(&["sh", "-c", "sleep 1 & exit 0"]);
    let completion = spawn.run().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    assert!(spawn.running());
    assert!(spawn.pid().is_none());
    assert!(spawn.kill(Signal::SIGTERM).is_none());

    let resolved = completion.await.unwrap();
    assert_eq!(resolved.exit_code(), Some(0));
    assert!(resolved.errors().is_empty());
}
