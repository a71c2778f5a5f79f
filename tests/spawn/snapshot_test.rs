//! Tests for the diagnostic snapshot.

use serde_json::json;
use spawnctl::config::SpawnOptions;
use spawnctl::spawn::Spawn;

#[test]
fn fresh_controller_snapshot() {
    let spawn = Spawn::with_options(SpawnOptions::new(["true"])).unwrap();

    assert_eq!(
        spawn.to_json().unwrap(),
        json!({
            "command": ["true"],
            "errors": [],
            "output": [],
            "running": false,
            "started": false,
            "finished": false,
            "timeout_at": null,
            "timeout_in": null,
        })
    );
}

#[tokio::test]
async fn finished_controller_snapshot() {
    let spawn = spawnctl::run(["printf", "%s\n%s\n", "one", "two"], SpawnOptions::default())
        .await
        .unwrap();

    let value = serde_json::to_value(&spawn).unwrap();
    assert_eq!(value["output"], json!([[1, "one\n"], [1, "two\n"], [3, 0]]));
    assert_eq!(value["running"], json!(false));
    assert_eq!(value["started"], json!(true));
    assert_eq!(value["finished"], json!(true));
}

#[tokio::test]
async fn failed_controller_snapshot_lists_errors() {
    let spawn = Spawn::with_options(SpawnOptions::new(["definately-not-a-binary-4rU"])).unwrap();
    assert!(spawn.run().unwrap().await.is_err());

    let snapshot = spawn.snapshot();
    assert_eq!(
        snapshot.errors,
        vec!["Command not found: \"definately-not-a-binary-4rU\"".to_string()]
    );
    let value = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(value["output"][0][0], json!(4));
    assert_eq!(value["output"][1], json!([3, null]));
}

#[tokio::test]
async fn snapshot_shows_resolved_deadline() {
    let spawn = Spawn::with_options(SpawnOptions::new(["true"]).timeout_in(60_000)).unwrap();
    spawn.run().unwrap().await.unwrap();

    let value = spawn.to_json().unwrap();
    assert_eq!(value["timeout_in"], json!(60_000));
    assert!(value["timeout_at"].is_i64());
}
