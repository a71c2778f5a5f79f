//! Spawn module tests.

mod controller_test;
mod snapshot_test;

/// Verify all public spawn types are exported from the library.
#[test]
fn test_all_spawn_types_exported() {
    use spawnctl::config::{ConfigLoader, SpawnConfig, SpawnOptions};
    use spawnctl::spawn::{
        Callbacks, ErrorKind, EventKind, LifecycleState, OutputEvent, Spawn, SpawnError,
        SpawnSnapshot, MEMO_LINE_LIMIT, MS_DAY, MS_HOUR, MS_MINUTE,
    };

    let _ = Spawn::new();
    let _ = SpawnOptions::default();
    let _ = SpawnConfig::default();
    let _ = ConfigLoader::new();
    let _ = Callbacks::default();
    let _: fn(&Spawn) -> SpawnSnapshot = Spawn::snapshot;

    let _ = LifecycleState::Created;
    let _ = EventKind::Close;
    let _ = OutputEvent::Close(Some(0));
    let _ = ErrorKind::Timeout;
    let _: fn() -> SpawnError = || SpawnError::AlreadyRunning;

    assert!(MEMO_LINE_LIMIT > 0);
    assert!(MS_MINUTE < MS_HOUR && MS_HOUR < MS_DAY);
}
