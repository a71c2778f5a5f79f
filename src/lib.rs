//! spawnctl - run a single child process with captured output, timeouts and
//! an exit code policy.
//!
//! ```no_run
//! # async fn demo() -> Result<(), spawnctl::spawn::SpawnError> {
//! use spawnctl::config::SpawnOptions;
//!
//! let spawn = spawnctl::run(["printf", "%s\n%s\n", "one", "two"], SpawnOptions::default()).await?;
//! assert_eq!(*spawn.stdout_lines(), vec!["one", "two"]);
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("spawnctl only supports unix targets");

pub mod config;
pub mod display;
pub mod spawn;

pub use spawn::run;
