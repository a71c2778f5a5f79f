//! Child process lifecycle control.

mod callbacks;
mod controller;
mod deadline;
mod error;
mod event;
mod state;

pub use callbacks::*;
pub use controller::*;
pub use deadline::{now_ms, resolve_deadline, MS_DAY, MS_HOUR, MS_MINUTE};
pub use error::*;
pub use event::*;
pub use state::*;
