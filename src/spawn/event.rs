//! Output events recorded while a process runs.

use serde::ser::{Serialize, SerializeTuple, Serializer};

/// Discriminator written as the first element of a serialized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Stdout = 1,
    Stderr = 2,
    Close = 3,
    Error = 4,
}

impl EventKind {
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A single entry in a controller's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// One line of stdout, terminator included.
    Stdout(String),
    /// One line of stderr, terminator included.
    Stderr(String),
    /// Process closed with this exit code.
    Close(Option<i32>),
    /// Launch-level failure message.
    Error(String),
}

impl OutputEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Stdout(_) => EventKind::Stdout,
            Self::Stderr(_) => EventKind::Stderr,
            Self::Close(_) => EventKind::Close,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Text payload for stream and error events.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Stdout(s) | Self::Stderr(s) | Self::Error(s) => Some(s),
            Self::Close(_) => None,
        }
    }
}

impl Serialize for OutputEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.kind().code())?;
        match self {
            Self::Stdout(s) | Self::Stderr(s) | Self::Error(s) => tuple.serialize_element(s)?,
            Self::Close(code) => tuple.serialize_element(code)?,
        }
        tuple.end()
    }
}

/// Strip a single trailing `\n` or `\r\n`.
#[must_use]
pub fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map_or(line, |l| l.strip_suffix('\r').unwrap_or(l))
}

/// Lines of the given stream kind with their terminators removed.
#[must_use]
pub fn lines_of(events: &[OutputEvent], kind: EventKind) -> Vec<String> {
    events
        .iter()
        .filter(|event| event.kind() == kind)
        .filter_map(OutputEvent::text)
        .map(|text| strip_terminator(text).to_string())
        .collect()
}
