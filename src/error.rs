use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridnotesError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server refused request: {message}")]
    Server { message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed entry line: {0}")]
    MalformedEntry(String),

    #[error("entry {id} already deleted")]
    AlreadyDeleted { id: String },

    #[error("unexpected line diff {delta} while deleting entry {id}")]
    UnexpectedDiff { id: String, delta: i64 },

    #[error("entry {id} no longer exists")]
    EntryMissing { id: String },

    #[error("update of {id} reuses the same id")]
    SameIdUpdate { id: String },

    #[error("lock busy after {waited_ms}ms")]
    Busy { waited_ms: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid author: {0}")]
    InvalidAuthor(String),

    #[error("invalid date string: {0}")]
    InvalidDate(String),

    #[error("selection contains no dated test cells")]
    EmptySelection,
}

impl GridnotesError {
    /// Returns true for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Busy { .. } => true,
            Self::Transport(_) => true,
            Self::Request(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Message suitable for the `err` field of a response and for the alert
    /// shown to the user. Never includes filesystem paths.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("comment server unreachable: {msg}"),
            Self::Request(_) => "request to comment server failed".to_string(),
            Self::Server { message } => message.clone(),
            Self::Protocol(msg) => format!("bad request: {msg}"),
            Self::MalformedEntry(_) => "comment log contains a malformed entry".to_string(),
            Self::AlreadyDeleted { .. } => "Comment already deleted/updated!".to_string(),
            Self::UnexpectedDiff { delta, .. } => {
                format!("Unexpected tmp file diff {delta} not removing comment!")
            }
            Self::EntryMissing { .. } => {
                "The comment has already been deleted/edited.".to_string()
            }
            Self::SameIdUpdate { .. } => "updated comment must carry a new id".to_string(),
            Self::Busy { .. } => {
                "Someone else is using the comments right now, try again later!".to_string()
            }
            Self::Io(_) => "could not read or write the comment log".to_string(),
            Self::Config(msg) => format!("configuration error: {msg}"),
            Self::InvalidAuthor(msg) => format!("invalid author: {msg}"),
            Self::InvalidDate(date) => format!("Could not parse date string {date}"),
            Self::EmptySelection => {
                "Select at least one test result before commenting.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_retryable_but_races_are_not() {
        assert!(GridnotesError::Busy { waited_ms: 10 }.is_retryable());
        assert!(!GridnotesError::AlreadyDeleted { id: "1".into() }.is_retryable());
        assert!(!GridnotesError::EntryMissing { id: "1".into() }.is_retryable());
        assert!(!GridnotesError::EmptySelection.is_retryable());
    }

    #[test]
    fn io_message_hides_paths() {
        let err = GridnotesError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/srv/secret/comments.log",
        ));
        assert!(!err.user_message().contains("/srv"));
    }
}
