use serde::{Deserialize, Serialize};

use crate::error::GridnotesError;

/// A request to the comment store, discriminated by `method`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Request {
    /// Entries with any date whose prefix equals one of `dates` (encoded).
    Get { dates: Vec<String> },
    /// Append a serialized entry line.
    Set { entry: String },
    /// Remove the entry with this id.
    Delete { id: String },
    /// Replace the entry `id` with `new_entry`, moving it to the end.
    Update {
        id: String,
        #[serde(rename = "newentry")]
        new_entry: String,
    },
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Delete { .. } => "delete",
            Self::Update { .. } => "update",
        }
    }
}

/// Either the requested data or an `{"err": ...}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Err { err: String },
    Ok { ok: String },
    Entries(Vec<String>),
}

impl Response {
    pub fn ok() -> Self {
        Self::Ok {
            ok: "Its all good".to_string(),
        }
    }

    pub fn from_error(e: &GridnotesError) -> Self {
        Self::Err {
            err: e.user_message(),
        }
    }

    /// Turn an `err` payload into [`GridnotesError::Server`].
    pub fn into_result(self) -> Result<Self, GridnotesError> {
        match self {
            Self::Err { err } => Err(GridnotesError::Server { message: err }),
            other => Ok(other),
        }
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
            format!(r#"{{"err":"serialization failed: {escaped}"}}"#)
        })
    }
}
