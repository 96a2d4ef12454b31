//! Client side of the comment store: entry (de)serialization on top of a
//! request/response [`Transport`].
//!
//! Every call completes (or fails) before returning, so callers can treat
//! each operation as blocking their own flow.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::codec;
use crate::entry::{Author, Comment, CommentEntry, EntryId, Serializable, Tests};
use crate::error::GridnotesError;
use crate::grid::Grid;
use crate::protocol::{Request, Response};
use crate::report::CellId;
use crate::server::CommentServer;

/// Largest response body accepted from a comment endpoint.
pub const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Carries one request to the store and brings back its response.
pub trait Transport {
    fn call(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, GridnotesError>> + Send;
}

/// Newline-delimited JSON over TCP, one connection per call.
pub struct TcpTransport {
    addr: String,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn exchange(&self, line: String) -> Result<Response, GridnotesError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| GridnotesError::Transport(format!("connect {}: {e}", self.addr)))?;
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_RESPONSE_BYTES));
        framed
            .send(line)
            .await
            .map_err(|e| GridnotesError::Transport(e.to_string()))?;
        let reply = framed
            .next()
            .await
            .ok_or_else(|| GridnotesError::Transport("connection closed before reply".to_string()))?
            .map_err(|e| GridnotesError::Transport(e.to_string()))?;
        serde_json::from_str(&reply)
            .map_err(|e| GridnotesError::Protocol(format!("undecodable reply: {e}")))
    }
}

impl Transport for TcpTransport {
    async fn call(&self, request: &Request) -> Result<Response, GridnotesError> {
        let line = serde_json::to_string(request)
            .map_err(|e| GridnotesError::Protocol(e.to_string()))?;
        tokio::time::timeout(self.timeout, self.exchange(line))
            .await
            .map_err(|_| {
                GridnotesError::Transport(format!(
                    "no reply from {} within {:?}",
                    self.addr, self.timeout
                ))
            })?
    }
}

/// Form-encoded POST to an HTTP comment endpoint that speaks the same
/// methods (`method`, `dates[]`, `entry`, `id`, `newentry`).
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, GridnotesError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn form_fields(request: &Request) -> Vec<(&'static str, String)> {
        let mut fields = vec![("method", request.method().to_string())];
        match request {
            Request::Get { dates } => {
                fields.extend(dates.iter().map(|d| ("dates[]", d.clone())));
            }
            Request::Set { entry } => fields.push(("entry", entry.clone())),
            Request::Delete { id } => fields.push(("id", id.clone())),
            Request::Update { id, new_entry } => {
                fields.push(("id", id.clone()));
                fields.push(("newentry", new_entry.clone()));
            }
        }
        fields
    }
}

impl Transport for HttpTransport {
    async fn call(&self, request: &Request) -> Result<Response, GridnotesError> {
        let response = self
            .client
            .post(&self.url)
            .form(&Self::form_fields(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GridnotesError::Transport(format!(
                "comment endpoint returned {status}"
            )));
        }
        if response
            .content_length()
            .is_some_and(|len| len as usize > MAX_RESPONSE_BYTES)
        {
            return Err(GridnotesError::Transport("response too large".to_string()));
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(GridnotesError::Transport("response too large".to_string()));
        }
        // A successful delete on the legacy endpoint has an empty body.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Response::ok());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| GridnotesError::Protocol(format!("undecodable reply: {e}")))
    }
}

/// Calls an in-process server directly.
#[derive(Clone)]
pub struct LocalTransport {
    server: CommentServer,
}

impl LocalTransport {
    pub fn new(server: CommentServer) -> Self {
        Self { server }
    }
}

impl Transport for LocalTransport {
    async fn call(&self, request: &Request) -> Result<Response, GridnotesError> {
        Ok(self.server.handle(request.clone()).await)
    }
}

pub struct CommentClient<T> {
    transport: T,
}

impl<T: Transport> CommentClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn call(&self, request: Request) -> Result<Response, GridnotesError> {
        let method = request.method();
        let result = self.transport.call(&request).await.and_then(Response::into_result);
        if let Err(e) = &result {
            tracing::warn!(method, "comment request failed: {e}");
        }
        result
    }

    /// Entries with any date that prefix-matches one of `dates`.
    pub async fn fetch_entries(&self, dates: &[String]) -> Result<Vec<CommentEntry>, GridnotesError> {
        let encoded = dates.iter().map(|d| codec::encode(d)).collect();
        match self.call(Request::Get { dates: encoded }).await? {
            Response::Entries(lines) => lines
                .iter()
                .filter(|line| !line.is_empty())
                .map(|line| CommentEntry::deserialize(line))
                .collect(),
            other => Err(GridnotesError::Protocol(format!(
                "expected entry list, got {other:?}"
            ))),
        }
    }

    pub async fn post_entry(&self, entry: &CommentEntry) -> Result<(), GridnotesError> {
        self.call(Request::Set {
            entry: entry.serialize(),
        })
        .await
        .map(|_| ())
    }

    pub async fn delete_entry(&self, id: EntryId) -> Result<(), GridnotesError> {
        self.call(Request::Delete { id: id.to_string() })
            .await
            .map(|_| ())
    }

    /// Replace entry `id` with `new_entry` in one call. The new entry moves
    /// to the end of the log.
    pub async fn update_entry(
        &self,
        id: EntryId,
        new_entry: &CommentEntry,
    ) -> Result<(), GridnotesError> {
        self.call(Request::Update {
            id: id.to_string(),
            new_entry: new_entry.serialize(),
        })
        .await
        .map(|_| ())
    }

    /// Comment on the selected cells: each cell contributes its row's test
    /// under its column's date. Fails with
    /// [`GridnotesError::EmptySelection`] when no cell has a date, since no
    /// date lookup could ever return such an entry.
    pub async fn post_comment(
        &self,
        grid: &Grid,
        cells: &[CellId],
        text: &str,
        author: &str,
    ) -> Result<CommentEntry, GridnotesError> {
        let tests = tests_for_cells(grid, cells);
        if tests.is_empty() {
            tracing::warn!(cells = cells.len(), "comment not posted, no dated cells selected");
            return Err(GridnotesError::EmptySelection);
        }
        let entry = CommentEntry::new(Comment::new(text), Author::now(author)?, tests);
        self.post_entry(&entry).await?;
        Ok(entry)
    }

    /// Comment on a whole date rather than on particular tests.
    pub async fn post_general_comment(
        &self,
        date: &str,
        text: &str,
        author: &str,
    ) -> Result<CommentEntry, GridnotesError> {
        let tests = Tests::general(date);
        let entry = CommentEntry::new(Comment::new(text), Author::now(author)?, tests);
        self.post_entry(&entry).await?;
        Ok(entry)
    }

    /// Edit an existing entry: same tests, new text and author, new id.
    pub async fn edit_comment(
        &self,
        old: &CommentEntry,
        text: &str,
        author: &str,
    ) -> Result<CommentEntry, GridnotesError> {
        let tests = old.tests.clone();
        let entry = CommentEntry::new(Comment::new(text), Author::now(author)?, tests);
        self.update_entry(old.id, &entry).await?;
        Ok(entry)
    }
}

/// Tests named by a set of cells, grouped by the dates of their columns.
/// Cells without a date (headers, rows outside any section) are skipped.
pub fn tests_for_cells(grid: &Grid, cells: &[CellId]) -> Tests {
    let mut tests = Tests::new();
    for &cell in cells {
        let Some(coord) = grid.try_coord(cell) else {
            tracing::warn!(cell, "selected cell is not on the grid");
            continue;
        };
        let (Some(date), Some(test)) = (grid.get_date(coord), grid.test_reference(cell)) else {
            continue;
        };
        tests.add(test, date);
    }
    tests
}
