use std::future::Future;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::error::GridnotesError;
use crate::protocol::{Request, Response};
use crate::store::CommentLog;

/// Dispatches requests to the comment log. Cheap to clone; clones share the
/// log and therefore its lock.
#[derive(Clone)]
pub struct CommentServer {
    log: Arc<CommentLog>,
    max_request_bytes: usize,
}

impl CommentServer {
    pub fn new(log: CommentLog, max_request_bytes: usize) -> Self {
        Self {
            log: Arc::new(log),
            max_request_bytes,
        }
    }

    /// Run one request. Failures come back as `{"err": ...}`, never as a
    /// Rust error.
    pub async fn handle(&self, request: Request) -> Response {
        let method = request.method();
        let result = match request {
            Request::Get { dates } => self.log.get(&dates).await.map(Response::Entries),
            Request::Set { entry } => self.log.set(&entry).await.map(|_| Response::ok()),
            Request::Delete { id } => self.log.delete(&id).await.map(|_| Response::ok()),
            Request::Update { id, new_entry } => self
                .log
                .update(&id, &new_entry)
                .await
                .map(|_| Response::ok()),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!(method, "request failed: {e}");
            Response::from_error(&e)
        })
    }

    /// Decode and run one JSON request line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::warn!("undecodable request: {e}");
                Response::from_error(&GridnotesError::Protocol(e.to_string()))
            }
        }
    }

    /// Accept connections until `shutdown` resolves. Each connection gets its
    /// own task; the log lock serializes their effects.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), GridnotesError> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    tracing::debug!(%peer, "connection accepted");
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.serve_connection(stream).await {
                            tracing::warn!(%peer, "connection ended with error: {e}");
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("comment server shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn serve_connection(&self, stream: TcpStream) -> Result<(), GridnotesError> {
        let mut framed = Framed::new(
            stream,
            LinesCodec::new_with_max_length(self.max_request_bytes),
        );
        let mut after_codec_error = false;
        loop {
            let frame = match framed.next().await {
                Some(frame) => frame,
                // After a codec error the stream yields one `None`, then
                // resumes reading.
                None if std::mem::take(&mut after_codec_error) => continue,
                None => return Ok(()),
            };
            after_codec_error = false;
            let response = match frame {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(&line).await,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    // The codec discards the rest of the line; the
                    // connection carries on with the next one.
                    tracing::warn!(max = self.max_request_bytes, "oversized request line");
                    after_codec_error = true;
                    Response::from_error(&GridnotesError::Protocol(format!(
                        "request exceeds {} bytes",
                        self.max_request_bytes
                    )))
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };
            framed.send(response.to_line()).await.map_err(codec_err)?;
        }
    }
}

fn codec_err(e: LinesCodecError) -> GridnotesError {
    match e {
        LinesCodecError::Io(e) => GridnotesError::Io(e),
        LinesCodecError::MaxLineLengthExceeded => {
            GridnotesError::Transport("line length exceeded".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn test_server(name: &str) -> (CommentServer, std::path::PathBuf) {
        let dir = std::env::temp_dir().join("gridnotes-test-server").join(name);
        let _ = tokio::fs::remove_dir_all(&dir).await;
        let log = CommentLog::open_at(
            dir.join("comments.log"),
            dir.join(".lock"),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
        (CommentServer::new(log, 4096), dir)
    }

    #[tokio::test]
    async fn set_then_get_over_lines() {
        let (server, dir) = test_server("lines").await;
        let set = server
            .handle_line(r#"{"method":"set","entry":"1;2024-01-10=trunk/featureX;alice;hi"}"#)
            .await;
        assert_eq!(set, Response::ok());
        let got = server
            .handle_line(r#"{"method":"get","dates":["2024-01-10"]}"#)
            .await;
        assert_eq!(
            got,
            Response::Entries(vec!["1;2024-01-10=trunk/featureX;alice;hi".to_string()])
        );
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn bad_requests_become_err_payloads() {
        let (server, dir) = test_server("bad").await;
        for line in ["not json", r#"{"method":"frobnicate"}"#, r#"{"method":"delete"}"#] {
            assert!(matches!(server.handle_line(line).await, Response::Err { .. }));
        }
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn delete_twice_reports_already_deleted() {
        let (server, dir) = test_server("delete-twice").await;
        server
            .handle(Request::Set {
                entry: "9;d=;bob;x".to_string(),
            })
            .await;
        let first = server.handle(Request::Delete { id: "9".to_string() }).await;
        assert_eq!(first, Response::ok());
        let second = server.handle(Request::Delete { id: "9".to_string() }).await;
        assert_eq!(
            second,
            Response::Err {
                err: "Comment already deleted/updated!".to_string()
            }
        );
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
