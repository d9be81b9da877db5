//! The request envelope owned transiently by the pool until its stream-id
//! is reclaimed (spec.md §3 "Request").

use crate::error::Result;
use crate::protocol::{Compression, Opcode};
use bytes::BytesMut;
use tokio::sync::oneshot;

/// A decoded response frame handed back to whoever is awaiting this
/// request's completion.
#[derive(Debug)]
pub struct RawResponse {
    pub opcode: Opcode,
    pub body: BytesMut,
}

/// One in-flight request. Built by `execution::RequestHandler`, consumed by
/// `pool::HostDispatcher` until the stream-id is reclaimed.
pub struct Request {
    pub opcode: Opcode,
    pub body: BytesMut,
    pub compression: Compression,
    pub tracing: bool,
    completion: Option<oneshot::Sender<Result<RawResponse>>>,
}

impl Request {
    pub fn new(opcode: Opcode, body: BytesMut, compression: Compression, tracing: bool) -> (Self, oneshot::Receiver<Result<RawResponse>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                opcode,
                body,
                compression,
                tracing,
                completion: Some(tx),
            },
            rx,
        )
    }

    /// Completes the request exactly once; a second call is a silent no-op
    /// (mirrors spec.md §4.D "release the connection's in-flight slot
    /// exactly once" for the completion side).
    pub fn complete(&mut self, result: Result<RawResponse>) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(result);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completion.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;

    #[tokio::test]
    async fn completion_only_fires_once() {
        let (mut request, rx) = Request::new(Opcode::Query, BytesMut::new(), Compression::None, false);
        request.complete(Err(DbError::Cancelled));
        assert!(request.is_completed());
        // second completion is a no-op, does not panic
        request.complete(Err(DbError::Cancelled));
        let result = rx.await.unwrap();
        assert!(result.is_err());
    }
}
