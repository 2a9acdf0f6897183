use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::{debug, warn};

/// Body stream wrapper that counts bytes as they pass through.
///
/// The total is logged once when the upstream body ends; a mid-stream error is
/// logged with the count so far. Items are forwarded unchanged.
pub struct CountingStream<S> {
    inner: S,
    bytes: u64,
    backend_uri: String,
    request_uri: String,
    finished: bool,
}

impl<S> CountingStream<S> {
    pub fn new(inner: S, backend_uri: impl Into<String>, request_uri: impl Into<String>) -> Self {
        Self {
            inner,
            bytes: 0,
            backend_uri: backend_uri.into(),
            request_uri: request_uri.into(),
            finished: false,
        }
    }

    /// Bytes forwarded so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl<S, E> Stream for CountingStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                warn!(
                    backend_uri = %this.backend_uri,
                    request_uri = %this.request_uri,
                    bytes = this.bytes,
                    error = %e,
                    "Upstream body failed mid-stream"
                );
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                debug!(
                    backend_uri = %this.backend_uri,
                    request_uri = %this.request_uri,
                    bytes = this.bytes,
                    "Proxied response complete"
                );
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
