//! Byte accounting for outbound sockets

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Bytes moved over one stream, shared with whoever reads the totals.
#[derive(Debug, Default)]
pub struct TransferCounters {
    sent: AtomicU64,
    received: AtomicU64,
}

impl TransferCounters {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

pin_project! {
    /// Counts the bytes written to and read from the wrapped stream.
    pub struct CountingStream<S> {
        #[pin]
        inner: S,
        counters: Arc<TransferCounters>,
    }
}

impl<S> CountingStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            counters: Arc::new(TransferCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<TransferCounters> {
        self.counters.clone()
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead> AsyncRead for CountingStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let old_filled_len = buf.filled().len();
        ready!(this.inner.poll_read(cx, buf))?;
        let nr = buf.filled().len() - old_filled_len;
        this.counters.received.fetch_add(nr as u64, Ordering::Relaxed);
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite> AsyncWrite for CountingStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let nw = ready!(this.inner.poll_write(cx, buf))?;
        this.counters.sent.fetch_add(nw as u64, Ordering::Relaxed);
        Poll::Ready(Ok(nw))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
