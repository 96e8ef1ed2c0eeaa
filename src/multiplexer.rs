//! Request/response multiplexing over a single framed stream (§4.2).
//!
//! One task owns the socket's read half and feeds decoded frames back here;
//! every other task calls [`Multiplexer::send_command`] and awaits its own
//! oneshot. Pending-FIFO order is the only thing that ties a response back
//! to its request — the panel is guaranteed to answer in the order it
//! received commands, so no correlation id is carried on the wire.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex, Semaphore};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::codec::{FrameCodec, IncomingFrame, Request, ResponseBody};
use crate::error::{Error, Result};
use crate::transport::BoxedStream;

/// What a pending waiter receives once its response frame arrives.
pub type PendingResult = std::result::Result<Vec<u8>, Error>;

struct Pending {
    reply: oneshot::Sender<PendingResult>,
}

struct Inner {
    stream: BoxedStream,
    codec: FrameCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

/// Shared multiplexer state. `Arc`'d between the writer/awaiters and the
/// background reader task.
pub struct Multiplexer {
    inner: Mutex<Inner>,
    pending: Mutex<VecDeque<Pending>>,
    in_flight: Semaphore,
    /// Wall-clock (unix seconds) at which the pending FIFO most recently
    /// became empty — the supervisor's liveness/skew signal (§4.2, §4.7).
    fifo_drained_at: AtomicI64,
    /// Unix seconds of the last successfully decoded frame of any kind.
    last_activity_at: AtomicI64,
}

impl Multiplexer {
    pub fn new(stream: BoxedStream, concurrency: usize) -> Arc<Self> {
        let now = unix_now();
        Arc::new(Self {
            inner: Mutex::new(Inner {
                stream,
                codec: FrameCodec::new(),
                read_buf: BytesMut::with_capacity(4096),
                write_buf: BytesMut::with_capacity(512),
            }),
            pending: Mutex::new(VecDeque::new()),
            in_flight: Semaphore::new(concurrency.max(1)),
            fifo_drained_at: AtomicI64::new(now),
            last_activity_at: AtomicI64::new(now),
        })
    }

    /// `send_command(code, payload) → result bytes or error` (§4.2).
    ///
    /// Acquires the in-flight permit, then appends a waiter to the FIFO and
    /// writes the frame in one critical section under the stream lock, so
    /// two concurrent callers can never push in one order and write in the
    /// other — FIFO order always equals wire order (§8.1).
    pub async fn send_command(&self, code: u8, payload: Vec<u8>) -> Result<Vec<u8>> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| Error::transport("multiplexer closed"))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().await;
            {
                let mut pending = self.pending.lock().await;
                pending.push_back(Pending { reply: tx });
            }
            inner.write_buf.clear();
            inner
                .codec
                .encode(Request::new(code, payload), &mut inner.write_buf)?;
            let bytes = inner.write_buf.split().freeze();
            inner.stream.write_all(&bytes).await.map_err(Error::from)?;
        }

        rx.await.map_err(|_| Error::transport("multiplexer dropped before reply"))?
    }

    /// Reads and dispatches one frame: pops the pending FIFO on a response,
    /// or returns the notification payload for the subscription engine.
    /// Cancel-safe: call this in a `tokio::select!` against other futures.
    pub async fn next_event(&self) -> Result<MuxEvent> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(frame) = inner.codec.decode(&mut inner.read_buf)? {
                    self.last_activity_at.store(unix_now(), Ordering::Relaxed);
                    drop(inner);
                    return self.dispatch(frame).await;
                }
                let mut chunk = [0u8; 4096];
                let n = inner.stream.read(&mut chunk).await.map_err(Error::from)?;
                if n == 0 {
                    return Err(Error::transport("connection closed by peer"));
                }
                inner.read_buf.extend_from_slice(&chunk[..n]);
            }
        }
    }

    async fn dispatch(&self, frame: IncomingFrame) -> Result<MuxEvent> {
        match frame {
            IncomingFrame::Notification(payload) => Ok(MuxEvent::Notification(payload)),
            IncomingFrame::Response(body) => {
                let pending = {
                    let mut pending = self.pending.lock().await;
                    let popped = pending.pop_front();
                    if pending.is_empty() {
                        self.fifo_drained_at.store(unix_now(), Ordering::Relaxed);
                    }
                    popped
                };
                match pending {
                    Some(waiter) => {
                        let result = response_to_result(body);
                        let _ = waiter.reply.send(result);
                        Ok(MuxEvent::ResponseDelivered)
                    }
                    None => {
                        warn!("response frame with no pending waiter; dropping");
                        Ok(MuxEvent::ResponseDelivered)
                    }
                }
            }
        }
    }

    /// Seconds since the pending FIFO last became empty — 0 if it is empty
    /// right now. Used by the supervisor's skew probe (§4.7, §8 property 6).
    pub fn seconds_since_fifo_drained(&self) -> i64 {
        unix_now() - self.fifo_drained_at.load(Ordering::Relaxed)
    }

    pub fn seconds_since_activity(&self) -> i64 {
        unix_now() - self.last_activity_at.load(Ordering::Relaxed)
    }

    pub async fn pending_is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Raise the in-flight concurrency limit after capability negotiation
    /// has determined the panel's real limit (negotiation itself always
    /// runs at concurrency 1, since the limit isn't known yet).
    pub fn add_permits(&self, extra: usize) {
        self.in_flight.add_permits(extra);
    }

    /// Fail every pending waiter; called when the transport is torn down so
    /// awaiting callers don't hang forever (§8 property 1: FIFO reaches
    /// empty after N requests and N responses, including on teardown).
    pub async fn fail_all_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        while let Some(waiter) = pending.pop_front() {
            let _ = waiter.reply.send(Err(Error::transport(reason)));
        }
        self.fifo_drained_at.store(unix_now(), Ordering::Relaxed);
    }
}

/// What reading the socket produced.
pub enum MuxEvent {
    /// A response was matched to its waiter and delivered.
    ResponseDelivered,
    /// An unsolicited notification payload for the subscription engine.
    Notification(Vec<u8>),
}

fn response_to_result(body: ResponseBody) -> PendingResult {
    match body {
        ResponseBody::Ack => Ok(Vec::new()),
        ResponseBody::AckWithData(data) => Ok(data),
        ResponseBody::Nack(code) => {
            trace!(code, "panel nacked command");
            Err(Error::nack(code))
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    /// §8 property 1: one waiter per request, FIFO-resolved, empty after
    /// N requests and N responses.
    #[tokio::test]
    async fn fifo_resolves_responses_in_order() {
        let (client, mut server) = duplex(4096);
        let mux = Multiplexer::new(Box::new(client), 1);

        let mux_reader = mux.clone();
        let reader = tokio::spawn(async move {
            loop {
                if mux_reader.next_event().await.is_err() {
                    break;
                }
            }
        });

        // Drive the mock panel side: answer each request with a bare ACK
        // as it arrives, one round trip at a time.
        let driver = tokio::spawn(async move {
            for _ in 0..2 {
                let mut buf = [0u8; 64];
                let n = server.read(&mut buf).await.unwrap();
                assert!(n > 0);
                server.write_all(&[0x01, 0x01, 0xFC]).await.unwrap();
            }
        });

        let first = mux.send_command(0x01, vec![0x03]).await;
        let second = mux.send_command(0x01, vec![0x03]).await;
        driver.await.unwrap();
        reader.abort();

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(mux.pending_is_empty().await);
    }
}
