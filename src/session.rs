// ABOUTME: Per-connection state machine, owns the socket, drives the receive loop, exposes send()
// ABOUTME: `Session<M>` is a cheap, cloneable handle; `drive` is the private loop a Server spawns per connection

use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::framing::Framer;
use crate::handler::Handler;
use crate::pool::IOOpPool;

const FRESH: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

struct SessionInner<M> {
    id: u64,
    stream: Arc<TcpStream>,
    send_lock: AsyncMutex<()>,
    state: AtomicU8,
    cancel: CancellationToken,
    io_pool: Arc<IOOpPool>,
    _message: PhantomData<fn() -> M>,
}

/// A handle to one live connection.
///
/// Cheap to clone (everything behind it is `Arc`-shared). This is what [`Handler`] callbacks
/// receive and what the [`crate::server::Server`]'s session registry stores, the receive loop
/// itself runs in a detached task driven by [`drive`], not on this type.
pub struct Session<M> {
    inner: Arc<SessionInner<M>>,
}

impl<M> Clone for Session<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Session<M> {
    pub(crate) fn new(
        id: u64,
        stream: Arc<TcpStream>,
        io_pool: Arc<IOOpPool>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                stream,
                send_lock: AsyncMutex::new(()),
                state: AtomicU8::new(FRESH),
                cancel,
                io_pool,
                _message: PhantomData,
            }),
        }
    }

    /// Stable identifier assigned by the [`crate::server::Server`] at accept time.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == RUNNING
    }

    /// Queues one send. Fails with [`SessionError::NotRunning`] if the session is not running.
    /// Concurrent callers are serialized internally so writes are never torn.
    pub async fn send(&self, payload: impl AsRef<[u8]>) -> Result<(), SessionError> {
        if self.inner.state.load(Ordering::Acquire) != RUNNING {
            return Err(SessionError::NotRunning);
        }
        let payload = payload.as_ref();
        let mut op = self.inner.io_pool.get()?;
        op.load_send(payload);

        let _guard = self.inner.send_lock.lock().await;
        let result = (&*self.inner.stream).write_all(op.as_slice()).await;
        drop(_guard);

        let _ = self.inner.io_pool.put(op);
        result.map_err(SessionError::Io)
    }

    /// Idempotent. Marks the session stopped and cancels its internal cancellation source,
    /// which unblocks the receive loop so it can perform the actual socket teardown and raise
    /// `on_disconnected` exactly once. Safe to call from outside the owning task (e.g. from
    /// `Server::dispose`) or from the receive loop's own teardown path.
    pub fn stop(&self) {
        self.inner.state.store(STOPPED, Ordering::Release);
        self.inner.cancel.cancel();
    }

    fn mark_running(&self) {
        self.inner.state.store(RUNNING, Ordering::Release);
    }
}

enum Termination {
    PeerClosed,
    FramingOverflow,
    Io(std::io::Error),
    Cancelled,
    HandlerPanicked,
}

/// Polls `fut`, catching a panic from inside it instead of letting it unwind through the caller.
/// Used around the two points where foreign `Handler` code runs inside the receive loop, so a
/// panicking callback still lets the loop reach its teardown convergence point.
struct CatchUnwind<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = std::thread::Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.get_mut().inner.as_mut();
        match std::panic::catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(poll) => poll.map(Ok),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}

async fn catch_panic<F: Future>(fut: F) -> std::thread::Result<F::Output> {
    CatchUnwind { inner: Box::pin(fut) }.await
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs one session's receive loop to completion: feeds the framer, drains complete messages
/// through `handler.on_message`, and on any terminal condition performs the single teardown
/// convergence point described in the session state machine (shutdown the socket, fire
/// `on_disconnected` exactly once).
///
/// Callers (the [`crate::server::Server`] accept loop) are expected to have already called
/// `handler.on_connected` and inserted the session into the registry before spawning this.
pub(crate) async fn drive<F, H>(session: Session<F::Message>, mut framer: F, recv_buffer_size: usize, handler: Arc<H>)
where
    F: Framer,
    H: Handler<F::Message>,
{
    session.mark_running();

    let mut op = match session.inner.io_pool.get() {
        Ok(op) => op,
        Err(_) => {
            warn!(session_id = session.id(), "io pool disposed before receive loop started");
            teardown(&session, &handler).await;
            return;
        }
    };

    let termination = 'receive: loop {
        tokio::select! {
            biased;
            () = session.inner.cancel.cancelled() => break 'receive Termination::Cancelled,
            read_result = (&*session.inner.stream).read(op.prepare_recv(recv_buffer_size)) => {
                match read_result {
                    Ok(0) => break 'receive Termination::PeerClosed,
                    Ok(n) => {
                        if let Err(err) = framer.feed(&op.as_slice()[..n]) {
                            debug!(session_id = session.id(), error = %err, "framing overflow");
                            break 'receive Termination::FramingOverflow;
                        }
                        loop {
                            match framer.next() {
                                Some(message) => {
                                    if let Err(payload) = catch_panic(handler.on_message(&session, message)).await {
                                        warn!(
                                            session_id = session.id(),
                                            panic = %panic_message(&*payload),
                                            "handler on_message panicked, disconnecting session"
                                        );
                                        break 'receive Termination::HandlerPanicked;
                                    }
                                    tokio::task::yield_now().await;
                                }
                                None => break,
                            }
                        }
                        if framer.is_poisoned() {
                            break 'receive Termination::FramingOverflow;
                        }
                    }
                    Err(err) => break 'receive Termination::Io(err),
                }
            }
        }
    };

    match &termination {
        Termination::PeerClosed => debug!(session_id = session.id(), "peer closed connection"),
        Termination::FramingOverflow => debug!(session_id = session.id(), "disconnecting after framing overflow"),
        Termination::Io(err) => warn!(session_id = session.id(), error = %err, "socket error"),
        Termination::Cancelled => debug!(session_id = session.id(), "session cancelled"),
        Termination::HandlerPanicked => debug!(session_id = session.id(), "disconnecting after handler panic"),
    }

    let _ = session.inner.io_pool.put(op);
    teardown(&session, &handler).await;
}

async fn teardown<M, H>(session: &Session<M>, handler: &Arc<H>)
where
    H: Handler<M>,
    M: Send + 'static,
{
    session.stop();
    let _ = (&*session.inner.stream).shutdown().await;
    if let Err(payload) = catch_panic(handler.on_disconnected(session)).await {
        warn!(
            session_id = session.id(),
            panic = %panic_message(&*payload),
            "handler on_disconnected panicked"
        );
    }
}
