// ABOUTME: Owns the listening socket, admission semaphore, session registry, and framing factory
// ABOUTME: Accepts connections up to max_connections, constructs sessions, and routes events to a Handler

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::framing::{Framer, FramerFactory};
use crate::handler::Handler;
use crate::pool::IOOpPool;
use crate::session::{self, Session};

const INITIAL_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(64);

type Registry<M> = Arc<StdMutex<HashMap<u64, Session<M>>>>;

/// Owns the listening socket, admission control, the live session registry, and the I/O-op pool.
///
/// `FF` is the [`FramerFactory`] that mints one fresh [`Framer`] per accepted connection; `H` is
/// the user-supplied [`Handler`] that every session's events are routed to.
pub struct Server<FF, H>
where
    FF: FramerFactory,
    H: Handler<<FF::Framer as Framer>::Message>,
{
    config: ServerConfig,
    framer_factory: FF,
    handler: Arc<H>,
    io_pool: Arc<IOOpPool>,
    admission: Arc<Semaphore>,
    registry: Registry<<FF::Framer as Framer>::Message>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    sessions: JoinSet<()>,
}

impl<FF, H> Server<FF, H>
where
    FF: FramerFactory,
    H: Handler<<FF::Framer as Framer>::Message>,
{
    /// Validates `config` and constructs a server that has not yet bound or accepted anything.
    pub fn new(config: ServerConfig, framer_factory: FF, handler: H) -> Result<Self, ServerError> {
        config.validate()?;
        let io_pool = Arc::new(IOOpPool::new(config.buffer_size));
        let admission = Arc::new(Semaphore::new(config.max_connections));
        Ok(Self {
            config,
            framer_factory,
            handler: Arc::new(handler),
            io_pool,
            admission,
            registry: Arc::new(StdMutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            sessions: JoinSet::new(),
        })
    }

    /// Number of sessions currently registered. Equals `max_connections` minus free admission
    /// permits while the server is running.
    pub fn live_session_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    /// A token that, when cancelled, stops the accept loop and every live session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Binds the configured endpoint without accepting anything yet. Split out from [`Self::run`]
    /// so callers that need the resolved local address (tests binding to port `0`, a supervisor
    /// logging the chosen port) can observe it before the accept loop starts.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind((self.config.ip_address.as_str(), self.config.port)).await?;
        info!(local_addr = ?listener.local_addr().ok(), "server listening");
        Ok(listener)
    }

    /// Binds to the configured endpoint and serves it. Equivalent to `self.bind()` followed by
    /// [`Self::serve`].
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on an already-bound `listener` until cancelled or until the accept
    /// backoff gives up.
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), ServerError> {
        let mut backoff = INITIAL_ACCEPT_BACKOFF;
        loop {
            // Reap finished session tasks so a long-running server doesn't accumulate one
            // JoinSet entry per connection ever served.
            while self.sessions.try_join_next().is_some() {}

            let permit = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("run cancelled, stopping accept loop");
                    return Err(ServerError::Cancelled);
                }
                permit = Arc::clone(&self.admission).acquire_owned() => {
                    permit.expect("admission semaphore is never closed while the server runs")
                }
            };

            let accepted = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    drop(permit);
                    info!("run cancelled, stopping accept loop");
                    return Err(ServerError::Cancelled);
                }
                res = listener.accept() => res,
            };

            match accepted {
                Ok((socket, peer_addr)) => {
                    backoff = INITIAL_ACCEPT_BACKOFF;
                    if let Err(err) = socket.set_nodelay(true) {
                        debug!(error = %err, "failed to set TCP_NODELAY");
                    }
                    self.spawn_session(socket, peer_addr, permit);
                }
                Err(err) => {
                    // The permit acquired for this attempt was never consumed by a session;
                    // release it so a later successful accept can use it.
                    drop(permit);
                    warn!(error = %err, "accept failed");
                    if backoff > MAX_ACCEPT_BACKOFF {
                        return Err(ServerError::Io(err));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    fn spawn_session(
        &mut self,
        socket: tokio::net::TcpStream,
        peer_addr: std::net::SocketAddr,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let framer = self.framer_factory.new_framer();
        let stream = Arc::new(socket);
        let session = Session::new(id, Arc::clone(&stream), Arc::clone(&self.io_pool), self.cancel.child_token());
        let handler = Arc::clone(&self.handler);
        let registry = Arc::clone(&self.registry);
        let recv_buffer_size = self.config.buffer_size;

        self.sessions.spawn(async move {
            handler.on_connected(&session).await;
            registry.lock().unwrap().insert(id, session.clone());

            session::drive(session, framer, recv_buffer_size, handler).await;

            registry.lock().unwrap().remove(&id);
            drop(permit);
            debug!(session_id = id, peer_addr = %peer_addr, "admission permit released");
        });
    }

    /// Closes the listener's accept loop (by cancelling the shared token, if `run` is still
    /// looping elsewhere), stops every live session, and awaits their termination. Idempotent:
    /// calling it again after every session has already finished is a no-op.
    pub async fn dispose(&mut self) {
        self.cancel.cancel();

        let live_sessions: Vec<_> = self.registry.lock().unwrap().values().cloned().collect();
        for session in live_sessions {
            session.stop();
        }

        while self.sessions.join_next().await.is_some() {}

        self.io_pool.dispose();
    }
}
