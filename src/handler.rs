// ABOUTME: The user-supplied callback surface the Server delegates to: connect, message, disconnect
// ABOUTME: Implemented with native async fn in traits, matching this crate's style elsewhere

use std::future::Future;

use crate::session::Session;

/// Callbacks invoked by the [`crate::server::Server`] as sessions connect, produce messages, and
/// disconnect.
///
/// Callbacks run on whichever task observes the event, one task per session, so a single
/// `Handler` instance, shared behind an `Arc` across every session, must be safe to call
/// concurrently for different sessions.
///
/// If `on_message` or `on_disconnected` panics, the receive loop catches the unwind at the call
/// site, logs it, and still disconnects the session through the normal teardown path: the socket
/// is still shut down, `on_disconnected` still fires exactly once, and the session is still
/// removed from the server's registry. The panic never reaches the server or any other session.
pub trait Handler<M>: Send + Sync + 'static
where
    M: Send + 'static,
{
    /// Fired once, before the receive loop starts, after the session has been constructed but
    /// before it is inserted into the server's registry.
    fn on_connected(&self, session: &Session<M>) -> impl Future<Output = ()> + Send;

    /// Fired once per complete message, in byte-stream order.
    fn on_message(&self, session: &Session<M>, message: M) -> impl Future<Output = ()> + Send;

    /// Fired exactly once, after the last `on_message` observed for this session.
    fn on_disconnected(&self, session: &Session<M>) -> impl Future<Output = ()> + Send;
}
