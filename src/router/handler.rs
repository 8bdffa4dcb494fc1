//! Handler types accepted by the router.

use std::any::Any;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::http::{Request, Response, ResponseBuffer};

/// Boxed future returned by every handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns a [`Response`].
///
/// Handlers are stored behind `Arc<dyn Fn(…)>` so they can be cloned into
/// spawned tasks and shared across threads without copying the closure. You
/// rarely build one directly: [`Router::get`](super::Router::get) and friends
/// take any [`IntoHandler`].
pub type Handler = Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl
/// below, so registration methods can accept `impl IntoHandler`.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> HandlerFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> HandlerFuture {
        Box::pin((self)(ctx))
    }
}

/// Erases the concrete handler type.
pub(crate) fn erase(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

/// A handler object, for state that outlives a closure or is shared between
/// several routes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use pathwise::router::{Endpoint, HandlerFuture};
/// use pathwise::{Context, Method, Response, Router, StatusCode};
///
/// struct Hits(AtomicUsize);
///
/// impl Endpoint for Hits {
///     fn serve(self: Arc<Self>, _ctx: Context) -> HandlerFuture {
///         Box::pin(async move {
///             let n = self.0.fetch_add(1, Ordering::Relaxed) + 1;
///             Response::new(StatusCode::Ok).body(n.to_string())
///         })
///     }
/// }
///
/// let mut router = Router::new();
/// router
///     .endpoint(Method::Get, "/hits", false, Arc::new(Hits(AtomicUsize::new(0))))
///     .unwrap();
/// ```
pub trait Endpoint: Send + Sync + 'static {
    fn serve(self: Arc<Self>, ctx: Context) -> HandlerFuture;
}

pub(crate) fn from_endpoint<E: Endpoint>(endpoint: Arc<E>) -> Handler {
    Arc::new(move |ctx| Arc::clone(&endpoint).serve(ctx))
}

/// Called with the in-flight buffer, the request and the panic payload when a
/// handler panics. Whatever it leaves in the buffer is the response.
pub type PanicHook = Arc<dyn Fn(&mut ResponseBuffer, &Request, Box<dyn Any + Send>) + Send + Sync>;

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "Box<dyn Any>"
    }
}
