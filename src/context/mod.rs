//! Per-request context handed to handlers.
//!
//! Values the router attaches to a request (captured path parameters, the
//! negotiated language, the cancellation token of the request scope) live in a
//! type-keyed [`Extensions`] map, each under its own type, and are read back
//! through the typed accessors on [`Context`].

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use tokio_util::sync::CancellationToken;

use crate::router::Params;
use crate::Request;

/// Type-erased request extensions map, keyed by the stored value's type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the one previously stored under its type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions").field("len", &self.map.len()).finish()
    }
}

/// Language negotiated for an i18n route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLanguage(pub String);

/// Per-request context: the request plus whatever the router attached to it.
///
/// # Examples
///
/// ```
/// use pathwise::{Context, Method, Request};
///
/// let ctx = Context::new(Request::new(Method::Get, "/ping"));
/// assert_eq!(ctx.request().path(), "/ping");
/// assert!(ctx.params().is_none());
/// assert_eq!(ctx.content_language(), None);
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Debug)]
pub struct Context {
    request: Request,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Attaches a value to the request, replacing any previous value of its type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.extensions.insert(value);
    }

    /// Parameters captured by the matched route. `None` for routes without
    /// wildcards, which is different from an empty set.
    pub fn params(&self) -> Option<&Params> {
        self.extensions.get::<Params>()
    }

    /// Shorthand for `params()?.by_name(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params()?.by_name(name)
    }

    /// Language negotiated for an i18n route.
    pub fn content_language(&self) -> Option<&str> {
        self.extensions
            .get::<ContentLanguage>()
            .map(|lang| lang.0.as_str())
    }

    /// Token of the request scope, cancelled when the router stops waiting
    /// for this handler.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.extensions.get::<CancellationToken>()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation().is_some_and(CancellationToken::is_cancelled)
    }

    /// Deserialize the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}
