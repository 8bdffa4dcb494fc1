//! Request routing: HTTP methods and URL patterns to handlers.
//!
//! Every method gets its own radix tree ([`Node`]). Patterns can hold three
//! kinds of segments:
//!
//! | Pattern                  | Example match                   | Captured params                    |
//! |--------------------------|---------------------------------|------------------------------------|
//! | `/users`                 | `/users`                        | *(none)*                           |
//! | `/users/:id`             | `/users/42`                     | `id → "42"`                        |
//! | `/files/*filepath`       | `/files/docs/readme.txt`        | `filepath → "/docs/readme.txt"`    |
//!
//! A request path matches at most one route, so registration order does not
//! matter. When nothing matches, the router tries, in order: a redirect to the
//! same path with the trailing slash toggled, a redirect to the cleaned and
//! case-corrected path, an automatic `OPTIONS` answer, `405 Method Not
//! Allowed` with an `Allow` header, and finally `404`.

mod config;
mod error;
mod files;
mod handler;
mod params;
mod path;
mod scope;
mod tree;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::context::{Context, ContentLanguage};
use crate::http::request::target_with_query;
use crate::negotiate::RankedList;
use crate::pool::Pool;
use crate::{Method, Request, Response, ResponseBuffer, StatusCode};

pub use config::{ConfigError, RouterConfig};
pub use error::RouteError;
pub use files::{FileServer, StaticDir};
pub use handler::{panic_message, Endpoint, Handler, HandlerFuture, IntoHandler, PanicHook};
pub use params::{Param, Params};
pub use path::clean_path;
use path::escape_path;
pub use scope::{RequestScope, ScopeHook};
pub use tree::{count_params, Lookup, Node};

/// Idle parameter buffers kept for reuse.
const PARAMS_POOL_SIZE: usize = 256;

// What the trees store for each registered pattern.
#[derive(Clone)]
struct Route {
    handler: Handler,
    i18n: bool,
    params: usize,
}

// Why the router stopped waiting for a scoped handler.
enum Abandoned {
    Cancelled,
    TimedOut,
}

/// HTTP request router dispatching requests to registered handlers.
///
/// Routes are added through `&mut self` before serving; [`route`](Router::route)
/// only needs `&self`, so a configured router is usually wrapped in an `Arc`
/// and shared by every connection task.
///
/// # Examples
///
/// ```
/// use pathwise::{Context, Method, Request, Response, Router, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), pathwise::RouteError> {
/// let mut router = Router::new();
/// router.get("/ping", |_ctx: Context| async { Response::new(StatusCode::Ok).body("pong") })?;
/// router.get("/users/:id", |ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// })?;
///
/// let res = router.route(Request::new(Method::Get, "/users/42")).await;
/// assert_eq!(res.text_content(), Some("42"));
///
/// let res = router.route(Request::new(Method::Get, "/ping/")).await;
/// assert_eq!(res.status(), StatusCode::MovedPermanently);
/// assert_eq!(res.headers().get("Location"), Some("/ping"));
/// # Ok(())
/// # }
/// ```
pub struct Router {
    trees: HashMap<Method, Node<Route>>,
    max_params: usize,
    params_pool: Arc<Pool<Vec<Param>>>,
    global_allowed: String,
    config: RouterConfig,
    not_found: Option<Handler>,
    method_not_allowed: Option<Handler>,
    global_options: Option<Handler>,
    panic_hook: Option<PanicHook>,
    scope_hook: Option<ScopeHook>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&str> = self.trees.keys().map(Method::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("Router")
            .field("methods", &methods)
            .field("max_params", &self.max_params)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Router {
    /// An empty router with the default [`RouterConfig`]: every redirect and
    /// automatic reply enabled, English as the only supported language.
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            max_params: 0,
            params_pool: Arc::new(Pool::new(PARAMS_POOL_SIZE)),
            global_allowed: String::new(),
            config: RouterConfig::default(),
            not_found: None,
            method_not_allowed: None,
            global_options: None,
            panic_hook: None,
            scope_hook: None,
        }
    }

    pub fn from_config(config: RouterConfig) -> Self {
        Self::new().with_config(config)
    }

    #[must_use]
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Changes apply to the next request, including `handler_timeout_ms`.
    pub fn config_mut(&mut self) -> &mut RouterConfig {
        &mut self.config
    }

    /// Handler for requests nothing else answered. Defaults to a plain
    /// `404 page not found`.
    #[must_use]
    pub fn not_found(mut self, handler: impl IntoHandler) -> Self {
        self.not_found = Some(handler::erase(handler));
        self
    }

    /// Handler for `405` answers. The `Allow` header is already set on the
    /// response when it runs.
    #[must_use]
    pub fn method_not_allowed(mut self, handler: impl IntoHandler) -> Self {
        self.method_not_allowed = Some(handler::erase(handler));
        self
    }

    /// Handler for automatic `OPTIONS` answers. Routes registered for
    /// `OPTIONS` take precedence.
    #[must_use]
    pub fn global_options(mut self, handler: impl IntoHandler) -> Self {
        self.global_options = Some(handler::erase(handler));
        self
    }

    /// Recovers handler panics. The hook decides the response; without one a
    /// panic propagates to whoever awaits [`route`](Router::route).
    #[must_use]
    pub fn panic_handler<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ResponseBuffer, &Request, Box<dyn std::any::Any + Send>) + Send + Sync + 'static,
    {
        self.panic_hook = Some(Arc::new(hook));
        self
    }

    /// Derives a cancellation scope for each request. Handlers of routes
    /// without parameters then run in their own task and are abandoned when
    /// the scope is cancelled (`500`) or its deadline passes (`408`).
    ///
    /// Without a hook, a configured `handler_timeout_ms` gives every request
    /// a scope with that deadline.
    #[must_use]
    pub fn request_scope<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request) -> RequestScope + Send + Sync + 'static,
    {
        self.scope_hook = Some(Arc::new(hook));
        self
    }

    /// Registers `handler` for `method` and `pattern`.
    ///
    /// With `i18n` set and a default language configured, the route is also
    /// reachable below a language prefix (`/pt/about` for `/about`), and
    /// requests without one are redirected to the negotiated language.
    ///
    /// A failed registration leaves the router unchanged.
    ///
    /// # Errors
    ///
    /// [`RouteError`] when the method is empty, the pattern does not start
    /// with `/`, is malformed, or conflicts with a registered pattern.
    pub fn register(
        &mut self,
        method: impl Into<Method>,
        pattern: &str,
        i18n: bool,
        handler: impl IntoHandler,
    ) -> Result<(), RouteError> {
        self.insert(method.into(), pattern, i18n, handler::erase(handler))
    }

    /// Registers a handler object, see [`Endpoint`].
    pub fn endpoint<E: Endpoint>(
        &mut self,
        method: impl Into<Method>,
        pattern: &str,
        i18n: bool,
        endpoint: Arc<E>,
    ) -> Result<(), RouteError> {
        self.insert(method.into(), pattern, i18n, handler::from_endpoint(endpoint))
    }

    fn insert(&mut self, method: Method, pattern: &str, i18n: bool, handler: Handler) -> Result<(), RouteError> {
        if method.as_str().is_empty() {
            return Err(RouteError::EmptyMethod);
        }
        if !pattern.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash {
                path: pattern.to_owned(),
            });
        }

        let params = count_params(pattern);
        let is_new = !self.trees.contains_key(&method);
        let mut tree = self.trees.get(&method).cloned().unwrap_or_default();
        tree.add_route(
            pattern,
            Route {
                handler,
                i18n,
                params,
            },
        )?;

        debug!(method = %method, pattern, i18n, "route registered");
        self.trees.insert(method, tree);
        if is_new {
            self.global_allowed = self.compute_global_allowed();
        }
        self.max_params = self.max_params.max(params);
        Ok(())
    }

    pub fn get(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Get, pattern, false, handler)
    }

    /// `GET` route answering below language prefixes, see
    /// [`register`](Router::register).
    pub fn get_localized(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Get, pattern, true, handler)
    }

    pub fn head(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Head, pattern, false, handler)
    }

    pub fn post(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Post, pattern, false, handler)
    }

    pub fn put(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Put, pattern, false, handler)
    }

    pub fn patch(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Patch, pattern, false, handler)
    }

    pub fn delete(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Delete, pattern, false, handler)
    }

    pub fn options(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<(), RouteError> {
        self.register(Method::Options, pattern, false, handler)
    }

    /// Serves files from `server` under a pattern ending in `/*filepath`.
    ///
    /// The request reaching the server has its path replaced by the captured
    /// `filepath`, so `/static/*filepath` hands `/css/site.css` to the server
    /// for `/static/css/site.css`.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use pathwise::{Router, router::StaticDir};
    ///
    /// let mut router = Router::new();
    /// router.serve_files("/static/*filepath", Arc::new(StaticDir::new("public"))).unwrap();
    /// assert!(router.serve_files("/static", Arc::new(StaticDir::new("public"))).is_err());
    /// ```
    pub fn serve_files<S: FileServer>(&mut self, pattern: &str, server: Arc<S>) -> Result<(), RouteError> {
        if !pattern.ends_with("/*filepath") {
            return Err(RouteError::FileServerPattern {
                path: pattern.to_owned(),
            });
        }

        self.get(pattern, move |ctx: Context| {
            let server = Arc::clone(&server);
            async move {
                let filepath = ctx.param("filepath").unwrap_or("/").to_owned();
                let mut request = ctx.into_request();
                request.set_path(filepath);
                server.serve(request).await
            }
        })
    }

    /// Largest number of wildcards in any registered pattern.
    pub fn max_params(&self) -> usize {
        self.max_params
    }

    /// Finds the handler for `method` and `path` without running it.
    ///
    /// Returns the handler, the captured parameters (`None` for patterns
    /// without wildcards) and whether a route exists for the path with its
    /// trailing slash toggled.
    pub fn lookup(&self, method: &Method, path: &str) -> (Option<Handler>, Option<Params>, bool) {
        let (_, path) = self.split_language(path);
        let Some(tree) = self.trees.get(method) else {
            return (None, None, false);
        };
        let (route, params, tsr) = self.resolve(tree, path);
        (route.map(|r| Arc::clone(&r.handler)), params, tsr)
    }

    fn resolve<'r>(&self, tree: &'r Node<Route>, path: &str) -> (Option<&'r Route>, Option<Params>, bool) {
        let mut params = (self.max_params > 0).then(|| Params::pooled(&self.params_pool, self.max_params));
        let Lookup { value, tsr } = tree.get_value(path, params.as_mut());
        match value {
            Some(route) if route.params > 0 => (Some(route), params, tsr),
            other => (other, None, tsr),
        }
    }

    /// Splits a supported language off the front of `path` when a default
    /// language is configured: `/pt/a/` gives `(Some("pt"), "/a/")` and `/pt`
    /// gives `(Some("pt"), "/")`.
    fn split_language<'p>(&self, path: &'p str) -> (Option<&'p str>, &'p str) {
        if self.config.default_language.is_none() {
            return (None, path);
        }
        let Some(rest) = path.strip_prefix('/') else {
            return (None, path);
        };
        let (segment, tail) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if segment.is_empty() || !self.config.supports(segment) {
            return (None, path);
        }
        (Some(segment), tail)
    }

    /// Comma separated, sorted methods other than `method` that have a route
    /// for `path`, plus `OPTIONS`; empty when there are none. For `*` every
    /// registered method counts.
    pub fn allowed(&self, path: &str, method: &Method) -> String {
        if path == "*" {
            return self.global_allowed.clone();
        }

        let methods = self
            .trees
            .iter()
            .filter(|(m, _)| *m != method && **m != Method::Options)
            .filter(|(_, tree)| tree.get_value(path, None).value.is_some())
            .map(|(m, _)| m.as_str())
            .collect();
        join_allowed(methods)
    }

    fn compute_global_allowed(&self) -> String {
        let methods = self
            .trees
            .keys()
            .filter(|m| **m != Method::Options)
            .map(Method::as_str)
            .collect();
        join_allowed(methods)
    }

    /// Whether some route answers `path` exactly, or `path` is the static
    /// stem of a wildcard route.
    pub fn path_exists(&self, path: &str) -> bool {
        self.trees.values().any(|tree| tree.contains_prefix(path))
    }

    /// Calls `visit` for every registered route, methods in alphabetical
    /// order, until it returns `false`. Without `include_params` wildcard
    /// patterns are reported by their static stem.
    pub fn walk_routes<F>(&self, include_params: bool, mut visit: F)
    where
        F: FnMut(&Method, &str, &Handler) -> bool,
    {
        let mut trees: Vec<_> = self.trees.iter().collect();
        trees.sort_unstable_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));

        for (method, tree) in trees {
            let keep_going = tree.walk(include_params, &mut |path, route: &Route| {
                visit(method, path, &route.handler)
            });
            if !keep_going {
                return;
            }
        }
    }

    /// Dispatches `request` and returns the response to send.
    ///
    /// This is the whole host contract: a server parses a request, awaits
    /// this, and writes the result.
    pub async fn route(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_owned();

        let response = self.dispatch(request).await;

        info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed = ?started.elapsed(),
            "request served"
        );
        response
    }

    async fn dispatch(&self, request: Request) -> Response {
        let method = request.method().clone();
        let raw = request.path().to_owned();
        let (lang, path) = self.split_language(&raw);

        if let Some(tree) = self.trees.get(&method) {
            let (route, params, tsr) = self.resolve(tree, path);

            if let Some(route) = route {
                let mut ctx = Context::new(request);
                if route.i18n {
                    if let Some(default) = &self.config.default_language {
                        match lang {
                            Some(lang) => ctx.insert(ContentLanguage(lang.to_owned())),
                            None => {
                                let chosen = self.negotiate_language(ctx.request()).unwrap_or(default.as_str());
                                let status = if method == Method::Get {
                                    StatusCode::MovedPermanently
                                } else {
                                    StatusCode::TemporaryRedirect
                                };
                                return redirect(ctx.request(), &format!("/{chosen}{raw}"), status);
                            }
                        }
                    }
                }
                return self.execute(route, params, ctx).await;
            }

            if !method.is_tunnel() && path != "/" && path != "*" {
                let status = if method == Method::Get {
                    StatusCode::MovedPermanently
                } else {
                    StatusCode::PermanentRedirect
                };

                if tsr && self.config.redirect_trailing_slash {
                    return redirect(&request, &toggle_trailing_slash(&raw), status);
                }

                if self.config.redirect_fixed_path {
                    let fixed = tree.find_case_insensitive_path(&clean_path(path), self.config.redirect_trailing_slash);
                    if let Some(fixed) = fixed {
                        let location = match lang {
                            Some(lang) => format!("/{lang}{fixed}"),
                            None => fixed,
                        };
                        return redirect(&request, &location, status);
                    }
                }
            }
        }

        let mut buffer = ResponseBuffer::new();

        if method == Method::Options && self.config.handle_options {
            let allow = self.allowed(path, &Method::Options);
            if !allow.is_empty() {
                buffer.headers_mut().set("Allow", allow);
                if let Some(handler) = &self.global_options {
                    invoke(handler, Context::new(request), self.panic_hook.as_ref(), &mut buffer).await;
                }
                return buffer.commit();
            }
        } else if self.config.handle_method_not_allowed {
            let allow = self.allowed(path, &method);
            if !allow.is_empty() {
                buffer.headers_mut().set("Allow", allow);
                match &self.method_not_allowed {
                    Some(handler) => {
                        invoke(handler, Context::new(request), self.panic_hook.as_ref(), &mut buffer).await
                    }
                    None => buffer.error(StatusCode::MethodNotAllowed, "Method Not Allowed"),
                }
                return buffer.commit();
            }
        }

        match &self.not_found {
            Some(handler) => invoke(handler, Context::new(request), self.panic_hook.as_ref(), &mut buffer).await,
            None => buffer.error(StatusCode::NotFound, "404 page not found"),
        }
        buffer.commit()
    }

    /// Best supported language for the request's `Accept-Language`, if any.
    fn negotiate_language(&self, request: &Request) -> Option<&str> {
        let header = request.headers().get("Accept-Language")?.to_lowercase();
        if header.trim().is_empty() {
            return None;
        }
        match RankedList::parse_languages(&header) {
            Ok(ranked) => ranked.find_best(self.config.languages()),
            Err(err) => {
                debug!(error = %err, header = %header, "ignoring malformed Accept-Language");
                None
            }
        }
    }

    async fn execute(&self, route: &Route, params: Option<Params>, mut ctx: Context) -> Response {
        let mut buffer = ResponseBuffer::new();
        match params {
            Some(params) => {
                ctx.insert(params);
                invoke(&route.handler, ctx, self.panic_hook.as_ref(), &mut buffer).await;
            }
            None => match self.scope_for(ctx.request()) {
                Some(scope) => buffer = self.run_scoped(Arc::clone(&route.handler), ctx, scope).await,
                None => invoke(&route.handler, ctx, self.panic_hook.as_ref(), &mut buffer).await,
            },
        }
        buffer.commit()
    }

    fn scope_for(&self, request: &Request) -> Option<RequestScope> {
        match &self.scope_hook {
            Some(hook) => Some(hook(request)),
            None => self.config.handler_timeout().map(RequestScope::with_timeout),
        }
    }

    /// Runs the handler in its own task and waits for it, the scope's
    /// cancellation, or the scope's deadline, whichever comes first.
    async fn run_scoped(&self, handler: Handler, mut ctx: Context, scope: RequestScope) -> ResponseBuffer {
        let token = scope.token().child_token();
        ctx.insert(token.clone());
        let method = ctx.request().method().clone();
        let path = ctx.request().path().to_owned();

        let mut task = tokio::spawn(invoke_owned(handler, ctx, self.panic_hook.clone()));
        let deadline = scope.deadline();
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let reason = tokio::select! {
            biased;
            joined = &mut task => {
                return match joined {
                    Ok(buffer) => buffer,
                    Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
                    Err(err) => {
                        warn!(method = %method, path = %path, error = %err, "handler task stopped");
                        let mut buffer = ResponseBuffer::new();
                        buffer.error(StatusCode::InternalServerError, "Internal Server Error");
                        buffer
                    }
                };
            }
            () = scope.token().cancelled() => Abandoned::Cancelled,
            () = expired => Abandoned::TimedOut,
        };

        token.cancel();
        task.abort();

        let mut buffer = ResponseBuffer::new();
        match reason {
            Abandoned::Cancelled => {
                debug!(method = %method, path = %path, "request scope cancelled, handler abandoned");
                buffer.error(StatusCode::InternalServerError, "Context canceled");
            }
            Abandoned::TimedOut => {
                debug!(method = %method, path = %path, "request deadline exceeded, handler abandoned");
                buffer.error(StatusCode::RequestTimeout, StatusCode::RequestTimeout.canonical_reason());
            }
        }
        buffer
    }
}

/// Runs `handler` and folds its response into `buffer`, handing panics to
/// `panic_hook` when there is one.
async fn invoke(handler: &Handler, ctx: Context, panic_hook: Option<&PanicHook>, buffer: &mut ResponseBuffer) {
    let request = panic_hook.map(|_| ctx.request().clone());

    match AssertUnwindSafe(async move { handler(ctx).await }).catch_unwind().await {
        Ok(response) => buffer.absorb(response),
        Err(payload) => {
            let (Some(hook), Some(request)) = (panic_hook, request) else {
                panic::resume_unwind(payload);
            };
            warn!(
                method = %request.method(),
                path = %request.path(),
                panic = panic_message(payload.as_ref()),
                "handler panicked"
            );
            hook(buffer, &request, payload);
        }
    }
}

async fn invoke_owned(handler: Handler, ctx: Context, panic_hook: Option<PanicHook>) -> ResponseBuffer {
    let mut buffer = ResponseBuffer::new();
    invoke(&handler, ctx, panic_hook.as_ref(), &mut buffer).await;
    buffer
}

fn redirect(request: &Request, path: &str, status: StatusCode) -> Response {
    let location = target_with_query(&escape_path(path), request.query_string());
    debug!(
        method = %request.method(),
        from = %request.path(),
        to = %location,
        status = status.as_u16(),
        "redirecting"
    );
    let mut buffer = ResponseBuffer::new();
    buffer.redirect(&location, status, request.method());
    buffer.commit()
}

fn toggle_trailing_slash(path: &str) -> String {
    match path.strip_suffix('/') {
        Some(trimmed) if path.len() > 1 => trimmed.to_owned(),
        _ => format!("{path}/"),
    }
}

fn join_allowed(mut methods: Vec<&str>) -> String {
    if methods.is_empty() {
        return String::new();
    }
    methods.push("OPTIONS");
    methods.sort_unstable();
    methods.join(", ")
}
