//! # pathwise
//!
//! A trie-based HTTP request router for async Rust hosts.
//!
//! The router selects a handler by method and path, captures `:named` and
//! `*catch-all` parameters, and deals with the usual routing corner cases:
//! trailing-slash and case-fixing redirects, automatic `OPTIONS` and `405`
//! answers with a sorted `Allow` header, language prefixes negotiated from
//! `Accept-Language`, and per-request cancellation with deadlines.
//!
//! ## Quick Start
//!
//! ```rust
//! use pathwise::{Context, Method, Request, Response, Router, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pathwise::RouteError> {
//!     let mut router = Router::new();
//!     router.get("/hello/:name", |ctx: Context| async move {
//!         let name = ctx.param("name").unwrap_or("world").to_owned();
//!         Response::new(StatusCode::Ok).body(format!("Hello, {name}!"))
//!     })?;
//!
//!     // a host would parse this from the wire
//!     let response = router.route(Request::new(Method::Get, "/hello/ferris")).await;
//!     assert_eq!(response.text_content(), Some("Hello, ferris!"));
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod http;
pub mod negotiate;
pub mod pool;
pub mod router;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::{ContentLanguage, Context};
pub use http::request::RequestError;
pub use http::{Headers, Method, Request, Response, ResponseBuffer, StatusCode};
pub use negotiate::{NegotiationError, RankedList, TypeParam};
pub use router::{
    ConfigError, Endpoint, FileServer, Handler, IntoHandler, Param, Params, RequestScope, RouteError, Router,
    RouterConfig, StaticDir,
};
