use std::any::Any;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn ok() -> impl IntoHandler + Clone {
    |_ctx: Context| async { Response::new(StatusCode::Ok) }
}

fn reply(body: &'static str) -> impl IntoHandler + Clone {
    move |_ctx: Context| async move { Response::new(StatusCode::Ok).body(body) }
}

async fn explode(message: &'static str) -> Response {
    panic!("{message}")
}

fn boom(message: &'static str) -> impl IntoHandler {
    move |_ctx: Context| explode(message)
}

fn teapot() -> impl IntoHandler + Clone {
    |_ctx: Context| async { Response::new(StatusCode::ImATeapot) }
}

async fn send(router: &Router, method: &str, target: &str) -> Response {
    router.route(Request::new(method, target)).await
}

fn location(res: &Response) -> Option<&str> {
    res.headers().get("Location")
}

fn allow(res: &Response) -> Option<&str> {
    res.headers().get("Allow")
}

// ── matching ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn routes_request_with_params() {
    init_tracing();
    let mut router = Router::new();
    router
        .get("/user/:name", |ctx: Context| async move {
            let name = ctx.param("name").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(name)
        })
        .unwrap();

    let res = send(&router, "GET", "/user/gopher").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text_content(), Some("gopher"));
    assert!(router.params_pool.idle() > 0);
}

#[tokio::test]
async fn every_method_helper_registers() {
    let mut router = Router::new();
    router.get("/GET", reply("get")).unwrap();
    router.head("/HEAD", reply("head")).unwrap();
    router.options("/OPTIONS", reply("options")).unwrap();
    router.post("/POST", reply("post")).unwrap();
    router.put("/PUT", reply("put")).unwrap();
    router.patch("/PATCH", reply("patch")).unwrap();
    router.delete("/DELETE", reply("delete")).unwrap();
    router.register("PROPFIND", "/PROPFIND", false, reply("propfind")).unwrap();

    for method in ["GET", "HEAD", "OPTIONS", "POST", "PUT", "PATCH", "DELETE", "PROPFIND"] {
        let res = send(&router, method, &format!("/{method}")).await;
        assert_eq!(res.status(), StatusCode::Ok, "{method}");
        assert_eq!(res.text_content(), Some(method.to_lowercase().as_str()));
    }
}

#[tokio::test]
async fn params_absent_for_static_routes() {
    let mut router = Router::new();
    router
        .get("/user", |ctx: Context| async move {
            let body = if ctx.params().is_none() { "none" } else { "some" };
            Response::new(StatusCode::Ok).body(body)
        })
        .unwrap();
    router
        .get("/user/:name", |ctx: Context| async move {
            let count = ctx.params().map_or(0, Params::len);
            Response::new(StatusCode::Ok).body(count.to_string())
        })
        .unwrap();

    assert_eq!(send(&router, "GET", "/user").await.text_content(), Some("none"));
    assert_eq!(send(&router, "GET", "/user/ferris").await.text_content(), Some("1"));
}

#[tokio::test]
async fn endpoint_objects_route() {
    struct Counter(AtomicUsize);

    impl Endpoint for Counter {
        fn serve(self: Arc<Self>, _ctx: Context) -> HandlerFuture {
            Box::pin(async move {
                let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
                Response::new(StatusCode::Ok).body(n.to_string())
            })
        }
    }

    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    let mut router = Router::new();
    router.endpoint(Method::Get, "/count", false, Arc::clone(&counter)).unwrap();
    router.endpoint(Method::Post, "/count", false, Arc::clone(&counter)).unwrap();

    assert_eq!(send(&router, "GET", "/count").await.text_content(), Some("1"));
    assert_eq!(send(&router, "POST", "/count").await.text_content(), Some("2"));
}

#[tokio::test]
async fn shared_across_tasks() {
    let mut router = Router::new();
    router
        .get("/echo/:id", |ctx: Context| async move {
            let id = ctx.param("id").unwrap_or_default().to_owned();
            tokio::task::yield_now().await;
            Response::new(StatusCode::Ok).body(id)
        })
        .unwrap();
    let router = Arc::new(router);

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let res = router.route(Request::new(Method::Get, &format!("/echo/{i}"))).await;
                (i, res.text_content().map(str::to_owned))
            })
        })
        .collect();

    for task in tasks {
        let (i, body) = task.await.unwrap();
        assert_eq!(body, Some(i.to_string()));
    }
}

// ── registration ────────────────────────────────────────────────────────────

#[test]
fn invalid_registrations() {
    let mut router = Router::new();

    assert_eq!(
        router.register(Method::Custom(String::new()), "/", false, ok()),
        Err(RouteError::EmptyMethod)
    );
    assert_eq!(
        router.get("", ok()),
        Err(RouteError::MissingLeadingSlash { path: String::new() })
    );
    assert_eq!(
        router.get("noSlashRoot", ok()),
        Err(RouteError::MissingLeadingSlash {
            path: "noSlashRoot".into()
        })
    );

    struct Nothing;
    impl FileServer for Nothing {
        fn serve(self: Arc<Self>, _request: Request) -> HandlerFuture {
            Box::pin(async { Response::new(StatusCode::NotFound) })
        }
    }
    assert_eq!(
        router.serve_files("/noFilepath", Arc::new(Nothing)),
        Err(RouteError::FileServerPattern {
            path: "/noFilepath".into()
        })
    );
    assert!(router.trees.is_empty());
}

#[tokio::test]
async fn failed_registration_leaves_router_unchanged() {
    let mut router = Router::new();
    router.get("/dup", reply("first")).unwrap();
    router
        .get("/user/:name", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.param("name").unwrap_or_default().to_owned())
        })
        .unwrap();

    assert_eq!(router.get("/dup", reply("second")), Err(RouteError::Duplicate { path: "/dup".into() }));
    assert!(matches!(
        router.get("/user/:id", ok()),
        Err(RouteError::WildcardConflict { .. })
    ));
    assert!(matches!(
        router.put("/src/*filepath/x", ok()),
        Err(RouteError::CatchAllNotLast { .. })
    ));

    assert_eq!(send(&router, "GET", "/dup").await.text_content(), Some("first"));
    assert_eq!(send(&router, "GET", "/user/gopher").await.text_content(), Some("gopher"));
    assert!(!router.trees.contains_key(&Method::Put));
    assert_eq!(router.allowed("*", &Method::Options), "GET, OPTIONS");
}

#[test]
fn max_params_tracks_widest_pattern() {
    let mut router = Router::new();
    assert_eq!(router.max_params(), 0);
    router.get("/a/:b/:c", ok()).unwrap();
    router.get("/x/*y", ok()).unwrap();
    assert_eq!(router.max_params(), 2);
}

// ── lookup and introspection ────────────────────────────────────────────────

#[tokio::test]
async fn lookup() {
    let mut router = Router::new();

    let (handler, _, tsr) = router.lookup(&Method::Get, "/nope");
    assert!(handler.is_none());
    assert!(!tsr);

    router.get("/user/:name", reply("user")).unwrap();
    let (handler, params, _) = router.lookup(&Method::Get, "/user/gopher");
    let handler = handler.expect("handler for /user/:name");
    let res = handler(Context::new(Request::new(Method::Get, "/user/gopher"))).await;
    assert_eq!(res.text_content(), Some("user"));
    assert_eq!(params.as_ref().and_then(|p| p.by_name("name")), Some("gopher"));

    router.get("/user", reply("users")).unwrap();
    let (handler, params, _) = router.lookup(&Method::Get, "/user");
    assert!(handler.is_some());
    assert!(params.is_none());

    let (handler, _, tsr) = router.lookup(&Method::Get, "/user/gopher/");
    assert!(handler.is_none());
    assert!(tsr);

    let (handler, _, tsr) = router.lookup(&Method::Get, "/nope");
    assert!(handler.is_none());
    assert!(!tsr);

    let (handler, _, tsr) = router.lookup(&Method::Post, "/user");
    assert!(handler.is_none());
    assert!(!tsr);
}

struct EchoPath;

impl FileServer for EchoPath {
    fn serve(self: Arc<Self>, request: Request) -> HandlerFuture {
        Box::pin(async move { Response::new(StatusCode::Ok).body(request.path().to_owned()) })
    }
}

fn introspection_router() -> Router {
    let mut router = Router::new();
    router.put("/access/edit", ok()).unwrap();
    router.get("/access/edit/*params", ok()).unwrap();
    router.get("/panel", ok()).unwrap();
    router.get("/static/*filename", ok()).unwrap();
    router.get("/blog/:category/:post", ok()).unwrap();
    router.get("/foo/:post", ok()).unwrap();
    router.serve_files("/files/*filepath", Arc::new(EchoPath)).unwrap();
    router
}

#[test]
fn walk_routes_with_and_without_params() {
    let router = introspection_router();

    let mut seen = BTreeSet::new();
    router.walk_routes(false, |method, path, _| {
        seen.insert(format!("{method} {path}"));
        true
    });
    let want: BTreeSet<String> = [
        "PUT /access/edit",
        "GET /access/edit",
        "GET /panel",
        "GET /static",
        "GET /blog",
        "GET /files",
        "GET /foo",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(seen, want);

    let mut seen = BTreeSet::new();
    router.walk_routes(true, |method, path, _| {
        seen.insert(format!("{method} {path}"));
        true
    });
    let want: BTreeSet<String> = [
        "PUT /access/edit",
        "GET /access/edit/*params",
        "GET /panel",
        "GET /static/*filename",
        "GET /blog/:category/:post",
        "GET /files/*filepath",
        "GET /foo/:post",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(seen, want);
}

#[test]
fn walk_routes_stops_early() {
    let router = introspection_router();
    let mut visits = 0;
    router.walk_routes(true, |_, _, _| {
        visits += 1;
        false
    });
    assert_eq!(visits, 1);
}

#[test]
fn path_exists() {
    let router = introspection_router();
    for path in ["/access/edit", "/panel", "/static", "/blog", "/files"] {
        assert!(router.path_exists(path), "{path}");
    }
    assert!(!router.path_exists("/blá"));
    assert!(!router.path_exists("/access/edit/review"));
}

#[tokio::test]
async fn serve_files_rewrites_path() {
    let router = introspection_router();
    let res = send(&router, "GET", "/files/css/site.css").await;
    assert_eq!(res.text_content(), Some("/css/site.css"));
}

#[tokio::test]
async fn serve_files_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();

    let mut router = Router::new();
    router
        .serve_files("/static/*filepath", Arc::new(StaticDir::new(dir.path())))
        .unwrap();

    let res = send(&router, "GET", "/static/hello.txt").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text_content(), Some("hi there"));

    let res = send(&router, "GET", "/static/missing.txt").await;
    assert_eq!(res.status(), StatusCode::NotFound);
}

// ── OPTIONS, 405 and 404 ────────────────────────────────────────────────────

#[tokio::test]
async fn automatic_options() {
    let mut router = Router::new();
    router.post("/path", ok()).unwrap();

    let res = send(&router, "OPTIONS", "/path").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(allow(&res), Some("OPTIONS, POST"));
    assert!(res.content().is_empty());

    let res = send(&router, "OPTIONS", "*").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(allow(&res), Some("OPTIONS, POST"));

    let res = send(&router, "OPTIONS", "/doesnotexist").await;
    assert_eq!(res.status(), StatusCode::NotFound);

    router.delete("/path", ok()).unwrap();
    let res = send(&router, "OPTIONS", "/path").await;
    assert_eq!(allow(&res), Some("DELETE, OPTIONS, POST"));
    let res = send(&router, "OPTIONS", "*").await;
    assert_eq!(allow(&res), Some("DELETE, OPTIONS, POST"));

    // an explicit OPTIONS route wins
    router.options("/path", teapot()).unwrap();
    let res = send(&router, "OPTIONS", "/path").await;
    assert_eq!(res.status(), StatusCode::ImATeapot);
    assert_eq!(allow(&res), None);

    let res = send(&router, "OPTIONS", "*").await;
    assert_eq!(allow(&res), Some("DELETE, OPTIONS, POST"));
}

#[tokio::test]
async fn global_options_handler() {
    let mut router = Router::new().global_options(|_ctx: Context| async {
        Response::new(StatusCode::NoContent).header("Access-Control-Allow-Origin", "*")
    });
    router.post("/path", ok()).unwrap();

    let res = send(&router, "OPTIONS", "/path").await;
    assert_eq!(res.status(), StatusCode::NoContent);
    assert_eq!(allow(&res), Some("OPTIONS, POST"));
    assert_eq!(res.headers().get("Access-Control-Allow-Origin"), Some("*"));
}

#[tokio::test]
async fn options_disabled_falls_through() {
    let mut router = Router::new();
    router.config_mut().handle_options = false;
    router.post("/path", ok()).unwrap();

    let res = send(&router, "OPTIONS", "/path").await;
    assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    assert_eq!(allow(&res), Some("OPTIONS, POST"));
}

#[tokio::test]
async fn method_not_allowed() {
    let mut router = Router::new();
    router.post("/path", ok()).unwrap();

    let res = send(&router, "GET", "/path").await;
    assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    assert_eq!(allow(&res), Some("OPTIONS, POST"));
    assert_eq!(res.text_content(), Some("Method Not Allowed\n"));
    assert_eq!(res.headers().get("X-Content-Type-Options"), Some("nosniff"));

    router.delete("/path", ok()).unwrap();
    router.options("/path", ok()).unwrap();
    let res = send(&router, "GET", "/path").await;
    assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    assert_eq!(allow(&res), Some("DELETE, OPTIONS, POST"));

    let mut router = router.method_not_allowed(|_ctx: Context| async {
        Response::new(StatusCode::ImATeapot).body("custom")
    });
    let res = send(&router, "GET", "/path").await;
    assert_eq!(res.status(), StatusCode::ImATeapot);
    assert_eq!(res.text_content(), Some("custom"));
    assert_eq!(allow(&res), Some("DELETE, OPTIONS, POST"));

    router.config_mut().handle_method_not_allowed = false;
    let res = send(&router, "GET", "/path").await;
    assert_eq!(res.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn not_found_and_redirects() {
    let mut router = Router::new();
    router.get("/path", ok()).unwrap();
    router.get("/dir/", ok()).unwrap();
    router.get("/", ok()).unwrap();

    let cases = [
        ("/path/", StatusCode::MovedPermanently, Some("/path")),
        ("/dir", StatusCode::MovedPermanently, Some("/dir/")),
        ("/PATH", StatusCode::MovedPermanently, Some("/path")),
        ("/DIR/", StatusCode::MovedPermanently, Some("/dir/")),
        ("/PATH/", StatusCode::MovedPermanently, Some("/path")),
        ("/DIR", StatusCode::MovedPermanently, Some("/dir/")),
        ("/../path", StatusCode::MovedPermanently, Some("/path")),
        ("/nope", StatusCode::NotFound, None),
    ];
    for (target, status, want_location) in cases {
        let res = send(&router, "GET", target).await;
        assert_eq!(res.status(), status, "{target}");
        assert_eq!(location(&res), want_location, "{target}");
    }

    let res = send(&router, "GET", "/nope").await;
    assert_eq!(res.text_content(), Some("404 page not found\n"));
    assert_eq!(res.headers().get("Content-Type"), Some("text/plain; charset=utf-8"));
}

#[tokio::test]
async fn redirects_keep_method_and_query() {
    let mut router = Router::new();
    router.get("/path", ok()).unwrap();
    router.patch("/path", ok()).unwrap();

    let res = send(&router, "PATCH", "/path/").await;
    assert_eq!(res.status(), StatusCode::PermanentRedirect);
    assert_eq!(location(&res), Some("/path"));
    assert!(res.content().is_empty());

    let res = send(&router, "GET", "/path/?page=2&sort=asc").await;
    assert_eq!(res.status(), StatusCode::MovedPermanently);
    assert_eq!(location(&res), Some("/path?page=2&sort=asc"));
    let body = res.text_content().unwrap_or_default();
    assert!(body.contains("href=\"/path?page=2&amp;sort=asc\""), "{body}");

    let res = send(&router, "GET", "/PATH?q=1").await;
    assert_eq!(location(&res), Some("/path?q=1"));
}

#[tokio::test]
async fn redirects_can_be_disabled() {
    let config = RouterConfig::from_json(r#"{"redirect_trailing_slash": false, "redirect_fixed_path": false}"#).unwrap();
    let mut router = Router::from_config(config);
    router.get("/path", ok()).unwrap();

    assert_eq!(send(&router, "GET", "/path/").await.status(), StatusCode::NotFound);
    assert_eq!(send(&router, "GET", "/PATH").await.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn fixed_path_without_trailing_slash_fix() {
    let mut router = Router::new();
    router.config_mut().redirect_trailing_slash = false;
    router.get("/path", ok()).unwrap();

    let res = send(&router, "GET", "/PATH").await;
    assert_eq!(location(&res), Some("/path"));
    assert_eq!(send(&router, "GET", "/PATH/").await.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn root_and_connect_are_never_redirected() {
    let mut router = Router::new();
    router.get("/path", ok()).unwrap();
    router.register(Method::Connect, "/tunnel", false, ok()).unwrap();

    assert_eq!(send(&router, "GET", "/").await.status(), StatusCode::NotFound);
    assert_eq!(send(&router, "CONNECT", "/tunnel/").await.status(), StatusCode::NotFound);
    assert_eq!(send(&router, "CONNECT", "/tunnel").await.status(), StatusCode::Ok);
}

#[tokio::test]
async fn custom_not_found() {
    let router = Router::new().not_found(|ctx: Context| async move {
        Response::new(StatusCode::NotFound).body(format!("no {}", ctx.request().path()))
    });

    let res = send(&router, "GET", "/missing").await;
    assert_eq!(res.status(), StatusCode::NotFound);
    assert_eq!(res.text_content(), Some("no /missing"));
}

#[tokio::test]
async fn escaped_paths_match_decoded_patterns() {
    let mut router = Router::new();
    router
        .get("/search/:term", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.param("term").unwrap_or_default().to_owned())
        })
        .unwrap();
    router.get("/docs/a b", reply("spaced")).unwrap();

    let res = send(&router, "GET", "/search/a%20b").await;
    assert_eq!(res.text_content(), Some("a b"));
    assert_eq!(send(&router, "GET", "/docs/a%20b").await.text_content(), Some("spaced"));

    // the redirect target is escaped again
    let res = send(&router, "GET", "/docs/a%20b/?x=1").await;
    assert_eq!(res.status(), StatusCode::MovedPermanently);
    assert_eq!(location(&res), Some("/docs/a%20b?x=1"));
}

#[tokio::test]
async fn handler_headers_survive_commit() {
    let mut router = Router::new();
    router
        .get("/bye", |_ctx: Context| async {
            Response::new(StatusCode::Ok).header("Connection", "close").body("bye")
        })
        .unwrap();

    let res = send(&router, "GET", "/bye").await;
    assert_eq!(res.headers().get_all("connection").collect::<Vec<_>>(), ["close"]);
    let wire = String::from_utf8(res.into_bytes().to_vec()).unwrap();
    assert!(wire.contains("Connection: close\r\n"), "{wire}");
    assert!(!wire.contains("keep-alive"), "{wire}");
}

// ── languages ───────────────────────────────────────────────────────────────

fn localized_router() -> Router {
    let config = RouterConfig {
        supported_languages: ["en", "pt"].into_iter().map(String::from).collect(),
        default_language: Some("en".into()),
        ..RouterConfig::default()
    };
    let language = |ctx: Context| async move {
        let lang = ctx.content_language().unwrap_or("none").to_owned();
        Response::new(StatusCode::Ok).body(lang)
    };

    let mut router = Router::from_config(config);
    router.get_localized("/", language).unwrap();
    router.get_localized("/about", language).unwrap();
    router.register(Method::Post, "/form", true, language).unwrap();
    router.get("/plain", language).unwrap();
    router
}

async fn send_with_language(router: &Router, target: &str, accept: &str) -> Response {
    router
        .route(Request::new(Method::Get, target).header("Accept-Language", accept))
        .await
}

#[tokio::test]
async fn language_redirect_then_serve() {
    init_tracing();
    let router = localized_router();

    let res = send_with_language(&router, "/", "pt").await;
    assert_eq!(res.status(), StatusCode::MovedPermanently);
    assert_eq!(location(&res), Some("/pt/"));

    let res = send_with_language(&router, "/pt/", "pt").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text_content(), Some("pt"));

    let res = send(&router, "GET", "/").await;
    assert_eq!(location(&res), Some("/en/"));

    let res = send(&router, "GET", "/en/about").await;
    assert_eq!(res.text_content(), Some("en"));
}

#[tokio::test]
async fn language_negotiation() {
    let router = localized_router();

    let cases = [
        ("pt-BR, en;q=0.5", "/pt/about"),
        ("da, en-gb;q=0.8, en;q=0.7", "/en/about"),
        ("de", "/en/about"),
        ("en;q=abc", "/en/about"),
        ("*;q=0.1, en;q=0", "/pt/about"),
    ];
    for (accept, want) in cases {
        let res = send_with_language(&router, "/about", accept).await;
        assert_eq!(res.status(), StatusCode::MovedPermanently, "{accept}");
        assert_eq!(location(&res), Some(want), "{accept}");
    }
}

#[tokio::test]
async fn url_prefix_beats_header() {
    let router = localized_router();
    let res = send_with_language(&router, "/en/about", "pt").await;
    assert_eq!(res.text_content(), Some("en"));

    let res = send(&router, "GET", "/pt").await;
    assert_eq!(res.text_content(), Some("pt"));
}

#[tokio::test]
async fn language_redirect_details() {
    let router = localized_router();

    let res = router.route(Request::new(Method::Post, "/form")).await;
    assert_eq!(res.status(), StatusCode::TemporaryRedirect);
    assert_eq!(location(&res), Some("/en/form"));

    let res = send_with_language(&router, "/about?tab=team", "pt").await;
    assert_eq!(location(&res), Some("/pt/about?tab=team"));

    let res = send(&router, "GET", "/pt/ABOUT").await;
    assert_eq!(res.status(), StatusCode::MovedPermanently);
    assert_eq!(location(&res), Some("/pt/about"));
}

#[tokio::test]
async fn plain_routes_ignore_languages() {
    let router = localized_router();

    let res = send(&router, "GET", "/plain").await;
    assert_eq!(res.text_content(), Some("none"));

    let res = send(&router, "GET", "/pt/plain").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text_content(), Some("none"));

    let (handler, _, _) = router.lookup(&Method::Get, "/pt/about");
    assert!(handler.is_some());
}

#[tokio::test]
async fn default_language_outside_supported_set() {
    let config = RouterConfig::from_json(r#"{"supported_languages": ["en"], "default_language": "fr"}"#).unwrap();
    let mut router = Router::from_config(config);
    router
        .get_localized("/about", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.content_language().unwrap_or("none").to_owned())
        })
        .unwrap();

    let res = send(&router, "GET", "/about").await;
    assert_eq!(res.status(), StatusCode::MovedPermanently);
    assert_eq!(location(&res), Some("/fr/about"));

    let res = send(&router, "GET", "/fr/about").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text_content(), Some("fr"));

    let res = send_with_language(&router, "/about", "fr, en;q=0.5").await;
    assert_eq!(location(&res), Some("/fr/about"));
    let res = send_with_language(&router, "/about", "en, fr;q=0.5").await;
    assert_eq!(location(&res), Some("/en/about"));
}

#[tokio::test]
async fn no_default_language_disables_prefixes() {
    let mut router = Router::new();
    router
        .get_localized("/about", |ctx: Context| async move {
            Response::new(StatusCode::Ok).body(ctx.content_language().unwrap_or("none").to_owned())
        })
        .unwrap();

    assert_eq!(send(&router, "GET", "/about").await.text_content(), Some("none"));
    assert_eq!(send(&router, "GET", "/en/about").await.status(), StatusCode::NotFound);
}

// ── scopes, cancellation and panics ─────────────────────────────────────────

#[tokio::test]
async fn scoped_handler_completes() {
    let mut router = Router::new().request_scope(|_req: &Request| RequestScope::with_timeout(Duration::from_secs(5)));
    router
        .get("/live", |ctx: Context| async move {
            let body = match ctx.cancellation() {
                Some(token) if !token.is_cancelled() => "live",
                _ => "unscoped",
            };
            Response::new(StatusCode::Ok).header("X-Scoped", "yes").body(body)
        })
        .unwrap();

    let res = send(&router, "GET", "/live").await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text_content(), Some("live"));
    assert_eq!(res.headers().get("X-Scoped"), Some("yes"));
}

#[tokio::test]
async fn deadline_abandons_handler() {
    init_tracing();
    let finished = Arc::new(AtomicBool::new(false));
    let (token_tx, token_rx) = oneshot::channel::<CancellationToken>();
    let token_tx = Arc::new(parking_lot::Mutex::new(Some(token_tx)));

    let mut router =
        Router::new().request_scope(|_req: &Request| RequestScope::with_timeout(Duration::from_millis(20)));
    {
        let finished = Arc::clone(&finished);
        router
            .get("/slow", move |ctx: Context| {
                let finished = Arc::clone(&finished);
                let token_tx = Arc::clone(&token_tx);
                async move {
                    let tx = token_tx.lock().take();
                    if let (Some(tx), Some(token)) = (tx, ctx.cancellation()) {
                        let _ = tx.send(token.clone());
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    finished.store(true, Ordering::SeqCst);
                    Response::new(StatusCode::Ok)
                }
            })
            .unwrap();
    }

    let res = send(&router, "GET", "/slow").await;
    assert_eq!(res.status(), StatusCode::RequestTimeout);
    assert_eq!(res.text_content(), Some("Request Timeout\n"));

    let token = token_rx.await.unwrap();
    assert!(token.is_cancelled());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancelled_scope_answers_500() {
    let parent = CancellationToken::new();
    let mut router = {
        let parent = parent.clone();
        Router::new().request_scope(move |_req: &Request| RequestScope::with_token(parent.clone()))
    };
    router
        .get("/wait", |_ctx: Context| async {
            std::future::pending::<()>().await;
            Response::new(StatusCode::Ok)
        })
        .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        parent.cancel();
    });

    let res = send(&router, "GET", "/wait").await;
    assert_eq!(res.status(), StatusCode::InternalServerError);
    assert_eq!(res.text_content(), Some("Context canceled\n"));
}

#[tokio::test]
async fn timeout_from_config() {
    let config = RouterConfig::from_json(r#"{"handler_timeout_ms": 10}"#).unwrap();
    let mut router = Router::from_config(config);
    router
        .get("/slow", |_ctx: Context| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Response::new(StatusCode::Ok)
        })
        .unwrap();
    router
        .get("/slow/:id", |_ctx: Context| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Response::new(StatusCode::Ok)
        })
        .unwrap();

    assert_eq!(send(&router, "GET", "/slow").await.status(), StatusCode::RequestTimeout);
    // routes with parameters run inline, without a deadline
    assert_eq!(send(&router, "GET", "/slow/1").await.status(), StatusCode::Ok);
}

#[tokio::test]
async fn timeout_set_after_construction() {
    let mut router = Router::new();
    router
        .get("/slow", |_ctx: Context| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Response::new(StatusCode::Ok)
        })
        .unwrap();
    router.config_mut().handler_timeout_ms = Some(10);

    assert_eq!(send(&router, "GET", "/slow").await.status(), StatusCode::RequestTimeout);
}

#[tokio::test]
async fn explicit_scope_hook_wins_over_configured_timeout() {
    let config = RouterConfig::from_json(r#"{"handler_timeout_ms": 10}"#).unwrap();
    let mut router =
        Router::from_config(config).request_scope(|_req: &Request| RequestScope::with_timeout(Duration::from_secs(5)));
    router
        .get("/slowish", |_ctx: Context| async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Response::new(StatusCode::Ok)
        })
        .unwrap();

    assert_eq!(send(&router, "GET", "/slowish").await.status(), StatusCode::Ok);
}

fn recovering(handled: &Arc<AtomicBool>) -> Router {
    let handled = Arc::clone(handled);
    Router::new().panic_handler(move |buf: &mut ResponseBuffer, req: &Request, payload: Box<dyn Any + Send>| {
        handled.store(true, Ordering::SeqCst);
        buf.error(
            StatusCode::InternalServerError,
            &format!("{} {}: {}", req.method(), req.path(), panic_message(payload.as_ref())),
        );
    })
}

#[tokio::test]
async fn panic_hook_inline() {
    let handled = Arc::new(AtomicBool::new(false));
    let mut router = recovering(&handled);
    router
        .put("/user/:name", boom("oops!"))
        .unwrap();

    let res = send(&router, "PUT", "/user/gopher").await;
    assert!(handled.load(Ordering::SeqCst));
    assert_eq!(res.status(), StatusCode::InternalServerError);
    assert_eq!(res.text_content(), Some("PUT /user/gopher: oops!\n"));
}

#[tokio::test]
async fn panic_hook_in_scoped_task() {
    let handled = Arc::new(AtomicBool::new(false));
    let mut router = recovering(&handled).request_scope(|_req: &Request| RequestScope::new());
    router
        .get("/boom", boom("scoped boom"))
        .unwrap();

    let res = send(&router, "GET", "/boom").await;
    assert!(handled.load(Ordering::SeqCst));
    assert_eq!(res.text_content(), Some("GET /boom: scoped boom\n"));
}

#[tokio::test]
async fn panic_hook_covers_fallback_handlers() {
    let handled = Arc::new(AtomicBool::new(false));
    let router = recovering(&handled).not_found(boom("missing"));

    let res = send(&router, "GET", "/anything").await;
    assert!(handled.load(Ordering::SeqCst));
    assert_eq!(res.status(), StatusCode::InternalServerError);
}

#[tokio::test]
#[should_panic(expected = "unrecovered")]
async fn panics_propagate_without_hook() {
    let mut router = Router::new();
    router
        .get("/user/:name", boom("unrecovered"))
        .unwrap();
    send(&router, "GET", "/user/gopher").await;
}

#[tokio::test]
#[should_panic(expected = "unrecovered task")]
async fn scoped_panics_propagate_without_hook() {
    let mut router = Router::new().request_scope(|_req: &Request| RequestScope::new());
    router
        .get("/boom", boom("unrecovered task"))
        .unwrap();
    send(&router, "GET", "/boom").await;
}
