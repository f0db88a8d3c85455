//! Dispatch integration tests.
//!
//! These tests drive a dispatcher end-to-end through the axum router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use session_mux::api::{create_router, create_router_with_state, AppState};
use session_mux::{
    Context, Continuation, Control, Dispatcher, MemoryBackend, MemoryConfig, MethodMask,
    Response as MuxResponse, Session, SessionBackend, SessionEvent, SessionEventFn,
};
use tower::ServiceExt;

/// Helper to create a bodiless request.
fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Helper to send a request through a clone of the router.
async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

/// Helper to extract body as string.
async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).to_string()
}

/// The `name=value` pair of the first Set-Cookie header.
fn cookie_pair(response: &axum::response::Response) -> String {
    let line = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    line.split(';').next().unwrap().to_string()
}

// ============================================================================
// Pipeline Scenarios
// ============================================================================

#[tokio::test]
async fn test_filter_sets_value_for_handler() {
    let mut mux = Dispatcher::new("");
    mux.filter_fn("/f1/.*", |ctx: &mut Context| {
        ctx.set_value("a", "123");
        Control::Continue
    })
    .unwrap();
    mux.handle_fn("/f1/h1", |ctx: &mut Context| {
        let a = ctx.str_value("a").unwrap_or_default();
        ctx.print(a)
    })
    .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/f1/h1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_text(response).await, "123");
}

#[tokio::test]
async fn test_two_handlers_on_one_path() {
    let mut mux = Dispatcher::new("");
    mux.handle_fn("/f2/h1", |ctx: &mut Context| {
        ctx.set_value("a", "123");
        Control::Continue
    })
    .unwrap();
    mux.handle_fn("/f2/h1", |ctx: &mut Context| {
        let a = ctx.str_value("a").unwrap_or_default();
        ctx.print(a)
    })
    .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/f2/h1")).await;
    assert_eq!(response_text(response).await, "123");
}

#[tokio::test]
async fn test_method_restricted_filter_is_not_found() {
    let mut mux = Dispatcher::new("");
    mux.filter_method_fn("/notm/", |_: &mut Context| Control::Return, Method::POST)
        .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/notm/")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(
        response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
    assert_eq!(response_text(response).await, "404 page not found\n");
}

#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let mut mux = Dispatcher::new("");
    mux.handle_fn("^/known$", |ctx: &mut Context| ctx.print("known"))
        .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/unknown")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_method_mask_never_runs_outside_mask() {
    let mut mux = Dispatcher::new("");
    let mask: MethodMask = "GET,POST".parse().unwrap();
    mux.handle_method_fn("^/masked$", |ctx: &mut Context| ctx.print("hit"), mask)
        .unwrap();
    let app = create_router(Arc::new(mux));

    for (method, expected) in [
        (Method::GET, StatusCode::OK),
        (Method::POST, StatusCode::OK),
        (Method::PUT, StatusCode::NOT_FOUND),
        (Method::DELETE, StatusCode::NOT_FOUND),
        (Method::PATCH, StatusCode::NOT_FOUND),
    ] {
        let response = send(&app, request(method.clone(), "/masked")).await;
        assert_eq!(response.status(), expected, "method {}", method);
    }
}

#[tokio::test]
async fn test_entries_run_in_registration_order() {
    let mut mux = Dispatcher::new("");
    for i in 0..5 {
        mux.filter_fn("^/order$", move |ctx: &mut Context| {
            ctx.response_mut().write_str(&format!("f{}", i));
            Control::Continue
        })
        .unwrap();
    }
    for i in 0..3 {
        mux.handle_fn("^/order$", move |ctx: &mut Context| {
            ctx.response_mut().write_str(&format!("h{}", i));
            Control::Continue
        })
        .unwrap();
    }
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/order")).await;
    assert_eq!(response_text(response).await, "f0f1f2f3f4h0h1h2");
}

#[tokio::test]
async fn test_prefix_is_stripped_before_matching() {
    let mut mux = Dispatcher::new("/t");
    mux.handle_fn("^/abc$", |ctx: &mut Context| ctx.print("abc"))
        .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/t/abc")).await;
    assert_eq!(response_text(response).await, "abc");
}

// ============================================================================
// Context Helpers
// ============================================================================

#[tokio::test]
async fn test_redirect() {
    let mut mux = Dispatcher::new("");
    mux.handle_fn("^/redirect/$", |ctx: &mut Context| ctx.redirect("/abc/"))
        .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/redirect/")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/abc/");
}

#[tokio::test]
async fn test_form_argument() {
    let mut mux = Dispatcher::new("");
    mux.handle_method_fn(
        "^/form$",
        |ctx: &mut Context| {
            let name = ctx.argument("name").unwrap_or_default();
            let page = ctx.argument("page").unwrap_or_default();
            ctx.print(format!("{}:{}", name, page))
        },
        Method::POST,
    )
    .unwrap();
    let app = create_router(Arc::new(mux));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/form?page=2")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=bob"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response_text(response).await, "bob:2");
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let mut mux = Dispatcher::new("");
    mux.handle_fn(".*", |ctx: &mut Context| ctx.print("ok")).unwrap();
    let app = create_router_with_state(
        AppState::new(Arc::new(mux)).with_max_body_bytes(4),
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .body(Body::from("0123456789"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ============================================================================
// Legacy Handlers
// ============================================================================

#[tokio::test]
async fn test_legacy_fall_through_and_terminate() {
    let mut mux = Dispatcher::new("");
    mux.handle_legacy_fn(
        "^/legacy$",
        |_: &session_mux::Request, response: &mut MuxResponse| response.write_str("a"),
        Continuation::FallThrough,
    )
    .unwrap();
    mux.handle_legacy_fn(
        "^/legacy$",
        |_: &session_mux::Request, response: &mut MuxResponse| response.write_str("b"),
        Continuation::Terminate,
    )
    .unwrap();
    mux.handle_fn("^/legacy$", |ctx: &mut Context| ctx.print("c"))
        .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/legacy")).await;
    assert_eq!(response_text(response).await, "ab");
}

#[tokio::test]
async fn test_legacy_handler_finds_its_session() {
    let mut mux = Dispatcher::new("");
    mux.filter_fn(".*", |ctx: &mut Context| {
        ctx.set_value("user", "alice");
        Control::Continue
    })
    .unwrap();
    let bindings = mux.bindings();
    mux.handle_legacy_fn(
        "^/who$",
        move |request: &session_mux::Request, response: &mut MuxResponse| {
            let user = bindings
                .session(request.handle())
                .and_then(|session| session.str_value("user"))
                .unwrap_or_default();
            response.write_str(&user);
        },
        Continuation::Terminate,
    )
    .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/who")).await;
    assert_eq!(response_text(response).await, "alice");
}

// ============================================================================
// In-flight Bindings
// ============================================================================

#[tokio::test]
async fn test_binding_cleared_after_early_return() {
    let mut mux = Dispatcher::new("");
    let bindings = mux.bindings();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_in_filter = observed.clone();
    mux.filter_fn(".*", move |ctx: &mut Context| {
        let handle = ctx.request().handle();
        observed_in_filter
            .lock()
            .unwrap()
            .push((handle, bindings.contains(handle)));
        ctx.print("stop")
    })
    .unwrap();
    mux.handle_fn(".*", |ctx: &mut Context| ctx.print("unreachable"))
        .unwrap();
    let mux = Arc::new(mux);
    let app = create_router(mux.clone());

    let response = send(&app, request(Method::GET, "/anything")).await;
    assert_eq!(response_text(response).await, "stop");

    let (handle, was_bound) = observed.lock().unwrap()[0];
    assert!(was_bound);
    assert!(mux.request_session(handle).is_none());
    assert!(mux.bindings().is_empty());
}

#[tokio::test]
async fn test_panicking_handler_returns_500_and_unbinds() {
    let mut mux = Dispatcher::new("");
    mux.handle_fn("^/boom$", |_: &mut Context| -> Control {
        panic!("handler failure")
    })
    .unwrap();
    let mux = Arc::new(mux);
    let app = create_router(mux.clone());

    let response = send(&app, request(Method::GET, "/boom")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(mux.bindings().is_empty());

    // The dispatcher keeps serving after a panic.
    let response = send(&app, request(Method::GET, "/other")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Memory Sessions
// ============================================================================

#[tokio::test]
async fn test_cookie_identity_reuses_session() {
    let backend = Arc::new(MemoryBackend::new(MemoryConfig::new(
        "sid",
        Duration::from_secs(60),
    )));
    let mut mux = Dispatcher::with_backend("", backend.clone());
    mux.handle_fn("^/count$", |ctx: &mut Context| {
        let count = ctx.value("count").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        ctx.set_value("count", count);
        ctx.print(count)
    })
    .unwrap();
    let app = create_router(Arc::new(mux));

    let first = send(&app, request(Method::GET, "/count")).await;
    let pair = cookie_pair(&first);
    assert!(pair.starts_with("sid="));
    assert_eq!(response_text(first).await, "1");

    let second = Request::builder()
        .uri("/count")
        .header(header::COOKIE, pair.as_str())
        .body(Body::empty())
        .unwrap();
    let second = send(&app, second).await;
    assert!(second.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(response_text(second).await, "2");
    assert_eq!(backend.count(), 1);

    // A stale identity gets a fresh session and a new cookie.
    let stale = Request::builder()
        .uri("/count")
        .header(header::COOKIE, "sid=00000000000000000000000000000000")
        .body(Body::empty())
        .unwrap();
    let stale = send(&app, stale).await;
    assert_ne!(cookie_pair(&stale), pair);
    assert_eq!(response_text(stale).await, "1");
}

#[tokio::test]
async fn test_idle_session_expires() {
    let backend = Arc::new(MemoryBackend::new(
        MemoryConfig::new("mtest", Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(10)),
    ));
    let created = Arc::new(AtomicUsize::new(0));
    let expired = Arc::new(AtomicUsize::new(0));
    let (on_create, on_expire) = (created.clone(), expired.clone());
    backend.set_event_sink(Arc::new(SessionEventFn::new(
        move |event: SessionEvent, _: &Session| match event {
            SessionEvent::Create => {
                on_create.fetch_add(1, Ordering::SeqCst);
            }
            SessionEvent::Expire => {
                on_expire.fetch_add(1, Ordering::SeqCst);
            }
        },
    )));
    backend.start_reaper();

    let mut mux = Dispatcher::with_backend("", backend.clone());
    mux.handle_fn("^/set$", |ctx: &mut Context| {
        ctx.set_value("a", "1");
        Control::Return
    })
    .unwrap();
    let app = create_router(Arc::new(mux));

    let response = send(&app, request(Method::GET, "/set")).await;
    let pair = cookie_pair(&response);
    let token = pair.split_once('=').unwrap().1.to_string();
    assert!(backend.find(&token).is_some());
    assert_eq!(created.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(backend.find(&token).is_none());
    assert_eq!(expired.load(Ordering::SeqCst), 1);
    backend.stop_reaper();
}
