use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use super::*;
use crate::state::test_helpers::{USER_EMAIL, USER_PASSWORD, anonymous_scope, signed_in_scope, test_app_state};

/// Source that records every fetch and answers from a fixed result.
struct CountingSource {
    calls: AtomicUsize,
    slugs: Mutex<Vec<String>>,
    result: Result<GuidePayload, fn() -> GuideError>,
}

impl CountingSource {
    fn ok(payload: GuidePayload) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), slugs: Mutex::new(Vec::new()), result: Ok(payload) })
    }

    fn failing(err: fn() -> GuideError) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), slugs: Mutex::new(Vec::new()), result: Err(err) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl GuideSource for CountingSource {
    async fn fetch_guide(&self, slug: &str, _scope: &SessionScope) -> Result<GuidePayload, GuideError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.slugs.lock().unwrap().push(slug.to_owned());
        self.result.clone().map_err(|make| make())
    }
}

fn payload() -> GuidePayload {
    GuidePayload {
        success: true,
        title: "Tahap 1".into(),
        description: "First step".into(),
        body: "body".into(),
        images: vec!["/guides/1.png".into()],
    }
}

// =============================================================================
// state machine
// =============================================================================

#[test]
fn only_loading_is_not_terminal() {
    assert!(!GateState::Loading.is_terminal());
    assert!(GateState::Loaded(payload()).is_terminal());
    assert!(GateState::Error { message: "x".into() }.is_terminal());
    let locked = GateState::Locked { placeholder: Placeholder::default(), sign_in_href: "/login".into() };
    assert!(locked.is_terminal());
}

#[test]
fn loading_completes_to_loaded_or_error() {
    assert_eq!(GateState::Loading.complete(Ok(payload())), GateState::Loaded(payload()));
    let failed = GateState::Loading.complete(Err(GuideError::NotFound("x".into())));
    assert_eq!(failed, GateState::Error { message: "Failed to load guide: Not found".into() });
}

#[test]
fn terminal_states_ignore_outcomes() {
    let error = GateState::Error { message: "boom".into() };
    assert_eq!(error.clone().complete(Ok(payload())), error);

    let locked = GateState::Locked { placeholder: Placeholder::default(), sign_in_href: "/login".into() };
    assert_eq!(locked.clone().complete(Ok(payload())), locked);
}

#[test]
fn error_message_hides_details() {
    let state = GateState::Loading.complete(Err(GuideError::Unexpected("secret detail".into())));
    let GateState::Error { message } = state else { panic!("expected error state") };
    assert!(!message.contains("secret"));
}

#[test]
fn sign_in_href_keeps_slashes_and_escapes_segments() {
    assert_eq!(sign_in_href("/login", "/android/installation/tahap-1"), "/login?from=/android/installation/tahap-1");
    assert_eq!(sign_in_href("/login", "/a b/c&d"), "/login?from=/a%20b/c%26d");
}

// =============================================================================
// decide
// =============================================================================

#[tokio::test]
async fn anonymous_never_fetches() {
    let source = CountingSource::ok(payload());
    let gate = ContentGate::new(source.clone(), "/login");

    let state = gate
        .decide("android/installation/tahap-1", false, Placeholder::default(), &anonymous_scope())
        .await;

    assert_eq!(source.calls(), 0);
    assert_eq!(
        state,
        GateState::Locked {
            placeholder: Placeholder::default(),
            sign_in_href: "/login?from=/android/installation/tahap-1".into(),
        }
    );
}

#[tokio::test]
async fn authenticated_fetches_exactly_once() {
    let source = CountingSource::ok(payload());
    let gate = ContentGate::new(source.clone(), "/login");

    let state = gate.decide("/android/installation/tahap-1/", true, Placeholder::default(), &anonymous_scope()).await;

    assert_eq!(source.calls(), 1);
    assert_eq!(source.slugs.lock().unwrap().as_slice(), ["android/installation/tahap-1"]);
    assert_eq!(state, GateState::Loaded(payload()));
}

#[tokio::test]
async fn fetch_failure_is_terminal_error_without_retry() {
    let source = CountingSource::failing(|| GuideError::BackendUnavailable("timeout".into()));
    let gate = ContentGate::new(source.clone(), "/login");

    let state = gate.decide("ios", true, Placeholder::default(), &anonymous_scope()).await;

    assert_eq!(source.calls(), 1);
    assert!(matches!(state, GateState::Error { .. }));
}

// =============================================================================
// local source
// =============================================================================

#[tokio::test]
async fn local_source_loads_exact_fields_for_signed_in_caller() {
    let state = test_app_state();
    let scope = signed_in_scope(&state, USER_EMAIL, USER_PASSWORD).await;
    let slug = "android/installation/tahap-1";

    let gate_state = state.gate.decide(slug, true, Placeholder::default(), &scope).await;

    let doc = state.content.find_by_slug(slug).unwrap();
    let GateState::Loaded(loaded) = gate_state else { panic!("expected loaded state") };
    assert_eq!(loaded.title, doc.title);
    assert_eq!(loaded.description, doc.description);
    assert_eq!(loaded.body, doc.body);
    assert_eq!(loaded.images, doc.images);
}

#[tokio::test]
async fn local_source_missing_slug_surfaces_error() {
    let state = test_app_state();
    let scope = signed_in_scope(&state, USER_EMAIL, USER_PASSWORD).await;

    let gate_state = state.gate.decide("does/not/exist", true, Placeholder::default(), &scope).await;
    assert_eq!(gate_state, GateState::Error { message: "Failed to load guide: Not found".into() });
}

#[tokio::test]
async fn local_source_revalidates_session() {
    // A forged "authenticated" flag does not unlock content.
    let state = test_app_state();
    let gate_state = state.gate.decide("android", true, Placeholder::default(), &anonymous_scope()).await;
    assert_eq!(gate_state, GateState::Error { message: "Failed to load guide: Unauthorized".into() });
}

#[tokio::test]
async fn local_source_does_not_write_caller_cookies() {
    let state = test_app_state();
    let scope = signed_in_scope(&state, USER_EMAIL, USER_PASSWORD).await;
    let before = crate::state::test_helpers::cookie_header(&scope);

    state.gate.decide("android", true, Placeholder::default(), &scope).await;

    assert_eq!(crate::state::test_helpers::cookie_header(&scope), before);
    assert!(scope.cached_verdict().is_none());
}

// =============================================================================
// http source
// =============================================================================

async fn fake_guide_endpoint(axum::extract::Path(slug): axum::extract::Path<String>, headers: HeaderMap) -> Response {
    let has_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("sb-test-auth-token=abc"));
    match slug.as_str() {
        _ if !has_cookie => GuideError::Unauthenticated.into_response(),
        "android/installation/tahap-1" => axum::Json(payload()).into_response(),
        "broken" => (StatusCode::BAD_GATEWAY, "upstream").into_response(),
        _ => GuideError::NotFound(slug.clone()).into_response(),
    }
}

async fn spawn_fake_endpoint() -> String {
    let app = Router::new().route("/api/guides/{*slug}", get(fake_guide_endpoint));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn cookie_scope() -> SessionScope {
    SessionScope::with_cookies(
        [axum_extra::extract::cookie::Cookie::new("sb-test-auth-token", "abc")],
        crate::services::session::CookieWrites::Allowed,
    )
}

#[tokio::test]
async fn http_source_forwards_cookies_and_decodes_payload() {
    let source = HttpGuideSource::new(&spawn_fake_endpoint().await, 5).unwrap();
    let result = source.fetch_guide("android/installation/tahap-1", &cookie_scope()).await;
    assert_eq!(result.unwrap(), payload());
}

#[tokio::test]
async fn http_source_maps_statuses() {
    let source = HttpGuideSource::new(&spawn_fake_endpoint().await, 5).unwrap();

    let unauth = source.fetch_guide("android/installation/tahap-1", &anonymous_scope()).await;
    assert!(matches!(unauth, Err(GuideError::Unauthenticated)));

    let missing = source.fetch_guide("does/not/exist", &cookie_scope()).await;
    assert!(matches!(missing, Err(GuideError::NotFound(slug)) if slug == "does/not/exist"));

    let broken = source.fetch_guide("broken", &cookie_scope()).await;
    assert!(matches!(broken, Err(GuideError::Unexpected(_))));
}

#[tokio::test]
async fn http_source_unreachable_is_backend_unavailable() {
    // Bind then drop to obtain a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = HttpGuideSource::new(&format!("http://{addr}"), 2).unwrap();
    let result = source.fetch_guide("android", &cookie_scope()).await;
    assert!(matches!(result, Err(GuideError::BackendUnavailable(_))));
}
