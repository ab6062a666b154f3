//! HTTP server: admin surface, rendering endpoints and the import scheduler.
//!
//! # API Endpoints
//!
//! | Method | Path                       | Description                          |
//! |--------|----------------------------|--------------------------------------|
//! | GET    | `/health`                  | Health check                         |
//! | GET    | `/admin`                   | Feed URL form and last run (admin)   |
//! | POST   | `/admin`                   | Save or clear the feed URL (admin)   |
//! | POST   | `/api/import`              | Run the scheduled import now (admin) |
//! | GET    | `/api/runs`                | Run history (admin)                  |
//! | GET    | `/api/items/{id}/hreflang` | Alternate links as JSON              |
//! | GET    | `/items/{id}/head`         | `<link rel="alternate">` markup      |
//! | GET    | `/items/{id}/links`        | Visible language links fragment      |
//! | GET    | `/api/logs`                | SSE stream for import logs           |
//!
//! Admin requests carry `Authorization: Bearer <HREFLANG_ADMIN_TOKEN>`. Form
//! posts must also come from the configured origin and echo the page nonce.

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, Method},
    response::{sse::Event, Html, Json, Redirect, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{FeedForm, HreflangResponse, RenderQuery, RunsResponse};
use crate::error::{ServerError, ServerResult};
use crate::import::{parse_absolute_url, ImportOrchestrator};
use crate::models::{ImportRun, ItemId, LanguageCode};
use crate::render::markup::escape_attr;
use crate::render::{head_links, links_fragment, HreflangRenderer};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ImportOrchestrator>,
    pub renderer: HreflangRenderer,
    /// Admin bearer token; admin routes are refused while unset.
    pub admin_token: Option<String>,
    /// Origin form posts must come from, e.g. `https://site.example`.
    pub origin: String,
    /// Per-process form nonce.
    pub nonce: String,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ImportOrchestrator>,
        renderer: HreflangRenderer,
        admin_token: Option<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            renderer,
            admin_token,
            origin: origin.into(),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/admin", get(admin_page).post(admin_submit))
        .route("/api/import", post(trigger_import))
        .route("/api/runs", get(list_runs))
        .route("/api/items/{id}/hreflang", get(item_hreflang))
        .route("/items/{id}/head", get(item_head))
        .route("/items/{id}/links", get(item_links))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and the periodic import.
pub async fn start_server(
    state: AppState,
    port: u16,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = spawn_scheduler(state.orchestrator.clone(), interval);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🚀 hreflang-connect running on http://localhost:{}", port);
    info!("   GET  /admin                    - Feed URL settings");
    info!("   GET  /api/items/{{id}}/hreflang - Alternate links");
    info!("   GET  /api/logs                 - SSE log stream");
    info!("   import every {}s", interval.as_secs());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app).await;
    scheduler.abort();
    served?;

    Ok(())
}

/// Run the scheduled import every `interval`, starting now.
///
/// Ticks missed while a run is in progress are skipped, not queued.
pub fn spawn_scheduler(orchestrator: Arc<ImportOrchestrator>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let run = orchestrator.run_scheduled().await;
            tracing::debug!(outcome = ?run.outcome, "scheduled tick done");
        }
    })
}

// =============================================================================
// Access checks
// =============================================================================

/// Require the admin bearer token.
pub fn authorize(headers: &HeaderMap, token: Option<&str>) -> ServerResult<()> {
    let expected = token.ok_or_else(|| ServerError::Forbidden("admin token not configured".into()))?;

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(provided) if provided == expected => Ok(()),
        _ => Err(ServerError::Unauthorized),
    }
}

/// Require the request to come from `origin`, via `Origin` or else `Referer`.
pub fn check_same_origin(headers: &HeaderMap, origin: &str) -> ServerResult<()> {
    if let Some(sent) = header_str(headers, header::ORIGIN) {
        return if sent.trim_end_matches('/') == origin {
            Ok(())
        } else {
            Err(ServerError::Forbidden(format!("cross-origin request from {}", sent)))
        };
    }

    match header_str(headers, header::REFERER) {
        Some(referer) if referer == origin || referer.starts_with(&format!("{}/", origin)) => Ok(()),
        Some(referer) => Err(ServerError::Forbidden(format!("cross-origin request from {}", referer))),
        None => Err(ServerError::Forbidden("missing Origin and Referer".into())),
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_item(raw: &str) -> ServerResult<ItemId> {
    raw.parse::<ItemId>()
        .map_err(|_| ServerError::BadRequest(format!("invalid item id '{}'", raw)))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "hreflang-connect",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Admin page: feed URL form and the most recent run.
pub async fn admin_page(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<Html<String>> {
    authorize(&headers, state.admin_token.as_deref())?;

    let feed_url = state.orchestrator.pointer().get().await?;
    let last_run = state.orchestrator.history().latest();

    Ok(Html(admin_html(&feed_url, last_run.as_ref(), &state.nonce)))
}

/// Save or clear the configured feed URL.
pub async fn admin_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<FeedForm>,
) -> ServerResult<Redirect> {
    authorize(&headers, state.admin_token.as_deref())?;
    check_same_origin(&headers, &state.origin)?;
    if form.nonce != state.nonce {
        warn!("admin form rejected: stale or missing nonce");
        return Err(ServerError::Forbidden("invalid form nonce".into()));
    }

    let pointer = state.orchestrator.pointer();
    let url = form.import_file.trim();
    if form.action == "clear" || url.is_empty() {
        pointer.clear().await?;
        log_info("Feed URL cleared by admin");
    } else {
        if parse_absolute_url(url).is_none() {
            return Err(ServerError::BadRequest(format!("'{}' is not an absolute http(s) URL", url)));
        }
        pointer.set(url).await?;
        log_info(format!("Feed URL set to {}", url));
    }

    Ok(Redirect::to("/admin"))
}

/// Run the scheduled import now.
pub async fn trigger_import(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<Json<ImportRun>> {
    authorize(&headers, state.admin_token.as_deref())?;
    Ok(Json(state.orchestrator.run_scheduled().await))
}

/// Run history and the configured feed URL.
pub async fn list_runs(State(state): State<AppState>, headers: HeaderMap) -> ServerResult<Json<RunsResponse>> {
    authorize(&headers, state.admin_token.as_deref())?;

    Ok(Json(RunsResponse {
        running: state.orchestrator.is_running(),
        feed_url: state.orchestrator.pointer().get().await?,
        runs: state.orchestrator.history().list(),
    }))
}

/// Alternate links for an item, `?default=` overriding the site language.
pub async fn item_hreflang(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RenderQuery>,
) -> ServerResult<Json<HreflangResponse>> {
    let item = parse_item(&id)?;
    let default_language = query
        .default
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(LanguageCode::new)
        .unwrap_or_else(|| state.renderer.default_language().clone());

    let links = state.renderer.render(item, &default_language).await?;

    Ok(Json(HreflangResponse {
        item: item.get(),
        default_language: default_language.to_string(),
        links,
    }))
}

/// Head markup. Store failures are logged and render nothing.
pub async fn item_head(State(state): State<AppState>, Path(id): Path<String>) -> ServerResult<Html<String>> {
    let item = parse_item(&id)?;
    let markup = match state.renderer.render_default(item).await {
        Ok(links) => head_links(&links),
        Err(e) => {
            warn!(%item, error = %e, "cannot read links, rendering none");
            String::new()
        }
    };
    Ok(Html(markup))
}

/// Visible links fragment. Store failures are logged and render nothing.
pub async fn item_links(State(state): State<AppState>, Path(id): Path<String>) -> ServerResult<Html<String>> {
    let item = parse_item(&id)?;
    let markup = match state.renderer.stored(item).await {
        Ok(Some(links)) => links_fragment(&links),
        Ok(None) => String::new(),
        Err(e) => {
            warn!(%item, error = %e, "cannot read links, rendering none");
            String::new()
        }
    };
    Ok(Html(markup))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn admin_html(feed_url: &str, last_run: Option<&ImportRun>, nonce: &str) -> String {
    let last_run = match last_run {
        Some(run) => format!(
            "<h2>Last import</h2><p>{}</p><p>{}</p>",
            escape_attr(&run.feed_url),
            escape_attr(&run.summary())
        ),
        None => "<p>No import has run yet.</p>".to_string(),
    };

    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Hreflang import</title></head>
<body>
<h1>Hreflang import</h1>
<form method="post" action="/admin">
<input type="hidden" name="nonce" value="{nonce}" />
<label for="import_file">Import file URL</label>
<input type="url" id="import_file" name="import_file" value="{feed_url}" placeholder="https://yourdomain.com/importfile.csv" />
<button type="submit" name="action" value="save">Save</button>
<button type="submit" name="action" value="clear">Clear</button>
</form>
{last_run}
</body>
</html>
"#,
        nonce = escape_attr(nonce),
        feed_url = escape_attr(feed_url),
        last_run = last_run,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::FeedFetcher;
    use crate::models::{LanguageLinkSet, RunOutcome};
    use crate::resolver::SitemapResolver;
    use crate::store::{MemoryStore, MetadataStore};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use url::Url;

    struct NoFetch;

    #[async_trait]
    impl FeedFetcher for NoFetch {
        async fn fetch(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status(404))
        }
    }

    const ORIGIN: &str = "https://site.example";

    fn state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = ImportOrchestrator::new(
            Arc::new(NoFetch),
            Arc::new(SitemapResolver::new()),
            store.clone(),
            store.clone(),
        );
        let renderer = HreflangRenderer::new(store.clone(), "en".into());
        let state = AppState::new(Arc::new(orchestrator), renderer, Some("secret".into()), ORIGIN);
        (state, store)
    }

    fn admin_headers(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    fn form(action: &str, url: &str, nonce: &str) -> Form<FeedForm> {
        Form(FeedForm {
            action: action.into(),
            import_file: url.into(),
            nonce: nonce.into(),
        })
    }

    #[test]
    fn test_authorize() {
        let headers = admin_headers(ORIGIN);
        assert!(authorize(&headers, Some("secret")).is_ok());
        assert!(matches!(authorize(&headers, Some("other")), Err(ServerError::Unauthorized)));
        assert!(matches!(authorize(&HeaderMap::new(), Some("secret")), Err(ServerError::Unauthorized)));
        assert!(matches!(authorize(&headers, None), Err(ServerError::Forbidden(_))));
    }

    #[test]
    fn test_same_origin() {
        assert!(check_same_origin(&admin_headers(ORIGIN), ORIGIN).is_ok());
        assert!(check_same_origin(&admin_headers("https://evil.example"), ORIGIN).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_static("https://site.example/admin"));
        assert!(check_same_origin(&headers, ORIGIN).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_static("https://site.example.evil/admin"));
        assert!(check_same_origin(&headers, ORIGIN).is_err());

        assert!(check_same_origin(&HeaderMap::new(), ORIGIN).is_err());
    }

    #[tokio::test]
    async fn test_admin_submit_sets_and_clears_feed() {
        let (state, _) = state();
        let nonce = state.nonce.clone();

        admin_submit(
            State(state.clone()),
            admin_headers(ORIGIN),
            form("save", " https://feed.example/a.csv ", &nonce),
        )
        .await
        .unwrap();
        assert_eq!(state.orchestrator.pointer().get().await.unwrap(), "https://feed.example/a.csv");

        admin_submit(State(state.clone()), admin_headers(ORIGIN), form("clear", "", &nonce))
            .await
            .unwrap();
        assert_eq!(state.orchestrator.pointer().get().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_admin_submit_rejections() {
        let (state, _) = state();
        let nonce = state.nonce.clone();

        let stale = admin_submit(
            State(state.clone()),
            admin_headers(ORIGIN),
            form("save", "https://feed.example/a.csv", "stale"),
        )
        .await;
        assert!(matches!(stale, Err(ServerError::Forbidden(_))));

        let cross = admin_submit(
            State(state.clone()),
            admin_headers("https://evil.example"),
            form("save", "https://feed.example/a.csv", &nonce),
        )
        .await;
        assert!(matches!(cross, Err(ServerError::Forbidden(_))));

        let invalid = admin_submit(
            State(state.clone()),
            admin_headers(ORIGIN),
            form("save", "feed.csv", &nonce),
        )
        .await;
        assert!(matches!(invalid, Err(ServerError::BadRequest(_))));

        assert_eq!(state.orchestrator.pointer().get().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_admin_page_escapes_feed_url() {
        let (state, _) = state();
        state.orchestrator.pointer().set("https://feed.example/a.csv?x=\"1\"").await.unwrap();

        let Html(page) = admin_page(State(state.clone()), admin_headers(ORIGIN)).await.unwrap();

        assert!(page.contains("value=\"https://feed.example/a.csv?x=&quot;1&quot;\""));
        assert!(page.contains(&state.nonce));
        assert!(page.contains("No import has run yet."));
    }

    #[tokio::test]
    async fn test_trigger_import_records_run() {
        let (state, _) = state();
        state.orchestrator.pointer().set("https://feed.example/a.csv").await.unwrap();

        let Json(run) = trigger_import(State(state.clone()), admin_headers(ORIGIN)).await.unwrap();
        assert_eq!(run.outcome, RunOutcome::FetchFailed);

        let Json(runs) = list_runs(State(state.clone()), admin_headers(ORIGIN)).await.unwrap();
        assert_eq!(runs.runs.len(), 1);
        assert_eq!(runs.feed_url, "");
        assert!(!runs.running);
    }

    #[tokio::test]
    async fn test_list_runs_requires_admin_token() {
        let (state, _) = state();
        state.orchestrator.pointer().set("https://feed.example/private.csv?key=abc").await.unwrap();

        let anonymous = list_runs(State(state.clone()), HeaderMap::new()).await;
        assert!(matches!(anonymous, Err(ServerError::Unauthorized)));

        let mut wrong = HeaderMap::new();
        wrong.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer guess"));
        assert!(matches!(
            list_runs(State(state.clone()), wrong).await,
            Err(ServerError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_item_endpoints() {
        let (state, store) = state();
        let links: LanguageLinkSet = [
            (LanguageCode::new("en"), Url::parse("https://x.example/en").unwrap()),
            (LanguageCode::new("dk"), Url::parse("https://x.example/dk").unwrap()),
        ]
        .into_iter()
        .collect();
        store.set(ItemId::new(5), &links).await.unwrap();

        let Json(body) = item_hreflang(State(state.clone()), Path("5".into()), Query(RenderQuery::default()))
            .await
            .unwrap();
        assert_eq!(body.links.len(), 1);
        assert_eq!(body.links[0].hreflang, "da");

        let Json(body) = item_hreflang(
            State(state.clone()),
            Path("5".into()),
            Query(RenderQuery { default: Some("dk".into()) }),
        )
        .await
        .unwrap();
        assert_eq!(body.default_language, "dk");
        assert_eq!(body.links[0].hreflang, "en");

        let Html(head) = item_head(State(state.clone()), Path("5".into())).await.unwrap();
        assert!(head.contains("hreflang=\"da\""));

        let Html(fragment) = item_links(State(state.clone()), Path("5".into())).await.unwrap();
        assert!(fragment.contains("lang-en"));

        let Html(empty) = item_links(State(state.clone()), Path("6".into())).await.unwrap();
        assert!(empty.is_empty());

        let bad = item_head(State(state), Path("abc".into())).await;
        assert!(matches!(bad, Err(ServerError::BadRequest(_))));
    }
}
