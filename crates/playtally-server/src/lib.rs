//! HTTP read path for playtally.
//!
//! Serves the per-item aggregate views as JSON plus a small HTML dashboard.
//! Every request loads the history files fresh; nothing here writes or
//! triggers a poll.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use playtally_core::{
    AggregateView, Catalog, PollStatus, SampleChange, SeriesStore, Summary, TrackedItem,
    aggregate, build_summary, consecutive_changes, format_timestamp, group_digits, load_or_empty,
    now_in, signed,
};

/// Shared server state.
pub struct AppState {
    catalog: Catalog,
    store: Arc<dyn SeriesStore>,
    tz: Tz,
    status: watch::Receiver<PollStatus>,
}

impl AppState {
    pub fn new(
        catalog: Catalog,
        store: Arc<dyn SeriesStore>,
        tz: Tz,
        status: watch::Receiver<PollStatus>,
    ) -> Self {
        Self {
            catalog,
            store,
            tz,
            status,
        }
    }

    fn now(&self) -> DateTime<Tz> {
        now_in(self.tz)
    }

    /// Fresh load and aggregation of one item. Blocks on file I/O.
    fn item_view(&self, item: &TrackedItem, now: DateTime<Tz>) -> ItemView {
        let (series, warning) = load_or_empty(self.store.as_ref(), item.history());
        ItemView {
            id: item.id.clone(),
            title: item.title.clone(),
            locator: item.locator.clone(),
            view: aggregate(series.samples(), now),
            warning: warning.map(|e| e.to_string()),
            history: consecutive_changes(series.samples()),
        }
    }

    fn all_views(&self, now: DateTime<Tz>) -> Vec<ItemView> {
        self.catalog
            .items()
            .iter()
            .map(|item| self.item_view(item, now))
            .collect()
    }
}

/// Run a store read on the blocking pool so file I/O never stalls the
/// async workers.
async fn blocking<T, F>(state: &Arc<AppState>, read: F) -> Result<T, Response>
where
    F: FnOnce(&AppState) -> T + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || read(&state))
        .await
        .map_err(|e| {
            log::error!("history read task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to read history".to_string(),
                }),
            )
                .into_response()
        })
}

struct ItemView {
    id: String,
    title: String,
    locator: String,
    view: AggregateView,
    warning: Option<String>,
    history: Vec<SampleChange>,
}

#[derive(Serialize)]
struct ItemEntry {
    id: String,
    title: String,
    locator: String,
    #[serde(flatten)]
    view: AggregateView,
    /// Set when the history could not be read and is shown as empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

#[derive(Serialize)]
struct ItemsResponse {
    generated_at: String,
    items: Vec<ItemEntry>,
    total: usize,
}

#[derive(Serialize)]
struct ItemDetailResponse {
    generated_at: String,
    #[serde(flatten)]
    item: ItemEntry,
    /// Newest first.
    history: Vec<SampleChange>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    items: usize,
    polls_completed: u64,
    last_poll: Option<String>,
    next_poll: Option<String>,
}

impl From<ItemView> for ItemEntry {
    fn from(v: ItemView) -> Self {
        Self {
            id: v.id,
            title: v.title,
            locator: v.locator,
            view: v.view,
            warning: v.warning,
        }
    }
}

async fn handle_items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ItemsResponse>, Response> {
    let now = state.now();
    let views = blocking(&state, move |s| s.all_views(now)).await?;
    let items: Vec<ItemEntry> = views.into_iter().map(ItemEntry::from).collect();
    let total = items.len();
    Ok(Json(ItemsResponse {
        generated_at: format_timestamp(&now),
        items,
        total,
    }))
}

async fn handle_item(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(item) = state.catalog.get(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unknown item: {id}. Use /api/v1/items to list tracked items."),
            }),
        )
            .into_response();
    };
    let item = item.clone();
    let now = state.now();
    let mut view = match blocking(&state, move |s| s.item_view(&item, now)).await {
        Ok(view) => view,
        Err(response) => return response,
    };
    let history = std::mem::take(&mut view.history);
    Json(ItemDetailResponse {
        generated_at: format_timestamp(&now),
        item: view.into(),
        history,
    })
    .into_response()
}

async fn handle_summary(State(state): State<Arc<AppState>>) -> Result<Json<Summary>, Response> {
    let now = state.now();
    let summary = blocking(&state, move |s| {
        build_summary(&s.catalog, s.store.as_ref(), now)
    })
    .await?;
    Ok(Json(summary))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = *state.status.borrow();
    Json(HealthResponse {
        status: if status.polls_completed > 0 {
            "healthy"
        } else {
            "starting"
        },
        items: state.catalog.len(),
        polls_completed: status.polls_completed,
        last_poll: status.last_completed.as_ref().map(format_timestamp),
        next_poll: status.next_due.as_ref().map(format_timestamp),
    })
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let ids = state.catalog.ids();
    Json(serde_json::json!({
        "name": "playtally",
        "version": playtally_core::VERSION,
        "items": ids.len(),
        "endpoints": {
            "/": "HTML dashboard",
            "/api": "This API index",
            "/api/v1/items": "Aggregate view of every tracked item",
            "/api/v1/items/{id}": {
                "method": "GET",
                "description": "Aggregate view plus newest-first history with per-entry changes",
                "ids": ids,
            },
            "/api/v1/summary": "Summary artifact computed now",
            "/health": "Health check with last and next poll",
        },
    }))
}

async fn handle_dashboard(State(state): State<Arc<AppState>>) -> Result<Html<String>, Response> {
    let now = state.now();
    let views = blocking(&state, move |s| s.all_views(now)).await?;
    let status = *state.status.borrow();
    Ok(Html(render_dashboard(&views, &status, now)))
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

const UNAVAILABLE: &str = "unavailable";

fn render_dashboard(views: &[ItemView], status: &PollStatus, now: DateTime<Tz>) -> String {
    let next_update = status
        .next_due
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| "after the first poll".to_string());

    let mut html = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>playtally</title>\
         <style>body{font-family:sans-serif;margin:2em}table{border-collapse:collapse}\
         td,th{border:1px solid #ccc;padding:4px 8px;text-align:right}\
         .warn{color:#b00}</style></head><body>\n<h1>Play counts</h1>\n",
    );
    let _ = writeln!(
        html,
        "<p>Generated {} &middot; next update {}</p>",
        escape(&format_timestamp(&now)),
        escape(&next_update)
    );

    for v in views {
        let _ = writeln!(html, "<section id=\"{}\">", escape(&v.id));
        let _ = writeln!(html, "<h2>{}</h2>", escape(&v.title));
        if let Some(warning) = &v.warning {
            let _ = writeln!(html, "<p class=\"warn\">{}</p>", escape(warning));
        }
        let view = &v.view;
        let _ = writeln!(
            html,
            "<ul>\n<li>Current: {}</li>\n<li>Total increase: {}</li>\n\
             <li>Average rate: {}</li>\n<li>Last hour: {}</li>\n<li>Last 24 hours: {}</li>\n</ul>",
            opt(view.latest.map(|s| group_digits(s.value))),
            opt(view.total_increase.map(signed)),
            opt(view.average_rate.map(|r| format!("{r:.2} plays/min"))),
            opt(view.hour.map(|w| signed(w.delta))),
            opt(view.day.map(|w| signed(w.delta))),
        );

        html.push_str("<table>\n<tr><th>Timestamp</th><th>Plays</th><th>Change</th></tr>\n");
        for row in &v.history {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&format_timestamp(&row.sample.timestamp)),
                group_digits(row.sample.value),
                row.change.map(signed).unwrap_or_default(),
            );
        }
        html.push_str("</table>\n</section>\n");
    }
    html.push_str("</body></html>\n");
    html
}

fn opt(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNAVAILABLE.to_string())
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router.
fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_dashboard))
        .route("/api", get(handle_index))
        .route("/api/v1/items", get(handle_items))
        .route("/api/v1/items/{id}", get(handle_item))
        .route("/api/v1/summary", get(handle_summary))
        .route("/health", get(handle_health))
        .with_state(Arc::new(state))
}

/// Serve the read path until `shutdown` is cancelled.
pub async fn run_server(
    state: AppState,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeDelta, TimeZone};
    use chrono_tz::Asia::Kolkata;
    use http_body_util::BodyExt;
    use playtally_core::{MemoryStore, Sample, TimeSeries};
    use tower::ServiceExt;

    fn router_with(store: MemoryStore, status: PollStatus) -> Router {
        let catalog = Catalog::new(vec![
            TrackedItem::new("firestorm", "Firestorm", "https://example.com/f", "f.json"),
            TrackedItem::new("cheetah", "Hungry <Cheetah>", "https://example.com/c", "c.json"),
        ]);
        let (_tx, rx) = watch::channel(status);
        build_router(AppState::new(catalog, Arc::new(store), Kolkata, rx))
    }

    fn seeded_store() -> MemoryStore {
        let base = now_in(Kolkata) - TimeDelta::hours(3);
        let store = MemoryStore::new();
        store.insert(
            "f.json",
            TimeSeries::from_samples(vec![
                Sample::new(base, 1_000_000),
                Sample::new(base + TimeDelta::hours(1), 1_000_600),
                Sample::new(base + TimeDelta::hours(2), 1_001_800),
            ]),
        );
        store
    }

    async fn request(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = request(router, uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    // -----------------------------------------------------------------------
    // JSON endpoints
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_items_endpoint() {
        let (status, json) = get_json(
            router_with(seeded_store(), PollStatus::default()),
            "/api/v1/items",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 2);

        let firestorm = &json["items"][0];
        assert_eq!(firestorm["id"], "firestorm");
        assert_eq!(firestorm["sample_count"], 3);
        assert_eq!(firestorm["latest"]["value"], 1_001_800);
        assert_eq!(firestorm["total_increase"], 1800);
        assert_eq!(firestorm["average_rate"], 15.0);
        // Target for 1h is the latest sample itself, so the delta is zero.
        assert_eq!(firestorm["hour"]["delta"], 0);

        let cheetah = &json["items"][1];
        assert_eq!(cheetah["sample_count"], 0);
        assert!(cheetah["latest"].is_null());
        assert!(cheetah["average_rate"].is_null());
        assert!(cheetah.get("warning").is_none());
    }

    #[tokio::test]
    async fn test_item_detail_history_newest_first() {
        let (status, json) = get_json(
            router_with(seeded_store(), PollStatus::default()),
            "/api/v1/items/firestorm",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["title"], "Firestorm");
        let history = json["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0]["value"], 1_001_800);
        assert_eq!(history[0]["change"], 1200);
        assert!(history[2]["change"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_item_is_404() {
        let (status, json) = get_json(
            router_with(MemoryStore::new(), PollStatus::default()),
            "/api/v1/items/nope",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_summary_endpoint() {
        let (_, json) = get_json(
            router_with(seeded_store(), PollStatus::default()),
            "/api/v1/summary",
        )
        .await;
        assert_eq!(json["granularity"], "hourly");
        assert_eq!(json["items"]["firestorm"]["current"], 1_001_800);
        assert_eq!(json["items"]["firestorm"]["entries"], 3);
        assert!(json["items"].get("cheetah").is_none());
    }

    /// Store whose loads block the calling thread until released.
    struct GatedStore {
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SeriesStore for GatedStore {
        fn load(&self, _: &std::path::Path) -> Result<TimeSeries, playtally_core::StoreError> {
            if let Ok(gate) = self.gate.lock() {
                let _ = gate.recv();
            }
            Ok(TimeSeries::default())
        }

        fn append(&self, _: &std::path::Path, _: Sample) -> Result<(), playtally_core::StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_slow_history_reads_do_not_stall_other_requests() {
        let (release, gate) = std::sync::mpsc::channel();
        let catalog = Catalog::new(vec![TrackedItem::new(
            "firestorm",
            "Firestorm",
            "https://example.com/f",
            "f.json",
        )]);
        let (_tx, rx) = watch::channel(PollStatus::default());
        let store = GatedStore {
            gate: std::sync::Mutex::new(gate),
        };
        let router = build_router(AppState::new(catalog, Arc::new(store), Kolkata, rx));

        // The single-threaded test runtime would deadlock here if the load
        // ran on the async worker.
        let pending = tokio::spawn(request(router.clone(), "/api/v1/items"));
        tokio::task::yield_now().await;
        let (status, _) = request(router, "/health").await;
        assert_eq!(status, StatusCode::OK);

        release.send(()).unwrap();
        let (status, _) = pending.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_poll_status() {
        let (_, json) = get_json(
            router_with(MemoryStore::new(), PollStatus::default()),
            "/health",
        )
        .await;
        assert_eq!(json["status"], "starting");
        assert!(json["next_poll"].is_null());

        let last = Kolkata.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let status = PollStatus {
            polls_completed: 4,
            last_completed: Some(last),
            next_due: Some(last + TimeDelta::minutes(15)),
        };
        let (_, json) = get_json(router_with(MemoryStore::new(), status), "/health").await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["items"], 2);
        assert_eq!(json["polls_completed"], 4);
        assert_eq!(json["last_poll"], "2024-01-01 10:00:00 IST");
        assert_eq!(json["next_poll"], "2024-01-01 10:15:00 IST");
    }

    #[tokio::test]
    async fn test_api_index() {
        let (_, json) = get_json(
            router_with(MemoryStore::new(), PollStatus::default()),
            "/api",
        )
        .await;
        assert_eq!(json["name"], "playtally");
        assert_eq!(json["items"], 2);
    }

    // -----------------------------------------------------------------------
    // Dashboard
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_dashboard_renders_items() {
        let (status, body) = request(
            router_with(seeded_store(), PollStatus::default()),
            "/",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h2>Firestorm</h2>"));
        assert!(body.contains("1,001,800"));
        assert!(body.contains("+1,200"));
        assert!(body.contains("15.00 plays/min"));
        assert!(body.contains("Hungry &lt;Cheetah&gt;"));
        assert!(body.contains(UNAVAILABLE));
        assert!(body.contains("after the first poll"));
    }
}
