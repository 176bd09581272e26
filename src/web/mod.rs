mod assets;

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::analysis::DashboardSeries;
use crate::dashboard::{Dashboard, MapState};
use crate::insights::TextGenerator;
use crate::metrics::{Coordinates, ImpactMetrics, MetricsError};
use crate::report::ReportError;
use crate::state::{DashboardSnapshot, ViewMode};

type AppState<G> = Arc<Dashboard<G>>;

pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("the map view is not mounted")]
    MapNotMounted,
    #[error("no alert at index {0}")]
    UnknownAlert(usize),
    #[error(transparent)]
    InvalidCoordinates(#[from] MetricsError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("could not build download headers")]
    Header(#[from] header::InvalidHeaderValue),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MapNotMounted => StatusCode::CONFLICT,
            ApiError::UnknownAlert(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidCoordinates(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Report(ReportError::NoSelection) => StatusCode::CONFLICT,
            ApiError::Report(ReportError::Io(_)) | ApiError::Header(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub view: ViewMode,
}

#[derive(Debug, Deserialize)]
pub struct PointRequest {
    pub lat: f64,
    pub lng: f64,
}

/// Raw form fields; parsing happens server side so bad input can be ignored uniformly.
#[derive(Debug, Deserialize)]
pub struct ManualEntryRequest {
    pub lat: String,
    pub lng: String,
}

#[derive(Debug, Deserialize)]
pub struct PlaceRequest {
    pub query: String,
}

pub fn router<G>(dashboard: AppState<G>) -> Router
where
    G: TextGenerator + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/styles.css", get(styles))
        .route("/app.js", get(script))
        .route("/api/state", get(current_state::<G>))
        .route("/api/events", get(stream_events::<G>))
        .route("/api/view", post(switch_view::<G>))
        .route("/api/map", get(map_state::<G>))
        .route("/api/map/click", post(map_click::<G>))
        .route("/api/map/alerts/:index", post(alert_click::<G>))
        .route("/api/select/manual", post(manual_entry::<G>))
        .route("/api/select/place", post(search_place::<G>))
        .route("/api/insights", post(generate_insights::<G>))
        .route("/api/news/refresh", post(refresh_news::<G>))
        .route("/api/series", get(series::<G>))
        .route("/api/report", get(download_report::<G>))
        .with_state(dashboard)
}

pub async fn run<G>(dashboard: AppState<G>, config: WebServerConfig) -> Result<()>
where
    G: TextGenerator + Send + Sync + 'static,
{
    let WebServerConfig { host, port } = config;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("EcoWatch dashboard live at http://{addr} (Ctrl+C to stop)");
    dashboard.spawn_news_refresh();

    axum::serve(listener, router(dashboard))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
    }
    info!("shutting down dashboard server");
}

async fn index() -> Html<&'static str> {
    Html(assets::INDEX_HTML)
}

async fn styles() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        assets::STYLES_CSS,
    )
}

async fn script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        assets::APP_JS,
    )
}

async fn current_state<G>(State(dashboard): State<AppState<G>>) -> Json<DashboardSnapshot>
where
    G: TextGenerator + Send + Sync + 'static,
{
    Json(dashboard.snapshot())
}

async fn stream_events<G>(
    State(dashboard): State<AppState<G>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    G: TextGenerator + Send + Sync + 'static,
{
    let rx = dashboard.store().subscribe();
    let initial = state_event(&dashboard.snapshot());
    let updates = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(update) => state_event(&update.snapshot),
        Err(err) => {
            debug!(error = %err, "event subscriber lagged");
            None
        }
    });
    let stream = tokio_stream::iter(initial)
        .chain(updates)
        .map(Ok::<_, Infallible>);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn state_event(snapshot: &DashboardSnapshot) -> Option<Event> {
    match Event::default().event("state").json_data(snapshot) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to encode state event");
            None
        }
    }
}

async fn switch_view<G>(
    State(dashboard): State<AppState<G>>,
    Json(request): Json<ViewRequest>,
) -> Json<DashboardSnapshot>
where
    G: TextGenerator + Send + Sync + 'static,
{
    Json(dashboard.switch_view(request.view))
}

async fn map_state<G>(State(dashboard): State<AppState<G>>) -> Json<MapState>
where
    G: TextGenerator + Send + Sync + 'static,
{
    Json(dashboard.map_state())
}

async fn map_click<G>(
    State(dashboard): State<AppState<G>>,
    Json(request): Json<PointRequest>,
) -> Result<Json<ImpactMetrics>, ApiError>
where
    G: TextGenerator + Send + Sync + 'static,
{
    let at = Coordinates::new(request.lat, request.lng)?;
    dashboard
        .map_click(at)
        .map(Json)
        .ok_or(ApiError::MapNotMounted)
}

async fn alert_click<G>(
    State(dashboard): State<AppState<G>>,
    Path(index): Path<usize>,
) -> Result<Json<ImpactMetrics>, ApiError>
where
    G: TextGenerator + Send + Sync + 'static,
{
    dashboard
        .alert_click(index)
        .map(Json)
        .ok_or(ApiError::UnknownAlert(index))
}

async fn manual_entry<G>(
    State(dashboard): State<AppState<G>>,
    Json(request): Json<ManualEntryRequest>,
) -> Json<DashboardSnapshot>
where
    G: TextGenerator + Send + Sync + 'static,
{
    dashboard.manual_entry(&request.lat, &request.lng);
    Json(dashboard.snapshot())
}

async fn search_place<G>(
    State(dashboard): State<AppState<G>>,
    Json(request): Json<PlaceRequest>,
) -> Json<DashboardSnapshot>
where
    G: TextGenerator + Send + Sync + 'static,
{
    dashboard.search_place(&request.query).await;
    Json(dashboard.snapshot())
}

async fn generate_insights<G>(State(dashboard): State<AppState<G>>) -> Json<DashboardSnapshot>
where
    G: TextGenerator + Send + Sync + 'static,
{
    dashboard.generate_insights().await;
    Json(dashboard.snapshot())
}

async fn refresh_news<G>(State(dashboard): State<AppState<G>>) -> Json<DashboardSnapshot>
where
    G: TextGenerator + Send + Sync + 'static,
{
    dashboard.refresh_news().await;
    Json(dashboard.snapshot())
}

async fn series<G>(State(dashboard): State<AppState<G>>) -> Json<DashboardSeries>
where
    G: TextGenerator + Send + Sync + 'static,
{
    Json(dashboard.series())
}

async fn download_report<G>(State(dashboard): State<AppState<G>>) -> Result<Response, ApiError>
where
    G: TextGenerator + Send + Sync + 'static,
{
    let report = dashboard.render_report()?;
    let disposition = HeaderValue::from_str(&content_disposition(&report.filename))?;
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        ),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, Bytes::from(report.body)).into_response())
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use axum::body::to_bytes;

    use super::*;
    use crate::config::Settings;
    use crate::insights::{GenerationRequest, GeneratorError, INSIGHTS_FALLBACK};

    struct Offline;

    impl TextGenerator for Offline {
        fn generate(
            &self,
            _request: GenerationRequest,
        ) -> impl Future<Output = Result<String, GeneratorError>> + Send {
            async { Err(GeneratorError::MissingApiKey) }
        }
    }

    fn app() -> AppState<Offline> {
        let mut settings = Settings::default();
        settings.simulation.seed = Some(11);
        Arc::new(Dashboard::new(&settings, Offline))
    }

    #[test]
    fn router_builds() {
        let _ = router(app());
    }

    #[tokio::test]
    async fn map_click_before_mount_is_conflict() {
        let state = app();
        let err = map_click(
            State(state.clone()),
            Json(PointRequest {
                lat: -3.4,
                lng: -62.2,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::MapNotMounted));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn map_flow_through_handlers() {
        let state = app();
        let Json(snapshot) = switch_view(
            State(state.clone()),
            Json(ViewRequest {
                view: ViewMode::Map,
            }),
        )
        .await;
        assert_eq!(snapshot.view, ViewMode::Map);

        let Json(map) = map_state(State(state.clone())).await;
        assert!(map.mounted);
        assert!(!map.layers.markers.is_empty());

        let Json(metrics) = map_click(
            State(state.clone()),
            Json(PointRequest { lat: 1.0, lng: 18.0 }),
        )
        .await
        .unwrap();
        assert!(metrics.region.starts_with("Cinturão Afrotropical"));

        let Json(metrics) = alert_click(State(state.clone()), Path(0)).await.unwrap();
        assert_eq!(state.snapshot().metrics, metrics);

        let err = alert_click(State(state.clone()), Path(9_999)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_entry_ignores_bad_input() {
        let state = app();
        let Json(snapshot) = manual_entry(
            State(state.clone()),
            Json(ManualEntryRequest {
                lat: "north".into(),
                lng: "-62".into(),
            }),
        )
        .await;
        assert!(!snapshot.metrics.has_selection());

        let Json(snapshot) = manual_entry(
            State(state.clone()),
            Json(ManualEntryRequest {
                lat: " -3.4 ".into(),
                lng: "-62.2".into(),
            }),
        )
        .await;
        assert_eq!(snapshot.metrics.region, "Bioma Amazônia (-3.400, -62.200)");
    }

    #[tokio::test]
    async fn insights_fall_back_when_offline() {
        let state = app();
        state.manual_entry("-3.4", "-62.2");
        let Json(snapshot) = generate_insights(State(state.clone())).await;
        assert_eq!(snapshot.insights.as_deref(), Some(INSIGHTS_FALLBACK));
        assert!(!snapshot.analyzing);

        let Json(snapshot) = refresh_news(State(state)).await;
        assert!(snapshot.news.is_empty());
        assert!(!snapshot.loading_news);
    }

    #[tokio::test]
    async fn report_download_needs_a_selection() {
        let err = download_report(State(app())).await.unwrap_err();
        assert!(matches!(err, ApiError::Report(ReportError::NoSelection)));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn report_download_names_the_file() {
        let state = app();
        state.manual_entry("-3.4", "-62.2");

        let response = download_report(State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"EcoWatch_Relatorio_Bioma_Amaz_nia"));
        assert!(disposition.contains("filename*=UTF-8''EcoWatch_Relatorio_Bioma_Amaz%C3%B4nia"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("ECOWATCH INTELLIGENCE REPORT"));
    }

    #[test]
    fn ascii_disposition_is_unchanged() {
        assert_eq!(
            content_disposition("a_b.txt"),
            "attachment; filename=\"a_b.txt\"; filename*=UTF-8''a_b.txt"
        );
    }
}
