//! Wires the store, the map view, the random streams and the text-generation service
//! into the operations a dashboard client can trigger.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::analysis::DashboardSeries;
use crate::biome::RuleSet;
use crate::config::Settings;
use crate::insights::{InsightsService, NewsItem, TextGenerator};
use crate::map::{MapLayers, MapView, BASE_TILES, LOSS_OVERLAY_OPACITY, LOSS_OVERLAY_TILES};
use crate::metrics::{synthesize, Coordinates, ImpactMetrics};
use crate::report::{ensure_selection, report_filename, ReportError, ReportExporter};
use crate::rng::RngManager;
use crate::state::{DashboardSnapshot, DashboardStore, RequestTicket, SelectionSource, ViewMode};

const ALERT_STREAM: &str = "alerts";
const METRICS_STREAM: &str = "metrics";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapState {
    pub mounted: bool,
    pub base_tiles: &'static str,
    pub overlay_tiles: &'static str,
    pub overlay_opacity: f32,
    #[serde(flatten)]
    pub layers: MapLayers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub filename: String,
    pub body: String,
}

pub struct Dashboard<G> {
    store: DashboardStore,
    map: Mutex<MapView<MapLayers>>,
    rng: Mutex<RngManager>,
    insights: InsightsService<G>,
    exporter: ReportExporter,
    entry_rule_set: RuleSet,
}

impl<G: TextGenerator + Sync> Dashboard<G> {
    pub fn new(settings: &Settings, generator: G) -> Self {
        Self {
            store: DashboardStore::new(settings.server.event_buffer),
            map: Mutex::new(MapView::new(
                MapLayers::default(),
                settings.simulation.map_rule_set,
            )),
            rng: Mutex::new(RngManager::with_seed(settings.simulation.seed)),
            insights: InsightsService::new(generator, settings.generator.news_count),
            exporter: ReportExporter::new(
                &settings.report.output_dir,
                settings.report.number_format(),
            ),
            entry_rule_set: settings.simulation.entry_rule_set,
        }
    }

    pub fn store(&self) -> &DashboardStore {
        &self.store
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.store.snapshot()
    }

    /// Changes view. Entering the map mounts it with a fresh alert field; leaving it
    /// tears the field down.
    pub fn switch_view(&self, view: ViewMode) -> DashboardSnapshot {
        // The map lock spans the view write so mount state always matches the view.
        let mut map = lock(&self.map);
        let previous = self.store.set_view(view);
        if previous != view {
            if view == ViewMode::Map {
                let mut rng = lock(&self.rng);
                map.mount(&mut rng.stream(ALERT_STREAM));
            } else if previous == ViewMode::Map {
                map.unmount();
            }
        }
        drop(map);
        self.store.snapshot()
    }

    pub fn map_state(&self) -> MapState {
        let map = lock(&self.map);
        MapState {
            mounted: map.is_mounted(),
            base_tiles: BASE_TILES,
            overlay_tiles: LOSS_OVERLAY_TILES,
            overlay_opacity: LOSS_OVERLAY_OPACITY,
            layers: map.surface().clone(),
        }
    }

    /// Click on the map background. `None` while the map is not mounted.
    pub fn map_click(&self, at: Coordinates) -> Option<ImpactMetrics> {
        let metrics = {
            let mut map = lock(&self.map);
            if !map.is_mounted() {
                return None;
            }
            let mut rng = lock(&self.rng);
            map.click(at, &mut rng.stream(METRICS_STREAM))
        };
        self.store
            .select(metrics.clone(), at, SelectionSource::MapClick);
        Some(metrics)
    }

    pub fn alert_click(&self, index: usize) -> Option<ImpactMetrics> {
        let (metrics, at) = {
            let mut map = lock(&self.map);
            let alert = *map.alerts().get(index)?;
            let mut rng = lock(&self.rng);
            let metrics = map.click_alert(index, &mut rng.stream(METRICS_STREAM))?;
            (
                metrics,
                Coordinates {
                    lat: alert.latitude,
                    lng: alert.longitude,
                },
            )
        };
        self.store
            .select(metrics.clone(), at, SelectionSource::AlertClick);
        Some(metrics)
    }

    /// Typed coordinates. Anything that does not parse to two finite numbers is ignored.
    pub fn manual_entry(&self, lat: &str, lng: &str) -> Option<ImpactMetrics> {
        let Some(at) = Coordinates::parse(lat, lng) else {
            debug!(lat, lng, "ignoring unparsable manual entry");
            return None;
        };
        let metrics = self.synthesize_entry(at);
        self.store
            .select(metrics.clone(), at, SelectionSource::ManualEntry);
        Some(metrics)
    }

    /// Resolves a place name and selects it, unless something newer was selected while
    /// the lookup was in flight.
    pub async fn search_place(&self, query: &str) -> Option<ImpactMetrics> {
        let ticket = self.store.begin_place_search(query)?;
        let resolved = self
            .insights
            .resolve_place_coordinates(query.trim())
            .await
            .map(|at| (self.synthesize_entry(at), at));
        let metrics = resolved.as_ref().map(|(metrics, _)| metrics.clone());
        if self.store.finish_place_search(ticket, resolved) {
            metrics
        } else {
            None
        }
    }

    /// Requests prose insights for the current selection. `None` when nothing is selected
    /// or a newer request or selection superseded this one.
    pub async fn generate_insights(&self) -> Option<String> {
        let (ticket, metrics) = self.store.begin_insights()?;
        let text = self
            .insights
            .request_insights(&metrics.region, &metrics)
            .await;
        self.store
            .finish_insights(ticket, text.clone())
            .then_some(text)
    }

    pub async fn refresh_news(&self) -> Vec<NewsItem> {
        let ticket = self.store.begin_news();
        self.load_news(ticket).await
    }

    async fn load_news(&self, ticket: RequestTicket) -> Vec<NewsItem> {
        let news = self.insights.request_news().await;
        self.store.finish_news(ticket, news.clone());
        news
    }

    pub fn series(&self) -> DashboardSeries {
        DashboardSeries::from_metrics(&self.store.metrics())
    }

    /// Report for the current selection. Fails with [`ReportError::NoSelection`] until a
    /// point with measurable loss is selected.
    pub fn render_report(&self) -> Result<RenderedReport, ReportError> {
        let metrics = self.store.metrics();
        ensure_selection(&metrics)?;
        Ok(RenderedReport {
            filename: report_filename(&metrics.region),
            body: self.exporter.render(&metrics),
        })
    }

    pub fn export_report(&self) -> Result<PathBuf, ReportError> {
        self.exporter.write(&self.store.metrics())
    }

    fn synthesize_entry(&self, at: Coordinates) -> ImpactMetrics {
        let mut rng = lock(&self.rng);
        synthesize(at, self.entry_rule_set, &mut rng.stream(METRICS_STREAM))
    }
}

impl<G: TextGenerator + Send + Sync + 'static> Dashboard<G> {
    /// Starts a background news fetch. `loading_news` is already set when this returns.
    pub fn spawn_news_refresh(self: &Arc<Self>) -> JoinHandle<Vec<NewsItem>> {
        let ticket = self.store.begin_news();
        let dashboard = Arc::clone(self);
        tokio::spawn(async move { dashboard.load_news(ticket).await })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;
    use crate::insights::{GenerationRequest, GeneratorError, INSIGHTS_FALLBACK};
    use crate::metrics::NO_SELECTION_REGION;

    struct Offline;

    impl TextGenerator for Offline {
        fn generate(
            &self,
            _request: GenerationRequest,
        ) -> impl Future<Output = Result<String, GeneratorError>> + Send {
            async { Err(GeneratorError::MissingApiKey) }
        }
    }

    struct Headlines;

    impl TextGenerator for Headlines {
        fn generate(
            &self,
            _request: GenerationRequest,
        ) -> impl Future<Output = Result<String, GeneratorError>> + Send {
            async {
                Ok(r#"[{"id":"1","title":"Queimadas","summary":"s","source":"INPE","date":"2025-01-01","category":"Incêndios"}]"#
                    .to_string())
            }
        }
    }

    struct Geocoder;

    impl TextGenerator for Geocoder {
        fn generate(
            &self,
            _request: GenerationRequest,
        ) -> impl Future<Output = Result<String, GeneratorError>> + Send {
            async { Ok(r#"{"lat": -3.4, "lng": -62.2}"#.to_string()) }
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.simulation.seed = Some(7);
        settings
    }

    #[test]
    fn entering_map_mounts_and_leaving_unmounts() {
        let dashboard = Dashboard::new(&settings(), Offline);
        assert!(!dashboard.map_state().mounted);

        dashboard.switch_view(ViewMode::Map);
        let state = dashboard.map_state();
        assert!(state.mounted);
        assert!((350..=665).contains(&state.layers.markers.len()));

        dashboard.switch_view(ViewMode::Dashboard);
        let state = dashboard.map_state();
        assert!(!state.mounted);
        assert!(state.layers.markers.is_empty());
    }

    #[test]
    fn map_click_requires_mounted_map() {
        let dashboard = Dashboard::new(&settings(), Offline);
        let at = Coordinates::new(-3.4, -62.2).unwrap();
        assert!(dashboard.map_click(at).is_none());
        assert_eq!(dashboard.snapshot().metrics.region, NO_SELECTION_REGION);

        dashboard.switch_view(ViewMode::Map);
        let metrics = dashboard.map_click(at).unwrap();
        assert!(metrics.region.starts_with("Cinturão Neotropical"));
        assert_eq!(dashboard.snapshot().coordinates, Some(at));
        assert_eq!(dashboard.map_state().layers.selection, Some(at));
    }

    #[test]
    fn alert_click_selects_alert_position() {
        let dashboard = Dashboard::new(&settings(), Offline);
        dashboard.switch_view(ViewMode::Map);
        let marker = dashboard.map_state().layers.markers[3].clone();

        let metrics = dashboard.alert_click(3).unwrap();

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.metrics, metrics);
        assert_eq!(
            snapshot.coordinates,
            Some(Coordinates {
                lat: marker.latitude,
                lng: marker.longitude
            })
        );
        assert!(dashboard.alert_click(100_000).is_none());
    }

    #[test]
    fn manual_entry_uses_entry_rules_and_ignores_garbage() {
        let dashboard = Dashboard::new(&settings(), Offline);
        assert!(dashboard.manual_entry("abc", "-62.2").is_none());
        assert!(dashboard.manual_entry("", "").is_none());
        assert_eq!(dashboard.snapshot().revision, 0);

        let metrics = dashboard.manual_entry("-3.4", "-62.2").unwrap();
        assert_eq!(metrics.region, "Bioma Amazônia (-3.400, -62.200)");
        assert_eq!(metrics.loss_area_ha, 433.03);
        assert_eq!(metrics.last_update, "Atualizado via Entrada Manual");
    }

    #[tokio::test]
    async fn offline_generator_never_breaks_the_flow() {
        let dashboard = Dashboard::new(&settings(), Offline);
        assert!(dashboard.generate_insights().await.is_none());

        dashboard.manual_entry("-15.8", "-47.9").unwrap();
        let text = dashboard.generate_insights().await.unwrap();
        assert_eq!(text, INSIGHTS_FALLBACK);
        assert!(!dashboard.snapshot().analyzing);

        assert!(dashboard.refresh_news().await.is_empty());
        assert!(!dashboard.snapshot().loading_news);

        assert!(dashboard.search_place("Brasília").await.is_none());
        assert!(dashboard.snapshot().metrics.region.starts_with("Bioma Cerrado"));
    }

    #[tokio::test]
    async fn place_search_selects_resolved_point() {
        let dashboard = Dashboard::new(&settings(), Geocoder);
        let metrics = dashboard.search_place("Coari").await.unwrap();
        assert_eq!(metrics.region, "Bioma Amazônia (-3.400, -62.200)");
        assert_eq!(metrics.last_update, "Atualizado via Entrada Manual");
        assert!(!dashboard.snapshot().searching_place);
        assert!(dashboard.search_place("  ").await.is_none());
    }

    #[test]
    fn report_follows_current_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings();
        settings.report.output_dir = dir.path().to_path_buf();
        let dashboard = Dashboard::new(&settings, Offline);

        assert!(matches!(
            dashboard.render_report(),
            Err(ReportError::NoSelection)
        ));
        assert!(matches!(
            dashboard.export_report(),
            Err(ReportError::NoSelection)
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        dashboard.manual_entry("-3.4", "-62.2").unwrap();
        let report = dashboard.render_report().unwrap();
        assert!(report.body.contains("- Área de Desmatamento (Ha): 433,03"));

        let path = dashboard.export_report().unwrap();
        assert!(path.ends_with("EcoWatch_Relatorio_Bioma_Amazônia_-3.400_-62.200.txt"));
        assert_eq!(dashboard.series().weekly_trend.len(), 7);
    }

    #[test]
    fn concurrent_view_switches_keep_map_in_step() {
        let dashboard = Dashboard::new(&settings(), Offline);
        for round in 0..200 {
            std::thread::scope(|scope| {
                scope.spawn(|| dashboard.switch_view(ViewMode::Map));
                scope.spawn(|| dashboard.switch_view(ViewMode::Dashboard));
            });
            let on_map = dashboard.snapshot().view == ViewMode::Map;
            assert_eq!(on_map, dashboard.map_state().mounted, "round {round}");
            let click = dashboard.map_click(Coordinates { lat: 1.0, lng: 1.0 });
            assert_eq!(click.is_some(), on_map, "round {round}");
        }
    }

    #[tokio::test]
    async fn background_news_refresh_fills_snapshot() {
        let dashboard = Arc::new(Dashboard::new(&settings(), Headlines));
        assert!(dashboard.snapshot().news.is_empty());

        let handle = dashboard.spawn_news_refresh();
        assert!(dashboard.snapshot().loading_news);

        let news = handle.await.unwrap();
        assert_eq!(news.len(), 1);
        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.news, news);
        assert_eq!(snapshot.news[0].source, "INPE");
        assert!(!snapshot.loading_news);
    }
}
