//! Map view: owns the alert field and the single selection marker, and turns clicks into
//! metrics. Actual drawing goes through a [`MapSurface`].

use serde::Serialize;
use tracing::debug;

use crate::alerts::{self, AlertMarker};
use crate::biome::RuleSet;
use crate::metrics::{synthesize, Coordinates, ImpactMetrics};
use crate::rng::RandomSource;

pub const BASE_TILES: &str = "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}{r}.png";
pub const LOSS_OVERLAY_TILES: &str =
    "https://tiles.globalforestwatch.org/map/tree_cover_loss/{z}/{x}/{y}.png";
pub const LOSS_OVERLAY_OPACITY: f32 = 0.65;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStyle {
    pub latitude: f64,
    pub longitude: f64,
    pub color: &'static str,
    pub label: &'static str,
    pub size: u32,
}

impl From<&AlertMarker> for MarkerStyle {
    fn from(alert: &AlertMarker) -> Self {
        Self {
            latitude: alert.latitude,
            longitude: alert.longitude,
            color: alert.kind.color(),
            label: alert.kind.label(),
            size: alert.intensity.marker_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupSummary {
    pub at: Coordinates,
    pub biome: String,
    pub trees_cut_per_day: u64,
}

/// Rendering backend the view draws on.
pub trait MapSurface {
    fn render_markers(&mut self, markers: &[MarkerStyle]);
    fn clear_markers(&mut self);
    fn place_selection(&mut self, at: Coordinates);
    fn remove_selection(&mut self);
    fn show_popup(&mut self, popup: PopupSummary);
}

pub struct MapView<S> {
    surface: S,
    rule_set: RuleSet,
    alerts: Vec<AlertMarker>,
    selection: Option<Coordinates>,
    mounted: bool,
}

impl<S: MapSurface> MapView<S> {
    pub fn new(surface: S, rule_set: RuleSet) -> Self {
        Self {
            surface,
            rule_set,
            alerts: Vec::new(),
            selection: None,
            mounted: false,
        }
    }

    /// Generates a fresh alert field and draws it. Remounting replaces the previous field.
    pub fn mount<R: RandomSource>(&mut self, rng: &mut R) {
        if self.mounted {
            self.unmount();
        }
        self.alerts = alerts::generate(rng);
        let styles: Vec<MarkerStyle> = self.alerts.iter().map(MarkerStyle::from).collect();
        self.surface.render_markers(&styles);
        self.mounted = true;
        debug!(alerts = self.alerts.len(), "map view mounted");
    }

    pub fn unmount(&mut self) {
        self.surface.clear_markers();
        if self.selection.take().is_some() {
            self.surface.remove_selection();
        }
        self.alerts.clear();
        self.mounted = false;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn alerts(&self) -> &[AlertMarker] {
        &self.alerts
    }

    pub fn selection(&self) -> Option<Coordinates> {
        self.selection
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Free click on the map: moves the selection marker and opens a popup.
    pub fn click<R: RandomSource>(&mut self, at: Coordinates, rng: &mut R) -> ImpactMetrics {
        if self.selection.take().is_some() {
            self.surface.remove_selection();
        }
        self.surface.place_selection(at);
        self.selection = Some(at);

        let metrics = synthesize(at, self.rule_set, rng);
        self.surface.show_popup(PopupSummary {
            at,
            biome: metrics.biome_label().to_string(),
            trees_cut_per_day: metrics.trees_cut_per_day,
        });
        metrics
    }

    /// Tap on an alert marker. Leaves the selection marker untouched.
    pub fn click_alert<R: RandomSource>(
        &mut self,
        index: usize,
        rng: &mut R,
    ) -> Option<ImpactMetrics> {
        let alert = self.alerts.get(index)?;
        let at = Coordinates {
            lat: alert.latitude,
            lng: alert.longitude,
        };
        Some(synthesize(at, self.rule_set, rng))
    }
}

/// Surface that records layer state so a browser client can draw it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLayers {
    pub markers: Vec<MarkerStyle>,
    pub selection: Option<Coordinates>,
    pub popup: Option<PopupSummary>,
}

impl MapSurface for MapLayers {
    fn render_markers(&mut self, markers: &[MarkerStyle]) {
        self.markers = markers.to_vec();
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
        self.popup = None;
    }

    fn place_selection(&mut self, at: Coordinates) {
        self.selection = Some(at);
    }

    fn remove_selection(&mut self) {
        self.selection = None;
        self.popup = None;
    }

    fn show_popup(&mut self, popup: PopupSummary) {
        self.popup = Some(popup);
    }
}
