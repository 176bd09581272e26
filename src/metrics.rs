use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::biome::{classify, Biome, RuleSet};
use crate::rng::RandomSource;

pub const NO_SELECTION_REGION: &str = "Global / Selecione um ponto no mapa";
pub const NO_SELECTION_UPDATE: &str = "Aguardando seleção...";

const DAYS_PER_YEAR: f64 = 365.0;
const DAILY_PACE_MIN: f64 = 0.5;
const DAILY_PACE_MAX: f64 = 2.5;

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("latitude must be a finite number, got {0}")]
    NonFiniteLatitude(f64),
    #[error("longitude must be a finite number, got {0}")]
    NonFiniteLongitude(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, MetricsError> {
        if !lat.is_finite() {
            return Err(MetricsError::NonFiniteLatitude(lat));
        }
        if !lng.is_finite() {
            return Err(MetricsError::NonFiniteLongitude(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Parses the two free-text fields of the manual entry form.
    pub fn parse(lat: &str, lng: &str) -> Option<Self> {
        let lat = lat.trim().parse::<f64>().ok()?;
        let lng = lng.trim().parse::<f64>().ok()?;
        Self::new(lat, lng).ok()
    }

    pub fn label(&self) -> String {
        format!("({:.3}, {:.3})", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactMetrics {
    pub region: String,
    pub loss_area_ha: f64,
    pub trees_cut: u64,
    pub trees_cut_per_day: u64,
    pub co2_loss_tons: u64,
    pub o2_lost_tons: u64,
    pub fire_alerts: u64,
    pub last_update: String,
}

impl ImpactMetrics {
    /// Zeroed bundle shown before anything is selected.
    pub fn no_selection() -> Self {
        Self {
            region: NO_SELECTION_REGION.to_string(),
            loss_area_ha: 0.0,
            trees_cut: 0,
            trees_cut_per_day: 0,
            co2_loss_tons: 0,
            o2_lost_tons: 0,
            fire_alerts: 0,
            last_update: NO_SELECTION_UPDATE.to_string(),
        }
    }

    pub fn has_selection(&self) -> bool {
        self.loss_area_ha > 0.0
    }

    /// Region label with the trailing coordinate pair removed.
    pub fn biome_label(&self) -> &str {
        self.region
            .split_once(" (")
            .map_or(self.region.as_str(), |(name, _)| name)
    }
}

impl Default for ImpactMetrics {
    fn default() -> Self {
        Self::no_selection()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormulaConstants {
    pub angle_divisor: f64,
    pub base_scale: f64,
    pub tree_density: f64,
    pub co2_factor: f64,
    pub o2_factor: f64,
    pub fire_base: f64,
    pub provenance: &'static str,
}

impl FormulaConstants {
    pub const PRIMARY: Self = Self {
        angle_divisor: 1.0,
        base_scale: 500.0,
        tree_density: 450.0,
        co2_factor: 45.0,
        o2_factor: 12.0,
        fire_base: 80.0,
        provenance: "Atualizado via Entrada Manual",
    };

    pub const MAP_CLICK: Self = Self {
        angle_divisor: 8.0,
        base_scale: 450.0,
        tree_density: 420.0,
        co2_factor: 44.0,
        o2_factor: 11.5,
        fire_base: 95.0,
        provenance: "Monitoramento Satelital NASA/ESA/GFW",
    };

    pub fn for_rule_set(rule_set: RuleSet) -> Self {
        match rule_set {
            RuleSet::Primary => Self::PRIMARY,
            RuleSet::MapClick => Self::MAP_CLICK,
        }
    }
}

/// Hectares lost before rounding; the only input-dependent part of the bundle.
pub fn loss_area(point: Coordinates, multiplier: f64, constants: &FormulaConstants) -> f64 {
    let k = constants.angle_divisor;
    ((point.lat / k).sin() * (point.lng / k).cos()).abs() * constants.base_scale * multiplier
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Classifies `point` and builds its full metrics bundle.
pub fn synthesize<R: RandomSource>(
    point: Coordinates,
    rule_set: RuleSet,
    rng: &mut R,
) -> ImpactMetrics {
    let biome = classify(point.lat, point.lng, rule_set);
    synthesize_for_biome(point, biome, &FormulaConstants::for_rule_set(rule_set), rng)
}

pub fn synthesize_for_biome<R: RandomSource>(
    point: Coordinates,
    biome: Biome,
    constants: &FormulaConstants,
    rng: &mut R,
) -> ImpactMetrics {
    let loss_area_ha = round2(loss_area(point, biome.multiplier, constants));
    // Trees, CO2 and O2 come from the rounded area, not the raw one, so they agree with the
    // displayed hectares. Flooring the raw area can give one more tree (27053 vs 27052 for a
    // map click at (-3.4, -62.2)).
    let trees_cut = (loss_area_ha * constants.tree_density).floor() as u64;

    let pace = rng.uniform(DAILY_PACE_MIN, DAILY_PACE_MAX);
    let trees_cut_per_day = (trees_cut as f64 / DAYS_PER_YEAR * pace).floor() as u64;
    let fire_alerts = (rng.next_unit() * constants.fire_base * biome.multiplier).floor() as u64;

    ImpactMetrics {
        region: format!("{} {}", biome.name, point.label()),
        loss_area_ha,
        trees_cut,
        trees_cut_per_day,
        co2_loss_tons: (loss_area_ha * constants.co2_factor).round() as u64,
        o2_lost_tons: (loss_area_ha * constants.o2_factor).round() as u64,
        fire_alerts,
        last_update: constants.provenance.to_string(),
    }
}

/// Upper bound on `trees_cut_per_day` for a given `trees_cut`.
pub fn max_trees_per_day(trees_cut: u64) -> u64 {
    (trees_cut as f64 / DAYS_PER_YEAR * DAILY_PACE_MAX).ceil() as u64
}
