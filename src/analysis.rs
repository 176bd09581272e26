//! Chart series and hydrological readings derived from the current metrics.

use serde::Serialize;

use crate::metrics::ImpactMetrics;

const WEEKDAYS: [&str; 7] = ["Seg", "Ter", "Qua", "Qui", "Sex", "Sab", "Dom"];
const WEEKLY_LOSS_SHARE: [f64; 7] = [0.10, 0.12, 0.15, 0.11, 0.14, 0.18, 0.20];
const WEEKLY_FIRE_SHARE: [f64; 7] = [0.05, 0.08, 0.12, 0.10, 0.15, 0.20, 0.30];

const HEAVY_LOSS_HA: f64 = 500.0;
const DESERTIFICATION_LOSS_HA: f64 = 800.0;
const DOWNWIND_LOSS_HA: f64 = 200.0;
const CRITICAL_CONTRIBUTION: f64 = 40.0;

const REGIONAL_DENSITY: f64 = 60.0;
const REGIONAL_CONTRIBUTION: f64 = 55.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub name: &'static str,
    pub loss: f64,
    pub fires: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RainInfluence {
    pub region: &'static str,
    pub density: f64,
    pub rain_contribution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RainStatus {
    Critical,
    Warning,
    Healthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RainAnalysis {
    pub region: String,
    pub evapotranspiration_index: f64,
    pub estimated_rainfall_contribution: f64,
    pub status: RainStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesertificationRisk {
    Alto,
    Moderado,
}

impl DesertificationRisk {
    pub fn label(self) -> &'static str {
        match self {
            DesertificationRisk::Alto => "ALTO",
            DesertificationRisk::Moderado => "MODERADO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hydrology {
    /// Percent of local rain-induction capacity lost.
    pub induction_loss_pct: f64,
    pub desertification_risk: DesertificationRisk,
    pub downwind_rainfall_drop_pct: f64,
    pub local_warming_c: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSeries {
    pub weekly_trend: Vec<TrendPoint>,
    pub rain_influence: Vec<RainInfluence>,
    pub rain_analysis: RainAnalysis,
    pub hydrology: Hydrology,
}

impl DashboardSeries {
    pub fn from_metrics(metrics: &ImpactMetrics) -> Self {
        Self {
            weekly_trend: weekly_trend(metrics),
            rain_influence: rain_influence(metrics),
            rain_analysis: rain_analysis(metrics),
            hydrology: hydrology(metrics),
        }
    }
}

pub fn weekly_trend(metrics: &ImpactMetrics) -> Vec<TrendPoint> {
    WEEKDAYS
        .iter()
        .zip(WEEKLY_LOSS_SHARE.iter().zip(WEEKLY_FIRE_SHARE.iter()))
        .map(|(&name, (&loss, &fires))| TrendPoint {
            name,
            loss: metrics.loss_area_ha * loss,
            fires: metrics.fire_alerts as f64 * fires,
        })
        .collect()
}

fn local_density(loss_area_ha: f64) -> f64 {
    if loss_area_ha > HEAVY_LOSS_HA {
        30.0
    } else {
        85.0
    }
}

pub fn rain_contribution(loss_area_ha: f64) -> f64 {
    if loss_area_ha > HEAVY_LOSS_HA {
        25.0
    } else {
        78.0
    }
}

pub fn rain_influence(metrics: &ImpactMetrics) -> Vec<RainInfluence> {
    vec![
        RainInfluence {
            region: "Local Selecionado",
            density: local_density(metrics.loss_area_ha),
            rain_contribution: rain_contribution(metrics.loss_area_ha),
        },
        RainInfluence {
            region: "Média Regional",
            density: REGIONAL_DENSITY,
            rain_contribution: REGIONAL_CONTRIBUTION,
        },
    ]
}

pub fn rain_analysis(metrics: &ImpactMetrics) -> RainAnalysis {
    let contribution = rain_contribution(metrics.loss_area_ha);
    let status = if contribution < CRITICAL_CONTRIBUTION {
        RainStatus::Critical
    } else if metrics.loss_area_ha > DOWNWIND_LOSS_HA {
        RainStatus::Warning
    } else {
        RainStatus::Healthy
    };
    RainAnalysis {
        region: metrics.region.clone(),
        evapotranspiration_index: local_density(metrics.loss_area_ha) / 100.0,
        estimated_rainfall_contribution: contribution,
        status,
    }
}

pub fn hydrology(metrics: &ImpactMetrics) -> Hydrology {
    let loss = metrics.loss_area_ha;
    Hydrology {
        induction_loss_pct: 100.0 - rain_contribution(loss),
        desertification_risk: if loss > DESERTIFICATION_LOSS_HA {
            DesertificationRisk::Alto
        } else {
            DesertificationRisk::Moderado
        },
        downwind_rainfall_drop_pct: if loss > DOWNWIND_LOSS_HA { 35.0 } else { 15.0 },
        local_warming_c: if loss > 0.0 {
            (1.2 + loss / 150.0).min(9.4)
        } else {
            0.0
        },
    }
}
