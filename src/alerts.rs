//! Synthetic sensor alerts scattered around the world's main forest belts.

use serde::{Deserialize, Serialize};

use crate::rng::RandomSource;

pub const MIN_PER_ANCHOR: usize = 8;
pub const MAX_PER_ANCHOR: usize = 17;
pub const SCATTERED_COUNT: usize = 70;

const ANCHOR_LAT_SPREAD: f64 = 10.0;
const ANCHOR_LNG_SPREAD: f64 = 12.0;
const SCATTERED_LAT_SPAN: f64 = 150.0;
const SCATTERED_LNG_SPAN: f64 = 360.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Fire,
    Deforestation,
    RainRisk,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [AlertKind::Fire, AlertKind::Deforestation, AlertKind::RainRisk];

    pub fn color(self) -> &'static str {
        match self {
            AlertKind::Fire => "#ef4444",
            AlertKind::Deforestation => "#f59e0b",
            AlertKind::RainRisk => "#3b82f6",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AlertKind::Fire => "Fogo Detectado",
            AlertKind::Deforestation => "Perda de Dossel",
            AlertKind::RainRisk => "Estresse Hídrico",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Medium,
    High,
}

impl Intensity {
    pub const ALL: [Intensity; 3] = [Intensity::Low, Intensity::Medium, Intensity::High];

    pub fn label(self) -> &'static str {
        match self {
            Intensity::High => "high",
            Intensity::Medium => "medium",
            Intensity::Low => "low",
        }
    }

    /// Marker edge length in pixels.
    pub fn marker_size(self) -> u32 {
        match self {
            Intensity::High => 20,
            Intensity::Medium => 14,
            Intensity::Low => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertMarker {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub intensity: Intensity,
}

#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    pub lat: f64,
    pub lng: f64,
}

const fn anchor(lat: f64, lng: f64) -> Anchor {
    Anchor { lat, lng }
}

pub const ANCHORS: [Anchor; 35] = [
    // South America
    anchor(-3.4, -62.2), // Amazônia
    anchor(-18.5, -55.0), // Pantanal/Cerrado
    anchor(-40.0, -72.5), // Florestas Valdivianas
    anchor(5.0, -75.0), // Chocó
    // North and Central America
    anchor(55.0, -115.0), // Floresta Boreal (Canadá)
    anchor(45.0, -122.0), // Cascadia
    anchor(35.0, -85.0), // Apalaches
    anchor(18.0, -92.0), // Selva Lacandona
    // Africa
    anchor(0.0, 18.0), // Bacia do Congo
    anchor(-19.0, 47.0), // Florestas de Madagascar
    anchor(7.0, -10.0), // Florestas da Guiné
    anchor(-3.0, 37.0), // Kilimanjaro
    anchor(-15.0, 25.0), // Miombo
    // Europe
    anchor(62.0, 15.0), // Taiga Escandinava
    anchor(46.0, 25.0), // Cárpatos
    anchor(48.0, 8.0), // Floresta Negra
    anchor(40.0, -4.0), // Península Ibérica
    anchor(38.0, 23.0), // Mediterrâneo Oriental
    anchor(52.0, 24.0), // Bialowieza
    anchor(43.0, 18.0), // Balcãs
    // Asia
    anchor(65.0, 105.0), // Taiga Siberiana Central
    anchor(44.0, 135.0), // Krai de Primorsky
    anchor(25.0, 92.0), // Nordeste Indiano/Himalaia
    anchor(15.0, 75.0), // Gates Ocidentais
    anchor(18.0, 105.0), // Mekong
    anchor(-2.0, 115.0), // Bornéu
    anchor(0.0, 101.0), // Sumatra
    anchor(14.0, 121.0), // Filipinas
    anchor(-3.0, 140.0), // Papua Nova Guiné
    anchor(35.0, 138.0), // Florestas de Montanha (Japão)
    anchor(28.0, 115.0), // Florestas Subtropicais (Sul da China)
    anchor(42.0, 75.0), // Tian Shan
    // Oceania
    anchor(-17.0, 145.0), // Daintree
    anchor(-35.0, 148.0), // Snowy Mountains
    anchor(-42.0, 172.0), // Alpes do Sul
];

pub fn min_alert_count() -> usize {
    ANCHORS.len() * MIN_PER_ANCHOR + SCATTERED_COUNT
}

pub fn max_alert_count() -> usize {
    ANCHORS.len() * MAX_PER_ANCHOR + SCATTERED_COUNT
}

/// Builds a fresh alert field: a cluster around every anchor, then the scattered points.
pub fn generate<R: RandomSource>(rng: &mut R) -> Vec<AlertMarker> {
    let mut alerts = Vec::with_capacity(max_alert_count());
    let cluster_span = (MAX_PER_ANCHOR - MIN_PER_ANCHOR + 1) as f64;

    for anchor in &ANCHORS {
        let density = MIN_PER_ANCHOR + (rng.next_unit() * cluster_span).floor() as usize;
        for _ in 0..density {
            let latitude = anchor.lat + (rng.next_unit() - 0.5) * ANCHOR_LAT_SPREAD;
            let longitude = anchor.lng + (rng.next_unit() - 0.5) * ANCHOR_LNG_SPREAD;
            alerts.push(random_marker(rng, latitude, longitude));
        }
    }

    for _ in 0..SCATTERED_COUNT {
        let latitude = (rng.next_unit() - 0.5) * SCATTERED_LAT_SPAN;
        let longitude = (rng.next_unit() - 0.5) * SCATTERED_LNG_SPAN;
        alerts.push(random_marker(rng, latitude, longitude));
    }

    alerts
}

fn random_marker<R: RandomSource>(rng: &mut R, latitude: f64, longitude: f64) -> AlertMarker {
    AlertMarker {
        latitude,
        longitude,
        kind: rng.pick(&AlertKind::ALL),
        intensity: rng.pick(&Intensity::ALL),
    }
}
