//! Biome classification by bounding boxes.
//!
//! Two rule tables exist: the primary one used for typed coordinates and place search,
//! and the latitude-band one used when the map itself is clicked. They disagree on
//! names and multipliers for the same geography, so callers always say which one they
//! want.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    Primary,
    MapClick,
}

impl RuleSet {
    pub fn label(self) -> &'static str {
        match self {
            RuleSet::Primary => "primary",
            RuleSet::MapClick => "map_click",
        }
    }

    /// Every biome this rule set can produce.
    pub fn biomes(self) -> &'static [Biome] {
        match self {
            RuleSet::Primary => &PRIMARY_BIOMES,
            RuleSet::MapClick => &MAP_CLICK_BIOMES,
        }
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RuleSet {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "primary" | "manual" => Ok(RuleSet::Primary),
            "map_click" | "map" => Ok(RuleSet::MapClick),
            other => Err(format!("unknown rule set '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Biome {
    pub name: &'static str,
    pub multiplier: f64,
}

const fn biome(name: &'static str, multiplier: f64) -> Biome {
    Biome { name, multiplier }
}

pub const AMAZONIA: Biome = biome("Bioma Amazônia", 4.2);
pub const CERRADO: Biome = biome("Bioma Cerrado", 2.5);
pub const MONITORED_AREA: Biome = biome("Área Monitorada", 1.0);

pub const NEOTROPICAL: Biome = biome("Cinturão Neotropical (Américas)", 4.4);
pub const AFROTROPICAL: Biome = biome("Cinturão Afrotropical", 4.0);
pub const INDO_MALAYAN: Biome = biome("Cinturão Indo-Malaio", 3.9);
pub const GLOBAL_TROPICAL: Biome = biome("Floresta Tropical Global", 3.5);
pub const BOREAL: Biome = biome("Cinturão de Taiga / Boreal Norte", 1.8);
pub const SOUTHERN_TEMPERATE: Biome = biome("Zonas Temperadas do Sul", 2.1);
pub const INTERNATIONAL_RESERVE: Biome = biome("Reserva Florestal Internacional", 1.0);

const PRIMARY_BIOMES: [Biome; 3] = [AMAZONIA, CERRADO, MONITORED_AREA];
const MAP_CLICK_BIOMES: [Biome; 7] = [
    NEOTROPICAL,
    AFROTROPICAL,
    INDO_MALAYAN,
    GLOBAL_TROPICAL,
    BOREAL,
    SOUTHERN_TEMPERATE,
    INTERNATIONAL_RESERVE,
];

const TROPIC_LATITUDE: f64 = 23.5;

pub fn classify(lat: f64, lng: f64, rule_set: RuleSet) -> Biome {
    match rule_set {
        RuleSet::Primary => classify_primary(lat, lng),
        RuleSet::MapClick => classify_map_click(lat, lng),
    }
}

fn classify_primary(lat: f64, lng: f64) -> Biome {
    let in_amazon = lat > -15.0 && lat < 5.0 && lng > -75.0 && lng < -45.0;
    let in_cerrado = lat > -25.0 && lat < -10.0 && lng > -60.0 && lng < -40.0;

    if in_amazon {
        AMAZONIA
    } else if in_cerrado {
        CERRADO
    } else {
        MONITORED_AREA
    }
}

fn classify_map_click(lat: f64, lng: f64) -> Biome {
    let tropical = lat.abs() < TROPIC_LATITUDE;
    let boreal = lat > 45.0 && lat < 75.0;
    let austral = lat < -30.0;

    if tropical {
        if lng > -85.0 && lng < -35.0 {
            NEOTROPICAL
        } else if lng > 10.0 && lng < 40.0 {
            AFROTROPICAL
        } else if lng > 90.0 && lng < 160.0 {
            INDO_MALAYAN
        } else {
            GLOBAL_TROPICAL
        }
    } else if boreal {
        BOREAL
    } else if austral {
        SOUTHERN_TEMPERATE
    } else {
        INTERNATIONAL_RESERVE
    }
}
