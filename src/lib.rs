pub mod alerts;
pub mod analysis;
pub mod biome;
pub mod config;
pub mod dashboard;
pub mod insights;
pub mod map;
pub mod metrics;
pub mod report;
pub mod rng;
pub mod state;
pub mod web;

pub use biome::RuleSet;
pub use config::{Settings, SettingsLoader};
pub use dashboard::Dashboard;
pub use insights::{GeminiClient, InsightsService, TextGenerator};
pub use metrics::{synthesize, Coordinates, ImpactMetrics};
pub use state::{DashboardStore, ViewMode};
