//! Hosted text-generation boundary.
//!
//! [`TextGenerator`] is the raw request/response seam; [`InsightsService`] wraps it with
//! the three dashboard operations, each of which swallows failures and hands back a
//! fallback value instead of an error.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GeneratorSettings;
use crate::metrics::{Coordinates, ImpactMetrics};

pub const INSIGHTS_FALLBACK: &str =
    "Não foi possível gerar insights no momento. Verifique se a chave de API está configurada corretamente.";
pub const INSIGHTS_UNAVAILABLE: &str = "Análise indisponível para esta região no momento.";

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("no API key configured")]
    MissingApiKey,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    /// JSON constrained by the given response schema.
    Json(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub format: ResponseFormat,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            format: ResponseFormat::Text,
        }
    }

    pub fn json(prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            format: ResponseFormat::Json(schema),
        }
    }
}

pub trait TextGenerator {
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = Result<String, GeneratorError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub date: String,
    pub category: String,
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    top_p: f32,
}

impl GeminiClient {
    pub fn from_settings(settings: &GeneratorSettings) -> Result<Self, GeneratorError> {
        Self::new(settings, settings.api_key())
    }

    pub fn new(
        settings: &GeneratorSettings,
        api_key: Option<String>,
    ) -> Result<Self, GeneratorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            temperature: settings.temperature,
            top_p: settings.top_p,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut generation_config = json!({
            "temperature": self.temperature,
            "topP": self.top_p,
            "thinkingConfig": { "thinkingBudget": 0 },
        });
        if let ResponseFormat::Json(schema) = &request.format {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema.clone();
        }
        json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }],
            "generationConfig": generation_config,
        })
    }
}

impl TextGenerator for GeminiClient {
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = Result<String, GeneratorError>> + Send {
        async move {
            let api_key = self.api_key.as_deref().ok_or(GeneratorError::MissingApiKey)?;
            let response = self
                .http
                .post(self.endpoint())
                .header("x-goog-api-key", api_key)
                .json(&self.request_body(&request))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GeneratorError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let payload: GenerateContentResponse = response.json().await?;
            Ok(payload.text())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

pub struct InsightsService<G> {
    generator: G,
    news_count: u32,
}

impl<G: TextGenerator + Sync> InsightsService<G> {
    pub fn new(generator: G, news_count: u32) -> Self {
        Self {
            generator,
            news_count,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Prose analysis of the selected region. Never fails.
    pub async fn request_insights(&self, region: &str, metrics: &ImpactMetrics) -> String {
        let data = serde_json::to_string(metrics).unwrap_or_default();
        let prompt = insights_prompt(region, &data);
        match self.generator.generate(GenerationRequest::text(prompt)).await {
            Ok(text) if text.trim().is_empty() => INSIGHTS_UNAVAILABLE.to_string(),
            Ok(text) => text,
            Err(err) => {
                warn!(%region, error = %err, "insights request failed");
                INSIGHTS_FALLBACK.to_string()
            }
        }
    }

    /// Recent environmental headlines; empty on any failure.
    pub async fn request_news(&self) -> Vec<NewsItem> {
        let request = GenerationRequest::json(news_prompt(self.news_count), news_schema());
        let reply = match self.generator.generate(request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "news request failed");
                return Vec::new();
            }
        };
        let body = strip_code_fence(&reply);
        if body.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<NewsItem>>(body) {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "news reply was not a list of items");
                Vec::new()
            }
        }
    }

    /// Approximate coordinates for a free-text place name; `None` on any failure.
    pub async fn resolve_place_coordinates(&self, place: &str) -> Option<Coordinates> {
        let request = GenerationRequest::json(geocode_prompt(place), geocode_schema());
        let reply = match self.generator.generate(request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%place, error = %err, "geocoding request failed");
                return None;
            }
        };
        let body = strip_code_fence(&reply);
        let point = match serde_json::from_str::<GeocodeReply>(body) {
            Ok(point) => point,
            Err(err) => {
                warn!(%place, error = %err, "geocoding reply was not a coordinate pair");
                return None;
            }
        };
        let resolved = Coordinates::new(point.lat, point.lng).ok();
        debug!(%place, ?resolved, "place resolved");
        resolved
    }
}

#[derive(Deserialize)]
struct GeocodeReply {
    lat: f64,
    lng: f64,
}

/// Drops a surrounding markdown code fence if the model added one.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

fn insights_prompt(region: &str, data: &str) -> String {
    format!(
        "Analise os seguintes dados ambientais para a região de {region}: {data}.\n\
         Forneça insights técnicos sobre:\n\
         1. O impacto do desmatamento na produção de chuva (bomba biótica e rios voadores).\n\
         2. Perda de biodiversidade local e sequestro de carbono.\n\
         3. Uma seção chamada \"Espécies Recomendadas para Rápido Reflorestamento\" específica \
         para o bioma desta região.\n\
         Seja técnico, use dados científicos reais do local e mantenha um tom de urgência ambiental."
    )
}

fn news_prompt(count: u32) -> String {
    format!(
        "Gere {count} notícias reais ou baseadas em tendências recentes sobre desmatamento global, \
         queimadas na Amazônia, novos recordes de temperatura e soluções de reflorestamento \
         tecnológico."
    )
}

fn geocode_prompt(place: &str) -> String {
    format!(
        "Retorne as coordenadas geográficas aproximadas (latitude e longitude) para o seguinte \
         local: \"{place}\". Responda estritamente em JSON."
    )
}

fn news_schema() -> Value {
    let field = json!({ "type": "STRING" });
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "id": field,
                "title": field,
                "summary": field,
                "source": field,
                "date": field,
                "category": field,
            },
            "required": ["id", "title", "summary", "source", "date", "category"],
        },
    })
}

fn geocode_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "lat": { "type": "NUMBER" },
            "lng": { "type": "NUMBER" },
        },
        "required": ["lat", "lng"],
    })
}
