//! External mode selector
//!
//! The user picks a charge mode in Home Assistant (an `input_select`
//! entity). The regulator reads its label every tick and writes it back only
//! for the automatic switch to prefer-battery once the home battery is full.

use crate::config::HomeAssistantConfig;
use crate::error::{Result, VoltaicError};
use crate::logging::{StructuredLogger, get_logger};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

/// Source and sink of the user's charge mode label
#[async_trait]
pub trait ModeSelector: Send + Sync {
    async fn get_mode(&self) -> Result<String>;

    async fn set_mode(&self, label: &str) -> Result<()>;
}

/// In-memory selector for offline operation and tests
#[derive(Debug)]
pub struct StaticSelector {
    label: Mutex<String>,
}

impl StaticSelector {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: Mutex::new(label.into()),
        }
    }

    pub fn current(&self) -> String {
        self.label
            .lock()
            .map(|l| l.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl ModeSelector for StaticSelector {
    async fn get_mode(&self) -> Result<String> {
        Ok(self.current())
    }

    async fn set_mode(&self, label: &str) -> Result<()> {
        let mut current = self
            .label
            .lock()
            .map_err(|_| VoltaicError::mode_selector("Selector state poisoned"))?;
        *current = label.to_string();
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct EntityState {
    state: String,
}

/// Home Assistant REST selector backed by an `input_select` entity
#[derive(Debug, Clone)]
pub struct HomeAssistantSelector {
    base_url: String,
    token: String,
    entity_id: String,
    client: Client,
    logger: StructuredLogger,
}

impl HomeAssistantSelector {
    pub fn new(config: &HomeAssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| {
                VoltaicError::mode_selector(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            entity_id: config.mode_entity.clone(),
            client,
            logger: get_logger("selector"),
        })
    }

    fn check_status(&self, status: StatusCode, what: &str) -> Result<()> {
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(VoltaicError::mode_selector(format!(
                "Entity not found: {}",
                self.entity_id
            ))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                VoltaicError::mode_selector(format!("Authentication failed for {}", what)),
            ),
            s => Err(VoltaicError::mode_selector(format!(
                "{} returned status {}",
                what, s
            ))),
        }
    }
}

#[async_trait]
impl ModeSelector for HomeAssistantSelector {
    async fn get_mode(&self) -> Result<String> {
        let url = format!("{}/api/states/{}", self.base_url, self.entity_id);
        self.logger.trace(&format!("GET {}", url));

        let response = self.client.get(&url).bearer_auth(&self.token).send().await?;
        self.check_status(response.status(), "state query")?;

        let entity: EntityState = response.json().await?;
        self.logger
            .debug(&format!("{} = '{}'", self.entity_id, entity.state));
        Ok(entity.state)
    }

    async fn set_mode(&self, label: &str) -> Result<()> {
        let url = format!("{}/api/services/input_select/select_option", self.base_url);
        let body = serde_json::json!({
            "entity_id": self.entity_id,
            "option": label,
        });
        self.logger
            .info(&format!("Selecting '{}' on {}", label, self.entity_id));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        self.check_status(response.status(), "select_option")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::Arc;

    type Shared = Arc<Mutex<String>>;

    async fn state_handler(
        State(option): State<Shared>,
        Path(entity): Path<String>,
        headers: HeaderMap,
    ) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        if entity != "input_select.wallbox_charge_mode" {
            return Err(StatusCode::NOT_FOUND);
        }
        let state = option.lock().unwrap().clone();
        Ok(Json(serde_json::json!({ "entity_id": entity, "state": state })))
    }

    async fn select_handler(
        State(option): State<Shared>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        if let Some(o) = body.get("option").and_then(|v| v.as_str()) {
            *option.lock().unwrap() = o.to_string();
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    async fn fake_home_assistant() -> (String, Shared) {
        let option: Shared = Arc::new(Mutex::new("PV Charge (Prefer Charge)".to_string()));
        let app = Router::new()
            .route("/api/states/{entity}", get(state_handler))
            .route("/api/services/input_select/select_option", post(select_handler))
            .with_state(option.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{}", addr), option)
    }

    fn config(base_url: &str, token: &str) -> HomeAssistantConfig {
        HomeAssistantConfig {
            base_url: base_url.to_string(),
            token: token.to_string(),
            ..HomeAssistantConfig::default()
        }
    }

    #[tokio::test]
    async fn static_selector_round_trip() {
        let selector = StaticSelector::new("Aus");
        assert_eq!(selector.get_mode().await.unwrap(), "Aus");
        selector.set_mode("Max Charge").await.unwrap();
        assert_eq!(selector.get_mode().await.unwrap(), "Max Charge");
    }

    #[tokio::test]
    async fn home_assistant_get_and_set() {
        let (url, option) = fake_home_assistant().await;
        let selector = HomeAssistantSelector::new(&config(&url, "secret")).unwrap();

        assert_eq!(selector.get_mode().await.unwrap(), "PV Charge (Prefer Charge)");
        selector.set_mode("PV Charge (Prefer Battery)").await.unwrap();
        assert_eq!(*option.lock().unwrap(), "PV Charge (Prefer Battery)");
        assert_eq!(selector.get_mode().await.unwrap(), "PV Charge (Prefer Battery)");
    }

    #[tokio::test]
    async fn home_assistant_rejects_bad_token() {
        let (url, _) = fake_home_assistant().await;
        let selector = HomeAssistantSelector::new(&config(&url, "wrong")).unwrap();
        let err = selector.get_mode().await.unwrap_err();
        assert!(matches!(err, VoltaicError::ModeSelector { .. }));
    }
}
