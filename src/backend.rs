//! Client for the external classifier and chat services.

use crate::config::Config;
use crate::errors::{AppError, Result};
use crate::models::{Category, Classification};
use rand::{Rng, seq::SliceRandom};
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashSet, sync::Arc, sync::Mutex, time::Duration};
use tracing::{info, warn};

pub const CHAT_APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    category: String,
    confidence: f64,
    #[serde(default)]
    disposal_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: String,
}

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    classifier_url: Option<String>,
    chat_url: Option<String>,
}

impl BackendClient {
    pub fn new(classifier_url: Option<String>, chat_url: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AppError::internal)?;
        Ok(Self {
            http,
            classifier_url,
            chat_url,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.classifier_url.clone(),
            config.chat_url.clone(),
            config.backend_timeout,
        )
    }

    pub async fn classify(&self, image: &str) -> Result<Classification> {
        let url = self
            .classifier_url
            .as_deref()
            .ok_or_else(|| AppError::BackendUnavailable("no classifier configured".into()))?;

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "image": image }))
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(AppError::ClassificationFailed(format!(
                "classifier returned {}",
                response.status()
            )));
        }

        let reply: ClassifierReply = response
            .json()
            .await
            .map_err(|err| AppError::ClassificationFailed(err.to_string()))?;
        let category = reply
            .category
            .parse::<Category>()
            .map_err(|err| AppError::ClassificationFailed(err.to_string()))?;

        Ok(Classification {
            category,
            confidence: reply.confidence.clamp(0.0, 1.0),
            disposal_instructions: reply
                .disposal_instructions
                .unwrap_or_else(|| category.disposal_instructions().to_string()),
            simulated: false,
        })
    }

    /// Falls back to a simulated result when the classifier cannot answer.
    pub async fn classify_or_fallback(&self, image: &str) -> Classification {
        match self.classify(image).await {
            Ok(classification) => classification,
            Err(err) => {
                warn!(error = %err, "classification failed, using simulated result");
                simulated_classification(&mut rand::thread_rng())
            }
        }
    }

    pub async fn chat(&self, message: &str) -> Result<String> {
        let url = self
            .chat_url
            .as_deref()
            .ok_or_else(|| AppError::BackendUnavailable("no chat service configured".into()))?;

        info!(chars = message.len(), "forwarding chat message");
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(AppError::ChatFailed(format!(
                "chat service returned {}",
                response.status()
            )));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|err| AppError::ChatFailed(err.to_string()))?;
        Ok(reply.response)
    }
}

fn unavailable(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::BackendUnavailable("request timed out".into())
    } else {
        AppError::BackendUnavailable(err.to_string())
    }
}

/// Uniformly random category, confidence in [0.80, 1.00).
pub fn simulated_classification(rng: &mut impl Rng) -> Classification {
    let category = *Category::ALL
        .choose(rng)
        .unwrap_or(&Category::General);
    Classification {
        category,
        confidence: rng.gen_range(0.80..1.00),
        disposal_instructions: category.disposal_instructions().to_string(),
        simulated: true,
    }
}

/// Item weight when the client does not send one: [0.5, 2.5) kg.
pub fn estimated_weight(rng: &mut impl Rng) -> f64 {
    rng.gen_range(0.5..2.5)
}

/// Rejects a second classification for a user while one is pending.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    users: Arc<Mutex<HashSet<String>>>,
}

pub struct InFlightGuard {
    users: Arc<Mutex<HashSet<String>>>,
    user_id: String,
}

impl InFlight {
    pub fn acquire(&self, user_id: &str) -> Result<InFlightGuard> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| AppError::Internal("in-flight set poisoned".into()))?;
        if !users.insert(user_id.to_string()) {
            return Err(AppError::RequestInFlight);
        }
        Ok(InFlightGuard {
            users: Arc::clone(&self.users),
            user_id: user_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut users) = self.users.lock() {
            users.remove(&self.user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use rand::{SeedableRng, rngs::StdRng};

    const IMAGE: &str = "data:image/png;base64,AAAA";

    /// Serves `app` on a free local port and returns its base URL.
    async fn serve_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn stub_backend() -> String {
        let app = Router::new()
            .route(
                "/classify",
                post(|| async {
                    Json(serde_json::json!({ "category": "General Waste", "confidence": 0.93 }))
                }),
            )
            .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/unknown",
                post(|| async { Json(serde_json::json!({ "category": "glass", "confidence": 0.9 })) }),
            )
            .route(
                "/slow",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Json(serde_json::json!({ "category": "organic", "confidence": 0.9 }))
                }),
            )
            .route(
                "/chat",
                post(|Json(body): Json<serde_json::Value>| async move {
                    let message = body["message"].as_str().unwrap_or_default().to_string();
                    Json(serde_json::json!({ "response": format!("echo: {message}") }))
                }),
            );
        serve_stub(app).await
    }

    fn client(base: &str, classifier: &str, chat: &str, timeout: Duration) -> BackendClient {
        BackendClient::new(
            Some(format!("{base}{classifier}")),
            Some(format!("{base}{chat}")),
            timeout,
        )
        .unwrap()
    }

    #[test]
    fn simulated_results_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let result = simulated_classification(&mut rng);
            assert!(result.simulated);
            assert!((0.80..1.00).contains(&result.confidence));
            assert_eq!(
                result.disposal_instructions,
                result.category.disposal_instructions()
            );
            let kg = estimated_weight(&mut rng);
            assert!((0.5..2.5).contains(&kg));
        }
    }

    #[test]
    fn in_flight_guard_releases_on_drop() {
        let in_flight = InFlight::default();
        let guard = in_flight.acquire("user_1").unwrap();
        assert!(matches!(
            in_flight.acquire("user_1"),
            Err(AppError::RequestInFlight)
        ));
        assert!(in_flight.acquire("user_2").is_ok());
        drop(guard);
        assert!(in_flight.acquire("user_1").is_ok());
    }

    #[tokio::test]
    async fn unconfigured_backend_falls_back() {
        let client = BackendClient::new(None, None, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.classify("data:image/png;base64,AAAA").await,
            Err(AppError::BackendUnavailable(_))
        ));
        let result = client.classify_or_fallback("data:image/png;base64,AAAA").await;
        assert!(result.simulated);
        assert!(matches!(
            client.chat("hello").await,
            Err(AppError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn classifier_label_is_parsed() {
        let base = stub_backend().await;
        let client = client(&base, "/classify", "/chat", Duration::from_secs(5));

        let result = client.classify(IMAGE).await.unwrap();
        assert_eq!(result.category, Category::General);
        assert!((result.confidence - 0.93).abs() < 1e-9);
        assert_eq!(
            result.disposal_instructions,
            Category::General.disposal_instructions()
        );
        assert!(!result.simulated);
        assert!(!client.classify_or_fallback(IMAGE).await.simulated);
    }

    #[tokio::test]
    async fn classifier_errors_fall_back() {
        let base = stub_backend().await;

        let broken = client(&base, "/broken", "/broken", Duration::from_secs(5));
        assert!(matches!(
            broken.classify(IMAGE).await,
            Err(AppError::ClassificationFailed(_))
        ));
        assert!(broken.classify_or_fallback(IMAGE).await.simulated);
        assert!(matches!(broken.chat("hi").await, Err(AppError::ChatFailed(_))));

        let unknown = client(&base, "/unknown", "/chat", Duration::from_secs(5));
        assert!(matches!(
            unknown.classify(IMAGE).await,
            Err(AppError::ClassificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn slow_classifier_times_out() {
        let base = stub_backend().await;
        let client = client(&base, "/slow", "/slow", Duration::from_millis(200));

        match client.classify(IMAGE).await {
            Err(AppError::BackendUnavailable(reason)) => assert_eq!(reason, "request timed out"),
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(client.classify_or_fallback(IMAGE).await.simulated);
        assert!(matches!(
            client.chat("hi").await,
            Err(AppError::BackendUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn chat_reply_is_returned() {
        let base = stub_backend().await;
        let client = client(&base, "/classify", "/chat", Duration::from_secs(5));
        assert_eq!(
            client.chat("how do I sort glass?").await.unwrap(),
            "echo: how do I sort glass?"
        );
    }
}
