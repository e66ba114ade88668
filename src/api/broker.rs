use super::retry::{retry_with_backoff, RetryPolicy};
use super::{OrderAck, TradingApi};
use crate::config::BrokerSettings;
use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

type BrokerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Standard response wrapper of the broker HTTP API
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    ibkr_connected: bool,
}

#[derive(Debug, Clone)]
struct Session {
    established_at: DateTime<Utc>,
}

/// HTTP client for the brokerage gateway
///
/// Cloneable; clones share the rate limiter and the session.
/// The session is established lazily on first use and dropped again on
/// connection-level failures so the next call reconnects.
#[derive(Clone)]
pub struct BrokerClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    rate_limiter: Arc<BrokerRateLimiter>,
    session: Arc<Mutex<Option<Session>>>,
    connect_policy: RetryPolicy,
}

impl BrokerClient {
    pub fn new(settings: &BrokerSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| Error::Configuration(format!("broker.base_url: {}", e)))?;
        let rpm = NonZeroU32::new(settings.requests_per_minute).ok_or_else(|| {
            Error::Configuration("broker.requests_per_minute must be positive".to_string())
        })?;

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(rpm))),
            session: Arc::new(Mutex::new(None)),
            connect_policy: RetryPolicy::new(
                settings.connect_retries,
                Duration::from_secs(settings.connect_backoff_secs),
            ),
        })
    }

    pub fn with_connect_policy(mut self, policy: RetryPolicy) -> Self {
        self.connect_policy = policy;
        self
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn invalidate_session(&self) {
        if self.session.lock().await.take().is_some() {
            tracing::warn!("🔌 Broker session dropped, will reconnect on next request");
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Configuration("broker.base_url cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check_connected(&self) -> Result<()> {
        let response = self.send(Method::GET, self.url(&["health"])?, None).await?;
        let health: HealthResponse = response.json().await?;
        if health.ibkr_connected {
            Ok(())
        } else {
            Err(Error::Broker("gateway reports brokerage disconnected".to_string()))
        }
    }

    /// Establish the session, retrying with backoff while the gateway is down
    pub async fn establish_session(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        tracing::info!("🔗 Establishing broker session at {}", self.base_url);
        retry_with_backoff(self.connect_policy, "Broker session", move || {
            self.check_connected()
        })
        .await
        .map_err(as_broker_error)?;

        *session = Some(Self::new_session());
        Ok(())
    }

    /// Single reconnect attempt used by per-order calls
    async fn ensure_session(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        self.check_connected().await.map_err(as_broker_error)?;
        *session = Some(Self::new_session());
        Ok(())
    }

    fn new_session() -> Session {
        let established = Session {
            established_at: Utc::now(),
        };
        tracing::info!("✅ Broker session established at {}", established.established_at);
        established
    }

    async fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let mut request = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        Ok(request.send().await?)
    }

    /// Session-backed call returning the envelope's `data`
    async fn call(&self, method: Method, url: Url, body: Option<Value>) -> std::result::Result<Value, String> {
        self.ensure_session().await.map_err(|e| e.to_string())?;

        let response = match self.send(method, url, body).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connection() {
                    self.invalidate_session().await;
                }
                return Err(e.to_string());
            }
        };
        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;

        let envelope: Envelope = serde_json::from_str(&text)
            .map_err(|_| format!("HTTP {}: {}", status, truncate(&text, 200)))?;

        if !status.is_success() || envelope.status != "success" {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(message);
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl TradingApi for BrokerClient {
    async fn resolve_symbol(&self, symbol: &str) -> Result<String> {
        let resolution_error = |reason: String| Error::Resolution {
            symbol: symbol.to_string(),
            reason,
        };

        let url = self.url(&["contract", symbol])?;
        let data = self
            .call(Method::GET, url, None)
            .await
            .map_err(resolution_error)?;

        match data.get("conid") {
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(resolution_error("no contract id in response".to_string())),
        }
    }

    async fn current_price(&self, contract_id: &str) -> Result<f64> {
        let mut url = self.url(&["marketdata"])?;
        url.query_pairs_mut().append_pair("conids", contract_id);

        let data = self.call(Method::GET, url, None).await.map_err(Error::Price)?;
        let quote = match &data {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };

        ["price", "close", "last"]
            .iter()
            .filter_map(|key| quote.get(*key).and_then(as_f64))
            .find(|p| *p > 0.0)
            .ok_or_else(|| Error::Price(format!("no usable quote for contract {}", contract_id)))
    }

    async fn submit_market_buy(&self, contract_id: &str, quantity: u32) -> Result<OrderAck> {
        let conid: Value = contract_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(contract_id));
        let body = json!({
            "conid": conid,
            "side": "BUY",
            "quantity": quantity,
            "order_type": "MKT",
            "tif": "DAY",
        });

        let data = self
            .call(Method::POST, self.url(&["order"])?, Some(body))
            .await
            .map_err(Error::Submission)?;

        Ok(OrderAck {
            order_id: find_order_id(&data),
        })
    }

    async fn connect(&self) -> Result<()> {
        self.establish_session().await
    }

    async fn health(&self) -> bool {
        match self.check_connected().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Broker health check failed: {}", e);
                false
            }
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First `order_id`/`orderId` anywhere in the payload, depth-first
fn find_order_id(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in ["order_id", "orderId"] {
                match map.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                    Some(Value::Number(n)) => return Some(n.to_string()),
                    _ => {}
                }
            }
            map.values().find_map(find_order_id)
        }
        Value::Array(items) => items.iter().find_map(find_order_id),
        _ => None,
    }
}

fn as_broker_error(e: Error) -> Error {
    match e {
        Error::Broker(_) => e,
        other => Error::Broker(other.to_string()),
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
