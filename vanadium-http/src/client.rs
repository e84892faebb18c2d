//! Discord REST client implementation.

use crate::error::{flatten_errors, ApiErrorBody, RestError};
use crate::ratelimit::{RatelimitConfig, RatelimitHeaders, Ratelimiter};
use crate::route::Route;
use crate::routes::GatewayBot;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use vanadium_model::User;

/// User agent for requests.
const USER_AGENT_VALUE: &str = concat!(
    "DiscordBot (https://github.com/vanadium-rs/vanadium, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Bot token.
    pub token: String,
    /// REST API version.
    pub version: u8,
    /// Retries on 5xx responses before surfacing the error.
    pub code_500_retries: u32,
    /// Base URL override, replacing `https://discord.com/api/v{version}`.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Rate limit settings; `None` disables rate limiting entirely.
    pub ratelimits: Option<RatelimitConfig>,
}

impl RestConfig {
    /// Configuration with default settings for a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            version: 10,
            code_500_retries: 2,
            base_url: None,
            timeout: None,
            ratelimits: Some(RatelimitConfig::default()),
        }
    }

    /// Disable rate limiting; requests go straight to the transport.
    pub fn without_ratelimits(mut self) -> Self {
        self.ratelimits = None;
        self
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Extra request parameters.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// JSON body.
    pub body: Option<Value>,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    /// Attach a JSON body.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Discord REST API client.
///
/// All requests funnel through the bucket rate limiter unless rate
/// limits were disabled in the configuration.
pub struct RestClient {
    client: Client,
    config: RestConfig,
    base_url: String,
    ratelimiter: Ratelimiter,
}

impl RestClient {
    /// Create a new REST client.
    pub fn new(config: RestConfig) -> Result<Self, RestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bot {}", config.token))
                .map_err(|_| RestError::InvalidToken)?,
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://discord.com/api/v{}", config.version));

        let ratelimiter = match &config.ratelimits {
            Some(settings) => Ratelimiter::new(settings.clone()),
            None => Ratelimiter::disabled(),
        };

        Ok(Self {
            client,
            config,
            base_url,
            ratelimiter,
        })
    }

    /// The rate limiter backing this client.
    pub fn ratelimiter(&self) -> &Ratelimiter {
        &self.ratelimiter
    }

    // =========================================================================
    // Typed endpoints used by the library itself
    // =========================================================================

    /// Get gateway connection information for the bot.
    ///
    /// Returns the recommended shard count, gateway URL, and session
    /// start limits; the fleet coordinator uses this to plan spawning.
    pub async fn get_gateway_bot(&self) -> Result<GatewayBot, RestError> {
        let value = self
            .request(Method::GET, "/gateway/bot", RequestOptions::default())
            .await?;
        decode(value)
    }

    /// Get the current bot user.
    pub async fn get_current_user(&self) -> Result<User, RestError> {
        let value = self
            .request(Method::GET, "/users/@me", RequestOptions::default())
            .await?;
        decode(value)
    }

    // =========================================================================
    // Request pipeline
    // =========================================================================

    /// Perform a request against the API.
    ///
    /// The request is queued in its rate limit bucket, dispatched in
    /// arrival order, retried from the head of the queue on 429, and
    /// retried up to `code_500_retries` times on server errors.
    ///
    /// Returns the parsed JSON body, or `None` for bodyless responses
    /// such as 204.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Option<Value>, RestError> {
        let route = Route::new(method, path);
        let mut server_retries = 0u32;
        let mut requeue_front = false;

        loop {
            let permit = if self.ratelimiter.is_enabled() {
                Some(if requeue_front {
                    self.ratelimiter.acquire_front(&route).await?
                } else {
                    self.ratelimiter.acquire(&route).await?
                })
            } else {
                None
            };

            debug!(method = %route.method, path = %route.path, "dispatching request");

            let response = match self.make(&route, &options).await {
                Ok(response) => response,
                Err(source) => {
                    if let Some(permit) = permit {
                        permit.complete(None);
                    }
                    return Err(RestError::Transport(source));
                }
            };

            let status = response.status();
            let headers = RatelimitHeaders::parse(response.headers());
            if let Some(permit) = permit {
                permit.complete(Some(headers.clone()));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(
                    path = %route.path,
                    retry_after = ?headers.retry_after,
                    global = headers.global,
                    "rate limited"
                );

                if self.ratelimiter.is_enabled() {
                    // The bucket learned the retry delay from the
                    // headers; go back to the head of its queue.
                    requeue_front = true;
                    continue;
                }
                return Err(error_from_response(status, response).await);
            }

            if status.is_server_error() {
                if server_retries < self.config.code_500_retries {
                    server_retries += 1;
                    requeue_front = false;
                    let backoff = Duration::from_millis(500u64 << server_retries);
                    warn!(
                        path = %route.path,
                        status = status.as_u16(),
                        attempt = server_retries,
                        ?backoff,
                        "server error, retrying"
                    );
                    sleep(backoff).await;
                    continue;
                }
                return Err(error_from_response(status, response).await);
            }

            if status.is_success() {
                if status == StatusCode::NO_CONTENT {
                    return Ok(None);
                }

                let bytes = response.bytes().await?;
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)
                    .map_err(RestError::UnableToParseResponseBody)?;
                return Ok(Some(value));
            }

            return Err(error_from_response(status, response).await);
        }
    }

    /// Low-level transport call, no rate limiting.
    async fn make(
        &self,
        route: &Route,
        options: &RequestOptions,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url, route.path);
        let mut builder = self.client.request(route.method.clone(), &url);

        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        builder.send().await
    }
}

/// Decode a typed body, treating a missing body as `null`.
fn decode<T: DeserializeOwned>(value: Option<Value>) -> Result<T, RestError> {
    serde_json::from_value(value.unwrap_or(Value::Null))
        .map_err(RestError::UnableToParseResponseBody)
}

/// Build a [`RestError::Request`] from an error response, flattening the
/// body's nested error tree.
async fn error_from_response(status: StatusCode, response: Response) -> RestError {
    let bytes = response.bytes().await.unwrap_or_default();
    let body: ApiErrorBody = serde_json::from_slice(&bytes).unwrap_or(ApiErrorBody {
        code: None,
        message: None,
        errors: None,
    });

    RestError::Request {
        status: status.as_u16(),
        code: body.code,
        message: body
            .message
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned()),
        errors: body
            .errors
            .as_ref()
            .map(flatten_errors)
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RestConfig::new("token");
        assert_eq!(config.version, 10);
        assert_eq!(config.code_500_retries, 2);
        assert!(config.ratelimits.is_some());
    }

    #[test]
    fn test_client_base_url() {
        let client = RestClient::new(RestConfig::new("token")).unwrap();
        assert_eq!(client.base_url, "https://discord.com/api/v10");

        let client = RestClient::new(
            RestConfig::new("token").with_base_url("http://localhost:8080/api/v10"),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/api/v10");
    }

    #[test]
    fn test_disabled_ratelimits() {
        let client = RestClient::new(RestConfig::new("token").without_ratelimits()).unwrap();
        assert!(!client.ratelimiter().is_enabled());
    }

    #[test]
    fn test_decode_missing_body_fails() {
        let result: Result<GatewayBot, _> = decode(None);
        assert!(matches!(
            result,
            Err(RestError::UnableToParseResponseBody(_))
        ));
    }
}
