//! HTTP error types.

use thiserror::Error;

/// Errors that can occur during REST operations.
#[derive(Debug, Error)]
pub enum RestError {
    /// Transport-level failure (connection, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API rejected the request, or retries were exhausted.
    #[error("request failed with status {status}: {message}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Discord error code, when the body carried one.
        code: Option<u64>,
        /// Top-level error message.
        message: String,
        /// Flattened per-field errors from the response body.
        errors: Vec<String>,
    },

    /// A response body could not be parsed as JSON.
    #[error("unable to parse response body: {0}")]
    UnableToParseResponseBody(#[source] serde_json::Error),

    /// A rate limit bucket was requested while rate limits are disabled.
    #[error("cannot create a rate limit bucket with rate limits disabled")]
    CreateBucketWithDisabledRatelimits,

    /// The rate limiter was torn down while a request was queued.
    #[error("rate limiter shut down while request was queued")]
    RatelimiterDropped,

    /// Invalid header value when building the client (bad token).
    #[error("invalid authorization header: token contains invalid characters")]
    InvalidToken,
}

impl RestError {
    /// Whether the failure is a server error eligible for retry.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Request { status, .. } if (500..600).contains(&(*status as u32)))
    }
}

/// Discord API error response body.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
}

/// Flatten Discord's nested `errors` object into `path: message` strings.
///
/// The shape is a tree of objects where leaves hold an `_errors` array of
/// `{code, message}` entries.
pub(crate) fn flatten_errors(value: &serde_json::Value) -> Vec<String> {
    let mut output = Vec::new();
    walk_errors(value, &mut Vec::new(), &mut output);
    output
}

fn walk_errors(value: &serde_json::Value, path: &mut Vec<String>, output: &mut Vec<String>) {
    let Some(object) = value.as_object() else {
        return;
    };

    for (key, child) in object {
        if key == "_errors" {
            if let Some(entries) = child.as_array() {
                for entry in entries {
                    let message = entry
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown error");
                    if path.is_empty() {
                        output.push(message.to_owned());
                    } else {
                        output.push(format!("{}: {}", path.join("."), message));
                    }
                }
            }
            continue;
        }

        path.push(key.clone());
        walk_errors(child, path, output);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_errors() {
        let body = json!({
            "embeds": {
                "0": {
                    "fields": {
                        "0": {
                            "name": {
                                "_errors": [{"code": "BASE_TYPE_REQUIRED", "message": "This field is required"}]
                            }
                        }
                    }
                }
            }
        });

        let flat = flatten_errors(&body);
        assert_eq!(flat, vec!["embeds.0.fields.0.name: This field is required"]);
    }

    #[test]
    fn test_flatten_top_level_errors() {
        let body = json!({"_errors": [{"code": "X", "message": "nope"}]});
        assert_eq!(flatten_errors(&body), vec!["nope"]);
    }
}
