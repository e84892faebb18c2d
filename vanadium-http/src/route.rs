//! Route templates for rate limit bucketing.
//!
//! Discord assigns rate limit buckets per route *template*: the request
//! path with every snowflake replaced by a placeholder, keyed together
//! with the method and the major parameter (the guild, channel, or
//! webhook the route operates on).

use reqwest::Method;
use std::time::{SystemTime, UNIX_EPOCH};
use vanadium_model::Snowflake;

/// Messages older than this get their own DELETE bucket.
pub const OLD_MESSAGE_THRESHOLD_MS: u64 = 14 * 24 * 60 * 60 * 1000;

/// The path parameter that partitions a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MajorParameter {
    /// Route operates on a guild.
    Guild(Snowflake),
    /// Route operates on a channel.
    Channel(Snowflake),
    /// Route operates on a webhook.
    Webhook(Snowflake),
    /// Route has no major parameter.
    Global,
}

impl MajorParameter {
    /// The bucket-id component for this parameter.
    pub fn key(&self) -> String {
        match self {
            Self::Guild(id) | Self::Channel(id) | Self::Webhook(id) => id.to_string(),
            Self::Global => "global".to_owned(),
        }
    }
}

/// A REST route resolved for rate limiting.
#[derive(Debug, Clone)]
pub struct Route {
    /// HTTP method.
    pub method: Method,
    /// Concrete request path, e.g. `/channels/123/messages`.
    pub path: String,
    /// Templated path, e.g. `/channels/:id/messages`.
    pub template: String,
    /// Major parameter extracted from the path.
    pub major: MajorParameter,
}

impl Route {
    /// Resolve a route from a method and concrete path.
    pub fn new(method: Method, path: &str) -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::new_at(method, path, now_ms)
    }

    /// Resolve a route with an explicit wall clock, for the old-message
    /// age check.
    pub(crate) fn new_at(method: Method, path: &str, now_ms: u64) -> Self {
        let mut template = String::with_capacity(path.len());
        let mut major = MajorParameter::Global;
        let mut previous: Option<&str> = None;
        let mut last_id: Option<Snowflake> = None;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            template.push('/');

            if let Some(id) = parse_snowflake(segment) {
                template.push_str(":id");
                last_id = Some(id);

                if major == MajorParameter::Global {
                    major = match previous {
                        Some("guilds") => MajorParameter::Guild(id),
                        Some("channels") => MajorParameter::Channel(id),
                        Some("webhooks") => MajorParameter::Webhook(id),
                        _ => MajorParameter::Global,
                    };
                }
            } else {
                template.push_str(segment);
            }

            previous = Some(segment);
        }

        // Deleting messages older than two weeks is limited separately by
        // the API, so those requests must not share the regular bucket.
        if method == Method::DELETE && template == "/channels/:id/messages/:id" {
            if let Some(message_id) = last_id {
                let age = now_ms.saturating_sub(message_id.timestamp());
                if age > OLD_MESSAGE_THRESHOLD_MS {
                    template.push_str("/old-message");
                }
            }
        }

        Self {
            method,
            path: path.to_owned(),
            template,
            major,
        }
    }

    /// Key into the learned route-hash table: method plus template.
    pub fn ratelimit_key(&self) -> String {
        format!("{}:{}", self.method.as_str(), self.template)
    }
}

/// Parse a path segment as a snowflake if it is entirely numeric.
fn parse_snowflake(segment: &str) -> Option<Snowflake> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse::<u64>().ok().map(Snowflake::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vanadium_model::DISCORD_EPOCH_MS;

    #[test]
    fn test_template_substitution() {
        let route = Route::new(Method::GET, "/channels/123/messages/456");
        assert_eq!(route.template, "/channels/:id/messages/:id");
        assert_eq!(route.ratelimit_key(), "GET:/channels/:id/messages/:id");
    }

    #[test]
    fn test_major_parameters() {
        let channel = Route::new(Method::GET, "/channels/123/messages");
        assert_eq!(channel.major, MajorParameter::Channel(Snowflake::new(123)));

        let guild = Route::new(Method::PATCH, "/guilds/9/roles/8");
        assert_eq!(guild.major, MajorParameter::Guild(Snowflake::new(9)));

        let webhook = Route::new(Method::POST, "/webhooks/7/token-ish");
        assert_eq!(webhook.major, MajorParameter::Webhook(Snowflake::new(7)));

        let global = Route::new(Method::GET, "/gateway/bot");
        assert_eq!(global.major, MajorParameter::Global);
        assert_eq!(global.major.key(), "global");
    }

    #[test]
    fn test_old_message_delete_split() {
        // Snowflake created at the Discord epoch: ancient.
        let old_message = Snowflake::new(1 << 22);
        let now_ms = DISCORD_EPOCH_MS + OLD_MESSAGE_THRESHOLD_MS * 2;

        let path = format!("/channels/123/messages/{old_message}");
        let route = Route::new_at(Method::DELETE, &path, now_ms);
        assert_eq!(route.template, "/channels/:id/messages/:id/old-message");

        // A message created "now" keeps the normal bucket.
        let fresh = Snowflake::new(((now_ms - DISCORD_EPOCH_MS) << 22) | 1);
        let path = format!("/channels/123/messages/{fresh}");
        let route = Route::new_at(Method::DELETE, &path, now_ms);
        assert_eq!(route.template, "/channels/:id/messages/:id");

        // GET is unaffected regardless of age.
        let path = format!("/channels/123/messages/{old_message}");
        let route = Route::new_at(Method::GET, &path, now_ms);
        assert_eq!(route.template, "/channels/:id/messages/:id");
    }
}
