//! Service-to-service authentication
//!
//! The frontend tier holds a shared secret and sends it as
//! `Authorization: Bearer <secret>` on every write. Once the secret checks out,
//! the acting user named in `X-Actor-Id` is trusted.

use hyper::header::{HeaderMap, AUTHORIZATION};

use crate::config::Config;
use crate::error::StoryError;

pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Debug, Clone)]
pub struct ServiceAuth {
    secret: Option<String>,
    dev_mode: bool,
}

impl ServiceAuth {
    pub fn new(secret: Option<String>, dev_mode: bool) -> Self {
        Self { secret, dev_mode }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_secret.clone(), config.dev_mode)
    }

    /// Verify the bearer secret. Without a configured secret only dev mode
    /// lets writes through.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), StoryError> {
        let expected = match &self.secret {
            Some(secret) => secret,
            None if self.dev_mode => return Ok(()),
            None => {
                return Err(StoryError::Unauthorized(
                    "service secret not configured".into(),
                ))
            }
        };

        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        match extract_bearer(header) {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
            Some(_) => Err(StoryError::Unauthorized("invalid service secret".into())),
            None => Err(StoryError::Unauthorized("missing bearer token".into())),
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Acting user id from the actor header
pub fn actor_id(headers: &HeaderMap) -> Result<String, StoryError> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoryError::Unauthorized(format!("missing {} header", ACTOR_HEADER)))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(auth: Option<&'static str>, actor: Option<&'static str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(auth) = auth {
            map.insert(AUTHORIZATION, HeaderValue::from_static(auth));
        }
        if let Some(actor) = actor {
            map.insert(ACTOR_HEADER, HeaderValue::from_static(actor));
        }
        map
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("abc123")), None);
        assert_eq!(extract_bearer(None), None);
    }

    #[test]
    fn test_check_secret() {
        let auth = ServiceAuth::new(Some("s3cret".into()), false);
        assert!(auth.check(&headers(Some("Bearer s3cret"), None)).is_ok());
        assert!(matches!(
            auth.check(&headers(Some("Bearer wrong"), None)),
            Err(StoryError::Unauthorized(_))
        ));
        assert!(matches!(
            auth.check(&headers(None, None)),
            Err(StoryError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_dev_mode_without_secret() {
        assert!(ServiceAuth::new(None, true).check(&HeaderMap::new()).is_ok());
        assert!(ServiceAuth::new(None, false).check(&HeaderMap::new()).is_err());
        // A configured secret is enforced even in dev mode
        assert!(ServiceAuth::new(Some("k".into()), true)
            .check(&HeaderMap::new())
            .is_err());
    }

    #[test]
    fn test_actor_id() {
        assert_eq!(actor_id(&headers(None, Some("alice"))).unwrap(), "alice");
        assert!(matches!(
            actor_id(&headers(None, None)),
            Err(StoryError::Unauthorized(_))
        ));
    }
}
