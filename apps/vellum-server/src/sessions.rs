//! Static session table for deployments without an external session service.
//!
//! `VELLUM_SESSIONS` holds `token:email` pairs separated by commas. This is a
//! stand-in wired up at startup; a real deployment implements
//! [`SessionLookup`] over its session backend instead.

use std::collections::HashMap;

use async_trait::async_trait;
use vellum_guard::{GuardError, SessionLookup};

pub struct StaticSessionLookup {
    sessions: HashMap<String, String>,
}

impl StaticSessionLookup {
    pub fn from_csv(value: &str) -> Self {
        let sessions = value
            .split(',')
            .filter_map(|pair| {
                let (token, email) = pair.trim().split_once(':')?;
                if token.is_empty() || email.is_empty() {
                    return None;
                }
                Some((token.to_string(), email.to_string()))
            })
            .collect();
        Self { sessions }
    }
}

#[async_trait]
impl SessionLookup for StaticSessionLookup {
    async fn subject_for_token(&self, token: &str) -> Result<Option<String>, GuardError> {
        Ok(self.sessions.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parses_pairs_and_skips_malformed() {
        let lookup = StaticSessionLookup::from_csv("t1:a@example.com, t2:b@example.com, junk, :x");
        assert_eq!(
            lookup.subject_for_token("t1").await.unwrap().as_deref(),
            Some("a@example.com")
        );
        assert_eq!(
            lookup.subject_for_token("t2").await.unwrap().as_deref(),
            Some("b@example.com")
        );
        assert_eq!(lookup.subject_for_token("junk").await.unwrap(), None);
    }
}
