use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::quiz::UserId;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub exp: DateTime<Utc>,
    pub user_id: UserId,
    pub nbf: DateTime<Utc>,
}

/// PASETO v2.local 대칭 키. 정확히 32바이트여야 한다.
#[derive(Debug, Clone)]
pub struct TokenKey(Vec<u8>);

impl TokenKey {
    pub fn new(key: &str) -> Result<Self, handle_errors::Error> {
        if key.len() != 32 {
            return Err(handle_errors::Error::ConfigError(format!(
                "paseto_key must be exactly 32 bytes, got {}",
                key.len()
            )));
        }
        Ok(TokenKey(key.as_bytes().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
