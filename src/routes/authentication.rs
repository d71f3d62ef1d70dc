use chrono::prelude::*;
use std::future;
use warp::Filter;

use crate::types::quiz::UserId;
use crate::types::session::{Session, TokenKey};

pub fn verify_token(token: &str, key: &TokenKey) -> Result<Session, handle_errors::Error> {
    let token = paseto::tokens::validate_local_token(
        token,
        None,
        key.as_bytes(),
        &paseto::tokens::TimeBackend::Chrono,
    )
    .map_err(|_| handle_errors::Error::CannotDecryptToken)?;

    serde_json::from_value::<Session>(token).map_err(|_| handle_errors::Error::CannotDecryptToken)
}

/// 세션 토큰을 발급한다. 유효 기간은 하루.
pub fn issue_token(user_id: &UserId, key: &TokenKey) -> Result<String, handle_errors::Error> {
    let current_date_time = Utc::now();
    let dt = current_date_time + chrono::Duration::days(1);
    let encryption_key = key.as_bytes().to_vec();

    paseto::tokens::PasetoBuilder::new()
        .set_encryption_key(&encryption_key)
        .set_expiration(&dt)
        .set_not_before(&current_date_time)
        .set_claim("user_id", serde_json::json!(user_id))
        .build()
        .map_err(|_| handle_errors::Error::CannotIssueToken)
}

/// Authorization 헤더에서 세션을 꺼낸다.
/// 헤더가 없거나 토큰이 유효하지 않으면 Unauthorized로 거부한다.
pub fn auth(key: TokenKey) -> impl Filter<Extract = (Session,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("Authorization").and_then(move |token: Option<String>| {
        let session = match token {
            Some(token) => {
                let token = token.strip_prefix("Bearer ").unwrap_or(&token);
                verify_token(token, &key)
            }
            None => Err(handle_errors::Error::Unauthorized),
        };

        future::ready(session.map_err(|_| warp::reject::custom(handle_errors::Error::Unauthorized)))
    })
}
