use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    config::IdentityConfig,
    error::{AppError, Result},
};

/// Resolves a bearer token to the user the identity provider issued it to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Uuid>;
}

/// Verifies tokens against the provider's OpenID Connect userinfo endpoint.
#[derive(Clone)]
pub struct UserInfoVerifier {
    client: Client,
    userinfo_url: String,
}

impl UserInfoVerifier {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            userinfo_url: config.userinfo_url.clone(),
        })
    }
}

#[async_trait]
impl TokenVerifier for UserInfoVerifier {
    async fn verify(&self, token: &str) -> Result<Uuid> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                parse_userinfo(&bytes)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!("❌ Identity provider rejected a bearer token");
                Err(AppError::Authentication(
                    "Token rejected by identity provider".to_string(),
                ))
            }
            status => Err(AppError::Internal(format!(
                "Identity provider returned {}",
                status
            ))),
        }
    }
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
}

/// Extracts the user id from a userinfo body.
pub fn parse_userinfo(body: &[u8]) -> Result<Uuid> {
    let info: UserInfo = sonic_rs::from_slice(body)
        .map_err(|e| AppError::Internal(format!("Invalid userinfo response: {}", e)))?;

    Uuid::parse_str(info.sub.trim())
        .map_err(|_| AppError::Authentication("Token subject is not a user id".to_string()))
}

/// Resolves the session owner for `token`.
///
/// The provider decides who the token belongs to. A `claimed` id that
/// disagrees with it is refused.
pub async fn resolve_session_owner(
    verifier: &dyn TokenVerifier,
    token: &str,
    claimed: Option<Uuid>,
) -> Result<Uuid> {
    let user_id = verifier.verify(token).await?;

    if user_id.is_nil() {
        return Err(AppError::Authentication("Token subject is nil".to_string()));
    }

    if claimed.is_some_and(|claimed| claimed != user_id) {
        tracing::warn!(
            "❌ Session start refused: token of {} claimed for another user",
            user_id
        );
        return Err(AppError::Authentication(
            "Token does not belong to the requested user".to_string(),
        ));
    }

    Ok(user_id)
}
