//! 连接凭证
//!
//! bearer token 的签发与校验。HTTP 侧从 Authorization 头取 token，
//! WebSocket 侧在升级时用查询参数里的同一种 token 做一次性校验。

use axum::http::{header, HeaderMap};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use config::JwtConfig;
use domain::UserId;

use crate::error::ApiError;

/// token 载荷：用户 id 与过期时间（Unix 秒）
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub exp: i64,
}

/// HS256 凭证服务
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_hours: i64,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expiration_hours: config.expiration_hours,
        }
    }

    /// 为用户签发 token
    pub fn issue(&self, user: UserId) -> Result<String, ApiError> {
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(self.expiration_hours);
        let claims = Claims {
            user_id: user.0,
            exp: expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::unauthorized(format!("Token generation failed: {err}")))
    }

    /// 校验 token 并还原其中的用户身份
    pub fn verify(&self, token: &str) -> Result<UserId, ApiError> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())
                .map_err(|err| ApiError::unauthorized(format!("Invalid token: {err}")))?;
        Ok(UserId::new(data.claims.user_id))
    }

    /// HTTP 请求的认证入口：Authorization 头里的 bearer token
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<UserId, ApiError> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;
        let token = bearer
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))?;
        self.verify(token)
    }
}
