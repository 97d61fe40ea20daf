use crate::config::AuthConfig;
use crate::domain::auth::Claims;
use crate::domain::event::AuthenticatePayload;
use crate::domain::session::{ConnectionId, LiveSession};
use crate::error::{AppError, Result};
use uuid::Uuid;

/// Binds connections and HTTP callers to a user identity.
///
/// With a JWT secret configured every identity must be backed by a signed
/// token. Without one the upstream identity provider is trusted and the
/// user id is taken as sent.
#[derive(Clone, Debug)]
pub struct IdentityService {
    jwt_secret: Option<String>,
}

impl IdentityService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self { jwt_secret: config.jwt_secret.clone() }
    }

    #[must_use]
    pub const fn requires_token(&self) -> bool {
        self.jwt_secret.is_some()
    }

    /// Handles the `authenticate` handshake of one connection.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if no usable user id was supplied.
    /// Returns `AppError::AuthError` if the token is missing, invalid, or names another user.
    #[tracing::instrument(err(level = "debug"), skip(self, payload), fields(user_id = tracing::field::Empty))]
    pub fn authenticate(&self, connection_id: ConnectionId, payload: &AuthenticatePayload) -> Result<LiveSession> {
        let claimed = payload
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid userId".into())))
            .transpose()?;

        let user_id = match &self.jwt_secret {
            Some(secret) => {
                let token = payload.token.as_deref().ok_or(AppError::AuthError)?;
                let claims = Claims::decode(token, secret)?;
                match claimed {
                    Some(id) if id != claims.sub => {
                        tracing::warn!("Token subject does not match claimed user");
                        return Err(AppError::AuthError);
                    }
                    _ => claims.sub,
                }
            }
            None => claimed.ok_or_else(|| AppError::BadRequest("No userId provided".into()))?,
        };

        tracing::Span::current().record("user_id", tracing::field::display(user_id));
        Ok(LiveSession::bind(connection_id, user_id))
    }

    /// Identity of an HTTP caller from its `Authorization` or `X-User-Id` header value.
    ///
    /// # Errors
    /// Returns `AppError::AuthError` if the credentials are missing or invalid.
    pub fn verify_http(&self, bearer: Option<&str>, user_header: Option<&str>) -> Result<Uuid> {
        match &self.jwt_secret {
            Some(secret) => {
                let token = bearer.ok_or(AppError::AuthError)?;
                Ok(Claims::decode(token, secret)?.sub)
            }
            None => {
                let raw = user_header.ok_or(AppError::AuthError)?;
                Uuid::parse_str(raw.trim()).map_err(|_| AppError::AuthError)
            }
        }
    }
}
