//! Login and bearer token authentication.

use hospital_storage::{DynStorage, NewUser, Role, User};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::password::{hash_password, verify_password};
use crate::token::{Claims, JwtService};

/// Identity of an authenticated request, taken from the token alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub token_id: String,
}

impl TryFrom<Claims> for AuthContext {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = claims.user_id().ok_or(AuthError::UnknownUser)?;
        Ok(Self {
            user_id,
            username: claims.username,
            role: claims.role,
            token_id: claims.jti,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub access_token: String,
    pub expires_in: u64,
    pub user: User,
}

pub struct AuthService {
    storage: DynStorage,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(storage: DynStorage, config: &AuthConfig) -> Self {
        Self {
            storage,
            jwt: JwtService::from_config(config),
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Checks credentials and issues a token.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError> {
        let Some(user) = self.storage.find_user_by_username(username).await? else {
            tracing::info!(username = %username, "login rejected: unknown user");
            return Err(AuthError::InvalidCredentials);
        };
        let valid = verify_password(password, &user.password_hash)
            .map_err(|e| AuthError::password_hash(e.to_string()))?;
        if !valid {
            tracing::info!(username = %username, "login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        let access_token = self
            .jwt
            .issue(&user)
            .map_err(AuthError::InvalidToken)?;
        tracing::info!(user_id = user.id, username = %user.username, "login succeeded");
        Ok(LoginResult {
            access_token,
            expires_in: self.jwt.ttl_secs(),
            user,
        })
    }

    /// Validates a bearer token. Any failure is an error; there is no
    /// partial trust.
    pub fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let claims = self.jwt.decode(token)?;
        AuthContext::try_from(claims)
    }

    /// Creates an account with a freshly hashed password.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        let password_hash =
            hash_password(password).map_err(|e| AuthError::password_hash(e.to_string()))?;
        let user = self
            .storage
            .create_user(NewUser {
                username: username.to_string(),
                password_hash,
                role,
            })
            .await?;
        Ok(user)
    }
}
