use serde::{Deserialize, Serialize};

/// Secret used when none is configured. Startup logs a warning when it is in
/// effect.
pub const DEFAULT_JWT_SECRET: &str = "super-secret-hospital-key";

pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// When false, protected routes accept anonymous requests.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}

fn default_issuer() -> String {
    "hospital-api".to_string()
}

fn default_token_ttl_secs() -> u64 {
    3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            jwt_secret: default_jwt_secret(),
            issuer: default_issuer(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl AuthConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(format!(
                "auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes"
            ));
        }
        if self.issuer.trim().is_empty() {
            return Err("auth.issuer must not be empty".into());
        }
        if self.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs must be > 0".into());
        }
        Ok(())
    }
}
