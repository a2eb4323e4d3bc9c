//! Rotatable secrets.
//!
//! A [`Secret`] is owned by whoever constructs it and shared by cloning the
//! handle. Readers always see the latest value; writers replace it whole.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// A shared, rotatable secret string.
#[derive(Clone)]
pub struct Secret {
    value: Arc<RwLock<String>>,
}

impl Secret {
    /// Create a new secret.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Arc::new(RwLock::new(value.into())),
        }
    }

    /// Current value.
    #[must_use]
    pub fn expose(&self) -> String {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the value. Every clone of this handle observes the new value.
    pub fn rotate(&self, value: impl Into<String>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value.into();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Bot credentials: application id plus a rotatable token.
#[derive(Debug, Clone)]
pub struct Credentials {
    app_id: String,
    token: Secret,
}

impl Credentials {
    /// Create credentials.
    #[must_use]
    pub fn new(app_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            token: Secret::new(token),
        }
    }

    /// Application id.
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Handle to the token, for rotation.
    #[must_use]
    pub const fn token(&self) -> &Secret {
        &self.token
    }

    /// `Authorization` header value, read fresh on every call.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bot {}.{}", self.app_id, self.token.expose())
    }
}
