use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{Role, User};
use crate::storage::{JsonStore, AUTH_KEY};
use crate::{log_service_success, log_service_warn};

const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo123";
const DEMO_USER_ID: Uuid = Uuid::from_u128(1);

/// Identifies one logged-in slot. Each session owns its own current-user
/// record, so several sessions can be active against the same store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Session(Uuid);

impl Session {
    pub fn new() -> Self {
        Session(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }

    fn slot_key(&self) -> String {
        format!("{}:{}", AUTH_KEY, self.0)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Session {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Session)
    }
}

#[derive(Clone)]
pub struct IdentityStore {
    store: JsonStore,
}

impl IdentityStore {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// Only the demo credential pair is accepted.
    pub async fn login(&self, session: &Session, email: &str, password: &str) -> AppResult<User> {
        if email != DEMO_EMAIL || password != DEMO_PASSWORD {
            log_service_warn!("identity_store", "login", "invalid credentials");
            return Err(AppError::InvalidCredentials);
        }

        let user = User {
            id: DEMO_USER_ID,
            email: DEMO_EMAIL.to_string(),
            name: "Demo User".to_string(),
            role: Role::Student,
            is_premium: false,
        };
        self.store.write_value(&session.slot_key(), &user).await?;

        log_service_success!("identity_store", "login", "demo user signed in");
        Ok(user)
    }

    pub async fn register(
        &self,
        session: &Session,
        email: &str,
        _password: &str,
        name: &str,
    ) -> AppResult<User> {
        let user = User {
            id: Uuid::now_v7(),
            email: email.to_string(),
            name: name.to_string(),
            role: Role::Student,
            is_premium: false,
        };
        self.store.write_value(&session.slot_key(), &user).await?;

        log_service_success!("identity_store", "register", "new user registered");
        Ok(user)
    }

    pub async fn logout(&self, session: &Session) -> AppResult<()> {
        self.store.remove(&session.slot_key()).await?;
        Ok(())
    }

    pub async fn current_user(&self, session: &Session) -> AppResult<Option<User>> {
        Ok(self.store.read_value(&session.slot_key()).await?)
    }

    pub async fn is_authenticated(&self, session: &Session) -> AppResult<bool> {
        Ok(self.store.exists(&session.slot_key()).await?)
    }

    /// Current user or `Unauthorized`.
    pub async fn require_user(&self, session: &Session) -> AppResult<User> {
        self.current_user(session).await?.ok_or(AppError::Unauthorized)
    }

    pub async fn update_current_user(&self, session: &Session, user: &User) -> AppResult<()> {
        self.store.write_value(&session.slot_key(), user).await?;
        Ok(())
    }
}
