pub mod api;
pub mod attempts;
pub mod config;
pub mod content;
pub mod errors;
pub mod identity;
pub mod logging;
pub mod models;
pub mod payments;
pub mod progress;
pub mod providers;
pub mod quiz_session;
pub mod storage;
pub mod subscriptions;

pub use attempts::{score_answers, AttemptRecorder};
pub use config::Config;
pub use content::ContentStore;
pub use errors::*;
pub use identity::{IdentityStore, Session};
pub use models::*;
pub use progress::ProgressAggregator;
pub use quiz_session::{QuizSession, SessionState};
pub use storage::{JsonStore, KeyValueStore, MemoryStore, SqliteStore};
pub use subscriptions::SubscriptionService;
