pub mod error;
pub mod models;
pub mod pool;
pub mod queue;
pub mod repos;
pub mod reviews;
pub mod settings;
pub mod subscriptions;

pub use error::{DbError, DbResult};
pub use models::QueueMessage;
pub use pool::{create_pool, run_migrations};
pub use queue::{Queue, REPO_ANALYSIS_QUEUE, WEBHOOK_EVENTS_QUEUE};
