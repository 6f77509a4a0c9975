//! Prediction submissions: storage, persistence and settlement against market data.

pub mod lifecycle; // Pending -> finalized polling
pub mod models;
pub mod persistence; // JSON file + in-memory backends
pub mod store;

pub use lifecycle::{align_observations, PeriodView, PollOutcome, PredictionPoller, PredictionStatus};
pub use models::{NewSubmission, PredictionRecord, PredictionSubmission, StrategyNote};
pub use persistence::{JsonFilePersistence, MemoryPersistence, SubmissionPersistence};
pub use store::{PredictionStore, StoreSettings};
