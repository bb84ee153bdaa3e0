pub mod catalog;
pub mod intent;
pub mod models;
pub mod normalize;
pub mod reply;

pub use catalog::{CatalogError, FaqCatalog};
pub use intent::IntentMatcher;
pub use models::*;
pub use normalize::{tokenize, Normalizer};
pub use reply::{compose_reply, frame_answer, ReplyOutcome};
