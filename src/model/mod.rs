pub mod effect;
pub mod intent;
pub mod message;
pub mod save;

pub use effect::{Effect, EffectPath, EffectTree};
pub use intent::{ChatIntent, Classification, IntentClassifier};
pub use message::{ChatMessage, Role};
pub use save::SavedFuturecast;
