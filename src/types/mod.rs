pub mod classify;
pub mod error;

pub use classify::ClassifyType;
pub use error::{ErrorCategory, ErrorClassifier, LlmError, Result, WikiError};
