mod classifier;
mod types;

pub use classifier::{classify, UrlClassifier, DEFAULT_DOMAIN};
pub use types::{MediaKind, MediaReference};
