//! Settings file and completion-API key lookup

pub mod keys;
pub mod settings;

pub use keys::{get_api_key, KeyLookup, KeySource, ProviderKey};
pub use settings::Settings;
