//! Local sources the live settings are built from.

mod env;
mod file;
mod settings_source;

pub use env::EnvSource;
pub use file::FileSource;
pub use settings_source::{SettingsSource, priority};
