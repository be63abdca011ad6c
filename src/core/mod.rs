//! Local configuration state: live settings, their sources, and the durable marker.

mod loader;
mod marker;
mod persist;
mod repository;
mod settings;
mod state;
mod validation;

pub use loader::SettingsLoader;
pub use marker::{FileMarkerStore, MarkerStore, MemoryMarkerStore};
pub use repository::{LayeredSettingsRepository, MemorySettingsRepository, SettingsRepository};
pub use settings::{
    ApiSettings, ConfigDocument, CultureSettings, LiveSettings, LogLevel, PoolSettings,
};
pub use state::{ConfigContext, LiveState, UpdateGuard};
pub use validation::Validate;
