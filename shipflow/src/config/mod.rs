//! Configuration: the project's JSON document and the service's own settings.

mod merge;
mod settings;
mod store;

pub use merge::{deep_merge, merge_into};
pub use settings::ServiceConfig;
pub use store::ConfigStore;
