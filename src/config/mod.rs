pub mod env;
mod loader;

pub use env::{
    AppConfig, BackendConfig, DirectoryConfig, FeedConfig, FeedSource, LabelSource, PipelineConfig,
};
pub use loader::load_config;
