pub mod settings;

pub use settings::{
    AnalysisConfig, AuthConfig, ChatConfig, DatabaseConfig, GeminiConfig, ServerConfig, Settings,
    StorageConfig,
};
