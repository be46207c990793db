pub mod analysis;
pub mod chat;
pub mod generator;

pub use analysis::{AnalysisOutcome, AnalysisService};
pub use chat::ChatService;
pub use generator::{GeminiClient, TextGenerator};
