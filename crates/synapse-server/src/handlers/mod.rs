pub mod analytics;
pub mod chat;
pub mod documents;
pub mod health;
