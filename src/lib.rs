pub mod bot;
pub mod classifier;
pub mod config;
pub mod discord_log;
pub mod gemini;
pub mod prompt;
