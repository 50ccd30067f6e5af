//! Bot module - answers forum posts and mentions with Gemini.

pub mod api;
pub mod discord;
pub mod message;
pub mod pipeline;

#[cfg(test)]
mod tests;

pub use api::{ForumApi, Generator};
pub use discord::{DiscordForum, Handler};
pub use message::{Attachment, ImageRef, IncomingMessage, StarterPost, ThreadInfo};
pub use pipeline::{Delivery, Job, Responder};
