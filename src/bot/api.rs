//! Seams between the reply pipeline and the outside world.
//!
//! `bot::discord` implements `ForumApi` over serenity, `gemini` implements
//! `Generator`. Tests swap both for recording mocks.

use std::future::Future;

use crate::bot::message::{ImageRef, StarterPost};
use crate::classifier::Tier;

/// Discord operations the pipeline needs.
pub trait ForumApi: Send + Sync {
    /// `Ok(None)` when the starter message does not exist (yet).
    fn fetch_starter(
        &self,
        thread_id: u64,
    ) -> impl Future<Output = Result<Option<StarterPost>, String>> + Send;

    fn send_typing(&self, channel_id: u64) -> impl Future<Output = Result<(), String>> + Send;

    fn send_message(
        &self,
        channel_id: u64,
        text: &str,
    ) -> impl Future<Output = Result<(), String>> + Send;

    fn reply(
        &self,
        channel_id: u64,
        message_id: u64,
        text: &str,
    ) -> impl Future<Output = Result<(), String>> + Send;
}

/// Text generation. Failures are logged by the implementation and surface
/// as `None`.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        images: &[ImageRef],
        tier: Tier,
    ) -> impl Future<Output = Option<String>> + Send;
}
