//! Reply pipeline shared by the thread-created and mention handlers.
//!
//! Both paths run filter → fetch starter → classify → prompt → generate →
//! deliver. They differ in tier selection and in what happens when
//! generation fails, which `Delivery` captures. The mention path shows typing
//! as soon as its filters pass, the thread path right before generation.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bot::api::{ForumApi, Generator};
use crate::bot::message::{ImageRef, IncomingMessage, StarterPost, ThreadInfo};
use crate::classifier::{classify, image_refs, ContentKind, Tier};
use crate::config::{Config, RetryPolicy};
use crate::prompt;

/// Where a generated answer goes, and what to do when there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// New message in the thread; nothing is posted on failure.
    Silent,
    /// Reply to a message; the apology is posted on failure.
    Reply { message_id: u64 },
}

/// One generation request and its delivery.
#[derive(Debug, Clone)]
pub struct Job {
    pub channel_id: u64,
    pub prompt: String,
    pub images: Vec<ImageRef>,
    pub tier: Tier,
    pub delivery: Delivery,
}

pub struct Responder<G> {
    config: Arc<Config>,
    generator: G,
}

impl<G: Generator> Responder<G> {
    pub fn new(config: Arc<Config>, generator: G) -> Self {
        Self { config, generator }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Post the first comment on a new thread in a watched forum.
    pub async fn on_thread_created<F: ForumApi>(&self, forum: &F, thread: &ThreadInfo) {
        if !thread.newly_created || !self.config.is_target_forum(thread.parent_id) {
            return;
        }

        info!("[Thread Create] New post: \"{}\" ({})", thread.name, thread.id);

        if self.config.is_excluded(&thread.applied_tags) {
            info!("[Auto Reply] Exclusion tag present, skipping \"{}\"", thread.name);
            return;
        }

        if let Err(e) = self.auto_reply(forum, thread).await {
            error!("[ThreadCreate Error] Auto reply failed in {}: {}", thread.id, e);
        }
    }

    async fn auto_reply<F: ForumApi>(&self, forum: &F, thread: &ThreadInfo) -> Result<(), String> {
        let Some(starter) = fetch_starter(forum, thread.id, self.config.starter_fetch).await else {
            info!("[Auto Reply] Starter message not found, skipping (thread {})", thread.id);
            return Ok(());
        };

        let images = image_refs(&starter.attachments);
        let kind = classify(&starter.content, &images);
        match kind {
            ContentKind::HasImage => {
                info!("[Auto Reply] {} image(s) found, using capable model", images.len())
            }
            ContentKind::HasLink => info!("[Auto Reply] Link found, using capable model"),
            ContentKind::TextOnly => info!("[Auto Reply] Text-only post, using light model"),
        }

        let prompt = prompt::auto_response(&thread.name, prompt::post_body(&starter.content), kind);

        send_typing(forum, thread.id).await;
        self.respond(
            forum,
            Job {
                channel_id: thread.id,
                prompt,
                images,
                tier: kind.tier(),
                delivery: Delivery::Silent,
            },
        )
        .await
    }

    /// Answer a question addressed to the bot inside a watched thread.
    pub async fn on_message<F: ForumApi>(&self, forum: &F, msg: &IncomingMessage) {
        if msg.author_is_bot || !msg.mentions_bot {
            return;
        }
        let Some(thread) = msg.thread.as_ref() else {
            return;
        };
        if !self.config.is_target_forum(thread.parent_id) {
            return;
        }

        info!("[Mention] Mention in \"{}\" ({})", thread.name, thread.id);
        send_typing(forum, msg.channel_id).await;

        if let Err(e) = self.answer_mention(forum, thread, msg).await {
            error!("[MessageCreate Error] Mention answer failed in {}: {}", thread.id, e);
            if let Err(e) = forum.reply(msg.channel_id, msg.id, prompt::APOLOGY_REPLY).await {
                error!("[MessageCreate Error] Apology reply failed too: {}", e);
            }
        }
    }

    async fn answer_mention<F: ForumApi>(
        &self,
        forum: &F,
        thread: &ThreadInfo,
        msg: &IncomingMessage,
    ) -> Result<(), String> {
        let Some(starter) = fetch_starter(forum, thread.id, RetryPolicy::ONCE).await else {
            info!("[Mention] Starter message not found, skipping (thread {})", thread.id);
            return Ok(());
        };

        let question = prompt::strip_mentions(&msg.content);
        if question.is_empty() {
            debug!("[Mention] Empty question from message {}", msg.id);
            return forum.reply(msg.channel_id, msg.id, prompt::EMPTY_QUESTION_REPLY).await;
        }

        let images = image_refs(&starter.attachments);
        if !images.is_empty() {
            info!("[Mention] Including {} image(s) from the original post", images.len());
        }

        let prompt = prompt::mention_response(
            &thread.name,
            prompt::post_body(&starter.content),
            !images.is_empty(),
            &question,
        );

        self.respond(
            forum,
            Job {
                channel_id: msg.channel_id,
                prompt,
                images,
                tier: Tier::Capable,
                delivery: Delivery::Reply { message_id: msg.id },
            },
        )
        .await
    }

    /// One generation call, at most one message out.
    pub async fn respond<F: ForumApi>(&self, forum: &F, job: Job) -> Result<(), String> {
        let answer = self.generator.generate(&job.prompt, &job.images, job.tier).await;

        match (answer, job.delivery) {
            (Some(text), Delivery::Silent) => {
                forum.send_message(job.channel_id, &text).await?;
                info!("[Auto Reply] Sent ({:?} tier)", job.tier);
            }
            (Some(text), Delivery::Reply { message_id }) => {
                forum.reply(job.channel_id, message_id, &text).await?;
                info!("[Mention] Answered ({:?} tier)", job.tier);
            }
            (None, Delivery::Silent) => {
                info!("[Auto Reply] Generation failed, nothing sent");
            }
            (None, Delivery::Reply { message_id }) => {
                forum.reply(job.channel_id, message_id, prompt::APOLOGY_REPLY).await?;
                info!("[Mention] Generation failed, apology sent");
            }
        }

        Ok(())
    }
}

/// Best effort; a failure only costs the indicator.
async fn send_typing<F: ForumApi>(forum: &F, channel_id: u64) {
    if let Err(e) = forum.send_typing(channel_id).await {
        warn!("Failed to send typing to {}: {}", channel_id, e);
    }
}

/// Fetch the starter message, retrying with exponential backoff.
///
/// Gives up with `None` once the policy is exhausted; errors are logged.
pub async fn fetch_starter<F: ForumApi>(
    forum: &F,
    thread_id: u64,
    policy: RetryPolicy,
) -> Option<StarterPost> {
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.attempts {
        match forum.fetch_starter(thread_id).await {
            Ok(Some(starter)) => return Some(starter),
            Ok(None) => debug!("Starter of {} not available (attempt {}/{})", thread_id, attempt, policy.attempts),
            Err(e) => warn!(
                "Failed to fetch starter of {} (attempt {}/{}): {}",
                thread_id, attempt, policy.attempts, e
            ),
        }

        if attempt < policy.attempts {
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }

    None
}
