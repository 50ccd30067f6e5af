//! Discord adapter using serenity.
//!
//! Converts gateway events into `ThreadInfo` / `IncomingMessage` and
//! implements `ForumApi` over serenity's HTTP client.

use std::sync::Arc;
use std::time::Duration;

use serenity::async_trait;
use serenity::builder::CreateMessage;
use serenity::http::{Http, HttpError};
use serenity::model::channel::{Channel, ChannelType, GuildChannel, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, MessageId};
use serenity::prelude::*;
use tracing::{info, warn};

use crate::bot::api::{ForumApi, Generator};
use crate::bot::message::{Attachment, IncomingMessage, StarterPost, ThreadInfo};
use crate::bot::pipeline::Responder;

/// Discord rejects message content longer than this.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// JSON error code for "Unknown Message".
const UNKNOWN_MESSAGE: i64 = 10008;

/// `ForumApi` backed by serenity's REST client.
pub struct DiscordForum {
    http: Arc<Http>,
}

impl DiscordForum {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn post(&self, channel_id: u64, message: CreateMessage) -> Result<(), String> {
        ChannelId::new(channel_id)
            .send_message(&*self.http, message)
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to send to {channel_id}: {e}"))
    }
}

impl ForumApi for DiscordForum {
    async fn fetch_starter(&self, thread_id: u64) -> Result<Option<StarterPost>, String> {
        // A forum post's starter message shares the thread's id.
        let result = ChannelId::new(thread_id)
            .message(&*self.http, MessageId::new(thread_id))
            .await;

        match result {
            Ok(msg) => Ok(Some(starter_post(&msg))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn send_typing(&self, channel_id: u64) -> Result<(), String> {
        self.http
            .broadcast_typing(ChannelId::new(channel_id))
            .await
            .map_err(|e| e.to_string())
    }

    async fn send_message(&self, channel_id: u64, text: &str) -> Result<(), String> {
        let content = truncate_message(text);
        self.post(channel_id, CreateMessage::new().content(content)).await
    }

    async fn reply(&self, channel_id: u64, message_id: u64, text: &str) -> Result<(), String> {
        let channel = ChannelId::new(channel_id);
        let builder = CreateMessage::new()
            .content(truncate_message(text))
            .reference_message((channel, MessageId::new(message_id)));
        self.post(channel_id, builder).await
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    match err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
            resp.status_code.as_u16() == 404 || resp.error.code as i64 == UNKNOWN_MESSAGE
        }
        _ => false,
    }
}

/// Cut to the Discord length limit on a char boundary.
pub fn truncate_message(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn starter_post(msg: &Message) -> StarterPost {
    StarterPost {
        content: msg.content.clone(),
        attachments: msg
            .attachments
            .iter()
            .map(|att| Attachment {
                content_type: att.content_type.clone(),
                url: att.url.clone(),
            })
            .collect(),
    }
}

fn is_thread(channel: &GuildChannel) -> bool {
    matches!(
        channel.kind,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
    )
}

/// A thread replayed by the gateway (e.g. on join) is older than `window`.
pub fn is_fresh(created_unix: i64, now_unix: i64, window: Duration) -> bool {
    let age = now_unix.saturating_sub(created_unix);
    age <= window.as_secs() as i64
}

fn thread_info(channel: &GuildChannel, window: Duration) -> ThreadInfo {
    let created = channel.id.created_at().unix_timestamp();
    let now = chrono::Utc::now().timestamp();

    ThreadInfo {
        id: channel.id.get(),
        parent_id: channel.parent_id.map(|id| id.get()),
        name: channel.name.clone(),
        applied_tags: channel.applied_tags.iter().map(|tag| tag.get()).collect(),
        newly_created: is_fresh(created, now, window),
    }
}

/// serenity event handler.
pub struct Handler<G> {
    responder: Responder<G>,
}

impl<G: Generator> Handler<G> {
    pub fn new(responder: Responder<G>) -> Self {
        Self { responder }
    }
}

#[async_trait]
impl<G: Generator + 'static> EventHandler for Handler<G> {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("[READY] {} ({}) is connected", ready.user.name, ready.user.id);
    }

    async fn thread_create(&self, ctx: Context, thread: GuildChannel) {
        let info = thread_info(&thread, self.responder.config().new_thread_window);
        let forum = DiscordForum::new(ctx.http.clone());
        self.responder.on_thread_created(&forum, &info).await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let bot_id = ctx.cache.current_user().id;
        if !msg.mentions.iter().any(|user| user.id == bot_id) {
            return;
        }

        let thread = match msg.channel_id.to_channel(&ctx).await {
            Ok(Channel::Guild(channel)) if is_thread(&channel) => {
                Some(thread_info(&channel, self.responder.config().new_thread_window))
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to look up channel {}: {}", msg.channel_id, e);
                return;
            }
        };

        let incoming = IncomingMessage {
            id: msg.id.get(),
            channel_id: msg.channel_id.get(),
            author_is_bot: msg.author.bot,
            mentions_bot: true,
            content: msg.content.clone(),
            thread,
        };

        let forum = DiscordForum::new(ctx.http.clone());
        self.responder.on_message(&forum, &incoming).await;
    }
}
