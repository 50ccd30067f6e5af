//! Mirrors this crate's log events into a Discord channel.
//!
//! WARN and ERROR are posted as they happen. INFO lines are collected and
//! posted together, either when `BATCH_LINES` pile up or every
//! `BATCH_INTERVAL`. Attach the layer with [`crate_targets`] so serenity's
//! own request logging never reaches it.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serenity::builder::CreateMessage;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::bot::discord::truncate_message;

const BATCH_LINES: usize = 50;
const BATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Only events from this crate, INFO and above.
pub fn crate_targets() -> Targets {
    Targets::new().with_target(env!("CARGO_CRATE_NAME"), Level::INFO)
}

#[derive(Debug, PartialEq, Eq)]
enum Entry {
    Now(String),
    Batched(String),
}

impl Entry {
    fn from_event(level: Level, text: String) -> Option<Self> {
        match level {
            Level::ERROR => Some(Entry::Now(format!("❌ {text}"))),
            Level::WARN => Some(Entry::Now(format!("⚠️ {text}"))),
            Level::INFO => Some(Entry::Batched(text)),
            _ => None,
        }
    }
}

pub struct DiscordLogLayer {
    entries: mpsc::UnboundedSender<Entry>,
}

impl DiscordLogLayer {
    /// Spawns the posting task, so this needs a tokio runtime.
    pub fn new(http: Arc<Http>, channel_id: u64) -> Self {
        let (entries, rx) = mpsc::unbounded_channel();
        tokio::spawn(post_entries(http, ChannelId::new(channel_id), rx));
        Self { entries }
    }
}

impl<S: Subscriber> Layer<S> for DiscordLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = EventLine::default();
        event.record(&mut line);

        let Some(entry) = Entry::from_event(*event.metadata().level(), line.finish()) else {
            return;
        };
        if self.entries.send(entry).is_err() {
            // Not through tracing, that would loop back here.
            eprintln!("Discord log task is gone, dropping log line");
        }
    }
}

async fn post_entries(http: Arc<Http>, channel: ChannelId, mut rx: mpsc::UnboundedReceiver<Entry>) {
    let mut batch = Batch::default();
    let mut ticker = tokio::time::interval(BATCH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let ready = tokio::select! {
            entry = rx.recv() => match entry {
                Some(Entry::Now(text)) => Some(text),
                Some(Entry::Batched(text)) => batch.push(text),
                None => break,
            },
            _ = ticker.tick() => batch.take(),
        };
        if let Some(text) = ready {
            send(&http, channel, &text).await;
        }
    }

    if let Some(text) = batch.take() {
        send(&http, channel, &text).await;
    }
}

async fn send(http: &Http, channel: ChannelId, text: &str) {
    let message = CreateMessage::new().content(truncate_message(text));
    if let Err(e) = channel.send_message(http, message).await {
        eprintln!("Failed to post log to Discord: {e}");
    }
}

/// Pending INFO lines.
#[derive(Default)]
struct Batch {
    lines: Vec<String>,
}

impl Batch {
    /// Returns the joined batch once it is full.
    fn push(&mut self, line: String) -> Option<String> {
        self.lines.push(line);
        if self.lines.len() >= BATCH_LINES {
            self.take()
        } else {
            None
        }
    }

    fn take(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let text = self.lines.join("\n");
        self.lines.clear();
        Some(text)
    }
}

/// `message` first, then the other fields as `key=value`.
#[derive(Default)]
struct EventLine {
    message: String,
    fields: String,
}

impl EventLine {
    fn field(&mut self, field: &Field, value: std::fmt::Arguments<'_>) {
        if field.name() == "message" {
            let _ = self.message.write_fmt(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn finish(self) -> String {
        let mut text = self.message;
        text.push_str(&self.fields);
        text.trim_start().to_string()
    }
}

impl Visit for EventLine {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.field(field, format_args!("{value}"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.field(field, format_args!("{value:?}"));
    }
}
