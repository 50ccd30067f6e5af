//! Platform-neutral views of the Discord objects the bot reads.

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub content_type: Option<String>,
    pub url: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// An image to be sent inline to the generation API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub mime_type: String,
    pub url: String,
}

/// The first message of a forum thread.
#[derive(Debug, Clone, Default)]
pub struct StarterPost {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// A forum thread as seen on `thread_create` or looked up for a message.
#[derive(Debug, Clone, Default)]
pub struct ThreadInfo {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub applied_tags: Vec<u64>,
    /// False when the gateway replays a thread that already existed.
    pub newly_created: bool,
}

/// A message posted somewhere the bot can see.
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub id: u64,
    pub channel_id: u64,
    pub author_is_bot: bool,
    pub mentions_bot: bool,
    pub content: String,
    /// Set when the message was posted inside a thread.
    pub thread: Option<ThreadInfo>,
}
