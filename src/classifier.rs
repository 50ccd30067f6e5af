use std::sync::LazyLock;

use regex::Regex;

use crate::bot::message::{Attachment, ImageRef};

static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("link pattern is valid"));

/// What a starter post contains beyond plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    TextOnly,
    HasImage,
    HasLink,
}

/// Generation tier. Maps to a concrete model name via `ModelTiers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Light,
    Capable,
}

impl ContentKind {
    pub fn tier(self) -> Tier {
        match self {
            ContentKind::TextOnly => Tier::Light,
            ContentKind::HasImage | ContentKind::HasLink => Tier::Capable,
        }
    }
}

/// Image attachments, in the order they were posted.
pub fn image_refs(attachments: &[Attachment]) -> Vec<ImageRef> {
    attachments
        .iter()
        .filter(|att| att.is_image())
        .filter_map(|att| {
            Some(ImageRef {
                mime_type: att.content_type.clone()?,
                url: att.url.clone(),
            })
        })
        .collect()
}

pub fn contains_link(text: &str) -> bool {
    LINK_PATTERN.is_match(text)
}

/// Images take precedence over links.
pub fn classify(text: &str, images: &[ImageRef]) -> ContentKind {
    if !images.is_empty() {
        ContentKind::HasImage
    } else if contains_link(text) {
        ContentKind::HasLink
    } else {
        ContentKind::TextOnly
    }
}
