//! Pipeline tests with recording mocks for Discord and Gemini.
//!
//! Run with: cargo test bot

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::classifier::Tier;
use crate::config::{Config, ModelTiers, RetryPolicy};
use crate::prompt::{APOLOGY_REPLY, EMPTY_QUESTION_REPLY, IMAGE_HINT, LINK_HINT};

const FORUM: u64 = 1000;
const OTHER_FORUM: u64 = 2000;
const EXCLUDED_TAG: u64 = 77;
const THREAD: u64 = 5555;
const BOT_ID: u64 = 4242;

// =============================================================================
// MOCKS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    channel_id: u64,
    reply_to: Option<u64>,
    text: String,
}

#[derive(Default)]
struct MockForum {
    starters: Mutex<VecDeque<Result<Option<StarterPost>, String>>>,
    fetches: Mutex<u32>,
    typing: Mutex<Vec<u64>>,
    sent: Mutex<Vec<Sent>>,
    fail_sends: bool,
}

impl MockForum {
    fn new() -> Self {
        Self::default()
    }

    fn with_starter(starter: StarterPost) -> Self {
        let forum = Self::new();
        forum.queue_starter(Ok(Some(starter)));
        forum
    }

    fn queue_starter(&self, result: Result<Option<StarterPost>, String>) {
        self.starters.lock().unwrap().push_back(result);
    }

    fn fetches(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn typing(&self) -> Vec<u64> {
        self.typing.lock().unwrap().clone()
    }

    fn record(&self, channel_id: u64, reply_to: Option<u64>, text: &str) -> Result<(), String> {
        if self.fail_sends {
            return Err("403 Missing Permissions".to_string());
        }
        self.sent.lock().unwrap().push(Sent {
            channel_id,
            reply_to,
            text: text.to_string(),
        });
        Ok(())
    }
}

impl ForumApi for MockForum {
    async fn fetch_starter(&self, _thread_id: u64) -> Result<Option<StarterPost>, String> {
        *self.fetches.lock().unwrap() += 1;
        self.starters.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn send_typing(&self, channel_id: u64) -> Result<(), String> {
        self.typing.lock().unwrap().push(channel_id);
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, text: &str) -> Result<(), String> {
        self.record(channel_id, None, text)
    }

    async fn reply(&self, channel_id: u64, message_id: u64, text: &str) -> Result<(), String> {
        self.record(channel_id, Some(message_id), text)
    }
}

#[derive(Debug, Clone)]
struct GenCall {
    prompt: String,
    images: Vec<ImageRef>,
    tier: Tier,
}

struct MockGenerator {
    answer: Option<String>,
    calls: Arc<Mutex<Vec<GenCall>>>,
}

impl MockGenerator {
    fn answering(answer: Option<&str>) -> (Self, Arc<Mutex<Vec<GenCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let generator = Self {
            answer: answer.map(str::to_string),
            calls: calls.clone(),
        };
        (generator, calls)
    }
}

impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str, images: &[ImageRef], tier: Tier) -> Option<String> {
        self.calls.lock().unwrap().push(GenCall {
            prompt: prompt.to_string(),
            images: images.to_vec(),
            tier,
        });
        self.answer.clone()
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

fn test_config() -> Config {
    Config {
        discord_bot_token: "token".to_string(),
        gemini_api_key: "key".to_string(),
        forum_ids: vec![FORUM],
        exclusion_tag_id: Some(EXCLUDED_TAG),
        models: ModelTiers {
            light: "flash".to_string(),
            capable: "pro".to_string(),
        },
        starter_fetch: RetryPolicy {
            attempts: 3,
            initial_delay: Duration::ZERO,
        },
        new_thread_window: Duration::from_secs(300),
        log_channel_id: None,
        data_dir: PathBuf::from("."),
    }
}

fn responder(answer: Option<&str>) -> (Responder<MockGenerator>, Arc<Mutex<Vec<GenCall>>>) {
    let (generator, calls) = MockGenerator::answering(answer);
    (Responder::new(Arc::new(test_config()), generator), calls)
}

fn new_thread(parent: u64, tags: Vec<u64>) -> ThreadInfo {
    ThreadInfo {
        id: THREAD,
        parent_id: Some(parent),
        name: "질문있음".to_string(),
        applied_tags: tags,
        newly_created: true,
    }
}

fn text_post(content: &str) -> StarterPost {
    StarterPost {
        content: content.to_string(),
        attachments: vec![],
    }
}

fn png_post(content: &str) -> StarterPost {
    StarterPost {
        content: content.to_string(),
        attachments: vec![Attachment {
            content_type: Some("image/png".to_string()),
            url: "https://cdn.discordapp.com/a.png".to_string(),
        }],
    }
}

fn mention(content: &str, parent: u64) -> IncomingMessage {
    IncomingMessage {
        id: 9001,
        channel_id: THREAD,
        author_is_bot: false,
        mentions_bot: true,
        content: content.to_string(),
        thread: Some(ThreadInfo {
            id: THREAD,
            parent_id: Some(parent),
            name: "질문있음".to_string(),
            applied_tags: vec![],
            newly_created: false,
        }),
    }
}

// =============================================================================
// THREAD CREATED
// =============================================================================

mod thread_created {
    use super::*;

    #[tokio::test]
    async fn test_text_only_post_uses_light_tier() {
        let (responder, calls) = responder(Some("ㅋㅋ 그걸 왜 물어봄"));
        let forum = MockForum::with_starter(text_post("이거 어떻게 생각함"));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tier, Tier::Light);
        assert!(calls[0].prompt.contains("질문있음"));
        assert!(calls[0].prompt.contains("이거 어떻게 생각함"));
        assert!(!calls[0].prompt.contains(IMAGE_HINT));
        assert!(!calls[0].prompt.contains(LINK_HINT));
        assert!(calls[0].images.is_empty());

        assert_eq!(
            forum.sent(),
            vec![Sent { channel_id: THREAD, reply_to: None, text: "ㅋㅋ 그걸 왜 물어봄".to_string() }]
        );
        assert_eq!(forum.typing(), vec![THREAD]);
    }

    #[tokio::test]
    async fn test_image_post_uses_capable_tier() {
        let (responder, calls) = responder(Some("짤 ㅁㅌㅊ"));
        let forum = MockForum::with_starter(png_post("이거 봐라"));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tier, Tier::Capable);
        assert!(calls[0].prompt.contains(IMAGE_HINT));
        assert_eq!(
            calls[0].images,
            vec![ImageRef {
                mime_type: "image/png".to_string(),
                url: "https://cdn.discordapp.com/a.png".to_string(),
            }]
        );
        assert_eq!(forum.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_link_post_uses_capable_tier() {
        let (responder, calls) = responder(Some("링크 안 눌러봄"));
        let forum = MockForum::with_starter(text_post("이거 봐라 https://example.com/a"));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].tier, Tier::Capable);
        assert!(calls[0].prompt.contains(LINK_HINT));
    }

    #[tokio::test]
    async fn test_empty_body_gets_placeholder() {
        let (responder, calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::with_starter(text_post(""));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        assert!(calls.lock().unwrap()[0].prompt.contains(crate::prompt::EMPTY_BODY));
    }

    #[tokio::test]
    async fn test_other_forum_is_ignored() {
        let (responder, calls) = responder(Some("should not send"));
        let forum = MockForum::with_starter(text_post("hi"));

        for _ in 0..3 {
            responder.on_thread_created(&forum, &new_thread(OTHER_FORUM, vec![])).await;
        }

        assert_eq!(forum.fetches(), 0);
        assert!(forum.typing().is_empty());
        assert!(forum.sent().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_thread_without_parent_is_ignored() {
        let (responder, calls) = responder(Some("x"));
        let forum = MockForum::new();
        let mut thread = new_thread(FORUM, vec![]);
        thread.parent_id = None;

        responder.on_thread_created(&forum, &thread).await;

        assert_eq!(forum.fetches(), 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backfilled_thread_is_ignored() {
        let (responder, calls) = responder(Some("x"));
        let forum = MockForum::with_starter(text_post("hi"));
        let mut thread = new_thread(FORUM, vec![]);
        thread.newly_created = false;

        responder.on_thread_created(&forum, &thread).await;

        assert_eq!(forum.fetches(), 0);
        assert!(forum.sent().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_excluded_tag_is_ignored() {
        let (responder, calls) = responder(Some("x"));
        let forum = MockForum::with_starter(text_post("hi"));

        for _ in 0..2 {
            responder.on_thread_created(&forum, &new_thread(FORUM, vec![1, EXCLUDED_TAG])).await;
        }

        assert_eq!(forum.fetches(), 0);
        assert!(forum.sent().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_tags_are_fine() {
        let (responder, _calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::with_starter(text_post("hi"));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![1, 2])).await;

        assert_eq!(forum.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_sends_nothing() {
        let (responder, calls) = responder(None);
        let forum = MockForum::with_starter(text_post("hi"));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(forum.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let (responder, _calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum {
            fail_sends: true,
            ..MockForum::new()
        };
        forum.queue_starter(Ok(Some(text_post("hi"))));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        assert!(forum.sent().is_empty());
    }
}

// =============================================================================
// STARTER FETCH RETRY
// =============================================================================

mod starter_retry {
    use super::*;
    use crate::bot::pipeline::fetch_starter;

    #[tokio::test]
    async fn test_starter_appearing_late_is_used() {
        let (responder, calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::new();
        forum.queue_starter(Ok(None));
        forum.queue_starter(Err("502 Bad Gateway".to_string()));
        forum.queue_starter(Ok(Some(text_post("늦게 옴"))));

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        assert_eq!(forum.fetches(), 3);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(forum.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let (responder, calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::new();

        responder.on_thread_created(&forum, &new_thread(FORUM, vec![])).await;

        assert_eq!(forum.fetches(), 3);
        assert!(forum.typing().is_empty());
        assert!(forum.sent().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_once_policy_tries_once() {
        let forum = MockForum::new();
        assert!(fetch_starter(&forum, THREAD, RetryPolicy::ONCE).await.is_none());
        assert_eq!(forum.fetches(), 1);
    }

    #[tokio::test]
    async fn test_first_success_stops_retrying() {
        let forum = MockForum::with_starter(text_post("바로 옴"));
        let policy = RetryPolicy { attempts: 5, initial_delay: Duration::ZERO };
        let starter = fetch_starter(&forum, THREAD, policy).await;
        assert_eq!(starter.map(|s| s.content), Some("바로 옴".to_string()));
        assert_eq!(forum.fetches(), 1);
    }
}

// =============================================================================
// MENTIONS
// =============================================================================

mod mentions {
    use super::*;

    #[tokio::test]
    async fn test_question_is_extracted_and_answered() {
        let (responder, calls) = responder(Some("그거 그냥 버그임"));
        let forum = MockForum::with_starter(text_post("이거 어떻게 생각함"));

        let msg = mention(&format!("<@{BOT_ID}> 이거 뭐임"), FORUM);
        responder.on_message(&forum, &msg).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tier, Tier::Capable);
        assert!(calls[0].prompt.contains(r#""이거 뭐임""#));
        assert!(!calls[0].prompt.contains(&BOT_ID.to_string()));
        assert!(calls[0].prompt.contains("이거 어떻게 생각함"));

        assert_eq!(
            forum.sent(),
            vec![Sent { channel_id: THREAD, reply_to: Some(9001), text: "그거 그냥 버그임".to_string() }]
        );
    }

    #[tokio::test]
    async fn test_text_only_starter_still_uses_capable_tier() {
        let (responder, calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::with_starter(text_post("짧은 글"));

        responder.on_message(&forum, &mention("<@!4242> 왜임", FORUM)).await;

        assert_eq!(calls.lock().unwrap()[0].tier, Tier::Capable);
    }

    #[tokio::test]
    async fn test_starter_images_are_context() {
        let (responder, calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::with_starter(png_post("짤"));

        responder.on_message(&forum, &mention("<@4242> 이거 뭐임", FORUM)).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].images.len(), 1);
        assert!(calls[0].prompt.contains(crate::prompt::CONTEXT_IMAGE_HINT));
    }

    #[tokio::test]
    async fn test_generation_failure_sends_apology() {
        let (responder, calls) = responder(None);
        let forum = MockForum::with_starter(text_post("글"));

        responder.on_message(&forum, &mention("<@4242> 이거 뭐임", FORUM)).await;

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(
            forum.sent(),
            vec![Sent { channel_id: THREAD, reply_to: Some(9001), text: APOLOGY_REPLY.to_string() }]
        );
    }

    #[tokio::test]
    async fn test_empty_question_gets_rebuke() {
        for content in ["<@4242>", "  <@4242>  ", "<@!4242> <@4242>"] {
            let (responder, calls) = responder(Some("should not be used"));
            let forum = MockForum::with_starter(text_post("글"));

            responder.on_message(&forum, &mention(content, FORUM)).await;

            assert!(calls.lock().unwrap().is_empty());
            assert_eq!(
                forum.sent(),
                vec![Sent { channel_id: THREAD, reply_to: Some(9001), text: EMPTY_QUESTION_REPLY.to_string() }]
            );
        }
    }

    #[tokio::test]
    async fn test_missing_starter_sends_nothing() {
        let (responder, calls) = responder(Some("x"));
        let forum = MockForum::new();

        responder.on_message(&forum, &mention("<@4242> 이거 뭐임", FORUM)).await;

        assert_eq!(forum.fetches(), 1);
        assert!(forum.sent().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_question_without_starter_sends_nothing() {
        let (responder, calls) = responder(Some("x"));
        let forum = MockForum::new();

        responder.on_message(&forum, &mention("<@4242>", FORUM)).await;

        assert_eq!(forum.fetches(), 1);
        assert!(forum.sent().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_typing_is_shown_before_anything_else() {
        let (responder, _calls) = responder(Some("x"));
        let forum = MockForum::new();

        responder.on_message(&forum, &mention("<@4242>", FORUM)).await;

        assert_eq!(forum.typing(), vec![THREAD]);
    }

    #[tokio::test]
    async fn test_answered_mention_types_once() {
        let (responder, _calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::with_starter(text_post("글"));

        responder.on_message(&forum, &mention("<@4242> 이거 뭐임", FORUM)).await;

        assert_eq!(forum.typing(), vec![THREAD]);
        assert_eq!(forum.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_disqualified_messages_are_ignored() {
        let (responder, calls) = responder(Some("x"));
        let forum = MockForum::with_starter(text_post("글"));

        let mut from_bot = mention("<@4242> 이거 뭐임", FORUM);
        from_bot.author_is_bot = true;

        let mut not_mentioned = mention("이거 뭐임", FORUM);
        not_mentioned.mentions_bot = false;

        let mut outside_thread = mention("<@4242> 이거 뭐임", FORUM);
        outside_thread.thread = None;

        let wrong_forum = mention("<@4242> 이거 뭐임", OTHER_FORUM);

        for msg in [&from_bot, &not_mentioned, &outside_thread, &wrong_forum] {
            responder.on_message(&forum, msg).await;
            responder.on_message(&forum, msg).await;
        }

        assert_eq!(forum.fetches(), 0);
        assert!(forum.typing().is_empty());
        assert!(forum.sent().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exclusion_tag_does_not_block_mentions() {
        let (responder, _calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::with_starter(text_post("글"));
        let mut msg = mention("<@4242> 질문", FORUM);
        if let Some(thread) = msg.thread.as_mut() {
            thread.applied_tags = vec![EXCLUDED_TAG];
        }

        responder.on_message(&forum, &msg).await;

        assert_eq!(forum.sent().len(), 1);
    }
}

// =============================================================================
// RESPOND
// =============================================================================

mod respond {
    use super::*;

    fn job(delivery: Delivery) -> Job {
        Job {
            channel_id: THREAD,
            prompt: "prompt".to_string(),
            images: vec![],
            tier: Tier::Light,
            delivery,
        }
    }

    #[tokio::test]
    async fn test_send_error_propagates() {
        let (responder, _calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum {
            fail_sends: true,
            ..MockForum::new()
        };

        let result = responder.respond(&forum, job(Delivery::Silent)).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_one_message_per_job() {
        let (responder, calls) = responder(Some("ㅇㅇ"));
        let forum = MockForum::new();

        responder.respond(&forum, job(Delivery::Reply { message_id: 1 })).await.unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(forum.sent().len(), 1);
        assert!(forum.typing().is_empty());
    }
}
