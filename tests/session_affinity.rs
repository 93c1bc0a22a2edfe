//! End-to-end affinity scenarios through the public API.

use channel_affinity::cache::MemoryCache;
use channel_affinity::directory::InMemoryChannelDirectory;
use channel_affinity::extract::{anthropic_turns, gemini_turns, openai_turns};
use channel_affinity::types::{ClaudeMessage, GeminiContent, OpenAiMessage};
use channel_affinity::{
    AffinityConfig, Channel, ChannelStatus, RequestState, SessionAffinity, Turn, UpstreamFailure,
};
use std::sync::Arc;

fn conversation(last: &str) -> Vec<Turn> {
    vec![
        Turn::system("You are a careful reviewer."),
        Turn::user("Here is my diff."),
        Turn::assistant("Looks mostly fine."),
        Turn::user("What about the error path?"),
        Turn::assistant("It swallows the error."),
        Turn::user(last),
    ]
}

fn setup() -> (SessionAffinity, Arc<InMemoryChannelDirectory>) {
    let directory = Arc::new(InMemoryChannelDirectory::with_channels([
        Channel::new(41, "backup"),
        Channel::new(42, "primary"),
    ]));
    let affinity = SessionAffinity::new(
        AffinityConfig::default(),
        Arc::new(MemoryCache::new(1024)),
        directory.clone(),
    );
    (affinity, directory)
}

#[tokio::test]
async fn test_sticky_then_disabled_channel() {
    let (affinity, directory) = setup();

    // First request: no affinity yet, normal selection picks 42.
    let mut first = RequestState::new("default", "gpt-x");
    assert!(affinity
        .resolve_request(&mut first, &conversation("first"))
        .await
        .is_none());
    first.record_dispatch(&Channel::new(42, "primary"), None);
    assert!(affinity.on_success(&first, None));
    affinity.flush().await;

    // Second request: same first five turns, different sixth.
    let hint = affinity
        .resolve("default", "gpt-x", &conversation("second"))
        .await
        .expect("affinity should apply");
    assert_eq!(hint.channel_id, 42);
    assert_eq!(hint.sub_key_index, None);
    assert_eq!(hint.channel.name, "primary");

    // Channel disabled by an admin: the hint is discarded.
    assert!(directory.set_status(42, ChannelStatus::ManuallyDisabled));
    assert!(affinity
        .resolve("default", "gpt-x", &conversation("third"))
        .await
        .is_none());
    assert_eq!(affinity.stats().resolver.rejected, 1);
}

#[tokio::test]
async fn test_rate_limit_invalidates_before_ttl() {
    let (affinity, _) = setup();

    let mut seed = RequestState::new("default", "gpt-x");
    affinity
        .resolve_request(&mut seed, &conversation("a"))
        .await;
    assert!(affinity.on_success(&seed, Some(42)));
    affinity.flush().await;

    let mut req = RequestState::new("default", "gpt-x");
    let hint = affinity
        .resolve_request(&mut req, &conversation("b"))
        .await
        .expect("affinity should apply");
    assert_eq!(hint.channel_id, 42);
    assert!(req.summary().unwrap().hit);

    // Upstream answered 429 on the sticky channel.
    assert!(
        affinity
            .on_upstream_error(&mut req, UpstreamFailure::from_http_status(429))
            .await
    );
    // A retry inside the same request does not delete again.
    assert!(!affinity.on_failure(&mut req).await);
    assert_eq!(affinity.stats().feedback.invalidations, 1);

    let mut next = RequestState::new("default", "gpt-x");
    assert!(affinity
        .resolve_request(&mut next, &conversation("c"))
        .await
        .is_none());
    assert!(next.summary().is_none());
}

#[tokio::test]
async fn test_success_after_failover_overwrites_entry() {
    let (affinity, _) = setup();

    let mut seed = RequestState::new("default", "gpt-x");
    affinity.resolve_request(&mut seed, &conversation("a")).await;
    affinity.on_success(&seed, Some(42));
    affinity.flush().await;

    // Sticky channel used, but the pipeline retried on 41 and succeeded there.
    let mut req = RequestState::new("default", "gpt-x");
    assert!(affinity
        .resolve_request(&mut req, &conversation("b"))
        .await
        .is_some());
    req.record_dispatch(&Channel::new(41, "backup"), None);
    affinity.on_success(&req, Some(42));
    affinity.flush().await;

    let hint = affinity
        .resolve("default", "gpt-x", &conversation("c"))
        .await
        .unwrap();
    assert_eq!(hint.channel_id, 41);
}

#[tokio::test]
async fn test_multi_key_sub_index_round_trip() {
    let directory = Arc::new(InMemoryChannelDirectory::with_channels([
        Channel::new(7, "pool").with_key_count(4)
    ]));
    let affinity = SessionAffinity::new(
        AffinityConfig::default(),
        Arc::new(MemoryCache::new(16)),
        directory,
    );

    let mut req = RequestState::new("default", "claude-x");
    affinity.resolve_request(&mut req, &conversation("a")).await;
    req.record_dispatch(&Channel::new(7, "pool").with_key_count(4), Some(3));
    affinity.on_success(&req, None);
    affinity.flush().await;

    let hint = affinity
        .resolve("default", "claude-x", &conversation("b"))
        .await
        .unwrap();
    assert_eq!(hint.channel_id, 7);
    assert_eq!(hint.sub_key_index, Some(3));
}

#[tokio::test]
async fn test_groups_and_models_do_not_share_entries() {
    let (affinity, _) = setup();

    let mut req = RequestState::new("default", "gpt-x");
    affinity.resolve_request(&mut req, &conversation("a")).await;
    affinity.on_success(&req, Some(42));
    affinity.flush().await;

    assert!(affinity
        .resolve("vip", "gpt-x", &conversation("a"))
        .await
        .is_none());
    assert!(affinity
        .resolve("default", "gpt-y", &conversation("a"))
        .await
        .is_none());
    assert!(affinity
        .resolve("default", "gpt-x", &conversation("a"))
        .await
        .is_some());
}

#[tokio::test]
async fn test_auto_group_resolved_after_selection() {
    let (affinity, _) = setup();

    // Group is still "auto" while resolving; the pipeline picks it later.
    let mut req = RequestState::new("auto", "gpt-x");
    assert!(affinity
        .resolve_request(&mut req, &conversation("a"))
        .await
        .is_none());
    assert!(req.fingerprint.is_some());
    req.auto_group = Some("default".to_string());
    req.record_dispatch(&Channel::new(42, "primary"), None);
    assert!(affinity.on_success(&req, None));
    affinity.flush().await;

    let mut next = RequestState::new("auto", "gpt-x").with_auto_group("default");
    let hint = affinity
        .resolve_request(&mut next, &conversation("b"))
        .await
        .unwrap();
    assert_eq!(hint.channel_id, 42);
}

#[tokio::test]
async fn test_provider_formats_share_affinity() {
    let (affinity, _) = setup();
    let texts = ["sys", "q1", "a1", "q2", "a2", "q3"];
    let roles = ["system", "user", "assistant", "user", "assistant", "user"];

    let openai: Vec<OpenAiMessage> = roles
        .iter()
        .zip(texts.iter())
        .map(|(r, t)| OpenAiMessage::new(*r, *t))
        .collect();
    let claude: Vec<ClaudeMessage> = roles
        .iter()
        .zip(texts.iter())
        .map(|(r, t)| ClaudeMessage::new(*r, *t))
        .collect();
    let gemini: Vec<GeminiContent> = roles
        .iter()
        .zip(texts.iter())
        .map(|(r, t)| GeminiContent::new(*r, *t))
        .collect();

    let mut req = RequestState::new("default", "gpt-x");
    affinity
        .resolve_request(&mut req, &openai_turns(&openai))
        .await;
    affinity.on_success(&req, Some(42));
    affinity.flush().await;

    for turns in [anthropic_turns(&claude), gemini_turns(&gemini)] {
        let hint = affinity.resolve("default", "gpt-x", &turns).await.unwrap();
        assert_eq!(hint.channel_id, 42);
    }
}

#[tokio::test]
async fn test_admin_info_reports_hit() {
    let (affinity, _) = setup();
    let mut seed = RequestState::new("default", "gpt-x");
    affinity.resolve_request(&mut seed, &conversation("a")).await;
    affinity.on_success(&seed, Some(42));
    affinity.flush().await;

    let mut req = RequestState::new("default", "gpt-x");
    affinity.resolve_request(&mut req, &conversation("a")).await;
    let mut info = serde_json::Map::new();
    req.append_admin_info(&mut info);
    let entry = &info["channel_affinity"];
    assert_eq!(entry["reason"], "session_affinity");
    assert_eq!(entry["hit"], true);
    assert_eq!(
        entry["hash_hint"].as_str().unwrap(),
        &req.fingerprint.as_ref().unwrap().as_str()[..8]
    );
}
