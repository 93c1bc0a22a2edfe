//! Session Affinity Example
//!
//! Walks one conversation through three requests against an in-memory cache:
//! 1. First request misses and records the channel that served it
//! 2. Follow-up request sticks to that channel
//! 3. A 429 from the sticky channel clears the mapping
//!
//! Run with `RUST_LOG=channel_affinity=debug` to see the store traffic.

use channel_affinity::cache::MemoryCache;
use channel_affinity::directory::InMemoryChannelDirectory;
use channel_affinity::extract::{turns_from_json, RequestFormat};
use channel_affinity::{AffinityConfig, Channel, RequestState, SessionAffinity, UpstreamFailure};
use serde_json::json;
use std::sync::Arc;

fn request_body(last_question: &str) -> serde_json::Value {
    json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "system", "content": "You are a terse code reviewer."},
            {"role": "user", "content": "Review this function."},
            {"role": "assistant", "content": "The error branch is unreachable."},
            {"role": "user", "content": "Why?"},
            {"role": "assistant", "content": "The guard above already returns."},
            {"role": "user", "content": last_question}
        ]
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "channel_affinity=info".into()),
        )
        .init();

    let directory = Arc::new(InMemoryChannelDirectory::with_channels([
        Channel::new(11, "openai-east"),
        Channel::new(12, "openai-west").with_key_count(3),
    ]));
    let affinity = SessionAffinity::new(
        AffinityConfig::from_env(),
        Arc::new(MemoryCache::new(10_000)),
        directory,
    );

    // Request 1: no mapping yet, the pipeline picks channel 12 key #2.
    let body = request_body("Should I delete it?");
    let turns = turns_from_json(RequestFormat::OpenAi, &body)?;
    let mut state = RequestState::new("default", "gpt-4o");
    let hint = affinity.resolve_request(&mut state, &turns).await;
    println!("request 1 hint: {:?}", hint.map(|h| h.channel_id));
    state.record_dispatch(&Channel::new(12, "openai-west").with_key_count(3), Some(2));
    affinity.on_success(&state, None);
    affinity.flush().await;

    // Request 2: same prefix, new tail.
    let body = request_body("And the tests?");
    let turns = turns_from_json(RequestFormat::OpenAi, &body)?;
    let mut state = RequestState::new("default", "gpt-4o");
    if let Some(hint) = affinity.resolve_request(&mut state, &turns).await {
        println!(
            "request 2 sticks to channel {} ({}) key {:?}",
            hint.channel_id, hint.channel.name, hint.sub_key_index
        );
    }
    let mut admin_info = serde_json::Map::new();
    state.append_admin_info(&mut admin_info);
    println!("admin info: {}", serde_json::Value::Object(admin_info));

    // The sticky channel is throttled; drop the mapping.
    let cleared = affinity
        .on_upstream_error(&mut state, UpstreamFailure::from_http_status(429))
        .await;
    println!("cleared after 429: {}", cleared);

    // Request 3: back to normal selection.
    let mut state = RequestState::new("default", "gpt-4o");
    let hint = affinity.resolve_request(&mut state, &turns).await;
    println!("request 3 hint: {:?}", hint.map(|h| h.channel_id));

    println!("\n{:#?}", affinity.stats());
    Ok(())
}
