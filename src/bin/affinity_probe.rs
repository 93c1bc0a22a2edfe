//! Inspect how a chat request would be keyed for session affinity.
//!
//! Usage: `affinity-probe [--group <group>] [--format openai|anthropic|gemini] [FILE]`
//!
//! Reads a request body from FILE (or stdin), extracts the conversation turns,
//! and prints the fingerprint and cache key. Set `RUST_LOG=debug` for tracing.

use anyhow::{anyhow, bail, Context};
use channel_affinity::cache::AffinityKey;
use channel_affinity::extract::{turns_from_json, RequestFormat};
use channel_affinity::{AffinityConfig, Fingerprinter};
use std::io::Read;

struct Args {
    group: String,
    format: Option<RequestFormat>,
    path: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        group: "default".to_string(),
        format: None,
        path: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--group" => {
                args.group = it.next().ok_or_else(|| anyhow!("--group needs a value"))?;
            }
            "--format" => {
                let value = it.next().ok_or_else(|| anyhow!("--format needs a value"))?;
                args.format = Some(match value.as_str() {
                    "openai" => RequestFormat::OpenAi,
                    "anthropic" | "claude" => RequestFormat::Anthropic,
                    "gemini" => RequestFormat::Gemini,
                    other => bail!("unknown format: {}", other),
                });
            }
            "-h" | "--help" => {
                println!(
                    "usage: affinity-probe [--group <group>] [--format openai|anthropic|gemini] [FILE]"
                );
                std::process::exit(0);
            }
            _ => args.path = Some(arg),
        }
    }
    Ok(args)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let raw = match &args.path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let body: serde_json::Value = serde_json::from_str(&raw).context("request body is not JSON")?;
    let format = args
        .format
        .or_else(|| RequestFormat::detect(&body))
        .ok_or_else(|| anyhow!("cannot detect request format; pass --format"))?;
    let turns = turns_from_json(format, &body)?;
    let model = body.get("model").and_then(|m| m.as_str()).unwrap_or("");

    let config = AffinityConfig::global();
    let fingerprinter = Fingerprinter::from_config(config);
    tracing::debug!(format = format.as_str(), turns = turns.len(), "extracted conversation");

    println!("format:      {}", format.as_str());
    println!("turns:       {}", turns.len());
    match fingerprinter.fingerprint(&turns) {
        Some(fp) => {
            println!("fingerprint: {}", fp);
            if model.is_empty() {
                println!("cache key:   (no model in body)");
            } else {
                println!("cache key:   {}", AffinityKey::new(args.group.as_str(), model, &fp));
            }
            println!("ttl:         {}s", config.ttl.as_secs());
        }
        None => println!(
            "fingerprint: none (needs at least {} turns)",
            fingerprinter.min_rounds()
        ),
    }
    Ok(())
}
