//! Runnable Crush Party server with the development authenticator and a
//! bundled question bank.
//!
//! ```text
//! PORT=3000 TRIVIA_COUNT=60 LOUNGE_COUNT=20 QUESTION_COUNT=20 cargo run -p party-server
//! ```
//!
//! Clients log in with a `"<id>:<username>:<avatar>"` token.

use std::str::FromStr;
use std::time::Duration;

use crushparty::prelude::*;
use tracing_subscriber::EnvFilter;

const QUESTIONS: &str = include_str!("../questions.json");

/// Reads `key` from the environment, keeping `default` when it is unset or
/// does not parse.
fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "unparseable setting, using default");
            default
        }),
        Err(_) => default,
    }
}

fn game_config() -> GameConfig {
    let defaults = GameConfig::default();
    GameConfig {
        round_seconds: env_or("TRIVIA_COUNT", defaults.round_seconds),
        lounge_seconds: env_or("LOUNGE_COUNT", defaults.lounge_seconds),
        question_count: env_or("QUESTION_COUNT", defaults.question_count),
        provider_timeout: Duration::from_secs(env_or("PROVIDER_TIMEOUT_SECS", defaults.provider_timeout.as_secs())),
        ..defaults
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,crushparty=debug")))
        .init();

    let port: u16 = env_or("PORT", 3000);
    let bank = StaticQuestionBank::from_json(QUESTIONS)?;
    tracing::info!(questions = bank.len(), "question bank loaded");

    let server = PartyServerBuilder::new()
        .bind(&format!("0.0.0.0:{port}"))
        .game_config(game_config())
        .build(DevAuthenticator, bank)
        .await?;

    server.run().await?;
    Ok(())
}
