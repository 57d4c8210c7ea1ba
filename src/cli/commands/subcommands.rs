use super::setup_service;
use crate::config::Config;
use crate::engine::{ConversationService, TurnReply};
use crate::persona::{CharacterConfig, Language};
use anyhow::Result;
use tracing::info;

pub(super) async fn serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    config.validate()?;

    let service = setup_service(&config).await?;
    info!("starting charmcrab in {:?} mode", service.mode());
    crate::gateway::serve(&config, service).await
}

pub(super) async fn chat(config: &Config, user: &str, message: Option<String>) -> Result<()> {
    let service = setup_service(config).await?;

    if let Some(msg) = message {
        let reply = service.process_turn_with_session(user, &msg, &config.persona).await?;
        println!("{}", format_reply(&config.persona, &reply));
    } else {
        read_stdin_turns(&service, user, &config.persona).await?;
    }

    service.shutdown();
    Ok(())
}

async fn read_stdin_turns(
    service: &ConversationService,
    user: &str,
    persona: &CharacterConfig,
) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = service.process_turn_with_session(user, line, persona).await?;
        println!("{}", format_reply(persona, &reply));
    }
    Ok(())
}

pub(super) fn format_reply(persona: &CharacterConfig, reply: &TurnReply) -> String {
    let marker = if reply.is_last {
        " [last]"
    } else if reply.is_semi {
        " [semi]"
    } else {
        ""
    };
    format!(
        "{} #{} ({}, {:.1}){}: {}",
        persona.name,
        reply.sequence_number,
        reply.emotion,
        reply.confidence,
        marker,
        reply.reply_text
    )
}

pub(super) async fn train(
    config: &Config,
    question: &str,
    answer: &str,
    language: Option<&str>,
) -> Result<()> {
    let service = setup_service(config).await?;
    let language = language.map_or_else(|| config.persona.language(), Language::from_code);
    let id = service.train(question, answer, language).await?;
    println!("\u{2713} Learned {} ({})", id, language);
    service.shutdown();
    Ok(())
}

pub(super) async fn stats(config: &Config) -> Result<()> {
    let service = ConversationService::open(config)?;
    let stats = service.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub(super) async fn reset(config: &Config, user: &str) -> Result<()> {
    let service = ConversationService::open(config)?;
    if service.reset(user).await? {
        println!("\u{2713} Reset {}", user);
    } else {
        println!("No conversation state for {}", user);
    }
    Ok(())
}
