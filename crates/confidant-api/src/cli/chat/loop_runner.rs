//! Main chat loop orchestration.
//!
//! Starts the background maintenance tasks, prints the banner, then feeds
//! each input line through `ChatService::handle_message` until the user
//! exits. Slash commands are handled here without touching the pipeline.

use std::time::{Duration, Instant};

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use confidant_core::chat::repository::SessionRepository;
use confidant_observe::genai_attrs::{
    GEN_AI_PROVIDER_NAME, GEN_AI_RESPONSE_MODEL, GEN_AI_USAGE_CACHED_TOKENS,
    GEN_AI_USAGE_INPUT_TOKENS, GEN_AI_USAGE_OUTPUT_TOKENS, OP_CHAT,
};
use confidant_types::chat::{ConversationId, IncomingMessage, Reply, Session, TurnOutcome};
use confidant_types::memory::{MemoryScope, MemoryType, NewMemory};

use crate::state::AppState;

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::renderer::{ChatRenderer, ReplyFooter};

/// Importance given to facts saved with `/remember`.
const MANUAL_MEMORY_IMPORTANCE: f32 = 0.9;

/// Who the terminal is speaking as.
struct ChatIdentity {
    conversation_id: ConversationId,
    user_id: Option<String>,
    server_id: Option<String>,
}

enum Flow {
    Continue,
    Exit,
}

/// Run the interactive chat loop for one conversation.
pub async fn run_chat_loop(
    state: &AppState,
    conversation: String,
    user: Option<String>,
    server: Option<String>,
) -> anyhow::Result<()> {
    let identity = ChatIdentity {
        conversation_id: ConversationId::from(conversation),
        user_id: user.or_else(|| std::env::var("USER").ok()),
        server_id: server,
    };

    let cancel = CancellationToken::new();
    let background = state.spawn_background(&cancel);

    print_welcome_banner(
        &state.config.persona.name,
        &state.executor.provider_order(None),
        identity.conversation_id.as_str(),
        identity.user_id.as_deref(),
        identity.server_id.as_deref(),
    );

    let renderer = ChatRenderer::new();
    let prompt = format!("  {} ", style("You >").green().bold());
    let (mut chat_input, _writer) = ChatInput::new(prompt)
        .map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;

    loop {
        match chat_input.read_line().await {
            InputEvent::Eof => {
                println!("\n  {}", style("Session ended.").dim());
                break;
            }
            InputEvent::Interrupted => {
                println!("\n  {}", style("Press Ctrl+D to exit, or keep chatting.").dim());
            }
            InputEvent::Message(text) => {
                if text.is_empty() {
                    continue;
                }

                if let Some(cmd) = commands::parse(&text) {
                    match handle_command(state, &identity, cmd, &mut chat_input).await {
                        Flow::Continue => continue,
                        Flow::Exit => {
                            println!("\n  {}", style("Session ended.").dim());
                            break;
                        }
                    }
                }

                let incoming = IncomingMessage {
                    conversation_id: identity.conversation_id.clone(),
                    author_id: identity.user_id.clone(),
                    server_id: identity.server_id.clone(),
                    content: text,
                };
                send_turn(state, &renderer, incoming).await;
            }
        }
    }

    chat_input.flush();
    cancel.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    Ok(())
}

/// Run one message through the pipeline and print the outcome.
async fn send_turn(state: &AppState, renderer: &ChatRenderer, incoming: IncomingMessage) {
    let span = tracing::info_span!(
        "chat_turn",
        gen_ai.operation.name = OP_CHAT,
        gen_ai.conversation.id = %incoming.conversation_id,
        gen_ai.provider.name = tracing::field::Empty,
        gen_ai.response.model = tracing::field::Empty,
        gen_ai.usage.input_tokens = tracing::field::Empty,
        gen_ai.usage.output_tokens = tracing::field::Empty,
        gen_ai.usage.cached_input_tokens = tracing::field::Empty,
    );

    let spinner = thinking_spinner();
    let started = Instant::now();
    let outcome = state
        .chat_service
        .handle_message(incoming)
        .instrument(span.clone())
        .await;
    spinner.finish_and_clear();

    match outcome {
        Ok(TurnOutcome::Reply(reply)) => {
            record_reply(&span, &reply);
            print_reply(renderer, &reply, started.elapsed());
        }
        Ok(TurnOutcome::Suppressed) => {
            println!(
                "\n  {} {}\n",
                style("~").yellow().bold(),
                style("Still working on your previous message.").dim()
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Turn failed");
            eprintln!("\n  {} {e}\n", style("!").red().bold());
        }
    }
}

fn record_reply(span: &tracing::Span, reply: &Reply) {
    if let Some(provider) = reply.provider.as_deref() {
        span.record(GEN_AI_PROVIDER_NAME, provider);
    }
    if let Some(model) = reply.model.as_deref() {
        span.record(GEN_AI_RESPONSE_MODEL, model);
    }
    if let Some(usage) = &reply.usage {
        span.record(GEN_AI_USAGE_INPUT_TOKENS, usage.prompt_tokens);
        span.record(GEN_AI_USAGE_OUTPUT_TOKENS, usage.completion_tokens);
        if let Some(cached) = usage.cached_tokens {
            span.record(GEN_AI_USAGE_CACHED_TOKENS, cached);
        }
    }
}

fn print_reply(renderer: &ChatRenderer, reply: &Reply, elapsed: Duration) {
    println!();
    if reply.degraded {
        println!("  {} {}", style("!").yellow().bold(), style(&reply.content).yellow());
        println!();
        return;
    }

    println!("  {}", renderer.render(&reply.content).trim_end());
    renderer.print_stats_footer(&ReplyFooter {
        provider: reply.provider.as_deref().unwrap_or("-"),
        model: reply.model.as_deref().unwrap_or("-"),
        usage: reply.usage.as_ref(),
        fallback_count: reply.fallback_count,
        response_ms: elapsed.as_millis() as u64,
    });
    println!();
}

fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

async fn handle_command(
    state: &AppState,
    identity: &ChatIdentity,
    cmd: ChatCommand,
    chat_input: &mut ChatInput,
) -> Flow {
    let result = match cmd {
        ChatCommand::Help => {
            commands::print_help();
            Ok(())
        }
        ChatCommand::Clear => {
            chat_input.clear();
            Ok(())
        }
        ChatCommand::Exit => return Flow::Exit,
        ChatCommand::Remember(fact) => remember(state, identity, fact).await,
        ChatCommand::Memories => show_memories(state, identity).await,
        ChatCommand::Model(None) => show_model(state, identity).await,
        ChatCommand::Model(Some(choice)) => set_model(state, identity, Some(choice)).await,
        ChatCommand::ResetModel => set_model(state, identity, None).await,
        ChatCommand::Providers => {
            for status in state.executor.status() {
                println!(
                    "  {} {} ({}) circuit={} calls={} failures={}",
                    style("-").dim(),
                    style(&status.name).cyan(),
                    status.model,
                    status.circuit_state,
                    status.total_calls,
                    status.total_failures
                );
            }
            Ok(())
        }
        ChatCommand::Unknown(name) => {
            println!(
                "\n  {} Unknown command: {}. Type /help for available commands.\n",
                style("?").yellow().bold(),
                style(name).dim()
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        println!("\n  {} {e}\n", style("!").red().bold());
    }
    Flow::Continue
}

/// The conversation's session, created on first use.
async fn session_for(state: &AppState, conversation_id: &ConversationId) -> anyhow::Result<Session> {
    if let Some(session) = state.sessions.get_session_by_conversation(conversation_id).await? {
        return Ok(session);
    }
    let session = Session::new(conversation_id.clone());
    state.sessions.create_session(&session).await?;
    Ok(session)
}

async fn remember(state: &AppState, identity: &ChatIdentity, fact: String) -> anyhow::Result<()> {
    let memory = state.require_memory()?;
    let session = session_for(state, &identity.conversation_id).await?;

    let scope = if identity.user_id.is_some() {
        MemoryScope::User
    } else {
        MemoryScope::Session
    };
    let new = NewMemory::new(session.id, fact, MemoryType::Fact, scope)
        .with_user(identity.user_id.clone())
        .with_server(identity.server_id.clone())
        .with_importance(MANUAL_MEMORY_IMPORTANCE);

    let record = memory.create(new).await?;
    println!(
        "\n  {} Remembered ({}): {}\n",
        style("*").cyan().bold(),
        record.scope,
        style(&record.content).dim()
    );
    Ok(())
}

async fn show_memories(state: &AppState, identity: &ChatIdentity) -> anyhow::Result<()> {
    let memory = state.require_memory()?;
    let Some(user_id) = identity.user_id.as_deref() else {
        anyhow::bail!("No user identity; start the chat with --user to use user memories");
    };

    let matches = memory.query_user(user_id, None, 20).await?;
    println!();
    if matches.is_empty() {
        println!("  {}", style("Nothing remembered yet.").dim());
    }
    for m in &matches {
        println!(
            "  {} {} {}",
            style(format!("[{:.2}]", m.record.importance)).yellow(),
            m.record.content,
            style(format!("({})", m.record.memory_type)).dim()
        );
    }
    println!();
    Ok(())
}

async fn show_model(state: &AppState, identity: &ChatIdentity) -> anyhow::Result<()> {
    let preferred = state
        .sessions
        .get_session_by_conversation(&identity.conversation_id)
        .await?
        .and_then(|s| s.preferred_model);
    let order = state
        .executor
        .provider_order(preferred.as_deref().map(|p| p.split(':').next().unwrap_or(p)));

    println!(
        "\n  {} {}",
        style("Preferred:").bold(),
        preferred.as_deref().unwrap_or("(default order)")
    );
    println!("  {} {}\n", style("Order:").bold(), order.join(" -> "));
    Ok(())
}

async fn set_model(
    state: &AppState,
    identity: &ChatIdentity,
    choice: Option<String>,
) -> anyhow::Result<()> {
    if let Some(choice) = choice.as_deref() {
        let provider = choice.split(':').next().unwrap_or(choice);
        if !state.executor.provider_names().contains(&provider) {
            anyhow::bail!(
                "Unknown provider '{provider}'. Configured: {}",
                state.executor.provider_names().join(", ")
            );
        }
    }

    let mut session = session_for(state, &identity.conversation_id).await?;
    session.preferred_model = choice;
    state.sessions.update_session(&session).await?;

    println!(
        "\n  {} Preferred backend: {}\n",
        style("+").green().bold(),
        session.preferred_model.as_deref().unwrap_or("(default order)")
    );
    Ok(())
}
