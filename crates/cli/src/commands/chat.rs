//! `mindrelay chat` - Interactive or single-message chat mode.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mindrelay_agent::{ChatAgent, ChunkSink, FilePreferences, StreamEvent};
use mindrelay_config::AppConfig;
use mindrelay_core::Error;
use mindrelay_core::context::{ConversationContext, SessionSummary};
use mindrelay_core::message::Message;
use mindrelay_providers::ModelCatalog;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

#[derive(clap::Args)]
pub struct ChatArgs {
    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    message: Option<String>,

    /// Print the reply as it streams in
    #[arg(short, long)]
    stream: bool,

    /// JSON file holding an array of session summaries to use as facts
    #[arg(long, value_name = "FILE")]
    facts: Option<PathBuf>,

    /// Long-term summary of earlier conversations
    #[arg(long)]
    summary: Option<String>,

    /// Use (and remember) this model id
    #[arg(long)]
    model: Option<String>,

    /// Answer with canned replies, no network
    #[arg(long)]
    mock: bool,
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if args.mock {
        config.mock_mode = true;
    }

    if !config.mock_mode && !config.has_any_credential() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set at least one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY   (recommended)");
        eprintln!("    XAI_API_KEY          (alternate vendor)");
        eprintln!("    GOOGLE_API_KEY       (last resort)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  Or try it offline with --mock.");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let facts = match &args.facts {
        Some(path) => load_facts(path)?,
        None => Vec::new(),
    };

    let catalog = Arc::new(ModelCatalog::new(
        config.base_url(mindrelay_core::Vendor::OpenRouter),
    ));
    let preferences = Arc::new(FilePreferences::new(
        AppConfig::config_dir().join("preferences.json"),
    ));
    let persona = config.persona.system_prompt.clone();
    let agent = ChatAgent::new(config, catalog)?.with_preferences(preferences);
    agent.initialize().await?;

    if let Some(model) = &args.model {
        agent.set_preferred_model(model).await?;
    }

    // Ctrl+C aborts the in-flight turn instead of killing the terminal mid-line.
    let cancel = agent.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut context = ConversationContext::new(persona)
        .with_facts(facts)
        .with_summary(args.summary.clone().unwrap_or_default());

    if let Some(msg) = args.message {
        // Single message mode
        let reply = turn(&agent, &msg, context, args.stream).await?;
        if !args.stream {
            println!("{}", reply.0);
        }
        return Ok(());
    }

    // Interactive mode
    let state = agent.orchestrator_state();
    println!();
    println!("  MindRelay — Interactive Mode");
    println!();
    println!("  Vendor:    {}", state.active_vendor);
    println!("  Model:     {}", state.active_model_id);
    println!("  Tier:      {}", state.current_tier);
    println!("  Catalog:   {} models", agent.catalog().len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Commands: /state, /reset, exit");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/state" => {
                let state = agent.orchestrator_state();
                println!(
                    "  {} / {} / {} (failures: {})",
                    state.active_vendor,
                    state.active_model_id,
                    state.current_tier,
                    state.consecutive_failures
                );
                continue;
            }
            "/reset" => {
                agent.reset();
                println!("  Back to {}", agent.orchestrator_state().active_model_id);
                continue;
            }
            _ => {}
        }

        match turn(&agent, input, take_turn_context(&mut context), args.stream).await {
            Ok((reply, history, needs_consolidation)) => {
                if !args.stream {
                    println!();
                    for line in reply.lines() {
                        println!("  Assistant > {line}");
                    }
                }
                println!();
                if needs_consolidation {
                    let stale = agent.memory().messages_for_consolidation(&history).len();
                    eprintln!("  [memory] context is near its limit; {stale} older messages are ready to summarize");
                }
                context.history = history;
            }
            Err(Error::Cancelled) => {
                eprintln!("  [Cancelled]");
                break;
            }
            // Transport failures never surface here, so any error ends the
            // session.
            Err(e) => {
                eprintln!("  [Error] {e}");
                break;
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Run one turn, printing deltas live when streaming.
async fn turn(
    agent: &ChatAgent,
    input: &str,
    context: ConversationContext,
    stream: bool,
) -> Result<(String, Vec<Message>, bool), Error> {
    if !stream {
        let outcome = agent.chat(input, context, None).await?;
        return Ok((
            outcome.response_text,
            outcome.updated_history,
            outcome.needs_consolidation,
        ));
    }

    let (tx, mut rx): (ChunkSink, _) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        print!("  Assistant > ");
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Delta(chunk) => print!("{chunk}"),
                StreamEvent::Restart => {
                    println!();
                    println!("  [retrying]");
                    print!("  Assistant > ");
                }
            }
            let _ = std::io::stdout().flush();
        }
        println!();
    });

    let result = agent.chat(input, context, Some(&tx)).await;
    drop(tx);
    let _ = printer.await;

    let outcome = result?;
    Ok((
        outcome.response_text,
        outcome.updated_history,
        outcome.needs_consolidation,
    ))
}

/// Context for the next turn. The history is moved out, not copied, and
/// comes back grown in the turn's outcome.
fn take_turn_context(context: &mut ConversationContext) -> ConversationContext {
    ConversationContext {
        system_prompt: context.system_prompt.clone(),
        facts: context.facts.clone(),
        summary: context.summary.clone(),
        history: std::mem::take(&mut context.history),
    }
}

fn load_facts(path: &Path) -> Result<Vec<SessionSummary>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read facts file {}: {e}", path.display()))?;
    let facts = serde_json::from_str(&text)
        .map_err(|e| format!("Facts file {} is not a JSON array of summaries: {e}", path.display()))?;
    Ok(facts)
}
