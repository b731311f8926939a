//! `backchannel chat`: interactive session.
//!
//! Stdin lines are published as `user:input`; the orchestrator runs on its
//! own task and writes everything back through the terminal sink.

use std::sync::Arc;
use std::time::Duration;

use backchannel_agent::{JobLauncher, Orchestrator};
use backchannel_config::AppConfig;
use backchannel_core::conversation::ConversationLog;
use backchannel_core::event::{DomainEvent, EventBus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::terminal::{InputLine, TerminalSink, parse_line};

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.provider_api_key().is_none() && config.provider != "ollama" {
        eprintln!();
        eprintln!("  WARNING: No API key configured for '{}'.", config.provider);
        eprintln!("  Set BACKCHANNEL_API_KEY (or GEMINI_API_KEY / OPENAI_API_KEY),");
        eprintln!("  or add it to {}", AppConfig::config_path().display());
        eprintln!();
    }

    let bus = Arc::new(EventBus::new());
    let log = Arc::new(ConversationLog::new());
    let mut registry = backchannel_tools::default_registry(&config);
    // Held for the whole session; dropping them closes the MCP connections.
    let _mcp_servers = backchannel_tools::register_mcp_tools(&mut registry, &config.mcp).await;
    let registry = Arc::new(registry);

    let mut launcher = JobLauncher::new(bus.clone(), registry.clone());
    if let Some(max) = config.orchestrator.max_concurrent_jobs {
        launcher = launcher.with_max_concurrent(max);
    }

    let completion = Arc::new(backchannel_providers::completion_service_from_config(&config));
    let sink = Arc::new(TerminalSink::new());
    let orchestrator = Arc::new(
        Orchestrator::attach(bus.clone(), log, Arc::new(launcher), completion, sink.clone())
            .with_poll_interval(Duration::from_millis(config.orchestrator.poll_interval_ms)),
    );

    println!();
    println!("  -----------------------------------------");
    println!("   Backchannel Agent (type 'exit' to quit)");
    println!("  -----------------------------------------");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", registry.names().join(", "));
    println!();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .run(async {
                    let _ = stop_rx.await;
                })
                .await;
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    sink.prompt();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };

        match line {
            Ok(Some(line)) => match parse_line(&line) {
                InputLine::Skip => sink.prompt(),
                InputLine::Exit => break,
                InputLine::Message(text) => {
                    debug!(chars = text.len(), "User input");
                    bus.publish(&DomainEvent::user_input(text));
                }
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        }
    }

    let _ = stop_tx.send(());
    runner.await?;

    let (user, notifications) = orchestrator.pending();
    if user + notifications > 0 {
        debug!(user, notifications, "Exiting with unprocessed work");
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
