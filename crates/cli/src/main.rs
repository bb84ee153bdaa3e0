use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faq_agents::FaqAgent;
use faq_core::{ChatInput, FaqCatalog, IntentMatcher};
use faq_ml::Fallback;
use faq_observability::{init_tracing_stderr, AppMetrics};
use faq_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "faq")]
#[command(about = "Chatbot de la Oficina de Egresados")]
struct Cli {
    /// JSON catalog replacing the built-in questions.
    #[arg(long, env = "FAQ_CATALOG_PATH")]
    catalog: Option<PathBuf>,

    #[arg(long, env = "FAQ_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Ask {
        text: String,
        #[arg(long)]
        session: Option<String>,
    },
    Match {
        text: String,
    },
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing_stderr("faq_cli");
    let cli = Cli::parse();

    let agent = build_agent(cli.catalog.as_ref(), cli.database_url.as_deref()).await?;

    match cli.command {
        Command::Chat => run_chat(agent).await?,
        Command::Ask { text, session } => {
            let reply = agent
                .handle_chat(ChatInput {
                    session_id: session,
                    text,
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Command::Match { text } => {
            println!("{}", serde_json::to_string_pretty(&agent.inspect(&text))?);
        }
        Command::Catalog => {
            println!(
                "{}",
                serde_json::to_string_pretty(&agent.catalog_overview())?
            );
        }
    }

    Ok(())
}

async fn run_chat(agent: FaqAgent<Store, Fallback>) -> Result<()> {
    let mut session_id: Option<String> = None;

    println!("¡Hola! ¿En qué puedo ayudarte hoy con tus trámites? Escribe 'salir' para terminar, '/reset' para reiniciar.");
    for question in agent.suggestions() {
        println!("  - {question}");
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if ["exit", "quit", "salir"]
            .iter()
            .any(|word| message.eq_ignore_ascii_case(word))
        {
            break;
        }

        if message.is_empty() {
            continue;
        }

        if message == "/reset" {
            if let Some(id) = session_id.take() {
                agent.reset_session(&id).await?;
            }
            println!("\nConversación reiniciada.\n");
            continue;
        }

        let reply = agent
            .handle_chat(ChatInput {
                session_id: session_id.clone(),
                text: message.to_string(),
            })
            .await?;
        session_id = Some(reply.session_id.clone());

        println!("\n{}\n", reply.reply_text);
    }

    Ok(())
}

async fn build_agent(
    catalog_path: Option<&PathBuf>,
    database_url: Option<&str>,
) -> Result<FaqAgent<Store, Fallback>> {
    let catalog = match catalog_path {
        Some(path) => FaqCatalog::from_json_file(path)
            .with_context(|| format!("failed loading catalog from {}", path.display()))?,
        None => FaqCatalog::unfv_default(),
    };
    let matcher = IntentMatcher::new(catalog).context("invalid FAQ catalog")?;

    let store = match database_url {
        Some(url) => Store::sqlite(url).await?,
        None => Store::memory(),
    };

    Ok(FaqAgent::new(
        Arc::new(matcher),
        Arc::new(Fallback::load_default()?),
        Arc::new(store),
        AppMetrics::shared(),
    ))
}
