//! # Interview Harness CLI (`ih`)
//!
//! ## Usage
//!
//! ```bash
//! ih --config ./config/ih.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ih init` | Create the SQLite database and run schema migrations |
//! | `ih ingest <resume\|jd> <file>` | Extract, chunk, embed, and index a document |
//! | `ih questions --role <role>` | Generate grounded interview questions |
//! | `ih score --role <role> --question <q> --answer <a>` | Score an answer and record the attempt |
//! | `ih history` | Most recent attempts |
//! | `ih summary` | Attempt count and average score |
//! | `ih serve` | Start the HTTP server |
//!
//! Results are printed to stdout as JSON. Logs go to stderr; set `RUST_LOG`
//! to adjust verbosity.
//!
//! ## Examples
//!
//! ```bash
//! ih ingest resume ./cv.pdf
//! ih ingest jd ./posting.txt
//! ih questions --role "Backend Engineer" --company Acme --count 5
//! ih score --role "Backend Engineer" --question "Tell me about a hard bug" --answer "..."
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use interview_harness::config;
use interview_harness::service::{InterviewService, DEFAULT_HISTORY_LIMIT, DEFAULT_QUESTION_COUNT};
use interview_harness::{db, migrate, server};

/// Interview Harness: practise interviews grounded in your resume and a job description.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(name = "ih", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ih.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a resume or job description (PDF, DOCX, or plain text).
    Ingest {
        /// `resume` or `jd`.
        doc_type: String,
        /// File to ingest.
        file: PathBuf,
    },

    /// Generate interview questions for a role.
    Questions {
        #[arg(long)]
        role: String,
        #[arg(long)]
        company: Option<String>,
        /// Requested number of questions (at least 3 are always returned
        /// when the model provides them).
        #[arg(long, default_value_t = DEFAULT_QUESTION_COUNT)]
        count: usize,
    },

    /// Score an answer against the indexed material and record the attempt.
    Score {
        #[arg(long)]
        role: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
    },

    /// Show the most recent attempts.
    History {
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },

    /// Show attempt count and average score.
    Summary,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("interview_harness=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        command => {
            let service = InterviewService::from_config(&cfg).await?;
            run_command(&service, command).await?;
        }
    }

    Ok(())
}

async fn run_command(service: &InterviewService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { doc_type, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            print_json(&service.upload(&doc_type, &bytes).await?)
        }
        Commands::Questions {
            role,
            company,
            count,
        } => print_json(
            &service
                .generate_questions(&role, company.as_deref(), count)
                .await?,
        ),
        Commands::Score {
            role,
            company,
            question,
            answer,
        } => print_json(
            &service
                .score_answer(&role, company.as_deref(), &question, &answer)
                .await?,
        ),
        Commands::History { limit } => print_json(&service.history(limit).await?),
        Commands::Summary => print_json(&service.summary().await?),
        Commands::Init | Commands::Serve => Ok(()),
    }
}
