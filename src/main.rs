use anyhow::Result;
use clap::{Parser, Subcommand};
use rag_app::commands::{
    ask, ingest_document, query_documents, reset_collection, serve, show_count, upload,
    write_config,
};
use rag_app::config::{Config, show_config};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rag-app")]
#[command(about = "Ingest documents and answer questions about them with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the vector store and uploads
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve,
    /// Ingest a PDF or text document
    Ingest {
        /// Path of the document
        path: PathBuf,
        /// Source id to store the chunks under, defaults to the path
        #[arg(long)]
        source_id: Option<String>,
    },
    /// Answer a question from the ingested documents
    Query {
        question: String,
        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ask a running server and wait for the answer
    Ask {
        question: String,
        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Seconds to wait for the answer
        #[arg(long, default_value_t = 120)]
        timeout: u64,
        /// Server URL, defaults to the configured host and port
        #[arg(long)]
        server: Option<String>,
    },
    /// Upload a document to a running server for ingestion
    Upload {
        path: PathBuf,
        /// Server URL, defaults to the configured host and port
        #[arg(long)]
        server: Option<String>,
    },
    /// Show the number of stored chunks
    Count,
    /// Delete every stored chunk
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Write or show the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_base_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&Config::load_with_env(&base_dir)?);
        } else {
            // Secrets from the environment stay out of the file
            write_config(&Config::load(&base_dir)?)?;
        }
        return Ok(());
    }

    let config = Config::load_with_env(&base_dir)?;
    let server_url = |server: Option<String>| server.unwrap_or_else(|| config.server.base_url());

    match cli.command {
        Commands::Serve => serve(&config).await?,
        Commands::Ingest { path, source_id } => ingest_document(&config, &path, source_id).await?,
        Commands::Query { question, top_k } => query_documents(&config, &question, top_k).await?,
        Commands::Ask {
            question,
            top_k,
            timeout,
            server,
        } => {
            ask(
                &server_url(server),
                &question,
                top_k,
                Duration::from_secs(timeout),
            )
            .await?;
        }
        Commands::Upload { path, server } => upload(&config, &server_url(server), &path).await?,
        Commands::Count => show_count(&config).await?,
        Commands::Reset { yes } => reset_collection(&config, yes).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn serve_command() {
        let cli = Cli::try_parse_from(["rag-app", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Serve));
            assert_eq!(parsed.config_dir, None);
        }
    }

    #[test]
    fn ingest_command_with_source_id() {
        let cli = Cli::try_parse_from([
            "rag-app",
            "ingest",
            "docs/manual.pdf",
            "--source-id",
            "manual",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { path, source_id } = parsed.command {
                assert_eq!(path, PathBuf::from("docs/manual.pdf"));
                assert_eq!(source_id, Some("manual".to_string()));
            } else {
                panic!("expected ingest command");
            }
        }
    }

    #[test]
    fn query_command_with_top_k() {
        let cli = Cli::try_parse_from(["rag-app", "query", "What did the cat do?", "--top-k", "3"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Query { question, top_k } = parsed.command {
                assert_eq!(question, "What did the cat do?");
                assert_eq!(top_k, Some(3));
            } else {
                panic!("expected query command");
            }
        }
    }

    #[test]
    fn ask_command_defaults() {
        let cli = Cli::try_parse_from(["rag-app", "ask", "Why?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                timeout, server, ..
            } = parsed.command
            {
                assert_eq!(timeout, 120);
                assert_eq!(server, None);
            } else {
                panic!("expected ask command");
            }
        }
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["rag-app", "count", "--config-dir", "/tmp/rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/rag")));
            assert!(matches!(parsed.command, Commands::Count));
        }
    }

    #[test]
    fn reset_yes_flag() {
        let cli = Cli::try_parse_from(["rag-app", "reset", "--yes"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Reset { yes: true }));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["rag-app", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Config { show: true }));
        }
    }

    #[test]
    fn ingest_requires_path() {
        let cli = Cli::try_parse_from(["rag-app", "ingest"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["rag-app", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["rag-app", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
