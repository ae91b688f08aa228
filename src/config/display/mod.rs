
use console::style;

use super::Config;

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Provider:").bold().yellow());
    eprintln!("  URL: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!(
        "  API Key: {}",
        style(mask_secret(&config.embedding.api_key)).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Language Model:").bold().yellow());
    eprintln!("  URL: {}", style(&config.llm.base_url).cyan());
    eprintln!("  Model: {}", style(&config.llm.model).cyan());
    eprintln!("  Max Tokens: {}", style(config.llm.max_tokens).cyan());
    eprintln!("  Temperature: {}", style(config.llm.temperature).cyan());
    eprintln!("  API Key: {}", style(mask_secret(&config.llm.api_key)).cyan());

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  URI: {}", style(config.vector_store_uri()).cyan());
    eprintln!(
        "  Collection: {}",
        style(&config.vector_store.collection).cyan()
    );
    eprintln!("  Distance: {}", style(config.vector_store.distance).cyan());

    eprintln!();
    eprintln!("{}", style("Chunking:").bold().yellow());
    eprintln!(
        "  Max Chunk Size: {} chars",
        style(config.chunking.max_chunk_size).cyan()
    );
    eprintln!(
        "  Overlap: {} chars",
        style(config.chunking.overlap_size).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Ingestion Limits:").bold().yellow());
    eprintln!(
        "  Throttle: {} runs / {}s",
        style(config.workflow.throttle_limit).cyan(),
        style(config.workflow.throttle_period_seconds).cyan()
    );
    eprintln!(
        "  Per-source Rate Limit: {} runs / {}s",
        style(config.workflow.rate_limit_per_source).cyan(),
        style(config.workflow.rate_limit_period_seconds).cyan()
    );
    eprintln!(
        "  Run Retention: {}s",
        style(config.workflow.run_retention_seconds).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Address: {}", style(config.server.base_url()).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

/// Hide all but the last four characters of a credential
#[inline]
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "(not set)".to_string();
    }

    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
