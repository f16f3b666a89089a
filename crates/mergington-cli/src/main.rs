mod config;
mod search_cmd;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mergington_core::mcp::{SearchOptions, SearchSort, SortOrder};

use config::{CliOverrides, MergingtonConfig};

#[derive(Parser)]
#[command(name = "mergington", about = "Mergington High extracurricular activities API")]
struct Cli {
    /// Config file path (defaults to ~/.config/mergington/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP API server
    Serve {
        /// Address to bind (overrides MERGINGTON_BIND)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides MERGINGTON_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Directory served under /static (overrides MERGINGTON_STATIC_DIR)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Search GitHub issues through the MCP server
    Search {
        /// GitHub search query (e.g. "repo:octo/demo is:open label:bug")
        query: String,
        /// Sort key: created, updated, comments, reactions (others fall back to created)
        #[arg(long, default_value = "created")]
        sort: String,
        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        order: SortOrder,
        /// Results per page
        #[arg(long, default_value_t = SearchOptions::DEFAULT_PER_PAGE)]
        per_page: u32,
        /// Page number
        #[arg(long)]
        page: Option<u32>,
    },
}

/// Execute the `mergington init` command: write config file.
fn cmd_init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config::config_path);

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::default();
    config::save_config(&path, &cfg)?;

    println!("Config written to {}", path.display());
    println!("  server = {}:{}", cfg.server.bind, cfg.server.port);
    println!("  mcp.local_url = {}", cfg.mcp.local_url);
    println!("  mcp.credential_env = {}", cfg.mcp.credential_env);
    println!();
    println!("Next: run `mergington serve` to start the API.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(cli.config, force)?;
        }
        Commands::Serve {
            bind,
            port,
            static_dir,
        } => {
            let overrides = CliOverrides {
                bind,
                port,
                static_dir,
            };
            let resolved = MergingtonConfig::resolve(&overrides, cli.config.as_deref())?;
            serve_cmd::run_serve(&resolved).await?;
        }
        Commands::Search {
            query,
            sort,
            order,
            per_page,
            page,
        } => {
            let resolved =
                MergingtonConfig::resolve(&CliOverrides::default(), cli.config.as_deref())?;
            let options = SearchOptions {
                sort: SearchSort::parse_lenient(&sort),
                order,
                per_page,
                page,
            };
            search_cmd::run_search(&resolved, &query, &options).await?;
        }
    }

    Ok(())
}
