use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use kitsu_cli::{commands, SyncFlags};
use kitsu_config::{load_config, Config};
use kitsu_pipeline::SanitizeOptions;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about = "Mirror and tidy a subtitle catalog")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Settings file to use instead of the default locations
    #[arg(short, long, global = true, env = "KITSU_CONFIG")]
    config: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download new and changed subtitles into the destination
    Sync {
        #[arg(long, help = "Revisit the whole catalog, ignoring skip_older")]
        full: bool,
        #[arg(long, help = "Use the JSON API instead of the HTML listings")]
        api: bool,
        #[arg(long, help = "Visit directories even if their timestamp is unchanged")]
        ignore_dir_mod_times: bool,
        #[arg(long, value_delimiter = ',', help = "Comma separated extensions to accept")]
        accept_file_types: Option<Vec<String>>,
    },
    /// Fix names, merge duplicates and orphans, move directories into place
    Sanitize {
        #[arg(long, help = "Also remove directories without content files")]
        empty: bool,
        #[arg(long, help = "Also delete every trash sub-directory")]
        trash: bool,
    },
    /// Write the catalog index
    Build,
    #[command(name = "extract-archives")]
    ExtractArchives,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Mark files as handled so sync leaves them alone
    Ignore {
        #[command(subcommand)]
        command: IgnoreCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a settings file with the defaults
    Create,
    /// Print the settings file in use
    Locate,
    /// Print the effective settings
    Show,
}

#[derive(Subcommand)]
enum IgnoreCommands {
    Add {
        paths: Vec<Utf8PathBuf>,
        #[arg(long, help = "Glob relative to the destination")]
        pattern: Option<String>,
    },
    #[command(name = "add-all")]
    AddAll,
}

fn settings(explicit: Option<&Utf8Path>) -> anyhow::Result<Config> {
    let (_, config) = load_config(explicit)?;
    Ok(config)
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let explicit = cli.config.as_deref();
    match cli.command {
        Commands::Sync {
            full,
            api,
            ignore_dir_mod_times,
            accept_file_types,
        } => {
            let flags = SyncFlags {
                full,
                api,
                ignore_dir_mod_times,
                accept_file_types,
            };
            commands::cmd_sync(&settings(explicit)?, &flags).await?;
        }
        Commands::Sanitize { empty, trash } => {
            let opts = SanitizeOptions {
                remove_empty: empty,
                remove_trash: trash,
            };
            commands::cmd_sanitize(&settings(explicit)?, opts)?;
        }
        Commands::Build => {
            commands::cmd_build(&settings(explicit)?)?;
        }
        Commands::ExtractArchives => {
            commands::cmd_extract_archives(&settings(explicit)?)?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Create => {
                commands::cmd_config_create(explicit)?;
            }
            ConfigCommands::Locate => {
                commands::cmd_config_locate(explicit)?;
            }
            ConfigCommands::Show => {
                commands::cmd_config_show(explicit)?;
            }
        },
        Commands::Ignore { command } => match command {
            IgnoreCommands::Add { paths, pattern } => {
                if paths.is_empty() && pattern.is_none() {
                    anyhow::bail!("nothing to ignore: pass file paths or --pattern");
                }
                commands::cmd_ignore_add(&settings(explicit)?, &paths, pattern.as_deref())?;
            }
            IgnoreCommands::AddAll => {
                commands::cmd_ignore_add_all(&settings(explicit)?)?;
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    tokio::select! {
        result = dispatch(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("aborted");
            Ok(())
        }
    }
}
