use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "NTFS junction management tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a junction pointing at an existing directory
    Create {
        /// Path of the junction to create
        link: PathBuf,
        /// Directory the junction resolves to
        target: PathBuf,
        /// Replace an existing junction or empty directory at the link path
        #[arg(short, long)]
        overwrite: bool,
    },
    /// Delete a junction (succeeds if it does not exist)
    Delete {
        /// Path of the junction to remove
        link: PathBuf,
    },
    /// Check whether a path is a junction; exit status 0 when it is
    Check {
        path: PathBuf,
    },
    /// Print the target a junction points to
    Target {
        path: PathBuf,
    },
    /// Show junction details
    Info {
        path: PathBuf,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_os = "windows")]
fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    use graft_reparse::{JunctionManager, WindowsReparseChannel};

    let manager = JunctionManager::new(WindowsReparseChannel::new());
    match cli.command {
        Commands::Create {
            link,
            target,
            overwrite,
        } => {
            manager.create(&link, &target, overwrite)?;
            println!("Created junction {} -> {}", link.display(), target.display());
        }
        Commands::Delete { link } => {
            manager.delete(&link)?;
            println!("Deleted junction {}", link.display());
        }
        Commands::Check { path } => {
            return Ok(if manager.exists(&path) {
                println!("{} is a junction", path.display());
                ExitCode::SUCCESS
            } else {
                println!("{} is not a junction", path.display());
                ExitCode::FAILURE
            });
        }
        Commands::Target { path } => {
            println!("{}", manager.get_target(&path)?.display());
        }
        Commands::Info { path, json } => {
            let info = manager.info(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Junction: {}", info.path.display());
                println!("  Target: {}", info.target.display());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(target_os = "windows"))]
fn run(_cli: Cli) -> anyhow::Result<ExitCode> {
    Err(graft_core::JunctionError::PlatformNotSupported(
        "junction management requires Windows and an NTFS volume".to_string(),
    )
    .into())
}
