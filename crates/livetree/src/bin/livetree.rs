//! Keep a live index of one or more directories until Ctrl-C.
//!
//! Without roots, the machine's volume roots are listed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use livetree::{IndexConfig, IndexError, LiveIndex, Result, ScanDepth};

#[derive(Debug, Parser)]
#[command(name = "livetree")]
#[command(about = "Keep a live, watched index of directory trees", long_about = None)]
struct Args {
    /// JSON file with index settings
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Scan depth below each root, a number or "all"
    #[arg(short, long)]
    depth: Option<ScanDepth>,
    /// Directories to index; volume roots are listed when none are given
    roots: Vec<PathBuf>,
}

fn load_config(path: &Path) -> Result<IndexConfig> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|error| IndexError::Config(format!("{}: {error}", path.display())))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(error) = run(args).await {
        log::error!("livetree failed: {}", error);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => IndexConfig::default(),
    };
    if let Some(depth) = args.depth {
        config.scan_depth = depth;
    }

    let index = Arc::new(LiveIndex::new(config)?);

    let scan_index = index.clone();
    let roots = args.roots;
    tokio::task::spawn_blocking(move || {
        if roots.is_empty() {
            let batch = scan_index.scan_volume_roots();
            log::info!(
                "volume roots listed scanned={} failed={}",
                batch.scanned.len(),
                batch.failed.len()
            );
            return;
        }
        for root in roots {
            match scan_index.initial_scan(&root) {
                Ok(tree) => log::info!("indexed root={} nodes={}", root.display(), tree.len()),
                Err(error) => log::warn!("failed to index root={}: {}", root.display(), error),
            }
        }
    })
    .await
    .map_err(|error| IndexError::Io(io::Error::new(io::ErrorKind::Other, error)))?;

    let decay_timer = index.start_decay_timer();
    log::info!("watching nodes={}, press Ctrl+C to stop", index.tree().len());

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    decay_timer.abort();

    tokio::task::spawn_blocking(move || index.shutdown())
        .await
        .map_err(|error| IndexError::Io(io::Error::new(io::ErrorKind::Other, error)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_flags_and_roots() {
        let args =
            Args::try_parse_from(["livetree", "-c", "index.json", "--depth", "all", "/a", "/b"])
                .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("index.json")));
        assert_eq!(args.depth, Some(ScanDepth::Unbounded));
        assert_eq!(args.roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn flags_are_never_taken_as_roots() {
        let help = Args::try_parse_from(["livetree", "--help"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);

        let unknown = Args::try_parse_from(["livetree", "--verbose", "/a"]).unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn rejects_bad_depth() {
        let err = Args::try_parse_from(["livetree", "-d", "deep"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
