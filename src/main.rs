use anyhow::Result;
use clap::Parser;

use photo_relink::cli::Cli;
use photo_relink::logging;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(None) {
        eprintln!("Warning: failed to initialise logging: {e}");
    }

    let config = cli.load_config()?;
    tracing::info!(command = ?cli.command, "photo-relink starting");

    cli.execute(config)
}
