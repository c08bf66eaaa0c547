use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod pipeline;

use pipeline::BatchConfig;

const USAGE: &str = "Usage: warline <images-dir> [--roster FILE] [--aliases FILE] \
[--presets FILE] [--measurements FILE] [--debug-dir DIR] [--team-size N]";

fn parse_args() -> Result<BatchConfig> {
    let mut images_dir: Option<PathBuf> = None;
    let mut roster_path = PathBuf::from("players.txt");
    let mut alias_path = PathBuf::from("aliases.json");
    let mut presets_path = None;
    let mut measurements_path = None;
    let mut debug_dir = None;
    let mut team_size = 30u32;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--roster" => {
                roster_path = PathBuf::from(args.next().context("--roster needs a file")?);
            }
            "--aliases" => {
                alias_path = PathBuf::from(args.next().context("--aliases needs a file")?);
            }
            "--presets" => {
                presets_path =
                    Some(PathBuf::from(args.next().context("--presets needs a file")?));
            }
            "--measurements" => {
                measurements_path =
                    Some(PathBuf::from(args.next().context("--measurements needs a file")?));
            }
            "--debug-dir" => {
                debug_dir =
                    Some(PathBuf::from(args.next().context("--debug-dir needs a directory")?));
            }
            "--team-size" => {
                let value = args.next().context("--team-size needs a number")?;
                team_size = value
                    .parse()
                    .with_context(|| format!("Invalid team size '{value}'"))?;
            }
            "--help" | "-h" => {
                bail!("{USAGE}");
            }
            _ if arg.starts_with('-') => {
                bail!("Unknown option '{arg}'\n{USAGE}");
            }
            _ if images_dir.is_none() => {
                images_dir = Some(PathBuf::from(arg));
            }
            _ => {
                bail!("Unexpected argument '{arg}'\n{USAGE}");
            }
        }
    }

    let Some(images_dir) = images_dir else {
        bail!("{USAGE}");
    };
    Ok(BatchConfig {
        images_dir,
        roster_path,
        alias_path,
        presets_path,
        measurements_path,
        debug_dir,
        team_size,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_args()?;
    pipeline::run_batch(config).await
}
