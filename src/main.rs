use anyhow::Result;
use clap::{Parser, Subcommand};
use reel_shorts::compositor::ClipMode;
use reel_shorts::config::{Config, SegmentConfig};
use reel_shorts::generator::{discover_source, run_generation};
use reel_shorts::init;
use reel_shorts::segmenter;
use reel_shorts::summary::{self, EnhancedSummary};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn source videos into narrated reels
    Run {
        /// Source video URLs
        #[arg(value_name = "URL")]
        urls: Vec<String>,

        /// Add the most viewed recent video from the monitor list
        #[arg(long)]
        discover: bool,

        /// Read the script from the fixture file instead of calling the summary APIs
        #[arg(long)]
        test_fixture: bool,

        /// Background footage mode
        #[arg(long, value_enum)]
        mode: Option<ClipMode>,
    },

    /// Print how an enhanced summary would be split into parts
    Segment {
        #[arg(value_name = "ENHANCED_SUMMARY")]
        path: PathBuf,
    },

    /// Print the best recent video from the monitored channels
    Discover,
}

/// Summarize long videos into a series of narrated vertical reels.
#[derive(Parser, Debug)]
#[command(name = "reel-shorts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,
}

async fn segment_dry_run(cli_config: &Path, path: &Path) -> Result<()> {
    let seg = match Config::read(cli_config).await {
        Ok(cfg) => cfg.segment,
        Err(err) => {
            tracing::warn!("{:#}; using default segment limits", err);
            SegmentConfig::default()
        }
    };
    let enhanced: EnhancedSummary = summary::load_json(path).await?;
    let parts = segmenter::segment(&enhanced.script, seg.limits(), seg.marker_style());

    for part in &parts {
        println!(
            "== Part {} ({} sentences, {} chars) ==",
            part.number,
            part.sentences.len(),
            part.narration_chars()
        );
        for line in part.script() {
            println!("  {}", line);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Segment { path } => segment_dry_run(&cli.config, &path).await,
        Commands::Discover => {
            let cfg = Config::load(&cli.config).await?;
            match discover_source(&cfg).await? {
                Some(url) => println!("Best video URL: {}", url),
                None => println!("No suitable videos found."),
            }
            Ok(())
        }
        Commands::Run {
            mut urls,
            discover,
            test_fixture,
            mode,
        } => {
            let mut cfg = Config::read(&cli.config).await?;
            if test_fixture {
                cfg.features.test_fixture = true;
            }
            if let Some(mode) = mode {
                cfg.render.clip_mode = mode;
            }
            cfg.validate()?;

            init::ensure_directories(&cfg).await?;
            let missing = init::missing_media_tools().await;
            if !missing.is_empty() {
                tracing::warn!("{} not found in PATH; rendering will fail", missing.join(", "));
            }

            if discover {
                match discover_source(&cfg).await? {
                    Some(url) => urls.push(url),
                    None => tracing::warn!("Discovery found no suitable video"),
                }
            }

            let report = run_generation(&cfg, &urls).await?;
            if !report.videos.is_empty() && report.succeeded() == 0 {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
