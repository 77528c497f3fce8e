//! Media period queue simulator (mpq-sim) - Main entry point
//!
//! Loads a TOML timeline description, plays it through the media period
//! queue with a virtual renderer clock and prints what the queue did.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mpq_common::time::format_us;
use mpq_common::{RepeatMode, StaticTimeline};
use mpq_engine::{EngineConfig, PlaybackEvent, Simulator};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mpq-sim
#[derive(Parser, Debug)]
#[command(name = "mpq-sim")]
#[command(about = "Simulate media period queueing and ad insertion over a timeline")]
#[command(version)]
struct Args {
    /// Timeline description (TOML)
    #[arg(short, long)]
    timeline: PathBuf,

    /// Configuration file
    #[arg(short, long, env = "MPQ_CONFIG")]
    config: Option<PathBuf>,

    /// Repeat mode: off, one or all (overrides the config file)
    #[arg(short, long)]
    repeat: Option<RepeatMode>,

    /// Enable shuffle mode (overrides the config file)
    #[arg(short, long)]
    shuffle: bool,

    /// Stop after this many steps (overrides the config file)
    #[arg(long)]
    max_steps: Option<u64>,

    /// Print events as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(repeat_mode) = args.repeat {
        config.playback.repeat_mode = repeat_mode;
    }
    if args.shuffle {
        config.playback.shuffle = true;
    }
    if let Some(max_steps) = args.max_steps {
        config.playback.max_steps = max_steps;
    }

    // Initialize tracing; logs go to stderr so JSON output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_log_filter(&config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Loading timeline from {}", args.timeline.display());
    let timeline = StaticTimeline::load(&args.timeline)
        .with_context(|| format!("Failed to load timeline {}", args.timeline.display()))?;

    let mut simulator =
        Simulator::new(timeline, &config).context("Failed to initialize simulator")?;
    let events = simulator.run();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(events).context("Failed to serialize events")?
        );
    } else {
        for event in events {
            println!("{}", describe(event));
        }
    }

    info!(
        "Simulation finished after {} steps (ended: {})",
        simulator.steps(),
        simulator.is_ended()
    );
    Ok(())
}

/// Filter used when `RUST_LOG` is not set: this binary and both library crates
fn default_log_filter(level: &str) -> String {
    format!("mpq_sim={0},mpq_engine={0},mpq_common={0}", level)
}

fn describe(event: &PlaybackEvent) -> String {
    match event {
        PlaybackEvent::PeriodEnqueued {
            step,
            renderer_offset_us,
            info,
        } => format!(
            "[{:>6}] enqueue  {} (offset {})",
            step,
            info,
            format_us(*renderer_offset_us)
        ),
        PlaybackEvent::ReadingAdvanced { step, id } => format!("[{:>6}] reading  {}", step, id),
        PlaybackEvent::PlayingAdvanced {
            step,
            renderer_position_us,
            id,
        } => format!(
            "[{:>6}] playing  {} at {}",
            step,
            id,
            format_us(*renderer_position_us)
        ),
        PlaybackEvent::Reseek {
            step,
            position_us,
            id,
        } => format!("[{:>6}] reseek   {} at {}", step, id, format_us(*position_us)),
        PlaybackEvent::Stalled {
            step,
            renderer_position_us,
        } => format!(
            "[{:>6}] stalled  at {}",
            step,
            format_us(*renderer_position_us)
        ),
        PlaybackEvent::Ended {
            step,
            renderer_position_us,
        } => format!(
            "[{:>6}] ended    at {}",
            step,
            format_us(*renderer_position_us)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_covers_binary_target() {
        let filter = default_log_filter("debug");
        assert!(filter.split(',').any(|directive| directive == "mpq_sim=debug"));
        assert!(filter.contains("mpq_engine=debug"));
        assert!(filter.contains("mpq_common=debug"));
        assert!(module_path!().starts_with("mpq_sim::"));
    }

    #[test]
    fn test_describe_stalled() {
        let line = describe(&PlaybackEvent::Stalled {
            step: 7,
            renderer_position_us: 23_000_000,
        });
        assert_eq!(line, "[     7] stalled  at 23.000000s");
    }
}
