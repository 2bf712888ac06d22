use anyhow::Result;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use coursesync::{
    CanvasClient, Config, CourseSelection, MirrorEngine, MirrorSummary, ResilientApi, Settings,
};

#[derive(Parser)]
#[command(name = "coursesync")]
#[command(about = "Mirror learning-management-system courses into a local directory")]
#[command(version)]
#[command(group(
    ArgGroup::new("selection")
        .required(true)
        .multiple(false)
        .args(["course", "all"]),
))]
struct Cli {
    /// Mirror the course with this name or course code
    #[arg(long)]
    course: Option<String>,

    /// Mirror every course visible to the token
    #[arg(long)]
    all: bool,

    /// Root directory of the local mirror
    #[arg(long)]
    dir: String,

    /// Base URL of the remote service, e.g. https://school.instructure.com
    #[arg(long)]
    url: String,

    /// Access token
    #[arg(long, env = "COURSESYNC_TOKEN", hide_env_values = true)]
    token: String,

    /// Settings file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config)?;
    init_logging(cli.verbose, &settings.logging.level)?;
    info!("Starting coursesync v{}", env!("CARGO_PKG_VERSION"));

    let selection = match cli.course {
        Some(name) => CourseSelection::Named(name),
        None => CourseSelection::All,
    };
    let config = Arc::new(Config::new(
        &cli.url, &cli.token, &cli.dir, selection, &settings,
    )?);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let api = ResilientApi::new(CanvasClient::new(&config)?, &config, cancel.clone());
    let engine = MirrorEngine::new(config.clone(), Arc::new(api), cancel);

    println!("🔄 Mirroring courses into {}", config.target_dir.display());
    let summary = engine.run().await?;
    print_summary(&summary);

    Ok(())
}

/// Initialize logging based on verbosity level and the settings file
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Load settings from specified path or default location
fn load_settings(config_path: Option<PathBuf>) -> Result<Settings> {
    match config_path {
        Some(path) => Settings::load(&path),
        None => Settings::load_or_default(),
    }
}

/// Cancel the run on Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received Ctrl-C, stopping after in-flight work");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

fn print_summary(summary: &MirrorSummary) {
    if summary.cancelled {
        println!("\n⚠️  Mirror cancelled, results are partial");
    } else {
        println!("\n🎉 Mirror Complete!");
    }

    for course in &summary.courses {
        let marker = if course.is_clean() { "✅" } else { "⚠️ " };
        println!("\n{} {} ({})", marker, course.course.name, course.course.id);

        for report in &course.categories {
            match &report.enumeration_error {
                Some(error) => println!("   ❌ {}: not mirrored: {}", report.category, error),
                None => println!(
                    "   📁 {}: 📥 {} fetched, ✅ {} up to date, ⏭️  {} skipped, ❌ {} failed",
                    report.category,
                    report.fetched,
                    report.up_to_date,
                    report.skipped,
                    report.failed
                ),
            }
            for error in &report.errors {
                println!("      ❌ {}", error);
            }
        }
    }

    println!("\n📊 Totals:");
    println!("   📚 Courses: {}", summary.courses.len());
    println!("   📥 Fetched: {}", summary.fetched());
    println!("   ✅ Up to date: {}", summary.up_to_date());
    println!("   ⏭️  Skipped: {}", summary.skipped());
    println!("   ❌ Failed items: {}", summary.failed());
    println!("   ❌ Failed categories: {}", summary.failed_categories());
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());
}
