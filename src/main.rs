use clap::{Parser, Subcommand};
use ratio_cache::query::classify_user_agent;
use ratio_cache::{CacheEngine, EngineConfig, RatioCategory, config, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Config file picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "ratio-cache.toml";

#[derive(Parser)]
#[command(name = "ratio-cache")]
#[command(about = "Aspect-ratio index for wallpaper directories")]
#[command(long_about = "\
Aspect-ratio index for wallpaper directories

Every image under the wallpaper directory is filed into a screen shape and
the index is kept in a SQLite database next to it. Queries for a shape that
has no exact match fall back to the closest images by ratio.

Categories (width / height):

  ultrawide    >= 2.3    3440x1440, 2560x1080
  widescreen   >= 1.7    1920x1080, 2560x1440
  standard     >= 1.2    1024x768, 1280x1024
  portrait     >= 0.5    1080x1920
  square        < 0.5

Classification (first available wins):
  Filename:    a WxH resolution (forest_3440x1440.jpg) or a shape keyword
               (city-ultrawide.png, mobile_9-16.jpg)
  Pixels:      dimensions read from the image header
  Fallback:    widescreen

Run 'ratio-cache gen-config' to generate a documented ratio-cache.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./ratio-cache.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Wallpaper directory, overrides the config file
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Index database, overrides the config file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `ratio_cache=trace` (RUST_LOG wins when set)
    #[arg(long, default_value = "ratio_cache=info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// What screen the caller wants images for.
#[derive(clap::Args, Clone)]
struct Target {
    /// Ratio category: ultrawide, widescreen, standard, portrait, square
    #[arg(conflicts_with_all = ["width", "user_agent"])]
    category: Option<RatioCategory>,

    /// Screen width in pixels
    #[arg(long, requires = "height")]
    width: Option<f64>,

    /// Screen height in pixels
    #[arg(long, requires = "width")]
    height: Option<f64>,

    /// Browser User-Agent string
    #[arg(long, conflicts_with = "width")]
    user_agent: Option<String>,
}

impl Target {
    fn category(&self) -> RatioCategory {
        if let Some(category) = self.category {
            return category;
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            return ratio_cache::query::classify_requested_resolution(width, height);
        }
        match &self.user_agent {
            Some(ua) => classify_user_agent(ua),
            None => RatioCategory::Widescreen,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build or refresh the index and print statistics
    Index,
    /// List indexed images for a category or screen size
    Query(Target),
    /// Print one random image for a category or screen size
    Pick(Target),
    /// Show how many images each category holds
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Drop the index and classify every image again
    Reanalyze,
    /// Remove index entries whose files no longer exist
    Cleanup,
    /// Keep the index up to date until Ctrl-C
    Watch,
    /// Print a stock ratio-cache.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    init_tracing(&cli.log_level);

    let mut engine_config = load_engine_config(&cli)?;
    // One-shot commands index what is on disk now and exit.
    engine_config.watcher.enabled = matches!(cli.command, Command::Watch);
    let root = engine_config.wallpaper_dir.clone();

    let engine = CacheEngine::open(engine_config).await?;
    let result = run(&engine, &cli.command, &root).await;
    engine.shutdown().await?;
    result
}

async fn run(
    engine: &CacheEngine,
    command: &Command,
    root: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Index => {
            output::print_statistics(&engine.get_statistics()?);
        }
        Command::Query(target) => {
            let (category, images) = match (target.width, target.height) {
                (Some(width), Some(height)) => {
                    engine.get_images_for_resolution(width, height).await?
                }
                _ => {
                    let category = target.category();
                    (category, engine.get_images_by_ratio(category).await?)
                }
            };
            output::print_query_results(category, &images, root);
        }
        Command::Pick(target) => {
            let requested = target.category();
            let selection = engine.pick(requested).await?;
            output::print_selection(selection.as_ref(), requested, root);
        }
        Command::Stats { json } => {
            let stats = engine.get_statistics()?;
            if *json {
                println!("{}", output::statistics_json(&stats)?);
            } else {
                output::print_statistics(&stats);
            }
        }
        Command::Reanalyze => {
            let queued = engine.force_reanalyze().await?;
            output::print_reanalyze(queued, &engine.get_statistics()?);
        }
        Command::Cleanup => {
            let removed = engine.cleanup().await?;
            engine.wait_idle().await;
            output::print_cleanup(removed);
        }
        Command::Watch => {
            output::print_statistics(&engine.get_statistics()?);
            println!("Watching {} (Ctrl-C to stop)", root.display());
            tokio::signal::ctrl_c().await?;
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }
    Ok(())
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the config file (explicit, else `./ratio-cache.toml` if it exists,
/// else stock defaults) and apply command-line overrides.
fn load_engine_config(cli: &Cli) -> Result<EngineConfig, config::ConfigError> {
    let path = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let mut engine_config = config::load_config(path.as_deref())?;
    if let Some(dir) = &cli.dir {
        engine_config.wallpaper_dir = dir.clone();
    }
    if let Some(database) = &cli.database {
        engine_config.database = database.clone();
    }
    Ok(engine_config)
}
