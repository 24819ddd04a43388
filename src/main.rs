//! Avocado CLI
//!
//! Administrative subcommands over the configured site:
//! - Sync field descriptors from the schema
//! - Precompute the data cache
//! - Bump data versions
//! - Materialize lexicons
//! - Find orphaned descriptors

use anyhow::Context as _;
use avocado::commands::{self, CacheOptions, SyncOptions};
use avocado::config::{generate_default_config, Config};
use avocado::fields::CachedMethod;
use avocado::Site;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "avocado")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Metadata and query layer administration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create field descriptors for models in the schema
    Sync {
        /// app, app.model or app.model.field
        #[arg(required = true)]
        labels: Vec<String>,
        /// Include non-editable fields
        #[arg(long)]
        include_non_editable: bool,
        /// Include primary and foreign keys
        #[arg(long)]
        include_keys: bool,
        /// Overwrite metadata of existing descriptors
        #[arg(long)]
        force: bool,
        #[arg(short, long)]
        quiet: bool,
    },

    /// Precompute cached field data
    Cache {
        labels: Vec<String>,
        /// Drop existing entries first
        #[arg(long)]
        flush: bool,
        /// Methods to cache (default: values,size)
        #[arg(long, value_delimiter = ',')]
        methods: Vec<String>,
    },

    /// Invalidate derived data of fields
    Data {
        labels: Vec<String>,
        /// Increment the data version
        #[arg(long)]
        incr: bool,
    },

    /// Load the distinct values of a field into a lexicon model
    Lexicon {
        /// app.model.field
        field: String,
        /// app.model
        model: String,
    },

    /// Find descriptors that no longer resolve
    Orphaned {
        /// Also unpublish them
        #[arg(long)]
        unpublish: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("avocado={}", config.logging.level)),
    );
    let json = config.logging.format == "json";
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config);
    tracing::debug!("Avocado v{}", env!("CARGO_PKG_VERSION"));

    let site = Site::open(config, &[])?;

    match cli.command {
        Commands::Sync {
            labels,
            include_non_editable,
            include_keys,
            force,
            quiet,
        } => {
            let options = SyncOptions {
                include_non_editable,
                include_keys,
                force,
                quiet,
            };
            let reports = commands::sync(site.database().schema(), site.catalog(), &labels, &options)?;
            if !quiet {
                for report in reports {
                    println!("{}", report);
                }
            }
        }

        Commands::Cache {
            labels,
            flush,
            methods,
        } => {
            let mut options = CacheOptions {
                flush,
                ..Default::default()
            };
            if !methods.is_empty() {
                options.methods = methods
                    .iter()
                    .map(|m| m.trim().parse::<CachedMethod>())
                    .collect::<Result<_, _>>()?;
            }
            let report = commands::cache(&site, &labels, &options)?;
            println!("cached/skipped/errors/total: {}", report);
        }

        Commands::Data { labels, incr } => {
            let updated = commands::data(site.catalog(), &labels, incr)?;
            if incr {
                println!("{} fields have been updated", updated);
            } else {
                println!("Nothing to do.");
            }
        }

        Commands::Lexicon { field, model } => {
            let report = commands::lexicon(site.database(), &field, &model)?;
            let dataset = site.config().storage.dataset_path();
            site.database().dump().save(&dataset)?;
            println!("{} distinct values loaded", report.loaded);
        }

        Commands::Orphaned { unpublish } => {
            let report = commands::orphaned(site.database().schema(), site.catalog(), unpublish)?;
            if !report.unknown_model.is_empty() {
                println!("\nThe following fields have an unknown model:\n");
                for descriptor in &report.unknown_model {
                    println!("\t{} {}", if descriptor.published { "[A]" } else { "   " }, descriptor);
                }
            }
            if !report.unknown_field.is_empty() {
                println!("\nThe following fields have an unknown field:\n");
                for descriptor in &report.unknown_field {
                    println!("\t{} {}", if descriptor.published { "[A]" } else { "   " }, descriptor);
                }
            }
            if report.restored > 0 {
                println!("{} fields resolve again", report.restored);
            }
        }

        // written before the site is opened
        Commands::Config { .. } => {}
    }

    Ok(())
}
