use clap::{Parser, Subcommand};
use img_rewrite::config::{self, RewriteConfig};
use img_rewrite::imaging::{Quality, RustCodec};
use img_rewrite::markup::PageManifest;
use img_rewrite::output;
use img_rewrite::rewrite::{RewriteSettings, Rewriter};
use img_rewrite::storage::FsStorage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "img-rewrite")]
#[command(about = "Publish and rewrite local image references in generated pages")]
#[command(long_about = "\
Publish and rewrite local image references in generated pages

Pages are read from a JSON manifest of markup trees. Every image reference
found in image attributes (img src, video poster, icon links, ...) and in
image-bearing style properties is resolved under the source directory,
transformed as requested, written under a content-addressed name, and
rewritten to point at the published file.

Reference syntax:

  sample-photo                       bare name, found anywhere under source
  photos/cat.jpg                     path relative to source
  hero?w=800                         width (height follows the aspect ratio)
  hero?w=800&h=400                   exact size
  hero?crop=250,0,500,667,w=200      crop (x1,y1,x2,y2) then resize
  paper?grayscale&blur=3             grayscale, Gaussian blur
  url(\"texture?w=64\")                inside style values

Published files are never regenerated: a second run over an unchanged
source tree writes nothing.

Run 'img-rewrite gen-config' to generate a documented img-rewrite.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing file = stock defaults)
    #[arg(long, default_value = config::CONFIG_FILENAME, global = true)]
    config: PathBuf,

    /// Directory searched for referenced images (overrides config)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Published output root (overrides config)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Log progress details (same as RUST_LOG=info)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish referenced images and rewrite the page manifest
    Rewrite {
        /// Page manifest to read
        #[arg(long)]
        pages: PathBuf,
        /// Where to write the rewritten manifest (default: <output>/<pages file name>)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Resolve every reference without writing anything
    Check {
        /// Page manifest to read
        #[arg(long)]
        pages: PathBuf,
    },
    /// Print a stock img-rewrite.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --verbose enables INFO level, otherwise use RUST_LOG
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Rewrite { ref pages, ref out } => {
            let config = load_config(&cli)?;
            init_thread_pool(&config.processing);
            let mut manifest = PageManifest::load(pages)?;

            let codec = RustCodec::new(Quality::new(config.images.quality));
            let storage = FsStorage::new();
            let rewriter = Rewriter::new(&codec, &storage, RewriteSettings::from_config(&config));

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_rewrite_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = rewriter.rewrite_pages(&mut manifest.pages, Some(&tx));
            drop(tx);
            printer
                .join()
                .map_err(|_| "progress printer thread panicked")?;
            let summary = result?;

            let out = out
                .clone()
                .unwrap_or_else(|| default_manifest_out(&config, pages));
            manifest.save(&out)?;
            output::print_summary(&summary);
            println!("Pages: {}", out.display());
        }
        Command::Check { ref pages } => {
            let config = load_config(&cli)?;
            init_thread_pool(&config.processing);
            let manifest = PageManifest::load(pages)?;

            let codec = RustCodec::default();
            let storage = FsStorage::new();
            let rewriter = Rewriter::new(&codec, &storage, RewriteSettings::from_config(&config));

            println!("==> Checking {}", pages.display());
            let report = rewriter.check_pages(&manifest.pages);
            output::print_check_report(&report);
            if !report.is_clean() {
                return Err(format!("{} unresolved or invalid references", report.problems.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<RewriteConfig, config::ConfigError> {
    let mut config = config::load_config(&cli.config)?;
    if let Some(source) = &cli.source {
        config.source = source.display().to_string();
    }
    if let Some(output) = &cli.output {
        config.output = output.display().to_string();
    }
    Ok(config)
}

/// The rewritten manifest lands in the output root under the input's name.
fn default_manifest_out(config: &RewriteConfig, pages: &Path) -> PathBuf {
    let name = pages
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pages.json"));
    Path::new(&config.output).join(name)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
