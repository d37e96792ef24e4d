use clap::{Parser, Subcommand};
use pressroom::{audit, config, output, publish, slug, source};
use std::path::PathBuf;

/// Shared flag for commands that read a storage export.
#[derive(clap::Args, Clone)]
struct SnapshotArgs {
    /// JSON export of the content store: {"articles": [...], "subjects": [...]}
    #[arg(long, default_value = "snapshot.json")]
    snapshot: PathBuf,
}

#[derive(Parser)]
#[command(name = "pressroom")]
#[command(about = "Regenerates a static article site from a content snapshot")]
#[command(long_about = "\
Regenerates a static article site from a content snapshot

Every build renders the whole site from scratch into a new generation and
then swaps it in with one rename, so readers never see a half-written tree.

Output structure:

  dist -> .dist.generations/<generation>/
  ├── index.html                 # Every article, newest first
  ├── style.css
  ├── sitemap.xml                # Root, all articles, all subjects
  ├── rss.xml                    # Public articles only
  ├── articles/
  │   └── hello-world.html       # One page per article
  └── sub/
      └── general.html           # One listing per subject

Logging goes to stderr and is controlled with RUST_LOG (default pressroom=info).

Run 'pressroom gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    /// Output root, overrides config.toml
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Canonical site URL, overrides config.toml
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the site from a snapshot and publish it
    Build(SnapshotArgs),
    /// Audit a snapshot without building
    Check(SnapshotArgs),
    /// Print the slug a title would get
    Slugify {
        /// Title words, joined with spaces
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pressroom=info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Build(args) => {
            let site_config = resolve_site_config(&cli)?;
            let source = source::JsonSnapshotSource::new(&args.snapshot);

            println!(
                "==> Building {} \u{2192} {}",
                source.path().display(),
                site_config.output_root.display()
            );
            let report = publish::Rebuilder::new(&site_config).rebuild_from(&source)?;
            output::print_build_output(&report);
            println!("==> Build complete: {}", report.output_root.display());
        }
        Command::Check(args) => {
            let source = source::JsonSnapshotSource::new(&args.snapshot);
            println!("==> Checking {}", source.path().display());
            let snapshot = source::ContentSource::snapshot(&source)?;
            let issues = audit::audit(&snapshot);
            output::print_check_output(&snapshot, &issues);
            if audit::has_errors(&issues) {
                return Err("snapshot has errors, a build would fail or publish broken pages".into());
            }
            println!("==> Content is valid");
        }
        Command::Slugify { text } => {
            println!("{}", slug::slugify(&text.join(" ")));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `config.toml` from `--config`, with command-line overrides applied and
/// the result validated again.
fn resolve_site_config(cli: &Cli) -> Result<config::SiteConfig, config::ConfigError> {
    let mut site_config = config::load_config(&cli.config)?;
    if let Some(output) = &cli.output {
        site_config.output_root = output.clone();
    }
    if let Some(base_url) = &cli.base_url {
        site_config.base_url = base_url.clone();
    }
    site_config.validate()?;
    Ok(site_config)
}
