use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use astro_build_pages::bundle::execute_plan;
use astro_build_pages::{FsResolver, Handled, OutputMode, PageRegistry, PagesConfig, PagesPlugin};

/// Build manifest handed over by the discovery layer.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuildManifest {
    #[serde(default)]
    config: PagesConfig,
    #[serde(default)]
    pages: PageRegistry,
}

/// Inspect and emit the virtual page entries of a build.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Build manifest (JSON). Reads stdin when omitted or `-`.
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Project root used to resolve page module specifiers
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Override the configured output mode
    #[arg(short, long, value_enum)]
    output: Option<OutputArg>,

    /// Override whether middleware is composed into page modules
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    middleware: Option<bool>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the contributed entry ids as a JSON array
    Entries,
    /// Print the synthesized source of one page module
    Load {
        /// Virtual id, importable (`@astro-page:/blog`) or internal
        id: String,
    },
    /// Synthesize every entry and write the modules plus a manifest
    Emit {
        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputArg {
    Static,
    Server,
}

impl From<OutputArg> for OutputMode {
    fn from(value: OutputArg) -> Self {
        match value {
            OutputArg::Static => OutputMode::Static,
            OutputArg::Server => OutputMode::Server,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("astro_build_pages=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[astro-build-pages] {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let manifest = read_manifest(cli.manifest.as_ref()).await?;

    let mut config = manifest.config;
    if let Some(output) = cli.output {
        config.output = output.into();
    }
    if let Some(middleware) = cli.middleware {
        config.middleware = middleware;
    }

    let plugin = PagesPlugin::new(manifest.pages, config, FsResolver::new(&cli.root))
        .context("invalid pages config")?;

    match cli.command {
        Command::Entries => {
            let entries = plugin.contribute_entries()?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Load { id } => {
            let internal = plugin
                .resolve_virtual_id(&id)
                .map(|resolved| resolved.as_str().to_string())
                .unwrap_or(id);
            match plugin.load_virtual_module(&internal).await? {
                Handled::Found(module) => println!("{module}"),
                Handled::NotMine => {
                    eprintln!("[astro-build-pages] no page module for '{}'", internal.escape_default());
                    return Ok(ExitCode::from(2));
                }
            }
        }
        Command::Emit { out_dir } => {
            let report = execute_plan(&plugin).await?;
            for diagnostic in &report.diagnostics {
                eprintln!("[astro-build-pages] {:?}: {}", diagnostic.level, diagnostic.message);
            }
            report
                .write_to_disk(&out_dir)
                .await
                .with_context(|| format!("failed to write '{}'", out_dir.display()))?;
            if !report.is_complete() {
                return Ok(ExitCode::from(2));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn read_manifest(path: Option<&PathBuf>) -> anyhow::Result<BuildManifest> {
    let payload = match path {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read manifest '{}'", path.display()))?,
        _ => {
            let mut payload = String::new();
            tokio::io::stdin()
                .read_to_string(&mut payload)
                .await
                .context("failed to read stdin")?;
            payload
        }
    };

    if payload.trim().is_empty() {
        bail!("manifest is empty");
    }

    serde_json::from_str(&payload).context("invalid manifest JSON")
}
