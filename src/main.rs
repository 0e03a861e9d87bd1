#![forbid(unsafe_code)]

//! histex — History Extractor.
//!
//! CLI entry point: parses arguments, dispatches subcommands, renders output.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use histex::discovery::{DiscoveryOptions, ScopeLocation, discover};
use histex::error::ExtractError;
use histex::model::Application;
use histex::output::{DEFAULT_OUTPUT_DIR, JsonlWriter, default_output_path};
use histex::pipeline::{Extractor, RunReport};
use histex::report::Summary;

/// History Extractor — recover AI chat conversations from local editor storage.
///
/// Reads Cursor `state.vscdb` databases and Continue session files and writes
/// every conversation found as one JSON object per line.
#[derive(Parser, Debug)]
#[command(
    name = "histex",
    version = long_version(),
    about,
    long_about = None,
)]
struct Cli {
    /// Show per-scope and per-container progress.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show everything including per-field diagnostics.
    #[arg(long, global = true)]
    trace: bool,

    /// Output as JSON for machine consumption.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Storage location flags shared by subcommands.
#[derive(clap::Args, Debug, Clone)]
struct Locations {
    /// Only read one application (cursor, continue).
    #[arg(long)]
    app: Option<String>,

    /// Cursor data directory (overrides CURSOR_HOME).
    #[arg(long)]
    cursor_home: Option<PathBuf>,

    /// Continue home directory (overrides CONTINUE_HOME).
    #[arg(long)]
    continue_home: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Extract every conversation to a JSONL file.
    Extract {
        #[command(flatten)]
        locations: Locations,

        /// Directory for the output file.
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Stream conversations to stdout instead of a file.
        #[arg(long)]
        stdout: bool,
    },

    /// List discovered storage scopes and whether they can be opened.
    Scopes {
        #[command(flatten)]
        locations: Locations,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for (bash, zsh, fish).
        shell: String,
    },
}

/// Build the long version string with embedded build metadata.
///
/// vergen-gix always emits these env vars (uses placeholders when values are
/// unavailable), so `env!()` is safe here.
fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("VERGEN_GIT_SHA"),
        " ",
        env!("VERGEN_BUILD_TIMESTAMP"),
        " ",
        env!("VERGEN_CARGO_TARGET_TRIPLE"),
        ")",
    )
}

/// Initialize the tracing subscriber based on CLI flags.
///
/// Priority: `--trace` > `--verbose` > `RUST_LOG` env var > default (warn).
fn init_tracing(cli: &Cli) {
    let filter = if cli.trace {
        EnvFilter::new("histex=trace")
    } else if cli.verbose {
        EnvFilter::new("histex=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let result = match cli.command {
        Command::Extract {
            ref locations,
            ref output_dir,
            stdout,
        } => cmd_extract(locations, output_dir.clone(), stdout, cli.json),
        Command::Scopes { ref locations } => cmd_scopes(locations, cli.json),
        Command::Completions { ref shell } => cmd_completions(shell),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                let json = serde_json::json!({
                    "ok": false,
                    "error_type": error_type_name(&e),
                    "message": format!("{e}"),
                });
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&json).unwrap_or_default()
                );
            } else {
                eprintln!("{} {e}", "Error:".red().bold());
            }
            ExitCode::FAILURE
        }
    }
}

/// Extract a short error type name for JSON output.
fn error_type_name(e: &anyhow::Error) -> &'static str {
    e.downcast_ref::<ExtractError>()
        .map(ExtractError::kind)
        .unwrap_or("InternalError")
}

fn discovery_options(locations: &Locations) -> anyhow::Result<DiscoveryOptions> {
    let app = match locations.app.as_deref() {
        Some(slug) => Some(Application::from_slug(slug).ok_or_else(|| {
            anyhow::anyhow!("Unknown application '{slug}'. Use: cursor, continue")
        })?),
        None => None,
    };
    Ok(DiscoveryOptions {
        app,
        cursor_home: locations.cursor_home.clone(),
        continue_home: locations.continue_home.clone(),
    })
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_extract(
    locations: &Locations,
    output_dir: PathBuf,
    to_stdout: bool,
    json_mode: bool,
) -> anyhow::Result<()> {
    let scopes = discover(&discovery_options(locations)?);
    if scopes.is_empty() {
        tracing::warn!("no Cursor or Continue storage found");
    }

    let (report, target) = if to_stdout {
        let sink = JsonlWriter::new(std::io::stdout().lock(), "-");
        let (report, _) = Extractor::new(sink).run(&scopes)?;
        (report, None)
    } else {
        let path = default_output_path(&output_dir);
        let sink = JsonlWriter::create(&path)?;
        let (report, _) = Extractor::new(sink).run(&scopes)?;
        (report, Some(path))
    };

    // With --stdout the conversations own stdout, so the summary goes to stderr.
    let mut out: Box<dyn Write> = if to_stdout {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };

    if json_mode {
        let json = serde_json::json!({
            "ok": true,
            "output": target.as_ref().map(|p| p.display().to_string()),
            "summary": report.summary,
            "scopes": report.scopes,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&json)?)?;
    } else {
        render_report(&mut out, &report, target.as_deref())?;
    }
    Ok(())
}

fn render_report(
    out: &mut dyn Write,
    report: &RunReport,
    target: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    for scope in &report.scopes {
        match &scope.unavailable {
            Some(reason) => writeln!(
                out,
                "  {} {} {}",
                "✗".red().bold(),
                scope.scope,
                format!("({reason})").dimmed()
            )?,
            None => writeln!(
                out,
                "  {} {} {}",
                "✓".green().bold(),
                scope.scope,
                format!(
                    "{} conversations, {} skipped",
                    scope.conversations, scope.skipped_containers
                )
                .dimmed()
            )?,
        }
    }
    writeln!(out)?;
    render_summary(out, &report.summary)?;
    if let Some(path) = target {
        writeln!(out)?;
        writeln!(out, "  {} → {}", "Written".dimmed(), path.display())?;
    }
    Ok(())
}

fn render_summary(out: &mut dyn Write, summary: &Summary) -> anyhow::Result<()> {
    writeln!(out, "{}\n", "Extraction Summary".bold())?;
    writeln!(
        out,
        "  {} {}",
        "Conversations:".dimmed(),
        summary.conversations.to_string().cyan()
    )?;
    writeln!(out, "  {} {}", "Messages:".dimmed(), summary.messages)?;
    for (source, count) in &summary.by_source {
        writeln!(out, "    {} {count}", format!("{source}:").dimmed())?;
    }
    for (app, count) in &summary.by_application {
        writeln!(out, "    {} {count}", format!("{app}:").dimmed())?;
    }
    writeln!(
        out,
        "  {} {}",
        "With code context:".dimmed(),
        summary.with_code_context
    )?;
    writeln!(out, "  {} {}", "With diffs:".dimmed(), summary.with_diffs)?;
    writeln!(out, "  {} {}", "With tool use:".dimmed(), summary.with_tool_use)?;
    writeln!(out, "  {} {}", "With reasoning:".dimmed(), summary.with_reasoning)?;
    writeln!(out, "  {} {}", "Complete:".dimmed(), summary.complete)?;
    Ok(())
}

fn cmd_scopes(locations: &Locations, json_mode: bool) -> anyhow::Result<()> {
    let scopes = discover(&discovery_options(locations)?);
    let probed: Vec<(ScopeLocation, Result<usize, ExtractError>)> = scopes
        .into_iter()
        .map(|location| {
            let containers = location
                .open()
                .and_then(|source| source.containers())
                .map(|records| records.len());
            (location, containers)
        })
        .collect();

    if json_mode {
        let json: Vec<serde_json::Value> = probed
            .iter()
            .map(|(location, probe)| {
                serde_json::json!({
                    "label": location.label(),
                    "application": location.application(),
                    "path": location.path().display().to_string(),
                    "available": probe.is_ok(),
                    "containers": probe.as_ref().ok(),
                    "error": probe.as_ref().err().map(ToString::to_string),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if probed.is_empty() {
        println!(
            "No storage scopes found. Set {} or {} to point at a data directory.",
            "--cursor-home".cyan(),
            "--continue-home".cyan()
        );
        return Ok(());
    }

    println!("{} ({} scopes)\n", "Storage Scopes".bold(), probed.len());
    for (location, probe) in &probed {
        match probe {
            Ok(count) => println!(
                "  {} {} {}",
                "✓".green().bold(),
                location.label().cyan(),
                format!("[{count} containers]").dimmed()
            ),
            Err(e) => println!("  {} {} {e}", "✗".red().bold(), location.label().cyan()),
        }
        println!("    {}", location.path().display());
    }
    Ok(())
}

fn cmd_completions(shell: &str) -> anyhow::Result<()> {
    use clap::CommandFactory;
    use clap_complete::{Shell, generate};

    let parsed_shell: Shell = shell
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown shell '{shell}'. Use: bash, zsh, fish"))?;

    let mut cmd = Cli::command();
    generate(parsed_shell, &mut cmd, "histex", &mut std::io::stdout());

    Ok(())
}
