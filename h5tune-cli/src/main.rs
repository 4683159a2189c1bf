//! CLI for the h5tune rule engine.
//!
//! Provides commands for validating, listing, and dry-running h5tune rule
//! documents without touching a real HDF5 installation.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use h5tune::backend::{Comm, DEFAULT_PLIST, Dataspace, Layout};
use h5tune::codec;
use h5tune::hints::HintMap;
use h5tune::matcher::FileMatchPolicy;
use h5tune::memory::InMemoryBackend;
use h5tune::settings::{ConfigPath, TunerSettings, Verbosity, VerbositySource};
use h5tune::{Parameter, RuleDocument, Tuner};
use tracing_subscriber::EnvFilter;

/// h5tune: rule-driven I/O tuning for HDF5 applications.
#[derive(Parser)]
#[command(name = "h5tune", version, about)]
struct Cli {
    /// Increase verbosity (-v notices, -vv calls, -vvv document, -vvvv settings).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Validate every recognised rule in a document.
    Check {
        /// Path to the rule document.
        config: PathBuf,
    },

    /// List the rules of a document in lookup order.
    Rules {
        /// Path to the rule document.
        config: PathBuf,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the settings a file (and optionally a dataset) would receive.
    Resolve {
        /// Path to the rule document.
        config: PathBuf,

        /// Path of the file being created.
        #[arg(long)]
        file: String,

        /// Dataset to create in the file.
        #[arg(long, requires = "dims")]
        variable: Option<String>,

        /// Dataset extent, e.g. "24,24".
        #[arg(long, requires = "variable")]
        dims: Option<String>,

        /// Maximum dataset extent, e.g. "24,unlimited"; defaults to --dims.
        #[arg(long, requires = "dims")]
        max_dims: Option<String>,

        /// Open the file through the MPI-IO driver.
        #[arg(long)]
        mpio: bool,

        /// Pre-existing MPI-IO hint as key=value; may be repeated.
        #[arg(long = "hint", value_parser = parse_hint, requires = "mpio")]
        hints: Vec<(String, String)>,

        /// How rule file scopes are matched.
        #[arg(long, default_value = "basename")]
        policy: FileMatchPolicy,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for listings.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Arguments of `h5tune resolve`.
struct ResolveArgs {
    file: String,
    variable: Option<String>,
    dims: Option<String>,
    max_dims: Option<String>,
    mpio: bool,
    hints: Vec<(String, String)>,
    policy: FileMatchPolicy,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Check { config } => cmd_check(&config),
        Commands::Rules { config, format } => cmd_rules(&config, &format),
        Commands::Resolve {
            config,
            file,
            variable,
            dims,
            max_dims,
            mpio,
            hints,
            policy,
            format,
        } => cmd_resolve(
            &config,
            ResolveArgs {
                file,
                variable,
                dims,
                max_dims,
                mpio,
                hints,
                policy,
            },
            Verbosity(cli.verbose),
            &format,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Installs the fmt subscriber; `RUST_LOG` overrides the `-v` level.
fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads a rule document, logging what was found.
fn load_document(config: &Path) -> Result<RuleDocument, Box<dyn std::error::Error>> {
    let document = RuleDocument::load(config)?;
    tracing::debug!("loaded {} elements from {}", document.len(), config.display());
    Ok(document)
}

/// Implements `h5tune check <config>`.
fn cmd_check(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let document = load_document(config)?;

    let mut recognised = 0usize;
    let mut invalid = 0usize;

    println!("Document: {}", config.display());
    println!();

    for (i, rule) in document.rules().iter().enumerate() {
        let Ok(parameter) = Parameter::from_str(&rule.parameter) else {
            // containers carry no text of their own
            if !rule.value.is_empty() {
                println!("  [{i}] {}: ignored (unrecognised parameter)", rule.parameter);
            }
            continue;
        };
        recognised += 1;

        match codec::parse(parameter.kind(), &rule.value) {
            Ok(_) => {
                if rule.variable_name.is_some() && !parameter.is_dataset_scoped() {
                    println!(
                        "  [{i}] {parameter}: ok, VariableName has no effect on file parameters"
                    );
                } else {
                    println!("  [{i}] {parameter}: ok");
                }
            }
            Err(e) => {
                invalid += 1;
                println!("  [{i}] {parameter}: INVALID '{}': {e}", rule.value);
            }
        }
    }

    println!();
    println!("Rules: {recognised} recognised, {invalid} invalid");

    if invalid > 0 {
        return Err(format!("{invalid} invalid rule(s) in '{}'", config.display()).into());
    }
    Ok(())
}

/// Implements `h5tune rules <config>`.
fn cmd_rules(config: &Path, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let document = load_document(config)?;
    let rules: Vec<_> = document
        .rules()
        .iter()
        .filter(|rule| Parameter::from_str(&rule.parameter).is_ok())
        .collect();

    match format {
        OutputFormat::Text => {
            println!("{:<18} {:<24} {:<16} VALUE", "PARAMETER", "FILE", "VARIABLE");
            for rule in rules {
                println!(
                    "{:<18} {:<24} {:<16} {}",
                    rule.parameter,
                    rule.file_name.as_deref().unwrap_or("*"),
                    rule.variable_name.as_deref().unwrap_or("*"),
                    rule.value
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
    }

    Ok(())
}

/// Implements `h5tune resolve <config> --file <path>`.
///
/// Runs the shim against the in-memory backend and reports what the real
/// entry points would have received.
fn cmd_resolve(
    config: &Path,
    args: ResolveArgs,
    verbosity: Verbosity,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = TunerSettings::default()
        .with_config_path(ConfigPath::Fixed(config.to_path_buf()))
        .with_verbosity(VerbositySource::Fixed(verbosity))
        .with_policy(args.policy);
    let tuner = Tuner::with_settings(InMemoryBackend::new(), settings);
    let backend = tuner.backend();

    let fapl = if args.mpio {
        let hints: HintMap = args.hints.into_iter().collect();
        let hints = (!hints.is_empty()).then_some(hints);
        backend.mpio_file_access(Comm(0), hints)
    } else {
        DEFAULT_PLIST
    };

    let file = tuner.try_file_create(&args.file, 0, DEFAULT_PLIST, fapl)?;
    let record = backend
        .file(file)
        .ok_or_else(|| format!("file '{}' was not recorded", args.file))?;

    let dataset = match (&args.variable, &args.dims) {
        (Some(variable), Some(dims)) => {
            let dims = parse_dims(dims)?;
            let max_dims = match &args.max_dims {
                Some(max_dims) => parse_max_dims(max_dims)?,
                None => dims.iter().copied().map(Some).collect(),
            };
            if max_dims.len() != dims.len() {
                return Err(format!(
                    "--max-dims has {} axes but --dims has {}",
                    max_dims.len(),
                    dims.len()
                )
                .into());
            }
            let space = backend.insert_dataspace(Dataspace { dims, max_dims });
            let dset = tuner.try_dataset_create1(file, variable, 0, space, DEFAULT_PLIST)?;
            let layout = backend
                .dataset(dset)
                .map(|d| d.layout)
                .ok_or_else(|| format!("dataset '{variable}' was not recorded"))?;
            Some((variable.clone(), layout))
        }
        _ => None,
    };

    match format {
        OutputFormat::Text => {
            println!("File: {}", args.file);
            if record.name != args.file {
                println!("  Forwarded as: {}", record.name);
            }
            println!("  Driver: {:?}", record.access.driver);
            println!("  Sieve buffer size: {}", record.access.sieve_buf_size);
            let (threshold, alignment) = record.access.alignment;
            println!("  Alignment: threshold={threshold}, alignment={alignment}");
            if let Some(hints) = &record.access.hints {
                println!("  Hints: {}", hints.len());
                for (key, value) in hints.iter() {
                    println!("    {key}={value}");
                }
            }
            if let Some((name, layout)) = &dataset {
                println!();
                println!("Dataset: {name}");
                println!("  Layout: {}", format_layout(layout));
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": args.file,
                "forwarded_name": record.name,
                "access": record.access,
                "dataset": dataset.map(|(name, layout)| serde_json::json!({
                    "name": name,
                    "layout": layout,
                })),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Formats a layout the way `h5dump` would describe it.
fn format_layout(layout: &Layout) -> String {
    match layout {
        Layout::Contiguous => "contiguous".to_string(),
        Layout::Chunked(dims) => {
            let dims: Vec<_> = dims.iter().map(u64::to_string).collect();
            format!("chunked {{{}}}", dims.join(", "))
        }
    }
}

/// Parses a comma-separated extent such as "24,24".
fn parse_dims(s: &str) -> Result<Vec<u64>, String> {
    s.split(',')
        .map(|field| {
            field
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid extent '{field}': {e}"))
        })
        .collect()
}

/// Parses a comma-separated maximum extent; `unlimited` marks a growable axis.
fn parse_max_dims(s: &str) -> Result<Vec<Option<u64>>, String> {
    s.split(',')
        .map(|field| match field.trim() {
            "unlimited" | "inf" => Ok(None),
            other => other
                .parse::<u64>()
                .map(Some)
                .map_err(|e| format!("invalid maximum extent '{other}': {e}")),
        })
        .collect()
}

/// Parses a `key=value` hint.
fn parse_hint(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("hint '{s}' is not key=value"))?;
    if key.is_empty() {
        return Err(format!("hint '{s}' has an empty key"));
    }
    Ok((key.to_string(), value.to_string()))
}
