//! otplc: convert between brat standoff and one-token-per-line annotations.
//!
//! brat stores annotations as character offsets into a text; OTPL files
//! hold one token per line with entity, relation and event tags in
//! columns, the input format of most sequence-labeling trainers. otplc
//! converts in both directions, preserving exact offsets, discontinuous
//! entities, relations and events.
//!
//! # Modules
//!
//! - [`colspec`]: column roles, the variant registry and colspec guessing
//! - [`otpl`]: OTPL reader, writer and association cell grammar
//! - [`brat`]: standoff parser, serializer and `annotation.conf` generation
//! - [`conversion`]: the converter and its reports
//! - [`tagging`]: IO/BIO/BILOU/BIOES tag decoding and encoding
//! - [`model`]: documents, tokens and the annotation index
//! - [`config`]: validated conversion settings
//! - [`error`]: error types for otplc operations
//!
//! # Example
//!
//! ```
//! use otplc::{Configuration, OtplBratConverter};
//!
//! let config = Configuration::builder().colspec("entities").build().unwrap();
//! let converter = OtplBratConverter::new(config);
//! let brat = converter
//!     .otpl_text_to_brat("John\tB-PER\nSmith\tI-PER\narrived\tO\n", None)
//!     .unwrap()
//!     .value;
//! assert_eq!(brat.ann, "T1\tPER 0 10\tJohn Smith\n");
//! ```

pub mod brat;
pub mod colspec;
pub mod config;
pub mod conversion;
pub mod error;
pub mod model;
pub mod otpl;
pub mod tagging;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

pub use colspec::{guess_colspec, ColumnRole, ColumnSpecification};
pub use config::{Configuration, ConfigurationBuilder, Policy};
pub use conversion::{ConversionReport, Converted, OtplBratConverter};
pub use error::{DataFormatError, ErrorKind, OtplcError};
pub use tagging::TaggingScheme;

use brat::AnnotationSchema;

/// Tracing target for batch processing.
pub const TRACING_TARGET_CLI: &str = "otplc::cli";

/// The otplc CLI application.
#[derive(Parser)]
#[command(name = "otplc")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// More log output on stderr (repeat for more).
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Less log output on stderr (repeat for less).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert OTPL files to brat standoff.
    Brat(BratArgs),
    /// Convert brat standoff files to OTPL.
    Otpl(OtplArgs),
    /// Print the guessed colspec of OTPL files.
    Guess(GuessArgs),
}

/// Settings shared by all subcommands; they override `--config`.
#[derive(clap::Args)]
struct SettingsArgs {
    /// YAML configuration file.
    #[arg(long, env = "OTPLC_CONFIG")]
    config: Option<PathBuf>,

    /// Colspec: a registry variant name or a header such as 'TEXT ENTITY_TAG'.
    #[arg(long)]
    colspec: Option<String>,

    /// Tagging scheme of OTPL input ('io', 'bio', 'bilou', 'bioes').
    #[arg(long)]
    scheme: Option<String>,

    /// Tagging scheme of OTPL output (default: --scheme).
    #[arg(long)]
    output_scheme: Option<String>,

    /// Permit writing a coarser tagging scheme than the input uses.
    #[arg(long)]
    allow_lossy: bool,

    /// Abort a document at its first problem (the default).
    #[arg(long)]
    strict: bool,

    /// Skip or repair malformed input and report it as warnings.
    #[arg(long)]
    lenient: bool,

    /// OTPL column separator: 'auto', 'tab', 'whitespace' or a regex.
    #[arg(long)]
    separator: Option<String>,

    /// Ignore OTPL lines matching this regex.
    #[arg(long)]
    filter: Option<String>,

    /// Number of sentences sampled when guessing a colspec.
    #[arg(long)]
    sample: Option<usize>,

    /// Number of worker threads (default: one per CPU).
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(clap::Args)]
struct SuffixArgs {
    /// Suffix of OTPL files.
    #[arg(long, default_value = ".lst")]
    otpl_suffix: String,

    /// Suffix of brat standoff files.
    #[arg(long, default_value = ".ann")]
    ann_suffix: String,

    /// Suffix of brat text files.
    #[arg(long, default_value = ".txt")]
    text_suffix: String,

    /// Suffix of OTPL tokenization files used by 'otpl'.
    #[arg(long, default_value = ".tok")]
    tokens_suffix: String,
}

/// Output format for conversion reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
struct BratArgs {
    /// OTPL files, or directories to search for them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(flatten)]
    suffixes: SuffixArgs,

    /// Write a brat annotation.conf covering all converted documents.
    #[arg(long)]
    brat_config: Option<PathBuf>,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(clap::Args)]
struct OtplArgs {
    /// brat standoff files, or directories to search for them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(flatten)]
    suffixes: SuffixArgs,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(clap::Args)]
struct GuessArgs {
    /// OTPL files, or directories to search for them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,

    /// Suffix of OTPL files in directories.
    #[arg(long, default_value = ".lst")]
    otpl_suffix: String,
}

/// Per-document entry of a JSON report.
#[derive(Serialize)]
struct DocumentSummary<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a ConversionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorSummary>,
}

#[derive(Serialize)]
struct ErrorSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    message: String,
}

impl From<&OtplcError> for ErrorSummary {
    fn from(err: &OtplcError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Run the otplc CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), OtplcError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Brat(args)) => run_brat(args),
        Some(Commands::Otpl(args)) => run_otpl(args),
        Some(Commands::Guess(args)) => run_guess(args),
        None => {
            println!("otplc {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Convert between brat standoff and OTPL annotation files.");
            println!();
            println!("Run 'otplc --help' for usage information.");
            Ok(())
        }
    }
}

/// Logs to stderr; `-v`/`-q` override `RUST_LOG`, which defaults to `warn`.
fn init_tracing(verbose: u8, quiet: u8) {
    let level = match (verbose, quiet) {
        (0, 0) => None,
        (1, _) => Some("info"),
        (2, _) => Some("debug"),
        (v, _) if v > 2 => Some("trace"),
        (_, 1) => Some("error"),
        _ => Some("off"),
    };
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    // a second initialization in the same process keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .try_init();
}

fn build_configuration(settings: &SettingsArgs) -> Result<Configuration, OtplcError> {
    let mut builder = match &settings.config {
        Some(path) => ConfigurationBuilder::from_yaml_str(&read_file(path)?)?,
        None => ConfigurationBuilder::default(),
    };

    if let Some(colspec) = &settings.colspec {
        builder = builder.colspec(colspec);
    }
    if let Some(scheme) = &settings.scheme {
        builder = builder.scheme(scheme);
    }
    if let Some(scheme) = &settings.output_scheme {
        builder = builder.output_scheme(scheme);
    }
    if settings.allow_lossy {
        builder = builder.allow_lossy(true);
    }
    if settings.strict {
        builder = builder.strict(true);
    }
    if settings.lenient {
        builder = builder.lenient(true);
    }
    if let Some(separator) = &settings.separator {
        builder = builder.separator(separator);
    }
    if let Some(filter) = &settings.filter {
        builder = builder.filter(filter);
    }
    if let Some(sample) = settings.sample {
        builder = builder.sample_sentences(sample);
    }

    Ok(builder.build()?)
}

fn read_file(path: &Path) -> Result<String, OtplcError> {
    fs::read_to_string(path).map_err(|source| OtplcError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), OtplcError> {
    fs::write(path, contents).map_err(|source| OtplcError::File {
        path: path.to_path_buf(),
        source,
    })
}

/// The path of `path` with `from` replaced by `to` at the end of its name.
fn sibling(path: &Path, from: &str, to: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(from).unwrap_or(&name);
    path.with_file_name(format!("{}{}", stem, to))
}

/// Expands directories into the files below them that end in `suffix`.
fn collect_inputs(inputs: &[PathBuf], suffix: &str) -> Result<Vec<PathBuf>, OtplcError> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(input)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(suffix))
            .map(|entry| entry.into_path())
            .collect();
        if found.is_empty() {
            return Err(OtplcError::NoInput(input.clone()));
        }
        found.sort();
        files.append(&mut found);
    }
    Ok(files)
}

/// Converts every file on a pool of `jobs` threads, keeping input order.
fn process<T, F>(files: &[PathBuf], jobs: Option<usize>, convert: F) -> Result<Vec<Result<T, OtplcError>>, OtplcError>
where
    T: Send,
    F: Fn(&Path) -> Result<T, OtplcError> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()?;
    tracing::info!(
        target: TRACING_TARGET_CLI,
        files = files.len(),
        threads = pool.current_num_threads(),
        "converting"
    );
    Ok(pool.install(|| files.par_iter().map(|path| convert(path.as_path())).collect()))
}

/// Prints one report per document and fails if any document failed.
fn finish(
    files: &[PathBuf],
    outcomes: &[Result<ConversionReport, OtplcError>],
    format: ReportFormat,
) -> Result<(), OtplcError> {
    match format {
        ReportFormat::Json => {
            let summaries: Vec<DocumentSummary<'_>> = files
                .iter()
                .zip(outcomes)
                .map(|(path, outcome)| DocumentSummary {
                    path,
                    report: outcome.as_ref().ok(),
                    error: outcome.as_ref().err().map(ErrorSummary::from),
                })
                .collect();
            let json = serde_json::to_string_pretty(&summaries).map_err(OtplcError::ReportWrite)?;
            println!("{}", json);
        }
        ReportFormat::Text => {
            for (path, outcome) in files.iter().zip(outcomes) {
                match outcome {
                    Ok(report) => {
                        println!("{}: {} -> {}", path.display(), report.from, report.to);
                        print!("{}", report);
                    }
                    Err(err) => eprintln!("{}: {}", path.display(), err),
                }
            }
        }
    }

    batch_result(outcomes)
}

fn batch_result<T>(outcomes: &[Result<T, OtplcError>]) -> Result<(), OtplcError> {
    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    if failed > 0 {
        Err(OtplcError::BatchFailed {
            failed,
            total: outcomes.len(),
        })
    } else {
        Ok(())
    }
}

fn log_failures<T>(files: &[PathBuf], outcomes: &[Result<T, OtplcError>]) {
    for (path, outcome) in files.iter().zip(outcomes) {
        if let Err(err) = outcome {
            tracing::error!(target: TRACING_TARGET_CLI, path = %path.display(), "{}", err);
        }
    }
}

fn document_error(path: &Path) -> impl Fn(DataFormatError) -> OtplcError + '_ {
    move |source| OtplcError::Document {
        path: path.to_path_buf(),
        source,
    }
}

/// Execute the brat subcommand: `<stem>.lst` to `<stem>.ann`.
fn run_brat(args: BratArgs) -> Result<(), OtplcError> {
    let converter = OtplBratConverter::new(build_configuration(&args.settings)?);
    let suffixes = &args.suffixes;
    let files = collect_inputs(&args.inputs, &suffixes.otpl_suffix)?;
    let want_schema = args.brat_config.is_some();

    let outcomes = process(&files, args.settings.jobs, |path| {
        let otpl = read_file(path)?;
        let text_path = sibling(path, &suffixes.otpl_suffix, &suffixes.text_suffix);
        let text = if text_path.is_file() {
            Some(read_file(&text_path)?)
        } else {
            None
        };

        let converted = converter
            .otpl_text_to_brat(&otpl, text.as_deref())
            .map_err(document_error(path))?;
        write_file(
            &sibling(path, &suffixes.otpl_suffix, &suffixes.ann_suffix),
            &converted.value.ann,
        )?;
        if text.is_none() {
            write_file(&text_path, &converted.value.text)?;
        }

        let mut schema = AnnotationSchema::new();
        if want_schema {
            let parsed = brat::parse(&converted.value.ann, Policy::Strict).map_err(document_error(path))?;
            schema.observe(&parsed.annotations);
        }
        Ok((converted.report, schema))
    })?;
    log_failures(&files, &outcomes);

    let mut schema = AnnotationSchema::new();
    let reports: Vec<Result<ConversionReport, OtplcError>> = outcomes
        .into_iter()
        .map(|outcome| {
            outcome.map(|(report, observed)| {
                schema.merge(observed);
                report
            })
        })
        .collect();
    if let Some(path) = &args.brat_config {
        write_file(path, &schema.to_string())?;
    }

    finish(&files, &reports, args.report)
}

/// Execute the otpl subcommand: `<stem>.ann`, `<stem>.txt` and
/// `<stem>.tok` to `<stem>.lst`.
fn run_otpl(args: OtplArgs) -> Result<(), OtplcError> {
    let converter = OtplBratConverter::new(build_configuration(&args.settings)?);
    let suffixes = &args.suffixes;
    let files = collect_inputs(&args.inputs, &suffixes.ann_suffix)?;

    let outcomes = process(&files, args.settings.jobs, |path| {
        let ann = read_file(path)?;
        let text = read_file(&sibling(path, &suffixes.ann_suffix, &suffixes.text_suffix))?;
        let tokens = read_file(&sibling(path, &suffixes.ann_suffix, &suffixes.tokens_suffix))?;

        let converted = converter
            .brat_text_to_otpl(&ann, &text, &tokens)
            .map_err(document_error(path))?;
        write_file(
            &sibling(path, &suffixes.ann_suffix, &suffixes.otpl_suffix),
            &converted.value,
        )?;
        Ok(converted.report)
    })?;
    log_failures(&files, &outcomes);

    finish(&files, &outcomes, args.report)
}

/// Execute the guess subcommand.
fn run_guess(args: GuessArgs) -> Result<(), OtplcError> {
    let config = build_configuration(&args.settings)?;
    let files = collect_inputs(&args.inputs, &args.otpl_suffix)?;

    let outcomes = process(&files, args.settings.jobs, |path| {
        let otpl = read_file(path)?;
        guess_colspec(&otpl, &config).map_err(document_error(path))
    })?;
    log_failures(&files, &outcomes);

    for (path, outcome) in files.iter().zip(&outcomes) {
        match outcome {
            Ok(guess) => match guess.variant {
                Some(variant) => println!("{}\t{}\t({})", path.display(), guess.colspec, variant),
                None => println!("{}\t{}", path.display(), guess.colspec),
            },
            Err(err) => eprintln!("{}: {}", path.display(), err),
        }
    }

    batch_result(&outcomes)
}
