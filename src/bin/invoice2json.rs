//! CLI binary for edgequake-invoice.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints results as JSON or a table.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_invoice::{
    write_json, BatchOutput, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback,
    InvoicePipeline, ParseStatus, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Folder progress bar with one log line per image. Handles images
/// completing out of order when `--concurrency > 1`.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    names: Mutex<HashMap<usize, String>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning folder…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn finish_item(&self, index: usize) -> (String, f64) {
        let elapsed = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let name = self
            .names
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .unwrap_or_default();
        (name, elapsed)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting line items from {total} images…"))
        ));
    }

    fn on_item_start(&self, index: usize, _total: usize, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        if let Ok(mut m) = self.names.lock() {
            m.insert(index, filename.to_string());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_item_complete(&self, index: usize, total: usize, record_count: usize) {
        let (name, secs) = self.finish_item(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{record_count:>3} items")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, error: &str) {
        let (name, secs) = self.finish_item(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, successful: usize) {
        let failed = total.saturating_sub(successful);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} images extracted successfully",
                green("✔"),
                bold(&successful.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images extracted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&successful.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One photo, JSON on stdout
  invoice2json receipt.jpg

  # Print a table instead of JSON
  invoice2json --format table receipt.jpg

  # Every image in a folder, written to a file
  invoice2json invoices/ -o results.json

  # Digits-only quantities and prices
  invoice2json --clean-numbers receipt.jpg

  # Image from a URL with a specific model
  invoice2json --provider openai --model gpt-4.1-mini https://example.com/hoa-don.png

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  INVOICE_OCR_*           Every flag below can also be set through its env var
"#;

/// Extract invoice line items from photographs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2json",
    version,
    about = "Extract invoice line items from photos using Vision LLMs",
    long_about = "Extract the item name, quantity, unit price and total of every line on a \
photographed invoice. Accepts an image file, an HTTP/HTTPS URL, or a folder of images.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image file, HTTP/HTTPS URL, or folder of images.
    input: String,

    /// Write JSON to this file (atomically) instead of stdout.
    #[arg(short, long, env = "INVOICE_OCR_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Tile edge length in pixels.
    #[arg(long, env = "INVOICE_OCR_TILE_SIZE", default_value_t = 448)]
    tile_size: u32,

    /// Minimum number of grid tiles.
    #[arg(long, env = "INVOICE_OCR_MIN_TILES", default_value_t = 1)]
    min_tiles: u32,

    /// Maximum number of grid tiles.
    #[arg(long, env = "INVOICE_OCR_MAX_TILES", default_value_t = 3)]
    max_tiles: u32,

    /// Do not append the whole-image thumbnail tile.
    #[arg(long, env = "INVOICE_OCR_NO_THUMBNAIL")]
    no_thumbnail: bool,

    /// Path to a text file with a custom extraction instruction.
    #[arg(long, env = "INVOICE_OCR_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Max LLM output tokens per image.
    #[arg(long, env = "INVOICE_OCR_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE_OCR_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per image on LLM failure.
    #[arg(long, env = "INVOICE_OCR_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Images processed at once when the input is a folder.
    #[arg(short, long, env = "INVOICE_OCR_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Allow overlapping model calls (only for backends that support it).
    #[arg(long, env = "INVOICE_OCR_PARALLEL_INFERENCE")]
    parallel_inference: bool,

    /// Reduce quantity, unit price and total to digits only.
    #[arg(long, env = "INVOICE_OCR_CLEAN_NUMBERS")]
    clean_numbers: bool,

    /// Largest accepted image in MiB.
    #[arg(long, env = "INVOICE_OCR_MAX_INPUT_MB", default_value_t = 16)]
    max_input_mb: u64,

    /// Stdout format: full JSON or a table of line items.
    #[arg(long, env = "INVOICE_OCR_FORMAT", value_enum, default_value = "json")]
    format: FormatArg,

    /// Initialise the model backend before reading the input.
    #[arg(long, env = "INVOICE_OCR_WARMUP")]
    warmup: bool,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE_OCR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_OCR_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "INVOICE_OCR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-image LLM call timeout in seconds.
    #[arg(long, env = "INVOICE_OCR_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Json,
    Table,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let is_folder = Path::new(&cli.input).is_dir();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for folders.
    let show_progress = is_folder && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let pipeline = InvoicePipeline::new(config);

    if cli.warmup {
        pipeline.warm_up().await.context("Backend warm-up failed")?;
    }

    // ── Run extraction ───────────────────────────────────────────────────
    if is_folder {
        let batch = pipeline
            .extract_folder(&cli.input)
            .await
            .context("Folder extraction failed")?;
        emit_batch(&cli, &batch, show_progress).await?;
    } else {
        let output = pipeline
            .extract_input(&cli.input)
            .await
            .context("Extraction failed")?;
        emit_single(&cli, &output).await?;
    }

    Ok(())
}

async fn emit_single(cli: &Cli, output: &ExtractionOutput) -> Result<()> {
    if let Some(ref path) = cli.output {
        write_json(output, path)
            .await
            .context("Failed to write output")?;
    } else if matches!(cli.format, FormatArg::Table) {
        print_stdout(&output.to_markdown_table())?;
    } else {
        print_stdout(&serde_json::to_string_pretty(output).context("Failed to serialise output")?)?;
    }

    if !cli.quiet {
        let ok = !output.records.is_empty();
        eprintln!(
            "{}  {}  {} items  {}  {}ms",
            if ok { green("✔") } else { cyan("⚠") },
            bold(&output.filename),
            output.records.len(),
            dim(&status_label(&output.parse_status)),
            output.stats.total_ms,
        );
        eprintln!(
            "   {} tiles ({}x{} grid)  /  {} tokens in  /  {} tokens out",
            output.stats.tile_count,
            output.stats.cols,
            output.stats.rows,
            dim(&output.stats.input_tokens.to_string()),
            dim(&output.stats.output_tokens.to_string()),
        );
        if let Some(ref path) = cli.output {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
    }
    Ok(())
}

async fn emit_batch(cli: &Cli, batch: &BatchOutput, show_progress: bool) -> Result<()> {
    if let Some(ref path) = cli.output {
        write_json(batch, path)
            .await
            .context("Failed to write output")?;
    } else if matches!(cli.format, FormatArg::Table) {
        let mut text = String::new();
        for item in &batch.results {
            text.push_str(&format!("## {}\n\n", item.filename));
            match (&item.output, &item.error) {
                (Some(out), _) => text.push_str(&out.to_markdown_table()),
                (None, Some(err)) => text.push_str(&format!("_error: {}_\n", err)),
                (None, None) => {}
            }
            text.push('\n');
        }
        print_stdout(&text)?;
    } else {
        print_stdout(&serde_json::to_string_pretty(batch).context("Failed to serialise output")?)?;
    }

    if let Some(line) = batch_summary(cli, batch, show_progress) {
        eprintln!("{line}");
    }
    if !cli.quiet {
        if let Some(ref path) = cli.output {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
    }
    Ok(())
}

/// Closing summary for a batch; the progress callback prints its own when the bar is shown.
fn batch_summary(cli: &Cli, batch: &BatchOutput, show_progress: bool) -> Option<String> {
    if cli.quiet || show_progress {
        return None;
    }
    Some(format!(
        "Extracted {}/{} images ({} failed)",
        batch.summary.successful, batch.summary.total, batch.summary.failed
    ))
}

fn status_label(status: &ParseStatus) -> String {
    match status {
        ParseStatus::Table => "table".into(),
        ParseStatus::Json => "json fallback".into(),
        ParseStatus::NoDataFound => "no data found".into(),
        ParseStatus::Malformed { reason } => format!("malformed: {reason}"),
    }
}

fn print_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .tile_size(cli.tile_size)
        .tile_bounds(cli.min_tiles, cli.max_tiles)
        .use_thumbnail(!cli.no_thumbnail)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .concurrency(cli.concurrency)
        .serialize_inference(!cli.parallel_inference)
        .canonicalize_numbers(cli.clean_numbers)
        .max_input_bytes(cli.max_input_mb.saturating_mul(1024 * 1024))
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
