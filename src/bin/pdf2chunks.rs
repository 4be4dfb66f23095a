//! CLI binary for pdf2chunks.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ChunkingConfig` and writes the JSON document.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2chunks::{
    convert, convert_to_file, ChunkingConfig, ConversionProgressCallback, ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
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

/// Terminal progress callback: one bar step per page batch.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the batch currently in flight.
    batch_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` reports the batch count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting page text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            batch_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Chunking");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self) -> f64 {
        self.batch_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_batches: usize) {
        self.activate_bar(total_batches);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Chunking {total_batches} page batches…"))
        ));
    }

    fn on_batch_start(&self, batch_index: usize, _total: usize) {
        if let Ok(mut started) = self.batch_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("batch {batch_index}"));
    }

    fn on_batch_complete(&self, batch_index: usize, total: usize, chunks: usize) {
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            batch_index,
            total,
            dim(&format!("{chunks:>3} chunks")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch_index: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}  {}",
            red("✗"),
            batch_index,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.abandon();
    }

    fn on_conversion_complete(&self, total_batches: usize, chunks_total: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} batches → {} chunks",
            green("✔"),
            bold(&total_batches.to_string()),
            bold(&chunks_total.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Chunk a book, JSON to stdout
  pdf2chunks book.pdf

  # Write the artifact to a file
  pdf2chunks book.pdf --book-id moby_dick -o moby_dick.json

  # Try the first 12 pages only, two pages per LLM call
  pdf2chunks book.pdf --max-pages 12 --pages-per-batch 2

  # Use a specific provider and model
  pdf2chunks --provider openai --model gpt-4.1-mini book.pdf

  # Stay under a free-tier rate limit
  pdf2chunks book.pdf --request-delay-seconds 4 --max-retries 8

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium
  RUST_LOG                Log filter, e.g. pdf2chunks=debug

A .env file in the working directory is loaded before flags are parsed.
"#;

/// Turn a PDF book into chapter-tagged speakable chunks.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2chunks",
    version,
    about = "Turn a PDF book into ordered, chapter-tagged speakable text chunks",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "PDF2CHUNKS_OUTPUT")]
    output: Option<PathBuf>,

    /// Identifier stamped on every chunk.
    #[arg(long, env = "BOOK_ID", default_value = "book_demo_001")]
    book_id: String,

    /// Pages per LLM call.
    #[arg(long, alias = "window-pages", env = "PAGES_PER_BATCH", default_value_t = 3)]
    pages_per_batch: usize,

    /// Only process the first N pages (0 = all).
    #[arg(long, env = "MAX_PAGES")]
    max_pages: Option<usize>,

    /// Target upper bound on words per chunk (a prompt hint, not enforced).
    #[arg(long, env = "MAX_CHUNK_WORDS", default_value_t = 260)]
    max_chunk_words: usize,

    /// LLM model ID (e.g. gemini-2.5-flash-lite, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Seconds to sleep before every LLM request.
    #[arg(long, env = "REQUEST_DELAY_SECONDS", default_value_t = 0.0)]
    request_delay_seconds: f64,

    /// Retries per batch on rate-limit errors.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 6)]
    max_retries: u32,

    /// Max LLM output tokens per batch.
    #[arg(long, env = "PDF2CHUNKS_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Disable the OCR fallback for pages with little native text.
    #[arg(long, env = "PDF2CHUNKS_NO_OCR")]
    no_ocr: bool,

    /// Pages with fewer native words than this are sent to OCR.
    #[arg(long, env = "MIN_TEXT_WORDS_BEFORE_OCR", default_value_t = 25)]
    min_words_before_ocr: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2CHUNKS_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2CHUNKS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDF2CHUNKS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2CHUNKS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2CHUNKS_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar gives all the feedback that matters; keep INFO logs out of it.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let stats = convert_to_file(&cli.input, output_path, &config)
            .await
            .context("Conversion failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {} pages  {} chapters  {} chunks  →  {}",
                green("✔"),
                stats.pages_total,
                stats.chapters_total,
                stats.chunks_total,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let document = convert(&cli.input, &config)
            .await
            .context("Conversion failed")?;

        let json = document
            .to_json_pretty()
            .context("Failed to serialise output")?;
        io::stdout()
            .lock()
            .write_all(json.as_bytes())
            .context("Failed to write to stdout")?;

        if !cli.quiet && !show_progress {
            eprintln!(
                "{} pages  {} chapters  {} chunks  {}",
                document.stats.pages_total,
                document.stats.chapters_total,
                document.stats.chunks_total,
                dim(&format!("\"{}\"", document.title)),
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ChunkingConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ChunkingConfig> {
    let mut builder = ChunkingConfig::builder()
        .book_id(&cli.book_id)
        .pages_per_batch(cli.pages_per_batch)
        .max_chunk_words(cli.max_chunk_words)
        .request_delay_secs(cli.request_delay_seconds)
        .max_retries(cli.max_retries)
        .max_tokens(cli.max_tokens)
        .ocr(!cli.no_ocr)
        .min_words_before_ocr(cli.min_words_before_ocr)
        .download_timeout_secs(cli.download_timeout);

    if let Some(n) = cli.max_pages {
        builder = builder.max_pages(n);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
