//! CLI binary for taxshield.
//!
//! A thin shim over the library crate. Each subcommand is one interaction
//! against a session file that persists between invocations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use taxshield::report::format_currency;
use taxshield::{
    handlers, resolve_provider, write_report, ConfirmOutcome, LlmStubReader, Paywall,
    SessionState, SessionStore, StripeGateway, StubAmounts, TaxShieldConfig,
    TaxShieldError,
};
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # Read the figures off a pay stub
  taxshield scan paystub.jpg

  # Correct a misread figure
  taxshield edit --tips 30000

  # Pay to unlock, then confirm with the id from the redirect URL
  taxshield unlock
  taxshield confirm cs_live_a1b2c3

  # Download the report
  taxshield report -o audit.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY             Google Gemini API key (model auto-discovered)
  OPENAI_API_KEY             OpenAI API key
  EDGEQUAKE_LLM_PROVIDER     Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL            Override model ID
  STRIPE_API_KEY             Stripe secret key (unlock / confirm)
  TAXSHIELD_SESSION          Session file path
  TAXSHIELD_BASE_URL         Where checkout redirects back to
  TAXSHIELD_PRICE_CENTS      Unlock price in cents
"#;

/// Estimate tax-exempt overtime and tip income from a pay stub.
#[derive(Parser, Debug)]
#[command(
    name = "taxshield",
    version,
    about = "Estimate tax-exempt overtime, double-time and tip income from a pay stub",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Session file carrying state between commands.
    #[arg(long, global = true, env = "TAXSHIELD_SESSION", default_value = ".taxshield-session.json")]
    session: PathBuf,

    /// LLM model ID (e.g. gemini-1.5-flash, gpt-4.1-mini).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Google API key, used to discover a Gemini model.
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Stripe secret key.
    #[arg(long, global = true, env = "STRIPE_API_KEY", hide_env_values = true)]
    stripe_api_key: Option<String>,

    /// Stripe API root, for stripe-mock or a proxy.
    #[arg(long, global = true, env = "TAXSHIELD_STRIPE_API_BASE", hide = true)]
    stripe_api_base: Option<String>,

    /// Base URL the checkout redirects back to.
    #[arg(long, global = true, env = "TAXSHIELD_BASE_URL", default_value = "http://localhost:8501")]
    base_url: String,

    /// Unlock price in cents.
    #[arg(long, global = true, env = "TAXSHIELD_PRICE_CENTS", default_value_t = 999)]
    price_cents: u64,

    /// Checkout currency (ISO code).
    #[arg(long, global = true, env = "TAXSHIELD_CURRENCY", default_value = "usd")]
    currency: String,

    /// Seconds between two accepted scans.
    #[arg(long, global = true, env = "TAXSHIELD_COOLDOWN_SECS", default_value_t = 30)]
    cooldown: u64,

    /// Largest accepted upload in bytes.
    #[arg(long, global = true, env = "TAXSHIELD_MAX_UPLOAD_BYTES", default_value_t = taxshield::config::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Model and payment call timeout in seconds.
    #[arg(long, global = true, env = "TAXSHIELD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, global = true, env = "TAXSHIELD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TAXSHIELD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and requested data.
    #[arg(short, long, global = true, env = "TAXSHIELD_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read YTD figures off a pay-stub image (JPEG or PNG).
    Scan {
        image: PathBuf,
    },
    /// Correct the extracted figures before paying.
    Edit {
        #[arg(long)]
        overtime: Option<f64>,
        #[arg(long)]
        doubletime: Option<f64>,
        #[arg(long)]
        tips: Option<f64>,
    },
    /// Show the current figures and payment state.
    Status,
    /// Open a checkout for the current figures.
    Unlock,
    /// Verify a completed checkout.
    Confirm {
        /// The `session_id` from the redirect URL.
        session_id: String,
    },
    /// Write the PDF report (paid sessions only).
    Report {
        #[arg(short, long, default_value = "tax_audit_report.pdf")]
        output: PathBuf,
    },
    /// Start over: forget the stub, payment, and cooldown.
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli).await?;
    let store = SessionStore::new(&cli.session);
    let mut session = store
        .load()
        .with_context(|| format!("Failed to load session {}", cli.session.display()))?;

    match &cli.command {
        Command::Scan { image } => {
            // Upload and cooldown checks run before any provider lookup. The
            // stamp is only saved once the model has actually been called.
            let admitted = handlers::accept_file(&mut session, image, chrono::Utc::now(), &config)
                .await
                .context("Scan rejected")?;
            let provider = resolve_provider(&config)
                .await
                .context("No vision model available")?;
            let reader = LlmStubReader::new(provider, &config);

            let sp = (!cli.quiet).then(|| spinner("Reading pay stub…"));
            let result = handlers::extract(&mut session, &admitted, &reader, &config).await;
            if let Some(sp) = sp {
                sp.finish_and_clear();
            }
            let scan = result.context("Scan rejected")?;

            if let Some(stale) = &scan.voided {
                if let Some(gateway) = gateway(&cli, &config)? {
                    Paywall::new(&gateway, &config).expire_stale(stale).await;
                }
            }
            save(&store, &session)?;

            if let Some(e) = scan.extraction.error {
                eprintln!("{}  {}", red("✘"), dim("Previous figures kept. Try a sharper photo."));
                return Err(TaxShieldError::from(e).into());
            }
            if !cli.quiet {
                eprintln!(
                    "{}  read in {}ms  {}",
                    green("✔"),
                    scan.extraction.duration_ms,
                    dim(&format!(
                        "({} tokens in / {} out)",
                        scan.extraction.input_tokens, scan.extraction.output_tokens
                    )),
                );
            }
            print_status(&session, &config);
        }

        Command::Edit {
            overtime,
            doubletime,
            tips,
        } => {
            let current = session.amounts().unwrap_or_default();
            let amounts = StubAmounts::new(
                overtime.unwrap_or(current.overtime_ytd),
                doubletime.unwrap_or(current.doubletime_ytd),
                tips.unwrap_or(current.tips_ytd),
            );
            match gateway(&cli, &config)? {
                Some(gateway) => Paywall::new(&gateway, &config)
                    .update_amounts(&mut session, amounts)
                    .await
                    .context("Edit refused")?,
                None => {
                    session.set_amounts(amounts).context("Edit refused")?;
                }
            }
            save(&store, &session)?;
            print_status(&session, &config);
        }

        Command::Status => print_status(&session, &config),

        Command::Unlock => {
            let gateway = gateway(&cli, &config)?
                .context("Payments are not configured. Set STRIPE_API_KEY.")?;
            let attempt = Paywall::new(&gateway, &config)
                .initiate(&mut session)
                .await
                .context("Could not start checkout")?;
            save(&store, &session)?;

            let price = format_currency(config.unlock_price_cents as f64 / 100.0);
            eprintln!("{}  Checkout opened for {}", green("✔"), bold(&price));
            match attempt.checkout_url {
                Some(url) => println!("{url}"),
                None => println!("{}", attempt.checkout_session_id),
            }
            if !cli.quiet {
                eprintln!(
                    "   {}",
                    dim("After paying, run: taxshield confirm <session_id from the redirect URL>")
                );
            }
        }

        Command::Confirm { session_id } => {
            let gateway = gateway(&cli, &config)?
                .context("Payments are not configured. Set STRIPE_API_KEY.")?;
            let outcome = Paywall::new(&gateway, &config)
                .confirm(&mut session, session_id)
                .await
                .context("Payment verification failed")?;
            save(&store, &session)?;

            match &outcome {
                ConfirmOutcome::Paid => {
                    eprintln!("{}  Payment verified. Report unlocked.", green("✔"));
                    print_status(&session, &config);
                }
                ConfirmOutcome::NotPaid { status } => {
                    eprintln!("{}  Checkout not paid yet (status: {})", cyan("…"), status);
                }
                ConfirmOutcome::Mismatch => {}
            }
            if let Err(e) = outcome.into_result() {
                if e.is_security_event() {
                    eprintln!(
                        "{}  The payment does not match the figures on screen. Unlock again.",
                        red("⚠ SECURITY")
                    );
                }
                return Err(e.into());
            }
        }

        Command::Report { output } => {
            let bytes = handlers::report(&session, &config.rules).context("Report is locked")?;
            write_report(output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{}  {}  {}",
                    green("✔"),
                    bold(&output.display().to_string()),
                    dim(&format!("({} bytes)", bytes.len()))
                );
            }
        }

        Command::Reset => {
            store.clear().context("Failed to clear session")?;
            if !cli.quiet {
                eprintln!("{}  Session cleared", green("✔"));
            }
        }
    }

    Ok(())
}

/// Map CLI args to `TaxShieldConfig`.
async fn build_config(cli: &Cli) -> Result<TaxShieldConfig> {
    let mut builder = TaxShieldConfig::builder()
        .max_upload_bytes(cli.max_upload_bytes)
        .scan_cooldown_secs(cli.cooldown)
        .public_base_url(&cli.base_url)
        .unlock_price_cents(cli.price_cents)
        .currency(&cli.currency)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref k) = cli.google_api_key {
        builder = builder.google_api_key(k);
    }
    if let Some(ref k) = cli.stripe_api_key {
        builder = builder.stripe_api_key(k);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// The Stripe gateway, when a key is configured.
fn gateway(cli: &Cli, config: &TaxShieldConfig) -> Result<Option<StripeGateway>> {
    let Some(ref key) = config.stripe_api_key else {
        return Ok(None);
    };
    let mut gw = StripeGateway::new(key.as_str(), config.api_timeout_secs)
        .context("Failed to set up Stripe client")?;
    if let Some(ref base) = cli.stripe_api_base {
        gw = gw.with_base_url(base);
    }
    Ok(Some(gw))
}

fn save(store: &SessionStore, session: &SessionState) -> Result<()> {
    store
        .save(session)
        .with_context(|| format!("Failed to save session {}", store.path().display()))
}

fn spinner(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Print the results panel. Exempt amounts and refund appear only once paid.
fn print_status(session: &SessionState, config: &TaxShieldConfig) {
    let view = handlers::status(session, &config.rules);
    let Some(stub) = view.stub else {
        println!("No pay stub scanned yet. Run: taxshield scan <IMAGE>");
        return;
    };

    println!("Employee:         {}", stub.employee_or_unknown());
    println!("Employer:         {}", stub.employer_or_unknown());
    println!("Pay period end:   {}", stub.period_end_or_unknown());
    println!();
    println!("Overtime YTD:     {}", format_currency(stub.amounts.overtime_ytd));
    println!("Double-time YTD:  {}", format_currency(stub.amounts.doubletime_ytd));
    println!("Tips YTD:         {}", format_currency(stub.amounts.tips_ytd));
    println!();

    match view.result {
        Some(r) => {
            println!("Exempt overtime:  {}", format_currency(r.exempt_overtime));
            println!("Exempt double:    {}", format_currency(r.exempt_doubletime));
            println!("Exempt tips:      {}", format_currency(r.exempt_tips));
            println!("Total deductible: {}", bold(&format_currency(r.total_exempt)));
            println!(
                "Refund increase:  {}",
                green(&format_currency(r.refund_estimate))
            );
        }
        None => {
            println!("Payment:          {}", cyan(view.paywall));
            if let Some(url) = view.checkout_url {
                println!("Checkout:         {url}");
            }
            println!("{}", dim("Unlock to see the exempt amounts and refund estimate."));
        }
    }
}
