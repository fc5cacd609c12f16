// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use claim_verifier::{
    count_submissions, format_amount, format_timestamp, get_events_for_entity,
    normalize_reference, AppConfig, ClaimDesk, ClaimForm, DashboardSummary,
    MemorySubmissionStore, SqliteSubmissionStore, Submission, SubmissionStore,
    VerificationStatus, ENTITY_REFERENCE,
};

#[derive(Parser)]
#[command(name = "claim-verifier", version, about = "Verify payment claims against a bank statement")]
struct Cli {
    /// Path to a TOML config file (defaults: $CLAIM_VERIFIER_CONFIG, ./config/claims.toml, ./claims.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the submission database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the submission store if it does not exist
    Init,

    /// Submit one payment claim
    Verify {
        /// Payment reference (case-insensitive)
        #[arg(long)]
        reference: String,

        /// Claimed amount, e.g. 299.00
        #[arg(long)]
        amount: String,

        #[arg(long, default_value = "")]
        contact: String,

        #[arg(long, default_value = "")]
        address: String,

        /// Verify against an in-memory log instead of the database
        #[arg(long)]
        ephemeral: bool,
    },

    /// Print the tally and the verified payments table
    Summary,

    /// Print every submission
    Log {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },

    /// Print the audit trail recorded for one reference
    Events {
        /// Payment reference (case-insensitive)
        reference: String,
    },

    /// Interactive terminal dashboard
    Dashboard,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Verified,
    NotFound,
    Fraud,
}

impl From<StatusArg> for VerificationStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Verified => VerificationStatus::Verified,
            StatusArg::NotFound => VerificationStatus::NotFound,
            StatusArg::Fraud => VerificationStatus::Fraud,
        }
    }
}

// Diagnostics go to stderr; command output stays on stdout
fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => AppConfig::load_default().context("Failed to load config")?,
    };
    if let Some(db) = cli.db {
        config.storage.database_path = db;
    }

    match cli.command {
        Command::Init => run_init(&config),
        Command::Verify {
            reference,
            amount,
            contact,
            address,
            ephemeral,
        } => {
            let form = ClaimForm::new(&reference, &amount, &contact, &address);
            if ephemeral {
                run_verify(&config, MemorySubmissionStore::new(), &form)
            } else {
                run_verify(&config, open_store(&config)?, &form)
            }
        }
        Command::Summary => run_summary(&config),
        Command::Log { status } => run_log(&config, status.map(Into::into)),
        Command::Events { reference } => run_events(&config, &reference),
        Command::Dashboard => run_dashboard(&config),
    }
}

fn open_store(config: &AppConfig) -> Result<SqliteSubmissionStore> {
    let path = &config.storage.database_path;
    SqliteSubmissionStore::open(path).with_context(|| format!("Failed to open database {:?}", path))
}

fn run_init(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let count = count_submissions(store.connection())?;

    println!("🗄️  Submission store ready: {:?}", config.storage.database_path);
    println!("✓ {} submissions on record", count);
    Ok(())
}

fn run_verify<S: SubmissionStore>(config: &AppConfig, store: S, form: &ClaimForm) -> Result<()> {
    let mut desk = ClaimDesk::new(config.build_verifier()?, store)?;
    let receipt = desk.submit(form)?;

    println!("{}", receipt.result.message);
    println!(
        "   {} | {} | {}",
        receipt.submission.reference,
        format_amount(receipt.submission.amount, &config.display.currency_symbol),
        receipt.submission.status
    );
    println!();
    print_summary(&receipt.summary, &config.display.currency_symbol);

    Ok(())
}

fn run_summary(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let summary = DashboardSummary::from_submissions(&store.load()?);
    print_summary(&summary, &config.display.currency_symbol);
    Ok(())
}

fn print_summary(summary: &DashboardSummary, symbol: &str) {
    println!("📊 Submissions");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("   Total:     {}", summary.total);
    println!("   Verified:  {}", summary.verified);
    println!("   Not found: {}", summary.not_found);
    println!("   Fraud:     {}", summary.fraud);

    if summary.verified_rows.is_empty() {
        return;
    }

    println!();
    println!("{:<20} {:<20} {:>12}  {}", "Time", "Reference", "Amount", "Contact");
    for row in &summary.verified_rows {
        println!(
            "{:<20} {:<20} {:>12}  {}",
            format_timestamp(&row.timestamp),
            row.reference,
            format_amount(row.amount, symbol),
            row.contact
        );
    }
}

fn run_log(config: &AppConfig, status: Option<VerificationStatus>) -> Result<()> {
    let store = open_store(config)?;
    let submissions: Vec<Submission> = store
        .load()?
        .into_iter()
        .filter(|s| status.map_or(true, |wanted| s.status == wanted))
        .collect();

    for s in &submissions {
        println!(
            "{}  {:<20} {:>12}  {:<9}  {}",
            format_timestamp(&s.timestamp),
            s.reference,
            format_amount(s.amount, &config.display.currency_symbol),
            s.status.as_str(),
            s.contact
        );
    }
    println!("({} submissions)", submissions.len());

    Ok(())
}

fn run_events(config: &AppConfig, reference: &str) -> Result<()> {
    let store = open_store(config)?;
    let normalized = normalize_reference(reference);
    let events = get_events_for_entity(store.connection(), ENTITY_REFERENCE, &normalized)?;

    if events.is_empty() {
        println!("No events recorded for {}", normalized);
        return Ok(());
    }

    for event in &events {
        println!(
            "{}  {:<18} {}  by {}",
            format_timestamp(&event.timestamp),
            event.event_type,
            event.data,
            event.actor
        );
    }
    println!("({} events)", events.len());

    Ok(())
}

#[cfg(feature = "tui")]
fn run_dashboard(config: &AppConfig) -> Result<()> {
    let store = open_store(config)?;
    let submissions = store.load()?;

    let mut app = ui::App::new(submissions, &config.display.currency_symbol);
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_dashboard(_config: &AppConfig) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web form: cargo run --bin claim-server --features server");
    std::process::exit(1);
}
