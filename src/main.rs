use clap::Parser;
use coursepay::application::engine::{EnrollmentEngine, WorkflowDeps};
use coursepay::config::{
    DEFAULT_SMTP_PORT, DEFAULT_UTC_OFFSET_HOURS, SmtpConfig, WorkflowConfig, utc_offset_hours,
};
use coursepay::domain::payment::PaymentStatus;
use coursepay::domain::ports::{LedgerStore, SharedChat, SharedLedger, SharedMailer};
use coursepay::infrastructure::in_memory::InMemoryLedger;
use coursepay::infrastructure::mailer::{LogMailer, OutboxMailer};
#[cfg(feature = "storage-rocksdb")]
use coursepay::infrastructure::rocksdb::RocksDbLedger;
use coursepay::infrastructure::smtp::SmtpMailer;
use coursepay::infrastructure::webhook::WebhookChatNotifier;
use coursepay::interfaces::catalog::Catalog;
use coursepay::interfaces::csv::{CommandReader, LedgerWriter};
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// JSON file with the users and courses to load before processing.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Incoming-webhook URL for admin chat messages.
    #[arg(long, env = "COURSEPAY_CHAT_WEBHOOK_URL")]
    chat_webhook_url: Option<String>,

    /// Write outgoing emails as HTML files here instead of sending them.
    #[arg(long, conflicts_with = "smtp_server")]
    outbox_dir: Option<PathBuf>,

    /// SMTP relay host. Without it (and without an outbox) emails are only logged.
    #[arg(long, env = "COURSEPAY_SMTP_SERVER")]
    smtp_server: Option<String>,

    #[arg(long, env = "COURSEPAY_SMTP_PORT", default_value_t = DEFAULT_SMTP_PORT)]
    smtp_port: u16,

    #[arg(long, env = "COURSEPAY_SMTP_USER")]
    smtp_user: Option<String>,

    #[arg(long, env = "COURSEPAY_SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,

    /// Sender mailbox for outgoing emails.
    #[arg(long, env = "COURSEPAY_SMTP_FROM", requires = "smtp_server")]
    smtp_from: Option<String>,

    #[arg(long, default_value_t = 5)]
    notify_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    transaction_timeout_secs: u64,

    /// Offset used for timestamps in emails.
    #[arg(long, default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_hyphen_values = true)]
    utc_offset_hours: i32,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn open_ledger(db_path: Option<PathBuf>) -> Result<SharedLedger> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            info!(path = %path.display(), "opening RocksDB ledger");
            let store = RocksDbLedger::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => {
            tracing::warn!(
                path = %path.display(),
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Arc::new(InMemoryLedger::new()))
        }
        None => Ok(Arc::new(InMemoryLedger::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let utc_offset = utc_offset_hours(cli.utc_offset_hours)
        .ok_or_else(|| miette!("UTC offset out of range: {} hours", cli.utc_offset_hours))?;
    let config = WorkflowConfig {
        transaction_timeout: Duration::from_secs(cli.transaction_timeout_secs),
        notify_timeout: Duration::from_secs(cli.notify_timeout_secs),
        utc_offset,
        ..WorkflowConfig::default()
    };

    let ledger = open_ledger(cli.db_path)?;
    if let Some(path) = cli.catalog {
        let file = File::open(path).into_diagnostic()?;
        Catalog::from_reader(file)
            .into_diagnostic()?
            .seed(&ledger)
            .await
            .into_diagnostic()?;
    }

    let mailer: SharedMailer = match (cli.outbox_dir, cli.smtp_server) {
        (Some(dir), _) => {
            std::fs::create_dir_all(&dir).into_diagnostic()?;
            Arc::new(OutboxMailer::new(dir))
        }
        (None, Some(server)) => {
            let from = cli
                .smtp_from
                .ok_or_else(|| miette!("--smtp-from is required with --smtp-server"))?;
            info!(server = %server, port = cli.smtp_port, "sending emails over SMTP");
            Arc::new(
                SmtpMailer::new(SmtpConfig {
                    server,
                    port: cli.smtp_port,
                    user: cli.smtp_user,
                    password: cli.smtp_password,
                    from,
                })
                .into_diagnostic()?,
            )
        }
        (None, None) => Arc::new(LogMailer),
    };
    let webhook = WebhookChatNotifier::new(cli.chat_webhook_url).into_diagnostic()?;
    if !webhook.is_enabled() {
        info!("no chat webhook configured, admin messages are skipped");
    }
    let chat: SharedChat = Arc::new(webhook);

    let engine = EnrollmentEngine::new(WorkflowDeps {
        ledger: ledger.clone(),
        mailer,
        chat,
        config,
    });

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (row, command) in reader.commands().enumerate() {
        match command {
            Ok(command) => match engine.process(command).await {
                Ok(outcome) => debug!(row, ?outcome, "command processed"),
                Err(e) => error!(row, error = %e, "Error processing command"),
            },
            Err(e) => error!(row, error = %e, "Error reading command"),
        }
    }

    let stats = engine.shutdown().await;
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        dropped = stats.dropped,
        "notifications flushed"
    );

    // Output final state
    let payments = ledger
        .payments(&PaymentStatus::ALL, usize::MAX, 0)
        .await
        .into_diagnostic()?;
    let enrollments = ledger.enrollments().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = LedgerWriter::new(stdout.lock());
    writer.write_ledger(payments, enrollments).into_diagnostic()?;

    Ok(())
}
