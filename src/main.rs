//! CLI entry point for `mailquery`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use mailquery::config::Config;
use mailquery::filter::parse_cutoff;
use mailquery::model::Message;
use mailquery::query::Query;
use mailquery::reduce::{CountReducer, EmailStatistics};
use mailquery::source::MboxSource;
use mailquery::storage::{
    AttachmentStore, CsvStorage, MaildirStorage, MboxStorage, SqliteStorage, StorageBackend,
};

#[derive(Parser)]
#[command(name = "mailquery", version, about = "Filter, reduce and export messages from MBOX archives")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List matching messages
    List {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Count matching messages
    Count {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Show statistics over matching messages
    Stats {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Print the filter chain and the queries a mail server would receive
    Plan {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Store matching messages locally
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(short, long, value_enum, default_value = "mbox")]
        format: ExportFormat,
        #[arg(short, long)]
        output: PathBuf,
        /// Directory for extracted attachment files
        #[arg(long, value_name = "DIR")]
        attachments: Option<PathBuf>,
        /// Add a word_count attribute to every message
        #[arg(long)]
        word_count: bool,
        /// Maildir only: one folder per sender domain
        #[arg(long)]
        by_domain: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Mbox,
    Maildir,
    Csv,
    Sqlite,
}

#[derive(Args)]
struct FilterArgs {
    /// MBOX file to query
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Sender contains (repeat for alternatives)
    #[arg(long, value_name = "TEXT")]
    from: Vec<String>,
    /// To/Cc/Bcc contains
    #[arg(long, value_name = "TEXT")]
    to: Vec<String>,
    /// Any address header contains
    #[arg(long, value_name = "TEXT")]
    involves: Vec<String>,
    #[arg(long, value_name = "TEXT")]
    subject: Vec<String>,
    #[arg(long, value_name = "TEXT")]
    body: Vec<String>,
    /// Sent before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    before: Option<String>,
    /// Sent after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    after: Option<String>,
    #[arg(long, value_name = "DAYS")]
    older_than: Option<u32>,
    #[arg(long, value_name = "DAYS")]
    younger_than: Option<u32>,
    /// Stop after this many matches
    #[arg(long)]
    limit: Option<usize>,
}

impl FilterArgs {
    /// Build the query. Extra filters from `extend` run before the limit.
    fn build(
        &self,
        config: &Config,
        verbose: bool,
        extend: impl FnOnce(Query) -> Query,
    ) -> anyhow::Result<Query> {
        if !self.file.exists() {
            anyhow::bail!("File not found: {}", self.file.display());
        }
        let source = MboxSource::new(&self.file)
            .with_fetch_limit(config.source.fetch_limit)
            .allow_delete(config.source.allow_delete);
        let mut query = Query::new(source);
        query.set_verbose(verbose || config.general.verbose);

        if !self.from.is_empty() {
            query = query.from(self.from.clone());
        }
        if !self.to.is_empty() {
            query = query.to(self.to.clone());
        }
        if !self.involves.is_empty() {
            query = query.involves(self.involves.clone());
        }
        if let Some(date) = &self.before {
            query = query.before(parse_cutoff(date).context("--before")?);
        }
        if let Some(date) = &self.after {
            query = query.after(parse_cutoff(date).context("--after")?);
        }
        if let Some(days) = self.older_than {
            query = query.older_than(days);
        }
        if let Some(days) = self.younger_than {
            query = query.younger_than(days);
        }
        if !self.subject.is_empty() {
            query = query.subject_contains(self.subject.clone());
        }
        if !self.body.is_empty() {
            query = query.body_contains(self.body.clone());
        }

        query = extend(query);
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailquery::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::List { filters } => cmd_list(&filters.build(&config, verbose, |q| q)?),
        Commands::Count { filters } => cmd_count(&filters.build(&config, verbose, |q| q)?),
        Commands::Stats { filters, json } => {
            cmd_stats(&filters.file, &filters.build(&config, verbose, |q| q)?, json)
        }
        Commands::Plan { filters } => cmd_plan(&filters.build(&config, verbose, |q| q)?),
        Commands::Export {
            filters,
            format,
            output,
            attachments,
            word_count,
            by_domain,
        } => {
            let query = filters.build(&config, verbose, |q| {
                if word_count {
                    q.try_add_attribute("word_count", |m: &Message| {
                        Ok(m.plain_text()?.split_whitespace().count())
                    })
                } else {
                    q
                }
            })?;
            let attachments = attachments.or_else(|| config.storage.attachment_dir.clone());
            cmd_export(&query, &config, format, &output, attachments, by_domain)
        }
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailquery::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailquery.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailquery", &mut std::io::stdout());
    Ok(())
}

fn cmd_list(query: &Query) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let listed = query.list_all(None, &mut stdout.lock())?;
    println!("  {listed} message(s)");
    Ok(())
}

fn cmd_count(query: &Query) -> anyhow::Result<()> {
    let reduction = query.reduce_all(CountReducer::default())?;
    println!("{}", reduction.output);
    Ok(())
}

fn cmd_plan(query: &Query) -> anyhow::Result<()> {
    let server = query.server_query();
    println!();
    println!("  Filters:");
    for (i, filter) in query.describe_filters().iter().enumerate() {
        println!("    {:>2}. {filter}", i + 1);
    }
    println!();
    println!(
        "  {:<14} {}",
        "Gmail",
        server.to_gmail_query().unwrap_or_else(|| "(none)".into())
    );
    println!("  {:<14} {}", "IMAP SEARCH", server.to_imap_search());
    let keys = query.attribute_keys();
    if !keys.is_empty() {
        println!("  {:<14} {}", "Attributes", keys.join(", "));
    }
    println!();
    Ok(())
}

/// Show statistics for the matching messages.
fn cmd_stats(path: &Path, query: &Query, json: bool) -> anyhow::Result<()> {
    let reduction = query.reduce_all(EmailStatistics::default())?;
    let stats = reduction.output;

    let mut top: Vec<(&String, &usize)> = stats.sender_counts.iter().collect();
    top.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    top.truncate(10);

    if json {
        let top_json: Vec<serde_json::Value> = top
            .iter()
            .map(|(sender, count)| {
                serde_json::json!({
                    "sender": sender,
                    "count": count,
                })
            })
            .collect();
        let output = serde_json::json!({
            "file": path.to_string_lossy(),
            "message_count": stats.total_emails,
            "unreadable": reduction.failed,
            "distinct_senders": stats.senders.len(),
            "with_html": stats.with_html,
            "average_subject_length": stats.average_subject_length(),
            "longest_subject": stats.longest_subject,
            "top_senders": top_json,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<24} {}", "File", path.display());
    if let Ok(meta) = std::fs::metadata(path) {
        println!("  {:<24} {}", "File size", format_size(meta.len(), BINARY));
    }
    println!("  {:<24} {}", "Messages", stats.total_emails);
    if reduction.failed > 0 {
        println!("  {:<24} {}", "Unreadable", reduction.failed);
    }
    println!("  {:<24} {}", "Distinct senders", stats.senders.len());
    println!(
        "  {:<24} {} ({:.1}%)",
        "With HTML",
        stats.with_html,
        if stats.total_emails == 0 {
            0.0
        } else {
            stats.with_html as f64 / stats.total_emails as f64 * 100.0
        }
    );
    println!(
        "  {:<24} {:.1}",
        "Avg. subject length",
        stats.average_subject_length()
    );
    if !stats.longest_subject.is_empty() {
        println!("  {:<24} {}", "Longest subject", stats.longest_subject);
    }

    if !top.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count) in &top {
            println!("    {count:>6}  {sender}");
        }
    }
    println!();
    Ok(())
}

/// Store matching messages in the chosen local format.
fn cmd_export(
    query: &Query,
    config: &Config,
    format: ExportFormat,
    output: &Path,
    attachment_dir: Option<PathBuf>,
    by_domain: bool,
) -> anyhow::Result<()> {
    let attachments = AttachmentStore::new(attachment_dir)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut backend: Box<dyn StorageBackend> = match format {
        ExportFormat::Mbox => Box::new(MboxStorage::new(output, attachments)),
        ExportFormat::Maildir => {
            Box::new(MaildirStorage::new(output, attachments)?.by_domain(by_domain))
        }
        ExportFormat::Csv => Box::new(
            CsvStorage::new(output, attachments).with_separator(config.storage.csv_separator),
        ),
        ExportFormat::Sqlite => Box::new(SqliteStorage::new(output, attachments)),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Exporting to {}", backend.describe()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let report = query.store_local(backend.as_mut());
    pb.finish_and_clear();
    let report = report?;

    println!(
        "  Stored {}/{} message(s) to {}",
        report.succeeded,
        report.attempted,
        output.display()
    );
    if report.failed() > 0 {
        println!("  {} message(s) could not be stored, see the log", report.failed());
    }
    Ok(())
}
