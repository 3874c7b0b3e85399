use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{poll, read, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tglogs::app::App;
use tglogs::config::Config;
use tglogs::error_reporting::{self, TimePeriod};
use tglogs::gcp::auth::GcpCredentials;
use tglogs::gcp::client::{Endpoints, GcpClient};
use tglogs::logging::catalog::log_name_for;
use tglogs::logging::{
    compose_advanced_filter, compose_simple_filter, FilterSelection, LogEntry, LogRetriever,
    LogSeverity, LoggingDataSource, RetrievalOutcome, SharedSink, SinkEvent, TimeBound,
};
use tglogs::pubsub::{self, PubSubError, TOPIC_NAME_HINT};
use tglogs::ui::splash::{render as render_splash, SplashState};
use tglogs::{event, ui};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Terminal viewer for Google Cloud Logging
#[derive(Parser, Debug)]
#[command(name = "tglogs", version, about, long_about = None)]
struct Args {
    /// GCP project to use
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Log level for debugging (written to the log file)
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Use this OAuth access token instead of Application Default Credentials
    #[arg(long, env = "TGLOGS_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive log viewer (default)
    View,

    /// Print matching log entries
    Query(QueryArgs),

    /// List monitored resource types
    Resources,

    /// List log ids of the project
    LogIds,

    /// Error Reporting group statistics
    Errors {
        #[arg(long, value_enum, default_value = "1d")]
        period: TimePeriod,
    },

    /// List Pub/Sub topics
    Topics,

    /// Create a Pub/Sub topic
    CreateTopic { name: String },
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Monitored resource type, e.g. gce_instance
    #[arg(long)]
    resource: Option<String>,

    /// Minimum severity
    #[arg(long, value_enum)]
    severity: Option<LogSeverity>,

    /// Short log id, e.g. syslog
    #[arg(long)]
    log_id: Option<String>,

    /// Space separated terms, any of which must appear
    #[arg(long)]
    search: Option<String>,

    /// Raw filter in the logging query language; replaces the other selectors
    #[arg(long, conflicts_with_all = ["resource", "severity", "log_id", "search"])]
    advanced: Option<String>,

    /// Entries at or before this time, newest first (RFC 3339)
    #[arg(long, conflicts_with = "after")]
    before: Option<DateTime<Utc>>,

    /// Entries at or after this time, oldest first (RFC 3339)
    #[arg(long)]
    after: Option<DateTime<Utc>>,

    /// Number of batches to load
    #[arg(long, default_value_t = 1)]
    pages: usize,

    /// One JSON object per line
    #[arg(long, conflicts_with = "yaml")]
    json: bool,

    /// YAML documents
    #[arg(long)]
    yaml: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG narrows per target; --log-level caps everything
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tglogs started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = Config::config_dir() {
        return config_dir.join("tglogs.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tglogs").join("tglogs.log");
    }
    PathBuf::from("tglogs.log")
}

/// Endpoints from config, with the Pub/Sub emulator honoured when set
fn endpoints(config: &Config) -> Endpoints {
    let mut endpoints = config.endpoints.clone();
    if let Ok(host) = std::env::var("PUBSUB_EMULATOR_HOST") {
        if !host.is_empty() {
            tracing::info!("Using Pub/Sub emulator at {}", host);
            endpoints.pubsub = format!("http://{}", host);
        }
    }
    endpoints
}

async fn connect(args: &Args, config: &Config) -> Result<GcpClient> {
    let project = args
        .project
        .clone()
        .unwrap_or_else(|| config.effective_project());

    if project.is_empty() {
        anyhow::bail!(
            "No GCP project configured. Set GOOGLE_CLOUD_PROJECT or use --project flag"
        );
    }
    tracing::info!("Using project: {}", project);

    match args.access_token.as_deref() {
        Some(token) => {
            GcpClient::with_credentials(GcpCredentials::fixed(token), &project, endpoints(config))
        },
        None => GcpClient::new(&project, endpoints(config)).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;
    let config = Config::load();

    match &args.command {
        None | Some(Command::View) => run_viewer(&args, config).await,
        Some(Command::Query(query)) => {
            let client = connect(&args, &config).await?;
            run_query(client, query).await
        },
        Some(Command::Resources) => {
            let source = LoggingDataSource::new(connect(&args, &config).await?);
            let descriptors = tglogs::logging::catalog::order_resource_descriptors(
                source.list_resource_descriptors().await?,
            );
            for d in descriptors {
                println!("{:<40} {}", d.resource_type, d.label());
            }
            Ok(())
        },
        Some(Command::LogIds) => {
            let source = LoggingDataSource::new(connect(&args, &config).await?);
            for id in source.list_log_ids().await? {
                println!("{}", id);
            }
            Ok(())
        },
        Some(Command::Errors { period }) => {
            let client = connect(&args, &config).await?;
            print_error_groups(&client, *period).await
        },
        Some(Command::Topics) => {
            let client = connect(&args, &config).await?;
            for topic in pubsub::list_topics(&client).await? {
                println!("{}", topic);
            }
            Ok(())
        },
        Some(Command::CreateTopic { name }) => {
            let client = connect(&args, &config).await?;
            match pubsub::create_topic(&client, name).await {
                Ok(full_name) => {
                    println!("Topic \"{}\" has been created", full_name);
                    Ok(())
                },
                Err(PubSubError::InvalidName(e)) => {
                    eprintln!("{}", TOPIC_NAME_HINT);
                    Err(e.into())
                },
                Err(PubSubError::DataSource(e)) => Err(anyhow::anyhow!(e.user_message())),
            }
        },
    }
}

// =============================================================================
// query
// =============================================================================

#[derive(Clone, Copy)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

fn print_entry(out: &mut impl Write, entry: &LogEntry, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let ts = entry
                .timestamp
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                out,
                "{} {:<9} {} {}",
                ts,
                entry.severity.as_str(),
                entry.log_id(),
                entry.message()
            )?;
        },
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(entry)?)?,
        OutputFormat::Yaml => write!(out, "---\n{}", serde_yaml::to_string(entry)?)?,
    }
    Ok(())
}

/// Print sink entries not yet printed. Reads the sink directly so a lagged
/// receiver loses nothing.
fn flush_new(sink: &SharedSink, printed: &mut usize, format: OutputFormat) -> Result<()> {
    let entries: Vec<Arc<LogEntry>> = {
        let sink = sink.lock();
        sink.entries().get(*printed..).unwrap_or_default().to_vec()
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entry in &entries {
        print_entry(&mut out, entry, format)?;
    }
    *printed += entries.len();
    Ok(())
}

async fn run_query(client: GcpClient, query: &QueryArgs) -> Result<()> {
    let now = Utc::now();
    let bound = match (query.before, query.after) {
        (_, Some(after)) => TimeBound::after(after),
        (Some(before), None) => TimeBound::before(before),
        (None, None) => TimeBound::before(now),
    };

    let filter = match query.advanced.as_deref() {
        Some(text) => compose_advanced_filter(text, Some(bound), now),
        None => {
            let selection = FilterSelection {
                resource_type: query.resource.clone(),
                severity: query.severity,
                time_bound: Some(bound),
                log_name: query
                    .log_id
                    .as_deref()
                    .map(|id| log_name_for(&client.project_id, id)),
                search_text: query.search.clone(),
            };
            compose_simple_filter(&selection, now)
        },
    };
    tracing::debug!("Query filter: {:?}", filter);

    let format = if query.json {
        OutputFormat::Json
    } else if query.yaml {
        OutputFormat::Yaml
    } else {
        OutputFormat::Text
    };

    let sink = SharedSink::new();
    let mut events = sink.subscribe();
    let retriever = LogRetriever::new(LoggingDataSource::new(client), sink.clone());

    // Ctrl-C stops the whole run; entries already printed stay printed.
    // Keep listening so repeated presses are acknowledged.
    let stop = CancellationToken::new();
    let interrupt = {
        let stop = stop.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !stop.is_cancelled() {
                    eprintln!("Cancelling...");
                }
                stop.cancel();
            }
        })
    };

    let driver = retriever.load_pages(filter, bound.order, query.pages.max(1), &stop);
    tokio::pin!(driver);

    let mut printed = 0usize;
    let result = loop {
        tokio::select! {
            biased;
            event = events.recv() => {
                if let Ok(SinkEvent::Cleared) = event {
                    printed = 0;
                }
                flush_new(&sink, &mut printed, format)?;
            },
            result = &mut driver => break result,
        }
    };
    interrupt.abort();
    flush_new(&sink, &mut printed, format)?;

    match result {
        Ok(RetrievalOutcome::Completed { .. }) => {
            eprintln!("{} entries; more available (use --pages)", printed);
        },
        Ok(RetrievalOutcome::Cancelled { .. }) => eprintln!("Cancelled after {} entries", printed),
        Ok(_) => eprintln!("{} entries", printed),
        Err(e) => anyhow::bail!(e.user_message()),
    }
    Ok(())
}

async fn print_error_groups(client: &GcpClient, period: TimePeriod) -> Result<()> {
    let stats = error_reporting::list_group_stats(client, period)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if stats.is_empty() {
        println!("No errors in this period");
        return Ok(());
    }

    println!(
        "{:>8} {:>8} {:<20} {:<24} MESSAGE",
        "COUNT", "USERS", "LAST SEEN", "SERVICE"
    );
    for s in &stats {
        let last_seen = s
            .last_seen_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>8} {:>8} {:<20} {:<24} {}",
            s.count,
            s.affected_users_count,
            last_seen,
            s.representative.service_context.service,
            s.summary()
        );
    }
    Ok(())
}

// =============================================================================
// view
// =============================================================================

const INIT_STEPS: usize = 3;

async fn run_viewer(args: &Args, mut config: Config) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    if let Some(project) = args.project.as_deref() {
        if let Err(e) = config.set_project(project) {
            tracing::warn!("Failed to save config: {}", e);
        }
    }

    let result = initialize_with_splash(&mut terminal, args, config).await;

    match result {
        Ok(Some(mut app)) => {
            let run_result = run_app(&mut terminal, &mut app).await;
            cleanup_terminal(&mut terminal)?;

            if let Err(err) = run_result {
                eprintln!("Error: {err:?}");
            }
        },
        Ok(None) => {
            cleanup_terminal(&mut terminal)?;
        },
        Err(err) => {
            cleanup_terminal(&mut terminal)?;
            eprintln!("Initialization error: {err:?}");
        },
    }

    Ok(())
}

fn cleanup_terminal<B: Backend + std::io::Write>(terminal: &mut Terminal<B>) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

async fn initialize_with_splash<B: Backend>(
    terminal: &mut Terminal<B>,
    args: &Args,
    config: Config,
) -> Result<Option<App>>
where
    B::Error: Send + Sync + 'static,
{
    let mut splash = SplashState::new(INIT_STEPS);
    terminal.draw(|f| render_splash(f, &splash))?;

    if check_abort()? {
        return Ok(None);
    }

    // Step 1: Credentials
    splash.set_message("Connecting to Google Cloud");
    terminal.draw(|f| render_splash(f, &splash))?;

    let client = match connect(args, &config).await {
        Ok(client) => client,
        Err(e) => {
            splash.set_message(&format!("Error: {}", e));
            terminal.draw(|f| render_splash(f, &splash))?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            return Err(e);
        },
    };
    splash.complete_step();

    if check_abort()? {
        return Ok(None);
    }

    // Step 2: Resource types and log ids for the selectors
    splash.set_message(&format!("Loading log catalogue [{}]", client.project_id));
    terminal.draw(|f| render_splash(f, &splash))?;

    let mut app = App::new(LoggingDataSource::new(client), config);
    if !app.ensure_catalog().await {
        tracing::warn!("Catalogue load failed: {:?}", app.error_message);
    }
    splash.complete_step();

    if check_abort()? {
        return Ok(None);
    }

    // Step 3: First query
    splash.set_message("Ready!");
    splash.complete_step();
    terminal.draw(|f| render_splash(f, &splash))?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    if app.error_message.is_none() {
        app.reload().await;
    }

    Ok(Some(app))
}

fn check_abort() -> Result<bool> {
    if poll(Duration::from_millis(50))? {
        if let Event::Key(key) = read()? {
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        app.tick().await;
        terminal.draw(|f| ui::render(f, app))?;

        if event::handle_events(app).await? {
            return Ok(());
        }
    }
}
