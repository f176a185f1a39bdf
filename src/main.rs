use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use microseason_printer::calendar::list_lines;
use microseason_printer::matcher::{resolve, resolve_by_id};
use microseason_printer::*;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the hour after which the daily receipt prints (0-23)
    #[arg(long, global = true)]
    threshold_hour: Option<u8>,

    /// Override the printer device, `-` for stdout
    #[arg(short, long, global = true)]
    printer: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily scheduler; every line on stdin counts as a button press
    Run,
    /// Print today's microseason without touching the saved state
    Today,
    /// Print specific microseasons by number
    Print {
        /// Microseason number (repeatable)
        #[arg(short, long = "id", required = true)]
        ids: Vec<u32>,
    },
    /// List every microseason in the calendar
    List,
}

type SerialPrinter = Printer<WriterTransport<Box<dyn Write + Send>>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("microseason_printer=info,microseason=info")),
        )
        .compact()
        .with_writer(std::io::stderr)
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(hour) = cli.threshold_hour {
        config.print_threshold_hour = hour;
    }
    if let Some(printer) = cli.printer {
        config.printer_device = printer;
    }
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,
        Commands::Today => print_today(&config).await?,
        Commands::Print { ids } => print_ids(&config, &ids).await?,
        Commands::List => {
            let calendar = CalendarStore::open(&config.calendar_path).snapshot();
            if calendar.is_empty() {
                warn!("No microseasons loaded from {}", config.calendar_path.display());
            }
            for line in list_lines(&calendar.micro) {
                println!("{line}");
            }
        }
    }

    Ok(())
}

/// Opens the printer device and selects the configured character set
#[instrument]
fn open_printer(device: &str, charset: Charset) -> Result<SerialPrinter> {
    let writer: Box<dyn Write + Send> = if device == "-" {
        Box::new(std::io::stdout())
    } else {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(device)
            .map_err(|e| eyre!("Failed to open printer at {}: {}", device, e))?;
        Box::new(file)
    };

    let mut printer = Printer::new(WriterTransport::new(writer));
    printer.initialize(charset)?;
    info!("Printer ready on {}", device);
    Ok(printer)
}

/// Runs the scheduler and the button controller until Ctrl-C
async fn run(config: Config) -> Result<()> {
    info!("Microseason printer starting");

    let calendars = Arc::new(CalendarStore::open(&config.calendar_path));
    calendars.log_entries();
    let state = Arc::new(PrintStateStore::new(FileStore::new(&config.state_dir)));
    let clock = SystemClock::new(config.utc_offset_minutes, config.dst)?;

    let printer = open_printer(&config.printer_device, config.charset)?;
    let (render, worker) = RenderWorker::spawn(printer, config.queue_capacity);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (button_tx, button_rx) = mpsc::channel(16);

    let scheduler = Scheduler::new(
        clock,
        Arc::clone(&calendars),
        Arc::clone(&state),
        render.clone(),
        &config,
    );
    let manual = ManualOverride::new(calendars, state, render, &config);

    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));
    let manual_task = tokio::spawn(manual.run(button_rx, shutdown_rx));
    // Detached: a pending stdin read must not hold up shutdown
    button::spawn_press_reader(std::io::BufReader::new(std::io::stdin()), button_tx);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, letting queued receipts finish");
    let _ = shutdown_tx.send(true);

    scheduler_task.await?;
    manual_task.await?;
    worker.await?;

    info!("Stopped");
    Ok(())
}

/// Prints the entries for today's date without recording anything
async fn print_today(config: &Config) -> Result<()> {
    let clock = SystemClock::new(config.utc_offset_minutes, config.dst)?;
    let now = clock.now()?;
    let calendar = CalendarStore::open(&config.calendar_path).snapshot();
    let date = now.date();

    let Some(entry) = resolve(date, &calendar.micro) else {
        return Err(eyre!("No microseason found for {}", date));
    };

    let mut commands = Vec::new();
    if let Some(band) = resolve(date, &calendar.macro_bands) {
        commands.extend(render(band, Banner::Macro));
    }
    if let Some(band) = resolve(date, &calendar.mini) {
        commands.extend(render(band, Banner::Mini));
    }
    commands.extend(render(entry, Banner::Micro));

    print_jobs(config, vec![(format!("today #{}", entry.id), commands)]).await
}

/// Prints the given entries in order
async fn print_ids(config: &Config, ids: &[u32]) -> Result<()> {
    let calendar = CalendarStore::open(&config.calendar_path).snapshot();

    let mut jobs = Vec::new();
    for &id in ids {
        match resolve_by_id(id, &calendar.micro) {
            Some(entry) => jobs.push((format!("#{id}"), render(entry, Banner::Micro))),
            None => warn!("No microseason numbered {}", id),
        }
    }
    if jobs.is_empty() {
        return Err(eyre!("None of the requested microseasons exist"));
    }

    print_jobs(config, jobs).await
}

async fn print_jobs(config: &Config, jobs: Vec<(String, Vec<PrinterCommand>)>) -> Result<()> {
    let printer = open_printer(&config.printer_device, config.charset)?;
    let (render, worker) = RenderWorker::spawn(printer, config.queue_capacity);

    let mut failed = 0;
    for (label, commands) in jobs {
        if let Err(e) = render.render(&label, commands).await {
            error!("Failed to print {}: {}", label, e);
            failed += 1;
        }
    }
    drop(render);
    worker.await?;

    if failed > 0 {
        return Err(eyre!("{} receipt(s) failed to print", failed));
    }
    Ok(())
}
