use anyhow::{Context, Result};
use clap::Parser;
use counterscan::{extract_candidate, CounterConfig, CounterOrchestrator};
use std::io::IsTerminal;
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "counterscan")]
#[command(about = "Order-code scanning and validation for cafeteria counter kiosks")]
#[command(version)]
#[command(long_about = "Reads order codes from the counter camera (matrix codes), from OCR \
of printed tickets or from the operator keyboard, validates them against the order registry \
and signals the operator. Optionally exposes an HTTP status and command surface.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "counterscan.toml", help = "Path to TOML configuration file")]
    config: String,

    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    #[arg(long, help = "Validate configuration file and exit without starting the terminal")]
    validate_config: bool,

    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    #[arg(long, help = "Perform dry run - assemble components but don't start them")]
    dry_run: bool,

    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,

    /// Run the OCR extraction heuristic over a text file and print the result
    #[arg(long, value_name = "FILE")]
    extract_text: Option<String>,

    #[arg(long, help = "Disable the keyboard operator surface")]
    no_keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    if let Some(path) = &args.extract_text {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read OCR text from {}", path))?;
        println!("{}", serde_json::to_string_pretty(&extract_candidate(&text))?);
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting counterscan v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = CounterConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let keyboard = config.terminal.manual_entry && !args.no_keyboard && std::io::stdin().is_terminal();

    let mut orchestrator = CounterOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to assemble terminal: {}", e);
        e
    })?;
    orchestrator.set_keyboard_enabled(keyboard);

    orchestrator.initialize().await?;

    if args.dry_run {
        info!("Dry run mode - components assembled but not started");
        println!(
            "✓ Dry run completed successfully - components: {}",
            orchestrator.component_names().join(", ")
        );
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start terminal: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("counterscan exited with code: {}", exit_code);
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("counterscan={}", log_level)));

    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path '{}' has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_writer(writer).with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# counterscan configuration");
    println!("# Every key can be overridden with COUNTERSCAN_<SECTION>__<KEY>");
    println!();
    println!("{}", toml::to_string_pretty(&CounterConfig::default())?);
    Ok(())
}
