//! Hostprobe CLI Application
//!
//! Reads targets from stdin, one per line, and prints every hostname found
//! in their TLS certificates and reverse DNS records.

mod logging;
mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{CommandFactory, Parser};
use hostprobe_lib::{
    load_env_config, parse_timeout_string, ConfigManager, EnvConfig, HostProbeError, HostScanner,
    OutputFormat, PipelineSummary, ResolverProtocol, ScanConfig, MAX_CONCURRENCY,
    MIN_CONCURRENCY,
};
use std::future::Future;
use std::io;
use std::process;
use std::time::Duration;
use tracing::{debug, info, warn};
use ui::RecordPrinter;

/// Exit status after a second interrupt, as for a shell-killed job.
const FORCE_QUIT_EXIT_CODE: i32 = 130;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for hostprobe
#[derive(Parser, Debug)]
#[command(name = "hostprobe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discover hostnames from TLS certificates and reverse DNS")]
#[command(
    long_about = "Reads targets (IP addresses, host:port, or URLs) from stdin, one per line.\n\nFor each target, prints the DNS names in the TLS certificate it presents and the names returned by a reverse DNS lookup."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Number of concurrent workers (default: 32)
    #[arg(
        short = 't',
        long = "threads",
        visible_alias = "concurrency",
        value_name = "N",
        help_heading = "Performance"
    )]
    pub threads: Option<usize>,

    /// Custom DNS resolver address (default: system resolver)
    #[arg(
        short = 'r',
        long = "resolver",
        value_name = "ADDR",
        help_heading = "DNS"
    )]
    pub resolver: Option<String>,

    /// Port of the custom resolver (default: 53)
    #[arg(short = 'p', long = "port", value_name = "PORT", help_heading = "DNS")]
    pub port: Option<u16>,

    /// Resolver transport: udp or tcp (default: udp)
    #[arg(long = "protocol", value_name = "PROTO", help_heading = "DNS")]
    pub protocol: Option<String>,

    /// Per-query DNS timeout, e.g. 2s or 500ms (default: 5s)
    #[arg(long = "dns-timeout", value_name = "DURATION", help_heading = "DNS")]
    pub dns_timeout: Option<String>,

    /// Whole-request TLS timeout (default: 10s)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "TLS")]
    pub timeout: Option<String>,

    /// TCP connect and TLS handshake timeout (default: 5s)
    #[arg(long = "connect-timeout", value_name = "DURATION", help_heading = "TLS")]
    pub connect_timeout: Option<String>,

    /// Output format: text or json (default: text)
    #[arg(short = 'f', long = "format", value_name = "FORMAT", help_heading = "Output")]
    pub format: Option<String>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Debug diagnostics on stderr
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        exit_with_usage(&e);
    }

    let env_config = load_env_config();
    let config = match build_config(&args, &env_config) {
        Ok(config) => config,
        Err(e) => exit_with_usage(&e.to_string()),
    };

    debug!(?config, "Effective configuration");

    let scanner = match HostScanner::with_config(config) {
        Ok(scanner) => scanner,
        Err(e) if e.is_config_error() => exit_with_usage(&e.to_string()),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    // Exit explicitly: a pending blocking stdin read would otherwise hold
    // up runtime shutdown after an interrupt or output failure.
    match run_scan(&scanner).await {
        Ok(summary) => {
            info!(
                targets = summary.targets,
                records = summary.records,
                "Scan complete"
            );
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn exit_with_usage(message: &str) -> ! {
    eprintln!("Error: {}\n", message);
    eprintln!("{}", Args::command().render_help());
    process::exit(1);
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if let Some(threads) = args.threads {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&threads) {
            return Err(format!(
                "Thread count must be between {} and {}",
                MIN_CONCURRENCY, MAX_CONCURRENCY
            ));
        }
    }

    if let Some(format) = &args.format {
        format
            .parse::<OutputFormat>()
            .map_err(|e| e.to_string())?;
    }

    if let Some(protocol) = &args.protocol {
        protocol
            .parse::<ResolverProtocol>()
            .map_err(|e| e.to_string())?;
    }

    if args.port == Some(0) {
        return Err("Resolver port cannot be 0".to_string());
    }

    for (flag, value) in [
        ("--timeout", &args.timeout),
        ("--connect-timeout", &args.connect_timeout),
        ("--dns-timeout", &args.dns_timeout),
    ] {
        if let Some(value) = value {
            parse_cli_timeout(flag, value).map_err(|e| e.to_string())?;
        }
    }

    Ok(())
}

/// Build the scan configuration.
///
/// Precedence, lowest first: defaults, config file, `HP_*` environment,
/// command line flags.
fn build_config(args: &Args, env_config: &EnvConfig) -> Result<ScanConfig, HostProbeError> {
    let mut config = ScanConfig::default();

    // Step 1: Config file, explicit (CLI, then HP_CONFIG) or discovered
    let config_manager = ConfigManager::new(args.verbose);
    let explicit_config_path = args.config.as_ref().or(env_config.config.as_ref());

    let file_config = match explicit_config_path {
        Some(path) => {
            debug!(%path, "Using explicit config file");
            config_manager.load_file(path)?
        }
        None => config_manager.discover_and_load()?,
    };
    file_config.apply_to(&mut config)?;

    // Step 2: Environment variables (HP_*). An explicit --format makes
    // HP_FORMAT irrelevant, valid or not.
    if args.format.is_some() {
        let env_config = EnvConfig {
            format: None,
            ..env_config.clone()
        };
        env_config.apply_to(&mut config)?;
    } else {
        env_config.apply_to(&mut config)?;
    }

    // Step 3: CLI arguments (highest precedence)
    apply_cli_args_to_config(&mut config, args)?;

    config.validate()?;
    Ok(config)
}

/// Apply CLI arguments to config (highest precedence).
///
/// Only flags the user actually passed override earlier layers.
fn apply_cli_args_to_config(config: &mut ScanConfig, args: &Args) -> Result<(), HostProbeError> {
    if let Some(threads) = args.threads {
        config.concurrency = threads;
    }
    if let Some(resolver) = &args.resolver {
        config.resolver.server = Some(resolver.clone());
    }
    if let Some(port) = args.port {
        config.resolver.port = port;
    }
    if let Some(protocol) = &args.protocol {
        config.resolver.protocol = protocol.parse()?;
    }
    if let Some(format) = &args.format {
        config.format = format.parse()?;
    }
    if let Some(timeout) = &args.timeout {
        config.request_timeout = parse_cli_timeout("--timeout", timeout)?;
    }
    if let Some(timeout) = &args.connect_timeout {
        config.connect_timeout = parse_cli_timeout("--connect-timeout", timeout)?;
    }
    if let Some(timeout) = &args.dns_timeout {
        config.resolver.timeout = parse_cli_timeout("--dns-timeout", timeout)?;
    }
    Ok(())
}

fn parse_cli_timeout(flag: &str, value: &str) -> Result<Duration, HostProbeError> {
    parse_timeout_string(value)
        .filter(|timeout| !timeout.is_zero())
        .ok_or_else(|| {
            HostProbeError::config(format!(
                "Invalid {} '{}'. Use format like '500ms', '5s', '2m'",
                flag, value
            ))
        })
}

/// Stream stdin through the scanner and print records as they arrive.
async fn run_scan(scanner: &HostScanner) -> Result<PipelineSummary, HostProbeError> {
    let input = tokio::io::BufReader::new(tokio::io::stdin());

    let shutdown = shutdown_signal(tokio::signal::ctrl_c, || {
        process::exit(FORCE_QUIT_EXIT_CODE);
    });

    let mut printer = RecordPrinter::stdout(scanner.config().format);
    scanner
        .scan_until(input, shutdown, |record| printer.print(&record))
        .await
}

/// Resolves on the first interrupt. A second interrupt calls `force_quit`
/// instead of waiting for in-flight targets.
async fn shutdown_signal<I, Fut, Q>(interrupt: I, force_quit: Q)
where
    I: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<()>> + Send + 'static,
    Q: FnOnce() + Send + 'static,
{
    if let Err(e) = interrupt().await {
        warn!(error = %e, "Cannot listen for interrupt");
        std::future::pending::<()>().await;
    }
    warn!("Interrupted, finishing targets already read (interrupt again to quit now)");

    tokio::spawn(async move {
        if interrupt().await.is_ok() {
            warn!("Interrupted again, exiting");
            force_quit();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Helper function with all required fields
    fn create_test_args() -> Args {
        Args {
            threads: None,
            resolver: None,
            port: None,
            protocol: None,
            dns_timeout: None,
            timeout: None,
            connect_timeout: None,
            format: None,
            config: None,
            verbose: false,
        }
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_short_and_alias_flags_parse() {
        let args = Args::try_parse_from([
            "hostprobe", "-t", "8", "-r", "1.1.1.1", "-p", "5353", "-f", "json", "-v",
        ])
        .unwrap();
        assert_eq!(args.threads, Some(8));
        assert_eq!(args.resolver.as_deref(), Some("1.1.1.1"));
        assert_eq!(args.port, Some(5353));
        assert_eq!(args.format.as_deref(), Some("json"));
        assert!(args.verbose);

        let args = Args::try_parse_from(["hostprobe", "--concurrency", "4"]).unwrap();
        assert_eq!(args.threads, Some(4));
    }

    #[test]
    fn test_validate_args_defaults_ok() {
        assert!(validate_args(&create_test_args()).is_ok());
    }

    #[test]
    fn test_validate_args_invalid_format() {
        let mut args = create_test_args();
        args.format = Some("xml".to_string());

        let err = validate_args(&args).unwrap_err();
        assert!(err.contains("invalid output format 'xml'"));
    }

    #[test]
    fn test_validate_args_thread_range() {
        let mut args = create_test_args();
        args.threads = Some(0);
        assert!(validate_args(&args).is_err());

        args.threads = Some(MAX_CONCURRENCY + 1);
        assert!(validate_args(&args).is_err());

        args.threads = Some(MAX_CONCURRENCY);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_protocol_and_timeouts() {
        let mut args = create_test_args();
        args.protocol = Some("sctp".to_string());
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.dns_timeout = Some("0s".to_string());
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.connect_timeout = Some("750ms".to_string());
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_cli_overrides_env_and_file() {
        let file = write_config("[defaults]\nthreads = 10\nformat = \"json\"\n\n[resolver]\nport = 5300\n");

        let mut args = create_test_args();
        args.config = Some(file.path().to_string_lossy().to_string());
        args.threads = Some(64);

        let env_config = EnvConfig {
            threads: Some(20),
            resolver: Some("9.9.9.9".to_string()),
            ..Default::default()
        };

        let config = build_config(&args, &env_config).unwrap();
        assert_eq!(config.concurrency, 64); // CLI
        assert_eq!(config.resolver.server.as_deref(), Some("9.9.9.9")); // env
        assert_eq!(config.resolver.port, 5300); // file
        assert_eq!(config.format, OutputFormat::Json); // file
    }

    #[test]
    fn test_env_config_file_used_without_flag() {
        let file = write_config("[defaults]\nthreads = 3\n");

        let env_config = EnvConfig {
            config: Some(file.path().to_string_lossy().to_string()),
            ..Default::default()
        };

        let config = build_config(&create_test_args(), &env_config).unwrap();
        assert_eq!(config.concurrency, 3);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let mut args = create_test_args();
        args.config = Some("/no/such/dir/hostprobe.toml".to_string());

        let err = build_config(&args, &EnvConfig::default()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_env_format_is_fatal() {
        let file = write_config("");
        let mut args = create_test_args();
        args.config = Some(file.path().to_string_lossy().to_string());

        let env_config = EnvConfig {
            format: Some("yaml".to_string()),
            ..Default::default()
        };

        let err = build_config(&args, &env_config).unwrap_err();
        assert!(matches!(err, HostProbeError::InvalidFormat { .. }));
    }

    #[test]
    fn test_cli_format_overrides_invalid_env_format() {
        let file = write_config("");
        let mut args = create_test_args();
        args.config = Some(file.path().to_string_lossy().to_string());
        args.format = Some("text".to_string());

        let env_config = EnvConfig {
            format: Some("yaml".to_string()),
            ..Default::default()
        };

        let config = build_config(&args, &env_config).unwrap();
        assert_eq!(config.format, OutputFormat::Text);
    }

    #[tokio::test]
    async fn test_second_interrupt_forces_quit() {
        use std::sync::Arc;
        use tokio::sync::{mpsc, oneshot, Mutex};

        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel::<()>();
        let trigger_rx = Arc::new(Mutex::new(trigger_rx));
        let interrupt = move || {
            let trigger_rx = trigger_rx.clone();
            async move {
                match trigger_rx.lock().await.recv().await {
                    Some(()) => Ok(()),
                    None => Err(io::Error::new(io::ErrorKind::Other, "no more interrupts")),
                }
            }
        };
        let (quit_tx, mut quit_rx) = oneshot::channel::<()>();
        let force_quit = move || {
            let _ = quit_tx.send(());
        };

        let shutdown = tokio::spawn(shutdown_signal(interrupt, force_quit));

        trigger_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("first interrupt did not request shutdown")
            .unwrap();
        assert!(quit_rx.try_recv().is_err());

        trigger_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), quit_rx)
            .await
            .expect("second interrupt did not force quit")
            .unwrap();
    }
}
