use std::io::Write;
use std::process::ExitCode;

use fluux_framing::framing::{FramerConfig, StanzaReader, StreamFramer};
use tokio::io::AsyncRead;
use tracing::{error, info};

fn print_help() {
    eprintln!("Fluux stanza framer v{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    eprintln!();
    eprintln!("Usage: fluux-framing [OPTIONS] < capture.xml");
    eprintln!();
    eprintln!("Reads a raw XMPP byte stream from stdin and prints one complete");
    eprintln!("element per line (newlines inside elements are escaped as \\n).");
    eprintln!();
    eprintln!("Options:");
    eprintln!("      --generic             Plain XML framing, no <stream:stream> handling");
    eprintln!("      --max-stanza-size=N   Abort when a stanza exceeds N UTF-16 code units");
    eprintln!("      --chunk-size=N        Bytes requested per read (default: 8192)");
    eprintln!("      --config=PATH         Load framing settings from a JSON file");
    eprintln!("  -v, --verbose             Enable debug logging to stderr");
    eprintln!("      --log-file=PATH       Also write logs to PATH");
    eprintln!("  -V, --version             Print version");
    eprintln!("  -h, --help                Show this help message");
    eprintln!();
    eprintln!("Environment variables:");
    eprintln!("  RUST_LOG                  Override log filter (e.g. RUST_LOG=trace)");
}

fn parse_size(arg: &str, value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|e| format!("Invalid value for {}: {}", arg, e))
}

struct Options {
    generic: bool,
    verbose: bool,
    log_file: Option<std::path::PathBuf>,
    config: FramerConfig,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    // --config is applied first so explicit flags override the file
    let mut config = match args.iter().find_map(|arg| arg.strip_prefix("--config=")) {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config '{}': {}", path, e))?;
            FramerConfig::from_json_str(&json)
                .map_err(|e| format!("Invalid config '{}': {}", path, e))?
        }
        None => FramerConfig::default(),
    };

    let mut options = Options {
        generic: false,
        verbose: false,
        log_file: None,
        config: FramerConfig::default(),
    };

    for arg in args.iter().skip(1) {
        if arg == "--generic" {
            options.generic = true;
        } else if arg == "--verbose" || arg == "-v" {
            options.verbose = true;
        } else if let Some(value) = arg.strip_prefix("--max-stanza-size=") {
            config.max_stanza_size = parse_size("--max-stanza-size", value)?;
        } else if let Some(value) = arg.strip_prefix("--chunk-size=") {
            config.read_chunk_size = parse_size("--chunk-size", value)?;
        } else if let Some(path) = arg.strip_prefix("--log-file=") {
            options.log_file = Some(std::path::PathBuf::from(path));
        } else if !arg.starts_with("--config=") {
            return Err(format!("Unknown option: {}", arg));
        }
    }
    options.config = config;
    Ok(options)
}

/// Install the tracing subscriber: stderr always (filtered), plus a log file
/// when requested. The returned guard must outlive all logging.
fn init_tracing(options: &Options) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let make_filter = || {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if options.verbose {
            EnvFilter::new("fluux_framing=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(make_filter());

    let (file_layer, guard) = match &options.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "fluux-framing.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(make_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn escape_newlines(stanza: &str) -> String {
    stanza.replace('\\', "\\\\").replace('\n', "\\n").replace('\r', "\\r")
}

async fn run<R, P>(mut reader: StanzaReader<R, P>) -> Result<usize, String>
where
    R: AsyncRead + Unpin,
    P: fluux_framing::framing::FramingPolicy,
{
    let stdout = std::io::stdout();
    let mut count = 0usize;
    loop {
        match reader.next_stanza().await {
            Ok(Some(stanza)) => {
                count += 1;
                let mut out = stdout.lock();
                writeln!(out, "{}", escape_newlines(&stanza))
                    .map_err(|e| format!("Failed to write to stdout: {}", e))?;
            }
            Ok(None) => return Ok(count),
            Err(e) => {
                error!(error = %e, stanzas = count, "Framing stopped");
                return Err(e.to_string());
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("fluux-framing {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
        return ExitCode::SUCCESS;
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Try --help for usage.");
            return ExitCode::from(2);
        }
    };
    let _guard = init_tracing(&options);

    info!(
        generic = options.generic,
        max_stanza_size = options.config.max_stanza_size,
        read_chunk_size = options.config.read_chunk_size,
        "Framing stdin"
    );

    let stdin = tokio::io::stdin();
    let result = if options.generic {
        let framer = StreamFramer::generic(&options.config);
        run(StanzaReader::with_framer(stdin, framer, options.config.read_chunk_size)).await
    } else {
        run(StanzaReader::new(stdin, &options.config)).await
    };

    match result {
        Ok(count) => {
            info!(stanzas = count, "Input finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("fluux-framing: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("fluux-framing")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let options = parse_args(&args(&[])).unwrap();
        assert!(!options.generic);
        assert!(!options.verbose);
        assert_eq!(options.config, FramerConfig::default());
    }

    #[test]
    fn test_parse_overrides() {
        let options = parse_args(&args(&["--generic", "-v", "--max-stanza-size=65536", "--chunk-size=512"])).unwrap();
        assert!(options.generic);
        assert!(options.verbose);
        assert_eq!(options.config.max_stanza_size, 65536);
        assert_eq!(options.config.read_chunk_size, 512);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(parse_args(&args(&["--max-stanza-size=lots"])).is_err());
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
        assert!(parse_args(&args(&["--config=/nonexistent/fluux.json"])).is_err());
    }

    #[test]
    fn test_escape_newlines() {
        assert_eq!(escape_newlines("<a>\n</a>"), "<a>\\n</a>");
        assert_eq!(escape_newlines("a\\n"), "a\\\\n");
    }
}
