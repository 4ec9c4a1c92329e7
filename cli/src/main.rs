//! Entry point for `fetch`.
//!
//! Fetches one URL and writes the raw response to stdout. `main.rs` owns
//! process setup (logging, argument parsing) and the exit-code policy; all
//! network work is delegated to `fetch-core`.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fetch_core::{FetchClient, FetchError, FetchOptions, FetchReport};

/// Minimal HTTP/1.0 fetch over TCP or TLS.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// URL to fetch (http:// or https://).
    url: String,

    /// JSON options file; flags below override its fields.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Connect timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    connect_timeout: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    read_timeout: Option<u64>,

    /// Accept any server certificate.
    #[arg(long)]
    insecure: bool,

    /// Extra PEM file of trusted root certificates. Repeatable.
    #[arg(long = "cacert", value_name = "PEM")]
    cacerts: Vec<PathBuf>,

    /// Treat a TLS peer that closes without close_notify as a truncated
    /// response.
    #[arg(long)]
    require_close_notify: bool,

    /// Fail unless the server presented a certificate.
    #[arg(long)]
    require_cert: bool,

    /// Print a JSON summary of the fetch to stderr.
    #[arg(long)]
    report: bool,

    /// Log more (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> Result<FetchOptions, FetchError> {
        let mut options = match &self.config {
            Some(path) => FetchOptions::from_json_file(path)?,
            None => FetchOptions::default(),
        };
        if let Some(ms) = self.connect_timeout {
            options.timeouts.connect_ms = Some(ms);
        }
        if let Some(ms) = self.read_timeout {
            options.timeouts.read_ms = Some(ms);
        }
        if self.insecure {
            options.tls.insecure_skip_verify = true;
        }
        if self.require_close_notify {
            options.tls.require_close_notify = true;
        }
        options.tls.extra_root_certificates.extend(self.cacerts.iter().cloned());
        options.validate()?;
        Ok(options)
    }

    fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    let options = match cli.options() {
        Ok(options) => options,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let client = FetchClient::new(options);
    let mut stdout = std::io::stdout().lock();
    let report = match client.fetch(&cli.url, &mut stdout) {
        Ok(report) => report,
        Err(e) => {
            let _ = stdout.flush();
            log::error!("fetch of {} failed: {e}", cli.url);
            return ExitCode::FAILURE;
        }
    };

    if cli.report {
        print_report(&report);
    }

    match certificate_policy(&report, cli.require_cert) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            log::error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &FetchReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => eprintln!("{json}"),
        Err(e) => log::error!("could not serialise the fetch report: {e}"),
    }
}

/// The library only reports whether a certificate was seen; whether its
/// absence is fatal is decided here.
fn certificate_policy(report: &FetchReport, require_cert: bool) -> Result<(), String> {
    match (&report.peer_certificate_subject, require_cert) {
        (Some(subject), _) => {
            log::info!("peer certificate: {subject}");
            Ok(())
        }
        (None, true) => Err(format!("{} presented no certificate", report.host)),
        (None, false) => {
            if report.tls {
                log::warn!("{} presented no certificate", report.host);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use fetch_core::Scheme;

    fn report(tls: bool, subject: Option<&str>) -> FetchReport {
        FetchReport {
            url: "https://example.com:443/".to_string(),
            scheme: if tls { Scheme::Https } else { Scheme::Http },
            host: "example.com".to_string(),
            port: 443,
            address: "93.184.216.34".to_string(),
            tls,
            peer_certificate_subject: subject.map(str::to_string),
            bytes_received: 10,
        }
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn url_is_required() {
        let err = Cli::try_parse_from(["fetch"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "fetch",
            "https://example.com/",
            "--connect-timeout",
            "1500",
            "--read-timeout",
            "3000",
            "--insecure",
            "--require-close-notify",
            "--cacert",
            "a.pem",
            "--cacert",
            "b.pem",
        ])
        .unwrap();
        let options = cli.options().unwrap();
        assert_eq!(options.timeouts.connect_ms, Some(1500));
        assert_eq!(options.timeouts.read_ms, Some(3000));
        assert_eq!(options.timeouts.write_ms, None);
        assert!(options.tls.insecure_skip_verify);
        assert!(options.tls.require_close_notify);
        assert_eq!(
            options.tls.extra_root_certificates,
            vec![PathBuf::from("a.pem"), PathBuf::from("b.pem")]
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["fetch", "http://x/", "--read-timeout", "0"]).unwrap();
        assert!(matches!(cli.options(), Err(FetchError::InvalidConfig(_))));
    }

    #[test]
    fn missing_config_file_is_invalid_config() {
        let cli =
            Cli::try_parse_from(["fetch", "http://x/", "--config", "/nonexistent/fetch.json"]).unwrap();
        assert!(matches!(cli.options(), Err(FetchError::InvalidConfig(_))));
    }

    #[test]
    fn verbosity_maps_to_levels() {
        let quiet = Cli::try_parse_from(["fetch", "http://x/"]).unwrap();
        assert_eq!(quiet.log_level(), "warn");
        let loud = Cli::try_parse_from(["fetch", "-vv", "http://x/"]).unwrap();
        assert_eq!(loud.log_level(), "debug");
    }

    #[test]
    fn missing_certificate_is_fatal_only_when_required() {
        assert!(certificate_policy(&report(true, None), false).is_ok());
        assert!(certificate_policy(&report(true, None), true).is_err());
        assert!(certificate_policy(&report(true, Some("CN=example.com")), true).is_ok());
        assert!(certificate_policy(&report(false, None), true).is_err());
    }
}
