use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::scanner::{DEFAULT_CONCURRENCY, DEFAULT_GRACE_MS, DEFAULT_TIMEOUT_MS};
use crate::validation::{parse_target_arg, Target};

#[derive(Parser, Debug)]
#[command(name = "portsweep")]
#[command(version)]
#[command(about = "TCP connect port scanner for a single host", long_about = None)]
pub struct Cli {
    #[arg(value_parser = parse_target_arg, help = "IPv4 address or hostname to scan. Prompts interactively when omitted.")]
    pub target: Option<Target>,

    #[arg(long, value_name = "PORT", help = "First port to scan (default: 1)")]
    pub start_port: Option<String>,

    #[arg(long, value_name = "PORT", help = "Last port to scan (default: 100)")]
    pub end_port: Option<String>,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_TIMEOUT_MS, help = "Connect timeout per port in milliseconds")]
    pub timeout: u64,

    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency, help = "Maximum probes in flight (1 scans sequentially)")]
    pub concurrency: usize,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_GRACE_MS, help = "Time in-flight probes get to finish after Ctrl+C")]
    pub grace: u64,

    #[arg(short = 'd', long, help = "Directory to try first for the report file")]
    pub output_dir: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value = "text", help = "Report file format")]
    pub format: ReportFormat,

    #[arg(long, help = "Print results to the console only, never write a file")]
    pub no_file: bool,

    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(long, help = "Hide the progress bar")]
    pub no_progress: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    #[value(name = "text", help = "Plain-text report")]
    Text,
    #[value(name = "json", help = "JSON report with every probed port")]
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
        }
    }
}

fn parse_concurrency(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("concurrency must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["portsweep"]).unwrap();
        assert!(cli.target.is_none());
        assert_eq!(cli.timeout, 500);
        assert_eq!(cli.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cli.format, ReportFormat::Text);
        assert!(!cli.no_file);
    }

    #[test]
    fn test_target_validated_at_parse_time() {
        let cli = Cli::try_parse_from(["portsweep", "10.0.0.1", "--end-port", "1024"]).unwrap();
        assert_eq!(cli.target, Some(Target::Ip(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(cli.end_port.as_deref(), Some("1024"));

        assert!(Cli::try_parse_from(["portsweep", "300.0.0.1"]).is_err());
        assert!(Cli::try_parse_from(["portsweep", "-bad-"]).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(Cli::try_parse_from(["portsweep", "-c", "0"]).is_err());
        let cli = Cli::try_parse_from(["portsweep", "-c", "1"]).unwrap();
        assert_eq!(cli.concurrency, 1);
    }

    #[test]
    fn test_json_format() {
        let cli = Cli::try_parse_from(["portsweep", "--format", "json"]).unwrap();
        assert_eq!(cli.format, ReportFormat::Json);
        assert_eq!(cli.format.extension(), "json");
    }
}
