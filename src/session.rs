use std::fmt::Display;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use indicatif::ProgressBar;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancelListener;
use crate::cli::{Cli, ReportFormat};
use crate::error::ResolveError;
use crate::network::resolve;
use crate::output::{default_candidates, format_summary, format_text, locate_writable_directory, ReportWriter};
use crate::prompt::Prompter;
use crate::scanner::{progress_bar, Prober, ScanConfig, ScanReport, Scanner, TcpConnectProber};
use crate::validation::{validate_port_range, PortRange, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    CollectingInput,
    Resolving,
    Scanning,
    Reporting,
    Done,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Cancelled)
    }
}

#[derive(Debug)]
pub enum SessionOutcome {
    /// The scan ran, possibly cut short by an interrupt.
    Completed {
        report: ScanReport,
        saved_to: Option<PathBuf>,
    },
    Cancelled,
    ResolutionFailed(ResolveError),
}

impl SessionOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Completed { .. } | SessionOutcome::Cancelled => 0,
            SessionOutcome::ResolutionFailed(_) => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Preset target; when set no prompts are shown.
    pub target: Option<Target>,
    pub start_port: Option<String>,
    pub end_port: Option<String>,
    pub scan: ScanConfig,
    /// Output directories to try in order. Empty means console only.
    pub output_candidates: Vec<PathBuf>,
    pub format: ReportFormat,
    pub show_progress: bool,
}

impl SessionConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let output_candidates = if cli.no_file {
            Vec::new()
        } else {
            default_candidates(cli.output_dir.as_deref())
        };

        Self {
            target: cli.target.clone(),
            start_port: cli.start_port.clone(),
            end_port: cli.end_port.clone(),
            scan: ScanConfig {
                timeout: Duration::from_millis(cli.timeout),
                concurrency: cli.concurrency,
                grace: Duration::from_millis(cli.grace),
            },
            output_candidates,
            format: cli.format,
            show_progress: !cli.no_progress,
        }
    }
}

/// Drives one scan from input to report:
/// `CollectingInput -> Resolving -> Scanning -> Reporting -> Done`,
/// with `Cancelled` reachable until scanning starts. An interrupt during
/// the scan still goes through `Reporting` with the partial results.
pub struct Session<R, W> {
    config: SessionConfig,
    prompter: Prompter<R, W>,
    cancel: CancelListener,
    prober: Arc<dyn Prober>,
    state: SessionState,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(config: SessionConfig, prompter: Prompter<R, W>, cancel: CancelListener) -> Self {
        Self {
            config,
            prompter,
            cancel,
            prober: Arc::new(TcpConnectProber),
            state: SessionState::CollectingInput,
        }
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn into_output(self) -> W {
        self.prompter.into_inner().1
    }

    pub async fn run(&mut self) -> Result<SessionOutcome> {
        self.transition(SessionState::CollectingInput);
        let output_dir = self.select_output_dir()?;

        let Some((target, range)) = self.collect_input().await? else {
            return self.cancelled();
        };

        self.transition(SessionState::Resolving);
        let Some(address) = self.resolve(&target).await? else {
            return self.cancelled();
        };
        let address = match address {
            Ok(address) => address,
            Err(e) => {
                self.say(format!("{} {}", "❌ Error:".red().bold(), e))?;
                self.transition(SessionState::Done);
                return Ok(SessionOutcome::ResolutionFailed(e));
            }
        };

        self.transition(SessionState::Scanning);
        let report = self.scan(&target, address, range).await?;

        self.transition(SessionState::Reporting);
        let saved_to = self.report(&report, output_dir)?;

        self.transition(SessionState::Done);
        Ok(SessionOutcome::Completed { report, saved_to })
    }

    fn select_output_dir(&mut self) -> Result<Option<PathBuf>> {
        if self.config.output_candidates.is_empty() {
            return Ok(None);
        }

        match locate_writable_directory(&self.config.output_candidates) {
            Some(dir) => {
                self.say(format!("Using output directory: {}", dir.display()))?;
                Ok(Some(dir))
            }
            None => {
                warn!(candidates = self.config.output_candidates.len(), "no writable output directory");
                self.say(format!(
                    "{} Could not find a writable directory for output. Results will be printed to the console.",
                    "⚠️".yellow()
                ))?;
                Ok(None)
            }
        }
    }

    async fn collect_input(&mut self) -> Result<Option<(Target, PortRange)>> {
        if let Some(target) = self.config.target.clone() {
            let range = validate_port_range(
                self.config.start_port.as_deref().unwrap_or(""),
                self.config.end_port.as_deref().unwrap_or(""),
            )
            .context("invalid port range")?;
            return Ok(Some((target, range)));
        }

        let Some(target) = self.prompter.target(&mut self.cancel).await? else {
            return Ok(None);
        };
        let Some(range) = self.prompter.port_range(&mut self.cancel).await? else {
            return Ok(None);
        };
        Ok(Some((target, range)))
    }

    /// `None` when interrupted while the lookup is pending.
    async fn resolve(&mut self, target: &Target) -> Result<Option<Result<IpAddr, ResolveError>>> {
        self.say(format!("\n🔎 Resolving {}...", target))?;

        let resolved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            resolved = resolve(target) => resolved,
        };

        if let Ok(address) = &resolved {
            self.say(format!("{} Resolved to {}", "✅".green(), address))?;
        }
        Ok(Some(resolved))
    }

    async fn scan(&mut self, target: &Target, address: IpAddr, range: PortRange) -> Result<ScanReport> {
        self.say(format!("\n🔎 Starting scan of {} ({})", target, address))?;
        self.say(format!("📍 Port range: {}", range))?;
        self.say("⏳ Scanning... (Press Ctrl+C to stop)\n")?;

        let progress = if self.config.show_progress {
            progress_bar(range.len())
        } else {
            ProgressBar::hidden()
        };
        let (tx, mut open_ports) = mpsc::unbounded_channel();
        let scanner = Scanner::with_prober(self.config.scan, Arc::clone(&self.prober))
            .with_progress(progress.clone())
            .with_open_port_sink(tx);

        let scan = scanner.scan(target, address, range, self.cancel.clone());
        tokio::pin!(scan);
        let report = loop {
            tokio::select! {
                report = &mut scan => break report,
                Some(port) = open_ports.recv() => self.announce_open(&progress, port)?,
            }
        };
        while let Ok(port) = open_ports.try_recv() {
            self.announce_open(&progress, port)?;
        }

        info!(
            %address,
            open = report.open_ports().len(),
            classified = report.results.len(),
            interrupted = report.interrupted,
            "scan done"
        );
        if report.interrupted {
            self.say(format!("\n{} Scanning stopped by user.", "⚠️".yellow()))?;
        }
        Ok(report)
    }

    /// Persist the report if possible, otherwise print it. Only a failing
    /// console is an error.
    fn report(&mut self, report: &ScanReport, output_dir: Option<PathBuf>) -> Result<Option<PathBuf>> {
        let summary = format_summary(report);
        self.say(summary.trim_end()).context("console output failed")?;

        let saved_to = match output_dir {
            Some(dir) => match ReportWriter::new(self.config.format, dir).write(report) {
                Ok(path) => {
                    self.say(format!("\n{} Results saved to: {}", "✅".green(), path.display()))?;
                    Some(path)
                }
                Err(e) => {
                    self.say(format!("\n{} Could not save results to file: {}", "⚠️".yellow(), e))?;
                    None
                }
            },
            None => None,
        };

        if saved_to.is_none() {
            self.say("Results from scan:")?;
            self.say(format_text(report).trim_end())
                .context("console output failed")?;
        }

        self.say(format!("\n{} Scan finished!", "✅".green()))?;
        Ok(saved_to)
    }

    fn announce_open(&mut self, progress: &ProgressBar, port: u16) -> io::Result<()> {
        let line = format!("{} Port {} is open", "✅".green(), port);
        progress.suspend(|| self.say(line))
    }

    fn cancelled(&mut self) -> Result<SessionOutcome> {
        self.transition(SessionState::Cancelled);
        self.say("Exiting program...")?;
        Ok(SessionOutcome::Cancelled)
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    fn say(&mut self, line: impl Display) -> io::Result<()> {
        let out = self.prompter.out();
        writeln!(out, "{}", line)?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::scanner::{PortState, ProbeResult};
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    type TestSession = Session<&'static [u8], Vec<u8>>;

    fn config(candidates: Vec<PathBuf>) -> SessionConfig {
        SessionConfig {
            target: None,
            start_port: None,
            end_port: None,
            scan: ScanConfig {
                timeout: Duration::from_millis(300),
                concurrency: 20,
                grace: Duration::from_millis(200),
            },
            output_candidates: candidates,
            format: ReportFormat::Text,
            show_progress: false,
        }
    }

    fn session(config: SessionConfig, input: &'static str, cancel: CancelListener) -> TestSession {
        Session::new(config, Prompter::new(input.as_bytes(), Vec::new()), cancel)
    }

    fn leak(s: String) -> &'static str {
        Box::leak(s.into_boxed_str())
    }

    #[tokio::test]
    async fn test_exit_keyword_cancels_session() {
        let dir = TempDir::new().unwrap();
        let (_handle, cancel) = cancel_pair();
        let mut s = session(config(vec![dir.path().to_path_buf()]), "exit\n", cancel);

        let outcome = s.run().await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(s.state(), SessionState::Cancelled);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_interactive_scan_writes_report() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = TempDir::new().unwrap();
        let (_handle, cancel) = cancel_pair();

        let input = leak(format!("127.0.0.1\n{}\n{}\n", port, port));
        let mut s = session(config(vec![dir.path().to_path_buf()]), input, cancel);

        let outcome = s.run().await.unwrap();
        assert_eq!(s.state(), SessionState::Done);
        let SessionOutcome::Completed { report, saved_to } = outcome else {
            panic!("scan should complete");
        };
        assert_eq!(report.open_ports(), vec![port]);

        let path = saved_to.unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("Scan Results for 127.0.0.1 (127.0.0.1)\n"));
        assert!(contents.contains(&format!("- Port {}\n", port)));

        let out = String::from_utf8(s.into_output()).unwrap();
        assert!(out.contains(&format!("Port {} is open", port)));
    }

    #[tokio::test]
    async fn test_console_fallback_without_writable_dir() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let (_handle, cancel) = cancel_pair();

        let mut cfg = config(vec![blocker.join("out")]);
        cfg.target = Some(Target::Ip(Ipv4Addr::LOCALHOST));
        cfg.start_port = Some(port.to_string());
        cfg.end_port = Some(port.to_string());
        let mut s = session(cfg, "", cancel);

        let outcome = s.run().await.unwrap();
        let SessionOutcome::Completed { saved_to, .. } = &outcome else {
            panic!("scan should complete");
        };
        assert!(saved_to.is_none());
        assert_eq!(outcome.exit_code(), 0);

        let out = String::from_utf8(s.into_output()).unwrap();
        assert!(out.contains("Could not find a writable directory"));
        assert!(out.contains("Results from scan:"));
        assert!(out.contains(&format!("- Port {}", port)));
    }

    #[tokio::test]
    async fn test_resolution_failure_ends_session() {
        let (_handle, cancel) = cancel_pair();
        let mut cfg = config(Vec::new());
        cfg.target = Some(Target::Hostname("no-such-host.invalid".to_string()));
        let mut s = session(cfg, "", cancel);

        let outcome = s.run().await.unwrap();
        assert!(matches!(outcome, SessionOutcome::ResolutionFailed(_)));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(s.state(), SessionState::Done);
    }

    #[tokio::test]
    async fn test_interrupt_before_scan_cancels() {
        let (handle, cancel) = cancel_pair();
        handle.cancel();
        let mut cfg = config(Vec::new());
        cfg.target = Some(Target::Ip(Ipv4Addr::LOCALHOST));
        let mut s = session(cfg, "", cancel);

        let outcome = s.run().await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert_eq!(s.state(), SessionState::Cancelled);
    }

    #[tokio::test]
    async fn test_invalid_preset_range_is_an_error() {
        let (_handle, cancel) = cancel_pair();
        let mut cfg = config(Vec::new());
        cfg.target = Some(Target::Ip(Ipv4Addr::LOCALHOST));
        cfg.start_port = Some("200".to_string());
        cfg.end_port = Some("100".to_string());
        let mut s = session(cfg, "", cancel);

        assert!(s.run().await.is_err());
    }

    struct SlowProber;

    #[async_trait]
    impl Prober for SlowProber {
        async fn probe(&self, _target: IpAddr, port: u16, _limit: Duration) -> ProbeResult {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if port == 3 {
                ProbeResult::new(port, PortState::Open)
            } else {
                ProbeResult::new(port, PortState::Closed)
            }
        }
    }

    #[tokio::test]
    async fn test_interrupt_mid_scan_reports_partial_results() {
        let dir = TempDir::new().unwrap();
        let (handle, cancel) = cancel_pair();
        let mut cfg = config(vec![dir.path().to_path_buf()]);
        cfg.target = Some(Target::Ip(Ipv4Addr::LOCALHOST));
        cfg.start_port = Some("1".to_string());
        cfg.end_port = Some("200".to_string());
        cfg.scan.concurrency = 2;
        let mut s = session(cfg, "", cancel).with_prober(Arc::new(SlowProber));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.cancel();
        });

        let outcome = s.run().await.unwrap();
        assert_eq!(s.state(), SessionState::Done);
        let SessionOutcome::Completed { report, saved_to } = outcome else {
            panic!("interrupted scan still reports");
        };
        assert!(report.interrupted);
        assert!(report.results.len() >= 3 && report.results.len() < 200);
        assert_eq!(report.open_ports(), vec![3]);

        let contents = std::fs::read_to_string(saved_to.unwrap()).unwrap();
        assert!(contents.contains("Scan interrupted:"));
        assert!(contents.contains("- Port 3\n"));

        let out = String::from_utf8(s.into_output()).unwrap();
        assert!(out.contains("Scanning stopped by user."));
        assert_eq!(out.matches("Port 3 is open").count(), 1);
    }
}
