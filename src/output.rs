use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use colored::*;
use tracing::{debug, warn};

use crate::cli::ReportFormat;
use crate::error::PersistenceError;
use crate::scanner::results::ScanReport;

pub const APP_DIR: &str = "port_scanner";
pub const CWD_DIR: &str = "scan_results";
const PROBE_FILE: &str = ".write_probe";

/// Ordered output directory candidates: an explicit choice first, then the
/// temp directory, the home directory and finally the working directory.
pub fn default_candidates(preferred: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = preferred {
        candidates.push(dir.to_path_buf());
    }
    candidates.push(std::env::temp_dir().join(APP_DIR));
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(APP_DIR));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(CWD_DIR));
    }
    candidates
}

/// First candidate that can be created and written to, if any.
pub fn locate_writable_directory(candidates: &[PathBuf]) -> Option<PathBuf> {
    for dir in candidates {
        match probe_writable(dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "output directory selected");
                return Some(dir.clone());
            }
            Err(e) => debug!(dir = %dir.display(), error = %e, "output directory rejected"),
        }
    }
    None
}

fn probe_writable(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(format!("{}_{}", PROBE_FILE, std::process::id()));
    fs::write(&probe, b"probe")?;
    fs::remove_file(&probe)
}

pub struct ReportWriter {
    format: ReportFormat,
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(format: ReportFormat, dir: PathBuf) -> Self {
        Self { format, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, report: &ScanReport) -> String {
        // ':' is not allowed in Windows file names
        let address = report.resolved_address.to_string().replace(':', "_");
        format!(
            "scan_{}_{}.{}",
            address,
            report.started_at.format("%Y%m%d_%H%M%S"),
            self.format.extension()
        )
    }

    pub fn render(&self, report: &ScanReport) -> Result<String, PersistenceError> {
        match self.format {
            ReportFormat::Text => Ok(format_text(report)),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        }
    }

    pub fn write(&self, report: &ScanReport) -> Result<PathBuf, PersistenceError> {
        let contents = self.render(report)?;
        let path = self.dir.join(self.file_name(report));

        let write = |path: &Path| -> std::io::Result<()> {
            let file = File::create(path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(contents.as_bytes())?;
            writer.flush()
        };

        write(&path).map_err(|source| {
            warn!(path = %path.display(), error = %source, "report write failed");
            PersistenceError::Write {
                path: path.clone(),
                source,
            }
        })?;

        Ok(path)
    }
}

pub fn format_text(report: &ScanReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Scan Results for {} ({})\n",
        report.target, report.resolved_address
    ));
    output.push_str(&format!(
        "Scan Time: {}\n",
        report.finished_at.format("%Y-%m-%d %H:%M:%S%.6f")
    ));
    output.push_str(&format!(
        "Scanned ports {} to {}\n",
        report.range.start(),
        report.range.end()
    ));
    if report.interrupted {
        output.push_str(&format!(
            "Scan interrupted: {} of {} ports classified\n",
            report.results.len(),
            report.range.len()
        ));
    }
    output.push('\n');

    let open = report.open_ports();
    if open.is_empty() {
        output.push_str("No open ports found.\n");
    } else {
        output.push_str("Open ports:\n");
        for port in open {
            output.push_str(&format!("- Port {}\n", port));
        }
    }

    output
}

/// Colored one-screen summary printed after every scan.
pub fn format_summary(report: &ScanReport) -> String {
    let counts = report.counts();
    let mut output = String::new();

    let headline = if report.interrupted {
        "SCAN INTERRUPTED".truecolor(255, 140, 0).bold()
    } else {
        "SCAN COMPLETE".truecolor(0, 255, 65).bold()
    };
    output.push_str(&format!("\n{}\n", headline));

    output.push_str(&format!(
        "{} {} {} {} {}\n",
        "⟦".truecolor(64, 64, 64),
        format!("{} ({})", report.target, report.resolved_address)
            .truecolor(255, 255, 255)
            .bold(),
        "•".truecolor(0, 255, 65),
        format!("{}ms", report.elapsed_ms()).truecolor(0, 212, 255).bold(),
        "⟧".truecolor(64, 64, 64)
    ));

    output.push_str(&format!(
        "{} open • {} closed • {} filtered • {} error ({} of {} ports)\n",
        counts.open.to_string().truecolor(0, 255, 65).bold(),
        counts.closed,
        counts.filtered.to_string().truecolor(255, 140, 0),
        counts.error.to_string().red(),
        report.results.len(),
        report.range.len()
    ));

    for result in report.results.iter().filter(|r| r.cause.is_some()) {
        if let Some(cause) = &result.cause {
            output.push_str(&format!(
                "  {} {}\n",
                format!("port {}:", result.port).red(),
                cause.truecolor(128, 128, 128)
            ));
        }
    }

    output
}
