use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::validation::{PortRange, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Error,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub port: u16,
    pub state: PortState,
    pub latency_ms: Option<f64>,
    /// Socket error behind an `Error` classification.
    pub cause: Option<String>,
}

impl ProbeResult {
    pub fn new(port: u16, state: PortState) -> Self {
        Self {
            port,
            state,
            latency_ms: None,
            cause: None,
        }
    }

    pub fn error(port: u16, cause: impl Into<String>) -> Self {
        Self {
            port,
            state: PortState::Error,
            latency_ms: None,
            cause: Some(cause.into()),
        }
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub open: usize,
    pub closed: usize,
    pub filtered: usize,
    pub error: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub target: Target,
    pub resolved_address: IpAddr,
    pub range: PortRange,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// True when the scan was cancelled before every port was classified.
    pub interrupted: bool,
    /// Sorted by port, one entry per classified port.
    pub results: Vec<ProbeResult>,
}

impl ScanReport {
    pub fn open_ports(&self) -> Vec<u16> {
        self.results
            .iter()
            .filter(|r| r.state == PortState::Open)
            .map(|r| r.port)
            .collect()
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for result in &self.results {
            match result.state {
                PortState::Open => counts.open += 1,
                PortState::Closed => counts.closed += 1,
                PortState::Filtered => counts.filtered += 1,
                PortState::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() == self.range.len()
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
