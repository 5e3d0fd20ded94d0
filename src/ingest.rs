// src/ingest.rs
//! The ingestion loop: lines in, fix updates out

use crate::{
    error::GpsError,
    gps::{nmea, FixAggregator, ParseError},
    link::{LineEvent, LinkSupervisor, SerialLink},
};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Lines between two counter reports in the debug log
const STATS_REPORT_EVERY: u64 = 1000;

/// What happened to one line
#[derive(Debug)]
pub enum LineOutcome {
    /// Decoded and folded into the fix; carries the sentence type
    Applied(String),
    Blank,
    /// Did not start with `$`
    NotSentence,
    Rejected(ParseError),
    /// Decoded, but the aggregator refused it
    Failed(GpsError),
}

/// Running totals, reported at debug level every `STATS_REPORT_EVERY` lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub applied: u64,
    pub discarded: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl IngestStats {
    /// Non-blank lines seen so far
    pub fn total(&self) -> u64 {
        self.applied + self.discarded + self.rejected + self.failed
    }

    fn report_due(&self) -> bool {
        let total = self.total();
        total > 0 && total % STATS_REPORT_EVERY == 0
    }
}

/// Decodes lines and feeds them to the aggregator, one at a time and in
/// arrival order. No per-line failure ever leaves this type.
pub struct IngestionLoop {
    aggregator: FixAggregator,
    stats: IngestStats,
}

impl IngestionLoop {
    pub fn new(aggregator: FixAggregator) -> Self {
        Self {
            aggregator,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Process a single line from the receiver
    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Blank;
        }
        if !line.starts_with('$') {
            trace!("discarding non-NMEA line: {:?}", line);
            self.stats.discarded += 1;
            return LineOutcome::NotSentence;
        }

        let record = match nmea::parse_sentence(line) {
            Ok(record) => record,
            Err(e) => {
                debug!("parse error: {} in {:?}", e, line);
                self.stats.rejected += 1;
                return LineOutcome::Rejected(e);
            }
        };

        match self.aggregator.apply(&record) {
            Ok(()) => {
                self.stats.applied += 1;
                LineOutcome::Applied(record.kind().to_string())
            }
            Err(e) => {
                warn!("dropping {} sentence: {}", record.kind(), e);
                self.stats.failed += 1;
                LineOutcome::Failed(e)
            }
        }
    }

    /// Pull lines from the supervisor forever.
    pub async fn run<L: SerialLink>(mut self, mut supervisor: LinkSupervisor<L>) {
        loop {
            if let LineEvent::Line(line) = supervisor.next_line().await {
                let outcome = self.handle_line(&line);
                if !matches!(outcome, LineOutcome::Blank) && self.stats.report_due() {
                    let stats = self.stats;
                    debug!(
                        "ingested {} lines: {} applied, {} discarded, {} rejected, {} failed",
                        stats.total(),
                        stats.applied,
                        stats.discarded,
                        stats.rejected,
                        stats.failed
                    );
                }
            }
        }
    }

    /// Run on its own task; the handle is only useful for aborting.
    pub fn spawn<L>(self, supervisor: LinkSupervisor<L>) -> JoinHandle<()>
    where
        L: SerialLink + 'static,
    {
        tokio::spawn(self.run(supervisor))
    }
}
