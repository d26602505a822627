//! Pipeline progress reporting.
//!
//! `reldata generate` reports which phase it is in and how far along it is,
//! so long LLM-bound runs are observable. Progress goes to **stderr** so
//! stdout stays parseable for scripts.

use std::io::Write;

/// Phase of the generation pipeline, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelinePhase {
    LoadingQueries,
    FetchingDocuments,
    GeneratingQueries,
    CartesianScoring,
    ExpandingDocuments,
    ScoringExpansion,
    Writing,
}

impl PipelinePhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadingQueries => "loading_queries",
            Self::FetchingDocuments => "fetching_documents",
            Self::GeneratingQueries => "generating_queries",
            Self::CartesianScoring => "cartesian_scoring",
            Self::ExpandingDocuments => "expanding_documents",
            Self::ScoringExpansion => "scoring_expansion",
            Self::Writing => "writing",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::LoadingQueries => "loading user queries",
            Self::FetchingDocuments => "fetching seed documents",
            Self::GeneratingQueries => "generating queries",
            Self::CartesianScoring => "scoring query x seed pairs",
            Self::ExpandingDocuments => "expanding document set",
            Self::ScoringExpansion => "scoring expanded pairs",
            Self::Writing => "writing output",
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PipelineProgressEvent {
    /// A phase began; `total` is the number of work items when known.
    Started {
        phase: PipelinePhase,
        total: Option<u64>,
    },
    /// `n` of `total` work items of the phase are done.
    Advanced {
        phase: PipelinePhase,
        n: u64,
        total: u64,
    },
}

/// Receives pipeline progress. Implementations write to stderr (human or JSON).
pub trait PipelineProgress: Send + Sync {
    fn report(&self, event: PipelineProgressEvent);
}

/// Human-friendly progress: "generate  scoring expanded pairs  120 / 1,000".
pub struct StderrProgress;

impl PipelineProgress for StderrProgress {
    fn report(&self, event: PipelineProgressEvent) {
        let line = match &event {
            PipelineProgressEvent::Started { phase, total: None } => {
                format!("generate  {}...\n", phase.label())
            }
            PipelineProgressEvent::Started {
                phase,
                total: Some(total),
            } => format!("generate  {}  ({} items)\n", phase.label(), format_number(*total)),
            PipelineProgressEvent::Advanced { phase, n, total } => format!(
                "generate  {}  {} / {}\n",
                phase.label(),
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &PipelineProgressEvent) -> serde_json::Value {
        match event {
            PipelineProgressEvent::Started { phase, total } => serde_json::json!({
                "event": "phase",
                "phase": phase.as_str(),
                "total": total
            }),
            PipelineProgressEvent::Advanced { phase, n, total } => serde_json::json!({
                "event": "progress",
                "phase": phase.as_str(),
                "n": n,
                "total": total
            }),
        }
    }
}

impl PipelineProgress for JsonProgress {
    fn report(&self, event: PipelineProgressEvent) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", Self::to_json(&event));
        let _ = stderr.flush();
    }
}

pub struct NoProgress;

impl PipelineProgress for NoProgress {
    fn report(&self, _event: PipelineProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn PipelineProgress> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events() {
        let started = JsonProgress::to_json(&PipelineProgressEvent::Started {
            phase: PipelinePhase::GeneratingQueries,
            total: None,
        });
        assert_eq!(started["event"], "phase");
        assert_eq!(started["phase"], "generating_queries");
        assert!(started["total"].is_null());

        let advanced = JsonProgress::to_json(&PipelineProgressEvent::Advanced {
            phase: PipelinePhase::ScoringExpansion,
            n: 3,
            total: 10,
        });
        assert_eq!(advanced["n"], 3);
        assert_eq!(advanced["total"], 10);
    }
}
