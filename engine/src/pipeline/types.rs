//! Pipeline state records
//!
//! Each stage consumes the record produced by the previous stage and returns
//! an extended one, so a stage can only see fields that earlier stages have
//! already filled in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The user's goal, before any stage has run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub input: String,
}

impl Goal {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Output of the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planned {
    pub input: String,
    pub plan: String,
}

/// Output of the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worked {
    pub input: String,
    pub plan: String,
    /// Memory texts retrieved for the prompt, most similar first
    pub context: Vec<String>,
    pub result: String,
}

impl Worked {
    /// Retrieved texts joined the way they appear in the worker prompt
    pub fn context_text(&self) -> String {
        self.context.join("\n")
    }
}

/// Output of the evaluator: the complete pipeline state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluated {
    pub input: String,
    pub plan: String,
    pub context: Vec<String>,
    pub result: String,
    pub evaluation: String,
}

impl Evaluated {
    /// The four logical state keys, in stage order
    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("input", self.input.as_str()),
            ("plan", self.plan.as_str()),
            ("result", self.result.as_str()),
            ("evaluation", self.evaluation.as_str()),
        ]
    }
}

/// How far a pipeline run got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    Pending,
    Planned,
    Worked,
    Evaluated,
    Done,
    Failed,
}

impl PipelinePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelinePhase::Done | PipelinePhase::Failed)
    }

    /// The phase that follows a successful step from `self`
    pub fn next(&self) -> Option<PipelinePhase> {
        match self {
            PipelinePhase::Pending => Some(PipelinePhase::Planned),
            PipelinePhase::Planned => Some(PipelinePhase::Worked),
            PipelinePhase::Worked => Some(PipelinePhase::Evaluated),
            PipelinePhase::Evaluated => Some(PipelinePhase::Done),
            PipelinePhase::Done | PipelinePhase::Failed => None,
        }
    }

    /// Move to `to`, allowing only the next phase or `Failed`.
    pub fn advance(self, to: PipelinePhase) -> Result<PipelinePhase, PhaseError> {
        if self.is_terminal() {
            return Err(PhaseError { from: self, to });
        }
        if to == PipelinePhase::Failed || self.next() == Some(to) {
            Ok(to)
        } else {
            Err(PhaseError { from: self, to })
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelinePhase::Pending => "pending",
            PipelinePhase::Planned => "planned",
            PipelinePhase::Worked => "worked",
            PipelinePhase::Evaluated => "evaluated",
            PipelinePhase::Done => "done",
            PipelinePhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid pipeline transition {from} -> {to}")]
pub struct PhaseError {
    pub from: PipelinePhase,
    pub to: PipelinePhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_walks_forward() {
        let mut phase = PipelinePhase::Pending;
        for expected in [
            PipelinePhase::Planned,
            PipelinePhase::Worked,
            PipelinePhase::Evaluated,
            PipelinePhase::Done,
        ] {
            phase = phase.advance(expected).unwrap();
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_phase_rejects_skips_and_reentry() {
        assert!(PipelinePhase::Pending
            .advance(PipelinePhase::Worked)
            .is_err());
        assert!(PipelinePhase::Worked
            .advance(PipelinePhase::Planned)
            .is_err());
        assert!(PipelinePhase::Done
            .advance(PipelinePhase::Failed)
            .is_err());
        assert!(PipelinePhase::Failed
            .advance(PipelinePhase::Failed)
            .is_err());
    }

    #[test]
    fn test_failed_reachable_from_any_running_phase() {
        for phase in [
            PipelinePhase::Pending,
            PipelinePhase::Planned,
            PipelinePhase::Worked,
            PipelinePhase::Evaluated,
        ] {
            assert_eq!(
                phase.advance(PipelinePhase::Failed).unwrap(),
                PipelinePhase::Failed
            );
        }
    }

    #[test]
    fn test_evaluated_fields_order() {
        let state = Evaluated {
            input: "X".into(),
            plan: "p".into(),
            context: vec![],
            result: "r".into(),
            evaluation: "e".into(),
        };
        let keys: Vec<_> = state.fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["input", "plan", "result", "evaluation"]);
    }
}
