//! Evaluator verdict parsing
//!
//! The evaluator is asked to "Return PASS or FAIL with a confidence score",
//! but its answer is free text. This extracts what it can; the raw text is
//! always kept alongside.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// Normalised to `0.0..=1.0`
    pub confidence: Option<f64>,
}

struct Patterns {
    verdict: Regex,
    percent: Regex,
    labelled: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        verdict: Regex::new(r"(?i)\b(PASS|FAIL)(?:ED|ES)?\b").expect("Invalid verdict pattern"),
        percent: Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").expect("Invalid percent pattern"),
        labelled: Regex::new(r"(?i)confidence(?:\s+score)?\s*(?:of|is|[:=])?\s*(\d+(?:\.\d+)?)(\s*/\s*10\b)?")
            .expect("Invalid confidence pattern"),
    })
}

impl Verdict {
    /// Parse evaluator output. Returns `None` when no PASS/FAIL token is present.
    pub fn parse(text: &str) -> Option<Verdict> {
        let p = patterns();

        let token = p.verdict.captures(text)?.get(1)?.as_str().to_uppercase();
        let passed = token == "PASS";

        let confidence = p
            .percent
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|v| v / 100.0)
            .or_else(|| {
                let caps = p.labelled.captures(text)?;
                let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
                if caps.get(2).is_some() {
                    Some(value / 10.0)
                } else if value > 1.0 {
                    Some(value / 100.0)
                } else {
                    Some(value)
                }
            })
            .filter(|c| (0.0..=1.0).contains(c));

        Some(Verdict { passed, confidence })
    }
}
