//! Validation-repair engine: coerce an untrusted free-text generator into
//! schema-valid structured output or format-valid long-form text.
//!
//! The loop is a fixed chain of Result-returning stages, each stage's
//! failure feeding the next stage's input:
//!
//! 1. generate with the primary prompt at low temperature, parse + validate
//!    the raw text;
//! 2. on failure, try the fallback extraction (first balanced JSON object
//!    for JSON candidates; nothing for markdown) and parse + validate that;
//! 3. on failure, regenerate once at lower temperature from a repair prompt
//!    carrying the error and the invalid output;
//! 4. on failure, a terminal [`Error::Exhausted`] — retries beyond this are
//!    the queue's business, governed by the message's attempt counter.
//!
//! Transport errors from the generator are never retried here; they
//! propagate immediately.

pub mod module;
pub mod outline;

use crate::error::{Error, Result};
use crate::llm::TextGenerator;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use tracing::debug;

/// Prompt pair plus the temperatures for the primary and repair rounds.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub repair_temperature: f64,
}

/// Fallback extraction applied between the raw and repair rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Scan for the first balanced top-level JSON object in the raw text.
    FirstJsonObject,
    /// No extraction applies (markdown candidates): the raw text already
    /// was validated directly.
    None,
}

/// Drive the generate → parse → validate → extract → repair chain.
///
/// `kind` labels telemetry only. `parse` and `validate` should fail with
/// [`Error::Parse`] / [`Error::Validation`]; their messages end up verbatim
/// in the repair prompt.
pub async fn coerce<G, T, P, V>(
    generator: &G,
    kind: &str,
    spec: &PromptSpec,
    recovery: Recovery,
    parse: P,
    validate: V,
) -> Result<T>
where
    G: TextGenerator + ?Sized,
    T: Send,
    P: Fn(&str) -> Result<T> + Send + Sync,
    V: Fn(&T) -> Result<()> + Send + Sync,
{
    let attempt = |text: &str| -> Result<T> {
        let candidate = parse(text)?;
        validate(&candidate)?;
        Ok(candidate)
    };

    let raw = generator
        .generate_text(&spec.system, &spec.user, spec.temperature)
        .await?;

    let mut last_err = match attempt(&raw) {
        Ok(candidate) => {
            record_round(kind, "primary", "ok");
            return Ok(candidate);
        }
        Err(e) => e,
    };
    record_round(kind, "primary", "invalid");
    debug!(kind, error = %last_err, "primary output did not validate");

    // The invalid output echoed back in the repair prompt: prefer the
    // extracted fragment when there is one, it is what failed last.
    let mut invalid = raw.as_str();

    if recovery == Recovery::FirstJsonObject {
        if let Some(fragment) = extract_first_json_object(&raw) {
            invalid = fragment;
            match attempt(fragment) {
                Ok(candidate) => {
                    record_round(kind, "extracted", "ok");
                    return Ok(candidate);
                }
                Err(e) => last_err = e,
            }
            record_round(kind, "extracted", "invalid");
            debug!(kind, error = %last_err, "extracted fragment did not validate");
        }
    }

    let repair_user = repair_prompt(&spec.user, &last_err, invalid);
    let repaired = generator
        .generate_text(&spec.system, &repair_user, spec.repair_temperature)
        .await?;

    match attempt(repaired.trim()) {
        Ok(candidate) => {
            record_round(kind, "repaired", "ok");
            Ok(candidate)
        }
        Err(e) => {
            record_round(kind, "repaired", "invalid");
            Err(Error::Exhausted(e.to_string()))
        }
    }
}

/// Extract the first complete top-level JSON object by brace counting:
/// scan to the first `{`, then count `{` as +1 and `}` as -1; the first
/// return to zero closes the object. Braces inside string literals are
/// not special-cased.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (i, byte) in text.bytes().enumerate().skip(start) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn repair_prompt(original: &str, error: &Error, invalid: &str) -> String {
    format!(
        "{original}\n\nPREVIOUS ATTEMPT FAILED:\nError: {error}\n\nInvalid output:\n{invalid}\n\nReturn only the corrected output. Fix the reported problem without changing anything that was already valid."
    )
}

fn record_round(kind: &str, round: &'static str, result: &'static str) {
    metrics::generation_rounds().add(
        1,
        &[
            KeyValue::new("kind", kind.to_string()),
            KeyValue::new("round", round),
            KeyValue::new("result", result),
        ],
    );
}
