//! Placeholder secret generation
//!
//! Secrets templates carry tokens of the form `CHANGEME<N>`. Each token is
//! replaced by `N` random alphanumeric characters. The substitution itself
//! is a pure function over lines; [`generate_file`] wraps it with file I/O
//! and the degraded mode used when no secure generator exists.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use rand::RngCore;
use regex::{Captures, Regex};

use crate::error::{HkError, Result};

/// Longest secret a placeholder may request
pub const MAX_SECRET_LEN: usize = 4096;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"CHANGEME([0-9]+)").expect("static regex"))
}

/// Source of random secret strings
pub trait SecretSource {
    /// Produce `len` printable characters
    fn generate(&mut self, len: usize) -> String;
}

/// Operating-system CSPRNG
#[derive(Debug)]
pub struct OsSecretSource {
    _probed: (),
}

impl OsSecretSource {
    /// Probe the OS generator, failing with `GeneratorUnavailable` if it cannot produce bytes
    pub fn probe() -> Result<Self> {
        let mut buf = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| HkError::GeneratorUnavailable(e.to_string()))?;
        Ok(Self { _probed: () })
    }
}

impl SecretSource for OsSecretSource {
    fn generate(&mut self, len: usize) -> String {
        Alphanumeric.sample_string(&mut OsRng, len)
    }
}

/// Count the placeholders in `text`
pub fn count_placeholders(text: &str) -> usize {
    placeholder_pattern().find_iter(text).count()
}

/// Replace every `CHANGEME<N>` token in `lines`, returning the new lines.
///
/// Lines without a usable token are returned unchanged. Tokens whose
/// length does not parse or exceeds [`MAX_SECRET_LEN`] are left in place.
pub fn fill_placeholders<S>(lines: &[String], source: &mut S) -> Vec<String>
where
    S: SecretSource + ?Sized,
{
    let pattern = placeholder_pattern();
    lines
        .iter()
        .map(|line| {
            pattern
                .replace_all(line, |caps: &Captures<'_>| {
                    match caps[1].parse::<usize>() {
                        Ok(len) if len <= MAX_SECRET_LEN => source.generate(len),
                        _ => caps[0].to_string(),
                    }
                })
                .into_owned()
        })
        .collect()
}

/// What happened to a secrets file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// Placeholders were replaced and the file rewritten
    Filled(usize),
    /// Nothing to replace
    NoPlaceholders,
    /// No generator; placeholders left for the operator
    Skipped(usize),
}

/// Fill the placeholders of a file in place.
///
/// `source` is `Err` when the generator probe failed; the file is then left
/// untouched and the caller is expected to warn the operator.
pub fn generate_file(path: &Path, source: Result<&mut dyn SecretSource>) -> Result<FillOutcome> {
    let content = fs::read_to_string(path)?;
    let pending = count_placeholders(&content);
    if pending == 0 {
        return Ok(FillOutcome::NoPlaceholders);
    }

    let source = match source {
        Ok(source) => source,
        Err(e) if !e.is_fatal() => {
            tracing::warn!("{}; leaving {} placeholders in {:?}", e, pending, path);
            return Ok(FillOutcome::Skipped(pending));
        }
        Err(e) => return Err(e),
    };

    // split_inclusive keeps each terminator so untouched lines stay byte-identical
    let lines: Vec<String> = content.split_inclusive('\n').map(String::from).collect();
    let filled = fill_placeholders(&lines, source);
    fs::write(path, filled.concat())?;

    tracing::info!("Generated {} secrets in {:?}", pending, path);
    Ok(FillOutcome::Filled(pending))
}
