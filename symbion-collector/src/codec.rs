/**
 * CODEC EXPOSITION - Lecture/écriture d'une ligne au format texte Prometheus
 *
 * RÔLE : `parse` transforme `index{k="v",...} <float>` en `Sample`,
 * `compose` fait l'inverse de manière déterministe (clés triées, valeur en %e).
 *
 * LIMITE CONNUE : pas d'échappement. Une valeur contenant `{`, `}`, `,`, `=`
 * ou `"` n'est pas supportée.
 */

use crate::models::Sample;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("empty index in line: {0}")]
    EmptyIndex(String),
    #[error("unterminated label block in line: {0}")]
    UnterminatedLabels(String),
    #[error("malformed pair: {0}")]
    MalformedPair(String),
    #[error("label value is not quoted: {0}")]
    UnquotedValue(String),
    #[error("invalid value {value:?}: {reason}")]
    InvalidValue { value: String, reason: String },
}

/// Parse one exposition line into a [`Sample`].
pub fn parse(line: &str) -> Result<Sample, CodecError> {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(open) = line.find('{') else {
        return parse_unlabeled(line);
    };

    let index = line[..open].trim();
    if index.is_empty() {
        return Err(CodecError::EmptyIndex(line.to_string()));
    }

    let close = line[open..]
        .find('}')
        .map(|pos| open + pos)
        .ok_or_else(|| CodecError::UnterminatedLabels(line.to_string()))?;

    let labels = parse_labels(&line[open + 1..close])?;
    let value = parse_value(&line[close + 1..])?;

    Ok(Sample {
        index: index.to_string(),
        labels,
        value,
    })
}

// forme `index valeur`, sans bloc de labels
fn parse_unlabeled(line: &str) -> Result<Sample, CodecError> {
    let trimmed = line.trim();
    let (index, rest) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    if index.is_empty() {
        return Err(CodecError::EmptyIndex(line.to_string()));
    }
    Ok(Sample {
        index: index.to_string(),
        labels: BTreeMap::new(),
        value: parse_value(rest)?,
    })
}

fn parse_labels(block: &str) -> Result<BTreeMap<String, String>, CodecError> {
    let mut labels = BTreeMap::new();

    for pair in block.split(',') {
        if pair.trim().is_empty() {
            continue;
        }
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| CodecError::MalformedPair(pair.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CodecError::MalformedPair(pair.to_string()));
        }

        let raw = raw.trim();
        let value = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .ok_or_else(|| CodecError::UnquotedValue(pair.to_string()))?;

        labels.insert(key.to_string(), value.to_string());
    }

    Ok(labels)
}

fn parse_value(rest: &str) -> Result<f64, CodecError> {
    let rest = rest.trim();
    rest.parse::<f64>().map_err(|e| CodecError::InvalidValue {
        value: rest.to_string(),
        reason: e.to_string(),
    })
}

/// Serialize a sample as `index{k="v",...} <value>\n`.
pub fn compose(sample: &Sample) -> String {
    let labels = sample
        .labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{{{}}} {}\n", sample.index, labels, format_value(sample.value))
}

/// `%e` formatting: 6 fractional digits, signed exponent of at least 2 digits.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let formatted = format!("{value:.6e}");
    // Rust écrit "3.140000e0", on veut "3.140000e+00"
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => formatted,
    }
}
