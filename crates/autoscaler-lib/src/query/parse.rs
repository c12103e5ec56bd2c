//! Parsers for metrics store results and exposition text
//!
//! Both produce [`QueryRow`]s so results from the store and lines rendered
//! by the exporter can be compared directly.

use crate::error::{Result, ScalerError};
use serde::Deserialize;
use std::collections::HashMap;

/// Label that carries the metric name in exposition rows
pub const NAME_LABEL: &str = "__name__";

/// One result row: a label set and a sample value
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub labels: HashMap<String, String>,
    pub timestamp: Option<f64>,
    pub value: f64,
}

impl QueryRow {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    value: Vec<serde_json::Value>,
}

/// Parse an instant-query response body
///
/// Rows with fewer than two value elements, or whose value is not a
/// numeric string, are dropped rather than failing the whole query.
pub fn parse_query_response(query: &str, body: &str) -> Result<Vec<QueryRow>> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| ScalerError::MalformedResponse {
            source_name: "metrics store",
            message: e.to_string(),
        })?;

    if response.status != "success" {
        return Err(ScalerError::QueryFailed {
            query: query.to_string(),
            status: response.status,
        });
    }

    let rows = response
        .data
        .map(|d| d.result)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|result| {
            if result.value.len() < 2 {
                return None;
            }
            let value = result.value[1].as_str()?.parse::<f64>().ok()?;
            Some(QueryRow {
                labels: result.metric,
                timestamp: result.value[0].as_f64(),
                value,
            })
        })
        .collect();

    Ok(rows)
}

/// Parse sample lines of a text exposition
///
/// Comments and blank lines are skipped, as are lines that do not parse.
/// The metric name is stored under [`NAME_LABEL`].
pub fn parse_exposition(text: &str) -> Vec<QueryRow> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_sample_line)
        .collect()
}

fn parse_sample_line(line: &str) -> Option<QueryRow> {
    let (name, rest) = match line.find('{') {
        Some(open) => (&line[..open], &line[open + 1..]),
        None => {
            let (name, value) = line.split_once(' ')?;
            let mut labels = HashMap::new();
            labels.insert(NAME_LABEL.to_string(), name.to_string());
            return Some(QueryRow {
                labels,
                timestamp: None,
                value: value.trim().parse().ok()?,
            });
        }
    };

    let (mut labels, value_part) = parse_labels(rest)?;
    labels.insert(NAME_LABEL.to_string(), name.to_string());

    let mut fields = value_part.split_whitespace();
    let value = fields.next()?.parse().ok()?;
    let timestamp = fields.next().and_then(|t| t.parse().ok());

    Some(QueryRow {
        labels,
        timestamp,
        value,
    })
}

/// Parse `k="v",...}` and return the labels plus the text after `}`
fn parse_labels(input: &str) -> Option<(HashMap<String, String>, &str)> {
    let mut labels = HashMap::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches([',', ' ']);
        if let Some(after) = rest.strip_prefix('}') {
            return Some((labels, after));
        }

        let eq = rest.find('=')?;
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].strip_prefix('"')?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let end = loop {
            let (i, c) = chars.next()?;
            match c {
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break i,
                _ => value.push(c),
            }
        };

        labels.insert(key, value);
        rest = &rest[end + 1..];
    }
}
