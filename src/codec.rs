//! Wire codec for the engine's line protocol.
//!
//! Input lines have the shape
//!
//! ```text
//! <target> [<importance>] [<initPred>] 'seq_<n> [|<ns> <key>[:<value>] ...]...
//! ```
//!
//! and prediction lines coming back on the engine's stdout look like
//! `<prediction> seq_<n>`. Keys and values are percent-encoded so the
//! protocol's reserved characters (`:`, `|`, `'` and whitespace) never
//! appear unescaped inside a token.

use std::borrow::Cow;

use indexmap::IndexMap;

use crate::constants::protocol::{SAVE_DIRECTIVE_PREFIX, SEQUENCE_TAG_PREFIX};
use crate::error::{Error, Result};
use crate::example::{Example, Feature};
use crate::namespace::NamespaceAllocator;

/// Format a number the way the engine reads it back (`1` rather than `1.0`).
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Percent-encode a key or value for the wire.
pub fn escape(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw)
}

/// Reverse of [`escape`].
pub fn unescape(escaped: &str) -> Result<String> {
    urlencoding::decode(escaped)
        .map(Cow::into_owned)
        .map_err(|e| Error::Serialization(format!("invalid escape in '{}': {}", escaped, e)))
}

/// Zero, one, NaN and absent values are presence-only on the wire; the
/// engine reads a bare key as value 1.
fn is_unit_value(value: Option<f64>) -> bool {
    match value {
        None => true,
        Some(v) => v == 0.0 || v == 1.0 || v.is_nan(),
    }
}

/// Line asking the engine to write its current model to `path`.
pub fn save_directive(path: &str) -> String {
    format!("{}{}", SAVE_DIRECTIVE_PREFIX, path)
}

/// Encodes examples into input lines, allocating namespace characters as
/// new namespace names show up.
#[derive(Debug, Default)]
pub struct ExampleEncoder {
    namespaces: NamespaceAllocator,
}

impl ExampleEncoder {
    pub fn new(namespaces: NamespaceAllocator) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> &NamespaceAllocator {
        &self.namespaces
    }


    /// Encode one example tagged with `sequence`.
    pub fn encode(&mut self, example: &Example, sequence: u64) -> Result<String> {
        let mut line = format_number(example.target());

        // The engine reads the label tokens positionally, so a warm-start
        // prediction needs an explicit importance in front of it.
        match (example.imp, example.init_pred) {
            (Some(imp), Some(init_pred)) => {
                line.push(' ');
                line.push_str(&format_number(imp));
                line.push(' ');
                line.push_str(&format_number(init_pred));
            }
            (Some(imp), None) => {
                line.push(' ');
                line.push_str(&format_number(imp));
            }
            (None, Some(init_pred)) => {
                line.push_str(" 1 ");
                line.push_str(&format_number(init_pred));
            }
            (None, None) => {}
        }

        line.push_str(" '");
        line.push_str(SEQUENCE_TAG_PREFIX);
        line.push_str(&sequence.to_string());

        let mut grouped: IndexMap<char, IndexMap<&str, Option<f64>>> = IndexMap::new();
        for (key, feature) in &example.feat_map {
            match feature {
                Feature::Scalar(value) => {
                    let ns = self.namespaces.allocate(None)?;
                    grouped.entry(ns).or_default().insert(key.as_str(), *value);
                }
                Feature::Namespace(features) => {
                    let ns = self.namespaces.allocate(Some(key))?;
                    let group = grouped.entry(ns).or_default();
                    for (feat_key, value) in features {
                        group.insert(feat_key.as_str(), *value);
                    }
                }
            }
        }

        for (ns, features) in grouped {
            if features.is_empty() {
                continue;
            }
            line.push_str(" |");
            line.push(ns);
            for (key, value) in features {
                line.push(' ');
                line.push_str(&escape(key));
                if let Some(v) = value.filter(|_| !is_unit_value(value)) {
                    line.push(':');
                    line.push_str(&escape(&format_number(v)));
                }
            }
        }

        Ok(line)
    }
}

/// Structural content of an input line, recovered by [`WireRecord::parse`].
#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    pub target: f64,
    pub importance: Option<f64>,
    pub init_pred: Option<f64>,
    pub sequence: Option<u64>,
    /// Namespace character -> (unescaped key, value) in line order
    pub namespaces: Vec<(char, Vec<(String, Option<f64>)>)>,
}

impl WireRecord {
    pub fn parse(line: &str) -> Result<Self> {
        let mut segments = line.split('|');
        let header = segments.next().unwrap_or_default();

        let mut labels = Vec::new();
        let mut sequence = None;
        for token in header.split_whitespace() {
            if let Some(tag) = token.strip_prefix('\'') {
                sequence = tag
                    .strip_prefix(SEQUENCE_TAG_PREFIX)
                    .and_then(|n| n.parse::<u64>().ok());
            } else {
                let value = token.parse::<f64>().map_err(|_| {
                    Error::Serialization(format!("invalid label token '{}'", token))
                })?;
                labels.push(value);
            }
        }

        let (target, importance, init_pred) = match labels.as_slice() {
            [] => (0.0, None, None),
            [t] => (*t, None, None),
            [t, i] => (*t, Some(*i), None),
            [t, i, p] => (*t, Some(*i), Some(*p)),
            _ => {
                return Err(Error::Serialization(format!(
                    "too many label tokens in '{}'",
                    header.trim()
                )))
            }
        };

        let mut namespaces = Vec::new();
        for segment in segments {
            let mut chars = segment.chars();
            let ns = chars
                .next()
                .filter(|c| !c.is_whitespace())
                .ok_or_else(|| Error::Serialization("namespace segment without a name".into()))?;

            let mut features = Vec::new();
            for token in chars.as_str().split_whitespace() {
                let (key, value) = match token.split_once(':') {
                    Some((key, value)) => {
                        let value = unescape(value)?.parse::<f64>().map_err(|_| {
                            Error::Serialization(format!("invalid feature value in '{}'", token))
                        })?;
                        (key, Some(value))
                    }
                    None => (token, None),
                };
                features.push((unescape(key)?, value));
            }
            namespaces.push((ns, features));
        }

        Ok(Self {
            target,
            importance,
            init_pred,
            sequence,
            namespaces,
        })
    }

    /// Features of one namespace character, if present.
    pub fn namespace(&self, ns: char) -> Option<&[(String, Option<f64>)]> {
        self.namespaces
            .iter()
            .find(|(c, _)| *c == ns)
            .map(|(_, features)| features.as_slice())
    }
}

/// Decode a primary-output line of the form `<prediction> seq_<n>`.
///
/// Anything else is diagnostic output and yields `None`.
pub fn parse_prediction_line(line: &str) -> Option<(f64, u64)> {
    let mut tokens = line.split_whitespace();
    let prediction = tokens.next()?;
    let tag = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }

    let sequence = tag.strip_prefix(SEQUENCE_TAG_PREFIX)?.parse::<u64>().ok()?;
    let prediction = prediction.parse::<f64>().ok()?;
    Some((prediction, sequence))
}
