//! Examples submitted to the engine and the predictions correlated back to them.
//!
//! The JSON shape matches the line-oriented input accepted by the CLI:
//!
//! ```json
//! {"resp": 85.1, "imp": 2.0, "initPred": 0.5,
//!  "featMap": {"prodCost": 8.5, "movie": {"genre_drama": null, "year": 1994}}}
//! ```
//!
//! A top-level numeric (or null) entry of `featMap` is a feature in the default
//! namespace; a nested object is a named namespace of features.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Value stored under a feature-map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feature {
    /// A named namespace: feature key -> value
    Namespace(IndexMap<String, Option<f64>>),
    /// A single feature in the default namespace
    Scalar(Option<f64>),
}

impl Feature {
    /// Presence-only feature (`key` without a `:value` suffix on the wire)
    pub fn present() -> Self {
        Feature::Scalar(None)
    }
}

impl From<f64> for Feature {
    fn from(value: f64) -> Self {
        Feature::Scalar(Some(value))
    }
}

impl From<Option<f64>> for Feature {
    fn from(value: Option<f64>) -> Self {
        Feature::Scalar(value)
    }
}

/// One training/inference record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Example {
    /// Numeric target; treated as 0 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resp: Option<f64>,
    /// Importance weight; absent means the engine default of 1, an explicit
    /// 0 means "evaluate only"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imp: Option<f64>,
    /// Warm-start prediction added to the engine's own output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_pred: Option<f64>,
    #[serde(default)]
    pub feat_map: IndexMap<String, Feature>,
}

impl Example {
    pub fn new(resp: f64) -> Self {
        Self {
            resp: Some(resp),
            ..Self::default()
        }
    }

    /// Target used for encoding and loss computation.
    pub fn target(&self) -> f64 {
        self.resp.unwrap_or(0.0)
    }

    pub fn with_importance(mut self, imp: f64) -> Self {
        self.imp = Some(imp);
        self
    }

    pub fn with_init_pred(mut self, init_pred: f64) -> Self {
        self.init_pred = Some(init_pred);
        self
    }

    /// Add a feature to the default namespace.
    pub fn with_feature(mut self, key: impl Into<String>, value: impl Into<Feature>) -> Self {
        self.feat_map.insert(key.into(), value.into());
        self
    }

    /// Add (or extend) a named namespace.
    pub fn with_namespace<K, I>(mut self, name: impl Into<String>, features: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Option<f64>)>,
    {
        let name = name.into();
        let entry = self
            .feat_map
            .entry(name)
            .or_insert_with(|| Feature::Namespace(IndexMap::new()));
        if let Feature::Scalar(_) = entry {
            *entry = Feature::Namespace(IndexMap::new());
        }
        if let Feature::Namespace(map) = entry {
            for (key, value) in features {
                map.insert(key.into(), value);
            }
        }
        self
    }
}

/// A prediction correlated back to the example that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: f64,
    pub loss: f64,
    pub example: Example,
    pub sequence: u64,
}
