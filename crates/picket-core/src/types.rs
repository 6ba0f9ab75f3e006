// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Host-facing value objects.
//!
//! A poll cycle produces a list of [`Reading`]s, one per asset. Each reading
//! groups named [`Datapoint`]s sampled at the same instant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Value
// =============================================================================

/// A scalar datapoint value.
///
/// Discrete sources produce [`Value::Integer`] (0 or 1); register sources
/// produce [`Value::Float`] after scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
}

impl Value {
    /// Returns the value as an `f64`.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }

    /// Returns the value as an `i64`, truncating floats.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Integer(v) => *v,
            Self::Float(v) => *v as i64,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

// =============================================================================
// Datapoint
// =============================================================================

/// A named scalar within an asset at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Datapoint name.
    pub name: String,
    /// Sampled value.
    pub value: Value,
}

impl Datapoint {
    /// Creates a new datapoint.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Reading
// =============================================================================

/// A group of datapoints sampled for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    asset: String,
    timestamp: DateTime<Utc>,
    datapoints: Vec<Datapoint>,
}

impl Reading {
    /// Creates a reading for `asset` with an initial datapoint, stamped now.
    pub fn new(asset: impl Into<String>, datapoint: Datapoint) -> Self {
        Self {
            asset: asset.into(),
            timestamp: Utc::now(),
            datapoints: vec![datapoint],
        }
    }

    /// The asset this reading belongs to.
    pub fn asset_name(&self) -> &str {
        &self.asset
    }

    /// When the reading was created.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Appends a datapoint to the reading.
    pub fn add_datapoint(&mut self, datapoint: Datapoint) {
        self.datapoints.push(datapoint);
    }

    /// All datapoints in insertion order.
    pub fn datapoints(&self) -> &[Datapoint] {
        &self.datapoints
    }

    /// Looks up a datapoint by name.
    pub fn datapoint(&self, name: &str) -> Option<&Datapoint> {
        self.datapoints.iter().find(|dp| dp.name == name)
    }
}

// =============================================================================
// Tests
// =============================================================================
