//! Declarative window configuration.
//!
//! The schema is closed: unknown keys are rejected when a spec is loaded from
//! JSON, and every numeric parameter is validated before any scanning starts.

use serde::{Deserialize, Serialize};

use crate::{WindowError, UNITY_CHANNEL};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowParams {
    /// Target integral of the weight channel per window (weight units x seconds).
    pub window_size: f64,
    /// Spacing in seconds between successive window start anchors.
    pub window_step: f64,
    /// Largest time step kept when collapsing gaps, in seconds.
    pub max_dt: f64,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            window_size: 300.0,
            window_step: 1.0,
            max_dt: 1.0,
        }
    }
}

impl WindowParams {
    pub fn validate(&self) -> Result<(), WindowError> {
        for (name, value) in [
            ("window_size", self.window_size),
            ("window_step", self.window_step),
            ("max_dt", self.max_dt),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(WindowError::InvalidParameter(format!(
                    "{name} must be finite and > 0 (got {value})"
                )));
            }
        }
        Ok(())
    }
}

/// Channel roles plus scan parameters for one windowing run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSpec {
    pub weight_channel: String,
    #[serde(default)]
    pub integrate_channels: Vec<String>,
    #[serde(default)]
    pub statistic_channels: Vec<String>,
    #[serde(default)]
    pub params: WindowParams,
}

impl WindowSpec {
    pub fn new(weight_channel: impl Into<String>, params: WindowParams) -> Self {
        Self {
            weight_channel: weight_channel.into(),
            integrate_channels: Vec::new(),
            statistic_channels: Vec::new(),
            params,
        }
    }

    /// Windows sized by elapsed squeezed time, weighted by [`UNITY_CHANNEL`].
    pub fn time_based(params: WindowParams) -> Self {
        Self::new(UNITY_CHANNEL, params)
    }

    pub fn with_integrate<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.integrate_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_statistics<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statistic_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_time_based(&self) -> bool {
        self.weight_channel == UNITY_CHANNEL
    }

    /// Parse a JSON spec and validate it in one step.
    pub fn from_json_str(text: &str) -> Result<Self, WindowError> {
        let spec: WindowSpec =
            serde_json::from_str(text).map_err(|e| WindowError::Config(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), WindowError> {
        if self.weight_channel.trim().is_empty() {
            return Err(WindowError::InvalidParameter(
                "weight_channel must name a channel".into(),
            ));
        }
        self.params.validate()
    }
}
