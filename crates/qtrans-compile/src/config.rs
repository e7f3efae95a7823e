//! Transpiler and SABRE configuration.
//!
//! Both structs are plain serde types: every field has a default, so a
//! partial document (or `{}`) deserializes into a usable configuration.
//! Loading from files or the environment is left to the caller.
//!
//! ```
//! use qtrans_compile::{Heuristic, TranspileOptions};
//!
//! let opts: TranspileOptions =
//!     serde_json::from_str(r#"{ "optimization_level": 2, "sabre": { "seed": 7 } }"#).unwrap();
//! assert_eq!(opts.sabre.seed, 7);
//! assert_eq!(opts.sabre.max_iterations, 3);
//! assert_eq!(opts.heuristic(), Heuristic::Fidelity);
//! opts.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::backend::BackendModel;
use crate::error::{CompileError, CompileResult};
use crate::synthesis::EulerBasis;

/// Swap scoring used by the SABRE search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heuristic {
    /// Hop distance on the coupling graph.
    Distance,
    /// `-ln(fidelity)` path cost plus a penalty for the swap itself.
    Fidelity,
    /// Distance first; fidelity cost breaks ties.
    Mixture,
}

impl Heuristic {
    /// Default heuristic of a preset level.
    pub fn for_level(level: u8) -> Self {
        match level {
            0 | 1 => Heuristic::Distance,
            2 => Heuristic::Fidelity,
            _ => Heuristic::Mixture,
        }
    }
}

/// How the first SABRE sweep picks its starting layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialLayoutStrategy {
    /// Logical `i` on physical `i`.
    Trivial,
    /// A seeded shuffle of the physical qubits.
    #[default]
    Random,
}

/// Tunables of the SABRE layout and routing search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SabreConfig {
    /// Scoring function; `None` uses the optimization level's default.
    #[serde(default)]
    pub heuristic: Option<Heuristic>,

    /// Forward/backward rounds of the layout search.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Seed for random initial layouts; equal seeds give equal output.
    #[serde(default)]
    pub seed: u64,

    /// Starting layout of the first sweep.
    #[serde(default)]
    pub initial_layout: InitialLayoutStrategy,

    /// Decay added to both qubits of every chosen swap.
    ///
    /// Unset: 0.01 for the distance and mixture heuristics,
    /// `1 - mean edge fidelity` for the fidelity heuristic.
    #[serde(default)]
    pub decay_delta: Option<f64>,

    /// Two-qubit gates in the lookahead window. Unset: backend qubit count.
    #[serde(default)]
    pub extended_set_size: Option<usize>,

    /// Swaps between decay resets. Unset: half the window, at least 1.
    #[serde(default)]
    pub decay_reset_interval: Option<usize>,

    /// Weight of the lookahead term.
    #[serde(default = "default_extended_set_weight")]
    pub extended_set_weight: f64,
}

fn default_max_iterations() -> usize {
    3
}

fn default_extended_set_weight() -> f64 {
    0.5
}

fn default_optimization_level() -> u8 {
    1
}

impl Default for SabreConfig {
    fn default() -> Self {
        Self {
            heuristic: None,
            max_iterations: default_max_iterations(),
            seed: 0,
            initial_layout: InitialLayoutStrategy::default(),
            decay_delta: None,
            extended_set_size: None,
            decay_reset_interval: None,
            extended_set_weight: default_extended_set_weight(),
        }
    }
}

/// [`SabreConfig`] with every default filled in for one backend.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct ResolvedSabre {
    pub heuristic: Heuristic,
    pub max_iterations: usize,
    pub seed: u64,
    pub initial_layout: InitialLayoutStrategy,
    pub decay_delta: f64,
    pub extended_set_size: usize,
    pub decay_reset_interval: usize,
    pub extended_set_weight: f64,
}

impl SabreConfig {
    /// Reject values the search cannot work with.
    pub fn validate(&self) -> CompileResult<()> {
        if self.max_iterations == 0 {
            return Err(CompileError::InvalidConfiguration(
                "sabre.max_iterations must be at least 1".into(),
            ));
        }
        if !(self.extended_set_weight.is_finite() && self.extended_set_weight >= 0.0) {
            return Err(CompileError::InvalidConfiguration(format!(
                "sabre.extended_set_weight must be finite and non-negative, got {}",
                self.extended_set_weight
            )));
        }
        if let Some(delta) = self.decay_delta {
            if !(delta.is_finite() && delta >= 0.0) {
                return Err(CompileError::InvalidConfiguration(format!(
                    "sabre.decay_delta must be finite and non-negative, got {delta}"
                )));
            }
        }
        if self.decay_reset_interval == Some(0) {
            return Err(CompileError::InvalidConfiguration(
                "sabre.decay_reset_interval must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Fill the unset fields for `backend`, using `fallback` when no
    /// heuristic was chosen explicitly.
    pub fn resolve(&self, backend: &BackendModel, fallback: Heuristic) -> ResolvedSabre {
        let heuristic = self.heuristic.unwrap_or(fallback);
        let decay_delta = self.decay_delta.unwrap_or(match heuristic {
            Heuristic::Fidelity => 1.0 - backend.mean_fidelity(),
            Heuristic::Distance | Heuristic::Mixture => 0.01,
        });
        let extended_set_size = self
            .extended_set_size
            .unwrap_or(backend.num_qubits() as usize);
        let decay_reset_interval = self
            .decay_reset_interval
            .unwrap_or((extended_set_size / 2).max(1));
        ResolvedSabre {
            heuristic,
            max_iterations: self.max_iterations.max(1),
            seed: self.seed,
            initial_layout: self.initial_layout,
            decay_delta,
            extended_set_size,
            decay_reset_interval,
            extended_set_weight: self.extended_set_weight,
        }
    }
}

/// Options of one [`Transpiler`](crate::Transpiler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranspileOptions {
    /// Preset level, 0 to 3.
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u8,

    /// Layout and routing tunables.
    #[serde(default)]
    pub sabre: SabreConfig,

    /// Single-qubit synthesis family; unset infers it from the basis.
    #[serde(default)]
    pub euler_basis: Option<EulerBasis>,

    /// Values bound to symbolic angles before unrolling.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            optimization_level: default_optimization_level(),
            sabre: SabreConfig::default(),
            euler_basis: None,
            parameters: BTreeMap::new(),
        }
    }
}

impl TranspileOptions {
    /// Options for a preset level with everything else at its default.
    pub fn with_level(level: u8) -> Self {
        Self {
            optimization_level: level,
            ..Self::default()
        }
    }

    /// The routing heuristic in effect.
    pub fn heuristic(&self) -> Heuristic {
        self.sabre
            .heuristic
            .unwrap_or_else(|| Heuristic::for_level(self.optimization_level))
    }

    /// Check level, SABRE tunables and bound values.
    pub fn validate(&self) -> CompileResult<()> {
        if self.optimization_level > 3 {
            return Err(CompileError::InvalidConfiguration(format!(
                "optimization_level must be 0-3, got {}",
                self.optimization_level
            )));
        }
        self.sabre.validate()?;
        if let Some((name, value)) = self.parameters.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CompileError::InvalidConfiguration(format!(
                "parameter '{name}' bound to non-finite value {value}"
            )));
        }
        Ok(())
    }
}
