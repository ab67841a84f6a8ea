//! Run configuration.
//!
//! All run parameters — population size, slot count, spawn bounds, animation
//! constants, worker count — are supplied at startup, either in code or from
//! a TOML file loaded once. Nothing here is consulted after
//! [`PoolDriver::new`](crate::engine::driver::PoolDriver::new) returns, and
//! the crate has no other persisted state surface.
//!
//! Validation is fatal by design: a zero population or an empty pool would
//! create degenerate buffers, so the driver refuses to start rather than
//! limp (see the crate error policy).

use glam::Vec3;
use serde::Deserialize;

use crate::engine::allocator::Bounds;
use crate::engine::driver::StageKind;
use crate::engine::error::{ConfigError, DegenerateBoundsError, InvalidParameterError};
use crate::engine::scheduler::Execution;

/// Startup parameters for one run.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Virtual population size N. Fixed for the run.
    pub population: usize,
    /// Real slot count K. Fixed for the run; may exceed `population`.
    pub slots: usize,
    /// Lower corner of the spawn volume.
    pub bounds_min: [f32; 3],
    /// Upper corner of the spawn volume.
    pub bounds_max: [f32; 3],
    /// Bounding-sphere radius used by the visibility test.
    pub bounding_radius: f32,
    /// Seed for spawn sampling and flavor-parameter initialization.
    pub seed: u64,
    /// Oscillation frequency in cycles per second.
    pub oscillation_speed: f32,
    /// Peak vertical oscillation displacement.
    pub oscillation_height: f32,
    /// Yaw frequency in cycles per second.
    pub rotation_speed: f32,
    /// Execution mode for the stage pipeline.
    pub execution: Execution,
    /// Dedicated worker count; `None` uses the ambient Rayon pool. Ignored
    /// by inline execution.
    pub workers: Option<usize>,
    /// Stage kinds to wire, in pipeline order.
    pub stages: Vec<StageKind>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            population: 100_000,
            slots: 3_000,
            bounds_min: [-50.0, -50.0, -50.0],
            bounds_max: [50.0, 50.0, 50.0],
            bounding_radius: 5.0,
            seed: 626_756_527,
            oscillation_speed: 0.25,
            oscillation_height: 1.0,
            rotation_speed: 0.33,
            execution: Execution::Parallel,
            workers: None,
            stages: StageKind::standard().to_vec(),
        }
    }
}

impl RunConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validates all run parameters.
    ///
    /// Invalid population or slot counts are fatal: the driver must abort
    /// startup, not proceed with degenerate buffers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population == 0 {
            return Err(InvalidParameterError {
                parameter: "population",
                value: self.population.to_string(),
                constraint: "must be > 0",
            }
            .into());
        }
        if self.slots == 0 {
            return Err(InvalidParameterError {
                parameter: "slots",
                value: self.slots.to_string(),
                constraint: "must be > 0",
            }
            .into());
        }
        if !(self.bounding_radius.is_finite() && self.bounding_radius > 0.0) {
            return Err(InvalidParameterError {
                parameter: "bounding_radius",
                value: self.bounding_radius.to_string(),
                constraint: "must be finite and > 0",
            }
            .into());
        }
        if self.workers == Some(0) {
            return Err(InvalidParameterError {
                parameter: "workers",
                value: "0".to_string(),
                constraint: "must be > 0 when set",
            }
            .into());
        }
        let degenerate = self
            .bounds_min
            .iter()
            .zip(self.bounds_max.iter())
            .any(|(min, max)| !(min < max));
        if degenerate {
            return Err(DegenerateBoundsError {
                min: self.bounds_min,
                max: self.bounds_max,
            }
            .into());
        }
        Ok(())
    }

    /// Spawn volume as a typed bounds value.
    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: Vec3::from_array(self.bounds_min),
            max: Vec3::from_array(self.bounds_max),
        }
    }
}
