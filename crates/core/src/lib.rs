//! Core library for turning planar geometry into Mapbox Vector Tile features.
//!
//! The pipeline clips source geometry to a tile envelope, maps it onto the
//! tile's integer pixel grid, and encodes every primitive geometry into an MVT
//! command buffer with the winding and validity rules the MVT spec requires.
//!
//! # Examples
//!
//! ```
//! use geo::{point, Geometry};
//! use mvt_geom_core::filter::AcceptAll;
//! use mvt_geom_core::tags::IgnoreTags;
//! use mvt_geom_core::{PipelineConfig, TaggedGeometry, TileEnvelope, TileGeometryPipeline};
//!
//! let envelope = TileEnvelope::new(0.0, 0.0, 10.0, 10.0, 4096).unwrap();
//! let pipeline = TileGeometryPipeline::new(envelope, PipelineConfig::default()).unwrap();
//!
//! let source = vec![TaggedGeometry::<()>::new(Geometry::Point(point!(x: 5.0, y: 5.0)))];
//! let tile_geometry = pipeline.create_tile_geometry(&source);
//! let layer = pipeline.encode_layer(&tile_geometry.geometries, &AcceptAll, &IgnoreTags);
//!
//! assert_eq!(layer.features[0].geometry, vec![9, 4096, 4096]);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod vector_tile;

pub mod clip;
pub mod command;
pub mod decode;
pub mod envelope;
pub mod filter;
pub mod flatten;
pub mod geometry;
pub mod mvt;
pub mod pipeline;
pub mod tags;
pub mod transform;
pub mod validate;

pub use envelope::{TileCoord, TileEnvelope};
pub use geometry::TaggedGeometry;
pub use mvt::{CursorScope, FeatureEncoder};
pub use pipeline::{TileGeometry, TileGeometryPipeline};

/// Default tile extent (4096 as per MVT spec)
pub const DEFAULT_EXTENT: u32 = 4096;

/// Default tolerance for the post-rounding simplification pass, in pixels.
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 0.1;

/// Errors raised before any geometry is processed.
///
/// Per-geometry problems never surface here: they are dropped from the
/// output and reported as diagnostics instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid tile envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Simplification tolerance must be within (0, 0.5), got {0}")]
    InvalidTolerance(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed command buffer: {0}")]
    Decode(#[from] decode::DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration for one layer encoding pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tile extent (default: 4096 as per MVT spec)
    pub extent: u32,
    /// Tolerance of the topology-preserving simplification after rounding
    pub simplify_tolerance: f64,
    /// Layer name for the MVT output
    pub layer_name: String,
    /// Whether the delta cursor spans the layer or restarts per feature
    pub cursor_scope: CursorScope,
    /// Largest repeat count accepted for a single MoveTo/LineTo run
    pub max_command_count: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extent: DEFAULT_EXTENT,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            layer_name: "layer".to_string(),
            cursor_scope: CursorScope::Layer,
            max_command_count: command::CMD_HDR_LEN_MAX,
        }
    }
}

impl PipelineConfig {
    /// Set the layer name.
    pub fn with_layer_name(mut self, name: impl Into<String>) -> Self {
        self.layer_name = name.into();
        self
    }

    /// Set the tile extent.
    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    /// Set the simplification tolerance.
    pub fn with_simplify_tolerance(mut self, tolerance: f64) -> Self {
        self.simplify_tolerance = tolerance;
        self
    }

    /// Set the cursor scope.
    pub fn with_cursor_scope(mut self, scope: CursorScope) -> Self {
        self.cursor_scope = scope;
        self
    }

    /// Cap the repeat count of a single command run.
    pub fn with_max_command_count(mut self, count: u32) -> Self {
        self.max_command_count = count;
        self
    }

    /// Reject settings that would make every tile wrong.
    pub fn validate(&self) -> Result<()> {
        if self.extent == 0 {
            return Err(Error::InvalidConfig("extent must be positive".to_string()));
        }
        if !(self.simplify_tolerance > 0.0 && self.simplify_tolerance < 0.5) {
            return Err(Error::InvalidTolerance(self.simplify_tolerance));
        }
        if self.layer_name.is_empty() {
            return Err(Error::InvalidConfig(
                "layer name must not be empty".to_string(),
            ));
        }
        if self.max_command_count == 0 || self.max_command_count > command::CMD_HDR_LEN_MAX {
            return Err(Error::InvalidConfig(format!(
                "max command count must be within 1..={}",
                command::CMD_HDR_LEN_MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.extent, 4096);
        assert_eq!(config.simplify_tolerance, 0.1);
        assert_eq!(config.cursor_scope, CursorScope::Layer);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_tolerance_bounds() {
        for tolerance in [0.0, 0.5, 0.75, -0.1, f64::NAN] {
            let config = PipelineConfig::default().with_simplify_tolerance(tolerance);
            assert!(
                matches!(config.validate(), Err(Error::InvalidTolerance(_))),
                "tolerance {} should be rejected",
                tolerance
            );
        }
    }

    #[test]
    fn test_config_rejects_zero_extent() {
        let config = PipelineConfig::default().with_extent(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"extent": 512, "cursor_scope": "feature"}"#).unwrap();
        assert_eq!(config.extent, 512);
        assert_eq!(config.cursor_scope, CursorScope::Feature);
        assert_eq!(config.layer_name, "layer");
    }
}
