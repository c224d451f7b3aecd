//! Tile geometry pipeline - wires together flattening, clipping, transformation
//! and MVT encoding for one tile.
//!
//! 1. Flatten source geometry into primitives
//! 2. Clip each primitive to the tile envelope
//! 3. Transform into integer tile coordinates and simplify
//! 4. Encode the result into an MVT layer
//!
//! Steps 1-3 are [`TileGeometryPipeline::create_tile_geometry`]; step 4 is
//! [`TileGeometryPipeline::encode_layer`]. Keeping them apart lets callers
//! inspect or filter the tile geometry before it is encoded.

use prost::Message;

use crate::clip::{ClipDiagnostic, TileClipper};
use crate::envelope::TileEnvelope;
use crate::filter::GeometryFilter;
use crate::flatten::flatten_tagged;
use crate::geometry::TaggedGeometry;
use crate::mvt::{FeatureEncoder, LayerBuilder, TileBuilder};
use crate::tags::TagConverter;
use crate::transform::TileTransformer;
use crate::vector_tile::tile::Layer;
use crate::{PipelineConfig, Result};

/// Geometry in tile coordinates, ready for encoding.
#[derive(Debug, Clone)]
pub struct TileGeometry<D> {
    /// Primitives in source order
    pub geometries: Vec<TaggedGeometry<D>>,
    /// One entry per source that was skipped; `index` points into the
    /// source slice
    pub diagnostics: Vec<ClipDiagnostic>,
}

impl<D> TileGeometry<D> {
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }
}

/// Clips, transforms and encodes geometry for one tile envelope.
#[derive(Debug, Clone)]
pub struct TileGeometryPipeline {
    envelope: TileEnvelope,
    config: PipelineConfig,
    clipper: TileClipper,
    transformer: TileTransformer,
    encoder: FeatureEncoder,
}

impl TileGeometryPipeline {
    /// Create a pipeline for `envelope`.
    ///
    /// The configured extent replaces the envelope's own extent. Fails when
    /// the configuration is invalid.
    pub fn new(envelope: TileEnvelope, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let envelope = if envelope.extent() == config.extent {
            envelope
        } else {
            envelope.with_extent(config.extent)?
        };

        let transformer = TileTransformer::new(&envelope, config.simplify_tolerance)?;
        let encoder = FeatureEncoder::new().with_max_command_count(config.max_command_count);

        Ok(Self {
            clipper: TileClipper::new(&envelope),
            envelope,
            config,
            transformer,
            encoder,
        })
    }

    pub fn envelope(&self) -> &TileEnvelope {
        &self.envelope
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Flatten, clip and transform `sources` into tile geometry.
    pub fn create_tile_geometry<D>(&self, sources: &[TaggedGeometry<D>]) -> TileGeometry<D> {
        let mut flat = Vec::with_capacity(sources.len());
        let mut origin = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let parts = flatten_tagged(source);
            origin.extend(std::iter::repeat(index).take(parts.len()));
            flat.extend(parts);
        }

        let clipped = self.clipper.clip_all(&flat);
        let geometries = self.transformer.transform_all(&clipped.geometries);

        let diagnostics: Vec<ClipDiagnostic> = clipped
            .diagnostics
            .into_iter()
            .map(|d| {
                let source = origin.get(d.index()).copied().unwrap_or(d.index());
                d.with_index(source)
            })
            .collect();

        log::debug!(
            "tile geometry: {} sources, {} primitives, {} kept, {} skipped",
            sources.len(),
            flat.len(),
            geometries.len(),
            diagnostics.len()
        );

        TileGeometry {
            geometries,
            diagnostics,
        }
    }

    /// Encode tile geometry into a layer named after the configuration.
    pub fn encode_layer<D, F, C>(
        &self,
        geometries: &[TaggedGeometry<D>],
        filter: &F,
        converter: &C,
    ) -> Layer
    where
        F: GeometryFilter + ?Sized,
        C: TagConverter<D> + ?Sized,
    {
        LayerBuilder::new(self.config.layer_name.clone())
            .with_extent(self.config.extent)
            .with_encoder(self.encoder)
            .with_cursor_scope(self.config.cursor_scope)
            .build(geometries, filter, converter)
    }

    /// Run the whole pipeline on `sources`.
    ///
    /// Returns the layer and the diagnostics of the skipped sources.
    pub fn process<D, F, C>(
        &self,
        sources: &[TaggedGeometry<D>],
        filter: &F,
        converter: &C,
    ) -> (Layer, Vec<ClipDiagnostic>)
    where
        F: GeometryFilter + ?Sized,
        C: TagConverter<D> + ?Sized,
    {
        let tile_geometry = self.create_tile_geometry(sources);
        let layer = self.encode_layer(&tile_geometry.geometries, filter, converter);

        log::info!(
            "layer '{}': {} features from {} sources",
            layer.name,
            layer.features.len(),
            sources.len()
        );

        (layer, tile_geometry.diagnostics)
    }
}

/// Serialize layers into MVT protobuf bytes; empty layers are left out.
pub fn encode_tile(layers: impl IntoIterator<Item = Layer>) -> Vec<u8> {
    let mut builder = TileBuilder::new();
    for layer in layers {
        builder.add_layer(layer);
    }
    builder.build().encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptAll;
    use crate::mvt::CursorScope;
    use crate::tags::{IgnoreTags, KeyValueTags, Properties, PropertyValue};
    use crate::vector_tile::Tile;
    use crate::Error;
    use geo::{point, polygon, Geometry, GeometryCollection};

    fn pipeline() -> TileGeometryPipeline {
        let envelope = TileEnvelope::new(0.0, 0.0, 10.0, 10.0, 4096).unwrap();
        TileGeometryPipeline::new(envelope, PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_point_at_center() {
        let sources = vec![TaggedGeometry::<()>::new(Geometry::Point(point!(x: 5.0, y: 5.0)))];
        let (layer, diagnostics) = pipeline().process(&sources, &AcceptAll, &IgnoreTags);

        assert!(diagnostics.is_empty());
        assert_eq!(layer.features.len(), 1);
        assert_eq!(layer.features[0].id, Some(1));
        assert_eq!(layer.features[0].geometry, vec![9, 4096, 4096]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let envelope = TileEnvelope::new(0.0, 0.0, 10.0, 10.0, 4096).unwrap();
        let config = PipelineConfig::default().with_simplify_tolerance(0.7);
        assert!(matches!(
            TileGeometryPipeline::new(envelope, config),
            Err(Error::InvalidTolerance(_))
        ));
    }

    #[test]
    fn test_config_extent_overrides_envelope() {
        let envelope = TileEnvelope::new(0.0, 0.0, 10.0, 10.0, 4096).unwrap();
        let pipeline =
            TileGeometryPipeline::new(envelope, PipelineConfig::default().with_extent(256)).unwrap();

        assert_eq!(pipeline.envelope().extent(), 256);

        let sources = vec![TaggedGeometry::<()>::new(Geometry::Point(point!(x: 5.0, y: 5.0)))];
        let (layer, _) = pipeline.process(&sources, &AcceptAll, &IgnoreTags);
        assert_eq!(layer.extent, Some(256));
        assert_eq!(layer.features[0].geometry, vec![9, 256, 256]);
    }

    #[test]
    fn test_diagnostic_index_points_at_source() {
        let bowtie = Geometry::Polygon(polygon![
            (x: 1.0, y: 1.0),
            (x: 9.0, y: 9.0),
            (x: 9.0, y: 1.0),
            (x: 1.0, y: 9.0),
            (x: 1.0, y: 1.0),
        ]);
        let sources = vec![
            TaggedGeometry::<()>::new(Geometry::GeometryCollection(GeometryCollection::new_from(
                vec![
                    Geometry::Point(point!(x: 1.0, y: 1.0)),
                    Geometry::Point(point!(x: 2.0, y: 2.0)),
                ],
            ))),
            TaggedGeometry::new(bowtie),
        ];

        let tile_geometry = pipeline().create_tile_geometry(&sources);

        assert_eq!(tile_geometry.len(), 2);
        assert_eq!(tile_geometry.diagnostics.len(), 1);
        assert_eq!(tile_geometry.diagnostics[0].index(), 1);
    }

    #[test]
    fn test_outside_geometry_dropped_silently() {
        let sources = vec![TaggedGeometry::<()>::new(Geometry::Point(point!(x: 50.0, y: 5.0)))];
        let tile_geometry = pipeline().create_tile_geometry(&sources);

        assert!(tile_geometry.is_empty());
        assert!(tile_geometry.diagnostics.is_empty());
    }

    #[test]
    fn test_encode_tile_roundtrip() {
        let properties: Properties = vec![("kind".to_string(), PropertyValue::from("park"))];
        let sources = vec![TaggedGeometry::with_user_data(
            Geometry::Polygon(polygon![
                (x: 2.0, y: 2.0),
                (x: 8.0, y: 2.0),
                (x: 8.0, y: 8.0),
                (x: 2.0, y: 8.0),
                (x: 2.0, y: 2.0),
            ]),
            properties,
        )];

        let pipeline = TileGeometryPipeline::new(
            TileEnvelope::new(0.0, 0.0, 10.0, 10.0, 4096).unwrap(),
            PipelineConfig::default()
                .with_layer_name("parks")
                .with_cursor_scope(CursorScope::Feature),
        )
        .unwrap();
        let (layer, _) = pipeline.process(&sources, &AcceptAll, &KeyValueTags);

        let bytes = encode_tile(vec![layer.clone()]);
        let decoded = Tile::decode(bytes.as_slice()).unwrap();

        assert_eq!(decoded.layers, vec![layer]);
        assert_eq!(decoded.layers[0].name, "parks");
        assert_eq!(decoded.layers[0].keys, vec!["kind".to_string()]);
    }
}
