//! MVT (Mapbox Vector Tile) feature encoding.
//!
//! Turns tile-space geometry into MVT command buffers:
//!
//! - **Points**: one MoveTo run, integer duplicates dropped
//! - **Lines**: MoveTo + LineTo per component
//! - **Polygons**: MoveTo + LineTo + ClosePath per ring, with the exterior
//!   forced to positive area and holes to negative area
//! - **Layer encoding**: sequential ids, shared key/value tables
//!
//! A ring, line or polygon that cannot be encoded is left out and the cursor
//! is put back where it was, so later deltas stay valid.
//!
//! Reference: <https://github.com/mapbox/vector-tile-spec>

use geo::{Area, Coord, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::command::{
    close_path_header, line_buffer_len, point_buffer_len, Command, Cursor, CMD_HDR_LEN_MAX,
};
use crate::filter::GeometryFilter;
use crate::flatten::flatten_all;
use crate::geometry::TaggedGeometry;
use crate::tags::{LayerProps, TagConverter};
use crate::vector_tile::tile::{Feature, GeomType, Layer};
use crate::vector_tile::Tile;
use crate::DEFAULT_EXTENT;

/// Minimum LineTo count of an open line
pub const MIN_LINE_TO_LINE: u32 = 1;

/// Minimum LineTo count of a ring (a triangle needs two after the MoveTo)
pub const MIN_LINE_TO_RING: u32 = 2;

/// Lifetime of the delta cursor within a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorScope {
    /// One cursor for the whole layer; each feature continues from the last
    /// point of the previous one.
    #[default]
    Layer,
    /// The cursor returns to the origin before every feature, which is what
    /// stock MVT decoders expect.
    Feature,
}

/// MVT geometry type of a primitive; `Unknown` for anything else.
pub fn geom_type(geom: &Geometry<f64>) -> GeomType {
    match geom {
        Geometry::Point(_) | Geometry::MultiPoint(_) => GeomType::Point,
        Geometry::LineString(_) | Geometry::MultiLineString(_) => GeomType::Linestring,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeomType::Polygon,
        _ => GeomType::Unknown,
    }
}

/// Signed shoelace area of a ring.
///
/// Positive for counter-clockwise vertices in the numeric axes.
pub fn signed_ring_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), vec![]).signed_area()
}

/// [`signed_ring_area`] rounded half-up. Zero means the ring is degenerate at
/// tile resolution.
pub fn rounded_ring_area(ring: &LineString<f64>) -> f64 {
    (signed_ring_area(ring) + 0.5).floor()
}

fn reversed(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    ring.0.iter().rev().copied().collect()
}

// ============================================================================
// Feature Encoder
// ============================================================================

/// Encodes tile-space geometry into MVT command buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureEncoder {
    max_command_count: u32,
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEncoder {
    pub fn new() -> Self {
        Self {
            max_command_count: CMD_HDR_LEN_MAX,
        }
    }

    /// Cap the repeat count of a MoveTo or LineTo run, clamped to what a
    /// command header can hold.
    pub fn with_max_command_count(mut self, count: u32) -> Self {
        self.max_command_count = count.min(CMD_HDR_LEN_MAX);
        self
    }

    pub fn max_command_count(&self) -> u32 {
        self.max_command_count
    }

    /// Encode a point run as a single MoveTo.
    ///
    /// The first point is always kept; later points landing on the cursor's
    /// integer cell are dropped.
    pub fn encode_points(&self, coords: &[Coord<f64>], cursor: &mut Cursor) -> Option<Vec<u32>> {
        if coords.is_empty() {
            return None;
        }

        let snapshot = *cursor;
        let mut out = Vec::with_capacity(point_buffer_len(coords.len()));
        out.push(0);

        let mut count: u32 = 0;
        for (i, &coord) in coords.iter().enumerate() {
            if i == 0 || !cursor.equal_as_ints(coord) {
                cursor.emit(coord, &mut out);
                count += 1;
            }
        }

        if count > self.max_command_count {
            log::trace!("dropping point run: {} points exceed the command limit", count);
            *cursor = snapshot;
            return None;
        }

        out[0] = Command::MoveTo.header(count);
        Some(out)
    }

    /// Encode one line or ring.
    ///
    /// Interior coordinates landing on the cursor's integer cell are skipped.
    /// The last coordinate is also skipped when `close` is set and it repeats
    /// the first one exactly. Fails, leaving the cursor untouched, when the
    /// LineTo count falls outside `[min_line_to, max_command_count]`.
    pub fn encode_line(
        &self,
        coords: &[Coord<f64>],
        close: bool,
        cursor: &mut Cursor,
        min_line_to: u32,
    ) -> Option<Vec<u32>> {
        let (&first, rest) = coords.split_first()?;

        let snapshot = *cursor;
        let mut out = Vec::with_capacity(line_buffer_len(coords.len(), close));

        out.push(Command::MoveTo.header(1));
        cursor.emit(first, &mut out);

        let line_to_pos = out.len();
        out.push(0);

        let mut count: u32 = 0;
        let last = rest.len().saturating_sub(1);
        for (i, &coord) in rest.iter().enumerate() {
            if cursor.equal_as_ints(coord) {
                continue;
            }
            if i == last && close && coord == first {
                continue;
            }
            cursor.emit(coord, &mut out);
            count += 1;
        }

        if count < min_line_to || count > self.max_command_count {
            log::trace!(
                "dropping {}: {} LineTo commands outside [{}, {}]",
                if close { "ring" } else { "line" },
                count,
                min_line_to,
                self.max_command_count
            );
            *cursor = snapshot;
            return None;
        }

        out[line_to_pos] = Command::LineTo.header(count);
        if close {
            out.push(close_path_header());
        }
        Some(out)
    }

    /// Encode a polygon with MVT winding.
    ///
    /// The polygon is dropped when its exterior has zero area or cannot be
    /// encoded, or when a hole is at least as large as the exterior. Holes
    /// with zero area or that fail to encode are skipped individually.
    pub fn encode_polygon(&self, polygon: &Polygon<f64>, cursor: &mut Cursor) -> Option<Vec<u32>> {
        let exterior_area = signed_ring_area(polygon.exterior());
        if rounded_ring_area(polygon.exterior()) == 0.0 {
            log::trace!("dropping polygon with degenerate exterior");
            return None;
        }

        let snapshot = *cursor;
        let exterior = if exterior_area < 0.0 {
            reversed(polygon.exterior())
        } else {
            polygon.exterior().0.clone()
        };

        let mut out = self.encode_line(&exterior, true, cursor, MIN_LINE_TO_RING)?;

        for interior in polygon.interiors() {
            let area = signed_ring_area(interior);
            if rounded_ring_area(interior) == 0.0 {
                log::trace!("skipping degenerate hole");
                continue;
            }

            if exterior_area.abs() <= area.abs() {
                log::debug!(
                    "dropping polygon: hole area {} not smaller than exterior area {}",
                    area.abs(),
                    exterior_area.abs()
                );
                *cursor = snapshot;
                return None;
            }

            let hole = if area > 0.0 {
                reversed(interior)
            } else {
                interior.0.clone()
            };

            match self.encode_line(&hole, true, cursor, MIN_LINE_TO_RING) {
                Some(ring) => out.extend(ring),
                None => log::trace!("skipping hole that could not be encoded"),
            }
        }

        Some(out)
    }

    /// Encode any primitive geometry.
    ///
    /// Returns `None` for non-primitive geometry and for geometry whose every
    /// component was dropped.
    pub fn encode_geometry(
        &self,
        geom: &Geometry<f64>,
        cursor: &mut Cursor,
    ) -> Option<(GeomType, Vec<u32>)> {
        let ty = geom_type(geom);

        let buffer = match geom {
            Geometry::Point(p) => self.encode_points(&[p.0], cursor)?,
            Geometry::MultiPoint(mp) => {
                let coords: Vec<Coord<f64>> = mp.0.iter().map(|p| p.0).collect();
                self.encode_points(&coords, cursor)?
            }
            Geometry::LineString(ls) => self.encode_line(&ls.0, false, cursor, MIN_LINE_TO_LINE)?,
            Geometry::MultiLineString(mls) => mls
                .0
                .iter()
                .filter_map(|ls| self.encode_line(&ls.0, false, cursor, MIN_LINE_TO_LINE))
                .flatten()
                .collect(),
            Geometry::Polygon(poly) => self.encode_polygon(poly, cursor)?,
            Geometry::MultiPolygon(mp) => mp
                .0
                .iter()
                .filter_map(|poly| self.encode_polygon(poly, cursor))
                .flatten()
                .collect(),
            _ => return None,
        };

        if buffer.is_empty() {
            return None;
        }
        Some((ty, buffer))
    }

    /// Encode one feature and let `converter` attach its tags.
    pub fn encode_feature<D, C>(
        &self,
        id: u64,
        geom: &Geometry<f64>,
        user_data: Option<&D>,
        cursor: &mut Cursor,
        layer_props: &mut LayerProps,
        converter: &C,
    ) -> Option<Feature>
    where
        D: ?Sized,
        C: TagConverter<D> + ?Sized,
    {
        let (ty, geometry) = self.encode_geometry(geom, cursor)?;

        let mut feature = Feature {
            id: Some(id),
            tags: Vec::new(),
            r#type: Some(ty as i32),
            geometry,
        };
        converter.add_tags(user_data, layer_props, &mut feature);
        Some(feature)
    }

    /// Encode a list of primitives in order.
    ///
    /// Ids start at 1 and are consumed by every geometry the filter accepts,
    /// including ones that end up producing no feature.
    pub fn encode_all<D, F, C>(
        &self,
        geometries: &[TaggedGeometry<D>],
        filter: &F,
        layer_props: &mut LayerProps,
        converter: &C,
        scope: CursorScope,
    ) -> Vec<Feature>
    where
        F: GeometryFilter + ?Sized,
        C: TagConverter<D> + ?Sized,
    {
        let mut cursor = Cursor::new();
        let mut next_id: u64 = 1;
        let mut features = Vec::with_capacity(geometries.len());

        for tagged in geometries {
            if !filter.accept(&tagged.geometry) {
                continue;
            }

            let id = next_id;
            next_id += 1;

            if scope == CursorScope::Feature {
                cursor.reset();
            }

            match self.encode_feature(
                id,
                &tagged.geometry,
                tagged.user_data(),
                &mut cursor,
                layer_props,
                converter,
            ) {
                Some(feature) => features.push(feature),
                None => log::trace!("geometry {} produced no feature", id),
            }
        }

        log::debug!(
            "encoded {} features from {} geometries",
            features.len(),
            geometries.len()
        );
        features
    }
}

// ============================================================================
// Layer Builder
// ============================================================================

/// Builder for encoding one MVT layer.
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    name: String,
    extent: u32,
    encoder: FeatureEncoder,
    cursor_scope: CursorScope,
}

impl LayerBuilder {
    /// Create a new layer builder with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extent: DEFAULT_EXTENT,
            encoder: FeatureEncoder::new(),
            cursor_scope: CursorScope::default(),
        }
    }

    /// Set the layer extent.
    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_encoder(mut self, encoder: FeatureEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_cursor_scope(mut self, scope: CursorScope) -> Self {
        self.cursor_scope = scope;
        self
    }

    /// Flatten and encode `geometries`, then assemble the layer.
    pub fn build<D, F, C>(self, geometries: &[TaggedGeometry<D>], filter: &F, converter: &C) -> Layer
    where
        F: GeometryFilter + ?Sized,
        C: TagConverter<D> + ?Sized,
    {
        let flat = flatten_all(geometries);
        let mut props = LayerProps::new();
        let features =
            self.encoder
                .encode_all(&flat, filter, &mut props, converter, self.cursor_scope);
        let (keys, values) = props.into_parts();

        Layer {
            version: 2,
            name: self.name,
            features,
            keys,
            values,
            extent: Some(self.extent),
        }
    }
}

/// Builder for assembling layers into an MVT tile.
#[derive(Debug, Clone, Default)]
pub struct TileBuilder {
    layers: Vec<Layer>,
}

impl TileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer; layers without features are left out.
    pub fn add_layer(&mut self, layer: Layer) {
        if layer.features.is_empty() {
            log::debug!("skipping empty layer '{}'", layer.name);
            return;
        }
        self.layers.push(layer);
    }

    pub fn build(self) -> Tile {
        Tile {
            layers: self.layers,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
