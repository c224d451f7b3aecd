//! CLI for mvt-geom - Encode GeoJSON into a Mapbox Vector Tile
//!
//! This is a thin wrapper around the mvt-geom-core library.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use geojson::GeoJson;
use mvt_geom_core::decode::Decoder;
use mvt_geom_core::filter::AcceptAll;
use mvt_geom_core::pipeline::encode_tile;
use mvt_geom_core::tags::{KeyValueTags, Properties, PropertyValue};
use mvt_geom_core::vector_tile::tile::GeomType;
use mvt_geom_core::vector_tile::Tile;
use mvt_geom_core::{
    CursorScope, PipelineConfig, TaggedGeometry, TileCoord, TileEnvelope, TileGeometryPipeline,
};
use prost::Message;

#[derive(Parser, Debug)]
#[command(
    name = "mvt-geom",
    about = "Clip, transform and encode GeoJSON into Mapbox Vector Tiles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a GeoJSON file into a single-layer tile
    Encode(EncodeArgs),
    /// Print the layers and features of a tile
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Input GeoJSON file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output MVT file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Tile envelope in source coordinates
    #[arg(
        long,
        value_name = "MINX,MINY,MAXX,MAXY",
        conflicts_with = "tile",
        required_unless_present = "tile"
    )]
    bbox: Option<String>,

    /// Web Mercator tile; input must be in EPSG:3857 meters
    #[arg(long, value_name = "Z/X/Y")]
    tile: Option<String>,

    /// Tile extent in pixels
    #[arg(long)]
    extent: Option<u32>,

    /// Simplification tolerance, strictly between 0 and 0.5
    #[arg(long)]
    tolerance: Option<f64>,

    /// Layer name
    #[arg(long)]
    layer: Option<String>,

    /// Restart the delta cursor at every feature
    #[arg(long)]
    per_feature_cursor: bool,

    /// JSON pipeline configuration; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Input MVT file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Decode each feature from the origin instead of the previous feature
    #[arg(long)]
    per_feature_cursor: bool,
}

impl EncodeArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if let Some(extent) = self.extent {
            config = config.with_extent(extent);
        }
        if let Some(tolerance) = self.tolerance {
            config = config.with_simplify_tolerance(tolerance);
        }
        if let Some(layer) = &self.layer {
            config = config.with_layer_name(layer.clone());
        }
        if self.per_feature_cursor {
            config = config.with_cursor_scope(CursorScope::Feature);
        }

        config.validate().context("Invalid pipeline configuration")?;
        Ok(config)
    }

    fn envelope(&self, extent: u32) -> Result<TileEnvelope> {
        match (&self.bbox, &self.tile) {
            (Some(bbox), _) => {
                let [min_x, min_y, max_x, max_y] = parse_bbox(bbox)?;
                Ok(TileEnvelope::from_bounds(min_x, min_y, max_x, max_y, extent)?)
            }
            (None, Some(tile)) => Ok(TileCoord::parse(tile)?.web_mercator_envelope(extent)?),
            (None, None) => bail!("Either --bbox or --tile is required"),
        }
    }
}

fn parse_bbox(value: &str) -> Result<[f64; 4]> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<f64>, _>>()
        .with_context(|| format!("Invalid bbox '{}'", value))?;

    match parts.as_slice() {
        [min_x, min_y, max_x, max_y] => Ok([*min_x, *min_y, *max_x, *max_y]),
        _ => bail!("bbox needs 4 comma-separated numbers, got '{}'", value),
    }
}

fn to_property(value: &serde_json::Value) -> Option<PropertyValue> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(PropertyValue::Bool(*b)),
        serde_json::Value::String(s) => Some(PropertyValue::String(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(PropertyValue::UInt(u))
            } else if let Some(i) = n.as_i64() {
                Some(PropertyValue::SInt(i))
            } else {
                n.as_f64().map(PropertyValue::Double)
            }
        }
        // Nested values are kept as their JSON text
        other => Some(PropertyValue::String(other.to_string())),
    }
}

/// Features without a usable geometry are skipped with a warning.
fn to_tagged(index: usize, feature: geojson::Feature) -> Option<TaggedGeometry<Properties>> {
    let geometry: geo::Geometry<f64> = match feature.geometry?.try_into() {
        Ok(geometry) => geometry,
        Err(err) => {
            log::warn!("skipping feature {}: {}", index, err);
            return None;
        }
    };

    let properties: Properties = feature
        .properties
        .iter()
        .flatten()
        .filter_map(|(key, value)| to_property(value).map(|p| (key.clone(), p)))
        .collect();

    Some(TaggedGeometry::with_user_data(geometry, properties))
}

fn read_geojson(path: &Path) -> Result<Vec<TaggedGeometry<Properties>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = text
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON {}", path.display()))?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature::from(geometry)],
    };

    Ok(features
        .into_iter()
        .enumerate()
        .filter_map(|(index, feature)| to_tagged(index, feature))
        .collect())
}

fn run_encode(args: &EncodeArgs) -> Result<()> {
    let config = args.pipeline_config()?;
    let envelope = args.envelope(config.extent)?;
    let pipeline = TileGeometryPipeline::new(envelope, config)?;

    let sources = read_geojson(&args.input)?;
    log::info!("Read {} features from {}", sources.len(), args.input.display());

    let (layer, diagnostics) = pipeline.process(&sources, &AcceptAll, &KeyValueTags);

    let feature_count = layer.features.len();
    let bytes = encode_tile(vec![layer]);
    fs::write(&args.output, &bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "✓ Encoded {} features ({} bytes) to {}",
        feature_count,
        bytes.len(),
        args.output.display()
    );
    if !diagnostics.is_empty() {
        println!("  {} geometries skipped", diagnostics.len());
    }

    Ok(())
}

fn type_name(value: Option<i32>) -> &'static str {
    match value.and_then(|v| GeomType::try_from(v).ok()) {
        Some(GeomType::Point) => "Point",
        Some(GeomType::Linestring) => "LineString",
        Some(GeomType::Polygon) => "Polygon",
        _ => "Unknown",
    }
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let bytes =
        fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
    let tile = Tile::decode(bytes.as_slice())
        .with_context(|| format!("Failed to decode tile {}", args.input.display()))?;

    for layer in &tile.layers {
        println!(
            "layer '{}' (version {}, extent {}): {} features, {} keys, {} values",
            layer.name,
            layer.version,
            layer.extent.unwrap_or(4096),
            layer.features.len(),
            layer.keys.len(),
            layer.values.len()
        );

        let mut decoder = Decoder::new();
        for feature in &layer.features {
            if args.per_feature_cursor {
                decoder.reset();
            }

            let id = feature
                .id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            match decoder.decode(&feature.geometry) {
                Ok(paths) => {
                    let closed = paths.iter().filter(|p| p.closed).count();
                    println!(
                        "  #{} {}: {} paths ({} closed), {} tags",
                        id,
                        type_name(feature.r#type),
                        paths.len(),
                        closed,
                        feature.tags.len() / 2
                    );
                }
                Err(err) => println!("  #{} {}: {}", id, type_name(feature.r#type), err),
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match &cli.command {
        Command::Encode(args) => run_encode(args).context("Failed to encode tile"),
        Command::Inspect(args) => run_inspect(args).context("Failed to inspect tile"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        assert_eq!(parse_bbox("0,0,10,20").unwrap(), [0.0, 0.0, 10.0, 20.0]);
        assert_eq!(parse_bbox(" -1.5, 2 ,3,4 ").unwrap(), [-1.5, 2.0, 3.0, 4.0]);
        assert!(parse_bbox("0,0,10").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
    }

    #[test]
    fn test_to_property() {
        assert_eq!(to_property(&serde_json::json!(3)), Some(PropertyValue::UInt(3)));
        assert_eq!(to_property(&serde_json::json!(-3)), Some(PropertyValue::SInt(-3)));
        assert_eq!(to_property(&serde_json::json!(1.5)), Some(PropertyValue::Double(1.5)));
        assert_eq!(to_property(&serde_json::json!(null)), None);
        assert_eq!(
            to_property(&serde_json::json!([1, 2])),
            Some(PropertyValue::String("[1,2]".to_string()))
        );
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "mvt-geom",
            "encode",
            "in.geojson",
            "out.mvt",
            "--bbox",
            "0,0,10,10",
            "--extent",
            "512",
            "--layer",
            "roads",
            "--per-feature-cursor",
        ]);
        let Command::Encode(args) = cli.command else {
            panic!("Expected encode command");
        };

        let config = args.pipeline_config().unwrap();
        assert_eq!(config.extent, 512);
        assert_eq!(config.layer_name, "roads");
        assert_eq!(config.cursor_scope, CursorScope::Feature);

        let envelope = args.envelope(config.extent).unwrap();
        assert_eq!(envelope.max_x(), 10.0);
        assert_eq!(envelope.extent(), 512);
    }

    #[test]
    fn test_bbox_and_tile_conflict() {
        let result = Cli::try_parse_from([
            "mvt-geom",
            "encode",
            "in.geojson",
            "out.mvt",
            "--bbox",
            "0,0,1,1",
            "--tile",
            "0/0/0",
        ]);
        assert!(result.is_err());
    }
}
