//! Tile envelopes in world coordinates and slippy-map tile addressing.

use geo::{coord, Coord, Polygon, Rect};

use crate::{Error, Result};

/// Half the circumference of the Web Mercator world, in meters.
pub const WEB_MERCATOR_HALF_WORLD: f64 = 20_037_508.342_789_244;

/// World-coordinate rectangle covered by one tile, plus its pixel extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileEnvelope {
    min_x: f64,
    min_y: f64,
    width: f64,
    height: f64,
    extent: u32,
}

impl TileEnvelope {
    /// Create an envelope from its minimum corner and size.
    ///
    /// Fails for non-finite values, a non-positive width or height, or a zero
    /// extent.
    pub fn new(min_x: f64, min_y: f64, width: f64, height: f64, extent: u32) -> Result<Self> {
        if !(min_x.is_finite() && min_y.is_finite() && width.is_finite() && height.is_finite()) {
            return Err(Error::InvalidEnvelope(
                "envelope values must be finite".to_string(),
            ));
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(Error::InvalidEnvelope(format!(
                "width and height must be positive, got {} x {}",
                width, height
            )));
        }
        if extent == 0 {
            return Err(Error::InvalidEnvelope("extent must be positive".to_string()));
        }

        Ok(Self {
            min_x,
            min_y,
            width,
            height,
            extent,
        })
    }

    /// Create an envelope from two opposite corners.
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64, extent: u32) -> Result<Self> {
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y, extent)
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.min_x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.min_y + self.height
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    /// Same rectangle with a different pixel extent.
    pub fn with_extent(self, extent: u32) -> Result<Self> {
        Self::new(self.min_x, self.min_y, self.width, self.height, extent)
    }

    /// True if `coord` lies inside the envelope or on its boundary.
    pub fn contains(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.min_x
            && coord.x <= self.max_x()
            && coord.y >= self.min_y
            && coord.y <= self.max_y()
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x(), y: self.max_y() },
        )
    }

    /// The envelope as a polygon, the clip operand for boolean operations.
    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }
}

/// Tile coordinates: x, y, and zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    /// Create a new tile coordinate
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Parse a `z/x/y` string.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.split('/').collect();
        let [z, x, y] = parts.as_slice() else {
            return Err(Error::InvalidConfig(format!(
                "tile must be written as z/x/y, got '{}'",
                value
            )));
        };

        let invalid = |part: &str| Error::InvalidConfig(format!("invalid tile component '{}'", part));
        let z: u8 = z.parse().map_err(|_| invalid(z))?;
        let x: u32 = x.parse().map_err(|_| invalid(x))?;
        let y: u32 = y.parse().map_err(|_| invalid(y))?;

        let tile = Self::new(x, y, z);
        if !tile.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "tile {}/{}/{} is outside the zoom {} grid",
                z, x, y, z
            )));
        }
        Ok(tile)
    }

    /// True if x and y fall inside the `2^z` grid.
    pub fn is_valid(&self) -> bool {
        if self.z > 31 {
            return false;
        }
        let n = 1u64 << self.z;
        (self.x as u64) < n && (self.y as u64) < n
    }

    /// Envelope of this tile in Web Mercator (EPSG:3857) meters.
    ///
    /// Tile rows grow southward, so row 0 touches the top of the world.
    pub fn web_mercator_envelope(&self, extent: u32) -> Result<TileEnvelope> {
        let n = 2_f64.powi(self.z as i32);
        let size = 2.0 * WEB_MERCATOR_HALF_WORLD / n;
        let min_x = -WEB_MERCATOR_HALF_WORLD + self.x as f64 * size;
        let max_y = WEB_MERCATOR_HALF_WORLD - self.y as f64 * size;

        TileEnvelope::new(min_x, max_y - size, size, size, extent)
    }
}
