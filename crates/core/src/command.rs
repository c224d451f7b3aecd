//! MVT command integers, parameter integers and the delta-encoding cursor.
//!
//! - **Zigzag encoding**: signed deltas as small unsigned integers
//! - **Command headers**: `(command_id & 0x7) | (count << 3)`
//! - **Cursor**: the running position every delta is measured from
//!
//! Reference: <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#43-geometry-encoding>

use geo::Coord;

/// MVT command IDs
pub const CMD_MOVE_TO: u32 = 1;
pub const CMD_LINE_TO: u32 = 2;
pub const CMD_CLOSE_PATH: u32 = 7;

/// Largest repeat count a command header can carry (29 bits).
pub const CMD_HDR_LEN_MAX: u32 = (1 << 29) - 1;

/// Drawing command carried by a command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MoveTo,
    LineTo,
    ClosePath,
}

impl Command {
    pub fn id(self) -> u32 {
        match self {
            Command::MoveTo => CMD_MOVE_TO,
            Command::LineTo => CMD_LINE_TO,
            Command::ClosePath => CMD_CLOSE_PATH,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            CMD_MOVE_TO => Some(Command::MoveTo),
            CMD_LINE_TO => Some(Command::LineTo),
            CMD_CLOSE_PATH => Some(Command::ClosePath),
            _ => None,
        }
    }

    /// Header for this command repeated `count` times.
    #[inline]
    pub fn header(self, count: u32) -> u32 {
        command_encode(self.id(), count)
    }
}

// ============================================================================
// Zigzag Encoding
// ============================================================================

/// Encode a signed integer using zigzag encoding.
///
/// Maps signed integers to unsigned integers so that small magnitudes of
/// either sign stay small: 0 → 0, -1 → 1, 1 → 2, -2 → 3, 2 → 4.
#[inline]
pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Decode a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

// ============================================================================
// Command Encoding
// ============================================================================

/// Pack a command with a repeat count.
#[inline]
pub fn command_encode(command_id: u32, count: u32) -> u32 {
    (command_id & 0x7) | (count << 3)
}

/// Unpack a command into (command_id, count).
#[inline]
pub fn command_decode(command: u32) -> (u32, u32) {
    (command & 0x7, command >> 3)
}

/// ClosePath never carries parameters, so its count is always 1.
#[inline]
pub fn close_path_header() -> u32 {
    command_encode(CMD_CLOSE_PATH, 1)
}

// ============================================================================
// Cursor
// ============================================================================

/// Position the next delta is measured from.
///
/// One cursor lives for one layer encoding pass. It keeps the full-precision
/// position of the last emitted point, while deltas are computed from the
/// truncated integer values of both points.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
}

impl Cursor {
    /// A cursor at the tile origin.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
    }

    /// Append the zigzag deltas from the cursor to `target`, then move the
    /// cursor onto `target`.
    ///
    /// Returns the raw `(dx, dy)` that were encoded.
    pub fn emit(&mut self, target: Coord<f64>, out: &mut Vec<u32>) -> (i32, i32) {
        let dx = (target.x as i32).wrapping_sub(self.x as i32);
        let dy = (target.y as i32).wrapping_sub(self.y as i32);
        out.push(zigzag_encode(dx));
        out.push(zigzag_encode(dy));
        self.x = target.x;
        self.y = target.y;
        (dx, dy)
    }

    /// True if `coord` lands on the same integer cell as the cursor.
    #[inline]
    pub fn equal_as_ints(&self, coord: Coord<f64>) -> bool {
        equal_as_ints(self.position(), coord)
    }
}

/// True if both coordinates are equal after truncation to `i32`.
#[inline]
pub fn equal_as_ints(a: Coord<f64>, b: Coord<f64>) -> bool {
    a.x as i32 == b.x as i32 && a.y as i32 == b.y as i32
}

/// Buffer length needed for a point run of `coord_count` points.
pub fn point_buffer_len(coord_count: usize) -> usize {
    1 + coord_count * 2
}

/// Buffer length needed for one line or ring of `coord_count` points.
pub fn line_buffer_len(coord_count: usize, close: bool) -> usize {
    2 + usize::from(close) + coord_count * 2
}
