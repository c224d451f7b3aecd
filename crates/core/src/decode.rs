//! Command buffer decoder.
//!
//! Turns MVT geometry commands back into integer paths. Used by the `inspect`
//! CLI command and by tests to check what the encoder produced.

use geo::Coord;
use thiserror::Error;

use crate::command::{command_decode, zigzag_decode, Command};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown command id {id} at offset {offset}")]
    UnknownCommand { id: u32, offset: usize },

    #[error("command at offset {offset} needs {needed} parameters, buffer ends after {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("LineTo at offset {offset} without a preceding MoveTo")]
    LineToWithoutMoveTo { offset: usize },

    #[error("ClosePath at offset {offset} without an open path")]
    ClosePathWithoutPath { offset: usize },

    #[error("ClosePath at offset {offset} has count {count}, expected 1")]
    InvalidClosePathCount { offset: usize, count: u32 },
}

/// One decoded MoveTo run: a point, a line or a ring.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    pub coords: Vec<Coord<i32>>,
    /// Set when the path was terminated by ClosePath
    pub closed: bool,
}

impl Path {
    /// Shoelace area of a closed path; see [`ring_area`].
    pub fn signed_area(&self) -> f64 {
        ring_area(&self.coords)
    }
}

/// Signed shoelace area of a ring, closing it implicitly.
///
/// Positive when the vertices run counter-clockwise in the numeric axes,
/// which is clockwise on screen with y pointing down.
pub fn ring_area(coords: &[Coord<i32>]) -> f64 {
    if coords.len() < 3 {
        return 0.0;
    }
    let twice: i64 = coords
        .iter()
        .zip(coords.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice as f64 / 2.0
}

/// Decodes command buffers, tracking the cursor between calls.
///
/// Keep one decoder per layer when the encoder shares its cursor across
/// the layer, or call [`Decoder::reset`] between features otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    x: i32,
    y: i32,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.x = 0;
        self.y = 0;
    }

    pub fn cursor(&self) -> Coord<i32> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    /// Decode one feature's geometry.
    pub fn decode(&mut self, geometry: &[u32]) -> Result<Vec<Path>, DecodeError> {
        let mut paths: Vec<Path> = Vec::new();
        let mut offset = 0;

        while offset < geometry.len() {
            let header_offset = offset;
            let (id, count) = command_decode(geometry[offset]);
            offset += 1;

            let command = Command::from_id(id).ok_or(DecodeError::UnknownCommand {
                id,
                offset: header_offset,
            })?;

            match command {
                Command::MoveTo | Command::LineTo => {
                    let needed = count as usize * 2;
                    let available = geometry.len() - offset;
                    if available < needed {
                        return Err(DecodeError::Truncated {
                            offset: header_offset,
                            needed,
                            available,
                        });
                    }

                    if command == Command::LineTo && paths.last().map_or(true, |p| p.closed) {
                        return Err(DecodeError::LineToWithoutMoveTo {
                            offset: header_offset,
                        });
                    }

                    for pair in geometry[offset..offset + needed].chunks_exact(2) {
                        self.x = self.x.wrapping_add(zigzag_decode(pair[0]));
                        self.y = self.y.wrapping_add(zigzag_decode(pair[1]));
                        let coord = self.cursor();

                        match command {
                            Command::MoveTo => paths.push(Path {
                                coords: vec![coord],
                                closed: false,
                            }),
                            _ => {
                                if let Some(path) = paths.last_mut() {
                                    path.coords.push(coord);
                                }
                            }
                        }
                    }
                    offset += needed;
                }
                Command::ClosePath => {
                    if count != 1 {
                        return Err(DecodeError::InvalidClosePathCount {
                            offset: header_offset,
                            count,
                        });
                    }
                    match paths.last_mut() {
                        Some(path) if !path.closed => path.closed = true,
                        _ => {
                            return Err(DecodeError::ClosePathWithoutPath {
                                offset: header_offset,
                            })
                        }
                    }
                }
            }
        }

        Ok(paths)
    }
}
