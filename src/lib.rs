//! Convert MIDI files into cell grids for a turtle-driven spreadsheet player.
//!
//! The pipeline is `midi` (parse) -> `notes` (pair on/off events) -> `streams`
//! (split into monophonic voices) -> `quantize` (fit onto a coarse grid) -> `grid`
//! (cells and CSV). `convert` runs it for one file and `corpus` for whole directory trees.

pub mod convert;
pub mod corpus;
pub mod error;
pub mod grid;
pub mod midi;
pub mod notes;
pub mod quantize;
pub mod streams;
