//! Audio device adapters
//!
//! Capture goes through cpal, playback through rodio. Both keep their
//! device handles on dedicated threads.

mod cpal_input;
mod rodio_output;

pub use cpal_input::CpalInput;
pub use rodio_output::RodioOutput;
