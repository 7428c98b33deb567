//! Refocus renders synthetic multi-layer depth scenes with depth-of-field
//! blur and finds the sharpest focal distance by contrast measurement.
//!
//! - Build a [`Scene`] from depth-tagged [`Layer`]s and render it at a focal
//!   distance with [`Scene::render`]
//! - Sweep focal candidates with [`Autofocus`] and inspect the per-candidate
//!   [`focus::FocusFrame`]s and [`Spectrum`] statistics
//!
//! Everything is in-memory, deterministic CPU work; image decoding and any
//! interactive viewer live outside this crate.
#![forbid(unsafe_code)]

pub mod bitmap;
pub mod blur;
pub mod composite;
pub mod convolve;
pub mod error;
pub mod focus;
pub mod pixel;
pub mod scene;

pub use bitmap::{Bitmap, Rect};
pub use blur::gaussian_blur;
pub use convolve::{ConvolutionMode, Kernel, convolve};
pub use error::{RefocusError, RefocusResult};
pub use focus::{Autofocus, FocusReport, FocusResult, Spectrum, SweepOpts};
pub use pixel::Rgb;
pub use scene::{Layer, Scene};
