//! Raster module
//!
//! Floating-point image buffers and file I/O.
//!
//! # Example
//!
//! ```rust,no_run
//! use rl_deblur::raster::{load_image, save_image};
//! use std::path::Path;
//!
//! let img = load_image(Path::new("blurred.png"), true).unwrap();
//! println!("{}x{} ({} channels)", img.width(), img.height(), img.channels());
//! save_image(&img, Path::new("copy.png")).unwrap();
//! ```

mod io;
mod types;

pub use io::{from_dynamic, load_image, save_image, to_dynamic};
pub use types::{FloatImage, RasterError, Result};
