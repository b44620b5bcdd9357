// Codec implementations often use patterns that trigger clippy warnings
#![allow(clippy::too_many_arguments)]

//! Streaming GIF Decoder
//!
//! This crate provides a pure Rust decoder for the GIF87a and GIF89a
//! image formats. It consumes a fully loaded byte buffer and yields
//! successive frames as fully composed 32-bit RGBA rasters of the
//! logical screen.
//!
//! # Features
//!
//! - LZW decompression with the full 12-bit dictionary
//! - Animation support with per-frame delays
//! - Transparency and inter-frame disposal (keep, restore background,
//!   restore previous)
//! - Interlaced images
//! - Local and global color tables
//!
//! Frames are composed onto a persistent canvas, so each emitted
//! [`Frame`] is the complete screen, not just the changed rectangle.
//! Pixel rows are stored bottom-up, the order GPU texture uploads
//! expect.
//!
//! # Example
//!
//! ```no_run
//! use gifstream::GifDecoder;
//!
//! let data = std::fs::read("animation.gif").unwrap();
//! let mut decoder = GifDecoder::new(&data);
//! let info = decoder.info().unwrap();
//! println!("{} {}x{}", info.version, info.width, info.height);
//!
//! while let Some(frame) = decoder.next_frame().unwrap() {
//!     println!("frame for {} ms", frame.delay_ms);
//! }
//! ```

#![warn(missing_docs)]

mod bitstream;
mod decoder;
mod error;
mod frame;
mod lzw;
mod types;

pub use decoder::{get_dimensions, probe_gif, GifDecoder, GifInfo};
pub use error::{GifError, Result};
pub use frame::Frame;
pub use types::{DisposalMethod, ScreenDescriptor, Version};
