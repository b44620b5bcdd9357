//! Streaming GIF decoder and frame compositor.

use crate::bitstream::BlockReader;
use crate::error::{GifError, Result};
use crate::frame::Frame;
use crate::lzw::{IndexSink, LzwDecoder};
use crate::types::{
    read_palette, DisposalMethod, GraphicControl, ScreenDescriptor, Version,
    EXTENSION_INTRODUCER, GIF87A_SIGNATURE, GIF89A_SIGNATURE, GRAPHIC_CONTROL_LABEL,
    IMAGE_SEPARATOR, TRAILER,
};

/// Header facts, available once the logical screen descriptor has been
/// parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GifInfo {
    /// Format version from the signature.
    pub version: Version,
    /// Logical screen width in pixels.
    pub width: u16,
    /// Logical screen height in pixels.
    pub height: u16,
    /// RGBA of the background palette entry; zeros when there is no
    /// global color table.
    pub background_color: [u8; 4],
}

/// Streaming GIF decoder.
///
/// Decodes GIF87a and GIF89a data from a fully resident byte buffer,
/// one frame per [`next_frame`](GifDecoder::next_frame) call. Every
/// emitted [`Frame`] is the complete logical screen with transparency,
/// interlacing and inter-frame disposal already applied; pixel rows
/// are stored bottom-up (see [`Frame`]).
///
/// The canvas and dictionary buffers live inside the decoder and are
/// released when it is dropped; the canvas is allocated once at the
/// first frame and reused afterwards.
///
/// # Example
///
/// ```no_run
/// use gifstream::GifDecoder;
///
/// let data = std::fs::read("animation.gif").unwrap();
/// let mut decoder = GifDecoder::new(&data);
/// while let Some(frame) = decoder.next_frame().unwrap() {
///     println!("{}x{} for {} ms", frame.width, frame.height, frame.delay_ms);
/// }
/// ```
pub struct GifDecoder<'a> {
    data: &'a [u8],
    /// Cursor into `data`.
    pos: usize,
    /// Parsed header facts; `None` until the first frame request.
    info: Option<GifInfo>,
    /// Global color table, if the header declared one.
    global_palette: Option<Vec<[u8; 4]>>,
    /// Graphic control state, mutated by each graphic control extension.
    control: GraphicControl,
    /// Disposal of the most recently decoded frame, applied to the
    /// canvas before the next one lands.
    pending_disposal: DisposalMethod,
    /// Canvas: the composed logical screen, RGBA, rows bottom-up.
    output: Vec<u8>,
    /// Snapshot for `RestorePrevious` disposal.
    previous: Vec<u8>,
    /// Position of the first block after header and global palette.
    first_block_pos: usize,
    done: bool,
    failed: bool,
}

impl<'a> GifDecoder<'a> {
    /// Create a decoder over `data`. The header is parsed lazily at the
    /// first frame request.
    pub fn new(data: &'a [u8]) -> Self {
        GifDecoder {
            data,
            pos: 0,
            info: None,
            global_palette: None,
            control: GraphicControl::default(),
            pending_disposal: DisposalMethod::default(),
            output: Vec::new(),
            previous: Vec::new(),
            first_block_pos: 0,
            done: false,
            failed: false,
        }
    }

    /// Parse the header if needed and return the header facts.
    pub fn info(&mut self) -> Result<GifInfo> {
        self.ensure_header()?;
        Ok(self.info.unwrap())
    }

    /// Format version, once the header has been parsed.
    pub fn version(&self) -> Option<Version> {
        self.info.map(|i| i.version)
    }

    /// Logical screen width, once the header has been parsed.
    pub fn width(&self) -> Option<u16> {
        self.info.map(|i| i.width)
    }

    /// Logical screen height, once the header has been parsed.
    pub fn height(&self) -> Option<u16> {
        self.info.map(|i| i.height)
    }

    /// RGBA of the background palette entry, once the header has been
    /// parsed. Zeros when there is no global color table.
    pub fn background_color(&self) -> Option<[u8; 4]> {
        self.info.map(|i| i.background_color)
    }

    /// Decode the next frame.
    ///
    /// Returns `Ok(None)` once the trailer has been reached, and on
    /// every call after that. A decode error leaves the decoder in a
    /// failed state; subsequent calls return [`GifError::Failed`].
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.failed {
            return Err(GifError::Failed);
        }
        if self.done {
            return Ok(None);
        }
        match self.next_frame_inner() {
            Ok(frame) => Ok(frame),
            Err(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }

    /// Decode all remaining frames.
    pub fn decode_all(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Rewind to the first block after the header, clearing the canvas
    /// and control state so the animation restarts from its first
    /// frame. Header facts stay parsed and the canvas buffers stay
    /// allocated.
    pub fn reset(&mut self) {
        self.pos = self.first_block_pos;
        self.control = GraphicControl::default();
        self.pending_disposal = DisposalMethod::default();
        self.output.fill(0);
        self.previous.fill(0);
        self.done = false;
        self.failed = false;
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.info.is_some() {
            return Ok(());
        }
        if self.data.len() < 13 {
            return Err(GifError::InvalidHeader(format!(
                "{} bytes is too small for a GIF",
                self.data.len()
            )));
        }
        let version = match &self.data[0..6] {
            sig if sig == GIF87A_SIGNATURE => Version::Gif87a,
            sig if sig == GIF89A_SIGNATURE => Version::Gif89a,
            sig => {
                return Err(GifError::InvalidHeader(format!(
                    "unrecognized signature {:02X?}",
                    sig
                )))
            }
        };
        let screen = ScreenDescriptor::parse(&self.data[6..13])?;
        self.pos = 13;

        let mut background_color = [0u8; 4];
        if screen.has_global_table {
            let entries = 1usize << (screen.global_table_size + 1);
            let palette = read_palette(self.data, self.pos, entries)?;
            self.pos += entries * 3;
            if let Some(&color) = palette.get(screen.background_index as usize) {
                background_color = color;
            }
            self.global_palette = Some(palette);
        }

        self.first_block_pos = self.pos;
        self.info = Some(GifInfo {
            version,
            width: screen.width,
            height: screen.height,
            background_color,
        });
        Ok(())
    }

    fn next_frame_inner(&mut self) -> Result<Option<Frame>> {
        self.ensure_header()?;
        loop {
            let introducer = self.read_u8()?;
            match introducer {
                TRAILER => {
                    self.done = true;
                    return Ok(None);
                }
                EXTENSION_INTRODUCER => {
                    let label = self.read_u8()?;
                    self.handle_extension(label)?;
                }
                IMAGE_SEPARATOR => {
                    if let Some(frame) = self.decode_image()? {
                        return Ok(Some(frame));
                    }
                }
                other => return Err(GifError::UnexpectedBlock(other)),
            }
        }
    }

    fn handle_extension(&mut self, label: u8) -> Result<()> {
        if label == GRAPHIC_CONTROL_LABEL {
            let _block_size = self.read_u8()?;
            let flags = self.read_u8()?;
            let delay = self.read_u16()?;
            let transparent = self.read_u8()?;
            let _terminator = self.read_u8()?;
            self.control = GraphicControl {
                delay_centis: delay,
                transparent_index: (flags & 0x01 != 0).then_some(transparent),
                disposal: DisposalMethod::from_flags(flags),
            };
        } else {
            // Comment, plain text and application extensions (including
            // the Netscape loop block) carry nothing this decoder uses.
            log::debug!("skipping extension 0x{label:02X}");
            self.skip_sub_blocks()?;
        }
        Ok(())
    }

    /// Decode one image block. Returns `None` for zero-sized
    /// descriptors, which carry no frame.
    fn decode_image(&mut self) -> Result<Option<Frame>> {
        let left = self.read_u16()? as usize;
        let top = self.read_u16()? as usize;
        let frame_width = self.read_u16()? as usize;
        let frame_height = self.read_u16()? as usize;
        let flags = self.read_u8()?;

        let interlaced = flags & 0x40 != 0;
        let local_palette = if flags & 0x80 != 0 {
            let entries = 1usize << ((flags & 0x07) + 1);
            let palette = read_palette(self.data, self.pos, entries)?;
            self.pos += entries * 3;
            Some(palette)
        } else {
            None
        };

        let min_code_size = self.read_u8()?;

        if frame_width == 0 || frame_height == 0 {
            log::debug!("skipping zero-sized image descriptor");
            self.skip_sub_blocks()?;
            return Ok(None);
        }

        let info = self.info.unwrap();
        let screen_width = info.width as usize;
        let screen_height = info.height as usize;
        let delay_ms = self.control.delay_centis as u32 * 10;

        // First image: allocate the canvas and its snapshot, both
        // transparent black.
        if self.output.is_empty() {
            self.output = vec![0; screen_width * screen_height * 4];
            self.previous = vec![0; screen_width * screen_height * 4];
        }

        // Apply the previous frame's disposal before this frame's
        // pixels land.
        match self.pending_disposal {
            DisposalMethod::None | DisposalMethod::Keep => {
                self.previous.copy_from_slice(&self.output);
            }
            DisposalMethod::RestoreBackground => self.output.fill(0),
            DisposalMethod::RestorePrevious => self.output.copy_from_slice(&self.previous),
        }

        let palette: &[[u8; 4]] = match &local_palette {
            Some(local) => local,
            None => match &self.global_palette {
                Some(global) => global,
                None => {
                    log::debug!("image block with no active color table");
                    &[]
                }
            },
        };

        let mut placer = FramePlacer::new(
            &mut self.output,
            palette,
            self.control.transparent_index,
            screen_width,
            screen_height,
            left,
            top,
            frame_width,
            frame_height,
        );
        let mut reader = BlockReader::new(self.data, self.pos);
        LzwDecoder::new(min_code_size).decode(&mut reader, &mut placer)?;
        reader.finish()?;
        self.pos = reader.position();

        if interlaced {
            deinterlace_rows(&mut self.output, screen_width * 4);
        }

        self.pending_disposal = self.control.disposal;

        Ok(Some(Frame {
            width: info.width,
            height: info.height,
            delay_ms,
            pixels: self.output.clone(),
        }))
    }

    fn read_u8(&mut self) -> Result<u8> {
        match self.data.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(byte)
            }
            None => Err(self.truncated(1)),
        }
    }

    fn read_u16(&mut self) -> Result<u16> {
        if self.pos + 2 > self.data.len() {
            return Err(self.truncated(2));
        }
        let value = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    fn truncated(&self, needed: usize) -> GifError {
        GifError::Truncated {
            expected: self.pos + needed,
            actual: self.data.len(),
        }
    }

    fn skip_sub_blocks(&mut self) -> Result<()> {
        loop {
            let len = self.read_u8()? as usize;
            if len == 0 {
                return Ok(());
            }
            if self.pos + len > self.data.len() {
                return Err(GifError::MalformedSubBlock {
                    declared: len,
                    available: self.data.len() - self.pos,
                });
            }
            self.pos += len;
        }
    }
}

/// Check whether `data` starts with a GIF signature.
pub fn probe_gif(data: &[u8]) -> bool {
    data.len() >= 6 && (&data[0..6] == GIF87A_SIGNATURE || &data[0..6] == GIF89A_SIGNATURE)
}

/// Logical screen dimensions from the header, without decoding frames.
pub fn get_dimensions(data: &[u8]) -> Result<(u16, u16)> {
    let mut decoder = GifDecoder::new(data);
    let info = decoder.info()?;
    Ok((info.width, info.height))
}

/// Writes decoded palette indices into the canvas at the frame
/// rectangle, clipping against the screen edges.
///
/// The canvas stores rows bottom-up, so the rectangle is walked from
/// its top row downward while the buffer row index decreases. The two
/// hoisted bounds keep the per-pixel work branch-light: `row_end` is
/// where the cursor wraps to the next row, `safe_end` the end of the
/// span that is actually on screen.
struct FramePlacer<'p> {
    output: &'p mut [u8],
    palette: &'p [[u8; 4]],
    transparent: Option<u8>,
    screen_width: usize,
    screen_height: usize,
    left: usize,
    top: usize,
    frame_width: usize,
    frame_height: usize,
    /// Current rectangle row, topmost first.
    row: usize,
    /// Pixel cursor within the canvas, in pixel units.
    cur: usize,
    row_end: usize,
    safe_end: usize,
    done: bool,
}

impl<'p> FramePlacer<'p> {
    fn new(
        output: &'p mut [u8],
        palette: &'p [[u8; 4]],
        transparent: Option<u8>,
        screen_width: usize,
        screen_height: usize,
        left: usize,
        top: usize,
        frame_width: usize,
        frame_height: usize,
    ) -> Self {
        let mut placer = FramePlacer {
            output,
            palette,
            transparent,
            screen_width,
            screen_height,
            left,
            top,
            frame_width,
            frame_height,
            row: 0,
            cur: 0,
            row_end: 0,
            safe_end: 0,
            done: false,
        };
        placer.begin_row();
        placer
    }

    /// Position the cursor at the current rectangle row, or mark the
    /// placer done once the rectangle is filled or the next row would
    /// fall below the screen.
    fn begin_row(&mut self) {
        if self.row == self.frame_height || self.top + self.row >= self.screen_height {
            self.done = true;
            return;
        }
        let base = (self.screen_height - 1 - self.top - self.row) * self.screen_width;
        self.cur = base + self.left;
        self.row_end = self.cur + self.frame_width;
        self.safe_end = base + (self.left + self.frame_width).min(self.screen_width);
    }
}

impl IndexSink for FramePlacer<'_> {
    fn accept(&mut self, indices: &[u8]) -> bool {
        if self.done {
            return false;
        }
        for &idx in indices {
            if self.cur < self.safe_end
                && self.transparent != Some(idx)
                && (idx as usize) < self.palette.len()
            {
                let at = self.cur * 4;
                self.output[at..at + 4].copy_from_slice(&self.palette[idx as usize]);
            }
            self.cur += 1;
            if self.cur == self.row_end {
                self.row += 1;
                self.begin_row();
                if self.done {
                    return false;
                }
            }
        }
        true
    }
}

/// Remap canvas rows from the four-pass interlace order back to linear
/// order. Works on whole canvas rows; the canonical case is an
/// interlaced frame covering the full screen height.
fn deinterlace_rows(output: &mut [u8], stride: usize) {
    if stride == 0 {
        return;
    }
    let rows = output.len() / stride;
    let interlaced = output.to_vec();
    let mut src = 0usize;
    for (start, step) in [(0usize, 8usize), (4, 8), (2, 4), (1, 2)] {
        let mut dest = start;
        while dest < rows {
            let from = (rows - 1 - src) * stride;
            let to = (rows - 1 - dest) * stride;
            output[to..to + stride].copy_from_slice(&interlaced[from..from + stride]);
            src += 1;
            dest += step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placer_writes_bottom_up() {
        // 2x2 screen, frame covering it all. Stream order is english
        // reading order, so the first emitted row is the top screen
        // row, which lives in the upper half of the buffer.
        let mut output = vec![0u8; 2 * 2 * 4];
        let palette = [[10, 0, 0, 255], [0, 20, 0, 255]];
        let mut placer = FramePlacer::new(&mut output, &palette, None, 2, 2, 0, 0, 2, 2);
        assert!(placer.accept(&[1, 1]));
        assert!(!placer.accept(&[0, 0]));
        assert_eq!(&output[8..12], &[0, 20, 0, 255]); // top row
        assert_eq!(&output[0..4], &[10, 0, 0, 255]); // bottom row
    }

    #[test]
    fn test_placer_horizontal_clip() {
        // 2x1 screen, frame of width 3 at left=1: only x=1 is written,
        // the rest of the row is consumed without palette lookups.
        let mut output = vec![0u8; 2 * 1 * 4];
        let palette = [[1, 2, 3, 255], [4, 5, 6, 255]];
        let mut placer = FramePlacer::new(&mut output, &palette, None, 2, 1, 1, 0, 3, 1);
        assert!(!placer.accept(&[1, 0, 0]));
        assert_eq!(&output[0..4], &[0, 0, 0, 0]); // x=0 untouched
        assert_eq!(&output[4..8], &[4, 5, 6, 255]); // x=1
    }

    #[test]
    fn test_placer_vertical_clip_stops_consuming() {
        // 1x1 screen, frame of height 3: rows past the screen bottom
        // refuse further input so the engine can drain without writes.
        let mut output = vec![0u8; 4];
        let palette = [[7, 7, 7, 255], [9, 9, 9, 255]];
        let mut placer = FramePlacer::new(&mut output, &palette, None, 1, 1, 0, 0, 1, 3);
        assert!(!placer.accept(&[1]));
        assert!(!placer.accept(&[0]));
        assert_eq!(&output[0..4], &[9, 9, 9, 255]);
    }

    #[test]
    fn test_placer_transparent_skips_write() {
        let mut output = vec![0xAAu8; 2 * 1 * 4];
        let palette = [[1, 1, 1, 255], [2, 2, 2, 255]];
        let mut placer = FramePlacer::new(&mut output, &palette, Some(1), 2, 1, 0, 0, 2, 1);
        assert!(!placer.accept(&[1, 0]));
        assert_eq!(&output[0..4], &[0xAA, 0xAA, 0xAA, 0xAA]);
        assert_eq!(&output[4..8], &[1, 1, 1, 255]);
    }

    #[test]
    fn test_deinterlace_eight_rows() {
        // One-pixel-wide canvas, 8 rows. Sequentially decoded rows
        // carry the pass-order screen rows 0,4,2,6,1,3,5,7. Remember
        // rows are stored bottom-up: buffer row 7 is screen row 0.
        let stride = 4;
        let mut output = vec![0u8; 8 * stride];
        for (seq, screen_row) in [0u8, 4, 2, 6, 1, 3, 5, 7].iter().enumerate() {
            let base = (7 - seq) * stride;
            output[base..base + stride].fill(*screen_row);
        }
        deinterlace_rows(&mut output, stride);
        for buffer_row in 0..8 {
            let screen_row = 7 - buffer_row;
            assert_eq!(output[buffer_row * stride], screen_row as u8);
        }
    }

    #[test]
    fn test_probe() {
        assert!(probe_gif(b"GIF89a tail"));
        assert!(probe_gif(b"GIF87a tail"));
        assert!(!probe_gif(b"GIF88a tail"));
        assert!(!probe_gif(b"GIF"));
    }
}
