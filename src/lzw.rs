//! LZW decompression for GIF image data.
//!
//! The dictionary is a flat buffer of palette indices plus an offset
//! table, one entry per code. Sequences are stored contiguously, so
//! emitting a code is a single slice borrow; appending an entry copies
//! the previous sequence and pushes one symbol. Offsets are indices
//! into the buffer rather than pointers, so buffer growth never
//! invalidates them.

use crate::bitstream::BlockReader;
use crate::error::Result;

/// Hard cap on dictionary entries (12-bit codes).
const MAX_ENTRIES: usize = 4096;
/// Widest code the stream may use.
const MAX_CODE_WIDTH: u8 = 12;
/// Largest usable minimum code size; anything wider could not grow
/// below the 12-bit cap.
const MAX_MIN_CODE_SIZE: u8 = 11;
/// Initial symbol buffer reservation, sized so typical streams never
/// reallocate.
const SYMBOL_RESERVE: usize = 128 * 1024;

/// Receives runs of decoded palette indices.
pub(crate) trait IndexSink {
    /// Accept palette indices in stream order. Returning `false` tells
    /// the engine no further output is needed; decoding still continues
    /// to the end-of-information code, without further calls.
    fn accept(&mut self, indices: &[u8]) -> bool;
}

/// One dictionary code: a sequence inside the flat symbol buffer.
#[derive(Clone, Copy)]
struct Entry {
    /// Start of the sequence in the symbol buffer.
    offset: u32,
    /// Sequence length in symbols.
    len: u16,
}

/// Dictionary-based decoder for one image block's code stream.
pub(crate) struct LzwDecoder {
    /// Minimum code size after clamping.
    min_code_size: u8,
    clear_code: u16,
    end_code: u16,
    /// Current code width in bits.
    width: u8,
    /// Offset table, one entry per live code.
    entries: Vec<Entry>,
    /// Flat buffer of palette indices the entries point into.
    symbols: Vec<u8>,
    /// Previously processed code; `None` right after a reset.
    prev: Option<u16>,
}

impl LzwDecoder {
    pub(crate) fn new(min_code_size: u8) -> Self {
        let min_code_size = if min_code_size > MAX_MIN_CODE_SIZE {
            log::warn!(
                "LZW minimum code size {} out of range, clamping to {}",
                min_code_size,
                MAX_MIN_CODE_SIZE
            );
            MAX_MIN_CODE_SIZE
        } else {
            min_code_size
        };

        let clear_code = 1u16 << min_code_size;
        let mut symbols = Vec::with_capacity(SYMBOL_RESERVE);
        let mut entries = Vec::with_capacity(MAX_ENTRIES);
        for i in 0..clear_code {
            symbols.push(i as u8);
            entries.push(Entry {
                offset: i as u32,
                len: 1,
            });
        }
        // CLEAR and END occupy table slots but never emit.
        entries.push(Entry { offset: 0, len: 0 });
        entries.push(Entry { offset: 0, len: 0 });

        LzwDecoder {
            min_code_size,
            clear_code,
            end_code: clear_code + 1,
            width: min_code_size + 1,
            entries,
            symbols,
            prev: None,
        }
    }

    /// Decode codes from `reader` until the end-of-information code,
    /// feeding emitted palette indices to `sink`.
    pub(crate) fn decode<S: IndexSink>(
        &mut self,
        reader: &mut BlockReader<'_>,
        sink: &mut S,
    ) -> Result<()> {
        let mut emitting = true;
        loop {
            let code = reader.read_code(self.width)?;
            if code == self.clear_code {
                self.reset();
                continue;
            }
            if code == self.end_code {
                return Ok(());
            }

            let table_len = self.entries.len() as u16;
            let (seq_code, is_deferred) = if code < table_len {
                (code, false)
            } else if code == table_len {
                // The classic KwKwK case: the code being defined by this
                // very step. Its expansion is the previous sequence plus
                // that sequence's first symbol.
                match self.prev {
                    Some(prev) => (prev, true),
                    None => continue,
                }
            } else {
                // Code past the dictionary; tolerate and keep scanning.
                continue;
            };

            let entry = self.entries[seq_code as usize];
            let start = entry.offset as usize;
            let k = self.symbols[start];
            if emitting {
                emitting = sink.accept(&self.symbols[start..start + entry.len as usize]);
                if is_deferred && emitting {
                    emitting = sink.accept(&[k]);
                }
            }

            if let Some(prev) = self.prev {
                if self.entries.len() < MAX_ENTRIES {
                    let p = self.entries[prev as usize];
                    let poff = p.offset as usize;
                    let offset = self.symbols.len() as u32;
                    self.symbols.extend_from_within(poff..poff + p.len as usize);
                    self.symbols.push(k);
                    self.entries.push(Entry {
                        offset,
                        len: p.len + 1,
                    });
                }
            }
            self.prev = Some(code);

            if self.entries.len() == 1 << self.width && self.width < MAX_CODE_WIDTH {
                self.width += 1;
            }
        }
    }

    /// Drop everything learned since construction. No entry is appended
    /// again until a second data code has been read.
    fn reset(&mut self) {
        self.symbols.truncate(self.clear_code as usize);
        self.entries.truncate(self.end_code as usize + 1);
        self.width = self.min_code_size + 1;
        self.prev = None;
    }
}
