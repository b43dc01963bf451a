use crate::addr::{VirtAddr, PAGE_OFFSET_BITS, PAGE_SIZE};
use crate::error::{Error, Result};
use crate::util::{parse_dec, parse_hex};
use crate::walk::page_walk;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const WORD_BYTES: usize = 4;
const PAGE_BYTES: usize = PAGE_SIZE as usize;
/// Filename tokens in a description file are width limited.
const MAX_FILENAME_LEN: usize = 127;
const DUMP_WORDS_PER_ROW: usize = 8;

/// Simulated main memory: a flat little-endian byte image, page granular,
/// allocated once and addressed by byte or by 32-bit word.
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// A zero-filled image of `size` bytes; `size` must be a non-zero
    /// multiple of the page size.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || size % PAGE_BYTES != 0 {
            return Err(Error::BadParameter(format!(
                "memory size {size} is not a positive multiple of {PAGE_BYTES}"
            )));
        }
        Ok(Memory {
            bytes: vec![0; size],
        })
    }

    /// Wraps an existing byte image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % PAGE_BYTES != 0 {
            return Err(Error::BadParameter(format!(
                "image size {} is not a positive multiple of {PAGE_BYTES}",
                bytes.len()
            )));
        }
        Ok(Memory { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn word_range(&self, word_index: usize) -> Result<std::ops::Range<usize>> {
        let start = word_index
            .checked_mul(WORD_BYTES)
            .ok_or_else(|| Error::Size(format!("word index 0x{word_index:X} overflows")))?;
        let end = start
            .checked_add(WORD_BYTES)
            .ok_or_else(|| Error::Size(format!("word index 0x{word_index:X} overflows")))?;
        if end > self.bytes.len() {
            return Err(Error::Mem(format!(
                "word index 0x{word_index:X} outside the {} byte image",
                self.bytes.len()
            )));
        }
        Ok(start..end)
    }

    /// Reads the little-endian 32-bit word at `word_index`.
    pub fn read_word(&self, word_index: usize) -> Result<u32> {
        let range = self.word_range(word_index)?;
        let b = &self.bytes[range];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn write_word(&mut self, word_index: usize, value: u32) -> Result<()> {
        let range = self.word_range(word_index)?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn read_byte(&self, byte_index: usize) -> Result<u8> {
        self.bytes.get(byte_index).copied().ok_or_else(|| {
            Error::Mem(format!(
                "byte index 0x{byte_index:X} outside the {} byte image",
                self.bytes.len()
            ))
        })
    }

    pub fn write_byte(&mut self, byte_index: usize, value: u8) -> Result<()> {
        let len = self.bytes.len();
        match self.bytes.get_mut(byte_index) {
            Some(b) => {
                *b = value;
                Ok(())
            }
            None => Err(Error::Mem(format!(
                "byte index 0x{byte_index:X} outside the {len} byte image"
            ))),
        }
    }

    /// Loads an image from a raw binary dump: the file content is the
    /// memory, byte for byte, starting at physical address zero.
    pub fn from_dump_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        info!(
            "loaded {} byte memory image from {}",
            bytes.len(),
            path.display()
        );
        Memory::from_bytes(bytes)
    }

    /// Copies one 4 KiB page file into the image at `byte_offset`.
    fn load_page_file(&mut self, byte_offset: usize, filename: &str) -> Result<()> {
        let data = fs::read(filename).map_err(|e| Error::Io(format!("{filename}: {e}")))?;
        if data.len() < PAGE_BYTES {
            return Err(Error::Io(format!(
                "{filename}: page file holds {} bytes, expected {PAGE_BYTES}",
                data.len()
            )));
        }
        let end = byte_offset
            .checked_add(PAGE_BYTES)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                Error::BadParameter(format!(
                    "page destination 0x{byte_offset:X} outside the {} byte image",
                    self.bytes.len()
                ))
            })?;
        self.bytes[byte_offset..end].copy_from_slice(&data[..PAGE_BYTES]);
        debug!("loaded page file {filename} at 0x{byte_offset:X}");
        Ok(())
    }

    /// Loads an image from a description file.
    ///
    /// Token order: the memory size in bytes, the PGD page file (placed at
    /// physical address zero), a count of table pages followed by that many
    /// `<phys_addr_hex> <file>` pairs, then zero or more
    /// `<virt_addr_hex> <file>` pairs whose destinations are resolved
    /// through the page walker.
    pub fn from_description_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        let mut tokens = text.split_whitespace();
        let mut next = |what: &str| {
            tokens
                .next()
                .ok_or_else(|| Error::Io(format!("description ends before {what}")))
        };

        let size = parse_dec(next("the memory size")?)?;
        let mut mem = Memory::new(size)?;
        mem.load_page_file(0, filename_token(next("the pgd page file")?)?)?;

        let table_pages = parse_dec(next("the table page count")?)?;
        for _ in 0..table_pages {
            let offset = parse_hex(next("a table page address")?)? as usize;
            let filename = filename_token(next("a table page file")?)?;
            mem.load_page_file(offset, filename)?;
        }

        // Data pages addressed virtually; the tables above must already
        // map them.
        while let Some(token) = tokens.next() {
            let vaddr = VirtAddr::from_u64(parse_hex(token)?);
            let filename = filename_token(
                tokens
                    .next()
                    .ok_or_else(|| Error::Io("description ends with a dangling address".into()))?,
            )?;
            let paddr = page_walk(&mem, vaddr)?;
            let offset = (paddr.phy_page_num() << PAGE_OFFSET_BITS) as usize;
            mem.load_page_file(offset, filename)?;
        }

        info!(
            "loaded {} byte memory image described by {}",
            mem.len(),
            path.display()
        );
        Ok(mem)
    }

    /// Hex word dump of `[from_word, to_word)`, eight words per row.
    pub fn dump_region<W: Write>(
        &self,
        out: &mut W,
        from_word: usize,
        to_word: usize,
    ) -> Result<()> {
        let in_range = to_word
            .checked_mul(WORD_BYTES)
            .is_some_and(|end| end <= self.bytes.len());
        if from_word > to_word || !in_range {
            return Err(Error::BadParameter(format!(
                "word range 0x{from_word:X}..0x{to_word:X} outside the image"
            )));
        }
        for row in (from_word..to_word).step_by(DUMP_WORDS_PER_ROW) {
            write!(out, "0x{:08X}:", row * WORD_BYTES)?;
            for word in row..(row + DUMP_WORDS_PER_ROW).min(to_word) {
                write!(out, " {:08X}", self.read_word(word)?)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

fn filename_token(token: &str) -> Result<&str> {
    if token.len() > MAX_FILENAME_LEN {
        return Err(Error::Io(format!(
            "filename token longer than {MAX_FILENAME_LEN} bytes"
        )));
    }
    Ok(token)
}
