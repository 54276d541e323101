//! Block files: a sequence of `[len: u32 LE][bincode block]` records.

use crate::{Error, Result};
use dagchain_primitives::Block;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// Upper bound of a single record, well above any valid block.
const MAX_RECORD_SIZE: u32 = 32 * 1024 * 1024;

pub struct BlockFileReader<R> {
    reader: R,
}

impl BlockFileReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> BlockFileReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Returns `None` at a clean end of file.
    pub fn read_block(&mut self) -> Result<Option<Block>> {
        let mut len = [0u8; 4];
        match self.reader.read_exact(&mut len) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        let len = u32::from_le_bytes(len);
        if len > MAX_RECORD_SIZE {
            return Err(Error::OversizedRecord(len));
        }

        let mut record = vec![0u8; len as usize];
        self.reader.read_exact(&mut record)?;
        Ok(Some(bincode::deserialize(&record)?))
    }
}

impl<R: Read> Iterator for BlockFileReader<R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_block().transpose()
    }
}

pub struct BlockFileWriter<W: Write> {
    writer: W,
}

impl BlockFileWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> BlockFileWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_block(&mut self, block: &Block) -> Result<()> {
        let record = bincode::serialize(block)?;
        let len = u32::try_from(record.len())
            .ok()
            .filter(|len| *len <= MAX_RECORD_SIZE)
            .ok_or(Error::OversizedRecord(u32::MAX))?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&record)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
