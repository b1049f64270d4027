//! Data file format
//!
//! Each commit rewrites the whole bucket tree to one file.
//!
//! # Format
//!
//! ```text
//! +--------------------+
//! | Magic: "DOCSTORE"  | 8 bytes
//! | Format Version     | 4 bytes (u32 LE)
//! | Payload Length     | 8 bytes (u64 LE)
//! | Payload            | bincode-encoded root node
//! | CRC32 of payload   | 4 bytes (u32 LE)
//! +--------------------+
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use docstore_core::{Error, Result};

use crate::tree::Node;

/// Data file magic bytes
pub const DATA_FILE_MAGIC: [u8; 8] = *b"DOCSTORE";

/// Current data file format version
pub const DATA_FILE_VERSION: u32 = 1;

/// File extension used by [`crate::FileDriver`]
pub const DATA_FILE_EXTENSION: &str = "docstore";

const HEADER_LEN: usize = 8 + 4 + 8;
const TRAILER_LEN: usize = 4;

/// Serialize a tree into the on-disk format
pub fn encode(root: &Node) -> Result<Vec<u8>> {
    let payload = bincode::serialize(root)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    buf.extend_from_slice(&DATA_FILE_MAGIC);
    buf.write_u32::<LittleEndian>(DATA_FILE_VERSION)?;
    buf.write_u64::<LittleEndian>(payload.len() as u64)?;
    buf.extend_from_slice(&payload);
    buf.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    Ok(buf)
}

/// Validate and deserialize the on-disk format
///
/// # Errors
///
/// `Corruption` on a short file, bad magic, unknown version, length mismatch
/// or checksum mismatch.
pub fn decode(data: &[u8]) -> Result<Node> {
    if data.len() < HEADER_LEN + TRAILER_LEN {
        return Err(Error::Corruption(format!(
            "data file too short: {} bytes",
            data.len()
        )));
    }
    if data[..8] != DATA_FILE_MAGIC {
        return Err(Error::Corruption("invalid data file magic".to_string()));
    }

    let mut header = &data[8..HEADER_LEN];
    let version = header.read_u32::<LittleEndian>()?;
    if version != DATA_FILE_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported data file version {}",
            version
        )));
    }
    let len = header.read_u64::<LittleEndian>()? as usize;
    if data.len() - HEADER_LEN - TRAILER_LEN != len {
        return Err(Error::Corruption(format!(
            "payload length {} does not match file size {}",
            len,
            data.len()
        )));
    }

    let payload = &data[HEADER_LEN..HEADER_LEN + len];
    let stored_crc = (&data[HEADER_LEN + len..]).read_u32::<LittleEndian>()?;
    let computed_crc = crc32fast::hash(payload);
    if stored_crc != computed_crc {
        return Err(Error::Corruption(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            stored_crc, computed_crc
        )));
    }

    Ok(bincode::deserialize(payload)?)
}

/// A store's backing file
#[derive(Debug, Clone)]
pub struct DataFile {
    path: PathBuf,
    sync: bool,
}

impl DataFile {
    /// Handle for `path`; nothing is touched until load or persist
    pub fn new(path: impl Into<PathBuf>, sync: bool) -> Self {
        DataFile {
            path: path.into(),
            sync,
        }
    }

    /// Location on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored tree; `Ok(None)` if the file does not exist yet
    pub fn load(&self) -> Result<Option<Node>> {
        match fs::read(&self.path) {
            Ok(data) => Ok(Some(decode(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Replace the file contents atomically (write, fsync, rename)
    pub fn persist(&self, root: &Node) -> Result<()> {
        let bytes = encode(root)?;
        let temp_path = self.path.with_extension(format!("{}.tmp", DATA_FILE_EXTENSION));

        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
