//! Binary serialization for machine code
//!
//! The persistence collaborator stores a worker's program as an opaque
//! blob and hands it back later to rebuild an equivalent program without
//! re-parsing text.
//!
//! ## Binary Format
//!
//! ```text
//! HEADER (20 bytes)
//! ├── Magic:      "ANTM" (4 bytes)
//! ├── Version:    u16
//! ├── LabelCount: u16
//! ├── CodeLen:    u32 (bytes of bytecode)
//! └── Checksum:   u64 (over labels + code)
//!
//! LABELS (variable)
//! ├── For each label:
//! │   ├── NameLen: u8
//! │   ├── Name:    [u8; name_len] (UTF-8)
//! │   └── Step:    u16
//!
//! CODE (code_len bytes)
//! ```
//!
//! All integers are little-endian.

use super::{LabelTable, MachineCode, MACHINE_CODE_MAGIC, MACHINE_CODE_VERSION};
use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Header size in bytes
pub const HEADER_SIZE: usize = 20;

/// Binary header for machine code blobs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Magic bytes "ANTM"
    pub magic: [u8; 4],
    /// Format version
    pub version: u16,
    /// Number of label records
    pub label_count: u16,
    /// Bytecode length
    pub code_len: u32,
    /// Content checksum
    pub checksum: u64,
}

impl Header {
    /// Write header to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.label_count.to_le_bytes());
        buf[8..12].copy_from_slice(&self.code_len.to_le_bytes());
        buf[12..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Read header from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            anyhow::bail!("Header too short: {} bytes", data.len());
        }

        let magic: [u8; 4] = data[0..4].try_into()?;
        if magic != MACHINE_CODE_MAGIC {
            anyhow::bail!(
                "Invalid magic: expected ANTM, got {:?}",
                String::from_utf8_lossy(&magic)
            );
        }

        let version = u16::from_le_bytes(data[4..6].try_into()?);
        if version > MACHINE_CODE_VERSION {
            anyhow::bail!(
                "Unsupported version {} (newest known is {})",
                version,
                MACHINE_CODE_VERSION
            );
        }

        Ok(Self {
            magic,
            version,
            label_count: u16::from_le_bytes(data[6..8].try_into()?),
            code_len: u32::from_le_bytes(data[8..12].try_into()?),
            checksum: u64::from_le_bytes(data[12..20].try_into()?),
        })
    }
}

fn serialize_labels(labels: &LabelTable) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (name, step) in labels.iter() {
        let name_bytes = name.as_bytes();
        let len = u8::try_from(name_bytes.len())
            .with_context(|| format!("Label name too long: {}", name))?;
        out.push(len);
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&step.to_le_bytes());
    }
    Ok(out)
}

fn deserialize_label(data: &[u8], offset: &mut usize) -> Result<(String, u16)> {
    let len = *data
        .get(*offset)
        .context("Label record truncated")? as usize;
    let start = *offset + 1;
    let end = start + len;
    if end + 2 > data.len() {
        anyhow::bail!("Label record at {} out of bounds", *offset);
    }
    let name = std::str::from_utf8(&data[start..end])
        .context("Label name is not UTF-8")?
        .to_string();
    let step = u16::from_le_bytes(data[end..end + 2].try_into()?);
    *offset = end + 2;
    Ok((name, step))
}

/// Serialize machine code to a blob
pub fn serialize(machine_code: &MachineCode) -> Result<Vec<u8>> {
    let labels = serialize_labels(&machine_code.labels)?;

    let mut content = Vec::with_capacity(labels.len() + machine_code.code.len());
    content.extend(&labels);
    content.extend(&machine_code.code);

    let header = Header {
        magic: MACHINE_CODE_MAGIC,
        version: MACHINE_CODE_VERSION,
        label_count: u16::try_from(machine_code.labels.len()).context("Too many labels")?,
        code_len: u32::try_from(machine_code.code.len()).context("Bytecode too long")?,
        checksum: checksum(&content),
    };

    let mut output = header.to_bytes();
    output.extend(content);
    Ok(output)
}

/// Deserialize a blob back into machine code
pub fn deserialize(data: &[u8]) -> Result<MachineCode> {
    let header = Header::from_bytes(data)?;
    let content = &data[HEADER_SIZE..];

    let actual = checksum(content);
    if actual != header.checksum {
        anyhow::bail!(
            "Checksum mismatch: expected {:016x}, got {:016x}",
            header.checksum,
            actual
        );
    }

    let mut offset = 0;
    let mut labels = LabelTable::new();
    for _ in 0..header.label_count {
        let (name, step) = deserialize_label(content, &mut offset)?;
        if !labels.insert(name.clone(), step) {
            anyhow::bail!("Duplicate label in blob: {}", name);
        }
    }

    let code = &content[offset..];
    if code.len() != header.code_len as usize {
        anyhow::bail!(
            "Code length mismatch: header says {} bytes, have {}",
            header.code_len,
            code.len()
        );
    }

    let machine_code = MachineCode {
        code: code.to_vec(),
        labels,
    };
    machine_code
        .step_count()
        .context("Blob contains invalid bytecode")?;

    Ok(machine_code)
}

impl MachineCode {
    /// Serialize to a self-contained blob
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// Rebuild from a blob produced by [`MachineCode::to_bytes`]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        deserialize(data)
    }
}

/// FNV-1a over the content sections
fn checksum(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Save machine code to a binary file
pub fn save_to_file(machine_code: &MachineCode, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let binary = serialize(machine_code)?;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(&binary)?;
    Ok(())
}

/// Load machine code from a binary file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<MachineCode> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    deserialize(&data).with_context(|| format!("Failed to load {}", path.display()))
}
