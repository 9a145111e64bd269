//! Binary parser for `.dxnn` containers
//!
//! A `.dxnn` file is a little-endian single-file container:
//!
//! ```text
//! offset 0   magic        "DXNN" (4 bytes)
//! offset 4   version      u32, file-format version (v6..=v8 accepted)
//! offset 8   compiler     u16 length + UTF-8 bytes
//!            name         u16 length + UTF-8 bytes
//!            inputs       u16 count, then one tensor record each
//!            outputs      u16 count, then one tensor record each
//! ```
//!
//! A tensor record is `u16 name length + bytes`, `u8 dtype`, `u8 rank`,
//! then `rank` u32 dimensions. Weight and register-map sections follow the
//! tensor tables; the runtime never interprets them and this parser stops
//! at the tables.

use crate::error::{ModelError, Result};
use crate::model::{DataType, TensorInfo};

/// Magic bytes at the start of every `.dxnn` file
pub const DXNN_MAGIC: [u8; 4] = *b"DXNN";

/// Lowest single-file format version this runtime accepts
pub const MIN_FILE_VERSION: u32 = 6;

/// Highest single-file format version this runtime accepts
pub const MAX_FILE_VERSION: u32 = 8;

/// Parsed container header and tensor tables
#[derive(Debug, Clone)]
pub struct ModelHeader {
    /// File-format version
    pub version: u32,

    /// Compiler version string (e.g. "1.18.1")
    pub compiler_version: String,

    /// Model name
    pub name: String,

    /// Input tensor table, in declaration order
    pub inputs: Vec<TensorInfo>,

    /// Output tensor table, in declaration order
    pub outputs: Vec<TensorInfo>,
}

/// Parse the header and tensor tables from `.dxnn` file data
///
/// # Errors
///
/// Returns `InvalidHeader` on bad magic, `UnsupportedVersion` when the
/// file-format version is outside the supported window, and `Parse` on a
/// truncated or malformed container.
pub fn parse_header(data: &[u8]) -> Result<ModelHeader> {
    tracing::debug!("Parsing .dxnn container ({} bytes)", data.len());

    if data.len() < 8 {
        return Err(ModelError::parse("file too small for header"));
    }

    if data[0..4] != DXNN_MAGIC {
        tracing::error!("Invalid magic bytes: {:02x?}", &data[0..4]);
        return Err(ModelError::InvalidHeader);
    }

    let mut cursor = Cursor::new(&data[4..]);
    let version = cursor.read_u32("file-format version")?;
    if !(MIN_FILE_VERSION..=MAX_FILE_VERSION).contains(&version) {
        return Err(ModelError::UnsupportedVersion {
            version,
            min: MIN_FILE_VERSION,
            max: MAX_FILE_VERSION,
        });
    }

    let compiler_version = cursor.read_string("compiler version")?;
    let name = cursor.read_string("model name")?;

    let inputs = read_tensor_table(&mut cursor, "input")?;
    let outputs = read_tensor_table(&mut cursor, "output")?;

    if inputs.is_empty() {
        return Err(ModelError::parse("model declares no input tensors"));
    }
    if outputs.is_empty() {
        return Err(ModelError::parse("model declares no output tensors"));
    }

    tracing::debug!(
        "Parsed header: v{version}, compiler {compiler_version}, {} input(s), {} output(s)",
        inputs.len(),
        outputs.len()
    );

    Ok(ModelHeader {
        version,
        compiler_version,
        name,
        inputs,
        outputs,
    })
}

fn read_tensor_table(cursor: &mut Cursor<'_>, what: &str) -> Result<Vec<TensorInfo>> {
    let count = cursor.read_u16(what)? as usize;
    if count > 256 {
        return Err(ModelError::parse(format!(
            "implausible {what} tensor count: {count}"
        )));
    }

    let mut tensors = Vec::with_capacity(count);
    for _ in 0..count {
        let name = cursor.read_string(what)?;
        let dtype = DataType::from_tag(cursor.read_u8(what)?)
            .ok_or_else(|| ModelError::parse(format!("unknown dtype tag in {what} table")))?;
        let rank = cursor.read_u8(what)? as usize;
        if rank == 0 || rank > 8 {
            return Err(ModelError::parse(format!(
                "implausible {what} tensor rank: {rank}"
            )));
        }
        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            let dim = cursor.read_u32(what)?;
            if dim == 0 {
                return Err(ModelError::parse(format!(
                    "zero dimension in {what} tensor '{name}'"
                )));
            }
            shape.push(dim as usize);
        }
        tensors.push(TensorInfo::new(name, shape, dtype));
    }
    Ok(tensors)
}

/// Bounds-checked little-endian reader over the container payload
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| ModelError::parse(format!("truncated while reading {what}")))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn read_u16(&mut self, what: &str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_string(&mut self, what: &str) -> Result<String> {
        let len = self.read_u16(what)? as usize;
        let bytes = self.take(len, what)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| ModelError::parse(format!("non-UTF-8 string in {what}")))?;
        Ok(s.to_string())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    fn push_string(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    fn push_tensor(buf: &mut Vec<u8>, t: &TensorInfo) {
        push_string(buf, t.name());
        buf.push(t.dtype().tag());
        buf.push(t.shape().len() as u8);
        for &dim in t.shape() {
            buf.extend_from_slice(&(dim as u32).to_le_bytes());
        }
    }

    /// Build a valid container for parser and loader tests.
    pub(crate) fn build_container(
        version: u32,
        name: &str,
        inputs: &[TensorInfo],
        outputs: &[TensorInfo],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&DXNN_MAGIC);
        buf.extend_from_slice(&version.to_le_bytes());
        push_string(&mut buf, "1.18.1");
        push_string(&mut buf, name);
        buf.extend_from_slice(&(inputs.len() as u16).to_le_bytes());
        for t in inputs {
            push_tensor(&mut buf, t);
        }
        buf.extend_from_slice(&(outputs.len() as u16).to_le_bytes());
        for t in outputs {
            push_tensor(&mut buf, t);
        }
        buf
    }
}
