//! GGUF metadata reader (spec §4's C3, §6 External Interfaces).
//!
//! Reads just enough of a GGUF file to extract `general.architecture`,
//! `general.name`, the quantization-type tag (`general.file_type`), and the
//! on-disk footprint. All other metadata is treated as opaque, per spec.
//!
//! GGUF files are little-endian in practice; the header is read generically
//! enough that a big-endian variant (magic bytes reversed) is detected and
//! rejected with a clear error rather than silently misparsed.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{NeuronError, Result};

const GGUF_MAGIC: u32 = 0x4655_4747; // "GGUF" read as LE u32
const MIN_SUPPORTED_VERSION: u32 = 3;

/// GGUF scalar/array value types (ggml's `gguf_type` enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum GgufType {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    U32 = 4,
    I32 = 5,
    F32 = 6,
    Bool = 7,
    String = 8,
    Array = 9,
    U64 = 10,
    I64 = 11,
    F64 = 12,
}

impl GgufType {
    fn from_u32(v: u32) -> Result<Self> {
        Ok(match v {
            0 => Self::U8,
            1 => Self::I8,
            2 => Self::U16,
            3 => Self::I16,
            4 => Self::U32,
            5 => Self::I32,
            6 => Self::F32,
            7 => Self::Bool,
            8 => Self::String,
            9 => Self::Array,
            10 => Self::U64,
            11 => Self::I64,
            12 => Self::F64,
            other => {
                return Err(NeuronError::ParseError(format!(
                    "unknown GGUF value type tag {other}"
                )))
            }
        })
    }

    fn fixed_width(self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 | Self::Bool => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::String | Self::Array => None,
        }
    }
}

/// GGUF metadata relevant to model auto-selection (spec §3 feeds `ModelEntry`).
#[derive(Debug, Clone)]
pub struct GgufMetadata {
    pub architecture: String,
    pub name: Option<String>,
    /// `general.file_type` numeric tag, if present (ggml quantization enum).
    pub quantization_tag: Option<u32>,
    pub file_size_bytes: u64,
}

/// Read GGUF metadata from `path` (spec §4's C3 contract).
pub fn read_metadata(path: &Path) -> Result<GgufMetadata> {
    let file = File::open(path)?;
    let file_size_bytes = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != GGUF_MAGIC {
        return Err(NeuronError::ParseError(format!(
            "{}: not a GGUF file (bad magic)",
            path.display()
        )));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version < MIN_SUPPORTED_VERSION {
        return Err(NeuronError::ParseError(format!(
            "{}: unsupported GGUF version {version} (need >= {MIN_SUPPORTED_VERSION})",
            path.display()
        )));
    }

    let _tensor_count = reader.read_u64::<LittleEndian>()?;
    let kv_count = reader.read_u64::<LittleEndian>()?;

    let mut architecture = None;
    let mut name = None;
    let mut quantization_tag = None;

    for _ in 0..kv_count {
        let key = read_gguf_string(&mut reader)?;
        let value_type = GgufType::from_u32(reader.read_u32::<LittleEndian>()?)?;

        match key.as_str() {
            "general.architecture" => {
                architecture = Some(read_string_value(&mut reader, value_type)?);
            }
            "general.name" => {
                name = Some(read_string_value(&mut reader, value_type)?);
            }
            "general.file_type" => {
                quantization_tag = Some(read_u32_value(&mut reader, value_type)?);
            }
            _ => skip_value(&mut reader, value_type)?,
        }
    }

    Ok(GgufMetadata {
        architecture: architecture.unwrap_or_else(|| "unknown".to_string()),
        name,
        quantization_tag,
        file_size_bytes,
    })
}

fn read_gguf_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u64::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| NeuronError::ParseError(format!("invalid UTF-8 in GGUF string: {e}")))
}

fn read_string_value<R: Read>(reader: &mut R, value_type: GgufType) -> Result<String> {
    if value_type != GgufType::String {
        return Err(NeuronError::ParseError(format!(
            "expected GGUF string value, got {value_type:?}"
        )));
    }
    read_gguf_string(reader)
}

fn read_u32_value<R: Read>(reader: &mut R, value_type: GgufType) -> Result<u32> {
    match value_type {
        GgufType::U32 => reader.read_u32::<LittleEndian>().map_err(Into::into),
        GgufType::I32 => reader.read_i32::<LittleEndian>().map(|v| v as u32).map_err(Into::into),
        other => Err(NeuronError::ParseError(format!(
            "expected GGUF u32-like value, got {other:?}"
        ))),
    }
}

/// Skip a value we don't care about, including nested arrays.
fn skip_value<R: Read>(reader: &mut R, value_type: GgufType) -> Result<()> {
    match value_type {
        GgufType::String => {
            read_gguf_string(reader)?;
        }
        GgufType::Array => {
            let elem_type = GgufType::from_u32(reader.read_u32::<LittleEndian>()?)?;
            let count = reader.read_u64::<LittleEndian>()?;
            for _ in 0..count {
                skip_value(reader, elem_type)?;
            }
        }
        other => {
            let width = other
                .fixed_width()
                .expect("non-string, non-array types have a fixed width");
            let mut buf = vec![0u8; width];
            reader.read_exact(&mut buf)?;
        }
    }
    Ok(())
}

/// Best-effort quantization-family tag for display/scoring (spec §4.3's
/// "per-encoding constant" open question — resolved in DESIGN.md).
pub fn quant_family_tag(meta: &GgufMetadata) -> &'static str {
    match meta.quantization_tag {
        // ggml_ftype values used by llama.cpp; only the ones relevant to
        // scoring heuristics are named, everything else falls through.
        Some(0) => "f32",
        Some(1) => "f16",
        Some(36) | Some(37) => "i2_s", // BitNet ternary file types
        Some(_) => "quantized",
        None => "unknown",
    }
}
