use std::fmt::Display;
use std::io::prelude::*;

use base64_simd;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use thiserror::Error;

pub type Bytes = Vec<u8>;

/// The errors that may arise while decoding one spectrum's encoded payload.
///
/// These fail the specific decode they occur in, never the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryDecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(String),
    #[error("An error occurred while decompressing: {0}")]
    Decompression(String),
    #[error("Unsupported compression method {0:?}")]
    UnsupportedCompression(String),
    #[error("Unsupported precision of {0} bits, expected 32 or 64")]
    UnsupportedPrecision(u32),
    #[error("Payload of {0} bytes is not a whole number of {1}-byte items")]
    Truncated(usize, usize),
    #[error("The record has no {0} array")]
    MissingArray(&'static str),
}

/// The width of a single encoded value in an encoded data array
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Float32,
    #[default]
    Float64,
}

impl Precision {
    /// The number of bytes a single value of this width occupies
    pub const fn size_of(&self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn bits(&self) -> u32 {
        match self {
            Self::Float32 => 32,
            Self::Float64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Result<Self, BinaryDecodeError> {
        match bits {
            32 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            _ => Err(BinaryDecodeError::UnsupportedPrecision(bits)),
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit float", self.bits())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

/// The per-document encoding description for binary data arrays.
///
/// A document is assumed to use one encoding throughout, so this is read once
/// from the first spectrum and reused for every decode in that document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BinaryMetadata {
    pub precision: Precision,
    /// The compression scheme's name as written in the file
    pub compression: String,
    pub compressed: bool,
    pub byte_order: ByteOrder,
}

impl BinaryMetadata {
    pub fn new(precision: Precision, compression: String, byte_order: ByteOrder) -> Self {
        let compressed = !matches!(compression.as_str(), "" | "none" | "no compression");
        Self {
            precision,
            compression,
            compressed,
            byte_order,
        }
    }

    /// Whether the named compression scheme is one this codec can undo
    pub fn is_supported(&self) -> bool {
        !self.compressed
            || matches!(self.compression.as_str(), "zlib" | "zlib compression")
    }
}

/// Decode a standard-alphabet base64 string, tolerating absent padding.
pub fn decode_base64(text: &str) -> Result<Bytes, BinaryDecodeError> {
    // Encoders are allowed to wrap the payload across lines.
    let cleaned: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64_simd::STANDARD
        .decode_type::<Bytes>(&cleaned)
        .or_else(|_| base64_simd::STANDARD_NO_PAD.decode_type::<Bytes>(&cleaned))
        .map_err(|e| BinaryDecodeError::Base64(e.to_string()))
}

pub fn encode_base64(data: &[u8]) -> String {
    base64_simd::STANDARD.encode_type::<String>(data)
}

pub fn decompress_zlib(bytestring: &[u8]) -> Result<Bytes, BinaryDecodeError> {
    let mut decompressor = ZlibDecoder::new(Bytes::new());
    decompressor
        .write_all(bytestring)
        .map_err(|e| BinaryDecodeError::Decompression(e.to_string()))?;
    decompressor
        .finish()
        .map_err(|e| BinaryDecodeError::Decompression(e.to_string()))
}

pub fn compress_zlib(bytestring: &[u8]) -> Bytes {
    let mut compressor = ZlibEncoder::new(Bytes::new(), Compression::best());
    compressor
        .write_all(bytestring)
        .expect("Writing to an in-memory buffer cannot fail");
    compressor
        .finish()
        .expect("Writing to an in-memory buffer cannot fail")
}

/// Reinterpret raw bytes as a sequence of floats of the declared width and
/// byte order, widening to `f64`.
pub fn decode_floats(
    bytestring: &[u8],
    precision: Precision,
    byte_order: ByteOrder,
) -> Result<Vec<f64>, BinaryDecodeError> {
    let z = precision.size_of();
    if bytestring.len() % z != 0 {
        return Err(BinaryDecodeError::Truncated(bytestring.len(), z));
    }
    let mut values = Vec::with_capacity(bytestring.len() / z);
    match precision {
        Precision::Float32 => {
            for chunk in bytestring.chunks_exact(4) {
                let raw: [u8; 4] = chunk.try_into().expect("chunks are exactly 4 bytes");
                let val = match byte_order {
                    ByteOrder::LittleEndian => f32::from_le_bytes(raw),
                    ByteOrder::BigEndian => f32::from_be_bytes(raw),
                };
                values.push(val as f64);
            }
        }
        Precision::Float64 => {
            for chunk in bytestring.chunks_exact(8) {
                let raw: [u8; 8] = chunk.try_into().expect("chunks are exactly 8 bytes");
                let val = match byte_order {
                    ByteOrder::LittleEndian => f64::from_le_bytes(raw),
                    ByteOrder::BigEndian => f64::from_be_bytes(raw),
                };
                values.push(val);
            }
        }
    }
    Ok(values)
}

fn encode_floats(values: &[f64], precision: Precision, byte_order: ByteOrder) -> Bytes {
    match (precision, byte_order) {
        (Precision::Float64, ByteOrder::LittleEndian) => {
            if cfg!(target_endian = "little") {
                bytemuck::cast_slice(values).to_vec()
            } else {
                values.iter().flat_map(|v| v.to_le_bytes()).collect()
            }
        }
        (Precision::Float64, ByteOrder::BigEndian) => {
            values.iter().flat_map(|v| v.to_be_bytes()).collect()
        }
        (Precision::Float32, ByteOrder::LittleEndian) => values
            .iter()
            .flat_map(|v| (*v as f32).to_le_bytes())
            .collect(),
        (Precision::Float32, ByteOrder::BigEndian) => values
            .iter()
            .flat_map(|v| (*v as f32).to_be_bytes())
            .collect(),
    }
}

/// Run the full base64 -> (optional) inflate -> float pipeline over one
/// encoded payload.
pub fn decode_payload(
    text: &str,
    metadata: &BinaryMetadata,
) -> Result<Vec<f64>, BinaryDecodeError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if !metadata.is_supported() {
        return Err(BinaryDecodeError::UnsupportedCompression(
            metadata.compression.clone(),
        ));
    }
    let mut bytestring = decode_base64(text)?;
    if metadata.compressed {
        bytestring = decompress_zlib(&bytestring)?;
    }
    decode_floats(&bytestring, metadata.precision, metadata.byte_order)
}

/// The inverse of [`decode_payload`], used when synthesizing documents
pub fn encode_payload(values: &[f64], metadata: &BinaryMetadata) -> String {
    let mut bytestring = encode_floats(values, metadata.precision, metadata.byte_order);
    if metadata.compressed {
        bytestring = compress_zlib(&bytestring);
    }
    encode_base64(&bytestring)
}

/// Split an interleaved sequence into its two channels, even positions
/// first. For spectrum payloads channel 0 is m/z and channel 1 is intensity.
pub fn deinterleave(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = values.len() / 2;
    let mut xs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    for pair in values.chunks_exact(2) {
        xs.push(pair[0]);
        ys.push(pair[1]);
    }
    (xs, ys)
}

pub fn interleave(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let mut values = Vec::with_capacity(xs.len() * 2);
    for (x, y) in xs.iter().zip(ys.iter()) {
        values.push(*x);
        values.push(*y);
    }
    values
}
