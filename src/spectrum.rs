//! Data model for spectrum and chromatogram metadata, decoded traces, and
//! the binary payload codec.

pub mod bindata;
mod description;

pub use description::{
    ChromatogramHeader, ChromatogramHeaders, ChromatogramTrace, HardwareInfo,
    PrecursorDescription, ScanPolarity, SignalContinuity, SoftwareInfo, SpectrumHeader,
    SpectrumHeaders, Trace,
};

pub use bindata::{BinaryDecodeError, BinaryMetadata, ByteOrder, Precision};
