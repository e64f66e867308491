//! `mzcraft` reads mass spectrometry raw data from mzML and mzXML files and
//! turns it into uniform, analyzable tables, with downstream algorithms for
//! clustering raw peaks into consensus ions and corresponding chromatographic
//! features across analyses.
//!
//! The reading surface is [`RawDataFile`], which sniffs the format from the
//! file's root element and exposes one query API over both formats: header
//! tables, lazily decoded traces, chromatograms, and run provenance.
//! Structurally broken files open as empty documents with typed warnings so
//! a batch over many files never aborts on one bad one.
//!
//! ```no_run
//! use mzcraft::{extract_spectra, RawDataFile, Target};
//!
//! # fn main() -> Result<(), mzcraft::MzReadError> {
//! let data = RawDataFile::open("tests/data/small.mzML")?;
//! println!("{}", data.summary());
//!
//! let caffeine = Target {
//!     id: "caffeine".to_string(),
//!     level: 1,
//!     mz_min: 195.085,
//!     mz_max: 195.090,
//!     rt_min: 120.0,
//!     rt_max: 180.0,
//!     ..Default::default()
//! };
//! let table = extract_spectra(&data, &[], &[caffeine], 100.0, 0.0)?;
//! println!("{} points", table.len());
//! # Ok(())
//! # }
//! ```
//!
//! Binary payloads go through a base64 -> (optional) zlib -> endian-aware
//! float pipeline in [`spectrum::bindata`]; decoding is per spectrum and,
//! with the `parallelism` feature, runs on a `rayon` pool.

pub mod cluster;
pub mod correspond;
pub mod extract;
pub mod io;
pub mod spectrum;

#[cfg(test)]
pub(crate) mod test_util;

pub use crate::io::{
    AcquisitionType, DocumentWarning, MassSpectrometryFormat, MzMLDocument, MzReadError,
    MzXMLDocument, RawDataFile, RunSummary,
};
pub use crate::spectrum::{
    BinaryDecodeError, BinaryMetadata, ChromatogramHeader, ChromatogramHeaders,
    ChromatogramTrace, HardwareInfo, PrecursorDescription, ScanPolarity, SignalContinuity,
    SoftwareInfo, SpectrumHeader, SpectrumHeaders, Trace,
};

pub use crate::cluster::{cluster_peaks, ClusteredPeaks, ClusteringError, IntensityAggregation};
pub use crate::correspond::{
    correspond, update_groups, Correspondence, CorrespondenceError, Feature, FeatureGroup,
};
pub use crate::extract::{extract_spectra, SpectraTable, Target};

pub use mzpeaks::{CentroidPeak, Tolerance};
