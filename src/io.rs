//! Reading mass spectrometry data files behind one format-agnostic surface.
//!
//! [`RawDataFile::open`] sniffs the root element of the file, builds the
//! matching document model, and exposes a uniform query API over headers,
//! traces, chromatograms, and run provenance. A file whose structure cannot
//! be understood opens as an empty document carrying [`DocumentWarning`]s
//! rather than failing, so batch processing can keep going.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::spectrum::bindata::{BinaryDecodeError, BinaryMetadata};
use crate::spectrum::{
    ChromatogramHeader, ChromatogramHeaders, ChromatogramTrace, HardwareInfo, ScanPolarity,
    SignalContinuity, SoftwareInfo, SpectrumHeader, SpectrumHeaders, Trace,
};

pub mod mzml;
pub mod mzxml;

pub use mzml::MzMLDocument;
pub use mzxml::MzXMLDocument;

/// The file formats this crate can read
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MassSpectrometryFormat {
    MzML,
    MzXML,
    #[default]
    Unknown,
}

impl std::fmt::Display for MassSpectrometryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MzML => f.write_str("mzML"),
            Self::MzXML => f.write_str("mzXML"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// A whole-file classification of how the run was acquired, derived from the
/// distinct MS levels present and whether any spectrum carries a precursor
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionType {
    /// Survey scans only
    MS,
    /// Fragmentation scans only
    MSn,
    /// Mixed levels with recorded precursors
    DataDependent,
    /// Mixed levels without recorded precursors
    AllIons,
    #[default]
    Unknown,
}

impl std::fmt::Display for AcquisitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MS => f.write_str("MS"),
            Self::MSn => f.write_str("MSn"),
            Self::DataDependent => f.write_str("MS/MS-DDA"),
            Self::AllIons => f.write_str("MS/MS-AllIons"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// A structural problem found while reading a document.
///
/// These degrade the document to an empty one instead of failing the open,
/// and are retained so the caller can tell an empty file from a broken one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentWarning {
    #[error("Expected a {expected} root element, found {found:?}")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },
    #[error("The document has no run container")]
    MissingRun,
    #[error("The document is not well-formed XML: {0}")]
    Malformed(String),
}

/// The errors the reading surface can return to a caller
#[derive(Debug, Error)]
pub enum MzReadError {
    #[error("Failed to open {path:?}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to decode spectrum {index}: {source}")]
    SpectrumDecode {
        index: usize,
        #[source]
        source: BinaryDecodeError,
    },
    #[error("Failed to decode chromatogram {index}: {source}")]
    ChromatogramDecode {
        index: usize,
        #[source]
        source: BinaryDecodeError,
    },
    #[error("Index {index} is out of range, the document holds {count} items")]
    IndexOutOfRange { index: usize, count: usize },
}

#[derive(Debug)]
enum InnerDocument {
    MzML(MzMLDocument),
    MzXML(MzXMLDocument),
    Empty,
}

/// One opened mass spectrometry data file
#[derive(Debug)]
pub struct RawDataFile {
    path: PathBuf,
    format: MassSpectrometryFormat,
    document: InnerDocument,
    warnings: Vec<DocumentWarning>,
}

/// Read ahead just far enough to find the root element's tag.
fn sniff_root(path: &Path) -> Result<Option<String>, MzReadError> {
    let handle = File::open(path).map_err(|source| MzReadError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = Reader::from_reader(BufReader::new(handle));
    let mut buffer = Vec::new();
    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref event)) | Ok(Event::Empty(ref event)) => {
                return Ok(Some(
                    String::from_utf8_lossy(event.name().as_ref()).into_owned(),
                ));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(_) => return Ok(None),
        }
        buffer.clear();
    }
}

impl RawDataFile {
    /// Open a data file, sniffing the format from the root element.
    ///
    /// An unreadable path is a hard error; an unrecognized or structurally
    /// broken document opens as empty with its problems in [`Self::warnings`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MzReadError> {
        let path = path.as_ref().to_path_buf();
        let root = sniff_root(&path)?;

        let reopen = || -> Result<BufReader<File>, MzReadError> {
            let handle = File::open(&path).map_err(|source| MzReadError::FileUnreadable {
                path: path.clone(),
                source,
            })?;
            Ok(BufReader::new(handle))
        };

        let mut warnings = Vec::new();
        let (format, document) = match root.as_deref() {
            Some(root) if mzml::is_mzml_root(root.as_bytes()) => (
                MassSpectrometryFormat::MzML,
                InnerDocument::MzML(MzMLDocument::from_reader(reopen()?)),
            ),
            Some(root) if mzxml::is_mzxml_root(root.as_bytes()) => (
                MassSpectrometryFormat::MzXML,
                InnerDocument::MzXML(MzXMLDocument::from_reader(reopen()?)),
            ),
            Some(root) => {
                warnings.push(DocumentWarning::UnexpectedRoot {
                    expected: "mzML or mzXML",
                    found: root.to_string(),
                });
                (MassSpectrometryFormat::Unknown, InnerDocument::Empty)
            }
            None => {
                warnings.push(DocumentWarning::Malformed(
                    "no root element found".to_string(),
                ));
                (MassSpectrometryFormat::Unknown, InnerDocument::Empty)
            }
        };

        Ok(Self {
            path,
            format,
            document,
            warnings,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn format(&self) -> MassSpectrometryFormat {
        self.format
    }

    /// All structural warnings, the facade's own plus the document's
    pub fn warnings(&self) -> Vec<&DocumentWarning> {
        let inner = match &self.document {
            InnerDocument::MzML(doc) => doc.warnings(),
            InnerDocument::MzXML(doc) => doc.warnings(),
            InnerDocument::Empty => &[],
        };
        self.warnings.iter().chain(inner.iter()).collect()
    }

    pub fn spectrum_count(&self) -> usize {
        match &self.document {
            InnerDocument::MzML(doc) => doc.spectrum_count(),
            InnerDocument::MzXML(doc) => doc.spectrum_count(),
            InnerDocument::Empty => 0,
        }
    }

    pub fn chromatogram_count(&self) -> usize {
        match &self.document {
            InnerDocument::MzML(doc) => doc.chromatogram_count(),
            _ => 0,
        }
    }

    pub fn spectrum_header(&self, index: usize) -> Option<&SpectrumHeader> {
        match &self.document {
            InnerDocument::MzML(doc) => doc.spectrum_header(index),
            InnerDocument::MzXML(doc) => doc.spectrum_header(index),
            InnerDocument::Empty => None,
        }
    }

    pub fn chromatogram_header(&self, index: usize) -> Option<&ChromatogramHeader> {
        match &self.document {
            InnerDocument::MzML(doc) => doc.chromatogram_header(index),
            _ => None,
        }
    }

    fn resolve_indices(indices: &[usize], count: usize) -> Result<Vec<usize>, MzReadError> {
        if indices.is_empty() {
            return Ok((0..count).collect());
        }
        for &index in indices {
            if index >= count {
                return Err(MzReadError::IndexOutOfRange { index, count });
            }
        }
        Ok(indices.to_vec())
    }

    /// The header table for the requested spectra, all of them when
    /// `indices` is empty
    pub fn spectrum_headers(&self, indices: &[usize]) -> Result<SpectrumHeaders, MzReadError> {
        let resolved = Self::resolve_indices(indices, self.spectrum_count())?;
        let mut table = SpectrumHeaders::with_capacity(resolved.len());
        for index in resolved {
            if let Some(header) = self.spectrum_header(index) {
                table.push(header);
            }
        }
        Ok(table)
    }

    pub fn chromatogram_headers(
        &self,
        indices: &[usize],
    ) -> Result<ChromatogramHeaders, MzReadError> {
        let resolved = Self::resolve_indices(indices, self.chromatogram_count())?;
        let mut table = ChromatogramHeaders::default();
        for index in resolved {
            if let Some(header) = self.chromatogram_header(index) {
                table.push(header);
            }
        }
        Ok(table)
    }

    fn trace_at(&self, index: usize) -> Result<Trace, MzReadError> {
        let decoded = match &self.document {
            InnerDocument::MzML(doc) => doc.trace(index),
            InnerDocument::MzXML(doc) => doc.trace(index),
            InnerDocument::Empty => Ok(Trace::default()),
        };
        decoded.map_err(|source| MzReadError::SpectrumDecode { index, source })
    }

    /// Decode one spectrum's trace
    pub fn trace(&self, index: usize) -> Result<Trace, MzReadError> {
        let count = self.spectrum_count();
        if index >= count {
            return Err(MzReadError::IndexOutOfRange { index, count });
        }
        self.trace_at(index)
    }

    /// Decode the traces of the requested spectra, all of them when `indices`
    /// is empty. Output position matches the requested index order, and each
    /// spectrum's decode outcome is reported on its own so one corrupt
    /// payload does not discard the rest of the batch. Only an out-of-range
    /// request fails the call as a whole.
    pub fn traces(
        &self,
        indices: &[usize],
    ) -> Result<Vec<Result<Trace, MzReadError>>, MzReadError> {
        let resolved = Self::resolve_indices(indices, self.spectrum_count())?;
        #[cfg(feature = "parallelism")]
        {
            Ok(resolved
                .par_iter()
                .map(|&index| self.trace_at(index))
                .collect())
        }
        #[cfg(not(feature = "parallelism"))]
        {
            Ok(resolved
                .iter()
                .map(|&index| self.trace_at(index))
                .collect())
        }
    }

    fn chromatogram_at(&self, index: usize) -> Result<ChromatogramTrace, MzReadError> {
        let decoded = match &self.document {
            InnerDocument::MzML(doc) => doc.chromatogram(index),
            _ => Ok(ChromatogramTrace::default()),
        };
        decoded.map_err(|source| MzReadError::ChromatogramDecode { index, source })
    }

    pub fn chromatogram(&self, index: usize) -> Result<ChromatogramTrace, MzReadError> {
        let count = self.chromatogram_count();
        if index >= count {
            return Err(MzReadError::IndexOutOfRange { index, count });
        }
        self.chromatogram_at(index)
    }

    /// Decode the requested chromatograms with per-item outcomes, mirroring
    /// [`Self::traces`]
    pub fn chromatograms(
        &self,
        indices: &[usize],
    ) -> Result<Vec<Result<ChromatogramTrace, MzReadError>>, MzReadError> {
        let resolved = Self::resolve_indices(indices, self.chromatogram_count())?;
        Ok(resolved
            .iter()
            .map(|&index| self.chromatogram_at(index))
            .collect())
    }

    /// The binary encoding descriptions captured from the first spectrum
    pub fn binary_metadata(&self) -> Vec<BinaryMetadata> {
        match &self.document {
            InnerDocument::MzML(doc) => doc.binary_metadata().to_vec(),
            InnerDocument::MzXML(doc) => vec![doc.binary_metadata().clone()],
            InnerDocument::Empty => Vec::new(),
        }
    }

    pub fn software(&self) -> &[SoftwareInfo] {
        match &self.document {
            InnerDocument::MzML(doc) => doc.software(),
            InnerDocument::MzXML(doc) => doc.software(),
            InnerDocument::Empty => &[],
        }
    }

    pub fn hardware(&self) -> &[HardwareInfo] {
        match &self.document {
            InnerDocument::MzML(doc) => doc.hardware(),
            InnerDocument::MzXML(doc) => doc.hardware(),
            InnerDocument::Empty => &[],
        }
    }

    /// The run's acquisition start time, when the format records one
    pub fn time_stamp(&self) -> Option<DateTime<FixedOffset>> {
        match &self.document {
            InnerDocument::MzML(doc) => doc.time_stamp(),
            _ => None,
        }
    }

    fn headers_iter(&self) -> impl Iterator<Item = &SpectrumHeader> {
        (0..self.spectrum_count()).filter_map(|index| self.spectrum_header(index))
    }

    /// The distinct MS levels present, ascending
    pub fn ms_levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self.headers_iter().map(|h| h.ms_level).collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    pub fn polarities(&self) -> Vec<ScanPolarity> {
        let mut seen = Vec::new();
        for header in self.headers_iter() {
            if !seen.contains(&header.polarity) {
                seen.push(header.polarity);
            }
        }
        seen
    }

    pub fn modes(&self) -> Vec<SignalContinuity> {
        let mut seen = Vec::new();
        for header in self.headers_iter() {
            if !seen.contains(&header.mode) {
                seen.push(header.mode);
            }
        }
        seen
    }

    /// Classify the run from its level structure and precursor annotations
    pub fn acquisition_type(&self) -> AcquisitionType {
        if self.spectrum_count() == 0 {
            return AcquisitionType::Unknown;
        }
        let levels = self.ms_levels();
        if levels.len() > 1 {
            let any_precursor = self
                .headers_iter()
                .any(|header| !header.precursor_mz().is_nan());
            if any_precursor {
                AcquisitionType::DataDependent
            } else {
                AcquisitionType::AllIons
            }
        } else if levels[0] == 1 {
            AcquisitionType::MS
        } else {
            AcquisitionType::MSn
        }
    }

    /// A whole-run digest of counts, classifications, global bounds, and
    /// provenance
    pub fn summary(&self) -> RunSummary {
        let mut mz_low = f64::NAN;
        let mut mz_high = f64::NAN;
        let mut rt_start = f64::NAN;
        let mut rt_end = f64::NAN;
        let mut has_ion_mobility = false;
        for header in self.headers_iter() {
            mz_low = nan_min(mz_low, header.mz_low);
            mz_high = nan_max(mz_high, header.mz_high);
            rt_start = nan_min(rt_start, header.rt);
            rt_end = nan_max(rt_end, header.rt);
            has_ion_mobility |= !header.drift.is_nan();
        }
        RunSummary {
            file_name: self.file_name(),
            format: self.format,
            time_stamp: self.time_stamp(),
            spectrum_count: self.spectrum_count(),
            chromatogram_count: self.chromatogram_count(),
            ms_levels: self.ms_levels(),
            acquisition_type: self.acquisition_type(),
            polarities: self.polarities(),
            modes: self.modes(),
            mz_low,
            mz_high,
            rt_start,
            rt_end,
            has_ion_mobility,
            software: self.software().to_vec(),
            hardware: self.hardware().to_vec(),
        }
    }
}

fn nan_min(acc: f64, value: f64) -> f64 {
    if value.is_nan() {
        acc
    } else if acc.is_nan() {
        value
    } else {
        acc.min(value)
    }
}

fn nan_max(acc: f64, value: f64) -> f64 {
    if value.is_nan() {
        acc
    } else if acc.is_nan() {
        value
    } else {
        acc.max(value)
    }
}

/// A whole-run digest suitable for printing
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub file_name: String,
    pub format: MassSpectrometryFormat,
    pub time_stamp: Option<DateTime<FixedOffset>>,
    pub spectrum_count: usize,
    pub chromatogram_count: usize,
    pub ms_levels: Vec<u8>,
    pub acquisition_type: AcquisitionType,
    pub polarities: Vec<ScanPolarity>,
    pub modes: Vec<SignalContinuity>,
    pub mz_low: f64,
    pub mz_high: f64,
    pub rt_start: f64,
    pub rt_end: f64,
    pub has_ion_mobility: bool,
    pub software: Vec<SoftwareInfo>,
    pub hardware: Vec<HardwareInfo>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "File: {}", self.file_name)?;
        writeln!(f, "Format: {}", self.format)?;
        if let Some(stamp) = self.time_stamp {
            writeln!(f, "Started: {}", stamp.to_rfc3339())?;
        }
        writeln!(f, "Type: {}", self.acquisition_type)?;
        writeln!(f, "Spectra: {}", self.spectrum_count)?;
        writeln!(f, "Chromatograms: {}", self.chromatogram_count)?;
        write!(f, "MS levels:")?;
        for level in self.ms_levels.iter() {
            write!(f, " {level}")?;
        }
        writeln!(f)?;
        write!(f, "Polarities:")?;
        for polarity in self.polarities.iter() {
            write!(f, " {polarity}")?;
        }
        writeln!(f)?;
        write!(f, "Modes:")?;
        for mode in self.modes.iter() {
            write!(f, " {mode}")?;
        }
        writeln!(f)?;
        writeln!(f, "m/z range: {} - {}", self.mz_low, self.mz_high)?;
        writeln!(f, "RT range: {} - {} s", self.rt_start, self.rt_end)?;
        writeln!(f, "Ion mobility: {}", self.has_ion_mobility)?;
        for software in self.software.iter() {
            writeln!(
                f,
                "Software: {} {} {}",
                software.name, software.kind, software.version
            )?;
        }
        for hardware in self.hardware.iter() {
            writeln!(f, "Hardware: {}: {}", hardware.category, hardware.value)?;
        }
        Ok(())
    }
}
