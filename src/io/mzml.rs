//! An in-memory document model over one mzML file.
//!
//! The file is read in a single forward pass with `quick-xml`. Spectrum and
//! chromatogram metadata are materialized eagerly while the base64 payload
//! text is retained undecoded so that trace decoding can happen lazily,
//! per index, and in parallel.

use std::io::BufRead;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use super::DocumentWarning;
use crate::spectrum::bindata::{self, BinaryDecodeError, BinaryMetadata, ByteOrder, Precision};
use crate::spectrum::{
    ChromatogramHeader, ChromatogramTrace, HardwareInfo, PrecursorDescription, ScanPolarity,
    SignalContinuity, SoftwareInfo, SpectrumHeader, Trace,
};

pub fn is_mzml_root(tag: &[u8]) -> bool {
    matches!(tag, b"mzML" | b"indexedmzML")
}

/// Extract the scan number from a native spectrum id like
/// `controllerType=0 controllerNumber=1 scan=25`, falling back to any
/// trailing run of digits.
pub(crate) fn scan_number_from_native_id(id: &str) -> i32 {
    static SCAN_PATTERN: OnceLock<Regex> = OnceLock::new();
    static TRAILING_PATTERN: OnceLock<Regex> = OnceLock::new();
    let scan_pattern = SCAN_PATTERN
        .get_or_init(|| Regex::new(r"scan(?:Id)?=(\d+)").expect("static pattern compiles"));
    if let Some(captures) = scan_pattern.captures(id) {
        if let Ok(scan) = captures[1].parse() {
            return scan;
        }
    }
    let trailing = TRAILING_PATTERN
        .get_or_init(|| Regex::new(r"(\d+)\s*$").expect("static pattern compiles"));
    trailing
        .captures(id)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

/// Which logical channel a `<binaryDataArray>` holds
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayKind {
    Mz,
    Intensity,
    Time,
    #[default]
    Other,
}

/// One `<binaryDataArray>` with its payload still base64-encoded
#[derive(Debug, Default, Clone)]
pub(crate) struct EncodedArray {
    pub kind: ArrayKind,
    pub metadata: BinaryMetadata,
    /// Time arrays may be written in minutes; traces are normalized to seconds
    pub unit_minutes: bool,
    pub text: String,
}

#[derive(Debug, Default, Clone)]
struct SpectrumEntry {
    header: SpectrumHeader,
    arrays: Vec<EncodedArray>,
}

#[derive(Debug, Default, Clone)]
struct ChromatogramEntry {
    header: ChromatogramHeader,
    arrays: Vec<EncodedArray>,
}

/// A parsed cvParam element
#[derive(Debug, Default, Clone)]
struct CvParam {
    accession: u32,
    name: String,
    value: String,
    unit: String,
}

fn attr_value(event: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in event.attributes().flatten() {
        if attr.key.as_ref() == key {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

fn attr_usize(event: &BytesStart, key: &[u8]) -> Option<usize> {
    attr_value(event, key).and_then(|v| v.parse().ok())
}

fn parse_cv_param(event: &BytesStart) -> Option<CvParam> {
    let mut param = CvParam::default();
    for attr in event.attributes().flatten() {
        let value = attr.unescape_value().ok()?;
        match attr.key.as_ref() {
            b"accession" => {
                param.accession = value
                    .rsplit(':')
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
            }
            b"name" => param.name = value.into_owned(),
            b"value" => param.value = value.into_owned(),
            b"unitName" => param.unit = value.into_owned(),
            _ => {}
        }
    }
    (param.accession != 0).then_some(param)
}

impl CvParam {
    fn value_f64(&self) -> f64 {
        self.value.parse().unwrap_or(f64::NAN)
    }
}

/// Where a cvParam should be routed while walking the document
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ParserContext {
    #[default]
    Top,
    Spectrum,
    Scan,
    IsolationWindow,
    SelectedIon,
    Activation,
    BinaryDataArray,
    Binary,
    ChromatogramPrecursor,
    ChromatogramProduct,
    Software,
    InstrumentComponent,
}

/// The read-only document model for one mzML file
#[derive(Debug, Default)]
pub struct MzMLDocument {
    spectra: Vec<SpectrumEntry>,
    chromatograms: Vec<ChromatogramEntry>,
    /// Encoding description per binary array, captured from the first spectrum
    binary_metadata: Vec<BinaryMetadata>,
    binary_kinds: Vec<ArrayKind>,
    software: Vec<SoftwareInfo>,
    hardware: Vec<HardwareInfo>,
    time_stamp: Option<DateTime<FixedOffset>>,
    warnings: Vec<DocumentWarning>,
}

impl MzMLDocument {
    /// Parse one mzML stream. Structural problems leave the document empty
    /// with the problem recorded as a [`DocumentWarning`], never a panic or
    /// a hard error.
    pub fn from_reader<R: BufRead>(handle: R) -> Self {
        let mut doc = Self::default();
        doc.parse(handle);
        doc
    }

    fn parse<R: BufRead>(&mut self, handle: R) {
        let mut reader = Reader::from_reader(handle);
        reader.trim_text(true);

        let mut buffer = Vec::new();
        let mut saw_expected_root = false;
        let mut saw_run = false;

        let mut context = ParserContext::Top;
        let mut current_spectrum: Option<SpectrumEntry> = None;
        let mut current_chromatogram: Option<ChromatogramEntry> = None;
        let mut current_array: Option<EncodedArray> = None;
        let mut current_precursor: Option<PrecursorDescription> = None;
        let mut current_software: Option<SoftwareInfo> = None;
        let mut component_category: String = String::new();
        let mut isolation_offsets: (f64, f64) = (f64::NAN, f64::NAN);
        let mut root_seen = false;

        loop {
            {
                let outcome = reader.read_event_into(&mut buffer);
                // Self-closing elements never get an End event, so container
                // tags must complete inline instead of waiting for one.
                let self_closing = matches!(&outcome, Ok(Event::Empty(_)));
                match &outcome {
                    Ok(Event::Start(event)) | Ok(Event::Empty(event)) => {
                        let name = event.name();
                        let tag = name.as_ref();
                        if !root_seen {
                            root_seen = true;
                            if is_mzml_root(tag) {
                                saw_expected_root = true;
                            } else {
                                let found = String::from_utf8_lossy(tag).into_owned();
                                warn!("Root element {found:?} is not an mzML root");
                                self.warnings.push(DocumentWarning::UnexpectedRoot {
                                    expected: "mzML",
                                    found,
                                });
                                break;
                            }
                        }
                        match tag {
                            b"run" => {
                                saw_run = true;
                                self.time_stamp = attr_value(event, b"startTimeStamp")
                                    .and_then(|v| DateTime::parse_from_rfc3339(&v).ok());
                            }
                            b"spectrum" => {
                                let mut entry = SpectrumEntry::default();
                                entry.header.index =
                                    attr_usize(event, b"index").unwrap_or(self.spectra.len());
                                entry.header.id = attr_value(event, b"id").unwrap_or_default();
                                entry.header.scan = scan_number_from_native_id(&entry.header.id);
                                entry.header.array_length =
                                    attr_usize(event, b"defaultArrayLength").unwrap_or(0);
                                if self_closing {
                                    if self.spectra.is_empty() {
                                        self.capture_binary_metadata(&entry);
                                    }
                                    self.spectra.push(entry);
                                } else {
                                    current_spectrum = Some(entry);
                                    context = ParserContext::Spectrum;
                                }
                            }
                            b"chromatogram" => {
                                let mut entry = ChromatogramEntry::default();
                                entry.header.id = attr_value(event, b"id").unwrap_or_default();
                                entry.header.array_length =
                                    attr_usize(event, b"defaultArrayLength").unwrap_or(0);
                                entry.header.index = self.chromatograms.len();
                                if self_closing {
                                    self.chromatograms.push(entry);
                                } else {
                                    current_chromatogram = Some(entry);
                                    context = ParserContext::Spectrum;
                                }
                            }
                            b"scan" => {
                                if !self_closing {
                                    context = ParserContext::Scan;
                                }
                            }
                            b"precursor" => {
                                if current_chromatogram.is_some() {
                                    if !self_closing {
                                        context = ParserContext::ChromatogramPrecursor;
                                    }
                                } else {
                                    let mut precursor = PrecursorDescription::default();
                                    if let Some(reference) = attr_value(event, b"spectrumRef") {
                                        precursor.scan = scan_number_from_native_id(&reference);
                                    }
                                    if self_closing {
                                        if let Some(entry) = current_spectrum.as_mut() {
                                            entry.header.precursor = Some(precursor);
                                        }
                                    } else {
                                        current_precursor = Some(precursor);
                                    }
                                }
                            }
                            b"product" => {
                                if current_chromatogram.is_some() && !self_closing {
                                    context = ParserContext::ChromatogramProduct;
                                }
                            }
                            b"isolationWindow" => {
                                if current_precursor.is_some() && !self_closing {
                                    isolation_offsets = (f64::NAN, f64::NAN);
                                    context = ParserContext::IsolationWindow;
                                }
                            }
                            b"selectedIon" => {
                                if !self_closing {
                                    context = ParserContext::SelectedIon;
                                }
                            }
                            b"activation" => {
                                if !self_closing {
                                    context = ParserContext::Activation;
                                }
                            }
                            b"binaryDataArray" => {
                                if self_closing {
                                    if let Some(entry) = current_spectrum.as_mut() {
                                        entry.arrays.push(EncodedArray::default());
                                    } else if let Some(entry) = current_chromatogram.as_mut() {
                                        entry.arrays.push(EncodedArray::default());
                                    }
                                } else {
                                    current_array = Some(EncodedArray::default());
                                    context = ParserContext::BinaryDataArray;
                                }
                            }
                            b"binary" => {
                                if !self_closing {
                                    context = ParserContext::Binary;
                                }
                            }
                            b"software" => {
                                let mut software = SoftwareInfo::default();
                                software.name = attr_value(event, b"id").unwrap_or_default();
                                software.version =
                                    attr_value(event, b"version").unwrap_or_default();
                                if self_closing {
                                    self.software.push(software);
                                } else {
                                    current_software = Some(software);
                                    context = ParserContext::Software;
                                }
                            }
                            b"source" | b"analyzer" | b"detector" => {
                                if !self_closing {
                                    component_category =
                                        String::from_utf8_lossy(tag).into_owned();
                                    context = ParserContext::InstrumentComponent;
                                }
                            }
                            b"instrumentConfiguration" => {
                                if !self_closing {
                                    component_category = "model".to_string();
                                    context = ParserContext::InstrumentComponent;
                                }
                            }
                            b"cvParam" => {
                                if let Some(param) = parse_cv_param(event) {
                                    self.route_cv_param(
                                        param,
                                        context,
                                        &mut current_spectrum,
                                        &mut current_chromatogram,
                                        &mut current_array,
                                        &mut current_precursor,
                                        &mut current_software,
                                        &component_category,
                                        &mut isolation_offsets,
                                    );
                                }
                            }
                            _ => {}
                        }
                    }
                    Ok(Event::Text(event)) => {
                        if context == ParserContext::Binary {
                            if let Some(array) = current_array.as_mut() {
                                if let Ok(text) = event.unescape() {
                                    array.text.push_str(text.trim());
                                }
                            }
                        }
                    }
                    Ok(Event::End(event)) => match event.name().as_ref() {
                        b"spectrum" => {
                            if let Some(entry) = current_spectrum.take() {
                                if self.spectra.is_empty() {
                                    self.capture_binary_metadata(&entry);
                                }
                                self.spectra.push(entry);
                            }
                            context = ParserContext::Top;
                        }
                        b"chromatogram" => {
                            if let Some(mut entry) = current_chromatogram.take() {
                                entry.header.index = self.chromatograms.len();
                                self.chromatograms.push(entry);
                            }
                            context = ParserContext::Top;
                        }
                        b"scan" => context = ParserContext::Spectrum,
                        b"precursor" => {
                            if let Some(precursor) = current_precursor.take() {
                                if let Some(entry) = current_spectrum.as_mut() {
                                    entry.header.precursor = Some(precursor);
                                }
                            }
                            context = ParserContext::Spectrum;
                        }
                        b"product" => context = ParserContext::Spectrum,
                        b"isolationWindow" => {
                            // Offsets may precede the target, so the bounds
                            // resolve only once the window closes.
                            if let Some(precursor) = current_precursor.as_mut() {
                                let target = precursor.isolation_window_target;
                                precursor.isolation_window_low = target - isolation_offsets.0;
                                precursor.isolation_window_high = target + isolation_offsets.1;
                            }
                            context = if current_chromatogram.is_some()
                                || current_precursor.is_some()
                            {
                                ParserContext::Spectrum
                            } else {
                                ParserContext::Top
                            };
                        }
                        b"selectedIon" | b"activation" => {
                            context = if current_chromatogram.is_some()
                                || current_precursor.is_some()
                            {
                                ParserContext::Spectrum
                            } else {
                                ParserContext::Top
                            };
                        }
                        b"binaryDataArray" => {
                            if let Some(array) = current_array.take() {
                                if let Some(entry) = current_spectrum.as_mut() {
                                    entry.arrays.push(array);
                                } else if let Some(entry) = current_chromatogram.as_mut() {
                                    entry.arrays.push(array);
                                }
                            }
                            context = ParserContext::Spectrum;
                        }
                        b"binary" => context = ParserContext::BinaryDataArray,
                        b"software" => {
                            if let Some(software) = current_software.take() {
                                self.software.push(software);
                            }
                            context = ParserContext::Top;
                        }
                        b"source" | b"analyzer" | b"detector" | b"instrumentConfiguration" => {
                            component_category.clear();
                            context = ParserContext::Top;
                        }
                        _ => {}
                    },
                    Ok(Event::Eof) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!("mzML parsing failed: {error}");
                        self.warnings
                            .push(DocumentWarning::Malformed(error.to_string()));
                        self.spectra.clear();
                        self.chromatograms.clear();
                        return;
                    }
                }
            }
            buffer.clear();
        }

        if !saw_expected_root {
            self.spectra.clear();
            self.chromatograms.clear();
            return;
        }
        if !saw_run {
            warn!("No run element found in the mzML file");
            self.warnings.push(DocumentWarning::MissingRun);
            self.spectra.clear();
            self.chromatograms.clear();
        }
        // Re-number so header index always matches list position.
        for (i, entry) in self.spectra.iter_mut().enumerate() {
            entry.header.index = i;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn route_cv_param(
        &mut self,
        param: CvParam,
        context: ParserContext,
        current_spectrum: &mut Option<SpectrumEntry>,
        current_chromatogram: &mut Option<ChromatogramEntry>,
        current_array: &mut Option<EncodedArray>,
        current_precursor: &mut Option<PrecursorDescription>,
        current_software: &mut Option<SoftwareInfo>,
        component_category: &str,
        isolation_offsets: &mut (f64, f64),
    ) {
        match context {
            ParserContext::BinaryDataArray => {
                if let Some(array) = current_array.as_mut() {
                    fill_binary_data_array(array, &param);
                }
            }
            ParserContext::Scan => {
                if let Some(entry) = current_spectrum.as_mut() {
                    match param.accession {
                        // scan start time
                        1000016 => {
                            let mut rt = param.value_f64();
                            if param.unit == "minute" {
                                rt *= 60.0;
                            }
                            entry.header.rt = rt;
                        }
                        // ion mobility drift time
                        1002476 => entry.header.drift = param.value_f64(),
                        _ => {}
                    }
                }
            }
            ParserContext::IsolationWindow => {
                if let Some(precursor) = current_precursor.as_mut() {
                    match param.accession {
                        1000827 => precursor.isolation_window_target = param.value_f64(),
                        1000828 => isolation_offsets.0 = param.value_f64(),
                        1000829 => isolation_offsets.1 = param.value_f64(),
                        _ => {}
                    }
                }
            }
            ParserContext::SelectedIon => {
                if let Some(precursor) = current_precursor.as_mut() {
                    match param.accession {
                        1000744 => precursor.mz = param.value_f64(),
                        1000041 => {
                            precursor.charge = param.value.parse().unwrap_or(0);
                        }
                        1000042 => precursor.intensity = param.value_f64(),
                        _ => {}
                    }
                }
            }
            ParserContext::Activation => {
                if let Some(precursor) = current_precursor.as_mut() {
                    if param.accession == 1000045 {
                        precursor.collision_energy = param.value_f64();
                    }
                } else if let Some(entry) = current_chromatogram.as_mut() {
                    if param.accession == 1000045 {
                        entry.header.collision_energy = param.value_f64();
                    }
                }
            }
            ParserContext::ChromatogramPrecursor => {
                if let Some(entry) = current_chromatogram.as_mut() {
                    match param.accession {
                        1000827 => entry.header.precursor_mz = param.value_f64(),
                        1000045 => entry.header.collision_energy = param.value_f64(),
                        _ => {}
                    }
                }
            }
            ParserContext::ChromatogramProduct => {
                if let Some(entry) = current_chromatogram.as_mut() {
                    if param.accession == 1000827 {
                        entry.header.product_mz = param.value_f64();
                    }
                }
            }
            ParserContext::Software => {
                if let Some(software) = current_software.as_mut() {
                    software.name = param.name;
                }
            }
            ParserContext::InstrumentComponent => {
                self.hardware.push(HardwareInfo {
                    category: component_category.to_string(),
                    value: param.name,
                });
            }
            ParserContext::Spectrum => {
                if let Some(entry) = current_spectrum.as_mut() {
                    fill_spectrum_header(&mut entry.header, &param);
                } else if let Some(entry) = current_chromatogram.as_mut() {
                    match param.accession {
                        1000130 => entry.header.polarity = ScanPolarity::Positive,
                        1000129 => entry.header.polarity = ScanPolarity::Negative,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn capture_binary_metadata(&mut self, entry: &SpectrumEntry) {
        for array in entry.arrays.iter() {
            self.binary_kinds.push(array.kind);
            self.binary_metadata.push(array.metadata.clone());
        }
    }

    fn metadata_for(&self, kind: ArrayKind, position: usize) -> BinaryMetadata {
        if let Some(found) = self
            .binary_kinds
            .iter()
            .position(|k| *k == kind)
            .and_then(|i| self.binary_metadata.get(i))
        {
            return found.clone();
        }
        self.binary_metadata
            .get(position)
            .cloned()
            .unwrap_or_default()
    }

    pub fn spectrum_count(&self) -> usize {
        self.spectra.len()
    }

    pub fn chromatogram_count(&self) -> usize {
        self.chromatograms.len()
    }

    pub fn spectrum_header(&self, index: usize) -> Option<&SpectrumHeader> {
        self.spectra.get(index).map(|entry| &entry.header)
    }

    pub fn chromatogram_header(&self, index: usize) -> Option<&ChromatogramHeader> {
        self.chromatograms.get(index).map(|entry| &entry.header)
    }

    pub fn binary_metadata(&self) -> &[BinaryMetadata] {
        &self.binary_metadata
    }

    pub fn software(&self) -> &[SoftwareInfo] {
        &self.software
    }

    pub fn hardware(&self) -> &[HardwareInfo] {
        &self.hardware
    }

    pub fn time_stamp(&self) -> Option<DateTime<FixedOffset>> {
        self.time_stamp
    }

    pub fn warnings(&self) -> &[DocumentWarning] {
        &self.warnings
    }

    /// Decode the (m/z, intensity) trace arrays of the spectrum at `index`.
    ///
    /// The document-level binary metadata captured from the first spectrum
    /// governs the decode; a declared array length of zero short-circuits
    /// to an empty trace.
    pub fn trace(&self, index: usize) -> Result<Trace, BinaryDecodeError> {
        let entry = match self.spectra.get(index) {
            Some(entry) => entry,
            None => return Ok(Trace::default()),
        };
        if entry.header.array_length == 0 {
            return Ok(Trace::default());
        }
        let mut mz = None;
        let mut intensity = None;
        for (position, array) in entry.arrays.iter().enumerate() {
            match array.kind {
                ArrayKind::Mz => {
                    let metadata = self.metadata_for(ArrayKind::Mz, position);
                    mz = Some(bindata::decode_payload(&array.text, &metadata)?);
                }
                ArrayKind::Intensity => {
                    let metadata = self.metadata_for(ArrayKind::Intensity, position);
                    intensity = Some(bindata::decode_payload(&array.text, &metadata)?);
                }
                _ => {}
            }
        }
        match (mz, intensity) {
            (Some(mz), Some(intensity)) => Ok(Trace::new(mz, intensity)),
            (None, _) => Err(BinaryDecodeError::MissingArray("m/z")),
            (_, None) => Err(BinaryDecodeError::MissingArray("intensity")),
        }
    }

    /// Decode the (time, intensity) arrays of the chromatogram at `index`,
    /// normalizing time to seconds.
    pub fn chromatogram(&self, index: usize) -> Result<ChromatogramTrace, BinaryDecodeError> {
        let entry = match self.chromatograms.get(index) {
            Some(entry) => entry,
            None => return Ok(ChromatogramTrace::default()),
        };
        if entry.header.array_length == 0 {
            return Ok(ChromatogramTrace::default());
        }
        let mut time = None;
        let mut intensity = None;
        for array in entry.arrays.iter() {
            match array.kind {
                ArrayKind::Time => {
                    let mut values = bindata::decode_payload(&array.text, &array.metadata)?;
                    if array.unit_minutes {
                        for v in values.iter_mut() {
                            *v *= 60.0;
                        }
                    }
                    time = Some(values);
                }
                ArrayKind::Intensity => {
                    intensity = Some(bindata::decode_payload(&array.text, &array.metadata)?);
                }
                _ => {}
            }
        }
        match (time, intensity) {
            (Some(time), Some(intensity)) => Ok(ChromatogramTrace::new(time, intensity)),
            (None, _) => Err(BinaryDecodeError::MissingArray("time")),
            (_, None) => Err(BinaryDecodeError::MissingArray("intensity")),
        }
    }
}

fn fill_spectrum_header(header: &mut SpectrumHeader, param: &CvParam) {
    match param.accession {
        1000511 => header.ms_level = param.value.parse().unwrap_or(0),
        1000127 => header.mode = SignalContinuity::Centroid,
        1000128 => header.mode = SignalContinuity::Profile,
        1000130 => header.polarity = ScanPolarity::Positive,
        1000129 => header.polarity = ScanPolarity::Negative,
        1000528 => header.mz_low = param.value_f64(),
        1000527 => header.mz_high = param.value_f64(),
        1000504 => header.base_peak_mz = param.value_f64(),
        1000505 => header.base_peak_intensity = param.value_f64(),
        1000285 => header.tic = param.value_f64(),
        _ => {}
    }
}

fn fill_binary_data_array(array: &mut EncodedArray, param: &CvParam) {
    match param.accession {
        // data types
        1000521 => array.metadata.precision = Precision::Float32,
        1000523 => array.metadata.precision = Precision::Float64,
        // compression
        1000574 => {
            array.metadata.compression = param.name.clone();
            array.metadata.compressed = true;
        }
        1000576 => {
            array.metadata.compression = param.name.clone();
            array.metadata.compressed = false;
        }
        // array identities
        1000514 => array.kind = ArrayKind::Mz,
        1000515 => array.kind = ArrayKind::Intensity,
        1000595 => {
            array.kind = ArrayKind::Time;
            array.unit_minutes = param.unit == "minute";
        }
        _ => {
            // Any other compression scheme is recorded by name so the decode
            // can fail with something actionable.
            if param.name.contains("compression") {
                array.metadata.compression = param.name.clone();
                array.metadata.compressed = true;
            }
        }
    }
    // mzML payloads are always little endian
    array.metadata.byte_order = ByteOrder::LittleEndian;
}
