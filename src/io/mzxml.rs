//! An in-memory document model over one mzXML file.
//!
//! mzXML predates mzML and stores nearly everything as element attributes.
//! The peak payload is one interleaved (m/z, intensity) array per scan, and
//! fragmentation scans may be nested inside their survey scan. Scans are
//! collected in document order, nested or not.

use std::io::BufRead;
use std::sync::OnceLock;

use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use super::DocumentWarning;
use crate::spectrum::bindata::{
    self, BinaryDecodeError, BinaryMetadata, ByteOrder, Precision,
};
use crate::spectrum::{
    HardwareInfo, PrecursorDescription, ScanPolarity, SignalContinuity, SoftwareInfo,
    SpectrumHeader, Trace,
};

pub fn is_mzxml_root(tag: &[u8]) -> bool {
    tag == b"mzXML"
}

/// Parse an mzXML `retentionTime` duration string into seconds.
///
/// A trailing `S` marks the value as seconds already; any other (or absent)
/// trailing unit marks minutes and scales by 60.
pub(crate) fn parse_retention_time(text: &str) -> f64 {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let number = NUMBER
        .get_or_init(|| Regex::new(r"[0-9]+\.?[0-9]*").expect("static pattern compiles"));
    let value: f64 = match number.find(text).and_then(|m| m.as_str().parse().ok()) {
        Some(value) => value,
        None => return f64::NAN,
    };
    if text.trim_end().ends_with('S') {
        value
    } else {
        value * 60.0
    }
}

#[derive(Debug, Default, Clone)]
struct ScanEntry {
    header: SpectrumHeader,
    metadata: BinaryMetadata,
    text: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ParserContext {
    #[default]
    Top,
    PrecursorMz,
    Peaks,
}

/// The read-only document model for one mzXML file
#[derive(Debug, Default)]
pub struct MzXMLDocument {
    scans: Vec<ScanEntry>,
    /// Encoding description read from the first scan's peaks node
    binary_metadata: BinaryMetadata,
    software: Vec<SoftwareInfo>,
    hardware: Vec<HardwareInfo>,
    warnings: Vec<DocumentWarning>,
}

fn attr_value(event: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in event.attributes().flatten() {
        if attr.key.as_ref() == key {
            return attr.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

fn attr_f64(event: &BytesStart, key: &[u8]) -> f64 {
    attr_value(event, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(f64::NAN)
}

fn scan_entry_from_attributes(event: &BytesStart, index: usize) -> ScanEntry {
    let mut entry = ScanEntry::default();
    let header = &mut entry.header;
    header.index = index;
    header.scan = attr_value(event, b"num")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    header.id = if header.scan > 0 {
        format!("scan={}", header.scan)
    } else {
        String::new()
    };
    header.array_length = attr_value(event, b"peaksCount")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    header.ms_level = attr_value(event, b"msLevel")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    header.mode = match attr_value(event, b"centroided").as_deref() {
        Some("1") => SignalContinuity::Centroid,
        Some("0") => SignalContinuity::Profile,
        _ => SignalContinuity::Unknown,
    };
    header.polarity = match attr_value(event, b"polarity").as_deref() {
        Some("+") => ScanPolarity::Positive,
        Some("-") => ScanPolarity::Negative,
        _ => ScanPolarity::Unknown,
    };
    header.mz_low = attr_f64(event, b"lowMz");
    header.mz_high = attr_f64(event, b"highMz");
    header.base_peak_mz = attr_f64(event, b"basePeakMz");
    header.base_peak_intensity = attr_f64(event, b"basePeakIntensity");
    header.tic = attr_f64(event, b"totIonCurrent");
    header.rt = attr_value(event, b"retentionTime")
        .map(|v| parse_retention_time(&v))
        .unwrap_or(f64::NAN);
    let collision_energy = attr_f64(event, b"collisionEnergy");
    if !collision_energy.is_nan() {
        header
            .precursor
            .get_or_insert_with(PrecursorDescription::default)
            .collision_energy = collision_energy;
    }
    entry
}

fn metadata_from_peaks(event: &BytesStart) -> BinaryMetadata {
    let precision = match attr_value(event, b"precision").as_deref() {
        Some("32") => Precision::Float32,
        _ => Precision::Float64,
    };
    let compression = attr_value(event, b"compressionType").unwrap_or_default();
    let byte_order = match attr_value(event, b"byteOrder").as_deref() {
        Some("network") => ByteOrder::BigEndian,
        _ => ByteOrder::LittleEndian,
    };
    BinaryMetadata::new(precision, compression, byte_order)
}

impl MzXMLDocument {
    /// Parse one mzXML stream, degrading structural problems to an empty
    /// document with a recorded [`DocumentWarning`].
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
        let mut root_seen = false;

        let mut context = ParserContext::Top;
        // Fragmentation scans nest inside their survey scan, so open scans
        // form a stack; entries move to the document when their tag closes.
        let mut open_scans: Vec<ScanEntry> = Vec::new();
        let mut metadata_captured = false;

        loop {
            {
                let outcome = reader.read_event_into(&mut buffer);
                // A self-closing tag never gets an End event, so scans that
                // arrive that way must complete inline.
                let self_closing = matches!(&outcome, Ok(Event::Empty(_)));
                match &outcome {
                    Ok(Event::Start(event)) | Ok(Event::Empty(event)) => {
                        let name = event.name();
                        let tag = name.as_ref();
                        if !root_seen {
                            root_seen = true;
                            if is_mzxml_root(tag) {
                                saw_expected_root = true;
                            } else {
                                let found = String::from_utf8_lossy(tag).into_owned();
                                warn!("Root element {found:?} is not an mzXML root");
                                self.warnings.push(DocumentWarning::UnexpectedRoot {
                                    expected: "mzXML",
                                    found,
                                });
                                break;
                            }
                        }
                        match tag {
                            b"msRun" => saw_run = true,
                            b"scan" => {
                                let index = self.scans.len() + open_scans.len();
                                let entry = scan_entry_from_attributes(event, index);
                                if self_closing {
                                    self.scans.push(entry);
                                } else {
                                    open_scans.push(entry);
                                }
                            }
                            b"precursorMz" => {
                                if let Some(entry) = open_scans.last_mut() {
                                    let precursor = entry
                                        .header
                                        .precursor
                                        .get_or_insert_with(PrecursorDescription::default);
                                    precursor.scan = attr_value(event, b"precursorScanNum")
                                        .and_then(|v| v.parse().ok())
                                        .unwrap_or(0);
                                    precursor.charge = attr_value(event, b"precursorCharge")
                                        .and_then(|v| v.parse().ok())
                                        .unwrap_or(0);
                                    precursor.intensity = attr_f64(event, b"precursorIntensity");
                                    if !self_closing {
                                        context = ParserContext::PrecursorMz;
                                    }
                                }
                            }
                            b"peaks" => {
                                if let Some(entry) = open_scans.last_mut() {
                                    entry.metadata = metadata_from_peaks(event);
                                    if !metadata_captured {
                                        self.binary_metadata = entry.metadata.clone();
                                        metadata_captured = true;
                                    }
                                    if !self_closing {
                                        context = ParserContext::Peaks;
                                    }
                                }
                            }
                            _ if tag.starts_with(b"soft") => {
                                self.software.push(SoftwareInfo {
                                    name: attr_value(event, b"name").unwrap_or_default(),
                                    kind: attr_value(event, b"type").unwrap_or_default(),
                                    version: attr_value(event, b"version").unwrap_or_default(),
                                });
                            }
                            _ if tag.starts_with(b"ms") && tag != b"msRun" => {
                                if let (Some(category), Some(value)) = (
                                    attr_value(event, b"category"),
                                    attr_value(event, b"value"),
                                ) {
                                    self.hardware.push(HardwareInfo { category, value });
                                }
                            }
                            _ => {}
                        }
                    }
                    Ok(Event::Text(event)) => match context {
                        ParserContext::PrecursorMz => {
                            if let Some(entry) = open_scans.last_mut() {
                                if let Ok(text) = event.unescape() {
                                    if let Some(precursor) = entry.header.precursor.as_mut() {
                                        precursor.mz = text.trim().parse().unwrap_or(f64::NAN);
                                    }
                                }
                            }
                        }
                        ParserContext::Peaks => {
                            if let Some(entry) = open_scans.last_mut() {
                                if let Ok(text) = event.unescape() {
                                    entry.text.push_str(text.trim());
                                }
                            }
                        }
                        ParserContext::Top => {}
                    },
                    Ok(Event::End(event)) => match event.name().as_ref() {
                        b"scan" => {
                            if let Some(entry) = open_scans.pop() {
                                self.scans.push(entry);
                            }
                        }
                        b"precursorMz" | b"peaks" => context = ParserContext::Top,
                        _ => {}
                    },
                    Ok(Event::Eof) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!("mzXML parsing failed: {error}");
                        self.warnings
                            .push(DocumentWarning::Malformed(error.to_string()));
                        self.scans.clear();
                        return;
                    }
                }
            }
            buffer.clear();
        }

        if !saw_expected_root {
            self.scans.clear();
            return;
        }
        if !saw_run {
            warn!("No msRun element found in the mzXML file");
            self.warnings.push(DocumentWarning::MissingRun);
            self.scans.clear();
            return;
        }
        // Restore document order and renumber after stack-based collection.
        self.scans.sort_by_key(|entry| entry.header.index);
        for (i, entry) in self.scans.iter_mut().enumerate() {
            entry.header.index = i;
        }
    }

    pub fn spectrum_count(&self) -> usize {
        self.scans.len()
    }

    pub fn spectrum_header(&self, index: usize) -> Option<&SpectrumHeader> {
        self.scans.get(index).map(|entry| &entry.header)
    }

    pub fn binary_metadata(&self) -> &BinaryMetadata {
        &self.binary_metadata
    }

    pub fn software(&self) -> &[SoftwareInfo] {
        &self.software
    }

    pub fn hardware(&self) -> &[HardwareInfo] {
        &self.hardware
    }

    pub fn warnings(&self) -> &[DocumentWarning] {
        &self.warnings
    }

    /// Decode the interleaved peaks payload of the scan at `index` into a
    /// (m/z, intensity) trace using the document-level binary metadata.
    pub fn trace(&self, index: usize) -> Result<Trace, BinaryDecodeError> {
        let entry = match self.scans.get(index) {
            Some(entry) => entry,
            None => return Ok(Trace::default()),
        };
        if entry.header.array_length == 0 {
            return Ok(Trace::default());
        }
        let values = bindata::decode_payload(&entry.text, &self.binary_metadata)?;
        let (mz, intensity) = bindata::deinterleave(&values);
        Ok(Trace::new(mz, intensity))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::mzxml_fixture::{self, FixtureScan};

    fn dda_document() -> MzXMLDocument {
        let scans = vec![
            FixtureScan {
                ms_level: 1,
                rt_seconds: 30.5,
                mz: vec![100.0, 200.5, 300.25],
                intensity: vec![10.0, 30.0, 20.0],
                ..Default::default()
            },
            FixtureScan {
                ms_level: 2,
                rt_seconds: 31.0,
                precursor_mz: Some(200.5),
                collision_energy: Some(35.0),
                mz: vec![50.0, 90.5],
                intensity: vec![5.0, 9.0],
                ..Default::default()
            },
        ];
        let text = mzxml_fixture::build(&scans, true);
        MzXMLDocument::from_reader(text.as_bytes())
    }

    #[test_log::test]
    fn parses_headers_and_traces() {
        let doc = dda_document();
        assert!(doc.warnings().is_empty());
        assert_eq!(doc.spectrum_count(), 2);

        let survey = doc.spectrum_header(0).unwrap();
        assert_eq!(survey.scan, 1);
        assert_eq!(survey.ms_level, 1);
        assert_eq!(survey.mode, SignalContinuity::Centroid);
        assert_eq!(survey.polarity, ScanPolarity::Positive);
        assert_eq!(survey.rt, 30.5);
        assert_eq!(survey.base_peak_mz, 200.5);
        assert_eq!(survey.tic, 60.0);
        assert!(survey.precursor.is_none());

        let fragment = doc.spectrum_header(1).unwrap();
        let precursor = fragment.precursor.as_ref().unwrap();
        assert_eq!(precursor.mz, 200.5);
        assert_eq!(precursor.charge, 2);
        assert_eq!(precursor.collision_energy, 35.0);

        assert_eq!(doc.binary_metadata().byte_order, ByteOrder::BigEndian);
        assert!(doc.binary_metadata().compressed);

        let trace = doc.trace(0).unwrap();
        assert_eq!(trace.mz, vec![100.0, 200.5, 300.25]);
        assert_eq!(trace.intensity, vec![10.0, 30.0, 20.0]);
    }

    #[test]
    fn retention_time_units() {
        assert_eq!(parse_retention_time("PT60.5S"), 60.5);
        assert_eq!(parse_retention_time("1.5S"), 1.5);
        assert_eq!(parse_retention_time("PT1.5M"), 90.0);
        assert_eq!(parse_retention_time("2"), 120.0);
        assert!(parse_retention_time("").is_nan());
    }

    #[test_log::test]
    fn wrong_root_degrades_to_empty() {
        let doc = MzXMLDocument::from_reader(&b"<mzML><run/></mzML>"[..]);
        assert_eq!(doc.spectrum_count(), 0);
        assert!(matches!(
            doc.warnings()[0],
            DocumentWarning::UnexpectedRoot { .. }
        ));
    }

    #[test_log::test]
    fn missing_run_degrades_to_empty() {
        let doc = MzXMLDocument::from_reader(&b"<mzXML></mzXML>"[..]);
        assert_eq!(doc.spectrum_count(), 0);
        assert!(matches!(doc.warnings()[0], DocumentWarning::MissingRun));
    }

    #[test]
    fn self_closing_scan_is_kept() {
        let text = r#"<mzXML><msRun scanCount="2">
            <scan num="1" msLevel="1" peaksCount="0" polarity="+" retentionTime="PT10S"/>
            <scan num="2" msLevel="1" peaksCount="0" polarity="+" retentionTime="PT20S"></scan>
            </msRun></mzXML>"#;
        let doc = MzXMLDocument::from_reader(text.as_bytes());
        assert!(doc.warnings().is_empty());
        assert_eq!(doc.spectrum_count(), 2);
        assert_eq!(doc.spectrum_header(0).unwrap().scan, 1);
        assert_eq!(doc.spectrum_header(0).unwrap().rt, 10.0);
        assert_eq!(doc.spectrum_header(1).unwrap().scan, 2);
        assert_eq!(doc.spectrum_header(1).unwrap().rt, 20.0);
    }

    #[test]
    fn collects_provenance() {
        let doc = dda_document();
        assert_eq!(doc.software().len(), 1);
        assert_eq!(doc.software()[0].name, "Xcalibur");
        assert_eq!(doc.software()[0].kind, "acquisition");
        assert_eq!(doc.hardware().len(), 2);
        assert_eq!(doc.hardware()[0].category, "msManufacturer");
    }

    #[test]
    fn zero_length_scan_yields_empty_trace() {
        let scans = vec![FixtureScan::default()];
        let text = mzxml_fixture::build(&scans, false);
        let doc = MzXMLDocument::from_reader(text.as_bytes());
        assert!(doc.trace(0).unwrap().is_empty());
    }
}
