//! Builders that synthesize small mzML/mzXML documents for tests.

pub mod mzml_fixture {
    use std::fmt::Write;

    use crate::spectrum::bindata::{encode_payload, BinaryMetadata, ByteOrder, Precision};

    #[derive(Debug, Clone)]
    pub struct FixtureSpectrum {
        pub ms_level: u8,
        pub rt_minutes: f64,
        pub positive: bool,
        pub centroided: bool,
        pub precursor_mz: Option<f64>,
        pub collision_energy: Option<f64>,
        pub mz: Vec<f64>,
        pub intensity: Vec<f64>,
    }

    impl Default for FixtureSpectrum {
        fn default() -> Self {
            Self {
                ms_level: 1,
                rt_minutes: 0.0,
                positive: true,
                centroided: false,
                precursor_mz: None,
                collision_energy: None,
                mz: Vec::new(),
                intensity: Vec::new(),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct FixtureChromatogram {
        pub id: String,
        pub positive: bool,
        pub precursor_mz: Option<f64>,
        pub product_mz: Option<f64>,
        pub collision_energy: Option<f64>,
        pub time_minutes: Vec<f64>,
        pub intensity: Vec<f64>,
    }

    impl Default for FixtureChromatogram {
        fn default() -> Self {
            Self {
                id: "TIC".to_string(),
                positive: true,
                precursor_mz: None,
                product_mz: None,
                collision_energy: None,
                time_minutes: Vec::new(),
                intensity: Vec::new(),
            }
        }
    }

    pub fn build(spectra: &[FixtureSpectrum], zlib: bool) -> String {
        build_full(spectra, &[], zlib)
    }

    pub fn build_full(
        spectra: &[FixtureSpectrum],
        chromatograms: &[FixtureChromatogram],
        zlib: bool,
    ) -> String {
        let compression = if zlib { "zlib" } else { "none" };
        let compression_accession = if zlib { "MS:1000574" } else { "MS:1000576" };
        let compression_name = if zlib {
            "zlib compression"
        } else {
            "no compression"
        };
        let metadata = BinaryMetadata::new(
            Precision::Float64,
            compression.to_string(),
            ByteOrder::LittleEndian,
        );

        let mut text = String::new();
        text.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        text.push_str(r#"<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">"#);
        text.push_str(r#"<softwareList count="1">"#);
        text.push_str(r#"<software id="Xcalibur" version="2.2">"#);
        text.push_str(
            r#"<cvParam cvRef="MS" accession="MS:1000532" name="Xcalibur" value=""/>"#,
        );
        text.push_str("</software></softwareList>");
        text.push_str(r#"<instrumentConfigurationList count="1">"#);
        text.push_str(r#"<instrumentConfiguration id="IC1">"#);
        text.push_str(
            r#"<cvParam cvRef="MS" accession="MS:1000449" name="LTQ Orbitrap" value=""/>"#,
        );
        text.push_str(r#"<componentList count="1">"#);
        text.push_str(r#"<analyzer order="1">"#);
        text.push_str(r#"<cvParam cvRef="MS" accession="MS:1000484" name="orbitrap" value=""/>"#);
        text.push_str("</analyzer></componentList>");
        text.push_str("</instrumentConfiguration></instrumentConfigurationList>");
        text.push_str(
            r#"<run id="run1" startTimeStamp="2024-03-14T09:26:53Z" defaultInstrumentConfigurationRef="IC1">"#,
        );
        write!(text, r#"<spectrumList count="{}">"#, spectra.len()).unwrap();

        for (index, spectrum) in spectra.iter().enumerate() {
            write!(
                text,
                r#"<spectrum index="{index}" id="scan={}" defaultArrayLength="{}">"#,
                index + 1,
                spectrum.mz.len()
            )
            .unwrap();
            write!(
                text,
                r#"<cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="{}"/>"#,
                spectrum.ms_level
            )
            .unwrap();
            if spectrum.centroided {
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000127" name="centroid spectrum" value=""/>"#,
                );
            } else {
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000128" name="profile spectrum" value=""/>"#,
                );
            }
            if spectrum.positive {
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000130" name="positive scan" value=""/>"#,
                );
            } else {
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000129" name="negative scan" value=""/>"#,
                );
            }
            if !spectrum.mz.is_empty() {
                let low = spectrum.mz.iter().cloned().fold(f64::INFINITY, f64::min);
                let high = spectrum
                    .mz
                    .iter()
                    .cloned()
                    .fold(f64::NEG_INFINITY, f64::max);
                let (base_index, base_intensity) = spectrum
                    .intensity
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, v)| {
                        if *v > acc.1 {
                            (i, *v)
                        } else {
                            acc
                        }
                    });
                let tic: f64 = spectrum.intensity.iter().sum();
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="MS:1000528" name="lowest observed m/z" value="{low}"/>"#
                )
                .unwrap();
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="MS:1000527" name="highest observed m/z" value="{high}"/>"#
                )
                .unwrap();
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="MS:1000504" name="base peak m/z" value="{}"/>"#,
                    spectrum.mz[base_index]
                )
                .unwrap();
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="MS:1000505" name="base peak intensity" value="{base_intensity}"/>"#
                )
                .unwrap();
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="MS:1000285" name="total ion current" value="{tic}"/>"#
                )
                .unwrap();
            }
            text.push_str(r#"<scanList count="1"><scan>"#);
            write!(
                text,
                r#"<cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="{}" unitName="minute"/>"#,
                spectrum.rt_minutes
            )
            .unwrap();
            text.push_str("</scan></scanList>");
            if let Some(precursor_mz) = spectrum.precursor_mz {
                text.push_str(r#"<precursorList count="1"><precursor>"#);
                text.push_str("<isolationWindow>");
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="MS:1000827" name="isolation window target m/z" value="{precursor_mz}"/>"#
                )
                .unwrap();
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000828" name="isolation window lower offset" value="0.65"/>"#,
                );
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000829" name="isolation window upper offset" value="0.65"/>"#,
                );
                text.push_str("</isolationWindow>");
                text.push_str(r#"<selectedIonList count="1"><selectedIon>"#);
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="MS:1000744" name="selected ion m/z" value="{precursor_mz}"/>"#
                )
                .unwrap();
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000041" name="charge state" value="2"/>"#,
                );
                text.push_str("</selectedIon></selectedIonList>");
                text.push_str("<activation>");
                if let Some(energy) = spectrum.collision_energy {
                    write!(
                        text,
                        r#"<cvParam cvRef="MS" accession="MS:1000045" name="collision energy" value="{energy}"/>"#
                    )
                    .unwrap();
                }
                text.push_str("</activation>");
                text.push_str("</precursor></precursorList>");
            }
            text.push_str(r#"<binaryDataArrayList count="2">"#);
            for (kind_accession, kind_name, values) in [
                ("MS:1000514", "m/z array", &spectrum.mz),
                ("MS:1000515", "intensity array", &spectrum.intensity),
            ] {
                text.push_str("<binaryDataArray>");
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>"#,
                );
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="{compression_accession}" name="{compression_name}" value=""/>"#
                )
                .unwrap();
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="{kind_accession}" name="{kind_name}" value=""/>"#
                )
                .unwrap();
                write!(text, "<binary>{}</binary>", encode_payload(values, &metadata)).unwrap();
                text.push_str("</binaryDataArray>");
            }
            text.push_str("</binaryDataArrayList>");
            text.push_str("</spectrum>");
        }
        text.push_str("</spectrumList>");

        if !chromatograms.is_empty() {
            write!(
                text,
                r#"<chromatogramList count="{}">"#,
                chromatograms.len()
            )
            .unwrap();
            for (index, chromatogram) in chromatograms.iter().enumerate() {
                write!(
                    text,
                    r#"<chromatogram index="{index}" id="{}" defaultArrayLength="{}">"#,
                    chromatogram.id,
                    chromatogram.time_minutes.len()
                )
                .unwrap();
                if chromatogram.positive {
                    text.push_str(
                        r#"<cvParam cvRef="MS" accession="MS:1000130" name="positive scan" value=""/>"#,
                    );
                } else {
                    text.push_str(
                        r#"<cvParam cvRef="MS" accession="MS:1000129" name="negative scan" value=""/>"#,
                    );
                }
                if chromatogram.precursor_mz.is_some() || chromatogram.collision_energy.is_some() {
                    text.push_str("<precursor>");
                    if let Some(precursor_mz) = chromatogram.precursor_mz {
                        text.push_str("<isolationWindow>");
                        write!(
                            text,
                            r#"<cvParam cvRef="MS" accession="MS:1000827" name="isolation window target m/z" value="{precursor_mz}"/>"#
                        )
                        .unwrap();
                        text.push_str("</isolationWindow>");
                    }
                    if let Some(energy) = chromatogram.collision_energy {
                        text.push_str("<activation>");
                        write!(
                            text,
                            r#"<cvParam cvRef="MS" accession="MS:1000045" name="collision energy" value="{energy}"/>"#
                        )
                        .unwrap();
                        text.push_str("</activation>");
                    }
                    text.push_str("</precursor>");
                }
                if let Some(product_mz) = chromatogram.product_mz {
                    text.push_str("<product><isolationWindow>");
                    write!(
                        text,
                        r#"<cvParam cvRef="MS" accession="MS:1000827" name="isolation window target m/z" value="{product_mz}"/>"#
                    )
                    .unwrap();
                    text.push_str("</isolationWindow></product>");
                }
                text.push_str(r#"<binaryDataArrayList count="2">"#);
                text.push_str("<binaryDataArray>");
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>"#,
                );
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="{compression_accession}" name="{compression_name}" value=""/>"#
                )
                .unwrap();
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000595" name="time array" value="" unitName="minute"/>"#,
                );
                write!(
                    text,
                    "<binary>{}</binary>",
                    encode_payload(&chromatogram.time_minutes, &metadata)
                )
                .unwrap();
                text.push_str("</binaryDataArray>");
                text.push_str("<binaryDataArray>");
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000523" name="64-bit float" value=""/>"#,
                );
                write!(
                    text,
                    r#"<cvParam cvRef="MS" accession="{compression_accession}" name="{compression_name}" value=""/>"#
                )
                .unwrap();
                text.push_str(
                    r#"<cvParam cvRef="MS" accession="MS:1000515" name="intensity array" value=""/>"#,
                );
                write!(
                    text,
                    "<binary>{}</binary>",
                    encode_payload(&chromatogram.intensity, &metadata)
                )
                .unwrap();
                text.push_str("</binaryDataArray>");
                text.push_str("</binaryDataArrayList>");
                text.push_str("</chromatogram>");
            }
            text.push_str("</chromatogramList>");
        }

        text.push_str("</run></mzML>");
        text
    }
}

pub mod mzxml_fixture {
    use std::fmt::Write;

    use crate::spectrum::bindata::{
        encode_payload, interleave, BinaryMetadata, ByteOrder, Precision,
    };

    #[derive(Debug, Clone)]
    pub struct FixtureScan {
        pub ms_level: u8,
        pub rt_seconds: f64,
        pub positive: bool,
        pub centroided: bool,
        pub precursor_mz: Option<f64>,
        pub collision_energy: Option<f64>,
        pub mz: Vec<f64>,
        pub intensity: Vec<f64>,
    }

    impl Default for FixtureScan {
        fn default() -> Self {
            Self {
                ms_level: 1,
                rt_seconds: 0.0,
                positive: true,
                centroided: true,
                precursor_mz: None,
                collision_energy: None,
                mz: Vec::new(),
                intensity: Vec::new(),
            }
        }
    }

    pub fn build(scans: &[FixtureScan], zlib: bool) -> String {
        // Classic mzXML payloads are network (big endian) byte order.
        let metadata = BinaryMetadata::new(
            Precision::Float64,
            if zlib { "zlib" } else { "none" }.to_string(),
            ByteOrder::BigEndian,
        );
        let compression_type = if zlib { "zlib" } else { "none" };

        let mut text = String::new();
        text.push_str(r#"<?xml version="1.0" encoding="ISO-8859-1"?>"#);
        text.push_str(r#"<mzXML xmlns="http://sashimi.sourceforge.net/schema_revision/mzXML_3.2">"#);
        write!(text, r#"<msRun scanCount="{}">"#, scans.len()).unwrap();
        text.push_str("<msInstrument>");
        text.push_str(r#"<msManufacturer category="msManufacturer" value="Thermo Finnigan"/>"#);
        text.push_str(r#"<msModel category="msModel" value="LTQ Orbitrap"/>"#);
        text.push_str(r#"<software type="acquisition" name="Xcalibur" version="2.2"/>"#);
        text.push_str("</msInstrument>");
        for (index, scan) in scans.iter().enumerate() {
            write!(
                text,
                r#"<scan num="{}" msLevel="{}" peaksCount="{}" polarity="{}" retentionTime="PT{}S" centroided="{}""#,
                index + 1,
                scan.ms_level,
                scan.mz.len(),
                if scan.positive { "+" } else { "-" },
                scan.rt_seconds,
                u8::from(scan.centroided),
            )
            .unwrap();
            if !scan.mz.is_empty() {
                let low = scan.mz.iter().cloned().fold(f64::INFINITY, f64::min);
                let high = scan.mz.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let (base_index, base_intensity) = scan
                    .intensity
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, v)| {
                        if *v > acc.1 {
                            (i, *v)
                        } else {
                            acc
                        }
                    });
                let tic: f64 = scan.intensity.iter().sum();
                write!(
                    text,
                    r#" lowMz="{low}" highMz="{high}" basePeakMz="{}" basePeakIntensity="{base_intensity}" totIonCurrent="{tic}""#,
                    scan.mz[base_index]
                )
                .unwrap();
            }
            if let Some(energy) = scan.collision_energy {
                write!(text, r#" collisionEnergy="{energy}""#).unwrap();
            }
            text.push('>');
            if let Some(precursor_mz) = scan.precursor_mz {
                write!(
                    text,
                    r#"<precursorMz precursorScanNum="{}" precursorIntensity="1000" precursorCharge="2">{precursor_mz}</precursorMz>"#,
                    index.max(1)
                )
                .unwrap();
            }
            let payload = encode_payload(&interleave(&scan.mz, &scan.intensity), &metadata);
            write!(
                text,
                r#"<peaks precision="64" byteOrder="network" contentType="m/z-int" compressionType="{compression_type}">{payload}</peaks>"#
            )
            .unwrap();
            text.push_str("</scan>");
        }
        text.push_str("</msRun></mzXML>");
        text
    }
}
