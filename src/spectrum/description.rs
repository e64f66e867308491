use std::fmt::{self, Display};

/**
Describes the polarity of a mass spectrum. A spectrum is either `Positive` (1+), `Negative` (-1)
or `Unknown` (0). The `Unknown` state is the default.
*/
#[repr(i8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Eq, Hash)]
pub enum ScanPolarity {
    #[default]
    Unknown = 0,
    Positive = 1,
    Negative = -1,
}

impl Display for ScanPolarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Positive => f.write_str("positive"),
            Self::Negative => f.write_str("negative"),
        }
    }
}

/**
Describes the initial representation of the signal of a spectrum, either
peak-reduced (`Centroid`) or continuous (`Profile`).
*/
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Eq, Hash)]
pub enum SignalContinuity {
    #[default]
    Unknown = 0,
    Centroid = 3,
    Profile = 5,
}

impl Display for SignalContinuity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Centroid => f.write_str("centroid"),
            Self::Profile => f.write_str("profile"),
        }
    }
}

/// The description of a precursor ion selection, present on MSn spectra
#[derive(Debug, Clone, PartialEq)]
pub struct PrecursorDescription {
    /// The scan number of the survey spectrum the precursor was selected from
    pub scan: i32,
    pub isolation_window_low: f64,
    pub isolation_window_high: f64,
    pub isolation_window_target: f64,
    pub mz: f64,
    pub charge: i32,
    pub intensity: f64,
    pub collision_energy: f64,
}

impl Default for PrecursorDescription {
    fn default() -> Self {
        Self {
            scan: 0,
            isolation_window_low: f64::NAN,
            isolation_window_high: f64::NAN,
            isolation_window_target: f64::NAN,
            mz: f64::NAN,
            charge: 0,
            intensity: f64::NAN,
            collision_energy: f64::NAN,
        }
    }
}

/// The scalar metadata of one spectrum. Absent numeric attributes decode to
/// NaN, absent text to an empty string, and absent counts to 0 so that a
/// partially described spectrum never fails the whole read.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumHeader {
    /// 0-based position in the document's spectrum list
    pub index: usize,
    /// The native spectrum id string
    pub id: String,
    pub scan: i32,
    /// The declared number of points in the trace arrays
    pub array_length: usize,
    pub ms_level: u8,
    pub mode: SignalContinuity,
    pub polarity: ScanPolarity,
    pub mz_low: f64,
    pub mz_high: f64,
    pub base_peak_mz: f64,
    pub base_peak_intensity: f64,
    pub tic: f64,
    /// Retention time in seconds regardless of the source unit
    pub rt: f64,
    /// Ion mobility drift time, NaN when the dimension is absent
    pub drift: f64,
    pub precursor: Option<PrecursorDescription>,
}

impl Default for SpectrumHeader {
    fn default() -> Self {
        Self {
            index: 0,
            id: String::new(),
            scan: 0,
            array_length: 0,
            ms_level: 0,
            mode: SignalContinuity::default(),
            polarity: ScanPolarity::default(),
            mz_low: f64::NAN,
            mz_high: f64::NAN,
            base_peak_mz: f64::NAN,
            base_peak_intensity: f64::NAN,
            tic: f64::NAN,
            rt: f64::NAN,
            drift: f64::NAN,
            precursor: None,
        }
    }
}

impl SpectrumHeader {
    pub fn has_precursor(&self) -> bool {
        self.precursor.is_some()
    }

    pub fn precursor_mz(&self) -> f64 {
        self.precursor.as_ref().map(|p| p.mz).unwrap_or(f64::NAN)
    }

    pub fn collision_energy(&self) -> f64 {
        self.precursor
            .as_ref()
            .map(|p| p.collision_energy)
            .unwrap_or(f64::NAN)
    }
}

/// The column-oriented table of [`SpectrumHeader`] records, one row per
/// spectrum in file order. Every column has the same length.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SpectrumHeaders {
    pub index: Vec<usize>,
    pub id: Vec<String>,
    pub scan: Vec<i32>,
    pub array_length: Vec<usize>,
    pub level: Vec<u8>,
    pub mode: Vec<SignalContinuity>,
    pub polarity: Vec<ScanPolarity>,
    pub mz_low: Vec<f64>,
    pub mz_high: Vec<f64>,
    pub base_peak_mz: Vec<f64>,
    pub base_peak_intensity: Vec<f64>,
    pub tic: Vec<f64>,
    pub rt: Vec<f64>,
    pub drift: Vec<f64>,
    pub precursor_scan: Vec<i32>,
    pub isolation_window_low: Vec<f64>,
    pub isolation_window_high: Vec<f64>,
    pub isolation_window_target: Vec<f64>,
    pub precursor_mz: Vec<f64>,
    pub precursor_charge: Vec<i32>,
    pub precursor_intensity: Vec<f64>,
    pub collision_energy: Vec<f64>,
}

impl SpectrumHeaders {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut this = Self::default();
        this.reserve(capacity);
        this
    }

    fn reserve(&mut self, additional: usize) {
        self.index.reserve(additional);
        self.id.reserve(additional);
        self.scan.reserve(additional);
        self.array_length.reserve(additional);
        self.level.reserve(additional);
        self.mode.reserve(additional);
        self.polarity.reserve(additional);
        self.mz_low.reserve(additional);
        self.mz_high.reserve(additional);
        self.base_peak_mz.reserve(additional);
        self.base_peak_intensity.reserve(additional);
        self.tic.reserve(additional);
        self.rt.reserve(additional);
        self.drift.reserve(additional);
        self.precursor_scan.reserve(additional);
        self.isolation_window_low.reserve(additional);
        self.isolation_window_high.reserve(additional);
        self.isolation_window_target.reserve(additional);
        self.precursor_mz.reserve(additional);
        self.precursor_charge.reserve(additional);
        self.precursor_intensity.reserve(additional);
        self.collision_energy.reserve(additional);
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn push(&mut self, header: &SpectrumHeader) {
        self.index.push(header.index);
        self.id.push(header.id.clone());
        self.scan.push(header.scan);
        self.array_length.push(header.array_length);
        self.level.push(header.ms_level);
        self.mode.push(header.mode);
        self.polarity.push(header.polarity);
        self.mz_low.push(header.mz_low);
        self.mz_high.push(header.mz_high);
        self.base_peak_mz.push(header.base_peak_mz);
        self.base_peak_intensity.push(header.base_peak_intensity);
        self.tic.push(header.tic);
        self.rt.push(header.rt);
        self.drift.push(header.drift);
        let pre = header.precursor.clone().unwrap_or_default();
        self.precursor_scan.push(pre.scan);
        self.isolation_window_low.push(pre.isolation_window_low);
        self.isolation_window_high.push(pre.isolation_window_high);
        self.isolation_window_target.push(pre.isolation_window_target);
        self.precursor_mz.push(pre.mz);
        self.precursor_charge.push(pre.charge);
        self.precursor_intensity.push(pre.intensity);
        self.collision_energy.push(pre.collision_energy);
    }
}

impl<'a> FromIterator<&'a SpectrumHeader> for SpectrumHeaders {
    fn from_iter<T: IntoIterator<Item = &'a SpectrumHeader>>(iter: T) -> Self {
        let mut table = Self::default();
        for header in iter {
            table.push(header);
        }
        table
    }
}

/// The scalar metadata of one chromatogram
#[derive(Debug, Clone, PartialEq)]
pub struct ChromatogramHeader {
    pub index: usize,
    pub id: String,
    pub array_length: usize,
    pub polarity: ScanPolarity,
    pub precursor_mz: f64,
    pub product_mz: f64,
    pub collision_energy: f64,
}

impl Default for ChromatogramHeader {
    fn default() -> Self {
        Self {
            index: 0,
            id: String::new(),
            array_length: 0,
            polarity: ScanPolarity::default(),
            precursor_mz: f64::NAN,
            product_mz: f64::NAN,
            collision_energy: f64::NAN,
        }
    }
}

/// Column-oriented table of [`ChromatogramHeader`] records
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChromatogramHeaders {
    pub index: Vec<usize>,
    pub id: Vec<String>,
    pub array_length: Vec<usize>,
    pub polarity: Vec<ScanPolarity>,
    pub precursor_mz: Vec<f64>,
    pub product_mz: Vec<f64>,
    pub collision_energy: Vec<f64>,
}

impl ChromatogramHeaders {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn push(&mut self, header: &ChromatogramHeader) {
        self.index.push(header.index);
        self.id.push(header.id.clone());
        self.array_length.push(header.array_length);
        self.polarity.push(header.polarity);
        self.precursor_mz.push(header.precursor_mz);
        self.product_mz.push(header.product_mz);
        self.collision_energy.push(header.collision_energy);
    }
}

impl<'a> FromIterator<&'a ChromatogramHeader> for ChromatogramHeaders {
    fn from_iter<T: IntoIterator<Item = &'a ChromatogramHeader>>(iter: T) -> Self {
        let mut table = Self::default();
        for header in iter {
            table.push(header);
        }
        table
    }
}

/// The decoded (m/z, intensity) arrays of one spectrum. Both arrays are the
/// same length, and both are empty when the declared trace length was zero.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Trace {
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl Trace {
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        Self { mz, intensity }
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }
}

/// The decoded (time, intensity) arrays of one chromatogram, time in seconds
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChromatogramTrace {
    pub time: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl ChromatogramTrace {
    pub fn new(time: Vec<f64>, intensity: Vec<f64>) -> Self {
        Self { time, intensity }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// A (name, type, version) triple describing one software item from the
/// document's provenance section
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SoftwareInfo {
    pub name: String,
    pub kind: String,
    pub version: String,
}

/// A (category, value) pair describing one instrument hardware component
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HardwareInfo {
    pub category: String,
    pub value: String,
}
