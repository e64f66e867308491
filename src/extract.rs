//! Targeted extraction of raw signal into a long-form table.
//!
//! Given a set of [`Target`] windows, the extraction filters the spectrum
//! list on header predicates first, decodes only the surviving spectra, and
//! emits one output row per data point that passes each target's windows and
//! the level-matched intensity floor.

use indexmap::IndexMap;

use crate::io::{MzReadError, RawDataFile};
use crate::spectrum::{ScanPolarity, SpectrumHeaders};

/// One caller-supplied extraction window.
///
/// A window `max` of zero means that dimension is unbounded. A `level` of
/// zero matches any MS level, and an `Unknown` polarity matches any polarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: String,
    pub level: u8,
    pub polarity: ScanPolarity,
    /// When set, the m/z window applies to the spectrum's precursor m/z
    /// instead of the individual points
    pub precursor: bool,
    pub mz_min: f64,
    pub mz_max: f64,
    pub rt_min: f64,
    pub rt_max: f64,
    pub drift_min: f64,
    pub drift_max: f64,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            id: String::new(),
            level: 0,
            polarity: ScanPolarity::Unknown,
            precursor: false,
            mz_min: 0.0,
            mz_max: 0.0,
            rt_min: 0.0,
            rt_max: 0.0,
            drift_min: 0.0,
            drift_max: 0.0,
        }
    }
}

fn in_window(value: f64, min: f64, max: f64) -> bool {
    if max == 0.0 {
        return true;
    }
    value >= min && value <= max
}

impl Target {
    /// Whether the spectrum at `row` of the header table matches this
    /// target's header-level predicates
    fn matches_spectrum(&self, headers: &SpectrumHeaders, row: usize) -> bool {
        if self.level != 0 && headers.level[row] != self.level {
            return false;
        }
        if self.polarity != ScanPolarity::Unknown && headers.polarity[row] != self.polarity {
            return false;
        }
        if !in_window(headers.rt[row], self.rt_min, self.rt_max) {
            return false;
        }
        if !in_window(headers.drift[row], self.drift_min, self.drift_max) {
            return false;
        }
        if self.precursor {
            return headers.level[row] >= 2
                && in_window(headers.precursor_mz[row], self.mz_min, self.mz_max);
        }
        true
    }
}

/// The long-form extraction output, one row per surviving data point.
///
/// Row order is (target order, then spectrum order, then point order); the
/// untargeted path leaves the id column empty.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SpectraTable {
    pub id: Vec<String>,
    pub polarity: Vec<ScanPolarity>,
    pub level: Vec<u8>,
    pub pre_mz: Vec<f64>,
    pub pre_ce: Vec<f64>,
    pub rt: Vec<f64>,
    pub drift: Vec<f64>,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl SpectraTable {
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    fn push_point(&mut self, id: &str, headers: &SpectrumHeaders, row: usize, mz: f64, intensity: f64) {
        self.id.push(id.to_string());
        self.polarity.push(headers.polarity[row]);
        self.level.push(headers.level[row]);
        self.pre_mz.push(headers.precursor_mz[row]);
        self.pre_ce.push(headers.collision_energy[row]);
        self.rt.push(headers.rt[row]);
        self.drift.push(headers.drift[row]);
        self.mz.push(mz);
        self.intensity.push(intensity);
    }
}

/// Extract raw signal from `data` into a long-form table.
///
/// `levels` restricts which MS levels are considered at all (empty means
/// every level). With no targets every level-masked spectrum is decoded and
/// flattened unfiltered. With targets, a spectrum is decoded once if it
/// matches at least one target, then each target re-scans its matching
/// spectra: precursor-scoped targets keep every point of their matching
/// level-2 spectra above the MS2 floor, other targets keep points inside
/// their m/z window above the floor for that point's spectrum level.
pub fn extract_spectra(
    data: &RawDataFile,
    levels: &[u8],
    targets: &[Target],
    min_intensity_ms1: f64,
    min_intensity_ms2: f64,
) -> Result<SpectraTable, MzReadError> {
    let headers = data.spectrum_headers(&[])?;
    let mut table = SpectraTable::default();

    let level_masked: Vec<usize> = (0..headers.len())
        .filter(|&row| levels.is_empty() || levels.contains(&headers.level[row]))
        .collect();

    if targets.is_empty() {
        // A corrupt spectrum aborts the extraction; partial tables would be
        // indistinguishable from complete ones.
        let traces = data
            .traces(&level_masked)?
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        for (&row, trace) in level_masked.iter().zip(traces.iter()) {
            for (mz, intensity) in trace.mz.iter().zip(trace.intensity.iter()) {
                table.push_point("", &headers, row, *mz, *intensity);
            }
        }
        return Ok(table);
    }

    let candidates: Vec<usize> = level_masked
        .iter()
        .copied()
        .filter(|&row| targets.iter().any(|t| t.matches_spectrum(&headers, row)))
        .collect();
    let traces = data
        .traces(&candidates)?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    let decoded: IndexMap<usize, _> = candidates.iter().copied().zip(traces).collect();

    for target in targets {
        for (&row, trace) in decoded.iter() {
            if !target.matches_spectrum(&headers, row) {
                continue;
            }
            let level = headers.level[row];
            for (mz, intensity) in trace.mz.iter().zip(trace.intensity.iter()) {
                let keep = if target.precursor {
                    level == 2 && *intensity >= min_intensity_ms2
                } else {
                    let floor = if level == 1 {
                        min_intensity_ms1
                    } else {
                        min_intensity_ms2
                    };
                    in_window(*mz, target.mz_min, target.mz_max) && *intensity >= floor
                };
                if keep {
                    table.push_point(&target.id, &headers, row, *mz, *intensity);
                }
            }
        }
    }
    Ok(table)
}
