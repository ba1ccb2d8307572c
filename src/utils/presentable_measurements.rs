//! Resting place for [PresentableMeasurement]

use std::fmt::Display;
use once_cell::sync::Lazy;


/// A unit sizes are shown in: its `suffix` & how many bytes each one of it has
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct SizeUnit {
    pub suffix: &'static str,
    pub scale:  f64,
}

impl SizeUnit {
    /// converts `bytes` into this unit
    pub fn scaled(&self, bytes: f64) -> f64 {
        bytes / self.scale
    }
}

/// := (minimum bytes, unit) -- biggest first
static SIZE_UNITS: Lazy<Vec<(u64, SizeUnit)>> = Lazy::new(|| {
    [
        (1u64<<30, "GB"),
        (1u64<<20, "MB"),
        (1u64<<10, "KB"),
        (0,        "B"),
    ]
    .into_iter()
    .map(|(minimum, suffix)| (
        minimum,
        SizeUnit { suffix, scale: if minimum != 0 { minimum as f64 } else { 1.0 } },
    ))
    .collect()
});

/// The unit every size of a session is shown in: the biggest one not exceeding the report `threshold`.\
/// Unlike the usual auto-scaling, the unit is fixed for the whole session so consecutive samples compare at a glance.
pub fn size_unit_for(threshold: u64) -> SizeUnit {
    SIZE_UNITS.iter()
        .find(|&&(minimum, _)| threshold >= minimum)
        .map_or(SizeUnit { suffix: "B", scale: 1.0 }, |&(_minimum, unit)| unit)
}


/// Holds and presents a size, already converted to its [SizeUnit]
pub struct PresentableMeasurement {
    pub(crate) value: f64,
    unit:             SizeUnit,
    /// if set, the value is shown with an explicit `+` when positive -- for deltas
    signed:           bool,
}

impl Display for PresentableMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.signed && self.value > 0.0 { "+" } else { "" };
        write!(f, "{sign}{:.2} {}", self.value, self.unit.suffix)
    }
}

/// Builds a [PresentableMeasurement] for a size already expressed in `unit`s
pub fn size_measurement(value: f64, unit: SizeUnit) -> PresentableMeasurement {
    PresentableMeasurement { value, unit, signed: false }
}

/// Builds a [PresentableMeasurement] for the difference between two sizes expressed in `unit`s
pub fn size_delta_measurement(delta: f64, unit: SizeUnit) -> PresentableMeasurement {
    PresentableMeasurement { value: delta, unit, signed: true }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [presentable_measurements](super) module

    use super::*;


    #[test]
    fn units_follow_the_threshold() {
        let expected_units = [
            (                0, "B" ),
            (             1023, "B" ),
            (             1024, "KB"),
            (      1024*1024-1, "KB"),
            (        1024*1024, "MB"),
            (1024*1024*1024+10, "GB"),
            (          u64::MAX, "GB"),
        ];
        for (threshold, expected_suffix) in expected_units {
            assert_eq!(size_unit_for(threshold).suffix, expected_suffix, "Unit doesn't match for threshold {threshold}");
        }
    }

    #[test]
    fn representations() {
        let kb = size_unit_for(4096);
        let value = kb.scaled(10.0 * 1024.0 + 256.0);
        assert_eq!(size_measurement(value, kb).to_string(),        "10.25 KB");
        assert_eq!(size_delta_measurement(value, kb).to_string(),  "+10.25 KB");
        assert_eq!(size_delta_measurement(-value, kb).to_string(), "-10.25 KB");
        assert_eq!(size_delta_measurement(0.0, kb).to_string(),    "0.00 KB");
    }
}
