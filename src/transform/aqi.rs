//! PM2.5 → Air Quality Index conversion and health classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One linear segment of the breakpoint table: concentration range (µg/m³)
/// mapped onto an index range.
#[derive(Debug, Clone, Copy)]
struct Breakpoint {
    conc_lo: f64,
    conc_hi: f64,
    aqi_lo: f64,
    aqi_hi: f64,
}

const fn bp(conc_lo: f64, conc_hi: f64, aqi_lo: f64, aqi_hi: f64) -> Breakpoint {
    Breakpoint {
        conc_lo,
        conc_hi,
        aqi_lo,
        aqi_hi,
    }
}

/// US EPA PM2.5 breakpoints. Each segment starts where the previous one ends.
///
/// | PM2.5 (µg/m³)  | AQI       |
/// |----------------|-----------|
/// | 0 – 12.0       | 0 – 50    |
/// | 12.0 – 35.4    | 50 – 100  |
/// | 35.4 – 55.4    | 100 – 150 |
/// | 55.4 – 150.4   | 150 – 200 |
/// | 150.4 – 250.4  | 200 – 300 |
/// | > 250.4        | > 300, last slope extended |
const BREAKPOINTS: [Breakpoint; 5] = [
    bp(0.0, 12.0, 0.0, 50.0),
    bp(12.0, 35.4, 50.0, 100.0),
    bp(35.4, 55.4, 100.0, 150.0),
    bp(55.4, 150.4, 150.0, 200.0),
    bp(150.4, 250.4, 200.0, 300.0),
];

impl Breakpoint {
    fn interpolate(&self, conc: f64) -> f64 {
        // Ratio first so the upper anchor is hit exactly.
        let ratio = (conc - self.conc_lo) / (self.conc_hi - self.conc_lo);
        self.aqi_lo + (self.aqi_hi - self.aqi_lo) * ratio
    }

    fn slope(&self) -> f64 {
        (self.aqi_hi - self.aqi_lo) / (self.conc_hi - self.conc_lo)
    }
}

/// Converts a PM2.5 concentration into an AQI value.
///
/// Continuous and non-decreasing; `aqi_from_pm25(0.0) == 0.0`. Negative
/// concentrations are treated as zero. Above the last breakpoint the final
/// segment's slope is extended without bound.
pub fn aqi_from_pm25(pm25: f64) -> f64 {
    let conc = pm25.max(0.0);

    for segment in &BREAKPOINTS {
        if conc <= segment.conc_hi {
            return segment.interpolate(conc);
        }
    }

    let last = BREAKPOINTS[BREAKPOINTS.len() - 1];
    last.aqi_hi + (conc - last.conc_hi) * last.slope()
}

/// Health risk band derived from an AQI value. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HealthCategory {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    #[serde(rename = "Hazardous")]
    Hazardous,
}

impl HealthCategory {
    /// Classifies an AQI value. Upper bounds are inclusive.
    ///
    /// | AQI       | Category                       |
    /// |-----------|--------------------------------|
    /// | <= 50     | Good                           |
    /// | <= 100    | Moderate                       |
    /// | <= 150    | Unhealthy for Sensitive Groups |
    /// | <= 200    | Unhealthy                      |
    /// | <= 300    | Very Unhealthy                 |
    /// | > 300     | Hazardous                      |
    pub fn from_aqi(aqi: f64) -> Self {
        match aqi {
            a if a <= 50.0 => HealthCategory::Good,
            a if a <= 100.0 => HealthCategory::Moderate,
            a if a <= 150.0 => HealthCategory::UnhealthyForSensitiveGroups,
            a if a <= 200.0 => HealthCategory::Unhealthy,
            a if a <= 300.0 => HealthCategory::VeryUnhealthy,
            _ => HealthCategory::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthCategory::Good => "Good",
            HealthCategory::Moderate => "Moderate",
            HealthCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            HealthCategory::Unhealthy => "Unhealthy",
            HealthCategory::VeryUnhealthy => "Very Unhealthy",
            HealthCategory::Hazardous => "Hazardous",
        }
    }

    /// Display colour for dashboards.
    pub fn color(&self) -> &'static str {
        match self {
            HealthCategory::Good => "#00E400",
            HealthCategory::Moderate => "#FFFF00",
            HealthCategory::UnhealthyForSensitiveGroups => "#FF7E00",
            HealthCategory::Unhealthy => "#FF0000",
            HealthCategory::VeryUnhealthy => "#8F3F97",
            HealthCategory::Hazardous => "#7E0023",
        }
    }

    /// Unhealthy, Very Unhealthy and Hazardous.
    pub fn is_unhealthy(&self) -> bool {
        *self >= HealthCategory::Unhealthy
    }
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Index value with its classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AirQuality {
    pub aqi: f64,
    pub category: HealthCategory,
}

impl AirQuality {
    pub fn from_pm25(pm25: f64) -> Self {
        let aqi = aqi_from_pm25(pm25);
        Self {
            aqi,
            category: HealthCategory::from_aqi(aqi),
        }
    }

    pub fn color(&self) -> &'static str {
        self.category.color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoints_are_exact() {
        assert_eq!(aqi_from_pm25(0.0), 0.0);
        assert_eq!(aqi_from_pm25(12.0), 50.0);
        assert_eq!(aqi_from_pm25(35.4), 100.0);
        assert_eq!(aqi_from_pm25(55.4), 150.0);
        assert_eq!(aqi_from_pm25(150.4), 200.0);
        assert_eq!(aqi_from_pm25(250.4), 300.0);
    }

    #[test]
    fn test_interpolates_within_segment() {
        assert!((aqi_from_pm25(6.0) - 25.0).abs() < 1e-9);
        assert!((aqi_from_pm25(45.4) - 125.0).abs() < 1e-9);
        assert!((aqi_from_pm25(200.4) - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_extends_last_slope_above_table() {
        let aqi = aqi_from_pm25(350.4);
        assert!((aqi - 400.0).abs() < 1e-6, "got {aqi}");
    }

    #[test]
    fn test_negative_concentration_clamps_to_zero() {
        assert_eq!(aqi_from_pm25(-3.0), 0.0);
    }

    #[test]
    fn test_monotonic_over_domain() {
        let mut prev = aqi_from_pm25(0.0);
        let mut conc = 0.0;
        while conc < 600.0 {
            conc += 0.05;
            let aqi = aqi_from_pm25(conc);
            assert!(aqi >= prev, "AQI decreased at {conc}: {prev} -> {aqi}");
            prev = aqi;
        }
    }

    #[test]
    fn test_monotonic_around_each_breakpoint() {
        for segment in &BREAKPOINTS {
            let at = aqi_from_pm25(segment.conc_hi);
            let below = aqi_from_pm25(segment.conc_hi - 1e-9);
            let above = aqi_from_pm25(segment.conc_hi + 1e-9);
            assert!(below <= at && at <= above);
        }
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(HealthCategory::from_aqi(0.0), HealthCategory::Good);
        assert_eq!(HealthCategory::from_aqi(50.0), HealthCategory::Good);
        assert_eq!(HealthCategory::from_aqi(50.0001), HealthCategory::Moderate);
        assert_eq!(HealthCategory::from_aqi(100.0), HealthCategory::Moderate);
        assert_eq!(
            HealthCategory::from_aqi(100.0001),
            HealthCategory::UnhealthyForSensitiveGroups
        );
        assert_eq!(
            HealthCategory::from_aqi(150.0),
            HealthCategory::UnhealthyForSensitiveGroups
        );
        assert_eq!(HealthCategory::from_aqi(150.0001), HealthCategory::Unhealthy);
        assert_eq!(HealthCategory::from_aqi(200.0), HealthCategory::Unhealthy);
        assert_eq!(HealthCategory::from_aqi(200.0001), HealthCategory::VeryUnhealthy);
        assert_eq!(HealthCategory::from_aqi(300.0), HealthCategory::VeryUnhealthy);
        assert_eq!(HealthCategory::from_aqi(300.0001), HealthCategory::Hazardous);
    }

    #[test]
    fn test_breakpoint_concentrations_classify_to_lower_band() {
        assert_eq!(AirQuality::from_pm25(12.0).category, HealthCategory::Good);
        assert_eq!(AirQuality::from_pm25(12.1).category, HealthCategory::Moderate);
        assert_eq!(AirQuality::from_pm25(35.4).category, HealthCategory::Moderate);
    }

    #[test]
    fn test_color_follows_category() {
        let aq = AirQuality::from_pm25(5.0);
        assert_eq!(aq.color(), "#00E400");
        assert_eq!(AirQuality::from_pm25(500.0).color(), "#7E0023");
    }

    #[test]
    fn test_unhealthy_grouping() {
        assert!(!HealthCategory::UnhealthyForSensitiveGroups.is_unhealthy());
        assert!(HealthCategory::Unhealthy.is_unhealthy());
        assert!(HealthCategory::VeryUnhealthy.is_unhealthy());
        assert!(HealthCategory::Hazardous.is_unhealthy());
    }

    #[test]
    fn test_label_serializes_as_display_name() {
        let json = serde_json::to_string(&HealthCategory::UnhealthyForSensitiveGroups).unwrap();
        assert_eq!(json, "\"Unhealthy for Sensitive Groups\"");
    }
}
