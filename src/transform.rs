//! Raw ADC code to screen pixel mapping

#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};

/// Largest code the ADS7843 reports in 8-bit mode. Seen spuriously at higher
/// SPI clock rates, so it never counts as a real touch.
pub const MAX_ADC_VALUE: u8 = 127;

/// Screen orientation, derived from which display dimension is larger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Orientation {
    #[default]
    Portrait = 0,
    Landscape = 1,
}

impl Orientation {
    /// Square displays count as landscape.
    pub fn from_dimensions(width: u16, height: u16) -> Self {
        if width >= height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Pixel dimensions of the display the panel sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisplayGeometry {
    pub width: u16,
    pub height: u16,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
        }
    }
}

impl DisplayGeometry {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_dimensions(self.width, self.height)
    }
}

/// Per-axis ADC bounds measured with the panel in landscape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationConfig {
    pub min_adc_x: u8,
    pub max_adc_x: u8,
    pub min_adc_y: u8,
    pub max_adc_y: u8,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_adc_x: 0,
            max_adc_x: MAX_ADC_VALUE,
            min_adc_y: 0,
            max_adc_y: MAX_ADC_VALUE,
        }
    }
}

impl CalibrationConfig {
    pub fn new(min_adc_x: u8, max_adc_x: u8, min_adc_y: u8, max_adc_y: u8) -> Self {
        Self {
            min_adc_x,
            max_adc_x,
            min_adc_y,
            max_adc_y,
        }
    }

    /// `max_adc_x - min_adc_x`, negative when the bounds are swapped.
    pub fn range_x(&self) -> i16 {
        self.max_adc_x as i16 - self.min_adc_x as i16
    }

    /// `max_adc_y - min_adc_y`, negative when the bounds are swapped.
    pub fn range_y(&self) -> i16 {
        self.max_adc_y as i16 - self.min_adc_y as i16
    }
}

/// One X/Y reading from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSample {
    pub x_adc: u8,
    pub y_adc: u8,
}

impl TouchSample {
    pub fn new(x_adc: u8, y_adc: u8) -> Self {
        Self { x_adc, y_adc }
    }

    /// Stand-in for an attempt where the bus failed.
    pub(crate) fn invalid() -> Self {
        Self::new(MAX_ADC_VALUE, MAX_ADC_VALUE)
    }

    /// A sample with either axis at full scale is an artifact, not a touch.
    pub fn is_valid(&self) -> bool {
        self.x_adc != MAX_ADC_VALUE && self.y_adc != MAX_ADC_VALUE
    }
}

/// Fixed 90° rotation from the panel's landscape axes to portrait.
pub fn rotate_portrait(sample: TouchSample) -> TouchSample {
    TouchSample::new(sample.y_adc, MAX_ADC_VALUE.saturating_sub(sample.x_adc))
}

/// Mirror both axes.
pub fn flip(sample: TouchSample) -> TouchSample {
    TouchSample::new(
        MAX_ADC_VALUE.saturating_sub(sample.x_adc),
        MAX_ADC_VALUE.saturating_sub(sample.y_adc),
    )
}

/// Map one ADC code onto `0..=dimension`.
///
/// Codes below `min` pin to 0. Codes above `max` are not clamped and land past
/// the screen edge. A zero or negative `range` maps everything to 0.
pub fn scale_axis(value: u8, min: u8, range: i16, dimension: u16) -> u16 {
    let fraction = if value < min || range <= 0 {
        0.0
    } else {
        (value - min) as f32 / range as f32
    };
    // `as` saturates at u16::MAX for codes far beyond the calibrated max
    (dimension as f32 * fraction) as u16
}

/// Orientation correction, optional flip, then calibration.
///
/// Returns the corrected sample alongside the pixel position, since the
/// corrected codes are what gets reported as the event's ADC values.
pub fn transform(
    sample: TouchSample,
    geometry: &DisplayGeometry,
    calibration: &CalibrationConfig,
    flip_axes: bool,
) -> (TouchSample, u16, u16) {
    let mut corrected = sample;
    if geometry.orientation() == Orientation::Portrait {
        corrected = rotate_portrait(corrected);
    }
    if flip_axes {
        corrected = flip(corrected);
    }

    let x = scale_axis(
        corrected.x_adc,
        calibration.min_adc_x,
        calibration.range_x(),
        geometry.width,
    );
    let y = scale_axis(
        corrected.y_adc,
        calibration.min_adc_y,
        calibration.range_y(),
        geometry.height,
    );

    (corrected, x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> CalibrationConfig {
        CalibrationConfig::new(10, 110, 20, 100)
    }

    #[test]
    fn test_orientation_from_dimensions() {
        assert_eq!(
            Orientation::from_dimensions(320, 240),
            Orientation::Landscape
        );
        assert_eq!(
            Orientation::from_dimensions(240, 320),
            Orientation::Portrait
        );
        assert_eq!(
            Orientation::from_dimensions(240, 240),
            Orientation::Landscape
        );
        assert_eq!(Orientation::Portrait.value(), 0);
        assert_eq!(Orientation::Landscape.value(), 1);
        assert_eq!(
            DisplayGeometry::new(240, 320).orientation(),
            Orientation::Portrait
        );
    }

    #[test]
    fn test_sample_validity() {
        assert!(TouchSample::new(0, 126).is_valid());
        assert!(!TouchSample::new(127, 40).is_valid());
        assert!(!TouchSample::new(40, 127).is_valid());
        assert!(!TouchSample::invalid().is_valid());
    }

    #[test]
    fn test_rotate_portrait() {
        assert_eq!(
            rotate_portrait(TouchSample::new(30, 90)),
            TouchSample::new(90, 97)
        );

        // a quarter turn twice is a half turn, not the identity
        let twice = rotate_portrait(rotate_portrait(TouchSample::new(30, 90)));
        assert_eq!(twice, TouchSample::new(97, 37));
    }

    #[test]
    fn test_flip_twice_is_identity() {
        let sample = TouchSample::new(12, 100);
        assert_eq!(flip(sample), TouchSample::new(115, 27));
        assert_eq!(flip(flip(sample)), sample);
    }

    #[test]
    fn test_scale_axis_bounds() {
        let cal = calibration();
        assert_eq!(scale_axis(10, cal.min_adc_x, cal.range_x(), 320), 0);
        assert_eq!(scale_axis(110, cal.min_adc_x, cal.range_x(), 320), 320);
        assert_eq!(scale_axis(60, cal.min_adc_x, cal.range_x(), 320), 160);
        // truncation, not rounding
        assert_eq!(scale_axis(11, cal.min_adc_x, cal.range_x(), 320), 3);
    }

    #[test]
    fn test_scale_axis_below_min_pins_to_zero() {
        assert_eq!(scale_axis(3, 10, 100, 320), 0);
    }

    #[test]
    fn test_scale_axis_above_max_runs_past_edge() {
        assert_eq!(scale_axis(120, 10, 100, 320), 352);
    }

    #[test]
    fn test_scale_axis_degenerate_range() {
        assert_eq!(scale_axis(50, 50, 0, 320), 0);
        assert_eq!(scale_axis(90, 50, 0, 320), 0);
        assert_eq!(scale_axis(90, 100, -40, 320), 0);
    }

    #[test]
    fn test_transform_landscape() {
        let cal = CalibrationConfig::new(10, 110, 10, 110);
        let (corrected, x, y) = transform(
            TouchSample::new(60, 35),
            &DisplayGeometry::new(320, 240),
            &cal,
            false,
        );
        assert_eq!(corrected, TouchSample::new(60, 35));
        assert_eq!(x, 160);
        assert_eq!(y, 60);
    }

    #[test]
    fn test_transform_portrait_rotates_before_calibration() {
        let cal = CalibrationConfig::new(10, 110, 10, 110);
        let (corrected, x, y) = transform(
            TouchSample::new(30, 90),
            &DisplayGeometry::new(240, 320),
            &cal,
            false,
        );
        assert_eq!(corrected, TouchSample::new(90, 97));
        assert_eq!(x, 192);
        assert_eq!(y, 278);
    }

    #[test]
    fn test_transform_flip() {
        let cal = CalibrationConfig::default();
        let (corrected, _, _) = transform(
            TouchSample::new(27, 100),
            &DisplayGeometry::new(320, 240),
            &cal,
            true,
        );
        assert_eq!(corrected, TouchSample::new(100, 27));

        let (corrected, _, _) = transform(
            TouchSample::new(30, 90),
            &DisplayGeometry::new(240, 320),
            &cal,
            true,
        );
        assert_eq!(corrected, TouchSample::new(37, 30));
    }
}
