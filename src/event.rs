use crate::transform::Orientation;

/// Whether the panel is being pressed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TouchDirection {
    Down = 0,
    #[default]
    Up = 1,
}

impl TouchDirection {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Current (or last known) touch state, as handed to the event handler.
///
/// The driver keeps exactly one of these. After an [`TouchDirection::Up`] the
/// position and `down_seconds` still hold the values of the press that just
/// ended.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub direction: TouchDirection,
    /// Seconds the panel has been held down.
    pub down_seconds: f32,
    /// Position in screen pixels.
    pub x: u16,
    pub y: u16,
    /// Orientation-corrected ADC codes, 0..=127.
    pub x_adc: u8,
    pub y_adc: u8,
    pub orientation: Orientation,
}

impl TouchEvent {
    pub fn is_down(&self) -> bool {
        self.direction == TouchDirection::Down
    }
}

/// Consumer callback for touch events.
pub type TouchHandler = fn(&TouchEvent);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_defaults_to_released() {
        let event = TouchEvent::default();
        assert_eq!(event.direction, TouchDirection::Up);
        assert!(!event.is_down());
        assert_eq!(event.down_seconds, 0.0);
    }

    #[test]
    fn test_direction_values() {
        assert_eq!(TouchDirection::Down.value(), 0);
        assert_eq!(TouchDirection::Up.value(), 1);
    }
}
