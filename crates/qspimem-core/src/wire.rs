//! Flash-facing pin bundle and line resolution

/// The controller's flash-facing pins
///
/// `io` holds the values the controller would drive; a lane only reaches
/// the wire when its bit in `io_oe` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QspiPins {
    /// Chip select, active low
    pub cs_n: bool,
    /// Serial clock
    pub sclk: bool,
    /// IO[3:0] output values
    pub io: u8,
    /// IO[3:0] output enables
    pub io_oe: u8,
}

impl QspiPins {
    /// Pins with chip select released and every lane tri-stated
    pub const fn idle(sclk_idle_high: bool) -> Self {
        Self {
            cs_n: true,
            sclk: sclk_idle_high,
            io: 0,
            io_oe: 0,
        }
    }

    /// Returns true while chip select is asserted
    pub const fn is_selected(&self) -> bool {
        !self.cs_n
    }

    /// Lane values as seen on the wire when nobody else drives
    ///
    /// Undriven lanes read high (IO2/IO3 double as WP#/HOLD# and carry
    /// pull-ups on real boards).
    pub const fn driven_lines(&self) -> u8 {
        ((self.io & self.io_oe) | !self.io_oe) & 0xF
    }
}

/// Lanes driven by the flash device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineDrive {
    /// IO[3:0] values
    pub io: u8,
    /// IO[3:0] the device is driving
    pub oe: u8,
}

impl LineDrive {
    /// Device not driving anything
    pub const RELEASED: Self = Self { io: 0, oe: 0 };
}

/// Resolve what the controller samples on IO[3:0]
///
/// Device-driven lanes win, then controller-driven lanes, and anything
/// left floating reads as 1.
pub const fn resolve_lines(pins: QspiPins, device: LineDrive) -> u8 {
    let from_device = device.io & device.oe;
    let from_ctrl = pins.io & pins.io_oe & !device.oe;
    let floating = !(device.oe | pins.io_oe);
    (from_device | from_ctrl | floating) & 0xF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floating_lanes_read_high() {
        let pins = QspiPins::idle(true);
        assert_eq!(resolve_lines(pins, LineDrive::RELEASED), 0xF);
        assert_eq!(pins.driven_lines(), 0xF);
    }

    #[test]
    fn test_device_drive_wins() {
        let pins = QspiPins {
            cs_n: false,
            sclk: false,
            io: 0b0001,
            io_oe: 0b0001,
        };
        let device = LineDrive { io: 0b0000, oe: 0b0010 };
        // IO0 from controller, IO1 from device, IO2/3 pulled up
        assert_eq!(resolve_lines(pins, device), 0b1101);
    }
}
