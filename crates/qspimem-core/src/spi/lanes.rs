//! SPI lane widths and transfer direction

/// Number of IO lines used during a phase
///
/// Single width sends on IO0 and receives on IO1, dual uses IO[1:0] and
/// quad IO[3:0]. Bits always go most significant first, so a quad byte is
/// the high nibble followed by the low nibble.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LaneWidth {
    /// One bit per clock
    #[default]
    X1,
    /// Two bits per clock
    X2,
    /// Four bits per clock
    X4,
}

impl LaneWidth {
    /// Returns the number of lanes
    pub const fn lanes(&self) -> u8 {
        match self {
            Self::X1 => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }

    /// Output-enable mask while this width drives the bus
    pub const fn output_mask(&self) -> u8 {
        match self {
            Self::X1 => 0b0001,
            Self::X2 => 0b0011,
            Self::X4 => 0b1111,
        }
    }

    /// Clocks needed to move one byte
    pub const fn clocks_per_byte(&self) -> u8 {
        8 / self.lanes()
    }

    /// Extract the inbound bits for this width from the sampled IO lines
    pub const fn sample(&self, io: u8) -> u8 {
        match self {
            Self::X1 => (io >> 1) & 0x1,
            Self::X2 => io & 0x3,
            Self::X4 => io & 0xF,
        }
    }

    /// Place the top bits of `shift` onto the IO lines for this width
    pub const fn drive(&self, shift: u8) -> u8 {
        match self {
            Self::X1 => shift >> 7,
            Self::X2 => shift >> 6,
            Self::X4 => shift >> 4,
        }
    }
}

/// Data direction of a flash frame's data phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Controller drives the data lines
    #[default]
    ToFlash,
    /// Flash drives the data lines
    FromFlash,
}
