//! 24-bit flash addresses

/// A 24-bit flash address (up to 16 MiB)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address24(u32);

impl Address24 {
    /// Highest representable address
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Create an address, returning `None` if it does not fit in 24 bits
    pub const fn new(value: u32) -> Option<Self> {
        if value > Self::MAX {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Create an address keeping only the low 24 bits
    pub const fn truncate(value: u32) -> Self {
        Self(value & Self::MAX)
    }

    /// The address as an integer
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Build from bytes in arrival order, first byte being bits [7:0]
    pub const fn from_arrival_bytes(bytes: [u8; 3]) -> Self {
        Self((bytes[0] as u32) | ((bytes[1] as u32) << 8) | ((bytes[2] as u32) << 16))
    }

    /// Bytes in host arrival order (bits [7:0] first)
    pub const fn to_arrival_bytes(&self) -> [u8; 3] {
        [self.0 as u8, (self.0 >> 8) as u8, (self.0 >> 16) as u8]
    }

    /// Bytes in flash wire order (most significant first)
    pub const fn to_wire_bytes(&self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    /// Advance by `offset`, wrapping inside the 24-bit space
    pub const fn wrapping_add(&self, offset: u32) -> Self {
        Self::truncate(self.0.wrapping_add(offset))
    }
}

impl core::fmt::Display for Address24 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}
