//! Bounded byte links between the host side and the flash side
//!
//! A link is a small FIFO with ready/valid semantics: the producer may
//! push while [`ByteLink::ready`] is true and the consumer may pop while
//! [`ByteLink::valid`] is true. Nothing is ever dropped or duplicated; a
//! full link is backpressure.

use heapless::Deque;

/// Depth of the decoder/sequencer links
pub const LINK_DEPTH: usize = 4;

/// Fixed capacity byte FIFO with ready/valid handshakes
#[derive(Debug, Default)]
pub struct ByteLink<const N: usize> {
    fifo: Deque<u8, N>,
}

impl<const N: usize> ByteLink<N> {
    /// Create an empty link
    pub const fn new() -> Self {
        Self { fifo: Deque::new() }
    }

    /// Producer side: there is room for a byte
    pub fn ready(&self) -> bool {
        !self.fifo.is_full()
    }

    /// Consumer side: a byte is available
    pub fn valid(&self) -> bool {
        !self.fifo.is_empty()
    }

    /// Offer a byte; returns true if the handshake completed
    pub fn push(&mut self, byte: u8) -> bool {
        self.fifo.push_back(byte).is_ok()
    }

    /// Take the oldest byte
    pub fn pop(&mut self) -> Option<u8> {
        self.fifo.pop_front()
    }

    /// Look at the oldest byte without taking it
    pub fn peek(&self) -> Option<u8> {
        self.fifo.front().copied()
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    /// Returns true if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    /// Drop everything (reset only)
    pub fn clear(&mut self) {
        self.fifo.clear();
    }
}

/// The two links between the [`CommandDecoder`](crate::host::CommandDecoder)
/// and the [`TransactionSequencer`](crate::sequencer::TransactionSequencer)
#[derive(Debug, Default)]
pub struct Links {
    /// Host payload on its way to the flash (writes)
    pub to_flash: ByteLink<LINK_DEPTH>,
    /// Flash data on its way to the host (reads)
    pub from_flash: ByteLink<LINK_DEPTH>,
}

impl Links {
    /// Create empty links
    pub const fn new() -> Self {
        Self {
            to_flash: ByteLink::new(),
            from_flash: ByteLink::new(),
        }
    }

    /// Drop everything in both directions
    pub fn clear(&mut self) {
        self.to_flash.clear();
        self.from_flash.clear();
    }
}
