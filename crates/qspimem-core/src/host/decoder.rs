//! Host-side command decoder
//!
//! Collects the four header bytes from the inbound host bus, validates
//! them, and then relays the payload between the host buses and the
//! [`Links`] shared with the sequencer. Only one request is in flight: the
//! inbound ready stays low from the fourth header byte until the controller
//! reports the whole transaction finished.

use super::header::CommandHeader;
use crate::link::Links;
use crate::spi::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Collecting header bytes
    Header { count: u8, bytes: [u8; CommandHeader::LEN] },
    /// Valid header waiting for the sequencer
    Dispatch(CommandHeader),
    /// Relaying payload bytes
    Payload { direction: Direction, remaining: u16 },
    /// Payload finished, waiting for the transaction to wind down
    WaitIdle,
}

impl State {
    const fn fresh() -> Self {
        Self::Header {
            count: 0,
            bytes: [0; CommandHeader::LEN],
        }
    }
}

/// Registered host-facing outputs of the decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostOutputs {
    /// Inbound ready
    pub in_ready: bool,
    /// Outbound valid
    pub out_valid: bool,
    /// Outbound data (0 when not valid)
    pub out_data: u8,
}

/// Parses host headers and relays payload with backpressure
#[derive(Debug)]
pub struct CommandDecoder {
    state: State,
    outputs: HostOutputs,
    rejected: u32,
}

impl Default for CommandDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDecoder {
    /// Create a decoder waiting for its first header byte
    ///
    /// The registered ready is low until the first [`update`](Self::update).
    pub const fn new() -> Self {
        Self {
            state: State::fresh(),
            outputs: HostOutputs {
                in_ready: false,
                out_valid: false,
                out_data: 0,
            },
            rejected: 0,
        }
    }

    /// Drop everything and force the outputs low
    pub fn reset(&mut self) {
        self.state = State::fresh();
        self.outputs = HostOutputs::default();
    }

    /// Registered outputs
    pub fn outputs(&self) -> HostOutputs {
        self.outputs
    }

    /// Number of headers rejected since creation
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Returns true while collecting a header with nothing latched yet
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Header { count: 0, .. })
    }

    /// Complete this cycle's host handshakes
    ///
    /// Returns true if a byte moved on either host bus.
    pub fn clock(&mut self, in_valid: bool, in_data: u8, out_ready: bool, links: &mut Links) -> bool {
        let mut moved = false;

        if self.outputs.in_ready && in_valid {
            moved = true;
            self.accept_in(in_data, links);
        }

        if self.outputs.out_valid && out_ready {
            moved = true;
            if let State::Payload {
                direction: Direction::FromFlash,
                remaining,
            } = &mut self.state
            {
                let byte = links.from_flash.pop();
                log::trace!("decoder: host took {:02x?}", byte);
                *remaining -= 1;
                if *remaining == 0 {
                    self.state = State::WaitIdle;
                }
            }
        }

        moved
    }

    fn accept_in(&mut self, byte: u8, links: &mut Links) {
        match &mut self.state {
            State::Header { count, bytes } => {
                bytes[*count as usize] = byte;
                *count += 1;
                if *count as usize == CommandHeader::LEN {
                    let raw = *bytes;
                    self.finish_header(raw);
                }
            }
            State::Payload {
                direction: Direction::ToFlash,
                remaining,
            } => {
                if links.to_flash.push(byte) {
                    log::trace!("decoder: payload byte {:02x}", byte);
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.state = State::WaitIdle;
                    }
                } else {
                    // in_ready is only raised with room in the link
                    log::error!("decoder: payload link overflow");
                }
            }
            _ => {}
        }
    }

    fn finish_header(&mut self, raw: [u8; CommandHeader::LEN]) {
        match CommandHeader::validate_bytes(raw) {
            Ok(header) => {
                log::debug!(
                    "decoder: {:?} {:?}->{:?} at {}",
                    header.operation,
                    header.source,
                    header.dest,
                    header.address
                );
                self.state = State::Dispatch(header);
            }
            Err(e) => {
                log::warn!("decoder: dropping header {:02x?}: {}", raw, e);
                self.rejected += 1;
                self.state = State::fresh();
            }
        }
    }

    /// The validated header waiting for the sequencer, if any
    pub fn pending(&self) -> Option<CommandHeader> {
        match self.state {
            State::Dispatch(header) => Some(header),
            _ => None,
        }
    }

    /// Sequencer took the pending header; start relaying its payload
    pub fn accept(&mut self) {
        if let State::Dispatch(header) = self.state {
            match (header.direction(), header.transfer_len()) {
                (Some(direction), Some(remaining)) => {
                    self.state = State::Payload {
                        direction,
                        remaining,
                    }
                }
                _ => self.state = State::WaitIdle,
            }
        }
    }

    /// Every payload byte has crossed the host bus
    pub fn payload_done(&self) -> bool {
        self.state == State::WaitIdle
    }

    /// Transaction fully finished; accept the next header
    pub fn release(&mut self) {
        if self.state == State::WaitIdle {
            self.state = State::fresh();
        }
    }

    /// Compute the registered outputs for the next cycle
    pub fn update(&mut self, links: &Links) {
        self.outputs = match self.state {
            State::Header { .. } => HostOutputs {
                in_ready: true,
                ..Default::default()
            },
            State::Payload {
                direction: Direction::ToFlash,
                ..
            } => HostOutputs {
                in_ready: links.to_flash.ready(),
                ..Default::default()
            },
            State::Payload {
                direction: Direction::FromFlash,
                ..
            } => match links.from_flash.peek() {
                Some(byte) => HostOutputs {
                    in_ready: false,
                    out_valid: true,
                    out_data: byte,
                },
                None => HostOutputs::default(),
            },
            State::Dispatch(_) | State::WaitIdle => HostOutputs::default(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::AccelId;
    use crate::spi::Address24;

    fn feed(dec: &mut CommandDecoder, links: &mut Links, bytes: &[u8]) {
        for &b in bytes {
            dec.update(links);
            assert!(dec.outputs().in_ready);
            assert!(dec.clock(true, b, false, links));
        }
        dec.update(links);
    }

    #[test]
    fn test_valid_header_dispatches() {
        let mut dec = CommandDecoder::new();
        let mut links = Links::new();
        let header = CommandHeader::write_result(AccelId::Aes, Address24::truncate(0x123456));
        feed(&mut dec, &mut links, &header.encode());

        assert_eq!(dec.pending(), Some(header));
        assert!(!dec.outputs().in_ready);

        dec.accept();
        dec.update(&links);
        assert!(dec.outputs().in_ready);
    }

    #[test]
    fn test_invalid_header_dropped() {
        let mut dec = CommandDecoder::new();
        let mut links = Links::new();
        feed(&mut dec, &mut links, &[0x03, 0x00, 0x00, 0x00]);
        assert_eq!(dec.pending(), None);
        assert_eq!(dec.rejected(), 1);
        assert!(dec.is_idle());
        assert!(dec.outputs().in_ready);
    }

    #[test]
    fn test_write_payload_respects_link_room() {
        let mut dec = CommandDecoder::new();
        let mut links = Links::new();
        let header = CommandHeader::write_result(AccelId::Aes, Address24::truncate(0));
        feed(&mut dec, &mut links, &header.encode());
        dec.accept();

        let mut sent = 0u8;
        for _ in 0..crate::link::LINK_DEPTH + 3 {
            dec.update(&links);
            if dec.outputs().in_ready {
                dec.clock(true, sent, false, &mut links);
                sent += 1;
            }
        }
        assert_eq!(sent as usize, crate::link::LINK_DEPTH);
        assert!(!dec.outputs().in_ready);
        assert_eq!(links.to_flash.pop(), Some(0));
        dec.update(&links);
        assert!(dec.outputs().in_ready);
    }

    #[test]
    fn test_read_payload_to_host() {
        let mut dec = CommandDecoder::new();
        let mut links = Links::new();
        let header = CommandHeader::read_text(AccelId::Aes, Address24::truncate(0));
        feed(&mut dec, &mut links, &header.encode());
        dec.accept();

        let mut received = std::vec::Vec::new();
        let mut next = 0u8;
        while !dec.payload_done() {
            if links.from_flash.ready() && next < 16 {
                links.from_flash.push(next);
                next += 1;
            }
            dec.update(&links);
            let out = dec.outputs();
            if out.out_valid {
                received.push(out.out_data);
            }
            dec.clock(false, 0, true, &mut links);
        }
        assert_eq!(received, (0..16).collect::<std::vec::Vec<u8>>());

        dec.update(&links);
        assert!(!dec.outputs().in_ready);
        dec.release();
        dec.update(&links);
        assert!(dec.outputs().in_ready);
    }
}
