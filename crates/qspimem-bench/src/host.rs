//! Bus-functional models for the host and ack buses
//!
//! Both follow the valid/ready contract from the peer's side: a byte moves
//! when the controller's registered ready (or valid) from the previous
//! cycle meets this cycle's valid (or ready). Once the host raises
//! `in_valid` it holds it and the data until the byte is taken.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Host side of the command bus
#[derive(Debug, Default)]
pub(crate) struct HostDriver {
    in_valid: bool,
    in_data: u8,
    out_ready: bool,
}

impl HostDriver {
    /// Drop both handshakes
    pub(crate) fn quiesce(&mut self) {
        *self = Self::default();
    }

    /// Pick this cycle's inbound drive for `next`, keeping a raised valid
    pub(crate) fn offer(&mut self, next: Option<u8>, prob: f64, rng: &mut ChaCha8Rng) -> (bool, u8) {
        match next {
            None => {
                self.in_valid = false;
                self.in_data = 0;
            }
            Some(byte) => {
                if !self.in_valid {
                    self.in_valid = rng.gen_bool(prob);
                }
                self.in_data = if self.in_valid { byte } else { 0 };
            }
        }
        (self.in_valid, self.in_data)
    }

    /// Whether the byte on offer moves this cycle, given the controller's
    /// registered `in_ready`
    pub(crate) fn inbound_fires(&mut self, in_ready: bool) -> bool {
        let fired = self.in_valid && in_ready;
        if fired {
            self.in_valid = false;
        }
        fired
    }

    /// Pick this cycle's `out_ready`
    pub(crate) fn accept(&mut self, wanted: bool, prob: f64, rng: &mut ChaCha8Rng) -> bool {
        self.out_ready = wanted && rng.gen_bool(prob);
        self.out_ready
    }
}

/// Ack bus owner that grants a fixed number of cycles after a request shows up
#[derive(Debug)]
pub(crate) struct Granter {
    latency: u32,
    waited: u32,
}

impl Granter {
    pub(crate) fn new(latency: u32) -> Self {
        Self { latency, waited: 0 }
    }

    /// Drive `owned` for this cycle given the registered request
    pub(crate) fn poll(&mut self, request: bool) -> bool {
        if !request {
            self.waited = 0;
            return false;
        }
        if self.waited >= self.latency {
            self.waited = 0;
            return true;
        }
        self.waited += 1;
        false
    }

    pub(crate) fn reset(&mut self) {
        self.waited = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_valid_held_until_taken() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut host = HostDriver::default();

        assert_eq!(host.offer(Some(0xAB), 1.0, &mut rng), (true, 0xAB));
        assert!(!host.inbound_fires(false));
        // Low probability must not drop a valid already raised
        assert_eq!(host.offer(Some(0xAB), f64::MIN_POSITIVE, &mut rng), (true, 0xAB));
        assert!(host.inbound_fires(true));
        assert_eq!(host.offer(None, 1.0, &mut rng), (false, 0));
    }

    #[test]
    fn test_granter_latency() {
        let mut granter = Granter::new(2);
        assert!(!granter.poll(false));
        assert!(!granter.poll(true));
        assert!(!granter.poll(true));
        assert!(granter.poll(true));
        assert!(!granter.poll(false));

        let mut immediate = Granter::new(0);
        assert!(immediate.poll(true));
    }
}
