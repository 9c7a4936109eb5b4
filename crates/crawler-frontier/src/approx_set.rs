//! Memory-bounded, append-only membership test for normalized URLs.
//!
//! Double-hashing (Kirsch-Mitzenmacher) bloom filter: one SHA-512 digest of
//! the input is split into two halves `h1`/`h2`, both reduced mod the bit
//! count `m`; the `k` probe positions are `(h1 + i*h2) mod m`. False
//! negatives are impossible; false positives occur at rate ~`epsilon`.

use sha2::{Digest, Sha512};

pub struct ApproximateSet {
    bits: Vec<u8>,
    size: u64,
    k: u32,
}

impl ApproximateSet {
    /// `expected_items`: planned insertion count. `epsilon`: target false
    /// positive rate. Derives the number of hash rounds `k` and the bit
    /// array size `m` from the standard optimal-bloom-filter formulas.
    pub fn new(expected_items: u64, epsilon: f64) -> Self {
        assert!(epsilon > 0.0 && epsilon < 1.0, "epsilon must be in (0, 1)");
        let k = (-epsilon.ln() / std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);
        let m_bits = (-(expected_items as f64) * epsilon.ln() / std::f64::consts::LN_2.powi(2))
            .ceil()
            .max(8.0) as u64;
        let byte_len = ((m_bits + 7) / 8) as usize;
        Self {
            bits: vec![0u8; byte_len],
            size: m_bits,
            k,
        }
    }

    /// Adds `s` to the set. Idempotent.
    pub fn add(&mut self, s: &str) {
        let (h1, h2) = self.probe_seeds(s);
        let mut h = h1;
        for _ in 0..self.k {
            self.set_bit(h);
            h = (h + h2) % self.size;
        }
    }

    /// Returns true iff all `k` probe bits are set — i.e. `s` was probably
    /// added before. Never returns false for an item that was actually added.
    pub fn check(&self, s: &str) -> bool {
        let (h1, h2) = self.probe_seeds(s);
        let mut h = h1;
        for _ in 0..self.k {
            if !self.check_bit(h) {
                return false;
            }
            h = (h + h2) % self.size;
        }
        true
    }

    fn probe_seeds(&self, s: &str) -> (u64, u64) {
        let digest = Sha512::digest(s.as_bytes());
        let (first, second) = digest.split_at(32);
        (mod_reduce(first, self.size), mod_reduce(second, self.size))
    }

    fn set_bit(&mut self, b: u64) {
        let idx = (b / 8) as usize;
        let bit = (b % 8) as u8;
        self.bits[idx] |= 1 << bit;
    }

    fn check_bit(&self, b: u64) -> bool {
        let idx = (b / 8) as usize;
        let bit = (b % 8) as u8;
        (self.bits[idx] >> bit) & 1 == 1
    }
}

/// Reduces a big-endian byte string mod `m` via Horner's method — the
/// byte-array equivalent of Python's `int(hex, 16) % m`.
fn mod_reduce(bytes: &[u8], m: u64) -> u64 {
    let mut acc: u64 = 0;
    for &b in bytes {
        acc = (acc % m) * 256 % m;
        acc = (acc + b as u64) % m;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_false_negatives() {
        let mut set = ApproximateSet::new(1000, 0.01);
        let urls: Vec<String> = (0..500).map(|i| format!("http://host/{i}")).collect();
        for u in &urls {
            set.add(u);
        }
        for u in &urls {
            assert!(set.check(u), "false negative for {u}");
        }
    }

    #[test]
    fn absent_items_mostly_check_false() {
        let mut set = ApproximateSet::new(1000, 0.01);
        for i in 0..500 {
            set.add(&format!("http://host/seen/{i}"));
        }
        let mut false_positives = 0;
        let trials = 2000;
        for i in 0..trials {
            if set.check(&format!("http://host/unseen/{i}")) {
                false_positives += 1;
            }
        }
        // epsilon = 0.01 -> expect well under 10% false positives even with
        // a generous margin for a filter sized for only 1000 items.
        assert!(
            (false_positives as f64) < (trials as f64) * 0.1,
            "too many false positives: {false_positives}/{trials}"
        );
    }

    #[test]
    fn add_is_idempotent() {
        let mut set = ApproximateSet::new(100, 0.01);
        set.add("http://host/x");
        set.add("http://host/x");
        assert!(set.check("http://host/x"));
    }
}
