#[derive(Clone, Copy, Debug)]
pub(crate) struct Fnv1a64(u64);

impl Fnv1a64 {
    pub(crate) const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;

    pub(crate) fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub(crate) fn new_default() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        let mut h = self.0;
        for &b in bytes {
            h ^= u64::from(b);
            h = h.wrapping_mul(Self::PRIME);
        }
        self.0 = h;
    }

    pub(crate) fn finish(self) -> u64 {
        self.0
    }
}

/// 128-bit content fingerprint built from two independently seeded FNV lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// High lane.
    pub hi: u64,
    /// Low lane.
    pub lo: u64,
}

impl Fingerprint {
    /// Fingerprint an arbitrary byte string.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut a = Fnv1a64::new_default();
        let mut b = Fnv1a64::new(0x9ae1_6a3b_2f90_404f);
        a.write_bytes(bytes);
        b.write_bytes(bytes);
        // Length is folded into the second lane so that prefix collisions diverge.
        b.write_bytes(&(bytes.len() as u64).to_le_bytes());
        Self {
            hi: a.finish(),
            lo: b.finish(),
        }
    }

    /// Quoted strong `ETag` value.
    pub fn etag(self) -> String {
        format!("\"{:016x}{:016x}\"", self.hi, self.lo)
    }
}

/// Round `v` to the nearest multiple of `1 / scale` (`scale = 1000.0` rounds to `0.001`).
///
/// Dividing by the integer scale (instead of multiplying by the step) lands on the same `f64` that
/// parsing the shortest decimal form produces, which keeps encode/decode idempotent.
pub(crate) fn round_scaled(v: f64, scale: f64) -> f64 {
    let r = (v * scale).round() / scale;
    // Normalize negative zero so formatting and equality stay canonical.
    if r == 0.0 { 0.0 } else { r }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
