//! Human-readable byte counts for boot diagnostics.

use core::fmt;

/// `1 KiB`
pub const KIB: u64 = 1 << 10;
/// `1 MiB`
pub const MIB: u64 = 1 << 20;
/// `1 GiB`
pub const GIB: u64 = 1 << 30;
/// `1 TiB`
pub const TIB: u64 = 1 << 40;

/// Byte count that pretty-prints with a binary unit, e.g. `1.50 MiB`.
///
/// Formatting is integer-only (two truncated decimals) so it is usable
/// before any floating point state is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, suffix) = match self.0 {
            0..KIB => return write!(f, "{} B", self.0),
            KIB..MIB => (KIB, "KiB"),
            MIB..GIB => (MIB, "MiB"),
            GIB..TIB => (GIB, "GiB"),
            _ => (TIB, "TiB"),
        };

        let whole = self.0 / unit;
        let hundredths = (self.0 % unit) * 100 / unit;
        write!(f, "{whole}.{hundredths:02} {suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_largest_fitting_unit() {
        assert_eq!(ByteSize(0).to_string(), "0 B");
        assert_eq!(ByteSize(1023).to_string(), "1023 B");
        assert_eq!(ByteSize(KIB).to_string(), "1.00 KiB");
        assert_eq!(ByteSize(0x9000).to_string(), "36.00 KiB");
        assert_eq!(ByteSize(MIB + MIB / 2).to_string(), "1.50 MiB");
        assert_eq!(ByteSize(4 * GIB).to_string(), "4.00 GiB");
        assert_eq!(ByteSize(3 * TIB).to_string(), "3.00 TiB");
    }

    #[test]
    fn truncates_instead_of_rounding() {
        // 1 KiB + 1023 B = 1.999.. KiB
        assert_eq!(ByteSize(2 * KIB - 1).to_string(), "1.99 KiB");
    }
}
