use std::fmt;

use serde::{Deserialize, Serialize};

/// Step of the authoritative simulation clock.
///
/// `Tick(0)` is reserved as the invalid sentinel: an empty command slot reads
/// back as an invalid tick, which the server treats as "nothing issued".
/// Comparisons go through [`Tick::diff`] so the counter may wrap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tick(pub u32);

impl Tick {
    pub const INVALID: Tick = Tick(0);
    pub const FIRST: Tick = Tick(1);

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The following tick, skipping the invalid sentinel on wrap-around.
    pub fn next(self) -> Tick {
        match self.0.wrapping_add(1) {
            0 => Tick::FIRST,
            value => Tick(value),
        }
    }

    /// Signed number of steps from `other` to `self`. The invalid sentinel is
    /// skipped on wrap-around, matching [`Tick::next`].
    pub fn diff(self, other: Tick) -> i64 {
        let raw = i64::from(self.0.wrapping_sub(other.0) as i32);
        if !self.is_valid() || !other.is_valid() {
            return raw;
        }
        if raw > 0 && self.0 < other.0 {
            raw - 1
        } else if raw < 0 && self.0 > other.0 {
            raw + 1
        } else {
            raw
        }
    }

    pub fn is_newer_than(self, other: Tick) -> bool {
        self.diff(other) > 0
    }

    /// The tick `steps` calls of [`Tick::next`] away.
    pub fn advanced_by(self, steps: u32) -> Tick {
        if steps == 0 {
            return self;
        }
        let valid = u64::from(u32::MAX);
        let value = (u64::from(self.0) + u64::from(steps) - 1) % valid + 1;
        Tick(value as u32)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}
