//! Ratio arithmetic for turning raw second counts into other units.
//!
//! This is not a calendar or an absolute time library. Values handled here are
//! always relative: the distance between two samples of the same time source.

/// A rational scale factor `num / den` relative to one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    num: u64,
    den: u64,
}

const fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl Ratio {
    /// Creates a ratio reduced to lowest terms.
    ///
    /// # Panics
    /// If `den` is zero.
    pub const fn new(num: u64, den: u64) -> Ratio {
        assert!(den != 0, "ratio denominator must not be zero");
        let g = gcd(num, den);
        Ratio {
            num: num / g,
            den: den / g,
        }
    }

    pub const fn num(&self) -> u64 {
        self.num
    }

    pub const fn den(&self) -> u64 {
        self.den
    }

    /// Number of `self` units contained in `seconds` seconds.
    pub fn from_seconds(&self, seconds: f64) -> f64 {
        (seconds * self.den as f64) / self.num as f64
    }

    /// Seconds contained in `value` units of `self`.
    pub fn to_seconds(&self, value: f64) -> f64 {
        (value * self.num as f64) / self.den as f64
    }
}

pub const EXA: Ratio = Ratio::new(1_000_000_000_000_000_000, 1);
pub const PETA: Ratio = Ratio::new(1_000_000_000_000_000, 1);
pub const TERA: Ratio = Ratio::new(1_000_000_000_000, 1);
pub const GIGA: Ratio = Ratio::new(1_000_000_000, 1);
pub const MEGA: Ratio = Ratio::new(1_000_000, 1);
pub const KILO: Ratio = Ratio::new(1_000, 1);
pub const HECTO: Ratio = Ratio::new(100, 1);
pub const DECA: Ratio = Ratio::new(10, 1);
pub const BASE: Ratio = Ratio::new(1, 1);
pub const DECI: Ratio = Ratio::new(1, 10);
pub const CENTI: Ratio = Ratio::new(1, 100);
pub const MILLI: Ratio = Ratio::new(1, 1_000);
pub const MICRO: Ratio = Ratio::new(1, 1_000_000);
pub const NANO: Ratio = Ratio::new(1, 1_000_000_000);
pub const PICO: Ratio = Ratio::new(1, 1_000_000_000_000);
pub const FEMTO: Ratio = Ratio::new(1, 1_000_000_000_000_000);
pub const ATTO: Ratio = Ratio::new(1, 1_000_000_000_000_000_000);

/// SI prefix step used between the sub-second units.
pub const DURATION_RATIO: f64 = 1000.0;

#[inline]
pub fn seconds(s: f64) -> f64 {
    BASE.from_seconds(s)
}

#[inline]
pub fn deciseconds(s: f64) -> f64 {
    DECI.from_seconds(s)
}

#[inline]
pub fn milliseconds(s: f64) -> f64 {
    MILLI.from_seconds(s)
}

#[inline]
pub fn microseconds(s: f64) -> f64 {
    MICRO.from_seconds(s)
}

#[inline]
pub fn nanoseconds(s: f64) -> f64 {
    NANO.from_seconds(s)
}
