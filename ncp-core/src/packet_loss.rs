use rand_core::Rng;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Fraction of echo requests that never come back.
///
/// Thresholds are given as percentages (`"5%"`, the way `ping` reports
/// loss) and simulated links drop packets at this rate.
///
/// ```
/// use ncp_core::PacketLoss;
///
/// let lossy = PacketLoss::rate(0.05).unwrap();
/// assert_eq!(lossy.to_string(), "5%");
/// assert_eq!(lossy.percent(), 5.0);
/// assert_eq!("5%".parse::<PacketLoss>().unwrap(), lossy);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct PacketLoss(f64);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PacketLossError {
    #[error("packet loss must be within [0%, 100%], got {percent}%")]
    OutOfRange { percent: f64 },
    #[error("packet loss `{0}' is missing its `%' suffix")]
    MissingPercent(String),
    #[error("packet loss `{0}' is not a number")]
    InvalidNumber(String),
}

impl PacketLoss {
    pub const NONE: Self = Self(0.0);

    /// Every packet is dropped: the destination is unreachable.
    pub const TOTAL: Self = Self(1.0);

    /// Loss given as a fraction of the requests, in `[0.0, 1.0]`.
    ///
    /// # Errors
    ///
    /// Fails for values outside of the range, NaN included.
    pub fn rate(rate: f64) -> Result<Self, PacketLossError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(PacketLossError::OutOfRange {
                percent: rate * 100.0,
            });
        }
        Ok(Self(rate))
    }

    /// Loss given as a percentage, in `[0.0, 100.0]`.
    pub fn from_percent(percent: f64) -> Result<Self, PacketLossError> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(PacketLossError::OutOfRange { percent });
        }
        Ok(Self(percent / 100.0))
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    pub fn percent(self) -> f64 {
        self.0 * 100.0
    }

    pub fn is_total(self) -> bool {
        self.0 >= 1.0
    }

    /// Draw whether one packet is lost.
    ///
    /// The caller owns the random source: a seeded generator replays the
    /// exact same drops.
    pub fn should_drop<R: Rng>(self, rng: &mut R) -> bool {
        if self.0 <= 0.0 {
            return false;
        }
        if self.is_total() {
            return true;
        }
        // 53 random bits, uniform in [0, 1)
        let sample = (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        sample < self.0
    }
}

impl fmt::Display for PacketLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percent = self.percent();
        if percent.fract() == 0.0 {
            write!(f, "{percent:.0}%")
        } else {
            write!(f, "{percent:.2}%")
        }
    }
}

impl FromStr for PacketLoss {
    type Err = PacketLossError;

    /// `"0%"`, `"5%"`, `"12.5 %"`, `"100%"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let number = s
            .strip_suffix('%')
            .ok_or_else(|| PacketLossError::MissingPercent(s.to_owned()))?;
        let percent = number
            .trim()
            .parse()
            .map_err(|_| PacketLossError::InvalidNumber(s.to_owned()))?;
        Self::from_percent(percent)
    }
}
