use crate::foundation::error::{MetavisError, MvResult};

/// Number of ticks in one second. One tick is 1/60000 s, which divides the
/// frame periods of 24, 25, 30, 50 and 60 fps exactly and keeps NTSC rates
/// (23.976, 29.97, 59.94) on a rational grid via [`Time`].
pub const TICKS_PER_SECOND: i64 = 60_000;

/// Integer timeline coordinate at 1/60000 s resolution.
///
/// All timeline arithmetic is carried out in ticks; seconds are a derived
/// presentation value.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct Tick(pub i64);

impl Tick {
    /// Zero ticks.
    pub const ZERO: Tick = Tick(0);

    /// Convert whole seconds to ticks.
    pub fn from_secs(secs: i64) -> Tick {
        Tick(secs * TICKS_PER_SECOND)
    }

    /// Convert fractional seconds to the nearest tick.
    pub fn from_secs_f64(secs: f64) -> Tick {
        Tick((secs * TICKS_PER_SECOND as f64).round() as i64)
    }

    /// Convert milliseconds to ticks (exact: 1 ms = 60 ticks).
    pub fn from_millis(ms: i64) -> Tick {
        Tick(ms * (TICKS_PER_SECOND / 1000))
    }

    /// Ticks as fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    /// Saturating addition.
    pub fn saturating_add(self, other: Tick) -> Tick {
        Tick(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    pub fn saturating_sub(self, other: Tick) -> Tick {
        Tick(self.0.saturating_sub(other.0))
    }

    /// Clamp to the non-negative timeline domain.
    pub fn max_zero(self) -> Tick {
        Tick(self.0.max(0))
    }
}

impl std::ops::Add for Tick {
    type Output = Tick;
    fn add(self, rhs: Tick) -> Tick {
        Tick(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Tick {
    type Output = Tick;
    fn sub(self, rhs: Tick) -> Tick {
        Tick(self.0 - rhs.0)
    }
}

/// Exact rational time in seconds, `num/den` with `den > 0`, always reduced.
///
/// Used where tick grids cannot represent a boundary exactly (NTSC frame
/// edges). Addition and subtraction never lose precision; values are totally
/// ordered.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct Time {
    num: i64,
    den: i64,
}

impl Time {
    /// Zero seconds.
    pub const ZERO: Time = Time { num: 0, den: 1 };

    /// Construct a reduced rational time. `den` must be non-zero.
    pub fn new(num: i64, den: i64) -> MvResult<Time> {
        if den == 0 {
            return Err(MetavisError::asset("Time denominator must be non-zero"));
        }
        Ok(Time::reduced(num as i128, den as i128))
    }

    fn reduced(num: i128, den: i128) -> Time {
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd_i128(num.unsigned_abs(), den.unsigned_abs()).max(1);
        Time {
            num: (num / g as i128) as i64,
            den: (den / g as i128) as i64,
        }
    }

    /// Rational numerator.
    pub fn num(self) -> i64 {
        self.num
    }

    /// Rational denominator (always > 0).
    pub fn den(self) -> i64 {
        self.den
    }

    /// Exact conversion from ticks.
    pub fn from_tick(t: Tick) -> Time {
        Time::reduced(t.0 as i128, TICKS_PER_SECOND as i128)
    }

    /// Round to the nearest tick (half away from zero).
    pub fn to_tick_round(self) -> Tick {
        let num = self.num as i128 * TICKS_PER_SECOND as i128;
        let den = self.den as i128;
        let half = den / 2;
        let rounded = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        Tick(rounded as i64)
    }

    /// Fractional seconds (presentation value only).
    pub fn as_secs_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Exact sum.
    pub fn add(self, other: Time) -> Time {
        let num = self.num as i128 * other.den as i128 + other.num as i128 * self.den as i128;
        let den = self.den as i128 * other.den as i128;
        Time::reduced(num, den)
    }

    /// Exact difference.
    pub fn sub(self, other: Time) -> Time {
        let num = self.num as i128 * other.den as i128 - other.num as i128 * self.den as i128;
        let den = self.den as i128 * other.den as i128;
        Time::reduced(num, den)
    }

    /// Exact product with an integer scalar.
    pub fn mul_int(self, k: i64) -> Time {
        Time::reduced(self.num as i128 * k as i128, self.den as i128)
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Time) -> bool {
        self.num as i128 * other.den as i128 == other.num as i128 * self.den as i128
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Time) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Time) -> std::cmp::Ordering {
        let a = self.num as i128 * other.den as i128;
        let b = other.num as i128 * self.den as i128;
        a.cmp(&b)
    }
}

fn gcd_i128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Absolute 0-based frame index in deliverable timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> MvResult<Fps> {
        if num == 0 || den == 0 {
            return Err(MetavisError::asset("Fps num and den must be > 0"));
        }
        Ok(Fps { num, den })
    }

    /// Exact 24 fps.
    pub const FILM: Fps = Fps { num: 24, den: 1 };

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Exact start time of frame `f`.
    pub fn frame_time(self, f: FrameIndex) -> Time {
        // f * den / num seconds, exact.
        Time::reduced(
            f.0 as i128 * self.den as i128,
            self.num as i128,
        )
    }

    /// Start of frame `f` rounded to the nearest tick.
    pub fn frame_tick(self, f: FrameIndex) -> Tick {
        self.frame_time(f).to_tick_round()
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Number of whole frames covering `duration` (ceiling).
    pub fn frames_covering(self, duration: Tick) -> u64 {
        if duration.0 <= 0 {
            return 0;
        }
        let num = duration.0 as i128 * self.num as i128;
        let den = TICKS_PER_SECOND as i128 * self.den as i128;
        div_ceil_i128(num, den) as u64
    }
}

/// Signed integer ceiling division (`i128::div_ceil` is not yet stable).
fn div_ceil_i128(a: i128, b: i128) -> i128 {
    let d = a / b;
    let r = a % b;
    if (r > 0 && b > 0) || (r < 0 && b < 0) {
        d + 1
    } else {
        d
    }
}
