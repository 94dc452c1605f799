//! Compile-time unit safety for the quantities the restoration loop juggles.
//!
//! Active/reactive power, per-unit quantities, and simulated seconds are
//! newtype-wrapped `f64`s so a generator's `popf_MW` can never be silently
//! added to its `agcAlpha`, and a tick count can never be mistaken for a
//! wall-clock duration. All wrappers are `#[repr(transparent)]` so there is
//! no runtime cost versus a bare `f64`.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Mul<$type> for f64 {
            type Output = $type;
            fn mul(self, rhs: $type) -> Self::Output {
                <$type>::new(self * rhs.0)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.4} {}", self.0, $unit_name)
            }
        }

        impl $type {
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            #[inline]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            #[inline]
            pub fn is_nan(self) -> bool {
                self.0.is_nan()
            }

            #[inline]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            #[inline]
            pub fn clamp(self, min: Self, max: Self) -> Self {
                Self(self.0.clamp(min.0, max.0))
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Active power in megawatts (MW).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megawatts(pub f64);
impl_unit_ops!(Megawatts, "MW");

/// Reactive power in megavars (MVAr).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Megavars(pub f64);
impl_unit_ops!(Megavars, "MVAr");

/// A dimensionless per-unit quantity (voltage, gref/vref setpoints, alpha).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PerUnit(pub f64);
impl_unit_ops!(PerUnit, "pu");

/// Frequency in hertz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Hertz(pub f64);
impl_unit_ops!(Hertz, "Hz");

/// Simulated elapsed time in seconds, measured from the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Seconds(pub f64);
impl_unit_ops!(Seconds, "s");

impl PerUnit {
    /// Convert to MW at the given MVA base.
    #[inline]
    pub fn to_megawatts(self, mva_base: f64) -> Megawatts {
        Megawatts(self.0 * mva_base)
    }
}

impl Megawatts {
    /// Convert to per-unit at the given MVA base.
    #[inline]
    pub fn to_per_unit(self, mva_base: f64) -> PerUnit {
        PerUnit(self.0 / mva_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn megawatts_add() {
        assert_eq!((Megawatts(10.0) + Megawatts(5.0)).value(), 15.0);
    }

    #[test]
    fn per_unit_roundtrip() {
        let mw = Megawatts(50.0);
        let pu = mw.to_per_unit(100.0);
        assert!((pu.value() - 0.5).abs() < 1e-9);
        assert!((pu.to_megawatts(100.0).value() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn display_formats_unit_suffix() {
        assert_eq!(format!("{}", Hertz(59.95)), "59.9500 Hz");
    }
}
