//! The `Slot` and `Epoch` types are defined as new types over u64 to enforce type-safety between
//! the two types.
//!
//! `Slot` and `Epoch` permit conversion, comparison and math operations with `u64` and with
//! themselves, but never with each other. Operator-based math is saturating; the `safe_*` methods
//! return an `ArithError` instead.
use safe_arith::{ArithError, SafeArith};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Rem, Sub, SubAssign};

#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
#[serde(transparent)]
#[ssz(struct_behaviour = "transparent")]
pub struct Slot(u64);

#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
#[serde(transparent)]
#[ssz(struct_behaviour = "transparent")]
pub struct Epoch(u64);

macro_rules! impl_common {
    ($main: ident) => {
        impl $main {
            pub const fn new(n: u64) -> $main {
                $main(n)
            }

            pub const fn max_value() -> $main {
                $main(u64::MAX)
            }

            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            pub fn as_usize(&self) -> usize {
                self.0 as usize
            }

            pub fn saturating_sub<T: Into<$main>>(&self, other: T) -> $main {
                $main(self.0.saturating_sub(other.into().0))
            }

            pub fn saturating_add<T: Into<$main>>(&self, other: T) -> $main {
                $main(self.0.saturating_add(other.into().0))
            }

            pub fn safe_add<T: Into<$main>>(&self, other: T) -> Result<$main, ArithError> {
                self.0.safe_add(other.into().0).map($main)
            }

            pub fn safe_sub<T: Into<$main>>(&self, other: T) -> Result<$main, ArithError> {
                self.0.safe_sub(other.into().0).map($main)
            }

            pub fn safe_rem(&self, modulus: u64) -> Result<$main, ArithError> {
                self.0.safe_rem(modulus).map($main)
            }
        }

        impl From<u64> for $main {
            fn from(n: u64) -> $main {
                $main(n)
            }
        }

        impl From<$main> for u64 {
            fn from(value: $main) -> u64 {
                value.0
            }
        }

        impl PartialEq<u64> for $main {
            fn eq(&self, other: &u64) -> bool {
                self.0 == *other
            }
        }

        impl PartialOrd<u64> for $main {
            fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
                Some(self.0.cmp(other))
            }
        }

        impl fmt::Display for $main {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $main {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", stringify!($main), self.0)
            }
        }
    };
}

macro_rules! impl_math_between {
    ($main: ident, $other: ident) => {
        impl Add<$other> for $main {
            type Output = $main;

            fn add(self, other: $other) -> $main {
                $main(self.0.saturating_add(u64::from(other)))
            }
        }

        impl AddAssign<$other> for $main {
            fn add_assign(&mut self, other: $other) {
                self.0 = self.0.saturating_add(u64::from(other));
            }
        }

        impl Sub<$other> for $main {
            type Output = $main;

            fn sub(self, other: $other) -> $main {
                $main(self.0.saturating_sub(u64::from(other)))
            }
        }

        impl SubAssign<$other> for $main {
            fn sub_assign(&mut self, other: $other) {
                self.0 = self.0.saturating_sub(u64::from(other));
            }
        }

        impl Rem<$other> for $main {
            type Output = $main;

            fn rem(self, modulus: $other) -> $main {
                let modulus = u64::from(modulus);
                // Modulo by zero yields zero rather than panicking.
                $main(self.0.checked_rem(modulus).unwrap_or(0))
            }
        }
    };
}

impl_common!(Slot);
impl_common!(Epoch);
impl_math_between!(Slot, Slot);
impl_math_between!(Slot, u64);
impl_math_between!(Epoch, Epoch);
impl_math_between!(Epoch, u64);

impl Slot {
    /// The epoch which contains this slot.
    pub fn epoch(self, slots_per_epoch: u64) -> Epoch {
        Epoch::new(self.0.checked_div(slots_per_epoch).unwrap_or(0))
    }
}

impl Epoch {
    /// The first slot in the epoch.
    pub fn start_slot(self, slots_per_epoch: u64) -> Slot {
        Slot::new(self.0.saturating_mul(slots_per_epoch))
    }

    /// The last slot in the epoch.
    pub fn end_slot(self, slots_per_epoch: u64) -> Slot {
        Slot::new(
            self.0
                .saturating_mul(slots_per_epoch)
                .saturating_add(slots_per_epoch.saturating_sub(1)),
        )
    }

    /// An iterator over all the slots in this epoch.
    pub fn slot_iter(self, slots_per_epoch: u64) -> impl Iterator<Item = Slot> {
        let start = self.start_slot(slots_per_epoch).as_u64();
        (start..start.saturating_add(slots_per_epoch)).map(Slot::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_to_epoch() {
        assert_eq!(Slot::new(0).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(31).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(32).epoch(32), Epoch::new(1));
        assert_eq!(Slot::new(95).epoch(8), Epoch::new(11));
        assert_eq!(Slot::new(7).epoch(0), Epoch::new(0), "zero divisor");
    }

    #[test]
    fn epoch_boundaries() {
        assert_eq!(Epoch::new(0).start_slot(8), Slot::new(0));
        assert_eq!(Epoch::new(3).start_slot(8), Slot::new(24));
        assert_eq!(Epoch::new(3).end_slot(8), Slot::new(31));
        assert_eq!(
            Epoch::new(2).slot_iter(4).collect::<Vec<_>>(),
            vec![Slot::new(8), Slot::new(9), Slot::new(10), Slot::new(11)]
        );
    }

    #[test]
    fn operators_saturate() {
        assert_eq!(Slot::new(1) - 5, Slot::new(0));
        assert_eq!(Slot::max_value() + 1, Slot::max_value());
        assert_eq!(Epoch::new(3) + Epoch::new(4), Epoch::new(7));

        let mut epoch = Epoch::new(1);
        epoch -= 2;
        assert_eq!(epoch, 0);
        epoch += 9;
        assert_eq!(epoch, 9);

        assert_eq!(Slot::new(10) % 4, Slot::new(2));
        assert_eq!(Slot::new(10) % 0, Slot::new(0));
    }

    #[test]
    fn safe_arith_reports_overflow() {
        assert_eq!(Slot::new(1).safe_add(2u64), Ok(Slot::new(3)));
        assert_eq!(Slot::new(1).safe_sub(2u64), Err(ArithError::Overflow));
        assert_eq!(Epoch::max_value().safe_add(1u64), Err(ArithError::Overflow));
        assert_eq!(Slot::new(9).safe_rem(0), Err(ArithError::DivisionByZero));
    }

    #[test]
    fn comparisons_with_u64() {
        assert!(Slot::new(5) > 4);
        assert!(Epoch::new(5) == 5);
        assert_eq!(u64::from(Epoch::new(12)), 12);
    }
}
