//! Buffer constraint algebra.
//!
//! A [`ConstraintSet`] describes which buffer sizes and alignments a component
//! can work with. Every bound is optional; a set with no bounds accepts any
//! buffer.
//!
//! # Design
//!
//! | Bound         | Meaning                                     |
//! |---------------|---------------------------------------------|
//! | `at_least`    | minimum buffer size in bytes                |
//! | `at_most`     | maximum buffer size in bytes                |
//! | `multiple_of` | buffer size granularity                     |
//! | `align_to`    | memory alignment of the buffer start        |
//!
//! `multiple_of` and `align_to` are independent axes. A set is always kept
//! feasible: the builder methods re-validate and refuse to produce a set that
//! no size can satisfy.
//!
//! Two combinators exist:
//! - [`ConstraintSet::merge_strong`] intersects two sets and fails when the
//!   intersection is empty.
//! - [`ConstraintSet::merge_weak`] treats the second set as a hint and only
//!   adopts the parts of it that keep the base set feasible.

use std::fmt;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConstraintSet {
    at_least: Option<usize>,
    at_most: Option<usize>,
    multiple_of: Option<usize>,
    align_to: Option<usize>,
}

impl ConstraintSet {
    /// The unconstrained set.
    pub const fn new() -> Self {
        Self {
            at_least: None,
            at_most: None,
            multiple_of: None,
            align_to: None,
        }
    }

    /// Builds a set from all four bounds at once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InconsistentConstraints`] if no buffer size satisfies
    /// the bounds.
    pub fn from_bounds(
        at_least: Option<usize>,
        at_most: Option<usize>,
        multiple_of: Option<usize>,
        align_to: Option<usize>,
    ) -> Result<Self> {
        let set = Self {
            at_least,
            at_most,
            multiple_of,
            align_to,
        };
        set.check()?;
        Ok(set)
    }

    pub fn at_least(&self) -> Option<usize> {
        self.at_least
    }

    pub fn at_most(&self) -> Option<usize> {
        self.at_most
    }

    pub fn multiple_of(&self) -> Option<usize> {
        self.multiple_of
    }

    pub fn align_to(&self) -> Option<usize> {
        self.align_to
    }

    pub fn with_at_least(self, value: usize) -> Result<Self> {
        Self::from_bounds(Some(value), self.at_most, self.multiple_of, self.align_to)
    }

    pub fn with_at_most(self, value: usize) -> Result<Self> {
        Self::from_bounds(self.at_least, Some(value), self.multiple_of, self.align_to)
    }

    pub fn with_multiple_of(self, value: usize) -> Result<Self> {
        Self::from_bounds(self.at_least, self.at_most, Some(value), self.align_to)
    }

    pub fn with_align_to(self, value: usize) -> Result<Self> {
        Self::from_bounds(self.at_least, self.at_most, self.multiple_of, Some(value))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::new()
    }

    /// True if some buffer size satisfies every present bound.
    pub fn is_consistent(&self) -> bool {
        self.check().is_ok()
    }

    fn check(&self) -> Result<()> {
        if self.at_least == Some(0) {
            return Err(Error::InconsistentConstraints("at_least must be positive"));
        }
        if self.multiple_of == Some(0) {
            return Err(Error::InconsistentConstraints("multiple_of must be positive"));
        }
        if self.align_to == Some(0) {
            return Err(Error::InconsistentConstraints("align_to must be positive"));
        }
        if let (Some(l), Some(m)) = (self.at_least, self.at_most) {
            if m < l {
                return Err(Error::InconsistentConstraints("at_most is below at_least"));
            }
        }
        match (self.at_most, self.multiple_of) {
            (Some(m), Some(k)) if m < k => {
                return Err(Error::InconsistentConstraints("at_most is below multiple_of"));
            }
            (Some(0), None) => {
                return Err(Error::InconsistentConstraints("at_most must be positive"));
            }
            _ => {}
        }
        if let (Some(l), Some(m), Some(k)) = (self.at_least, self.at_most, self.multiple_of) {
            match round_up(l, k) {
                Some(first) if first <= m => {}
                _ => {
                    return Err(Error::InconsistentConstraints(
                        "no multiple of multiple_of lies within [at_least, at_most]",
                    ))
                }
            }
        }
        Ok(())
    }

    /// True if `self` is compatible with `other`.
    ///
    /// Each present bound of `self` must lie within the window described by
    /// `other`, and the granularity and alignment of `self` must be multiples
    /// of those of `other` when both sides carry them.
    pub fn satisfies(&self, other: &ConstraintSet) -> bool {
        if let Some(l) = self.at_least {
            if other.at_least.is_some_and(|ol| l < ol) || other.at_most.is_some_and(|om| l > om) {
                return false;
            }
        }
        if let Some(m) = self.at_most {
            if other.at_most.is_some_and(|om| m > om) || other.at_least.is_some_and(|ol| m < ol) {
                return false;
            }
        }
        if let (Some(k), Some(ok)) = (self.multiple_of, other.multiple_of) {
            if k % ok != 0 {
                return false;
            }
        }
        if let (Some(a), Some(oa)) = (self.align_to, other.align_to) {
            if a % oa != 0 {
                return false;
            }
        }
        true
    }

    /// Smallest admissible size, or `None` without an `at_least` bound.
    pub fn min_size(&self) -> Option<usize> {
        let l = self.at_least?;
        match self.multiple_of {
            Some(k) => round_up(l, k),
            None => Some(l),
        }
    }

    /// Largest admissible size, or `None` without an `at_most` bound.
    pub fn max_size(&self) -> Option<usize> {
        let m = self.at_most?;
        Some(match self.multiple_of {
            Some(k) => m / k * k,
            None => m,
        })
    }

    /// Tightest set satisfying both inputs, or `None` if they conflict.
    pub fn merge_strong(&self, other: &ConstraintSet) -> Option<ConstraintSet> {
        let multiple_of = lcm_opt(self.multiple_of, other.multiple_of).ok()?;
        let align_to = lcm_opt(self.align_to, other.align_to).ok()?;
        let merged = ConstraintSet {
            at_least: max_opt(self.at_least, other.at_least),
            at_most: min_opt(self.at_most, other.at_most),
            multiple_of,
            align_to,
        };
        merged.is_consistent().then_some(merged)
    }

    /// Adopts as much of `hint` as `self` allows.
    ///
    /// The granularity is tried first as the lcm of both and falls back to
    /// `self`'s own value when the lcm leaves no admissible size in `self`'s
    /// window. A tighter `at_least` or `at_most` from the hint is adopted only
    /// if the result stays feasible. Alignment is combined independently.
    pub fn merge_weak(&self, hint: &ConstraintSet) -> ConstraintSet {
        let mut out = *self;

        if hint.multiple_of.is_some() {
            if let Ok(Some(k)) = lcm_opt(self.multiple_of, hint.multiple_of) {
                let candidate = ConstraintSet {
                    multiple_of: Some(k),
                    ..out
                };
                if candidate.is_consistent() {
                    out = candidate;
                }
            }
        }

        if let Some(hl) = hint.at_least {
            let tighter = out.at_least.map_or(true, |l| hl > l);
            let in_window = out.at_most.map_or(true, |m| hl <= m);
            let candidate = ConstraintSet {
                at_least: Some(hl),
                ..out
            };
            if tighter && in_window && candidate.is_consistent() {
                out = candidate;
            }
        }

        if let Some(hm) = hint.at_most {
            let tighter = out.at_most.map_or(true, |m| hm < m);
            let in_window = out.at_least.map_or(true, |l| hm >= l);
            let candidate = ConstraintSet {
                at_most: Some(hm),
                ..out
            };
            if tighter && in_window && candidate.is_consistent() {
                out = candidate;
            }
        }

        if let Ok(align_to) = lcm_opt(out.align_to, hint.align_to) {
            out.align_to = align_to;
        }

        out
    }
}

impl fmt::Display for ConstraintSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn field(v: Option<usize>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "{{at_least: {}, at_most: {}, multiple_of: {}, align_to: {}}}",
            field(self.at_least),
            field(self.at_most),
            field(self.multiple_of),
            field(self.align_to)
        )
    }
}

fn round_up(value: usize, multiple: usize) -> Option<usize> {
    value.div_ceil(multiple).checked_mul(multiple)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: usize, b: usize) -> Option<usize> {
    (a / gcd(a, b)).checked_mul(b)
}

/// `Err(())` signals overflow.
fn lcm_opt(a: Option<usize>, b: Option<usize>) -> std::result::Result<Option<usize>, ()> {
    match (a, b) {
        (Some(a), Some(b)) => lcm(a, b).map(Some).ok_or(()),
        (a, None) => Ok(a),
        (None, b) => Ok(b),
    }
}

fn max_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn min_opt(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
