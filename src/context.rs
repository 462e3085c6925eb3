//! The weighted random source shared by every generator and mutation.

use crate::ty::BUILTIN_CLASSES;
use crate::Rng;
use std::collections::BTreeSet;

/// The random context of one campaign.
///
/// A `Context` couples a seeded [`Rng`] with the registry of class names that
/// are already taken, either by the runtime itself (see
/// [`BUILTIN_CLASSES`][crate::ty::BUILTIN_CLASSES]) or by units generated
/// earlier in the campaign.
///
/// Every mutation constructor takes the context by reference; there is no
/// ambient random state, so two campaigns with the same seed make the same
/// choices.
///
/// # Example
///
/// ```
/// use mutandis::Context;
///
/// let mut ctx = Context::new(42);
///
/// // Cumulative thresholds: 1% / 4% / 95%.
/// let bucket = ctx.bucket(&[0.01, 0.05, 1.0]);
/// assert!(bucket < 3);
///
/// assert!(ctx.is_reserved("Object"));
/// assert!(ctx.reserve_name("Test0"));
/// assert!(!ctx.reserve_name("Test0"));
/// ```
#[derive(Clone, Debug)]
pub struct Context {
    rng: Rng,
    reserved: BTreeSet<String>,
}

impl Default for Context {
    fn default() -> Self {
        Self::with_rng(Rng::default())
    }
}

impl Context {
    /// Create a new context whose generator is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self::with_rng(Rng::new(seed))
    }

    fn with_rng(rng: Rng) -> Self {
        Self {
            rng,
            reserved: BUILTIN_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Get this context's random number generator.
    #[inline]
    #[must_use]
    pub fn rng(&mut self) -> &mut Rng {
        &mut self.rng
    }

    /// A draw uniformly distributed in `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen_unit()
    }

    /// A draw uniformly distributed in `0..n`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    #[inline]
    pub fn uint_below(&mut self, n: usize) -> usize {
        match self.rng.gen_index(n) {
            Some(i) => i,
            None => panic!("Context::uint_below called with an empty range"),
        }
    }

    /// Weighted choice over cumulative probabilities.
    ///
    /// `thresholds` must be ascending and end at `1.0`; the result is the index
    /// of the first threshold strictly greater than a uniform draw. So
    /// `[0.1, 1.0]` selects bucket `0` ten percent of the time.
    ///
    /// # Panics
    ///
    /// Panics if `thresholds` is empty.
    pub fn bucket(&mut self, thresholds: &[f64]) -> usize {
        assert!(!thresholds.is_empty(), "bucket thresholds must not be empty");
        debug_assert!(
            thresholds.windows(2).all(|w| w[0] <= w[1]),
            "bucket thresholds must be ascending: {thresholds:?}"
        );

        let draw = self.uniform();
        thresholds
            .iter()
            .position(|&t| draw < t)
            .unwrap_or(thresholds.len() - 1)
    }

    /// Reserve `name` so it is never handed out again.
    ///
    /// Returns `false` if it was already reserved.
    pub fn reserve_name(&mut self, name: impl Into<String>) -> bool {
        self.reserved.insert(name.into())
    }

    /// Whether `name` is taken.
    #[must_use]
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Find the first `base{n}`, counting up from `*counter`, that is not
    /// reserved yet; reserve it and leave `*counter` past it.
    pub(crate) fn fresh_name(&mut self, base: &str, counter: &mut u64) -> String {
        loop {
            let name = format!("{base}{counter}");
            *counter += 1;
            if self.reserve_name(name.clone()) {
                return name;
            }
        }
    }
}
