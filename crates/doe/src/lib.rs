/*!
Sampling utilities shared by the prefbo crates.

This library provides:
* a [`SamplingMethod`] trait and its [uniform random](crate::random::Random) implementation
  used to draw designs within a box `xlimits`, a 2D ndarray `(nx, 2)` holding the lower
  and upper bounds of each of the `nx` components,
* a [process-wide random generator](crate::rng) with a scoped reseeding guard
  which lets seeded draws be reproducible without disturbing unseeded callers.

Example:
```
use prefbo_doe::{Random, SamplingMethod, SeededRngScope};
use ndarray::arr2;
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

// Design space is defined as [5., 10.] x [0., 1.], samples are 2-dimensional.
let xlimits = arr2(&[[5., 10.], [0., 1.]]);
let samples = Random::new(&xlimits).with_rng(Xoshiro256Plus::seed_from_u64(42)).sample(5);
assert_eq!(samples.dim(), (5, 2));

// Draws made in a seeded scope are reproducible
let a: f64 = SeededRngScope::new(7).gen();
let b: f64 = SeededRngScope::new(7).gen();
assert_eq!(a, b);
```
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod random;
pub mod rng;
mod traits;

pub use random::*;
pub use rng::{global_rng, seed_global_rng, with_global_rng, SeededRngScope};
pub use traits::*;
