//! Process-wide random generator.
//!
//! Unseeded random draws of the prefbo crates come from a single `Xoshiro256Plus`
//! generator shared by the whole process and seeded from entropy on first use.
//! A seeded draw goes through a [`SeededRngScope`]: it takes the generator lock,
//! saves the current state, reseeds, and puts the saved state back when dropped.
//! The lock is held from save to restore, so concurrent unseeded users neither
//! observe the temporary seed nor have their draws lost.

use ndarray_rand::rand::{Error, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

static GLOBAL_RNG: OnceLock<Mutex<Xoshiro256Plus>> = OnceLock::new();

/// Lock and return the process-wide generator
///
/// The lock is released when the returned guard is dropped: do not keep it
/// while calling code which may itself draw from the process-wide generator.
pub fn global_rng() -> MutexGuard<'static, Xoshiro256Plus> {
    GLOBAL_RNG
        .get_or_init(|| Mutex::new(Xoshiro256Plus::from_entropy()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Reseed the process-wide generator
pub fn seed_global_rng(seed: u64) {
    *global_rng() = Xoshiro256Plus::seed_from_u64(seed);
}

/// Run `f` with a generator: a [`SeededRngScope`] when `seed` is given,
/// the process-wide generator otherwise.
pub fn with_global_rng<T>(seed: Option<u64>, f: impl FnOnce(&mut Xoshiro256Plus) -> T) -> T {
    match seed {
        Some(seed) => f(&mut SeededRngScope::new(seed)),
        None => f(&mut global_rng()),
    }
}

/// Temporarily reseeded process-wide generator
///
/// The previous generator state is restored on drop, including during unwinding.
pub struct SeededRngScope {
    guard: MutexGuard<'static, Xoshiro256Plus>,
    saved: Option<Xoshiro256Plus>,
}

impl SeededRngScope {
    /// Lock the process-wide generator, save its state and reseed it with `seed`
    pub fn new(seed: u64) -> Self {
        let mut guard = global_rng();
        let saved = guard.clone();
        *guard = Xoshiro256Plus::seed_from_u64(seed);
        SeededRngScope {
            guard,
            saved: Some(saved),
        }
    }
}

impl Drop for SeededRngScope {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.guard = saved;
        }
    }
}

impl Deref for SeededRngScope {
    type Target = Xoshiro256Plus;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SeededRngScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl RngCore for SeededRngScope {
    fn next_u32(&mut self) -> u32 {
        self.guard.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.guard.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.guard.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.guard.try_fill_bytes(dest)
    }
}
