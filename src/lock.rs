//! Lazily initialized state behind a non-poisoning lock.
//!
//! Every piece of shared state in a [`Diagnostics`](crate::Diagnostics) lives
//! in a [`StateLock`]. The lock starts out empty so that it can be built in a
//! `const` context, and the contained value is created on first write.
//!
//! `spin` locks are used instead of `std::sync` because they never poison: a
//! thread that panicked while registering diagnostic data must not prevent
//! the failure report that usually follows.

#[repr(transparent)]
pub(crate) struct StateLock<T: Send + Sync>(spin::RwLock<Option<T>>);

#[repr(transparent)]
pub(crate) struct StateReadGuard<'a, T: Send + Sync>(spin::RwLockReadGuard<'a, Option<T>>);

#[repr(transparent)]
pub(crate) struct StateWriteGuard<'a, T: Send + Sync>(spin::RwLockWriteGuard<'a, Option<T>>);

impl<T: Send + Sync> StateLock<T> {
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self(spin::RwLock::new(None))
    }

    #[inline]
    pub(crate) fn read(&self) -> StateReadGuard<'_, T> {
        StateReadGuard(self.0.read())
    }

    #[inline]
    pub(crate) fn write(&self) -> StateWriteGuard<'_, T> {
        StateWriteGuard(self.0.write())
    }

    /// Like [`StateLock::write`], but returns `None` instead of spinning
    /// while the lock is held.
    #[inline]
    pub(crate) fn try_write(&self) -> Option<StateWriteGuard<'_, T>> {
        self.0.try_write().map(StateWriteGuard)
    }
}

impl<T: Send + Sync> StateReadGuard<'_, T> {
    #[inline]
    pub(crate) fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }
}

impl<T: Send + Sync> StateWriteGuard<'_, T> {
    #[inline]
    pub(crate) fn get(&mut self) -> &mut Option<T> {
        &mut self.0
    }

    /// Returns the contained value, creating it with `init` if the lock is
    /// still empty.
    #[inline]
    pub(crate) fn get_or_insert_with(&mut self, init: impl FnOnce() -> T) -> &mut T {
        self.0.get_or_insert_with(init)
    }
}
