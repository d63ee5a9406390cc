//! Non-blocking object pool for points and scratch buffers.
//!
//! Acquiring never waits: a miss allocates a fresh `T::default()`. Returned
//! objects are reset and pushed back without any validation. The pool only
//! reduces allocation pressure and must never be relied on to carry state.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// Types that can be cleared back to an empty state for reuse.
pub trait Reset {
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}

/// A concurrency-safe free list.
#[derive(Debug, Default)]
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
}

impl<T: Reset + Default> Pool<T> {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Create a pool pre-warmed with `n` default objects.
    pub fn with_capacity(n: usize) -> Self {
        let free = (0..n).map(|_| T::default()).collect();
        Self {
            free: Mutex::new(free),
        }
    }

    /// Borrow an object. The guard returns it to the pool when dropped.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let value = self.free.lock().pop().unwrap_or_default();
        Pooled {
            pool: self,
            value: Some(value),
        }
    }

    /// Number of idle objects currently held.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, mut value: T) {
        value.reset();
        self.free.lock().push(value);
    }
}

/// Scoped borrow of a pooled object.
pub struct Pooled<'a, T: Reset + Default> {
    pool: &'a Pool<T>,
    value: Option<T>,
}

impl<'a, T: Reset + Default> Pooled<'a, T> {
    /// Take the object out of the pool for good.
    pub fn detach(mut self) -> T {
        self.value.take().unwrap_or_default()
    }
}

impl<'a, T: Reset + Default> Deref for Pooled<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `detach` and `drop` take the value, and both consume the guard.
        self.value.as_ref().expect("pooled value present until drop")
    }
}

impl<'a, T: Reset + Default> DerefMut for Pooled<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value present until drop")
    }
}

impl<'a, T: Reset + Default> Drop for Pooled<'a, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    #[test]
    fn test_acquire_on_empty_pool_allocates() {
        let pool: Pool<Vec<u8>> = Pool::new();
        assert!(pool.is_empty());
        {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"cpu usage=1");
        }
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_released_objects_are_reset() {
        let pool: Pool<Point> = Pool::with_capacity(1);
        {
            let mut p = pool.acquire();
            p.set_measurement("cpu");
            p.append_int_field("usage", 3);
            p.set_timestamp(10);
        }
        let p = pool.acquire();
        assert_eq!(*p, Point::new());
    }

    #[test]
    fn test_detach_keeps_value_out_of_pool() {
        let pool: Pool<String> = Pool::with_capacity(2);
        let mut s = pool.acquire().detach();
        s.push_str("kept");
        assert_eq!(pool.len(), 1);
        assert_eq!(s, "kept");
    }

    #[test]
    fn test_pool_is_shared_across_threads() {
        let pool: Pool<Vec<u8>> = Pool::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for i in 0..100u8 {
                        let mut buf = pool.acquire();
                        buf.push(i);
                        assert_eq!(buf.len(), 1);
                    }
                });
            }
        });
        assert!(pool.len() >= 1 && pool.len() <= 4);
    }
}
