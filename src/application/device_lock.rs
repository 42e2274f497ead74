//! Process-wide exclusive access to the audio devices

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static INPUT: OnceLock<DeviceLock> = OnceLock::new();
static OUTPUT: OnceLock<DeviceLock> = OnceLock::new();

/// Guards one device. At most one [`DeviceLease`] exists per lock.
#[derive(Debug, Clone, Default)]
pub struct DeviceLock {
    held: Arc<AtomicBool>,
}

impl DeviceLock {
    /// A private lock, independent of the process-wide ones
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide capture device lock
    pub fn input() -> Self {
        INPUT.get_or_init(DeviceLock::new).clone()
    }

    /// The process-wide playback device lock
    pub fn output() -> Self {
        OUTPUT.get_or_init(DeviceLock::new).clone()
    }

    /// Take the lease, or `None` if it is held elsewhere
    pub fn try_acquire(&self) -> Option<DeviceLease> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DeviceLease {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Exclusive right to a device, released on drop
#[derive(Debug)]
pub struct DeviceLease {
    held: Arc<AtomicBool>,
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let lock = DeviceLock::new();
        let lease = lock.try_acquire();
        assert!(lease.is_some());
        assert!(lock.is_held());
        assert!(lock.try_acquire().is_none());
    }

    #[test]
    fn drop_releases() {
        let lock = DeviceLock::new();
        let lease = lock.try_acquire().unwrap();
        drop(lease);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn clones_share_the_lease() {
        let lock = DeviceLock::new();
        let other = lock.clone();
        let _lease = lock.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[test]
    fn private_locks_are_independent() {
        let a = DeviceLock::new();
        let b = DeviceLock::new();
        let _lease = a.try_acquire().unwrap();
        assert!(b.try_acquire().is_some());
    }

    #[test]
    fn process_wide_locks_are_shared() {
        let first = DeviceLock::input();
        let second = DeviceLock::input();
        assert!(Arc::ptr_eq(&first.held, &second.held));
        assert!(!Arc::ptr_eq(&first.held, &DeviceLock::output().held));
    }
}
