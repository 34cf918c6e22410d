use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Holds a pipeline's in-flight flag until released or dropped.
#[derive(Debug)]
pub struct FlightGuard {
    flag: Arc<AtomicBool>,
    released: bool,
}

impl FlightGuard {
    /// Returns `None` while another holder exists.
    pub fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        Some(Self {
            flag: Arc::clone(flag),
            released: false,
        })
    }

    pub fn release(&mut self) {
        if !self.released {
            self.flag.store(false, Ordering::SeqCst);
            self.released = true;
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.release();
    }
}
