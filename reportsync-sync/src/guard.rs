use std::sync::atomic::{AtomicBool, Ordering};

/// At-most-one guard for sync passes.
///
/// Acquisition never waits: a second caller gets `None` and is expected to
/// return immediately. The flag is cleared when the [`FlightGuard`] drops,
/// which also covers panics and cancelled futures.
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<FlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flight: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}
