use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;

thread_local! {
    /// Gates the current thread is delivering through, by address
    static ENTERED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct GateState {
    closed: bool,
    active: usize,
}

/// Admission control for notification delivery and engine calls.
///
/// Each delivery or call holds a [`GateGuard`] for its whole duration. Once
/// [`DispatchGate::close`] returns, no guard is outstanding on any other
/// thread and no new guard can be obtained.
pub struct DispatchGate {
    state: Mutex<GateState>,
    drained: Condvar,
}

impl DispatchGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                closed: false,
                active: 0,
            }),
            drained: Condvar::new(),
        }
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Enter the gate, or `None` if it has been closed
    pub fn enter(&self) -> Option<GateGuard<'_>> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.active += 1;
        drop(state);

        ENTERED.with(|entered| entered.borrow_mut().push(self.key()));
        Some(GateGuard { gate: self })
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the gate and wait for deliveries on other threads to finish.
    ///
    /// Deliveries the calling thread is itself inside of are not waited for.
    pub fn close(&self) {
        let own = ENTERED.with(|entered| {
            entered
                .borrow()
                .iter()
                .filter(|key| **key == self.key())
                .count()
        });

        let mut state = self.state.lock();
        state.closed = true;
        while state.active > own {
            self.drained.wait(&mut state);
        }
    }
}

impl Default for DispatchGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of an in-progress delivery; leaves the gate when dropped
pub struct GateGuard<'a> {
    gate: &'a DispatchGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let key = self.gate.key();
        ENTERED.with(|entered| {
            let mut entered = entered.borrow_mut();
            if let Some(index) = entered.iter().rposition(|k| *k == key) {
                entered.remove(index);
            }
        });

        let mut state = self.gate.state.lock();
        state.active -= 1;
        if state.active == 0 || state.closed {
            self.gate.drained.notify_all();
        }
    }
}
