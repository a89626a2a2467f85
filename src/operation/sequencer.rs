use parking_lot::{Condvar, Mutex};

struct Counters {
    issued: u64,
    serving: u64,
}

/// First-in first-out turns for work submitted from different threads.
///
/// A ticket is drawn when work is accepted and the work waits for its turn
/// before touching shared resources, so units run one at a time in the order
/// they were accepted regardless of which pool thread picks them up.
pub struct Sequencer {
    counters: Mutex<Counters>,
    advanced: Condvar,
}

/// Position in a [`Sequencer`] queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Sequencer {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters {
                issued: 0,
                serving: 0,
            }),
            advanced: Condvar::new(),
        }
    }

    /// Draw the next ticket. Every ticket must be redeemed with
    /// [`Sequencer::wait_turn`] or later tickets wait forever.
    pub fn ticket(&self) -> Ticket {
        let mut counters = self.counters.lock();
        let ticket = Ticket(counters.issued);
        counters.issued += 1;
        ticket
    }

    /// Block until every earlier ticket has finished its turn
    pub fn wait_turn(&self, ticket: Ticket) -> Turn<'_> {
        let mut counters = self.counters.lock();
        while counters.serving != ticket.0 {
            self.advanced.wait(&mut counters);
        }
        Turn { sequencer: self }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// The current holder's turn; the next ticket is served when dropped
pub struct Turn<'a> {
    sequencer: &'a Sequencer,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut counters = self.sequencer.counters.lock();
        counters.serving += 1;
        self.sequencer.advanced.notify_all();
    }
}
