use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashSet;
use log::{debug, trace};

use crate::sim_interface::{EventId, SimError, SimTime};

/// Callback run when an event fires
///
/// The action gets the scheduler back so it can queue follow-up events, plus
/// the state the simulation owns.
pub type Action<S> = Box<dyn FnOnce(&mut Scheduler<S>, &mut S)>;

/// A queued event
///
/// Ordered by `time`, then by `sequence` so that events scheduled for the same
/// instant run in the order they were scheduled.
struct ScheduledEvent<S> {
    time: SimTime,
    sequence: u64,
    action: Action<S>,
}

impl<S> PartialEq for ScheduledEvent<S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<S> Eq for ScheduledEvent<S> {}

impl<S> Ord for ScheduledEvent<S> {
    // Reversed: BinaryHeap is a max-heap and we want the earliest event on top
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.total_cmp(&self.time) {
            Ordering::Equal => {}
            ord => return ord,
        }

        other.sequence.cmp(&self.sequence)
    }
}

impl<S> PartialOrd for ScheduledEvent<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Discrete-event timeline
///
/// Single threaded and run-to-completion: one action executes fully before
/// the next event is popped.
///
/// # Example
/// ```
/// use flow_sim::sim_scheduler::Scheduler;
///
/// let mut scheduler: Scheduler<Vec<&str>> = Scheduler::new();
/// let mut log = Vec::new();
///
/// scheduler.schedule(2.0, |_, log| log.push("late")).unwrap();
/// scheduler.schedule(1.0, |_, log| log.push("early")).unwrap();
///
/// scheduler.run_until(10.0, &mut log).unwrap();
/// assert_eq!(log, vec!["early", "late"]);
/// assert_eq!(scheduler.now(), 2.0);
/// ```
pub struct Scheduler<S> {
    now: SimTime,
    next_sequence: u64,
    queue: BinaryHeap<ScheduledEvent<S>>,

    /// Sequences of events that are queued and not cancelled
    pending: HashSet<u64>,

    executed: u64,
    cancelled: u64,
}

impl<S> Scheduler<S> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_sequence: 0,
            queue: BinaryHeap::new(),
            pending: HashSet::new(),
            executed: 0,
            cancelled: 0,
        }
    }

    /// Current logical time
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Queue `action` to run `delay` seconds from now
    ///
    /// A negative or non-finite delay is rejected and the queue is left as is.
    pub fn schedule<F>(&mut self, delay: SimTime, action: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Scheduler<S>, &mut S) + 'static,
    {
        if !delay.is_finite() || delay < 0.0 {
            return Err(SimError::InvalidDelay { delay });
        }

        Ok(self.push(self.now + delay, Box::new(action)))
    }

    /// Queue `action` at absolute time `time` (must not lie in the past)
    pub fn schedule_at<F>(&mut self, time: SimTime, action: F) -> Result<EventId, SimError>
    where
        F: FnOnce(&mut Scheduler<S>, &mut S) + 'static,
    {
        if !time.is_finite() || time < self.now {
            return Err(SimError::TimeInPast {
                time,
                now: self.now,
            });
        }

        Ok(self.push(time, Box::new(action)))
    }

    fn push(&mut self, time: SimTime, action: Action<S>) -> EventId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.queue.push(ScheduledEvent {
            time,
            sequence,
            action,
        });
        self.pending.insert(sequence);

        trace!("scheduled event {} at {:.6}", sequence, time);
        EventId(sequence)
    }

    /// Mark a pending event inert
    ///
    /// Returns false when the event already ran or was already cancelled.
    /// The entry stays in the heap and is discarded when it reaches the top.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if self.pending.remove(&id.0) {
            self.cancelled += 1;
            trace!("cancelled event {}", id.0);
            true
        } else {
            false
        }
    }

    /// Whether an event is still waiting to run
    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id.0)
    }

    /// Execute events in time order until the queue drains or the next event
    /// lies beyond `stop_time`
    ///
    /// The clock ends at the time of the last executed event. Returns the
    /// number of actions that ran.
    pub fn run_until(&mut self, stop_time: SimTime, state: &mut S) -> Result<u64, SimError> {
        if !stop_time.is_finite() || stop_time < self.now {
            return Err(SimError::TimeInPast {
                time: stop_time,
                now: self.now,
            });
        }

        let mut ran = 0;

        loop {
            match self.queue.peek() {
                Some(next) if next.time <= stop_time => {}
                _ => break,
            }

            let event = match self.queue.pop() {
                Some(event) => event,
                None => break,
            };

            // cancelled events are skipped without touching the clock
            if !self.pending.remove(&event.sequence) {
                continue;
            }

            self.now = event.time;
            (event.action)(self, state);

            self.executed += 1;
            ran += 1;
        }

        debug!(
            "run_until {:.3}: {} events executed, clock at {:.6}, {} pending",
            stop_time,
            ran,
            self.now,
            self.pending.len()
        );

        Ok(ran)
    }

    /// Time of the earliest live event, if any
    pub fn next_event_time(&mut self) -> Option<SimTime> {
        // drop inert entries sitting on top so the answer is exact
        while let Some(top) = self.queue.peek() {
            if self.pending.contains(&top.sequence) {
                return Some(top.time);
            }
            self.queue.pop();
        }
        None
    }

    /// Number of live (not yet run, not cancelled) events
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total actions executed over the scheduler's lifetime
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Total events cancelled before they ran
    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}
