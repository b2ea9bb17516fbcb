//! Per-key refresh state machine
//!
//! ```text
//!            request                timer fired             fetch completed
//!   Idle ───────────────> Pending ───────────────> Executing ───────────────> Idle
//!                          │  ^                      │                          │
//!                 request: │  │ queued batch         │ request:                 │
//!                 merge    └──┘ re-opens window <────┤ join in-flight batch or  │
//!                                                    │ queue a follow-up batch  │
//! ```
//!
//! Messages are `on_request`, `on_timer_fired` and `on_fetch_completed`. The
//! machine holds no timers and does no I/O; the coordinator arms the timer
//! and runs the fetch. It is generic over the waiter type so the transitions
//! can be tested without a runtime.
//!
//! Rules while *executing*:
//! - a non-forced request whose layers are all covered by the in-flight batch
//!   joins it and receives its outcome (no new fetch)
//! - any other request is queued; the queued batch becomes a new debounce
//!   window as soon as the current execution completes, so two executions for
//!   one key never overlap
//! - a queued forced batch fetches unconditionally; a queued non-forced batch
//!   re-checks expiry first

use crate::state::LayerSet;

/// What a caller asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOptions {
    pub layers: LayerSet,
    /// Fetch even if the layers are still fresh
    pub force: bool,
    /// Do not flip `is_refreshing` on the snapshot
    pub silent: bool,
    /// Provenance tag carried into the state-changed event
    pub reason: Option<String>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            layers: LayerSet::BASIC_AND_STATUS,
            force: false,
            silent: false,
            reason: None,
        }
    }
}

impl RefreshOptions {
    pub fn new(layers: impl Into<LayerSet>) -> Self {
        Self {
            layers: layers.into(),
            ..Default::default()
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Accumulated requests for one key
#[derive(Debug)]
pub struct PendingRefresh<W> {
    pub layers: LayerSet,
    pub force: bool,
    pub silent: bool,
    pub reason: Option<String>,
    pub waiters: Vec<W>,
}

impl<W> PendingRefresh<W> {
    fn new(options: RefreshOptions, waiter: W) -> Self {
        Self {
            layers: options.layers,
            force: options.force,
            silent: options.silent,
            reason: options.reason,
            waiters: vec![waiter],
        }
    }

    /// Union layers, any-force, all-silent, first reason wins
    fn merge(&mut self, options: RefreshOptions, waiter: W) {
        self.layers = self.layers.union(options.layers);
        self.force |= options.force;
        self.silent &= options.silent;
        if self.reason.is_none() {
            self.reason = options.reason;
        }
        self.waiters.push(waiter);
    }

    fn merge_or_create(slot: &mut Option<Self>, options: RefreshOptions, waiter: W) {
        match slot {
            Some(pending) => pending.merge(options, waiter),
            None => *slot = Some(Self::new(options, waiter)),
        }
    }
}

/// The batch handed to the executor when the window closes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub layers: LayerSet,
    pub force: bool,
    pub silent: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending,
    Executing,
}

/// How a request was absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A new window opened; the caller must arm the timer
    OpenedWindow,
    /// Merged into the open window
    MergedIntoWindow,
    /// Attached to the in-flight batch
    JoinedInFlight,
    /// Held until the in-flight batch finishes
    QueuedBehindExecution,
}

/// Result of `on_fetch_completed`
#[derive(Debug)]
pub struct Completion<W> {
    /// Callers to resolve with the execution's outcome
    pub waiters: Vec<W>,
    /// A queued batch opened a new window; the timer must be re-armed
    pub reopened: bool,
}

#[derive(Debug)]
pub struct RefreshMachine<W> {
    phase: Phase,
    pending: Option<PendingRefresh<W>>,
    in_flight: Option<(LayerSet, Vec<W>)>,
    queued: Option<PendingRefresh<W>>,
}

impl<W> Default for RefreshMachine<W> {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            pending: None,
            in_flight: None,
            queued: None,
        }
    }
}

impl<W> RefreshMachine<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Layers accumulated in the open window, if any
    pub fn pending_layers(&self) -> Option<LayerSet> {
        self.pending.as_ref().map(|p| p.layers)
    }

    pub fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    pub fn on_request(&mut self, options: RefreshOptions, waiter: W) -> RequestOutcome {
        match self.phase {
            Phase::Idle => {
                self.pending = Some(PendingRefresh::new(options, waiter));
                self.phase = Phase::Pending;
                RequestOutcome::OpenedWindow
            }
            Phase::Pending => {
                PendingRefresh::merge_or_create(&mut self.pending, options, waiter);
                RequestOutcome::MergedIntoWindow
            }
            Phase::Executing => match &mut self.in_flight {
                Some((layers, waiters))
                    if !options.force && layers.intersection(options.layers) == options.layers =>
                {
                    waiters.push(waiter);
                    RequestOutcome::JoinedInFlight
                }
                _ => {
                    PendingRefresh::merge_or_create(&mut self.queued, options, waiter);
                    RequestOutcome::QueuedBehindExecution
                }
            },
        }
    }

    /// Close the window. Returns `None` if no window was open.
    pub fn on_timer_fired(&mut self) -> Option<ExecutionPlan> {
        if self.phase != Phase::Pending {
            return None;
        }
        let pending = self.pending.take()?;
        self.phase = Phase::Executing;
        self.in_flight = Some((pending.layers, pending.waiters));
        Some(ExecutionPlan {
            layers: pending.layers,
            force: pending.force,
            silent: pending.silent,
            reason: pending.reason,
        })
    }

    pub fn on_fetch_completed(&mut self) -> Completion<W> {
        let waiters = self
            .in_flight
            .take()
            .map(|(_, waiters)| waiters)
            .unwrap_or_default();

        match self.queued.take() {
            Some(queued) => {
                self.pending = Some(queued);
                self.phase = Phase::Pending;
                Completion {
                    waiters,
                    reopened: true,
                }
            }
            None => {
                self.phase = Phase::Idle;
                Completion {
                    waiters,
                    reopened: false,
                }
            }
        }
    }

    /// Reset to idle and hand back every outstanding waiter
    pub fn drain(&mut self) -> Vec<W> {
        let mut waiters = Vec::new();
        if let Some(pending) = self.pending.take() {
            waiters.extend(pending.waiters);
        }
        if let Some((_, in_flight)) = self.in_flight.take() {
            waiters.extend(in_flight);
        }
        if let Some(queued) = self.queued.take() {
            waiters.extend(queued.waiters);
        }
        self.phase = Phase::Idle;
        waiters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Layer;

    fn opts(layers: &[Layer]) -> RefreshOptions {
        RefreshOptions::new(layers)
    }

    #[test]
    fn test_requests_merge_while_pending() {
        let mut machine = RefreshMachine::new();
        assert_eq!(
            machine.on_request(opts(&[Layer::Basic]).reason("first"), 1),
            RequestOutcome::OpenedWindow
        );
        assert_eq!(
            machine.on_request(opts(&[Layer::Status]).force(true).reason("second"), 2),
            RequestOutcome::MergedIntoWindow
        );
        assert_eq!(machine.phase(), Phase::Pending);

        let plan = machine.on_timer_fired().unwrap();
        assert_eq!(plan.layers, LayerSet::BASIC_AND_STATUS);
        assert!(plan.force);
        assert_eq!(plan.reason.as_deref(), Some("first"));
        assert_eq!(machine.phase(), Phase::Executing);

        let completion = machine.on_fetch_completed();
        assert_eq!(completion.waiters, vec![1, 2]);
        assert!(!completion.reopened);
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_silent_only_if_every_request_is_silent() {
        let mut machine = RefreshMachine::new();
        machine.on_request(opts(&[Layer::Status]).silent(true), 1);
        machine.on_request(opts(&[Layer::Status]), 2);
        assert!(!machine.on_timer_fired().unwrap().silent);

        let mut machine = RefreshMachine::new();
        machine.on_request(opts(&[Layer::Status]).silent(true), 1);
        machine.on_request(opts(&[Layer::Basic]).silent(true), 2);
        assert!(machine.on_timer_fired().unwrap().silent);
    }

    #[test]
    fn test_covered_request_joins_in_flight() {
        let mut machine = RefreshMachine::new();
        machine.on_request(opts(&[Layer::Basic, Layer::Status]), 1);
        machine.on_timer_fired().unwrap();

        assert_eq!(
            machine.on_request(opts(&[Layer::Status]), 2),
            RequestOutcome::JoinedInFlight
        );
        assert!(!machine.has_queued());

        let completion = machine.on_fetch_completed();
        assert_eq!(completion.waiters, vec![1, 2]);
        assert!(!completion.reopened);
    }

    #[test]
    fn test_uncovered_or_forced_request_queues_behind_execution() {
        let mut machine = RefreshMachine::new();
        machine.on_request(opts(&[Layer::Status]), 1);
        machine.on_timer_fired().unwrap();

        assert_eq!(
            machine.on_request(opts(&[Layer::Detailed]), 2),
            RequestOutcome::QueuedBehindExecution
        );
        assert_eq!(
            machine.on_request(opts(&[Layer::Status]).force(true), 3),
            RequestOutcome::QueuedBehindExecution
        );
        // Nothing can start while executing
        assert!(machine.on_timer_fired().is_none());

        let completion = machine.on_fetch_completed();
        assert_eq!(completion.waiters, vec![1]);
        assert!(completion.reopened);
        assert_eq!(machine.phase(), Phase::Pending);
        assert_eq!(
            machine.pending_layers(),
            Some(LayerSet::from([Layer::Status, Layer::Detailed]))
        );

        let plan = machine.on_timer_fired().unwrap();
        assert!(plan.force);
        assert_eq!(machine.on_fetch_completed().waiters, vec![2, 3]);
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_drain_returns_every_waiter() {
        let mut machine = RefreshMachine::new();
        machine.on_request(opts(&[Layer::Status]), 1);
        machine.on_timer_fired().unwrap();
        machine.on_request(opts(&[Layer::Status]), 2);
        machine.on_request(opts(&[Layer::Detailed]), 3);

        let mut drained = machine.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 2, 3]);
        assert_eq!(machine.phase(), Phase::Idle);
        assert!(machine.on_timer_fired().is_none());
    }
}
