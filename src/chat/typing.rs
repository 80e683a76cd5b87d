//! Typing indicators.
//!
//! Three independent halves:
//! - the emit side debounces local keystrokes into start/stop signals,
//! - the relay forwards signals to the other members of a room, keeping no state,
//! - the receive side treats every start as a lease that expires on its own,
//!   so a lost stop signal never leaves an indicator stuck on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use super::registry::RoomRegistry;
use super::room::{Identity, RoomEvent};
use super::room_id::RoomId;
use super::session::Session;

/// Quiet period after the last keystroke before a stop is emitted.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(800);

/// How long a received start stays valid without a refresh.
pub const DEFAULT_LEASE: Duration = Duration::from_millis(2000);

/// A typing state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// The local user is typing.
    Start,
    /// The local user stopped typing.
    Stop,
}

impl TypingSignal {
    /// Whether this signal means "typing".
    pub fn is_typing(self) -> bool {
        matches!(self, TypingSignal::Start)
    }
}

/// Emit-side state machine.
///
/// Every activity yields a `Start` and pushes a single inactivity deadline
/// out; once the deadline passes, exactly one `Stop` is produced.
#[derive(Debug)]
pub struct TypingDebouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl TypingDebouncer {
    /// Create a debouncer with the given quiet period.
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Record local input activity.
    pub fn on_activity(&mut self, now: Instant) -> TypingSignal {
        self.deadline = Some(now + self.quiet);
        TypingSignal::Start
    }

    /// Produce the pending `Stop` if the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Produce a `Stop` right away if one is pending.
    pub fn finish(&mut self) -> Option<TypingSignal> {
        self.deadline.take().map(|_| TypingSignal::Stop)
    }

    /// When the pending `Stop` is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a `Stop` is still pending.
    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Background task driving a [`TypingDebouncer`] on the tokio clock.
pub struct TypingEmitter {
    activity: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl TypingEmitter {
    /// Spawn an emitter that writes its signals to `signals`.
    pub fn spawn(quiet: Duration, signals: mpsc::UnboundedSender<TypingSignal>) -> Self {
        let (activity, mut activity_rx) = mpsc::unbounded_channel::<()>();

        let task = tokio::spawn(async move {
            let mut debouncer = TypingDebouncer::new(quiet);
            loop {
                let deadline = debouncer.deadline();
                tokio::select! {
                    event = activity_rx.recv() => match event {
                        Some(()) => {
                            let signal = debouncer.on_activity(Instant::now());
                            if signals.send(signal).is_err() {
                                return;
                            }
                        }
                        None => {
                            if let Some(stop) = debouncer.finish() {
                                let _ = signals.send(stop);
                            }
                            return;
                        }
                    },
                    _ = sleep_until_deadline(deadline) => {
                        if let Some(stop) = debouncer.poll(Instant::now()) {
                            if signals.send(stop).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Self { activity, task }
    }

    /// Report local input activity. Returns false if the emitter is gone.
    pub fn activity(&self) -> bool {
        self.activity.send(()).is_ok()
    }

    /// Stop the emitter, flushing a pending `Stop`.
    pub async fn close(self) {
        drop(self.activity);
        let _ = self.task.await;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Relay side: stateless fan-out of typing signals.
#[derive(Clone)]
pub struct TypingRelay {
    registry: Arc<RoomRegistry>,
}

impl TypingRelay {
    /// Create a relay over a registry.
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Forward a typing signal to every other member of a room.
    ///
    /// Blank room ids are dropped silently. Without an explicit identity
    /// the session's joined identity is used. Returns the number of members
    /// reached.
    pub async fn forward(
        &self,
        session: &Session,
        room_id: &str,
        typing: bool,
        identity: Option<Identity>,
    ) -> usize {
        let Some(room_id) = RoomId::normalize(room_id) else {
            trace!(connection = %session.connection_id(), "Typing signal without room dropped");
            return 0;
        };

        let identity = identity
            .map(Identity::sanitized)
            .or_else(|| session.identity().cloned())
            .unwrap_or_default();

        let event = RoomEvent::Typing {
            room_id: room_id.clone(),
            typing,
            identity,
        };
        self.registry
            .broadcast_except(&room_id, &session.connection_id(), event)
            .await
    }
}

/// Receive side: one self-expiring lease per remote subject.
///
/// Leases are stored as monotonic deadlines and swept together, so the
/// owner needs a single timer at [`TypingLeases::next_expiry`].
#[derive(Debug)]
pub struct TypingLeases {
    window: Duration,
    leases: HashMap<String, Instant>,
}

impl TypingLeases {
    /// Create an empty lease table.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            leases: HashMap::new(),
        }
    }

    /// Apply a received signal for a subject.
    pub fn apply(&mut self, subject: &str, typing: bool, now: Instant) {
        if typing {
            self.start(subject, now);
        } else {
            self.stop(subject);
        }
    }

    /// Create or refresh a lease. Returns its new expiry.
    pub fn start(&mut self, subject: &str, now: Instant) -> Instant {
        let expires_at = now + self.window;
        self.leases.insert(subject.to_string(), expires_at);
        expires_at
    }

    /// Clear a lease. Returns true if one was held.
    pub fn stop(&mut self, subject: &str) -> bool {
        self.leases.remove(subject).is_some()
    }

    /// Clear every lease whose expiry has passed.
    ///
    /// Returns the subjects that stopped typing, sorted.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .leases
            .iter()
            .filter(|(_, &expires_at)| expires_at <= now)
            .map(|(subject, _)| subject.clone())
            .collect();
        for subject in &expired {
            self.leases.remove(subject);
        }
        expired.sort();
        expired
    }

    /// Earliest pending expiry.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.leases.values().min().copied()
    }

    /// Whether a subject holds a lease that is still running at `now`.
    pub fn is_typing(&self, subject: &str, now: Instant) -> bool {
        self.leases
            .get(subject)
            .is_some_and(|&expires_at| expires_at > now)
    }

    /// Subjects whose lease is still running at `now`, sorted.
    ///
    /// Leases past their expiry are not reported even before `expire` has
    /// swept them.
    pub fn typing_subjects(&self, now: Instant) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .leases
            .iter()
            .filter(|(_, &expires_at)| expires_at > now)
            .map(|(subject, _)| subject.clone())
            .collect();
        subjects.sort();
        subjects
    }

    /// Drop every lease.
    pub fn clear(&mut self) {
        self.leases.clear();
    }
}
