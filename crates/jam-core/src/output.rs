//! Output boundary between the scheduler and whatever makes sound.
//!
//! The scheduler hands [`TriggerCommand`]s to an [`OutputSink`]. The sink
//! owns the clock that trigger times refer to. [`ChannelOutput`] moves
//! commands to an audio thread over a bounded channel without ever blocking
//! the sender; the audio side reads them through a [`TriggerReceiver`].
//! [`RecordingOutput`] keeps everything in memory for tests and dry runs.
//!
//! Cancel messages ride the same bounded queue and can be dropped when it is
//! full. The current play session is also published through a shared
//! counter, and the receiver discards not-yet-started triggers from older
//! sessions on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::model::{RegionId, TrackId};
use crate::patch::InstrumentPatch;

/// A monotonic time source in seconds.
pub trait OutputClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall clock measured from construction.
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl OutputClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Manually driven clock. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, time: f64) {
        self.bits.store(time.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, delta: f64) -> f64 {
        let time = self.now() + delta;
        self.set(time);
        time
    }
}

impl OutputClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// A sound the output should start at an absolute time.
#[derive(Clone, Debug)]
pub struct TriggerCommand {
    pub track_id: TrackId,
    pub region_id: RegionId,
    pub patch: Arc<InstrumentPatch>,
    /// Absolute start time on the output clock, in seconds.
    pub time: f64,
    /// Track gain after mute/solo and the master bus.
    pub gain: f32,
    pub pan: f32,
    /// `None` for region triggers on audio tracks.
    pub pitch: Option<u8>,
    pub velocity: f32,
    /// Sounding length in seconds.
    pub duration: f64,
    /// Play session the trigger was committed in.
    pub session: u64,
}

/// Receiver side of the scheduler.
pub trait OutputSink: Send {
    /// Current time of the output clock.
    fn now(&self) -> f64;

    /// Hand over a committed trigger. Must not block.
    fn schedule_trigger(&mut self, trigger: TriggerCommand);

    /// Drop triggers that have not started yet, for one track or all tracks.
    fn cancel_pending(&mut self, track_id: Option<&str>);

    /// Announce the current play session. Triggers from earlier sessions
    /// that have not started may be discarded.
    fn set_session(&mut self, _session: u64) {}
}

/// Messages crossing the lock-free handoff.
#[derive(Clone, Debug)]
pub enum OutputMessage {
    Trigger(TriggerCommand),
    Cancel { track_id: Option<TrackId> },
}

/// Sender half of the audio handoff.
pub struct ChannelOutput {
    tx: Sender<OutputMessage>,
    clock: Arc<dyn OutputClock>,
    session: Arc<AtomicU64>,
    dropped: u64,
}

impl ChannelOutput {
    /// Create a connected sender/receiver pair with room for `capacity` messages.
    pub fn bounded(capacity: usize, clock: Arc<dyn OutputClock>) -> (Self, TriggerReceiver) {
        let (tx, rx) = bounded(capacity.max(1));
        let session = Arc::new(AtomicU64::new(0));
        (
            Self {
                tx,
                clock: clock.clone(),
                session: session.clone(),
                dropped: 0,
            },
            TriggerReceiver {
                rx,
                clock,
                session,
                pending: Vec::new(),
            },
        )
    }

    /// Number of messages dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn push(&mut self, msg: OutputMessage) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                self.dropped += 1;
                log::warn!("[OUTPUT] Queue full, dropping {:?}", describe(&msg));
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("[OUTPUT] Receiver gone, discarding message");
            }
        }
    }
}

fn describe(msg: &OutputMessage) -> String {
    match msg {
        OutputMessage::Trigger(t) => format!("trigger {}@{:.3}", t.track_id, t.time),
        OutputMessage::Cancel { track_id } => format!("cancel {:?}", track_id),
    }
}

impl OutputSink for ChannelOutput {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn schedule_trigger(&mut self, trigger: TriggerCommand) {
        self.push(OutputMessage::Trigger(trigger));
    }

    fn cancel_pending(&mut self, track_id: Option<&str>) {
        self.push(OutputMessage::Cancel {
            track_id: track_id.map(str::to_string),
        });
    }

    fn set_session(&mut self, session: u64) {
        self.session.store(session, Ordering::Release);
    }
}

/// Audio-thread half of the handoff.
///
/// Holds triggers that arrived early until their time comes. Nothing here
/// waits on the scheduler.
pub struct TriggerReceiver {
    rx: Receiver<OutputMessage>,
    clock: Arc<dyn OutputClock>,
    session: Arc<AtomicU64>,
    pending: Vec<TriggerCommand>,
}

impl TriggerReceiver {
    /// Pull everything currently queued, applying cancellations in order
    /// and dropping future triggers from stale sessions.
    pub fn poll(&mut self) {
        let current = self.session.load(Ordering::Acquire);
        let now = self.clock.now();
        let stale = |t: &TriggerCommand| t.session < current && t.time > now;

        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                OutputMessage::Trigger(trigger) => {
                    if stale(&trigger) {
                        log::trace!("[OUTPUT] Discarding stale trigger {}", trigger.track_id);
                    } else {
                        self.pending.push(trigger);
                    }
                }
                OutputMessage::Cancel { track_id } => {
                    let now = self.clock.now();
                    self.pending.retain(|t| {
                        t.time <= now || track_id.as_ref().is_some_and(|id| *id != t.track_id)
                    });
                }
            }
        }
        self.pending.retain(|t| !stale(t));
    }

    /// Session the receiver currently accepts.
    pub fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    /// Poll, then remove and return triggers starting before `until`, in time order.
    pub fn take_due(&mut self, until: f64) -> Vec<TriggerCommand> {
        self.poll();
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].time < until {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by(|a, b| a.time.total_cmp(&b.time));
        due
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// In-memory output with a manual clock.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    clock: ManualClock,
    triggers: Vec<TriggerCommand>,
    cancellations: Vec<Option<TrackId>>,
}

impl RecordingOutput {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            triggers: Vec::new(),
            cancellations: Vec::new(),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Triggers still held (cancelled ones are removed).
    pub fn triggers(&self) -> &[TriggerCommand] {
        &self.triggers
    }

    pub fn take_triggers(&mut self) -> Vec<TriggerCommand> {
        std::mem::take(&mut self.triggers)
    }

    pub fn cancellations(&self) -> &[Option<TrackId>] {
        &self.cancellations
    }
}

impl OutputSink for RecordingOutput {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn schedule_trigger(&mut self, trigger: TriggerCommand) {
        self.triggers.push(trigger);
    }

    fn cancel_pending(&mut self, track_id: Option<&str>) {
        let now = self.clock.now();
        self.triggers
            .retain(|t| t.time <= now || track_id.is_some_and(|id| id != t.track_id));
        self.cancellations.push(track_id.map(str::to_string));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(track: &str, time: f64) -> TriggerCommand {
        TriggerCommand {
            track_id: track.to_string(),
            region_id: "r1".to_string(),
            patch: Arc::new(InstrumentPatch::default_patch()),
            time,
            gain: 1.0,
            pan: 0.0,
            pitch: Some(60),
            velocity: 1.0,
            duration: 0.5,
            session: 1,
        }
    }

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(1.0);
        let other = clock.clone();
        clock.advance(0.5);
        assert_eq!(other.now(), 1.5);
    }

    #[test]
    fn test_channel_handoff_orders_due_triggers() {
        let clock = ManualClock::new(0.0);
        let (mut out, mut rx) = ChannelOutput::bounded(16, Arc::new(clock.clone()));
        out.schedule_trigger(trigger("a", 0.2));
        out.schedule_trigger(trigger("b", 0.05));
        out.schedule_trigger(trigger("a", 0.5));
        let due = rx.take_due(0.25);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].track_id, "b");
        assert_eq!(rx.pending_len(), 1);
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let clock = ManualClock::new(0.0);
        let (mut out, _rx) = ChannelOutput::bounded(2, Arc::new(clock));
        for i in 0..5 {
            out.schedule_trigger(trigger("a", i as f64));
        }
        assert_eq!(out.dropped(), 3);
    }

    #[test]
    fn test_cancel_removes_future_triggers_for_track() {
        let clock = ManualClock::new(1.0);
        let (mut out, mut rx) = ChannelOutput::bounded(16, Arc::new(clock.clone()));
        out.schedule_trigger(trigger("a", 1.5));
        out.schedule_trigger(trigger("b", 1.5));
        out.cancel_pending(Some("a"));
        out.schedule_trigger(trigger("a", 2.0));
        let due = rx.take_due(10.0);
        let tracks: Vec<_> = due.iter().map(|t| (t.track_id.as_str(), t.time)).collect();
        assert_eq!(tracks, vec![("b", 1.5), ("a", 2.0)]);
    }

    #[test]
    fn test_stale_session_dropped_when_cancel_is_lost() {
        let clock = ManualClock::new(1.0);
        let (mut out, mut rx) = ChannelOutput::bounded(3, Arc::new(clock.clone()));
        out.set_session(1);
        out.schedule_trigger(trigger("a", 1.0));
        out.schedule_trigger(trigger("a", 1.2));
        out.schedule_trigger(trigger("a", 1.4));
        // Stop: the queue is full, so the cancel itself is dropped.
        out.set_session(2);
        out.cancel_pending(None);
        assert_eq!(out.dropped(), 1);
        assert_eq!(rx.session(), 2);

        clock.set(1.1);
        let due = rx.take_due(f64::INFINITY);
        let times: Vec<f64> = due.iter().map(|t| t.time).collect();
        assert_eq!(times, vec![1.0]);
    }

    #[test]
    fn test_current_session_triggers_are_kept() {
        let clock = ManualClock::new(0.0);
        let (mut out, mut rx) = ChannelOutput::bounded(8, Arc::new(clock.clone()));
        out.set_session(1);
        out.schedule_trigger(trigger("a", 0.5));
        rx.poll();
        out.set_session(2);
        let mut next = trigger("a", 0.7);
        next.session = 2;
        out.schedule_trigger(next);
        let due = rx.take_due(f64::INFINITY);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].session, 2);
    }

    #[test]
    fn test_recording_output_cancel_all() {
        let clock = ManualClock::new(0.0);
        let mut out = RecordingOutput::new(clock.clone());
        out.schedule_trigger(trigger("a", 0.0));
        out.schedule_trigger(trigger("b", 0.3));
        clock.set(0.1);
        out.cancel_pending(None);
        assert_eq!(out.triggers().len(), 1);
        assert_eq!(out.cancellations(), &[None]);
    }
}
