use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{trace, warn};

/// Events delivered to whatever drives the tracker's UI
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Time to refresh the live clock.
    Tick,
    /// The user asked to jump back to the recording screen.
    NavigateToRecording,
}

/// Source of tracker events
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<TrackerEvent, RecvTimeoutError>;
}

pub struct ChannelEventSource {
    rx: Receiver<TrackerEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<TrackerEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TrackerEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Handle to the background task that emits [`TrackerEvent::Tick`].
///
/// The task stops when the handle is cancelled or dropped, or when nobody is
/// listening for ticks anymore.
#[derive(Debug)]
pub struct TickHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TickHandle {
    pub fn spawn<T: Ticker>(ticker: T, events: Sender<TrackerEvent>) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::spawn(move || loop {
            match stop_rx.recv_timeout(ticker.interval()) {
                Err(RecvTimeoutError::Timeout) => {
                    if events.send(TrackerEvent::Tick).is_err() {
                        trace!("tick receiver gone, stopping ticker");
                        break;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    pub fn cancel(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        // dropping the sender wakes the thread immediately
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("tick thread panicked");
            }
        }
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Outcome of one [`Runner::step`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Event(TrackerEvent),
    /// Nothing arrived within the idle timeout.
    Idle,
    /// Every sender is gone; no more events will arrive.
    Closed,
}

/// Runner that advances the event loop one event at a time
pub struct Runner<E: EventSource> {
    event_source: E,
    idle_timeout: Duration,
}

impl<E: EventSource> Runner<E> {
    pub fn new(event_source: E, idle_timeout: Duration) -> Self {
        Self {
            event_source,
            idle_timeout,
        }
    }

    /// Blocks up to the idle timeout and returns the next event
    pub fn step(&self) -> Step {
        match self.event_source.recv_timeout(self.idle_timeout) {
            Ok(ev) => Step::Event(ev),
            Err(RecvTimeoutError::Timeout) => Step::Idle,
            Err(RecvTimeoutError::Disconnected) => Step::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn step_returns_idle_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(1));

        assert_eq!(runner.step(), Step::Idle);
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(TrackerEvent::NavigateToRecording).unwrap();
        let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(10));

        assert_eq!(
            runner.step(),
            Step::Event(TrackerEvent::NavigateToRecording)
        );
    }

    #[test]
    fn step_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<TrackerEvent>();
        drop(tx);
        let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(10));

        assert_eq!(runner.step(), Step::Closed);
    }

    #[test]
    fn tick_handle_emits_ticks_until_cancelled() {
        let (tx, rx) = mpsc::channel();
        let handle = TickHandle::spawn(FixedTicker::new(Duration::from_millis(5)), tx);

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            TrackerEvent::Tick
        );
        assert!(handle.is_running());

        handle.cancel();
        while rx.try_recv().is_ok() {}
        // the only sender lived in the cancelled thread
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn tick_handle_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel();
        let handle = TickHandle::spawn(FixedTicker::new(Duration::from_millis(1)), tx);
        drop(rx);

        for _ in 0..200 {
            if !handle.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.is_running());
    }
}
