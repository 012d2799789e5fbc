//! Event loop.
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver};
use embassy_time::Ticker;

use crate::diagnostics::{DiagnosticSink, Heartbeat};
use crate::peripheral::PeripheralLifecycle;
use crate::radio::{Event, Radio};
use crate::Error;

/// Source of radio events.
pub trait EventSource {
    /// Wait for the next event. `None` ends the run.
    async fn next_event(&mut self) -> Option<Event>;
}

/// Source of heartbeat ticks.
pub trait TickSource {
    async fn next_tick(&mut self);
}

impl TickSource for Ticker {
    async fn next_tick(&mut self) {
        self.next().await
    }
}

impl<'ch, M: RawMutex, const N: usize> EventSource for Receiver<'ch, M, Event, N> {
    async fn next_event(&mut self) -> Option<Event> {
        Some(self.receive().await)
    }
}

impl<M: RawMutex, const N: usize> EventSource for &Channel<M, Event, N> {
    async fn next_event(&mut self) -> Option<Event> {
        Some(self.receive().await)
    }
}

/// Start the peripheral and dispatch events until the source ends.
///
/// Events are handled one at a time, between them the heartbeat is driven by
/// `ticks`. Dispatch errors are already reported by the lifecycle and do not stop
/// the loop; a failed radio initialization does.
pub async fn run<M, R, S, E, T, H, const MAX: usize>(
    lifecycle: &mut PeripheralLifecycle<M, R, S, MAX>,
    events: &mut E,
    ticks: &mut T,
    heartbeat: &mut H,
) -> Result<(), Error>
where
    M: RawMutex,
    R: Radio,
    S: DiagnosticSink,
    E: EventSource,
    T: TickSource,
    H: Heartbeat,
{
    lifecycle.start()?;
    loop {
        match select(events.next_event(), ticks.next_tick()).await {
            Either::First(Some(event)) => match lifecycle.handle_event(event) {
                Err(Error::RadioInitFailure) => return Err(Error::RadioInitFailure),
                Err(e) => debug!("[link] event dropped: {:?}", e),
                Ok(()) => {}
            },
            Either::First(None) => {
                info!("[link] event source closed");
                return Ok(());
            }
            Either::Second(()) => heartbeat.beat(),
        }
    }
}
