use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::debug;

use crate::command::Command;

/// 1 Hz tick source for roast/cool countdowns.
///
/// Ticks are posted into the control loop's command queue so the session is
/// only ever touched by the control thread.
pub struct RoastTimer {
    generation: u64,
    stopped: Arc<AtomicBool>,
}

impl RoastTimer {
    pub fn start(
        commands: WeakUnboundedSender<Command>,
        period: Duration,
        generation: u64,
    ) -> io::Result<Self> {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        thread::Builder::new()
            .name("sr700-timer".to_string())
            .spawn(move || {
                loop {
                    thread::sleep(period);
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    let Some(sender) = commands.upgrade() else {
                        break;
                    };
                    if sender.send(Command::TimerTick(generation)).is_err() {
                        break;
                    }
                }
                debug!("roast timer {generation} stopped");
            })?;

        Ok(Self {
            generation,
            stopped,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The thread notices within one period; ticks already queued carry a
    /// stale generation and are ignored by the loop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl Drop for RoastTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
