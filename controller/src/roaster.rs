use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use sr700_common::{ConnectKind, ConnectionState, HeatSetting, RoasterConfig, RoasterStatus, Session};
use tokio::sync::{
    mpsc::{self, error::SendError, UnboundedSender},
    oneshot, watch,
};
use tracing::warn;

use crate::{
    command::{Command, CompletionCallback, RoasterObserver},
    control_loop::ControlLoop,
    transport::{Connector, SerialConnector},
};

const CONTROL_THREAD: &str = "sr700-control";

/// Caller-side handle to one roaster.
///
/// Every method only enqueues a command and returns; the control loop picks
/// it up within one cycle. Callbacks run on the control thread.
pub struct Roaster {
    commands: UnboundedSender<Command>,
    status: watch::Receiver<RoasterStatus>,
    worker: Option<JoinHandle<()>>,
}

impl Roaster {
    pub fn new(
        config: RoasterConfig,
        observer: Option<Arc<dyn RoasterObserver>>,
    ) -> io::Result<Self> {
        let connector = SerialConnector::from_config(&config);
        Self::with_connector(config, Box::new(connector), observer)
    }

    pub fn with_connector(
        mut config: RoasterConfig,
        connector: Box<dyn Connector>,
        observer: Option<Arc<dyn RoasterObserver>>,
    ) -> io::Result<Self> {
        config.sanitize();

        let (commands, receiver) = mpsc::unbounded_channel();
        let (status_tx, status) =
            watch::channel(Session::new(config.ext_heater_drive).status());
        let control = ControlLoop::new(config, receiver, commands.downgrade(), status_tx, observer);

        let worker = thread::Builder::new()
            .name(CONTROL_THREAD.to_string())
            .spawn(move || control.run(connector))?;

        Ok(Self {
            commands,
            status,
            worker: Some(worker),
        })
    }

    /// Single attempt. `on_result` gets `Ready` once the recipe handshake
    /// finishes, or `NotConnected` on failure or rejection.
    pub fn connect(&self, on_result: impl FnOnce(ConnectionState) + Send + 'static) {
        let command = Command::Connect {
            kind: ConnectKind::SingleShot,
            on_result: Some(Box::new(on_result)),
            accepted: None,
        };
        if let Err(SendError(Command::Connect {
            on_result: Some(on_result),
            ..
        })) = self.commands.send(command)
        {
            warn!("control loop has exited, connect refused");
            on_result(ConnectionState::NotConnected);
        }
    }

    /// Keeps retrying until the port opens and reconnects after the link is
    /// lost. Returns false if a connection was already underway.
    ///
    /// Blocks briefly for the loop's answer, so call it from a plain thread
    /// (or `spawn_blocking`), never from a callback.
    pub fn auto_connect(&self) -> bool {
        let (accepted, reply) = oneshot::channel();
        let sent = self.send(Command::Connect {
            kind: ConnectKind::Auto,
            on_result: None,
            accepted: Some(accepted),
        });
        sent && reply.blocking_recv().unwrap_or(false)
    }

    pub fn roast_at_level(
        &self,
        level: HeatSetting,
        fan: u8,
        seconds: u32,
        on_complete: Option<CompletionCallback>,
    ) {
        self.send(Command::RoastAtLevel {
            level,
            fan,
            seconds,
            on_complete,
        });
    }

    pub fn roast_to_temperature(
        &self,
        temperature: u16,
        fan: u8,
        seconds: u32,
        on_complete: Option<CompletionCallback>,
    ) {
        self.send(Command::RoastToTemperature {
            temperature,
            fan,
            seconds,
            on_complete,
        });
    }

    pub fn cool(&self, fan: u8, seconds: u32, on_complete: Option<CompletionCallback>) {
        self.send(Command::Cool {
            fan,
            seconds,
            on_complete,
        });
    }

    pub fn idle(&self) {
        self.send(Command::Idle);
    }

    pub fn sleep(&self) {
        self.send(Command::Sleep);
    }

    /// While enabled, the level from `set_heater_level` replaces the PID output.
    pub fn set_external_drive(&self, enabled: bool) {
        self.send(Command::SetExternalDrive(enabled));
    }

    pub fn set_heater_level(&self, level: i64) {
        self.send(Command::SetHeaterLevel(level));
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn terminate(&self) {
        self.send(Command::Terminate);
    }

    pub fn status(&self) -> RoasterStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoasterStatus> {
        self.status.clone()
    }

    pub fn connection_state(&self) -> &'static str {
        self.status.borrow().connection_state
    }

    pub fn roast_state(&self) -> &'static str {
        self.status.borrow().roast_state
    }

    fn send(&self, command: Command) -> bool {
        let name = command.name();
        if self.commands.send(command).is_err() {
            warn!("control loop has exited, dropped {name}");
            return false;
        }
        true
    }
}

impl Drop for Roaster {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Terminate);
        let Some(worker) = self.worker.take() else {
            return;
        };
        // Last handle released from inside a callback; the loop exits on its own.
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!("control thread panicked");
        }
    }
}
