use sr700_common::{ConnectKind, ConnectionState, HeatSetting, RoastState};
use tokio::sync::oneshot;

pub type ConnectCallback = Box<dyn FnOnce(ConnectionState) + Send>;
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Notifications from the roaster.
///
/// Every method runs on the control thread, never on the thread that
/// registered the observer. Hand work off if it must happen elsewhere.
pub trait RoasterObserver: Send + Sync {
    fn temperature_changed(&self, _temperature: u16, _time_remaining: u32) {}

    fn step_completed(&self, _state: RoastState) {}

    fn connected(&self, _state: ConnectionState) {}

    fn disconnected(&self) {}
}

/// Everything the foreground can ask of the control loop.
pub enum Command {
    Connect {
        kind: ConnectKind,
        on_result: Option<ConnectCallback>,
        accepted: Option<oneshot::Sender<bool>>,
    },
    RoastAtLevel {
        level: HeatSetting,
        fan: u8,
        seconds: u32,
        on_complete: Option<CompletionCallback>,
    },
    RoastToTemperature {
        temperature: u16,
        fan: u8,
        seconds: u32,
        on_complete: Option<CompletionCallback>,
    },
    Cool {
        fan: u8,
        seconds: u32,
        on_complete: Option<CompletionCallback>,
    },
    Idle,
    Sleep,
    SetExternalDrive(bool),
    SetHeaterLevel(i64),
    Disconnect,
    Terminate,
    /// One second from the roast timer with the given generation.
    TimerTick(u64),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::RoastAtLevel { .. } => "roast_at_level",
            Self::RoastToTemperature { .. } => "roast_to_temperature",
            Self::Cool { .. } => "cool",
            Self::Idle => "idle",
            Self::Sleep => "sleep",
            Self::SetExternalDrive(_) => "set_external_drive",
            Self::SetHeaterLevel(_) => "set_heater_level",
            Self::Disconnect => "disconnect",
            Self::Terminate => "terminate",
            Self::TimerTick(_) => "timer_tick",
        }
    }
}
