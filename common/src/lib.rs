pub mod config;
pub mod error;
pub mod heater;
pub mod packet;
pub mod pid;
pub mod session;
pub mod types;
pub mod wire;

pub use config::{CoolStep, RoasterConfig, RuntimeConfig, DEFAULT_DEVICE_PATH};
pub use error::ProtocolError;
pub use heater::HeatScheduler;
pub use packet::{seconds_to_minutes_code, CommandFrame, DecodeState, PacketDecoder, ResponseBody};
pub use pid::{PidController, PidGains};
pub use session::{Session, SessionEvent};
pub use types::{
    ConnectKind, ConnectionState, HeatSetting, HeaterMode, RoastState, RoasterStatus,
};
pub use wire::*;
