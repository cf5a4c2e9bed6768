use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    NotConnected,
    AttemptingConnect,
    Connecting,
    ReadingRecipe,
    Ready,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::AttemptingConnect => "ATTEMPTING_CONNECT",
            Self::Connecting => "CONNECTING",
            Self::ReadingRecipe => "READING_RECIPE",
            Self::Ready => "READY",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::ReadingRecipe | Self::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoastState {
    Idle,
    Roast,
    Cool,
    Sleep,
}

impl RoastState {
    /// Two-byte "current state" field carried in every outgoing packet.
    pub fn state_code(self) -> [u8; 2] {
        match self {
            Self::Idle => [0x02, 0x01],
            Self::Roast => [0x04, 0x02],
            Self::Cool => [0x04, 0x04],
            Self::Sleep => [0x08, 0x01],
        }
    }

    pub fn from_state_code(code: [u8; 2]) -> Option<Self> {
        match code {
            [0x02, 0x01] => Some(Self::Idle),
            [0x04, 0x02] => Some(Self::Roast),
            [0x04, 0x04] => Some(Self::Cool),
            [0x08, 0x01] => Some(Self::Sleep),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Roast => "ROAST",
            Self::Cool => "COOL",
            Self::Sleep => "SLEEP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum HeatSetting {
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl HeatSetting {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" | "off" | "0" => Some(Self::None),
            "low" | "1" => Some(Self::Low),
            "medium" | "2" => Some(Self::Medium),
            "high" | "3" => Some(Self::High),
            _ => None,
        }
    }
}

impl TryFrom<u8> for HeatSetting {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(other),
        }
    }
}

/// How the heater byte is decided each control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaterMode {
    /// Heat setting is sent exactly as commanded.
    Manual,
    /// PID output drives the bang-bang scheduler toward the target temperature.
    Thermostat,
    /// An externally supplied level drives the bang-bang scheduler.
    ExternalDrive,
}

impl HeaterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Thermostat => "THERMOSTAT",
            Self::ExternalDrive => "EXTERNAL_DRIVE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectKind {
    SingleShot,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoasterStatus {
    #[serde(rename = "connectionState")]
    pub connection_state: &'static str,
    #[serde(rename = "roastState")]
    pub roast_state: &'static str,
    #[serde(rename = "currentTemp")]
    pub current_temp: u16,
    #[serde(rename = "targetTemp")]
    pub target_temp: u16,
    #[serde(rename = "fanSpeed")]
    pub fan_speed: u8,
    #[serde(rename = "heatSetting")]
    pub heat_setting: &'static str,
    #[serde(rename = "heaterMode")]
    pub heater_mode: &'static str,
    #[serde(rename = "timeRemaining")]
    pub time_remaining: u32,
    #[serde(rename = "totalTime")]
    pub total_time: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_round_trip() {
        for state in [
            RoastState::Idle,
            RoastState::Roast,
            RoastState::Cool,
            RoastState::Sleep,
        ] {
            assert_eq!(RoastState::from_state_code(state.state_code()), Some(state));
        }
        assert_eq!(RoastState::from_state_code([0x00, 0x00]), None);
    }

    #[test]
    fn heat_setting_from_wire_byte() {
        assert_eq!(HeatSetting::try_from(3), Ok(HeatSetting::High));
        assert_eq!(HeatSetting::try_from(4), Err(4));
        assert_eq!(HeatSetting::parse("Medium"), Some(HeatSetting::Medium));
    }
}
