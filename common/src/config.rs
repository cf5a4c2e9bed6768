use serde::{Deserialize, Serialize};

use crate::pid::PidGains;

pub const DEFAULT_DEVICE_PATH: &str = "/dev/ttyUSB0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoasterConfig {
    pub device_path: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub loop_interval_ms: u64,
    pub heater_segments: usize,
    pub pid: PidGains,
    pub max_io_failures: u32,
    pub auto_connect_retry_ms: u64,
    pub ext_heater_drive: bool,
}

impl Default for RoasterConfig {
    fn default() -> Self {
        Self {
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            baud_rate: 9_600,
            read_timeout_ms: 200,
            loop_interval_ms: 250,
            heater_segments: 8,
            pid: PidGains::default(),
            max_io_failures: 3,
            auto_connect_retry_ms: 1_000,
            ext_heater_drive: false,
        }
    }
}

impl RoasterConfig {
    pub fn sanitize(&mut self) {
        if self.device_path.trim().is_empty() {
            self.device_path = DEFAULT_DEVICE_PATH.to_string();
        }
        if self.baud_rate == 0 {
            self.baud_rate = 9_600;
        }
        self.read_timeout_ms = self.read_timeout_ms.clamp(10, 1_000);
        self.loop_interval_ms = self.loop_interval_ms.clamp(50, 2_000);
        self.heater_segments = self.heater_segments.clamp(1, 32);
        self.auto_connect_retry_ms = self.auto_connect_retry_ms.max(100);
        if !(self.pid.kp.is_finite() && self.pid.ki.is_finite() && self.pid.kd.is_finite()) {
            self.pid = PidGains::default();
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoolStep {
    pub fan: u8,
    pub seconds: u32,
}

impl Default for CoolStep {
    fn default() -> Self {
        Self {
            fan: 9,
            seconds: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub roaster: RoasterConfig,
    pub http_port: u16,
    pub auto_connect: bool,
    /// Cooling step started when a roast finishes; `None` leaves the roaster idle.
    pub auto_cool: Option<CoolStep>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            roaster: RoasterConfig::default(),
            http_port: 8080,
            auto_connect: true,
            auto_cool: Some(CoolStep::default()),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.roaster.sanitize();
        if let Some(step) = self.auto_cool.as_mut() {
            step.fan = step.fan.clamp(1, 9);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let raw = r#"{ "roaster": { "device_path": "/dev/ttyUSB3" }, "http_port": 9000 }"#;
        let config: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.roaster.device_path, "/dev/ttyUSB3");
        assert_eq!(config.roaster.baud_rate, 9_600);
        assert_eq!(config.roaster.pid, PidGains::default());
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.auto_cool, Some(CoolStep::default()));
    }

    #[test]
    fn sanitize_repairs_out_of_range_values() {
        let mut config = RuntimeConfig {
            roaster: RoasterConfig {
                device_path: "  ".to_string(),
                heater_segments: 0,
                loop_interval_ms: 1,
                ..RoasterConfig::default()
            },
            auto_cool: Some(CoolStep {
                fan: 0,
                seconds: 60,
            }),
            ..RuntimeConfig::default()
        };
        config.sanitize();

        assert_eq!(config.roaster.device_path, DEFAULT_DEVICE_PATH);
        assert_eq!(config.roaster.heater_segments, 1);
        assert_eq!(config.roaster.loop_interval_ms, 50);
        assert_eq!(config.auto_cool.map(|step| step.fan), Some(1));
    }
}
