use tracing::{info, warn};

use crate::{
    packet::{seconds_to_minutes_code, CommandFrame, ResponseBody},
    types::{ConnectKind, ConnectionState, HeatSetting, HeaterMode, RoastState, RoasterStatus},
    wire::{HEADER, RECIPE_HEADER, RECIPE_STATE_CODE, TEMP_MAX_F, TEMP_MIN_F},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(ConnectionState),
    TemperatureChanged { temperature: u16, time_remaining: u32 },
    StepCompleted(RoastState),
}

/// Connection and roast state for one roaster, plus the setpoints that go out
/// in every packet.
#[derive(Debug, Clone)]
pub struct Session {
    connection: ConnectionState,
    connect_kind: Option<ConnectKind>,
    roast: RoastState,

    fan_speed: u8,
    heat_setting: HeatSetting,
    target_temp: u16,
    current_temp: u16,

    time_remaining: u32,
    total_time: u32,
    timer_running: bool,

    thermostat: bool,
    ext_heater_drive: bool,
    heater_level: i64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Session {
    pub fn new(ext_heater_drive: bool) -> Self {
        Self {
            connection: ConnectionState::NotConnected,
            connect_kind: None,
            roast: RoastState::Idle,
            fan_speed: 0,
            heat_setting: HeatSetting::None,
            target_temp: TEMP_MIN_F,
            current_temp: TEMP_MIN_F,
            time_remaining: 0,
            total_time: 0,
            timer_running: false,
            thermostat: false,
            ext_heater_drive,
            heater_level: 0,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn connect_kind(&self) -> Option<ConnectKind> {
        self.connect_kind
    }

    pub fn roast_state(&self) -> RoastState {
        self.roast
    }

    pub fn fan_speed(&self) -> u8 {
        self.fan_speed
    }

    pub fn heat_setting(&self) -> HeatSetting {
        self.heat_setting
    }

    pub fn target_temp(&self) -> u16 {
        self.target_temp
    }

    pub fn current_temp(&self) -> u16 {
        self.current_temp
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn total_time(&self) -> u32 {
        self.total_time
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer_running
    }

    pub fn heater_level(&self) -> i64 {
        self.heater_level
    }

    pub fn heater_mode(&self) -> HeaterMode {
        if self.ext_heater_drive {
            HeaterMode::ExternalDrive
        } else if self.thermostat {
            HeaterMode::Thermostat
        } else {
            HeaterMode::Manual
        }
    }

    /// Whether the control loop should be modulating the heater this cycle.
    pub fn heater_modulated(&self) -> bool {
        self.connection == ConnectionState::Ready && self.heater_mode() != HeaterMode::Manual
    }

    pub fn begin_connect(&mut self, kind: ConnectKind) -> bool {
        if self.connection != ConnectionState::NotConnected {
            return false;
        }
        self.connection = ConnectionState::AttemptingConnect;
        self.connect_kind = Some(kind);
        true
    }

    pub fn transport_opening(&mut self) {
        self.connection = ConnectionState::Connecting;
    }

    /// Port is open; wait for the roaster to replay its stored recipe.
    pub fn transport_opened(&mut self) {
        self.set_roast_state(RoastState::Idle);
        self.fan_speed = 0;
        self.enter_recipe_read();
    }

    pub fn connect_failed(&mut self) -> Vec<SessionEvent> {
        self.connection = ConnectionState::NotConnected;
        vec![SessionEvent::Connected(ConnectionState::NotConnected)]
    }

    /// Caller asked to disconnect: stop counting time and put the roaster to sleep.
    pub fn request_disconnect(&mut self) {
        self.timer_running = false;
        self.connect_kind = None;
        self.set_roast_state(RoastState::Sleep);
    }

    pub fn link_closed(&mut self) {
        self.connection = ConnectionState::NotConnected;
        self.timer_running = false;
    }

    pub fn roast_at_level(&mut self, level: HeatSetting, fan: u8, seconds: u32) {
        self.set_roast_state(RoastState::Roast);
        self.heat_setting = level;
        self.thermostat = false;
        self.fan_speed = fan.clamp(1, 9);
        self.time_remaining = seconds;
    }

    pub fn roast_to_temperature(&mut self, temperature: u16, fan: u8, seconds: u32) {
        self.set_roast_state(RoastState::Roast);
        self.target_temp = temperature.clamp(TEMP_MIN_F, TEMP_MAX_F);
        self.thermostat = true;
        self.fan_speed = fan.clamp(1, 9);
        self.time_remaining = seconds;
    }

    pub fn cool(&mut self, fan: u8, seconds: u32) {
        self.set_roast_state(RoastState::Cool);
        self.fan_speed = fan.clamp(1, 9);
        self.time_remaining = seconds;
    }

    pub fn idle(&mut self) {
        self.set_roast_state(RoastState::Idle);
        self.fan_speed = 0;
    }

    pub fn sleep(&mut self) {
        self.set_roast_state(RoastState::Sleep);
    }

    pub fn set_external_drive(&mut self, enabled: bool) {
        self.ext_heater_drive = enabled;
        if !enabled {
            self.heater_level = 0;
        }
    }

    pub fn set_heater_level(&mut self, level: i64) {
        self.heater_level = level.max(0);
    }

    /// Heater byte for this cycle while the scheduler is modulating.
    pub fn apply_heater_pulse(&mut self, on: bool) {
        self.heat_setting = if on {
            HeatSetting::High
        } else {
            HeatSetting::None
        };
    }

    pub fn command_frame(&self) -> CommandFrame {
        let (header, state_code) = if self.connection == ConnectionState::ReadingRecipe {
            (RECIPE_HEADER, RECIPE_STATE_CODE)
        } else {
            (HEADER, self.roast.state_code())
        };

        CommandFrame {
            header,
            state_code,
            fan_speed: self.fan_speed,
            time_code: seconds_to_minutes_code(self.time_remaining),
            heat_setting: self.heat_setting,
        }
    }

    pub fn handle_body(&mut self, body: &ResponseBody) -> Vec<SessionEvent> {
        match self.connection {
            ConnectionState::ReadingRecipe => {
                if body.is_end_of_recipe() {
                    info!("end of recipe replay, roaster ready");
                    self.connection = ConnectionState::Ready;
                    self.timer_running = true;
                    return vec![SessionEvent::Connected(ConnectionState::Ready)];
                }
                Vec::new()
            }
            ConnectionState::Ready => match body.temperature() {
                Ok(temperature) => {
                    self.current_temp = temperature;
                    vec![SessionEvent::TemperatureChanged {
                        temperature,
                        time_remaining: self.time_remaining,
                    }]
                }
                Err(err) => {
                    warn!("{err}, re-reading recipe");
                    self.enter_recipe_read();
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    /// One second of roast timer. Completing a step drops back to idle.
    pub fn timer_tick(&mut self) -> Vec<SessionEvent> {
        if !self.timer_running || !matches!(self.roast, RoastState::Roast | RoastState::Cool) {
            return Vec::new();
        }

        self.total_time = self.total_time.saturating_add(1);
        if self.time_remaining > 0 {
            self.time_remaining -= 1;
            return Vec::new();
        }

        let finished = self.roast;
        info!(
            "{} step finished after {}s total",
            finished.as_str(),
            self.total_time
        );
        self.idle();
        vec![SessionEvent::StepCompleted(finished)]
    }

    pub fn status(&self) -> RoasterStatus {
        RoasterStatus {
            connection_state: self.connection.as_str(),
            roast_state: self.roast.as_str(),
            current_temp: self.current_temp,
            target_temp: self.target_temp,
            fan_speed: self.fan_speed,
            heat_setting: self.heat_setting.as_str(),
            heater_mode: self.heater_mode().as_str(),
            time_remaining: self.time_remaining,
            total_time: self.total_time,
        }
    }

    fn enter_recipe_read(&mut self) {
        self.connection = ConnectionState::ReadingRecipe;
    }

    fn set_roast_state(&mut self, state: RoastState) {
        if state == RoastState::Idle {
            self.heat_setting = HeatSetting::None;
        }
        if self.roast != state {
            info!("roast state {} -> {}", self.roast.as_str(), state.as_str());
        }
        self.roast = state;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn body(flags: u8, temp: u16) -> ResponseBody {
        let [hi, lo] = temp.to_be_bytes();
        let bytes = [0x61, 0x74, flags, 0x02, 0x01, 0x00, 0x00, 0x00, hi, lo];
        ResponseBody::try_from(bytes.as_slice()).unwrap()
    }

    fn ready_session() -> Session {
        let mut session = Session::default();
        assert!(session.begin_connect(ConnectKind::SingleShot));
        session.transport_opening();
        session.transport_opened();
        session.handle_body(&body(0xAF, 0xFF00));
        assert_eq!(session.connection_state(), ConnectionState::Ready);
        session
    }

    #[test]
    fn fresh_session_encodes_idle_packet() {
        assert_eq!(
            Session::default().command_frame().encode(),
            [0xAA, 0xAA, 0x61, 0x74, 0x63, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xAA, 0xFA]
        );
    }

    #[test]
    fn connect_rejected_unless_not_connected() {
        let mut session = Session::default();
        assert!(session.begin_connect(ConnectKind::SingleShot));
        assert_eq!(session.connection_state(), ConnectionState::AttemptingConnect);
        assert!(!session.begin_connect(ConnectKind::Auto));

        let mut session = ready_session();
        assert!(!session.begin_connect(ConnectKind::SingleShot));
    }

    #[test]
    fn recipe_read_uses_alternate_header_until_end_marker() {
        let mut session = Session::default();
        session.begin_connect(ConnectKind::SingleShot);
        session.transport_opening();
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        session.transport_opened();

        let frame = session.command_frame();
        assert_eq!(frame.header, [0xAA, 0x55]);
        assert_eq!(frame.state_code, [0x00, 0x00]);

        assert!(session.handle_body(&body(0x63, 300)).is_empty());
        assert_eq!(session.connection_state(), ConnectionState::ReadingRecipe);

        let events = session.handle_body(&body(0x00, 300));
        assert_eq!(events, vec![SessionEvent::Connected(ConnectionState::Ready)]);
        assert!(session.is_timer_running());

        let frame = session.command_frame();
        assert_eq!(frame.header, [0xAA, 0xAA]);
        assert_eq!(frame.state_code, [0x02, 0x01]);
    }

    #[test]
    fn connect_failure_reports_not_connected() {
        let mut session = Session::default();
        session.begin_connect(ConnectKind::SingleShot);
        session.transport_opening();
        let events = session.connect_failed();

        assert_eq!(
            events,
            vec![SessionEvent::Connected(ConnectionState::NotConnected)]
        );
        assert!(session.begin_connect(ConnectKind::SingleShot));
    }

    #[test]
    fn telemetry_updates_temperature() {
        let mut session = ready_session();
        session.roast_at_level(HeatSetting::Low, 3, 90);

        let events = session.handle_body(&body(0x63, 320));
        assert_eq!(
            events,
            vec![SessionEvent::TemperatureChanged {
                temperature: 320,
                time_remaining: 90
            }]
        );
        assert_eq!(session.current_temp(), 320);

        session.handle_body(&body(0x63, 0xFF00));
        assert_eq!(session.current_temp(), 150);
    }

    #[test]
    fn out_of_range_telemetry_rereads_recipe() {
        let mut session = ready_session();
        session.roast_at_level(HeatSetting::High, 5, 60);
        session.handle_body(&body(0x63, 300));

        assert!(session.handle_body(&body(0x63, 600)).is_empty());
        assert_eq!(session.connection_state(), ConnectionState::ReadingRecipe);
        assert_eq!(session.current_temp(), 300);
        assert_eq!(session.command_frame().header, [0xAA, 0x55]);

        session.handle_body(&body(0xAF, 300));
        assert_eq!(session.connection_state(), ConnectionState::Ready);
        assert_eq!(session.roast_state(), RoastState::Roast);
    }

    #[test]
    fn idle_forces_heat_off() {
        let mut session = ready_session();
        session.roast_at_level(HeatSetting::High, 4, 30);
        assert_eq!(session.heat_setting(), HeatSetting::High);

        session.idle();
        assert_eq!(session.heat_setting(), HeatSetting::None);
        assert_eq!(session.fan_speed(), 0);
        assert_eq!(session.command_frame().state_code, [0x02, 0x01]);
    }

    #[test]
    fn commands_clamp_inputs() {
        let mut session = ready_session();
        session.roast_to_temperature(900, 12, 30);
        assert_eq!(session.target_temp(), 550);
        assert_eq!(session.fan_speed(), 9);
        assert_eq!(session.heater_mode(), HeaterMode::Thermostat);

        session.cool(0, 30);
        assert_eq!(session.fan_speed(), 1);
        assert_eq!(session.roast_state(), RoastState::Cool);
    }

    #[test]
    fn external_drive_wins_over_thermostat() {
        let mut session = ready_session();
        session.roast_to_temperature(400, 5, 60);
        session.set_external_drive(true);
        assert_eq!(session.heater_mode(), HeaterMode::ExternalDrive);
        assert!(session.heater_modulated());

        session.roast_at_level(HeatSetting::Medium, 5, 60);
        assert_eq!(session.heater_mode(), HeaterMode::ExternalDrive);

        session.set_external_drive(false);
        assert_eq!(session.heater_mode(), HeaterMode::Manual);
        assert!(!session.heater_modulated());
    }

    #[test]
    fn timer_counts_down_then_completes_step() {
        let mut session = ready_session();
        session.roast_at_level(HeatSetting::Medium, 5, 2);

        assert!(session.timer_tick().is_empty());
        assert!(session.timer_tick().is_empty());
        assert_eq!(session.time_remaining(), 0);

        let events = session.timer_tick();
        assert_eq!(events, vec![SessionEvent::StepCompleted(RoastState::Roast)]);
        assert_eq!(session.roast_state(), RoastState::Idle);
        assert_eq!(session.heat_setting(), HeatSetting::None);
        assert_eq!(session.total_time(), 3);

        // Idle does not count.
        assert!(session.timer_tick().is_empty());
        assert_eq!(session.total_time(), 3);
    }

    #[test]
    fn timer_ignored_until_ready_and_after_disconnect() {
        let mut session = Session::default();
        session.cool(5, 10);
        assert!(session.timer_tick().is_empty());
        assert_eq!(session.time_remaining(), 10);

        let mut session = ready_session();
        session.cool(5, 10);
        session.timer_tick();
        assert_eq!(session.time_remaining(), 9);

        session.request_disconnect();
        session.link_closed();
        assert_eq!(session.roast_state(), RoastState::Sleep);
        assert_eq!(session.connection_state(), ConnectionState::NotConnected);
        assert!(session.timer_tick().is_empty());
    }
}
