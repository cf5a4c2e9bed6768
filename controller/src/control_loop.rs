use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use sr700_common::{
    ConnectKind, ConnectionState, HeatScheduler, HeaterMode, PacketDecoder, PidController,
    RoastState, RoasterConfig, RoasterStatus, Session, SessionEvent,
};
use tokio::sync::{
    mpsc::{error::TryRecvError, UnboundedReceiver, WeakUnboundedSender},
    watch,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    command::{Command, CompletionCallback, ConnectCallback, RoasterObserver},
    timer::RoastTimer,
    transport::{Connector, Transport},
};

const TIMER_PERIOD: Duration = Duration::from_secs(1);
const POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    Continue,
    Disconnect,
}

/// PID plus bang-bang scheduler for one connection.
struct HeaterDrive {
    pid: PidController,
    scheduler: HeatScheduler,
}

impl HeaterDrive {
    fn new(config: &RoasterConfig) -> Self {
        let scheduler = HeatScheduler::new(config.heater_segments);
        let pid = PidController::new(config.pid, 0.0, scheduler.segment_count() as f64);
        Self { pid, scheduler }
    }

    fn step(&mut self, session: &mut Session) {
        if !session.heater_modulated() {
            return;
        }
        if session.roast_state() != RoastState::Roast {
            self.scheduler.set_heat_level(0);
            session.set_heater_level(0);
            session.apply_heater_pulse(false);
            return;
        }

        if self.scheduler.about_to_roll_over() {
            let level = match session.heater_mode() {
                HeaterMode::ExternalDrive => session.heater_level(),
                _ => {
                    let current = session.current_temp();
                    let target = session.target_temp();
                    let output = self.pid.update(f64::from(current), f64::from(target));
                    debug!(current, target, output, "heater window rollover");
                    output as i64
                }
            };
            self.scheduler.set_heat_level(level);
        }
        session.apply_heater_pulse(self.scheduler.tick());
    }
}

/// Owns the session and every callback. Runs on its own thread; the
/// foreground only reaches it through the command queue and reads back the
/// status channel.
pub struct ControlLoop {
    config: RoasterConfig,
    session: Session,
    decoder: PacketDecoder,

    commands: UnboundedReceiver<Command>,
    ticks: WeakUnboundedSender<Command>,
    status: watch::Sender<RoasterStatus>,
    observer: Option<Arc<dyn RoasterObserver>>,

    on_connect: Option<ConnectCallback>,
    on_roast_complete: Option<CompletionCallback>,
    on_cool_complete: Option<CompletionCallback>,

    timer: Option<RoastTimer>,
    timer_generation: u64,

    write_failures: u32,
    read_failures: u32,
    disconnect_requested: bool,
    terminate_requested: bool,
    auto_reconnect: bool,
}

impl ControlLoop {
    pub fn new(
        config: RoasterConfig,
        commands: UnboundedReceiver<Command>,
        ticks: WeakUnboundedSender<Command>,
        status: watch::Sender<RoasterStatus>,
        observer: Option<Arc<dyn RoasterObserver>>,
    ) -> Self {
        let session = Session::new(config.ext_heater_drive);
        status.send_replace(session.status());

        Self {
            config,
            session,
            decoder: PacketDecoder::new(),
            commands,
            ticks,
            status,
            observer,
            on_connect: None,
            on_roast_complete: None,
            on_cool_complete: None,
            timer: None,
            timer_generation: 0,
            write_failures: 0,
            read_failures: 0,
            disconnect_requested: false,
            terminate_requested: false,
            auto_reconnect: false,
        }
    }

    pub fn run(mut self, mut connector: Box<dyn Connector>) {
        info!("control loop started for {}", connector.describe());

        while let Some(kind) = self.wait_for_connect() {
            let Some(mut link) = self.establish(connector.as_mut(), kind) else {
                continue;
            };
            let forced = self.exchange(link.as_mut());
            link.close();
            self.finish_disconnect(forced);
        }

        self.stop_timer();
        info!("control loop exited");
    }

    fn wait_for_connect(&mut self) -> Option<ConnectKind> {
        loop {
            if self.terminate_requested {
                return None;
            }
            if self.session.connection_state() == ConnectionState::AttemptingConnect {
                return Some(self.session.connect_kind().unwrap_or(ConnectKind::SingleShot));
            }
            match self.commands.blocking_recv() {
                Some(command) => self.apply(command),
                None => self.handle_dropped(),
            }
        }
    }

    fn establish(
        &mut self,
        connector: &mut dyn Connector,
        kind: ConnectKind,
    ) -> Option<Box<dyn Transport>> {
        let retry = Duration::from_millis(self.config.auto_connect_retry_ms);

        loop {
            self.session.transport_opening();
            self.publish();

            match connector.open() {
                Ok(link) => {
                    self.session.transport_opened();
                    self.decoder.reset();
                    self.write_failures = 0;
                    self.read_failures = 0;
                    self.publish();
                    info!("port open, reading roaster recipe");
                    return Some(link);
                }
                Err(err) => {
                    error!("connect failed: {err}");
                    if kind == ConnectKind::Auto && self.auto_reconnect {
                        self.pause(retry);
                        if self.auto_reconnect && !self.terminate_requested {
                            debug!("retrying connect to {}", connector.describe());
                            continue;
                        }
                    }
                    let events = self.session.connect_failed();
                    self.publish();
                    self.dispatch(events);
                    return None;
                }
            }
        }
    }

    /// Returns true when the link was dropped after exhausting retries.
    fn exchange(&mut self, link: &mut dyn Transport) -> bool {
        let mut heater = HeaterDrive::new(&self.config);
        let interval = Duration::from_millis(self.config.loop_interval_ms);

        loop {
            let started = Instant::now();

            self.drain_commands();
            if self.disconnect_requested || self.terminate_requested {
                return false;
            }
            if self.cycle(link, &mut heater) == CycleOutcome::Disconnect {
                return true;
            }

            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    fn cycle(&mut self, link: &mut dyn Transport, heater: &mut HeaterDrive) -> CycleOutcome {
        let packet = self.session.command_frame().encode();
        trace!("tx {}", hex(&packet));

        match link.write(&packet) {
            Ok(_) => self.write_failures = 0,
            Err(err) => {
                self.write_failures += 1;
                warn!("write failed ({}): {err}", self.write_failures);
                if self.write_failures > self.config.max_io_failures {
                    error!("too many write failures, disconnecting");
                    return CycleOutcome::Disconnect;
                }
            }
        }

        loop {
            match link.read_byte() {
                Ok(Some(byte)) => {
                    self.write_failures = 0;
                    self.read_failures = 0;
                    self.feed(byte);
                }
                Ok(None) => break,
                Err(err) => {
                    self.read_failures += 1;
                    warn!("read failed ({}): {err}", self.read_failures);
                    if self.read_failures > self.config.max_io_failures {
                        error!("too many read failures, disconnecting");
                        return CycleOutcome::Disconnect;
                    }
                    break;
                }
            }
        }

        heater.step(&mut self.session);
        self.publish();
        CycleOutcome::Continue
    }

    fn feed(&mut self, byte: u8) {
        match self.decoder.push(byte) {
            Some(Ok(body)) => {
                trace!("rx {}", hex(body.bytes()));
                let events = self.session.handle_body(&body);
                if self.session.connection_state() == ConnectionState::Ready {
                    self.start_timer();
                }
                self.publish();
                self.dispatch(events);
            }
            Some(Err(err)) => debug!("dropped frame: {err}"),
            None => {}
        }
    }

    fn apply(&mut self, command: Command) {
        trace!("command {}", command.name());

        match command {
            Command::Connect {
                kind,
                on_result,
                accepted,
            } => {
                let ok = self.session.begin_connect(kind);
                if let Some(accepted) = accepted {
                    let _ = accepted.send(ok);
                }
                if ok {
                    info!("connect requested ({kind:?})");
                    self.on_connect = on_result;
                    self.auto_reconnect = kind == ConnectKind::Auto;
                    self.disconnect_requested = false;
                } else {
                    warn!(
                        "connect ignored while {}",
                        self.session.connection_state().as_str()
                    );
                    if let Some(on_result) = on_result {
                        on_result(ConnectionState::NotConnected);
                    }
                }
            }
            Command::RoastAtLevel {
                level,
                fan,
                seconds,
                on_complete,
            } => {
                self.session.roast_at_level(level, fan, seconds);
                self.on_roast_complete = on_complete;
                self.on_cool_complete = None;
            }
            Command::RoastToTemperature {
                temperature,
                fan,
                seconds,
                on_complete,
            } => {
                self.session.roast_to_temperature(temperature, fan, seconds);
                self.on_roast_complete = on_complete;
                self.on_cool_complete = None;
            }
            Command::Cool {
                fan,
                seconds,
                on_complete,
            } => {
                self.session.cool(fan, seconds);
                self.on_cool_complete = on_complete;
                self.on_roast_complete = None;
            }
            Command::Idle => {
                self.session.idle();
                self.on_roast_complete = None;
                self.on_cool_complete = None;
            }
            Command::Sleep => self.session.sleep(),
            Command::SetExternalDrive(enabled) => self.session.set_external_drive(enabled),
            Command::SetHeaterLevel(level) => self.session.set_heater_level(level),
            Command::Disconnect => self.request_disconnect(),
            Command::Terminate => {
                self.request_disconnect();
                self.terminate_requested = true;
            }
            Command::TimerTick(generation) => {
                if self.timer.as_ref().map(RoastTimer::generation) != Some(generation) {
                    trace!("stale tick from timer {generation}");
                    return;
                }
                let events = self.session.timer_tick();
                self.publish();
                self.dispatch(events);
                return;
            }
        }

        self.publish();
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.handle_dropped();
                    break;
                }
            }
        }
    }

    fn handle_dropped(&mut self) {
        if !self.terminate_requested {
            warn!("roaster handle dropped, shutting down");
            self.request_disconnect();
            self.terminate_requested = true;
        }
    }

    /// Sleeps between auto-connect attempts while still taking commands.
    fn pause(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.auto_reconnect && !self.terminate_requested {
            let rest = deadline.saturating_duration_since(Instant::now());
            if rest.is_zero() {
                break;
            }
            self.drain_commands();
            thread::sleep(rest.min(POLL_SLICE));
        }
    }

    fn request_disconnect(&mut self) {
        self.stop_timer();
        self.session.request_disconnect();
        self.auto_reconnect = false;

        match self.session.connection_state() {
            ConnectionState::NotConnected => {}
            ConnectionState::AttemptingConnect => {
                info!("connect cancelled");
                let events = self.session.connect_failed();
                self.publish();
                self.dispatch(events);
            }
            _ => {
                info!("disconnect requested");
                self.disconnect_requested = true;
            }
        }
    }

    fn finish_disconnect(&mut self, forced: bool) {
        self.stop_timer();
        self.session.link_closed();
        self.disconnect_requested = false;
        self.decoder.reset();
        self.publish();

        if forced {
            warn!("link lost");
        } else {
            info!("disconnected");
        }

        // Handshake never reached ready.
        if let Some(on_connect) = self.on_connect.take() {
            on_connect(ConnectionState::NotConnected);
        }
        if let Some(observer) = &self.observer {
            observer.disconnected();
        }

        if forced && self.auto_reconnect && !self.terminate_requested {
            info!("auto-connect enabled, reconnecting");
            self.session.begin_connect(ConnectKind::Auto);
            self.publish();
        }
    }

    fn start_timer(&mut self) {
        if self.timer.is_some() {
            return;
        }
        self.timer_generation += 1;
        match RoastTimer::start(self.ticks.clone(), TIMER_PERIOD, self.timer_generation) {
            Ok(timer) => self.timer = Some(timer),
            Err(err) => error!("failed to start roast timer: {err}"),
        }
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.session.status());
    }

    /// Always called after `publish`, so callbacks see the state they report.
    fn dispatch(&mut self, events: Vec<SessionEvent>) {
        for event in events {
            match event {
                SessionEvent::Connected(state) => {
                    if let Some(on_connect) = self.on_connect.take() {
                        on_connect(state);
                    }
                    if let Some(observer) = &self.observer {
                        observer.connected(state);
                    }
                }
                SessionEvent::TemperatureChanged {
                    temperature,
                    time_remaining,
                } => {
                    if let Some(observer) = &self.observer {
                        observer.temperature_changed(temperature, time_remaining);
                    }
                }
                SessionEvent::StepCompleted(state) => {
                    let callback = match state {
                        RoastState::Roast => self.on_roast_complete.take(),
                        RoastState::Cool => self.on_cool_complete.take(),
                        _ => None,
                    };
                    if let Some(callback) = callback {
                        callback();
                    }
                    if let Some(observer) = &self.observer {
                        observer.step_completed(state);
                    }
                }
            }
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}
