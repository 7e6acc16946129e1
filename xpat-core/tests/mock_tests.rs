use core::convert::Infallible;

use xpat_core::utils::controllers::{
    ActuatorSink, ConfigError, Phase, SetpointCommand, SignalId, SignalSource, ThrottleConfig,
    SETPOINT_CHANNEL,
};
use xpat_core::utils::{Duration, SystemController};

const DT: Duration = Duration::from_millis(100);

/// Speed sensor that replays a fixed value, or nothing.
struct MockSpeed {
    value: Option<f32>,
}

impl SignalSource for MockSpeed {
    fn read_scalar(
        &mut self,
        id: SignalId,
    ) -> Option<f32> {
        assert_eq!(id, SignalId::EngineSpeed);
        self.value
    }
}

/// Throttle lever that records every write.
struct MockLever {
    position: Option<f32>,
    writes: Vec<f32>,
}

impl MockLever {
    fn at(position: f32) -> Self {
        MockLever {
            position: Some(position),
            writes: Vec::new(),
        }
    }
}

impl SignalSource for MockLever {
    fn read_scalar(
        &mut self,
        id: SignalId,
    ) -> Option<f32> {
        assert_eq!(id, SignalId::ThrottlePosition);
        self.position
    }
}

impl ActuatorSink for MockLever {
    type Error = Infallible;

    fn write_scalar(
        &mut self,
        id: SignalId,
        value: f32,
    ) -> Result<(), Self::Error> {
        assert_eq!(id, SignalId::ThrottlePosition);
        self.position = Some(value);
        self.writes.push(value);
        Ok(())
    }
}

/// Lever whose writes always fail.
struct StuckLever;

impl SignalSource for StuckLever {
    fn read_scalar(
        &mut self,
        _id: SignalId,
    ) -> Option<f32> {
        Some(0.5)
    }
}

impl ActuatorSink for StuckLever {
    type Error = &'static str;

    fn write_scalar(
        &mut self,
        _id: SignalId,
        _value: f32,
    ) -> Result<(), Self::Error> {
        Err("lever jammed")
    }
}

fn system(
    speed: Option<f32>,
    lever: f32,
) -> SystemController<MockSpeed, MockLever> {
    SystemController::new(
        ThrottleConfig::default(),
        MockSpeed { value: speed },
        MockLever::at(lever),
    )
    .unwrap()
}

#[test]
fn test_disabled_never_writes() {
    let mut sys = system(Some(400.0), 0.2);
    for _ in 0..100 {
        let report = sys.step(DT);
        assert_eq!(report.phase, Phase::Disabled);
    }
    assert!(sys.actuator().writes.is_empty());
    assert_eq!(sys.throttle.state().out_of_tolerance_since, None);
}

#[test]
fn test_holds_pending_then_adjusts_up() {
    let mut sys = system(Some(1000.0), 0.5);
    sys.setpoint.set_target(1200.0);
    sys.setpoint.set_enabled(true);

    let mut write_times = Vec::new();
    for _ in 0..45 {
        let report = sys.step(DT);
        if report.write.is_some() {
            write_times.push(sys.throttle.state().total_elapsed);
        }
    }

    assert_eq!(
        write_times,
        vec![
            Duration::from_millis(2_100),
            Duration::from_millis(3_100),
            Duration::from_millis(4_100),
        ]
    );
    let writes = &sys.actuator().writes;
    assert!(writes.windows(2).all(|w| w[1] > w[0]));
    assert!((writes[0] - 0.504).abs() < 1e-6);
}

#[test]
fn test_adjusts_down_when_overspeed() {
    let mut sys = system(Some(2200.0), 0.8);
    sys.setpoint.set_target(1000.0);
    sys.setpoint.set_enabled(true);
    for _ in 0..21 {
        sys.step(DT);
    }
    // error of 1200 saturates the step
    assert_eq!(sys.actuator().writes.len(), 1);
    assert!((sys.actuator().writes[0] - 0.7).abs() < 1e-6);
}

#[test]
fn test_dropout_does_not_restart_settle() {
    let mut sys = system(Some(1000.0), 0.5);
    sys.setpoint.set_target(1300.0);
    sys.setpoint.set_enabled(true);

    for _ in 0..10 {
        sys.step(DT);
    }
    sys.source_mut().value = None;
    for _ in 0..5 {
        assert_eq!(sys.step(DT).phase, Phase::SignalUnavailable);
    }
    sys.source_mut().value = Some(1000.0);
    for _ in 0..6 {
        sys.step(DT);
    }
    // episode started at 100 ms, so the 2 s settle has elapsed at 2.1 s
    assert_eq!(sys.throttle.state().total_elapsed, Duration::from_millis(2_100));
    assert_eq!(sys.actuator().writes.len(), 1);
}

#[test]
fn test_missing_throttle_reading_skips() {
    let mut sys = SystemController::new(
        ThrottleConfig::default(),
        MockSpeed { value: Some(500.0) },
        MockLever {
            position: None,
            writes: Vec::new(),
        },
    )
    .unwrap();
    sys.setpoint.set_enabled(true);
    for _ in 0..50 {
        assert_eq!(sys.step(DT).phase, Phase::SignalUnavailable);
    }
    assert!(sys.actuator().writes.is_empty());
}

#[test]
fn test_failed_write_is_not_fatal() {
    let mut sys = SystemController::new(
        ThrottleConfig::default(),
        MockSpeed { value: Some(100.0) },
        StuckLever,
    )
    .unwrap();
    sys.setpoint.set_enabled(true);
    let mut attempts = 0;
    for _ in 0..40 {
        if sys.step(DT).write.is_some() {
            attempts += 1;
        }
    }
    assert_eq!(attempts, 2);
}

#[test]
fn test_invalid_config_rejected() {
    let cfg = ThrottleConfig {
        max_step: 0.0,
        ..ThrottleConfig::default()
    };
    assert!(SystemController::new(cfg, MockSpeed { value: None }, MockLever::at(0.0)).is_err());
}

#[test]
fn test_config_from_json_fills_defaults() {
    let cfg: ThrottleConfig = serde_json::from_str(r#"{"base_step": 0.005}"#).unwrap();
    assert_eq!(cfg, ThrottleConfig::coarse());
}

#[test]
fn test_config_with_overflowing_settle_time_rejected() {
    let cfg: ThrottleConfig =
        serde_json::from_str(r#"{"settle_time_ms": 18446744073709551615}"#).unwrap();
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::IntervalTooLong {
            field: "settle_time_ms",
            ..
        })
    ));
    assert!(SystemController::new(cfg, MockSpeed { value: None }, MockLever::at(0.0)).is_err());
}

#[test]
fn test_operator_commands_from_json() {
    let cmd: SetpointCommand = serde_json::from_str(r#"{"sc":"set","t":1449}"#).unwrap();
    assert_eq!(cmd, SetpointCommand::Set { t: 1449.0 });
    let cmd: SetpointCommand = serde_json::from_str(r#"{"sc":"toggle"}"#).unwrap();
    assert_eq!(cmd, SetpointCommand::Toggle);
}

/// The only test that touches the shared channel.
#[test]
fn test_commands_pumped_before_tick() {
    let mut sys = system(Some(1000.0), 0.5);
    SETPOINT_CHANNEL.try_send(SetpointCommand::Set { t: 1449.0 }).unwrap();
    SETPOINT_CHANNEL.try_send(SetpointCommand::Up).unwrap();
    SETPOINT_CHANNEL.try_send(SetpointCommand::Enable).unwrap();

    let report = sys.run_tick(DT);
    assert_eq!(sys.setpoint.get_target(), 1500);
    assert!(sys.setpoint.is_enabled());
    assert_eq!(report.phase, Phase::Settling);
    assert_eq!(sys.pump_commands(), 0);
}

#[test]
fn test_signal_paths() {
    assert!(SignalId::EngineSpeed.data_path().starts_with("sim/"));
    assert_ne!(
        SignalId::EngineSpeed.data_path(),
        SignalId::ThrottlePosition.data_path()
    );
}
