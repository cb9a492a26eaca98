//! System configuration parameters
//!
//! All tunable parameters for the greenhouse controller.  Every section
//! carries `#[serde(default)]`, so a config file only needs the keys it
//! overrides (typically the device credentials).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
    pub decision: DecisionConfig,
    pub curtain: CurtainConfig,
    pub hardware: HardwareConfig,
}

/// Cloud identity of this device (IoT platform triple).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub product_key: String,
    pub device_name: String,
    /// Signing key for the broker password.  Never logged.
    pub device_secret: String,
    pub region_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            product_key: "k1zfks5ATvF".into(),
            device_name: "rk3588".into(),
            device_secret: String::new(),
            region_id: "cn-shanghai".into(),
        }
    }
}

/// Broker connection and reporting cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host override.  `None` derives the regional endpoint.
    pub host: Option<String>,
    pub port: u16,
    /// CONNECT keep-alive (seconds)
    pub keep_alive_secs: u16,
    /// Telemetry report interval (seconds)
    pub report_interval_secs: u32,
    /// PINGREQ interval (seconds)
    pub heartbeat_interval_secs: u32,
    /// Reconnect attempts before giving up
    pub max_reconnect_count: u32,
    pub auto_reconnect: bool,
    /// TCP connect timeout (milliseconds); also bounds the TLS handshake
    pub connect_timeout_ms: u32,
    /// Wrap the broker connection in TLS (the platform listens on 8883)
    pub use_tls: bool,
    /// PEM trust anchors for TLS.  `None` uses the native root store.
    pub ca_file: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 1883,
            keep_alive_secs: 60,
            report_interval_secs: 10,
            heartbeat_interval_secs: 300, // 5 min
            max_reconnect_count: 3,
            auto_reconnect: true,
            connect_timeout_ms: 5000,
            use_tls: false,
            ca_file: None,
        }
    }
}

/// Light-driven curtain policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Lux above which the top curtain is opened
    pub open_threshold_lux: f32,
    /// Lux below which the top curtain is closed
    pub close_threshold_lux: f32,
    /// How long an automatic operation drives the motor (seconds)
    pub operation_duration_secs: u32,
    /// Quiet period before the latest reading is evaluated (seconds)
    pub debounce_interval_secs: u32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            open_threshold_lux: 500.0,
            close_threshold_lux: 300.0,
            operation_duration_secs: 18,
            debounce_interval_secs: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurtainConfig {
    /// Wait after commanding a motor before the motion counts as done (ms)
    pub settle_delay_ms: u32,
}

impl Default for CurtainConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
        }
    }
}

/// Host paths and loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub gpio_root: String,
    pub pwm_chip: String,
    pub pwm_period_ns: u32,
    /// Sensor sampling interval (milliseconds)
    pub sensor_interval_ms: u32,
    /// Event-loop sleep between ticks (milliseconds)
    pub loop_interval_ms: u32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            gpio_root: "/sys/class/gpio".into(),
            pwm_chip: "/sys/class/pwm/pwmchip0".into(),
            pwm_period_ns: 1_000_000, // 1 kHz
            sensor_interval_ms: 2000,
            loop_interval_ms: 20,
        }
    }
}

impl SystemConfig {
    /// Broker host: the explicit override, or the regional IoT endpoint.
    pub fn broker_host(&self) -> String {
        match &self.mqtt.host {
            Some(host) => host.clone(),
            None => format!(
                "{}.iot-as-mqtt.{}.aliyuncs.com",
                self.device.product_key, self.device.region_id
            ),
        }
    }

    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.product_key.is_empty() {
            return Err(ConfigError::ValidationFailed("device.product_key is empty"));
        }
        if self.device.device_name.is_empty() {
            return Err(ConfigError::ValidationFailed("device.device_name is empty"));
        }
        let d = &self.decision;
        if !(d.close_threshold_lux >= 0.0 && d.open_threshold_lux > d.close_threshold_lux) {
            return Err(ConfigError::ValidationFailed(
                "decision thresholds: need open > close >= 0",
            ));
        }
        if d.operation_duration_secs == 0 || d.debounce_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed("decision intervals must be > 0"));
        }
        let m = &self.mqtt;
        if m.report_interval_secs == 0 || m.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed("mqtt intervals must be > 0"));
        }
        if m.port == 0 {
            return Err(ConfigError::ValidationFailed("mqtt.port must be > 0"));
        }
        if m.ca_file.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::ValidationFailed("mqtt.ca_file is empty"));
        }
        if self.curtain.settle_delay_ms == 0 {
            return Err(ConfigError::ValidationFailed("curtain.settle_delay_ms must be > 0"));
        }
        let h = &self.hardware;
        if h.pwm_period_ns == 0 || h.sensor_interval_ms == 0 || h.loop_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("hardware timings must be > 0"));
        }
        Ok(())
    }
}
