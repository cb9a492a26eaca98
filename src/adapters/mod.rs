//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements                     | Connects to                |
//! |-----------------|--------------------------------|----------------------------|
//! | `config_file`   | ConfigPort                     | JSON file on disk          |
//! | `hardware`      | GpioPort, PwmPort, SensorPort  | the three below, combined  |
//! | `log_sink`      | EventSink                      | `log` facade / env_logger  |
//! | `sensors`       | SensorPort                     | synthetic light / climate  |
//! | `sysfs_gpio`    | GpioPort                       | `/sys/class/gpio`          |
//! | `sysfs_pwm`     | PwmPort                        | `/sys/class/pwm/pwmchipN`  |
//! | `tcp_transport` | Transport                      | broker over TCP            |
//! | `tls_transport` | Transport                      | broker over TLS (rustls)   |
//! | `time`          | Clock                          | `Instant` / `SystemTime`   |

pub mod config_file;
pub mod hardware;
pub mod log_sink;
pub mod sensors;
pub mod sysfs_gpio;
pub mod sysfs_pwm;
pub mod tcp_transport;
pub mod tls_transport;
pub mod time;
