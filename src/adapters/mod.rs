//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements          | Connects to                    |
//! |-------------|---------------------|--------------------------------|
//! | `chardev`   | (driving)           | read / write / control surface |
//! | `log_sink`  | EventSink           | `log` facade                   |
//! | `sim`       | GpioPort, PwmDevice | In-memory lines and PWM chip   |
//! |             | PwmBus              |                                |
//! | `sysfs`     | GpioPort, PwmDevice | `/sys/class/gpio`, `/sys/class/pwm` |
//! |             | PwmBus              |                                |

pub mod chardev;
pub mod log_sink;
pub mod sim;

#[cfg(all(target_os = "linux", feature = "sysfs"))]
pub mod sysfs;
