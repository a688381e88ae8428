pub mod controller;
pub mod fake;
pub mod traits;
pub mod xdo;

#[cfg(test)]
mod controller_tests;

pub use controller::WindowController;
pub use fake::{ActuatorEvent, FakeActuator};
pub use traits::{Actuator, ActuatorResult, Key, Rect, WindowHandle, WindowId, WindowMatch};
pub use xdo::XdoActuator;
