//! The output-plugin contract (§3.1) and a built-in in-memory matrix sink.

use crate::simulator::SimulatorId;
use crate::time::SimTime;
use crate::value::Value;

/// A sink bound to one view, receiving its observed values (§3.1).
///
/// Mode-agnostic: whether a plugin buffers in memory, writes to a file, or
/// streams elsewhere is opaque to the kernel, which only trusts that
/// `finish` returns a matrix (possibly `None`).
pub trait OutputPlugin: Send {
    fn on_parameter(&mut self, _data: &Value) {}

    fn on_new_observable(&mut self, simulator: SimulatorId, port: &str, view: &str, time: SimTime);

    fn on_del_observable(&mut self, simulator: SimulatorId, port: &str, view: &str, time: SimTime);

    fn on_value(&mut self, simulator: SimulatorId, port: &str, view: &str, time: SimTime, value: Value);

    /// Serializes accumulated values into a result matrix and releases any
    /// held resources. Called exactly once per plugin (§8 property 7).
    fn finish(&mut self, time: SimTime) -> Option<Value>;
}

/// The built-in plugin: accumulates `(time, port, value)` rows and
/// serializes them into a [`Value::Table`]-shaped [`Value::Matrix`] on
/// `finish`. Used by tests and by any project that does not bind a
/// third-party output plugin.
#[derive(Debug, Default)]
pub struct MatrixPlugin {
    rows: Vec<(SimTime, String, Value)>,
}

impl OutputPlugin for MatrixPlugin {
    fn on_new_observable(&mut self, _simulator: SimulatorId, _port: &str, _view: &str, _time: SimTime) {}

    fn on_del_observable(&mut self, _simulator: SimulatorId, _port: &str, _view: &str, _time: SimTime) {}

    fn on_value(&mut self, _simulator: SimulatorId, port: &str, _view: &str, time: SimTime, value: Value) {
        self.rows.push((time, port.to_string(), value));
    }

    fn finish(&mut self, _time: SimTime) -> Option<Value> {
        let rows = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|(time, port, value)| vec![Value::Double(time.raw()), Value::String(port), value])
            .collect();
        Some(Value::Matrix(rows))
    }
}
