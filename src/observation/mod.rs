//! View registry, output-plugin dispatch, and the trigger logic that
//! multiplexes an atomic model's `observation()` calls to sinks (§4.7).

mod plugin;

pub use plugin::{MatrixPlugin, OutputPlugin};

use fxhash::FxHashMap;

use crate::simulator::SimulatorId;
use crate::time::SimTime;
use crate::value::Value;

/// An index into the root coordinator's view table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub usize);

bitflags::bitflags! {
    /// Which triggers fire a view (§3.1, §4.7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ViewTrigger: u8 {
        const TIMED     = 0b0000_0001;
        const FINISH    = 0b0000_0010;
        const INTERNAL  = 0b0000_0100;
        const EXTERNAL  = 0b0000_1000;
        const CONFLUENT = 0b0001_0000;
        const OUTPUT    = 0b0010_0000;
    }
}

/// A view's static configuration (§3.1).
#[derive(Debug, Clone)]
pub struct View {
    pub name: String,
    pub output_name: String,
    pub triggers: ViewTrigger,
    /// Required iff `triggers` contains `TIMED`.
    pub timestep: Option<f64>,
    pub enabled: bool,
}

impl View {
    #[must_use]
    pub fn new(name: impl Into<String>, output_name: impl Into<String>, triggers: ViewTrigger) -> Self {
        Self {
            name: name.into(),
            output_name: output_name.into(),
            triggers,
            timestep: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = Some(timestep);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A named bag of observable ports, referenced by atomic models (§3.1).
///
/// Each port binds to one or more views; a model may reference at most one
/// observable.
#[derive(Debug, Clone, Default)]
pub struct Observable {
    pub name: String,
    /// `port -> {view}`.
    pub ports: FxHashMap<String, Vec<ViewId>>,
}

impl Observable {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: FxHashMap::default(),
        }
    }

    pub fn bind(&mut self, port: impl Into<String>, view: ViewId) {
        self.ports.entry(port.into()).or_default().push(view);
    }
}

/// Per-view runtime state: the plugin sink and which (simulator, port) pairs
/// are currently bound to it, for `onNewObservable`/`onDelObservable`
/// bookkeeping.
pub struct ViewState {
    pub view: View,
    pub plugin: Box<dyn OutputPlugin>,
    bound: Vec<(SimulatorId, String)>,
}

impl ViewState {
    #[must_use]
    pub fn new(view: View, plugin: Box<dyn OutputPlugin>) -> Self {
        Self {
            view,
            plugin,
            bound: Vec::new(),
        }
    }

    /// Registers a (simulator, port) linkage and notifies the plugin,
    /// unless the view is disabled (§4.7: disabled views still receive
    /// `onNewObservable` at init, per spec — so this call is unconditional;
    /// only `onValue`/`finish` are gated by `enabled`).
    pub fn bind(&mut self, sim: SimulatorId, port: impl Into<String>, time: SimTime) {
        let port = port.into();
        self.plugin.on_new_observable(sim, &port, &self.view.name, time);
        self.bound.push((sim, port));
    }

    pub fn unbind_all_for(&mut self, sim: SimulatorId, time: SimTime) {
        self.bound.retain(|(s, port)| {
            if *s == sim {
                self.plugin.on_del_observable(sim, port, &self.view.name, time);
                false
            } else {
                true
            }
        });
    }

    /// Forwards a non-null observation to the plugin, unless the view is
    /// disabled (§4.7, §8 property 5).
    pub fn push_value(&mut self, sim: SimulatorId, port: &str, time: SimTime, value: Value) {
        if self.view.enabled {
            self.plugin.on_value(sim, port, &self.view.name, time, value);
        }
    }

    /// Serializes the view's buffered values, or `None` if disabled (§8
    /// property 5: a disabled view produces no matrix entry).
    pub fn finish(&mut self, time: SimTime) -> Option<Value> {
        if self.view.enabled {
            self.plugin.finish(time)
        } else {
            None
        }
    }
}
