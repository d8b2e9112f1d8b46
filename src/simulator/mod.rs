//! The per-atomic-model runtime wrapper (§4.3) and the `Dynamics`
//! capability set user code implements.
//!
//! Expressed as a capability set rather than a class hierarchy (§9): a
//! "debug" atomic model is a decorating wrapper, not a subclass.

mod debug;

pub use debug::DebugDynamics;

use fxhash::FxHashMap;
use rand::rngs::StdRng;

use crate::graph::ModelId;
use crate::time::SimTime;
use crate::value::Value;

/// An index into the coordinator's simulator arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimulatorId(pub usize);

/// A single `(destination port, attached value)` external event produced
/// during a simulator's output phase (§3.1).
#[derive(Debug, Clone)]
pub struct ExternalEvent {
    pub port: String,
    pub value: Value,
}

impl ExternalEvent {
    #[must_use]
    pub fn new(port: impl Into<String>, value: Value) -> Self {
        Self { port: port.into(), value }
    }
}

/// A request an executive makes to mutate the model graph, applied by the
/// coordinator at the next safe point (§4.6).
#[derive(Debug, Clone)]
pub enum GraphEdit {
    AddModel {
        name: String,
        dynamics: crate::dynamics::DynamicsRef,
        input_ports: Vec<String>,
        output_ports: Vec<String>,
    },
    DelModel {
        name: String,
    },
    AddInputPort { model: String, port: String },
    DelInputPort { model: String, port: String },
    AddOutputPort { model: String, port: String },
    DelOutputPort { model: String, port: String },
    AddInternalConnection { a: String, port_a: String, b: String, port_b: String },
    RemoveInternalConnection { a: String, port_a: String, b: String, port_b: String },
}

/// The handle an executive dynamics uses to queue graph edits. Edits are
/// buffered here and drained by the coordinator after the observation pass
/// of the step in which they were requested (§4.6 ordering rule).
#[derive(Debug, Default)]
pub struct ExecutiveHandle {
    pub(crate) pending: Vec<GraphEdit>,
    /// The executive's own coupled-model id, so edits can be applied
    /// relative to it.
    pub(crate) parent: Option<ModelId>,
}

impl ExecutiveHandle {
    pub fn add_model(
        &mut self,
        name: impl Into<String>,
        dynamics: crate::dynamics::DynamicsRef,
        input_ports: Vec<String>,
        output_ports: Vec<String>,
    ) {
        self.pending.push(GraphEdit::AddModel {
            name: name.into(),
            dynamics,
            input_ports,
            output_ports,
        });
    }

    pub fn del_model(&mut self, name: impl Into<String>) {
        self.pending.push(GraphEdit::DelModel { name: name.into() });
    }

    pub fn add_input_port(&mut self, model: impl Into<String>, port: impl Into<String>) {
        self.pending.push(GraphEdit::AddInputPort {
            model: model.into(),
            port: port.into(),
        });
    }

    pub fn del_input_port(&mut self, model: impl Into<String>, port: impl Into<String>) {
        self.pending.push(GraphEdit::DelInputPort {
            model: model.into(),
            port: port.into(),
        });
    }

    pub fn add_output_port(&mut self, model: impl Into<String>, port: impl Into<String>) {
        self.pending.push(GraphEdit::AddOutputPort {
            model: model.into(),
            port: port.into(),
        });
    }

    pub fn del_output_port(&mut self, model: impl Into<String>, port: impl Into<String>) {
        self.pending.push(GraphEdit::DelOutputPort {
            model: model.into(),
            port: port.into(),
        });
    }

    pub fn add_connection(
        &mut self,
        a: impl Into<String>,
        port_a: impl Into<String>,
        b: impl Into<String>,
        port_b: impl Into<String>,
    ) {
        self.pending.push(GraphEdit::AddInternalConnection {
            a: a.into(),
            port_a: port_a.into(),
            b: b.into(),
            port_b: port_b.into(),
        });
    }

    pub fn remove_connection(
        &mut self,
        a: impl Into<String>,
        port_a: impl Into<String>,
        b: impl Into<String>,
        port_b: impl Into<String>,
    ) {
        self.pending.push(GraphEdit::RemoveInternalConnection {
            a: a.into(),
            port_a: port_a.into(),
            b: b.into(),
            port_b: port_b.into(),
        });
    }
}

/// The context threaded through every `Dynamics` callback: the contracts
/// the kernel owes the user's behaviour (§4.3) — an injected RNG, the
/// current simulated time, the initial conditions for this atomic model,
/// and (only for executives) a handle to mutate the graph.
pub struct DynamicsCtx<'a> {
    pub time: SimTime,
    pub rng: &'a mut StdRng,
    pub conditions: &'a FxHashMap<String, Vec<Value>>,
    pub executive: Option<&'a mut ExecutiveHandle>,
}

/// The capability set an atomic model's behaviour must implement (§4.3).
///
/// Expressed as a trait rather than a class hierarchy, per §9's design
/// note: a "debug" atomic model is a decorating wrapper
/// ([`DebugDynamics`]), not a subclass, and an executive is just a
/// `Dynamics` that happens to use `ctx.executive`.
pub trait Dynamics: Send {
    /// Sets `tL = time` and returns the first time-advance.
    fn init(&mut self, ctx: &mut DynamicsCtx<'_>) -> f64;

    /// `ta ∈ [0, +∞]`; `f64::INFINITY` means "never reschedule".
    fn time_advance(&self, ctx: &DynamicsCtx<'_>) -> f64;

    /// Called when `tN == now`, just before the internal/confluent
    /// transition.
    fn output(&mut self, ctx: &mut DynamicsCtx<'_>, out: &mut Vec<ExternalEvent>);

    /// `tN == now`, no external input pending.
    fn internal_transition(&mut self, ctx: &mut DynamicsCtx<'_>);

    /// `tN > now`, at least one external event pending.
    fn external_transition(&mut self, ctx: &mut DynamicsCtx<'_>, events: &[ExternalEvent]);

    /// `tN == now` *and* external events arrived. Default resolves the
    /// Open Question in DESIGN.md as internal-then-external; override to
    /// flip the order.
    fn confluent_transitions(&mut self, ctx: &mut DynamicsCtx<'_>, events: &[ExternalEvent]) {
        self.internal_transition(ctx);
        self.external_transition(ctx, events);
    }

    /// Called by a view on the relevant trigger; `None` is dropped rather
    /// than forwarded to the output plugin.
    fn observation(&self, ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value>;

    /// Called once at the end of the simulation.
    fn finish(&mut self, _ctx: &mut DynamicsCtx<'_>) {}
}

/// The per-atomic-model runtime wrapper (§3.1/§4.3).
pub struct Simulator {
    pub id: SimulatorId,
    pub model: ModelId,
    pub dynamics: Box<dyn Dynamics>,
    pub t_l: SimTime,
    pub t_n: SimTime,
    pub pending: Vec<ExternalEvent>,
    pub is_executive: bool,
    pub debug: bool,
}

impl Simulator {
    #[must_use]
    pub fn new(id: SimulatorId, model: ModelId, dynamics: Box<dyn Dynamics>, is_executive: bool) -> Self {
        Self {
            id,
            model,
            dynamics,
            t_l: SimTime::ZERO,
            t_n: SimTime::ZERO,
            pending: Vec::new(),
            is_executive,
            debug: false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    //! Shared `Dynamics` fixtures reused across unit and integration tests.
    use super::*;

    /// Emits one event on `out` every tick and exposes the number of ticks
    /// it has fired via `observation("count")`.
    #[derive(Default)]
    pub struct BeepDynamics {
        pub count: i64,
    }

    impl Dynamics for BeepDynamics {
        fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
            1.0
        }

        fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
            1.0
        }

        fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, out: &mut Vec<ExternalEvent>) {
            out.push(ExternalEvent::new("out", Value::Int(1)));
        }

        fn internal_transition(&mut self, _ctx: &mut DynamicsCtx<'_>) {
            self.count += 1;
        }

        fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, _events: &[ExternalEvent]) {}

        fn observation(&self, _ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value> {
            (port == "count").then_some(Value::Int(self.count))
        }
    }

    /// Counts the number of external events received on `in`, exposed via
    /// `observation("c")`. Never reschedules itself internally.
    #[derive(Default)]
    pub struct CounterDynamics {
        pub count: i64,
    }

    impl Dynamics for CounterDynamics {
        fn init(&mut self, _ctx: &mut DynamicsCtx<'_>) -> f64 {
            f64::INFINITY
        }

        fn time_advance(&self, _ctx: &DynamicsCtx<'_>) -> f64 {
            f64::INFINITY
        }

        fn output(&mut self, _ctx: &mut DynamicsCtx<'_>, _out: &mut Vec<ExternalEvent>) {}

        fn internal_transition(&mut self, _ctx: &mut DynamicsCtx<'_>) {}

        fn external_transition(&mut self, _ctx: &mut DynamicsCtx<'_>, events: &[ExternalEvent]) {
            self.count += events.len() as i64;
        }

        fn observation(&self, _ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value> {
            (port == "c").then_some(Value::Int(self.count))
        }
    }
}
