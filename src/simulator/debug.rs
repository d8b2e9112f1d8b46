//! A decorating wrapper that traces every callback entry/exit, rather than
//! a subclass — per §9's design note and §4.3's "Debug wrapping".

use tracing::Level;

use super::{Dynamics, DynamicsCtx, ExternalEvent};
use crate::value::Value;

/// Wraps a [`Dynamics`] instance, emitting a `tracing` event at `level`
/// around every callback.
pub struct DebugDynamics<D: Dynamics> {
    inner: D,
    level: Level,
    label: String,
}

impl<D: Dynamics> DebugDynamics<D> {
    #[must_use]
    pub fn new(inner: D, label: impl Into<String>, level: Level) -> Self {
        Self {
            inner,
            level,
            label: label.into(),
        }
    }
}

macro_rules! traced {
    ($self:expr, $name:literal, $body:expr) => {{
        match $self.level {
            Level::TRACE => tracing::trace!(model = %$self.label, callback = $name, "enter"),
            Level::DEBUG => tracing::debug!(model = %$self.label, callback = $name, "enter"),
            Level::INFO => tracing::info!(model = %$self.label, callback = $name, "enter"),
            Level::WARN => tracing::warn!(model = %$self.label, callback = $name, "enter"),
            Level::ERROR => tracing::error!(model = %$self.label, callback = $name, "enter"),
        }
        let result = $body;
        match $self.level {
            Level::TRACE => tracing::trace!(model = %$self.label, callback = $name, "exit"),
            Level::DEBUG => tracing::debug!(model = %$self.label, callback = $name, "exit"),
            Level::INFO => tracing::info!(model = %$self.label, callback = $name, "exit"),
            Level::WARN => tracing::warn!(model = %$self.label, callback = $name, "exit"),
            Level::ERROR => tracing::error!(model = %$self.label, callback = $name, "exit"),
        }
        result
    }};
}

impl<D: Dynamics> Dynamics for DebugDynamics<D> {
    fn init(&mut self, ctx: &mut DynamicsCtx<'_>) -> f64 {
        traced!(self, "init", self.inner.init(ctx))
    }

    fn time_advance(&self, ctx: &DynamicsCtx<'_>) -> f64 {
        traced!(self, "time_advance", self.inner.time_advance(ctx))
    }

    fn output(&mut self, ctx: &mut DynamicsCtx<'_>, out: &mut Vec<ExternalEvent>) {
        traced!(self, "output", self.inner.output(ctx, out))
    }

    fn internal_transition(&mut self, ctx: &mut DynamicsCtx<'_>) {
        traced!(self, "internal_transition", self.inner.internal_transition(ctx))
    }

    fn external_transition(&mut self, ctx: &mut DynamicsCtx<'_>, events: &[ExternalEvent]) {
        traced!(self, "external_transition", self.inner.external_transition(ctx, events))
    }

    fn confluent_transitions(&mut self, ctx: &mut DynamicsCtx<'_>, events: &[ExternalEvent]) {
        traced!(self, "confluent_transitions", self.inner.confluent_transitions(ctx, events))
    }

    fn observation(&self, ctx: &DynamicsCtx<'_>, port: &str) -> Option<Value> {
        traced!(self, "observation", self.inner.observation(ctx, port))
    }

    fn finish(&mut self, ctx: &mut DynamicsCtx<'_>) {
        traced!(self, "finish", self.inner.finish(ctx))
    }
}
