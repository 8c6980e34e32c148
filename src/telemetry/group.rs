//! Group execution span helpers.

use crate::model::State;
use tracing::Span;

/// Start a span covering one group's run, from spawn to close.
pub fn start_group_span(group: &str, workers: usize) -> Span {
    tracing::info_span!(
        "workgroup.run",
        "workgroup.name" = group,
        "workgroup.workers" = workers,
        "workgroup.state" = tracing::field::Empty,
    )
}

/// Record a lifecycle transition on the given span.
pub fn record_state_transition(span: &Span, from: State, to: State) {
    debug_assert!(from.can_transition_to(to), "{from} -> {to}");
    span.record("workgroup.state", tracing::field::display(to));
    span.in_scope(|| {
        tracing::info!(%from, %to, terminal = to.is_terminal(), "state_transition");
    });
}
