//! Lifecycle metric hooks.
//!
//! Events go out as `trace!` records under a `runmesh` span; the binary
//! decides where they end up through its subscriber.

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::trace_span!("runmesh", event);
    let _entered = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}
