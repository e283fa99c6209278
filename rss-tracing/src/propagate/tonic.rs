/// Trace context propagation hook: associates the current span with the
/// trace of an inbound request. A noop in this crate, since no otlp
/// exporter is wired up here — kept so callers can thread requests through
/// it without caring whether a future build enables one.
pub fn accept_trace<B>(request: http::Request<B>) -> http::Request<B> {
    request
}

/// Trace context propagation hook: injects the current span into an
/// outbound gRPC request's metadata. A noop in this crate for the same
/// reason as [accept_trace].
pub fn send_trace<T>(request: tonic::Request<T>) -> Result<tonic::Request<T>, tonic::Status> {
    Ok(request)
}
