use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint};

fn url_wants_wait_connect(url: &url::Url) -> bool {
    url.query_pairs()
        .filter(|(k, v)| k == "wait-connect" && v == "1")
        .count()
        > 0
}

/// Turn a [url::Url] into a [Channel] if it can be parsed successfully.
/// Supports `grpc+unix:/path/to/socket`, as well as the regular schemes
/// supported by tonic, prefixed with `grpc+` — e.g. `grpc+http://[::1]:8000`.
/// `wait-connect=1` requests an eager connection instead of the default lazy
/// one.
pub async fn channel_from_url(url: &url::Url) -> Result<Channel, Error> {
    let unprefixed_url_str = match url.to_string().strip_prefix("grpc+") {
        None => return Err(Error::MissingGRPCPrefix()),
        Some(url_str) => url_str.to_owned(),
    };

    if url.scheme() == "grpc+unix" {
        if url.host_str().is_some() {
            return Err(Error::HostSetForUnixSocket());
        }

        let connector = tower::service_fn({
            let url = url.clone();
            move |_: tonic::transport::Uri| UnixStream::connect(url.path().to_string().clone())
        });

        let channel = if url_wants_wait_connect(url) {
            Endpoint::from_static("http://[::]:50051")
                .connect_with_connector(connector)
                .await?
        } else {
            Endpoint::from_static("http://[::]:50051").connect_with_connector_lazy(connector)
        };

        return Ok(channel);
    }

    if !url.path().is_empty() {
        return Err(Error::PathMayNotBeSet());
    }

    let endpoint = Endpoint::try_from(unprefixed_url_str)?;
    let channel = if url_wants_wait_connect(url) {
        endpoint.connect().await?
    } else {
        endpoint.connect_lazy()
    };

    Ok(channel)
}

/// Build a `grpc+http://{host}:{port}` channel for a worker address. This is
/// the constructor the chunk-stream client pool uses for every piece, since
/// pieces only ever carry a bare host/port, never a socket path.
pub async fn channel_for_host_port(host: &str, port: u16) -> Result<Channel, Error> {
    let url = url::Url::parse(&format!("grpc+http://{host}:{port}"))
        .map_err(|e| Error::InvalidAddress(host.to_owned(), port, e.to_string()))?;
    channel_from_url(&url).await
}

/// Errors occurring when trying to connect to a backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("grpc+ prefix is missing from URL")]
    MissingGRPCPrefix(),

    #[error("host may not be set for unix domain sockets")]
    HostSetForUnixSocket(),

    #[error("path may not be set")]
    PathMayNotBeSet(),

    #[error("invalid worker address {0}:{1}: {2}")]
    InvalidAddress(String, u16, String),

    #[error("transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),
}
