use tracing::Level;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

pub mod propagate;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Handle returned by [TracingBuilder::build]. There are no background
/// exporters in this crate (no otlp/tracy sinks are wired up — those are
/// external collaborators), so this is currently just a marker that
/// tracing has been initialized.
#[derive(Clone, Copy)]
pub struct TracingHandle {
    _private: (),
}

pub struct TracingBuilder {
    level: Level,
}

impl Default for TracingBuilder {
    fn default() -> Self {
        TracingBuilder {
            level: Level::INFO,
        }
    }
}

impl TracingBuilder {
    /// Set the log level for the stderr layer. `RUST_LOG` still takes
    /// priority over this value.
    pub fn level(mut self, level: Level) -> TracingBuilder {
        self.level = level;
        self
    }

    /// Set up a compact stderr subscriber filtered by an [EnvFilter] seeded
    /// from `level`, falling back to `RUST_LOG` when set.
    pub fn build(self) -> Result<TracingHandle, Error> {
        let subscriber = tracing_subscriber::fmt()
            .compact()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(self.level.into())
                    .from_env()
                    .expect("invalid RUST_LOG"),
            )
            .finish();

        subscriber.try_init()?;
        Ok(TracingHandle { _private: () })
    }
}
