//! Decides what a verified registry event leads to: nothing (duplicate or
//! unconfigured package) or a background run of the package's commands.

use std::sync::Arc;

use steakpie_core::config::Config;
use steakpie_core::event::RegistryPackageEvent;
use steakpie_core::executor::{self, ExecutionReport};
use steakpie_core::runner::CommandRunner;
use steakpie_core::store::{EventStore, NewEvent};
use steakpie_core::CoreError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug)]
pub enum Dispatch {
    /// No commands are configured for the package.
    Unconfigured,
    /// An event with the same identity was already recorded.
    Duplicate,
    /// Commands are running on the blocking pool.
    Started(JoinHandle<ExecutionReport>),
}

/// Built once at startup and shared by every request.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    store: EventStore,
    runner: Arc<dyn CommandRunner>,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>, store: EventStore, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            store,
            runner,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Record the event and, if it is new and the package is configured,
    /// start its commands.
    ///
    /// Only storage failures are errors. Without a delivery ID the event is
    /// not recorded and cannot be deduplicated.
    pub async fn dispatch(
        &self,
        event: &RegistryPackageEvent,
        delivery_id: Option<&str>,
    ) -> Result<Dispatch, CoreError> {
        let package = event.package_name().to_string();
        info!(
            package = %package,
            action = %event.action,
            "processed {} event for package {} (version {})",
            event.action,
            package,
            event.version()
        );

        match delivery_id {
            Some(id) => {
                let inserted = self
                    .store
                    .record_event_async(NewEvent::from_webhook(id, event))
                    .await?;
                if !inserted {
                    info!(
                        package = %package,
                        delivery_id = id,
                        identity = %event.identity(),
                        "duplicate event, skipping"
                    );
                    return Ok(Dispatch::Duplicate);
                }
            }
            None => {
                warn!(package = %package, "no X-GitHub-Delivery header, processing without deduplication");
            }
        }

        let Some(spec) = self.config.commands_for(&package) else {
            info!(package = %package, "no commands configured for package {package}");
            return Ok(Dispatch::Unconfigured);
        };

        let runner = Arc::clone(&self.runner);
        let correlation_id = delivery_id.map(str::to_string);
        let handle = tokio::task::spawn_blocking(move || {
            executor::execute(runner.as_ref(), &spec, &package, correlation_id.as_deref())
        });
        Ok(Dispatch::Started(handle))
    }
}
