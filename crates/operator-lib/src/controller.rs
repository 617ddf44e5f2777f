//! Controller wiring
//!
//! Hooks the reconciler up to `kube::runtime::Controller`: Intents are the
//! primary resource, runtime objects map back through their owner reference
//! and Solver and NamespaceOffloading events through the [`router`].
//!
//! [`router`]: crate::router

use crate::crd::{Intent, NamespaceOffloading, Solver};
use crate::error::{Error, Result};
use crate::health::{components, HealthRegistry};
use crate::observability::StructuredLogger;
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::router;
use crate::store::KubeStore;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Scheduling knobs for the controller loop
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub reconciler: ReconcilerConfig,
    /// Upper bound on reconciles running at once (default: 4)
    pub max_concurrent_reconciles: usize,
    /// Deadline for a single reconcile (default: 30 seconds)
    pub reconcile_timeout: Duration,
    /// Delay before retrying a failed reconcile (default: 10 seconds)
    pub error_requeue: Duration,
    /// Delay before re-deriving conditions of a healthy Intent (default: 5 minutes)
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconciler: ReconcilerConfig::default(),
            max_concurrent_reconciles: 4,
            reconcile_timeout: Duration::from_secs(30),
            error_requeue: Duration::from_secs(10),
            resync_interval: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Reconcile limit handed to the runtime, never zero (which kube reads as unbounded)
    pub fn concurrency_limit(&self) -> u16 {
        u16::try_from(self.max_concurrent_reconciles.max(1)).unwrap_or(u16::MAX)
    }
}

/// State shared by every reconcile
struct Context {
    reconciler: Reconciler<KubeStore>,
    health: HealthRegistry,
    config: ControllerConfig,
}

async fn reconcile(intent: Arc<Intent>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = intent.namespace().unwrap_or_default();
    let name = intent.name_any();

    let result = ctx
        .reconciler
        .reconcile_with_deadline(&namespace, &name, ctx.config.reconcile_timeout)
        .await;
    ctx.health.observe_reconcile(result.as_ref().err()).await;

    let outcome = result?;
    debug!(
        namespace = %namespace,
        name = %name,
        outcome = outcome.as_str(),
        "Reconcile finished"
    );
    Ok(Action::requeue(ctx.config.resync_interval))
}

fn error_policy(intent: Arc<Intent>, error: &Error, ctx: Arc<Context>) -> Action {
    let retry = ctx.config.error_requeue;
    ctx.reconciler.logger().log_reconcile_failure(
        &intent.namespace().unwrap_or_default(),
        &intent.name_any(),
        &error.to_string(),
        retry.as_secs(),
    );
    Action::requeue(retry)
}

/// Run the Intent controller until `shutdown` resolves
pub async fn run_controller<F>(
    client: Client,
    config: ControllerConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + Sync + 'static,
{
    let intents: Api<Intent> = Api::all(client.clone());
    // Fail fast when the CRD is not installed
    intents
        .list(&kube::api::ListParams::default().limit(1))
        .await?;

    let solvers: Api<Solver> = Api::namespaced(client.clone(), &config.reconciler.fluidos_namespace);
    let offloadings: Api<NamespaceOffloading> = Api::all(client.clone());

    info!(
        fluidos_namespace = %config.reconciler.fluidos_namespace,
        max_concurrent_reconciles = config.max_concurrent_reconciles,
        "Starting Intent controller"
    );

    let ctx = Arc::new(Context {
        reconciler: Reconciler::new(
            Arc::new(KubeStore::new(client.clone())),
            config.reconciler.clone(),
            logger,
        ),
        health: health.clone(),
        config,
    });

    health.register(components::CONTROLLER).await;
    health.register(components::OBJECT_STORE).await;

    let wc = watcher::Config::default();
    let runtime_config = controller::Config::default().concurrency(ctx.config.concurrency_limit());
    Controller::new(intents, wc.clone())
        .with_config(runtime_config)
        .watches(Api::<Service>::all(client.clone()), wc.clone(), |obj| {
            router::intent_for_owned(&obj)
        })
        .watches(Api::<Ingress>::all(client.clone()), wc.clone(), |obj| {
            router::intent_for_owned(&obj)
        })
        .watches(Api::<Deployment>::all(client.clone()), wc.clone(), |obj| {
            router::intent_for_owned(&obj)
        })
        .watches(Api::<Job>::all(client), wc.clone(), |obj| {
            router::intent_for_owned(&obj)
        })
        .watches(solvers, wc.clone(), |solver| router::intent_for_solver(&solver))
        .watches(offloadings, wc, |offloading| {
            router::intent_for_offloading(&offloading)
        })
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(object = %object, "Reconciled"),
                Err(e) => warn!(error = %e, "Controller event failed"),
            }
        })
        .await;

    health
        .set_unhealthy(components::CONTROLLER, "Controller stopped")
        .await;
    info!("Intent controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();

        assert_eq!(config.max_concurrent_reconciles, 4);
        assert_eq!(config.reconcile_timeout, Duration::from_secs(30));
        assert_eq!(config.error_requeue, Duration::from_secs(10));
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert_eq!(config.reconciler.fluidos_namespace, "fluidos");
        assert_eq!(config.concurrency_limit(), 4);
    }

    #[test]
    fn test_concurrency_limit_is_bounded() {
        let mut config = ControllerConfig {
            max_concurrent_reconciles: 0,
            ..Default::default()
        };
        assert_eq!(config.concurrency_limit(), 1);

        config.max_concurrent_reconciles = 1_000_000;
        assert_eq!(config.concurrency_limit(), u16::MAX);
    }
}
