//! The asset router: classify, check availability, run the provider flow
//! behind its circuit breaker.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use meshpilot_config::{AgentConfig, BreakerSettings};
use meshpilot_core::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker, GuardError};
use meshpilot_core::error::AssetError;
use meshpilot_core::host::HostPort;

use crate::availability::AvailabilityCache;
use crate::intent::{AssetIntent, AssetKind, AssetProvider, classify};
use crate::{hyper3d, polyhaven, sketchfab};

/// A successfully imported asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedAsset {
    pub name: String,
    pub provider: AssetProvider,
    pub kind: AssetKind,
}

/// What routing a prompt produced. `NoIntent`, `NotAvailable`, and
/// `Failed` all leave the fallback decision to the caller.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The prompt does not describe an asset request.
    NoIntent,
    /// The chosen integration is disabled on the host, or its breaker
    /// rejected the call.
    NotAvailable { provider: AssetProvider },
    Imported(ImportedAsset),
    Failed {
        provider: AssetProvider,
        error: AssetError,
    },
}

/// Routes asset prompts to provider flows. Shared across requests; the
/// breakers and the availability cache are the shared state.
pub struct AssetRouter {
    host: Arc<dyn HostPort>,
    availability: AvailabilityCache,
    hyper3d_breaker: CircuitBreaker,
    sketchfab_breaker: CircuitBreaker,
    polyhaven_breaker: CircuitBreaker,
}

impl AssetRouter {
    pub fn new(
        host: Arc<dyn HostPort>,
        breaker: &BreakerSettings,
        agent: &AgentConfig,
    ) -> Self {
        let config = BreakerConfig {
            failure_threshold: breaker.failure_threshold,
            open_timeout: Duration::from_secs(breaker.open_timeout_secs),
            half_open_successes: breaker.half_open_successes,
        };
        Self {
            host,
            availability: AvailabilityCache::new(Duration::from_secs(agent.availability_ttl_secs)),
            hyper3d_breaker: CircuitBreaker::new(AssetProvider::Hyper3d.name(), config.clone()),
            sketchfab_breaker: CircuitBreaker::new(AssetProvider::Sketchfab.name(), config.clone()),
            polyhaven_breaker: CircuitBreaker::new(AssetProvider::PolyHaven.name(), config),
        }
    }

    /// Drop the cached availability map; the next route refreshes it.
    pub fn refresh_availability(&self) {
        self.availability.invalidate();
    }

    /// Classify and execute an asset request.
    pub async fn route(&self, prompt: &str, attachments: &[String]) -> RouteOutcome {
        let Some(intent) = classify(prompt) else {
            return RouteOutcome::NoIntent;
        };

        let map = self.availability.get(self.host.as_ref()).await;
        if !map.is_available(intent.provider) {
            info!(provider = intent.provider.name(), "Integration unavailable");
            return RouteOutcome::NotAvailable {
                provider: intent.provider,
            };
        }

        let breaker = self.breaker_for(intent.provider);
        let result = breaker
            .execute(|| self.run_flow(&intent, prompt, attachments))
            .await;

        match result {
            Ok(asset) => RouteOutcome::Imported(asset),
            Err(GuardError::Rejected(e)) => {
                warn!(error = %e, "Asset call rejected by breaker");
                RouteOutcome::NotAvailable {
                    provider: intent.provider,
                }
            }
            Err(GuardError::Inner(error)) => RouteOutcome::Failed {
                provider: intent.provider,
                error,
            },
        }
    }

    async fn run_flow(
        &self,
        intent: &AssetIntent,
        prompt: &str,
        attachments: &[String],
    ) -> Result<ImportedAsset, AssetError> {
        let host = self.host.as_ref();
        match intent.provider {
            AssetProvider::Hyper3d => {
                hyper3d::generate(host, prompt, &intent.keywords, attachments).await
            }
            AssetProvider::Sketchfab => {
                sketchfab::search_and_import(host, &intent.keywords.join(" ")).await
            }
            AssetProvider::PolyHaven => {
                polyhaven::search_and_import(host, &intent.keywords, intent.kind).await
            }
        }
    }

    fn breaker_for(&self, provider: AssetProvider) -> &CircuitBreaker {
        match provider {
            AssetProvider::Hyper3d => &self.hyper3d_breaker,
            AssetProvider::Sketchfab => &self.sketchfab_breaker,
            AssetProvider::PolyHaven => &self.polyhaven_breaker,
        }
    }

    /// Breaker states for status reporting.
    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        vec![
            self.hyper3d_breaker.snapshot(),
            self.sketchfab_breaker.snapshot(),
            self.polyhaven_breaker.snapshot(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_host::ScriptedHost;
    use meshpilot_core::host::commands;
    use serde_json::json;

    fn router_with(host: ScriptedHost) -> AssetRouter {
        AssetRouter::new(
            Arc::new(host),
            &BreakerSettings::default(),
            &AgentConfig::default(),
        )
    }

    fn all_available(host: &ScriptedHost) {
        host.respond(commands::GET_POLYHAVEN_STATUS, json!({"enabled": true}));
        host.respond(commands::GET_HYPER3D_STATUS, json!({"enabled": true}));
        host.respond(commands::GET_SKETCHFAB_STATUS, json!({"enabled": true}));
    }

    #[tokio::test(start_paused = true)]
    async fn non_asset_prompt_has_no_intent() {
        let host = ScriptedHost::new();
        let router = router_with(host);
        assert!(matches!(
            router.route("create a red cube", &[]).await,
            RouteOutcome::NoIntent
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_integration_reports_not_available() {
        let host = ScriptedHost::new();
        all_available(&host);
        host.respond(commands::GET_SKETCHFAB_STATUS, json!({"enabled": false}));

        let router = router_with(host);
        match router.route("import a wooden chair", &[]).await {
            RouteOutcome::NotAvailable { provider } => {
                assert_eq!(provider, AssetProvider::Sketchfab)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn catalogue_route_imports() {
        let host = ScriptedHost::new();
        all_available(&host);
        host.respond(
            commands::SEARCH_SKETCHFAB_MODELS,
            json!({"results": [{"uid": "u9", "name": "Wooden Chair", "isDownloadable": true}]}),
        );
        host.respond(commands::DOWNLOAD_SKETCHFAB_MODEL, json!({"ok": true}));

        let router = router_with(host);
        match router.route("import a wooden chair", &[]).await {
            RouteOutcome::Imported(asset) => {
                assert_eq!(asset.name, "Wooden Chair");
                assert_eq!(asset.provider, AssetProvider::Sketchfab);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_after_repeated_failures() {
        let host = ScriptedHost::new();
        all_available(&host);
        // No polyhaven search reply scripted: every flow call fails.
        let router = router_with(host);

        for _ in 0..4 {
            assert!(matches!(
                router.route("download a brick texture", &[]).await,
                RouteOutcome::Failed { .. }
            ));
        }

        // Breaker now open: no further provider calls, reported unavailable.
        let outcome = router.route("download a brick texture", &[]).await;
        assert!(matches!(outcome, RouteOutcome::NotAvailable { .. }));

        let snapshots = router.breaker_snapshots();
        let polyhaven = snapshots
            .iter()
            .find(|s| s.name == "polyhaven")
            .unwrap();
        assert_eq!(
            polyhaven.state,
            meshpilot_core::breaker::BreakerState::Open
        );
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_skips_provider_call() {
        let host = Arc::new(ScriptedHost::new());
        all_available(&host);
        let router = AssetRouter::new(
            host.clone(),
            &BreakerSettings::default(),
            &AgentConfig::default(),
        );

        for _ in 0..4 {
            let _ = router.route("download a brick texture", &[]).await;
        }
        let searches = host.calls_for(commands::SEARCH_POLYHAVEN_ASSETS);
        assert_eq!(searches, 4);

        // Route once more; the rejected call must not reach the host.
        let _ = router.route("download a brick texture", &[]).await;
        assert_eq!(host.calls_for(commands::SEARCH_POLYHAVEN_ASSETS), 4);
    }
}
