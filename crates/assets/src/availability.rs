//! Integration availability map with a short TTL.
//!
//! The host exposes one status command per integration. Status is read
//! lazily: the first read after the TTL expires refreshes all three flags
//! in sequence. A status command that fails counts as unavailable.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use meshpilot_core::host::{HostPort, commands};
use serde_json::{Value, json};

use crate::intent::AssetProvider;

/// Enabled flags for the three integrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilityMap {
    pub polyhaven: bool,
    pub hyper3d: bool,
    pub sketchfab: bool,
}

impl AvailabilityMap {
    pub fn is_available(&self, provider: AssetProvider) -> bool {
        match provider {
            AssetProvider::PolyHaven => self.polyhaven,
            AssetProvider::Hyper3d => self.hyper3d,
            AssetProvider::Sketchfab => self.sketchfab,
        }
    }
}

/// TTL-cached availability reads.
pub struct AvailabilityCache {
    ttl: Duration,
    inner: Mutex<Option<(Instant, AvailabilityMap)>>,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(None),
        }
    }

    /// Current map, refreshing through the host if the cached one is stale.
    pub async fn get(&self, host: &dyn HostPort) -> AvailabilityMap {
        {
            let cached = self.inner.lock().expect("availability lock poisoned");
            if let Some((at, map)) = *cached
                && at.elapsed() < self.ttl
            {
                return map;
            }
        }

        let map = refresh(host).await;
        let mut cached = self.inner.lock().expect("availability lock poisoned");
        *cached = Some((Instant::now(), map));
        map
    }

    /// Drop the cached map so the next read refreshes.
    pub fn invalidate(&self) {
        let mut cached = self.inner.lock().expect("availability lock poisoned");
        *cached = None;
    }
}

async fn refresh(host: &dyn HostPort) -> AvailabilityMap {
    let map = AvailabilityMap {
        polyhaven: status_enabled(host, commands::GET_POLYHAVEN_STATUS).await,
        hyper3d: status_enabled(host, commands::GET_HYPER3D_STATUS).await,
        sketchfab: status_enabled(host, commands::GET_SKETCHFAB_STATUS).await,
    };
    debug!(?map, "Integration availability refreshed");
    map
}

async fn status_enabled(host: &dyn HostPort, command: &str) -> bool {
    match host.send(command, json!({})).await {
        Ok(result) => interpret_status(&result),
        Err(_) => false,
    }
}

/// The host reports either `{"enabled": bool}` or a bare status string.
fn interpret_status(result: &Value) -> bool {
    if let Some(enabled) = result.get("enabled").and_then(Value::as_bool) {
        return enabled;
    }
    matches!(
        result.get("status").and_then(Value::as_str),
        Some("ready" | "connected" | "ok")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_host::ScriptedHost;

    #[test]
    fn interpret_status_shapes() {
        assert!(interpret_status(&json!({"enabled": true})));
        assert!(!interpret_status(&json!({"enabled": false})));
        assert!(interpret_status(&json!({"status": "ready"})));
        assert!(!interpret_status(&json!({"status": "disabled"})));
        assert!(!interpret_status(&json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn caches_within_ttl_and_refreshes_after() {
        let host = ScriptedHost::new();
        host.respond(commands::GET_POLYHAVEN_STATUS, json!({"enabled": true}));
        host.respond(commands::GET_HYPER3D_STATUS, json!({"enabled": false}));
        host.respond(commands::GET_SKETCHFAB_STATUS, json!({"status": "ready"}));

        let cache = AvailabilityCache::new(Duration::from_secs(30));
        let map = cache.get(&host).await;
        assert!(map.polyhaven);
        assert!(!map.hyper3d);
        assert!(map.sketchfab);
        assert_eq!(host.calls_for(commands::GET_POLYHAVEN_STATUS), 1);

        // Still fresh, no extra host calls.
        let _ = cache.get(&host).await;
        assert_eq!(host.calls_for(commands::GET_POLYHAVEN_STATUS), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = cache.get(&host).await;
        assert_eq!(host.calls_for(commands::GET_POLYHAVEN_STATUS), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_counts_as_unavailable() {
        let host = ScriptedHost::new();
        // No scripted replies: every send fails.
        let cache = AvailabilityCache::new(Duration::from_secs(30));
        let map = cache.get(&host).await;
        assert_eq!(map, AvailabilityMap::default());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refresh() {
        let host = ScriptedHost::new();
        host.respond(commands::GET_POLYHAVEN_STATUS, json!({"enabled": true}));

        let cache = AvailabilityCache::new(Duration::from_secs(30));
        let _ = cache.get(&host).await;
        cache.invalidate();
        let _ = cache.get(&host).await;
        assert_eq!(host.calls_for(commands::GET_POLYHAVEN_STATUS), 2);
    }
}
