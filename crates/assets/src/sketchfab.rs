//! Sketchfab catalogue flow: free-text search, first downloadable hit,
//! download into the host.

use tracing::info;

use meshpilot_core::error::AssetError;
use meshpilot_core::host::{HostPort, commands};
use serde_json::{Value, json};

use crate::intent::{AssetKind, AssetProvider};
use crate::router::ImportedAsset;

pub async fn search_and_import(
    host: &dyn HostPort,
    query: &str,
) -> Result<ImportedAsset, AssetError> {
    let found = host
        .send(
            commands::SEARCH_SKETCHFAB_MODELS,
            json!({ "query": query, "downloadable": true }),
        )
        .await
        .map_err(|e| upstream(e.to_string()))?;

    let (uid, name) = first_downloadable(&found).ok_or_else(|| AssetError::NoMatch {
        query: query.to_string(),
    })?;

    host.send(commands::DOWNLOAD_SKETCHFAB_MODEL, json!({ "uid": uid }))
        .await
        .map_err(|e| upstream(e.to_string()))?;

    info!(name = %name, uid = %uid, "Catalogue model downloaded");
    Ok(ImportedAsset {
        name,
        provider: AssetProvider::Sketchfab,
        kind: AssetKind::Model,
    })
}

/// Pick the first entry marked downloadable (or unmarked, which some hosts
/// omit for filtered searches).
fn first_downloadable(found: &Value) -> Option<(String, String)> {
    let results = found.get("results")?.as_array()?;
    results
        .iter()
        .find(|entry| {
            entry
                .get("isDownloadable")
                .and_then(Value::as_bool)
                .unwrap_or(true)
        })
        .and_then(|entry| {
            let uid = entry.get("uid")?.as_str()?.to_string();
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&uid)
                .to_string();
            Some((uid, name))
        })
}

fn upstream(message: String) -> AssetError {
    AssetError::Upstream {
        provider: AssetProvider::Sketchfab.name().into(),
        message,
    }
}
