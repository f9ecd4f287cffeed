//! Poly Haven library flow: keyword search within an asset category,
//! fixed-quality download in a kind-appropriate format.

use tracing::info;

use meshpilot_core::error::AssetError;
use meshpilot_core::host::{HostPort, commands};
use serde_json::{Value, json};

use crate::intent::{AssetKind, AssetProvider};
use crate::router::ImportedAsset;

const RESOLUTION: &str = "1k";

pub async fn search_and_import(
    host: &dyn HostPort,
    keywords: &[String],
    kind: AssetKind,
) -> Result<ImportedAsset, AssetError> {
    let query = keywords.join(" ");
    let found = host
        .send(
            commands::SEARCH_POLYHAVEN_ASSETS,
            json!({ "query": query, "asset_type": category(kind) }),
        )
        .await
        .map_err(|e| upstream(e.to_string()))?;

    let (id, name) = first_asset(&found).ok_or_else(|| AssetError::NoMatch { query })?;

    host.send(
        commands::DOWNLOAD_POLYHAVEN_ASSET,
        json!({
            "asset_id": id,
            "asset_type": category(kind),
            "resolution": RESOLUTION,
            "file_format": file_format(kind),
        }),
    )
    .await
    .map_err(|e| upstream(e.to_string()))?;

    info!(name = %name, kind = kind.name(), "Library asset downloaded");
    Ok(ImportedAsset {
        name,
        provider: AssetProvider::PolyHaven,
        kind,
    })
}

fn category(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Model => "models",
        AssetKind::Texture => "textures",
        AssetKind::Hdri => "hdris",
    }
}

fn file_format(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Hdri => "hdr",
        _ => "gltf",
    }
}

fn first_asset(found: &Value) -> Option<(String, String)> {
    let entry = found.get("assets")?.as_array()?.first()?;
    let id = entry.get("id")?.as_str()?.to_string();
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&id)
        .to_string();
    Some((id, name))
}

fn upstream(message: String) -> AssetError {
    AssetError::Upstream {
        provider: AssetProvider::PolyHaven.name().into(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_host::ScriptedHost;

    #[tokio::test]
    async fn hdri_download_uses_hdr_format() {
        let host = ScriptedHost::new();
        host.respond(
            commands::SEARCH_POLYHAVEN_ASSETS,
            json!({"assets": [{"id": "sunset_sky", "name": "Sunset Sky"}]}),
        );
        host.respond(commands::DOWNLOAD_POLYHAVEN_ASSET, json!({"ok": true}));

        let asset = search_and_import(&host, &["sunset".into()], AssetKind::Hdri)
            .await
            .unwrap();
        assert_eq!(asset.name, "Sunset Sky");

        let params = host.last_params(commands::DOWNLOAD_POLYHAVEN_ASSET).unwrap();
        assert_eq!(params["asset_type"], "hdris");
        assert_eq!(params["resolution"], "1k");
        assert_eq!(params["file_format"], "hdr");
    }

    #[tokio::test]
    async fn model_download_uses_gltf_format() {
        let host = ScriptedHost::new();
        host.respond(
            commands::SEARCH_POLYHAVEN_ASSETS,
            json!({"assets": [{"id": "garden_gate"}]}),
        );
        host.respond(commands::DOWNLOAD_POLYHAVEN_ASSET, json!({"ok": true}));

        let asset = search_and_import(&host, &["garden".into(), "gate".into()], AssetKind::Model)
            .await
            .unwrap();
        // Falls back to the id when no display name is present.
        assert_eq!(asset.name, "garden_gate");

        let params = host.last_params(commands::DOWNLOAD_POLYHAVEN_ASSET).unwrap();
        assert_eq!(params["file_format"], "gltf");
        let search = host.last_params(commands::SEARCH_POLYHAVEN_ASSETS).unwrap();
        assert_eq!(search["query"], "garden gate");
    }

    #[tokio::test]
    async fn empty_library_is_no_match() {
        let host = ScriptedHost::new();
        host.respond(commands::SEARCH_POLYHAVEN_ASSETS, json!({"assets": []}));

        let err = search_and_import(&host, &["void".into()], AssetKind::Texture)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::NoMatch { .. }));
    }
}
