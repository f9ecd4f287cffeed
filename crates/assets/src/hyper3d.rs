//! Hyper3D Rodin generation flow.
//!
//! Submit a job, poll its status on a fixed interval bounded by a wall
//! clock, then import the finished asset into the host. `TRIAL_LIMIT` and
//! `ERROR` are terminal and surface as typed errors.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use meshpilot_core::error::AssetError;
use meshpilot_core::host::{HostPort, commands};
use serde_json::{Value, json};

use crate::router::ImportedAsset;
use crate::intent::{AssetKind, AssetProvider};

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const WALL_CLOCK_BUDGET: Duration = Duration::from_secs(120);

/// Run one generation job to completion.
pub async fn generate(
    host: &dyn HostPort,
    prompt: &str,
    keywords: &[String],
    images: &[String],
) -> Result<ImportedAsset, AssetError> {
    let mut params = json!({ "text_prompt": prompt });
    if !images.is_empty() {
        params["images"] = json!(images);
    }

    let created = host
        .send(commands::CREATE_RODIN_JOB, params)
        .await
        .map_err(|e| upstream(e.to_string()))?;

    let key = created
        .get("subscription_key")
        .or_else(|| created.get("request_id"))
        .and_then(Value::as_str)
        .ok_or_else(|| upstream("job submission returned no subscription key".into()))?
        .to_string();

    info!(key = %key, "Generation job submitted");

    let start = Instant::now();
    loop {
        if start.elapsed() >= WALL_CLOCK_BUDGET {
            return Err(AssetError::Timeout {
                provider: AssetProvider::Hyper3d.name().into(),
                elapsed_secs: start.elapsed().as_secs(),
            });
        }

        tokio::time::sleep(POLL_INTERVAL).await;

        let status_doc = host
            .send(
                commands::POLL_RODIN_JOB_STATUS,
                json!({ "subscription_key": key }),
            )
            .await
            .map_err(|e| upstream(e.to_string()))?;

        match job_status(&status_doc) {
            JobStatus::Success => break,
            JobStatus::TrialLimit => {
                warn!("Generation rejected: trial limit");
                return Err(AssetError::TrialLimit {
                    provider: AssetProvider::Hyper3d.name().into(),
                });
            }
            JobStatus::Error(message) => return Err(upstream(message)),
            JobStatus::InProgress => {
                debug!(elapsed = start.elapsed().as_secs(), "Job still running");
            }
        }
    }

    let name = asset_name(keywords);
    host.send(
        commands::IMPORT_GENERATED_ASSET,
        json!({ "subscription_key": key, "name": name }),
    )
    .await
    .map_err(|e| upstream(e.to_string()))?;

    info!(name = %name, "Generated asset imported");
    Ok(ImportedAsset {
        name,
        provider: AssetProvider::Hyper3d,
        kind: AssetKind::Model,
    })
}

enum JobStatus {
    Success,
    TrialLimit,
    Error(String),
    InProgress,
}

fn job_status(doc: &Value) -> JobStatus {
    let status = doc
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_ascii_uppercase();
    match status.as_str() {
        "SUCCESS" | "DONE" => JobStatus::Success,
        "TRIAL_LIMIT" => JobStatus::TrialLimit,
        "ERROR" | "FAILED" => JobStatus::Error(
            doc.get("message")
                .and_then(Value::as_str)
                .unwrap_or("generation failed")
                .to_string(),
        ),
        _ => JobStatus::InProgress,
    }
}

fn asset_name(keywords: &[String]) -> String {
    if keywords.is_empty() {
        "generated_asset".into()
    } else {
        keywords.join("_")
    }
}

fn upstream(message: String) -> AssetError {
    AssetError::Upstream {
        provider: AssetProvider::Hyper3d.name().into(),
        message,
    }
}
