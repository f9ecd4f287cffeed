//! HostPort trait — the seam between the core and the Blender transport.
//!
//! The orchestrator and the asset router talk to the host through this
//! trait; the real framed TCP client lives in `meshpilot-host`, and tests
//! substitute scripted fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HostError;

/// Command names understood by the host. Opaque strings passed through.
pub mod commands {
    pub const GET_SCENE_INFO: &str = "get_scene_info";
    pub const EXECUTE_CODE: &str = "execute_code";
    pub const CAPTURE_VIEWPORT: &str = "capture_viewport";

    pub const GET_POLYHAVEN_STATUS: &str = "get_polyhaven_status";
    pub const GET_HYPER3D_STATUS: &str = "get_hyper3d_status";
    pub const GET_SKETCHFAB_STATUS: &str = "get_sketchfab_status";

    pub const SEARCH_POLYHAVEN_ASSETS: &str = "search_polyhaven_assets";
    pub const DOWNLOAD_POLYHAVEN_ASSET: &str = "download_polyhaven_asset";
    pub const SEARCH_SKETCHFAB_MODELS: &str = "search_sketchfab_models";
    pub const DOWNLOAD_SKETCHFAB_MODEL: &str = "download_sketchfab_model";
    pub const CREATE_RODIN_JOB: &str = "create_rodin_job";
    pub const POLL_RODIN_JOB_STATUS: &str = "poll_rodin_job_status";
    pub const IMPORT_GENERATED_ASSET: &str = "import_generated_asset";
}

/// Port to the modeling host.
///
/// `send` resolves with the response's `result` field (or the whole
/// document if absent) and fails with [`HostError::ExecFailed`] when the
/// host reports `status: "error"`.
#[async_trait]
pub trait HostPort: Send + Sync {
    async fn send(&self, command: &str, params: Value) -> std::result::Result<Value, HostError>;

    /// Whether the underlying link is currently usable.
    fn is_connected(&self) -> bool;
}
