use zbus::interface;

use crate::engine::{EngineError, EngineHandle};

/// D-Bus interface for the facelock daemon.
///
/// Bus name: org.facelock.Manager1
/// Object path: /org/facelock/Manager1
pub struct ManagerService {
    engine: EngineHandle,
    match_threshold: f64,
}

impl ManagerService {
    pub fn new(engine: EngineHandle, match_threshold: f64) -> Self {
        Self { engine, match_threshold }
    }
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

#[interface(name = "org.facelock.Manager1")]
impl ManagerService {
    /// Enroll a face template for an identity. Blocks until the frame
    /// spool has yielded enough accepted samples or the attempt gives up.
    /// Returns the stored template metadata as JSON.
    async fn enroll(&self, identity: &str, label: &str) -> zbus::fdo::Result<String> {
        tracing::info!(identity, label, "enroll requested");
        let info = self
            .engine
            .enroll(identity.to_string(), label.to_string())
            .await
            .map_err(to_fdo)?;
        Ok(serde_json::json!({
            "id": info.id,
            "identity": info.identity,
            "label": info.label,
            "created_at": info.created_at,
        })
        .to_string())
    }

    /// Verify the next spooled probe against all enrolled templates.
    /// Returns the match outcome as JSON.
    async fn verify(&self, identity_hint: &str) -> zbus::fdo::Result<String> {
        tracing::info!(identity_hint, "verify requested");
        let outcome = self
            .engine
            .verify(identity_hint.to_string())
            .await
            .map_err(to_fdo)?;
        serde_json::to_string(&outcome).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// List enrolled template metadata as a JSON array.
    async fn list_templates(&self) -> zbus::fdo::Result<String> {
        let listed = self.engine.list().await.map_err(to_fdo)?;
        serde_json::to_string(&listed).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Remove an enrolled template by id. Returns whether it existed.
    async fn remove_template(&self, template_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(template_id, "remove_template requested");
        self.engine.remove(template_id.to_string()).await.map_err(to_fdo)
    }

    /// Daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let templates = self.engine.list().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "templates": templates.len(),
            "match_threshold": self.match_threshold,
        })
        .to_string())
    }
}
