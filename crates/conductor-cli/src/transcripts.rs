//! Replay agents backed by NDJSON transcripts.
//!
//! `<dir>/<name>.ndjson` registers agent `name`;
//! `<dir>/<namespace>/<name>.ndjson` registers `namespace/name`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use conductor_engine::AgentRegistry;
use conductor_engine::agent::ReplayAgent;

const TRANSCRIPT_EXTENSION: &str = "ndjson";

/// Build a registry from every transcript under `dir`.
pub fn load_registry(dir: &Path) -> anyhow::Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    load_dir(dir, None, &mut registry)?;
    info!(dir = %dir.display(), agents = registry.len(), "Loaded transcripts");
    Ok(registry)
}

fn load_dir(dir: &Path, namespace: Option<&str>, registry: &mut AgentRegistry) -> anyhow::Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read transcript directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            // Only one level of namespacing.
            if namespace.is_none()
                && let Some(ns) = path.file_name().and_then(|n| n.to_str())
            {
                load_dir(&path, Some(ns), registry)?;
            }
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(TRANSCRIPT_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read transcript {}", path.display()))?;
        let agent = ReplayAgent::from_ndjson(&content)
            .with_context(|| format!("Invalid transcript {}", path.display()))?;
        debug!(path = %path.display(), ?namespace, agent = name, "Registering transcript");
        match namespace {
            Some(ns) => registry.register_namespaced(ns, name, Arc::new(agent)),
            None => registry.register(name, Arc::new(agent)),
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use conductor_core::workflow::SubAgentReference;
    use conductor_engine::AgentResolver;

    #[test]
    fn registers_plain_and_namespaced_transcripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("writer.ndjson"), "{\"text\":\"hi\"}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("team")).unwrap();
        std::fs::write(
            dir.path().join("team").join("critic.ndjson"),
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\ndata: [DONE]\n",
        )
        .unwrap();

        let registry = load_registry(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve(&SubAgentReference::new("writer")).is_ok());
        assert!(
            registry
                .resolve(&SubAgentReference::namespaced("team", "critic"))
                .is_ok()
        );
    }

    #[test]
    fn malformed_transcript_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.ndjson"), "not json\n").unwrap();
        let err = load_registry(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken.ndjson"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_registry(&dir.path().join("nope")).is_err());
    }
}
