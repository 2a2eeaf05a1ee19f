//! Secure-messaging node configuration file

use async_trait::async_trait;
use join_types::{ConfigAssembler, MessagingConfigSpec, ProvisionError};
use std::path::PathBuf;

/// Render the config file contents
///
/// Key paths are relative to the workspace root, where the node is started.
pub fn render(spec: &MessagingConfigSpec) -> String {
    let quote = |value: String| serde_json::Value::String(value).to_string();
    let key_path = |file: &str| quote(format!("{}/{}", spec.folder_name, file));

    let lines = [
        format!("url = {}", quote(node_url(&spec.local_address, spec.local_port))),
        format!("port = {}", spec.local_port),
        format!("storage = {}", quote(format!("dir:{}/data", spec.folder_name))),
        format!(
            "socket = {}",
            quote(format!("{}/constellation.ipc", spec.folder_name))
        ),
        format!(
            "othernodes = [{}]",
            quote(node_url(&spec.remote_address, spec.remote_port))
        ),
        format!("publickeys = [{}]", key_path(&spec.public_key_file)),
        format!("privatekeys = [{}]", key_path(&spec.private_key_file)),
        format!("archivalpublickey = {}", key_path(&spec.public_arch_key_file)),
        format!("archivalprivatekey = {}", key_path(&spec.private_arch_key_file)),
        "verbosity = 1".to_string(),
    ];
    let mut config = lines.join("\n");
    config.push('\n');
    config
}

fn node_url(address: &str, port: u16) -> String {
    format!("http://{}:{}/", address, port)
}

/// Writes the config next to the key files it references
pub struct MessagingConfigWriter {
    root: PathBuf,
}

impl MessagingConfigWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ConfigAssembler for MessagingConfigWriter {
    async fn assemble(&self, spec: &MessagingConfigSpec) -> Result<PathBuf, ProvisionError> {
        let folder = self.root.join(&spec.folder_name);

        for key_file in [
            &spec.public_key_file,
            &spec.private_key_file,
            &spec.public_arch_key_file,
            &spec.private_arch_key_file,
        ] {
            let exists = tokio::fs::try_exists(folder.join(key_file))
                .await
                .map_err(ProvisionError::config_assembly)?;
            if !exists {
                return Err(ProvisionError::ConfigAssembly(format!(
                    "key file {}/{} has not been generated",
                    spec.folder_name, key_file
                )));
            }
        }

        let path = folder.join(&spec.config_name);
        tokio::fs::write(&path, render(spec)).await.map_err(|e| {
            ProvisionError::ConfigAssembly(format!("failed to write {}: {}", path.display(), e))
        })?;

        tracing::info!(
            "Messaging node config written ({} -> {})",
            spec.local_address,
            spec.remote_address
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> MessagingConfigSpec {
        MessagingConfigSpec::new("10.0.0.2", "10.0.0.1")
    }

    #[test]
    fn test_render_points_at_remote() {
        let config = render(&spec());

        assert!(config.contains("url = \"http://10.0.0.2:9000/\"\n"));
        assert!(config.contains("port = 9000\n"));
        assert!(config.contains("othernodes = [\"http://10.0.0.1:9000/\"]\n"));
        assert!(config.contains("publickeys = [\"Constellation/node.pub\"]\n"));
        assert!(config.contains("archivalprivatekey = \"Constellation/nodeArch.key\"\n"));
    }

    #[tokio::test]
    async fn test_assemble_requires_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Constellation")).unwrap();

        let err = MessagingConfigWriter::new(dir.path())
            .assemble(&spec())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ConfigAssembly(_)));
    }

    #[tokio::test]
    async fn test_assemble_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Constellation");
        std::fs::create_dir_all(&folder).unwrap();
        for file in ["node.pub", "node.key", "nodeArch.pub", "nodeArch.key"] {
            std::fs::write(folder.join(file), "k").unwrap();
        }

        let path = MessagingConfigWriter::new(dir.path())
            .assemble(&spec())
            .await
            .unwrap();

        assert_eq!(path, folder.join("constellation.config"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), render(&spec()));
    }
}
