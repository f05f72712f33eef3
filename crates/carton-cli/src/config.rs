use std::path::Path;

use serde::Deserialize;

use carton_bundle::WriterConfig;
use carton_chunk::ChunkPolicy;

/// Optional store-level configuration, read from `carton.toml` in the
/// store directory. Command-line flags override it.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Target chunk size in bytes.
    pub target_chunk_size: Option<u32>,
    /// Packet sealing threshold in decoded bytes.
    pub packet_size: Option<u32>,
    /// zstd compression level.
    pub zstd_level: Option<i32>,
}

impl StoreConfig {
    /// Load `carton.toml` from the store directory if present.
    pub fn load(store_dir: &Path) -> anyhow::Result<Self> {
        let path = store_dir.join("carton.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("invalid {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Chunk policy with the flag taking precedence over the file.
    pub fn chunk_policy(&self, flag: Option<u32>) -> anyhow::Result<ChunkPolicy> {
        match flag.or(self.target_chunk_size) {
            Some(target) => Ok(ChunkPolicy::with_target(target)?),
            None => Ok(ChunkPolicy::default()),
        }
    }

    /// Writer tuning derived from the config.
    pub fn writer_config(&self) -> WriterConfig {
        let mut config = WriterConfig::default();
        if let Some(size) = self.packet_size {
            config.packet_target = size as usize;
        }
        if let Some(level) = self.zstd_level {
            config.zstd_level = level;
        }
        config
    }
}
