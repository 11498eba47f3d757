pub mod disk;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::store::Store;
use anyhow::{Context, Result};
pub use disk::DiskStore;
pub use memory::MemoryStore;
use std::sync::Arc;

/// Opens the persistent store under the configured data directory.
pub fn open(config: &AppConfig) -> Result<Arc<dyn Store>> {
    let path = config.default_data_path()?.join("db");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
    let store = DiskStore::open(&path)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}
