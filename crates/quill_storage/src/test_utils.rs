//! Test utilities for the storage crate, available under the `testing`
//! feature.

use quill_types::ChainId;
use tempfile::{tempdir, TempDir};

use crate::db::DbConfig;
use crate::{open_storage, StorageConfig, StorageReader, StorageWriter};

/// Returns a [`StorageConfig`] over a fresh temporary directory, and the
/// directory's handle, which deletes it on drop.
pub fn get_test_config() -> (StorageConfig, TempDir) {
    let dir = tempdir().unwrap();
    let db_config = DbConfig {
        path_prefix: dir.path().to_path_buf(),
        chain_id: ChainId("QUILL_TEST".to_owned()),
        min_size: 1 << 20,    // 1MB
        max_size: 1 << 35,    // 32GB
        growth_step: 1 << 26, // 64MB
    };
    std::fs::create_dir_all(db_config.path()).unwrap();
    (StorageConfig { db_config }, dir)
}

/// Opens a storage over a fresh temporary directory.
pub fn get_test_storage() -> ((StorageReader, StorageWriter), TempDir) {
    let (config, dir) = get_test_config();
    (open_storage(config).expect("Failed to open storage."), dir)
}
