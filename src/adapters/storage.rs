use crate::core::raster::partial_path;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::fs;
use std::path::Path;

/// 本機檔案系統；先寫入 `.part` 再改名，中斷時不會留下截斷的輸出檔
#[derive(Debug, Clone, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial = partial_path(path);
        fs::write(&partial, data)?;
        fs::rename(&partial, path)?;
        Ok(())
    }
}
