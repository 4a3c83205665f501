//! 설정 레이어 파일 저장소
//!
//! 레이어 하나 = 디렉토리 하나. 글로벌(<config_dir>/workset/)과
//! 프로젝트(.workset/) 두 범위가 있습니다.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 애플리케이션 디렉토리 이름
pub const APP_DIR: &str = "workset";

/// 설정 레이어 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Project,
    /// 테스트 등에서 임의 디렉토리 지정
    Custom,
}

/// 설정 레이어 하나의 JSON 저장소
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
    scope: ConfigScope,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            scope: ConfigScope::Custom,
        }
    }

    /// <config_dir>/workset/
    pub fn global() -> Result<Self> {
        let root = dirs::config_dir()
            .ok_or_else(|| Error::Config("No user config directory on this platform".to_string()))?;
        Ok(Self {
            dir: root.join(APP_DIR),
            scope: ConfigScope::Global,
        })
    }

    /// <root>/.workset/
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(format!(".{APP_DIR}")),
            scope: ConfigScope::Project,
        }
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::project(cwd))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scope(&self) -> ConfigScope {
        self.scope
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// 파일이 없거나 비어 있으면 `None`
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!("Failed to read {}: {}", path.display(), e)))
            }
        };
        if content.trim().is_empty() {
            debug!(path = %path.display(), scope = ?self.scope, "Empty config layer skipped");
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// 임시 파일에 쓴 뒤 rename (중간 상태의 파일이 남지 않도록)
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.file_path(filename);
        let staging = self.file_path(&format!("{filename}.tmp"));

        std::fs::write(&staging, serde_json::to_string_pretty(data)?)?;
        std::fs::rename(&staging, &path)
            .map_err(|e| Error::Config(format!("Failed to replace {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), scope = ?self.scope, "Config layer saved");
        Ok(())
    }
}
