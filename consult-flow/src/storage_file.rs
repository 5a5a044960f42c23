use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::{
    error::{ConsultError, Result},
    session::Session,
    storage::SessionStorage,
};

/// One pretty-printed JSON document per session: `<dir>/session_<id>.json`.
///
/// Writes go to a temporary file that is then renamed over the old document,
/// so a crash mid-write never leaves a truncated session behind.
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        // Ids become file names; anything else could escape the directory.
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ConsultError::Storage(format!("invalid session id: {id:?}")));
        }
        Ok(self.dir.join(format!("session_{id}.json")))
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        let path = self.path_for(&session.id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&session)?;

        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!(session_id = %session.id, path = %path.display(), "session saved");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let path = self.path_for(id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
