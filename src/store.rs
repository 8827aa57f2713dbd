use crate::models::UserId;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "User store I/O error: {}", e),
            StoreError::Parse(e) => write!(f, "User store parse error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Reads the persisted user ids. A store that does not exist yet is empty.
pub fn load(path: &Path) -> Result<BTreeSet<UserId>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e.into()),
    };

    let users: Vec<UserId> = serde_json::from_str(&content)?;
    Ok(users.into_iter().collect())
}

/// Writes the user ids as a JSON array, replacing the file atomically.
pub fn save(path: &Path, users: &BTreeSet<UserId>) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let ids: Vec<UserId> = users.iter().copied().collect();
    let json = serde_json::to_string_pretty(&ids)?;

    let tmp_path = temp_path_for(path);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "users".into());
    name.push(".tmp");
    path.with_file_name(name)
}
