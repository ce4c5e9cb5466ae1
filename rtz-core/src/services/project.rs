use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, Result};
use crate::model::project::ContainerProfile;
use crate::services::rebuild::write_atomic;

pub const PROJECT_FILE: &str = "project.json";
pub const LEDGER_FILE: &str = "ledger.json";

/// `path` may name the project directory or the `project.json` inside it.
fn project_file(path: &Path) -> PathBuf {
    if path.is_dir() || path.extension().is_none() {
        path.join(PROJECT_FILE)
    } else {
        path.to_path_buf()
    }
}

pub fn open_project(path: &Path) -> Result<ContainerProfile> {
    let file = project_file(path);
    if !file.exists() {
        return Err(Error::Config(format!("{} not found", file.display())));
    }

    let data = fs::read_to_string(&file)?;
    let mut profile: ContainerProfile = serde_json::from_str(&data)?;
    profile.validate().map_err(Error::Config)?;

    if profile.project_path.trim().is_empty() {
        if let Some(dir) = file.parent() {
            profile.project_path = dir.to_string_lossy().to_string();
        }
    }
    info!(project = %profile.name, path = %file.display(), "opened project");
    Ok(profile)
}

pub fn save_project(mut profile: ContainerProfile) -> Result<ContainerProfile> {
    profile.validate().map_err(Error::Config)?;

    let dir = {
        let pp = profile.project_path.trim();
        if pp.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(pp)
        }
    };
    fs::create_dir_all(&dir)?;
    profile.project_path = dir.to_string_lossy().to_string();

    let json = serde_json::to_string_pretty(&profile)?;
    write_atomic(&dir.join(PROJECT_FILE), json.as_bytes())?;
    Ok(profile)
}

/// Default ledger location for a project.
pub fn ledger_path(profile: &ContainerProfile) -> PathBuf {
    Path::new(&profile.project_path).join(LEDGER_FILE)
}
