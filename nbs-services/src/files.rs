/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Local};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::*;

use nbs_core::prelude::*;

use crate::timefmt::TIMESTAMP_FORMAT;

/// The file categories backing the console's file tabs. Each is a directory
/// under the config root and a data source of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    IpxeBuilds,
    WimbootBuilds,
    Stage1Files,
    UbootScripts,
    BootImages,
    UnattendedConfigs,
    Iso,
    TftpRoot,
    Stage4,
}

impl FileCategory {
    pub const ALL: [FileCategory; 9] = [
        FileCategory::IpxeBuilds,
        FileCategory::WimbootBuilds,
        FileCategory::Stage1Files,
        FileCategory::UbootScripts,
        FileCategory::BootImages,
        FileCategory::UnattendedConfigs,
        FileCategory::Iso,
        FileCategory::TftpRoot,
        FileCategory::Stage4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::IpxeBuilds => "ipxe_builds",
            FileCategory::WimbootBuilds => "wimboot_builds",
            FileCategory::Stage1Files => "stage1_files",
            FileCategory::UbootScripts => "uboot_scripts",
            FileCategory::BootImages => "boot_images",
            FileCategory::UnattendedConfigs => "unattended_configs",
            FileCategory::Iso => "iso",
            FileCategory::TftpRoot => "tftp_root",
            FileCategory::Stage4 => "stage4",
        }
    }
}

impl FromStr for FileCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileCategory::ALL
            .iter()
            .find(|category| category.as_str() == s)
            .copied()
            .ok_or_else(|| anyhow!("unknown file category: {s}"))
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One listed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub modified: String,
    #[serde(default)]
    pub description: String,
}

/// Builtin entries per category. These always appear in listings and can
/// never be deleted or overwritten.
fn builtin_entries(category: FileCategory) -> Vec<Value> {
    let epoch = "1970-01-01_00:00:00";
    match category {
        FileCategory::Stage1Files => vec![
            json!({"filename": "default", "modified": epoch,
                   "description": "builtin: default Netboot Studio behavior (chain stage2.ipxe with a pile of paramters)"}),
            json!({"filename": "none", "modified": epoch,
                   "description": "builtin: none (use as a shim on systems with missing or bad netbooting rom)"}),
        ],
        FileCategory::UbootScripts => vec![json!({"filename": "default", "modified": epoch,
                   "description": "builtin: default Netboot Studio behavior (empty, does nothing)"})],
        FileCategory::UnattendedConfigs => vec![
            json!({"filename": "blank.cfg", "modified": epoch,
                   "description": "builtin: an empty .cfg file"}),
            json!({"filename": "blank.xml", "modified": epoch,
                   "description": "builtin: an empty .xml file"}),
        ],
        FileCategory::BootImages => vec![
            json!({"boot_image_name": "standby_loop", "created": epoch, "image_type": "builtin",
                   "description": "builtin: loop on 10s cycle, until a different boot image is selected", "arch": "all"}),
            json!({"boot_image_name": "menu", "created": epoch, "image_type": "builtin",
                   "description": "builtin: show an interactive menu listing all boot images", "arch": "all"}),
        ],
        FileCategory::TftpRoot => vec![
            json!({"filename": "ipxe.efi", "modified": epoch,
                   "description": "builtin: endpoint for ipxe build"}),
            json!({"filename": "boot.scr.uimg", "modified": epoch,
                   "description": "builtin: endpoint for u-boot script"}),
        ],
        FileCategory::Stage4 => vec![
            json!({"filename": "none", "modified": epoch, "description": "builtin: no script"}),
            json!({"filename": "stage4-entry-unix.sh", "modified": epoch,
                   "description": "builtin: entrypoint for unix-style systems"}),
            json!({"filename": "stage4-entry-windows.bat", "modified": epoch,
                   "description": "builtin: entrypoint for windows systems"}),
        ],
        FileCategory::IpxeBuilds | FileCategory::WimbootBuilds | FileCategory::Iso => Vec::new(),
    }
}

/// Whether `name` is a builtin entry of `category`.
pub(crate) fn is_builtin(category: FileCategory, name: &str) -> bool {
    builtin_entries(category).iter().any(|entry| {
        entry.get("filename").and_then(Value::as_str) == Some(name)
            || entry.get("boot_image_name").and_then(Value::as_str) == Some(name)
    })
}

/// Provides an interface through which to get info about the files of every
/// category, and publishes each category's listing as a data source.
#[derive(Clone)]
pub struct FileManager {
    root: PathBuf,
    providers: Vec<DataProvider>,
}

impl FileManager {
    /// Creates the category directories under `root` as needed and starts
    /// one data provider per category.
    #[instrument(skip(link))]
    pub async fn start<L: BrokerLink>(link: &L, root: PathBuf) -> anyhow::Result<FileManager> {
        let mut providers = Vec::with_capacity(FileCategory::ALL.len());
        for category in FileCategory::ALL {
            let dir = root.join(category.as_str());
            if !dir.is_dir() {
                info!("creating missing folder: {}", dir.display());
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("could not create {}", dir.display()))?;
            }
            let scan_root = root.clone();
            let provider = DataProvider::start(link, category.as_str(), Arc::new(move || {
                Value::Array(scan_category(&scan_root, category))
            }))
            .await?;
            providers.push(provider);
        }
        debug!("FileManager is ready");
        Ok(FileManager { root, providers })
    }

    /// The current listing for a category: builtins followed by what is on
    /// disk.
    pub fn get_files(&self, category: FileCategory) -> Vec<Value> {
        scan_category(&self.root, category)
    }

    /// Reads one file's text content, for the editor flow.
    pub fn read_file(&self, category: FileCategory, name: &str) -> anyhow::Result<String> {
        let path = self.entry_path(category, name)?;
        if !path.is_file() {
            return Err(anyhow!("file: {name} does not exist!"));
        }
        std::fs::read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))
    }

    /// Writes one file's text content. Builtins cannot be shadowed.
    pub fn write_file(&self, category: FileCategory, name: &str, content: &str) -> anyhow::Result<()> {
        if is_builtin(category, name) {
            return Err(anyhow!("cannot overwrite builtins"));
        }
        let path = self.entry_path(category, name)?;
        std::fs::write(&path, content)
            .with_context(|| format!("could not write {}", path.display()))
    }

    /// Deletes one file. Builtins cannot be deleted.
    pub fn delete_file(&self, category: FileCategory, name: &str) -> anyhow::Result<()> {
        if is_builtin(category, name) {
            return Err(anyhow!("cannot delete builtins"));
        }
        let path = self.entry_path(category, name)?;
        if !path.is_file() {
            return Err(anyhow!("file: {name} does not exist!"));
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("could not delete {}", path.display()))
    }

    /// Deletes a build folder (ipxe or wimboot builds are directories keyed
    /// by build id).
    pub fn delete_build(&self, category: FileCategory, build_id: &str) -> anyhow::Result<()> {
        let path = self.entry_path(category, build_id)?;
        if !path.is_dir() {
            return Err(anyhow!("build folder named {build_id} does not exist!"));
        }
        std::fs::remove_dir_all(&path)
            .with_context(|| format!("could not delete {}", path.display()))
    }

    /// Deletes a boot image: a-la-carte `.ipxe` images are files, the rest
    /// are folders.
    pub fn delete_boot_image(&self, name: &str) -> anyhow::Result<()> {
        if is_builtin(FileCategory::BootImages, name) {
            return Err(anyhow!("cannot delete builtins"));
        }
        let path = self.entry_path(FileCategory::BootImages, name)?;
        if name.contains(".ipxe") {
            if !path.is_file() {
                return Err(anyhow!("a-la-carte boot image: {name} does not exist!"));
            }
            std::fs::remove_file(&path)
                .with_context(|| format!("could not delete {}", path.display()))
        } else {
            if !path.is_dir() {
                return Err(anyhow!("folder boot_image: {name} does not exist!"));
            }
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("could not delete {}", path.display()))
        }
    }

    /// Stops every category provider.
    pub async fn stop(&self) {
        join_all(self.providers.iter().map(|provider| provider.stop())).await;
    }

    /// Resolves a name inside a category, refusing anything that could
    /// escape the category directory.
    fn entry_path(&self, category: FileCategory, name: &str) -> anyhow::Result<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return Err(anyhow!("invalid file name: {name}"));
        }
        Ok(self.root.join(category.as_str()).join(name))
    }
}

/// Builtins first, then whatever the category directory holds.
fn scan_category(root: &Path, category: FileCategory) -> Vec<Value> {
    let mut entries = builtin_entries(category);
    let dir = root.join(category.as_str());
    let listing = match std::fs::read_dir(&dir) {
        Ok(listing) => listing,
        Err(e) => {
            trace!("cannot scan {}: {}", dir.display(), e);
            return entries;
        }
    };
    let mut scanned: Vec<Value> = Vec::new();
    for item in listing.flatten() {
        let name = item.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        match category {
            FileCategory::BootImages => {
                if let Some(entry) = scan_boot_image(&item.path(), &name) {
                    scanned.push(entry);
                }
            }
            FileCategory::IpxeBuilds | FileCategory::WimbootBuilds => {
                if let Some(entry) = scan_build_dir(&item.path(), &name) {
                    scanned.push(entry);
                }
            }
            _ => {
                if item.path().is_file() {
                    let entry = FileEntry {
                        filename: name,
                        modified: modified_timestamp(&item.path()),
                        description: String::new(),
                    };
                    if let Ok(value) = serde_json::to_value(&entry) {
                        scanned.push(value);
                    }
                }
            }
        }
    }
    scanned.sort_by(|a, b| {
        let key = |v: &Value| {
            v.get("filename")
                .or_else(|| v.get("boot_image_name"))
                .or_else(|| v.get("build_name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase()
        };
        key(a).cmp(&key(b))
    });
    entries.extend(scanned);
    entries
}

/// A boot image is either a folder carrying `metadata.json` or an a-la-carte
/// `.ipxe` file.
fn scan_boot_image(path: &Path, name: &str) -> Option<Value> {
    if path.is_dir() {
        let metadata_file = path.join("metadata.json");
        let raw = std::fs::read_to_string(&metadata_file).ok()?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("skipping boot image {} with bad metadata: {}", name, e);
                None
            }
        }
    } else if name.ends_with(".ipxe") {
        Some(json!({
            "boot_image_name": name,
            "created": modified_timestamp(path),
            "image_type": "a-la-carte",
            "description": "a-la-carte boot image",
            "arch": "all",
        }))
    } else {
        None
    }
}

/// Build folders carry their own `metadata.json` with build_id and friends.
fn scan_build_dir(path: &Path, name: &str) -> Option<Value> {
    if !path.is_dir() {
        return None;
    }
    let metadata_file = path.join("metadata.json");
    let raw = std::fs::read_to_string(&metadata_file).ok()?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!("skipping build {} with bad metadata: {}", name, e);
            None
        }
    }
}

/// Standardized format for file modified timestamps.
fn modified_timestamp(path: &Path) -> String {
    let modified = path
        .metadata()
        .and_then(|metadata| metadata.modified())
        .ok();
    match modified {
        Some(time) => DateTime::<Local>::from(time).format(TIMESTAMP_FORMAT).to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_protected() {
        assert!(is_builtin(FileCategory::Stage1Files, "default"));
        assert!(is_builtin(FileCategory::BootImages, "standby_loop"));
        assert!(!is_builtin(FileCategory::Stage1Files, "mine.ipxe"));
        assert!(!is_builtin(FileCategory::Iso, "anything.iso"));
    }

    #[test]
    fn category_names_round_trip() {
        for category in FileCategory::ALL {
            assert_eq!(category.as_str().parse::<FileCategory>().unwrap(), category);
        }
        assert!("nonsense".parse::<FileCategory>().is_err());
    }

    #[tokio::test]
    async fn editor_round_trip_and_guards() -> anyhow::Result<()> {
        let broker = MessageBroker::new();
        let dir = tempfile::tempdir()?;
        let files = FileManager::start(&broker, dir.path().to_path_buf()).await?;

        files.write_file(FileCategory::Stage4, "setup.sh", "#!/bin/sh\n")?;
        assert_eq!(files.read_file(FileCategory::Stage4, "setup.sh")?, "#!/bin/sh\n");

        // names that could leave the category directory are refused
        assert!(files.read_file(FileCategory::Stage4, "../settings.json").is_err());
        assert!(files.write_file(FileCategory::Stage4, "a/b.sh", "x").is_err());
        // builtins cannot be shadowed or removed
        assert!(files.write_file(FileCategory::Stage4, "none", "x").is_err());
        assert!(files.delete_file(FileCategory::Stage4, "none").is_err());

        files.delete_file(FileCategory::Stage4, "setup.sh")?;
        assert!(files.read_file(FileCategory::Stage4, "setup.sh").is_err());

        files.stop().await;
        broker.stop();
        Ok(())
    }
}
