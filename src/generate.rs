//! Placement of generated documents on disk
//!
//! Salt states land in the first file root of the configured environment:
//!
//! ```text
//! /srv/salt/
//! ├── top.sls              base: {web1.example.com: [web1_example_com]}
//! └── web1_example_com/
//!     ├── init.sls         include: [web1_example_com.pip, web1_example_com.timezone]
//!     ├── pip.sls
//!     └── timezone.sls
//! ```
//!
//! Salt reads dots in SLS references as directory separators, so minion
//! ids are stored under a slug with dots replaced by underscores. The top
//! file still targets the real minion id.
//!
//! Ansible playbooks land under `ansible_root`, with a `site.yml` per minion
//! importing every generated playbook.
//!
//! Permission errors are not fatal. They are logged and reported back as
//! "nothing written" so one unwritable minion directory does not stop a run.

use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::DescribeConfig;
use crate::describe::ConfigSystem;

/// Write a generated document for `minion` and update the index files
///
/// Returns the path of the written document, or `None` when the target
/// directory or file could not be written for lack of permissions.
pub fn generate_files(
    config: &DescribeConfig,
    minion: &str,
    contents: &str,
    sls_name: &str,
    config_system: ConfigSystem,
) -> Result<Option<PathBuf>> {
    let (root, extension) = match config_system {
        ConfigSystem::Salt => (config.salt_root(), "sls"),
        ConfigSystem::Ansible => (config.ansible_root.clone(), "yml"),
    };

    let slug = minion_slug(minion)?;
    let minion_dir = root.join(&slug);
    if let Err(e) = std::fs::create_dir_all(&minion_dir) {
        return permission_denied(e, || create_dir_warning(&minion_dir));
    }

    let path = minion_dir.join(format!("{}.{}", sls_name, extension));
    if let Err(e) = std::fs::write(&path, contents) {
        return permission_denied(e, || write_file_warning(&path));
    }
    debug!(path = %path.display(), "wrote generated document");

    let indexed = match config_system {
        ConfigSystem::Salt => update_salt_index(&root, &config.saltenv, minion, &slug, sls_name),
        ConfigSystem::Ansible => update_ansible_index(&minion_dir, sls_name),
    };
    if let Err(e) = indexed {
        match e.downcast_ref::<io::Error>() {
            Some(io_err) if io_err.kind() == io::ErrorKind::PermissionDenied => {
                warn!(
                    "Unable to update index files for {}.  Check that the salt user has the correct permissions.",
                    minion
                );
            }
            _ => return Err(e),
        }
    }

    Ok(Some(path))
}

/// Name of the directory and SLS prefix holding a minion's files
///
/// Ids that could leave the output root are rejected.
pub fn minion_slug(minion: &str) -> Result<String> {
    if minion.is_empty()
        || minion == "."
        || minion == ".."
        || minion.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    {
        bail!("Refusing to generate files for minion id '{}'", minion);
    }
    Ok(minion.replace('.', "_"))
}

pub fn create_dir_warning(dir: &Path) -> String {
    format!(
        "Unable to create directory {}.  Check that the salt user has the correct permissions.",
        dir.display()
    )
}

pub fn write_file_warning(path: &Path) -> String {
    format!(
        "Unable to write to file {}.  Check that the salt user has the correct permissions.",
        path.display()
    )
}

/// Turn a permission error into a logged warning; anything else is an error
pub fn permission_denied<T>(error: io::Error, message: impl FnOnce() -> String) -> Result<Option<T>> {
    if error.kind() == io::ErrorKind::PermissionDenied {
        warn!("{}", message());
        Ok(None)
    } else {
        Err(anyhow::Error::new(error).context(message()))
    }
}

/// Add the state to the minion's `init.sls` and the minion to `top.sls`
fn update_salt_index(
    root: &Path,
    saltenv: &str,
    minion: &str,
    slug: &str,
    sls_name: &str,
) -> Result<()> {
    let init_path = root.join(slug).join("init.sls");
    let mut init = read_yaml_mapping(&init_path)?;
    let mut includes = string_set(init.get("include"));
    includes.insert(format!("{}.{}", slug, sls_name));
    init.insert(Value::String("include".to_string()), string_sequence(includes));
    write_yaml(&init_path, &Value::Mapping(init))?;

    let top_path = root.join("top.sls");
    let mut top = read_yaml_mapping(&top_path)?;
    let mut env = match top.get(saltenv) {
        Some(Value::Mapping(env)) => env.clone(),
        _ => Mapping::new(),
    };
    let mut targets = string_set(env.get(minion));
    targets.insert(slug.to_string());
    env.insert(Value::String(minion.to_string()), string_sequence(targets));
    top.insert(Value::String(saltenv.to_string()), Value::Mapping(env));
    write_yaml(&top_path, &Value::Mapping(top))
}

/// Add the playbook to the minion's `site.yml`
fn update_ansible_index(minion_dir: &Path, sls_name: &str) -> Result<()> {
    let site_path = minion_dir.join("site.yml");

    let mut playbooks = BTreeSet::new();
    if site_path.exists() {
        let contents = std::fs::read_to_string(&site_path)
            .with_context(|| format!("Failed to read {}", site_path.display()))?;
        if let Ok(Value::Sequence(entries)) = serde_yaml::from_str::<Value>(&contents) {
            playbooks.extend(
                entries
                    .iter()
                    .filter_map(|entry| entry.get("import_playbook"))
                    .filter_map(Value::as_str)
                    .map(str::to_string),
            );
        }
    }
    playbooks.insert(format!("{}.yml", sls_name));

    let site = playbooks
        .into_iter()
        .map(|playbook| {
            let mut entry = Mapping::new();
            entry.insert(Value::String("import_playbook".to_string()), Value::String(playbook));
            Value::Mapping(entry)
        })
        .collect();
    write_yaml(&site_path, &Value::Sequence(site))
}

fn read_yaml_mapping(path: &Path) -> Result<Mapping> {
    if !path.exists() {
        return Ok(Mapping::new());
    }
    let contents = std::fs::read_to_string(path)?;
    match serde_yaml::from_str::<Value>(&contents) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(_) => Ok(Mapping::new()),
        Err(e) => {
            warn!(path = %path.display(), "replacing unparseable index file: {}", e);
            Ok(Mapping::new())
        }
    }
}

fn write_yaml(path: &Path, value: &Value) -> Result<()> {
    let contents = serde_yaml::to_string(value)?;
    std::fs::write(path, contents)?;
    Ok(())
}

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(Value::as_sequence)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_sequence(values: BTreeSet<String>) -> Value {
    Value::Sequence(values.into_iter().map(Value::String).collect())
}
