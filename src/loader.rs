//! Read descriptor records from YAML files.
//!
//! Types live in one file per type under one or more base directories; the type name is
//! the file's path relative to its base directory, without the `.yaml` extension, with
//! `/` separators. Protocols are addressed as `BASEDIR:namespace/of/proto` and read from
//! `BASEDIR/namespace/of/proto.yaml`.

use crate::error::LoadError;
use crate::protocol::Schema;
use crate::raw::{RawProtocol, RawType};
use crate::validation::SEPARATOR;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const EXTENSION: &str = "yaml";

/// Location of one protocol file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSource {
    pub base_dir: PathBuf,
    pub name: String,
}

impl ProtocolSource {
    pub fn new(base_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        ProtocolSource { base_dir: base_dir.into(), name: name.into() }
    }

    pub fn path(&self) -> PathBuf {
        let mut path = self.base_dir.clone();
        for part in self.name.split(SEPARATOR) {
            path.push(part);
        }
        path.set_extension(EXTENSION);
        path
    }
}

impl FromStr for ProtocolSource {
    type Err = String;

    /// Parse `BASEDIR:namespace/of/proto`. The last `:` separates the two, so Windows drive
    /// letters in the base directory are kept.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, name) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("protocol {:?} must be BASEDIR:NAME", s))?;
        if base.is_empty() || name.is_empty() {
            return Err(format!("protocol {:?} must be BASEDIR:NAME", s));
        }
        Ok(ProtocolSource::new(base, name))
    }
}

/// Read every `*.yaml` type descriptor under each directory.
pub fn load_type_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<BTreeMap<String, RawType>, LoadError> {
    let mut types = BTreeMap::new();
    for dir in dirs {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        collect_yaml_files(dir, &mut files)?;
        files.sort();
        for file in files {
            let name = type_name(dir, &file)?;
            let raw: RawType = read_yaml(&file)?;
            debug!(type_name = %name, path = %file.display(), "loaded type");
            if types.insert(name.clone(), raw).is_some() {
                return Err(LoadError::Parse {
                    path: file,
                    message: format!("type {} is defined in more than one directory", name),
                });
            }
        }
    }
    Ok(types)
}

/// Read each protocol descriptor.
pub fn load_protocols(sources: &[ProtocolSource]) -> Result<BTreeMap<String, RawProtocol>, LoadError> {
    let mut protocols = BTreeMap::new();
    for source in sources {
        let path = source.path();
        let raw: RawProtocol = read_yaml(&path)?;
        debug!(protocol = %source.name, path = %path.display(), messages = raw.messages.len(), "loaded protocol");
        if protocols.insert(source.name.clone(), raw).is_some() {
            return Err(LoadError::Parse {
                path,
                message: format!("protocol {} is listed more than once", source.name),
            });
        }
    }
    Ok(protocols)
}

/// Read types and protocols from disk and load them into a [`Schema`].
pub fn load_schema<P: AsRef<Path>>(type_dirs: &[P], protocols: &[ProtocolSource]) -> Result<Schema, LoadError> {
    let types = load_type_dirs(type_dirs)?;
    let protocols = load_protocols(protocols)?;
    debug!(types = types.len(), protocols = protocols.len(), "resolving schema");
    Schema::load(&types, &protocols)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io { path: path.to_path_buf(), source })?;
    serde_yaml::from_str(&text).map_err(|e| LoadError::Parse { path: path.to_path_buf(), message: e.to_string() })
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    let io_err = |source| LoadError::Io { path: dir.to_path_buf(), source };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}

fn type_name(base: &Path, file: &Path) -> Result<String, LoadError> {
    let relative = file.strip_prefix(base).unwrap_or(file).with_extension("");
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| LoadError::Parse {
            path: file.to_path_buf(),
            message: "file name is not valid UTF-8".to_string(),
        })?;
        parts.push(part.to_string());
    }
    let separator = SEPARATOR.to_string();
    Ok(parts.join(separator.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_source_from_str() {
        let src: ProtocolSource = "base/dir:ns/proto".parse().unwrap();
        assert_eq!(src, ProtocolSource::new("base/dir", "ns/proto"));
        assert_eq!(src.path(), Path::new("base/dir/ns/proto.yaml"));
        assert!("no_colon".parse::<ProtocolSource>().is_err());
        assert!(":name".parse::<ProtocolSource>().is_err());
    }

    #[test]
    fn type_name_uses_slashes() {
        let name = type_name(Path::new("/types"), Path::new("/types/messgen/test/simple_struct.yaml")).unwrap();
        assert_eq!(name, "messgen/test/simple_struct");
    }
}
