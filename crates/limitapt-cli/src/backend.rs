use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use limitapt_core::{ConcretePackage, ALL_ARCHITECTURE};
use limitapt_policy::{
    CommitError, CommitProgress, PackageChange, PackageFacts, PackageUniverse, Transition,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::debversion::compare_versions;
use crate::render::OutputStyle;
use crate::update::{verify_checksum, SourceFetcher};

const SNAPSHOT_FILE_VERSION: u32 = 1;
const DEFAULT_NATIVE_ARCH: &str = "amd64";

/// One package as recorded in `packages.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPackage {
    pub name: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(default)]
    pub auto: bool,
    #[serde(default = "default_trusted")]
    pub trusted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    #[serde(default)]
    pub installed_size: u64,
    #[serde(default)]
    pub download_size: u64,
    /// `name` (same architecture, then `all`) or `name:arch`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
}

fn default_trusted() -> bool {
    true
}

fn snapshot_file_version() -> u32 {
    SNAPSHOT_FILE_VERSION
}

fn default_native_arch() -> String {
    DEFAULT_NATIVE_ARCH.to_string()
}

fn dirty_marker_path(snapshot: &Path) -> PathBuf {
    snapshot.with_extension("dirty")
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(default = "snapshot_file_version")]
    version: u32,
    #[serde(default = "default_native_arch")]
    native_arch: String,
    #[serde(default)]
    dirty: bool,
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    packages: Vec<SnapshotPackage>,
}

/// One available package as published in the package lists.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ListedPackage {
    name: String,
    arch: String,
    version: String,
    #[serde(default = "default_trusted")]
    trusted: bool,
    #[serde(default)]
    archive: Option<String>,
    #[serde(default)]
    installed_size: u64,
    #[serde(default)]
    download_size: u64,
    #[serde(default)]
    depends: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PackageListsFile {
    #[serde(default = "snapshot_file_version")]
    version: u32,
    #[serde(default, rename = "package")]
    packages: Vec<ListedPackage>,
}

/// Where `update` fetches fresh package lists from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageListsSource {
    pub url: String,
    pub sha256: Option<String>,
    pub style: OutputStyle,
}

fn parse_package_lists(bytes: &[u8]) -> Result<BTreeMap<ConcretePackage, ListedPackage>> {
    let raw = std::str::from_utf8(bytes).context("package lists are not valid UTF-8")?;
    let file: PackageListsFile = toml::from_str(raw).context("failed parsing package lists")?;
    if file.version != SNAPSHOT_FILE_VERSION {
        return Err(anyhow!(
            "unsupported package lists version {} (expected {})",
            file.version,
            SNAPSHOT_FILE_VERSION
        ));
    }
    let mut listed = BTreeMap::new();
    for entry in file.packages {
        let package = ConcretePackage::new(entry.name.clone(), entry.arch.clone());
        if listed.insert(package.clone(), entry).is_some() {
            return Err(anyhow!("duplicate package in package lists: {package}"));
        }
    }
    Ok(listed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// Install or move to the candidate; `auto` when pulled in as a dependency.
    Install { auto: bool },
    Delete { purge: bool },
    /// An upgrade held back because it would need new packages.
    Keep,
}

/// A file-backed package database used by the `limitapt` binary.
///
/// Marks live in memory until [`PackageUniverse::commit`] writes the new
/// state back under an exclusive lock.
#[derive(Debug)]
pub struct SnapshotUniverse {
    path: PathBuf,
    native_arch: String,
    dirty: bool,
    packages: BTreeMap<ConcretePackage, SnapshotPackage>,
    marks: BTreeMap<ConcretePackage, Mark>,
    auto_marks: BTreeMap<ConcretePackage, bool>,
    lists: Option<PackageListsSource>,
}

impl SnapshotUniverse {
    /// A missing snapshot is an empty database.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match fs::read_to_string(path) {
            Ok(raw) => toml::from_str::<SnapshotFile>(&raw)
                .with_context(|| format!("failed parsing package snapshot: {}", path.display()))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no package snapshot, starting empty");
                SnapshotFile {
                    version: SNAPSHOT_FILE_VERSION,
                    native_arch: default_native_arch(),
                    dirty: false,
                    packages: Vec::new(),
                }
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading package snapshot: {}", path.display()))
            }
        };
        if file.version != SNAPSHOT_FILE_VERSION {
            return Err(anyhow!(
                "unsupported package snapshot version {} (expected {})",
                file.version,
                SNAPSHOT_FILE_VERSION
            ));
        }

        let mut packages = BTreeMap::new();
        for record in file.packages {
            let package = ConcretePackage::new(record.name.clone(), record.arch.clone());
            if packages.insert(package.clone(), record).is_some() {
                return Err(anyhow!(
                    "duplicate package in snapshot {}: {package}",
                    path.display()
                ));
            }
        }
        let dirty = file.dirty || dirty_marker_path(path).exists();
        debug!(path = %path.display(), packages = packages.len(), dirty, "loaded package snapshot");
        Ok(Self {
            path: path.to_path_buf(),
            native_arch: file.native_arch,
            dirty,
            packages,
            marks: BTreeMap::new(),
            auto_marks: BTreeMap::new(),
            lists: None,
        })
    }

    pub fn with_package_lists(mut self, source: PackageListsSource) -> Self {
        self.lists = Some(source);
        self
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn lock(&self) -> Result<fs::File, CommitError> {
        let lock_path = self.lock_path();
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|err| CommitError::LockFailed(format!("{}: {err}", lock_path.display())))?;
        lock.try_lock_exclusive().map_err(|err| {
            if err.kind() == io::ErrorKind::WouldBlock {
                CommitError::LockFailed(format!(
                    "{} is held by another process",
                    lock_path.display()
                ))
            } else {
                CommitError::LockFailed(format!("{}: {err}", lock_path.display()))
            }
        })?;
        Ok(lock)
    }

    /// Record on disk that applying changes failed half way.
    fn mark_dirty(&mut self) {
        self.dirty = true;
        let marker = dirty_marker_path(&self.path);
        if let Err(err) = fs::write(&marker, b"") {
            warn!(path = %marker.display(), %err, "failed recording dirty package database");
        }
    }

    /// Replace the candidate data with `listed`, keeping what is installed.
    /// Packages that are neither listed nor installed are forgotten.
    fn merge_lists(&mut self, listed: BTreeMap<ConcretePackage, ListedPackage>) {
        let mut previous = std::mem::take(&mut self.packages);
        let mut merged = BTreeMap::new();
        for (package, entry) in listed {
            let (installed, auto) = previous
                .remove(&package)
                .map(|record| (record.installed, record.auto))
                .unwrap_or((None, false));
            merged.insert(
                package,
                SnapshotPackage {
                    name: entry.name,
                    arch: entry.arch,
                    installed,
                    candidate: Some(entry.version),
                    auto,
                    trusted: entry.trusted,
                    archive: entry.archive,
                    installed_size: entry.installed_size,
                    download_size: entry.download_size,
                    depends: entry.depends,
                },
            );
        }
        for (package, mut record) in previous {
            if record.installed.is_some() {
                debug!(%package, "installed package is no longer listed");
                record.candidate = None;
                merged.insert(package, record);
            }
        }
        self.packages = merged;
    }

    fn record(&self, package: &ConcretePackage) -> Option<&SnapshotPackage> {
        self.packages.get(package)
    }

    fn facts_of(&self, package: &ConcretePackage, record: &SnapshotPackage) -> PackageFacts {
        let upgradable = match (&record.installed, &record.candidate) {
            (Some(installed), Some(candidate)) => {
                compare_versions(candidate, installed) == Ordering::Greater
            }
            _ => false,
        };
        PackageFacts {
            package: package.clone(),
            installed_version: record.installed.clone(),
            candidate_version: record.candidate.clone(),
            auto_installed: record.installed.is_some() && record.auto,
            upgradable,
            trusted: record.trusted,
        }
    }

    /// Resolve a dependency of `owner`: `name:arch` exactly, otherwise the
    /// owner's architecture and then `all`.
    fn resolve_dependency(
        &self,
        owner: &ConcretePackage,
        dependency: &str,
    ) -> Option<ConcretePackage> {
        if let Some((name, arch)) = dependency.split_once(':') {
            let package = ConcretePackage::new(name, arch);
            return self.packages.contains_key(&package).then_some(package);
        }
        [owner.architecture(), ALL_ARCHITECTURE]
            .into_iter()
            .map(|arch| ConcretePackage::new(dependency, arch))
            .find(|package| self.packages.contains_key(package))
    }

    fn dependencies(&self, package: &ConcretePackage) -> Vec<Option<ConcretePackage>> {
        self.record(package)
            .map(|record| {
                record
                    .depends
                    .iter()
                    .map(|dependency| self.resolve_dependency(package, dependency))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn installed_now(&self, package: &ConcretePackage) -> bool {
        self.record(package)
            .is_some_and(|record| record.installed.is_some())
    }

    fn installed_after(&self, package: &ConcretePackage) -> bool {
        match self.marks.get(package) {
            Some(Mark::Install { .. }) => true,
            Some(Mark::Delete { .. }) => false,
            Some(Mark::Keep) | None => self.installed_now(package),
        }
    }

    fn auto_after(&self, package: &ConcretePackage) -> bool {
        if let Some(auto) = self.auto_marks.get(package) {
            return *auto;
        }
        match (self.marks.get(package), self.record(package)) {
            (Some(Mark::Install { auto }), Some(record)) if record.installed.is_none() => *auto,
            (_, Some(record)) => record.auto,
            (_, None) => false,
        }
    }

    /// Version present after the marks are applied.
    fn version_after(&self, package: &ConcretePackage) -> Option<&str> {
        let record = self.record(package)?;
        match self.marks.get(package) {
            Some(Mark::Install { .. }) => record.candidate.as_deref(),
            Some(Mark::Delete { .. }) => None,
            Some(Mark::Keep) | None => record.installed.as_deref(),
        }
    }

    fn broken(
        &self,
        package: &ConcretePackage,
        installed: impl Fn(&ConcretePackage) -> bool,
    ) -> bool {
        self.dependencies(package)
            .iter()
            .any(|dependency| !dependency.as_ref().is_some_and(&installed))
    }

    fn needs_new_packages(&self, package: &ConcretePackage) -> bool {
        self.dependencies(package)
            .iter()
            .flatten()
            .any(|dependency| !self.installed_after(dependency))
    }

    /// Everything reachable from the manually installed packages that stay.
    fn needed_packages(&self) -> BTreeSet<ConcretePackage> {
        let mut needed = BTreeSet::new();
        let mut queue: VecDeque<ConcretePackage> = self
            .packages
            .keys()
            .filter(|package| self.installed_after(package) && !self.auto_after(package))
            .cloned()
            .collect();
        while let Some(package) = queue.pop_front() {
            if !needed.insert(package.clone()) {
                continue;
            }
            for dependency in self.dependencies(&package).into_iter().flatten() {
                if !needed.contains(&dependency) {
                    queue.push_back(dependency);
                }
            }
        }
        needed
    }

    fn install_with_dependencies(&mut self, package: &ConcretePackage, auto: bool) {
        let mut queue = VecDeque::from([(package.clone(), auto)]);
        while let Some((current, auto)) = queue.pop_front() {
            let Some(record) = self.record(&current) else {
                continue;
            };
            if record.candidate.is_none() {
                debug!(package = %current, "no candidate version to install");
                continue;
            }
            let installed = record.installed.clone();
            let candidate = record.candidate.clone();
            if installed.is_some() && installed == candidate {
                if matches!(self.marks.get(&current), Some(Mark::Delete { .. })) {
                    self.marks.remove(&current);
                }
                continue;
            }
            self.marks.insert(current.clone(), Mark::Install { auto });
            for dependency in self.dependencies(&current).into_iter().flatten() {
                if !self.installed_after(&dependency) {
                    queue.push_back((dependency, true));
                }
            }
        }
    }

    fn delete_with_dependents(&mut self, package: &ConcretePackage, purge: bool) {
        let mut queue = VecDeque::from([package.clone()]);
        while let Some(current) = queue.pop_front() {
            if !self.installed_now(&current) {
                if matches!(self.marks.get(&current), Some(Mark::Install { .. })) {
                    self.marks.remove(&current);
                }
                self.auto_marks.remove(&current);
                continue;
            }
            self.marks.insert(current.clone(), Mark::Delete { purge });
            self.auto_marks.remove(&current);
            let dependents: Vec<ConcretePackage> = self
                .packages
                .keys()
                .filter(|candidate| self.installed_after(candidate))
                .filter(|candidate| {
                    self.dependencies(candidate)
                        .iter()
                        .flatten()
                        .any(|dependency| dependency == &current)
                })
                .cloned()
                .collect();
            for dependent in dependents {
                debug!(package = %dependent, dependency = %current, "removing dependent package");
                queue.push_back(dependent);
            }
        }
    }

    fn transition_of(&self, package: &ConcretePackage, record: &SnapshotPackage) -> Transition {
        match self.marks.get(package) {
            Some(Mark::Install { .. }) => match (&record.installed, &record.candidate) {
                (None, _) => Transition::Install,
                (Some(installed), Some(candidate)) => match compare_versions(candidate, installed) {
                    Ordering::Greater => Transition::Upgrade,
                    Ordering::Less => Transition::Downgrade,
                    Ordering::Equal => Transition::Reinstall,
                },
                (Some(_), None) => Transition::Unchanged,
            },
            Some(Mark::Delete { purge }) => Transition::Delete { purge: *purge },
            Some(Mark::Keep) => Transition::Keep,
            None => Transition::Unchanged,
        }
    }

    fn save(&self) -> Result<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_FILE_VERSION,
            native_arch: self.native_arch.clone(),
            dirty: self.dirty,
            packages: self.packages.values().cloned().collect(),
        };
        let content = toml::to_string(&file).context("failed serializing package snapshot")?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("failed writing package snapshot: {}", tmp.display()))?;
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err).with_context(|| {
                format!("failed replacing package snapshot: {}", self.path.display())
            });
        }
        if !self.dirty {
            let marker = dirty_marker_path(&self.path);
            match fs::remove_file(&marker) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %marker.display(), %err, "failed clearing dirty package database");
                }
            }
        }
        Ok(())
    }

    fn apply_marks(&mut self) {
        let marks = std::mem::take(&mut self.marks);
        let auto_marks = std::mem::take(&mut self.auto_marks);
        for (package, mark) in marks {
            let Some(record) = self.packages.get_mut(&package) else {
                continue;
            };
            match mark {
                Mark::Install { auto } => {
                    if record.installed.is_none() {
                        record.auto = auto;
                    }
                    record.installed = record.candidate.clone();
                }
                Mark::Delete { .. } => {
                    record.installed = None;
                    record.auto = false;
                }
                Mark::Keep => {}
            }
        }
        for (package, auto) in auto_marks {
            if let Some(record) = self.packages.get_mut(&package) {
                if record.installed.is_some() {
                    record.auto = auto;
                }
            }
        }
        self.dirty = false;
    }
}

impl PackageUniverse for SnapshotUniverse {
    fn lookup(&self, name: &str) -> Option<PackageFacts> {
        if let Some((package_name, arch)) = name.split_once(':') {
            let package = ConcretePackage::new(package_name, arch);
            return self.facts(&package);
        }
        let preferred = [self.native_arch.as_str(), ALL_ARCHITECTURE]
            .into_iter()
            .map(|arch| ConcretePackage::new(name, arch))
            .find(|package| self.packages.contains_key(package));
        let package = preferred.or_else(|| {
            let mut matching = self.packages.keys().filter(|package| package.name() == name);
            match (matching.next(), matching.next()) {
                (Some(only), None) => Some(only.clone()),
                _ => None,
            }
        })?;
        self.facts(&package)
    }

    fn facts(&self, package: &ConcretePackage) -> Option<PackageFacts> {
        self.record(package)
            .map(|record| self.facts_of(package, record))
    }

    fn packages(&self) -> Vec<PackageFacts> {
        self.packages
            .iter()
            .map(|(package, record)| self.facts_of(package, record))
            .collect()
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn update(&mut self) -> Result<(), CommitError> {
        let Some(source) = self.lists.clone() else {
            return Err(CommitError::FetchFailed(
                "no package lists source is configured".to_string(),
            ));
        };
        let lock = self.lock()?;

        let label = "package lists";
        let listed = SourceFetcher::new(source.style)
            .fetch("lists", &source.url)
            .and_then(|bytes| {
                verify_checksum(label, &bytes, source.sha256.as_deref())?;
                parse_package_lists(&bytes)
            })
            .map_err(|err| {
                let _ = fs2::FileExt::unlock(&lock);
                CommitError::FetchFailed(format!("{err:#}"))
            })?;

        let previous = self.packages.clone();
        self.merge_lists(listed);
        if let Err(err) = self.save() {
            self.packages = previous;
            let _ = fs2::FileExt::unlock(&lock);
            return Err(CommitError::Apply(format!("{err:#}")));
        }
        info!(url = %source.url, packages = self.packages.len(), "refreshed package lists");
        let _ = fs2::FileExt::unlock(&lock);
        Ok(())
    }

    fn mark_install(&mut self, package: &ConcretePackage) {
        self.auto_marks.remove(package);
        self.install_with_dependencies(package, false);
    }

    fn mark_delete(&mut self, package: &ConcretePackage, purge: bool) {
        self.delete_with_dependents(package, purge);
    }

    fn mark_auto(&mut self, package: &ConcretePackage, auto: bool) {
        let Some(record) = self.record(package) else {
            return;
        };
        if record.installed.is_some() && record.auto != auto {
            self.auto_marks.insert(package.clone(), auto);
        } else {
            self.auto_marks.remove(package);
        }
    }

    fn upgrade(&mut self, full: bool) {
        let upgradable: Vec<ConcretePackage> = self
            .packages
            .iter()
            .filter(|(package, record)| {
                !self.marks.contains_key(*package) && self.facts_of(package, record).upgradable
            })
            .map(|(package, _)| package.clone())
            .collect();
        for package in upgradable {
            if !full && self.needs_new_packages(&package) {
                debug!(%package, "keeping back upgrade that needs new packages");
                self.marks.insert(package, Mark::Keep);
                continue;
            }
            self.install_with_dependencies(&package, false);
        }
    }

    fn auto_removable(&self) -> Vec<ConcretePackage> {
        let needed = self.needed_packages();
        self.packages
            .keys()
            .filter(|package| self.installed_after(package) && !needed.contains(*package))
            .cloned()
            .collect()
    }

    fn changes(&self) -> Vec<PackageChange> {
        let needed = self.needed_packages();
        let touched: BTreeSet<&ConcretePackage> =
            self.marks.keys().chain(self.auto_marks.keys()).collect();

        touched
            .into_iter()
            .filter_map(|package| {
                let record = self.record(package)?;
                let transition = self.transition_of(package, record);
                let auto_flag = match (self.auto_marks.get(package), self.marks.get(package)) {
                    (Some(auto), _) => Some(*auto),
                    (None, Some(Mark::Install { auto: true })) if record.installed.is_none() => {
                        Some(true)
                    }
                    _ => None,
                };
                if transition == Transition::Unchanged && auto_flag.is_none() {
                    return None;
                }
                let installed_after = self.installed_after(package);
                let mut change = PackageChange::new(package.clone(), transition);
                change.installed_version = record.installed.clone();
                change.target_version = self.version_after(package).map(str::to_string);
                change.auto_flag = auto_flag;
                change.auto_removable = record.installed.is_some()
                    && (record.auto || self.auto_after(package))
                    && !needed.contains(package);
                change.now_broken = record.installed.is_some()
                    && self.broken(package, |dep| self.installed_now(dep));
                change.inst_broken =
                    installed_after && self.broken(package, |dep| self.installed_after(dep));
                change.trusted = record.trusted;
                change.archive = record.archive.clone();
                Some(change)
            })
            .collect()
    }

    fn required_download(&self) -> u64 {
        self.changes()
            .iter()
            .filter(|change| change.transition.is_setup())
            .filter_map(|change| self.record(&change.package))
            .map(|record| record.download_size)
            .sum()
    }

    fn required_space(&self) -> i64 {
        self.changes()
            .iter()
            .filter_map(|change| {
                let record = self.record(&change.package)?;
                let size = i64::try_from(record.installed_size).unwrap_or(i64::MAX);
                match change.transition {
                    Transition::Install => Some(size),
                    Transition::Delete { .. } => Some(-size),
                    _ => None,
                }
            })
            .sum()
    }

    fn commit(&mut self, progress: &mut dyn CommitProgress) -> Result<(), CommitError> {
        let lock = self.lock()?;

        let changes = self.changes();
        progress.fetch_started(self.required_download());
        for change in changes.iter().filter(|change| change.transition.is_setup()) {
            let record = self.record(&change.package).ok_or_else(|| {
                CommitError::FetchFailed(format!("unknown package {}", change.package))
            })?;
            progress.fetched(&change.package, record.download_size);
        }
        for change in &changes {
            progress.unpacking(&change.package);
        }

        let previous = self.packages.clone();
        self.apply_marks();
        if let Err(err) = self.save() {
            self.packages = previous;
            self.mark_dirty();
            let _ = fs2::FileExt::unlock(&lock);
            return Err(CommitError::Apply(format!("{err:#}")));
        }
        info!(path = %self.path.display(), changes = changes.len(), "committed package changes");
        progress.finished();
        let _ = fs2::FileExt::unlock(&lock);
        Ok(())
    }
}
