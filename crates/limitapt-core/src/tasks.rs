use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ConcretePackage;

/// One of the six operations a user may request on a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Install,
    Remove,
    PhysicallyRemove,
    Purge,
    Markauto,
    Unmarkauto,
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Install,
        TaskKind::Remove,
        TaskKind::PhysicallyRemove,
        TaskKind::Purge,
        TaskKind::Markauto,
        TaskKind::Unmarkauto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::PhysicallyRemove => "physically-remove",
            Self::Purge => "purge",
            Self::Markauto => "markauto",
            Self::Unmarkauto => "unmarkauto",
        }
    }

    /// Verb phrase used in user-facing messages.
    pub fn action(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::PhysicallyRemove => "physically remove",
            Self::Purge => "purge",
            Self::Markauto => "mark as automatically installed",
            Self::Unmarkauto => "mark as manually installed",
        }
    }

    /// Split a `diverse` operand such as `vim+`, `vim-`, `vim&M` or `vim&m`.
    pub fn from_suffixed(operand: &str) -> Option<(Self, &str)> {
        let split = |suffix: &str, kind: Self| {
            operand
                .strip_suffix(suffix)
                .filter(|name| !name.is_empty())
                .map(|name| (kind, name))
        };
        split("+", Self::Install)
            .or_else(|| split("-", Self::Remove))
            .or_else(|| split("&M", Self::Markauto))
            .or_else(|| split("&m", Self::Unmarkauto))
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw user requests by package name, in the order given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSet {
    pub install: Vec<String>,
    pub remove: Vec<String>,
    pub physically_remove: Vec<String>,
    pub purge: Vec<String>,
    pub markauto: Vec<String>,
    pub unmarkauto: Vec<String>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: TaskKind) -> &[String] {
        match kind {
            TaskKind::Install => &self.install,
            TaskKind::Remove => &self.remove,
            TaskKind::PhysicallyRemove => &self.physically_remove,
            TaskKind::Purge => &self.purge,
            TaskKind::Markauto => &self.markauto,
            TaskKind::Unmarkauto => &self.unmarkauto,
        }
    }

    fn get_mut(&mut self, kind: TaskKind) -> &mut Vec<String> {
        match kind {
            TaskKind::Install => &mut self.install,
            TaskKind::Remove => &mut self.remove,
            TaskKind::PhysicallyRemove => &mut self.physically_remove,
            TaskKind::Purge => &mut self.purge,
            TaskKind::Markauto => &mut self.markauto,
            TaskKind::Unmarkauto => &mut self.unmarkauto,
        }
    }

    pub fn push(&mut self, kind: TaskKind, name: impl Into<String>) {
        self.get_mut(kind).push(name.into());
    }

    pub fn with(mut self, kind: TaskKind, names: &[&str]) -> Self {
        for name in names {
            self.push(kind, *name);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        TaskKind::ALL.iter().all(|kind| self.get(*kind).is_empty())
    }
}

/// Requests resolved against the live package universe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizedTaskSet {
    #[serde(default)]
    pub install: Vec<ConcretePackage>,
    #[serde(default)]
    pub remove: Vec<ConcretePackage>,
    #[serde(default)]
    pub physically_remove: Vec<ConcretePackage>,
    #[serde(default)]
    pub purge: Vec<ConcretePackage>,
    #[serde(default)]
    pub markauto: Vec<ConcretePackage>,
    #[serde(default)]
    pub unmarkauto: Vec<ConcretePackage>,
}

/// Output of [`RealizedTaskSet::realize`]: the resolved tasks plus the
/// requested names that do not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Realization {
    pub tasks: RealizedTaskSet,
    pub missing: Vec<(TaskKind, String)>,
}

impl RealizedTaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every name through `resolve`, keeping request order and
    /// collecting unknown names instead of failing.
    pub fn realize<F>(tasks: &TaskSet, mut resolve: F) -> Realization
    where
        F: FnMut(&str) -> Option<ConcretePackage>,
    {
        let mut realization = Realization::default();
        for kind in TaskKind::ALL {
            for name in tasks.get(kind) {
                match resolve(name) {
                    Some(package) => realization.tasks.get_mut(kind).push(package),
                    None => realization.missing.push((kind, name.clone())),
                }
            }
        }
        realization
    }

    pub fn get(&self, kind: TaskKind) -> &[ConcretePackage] {
        match kind {
            TaskKind::Install => &self.install,
            TaskKind::Remove => &self.remove,
            TaskKind::PhysicallyRemove => &self.physically_remove,
            TaskKind::Purge => &self.purge,
            TaskKind::Markauto => &self.markauto,
            TaskKind::Unmarkauto => &self.unmarkauto,
        }
    }

    fn get_mut(&mut self, kind: TaskKind) -> &mut Vec<ConcretePackage> {
        match kind {
            TaskKind::Install => &mut self.install,
            TaskKind::Remove => &mut self.remove,
            TaskKind::PhysicallyRemove => &mut self.physically_remove,
            TaskKind::Purge => &mut self.purge,
            TaskKind::Markauto => &mut self.markauto,
            TaskKind::Unmarkauto => &mut self.unmarkauto,
        }
    }

    pub fn push(&mut self, kind: TaskKind, package: ConcretePackage) {
        self.get_mut(kind).push(package);
    }

    pub fn contains(&self, kind: TaskKind, package: &ConcretePackage) -> bool {
        self.get(kind).contains(package)
    }

    pub fn contains_name(&self, kind: TaskKind, name: &str) -> bool {
        self.get(kind).iter().any(|package| package.name() == name)
    }

    pub fn contains_anywhere(&self, package: &ConcretePackage) -> bool {
        TaskKind::ALL
            .iter()
            .any(|kind| self.contains(*kind, package))
    }

    /// Deletions the user asked for under any removal task.
    pub fn is_explicit_removal(&self, package: &ConcretePackage) -> bool {
        self.contains(TaskKind::Remove, package)
            || self.contains(TaskKind::PhysicallyRemove, package)
            || self.contains(TaskKind::Purge, package)
    }

    /// Removal the user asked for through `physically-remove` or `purge`.
    pub fn is_physical_removal(&self, package: &ConcretePackage) -> bool {
        self.contains(TaskKind::PhysicallyRemove, package)
            || self.contains(TaskKind::Purge, package)
    }

    /// Remove every occurrence of `package` from one category; returns whether any was removed.
    pub fn remove(&mut self, kind: TaskKind, package: &ConcretePackage) -> bool {
        let list = self.get_mut(kind);
        let before = list.len();
        list.retain(|item| item != package);
        before != list.len()
    }

    pub fn remove_everywhere(&mut self, package: &ConcretePackage) -> bool {
        let mut removed = false;
        for kind in TaskKind::ALL {
            removed |= self.remove(kind, package);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskKind, &ConcretePackage)> {
        TaskKind::ALL
            .into_iter()
            .flat_map(move |kind| self.get(kind).iter().map(move |package| (kind, package)))
    }

    pub fn len(&self) -> usize {
        TaskKind::ALL.iter().map(|kind| self.get(*kind).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
