use limitapt_core::{
    ConcretePackage, CoownershipLedger, DebconfPriorities, Enclosing, LedgerUpdate, Priority,
    RealizedTaskSet, TaskKind, ROOT_USERNAME,
};
use tracing::{debug, warn};

use crate::changes::{PackageChange, Transition};
use crate::denial::{Denial, Warning, WarningCause};
use crate::error::PolicyError;

/// The user an operation runs for, with the privileges resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub username: String,
    /// Root or a member of the upgraders group.
    pub may_upgrade: bool,
}

impl Actor {
    pub fn new(username: impl Into<String>, may_upgrade: bool) -> Self {
        Self {
            username: username.into(),
            may_upgrade,
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_USERNAME, true)
    }

    pub fn is_root(&self) -> bool {
        self.username == ROOT_USERNAME
    }
}

/// Work modes selected on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modes {
    pub force: bool,
    pub fatal_errors: bool,
    pub remove_dependencies: bool,
    pub purge_unused: bool,
    pub assume_yes: bool,
    pub simulate: bool,
}

impl Modes {
    pub fn check_for(&self, actor: &Actor) -> Result<(), PolicyError> {
        if actor.is_root() {
            return Ok(());
        }
        if self.force {
            return Err(PolicyError::OnlyRootMayForce);
        }
        if self.purge_unused {
            return Err(PolicyError::OnlyRootMayPurge);
        }
        Ok(())
    }
}

/// How strictly denials are enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Enforcement {
    #[default]
    Block,
    /// Resuming interrupted work: denials are reported as warnings.
    WarnOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationResult {
    pub denials: Vec<Denial>,
    pub warnings: Vec<Warning>,
    /// Ledger changes decided here, applied only after a successful commit.
    pub ledger_updates: Vec<LedgerUpdate>,
}

impl AuthorizationResult {
    pub fn is_authorized(&self) -> bool {
        self.denials.is_empty()
    }

    pub fn into_verdict(self) -> Result<Self, PolicyError> {
        if self.denials.is_empty() {
            Ok(self)
        } else {
            Err(PolicyError::SystemComposingByResolver {
                denials: self.denials,
            })
        }
    }
}

/// Decides, change by change, whether an actor may apply a diff.
pub struct ChangeAuthorizer<'a> {
    pub ledger: &'a CoownershipLedger,
    pub enclosure: &'a dyn Enclosing,
    pub priorities: &'a DebconfPriorities,
    pub debconf_threshold: Priority,
    /// Only this archive (suite) is allowed for unprivileged installs, when set.
    pub default_release: Option<&'a str>,
    pub actor: &'a Actor,
    pub modes: Modes,
    pub enforcement: Enforcement,
}

struct Verdicts<'m> {
    modes: &'m Modes,
    enforcement: Enforcement,
    result: AuthorizationResult,
}

impl Verdicts<'_> {
    /// A refusal root could override with `--force`.
    fn forceable(&mut self, root: bool, denial: Denial) -> Result<bool, PolicyError> {
        if root && self.modes.force {
            warn!(%denial, "forced change");
            self.result.warnings.push(Warning {
                cause: WarningCause::Forced,
                denial,
            });
            return Ok(true);
        }
        self.deny(denial)?;
        Ok(false)
    }

    fn deny(&mut self, denial: Denial) -> Result<(), PolicyError> {
        if self.enforcement == Enforcement::WarnOnly {
            warn!(%denial, "denial relaxed while resuming");
            self.result.warnings.push(Warning {
                cause: WarningCause::Resumed,
                denial,
            });
            return Ok(());
        }
        debug!(%denial, "change denied");
        if self.modes.fatal_errors {
            return Err(PolicyError::SystemComposing { denial });
        }
        self.result.denials.push(denial);
        Ok(())
    }
}

impl ChangeAuthorizer<'_> {
    /// Examine every change in package order. Pure: nothing outside the
    /// returned result is mutated.
    pub fn examine(
        &self,
        changes: &[PackageChange],
        tasks: &RealizedTaskSet,
    ) -> Result<AuthorizationResult, PolicyError> {
        self.modes.check_for(self.actor)?;

        let mut ordered: Vec<&PackageChange> = changes.iter().collect();
        ordered.sort_by(|a, b| a.package.cmp(&b.package));

        let mut verdicts = Verdicts {
            modes: &self.modes,
            enforcement: self.enforcement,
            result: AuthorizationResult::default(),
        };
        for change in ordered {
            self.examine_change(change, tasks, &mut verdicts)?;
        }
        Ok(verdicts.result)
    }

    fn examine_change(
        &self,
        change: &PackageChange,
        tasks: &RealizedTaskSet,
        verdicts: &mut Verdicts<'_>,
    ) -> Result<(), PolicyError> {
        let root = self.actor.is_root();
        let package = &change.package;

        match change.transition {
            Transition::Install | Transition::Reinstall => {
                let enclosed = change
                    .target()
                    .or_else(|| change.installed())
                    .is_some_and(|versioned| self.enclosure.encloses(&versioned));
                if !root && !enclosed {
                    verdicts.deny(Denial::MayNotInstall {
                        package: package.clone(),
                    })?;
                }
            }
            Transition::Upgrade => {
                let enclosed = [change.installed(), change.target()]
                    .into_iter()
                    .flatten()
                    .any(|versioned| self.enclosure.encloses(&versioned));
                if !root && !enclosed && !self.actor.may_upgrade {
                    verdicts.deny(Denial::MayNotUpgradeToNew {
                        package: package.clone(),
                        version: change.target_version.clone().unwrap_or_default(),
                    })?;
                }
            }
            Transition::Downgrade => {
                verdicts.forceable(
                    root,
                    Denial::MayNotDowngrade {
                        package: package.clone(),
                    },
                )?;
            }
            Transition::Keep => {
                verdicts.forceable(
                    root,
                    Denial::MayNotKeep {
                        package: package.clone(),
                    },
                )?;
            }
            Transition::Delete { .. } => self.examine_delete(change, tasks, verdicts)?,
            Transition::Unchanged => {}
        }

        if let Some(auto) = change.auto_flag {
            if !change.transition.is_delete() && !change.transition.is_setup() && !root {
                // Installing an automatically installed package claims it as manual.
                let (requested, denial) = if auto {
                    (
                        tasks.contains(TaskKind::Markauto, package),
                        Denial::MayNotMarkauto {
                            package: package.clone(),
                        },
                    )
                } else {
                    (
                        tasks.contains(TaskKind::Unmarkauto, package)
                            || tasks.contains(TaskKind::Install, package),
                        Denial::MayNotUnmarkauto {
                            package: package.clone(),
                        },
                    )
                };
                if !requested {
                    verdicts.deny(denial)?;
                }
            }
        }

        if change.breaks() {
            verdicts.forceable(
                root,
                Denial::BrokenAfterAction {
                    package: package.clone(),
                },
            )?;
        }

        if change.transition.is_setup() {
            if !change.trusted {
                verdicts.forceable(
                    root,
                    Denial::Untrusted {
                        package: package.clone(),
                    },
                )?;
            }
            if let (Some(default_release), Some(archive)) =
                (self.default_release, &change.archive)
            {
                if archive != default_release && !root {
                    verdicts.deny(Denial::ForeignArchive {
                        package: package.clone(),
                        archive: archive.clone(),
                    })?;
                }
            }
            self.examine_debconf(package, root, verdicts)?;
        }
        Ok(())
    }

    fn examine_delete(
        &self,
        change: &PackageChange,
        tasks: &RealizedTaskSet,
        verdicts: &mut Verdicts<'_>,
    ) -> Result<(), PolicyError> {
        let package = &change.package;
        let tracked = self.ledger.is_any_user_own(package);
        let username = self.actor.username.as_str();

        if self.actor.is_root() {
            let allowed = tasks.is_physical_removal(package)
                || !tracked
                || self.ledger.is_sole_own(package, username);
            if allowed {
                return Ok(());
            }
            let denial = Denial::MayNotRemove {
                package: package.clone(),
                hint_remove_dependencies: false,
            };
            if verdicts.forceable(true, denial)? {
                verdicts.result.ledger_updates.push(LedgerUpdate::Drop {
                    package: package.clone(),
                });
            }
            return Ok(());
        }

        let explicit = tasks.contains(TaskKind::Remove, package);
        if explicit && self.ledger.is_sole_own(package, username) {
            return Ok(());
        }
        if change.auto_removable && !tracked && self.modes.remove_dependencies {
            return Ok(());
        }
        verdicts.deny(Denial::MayNotRemove {
            package: package.clone(),
            hint_remove_dependencies: change.auto_removable
                && !tracked
                && !self.modes.remove_dependencies,
        })
    }

    fn examine_debconf(
        &self,
        package: &ConcretePackage,
        root: bool,
        verdicts: &mut Verdicts<'_>,
    ) -> Result<(), PolicyError> {
        let denial = match self.priorities.get(package) {
            None => Denial::DebconfUnreviewed {
                package: package.clone(),
            },
            Some(state) if !state.is_well_processed() => Denial::DebconfUnreviewed {
                package: package.clone(),
            },
            Some(state) => match state.priority() {
                Some(priority) if state.requires_attention(self.debconf_threshold) => {
                    Denial::DebconfQuestions {
                        package: package.clone(),
                        priority,
                    }
                }
                _ => return Ok(()),
            },
        };

        if root {
            if verdicts.enforcement == Enforcement::WarnOnly {
                verdicts.result.warnings.push(Warning {
                    cause: WarningCause::Resumed,
                    denial,
                });
            }
            return Ok(());
        }
        verdicts.deny(denial)
    }
}
