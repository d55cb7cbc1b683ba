use limitapt_core::{
    ConcretePackage, CoownershipLedger, Enclosing, LedgerUpdate, RealizedTaskSet, ReleaseOutcome,
    TaskKind,
};
use tracing::debug;

use crate::authorize::{Actor, Enforcement, Modes};
use crate::changes::Transition;
use crate::denial::{Denial, Notice, Warning, WarningCause};
use crate::error::PolicyError;
use crate::universe::{PackageFacts, PackageUniverse};

/// Outcome of translating requested tasks into universe marks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Ledger changes in the order they were decided.
    pub ledger_updates: Vec<LedgerUpdate>,
    pub denials: Vec<Denial>,
    pub warnings: Vec<Warning>,
    pub notices: Vec<Notice>,
}

/// Marks the universe for each realized task and decides the ownership
/// bookkeeping that goes with it.
pub struct OperationPlanner<'a> {
    pub ledger: &'a CoownershipLedger,
    pub enclosure: &'a dyn Enclosing,
    pub actor: &'a Actor,
    pub modes: Modes,
    pub enforcement: Enforcement,
}

struct Draft<'p> {
    modes: Modes,
    enforcement: Enforcement,
    ledger: CoownershipLedger,
    plan: &'p mut Plan,
}

impl Draft<'_> {
    fn record(&mut self, update: LedgerUpdate) -> Result<(), PolicyError> {
        debug!(?update, "ledger update planned");
        self.ledger.apply(&update)?;
        self.plan.ledger_updates.push(update);
        Ok(())
    }

    fn release(
        &mut self,
        package: &ConcretePackage,
        user: &str,
    ) -> Result<ReleaseOutcome, PolicyError> {
        let outcome = self.ledger.remove_ownership(package, user)?;
        self.plan.ledger_updates.push(LedgerUpdate::Release {
            package: package.clone(),
            user: user.to_string(),
        });
        Ok(outcome)
    }

    fn grant(
        &mut self,
        package: &ConcretePackage,
        user: &str,
        also_root: bool,
    ) -> Result<(), PolicyError> {
        self.record(LedgerUpdate::Grant {
            package: package.clone(),
            user: user.to_string(),
            also_root,
        })
    }

    /// Returns whether the task goes ahead anyway, which only happens while
    /// resuming.
    fn deny(&mut self, denial: Denial) -> Result<bool, PolicyError> {
        if self.enforcement == Enforcement::WarnOnly {
            self.plan.warnings.push(Warning {
                cause: WarningCause::Resumed,
                denial,
            });
            return Ok(true);
        }
        debug!(%denial, "task denied");
        if self.modes.fatal_errors {
            return Err(PolicyError::SystemComposing { denial });
        }
        self.plan.denials.push(denial);
        Ok(false)
    }

    fn notice(&mut self, notice: Notice) {
        debug!(%notice, "task notice");
        self.plan.notices.push(notice);
    }
}

impl OperationPlanner<'_> {
    pub fn plan(
        &self,
        universe: &mut dyn PackageUniverse,
        tasks: &RealizedTaskSet,
    ) -> Result<Plan, PolicyError> {
        self.modes.check_for(self.actor)?;

        let mut plan = Plan::default();
        let mut draft = Draft {
            modes: self.modes,
            enforcement: self.enforcement,
            ledger: self.ledger.clone(),
            plan: &mut plan,
        };

        for (kind, package) in tasks.iter() {
            let Some(facts) = universe.facts(package) else {
                draft.notice(Notice::CannotFindPackage {
                    task: kind,
                    name: package.name().to_string(),
                });
                continue;
            };
            match kind {
                TaskKind::Install => self.plan_install(universe, &facts, &mut draft)?,
                TaskKind::Remove => self.plan_remove(universe, &facts, &mut draft)?,
                TaskKind::PhysicallyRemove | TaskKind::Purge => {
                    self.plan_physical_removal(universe, &facts, kind, &mut draft)?
                }
                TaskKind::Markauto => self.plan_markauto(universe, &facts, &mut draft)?,
                TaskKind::Unmarkauto => self.plan_unmarkauto(universe, &facts, &mut draft)?,
            }
        }

        if self.modes.remove_dependencies {
            for package in universe.auto_removable() {
                if !draft.ledger.is_any_user_own(&package) {
                    debug!(%package, "removing unused dependency");
                    universe.mark_delete(&package, self.modes.purge_unused);
                }
            }
        }
        if self.actor.is_root() && self.modes.purge_unused {
            purge_deletions(universe);
        }
        Ok(plan)
    }

    fn is_enclosed_installed(&self, facts: &PackageFacts) -> bool {
        facts
            .installed()
            .is_some_and(|versioned| self.enclosure.encloses(&versioned))
    }

    fn plan_install(
        &self,
        universe: &mut dyn PackageUniverse,
        facts: &PackageFacts,
        draft: &mut Draft<'_>,
    ) -> Result<(), PolicyError> {
        let package = &facts.package;
        let user = self.actor.username.as_str();
        let root = self.actor.is_root();

        if !facts.is_installed() {
            let enclosed = facts
                .candidate()
                .is_some_and(|versioned| self.enclosure.encloses(&versioned));
            if !root
                && !enclosed
                && !draft.deny(Denial::MayNotInstall {
                    package: package.clone(),
                })?
            {
                return Ok(());
            }
            if draft.ledger.is_own(package, user) {
                draft.notice(Notice::AlreadyOwns {
                    package: package.clone(),
                });
            } else {
                let also_root = !draft.ledger.is_any_user_own(package);
                draft.grant(package, user, also_root)?;
            }
            universe.mark_install(package);
            return Ok(());
        }

        if facts.auto_installed {
            // Nobody owns an automatically installed package, root included.
            if !root
                && !self.is_enclosed_installed(facts)
                && !draft.deny(Denial::MayNotInstallAutoInstalled {
                    package: package.clone(),
                })?
            {
                return Ok(());
            }
            if !draft.ledger.is_own(package, user) {
                draft.grant(package, user, false)?;
            }
            universe.mark_auto(package, false);
        } else if draft.ledger.is_own(package, user) {
            draft.notice(Notice::AlreadyOwns {
                package: package.clone(),
            });
        } else {
            // An untracked manual package was installed by root.
            let also_root = !draft.ledger.is_any_user_own(package);
            draft.grant(package, user, also_root)?;
        }

        if facts.upgradable {
            let enclosed = facts
                .candidate()
                .is_some_and(|versioned| self.enclosure.encloses(&versioned));
            if root
                || enclosed
                || self.actor.may_upgrade
                || draft.deny(Denial::MayNotUpgradeToNew {
                    package: package.clone(),
                    version: facts.candidate_version.clone().unwrap_or_default(),
                })?
            {
                universe.mark_install(package);
            }
        }
        Ok(())
    }

    fn plan_remove(
        &self,
        universe: &mut dyn PackageUniverse,
        facts: &PackageFacts,
        draft: &mut Draft<'_>,
    ) -> Result<(), PolicyError> {
        let package = &facts.package;
        let user = self.actor.username.as_str();

        if !facts.is_installed() {
            draft.notice(Notice::NotInstalled {
                package: package.clone(),
                task: TaskKind::Remove,
            });
            return Ok(());
        }
        if draft.ledger.is_own(package, user) {
            match draft.release(package, user)? {
                ReleaseOutcome::NoOwnersLeft => {
                    universe.mark_delete(package, self.modes.purge_unused)
                }
                ReleaseOutcome::StillOwned => draft.notice(Notice::StillOwnedByOthers {
                    package: package.clone(),
                }),
            }
            return Ok(());
        }
        if self.actor.is_root() {
            // Packages owned by others are refused later unless forced.
            universe.mark_delete(package, self.modes.purge_unused);
            return Ok(());
        }
        if draft.deny(Denial::MayNotRemove {
            package: package.clone(),
            hint_remove_dependencies: false,
        })? {
            universe.mark_delete(package, self.modes.purge_unused);
        }
        Ok(())
    }

    fn plan_physical_removal(
        &self,
        universe: &mut dyn PackageUniverse,
        facts: &PackageFacts,
        kind: TaskKind,
        draft: &mut Draft<'_>,
    ) -> Result<(), PolicyError> {
        let package = &facts.package;
        let purge = kind == TaskKind::Purge;

        if !self.actor.is_root() {
            let denial = if purge {
                Denial::MayNotPurge {
                    package: package.clone(),
                }
            } else {
                Denial::MayNotPhysicallyRemove {
                    package: package.clone(),
                }
            };
            if !draft.deny(denial)? {
                return Ok(());
            }
        }
        if !facts.is_installed() {
            draft.notice(Notice::NotInstalled {
                package: package.clone(),
                task: kind,
            });
            return Ok(());
        }
        if draft.ledger.is_any_user_own(package) {
            draft.record(LedgerUpdate::Drop {
                package: package.clone(),
            })?;
        } else {
            draft.notice(Notice::SimpleRemoval {
                package: package.clone(),
            });
        }
        universe.mark_delete(package, purge || self.modes.purge_unused);
        Ok(())
    }

    fn plan_markauto(
        &self,
        universe: &mut dyn PackageUniverse,
        facts: &PackageFacts,
        draft: &mut Draft<'_>,
    ) -> Result<(), PolicyError> {
        let package = &facts.package;
        let user = self.actor.username.as_str();

        if !facts.is_installed() {
            draft.notice(Notice::NotInstalled {
                package: package.clone(),
                task: TaskKind::Markauto,
            });
            return Ok(());
        }
        if draft.ledger.is_own(package, user) {
            match draft.release(package, user)? {
                ReleaseOutcome::NoOwnersLeft => universe.mark_auto(package, true),
                ReleaseOutcome::StillOwned => draft.notice(Notice::StillOwnedByOthers {
                    package: package.clone(),
                }),
            }
            return Ok(());
        }
        if self.actor.is_root() && !draft.ledger.is_any_user_own(package) {
            draft.notice(Notice::PhysicalMarkauto {
                package: package.clone(),
            });
            universe.mark_auto(package, true);
            return Ok(());
        }
        if draft.deny(Denial::MayNotMarkauto {
            package: package.clone(),
        })? {
            universe.mark_auto(package, true);
        }
        Ok(())
    }

    fn plan_unmarkauto(
        &self,
        universe: &mut dyn PackageUniverse,
        facts: &PackageFacts,
        draft: &mut Draft<'_>,
    ) -> Result<(), PolicyError> {
        let package = &facts.package;
        let user = self.actor.username.as_str();

        if !facts.is_installed() {
            draft.notice(Notice::NotInstalled {
                package: package.clone(),
                task: TaskKind::Unmarkauto,
            });
            return Ok(());
        }
        if !facts.auto_installed {
            draft.notice(Notice::NotAutoInstalled {
                package: package.clone(),
            });
            return Ok(());
        }
        if !self.actor.is_root()
            && !self.is_enclosed_installed(facts)
            && !draft.deny(Denial::MayNotUnmarkauto {
                package: package.clone(),
            })?
        {
            return Ok(());
        }
        if !draft.ledger.is_own(package, user) {
            draft.grant(package, user, false)?;
        }
        universe.mark_auto(package, false);
        Ok(())
    }
}

/// Turn every pending plain deletion into a purge.
pub fn purge_deletions(universe: &mut dyn PackageUniverse) {
    let deletions: Vec<ConcretePackage> = universe
        .changes()
        .into_iter()
        .filter(|change| change.transition == Transition::Delete { purge: false })
        .map(|change| change.package)
        .collect();
    for package in deletions {
        universe.mark_delete(&package, true);
    }
}
