use std::collections::BTreeMap;

use limitapt_core::{
    ConcretePackage, CoownershipLedger, DebconfPriorities, Enclosure,
    LedgerUpdate, PackageState, Priority, RealizedTaskSet, SpaceAmount, TaskKind, TaskSet,
    VersionedPackage,
};

use super::*;

#[derive(Debug, Clone)]
struct FakePackage {
    installed: Option<String>,
    candidate: Option<String>,
    auto: bool,
    depends: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeMark {
    Install,
    Delete { purge: bool },
    Auto(bool),
}

#[derive(Default)]
struct FakeUniverse {
    packages: BTreeMap<ConcretePackage, FakePackage>,
    marks: BTreeMap<ConcretePackage, FakeMark>,
    extra_changes: Vec<PackageChange>,
    committed: bool,
    dirty: bool,
}

fn pkg(name: &str) -> ConcretePackage {
    ConcretePackage::new(name, "amd64")
}

impl FakeUniverse {
    fn available(mut self, name: &str, candidate: &str) -> Self {
        self.packages.insert(
            pkg(name),
            FakePackage {
                installed: None,
                candidate: Some(candidate.to_string()),
                auto: false,
                depends: Vec::new(),
            },
        );
        self
    }

    fn installed(mut self, name: &str, version: &str, auto: bool) -> Self {
        self.packages.insert(
            pkg(name),
            FakePackage {
                installed: Some(version.to_string()),
                candidate: Some(version.to_string()),
                auto,
                depends: Vec::new(),
            },
        );
        self
    }

    fn upgradable(mut self, name: &str, installed: &str, candidate: &str) -> Self {
        self.packages.insert(
            pkg(name),
            FakePackage {
                installed: Some(installed.to_string()),
                candidate: Some(candidate.to_string()),
                auto: false,
                depends: Vec::new(),
            },
        );
        self
    }

    fn depending(mut self, name: &str, dependency: &str) -> Self {
        if let Some(package) = self.packages.get_mut(&pkg(name)) {
            package.depends.push(dependency.to_string());
        }
        self
    }

    fn realize(&self, tasks: &TaskSet) -> RealizedTaskSet {
        RealizedTaskSet::realize(tasks, |name| self.lookup(name).map(|facts| facts.package)).tasks
    }

    fn is_needed(&self, package: &ConcretePackage) -> bool {
        self.packages.iter().any(|(other, fake)| {
            let stays = fake.installed.is_some()
                && !matches!(self.marks.get(other), Some(FakeMark::Delete { .. }));
            stays && fake.depends.iter().any(|dep| dep == package.name())
        })
    }
}

impl PackageUniverse for FakeUniverse {
    fn lookup(&self, name: &str) -> Option<PackageFacts> {
        self.facts(&pkg(name))
    }

    fn facts(&self, package: &ConcretePackage) -> Option<PackageFacts> {
        self.packages.get(package).map(|fake| PackageFacts {
            package: package.clone(),
            installed_version: fake.installed.clone(),
            candidate_version: fake.candidate.clone(),
            auto_installed: fake.auto,
            upgradable: fake.installed.is_some() && fake.installed != fake.candidate,
            trusted: true,
        })
    }

    fn packages(&self) -> Vec<PackageFacts> {
        self.packages
            .keys()
            .filter_map(|package| self.facts(package))
            .collect()
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn update(&mut self) -> Result<(), CommitError> {
        Ok(())
    }

    fn mark_install(&mut self, package: &ConcretePackage) {
        self.marks.insert(package.clone(), FakeMark::Install);
        let depends = self
            .packages
            .get(package)
            .map(|fake| fake.depends.clone())
            .unwrap_or_default();
        for dependency in depends {
            let dependency = pkg(&dependency);
            let missing = self
                .packages
                .get(&dependency)
                .is_some_and(|fake| fake.installed.is_none());
            if missing {
                self.marks.insert(dependency, FakeMark::Install);
            }
        }
    }

    fn mark_delete(&mut self, package: &ConcretePackage, purge: bool) {
        self.marks.insert(package.clone(), FakeMark::Delete { purge });
    }

    fn mark_auto(&mut self, package: &ConcretePackage, auto: bool) {
        self.marks.insert(package.clone(), FakeMark::Auto(auto));
    }

    fn upgrade(&mut self, _full: bool) {
        let upgradable: Vec<ConcretePackage> = self
            .packages
            .iter()
            .filter(|(_, fake)| fake.installed.is_some() && fake.installed != fake.candidate)
            .map(|(package, _)| package.clone())
            .collect();
        for package in upgradable {
            self.marks.insert(package, FakeMark::Install);
        }
    }

    fn auto_removable(&self) -> Vec<ConcretePackage> {
        self.packages
            .iter()
            .filter(|(package, fake)| {
                fake.installed.is_some()
                    && fake.auto
                    && !self.marks.contains_key(*package)
                    && !self.is_needed(package)
            })
            .map(|(package, _)| package.clone())
            .collect()
    }

    fn changes(&self) -> Vec<PackageChange> {
        let mut changes = self.extra_changes.clone();
        for (package, mark) in &self.marks {
            let Some(fake) = self.packages.get(package) else {
                continue;
            };
            let mut change = PackageChange::new(package.clone(), Transition::Unchanged);
            change.installed_version = fake.installed.clone();
            match mark {
                FakeMark::Install if fake.installed.is_none() => {
                    change.transition = Transition::Install;
                    change.target_version = fake.candidate.clone();
                }
                FakeMark::Install if fake.installed != fake.candidate => {
                    change.transition = Transition::Upgrade;
                    change.target_version = fake.candidate.clone();
                }
                FakeMark::Install => continue,
                FakeMark::Delete { purge } => {
                    change.transition = Transition::Delete { purge: *purge };
                    change.auto_removable = fake.auto && !self.is_needed(package);
                }
                FakeMark::Auto(auto) if *auto != fake.auto => {
                    change.target_version = fake.installed.clone();
                    change.auto_flag = Some(*auto);
                }
                FakeMark::Auto(_) => continue,
            }
            changes.push(change);
        }
        changes
    }

    fn required_download(&self) -> u64 {
        0
    }

    fn required_space(&self) -> i64 {
        0
    }

    fn commit(&mut self, _progress: &mut dyn CommitProgress) -> Result<(), CommitError> {
        self.committed = true;
        Ok(())
    }
}

fn enclosure_with(entries: &[(&str, &str)]) -> Enclosure {
    let mut enclosure = Enclosure::new();
    for (name, version) in entries {
        enclosure
            .add_versioned_package(&VersionedPackage::new(*name, "amd64", *version))
            .expect("must add enclosure entry");
    }
    enclosure
}

fn reviewed(names: &[&str]) -> DebconfPriorities {
    let mut priorities = DebconfPriorities::new();
    for name in names {
        priorities.set(pkg(name), PackageState::without_questions());
    }
    priorities
}

fn alice() -> Actor {
    Actor::new("alice", false)
}

fn planner<'a>(
    ledger: &'a CoownershipLedger,
    enclosure: &'a Enclosure,
    actor: &'a Actor,
    modes: Modes,
) -> OperationPlanner<'a> {
    OperationPlanner {
        ledger,
        enclosure,
        actor,
        modes,
        enforcement: Enforcement::Block,
    }
}

fn authorizer<'a>(
    ledger: &'a CoownershipLedger,
    enclosure: &'a Enclosure,
    priorities: &'a DebconfPriorities,
    actor: &'a Actor,
    modes: Modes,
) -> ChangeAuthorizer<'a> {
    ChangeAuthorizer {
        ledger,
        enclosure,
        priorities,
        debconf_threshold: Priority::High,
        default_release: None,
        actor,
        modes,
        enforcement: Enforcement::Block,
    }
}

fn applied(ledger: &CoownershipLedger, updates: &[LedgerUpdate]) -> CoownershipLedger {
    let mut result = ledger.clone();
    for update in updates {
        result.apply(update).expect("must apply ledger update");
    }
    result
}

fn install_change(name: &str, version: &str) -> PackageChange {
    let mut change = PackageChange::new(pkg(name), Transition::Install);
    change.target_version = Some(version.to_string());
    change
}

#[test]
fn install_outside_enclosure_is_denied_as_system_constitutive() {
    let mut universe = FakeUniverse::default().available("foo", "1.0");
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Install, &["foo"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");

    assert_eq!(
        plan.denials,
        vec![Denial::MayNotInstall { package: pkg("foo") }]
    );
    assert!(plan.ledger_updates.is_empty());
    assert!(universe.changes().is_empty());
    assert!(plan.denials[0].to_string().contains("system-constitutive"));

    let priorities = reviewed(&["foo"]);
    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&[install_change("foo", "1.0")], &tasks)
        .expect("must examine");
    assert_eq!(
        result.denials,
        vec![Denial::MayNotInstall { package: pkg("foo") }]
    );
}

#[test]
fn enclosed_install_records_ownership_for_the_user_and_root() {
    let mut universe = FakeUniverse::default().available("bar", "1.0");
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let priorities = reviewed(&["bar"]);
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Install, &["bar"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert!(plan.denials.is_empty());

    let changes = universe.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].transition, Transition::Install);

    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&changes, &tasks)
        .expect("must examine")
        .into_verdict()
        .expect("must authorize");
    assert!(result.warnings.is_empty());

    let after = applied(&applied(&ledger, &plan.ledger_updates), &result.ledger_updates);
    let owners: Vec<String> = after.owners_of(&pkg("bar")).into_iter().collect();
    assert_eq!(owners, vec!["alice".to_string(), "root".to_string()]);
}

#[test]
fn install_of_package_owned_by_others_does_not_add_root() {
    let mut universe = FakeUniverse::default().available("bar", "1.0");
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("bar"), "bob", false)
        .expect("must add owner");
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Install, &["bar"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");

    assert_eq!(
        plan.ledger_updates,
        vec![LedgerUpdate::Grant {
            package: pkg("bar"),
            user: "alice".to_string(),
            also_root: false,
        }]
    );
    let owners: Vec<String> = applied(&ledger, &plan.ledger_updates)
        .owners_of(&pkg("bar"))
        .into_iter()
        .collect();
    assert_eq!(owners, vec!["alice".to_string(), "bob".to_string()]);
}

#[test]
fn sole_owner_remove_releases_and_deletes() {
    let mut universe = FakeUniverse::default().installed("bar", "1.0", false);
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("bar"), "alice", false)
        .expect("must seed ledger");
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let priorities = reviewed(&["bar"]);
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Remove, &["bar"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.ledger_updates,
        vec![LedgerUpdate::Release {
            package: pkg("bar"),
            user: "alice".to_string(),
        }]
    );

    let changes = universe.changes();
    assert_eq!(changes[0].transition, Transition::Delete { purge: false });
    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&changes, &tasks)
        .expect("must examine");
    assert!(result.is_authorized());

    let after = applied(&ledger, &plan.ledger_updates);
    assert!(!after.is_any_user_own(&pkg("bar")));
    assert!(after.is_empty());
}

#[test]
fn co_owned_remove_only_releases_ownership() {
    let mut universe = FakeUniverse::default().installed("bar", "1.0", false);
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("bar"), "alice", false)
        .expect("must seed alice");
    ledger
        .add_ownership(&pkg("bar"), "bob", false)
        .expect("must seed bob");
    let enclosure = Enclosure::new();
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Remove, &["bar"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");

    assert!(universe.changes().is_empty());
    assert_eq!(
        plan.notices,
        vec![Notice::StillOwnedByOthers { package: pkg("bar") }]
    );
    let after = applied(&ledger, &plan.ledger_updates);
    assert!(after.is_sole_own(&pkg("bar"), "bob"));
}

#[test]
fn non_owner_remove_is_denied_without_ledger_mutation() {
    let mut universe = FakeUniverse::default().installed("bar", "1.0", false);
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("bar"), "alice", false)
        .expect("must seed ledger");
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let priorities = reviewed(&["bar"]);
    let bob = Actor::new("bob", false);
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Remove, &["bar"]));

    let plan = planner(&ledger, &enclosure, &bob, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(plan.denials.len(), 1);
    assert!(plan.denials[0].is_ownership());
    assert!(plan.denials[0].to_string().contains("may not remove"));
    assert!(plan.ledger_updates.is_empty());

    // A resolver-driven deletion of the same package is refused as well.
    let mut change = PackageChange::new(pkg("bar"), Transition::Delete { purge: false });
    change.installed_version = Some("1.0".to_string());
    let result = authorizer(&ledger, &enclosure, &priorities, &bob, Modes::default())
        .examine(&[change], &tasks)
        .expect("must examine");
    assert!(matches!(
        result.denials.as_slice(),
        [Denial::MayNotRemove { .. }]
    ));
    assert!(result.ledger_updates.is_empty());
}

#[test]
fn examine_is_idempotent() {
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let priorities = reviewed(&["bar"]);
    let actor = alice();
    let tasks = RealizedTaskSet::new();
    let changes = vec![
        install_change("zsh", "5.9"),
        install_change("bar", "1.0"),
        PackageChange::new(pkg("mc"), Transition::Keep),
    ];

    let auth = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default());
    let first = auth.examine(&changes, &tasks).expect("must examine");
    let second = auth.examine(&changes, &tasks).expect("must examine");
    assert_eq!(first, second);

    let packages: Vec<&ConcretePackage> = first.denials.iter().map(Denial::package).collect();
    assert_eq!(packages, vec![&pkg("mc"), &pkg("zsh"), &pkg("zsh")]);
}

#[test]
fn fatal_errors_abort_on_first_denial() {
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let priorities = DebconfPriorities::new();
    let actor = alice();
    let modes = Modes {
        fatal_errors: true,
        ..Modes::default()
    };
    let changes = vec![install_change("zsh", "5.9"), install_change("bar", "1.0")];

    let err = authorizer(&ledger, &enclosure, &priorities, &actor, modes)
        .examine(&changes, &RealizedTaskSet::new())
        .expect_err("must abort");
    assert_eq!(
        err,
        PolicyError::SystemComposing {
            denial: Denial::MayNotInstall { package: pkg("bar") }
        }
    );
}

#[test]
fn deferred_denials_fail_the_verdict_together() {
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let priorities = reviewed(&["bar", "zsh"]);
    let actor = alice();
    let changes = vec![install_change("zsh", "5.9"), install_change("bar", "1.0")];

    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&changes, &RealizedTaskSet::new())
        .expect("must examine");
    let err = result.into_verdict().expect_err("must deny");
    assert_eq!(err.denials().len(), 2);
    assert!(err.to_string().contains("2 change(s) denied"));
}

#[test]
fn root_force_turns_denials_into_warnings() {
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let priorities = DebconfPriorities::new();
    let root = Actor::root();
    let mut downgrade = PackageChange::new(pkg("bar"), Transition::Downgrade);
    downgrade.installed_version = Some("2.0".to_string());
    downgrade.target_version = Some("1.0".to_string());

    let result = authorizer(&ledger, &enclosure, &priorities, &root, Modes::default())
        .examine(std::slice::from_ref(&downgrade), &RealizedTaskSet::new())
        .expect("must examine");
    assert_eq!(
        result.denials,
        vec![Denial::MayNotDowngrade { package: pkg("bar") }]
    );

    let forced = Modes {
        force: true,
        ..Modes::default()
    };
    let result = authorizer(&ledger, &enclosure, &priorities, &root, forced)
        .examine(&[downgrade], &RealizedTaskSet::new())
        .expect("must examine");
    assert!(result.is_authorized());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].cause, WarningCause::Forced);
    assert!(result.warnings[0].to_string().starts_with("forced:"));
}

#[test]
fn only_root_may_force_or_purge() {
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let priorities = DebconfPriorities::new();
    let actor = alice();

    let forced = Modes {
        force: true,
        ..Modes::default()
    };
    let err = authorizer(&ledger, &enclosure, &priorities, &actor, forced)
        .examine(&[], &RealizedTaskSet::new())
        .expect_err("must refuse force");
    assert_eq!(err, PolicyError::OnlyRootMayForce);

    let purging = Modes {
        purge_unused: true,
        ..Modes::default()
    };
    let err = authorizer(&ledger, &enclosure, &priorities, &actor, purging)
        .examine(&[], &RealizedTaskSet::new())
        .expect_err("must refuse purge");
    assert_eq!(err, PolicyError::OnlyRootMayPurge);
}

#[test]
fn root_deleting_users_package_needs_force_and_drops_it() {
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("bar"), "alice", false)
        .expect("must seed ledger");
    let enclosure = Enclosure::new();
    let priorities = DebconfPriorities::new();
    let root = Actor::root();
    let delete = PackageChange::new(pkg("bar"), Transition::Delete { purge: false });

    let result = authorizer(&ledger, &enclosure, &priorities, &root, Modes::default())
        .examine(std::slice::from_ref(&delete), &RealizedTaskSet::new())
        .expect("must examine");
    assert!(!result.is_authorized());

    let forced = Modes {
        force: true,
        ..Modes::default()
    };
    let result = authorizer(&ledger, &enclosure, &priorities, &root, forced)
        .examine(std::slice::from_ref(&delete), &RealizedTaskSet::new())
        .expect("must examine");
    assert!(result.is_authorized());
    assert_eq!(
        result.ledger_updates,
        vec![LedgerUpdate::Drop { package: pkg("bar") }]
    );

    // Untracked fallout needs no force.
    let untracked = PackageChange::new(pkg("libx"), Transition::Delete { purge: false });
    let result = authorizer(&ledger, &enclosure, &priorities, &root, Modes::default())
        .examine(&[untracked], &RealizedTaskSet::new())
        .expect("must examine");
    assert!(result.is_authorized());
}

#[test]
fn upgrade_needs_enclosure_or_upgrader_group() {
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let priorities = reviewed(&["bar", "zsh"]);
    let mut bar = PackageChange::new(pkg("bar"), Transition::Upgrade);
    bar.installed_version = Some("1.0".to_string());
    bar.target_version = Some("1.1".to_string());
    let mut zsh = PackageChange::new(pkg("zsh"), Transition::Upgrade);
    zsh.installed_version = Some("5.8".to_string());
    zsh.target_version = Some("5.9".to_string());
    let changes = vec![bar, zsh];

    let actor = alice();
    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&changes, &RealizedTaskSet::new())
        .expect("must examine");
    assert_eq!(
        result.denials,
        vec![Denial::MayNotUpgradeToNew {
            package: pkg("zsh"),
            version: "5.9".to_string(),
        }]
    );

    let upgrader = Actor::new("alice", true);
    let result = authorizer(&ledger, &enclosure, &priorities, &upgrader, Modes::default())
        .examine(&changes, &RealizedTaskSet::new())
        .expect("must examine");
    assert!(result.is_authorized());
}

#[test]
fn debconf_gate_blocks_users_and_warns_root_when_resuming() {
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("bar", "1.0"), ("mc", "4.8")]);
    let mut priorities = DebconfPriorities::new();
    priorities.set(pkg("bar"), PackageState::with_questions(Priority::Critical));
    priorities.set(pkg("low"), PackageState::with_questions(Priority::Low));
    let changes = vec![
        install_change("bar", "1.0"),
        install_change("mc", "4.8"),
    ];
    let actor = alice();

    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&changes, &RealizedTaskSet::new())
        .expect("must examine");
    assert_eq!(
        result.denials,
        vec![
            Denial::DebconfQuestions {
                package: pkg("bar"),
                priority: Priority::Critical,
            },
            Denial::DebconfUnreviewed { package: pkg("mc") },
        ]
    );

    let root = Actor::root();
    let mut resuming = authorizer(&ledger, &enclosure, &priorities, &root, Modes::default());
    let result = resuming
        .examine(&changes, &RealizedTaskSet::new())
        .expect("must examine");
    assert!(result.is_authorized());
    assert!(result.warnings.is_empty());

    resuming.enforcement = Enforcement::WarnOnly;
    let result = resuming
        .examine(&changes, &RealizedTaskSet::new())
        .expect("must examine");
    assert!(result.is_authorized());
    assert_eq!(result.warnings.len(), 2);
}

#[test]
fn warn_only_enforcement_reports_instead_of_denying() {
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let priorities = reviewed(&["zsh"]);
    let actor = alice();
    let mut auth = authorizer(&ledger, &enclosure, &priorities, &actor, Modes {
        fatal_errors: true,
        ..Modes::default()
    });
    auth.enforcement = Enforcement::WarnOnly;

    let result = auth
        .examine(&[install_change("zsh", "5.9")], &RealizedTaskSet::new())
        .expect("must not abort while resuming");
    assert!(result.is_authorized());
    assert_eq!(result.warnings[0].cause, WarningCause::Resumed);
}

#[test]
fn resumed_planning_carries_out_denied_tasks_with_warnings() {
    let mut universe = FakeUniverse::default().available("foo", "1.0");
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Install, &["foo"]));
    let mut resuming = planner(&ledger, &enclosure, &actor, Modes::default());
    resuming.enforcement = Enforcement::WarnOnly;

    let plan = resuming.plan(&mut universe, &tasks).expect("must plan");

    assert!(plan.denials.is_empty());
    assert_eq!(
        plan.warnings,
        vec![Warning {
            cause: WarningCause::Resumed,
            denial: Denial::MayNotInstall { package: pkg("foo") },
        }]
    );
    assert_eq!(universe.changes().len(), 1);
    assert_eq!(
        plan.ledger_updates,
        vec![LedgerUpdate::Grant {
            package: pkg("foo"),
            user: "alice".to_string(),
            also_root: true,
        }]
    );
}

#[test]
fn unused_dependencies_need_remove_dependencies_mode() {
    let mut universe = FakeUniverse::default()
        .installed("app", "1.0", false)
        .installed("libapp", "1.0", true)
        .depending("app", "libapp");
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("app"), "alice", false)
        .expect("must seed ledger");
    let enclosure = Enclosure::new();
    let priorities = DebconfPriorities::new();
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Remove, &["app"]));

    let modes = Modes {
        remove_dependencies: true,
        ..Modes::default()
    };
    planner(&ledger, &enclosure, &actor, modes)
        .plan(&mut universe, &tasks)
        .expect("must plan");
    let changes = universe.changes();
    assert_eq!(changes.len(), 2);

    let result = authorizer(&ledger, &enclosure, &priorities, &actor, modes)
        .examine(&changes, &tasks)
        .expect("must examine");
    assert!(result.is_authorized());

    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&changes, &tasks)
        .expect("must examine");
    assert_eq!(
        result.denials,
        vec![Denial::MayNotRemove {
            package: pkg("libapp"),
            hint_remove_dependencies: true,
        }]
    );
    assert!(result.denials[0].to_string().contains("--remove-dependencies"));
}

#[test]
fn broken_untrusted_and_foreign_changes_are_denied() {
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("bar", "1.0")]);
    let priorities = reviewed(&["bar"]);
    let actor = alice();
    let mut change = install_change("bar", "1.0");
    change.inst_broken = true;
    change.trusted = false;
    change.archive = Some("experimental".to_string());

    let mut auth = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default());
    auth.default_release = Some("stable");
    let result = auth
        .examine(&[change], &RealizedTaskSet::new())
        .expect("must examine");
    assert_eq!(
        result.denials,
        vec![
            Denial::BrokenAfterAction { package: pkg("bar") },
            Denial::Untrusted { package: pkg("bar") },
            Denial::ForeignArchive {
                package: pkg("bar"),
                archive: "experimental".to_string(),
            },
        ]
    );
}

#[test]
fn auto_flag_changes_must_be_requested() {
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let priorities = DebconfPriorities::new();
    let actor = alice();
    let mut change = PackageChange::new(pkg("bar"), Transition::Unchanged);
    change.auto_flag = Some(true);

    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(std::slice::from_ref(&change), &RealizedTaskSet::new())
        .expect("must examine");
    assert_eq!(
        result.denials,
        vec![Denial::MayNotMarkauto { package: pkg("bar") }]
    );

    let mut tasks = RealizedTaskSet::new();
    tasks.push(TaskKind::Markauto, pkg("bar"));
    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&[change], &tasks)
        .expect("must examine");
    assert!(result.is_authorized());
}

#[test]
fn planner_grants_ownership_of_installed_packages() {
    let mut universe = FakeUniverse::default()
        .installed("manual", "1.0", false)
        .installed("dep", "2.0", true);
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("dep", "2.0")]);
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Install, &["manual", "dep"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.ledger_updates,
        vec![
            LedgerUpdate::Grant {
                package: pkg("manual"),
                user: "alice".to_string(),
                also_root: true,
            },
            LedgerUpdate::Grant {
                package: pkg("dep"),
                user: "alice".to_string(),
                also_root: false,
            },
        ]
    );
    let changes = universe.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].auto_flag, Some(false));

    let after = applied(&ledger, &plan.ledger_updates);
    let mut again = FakeUniverse::default().installed("manual", "1.0", false);
    let plan = planner(&after, &enclosure, &actor, Modes::default())
        .plan(&mut again, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.notices,
        vec![
            Notice::AlreadyOwns { package: pkg("manual") },
            Notice::CannotFindPackage {
                task: TaskKind::Install,
                name: "dep".to_string(),
            },
        ]
    );
}

#[test]
fn installing_enclosed_auto_package_claims_it_as_manual() {
    let mut universe = FakeUniverse::default().installed("dep", "2.0", true);
    let ledger = CoownershipLedger::new();
    let enclosure = enclosure_with(&[("dep", "2.0")]);
    let priorities = reviewed(&["dep"]);
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Install, &["dep"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert!(plan.denials.is_empty());

    let changes = universe.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].transition, Transition::Unchanged);
    assert_eq!(changes[0].auto_flag, Some(false));

    let result = authorizer(&ledger, &enclosure, &priorities, &actor, Modes::default())
        .examine(&changes, &tasks)
        .expect("must examine");
    assert!(result.denials.is_empty(), "denials: {:?}", result.denials);

    let after = applied(&ledger, &plan.ledger_updates);
    let owners: Vec<String> = after.owners_of(&pkg("dep")).into_iter().collect();
    assert_eq!(owners, vec!["alice".to_string()]);
}

#[test]
fn planner_refuses_unprivileged_upgrade_on_install() {
    let mut universe = FakeUniverse::default().upgradable("zsh", "5.8", "5.9");
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Install, &["zsh"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.denials,
        vec![Denial::MayNotUpgradeToNew {
            package: pkg("zsh"),
            version: "5.9".to_string(),
        }]
    );
    assert!(universe.changes().is_empty());
}

#[test]
fn physical_removal_is_root_only_and_drops_tracking() {
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("bar"), "alice", false)
        .expect("must seed ledger");
    let enclosure = Enclosure::new();
    let tasks_for = |universe: &FakeUniverse| {
        universe.realize(
            &TaskSet::new()
                .with(TaskKind::PhysicallyRemove, &["bar"])
                .with(TaskKind::Purge, &["mc"]),
        )
    };

    let mut universe = FakeUniverse::default()
        .installed("bar", "1.0", false)
        .installed("mc", "4.8", false);
    let tasks = tasks_for(&universe);
    let actor = alice();
    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.denials,
        vec![
            Denial::MayNotPhysicallyRemove { package: pkg("bar") },
            Denial::MayNotPurge { package: pkg("mc") },
        ]
    );

    let mut universe = FakeUniverse::default()
        .installed("bar", "1.0", false)
        .installed("mc", "4.8", false);
    let root = Actor::root();
    let plan = planner(&ledger, &enclosure, &root, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.ledger_updates,
        vec![LedgerUpdate::Drop { package: pkg("bar") }]
    );
    assert_eq!(
        plan.notices,
        vec![Notice::SimpleRemoval { package: pkg("mc") }]
    );
    let transitions: Vec<Transition> = universe.changes().iter().map(|c| c.transition).collect();
    assert_eq!(
        transitions,
        vec![
            Transition::Delete { purge: false },
            Transition::Delete { purge: true },
        ]
    );

    let priorities = DebconfPriorities::new();
    let result = authorizer(&ledger, &enclosure, &priorities, &root, Modes::default())
        .examine(&universe.changes(), &tasks)
        .expect("must examine");
    assert!(result.is_authorized());
}

#[test]
fn markauto_releases_and_marks_when_last_owner() {
    let mut universe = FakeUniverse::default().installed("bar", "1.0", false);
    let mut ledger = CoownershipLedger::new();
    ledger
        .add_ownership(&pkg("bar"), "alice", false)
        .expect("must seed ledger");
    let enclosure = Enclosure::new();
    let actor = alice();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Markauto, &["bar"]));

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(plan.ledger_updates.len(), 1);
    let changes = universe.changes();
    assert_eq!(changes[0].auto_flag, Some(true));

    let bob = Actor::new("bob", false);
    let mut universe = FakeUniverse::default().installed("bar", "1.0", false);
    let plan = planner(&ledger, &enclosure, &bob, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.denials,
        vec![Denial::MayNotMarkauto { package: pkg("bar") }]
    );
}

#[test]
fn unmarkauto_needs_enclosure_for_users() {
    let mut universe = FakeUniverse::default()
        .installed("dep", "2.0", true)
        .installed("manual", "1.0", false);
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let actor = alice();
    let tasks = universe.realize(
        &TaskSet::new().with(TaskKind::Unmarkauto, &["dep", "manual", "ghost"]),
    );

    let plan = planner(&ledger, &enclosure, &actor, Modes::default())
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        plan.denials,
        vec![Denial::MayNotUnmarkauto { package: pkg("dep") }]
    );
    assert_eq!(
        plan.notices,
        vec![Notice::NotAutoInstalled { package: pkg("manual") }]
    );
}

#[test]
fn root_purge_unused_turns_deletions_into_purges() {
    let mut universe = FakeUniverse::default().installed("bar", "1.0", false);
    let ledger = CoownershipLedger::new();
    let enclosure = Enclosure::new();
    let root = Actor::root();
    let tasks = universe.realize(&TaskSet::new().with(TaskKind::Remove, &["bar"]));
    let modes = Modes {
        purge_unused: true,
        ..Modes::default()
    };

    planner(&ledger, &enclosure, &root, modes)
        .plan(&mut universe, &tasks)
        .expect("must plan");
    assert_eq!(
        universe.changes()[0].transition,
        Transition::Delete { purge: true }
    );

    let mut upgrading = FakeUniverse::default().installed("old", "1.0", true);
    upgrading.mark_delete(&pkg("old"), false);
    purge_deletions(&mut upgrading);
    assert_eq!(
        upgrading.changes()[0].transition,
        Transition::Delete { purge: true }
    );
}

#[test]
fn all_changes_separates_logical_and_physical_effects() {
    let mut universe = FakeUniverse::default()
        .available("new", "1.0")
        .upgradable("up", "1.0", "2.0")
        .installed("owned", "1.0", false)
        .installed("gone", "1.0", false)
        .installed("kept", "1.0", false);
    let tasks = universe.realize(
        &TaskSet::new()
            .with(TaskKind::Install, &["new", "up", "owned"])
            .with(TaskKind::Remove, &["gone", "kept"]),
    );
    universe.mark_install(&pkg("new"));
    universe.mark_install(&pkg("up"));
    universe.mark_delete(&pkg("gone"), false);

    let all = AllChanges::classify(&universe.changes(), &tasks, &universe);
    assert_eq!(all.physically_installed, vec![pkg("new")]);
    assert_eq!(all.logically_installed_but_physically_upgraded, vec![pkg("up")]);
    assert_eq!(all.logically_installed, vec![pkg("owned")]);
    assert_eq!(all.physically_removed, vec![pkg("gone")]);
    assert_eq!(all.logically_removed, vec![pkg("kept")]);
    assert_eq!(all.count(), 5);
}

fn partition(
    label: &str,
    device: u64,
    available: u64,
    total: u64,
    minimal: SpaceAmount,
) -> Partition {
    Partition {
        label: label.to_string(),
        device,
        available,
        total,
        minimal_free: minimal,
    }
}

#[test]
fn free_space_checks_each_partition() {
    let target = partition("/usr", 1, 1_000, 10_000, SpaceAmount::Relative { percent: 5.0 });
    let cache = partition("/var/cache", 2, 600, 10_000, SpaceAmount::Absolute { bytes: 100 });

    ensure_free_space(&target, &cache, 500, 500).expect("must fit");
    ensure_free_space(&target, &cache, 500, -4_000).expect("freeing space must fit");

    let err = ensure_free_space(&target, &cache, 501, 0).expect_err("cache must overflow");
    assert_eq!(
        err,
        PolicyError::NotEnoughSpace {
            partition: "/var/cache".to_string(),
            required: 100,
            remaining: 99,
        }
    );

    let err = ensure_free_space(&target, &cache, 0, 501).expect_err("target must overflow");
    assert!(err.to_string().contains("not enough free space on /usr"));
}

#[test]
fn free_space_sums_needs_on_shared_partition() {
    let target = partition("/", 7, 1_000, 10_000, SpaceAmount::Relative { percent: 1.0 });
    let cache = partition("/", 7, 1_000, 10_000, SpaceAmount::Absolute { bytes: 300 });

    // 400 + 400 fits each partition alone but not together.
    let err = ensure_free_space(&target, &cache, 400, 400).expect_err("sum must overflow");
    assert_eq!(
        err,
        PolicyError::NotEnoughSpace {
            partition: "/".to_string(),
            required: 300,
            remaining: 200,
        }
    );
    ensure_free_space(&target, &cache, 300, 400).expect("must fit");
}

#[test]
fn freshness_requires_a_recent_update_when_limited() {
    ensure_fresh(None, 1_000, None).expect("no limit never goes stale");
    assert_eq!(
        ensure_fresh(None, 1_000, Some(48)).expect_err("never updated"),
        PolicyError::DistroStale
    );
    ensure_fresh(Some(0), 48 * 3600, Some(48)).expect("exactly at the limit");
    assert_eq!(
        ensure_fresh(Some(0), 48 * 3600 + 1, Some(48)).expect_err("too old"),
        PolicyError::DistroStale
    );
}

#[test]
fn dirty_universe_blocks_operations() {
    let mut universe = FakeUniverse::default();
    ensure_not_dirty(&universe).expect("clean universe");
    universe.dirty = true;
    assert_eq!(
        ensure_not_dirty(&universe).expect_err("must be dirty"),
        PolicyError::DpkgJournalDirty
    );
}

#[test]
fn recorded_notifications_collect_reports() {
    let mut recorder = RecordedNotifications::declining();
    report(
        &mut recorder,
        &[Notice::AlreadyOwns { package: pkg("bar") }],
        &[],
        &[Denial::MayNotKeep { package: pkg("mc") }],
    );
    assert_eq!(recorder.notices.len(), 1);
    assert_eq!(recorder.denials.len(), 1);
    assert!(!recorder.prompt_agree());
    assert_eq!(recorder.prompts, 1);

    let mut universe = FakeUniverse::default();
    universe
        .commit(&mut SilentProgress)
        .expect("fake commit succeeds");
    assert!(universe.committed);
}
