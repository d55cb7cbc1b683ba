use anyhow::Result;
use limitapt_core::{
    ConcretePackage, CoownershipLedger, LedgerUpdate, RealizedTaskSet, ResumeAuthorization,
    Settings, TaskSet, ROOT_USERNAME,
};
use limitapt_policy::{
    ensure_fresh, ensure_free_space, ensure_not_dirty, purge_deletions, report, Actor, AllChanges,
    ChangeAuthorizer, ChangeSummary, CommitProgress, Enforcement, Modes, Notice, Notifications,
    OperationPlanner, PackageUniverse, Plan, PolicyError,
};
use limitapt_state::{JournalEntry, JournalOperation, StateStore};
use tracing::{debug, info};

use crate::disk::SpaceGauge;
use crate::identity::{GroupDatabase, Identity};

/// What the user asked for on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Tasks(TaskSet),
    Upgrade { full: bool },
}

impl Request {
    fn action(&self) -> &'static str {
        match self {
            Self::Tasks(_) => "perform modification operations",
            Self::Upgrade { .. } => "upgrade the system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    /// Nothing changed physically; only ownership was recorded.
    LedgerUpdated,
    Simulated,
    Declined,
    NothingToDo,
}

/// Who runs the program, against which state.
pub struct Session<'a> {
    pub store: &'a StateStore,
    pub settings: &'a Settings,
    pub groups: &'a GroupDatabase,
    pub identity: &'a Identity,
}

/// The outside world one run talks to.
pub struct Environment<'e> {
    pub universe: &'e mut dyn PackageUniverse,
    pub notifications: &'e mut dyn Notifications,
    pub progress: &'e mut dyn CommitProgress,
    pub space: &'e dyn SpaceGauge,
    /// Current time in unix seconds.
    pub now: u64,
}

enum Pending {
    Tasks(RealizedTaskSet),
    Upgrade { full: bool },
}

impl Pending {
    fn tasks(&self) -> RealizedTaskSet {
        match self {
            Self::Tasks(tasks) => tasks.clone(),
            Self::Upgrade { .. } => RealizedTaskSet::new(),
        }
    }

    fn journal_entry(&self, username: &str, purge_unused: bool) -> JournalEntry {
        match self {
            Self::Tasks(tasks) => JournalEntry::operations(username, purge_unused, tasks.clone()),
            Self::Upgrade { full: false } => {
                JournalEntry::upgrade(JournalOperation::SafeUpgrade, username, purge_unused)
            }
            Self::Upgrade { full: true } => {
                JournalEntry::upgrade(JournalOperation::FullUpgrade, username, purge_unused)
            }
        }
    }
}

struct Authority {
    actor: Actor,
    modes: Modes,
    enforcement: Enforcement,
    /// Continuing a journaled operation: the journal is already written.
    resuming: bool,
}

pub fn run_operation(
    session: &Session<'_>,
    env: &mut Environment<'_>,
    modes: Modes,
    request: &Request,
) -> Result<Outcome> {
    if session.store.journal().exists() {
        return Err(PolicyError::PrecedingTasksNotCompleted.into());
    }
    let identity = session.identity;
    if !modes.simulate && !identity.may_modify {
        return Err(PolicyError::NoPrivileges {
            action: request.action().to_string(),
            group: session.settings.groups.users.clone(),
        }
        .into());
    }
    let actor = identity.actor();
    modes.check_for(&actor)?;
    ensure_not_dirty(&*env.universe)?;
    let times = session.store.load_update_times()?;
    ensure_fresh(
        times.distro,
        env.now,
        session.settings.freshness.max_distro_age_hours,
    )?;

    let pending = match request {
        Request::Tasks(tasks) => {
            let universe = &*env.universe;
            let realization = RealizedTaskSet::realize(tasks, |name| {
                universe.lookup(name).map(|facts| facts.package)
            });
            for (task, name) in realization.missing {
                debug!(task = task.as_str(), %name, "requested package not found");
                env.notifications
                    .notice(&Notice::CannotFindPackage { task, name });
            }
            if realization.tasks.is_empty() {
                env.notifications.nothing_to_do();
                return Ok(Outcome::NothingToDo);
            }
            Pending::Tasks(realization.tasks)
        }
        Request::Upgrade { full } => Pending::Upgrade { full: *full },
    };

    let authority = Authority {
        actor,
        modes,
        enforcement: Enforcement::Block,
        resuming: false,
    };
    execute(session, env, &authority, &pending)
}

fn apply_updates<'u>(
    ledger: &mut CoownershipLedger,
    updates: impl IntoIterator<Item = &'u LedgerUpdate>,
) -> Result<(), PolicyError> {
    for update in updates {
        ledger.apply(update)?;
    }
    Ok(())
}

fn execute(
    session: &Session<'_>,
    env: &mut Environment<'_>,
    authority: &Authority,
    pending: &Pending,
) -> Result<Outcome> {
    let store = session.store;
    let settings = session.settings;
    let mut ledger = store.load_ledger()?;
    let enclosure = store.load_enclosures()?;
    let priorities = store.load_priorities()?;
    let tasks = pending.tasks();

    let plan = match pending {
        Pending::Tasks(tasks) => OperationPlanner {
            ledger: &ledger,
            enclosure: &enclosure,
            actor: &authority.actor,
            modes: authority.modes,
            enforcement: authority.enforcement,
        }
        .plan(&mut *env.universe, tasks)?,
        Pending::Upgrade { full } => {
            env.universe.upgrade(*full);
            if authority.actor.is_root() && authority.modes.purge_unused {
                purge_deletions(&mut *env.universe);
            }
            Plan::default()
        }
    };
    report(
        &mut *env.notifications,
        &plan.notices,
        &plan.warnings,
        &plan.denials,
    );
    let mut denials = plan.denials.clone();

    let changes = env.universe.changes();
    if changes.is_empty() {
        if !denials.is_empty() {
            return Err(PolicyError::SystemComposingByResolver { denials }.into());
        }
        if plan.ledger_updates.is_empty() {
            env.notifications.nothing_to_do();
            return Ok(Outcome::NothingToDo);
        }
        if authority.modes.simulate {
            return Ok(Outcome::Simulated);
        }
        apply_updates(&mut ledger, &plan.ledger_updates)?;
        store.save_ledger(&ledger)?;
        info!(updates = plan.ledger_updates.len(), "recorded ownership without package changes");
        return Ok(Outcome::LedgerUpdated);
    }

    let summary = ChangeSummary {
        changes: AllChanges::classify(&changes, &tasks, &*env.universe),
        required_download: env.universe.required_download(),
        required_space: env.universe.required_space(),
    };
    env.notifications.show_changes(&summary);

    let verdict = ChangeAuthorizer {
        ledger: &ledger,
        enclosure: &enclosure,
        priorities: &priorities,
        debconf_threshold: settings.debconf.minimal_priority,
        default_release: settings.origin.default_release.as_deref(),
        actor: &authority.actor,
        modes: authority.modes,
        enforcement: authority.enforcement,
    }
    .examine(&changes, &tasks)?;
    report(
        &mut *env.notifications,
        &[],
        &verdict.warnings,
        &verdict.denials,
    );
    denials.extend(verdict.denials.iter().cloned());
    if !denials.is_empty() {
        return Err(PolicyError::SystemComposingByResolver { denials }.into());
    }

    let minimal_free = settings.minimal_free_space;
    let target = env.space.measure(&settings.paths.target, minimal_free.target)?;
    let cache = env.space.measure(&settings.paths.cache, minimal_free.cache)?;
    ensure_free_space(
        &target,
        &cache,
        summary.required_download,
        summary.required_space,
    )?;

    if authority.modes.simulate {
        info!(changes = changes.len(), "simulation finished, nothing committed");
        return Ok(Outcome::Simulated);
    }
    if !authority.modes.assume_yes && !env.notifications.prompt_agree() {
        return Ok(Outcome::Declined);
    }

    let journal = store.journal();
    if !authority.resuming {
        store.layout().ensure_base_dirs()?;
        journal.write(
            &pending.journal_entry(&authority.actor.username, authority.modes.purge_unused),
        )?;
    }
    if let Err(err) = env.universe.commit(&mut *env.progress) {
        if err.is_before_apply() && !authority.resuming {
            journal.clear()?;
        }
        return Err(PolicyError::Commit(err).into());
    }
    apply_updates(
        &mut ledger,
        plan.ledger_updates.iter().chain(&verdict.ledger_updates),
    )?;
    store.save_ledger(&ledger)?;
    if !authority.resuming {
        journal.clear()?;
    }
    Ok(Outcome::Committed)
}

fn require_root(session: &Session<'_>, action: &str) -> Result<(), PolicyError> {
    if session.identity.is_root() {
        return Ok(());
    }
    Err(PolicyError::NoPrivileges {
        action: action.to_string(),
        group: session.settings.groups.roots.clone(),
    })
}

/// Re-run the journaled operation under the configured authority and
/// clear the journal once it went through.
pub fn fix_interrupted(
    session: &Session<'_>,
    env: &mut Environment<'_>,
    assume_yes: bool,
) -> Result<Outcome> {
    require_root(session, "fix interrupted operations")?;
    let journal = session.store.journal();
    let Some(entry) = journal.read()? else {
        env.notifications.nothing_to_do();
        return Ok(Outcome::NothingToDo);
    };

    let original = Identity::resolve(&entry.username, session.groups, &session.settings.groups)?;
    let (actor, enforcement) = match session.settings.resume.authorization {
        ResumeAuthorization::Warn => (original.actor(), Enforcement::WarnOnly),
        ResumeAuthorization::OriginalUser => (original.actor(), Enforcement::Block),
        ResumeAuthorization::Root => (Actor::root(), Enforcement::WarnOnly),
    };
    let pending = match entry.operation {
        JournalOperation::Operations => Pending::Tasks(entry.tasks.clone().unwrap_or_default()),
        JournalOperation::SafeUpgrade => Pending::Upgrade { full: false },
        JournalOperation::FullUpgrade => Pending::Upgrade { full: true },
    };
    info!(
        operation = entry.operation.as_str(),
        username = %entry.username,
        actor = %actor.username,
        "resuming interrupted operation"
    );

    let authority = Authority {
        actor,
        modes: Modes {
            purge_unused: entry.purge_unused,
            assume_yes,
            ..Modes::default()
        },
        enforcement,
        resuming: true,
    };
    let outcome = execute(session, env, &authority, &pending)?;
    if outcome != Outcome::Declined {
        journal.clear()?;
    }
    Ok(outcome)
}

/// Forget the journaled operation without committing anything.
pub fn ignore_interrupted(session: &Session<'_>) -> Result<bool> {
    require_root(session, "ignore interrupted operations")?;
    Ok(session.store.journal().clear()?)
}

/// Packages the caller is responsible for. Root owns every manually
/// installed package no simple user claimed.
pub fn list_of_mine(
    session: &Session<'_>,
    universe: &dyn PackageUniverse,
) -> Result<Vec<ConcretePackage>> {
    let ledger = session.store.load_ledger()?;
    if !session.identity.is_root() {
        return Ok(ledger.his_packages(&session.identity.username));
    }
    Ok(universe
        .packages()
        .into_iter()
        .filter(|facts| facts.is_installed() && !facts.auto_installed)
        .map(|facts| facts.package)
        .filter(|package| {
            let owners = ledger.owners_of(package);
            owners.is_empty() || owners.contains(ROOT_USERNAME)
        })
        .collect())
}

/// Known packages whose candidate version simple users may install.
pub fn enclosed_packages(
    session: &Session<'_>,
    universe: &dyn PackageUniverse,
) -> Result<Vec<ConcretePackage>> {
    let enclosure = session.store.load_enclosures()?;
    Ok(universe
        .packages()
        .into_iter()
        .filter(|facts| {
            facts
                .candidate()
                .is_some_and(|candidate| enclosure.contains(&candidate))
        })
        .map(|facts| facts.package)
        .collect())
}
