use super::*;

fn pkg(name: &str, arch: &str) -> ConcretePackage {
    ConcretePackage::new(name, arch)
}

fn ver(name: &str, arch: &str, version: &str) -> VersionedPackage {
    VersionedPackage::new(name, arch, version)
}

#[test]
fn ledger_prunes_package_after_last_owner_leaves() {
    let mut ledger = CoownershipLedger::new();
    let bar = pkg("bar", "amd64");

    ledger
        .add_ownership(&bar, "alice", false)
        .expect("must add alice");
    ledger
        .add_ownership(&bar, "bob", false)
        .expect("must add bob");

    let outcome = ledger
        .remove_ownership(&bar, "alice")
        .expect("must remove alice");
    assert_eq!(outcome, ReleaseOutcome::StillOwned);
    assert!(ledger.is_sole_own(&bar, "bob"));

    let outcome = ledger
        .remove_ownership(&bar, "bob")
        .expect("must remove bob");
    assert_eq!(outcome, ReleaseOutcome::NoOwnersLeft);
    assert!(!ledger.is_any_user_own(&bar));
    assert!(ledger.owners_of(&bar).is_empty());
    assert!(ledger.is_empty());
}

#[test]
fn ledger_rejects_second_grant_for_same_user() {
    let mut ledger = CoownershipLedger::new();
    let bar = pkg("bar", "amd64");

    ledger
        .add_ownership(&bar, "alice", false)
        .expect("must add alice");
    assert_eq!(ledger.owners_of(&bar).len(), 1);

    let err = ledger
        .add_ownership(&bar, "alice", false)
        .expect_err("must reject duplicate owner");
    assert_eq!(
        err,
        CoownershipError::AlreadyOwns {
            package: bar.clone(),
            user: "alice".to_string(),
        }
    );
    assert_eq!(ledger.owners_of(&bar).len(), 1);
}

#[test]
fn ledger_grant_with_root_adds_both_users() {
    let mut ledger = CoownershipLedger::new();
    let bar = pkg("bar", "amd64");

    ledger
        .add_ownership(&bar, "alice", true)
        .expect("must add alice with root");
    let owners: Vec<String> = ledger.owners_of(&bar).into_iter().collect();
    assert_eq!(owners, vec!["alice".to_string(), "root".to_string()]);

    let vim = pkg("vim", "amd64");
    ledger
        .add_ownership(&vim, ROOT_USERNAME, true)
        .expect("must add root once");
    assert_eq!(ledger.owners_of(&vim).len(), 1);
}

#[test]
fn ledger_remove_reports_untracked_and_non_member() {
    let mut ledger = CoownershipLedger::new();
    let bar = pkg("bar", "amd64");

    let err = ledger
        .remove_ownership(&bar, "alice")
        .expect_err("must reject untracked package");
    assert!(matches!(err, CoownershipError::PackageNotTracked { .. }));

    ledger
        .add_ownership(&bar, "alice", false)
        .expect("must add alice");
    let err = ledger
        .remove_ownership(&bar, "bob")
        .expect_err("must reject non-member");
    assert!(matches!(err, CoownershipError::UserDoesNotOwn { .. }));
    assert!(ledger.is_own(&bar, "alice"));

    let err = ledger
        .remove_package(&pkg("zsh", "amd64"))
        .expect_err("must reject untracked package");
    assert!(err.to_string().contains("not tracked"));
}

#[test]
fn ledger_lists_users_packages_in_order() {
    let mut ledger = CoownershipLedger::new();
    for name in ["zsh", "bar", "mc"] {
        ledger
            .add_ownership(&pkg(name, "amd64"), "alice", false)
            .expect("must add");
    }
    ledger
        .add_ownership(&pkg("vim", "amd64"), "bob", false)
        .expect("must add");

    let mine: Vec<String> = ledger
        .his_packages("alice")
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(mine, vec!["bar:amd64", "mc:amd64", "zsh:amd64"]);
    assert!(ledger.his_packages("carol").is_empty());
}

#[test]
fn ledger_applies_deferred_updates() {
    let mut ledger = CoownershipLedger::new();
    let bar = pkg("bar", "amd64");

    ledger
        .apply(&LedgerUpdate::Grant {
            package: bar.clone(),
            user: "alice".to_string(),
            also_root: true,
        })
        .expect("must grant");
    ledger
        .apply(&LedgerUpdate::Release {
            package: bar.clone(),
            user: "alice".to_string(),
        })
        .expect("must release");
    assert!(ledger.is_sole_own(&bar, ROOT_USERNAME));

    ledger
        .apply(&LedgerUpdate::Drop {
            package: bar.clone(),
        })
        .expect("must drop");
    assert!(!ledger.is_any_user_own(&bar));
}

#[test]
fn ledger_toml_round_trips_in_canonical_order() {
    let input = r#"version = 1

[[package]]
name = "bar"
arch = "amd64"
owners = ["alice", "root"]

[[package]]
name = "bar"
arch = "i386"
owners = ["bob"]
"#;
    let ledger = CoownershipLedger::from_toml_str(input).expect("must parse ledger");
    assert_eq!(ledger.len(), 2);
    let rendered = ledger.to_toml_string().expect("must render ledger");
    let reparsed = CoownershipLedger::from_toml_str(&rendered).expect("must reparse ledger");
    assert_eq!(reparsed, ledger);
    assert_eq!(reparsed.to_toml_string().expect("must render"), rendered);

    let unsorted = r#"version = 1

[[package]]
name = "zsh"
arch = "amd64"
owners = ["root", "alice"]

[[package]]
name = "bar"
arch = "amd64"
owners = ["bob"]
"#;
    let ledger = CoownershipLedger::from_toml_str(unsorted).expect("must parse ledger");
    let rendered = ledger.to_toml_string().expect("must render ledger");
    let bar_at = rendered.find("\"bar\"").expect("must render bar");
    let zsh_at = rendered.find("\"zsh\"").expect("must render zsh");
    assert!(bar_at < zsh_at);
    assert!(rendered.contains("\"alice\", \"root\""));
}

#[test]
fn ledger_import_rejects_malformed_records() {
    let empty_owners = "version = 1\n[[package]]\nname = \"bar\"\narch = \"amd64\"\nowners = []\n";
    let err = CoownershipLedger::from_toml_str(empty_owners).expect_err("must reject empty owners");
    assert_eq!(err.kind, StructureKind::Coownership);
    assert!(err.to_string().contains("empty owner list"));

    let duplicate =
        "version = 1\n[[package]]\nname = \"bar\"\narch = \"amd64\"\nowners = [\"a\", \"a\"]\n";
    let err = CoownershipLedger::from_toml_str(duplicate).expect_err("must reject duplicate owner");
    assert!(err.to_string().contains("listed twice"));

    let bad_version = "version = 7\n";
    let err = CoownershipLedger::from_toml_str(bad_version).expect_err("must reject version");
    assert!(err.to_string().contains("unsupported version 7"));

    let garbage = "[[package]\nname=";
    let err = CoownershipLedger::from_toml_str(garbage).expect_err("must reject garbage");
    assert!(err.to_string().contains("syntax error while importing coownership list"));
}

fn sample_enclosure() -> Enclosure {
    let mut enclosure = Enclosure::new();
    enclosure
        .add_package("mc", ArchAndVersions::every())
        .expect("must add mc");
    enclosure
        .add_package(
            "vim",
            ArchAndVersions::EveryArch(Versions::distinct(["2:9.0-1", "2:9.1-1"])),
        )
        .expect("must add vim");
    enclosure
        .add_versioned_package(&ver("bar", "amd64", "1.0"))
        .expect("must add bar 1.0");
    enclosure
        .add_versioned_package(&ver("bar", "amd64", "1.1"))
        .expect("must add bar 1.1");
    enclosure
        .add_versioned_package(&ver("docs", "all", "3"))
        .expect("must add docs");
    enclosure
        .add_versioned_package(&ver("docs", "i386", "2"))
        .expect("must add docs i386");
    enclosure
}

fn sample_packages() -> Vec<VersionedPackage> {
    vec![
        ver("mc", "amd64", "4.8"),
        ver("mc", "armhf", "0"),
        ver("vim", "amd64", "2:9.0-1"),
        ver("vim", "i386", "2:9.1-1"),
        ver("vim", "amd64", "2:8.2-1"),
        ver("bar", "amd64", "1.0"),
        ver("bar", "amd64", "2.0"),
        ver("bar", "i386", "1.0"),
        ver("docs", "amd64", "3"),
        ver("docs", "i386", "3"),
        ver("docs", "i386", "2"),
        ver("foo", "amd64", "1.0"),
    ]
}

#[test]
fn enclosure_contains_follows_wildcards_and_explicit_sets() {
    let enclosure = sample_enclosure();
    let answers: Vec<bool> = sample_packages().iter().map(|p| enclosure.contains(p)).collect();
    assert_eq!(
        answers,
        vec![
            true, true, true, true, false, true, false, false, true, false, true, false
        ]
    );
}

#[test]
fn enclosure_all_architecture_is_a_fallback_only() {
    let enclosure = sample_enclosure();
    // docs has an i386 entry, so the "all" entry is not consulted for i386.
    assert!(!enclosure.contains(&ver("docs", "i386", "3")));
    assert!(enclosure.contains(&ver("docs", "arm64", "3")));
}

#[test]
fn enclosure_rejects_every_and_distinct_mix() {
    let mut enclosure = sample_enclosure();

    let err = enclosure
        .add_versioned_package(&ver("mc", "amd64", "4.8"))
        .expect_err("must reject explicit version under every-arch");
    assert_eq!(
        err,
        EnclosureError::ArchAndVersionsEveryAndDistinct {
            name: "mc".to_string()
        }
    );

    let mut versions = Versions::Every;
    let err = versions.add("1.0").expect_err("must reject distinct under every");
    assert_eq!(err, EnclosureError::VersionsEveryAndDistinct);

    let err = enclosure
        .add_package("bar", ArchAndVersions::every())
        .expect_err("must reject duplicate name");
    assert!(matches!(err, EnclosureError::PackageAlreadyPresent { .. }));
}

#[test]
fn enclosure_refuses_to_enumerate_wildcards() {
    let enclosure = sample_enclosure();
    let mc = enclosure.get("mc").expect("must have mc");
    assert!(matches!(
        mc.architectures().err(),
        Some(EnclosureError::CannotEnumerateEvery)
    ));
    assert!(Versions::Every.iter().is_err());

    let bar = enclosure.get("bar").expect("must have bar");
    let archs: Vec<String> = bar
        .architectures()
        .expect("must enumerate bar")
        .map(|(arch, _)| arch.to_string())
        .collect();
    assert_eq!(archs, vec!["amd64".to_string()]);
    let names: Vec<&str> = enclosure.names().collect();
    assert_eq!(names, vec!["bar", "docs", "mc", "vim"]);
}

#[test]
fn enclosure_toml_round_trip_preserves_answers() {
    let enclosure = sample_enclosure();
    let rendered = enclosure.to_toml_string().expect("must render enclosure");
    let reparsed = Enclosure::from_toml_str(&rendered).expect("must reparse enclosure");

    assert_eq!(reparsed, enclosure);
    for sample in sample_packages() {
        assert_eq!(reparsed.contains(&sample), enclosure.contains(&sample), "{sample}");
    }
    assert_eq!(reparsed.to_toml_string().expect("must render"), rendered);
}

#[test]
fn enclosure_import_reads_both_record_forms() {
    let input = r#"version = 1

[[package]]
name = "mc"
every_arch = { every_version = true }

[[package]]
name = "bar"

[package.arch.amd64]
versions = ["1.0"]

[package.arch.i386]
every_version = true
"#;
    let enclosure = Enclosure::from_toml_str(input).expect("must parse enclosure");
    assert!(enclosure.contains(&ver("mc", "s390x", "anything")));
    assert!(enclosure.contains(&ver("bar", "amd64", "1.0")));
    assert!(enclosure.contains(&ver("bar", "i386", "7")));
    assert!(!enclosure.contains(&ver("bar", "amd64", "7")));
}

#[test]
fn enclosure_import_rejects_conflicting_forms() {
    let mixed = r#"version = 1

[[package]]
name = "bar"
every_arch = { every_version = true }

[package.arch.amd64]
versions = ["1.0"]
"#;
    let err = Enclosure::from_toml_str(mixed).expect_err("must reject mixed forms");
    assert_eq!(err.kind, StructureKind::Enclosure);
    assert!(err.to_string().contains("every_arch together with per-arch"));

    let both = r#"version = 1

[[package]]
name = "bar"
every_arch = { every_version = true, versions = ["1.0"] }
"#;
    let err = Enclosure::from_toml_str(both).expect_err("must reject every with versions");
    assert!(err.to_string().contains("every_version together with explicit versions"));

    let duplicate = r#"version = 1

[[package]]
name = "bar"
every_arch = { every_version = true }

[[package]]
name = "bar"
every_arch = { every_version = true }
"#;
    let err = Enclosure::from_toml_str(duplicate).expect_err("must reject duplicate package");
    assert!(err.to_string().contains("already in the enclosure"));
}

#[test]
fn mixed_enclosure_allows_what_any_source_allows() {
    let mut main = Enclosure::new();
    main.add_versioned_package(&ver("bar", "amd64", "1.0"))
        .expect("must add bar");
    let mut extra = Enclosure::new();
    extra
        .add_package("mc", ArchAndVersions::every())
        .expect("must add mc");

    let mut mixed = MixedEnclosure::new();
    assert!(!mixed.encloses(&ver("bar", "amd64", "1.0")));
    mixed.push("main", main);
    mixed.push("extra", extra);

    assert!(mixed.encloses(&ver("bar", "amd64", "1.0")));
    assert!(mixed.encloses(&ver("mc", "i386", "4.8")));
    assert!(!mixed.encloses(&ver("foo", "amd64", "1.0")));
    assert_eq!(
        mixed.covering_source(&ver("mc", "amd64", "1")),
        Some("extra")
    );
}

#[test]
fn debconf_state_thresholds() {
    assert!(Priority::Low < Priority::Medium);
    assert!(Priority::High < Priority::Critical);

    let high = PackageState::with_questions(Priority::High);
    assert!(high.requires_attention(Priority::High));
    assert!(high.requires_attention(Priority::Medium));
    assert!(!high.requires_attention(Priority::Critical));
    assert!(!PackageState::without_questions().requires_attention(Priority::Low));
    assert!(!PackageState::processing_error().is_well_processed());
    assert!(PackageState::no_config_file().is_well_processed());
}

#[test]
fn debconf_index_well_processed_and_blocking() {
    let mut index = DebconfPriorities::new();
    let bar = pkg("bar", "amd64");
    let broken = pkg("broken", "amd64");
    let asking = pkg("asking", "amd64");
    index.set(bar.clone(), PackageState::without_questions());
    index.set(broken.clone(), PackageState::processing_error());
    index.set(asking.clone(), PackageState::with_questions(Priority::Critical));

    assert!(index.well_processed(&bar).expect("must be tracked"));
    assert!(!index.well_processed(&broken).expect("must be tracked"));
    let err = index
        .well_processed(&pkg("foo", "amd64"))
        .expect_err("must reject untracked");
    assert!(matches!(err, DebconfError::NotTracked { .. }));

    assert!(!index.blocks_install(&bar, Priority::High));
    assert!(index.blocks_install(&broken, Priority::High));
    assert!(index.blocks_install(&asking, Priority::High));
    assert!(index.blocks_install(&pkg("foo", "amd64"), Priority::High));

    let err = index
        .add_package(bar.clone(), PackageState::no_config_file())
        .expect_err("must reject duplicate");
    assert!(matches!(err, DebconfError::PackageAlreadyAdded { .. }));
}

#[test]
fn debconf_toml_round_trips_and_validates_priority_presence() {
    let input = r#"version = 1

[[package]]
name = "asking"
arch = "amd64"
status = "has-questions"
priority = "medium"

[[package]]
name = "bar"
arch = "amd64"
status = "no-config-file"
"#;
    let index = DebconfPriorities::from_toml_str(input).expect("must parse priorities");
    assert_eq!(
        index.get(&pkg("asking", "amd64")).and_then(PackageState::priority),
        Some(Priority::Medium)
    );
    let rendered = index.to_toml_string().expect("must render");
    assert_eq!(
        DebconfPriorities::from_toml_str(&rendered).expect("must reparse"),
        index
    );

    let missing =
        "version = 1\n[[package]]\nname = \"a\"\narch = \"amd64\"\nstatus = \"has-questions\"\n";
    let err = DebconfPriorities::from_toml_str(missing).expect_err("must require priority");
    assert!(err.to_string().contains("no priority"));

    let extra =
        "version = 1\n[[package]]\nname = \"a\"\narch = \"amd64\"\nstatus = \"no-config-file\"\npriority = \"low\"\n";
    let err = DebconfPriorities::from_toml_str(extra).expect_err("must reject stray priority");
    assert!(err.to_string().contains("has a priority"));
}

#[test]
fn realized_tasks_drop_unknown_names_and_keep_order() {
    let tasks = TaskSet::new()
        .with(TaskKind::Install, &["zsh", "nonexistent", "bar"])
        .with(TaskKind::Remove, &["mc"])
        .with(TaskKind::Purge, &["ghost"]);

    let realization = RealizedTaskSet::realize(&tasks, |name| match name {
        "zsh" | "bar" | "mc" => Some(pkg(name, "amd64")),
        _ => None,
    });

    assert_eq!(
        realization.tasks.install,
        vec![pkg("zsh", "amd64"), pkg("bar", "amd64")]
    );
    assert_eq!(realization.tasks.remove, vec![pkg("mc", "amd64")]);
    assert!(realization.tasks.purge.is_empty());
    assert_eq!(
        realization.missing,
        vec![
            (TaskKind::Install, "nonexistent".to_string()),
            (TaskKind::Purge, "ghost".to_string()),
        ]
    );
    assert_eq!(realization.tasks.len(), 3);
}

#[test]
fn realized_tasks_membership_and_pruning() {
    let mut tasks = RealizedTaskSet::new();
    let bar = pkg("bar", "amd64");
    let mc = pkg("mc", "amd64");
    tasks.push(TaskKind::Install, bar.clone());
    tasks.push(TaskKind::PhysicallyRemove, mc.clone());

    assert!(tasks.contains(TaskKind::Install, &bar));
    assert!(tasks.contains_name(TaskKind::Install, "bar"));
    assert!(tasks.contains_anywhere(&mc));
    assert!(tasks.is_explicit_removal(&mc));
    assert!(tasks.is_physical_removal(&mc));
    assert!(!tasks.is_explicit_removal(&bar));

    assert!(tasks.remove(TaskKind::Install, &bar));
    assert!(!tasks.remove(TaskKind::Install, &bar));
    assert!(tasks.remove_everywhere(&mc));
    assert!(tasks.is_empty());
}

#[test]
fn task_kind_parses_diverse_suffixes() {
    assert_eq!(TaskKind::from_suffixed("vim+"), Some((TaskKind::Install, "vim")));
    assert_eq!(TaskKind::from_suffixed("vim-"), Some((TaskKind::Remove, "vim")));
    assert_eq!(
        TaskKind::from_suffixed("libfoo-dev&M"),
        Some((TaskKind::Markauto, "libfoo-dev"))
    );
    assert_eq!(
        TaskKind::from_suffixed("vim&m"),
        Some((TaskKind::Unmarkauto, "vim"))
    );
    assert_eq!(TaskKind::from_suffixed("vim"), None);
    assert_eq!(TaskKind::from_suffixed("+"), None);
}

#[test]
fn space_amount_parses_unit_table() {
    let cases = [
        ("5%", SpaceAmount::Relative { percent: 5.0 }),
        ("12B", SpaceAmount::Absolute { bytes: 12 }),
        ("3KB", SpaceAmount::Absolute { bytes: 3_000 }),
        ("3KiB", SpaceAmount::Absolute { bytes: 3 * 1024 }),
        ("2MB", SpaceAmount::Absolute { bytes: 2_000_000 }),
        ("2MiB", SpaceAmount::Absolute { bytes: 2 << 20 }),
        ("1GB", SpaceAmount::Absolute { bytes: 1_000_000_000 }),
        ("1GiB", SpaceAmount::Absolute { bytes: 1 << 30 }),
        ("1TB", SpaceAmount::Absolute { bytes: 1_000_000_000_000 }),
        ("1 TiB", SpaceAmount::Absolute { bytes: 1 << 40 }),
    ];
    for (input, expected) in cases {
        let parsed: SpaceAmount = input.parse().expect("must parse space amount");
        assert_eq!(parsed, expected, "{input}");
    }

    assert!("12".parse::<SpaceAmount>().is_err());
    assert!("twelveMB".parse::<SpaceAmount>().is_err());
    assert!("150%".parse::<SpaceAmount>().is_err());
}

#[test]
fn space_amount_fits_relative_and_absolute() {
    let relative = SpaceAmount::Relative { percent: 5.0 };
    assert_eq!(relative.required(1_000), 50);
    assert!(relative.fits(50, 1_000));
    assert!(!relative.fits(49, 1_000));

    let absolute = SpaceAmount::Absolute { bytes: 500 };
    assert!(absolute.fits(500, 1));
    assert!(!absolute.fits(499, u64::MAX));
}

#[test]
fn settings_default_when_empty_and_parse_overrides() {
    let settings = Settings::from_toml_str("").expect("must parse empty settings");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.groups.users, "limited-apt");
    assert_eq!(settings.debconf.minimal_priority, Priority::High);
    assert_eq!(settings.resume.authorization, ResumeAuthorization::Warn);

    let input = r#"
[groups]
upgraders = "staff"

[minimal_free_space]
cache = "1GiB"

[resume]
authorization = "original-user"

[[enclosure_sources]]
name = "main"
url = "https://example.org/enclosure.toml"

[freshness]
max_distro_age_hours = 48

[origin]
default_release = "stable"

[package_lists]
url = "https://example.org/packages.toml"
"#;
    let settings = Settings::from_toml_str(input).expect("must parse settings");
    assert_eq!(settings.groups.upgraders, "staff");
    assert_eq!(settings.groups.roots, "limited-apt-roots");
    assert_eq!(
        settings.minimal_free_space.cache,
        SpaceAmount::Absolute { bytes: 1 << 30 }
    );
    assert_eq!(
        settings.minimal_free_space.target,
        SpaceAmount::Relative { percent: 5.0 }
    );
    assert_eq!(settings.resume.authorization, ResumeAuthorization::OriginalUser);
    assert_eq!(settings.freshness.max_distro_age_hours, Some(48));
    assert!(settings.enclosure_source("main").is_some());
    assert_eq!(settings.origin.default_release.as_deref(), Some("stable"));
    assert_eq!(
        settings.package_lists.url.as_deref(),
        Some("https://example.org/packages.toml")
    );
    assert_eq!(settings.package_lists.sha256, None);

    let rendered = settings.to_toml_string().expect("must render settings");
    assert_eq!(
        Settings::from_toml_str(&rendered).expect("must reparse settings"),
        settings
    );
}

#[test]
fn settings_reject_bad_sources_and_amounts() {
    let duplicate = r#"
[[enclosure_sources]]
name = "main"
url = "https://a"

[[enclosure_sources]]
name = "main"
url = "https://b"
"#;
    let err = Settings::from_toml_str(duplicate).expect_err("must reject duplicate source");
    assert!(err.to_string().contains("duplicate enclosure source"));

    let bad_name = "[[enclosure_sources]]\nname = \"../x\"\nurl = \"https://a\"\n";
    let err = Settings::from_toml_str(bad_name).expect_err("must reject bad name");
    assert!(err.to_string().contains("must use only"));

    let bad_digest = "[[enclosure_sources]]\nname = \"m\"\nurl = \"https://a\"\nsha256 = \"abc\"\n";
    let err = Settings::from_toml_str(bad_digest).expect_err("must reject bad digest");
    assert!(err.to_string().contains("not a sha256"));

    let bad_lists_digest = "[package_lists]\nurl = \"https://a\"\nsha256 = \"xyz\"\n";
    let err = Settings::from_toml_str(bad_lists_digest).expect_err("must reject lists digest");
    assert!(err.to_string().contains("not a sha256"));

    let empty_release = "[origin]\ndefault_release = \"\"\n";
    let err = Settings::from_toml_str(empty_release).expect_err("must reject empty release");
    assert!(err.to_string().contains("default_release"));

    let bad_amount = "[minimal_free_space]\ntarget = \"lots\"\n";
    let err = Settings::from_toml_str(bad_amount).expect_err("must reject bad amount");
    assert_eq!(err.kind, StructureKind::Settings);
}
