use std::fs;
use std::io::Read;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use limitapt_core::{DebconfPriorities, Enclosure};
use limitapt_policy::{PackageUniverse, PolicyError};
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::backend::{PackageListsSource, SnapshotUniverse};
use crate::render::{OutputStyle, TransferBar};
use crate::runner::Session;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(1000);
const STREAM_BUFFER_SIZE: usize = 8192;

/// Downloads package lists, enclosure and debconf sources over HTTP(S) or
/// from `file://` URLs.
#[derive(Debug)]
pub struct SourceFetcher {
    style: OutputStyle,
    client: Option<Client>,
}

impl SourceFetcher {
    pub fn new(style: OutputStyle) -> Self {
        Self {
            style,
            client: None,
        }
    }

    pub fn style(&self) -> OutputStyle {
        self.style
    }

    fn client(&mut self) -> Result<&Client> {
        if self.client.is_none() {
            let client = Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .context("failed to create HTTP client")?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| anyhow!("HTTP client is not available"))
    }

    pub fn fetch(&mut self, label: &str, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!(%url, "reading local source");
            return fs::read(path).with_context(|| format!("failed reading {path}"));
        }
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(anyhow!("unsupported source url '{url}'"));
        }

        let style = self.style;
        let client = self.client()?;
        let mut attempt = 0;
        let mut response = loop {
            attempt += 1;
            match client.get(url).send() {
                Ok(response) if response.status().is_success() => break response,
                Ok(response) => {
                    return Err(anyhow!("HTTP {} from {url}", response.status()));
                }
                Err(err) if attempt < MAX_RETRIES => {
                    warn!(%url, attempt, %err, "fetch failed, retrying");
                    thread::sleep(RETRY_DELAY);
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed fetching {url} after {attempt} attempts"));
                }
            }
        };

        let mut progress = TransferBar::start(style, label, 0);
        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }
        let mut body = Vec::new();
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let read = response
                .read(&mut buffer)
                .with_context(|| format!("failed reading response from {url}"))?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&buffer[..read]);
            progress.inc(read as u64);
        }
        progress.finish();
        info!(%url, bytes = body.len(), "fetched source");
        Ok(body)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub(crate) fn verify_checksum(name: &str, bytes: &[u8], expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(anyhow!(
            "sha256 mismatch for {name}: expected {expected}, got {actual}"
        ));
    }
    Ok(())
}

fn decode_utf8(name: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).with_context(|| format!("{name} is not valid UTF-8"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Packages known after refreshing; `None` when no lists source is set.
    pub packages: Option<usize>,
    pub enclosures: Vec<String>,
    pub pruned: Vec<String>,
    pub debconf_priorities: Option<usize>,
}

/// Refresh the package lists, every configured enclosure source and the
/// debconf priorities, then record the update times. The distro time is only
/// recorded when the package lists were actually refreshed.
pub fn run_update(
    session: &Session<'_>,
    fetcher: &mut SourceFetcher,
    now: u64,
) -> Result<UpdateReport> {
    if !session.identity.may_modify {
        return Err(PolicyError::NoPrivileges {
            action: "update package lists".to_string(),
            group: session.settings.groups.users.clone(),
        }
        .into());
    }
    let store = session.store;
    let settings = session.settings;
    store.layout().ensure_base_dirs()?;

    let mut times = store.load_update_times()?;
    let mut report = UpdateReport::default();

    if let Some(url) = &settings.package_lists.url {
        let mut universe = SnapshotUniverse::load(&store.layout().packages_snapshot_path())?
            .with_package_lists(PackageListsSource {
                url: url.clone(),
                sha256: settings.package_lists.sha256.clone(),
                style: fetcher.style(),
            });
        universe
            .update()
            .with_context(|| format!("failed refreshing package lists from {url}"))?;
        times.distro = Some(now);
        report.packages = Some(universe.len());
    } else {
        warn!("no package lists source is configured; package lists were not refreshed");
    }

    for source in &settings.enclosure_sources {
        let label = format!("enclosure source '{}'", source.name);
        let bytes = fetcher.fetch(&source.name, &source.url)?;
        verify_checksum(&label, &bytes, source.sha256.as_deref())?;
        let enclosure = Enclosure::from_toml_str(&decode_utf8(&label, bytes)?)
            .with_context(|| format!("invalid {label} from {}", source.url))?;
        store.save_enclosure(&source.name, &enclosure)?;
        info!(source = %source.name, packages = enclosure.len(), "stored enclosure");
        report.enclosures.push(source.name.clone());
    }
    let keep: Vec<&str> = settings
        .enclosure_sources
        .iter()
        .map(|source| source.name.as_str())
        .collect();
    report.pruned = store.prune_enclosures(&keep)?;
    if !settings.enclosure_sources.is_empty() {
        times.enclosure = Some(now);
    }

    if let Some(url) = &settings.debconf.url {
        let label = "debconf priorities";
        let bytes = fetcher.fetch("debconf", url)?;
        verify_checksum(label, &bytes, settings.debconf.sha256.as_deref())?;
        let priorities = DebconfPriorities::from_toml_str(&decode_utf8(label, bytes)?)
            .with_context(|| format!("invalid {label} from {url}"))?;
        store.save_priorities(&priorities)?;
        report.debconf_priorities = Some(priorities.len());
    }

    store.save_update_times(&times)?;
    Ok(report)
}
