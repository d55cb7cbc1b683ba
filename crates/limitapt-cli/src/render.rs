use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use limitapt_core::{ArchAndVersions, ConcretePackage, MixedEnclosure, Versions};
use limitapt_policy::{ChangeSummary, CommitProgress, Denial, Notice, Notifications, Warning};

const DEFAULT_TERMINAL_WIDTH: usize = 80;
const SIZE_PREFIXES: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
const KILO: f64 = 1000.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub fn current_output_style() -> OutputStyle {
    resolve_output_style(io::stdout().is_terminal())
}

pub fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => {
            let badge = match status {
                "ok" => "[OK]",
                "warn" => "[WARN]",
                "err" => "[ERR]",
                _ => "[..]",
            };
            format!("{badge} {message}")
        }
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn render_header(style: OutputStyle, header: &str) -> String {
    match style {
        OutputStyle::Plain => header.to_string(),
        OutputStyle::Rich => colorize(section_style(), header),
    }
}

/// Scale a byte count to the largest decimal unit that keeps at most four
/// digits.
pub fn pretty_size(byte_count: u64) -> (&'static str, u64) {
    if byte_count == 0 {
        return (SIZE_PREFIXES[0], 0);
    }
    let last = SIZE_PREFIXES.len() - 1;
    let mut quantity = byte_count as f64;
    let mut class = 0;
    while quantity.log10() >= 4.0 && class < last {
        quantity /= KILO;
        class += 1;
    }
    if quantity.round_ties_even() == KILO && class < last {
        quantity /= KILO;
        class += 1;
    }
    (SIZE_PREFIXES[class], quantity.round_ties_even() as u64)
}

pub fn pretty_size_str(byte_count: u64) -> String {
    let (prefix, size) = pretty_size(byte_count);
    format!("{size}{prefix}")
}

pub fn package_label(package: &ConcretePackage, show_arch: bool) -> String {
    if show_arch {
        package.to_string()
    } else {
        package.name().to_string()
    }
}

fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|columns| columns.trim().parse().ok())
        .filter(|columns| *columns > 0)
        .unwrap_or(DEFAULT_TERMINAL_WIDTH)
}

/// Lay out words on indented lines no wider than `width`; an overlong word
/// gets a line of its own.
pub fn wrap_words(words: &[String], width: usize) -> Vec<String> {
    const INDENT: &str = "  ";
    let mut lines = Vec::new();
    let mut line = String::from(INDENT);
    for word in words {
        if word.len() + INDENT.len() > width {
            if line != INDENT {
                lines.push(std::mem::replace(&mut line, String::from(INDENT)));
            }
            lines.push(format!("{INDENT}{word}"));
            continue;
        }
        let candidate = if line == INDENT {
            format!("{INDENT}{word}")
        } else {
            format!("{line} {word}")
        };
        if candidate.len() > width {
            lines.push(std::mem::replace(&mut line, format!("{INDENT}{word}")));
        } else {
            line = candidate;
        }
    }
    if line != INDENT {
        lines.push(line);
    }
    lines
}

pub fn format_change_summary(
    summary: &ChangeSummary,
    style: OutputStyle,
    show_arch: bool,
    width: usize,
) -> Vec<String> {
    let changes = &summary.changes;
    let sections: [(&[ConcretePackage], &str); 10] = [
        (
            &changes.logically_installed,
            "You will become an owner of these installed packages:",
        ),
        (
            &changes.physically_installed,
            "These new packages will be installed:",
        ),
        (
            &changes.logically_installed_but_physically_upgraded,
            "These packages will be upgraded and you will become their owner:",
        ),
        (&changes.upgraded, "These packages will be upgraded:"),
        (&changes.reinstalled, "These packages will be reinstalled:"),
        (&changes.downgraded, "These packages will be downgraded:"),
        (&changes.logically_removed, "You will no longer own these packages:"),
        (&changes.physically_removed, "These packages will be removed:"),
        (&changes.purged, "These packages will be purged:"),
        (
            &changes.kept,
            "These packages will be kept at their current version:",
        ),
    ];

    let mut lines = Vec::new();
    for (packages, header) in sections {
        if packages.is_empty() {
            continue;
        }
        let mut words: Vec<String> = packages
            .iter()
            .map(|package| package_label(package, show_arch))
            .collect();
        words.sort();
        lines.push(render_header(style, header));
        lines.extend(wrap_words(&words, width));
    }

    let updated =
        changes.upgraded.len() + changes.logically_installed_but_physically_upgraded.len();
    let deleted = changes.physically_removed.len() + changes.purged.len();
    lines.push(format!(
        "{updated} packages will be updated, {} new will be installed, {deleted} marked for deletion",
        changes.physically_installed.len()
    ));
    let download = pretty_size_str(summary.required_download);
    let unpacking = if summary.required_space >= 0 {
        format!(
            "{} will be occupied after unpacking.",
            pretty_size_str(summary.required_space.unsigned_abs())
        )
    } else {
        format!(
            "{} will be freed unpacking.",
            pretty_size_str(summary.required_space.unsigned_abs())
        )
    };
    lines.push(format!("Required to download {download} archives. {unpacking}"));
    lines
}

fn format_versions(versions: &Versions) -> String {
    match versions {
        Versions::Every => "*".to_string(),
        Versions::Distinct(versions) => versions.iter().cloned().collect::<Vec<_>>().join(", "),
    }
}

/// Every enclosure rule, one line per package and architecture, grouped by
/// source.
pub fn format_enclosure_rules(enclosure: &MixedEnclosure, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    for (source, rules) in enclosure.sources() {
        lines.push(render_header(style, &format!("{source}:")));
        for name in rules.names() {
            match rules.get(name) {
                Some(ArchAndVersions::EveryArch(versions)) => {
                    lines.push(format!("  {name} {}", format_versions(versions)));
                }
                Some(ArchAndVersions::PerArch(by_arch)) => {
                    for (arch, versions) in by_arch {
                        lines.push(format!("  {name}:{arch} {}", format_versions(versions)));
                    }
                }
                None => {}
            }
        }
    }
    lines
}

/// Answer to a yes/no prompt defaulting to yes; `None` for anything else.
pub fn parse_agreement(answer: &str) -> Option<bool> {
    let answer = answer.trim();
    if answer.is_empty() || answer.starts_with(['Y', 'y']) {
        return Some(true);
    }
    if answer.starts_with(['N', 'n']) {
        return Some(false);
    }
    None
}

/// Notifications printed to the terminal: summaries and notices on stdout,
/// errors on stderr.
pub struct ConsoleNotifications {
    style: OutputStyle,
    show_arch: bool,
}

impl ConsoleNotifications {
    pub fn new(style: OutputStyle, show_arch: bool) -> Self {
        Self { style, show_arch }
    }
}

impl Notifications for ConsoleNotifications {
    fn notice(&mut self, notice: &Notice) {
        println!("{}", render_status_line(self.style, "info", &notice.to_string()));
    }

    fn denied(&mut self, denial: &Denial) {
        eprintln!(
            "{}",
            render_status_line(self.style, "err", &format!("error: {denial}"))
        );
    }

    fn warned(&mut self, warning: &Warning) {
        eprintln!(
            "{}",
            render_status_line(self.style, "warn", &format!("warning: {warning}"))
        );
    }

    fn show_changes(&mut self, summary: &ChangeSummary) {
        for line in format_change_summary(summary, self.style, self.show_arch, terminal_width()) {
            println!("{line}");
        }
    }

    fn prompt_agree(&mut self) -> bool {
        let stdin = io::stdin();
        loop {
            print!("Do you want to continue? [Y/n] ");
            let _ = io::stdout().flush();
            let mut answer = String::new();
            match stdin.lock().read_line(&mut answer) {
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
            if let Some(agreed) = parse_agreement(&answer) {
                return agreed;
            }
            println!("Incorrect answer.");
        }
    }

    fn nothing_to_do(&mut self) {
        println!("{}", render_status_line(self.style, "info", "nothing to do"));
    }
}

/// A byte-counting progress bar, drawn only for rich output.
pub struct TransferBar {
    progress_bar: Option<ProgressBar>,
}

impl TransferBar {
    pub fn start(style: OutputStyle, label: &str, total: u64) -> Self {
        let progress_bar = if style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(total.max(1));
            if let Ok(bar_style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {bytes:>9}/{total_bytes:9} {elapsed_precise}",
            ) {
                progress_bar.set_style(bar_style.tick_chars("<^>v ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };
        Self { progress_bar }
    }

    pub fn set_length(&self, total: u64) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_length(total.max(1));
        }
    }

    pub fn inc(&self, bytes: u64) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.inc(bytes);
        }
    }

    pub fn finish(&mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

/// Commit progress on the terminal.
pub struct ConsoleProgress {
    style: OutputStyle,
    show_arch: bool,
    fetch: Option<TransferBar>,
}

impl ConsoleProgress {
    pub fn new(style: OutputStyle, show_arch: bool) -> Self {
        Self {
            style,
            show_arch,
            fetch: None,
        }
    }

    fn finish_fetch(&mut self) {
        if let Some(mut fetch) = self.fetch.take() {
            fetch.finish();
        }
    }
}

impl CommitProgress for ConsoleProgress {
    fn fetch_started(&mut self, total_bytes: u64) {
        if total_bytes > 0 {
            self.fetch = Some(TransferBar::start(self.style, "fetch", total_bytes));
        }
    }

    fn fetched(&mut self, _package: &ConcretePackage, bytes: u64) {
        if let Some(fetch) = &self.fetch {
            fetch.inc(bytes);
        }
    }

    fn unpacking(&mut self, package: &ConcretePackage) {
        self.finish_fetch();
        println!(
            "{}",
            render_status_line(
                self.style,
                "info",
                &format!("unpacking {}", package_label(package, self.show_arch))
            )
        );
    }

    fn finished(&mut self) {
        self.finish_fetch();
        println!("{}", render_status_line(self.style, "ok", "changes applied"));
    }
}
