// SPDX-License-Identifier: GPL-3.0-only

//! Finding, naming and launching the applications that handle a URI.

use std::{collections::HashSet, path::PathBuf};

use anyhow::{Context, anyhow};
use freedesktop_desktop_entry as fde;
use freedesktop_desktop_entry::{DesktopEntry, unicase::Ascii};

use crate::dialog::AppChoice;

const MIMEAPPS_LIST: &str = "mimeapps.list";
const DEFAULT_APPLICATIONS: &str = "[Default Applications]";

/// `x-scheme-handler/<scheme>` for anything with a scheme.
pub fn content_type_for_uri(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(url) => format!("x-scheme-handler/{}", url.scheme().to_ascii_lowercase()),
        Err(_) => "application/octet-stream".to_string(),
    }
}

pub async fn load_desktop_entries(locales: &[String]) -> Vec<DesktopEntry> {
    let mut entries = Vec::new();
    for p in fde::Iter::new(fde::default_paths()) {
        if let Ok(data) = tokio::fs::read_to_string(&p).await
            && let Ok(entry) = DesktopEntry::from_str(&p, &data, Some(locales))
        {
            entries.push(entry.to_owned());
        }
    }
    entries
}

pub fn get_desktop_entry<'a>(entries: &'a [DesktopEntry], id: &str) -> Option<&'a DesktopEntry> {
    fde::find_app_by_id(entries, Ascii::new(id))
}

fn handles(entry: &DesktopEntry, content_type: &str) -> bool {
    entry
        .desktop_entry("MimeType")
        .is_some_and(|types| types.split(';').any(|t| t.trim() == content_type))
}

fn choice(entry: &DesktopEntry, locales: &[String]) -> AppChoice {
    let id = entry.id().to_string();
    let name = entry
        .name(locales)
        .map(|name| name.into_owned())
        .unwrap_or_else(|| id.clone());
    AppChoice { id, name }
}

/// Every application declaring support for `content_type`, with `default` first.
pub fn handlers_for(
    entries: &[DesktopEntry],
    content_type: &str,
    default: Option<&str>,
    locales: &[String],
) -> Vec<AppChoice> {
    // The same id can be installed in several data dirs, the first one found wins
    let mut seen = HashSet::new();
    let mut choices: Vec<AppChoice> = entries
        .iter()
        .filter(|entry| handles(entry, content_type))
        .map(|entry| choice(entry, locales))
        .filter(|choice| seen.insert(choice.id.clone()))
        .collect();

    if let Some(default) = default {
        match choices.iter().position(|c| c.id == default) {
            Some(pos) => {
                let choice = choices.remove(pos);
                choices.insert(0, choice);
            }
            // mimeapps.list may name a handler that doesn't list the type itself
            None => {
                if let Some(entry) = get_desktop_entry(entries, default) {
                    choices.insert(0, choice(entry, locales));
                }
            }
        }
    }
    choices
}

/// Handlers named for `content_type` in the `[Default Applications]` group of a
/// `mimeapps.list`, without their `.desktop` suffix.
pub fn parse_default_applications(data: &str, content_type: &str) -> Vec<String> {
    let mut in_defaults = false;
    for line in data.lines().map(str::trim) {
        if line.starts_with('[') {
            in_defaults = line == DEFAULT_APPLICATIONS;
            continue;
        }
        if !in_defaults || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() == content_type {
            return value
                .split(';')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| id.strip_suffix(".desktop").unwrap_or(id).to_string())
                .collect();
        }
    }
    Vec::new()
}

fn mimeapps_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(MIMEAPPS_LIST));
    }
    if let Some(dir) = dirs::data_dir() {
        paths.push(dir.join("applications").join(MIMEAPPS_LIST));
    }
    paths
}

/// The user's default handler for `content_type`, if one is configured.
pub async fn default_application(content_type: &str) -> Option<String> {
    for path in mimeapps_paths() {
        let Ok(data) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        if let Some(id) = parse_default_applications(&data, content_type)
            .into_iter()
            .next()
        {
            log::debug!("default for {content_type} from {}: {id}", path.display());
            return Some(id);
        }
    }
    None
}

/// Message shown above the list of applications.
pub fn prompt_text(app_name: Option<&str>, uri: &str) -> String {
    match app_name {
        Some(name) => format!("{name} wants to open {uri}"),
        None => format!("An application wants to open {uri}"),
    }
}

/// Run `entry` with `uri`, without waiting for it to exit.
pub fn launch(entry: &DesktopEntry, uri: &str, locales: &[String]) -> anyhow::Result<()> {
    let argv = entry
        .parse_exec_with_uris(&[uri], locales)
        .map_err(|err| anyhow!("{err}"))?;
    let (program, args) = argv
        .split_first()
        .with_context(|| format!("{} has an empty Exec line", entry.id()))?;

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;
    log::debug!("launched {} for {uri}", entry.id());

    // Reap it whenever it exits
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(())
}
