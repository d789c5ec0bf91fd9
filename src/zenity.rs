// SPDX-License-Identifier: GPL-3.0-only

//! Dialogs rendered by an external zenity-compatible program.

use std::{path::PathBuf, process::Stdio};

use anyhow::Context;
use tokio::sync::oneshot;

use crate::{
    dialog::{
        AppPrompt, Dialog, DialogGuard, FILTER_GLOB, FILTER_MIME, FileDecision, FileDialog,
        Frontend,
    },
    request::ChooserKind,
};

pub struct Zenity {
    program: String,
}

impl Zenity {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the dialog program and resolve the decision with `parse` once it exits. Dropping the
    /// guard kills the program.
    fn spawn<T, F>(&self, args: Vec<String>, parse: F) -> anyhow::Result<Dialog<T>>
    where
        T: Send + 'static,
        F: FnOnce(Option<i32>, &str) -> T + Send + 'static,
    {
        log::debug!("running {} {args:?}", self.program);
        let child = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;

        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                    let _ = tx.send(parse(output.status.code(), stdout.as_str()));
                }
                Err(err) => log::error!("dialog failed: {err}"),
            }
        });

        let abort = task.abort_handle();
        Ok(Dialog {
            decision: rx,
            guard: DialogGuard::new(move || abort.abort()),
        })
    }
}

impl Frontend for Zenity {
    fn open_file_dialog(&self, dialog: FileDialog) -> anyhow::Result<Dialog<FileDecision>> {
        let read_only = dialog.read_only;
        self.spawn(file_selection_args(&dialog), move |code, stdout| {
            file_decision(code, stdout, read_only)
        })
    }

    fn choose_application(&self, prompt: AppPrompt) -> anyhow::Result<Dialog<Option<String>>> {
        self.spawn(app_list_args(&prompt), app_decision)
    }
}

/// Drop GTK mnemonic markers, `__` stands for a literal underscore.
fn strip_mnemonic(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut chars = label.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' {
            if chars.peek() == Some(&'_') {
                chars.next();
                out.push('_');
            }
            continue;
        }
        out.push(c);
    }
    out
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn attach_arg(parent_window: &str) -> Option<String> {
    let xid = parent_window.strip_prefix("x11:")?;
    u64::from_str_radix(xid, 16)
        .ok()
        .map(|xid| format!("--attach={xid:#x}"))
}

fn start_filename(dialog: &FileDialog) -> Option<PathBuf> {
    if let Some(file) = &dialog.current_file {
        return Some(file.clone());
    }
    match (&dialog.current_folder, &dialog.current_name) {
        (Some(folder), Some(name)) if dialog.kind.is_save() => Some(folder.join(name)),
        (None, Some(name)) if dialog.kind.is_save() => Some(PathBuf::from(name)),
        // A trailing slash makes zenity start inside the folder
        (Some(folder), _) => Some(folder.join("")),
        (None, _) => None,
    }
}

pub fn file_selection_args(dialog: &FileDialog) -> Vec<String> {
    let mut args = vec![
        "--file-selection".to_string(),
        format!("--title={}", dialog.title),
        format!("--ok-label={}", strip_mnemonic(&dialog.accept_label)),
        format!("--cancel-label={}", strip_mnemonic(&dialog.cancel_label)),
    ];
    match dialog.kind {
        ChooserKind::OpenSingle => {}
        ChooserKind::OpenMultiple => {
            args.push("--multiple".to_string());
            args.push("--separator=\n".to_string());
        }
        ChooserKind::Save => args.push("--save".to_string()),
    }
    if let Some(filename) = start_filename(dialog) {
        args.push(format!("--filename={}", filename.display()));
    }
    for (name, patterns) in &dialog.filters {
        let mut globs = Vec::new();
        for (kind, pattern) in patterns {
            match *kind {
                FILTER_GLOB => globs.push(pattern.as_str()),
                // zenity only filters by glob
                FILTER_MIME => log::debug!("skipping MIME type filter {pattern}"),
                other => log::warn!("unknown filter type {other} for {pattern}"),
            }
        }
        if globs.is_empty() {
            continue;
        }
        args.push(format!("--file-filter={name} | {}", globs.join(" ")));
    }
    args.extend(attach_arg(&dialog.parent_window));
    args
}

pub fn app_list_args(prompt: &AppPrompt) -> Vec<String> {
    let mut args = vec![
        "--list".to_string(),
        format!("--title={}", prompt.title),
        format!("--text={}", escape_markup(&prompt.text)),
        "--hide-header".to_string(),
        "--column=id".to_string(),
        "--column=Application".to_string(),
        "--hide-column=1".to_string(),
        "--print-column=1".to_string(),
    ];
    args.extend(attach_arg(&prompt.parent_window));
    for choice in &prompt.choices {
        args.push(choice.id.clone());
        args.push(choice.name.clone());
    }
    args
}

/// One path per line, as printed by `--file-selection`.
pub fn parse_selection(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| match url::Url::from_file_path(line) {
            Ok(url) => Some(url.to_string()),
            Err(()) => {
                log::warn!("ignoring selection {line:?}");
                None
            }
        })
        .collect()
}

fn file_decision(code: Option<i32>, stdout: &str, read_only: bool) -> FileDecision {
    match code {
        Some(0) => FileDecision::Accept {
            uris: parse_selection(stdout),
            writable: !read_only,
        },
        Some(1) => FileDecision::Cancel,
        _ => FileDecision::Dismiss,
    }
}

fn app_decision(code: Option<i32>, stdout: &str) -> Option<String> {
    let id = stdout.trim();
    (code == Some(0) && !id.is_empty()).then(|| id.to_string())
}
