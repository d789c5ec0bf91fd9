// SPDX-License-Identifier: GPL-3.0-only

//! The contract between the portal and whatever renders its dialogs.
//!
//! A frontend shows a dialog and hands back a [`Dialog`]: a one-shot channel that resolves with
//! the user's decision, and a [`DialogGuard`] owning the on-screen resource. Dropping the guard
//! tears the dialog down, so whoever owns the guard decides when the UI goes away.

use std::{fmt, path::PathBuf};

use tokio::sync::oneshot;

use crate::request::ChooserKind;

/// A named group of patterns, `0` for globs and `1` for MIME types.
pub type Filter = (String, Vec<(u32, String)>);

pub const FILTER_GLOB: u32 = 0;
pub const FILTER_MIME: u32 = 1;

/// Everything needed to show a file chooser.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDialog {
    pub kind: ChooserKind,
    pub title: String,
    pub parent_window: String,
    pub accept_label: String,
    pub cancel_label: String,
    pub filters: Vec<Filter>,
    pub current_name: Option<String>,
    pub current_folder: Option<PathBuf>,
    pub current_file: Option<PathBuf>,
    /// Initial state of the "open read-only" toggle
    pub read_only: bool,
}

/// What the user did with a file chooser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDecision {
    /// Selection accepted, URIs in the order the user picked them
    Accept { uris: Vec<String>, writable: bool },
    /// The cancel button
    Cancel,
    /// Closed some other way, e.g. the window was closed
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppChoice {
    /// Desktop entry id, without the `.desktop` suffix
    pub id: String,
    pub name: String,
}

/// An application chooser prompt. The first choice is the default handler, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPrompt {
    pub title: String,
    pub parent_window: String,
    pub text: String,
    pub choices: Vec<AppChoice>,
}

/// Owns an on-screen dialog. The close callback runs exactly once, on drop.
pub struct DialogGuard {
    close_cb: Option<Box<dyn FnOnce() + Send + Sync + 'static>>,
}

impl DialogGuard {
    pub fn new<F: FnOnce() + Send + Sync + 'static>(cb: F) -> Self {
        Self {
            close_cb: Some(Box::new(cb)),
        }
    }
}

impl Drop for DialogGuard {
    fn drop(&mut self) {
        if let Some(cb) = self.close_cb.take() {
            cb();
        }
    }
}

impl fmt::Debug for DialogGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogGuard")
            .field("open", &self.close_cb.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct Dialog<T> {
    pub decision: oneshot::Receiver<T>,
    pub guard: DialogGuard,
}

pub trait Frontend: Send + Sync {
    fn open_file_dialog(&self, dialog: FileDialog) -> anyhow::Result<Dialog<FileDecision>>;

    /// Resolves with the chosen desktop entry id, `None` when the user backed out.
    fn choose_application(&self, prompt: AppPrompt) -> anyhow::Result<Dialog<Option<String>>>;
}
