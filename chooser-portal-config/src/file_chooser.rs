// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileChooser {
    /// Hand out read-only documents for files opened by confined apps
    pub open_read_only: bool,
    /// Used when the caller doesn't pass `cancel_label`
    pub cancel_label: String,
    /// Used for open dialogs when the caller doesn't pass `accept_label`
    pub accept_label: String,
    /// Used for save dialogs when the caller doesn't pass `accept_label`
    pub save_label: String,
}

impl Default for FileChooser {
    fn default() -> Self {
        Self {
            open_read_only: false,
            cancel_label: "_Cancel".to_string(),
            accept_label: "_Open".to_string(),
            save_label: "_Save".to_string(),
        }
    }
}
