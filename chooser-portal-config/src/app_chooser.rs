// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppChooser {
    /// Title of the application chooser dialog
    pub title: String,
}

impl Default for AppChooser {
    fn default() -> Self {
        Self {
            title: "Open a URI".to_string(),
        }
    }
}
