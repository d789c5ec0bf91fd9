// SPDX-License-Identifier: GPL-3.0-only

//! Outstanding portal requests, keyed by the handle given out to the caller.

use std::collections::{HashMap, hash_map::Entry};

use crate::{DBUS_PATH, app_chooser::AppRequest, request::FileRequest};

/// The interface a request belongs to. A handle is only ever valid on the interface that
/// created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    FileChooser,
    AppChooser,
}

#[derive(Debug)]
pub enum Pending {
    FileChooser(FileRequest),
    AppChooser(AppRequest),
}

impl Pending {
    pub fn interface(&self) -> Interface {
        match self {
            Self::FileChooser(_) => Interface::FileChooser,
            Self::AppChooser(_) => Interface::AppChooser,
        }
    }

    pub fn app_id(&self) -> &str {
        match self {
            Self::FileChooser(request) => request.app_id(),
            Self::AppChooser(request) => request.app_id(),
        }
    }

    /// Whether `caller_app_id` may address this request through `interface`.
    fn authorizes(&self, caller_app_id: &str, interface: Interface) -> bool {
        // An empty app id is an unconfined caller
        (caller_app_id.is_empty() || caller_app_id == self.app_id())
            && self.interface() == interface
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    handles: HashMap<String, Pending>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `pending` under a fresh random handle and return the handle.
    pub fn register(&mut self, pending: Pending) -> String {
        self.register_with(pending, rand::random)
    }

    fn register_with(&mut self, pending: Pending, mut next: impl FnMut() -> u32) -> String {
        loop {
            let handle = format!("{DBUS_PATH}/{}", next());
            if let Entry::Vacant(entry) = self.handles.entry(handle) {
                let handle = entry.key().clone();
                entry.insert(pending);
                return handle;
            }
        }
    }

    /// Look up a request on behalf of a caller. Unknown handles and handles the caller may not
    /// touch are indistinguishable.
    pub fn lookup(
        &self,
        handle: &str,
        caller_app_id: &str,
        interface: Interface,
    ) -> Option<&Pending> {
        self.handles
            .get(handle)
            .filter(|pending| pending.authorizes(caller_app_id, interface))
    }

    /// Authorized removal: the request is only taken out if [`Registry::lookup`] would find it.
    pub fn close(
        &mut self,
        handle: &str,
        caller_app_id: &str,
        interface: Interface,
    ) -> Option<Pending> {
        self.lookup(handle, caller_app_id, interface)?;
        self.handles.remove(handle)
    }

    /// Remove a request, handing ownership to the caller. Only the first call for a handle
    /// gets anything back.
    pub fn unregister(&mut self, handle: &str) -> Option<Pending> {
        self.handles.remove(handle)
    }

    pub fn file_request_mut(&mut self, handle: &str) -> Option<&mut FileRequest> {
        match self.handles.get_mut(handle)? {
            Pending::FileChooser(request) => Some(request),
            Pending::AppChooser(_) => None,
        }
    }

    pub fn take_file_request(&mut self, handle: &str) -> Option<FileRequest> {
        match self.handles.remove(handle)? {
            Pending::FileChooser(request) => Some(request),
            other => {
                self.handles.insert(handle.to_string(), other);
                None
            }
        }
    }

    /// Put `pending` under a handle of the test's choosing, as if it had been drawn again.
    #[cfg(test)]
    pub fn insert(&mut self, handle: &str, pending: Pending) {
        self.handles.insert(handle.to_string(), pending);
    }

    #[cfg(test)]
    pub fn contains(&self, handle: &str) -> bool {
        self.handles.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
