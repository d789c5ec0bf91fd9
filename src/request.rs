// SPDX-License-Identifier: GPL-3.0-only

//! A single file chooser invocation, from the dialog opening to the response signal.
//!
//! ```text
//! Open ──decision──▶ Decided ──▶ Converting ──queue drained──▶ Responded ──▶ (dropped)
//!   │                   │             │
//!   └───────────────────┴─────────────┴──── Close ──▶ (dropped)
//! ```
//!
//! The registry owns every live request. A request is closed by taking it out of the registry
//! and dropping it, which also tears its dialog down; since only one party can take it out,
//! a request is closed exactly once.

use std::{collections::VecDeque, sync::Arc};

use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::{
    PORTAL_RESPONSE_CANCELLED, PORTAL_RESPONSE_OTHER, PORTAL_RESPONSE_SUCCESS,
    dialog::{DialogGuard, FileDecision},
    documents::{self, ConvertTarget},
    portal::Portal,
    response::{Response, ResponseSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChooserKind {
    OpenSingle,
    OpenMultiple,
    Save,
}

impl ChooserKind {
    pub fn is_save(self) -> bool {
        self == Self::Save
    }

    pub fn is_multiple(self) -> bool {
        self == Self::OpenMultiple
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    Cancelled,
    Other,
}

impl From<ResponseCode> for u32 {
    fn from(code: ResponseCode) -> u32 {
        match code {
            ResponseCode::Success => PORTAL_RESPONSE_SUCCESS,
            ResponseCode::Cancelled => PORTAL_RESPONSE_CANCELLED,
            ResponseCode::Other => PORTAL_RESPONSE_OTHER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the user
    Open,
    /// The user decided, nothing converted yet
    Decided,
    /// Handing the selection to the document portal, one URI at a time
    Converting,
    /// The response is settled and being sent
    Responded,
}

#[derive(Debug)]
pub struct FileRequest {
    app_id: String,
    sender: String,
    kind: ChooserKind,
    allow_write: bool,
    state: State,
    response: Option<ResponseCode>,
    selected: usize,
    raw_uris: VecDeque<String>,
    uris: Vec<String>,
    _dialog: DialogGuard,
    // Dropping this wakes the task driving the request
    _closed: oneshot::Sender<()>,
}

impl FileRequest {
    pub fn new(
        app_id: &str,
        sender: &str,
        kind: ChooserKind,
        dialog: DialogGuard,
        closed: oneshot::Sender<()>,
    ) -> Self {
        Self {
            app_id: app_id.to_string(),
            sender: sender.to_string(),
            kind,
            allow_write: true,
            state: State::Open,
            response: None,
            selected: 0,
            raw_uris: VecDeque::new(),
            uris: Vec::new(),
            _dialog: dialog,
            _closed: closed,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn kind(&self) -> ChooserKind {
        self.kind
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// The result code, `Other` until the user decided.
    pub fn response_code(&self) -> ResponseCode {
        self.response.unwrap_or(ResponseCode::Other)
    }

    /// Record the user's decision. Only the first decision counts.
    pub fn decide(&mut self, decision: FileDecision) {
        if self.response.is_some() {
            log::warn!("ignoring second decision for {} request", self.app_id);
            return;
        }
        let (code, uris) = match decision {
            FileDecision::Accept { uris, writable } => {
                self.allow_write = writable;
                (ResponseCode::Success, uris)
            }
            FileDecision::Cancel => (ResponseCode::Cancelled, Vec::new()),
            FileDecision::Dismiss => (ResponseCode::Other, Vec::new()),
        };
        self.response = Some(code);
        self.selected = uris.len();
        self.raw_uris = uris.into();
        self.state = State::Decided;
    }

    /// Pop the next URI still waiting for conversion.
    pub fn next_raw_uri(&mut self) -> Option<String> {
        let uri = self.raw_uris.pop_front()?;
        self.state = State::Converting;
        Some(uri)
    }

    pub fn push_converted(&mut self, uri: String) {
        self.uris.push(uri);
    }

    pub fn convert_target(&self) -> ConvertTarget {
        ConvertTarget {
            app_id: self.app_id.clone(),
            save: self.kind.is_save(),
            allow_write: self.allow_write,
        }
    }

    /// Settle the result code once the queue is drained: an accepted selection of which nothing
    /// could be converted is reported as `Other`. Nothing changes after this.
    fn finish(&mut self) {
        debug_assert!(self.raw_uris.is_empty());
        if self.response == Some(ResponseCode::Success) && self.selected > 0 && self.uris.is_empty()
        {
            self.response = Some(ResponseCode::Other);
        }
        self.state = State::Responded;
    }
}

/// Whether the request owning the other half of `closed` is still alive. Handles are random
/// and may be handed out again, so a task looks its request up by handle only after this.
///
/// Requests are dropped with the registry locked, so this must be asked under the same lock.
pub(crate) fn still_open(closed: &mut oneshot::Receiver<()>) -> bool {
    matches!(closed.try_recv(), Err(TryRecvError::Empty))
}

/// Drive the request registered under `handle` to completion.
///
/// Returns early, without emitting anything, as soon as the request is found to be closed.
pub(crate) async fn drive(
    portal: Arc<Portal>,
    sink: Arc<dyn ResponseSink>,
    handle: String,
    decision: oneshot::Receiver<FileDecision>,
    mut closed: oneshot::Receiver<()>,
) {
    let decision = tokio::select! {
        biased;
        _ = &mut closed => {
            log::debug!("file chooser {handle} closed before a decision");
            return;
        }
        decision = decision => decision.unwrap_or_else(|_| {
            log::warn!("file chooser {handle} went away without a decision");
            FileDecision::Dismiss
        }),
    };

    {
        let mut registry = portal.registry.lock().await;
        if !still_open(&mut closed) {
            log::debug!("file chooser {handle} closed after a decision");
            return;
        }
        let Some(request) = registry.file_request_mut(&handle) else {
            return;
        };
        request.decide(decision);
        log::debug!(
            "file chooser {handle} {:?} with {:?}",
            request.state(),
            request.response_code()
        );
    }

    loop {
        let step = {
            let mut registry = portal.registry.lock().await;
            let request = match registry.file_request_mut(&handle) {
                Some(request) if still_open(&mut closed) => request,
                _ => {
                    log::debug!("file chooser {handle} closed during conversion");
                    return;
                }
            };
            request
                .next_raw_uri()
                .map(|uri| (uri, request.convert_target()))
        };
        let Some((uri, target)) = step else {
            break;
        };

        let converted = documents::convert(
            portal.broker.as_ref(),
            portal.mount_point.as_deref(),
            &target,
            &uri,
        )
        .await;

        {
            let mut registry = portal.registry.lock().await;
            let request = match registry.file_request_mut(&handle) {
                Some(request) if still_open(&mut closed) => request,
                _ => {
                    log::debug!("file chooser {handle} closed during conversion");
                    return;
                }
            };
            match converted {
                Ok(converted) => request.push_converted(converted),
                Err(err) => log::warn!("Failed to convert {uri}: {err:#}"),
            }
        }

        // One URI per turn, other requests get to run in between
        tokio::task::yield_now().await;
    }

    let mut request = {
        let mut registry = portal.registry.lock().await;
        if !still_open(&mut closed) {
            return;
        }
        let Some(request) = registry.take_file_request(&handle) else {
            return;
        };
        request
    };
    request.finish();
    let response = Response::build(&handle, &request);
    log::debug!(
        "file chooser {} {:?} with {:?}",
        response.handle(),
        request.state(),
        request.response_code()
    );
    if let Err(err) = sink.emit(response).await {
        log::error!("failed to emit response for {handle}: {err}");
    }
}
