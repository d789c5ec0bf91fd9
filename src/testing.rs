// SPDX-License-Identifier: GPL-3.0-only

//! In-process stand-ins for the dialog program, the document portal and the bus.

use std::{
    os::fd::OwnedFd,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::sync::{Notify, mpsc, oneshot};

use crate::{
    app_chooser::AppRequest,
    config::Config,
    dialog::{AppPrompt, Dialog, DialogGuard, FileDecision, FileDialog, Frontend},
    documents::{DocumentBroker, Permission},
    portal::Portal,
    request::{ChooserKind, FileRequest},
    response::{Response, ResponseSink},
};

pub const SENDER: &str = ":1.42";
pub const MOUNT_POINT: &str = "/run/doc";

pub fn file_request(app_id: &str, kind: ChooserKind) -> FileRequest {
    let (closed, _) = oneshot::channel();
    FileRequest::new(app_id, SENDER, kind, DialogGuard::new(|| {}), closed)
}

pub fn app_request(app_id: &str) -> AppRequest {
    let (closed, _) = oneshot::channel();
    AppRequest::new(
        app_id,
        SENDER,
        "https://example.org",
        DialogGuard::new(|| {}),
        closed,
    )
}

pub fn portal(frontend: Arc<FakeFrontend>, broker: Arc<FakeBroker>) -> Arc<Portal> {
    Portal::new(
        broker,
        frontend,
        Some(PathBuf::from(MOUNT_POINT)),
        Config::default(),
    )
}

#[derive(Default)]
pub struct FakeFrontend {
    fail: AtomicBool,
    released: Arc<AtomicUsize>,
    dialogs: Mutex<Vec<FileDialog>>,
    decisions: Mutex<Vec<Option<oneshot::Sender<FileDecision>>>>,
}

impl FakeFrontend {
    pub fn failing() -> Self {
        let frontend = Self::default();
        frontend.fail.store(true, Ordering::SeqCst);
        frontend
    }

    /// A guard counted in [`FakeFrontend::released`].
    pub fn guard(&self) -> DialogGuard {
        let released = self.released.clone();
        DialogGuard::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn dialogs(&self) -> Vec<FileDialog> {
        self.dialogs.lock().unwrap().clone()
    }

    /// Answer the `index`th file dialog. Returns whether anyone was still listening.
    pub fn decide(&self, index: usize, decision: FileDecision) -> bool {
        let sender = self.decisions.lock().unwrap()[index].take();
        sender.is_some_and(|sender| sender.send(decision).is_ok())
    }

    /// Go away without answering the `index`th file dialog.
    pub fn abandon(&self, index: usize) {
        self.decisions.lock().unwrap()[index].take();
    }
}

impl Frontend for FakeFrontend {
    fn open_file_dialog(&self, dialog: FileDialog) -> anyhow::Result<Dialog<FileDecision>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("no display");
        }
        let (tx, rx) = oneshot::channel();
        self.dialogs.lock().unwrap().push(dialog);
        self.decisions.lock().unwrap().push(Some(tx));
        Ok(Dialog {
            decision: rx,
            guard: self.guard(),
        })
    }

    fn choose_application(&self, _prompt: AppPrompt) -> anyhow::Result<Dialog<Option<String>>> {
        // Nobody picks anything
        let (_, rx) = oneshot::channel();
        Ok(Dialog {
            decision: rx,
            guard: self.guard(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Add,
    AddNamed(String),
    Grant {
        doc_id: String,
        app_id: String,
        permissions: Vec<Permission>,
    },
}

#[derive(Default)]
pub struct FakeBroker {
    fail_at: Option<usize>,
    gate: Option<Arc<Notify>>,
    added: AtomicUsize,
    calls: Mutex<Vec<BrokerCall>>,
}

impl FakeBroker {
    /// A broker refusing the `n`th document added to it, counting from zero.
    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Default::default()
        }
    }

    /// A broker holding every add until the returned gate is notified once for it.
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let broker = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (broker, gate)
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_doc(&self, call: BrokerCall) -> zbus::Result<String> {
        let n = self.added.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(n) {
            return Err(zbus::Error::Failure("refused".to_string()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(format!("doc{n}"))
    }
}

impl DocumentBroker for FakeBroker {
    fn add<'a>(&'a self, _fd: OwnedFd) -> BoxFuture<'a, zbus::Result<String>> {
        Box::pin(async move {
            self.wait_for_gate().await;
            self.next_doc(BrokerCall::Add)
        })
    }

    fn add_named<'a>(
        &'a self,
        _parent_fd: OwnedFd,
        filename: &'a [u8],
    ) -> BoxFuture<'a, zbus::Result<String>> {
        Box::pin(async move {
            self.wait_for_gate().await;
            let name = String::from_utf8_lossy(filename).into_owned();
            self.next_doc(BrokerCall::AddNamed(name))
        })
    }

    fn grant_permissions<'a>(
        &'a self,
        doc_id: &'a str,
        app_id: &'a str,
        permissions: &'a [Permission],
    ) -> BoxFuture<'a, zbus::Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(BrokerCall::Grant {
                doc_id: doc_id.to_string(),
                app_id: app_id.to_string(),
                permissions: permissions.to_vec(),
            });
            Ok(())
        })
    }
}

/// Hands emitted responses to the test.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<Response>,
}

impl RecordingSink {
    pub fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<Response>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ResponseSink for RecordingSink {
    fn emit(&self, response: Response) -> BoxFuture<'_, zbus::Result<()>> {
        log::debug!("recorded response for {}", response.handle());
        let sent = self.tx.send(response);
        Box::pin(async move {
            sent.map_err(|_| zbus::Error::Failure("receiver gone".to_string()))
        })
    }
}
