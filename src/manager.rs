//! One manager per ecosystem, owning the published inventory.

use crate::active::resolve_active;
use crate::brew::PackageManagerClient;
use crate::config::Config;
use crate::ecosystem::EcosystemLayout;
use crate::env_writer;
use crate::error::{DevswitchError, Result};
use crate::guard;
use crate::models::{Ecosystem, EcosystemInventory, InstalledVersion, RemoteCatalogEntry};
use crate::probe::{DiskProbe, FsProbe};
use crate::process::{CommandRunner, OutputEvent, OutputSink, SystemRunner};
use crate::scan;
use crate::uninstall;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Progress of the current install or uninstall
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum OperationState {
    #[default]
    Idle,
    Running {
        progress: Option<f64>,
    },
    Succeeded,
    Failed,
}

/// Everything observers see, always replaced as a whole
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSnapshot {
    pub inventory: EcosystemInventory,
    pub operation: OperationState,
}

#[derive(Clone)]
pub struct EcosystemManager {
    inner: Arc<Inner>,
}

struct Inner {
    layout: EcosystemLayout,
    probe: Arc<dyn FsProbe>,
    runner: Arc<dyn CommandRunner>,
    client: PackageManagerClient,
    state: watch::Sender<ManagerSnapshot>,
    next_ticket: AtomicU64,
    /// Ticket of the inventory currently published
    published_ticket: Mutex<u64>,
    busy: AtomicBool,
}

/// Clears the busy flag when an operation ends
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EcosystemManager {
    pub fn new(
        layout: EcosystemLayout,
        probe: Arc<dyn FsProbe>,
        runner: Arc<dyn CommandRunner>,
        client: PackageManagerClient,
    ) -> Self {
        let (state, _) = watch::channel(ManagerSnapshot {
            inventory: EcosystemInventory::empty(layout.ecosystem()),
            operation: OperationState::Idle,
        });

        Self {
            inner: Arc::new(Inner {
                layout,
                probe,
                runner,
                client,
                state,
                next_ticket: AtomicU64::new(1),
                published_ticket: Mutex::new(0),
                busy: AtomicBool::new(false),
            }),
        }
    }

    /// Manager backed by the real filesystem and processes
    pub fn from_config(ecosystem: Ecosystem, config: &Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let client = PackageManagerClient::new(runner.clone(), config.brew_command.clone());
        Self::new(
            EcosystemLayout::from_config(ecosystem, config),
            Arc::new(DiskProbe),
            runner,
            client,
        )
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.inner.layout.ecosystem()
    }

    pub fn layout(&self) -> &EcosystemLayout {
        &self.inner.layout
    }

    /// Receiver that sees every published snapshot
    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<ManagerSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ManagerSnapshot {
        self.inner.state.borrow().clone()
    }

    #[allow(dead_code)]
    pub fn installed_versions(&self) -> Vec<InstalledVersion> {
        self.inner.state.borrow().inventory.versions.clone()
    }

    pub fn active_version(&self) -> Option<InstalledVersion> {
        self.inner.state.borrow().inventory.active_version().cloned()
    }

    /// Start a rescan in the background; results are published when done
    #[allow(dead_code)]
    pub fn refresh(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.refresh_now().await })
    }

    /// Rescan and publish the inventory together with its active pointer
    pub async fn refresh_now(&self) {
        let inner = &self.inner;
        let ticket = self.claim_ticket();

        let versions =
            scan::scan_all(&inner.layout, inner.probe.as_ref(), inner.runner.as_ref()).await;
        let fragment = &inner.layout.fragment_path;
        let active = resolve_active(inner.probe.as_ref(), fragment, &versions).map(|v| v.id);

        let inventory = EcosystemInventory {
            ecosystem: inner.layout.ecosystem(),
            versions,
            active,
            refreshed_at: Some(Utc::now()),
        };

        if !self.publish_inventory(ticket, inventory) {
            debug!("Discarding stale {} refresh", self.ecosystem());
        }
    }

    /// Write the environment fragment for `version` and mark it active
    pub async fn set_active(&self, version: &InstalledVersion) -> Result<()> {
        let Some(version) = self.current_entry(version) else {
            return Err(DevswitchError::VersionNotFound(version.version.clone()));
        };

        let descriptor = self.inner.layout.descriptor;
        let fragment_path = self.inner.layout.fragment_path.clone();
        let install_root = version.install_root.clone();
        let path_for_error = fragment_path.clone();

        tokio::task::spawn_blocking(move || {
            env_writer::write(descriptor, &fragment_path, &install_root)
        })
        .await
        .map_err(|e| DevswitchError::EnvironmentWrite {
            path: path_for_error,
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })??;

        info!("{} now uses {}", self.ecosystem(), version.version);

        let ticket = self.claim_ticket();
        let mut inventory = self.inner.state.borrow().inventory.clone();
        inventory.active = Some(version.id);
        self.publish_inventory(ticket, inventory);
        Ok(())
    }

    /// Entries unknown to the current inventory are never removable
    pub fn can_uninstall(&self, version: &InstalledVersion) -> bool {
        let state = self.inner.state.borrow();
        let inventory = &state.inventory;
        inventory.current_entry(version).is_some_and(|current| {
            guard::can_uninstall(&self.inner.layout, current, inventory.active_version())
        })
    }

    /// Remove an installation; the inventory is rescanned on success
    pub async fn uninstall(&self, version: &InstalledVersion, sink: &OutputSink) -> bool {
        let Some(_busy) = self.try_begin(sink) else {
            return false;
        };

        let Some(candidate) = self.current_entry(version) else {
            sink.line(format!(
                "{} is no longer installed; refresh and try again",
                version.install_root.display()
            ));
            self.set_operation(OperationState::Failed);
            return false;
        };

        let active = self.active_version();
        let inner = self.inner.clone();
        let succeeded = self
            .run_operation(sink, move |forward| async move {
                uninstall::execute(
                    &inner.layout,
                    &inner.client,
                    &candidate,
                    active.as_ref(),
                    &forward,
                )
                .await
            })
            .await;

        if succeeded {
            self.refresh_now().await;
        }
        succeeded
    }

    /// Install a formula through the package manager
    pub async fn install(&self, identifier: &str, sink: &OutputSink) -> bool {
        let Some(_busy) = self.try_begin(sink) else {
            return false;
        };

        let inner = self.inner.clone();
        let identifier = identifier.to_string();
        let succeeded = self
            .run_operation(sink, move |forward| async move {
                inner.client.install(&identifier, &forward).await
            })
            .await;

        if succeeded {
            self.refresh_now().await;
        }
        succeeded
    }

    /// Formulae the package manager offers for this ecosystem
    pub async fn remote_catalog(&self) -> Vec<RemoteCatalogEntry> {
        let client = &self.inner.client;
        let identifiers = client.search(self.inner.layout.descriptor).await;
        let info = client.batch_info(&identifiers).await;

        identifiers
            .into_iter()
            .filter_map(|identifier| {
                let details = info.get(&identifier)?;
                Some(RemoteCatalogEntry {
                    ecosystem: self.ecosystem(),
                    resolved_version: details.resolved_version.clone(),
                    is_installed: details.is_installed,
                    formula_identifier: identifier,
                })
            })
            .collect()
    }

    /// The published entry for `version`, matched by id or install root
    fn current_entry(&self, version: &InstalledVersion) -> Option<InstalledVersion> {
        self.inner
            .state
            .borrow()
            .inventory
            .current_entry(version)
            .cloned()
    }

    fn claim_ticket(&self) -> u64 {
        self.inner.next_ticket.fetch_add(1, Ordering::AcqRel)
    }

    /// Publish `inventory` unless a newer ticket already has been
    fn publish_inventory(&self, ticket: u64, inventory: EcosystemInventory) -> bool {
        let mut published = match self.inner.published_ticket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if ticket < *published {
            return false;
        }
        *published = ticket;
        self.inner.state.send_modify(|snapshot| snapshot.inventory = inventory);
        true
    }

    fn set_operation(&self, operation: OperationState) {
        self.inner.state.send_if_modified(|snapshot| {
            let changed = snapshot.operation != operation;
            snapshot.operation = operation;
            changed
        });
    }

    fn try_begin(&self, sink: &OutputSink) -> Option<BusyGuard<'_>> {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            sink.line(DevswitchError::OperationInProgress(self.ecosystem()).to_string());
            return None;
        }
        Some(BusyGuard(&self.inner.busy))
    }

    /// Run `operation` with its output mirrored into the caller's sink and
    /// its progress published in the snapshot.
    async fn run_operation<F, Fut>(&self, sink: &OutputSink, operation: F) -> bool
    where
        F: FnOnce(OutputSink) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        self.set_operation(OperationState::Running { progress: None });

        let (forward, mut events) = OutputSink::channel();
        let relay = {
            let manager = self.clone();
            let sink = sink.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match &event {
                        OutputEvent::Progress(percent) => {
                            manager.set_operation(OperationState::Running {
                                progress: Some(*percent),
                            });
                            sink.progress(*percent);
                        }
                        OutputEvent::Line(line) => sink.line(line.clone()),
                    }
                }
            })
        };

        let succeeded = operation(forward).await;
        if let Err(e) = relay.await {
            debug!("Output relay ended abnormally: {}", e);
        }

        self.set_operation(if succeeded {
            OperationState::Succeeded
        } else {
            OperationState::Failed
        });
        succeeded
    }
}
