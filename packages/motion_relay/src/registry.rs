//! Named capture sources with one active at a time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::SwitchError;
use crate::receiver::Receiver;

/// Holds every registered [`Receiver`] and tracks which one is active.
///
/// Receivers are registered up front by the composition root; afterwards
/// the registry is shared behind an `Arc`. Switches are serialized: a
/// second `switch_to` waits for the first to finish.
pub struct ReceiverRegistry {
    receivers: HashMap<String, Arc<dyn Receiver>>,
    /// Read from request handlers; never held across an await
    active: RwLock<Option<String>>,
    switching: Mutex<()>,
}

impl Default for ReceiverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self {
            receivers: HashMap::new(),
            active: RwLock::new(None),
            switching: Mutex::new(()),
        }
    }

    /// Add a receiver. The first one registered becomes the active receiver
    /// (not started until [`start_active`](Self::start_active) or a switch).
    pub fn register(&mut self, name: impl Into<String>, receiver: Arc<dyn Receiver>) {
        let name = name.into();
        if self.active_name().is_none() {
            self.set_active(Some(name.clone()));
        }
        if self.receivers.insert(name.clone(), receiver).is_some() {
            warn!("Replaced receiver \"{}\"", name);
        }
    }

    /// Registered receiver names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.receivers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn active_name(&self) -> Option<String> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Receiver>> {
        self.receivers.get(name).cloned()
    }

    pub fn active(&self) -> Option<Arc<dyn Receiver>> {
        self.active_name().and_then(|name| self.get(&name))
    }

    fn set_active(&self, name: Option<String>) {
        match self.active.write() {
            Ok(mut guard) => *guard = name,
            Err(poisoned) => *poisoned.into_inner() = name,
        }
    }

    /// Make `name` the running receiver.
    ///
    /// The current receiver is stopped (and its socket released) before the
    /// new one starts, so two receivers are never bound at once. An unknown
    /// name changes nothing. If the new receiver fails to start, the previous
    /// one is started again and stays active.
    pub async fn switch_to(&self, name: &str) -> Result<(), SwitchError> {
        let _switching = self.switching.lock().await;

        let next = self
            .get(name)
            .ok_or_else(|| SwitchError::UnknownReceiver(name.to_string()))?;
        let previous = self.active_name();

        if previous.as_deref() == Some(name) {
            return next
                .start()
                .await
                .map_err(|source| SwitchError::StartFailed {
                    name: name.to_string(),
                    restored: false,
                    source,
                });
        }

        let previous = previous.and_then(|p| self.get(&p).map(|r| (p, r)));
        if let Some((prev_name, prev)) = &previous {
            prev.stop()
                .await
                .map_err(|source| SwitchError::StopFailed {
                    name: prev_name.clone(),
                    source,
                })?;
        }

        self.set_active(Some(name.to_string()));
        if let Err(source) = next.start().await {
            warn!("Receiver \"{}\" failed to start: {}", name, source);
            let restored = match previous {
                Some((prev_name, prev)) => match prev.start().await {
                    Ok(()) => {
                        self.set_active(Some(prev_name));
                        true
                    }
                    Err(e) => {
                        error!("Previous receiver \"{}\" failed to restart: {}", prev_name, e);
                        false
                    }
                },
                None => false,
            };
            return Err(SwitchError::StartFailed {
                name: name.to_string(),
                restored,
                source,
            });
        }

        info!("Switched active receiver to \"{}\"", name);
        Ok(())
    }

    /// Start whichever receiver is active
    pub async fn start_active(&self) -> Result<(), SwitchError> {
        let _switching = self.switching.lock().await;
        let Some(name) = self.active_name() else {
            return Ok(());
        };
        let receiver = self
            .get(&name)
            .ok_or_else(|| SwitchError::UnknownReceiver(name.clone()))?;
        receiver
            .start()
            .await
            .map_err(|source| SwitchError::StartFailed {
                name,
                restored: false,
                source,
            })
    }

    /// Stop the active receiver; it stays active for a later start
    pub async fn stop_active(&self) -> Result<(), SwitchError> {
        let _switching = self.switching.lock().await;
        let Some(name) = self.active_name() else {
            return Ok(());
        };
        match self.get(&name) {
            Some(receiver) => receiver
                .stop()
                .await
                .map_err(|source| SwitchError::StopFailed { name, source }),
            None => Ok(()),
        }
    }
}
