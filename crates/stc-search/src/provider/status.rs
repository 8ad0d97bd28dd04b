use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    #[default]
    NotSetup,
    NotChecked,
    Checking,
    Failed,
    Succeeded,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderStatus::NotSetup => "not set up",
            ProviderStatus::NotChecked => "not checked",
            ProviderStatus::Checking => "checking",
            ProviderStatus::Failed => "failed",
            ProviderStatus::Succeeded => "succeeded",
        };
        f.write_str(label)
    }
}

/// Observable status of one provider plus the reason of its last failure.
pub(crate) struct Health {
    status: watch::Sender<ProviderStatus>,
    failure: Mutex<Option<String>>,
}

impl Health {
    pub(crate) fn new() -> Self {
        let (status, _) = watch::channel(ProviderStatus::NotSetup);
        Self { status, failure: Mutex::new(None) }
    }

    pub(crate) fn status(&self) -> ProviderStatus {
        *self.status.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ProviderStatus> {
        self.status.subscribe()
    }

    pub(crate) fn set(&self, status: ProviderStatus) {
        self.status.send_replace(status);
    }

    pub(crate) fn succeed(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.set(ProviderStatus::Succeeded);
    }

    pub(crate) fn fail(&self, reason: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
        self.set(ProviderStatus::Failed);
    }

    pub(crate) fn failure_reason(&self) -> Option<String> {
        self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
