//! Host-side collaborators the dispatch core depends on.
//!
//! The core never talks to the platform directly. Contacts, permissions and
//! status display come in through these traits; location and messaging have
//! their own modules.

use std::sync::Arc;

use super::error::ContactStoreError;
use super::location::{LocationProvider, ReverseGeocoder};
use super::model::ContactList;
use super::transport::Transport;

/// Read-only access to the stored emergency contacts.
pub trait ContactStore: Send + Sync {
    fn contacts(&self) -> Result<ContactList, ContactStoreError>;
}

/// Runtime permission checks. Prompting is the host's job.
pub trait PermissionGate: Send + Sync {
    fn is_send_allowed(&self) -> bool;
    fn is_location_allowed(&self) -> bool;
}

/// One-way status display (foreground notification text).
pub trait StatusSink: Send + Sync {
    fn show(&self, text: &str);
}

/// Everything a dispatch session needs from the host.
#[derive(Clone)]
pub struct Collaborators {
    pub contacts: Arc<dyn ContactStore>,
    pub permissions: Arc<dyn PermissionGate>,
    pub location: Arc<dyn LocationProvider>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub transport: Arc<dyn Transport>,
    pub status: Arc<dyn StatusSink>,
}
