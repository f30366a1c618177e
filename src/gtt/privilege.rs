use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use super::host::HostEngine;
use crate::core::Result;

/// Runs host calls as the superuser for as long as it lives.
///
/// The previous role comes back on drop, whichever way the scope is left.
/// Entering as a superuser changes nothing.
pub struct ElevatedRights<'h> {
    host: &'h mut (dyn HostEngine + 'h),
    saved_role: Option<String>,
}

impl<'h> ElevatedRights<'h> {
    pub fn enter(host: &'h mut (dyn HostEngine + 'h)) -> Result<Self> {
        let saved_role = if host.is_superuser() {
            None
        } else {
            let previous = host.current_role();
            let superuser = host.superuser_role();
            host.set_current_role(&superuser)?;
            debug!(from = %previous, to = %superuser, "rights elevated");
            Some(previous)
        };
        Ok(Self { host, saved_role })
    }

    /// The role in effect before elevation.
    pub fn original_role(&self) -> String {
        match &self.saved_role {
            Some(role) => role.clone(),
            None => self.host.current_role(),
        }
    }
}

impl<'h> Deref for ElevatedRights<'h> {
    type Target = dyn HostEngine + 'h;

    fn deref(&self) -> &Self::Target {
        &*self.host
    }
}

impl<'h> DerefMut for ElevatedRights<'h> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.host
    }
}

impl Drop for ElevatedRights<'_> {
    fn drop(&mut self) {
        if let Some(role) = self.saved_role.take() {
            match self.host.set_current_role(&role) {
                Ok(()) => debug!(role = %role, "rights restored"),
                Err(err) => warn!(role = %role, error = %err, "failed to restore role"),
            }
        }
    }
}
