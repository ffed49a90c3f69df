//! Account/session gate consulted before anything is recorded.

use std::sync::Arc;

use anyhow::Result;
use log::warn;

use crate::settings::{AccountSettings, SettingsStore};

#[derive(Clone)]
pub struct Account {
    settings: Arc<SettingsStore>,
}

impl Account {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }

    pub fn is_active(&self) -> bool {
        let account = self.settings.account();
        account.authenticated && account.subscription_active
    }

    pub fn state(&self) -> AccountSettings {
        self.settings.account()
    }

    pub fn set_state(&self, state: AccountSettings) -> Result<()> {
        self.settings.update_account(state)
    }

    /// The remote API rejected our credentials.
    pub fn mark_unauthenticated(&self) -> Result<()> {
        warn!("Account marked unauthenticated; tracking paused until re-authentication");
        let mut state = self.settings.account();
        state.authenticated = false;
        self.settings.update_account(state)
    }

    /// The remote API reported that the subscription lapsed.
    pub fn mark_subscription_inactive(&self) -> Result<()> {
        warn!("Subscription reported inactive; tracking paused");
        let mut state = self.settings.account();
        state.subscription_active = false;
        self.settings.update_account(state)
    }
}
