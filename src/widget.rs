use std::fmt;
use std::sync::Arc;

use log::{debug, error};

use crate::store::{Store, IS_SUBSCRIBED_KEY, SUBSCRIBED_VALUE};
use crate::{Client, SubscriptionError};

pub const SUBSCRIBE_LABEL: &str = "구독하기";
pub const UNSUBSCRIBE_LABEL: &str = "구독 취소하기";
pub const SUBSCRIBED_STATUS: &str = "구독 중입니다.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribed,
    #[default]
    Unsubscribed,
}

impl SubscriptionState {
    pub fn from_flag(is_subscribed: bool) -> Self {
        if is_subscribed {
            SubscriptionState::Subscribed
        } else {
            SubscriptionState::Unsubscribed
        }
    }

    pub fn is_subscribed(self) -> bool {
        self == SubscriptionState::Subscribed
    }
}

/// Decides which source the widget trusts for the displayed value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Mount flips the server flag and then displays whatever the session store
    /// holds; a click displays the inverse of what the server returned. The
    /// store and the server can drift apart under this policy.
    #[default]
    Legacy,
    /// Opt-in: mount reads the server flag, a click asks the server for an
    /// explicit value, and the store is rewritten to the server's answer after
    /// every call.
    ServerAuthoritative,
}

/// Rendered output, derived only from the displayed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct View {
    pub button_label: &'static str,
    pub status_line: Option<&'static str>,
}

impl View {
    pub fn of(state: SubscriptionState) -> Self {
        match state {
            SubscriptionState::Subscribed => View {
                button_label: UNSUBSCRIBE_LABEL,
                status_line: Some(SUBSCRIBED_STATUS),
            },
            SubscriptionState::Unsubscribed => View {
                button_label: SUBSCRIBE_LABEL,
                status_line: None,
            },
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status_line {
            writeln!(f, "{}", status)?;
        }
        write!(f, "[{}]", self.button_label)
    }
}

/// The subscription button. Network and store failures are logged and
/// swallowed: the widget keeps showing its previous state.
pub struct Widget {
    pub(crate) client: Client,
    store: Arc<dyn Store + Send + Sync>,
    policy: SyncPolicy,
    state: SubscriptionState,
}

impl Widget {
    pub fn new(client: Client, store: Arc<dyn Store + Send + Sync>) -> Self {
        Self {
            client,
            store,
            policy: SyncPolicy::default(),
            state: SubscriptionState::default(),
        }
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn render(&self) -> View {
        View::of(self.state)
    }

    pub async fn mount(&mut self) -> SubscriptionState {
        let result = match self.policy {
            SyncPolicy::Legacy => self.mount_legacy().await,
            SyncPolicy::ServerAuthoritative => self.mount_from_server().await,
        };
        self.apply("mount", result)
    }

    pub async fn handle_subscribe(&mut self) -> SubscriptionState {
        let result = match self.policy {
            SyncPolicy::Legacy => self.subscribe_legacy().await,
            SyncPolicy::ServerAuthoritative => self.subscribe_from_server().await,
        };
        self.apply("subscribe", result)
    }

    fn apply(
        &mut self,
        transition: &str,
        result: Result<SubscriptionState, SubscriptionError>,
    ) -> SubscriptionState {
        match result {
            Ok(state) => {
                debug!("Widget {} settled on {:?}", transition, state);
                self.state = state;
            }
            Err(e) => error!("Widget {} failed: {}", transition, e),
        }
        self.state
    }

    async fn mount_legacy(&self) -> Result<SubscriptionState, SubscriptionError> {
        // Only the stored value is displayed; the response is ignored.
        self.client.toggle().await?;
        Ok(SubscriptionState::from_flag(self.stored_flag().await))
    }

    async fn subscribe_legacy(&self) -> Result<SubscriptionState, SubscriptionError> {
        let was_subscribed = self.client.toggle().await?;
        if was_subscribed {
            self.store
                .remove_item(IS_SUBSCRIBED_KEY)
                .await
                .map_err(|e| SubscriptionError::StoreError(e.to_string()))?;
        } else {
            self.store
                .set_item(IS_SUBSCRIBED_KEY, SUBSCRIBED_VALUE)
                .await
                .map_err(|e| SubscriptionError::StoreError(e.to_string()))?;
        }
        Ok(SubscriptionState::from_flag(!was_subscribed))
    }

    async fn mount_from_server(&self) -> Result<SubscriptionState, SubscriptionError> {
        let is_subscribed = self.client.status().await?;
        self.reconcile(is_subscribed).await
    }

    async fn subscribe_from_server(&self) -> Result<SubscriptionState, SubscriptionError> {
        let is_subscribed = self.client.set(!self.state.is_subscribed()).await?;
        self.reconcile(is_subscribed).await
    }

    async fn reconcile(&self, is_subscribed: bool) -> Result<SubscriptionState, SubscriptionError> {
        let written = if is_subscribed {
            self.store.set_item(IS_SUBSCRIBED_KEY, SUBSCRIBED_VALUE).await
        } else {
            self.store.remove_item(IS_SUBSCRIBED_KEY).await
        };
        written.map_err(|e| SubscriptionError::StoreError(e.to_string()))?;
        Ok(SubscriptionState::from_flag(is_subscribed))
    }

    async fn stored_flag(&self) -> bool {
        match self.store.get_item(IS_SUBSCRIBED_KEY).await {
            Ok(value) => value.as_deref() == Some(SUBSCRIBED_VALUE),
            Err(e) => {
                error!("Failed to read {} from session store: {}", IS_SUBSCRIBED_KEY, e);
                false
            }
        }
    }
}
