//! Bug workflow: store access plus notification rules
//!
//! Both the HTTP API and the CLI go through `BugService`, so the rules for
//! when developers get emailed live in exactly one place.

use crate::notify::{Notification, Notifier};
use crate::store::BugUpdate;
use crate::{Bug, BugChanges, Developer, Error, NewBug, NewDeveloper, Result, Store};
use std::sync::Arc;

/// Which email an update calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Assignment,
    StatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Assignment => "assignment",
            NotificationKind::StatusChanged => "status_changed",
        }
    }
}

/// What happened to the notification of one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The update did not call for an email
    None,
    Sent(NotificationKind),
    /// Delivery failed; the update itself is committed
    Failed(NotificationKind, String),
}

impl NotificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationOutcome::None => "none",
            NotificationOutcome::Sent(_) => "sent",
            NotificationOutcome::Failed(..) => "failed",
        }
    }
}

/// Result of a bug update
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub bug: Bug,
    pub notification: NotificationOutcome,
}

/// Decide which notification, if any, an update calls for.
///
/// A new assignee takes precedence over a status change, and at most one
/// message is produced. When the developer changed, the status rule is not
/// consulted even if the new developer has no usable address.
pub fn plan_notification(before: &Bug, after: &Bug) -> Option<(NotificationKind, Notification)> {
    let reassigned = after.developer_id.is_some() && after.developer_id != before.developer_id;
    if reassigned {
        return Notification::assignment(after).map(|n| (NotificationKind::Assignment, n));
    }
    if after.status != before.status {
        return Notification::status_changed(after).map(|n| (NotificationKind::StatusChanged, n));
    }
    None
}

/// Bug and developer operations with notification side effects
#[derive(Clone)]
pub struct BugService {
    store: Arc<Store>,
    notifier: Arc<dyn Notifier>,
    notifications_enabled: bool,
}

impl BugService {
    pub fn new(store: Arc<Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            notifications_enabled: true,
        }
    }

    /// Turn update notifications on or off. The test email is unaffected.
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    pub fn list_bugs(&self) -> Result<Vec<Bug>> {
        self.store.list_bugs()
    }

    pub fn get_bug(&self, id: i64) -> Result<Bug> {
        self.store.get_bug(id)?.ok_or(Error::BugNotFound(id))
    }

    pub fn create_bug(&self, new: &NewBug) -> Result<Bug> {
        let bug = self.store.create_bug(new)?;
        tracing::info!(bug_id = bug.id, title = %bug.title, "created bug");
        Ok(bug)
    }

    /// Update a bug, then email the developer if the change calls for it.
    ///
    /// The write is committed before any send is attempted. A failed send is
    /// logged and reported in the outcome; it never fails the update.
    pub async fn update_bug(&self, id: i64, changes: &BugChanges) -> Result<UpdateOutcome> {
        let BugUpdate { before, after } = self.store.update_bug(id, changes)?;
        tracing::info!(bug_id = id, status = %after.status, "updated bug");

        let notification = match plan_notification(&before, &after) {
            Some((kind, message)) if self.notifications_enabled => {
                self.deliver(id, kind, &message).await
            }
            Some((kind, _)) => {
                tracing::debug!(bug_id = id, kind = kind.as_str(), "notifications disabled");
                NotificationOutcome::None
            }
            None => NotificationOutcome::None,
        };

        Ok(UpdateOutcome {
            bug: after,
            notification,
        })
    }

    async fn deliver(
        &self,
        bug_id: i64,
        kind: NotificationKind,
        message: &Notification,
    ) -> NotificationOutcome {
        match self.notifier.send(message).await {
            Ok(()) => {
                tracing::info!(bug_id, to = %message.to, kind = kind.as_str(), "notification sent");
                NotificationOutcome::Sent(kind)
            }
            Err(e) => {
                tracing::warn!(
                    bug_id,
                    to = %message.to,
                    kind = kind.as_str(),
                    error = %e,
                    "notification failed"
                );
                NotificationOutcome::Failed(kind, e.to_string())
            }
        }
    }

    /// Delete a bug. Deleting an id that does not exist is `BugNotFound`.
    pub fn delete_bug(&self, id: i64) -> Result<()> {
        if !self.store.delete_bug(id)? {
            return Err(Error::BugNotFound(id));
        }
        tracing::info!(bug_id = id, "deleted bug");
        Ok(())
    }

    pub fn list_developers(&self) -> Result<Vec<Developer>> {
        self.store.list_developers()
    }

    pub fn create_developer(&self, new: &NewDeveloper) -> Result<Developer> {
        let developer = self.store.create_developer(new)?;
        tracing::info!(developer_id = developer.id, name = %developer.name, "created developer");
        Ok(developer)
    }

    /// Send the diagnostic email. Unlike update notifications, failures are
    /// returned to the caller.
    pub async fn send_test_email(&self, recipient: &str) -> Result<()> {
        if recipient.trim().is_empty() {
            return Err(Error::Config("no test recipient configured".into()));
        }
        self.notifier.send(&Notification::test(recipient.trim())).await
    }
}
