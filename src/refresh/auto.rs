//! Identity polling. A downgrade to the free tier invalidates the VIP links
//! on display, so it forces a catalog refresh.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SessionCore;
use crate::catalog::UserRecord;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running poller. Dropping the handle cancels it.
pub(crate) struct AutoRefreshHandle {
    identity: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AutoRefreshHandle {
    pub(crate) fn spawn(core: Arc<SessionCore>, identity: String, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            core,
            identity.clone(),
            interval,
            cancel.clone(),
        ));
        Self {
            identity,
            cancel,
            task: Some(task),
        }
    }

    pub(crate) fn identity(&self) -> &str {
        &self.identity
    }

    /// Cancel and wait for the loop to exit, giving up after a few seconds.
    /// A refresh already in flight is left to finish on its own.
    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        match tokio::time::timeout(STOP_TIMEOUT, task).await {
            Ok(Ok(())) => debug!(identity = %self.identity, "Auto-refresh poller exited"),
            Ok(Err(e)) => warn!(error = ?e, "Auto-refresh poller panicked"),
            Err(_) => warn!(
                identity = %self.identity,
                "Auto-refresh poller did not exit within {STOP_TIMEOUT:?}"
            ),
        }
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    core: Arc<SessionCore>,
    identity: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut previous = core.load_user().await;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }

        let response = tokio::select! {
            r = core.source.poll_identity(&identity) => r,
            _ = cancel.cancelled() => break,
        };

        let record = match response {
            Ok(response) => match response.refreshed_record() {
                Some(record) => record,
                None => continue,
            },
            Err(e) => {
                warn!(identity = %identity, error = %e, "Identity poll failed");
                continue;
            }
        };

        core.store_user(&record).await;
        if should_force_refresh(previous.as_ref(), &record) {
            info!(
                identity = %identity,
                from = ?previous.as_ref().map(UserRecord::package),
                to = record.package(),
                "Account dropped to free tier, refreshing catalog"
            );
            if let Err(e) = core.refresh().await {
                debug!(error = %e, "Forced refresh failed");
            }
        }
        previous = Some(record);
    }

    debug!(identity = %identity, "Auto-refresh poller stopping");
}

/// With no earlier record the account counts as having had no package, so a
/// first observation of the free tier still forces a refresh.
fn should_force_refresh(previous: Option<&UserRecord>, current: &UserRecord) -> bool {
    match previous {
        Some(prev) => current.downgraded_from(prev),
        None => current.downgraded_from(&UserRecord::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(package: Option<&str>) -> UserRecord {
        UserRecord {
            email: "a@b.c".to_owned(),
            package_type: package.map(str::to_owned),
            account_type: None,
            vip_expiry: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn forces_only_on_change_to_free() {
        let vip = user(Some("vip"));
        let free = user(Some("free"));

        assert!(should_force_refresh(Some(&vip), &free));
        assert!(!should_force_refresh(Some(&free), &free));
        assert!(!should_force_refresh(Some(&free), &vip));
        assert!(!should_force_refresh(Some(&vip), &vip));
    }

    #[test]
    fn first_observation_of_free_forces() {
        assert!(should_force_refresh(None, &user(Some("free"))));
        assert!(!should_force_refresh(None, &user(Some("vip"))));
        assert!(!should_force_refresh(None, &user(None)));
    }

    #[test]
    fn missing_package_to_free_counts_as_change() {
        assert!(should_force_refresh(Some(&user(None)), &user(Some("free"))));
    }
}
