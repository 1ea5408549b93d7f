//! Self-upgrade command

use hk_core::{self_upgrade, Result, UpgradeOutcome};

use super::{Context, Outcome, Services};
use crate::output::print_success;

/// Execute the self-upgrade command against the running executable
pub async fn run(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let exe = std::env::current_exe()?;
    let outcome = self_upgrade(
        ctx.settings,
        services.source.as_ref(),
        services.confirm.as_ref(),
        services.replacer.as_ref(),
        &exe,
    )
    .await?;

    match outcome {
        UpgradeOutcome::UpToDate(current) => print_success(&format!(
            "hostkeeper {} ({}) is already up to date",
            current.version, current.commit
        )),
        UpgradeOutcome::Upgraded { from, to } => print_success(&format!(
            "Upgraded hostkeeper {} ({}) -> {} ({})",
            from.version, from.commit, to.version, to.commit
        )),
    }
    Ok(Outcome::Done)
}

#[cfg(test)]
mod tests {
    use super::super::fakes::Harness;
    use super::super::{Action, Request};
    use hk_core::HkError;

    #[tokio::test]
    async fn test_declined_upgrade_changes_nothing() {
        let h = Harness::new();
        let err = h.run(Request::new(Action::SelfUpgrade)).await.unwrap_err();
        assert!(matches!(err, HkError::UpgradeAborted));
        assert_eq!(*h.replacer.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_confirmed_upgrade_replaces() {
        let mut h = Harness::new();
        h.answer = "YES";
        h.run(Request::new(Action::SelfUpgrade)).await.unwrap();
        assert_eq!(*h.replacer.calls.lock().unwrap(), 1);
    }
}
