//! Deploy and check commands

use hk_core::traits::{PlaybookOptions, RunMode};
use hk_core::Result;

use super::{Context, Outcome, Services};
use crate::output::print_info;

/// Run the project playbook and hand back the engine's exit code verbatim
pub async fn run(ctx: &Context<'_>, services: &Services, mode: RunMode) -> Result<Outcome> {
    let project = ctx.project()?;

    let limit = if ctx.request.all {
        None
    } else {
        Some(ctx.host()?.name.clone())
    };
    let options = PlaybookOptions {
        mode,
        limit,
        tags: ctx.request.tags.clone(),
    };

    tracing::info!(
        "Running playbook of '{}' ({:?}, limit {:?})",
        project.name(),
        options.mode,
        options.limit
    );
    if mode == RunMode::Check {
        print_info("Dry run: no changes will be made");
    }

    let code = services.engine.run_playbook(project, &options).await?;
    Ok(Outcome::Exit(code))
}
