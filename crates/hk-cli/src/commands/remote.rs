//! Commands that reach a managed host over SSH

use hk_core::remote::{
    backup_destination, connection_params, log_viewer_command, ls_command, REMOTE_BACKUP_PATH,
};
use hk_core::traits::Connection;
use hk_core::Result;

use super::{Context, Outcome, Services};
use crate::output::{print_info, print_success};

async fn connect(ctx: &Context<'_>, services: &Services) -> Result<Connection> {
    let conn = connection_params(services.engine.as_ref(), ctx.project()?, &ctx.host()?.name).await?;
    print_info(&format!("Connecting to {}", conn));
    Ok(conn)
}

/// Execute the shell command
pub async fn shell(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let conn = connect(ctx, services).await?;
    services.transport.shell(&conn, None).await?;
    Ok(Outcome::Done)
}

/// Execute the logs command
pub async fn logs(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let conn = connect(ctx, services).await?;
    services
        .transport
        .shell(&conn, Some(&log_viewer_command()))
        .await?;
    Ok(Outcome::Done)
}

/// Execute the ls command
pub async fn ls(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let conn = connect(ctx, services).await?;
    services
        .transport
        .shell(&conn, Some(&ls_command(&ctx.request.path)))
        .await?;
    Ok(Outcome::Done)
}

/// Execute the fetch-backups command
pub async fn fetch_backups(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let project = ctx.project()?;
    let host = ctx.host()?;
    let conn = connect(ctx, services).await?;

    let dest = backup_destination(&project.backups_dir(), &host.name, &chrono::Local::now());
    services
        .transport
        .pull_elevated(&conn, REMOTE_BACKUP_PATH, &dest)
        .await?;

    print_success(&format!("Backups of '{}' saved to {}", host.name, dest.display()));
    Ok(Outcome::Done)
}
