//! Project and host lifecycle commands

use std::fs;

use hk_core::project::validate_name;
use hk_core::secrets::{self, FillOutcome, OsSecretSource, SecretSource};
use hk_core::setup::{add_host_to_inventory, write_host_files};
use hk_core::{vault, HkError, Host, Project, Result};

use super::{Context, Outcome, Services};
use crate::output::{
    format_created, format_roles, is_quiet, print_info, print_success, print_warning, RoleInfo,
};

/// Execute the init-project command
pub fn init_project(ctx: &Context<'_>) -> Result<Outcome> {
    let project = Project::locate(ctx.settings, &ctx.request.project)?;
    let setup = hk_core::init_project(&project)?;

    if setup.was_initialized() {
        print_info(&format!(
            "Project '{}' is already initialized at {}",
            project.name(),
            project.root().display()
        ));
        return Ok(Outcome::Done);
    }

    print_success(&format!("Initialized project '{}'", project.name()));
    if !setup.created.is_empty() && !is_quiet() {
        println!("{}", format_created(project.root(), &setup.created));
    }
    if setup.master_secret_created {
        print_warning(&format!(
            "Back up {}: vault files cannot be decrypted without it",
            project.master_secret().display()
        ));
    }
    Ok(Outcome::Done)
}

/// Execute the init-host command
///
/// The inventory is only touched once the vault file is encrypted. Any
/// failure before that removes the files written for the host, so no
/// plaintext secrets stay behind and the command can simply be retried.
pub async fn init_host(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let project = ctx.project()?;
    let name = ctx.request.host.as_deref().ok_or(HkError::HostRequired)?;
    let host = project.host(name)?;

    if project.inventory_hosts()?.contains(&host.name) {
        return Err(HkError::HostExists(host.name.clone()));
    }

    let fresh_dir = !host.dir.exists();
    let added = match write_host_secrets(ctx, services, project, &host).await {
        Ok(()) => add_host_to_inventory(project, &host.name),
        Err(e) => Err(e),
    };
    if let Err(e) = added {
        discard_host_files(&host, fresh_dir);
        return Err(e);
    }

    print_success(&format!(
        "Added host '{}' to project '{}'",
        host.name,
        project.name()
    ));
    Ok(Outcome::Done)
}

async fn write_host_secrets(
    ctx: &Context<'_>,
    services: &Services,
    project: &Project,
    host: &Host,
) -> Result<()> {
    write_host_files(host, &ctx.settings.templates_dir())?;

    let filled = match OsSecretSource::probe() {
        Ok(mut source) => {
            secrets::generate_file(&host.vault_file, Ok(&mut source as &mut dyn SecretSource))
        }
        Err(e) => secrets::generate_file(&host.vault_file, Err(e)),
    }?;
    match filled {
        FillOutcome::Filled(n) => print_info(&format!("Generated {} secrets", n)),
        FillOutcome::NoPlaceholders => {}
        FillOutcome::Skipped(n) => print_warning(&format!(
            "No secure random generator available; replace the {} CHANGEME placeholders in {} by hand (hostkeeper edit-vault {} {})",
            n,
            host.vault_file.display(),
            project.name(),
            host.name
        )),
    }

    vault::encrypt(services.engine.as_ref(), project, &host.vault_file).await?;
    Ok(())
}

/// Undo a failed init-host: drop the host directory if this run created
/// it, otherwise only a vault file that is still in plaintext
fn discard_host_files(host: &Host, fresh_dir: bool) {
    let removed = if fresh_dir {
        fs::remove_dir_all(&host.dir)
    } else if !vault::is_encrypted(&host.vault_file).unwrap_or(true) {
        fs::remove_file(&host.vault_file)
    } else {
        Ok(())
    };
    if let Err(e) = removed {
        tracing::warn!("Failed to clean up {:?}: {}", host.dir, e);
    }
}

/// Execute the edit-playbook command
pub async fn edit_playbook(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    services.interactive.edit(&ctx.project()?.playbook()).await?;
    Ok(Outcome::Done)
}

/// Execute the edit-inventory command
pub async fn edit_inventory(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    services.interactive.edit(&ctx.project()?.inventory()).await?;
    Ok(Outcome::Done)
}

/// Execute the edit-host command
pub async fn edit_host(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    services.interactive.edit(&ctx.host()?.vars_file).await?;
    Ok(Outcome::Done)
}

/// Execute the edit-group command; the file is created by the editor on first save
pub async fn edit_group(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let project = ctx.project()?;
    fs::create_dir_all(project.group_vars_dir())?;
    services
        .interactive
        .edit(&project.group_vars_file(ctx.group()))
        .await?;
    Ok(Outcome::Done)
}

/// Execute the edit-vault command
pub async fn edit_vault(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    vault::edit(services.engine.as_ref(), ctx.project()?, &ctx.host()?.vault_file).await?;
    Ok(Outcome::Done)
}

/// Execute the upgrade command
pub async fn upgrade(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let project = ctx.project()?;
    let settings = ctx.settings;

    services
        .source
        .sync(
            &settings.source_url,
            &settings.release_channel,
            &settings.cache_dir,
        )
        .await?;

    let requirements = settings.requirements_file();
    if requirements.is_file() {
        services
            .engine
            .install_dependencies(project, &requirements)
            .await?;
        print_success(&format!(
            "Reinstalled dependencies of project '{}'",
            project.name()
        ));
    } else {
        print_info(&format!(
            "No {} in the source checkout, nothing to reinstall",
            requirements.display()
        ));
    }
    Ok(Outcome::Done)
}

/// Execute the show-defaults command
pub async fn show_defaults(ctx: &Context<'_>, services: &Services) -> Result<Outcome> {
    let roles_dir = ctx.settings.roles_dir();

    let Some(role) = ctx.request.role.as_deref().filter(|r| !r.is_empty()) else {
        println!("{}", format_roles(&list_roles(&roles_dir)?));
        return Ok(Outcome::Done);
    };

    validate_name(role)?;
    let defaults = defaults_file(&roles_dir, role);
    if !defaults.is_file() {
        return Err(HkError::RoleNotFound {
            role: role.to_string(),
            path: defaults,
        });
    }
    services.interactive.page(&defaults).await?;
    Ok(Outcome::Done)
}

fn defaults_file(roles_dir: &std::path::Path, role: &str) -> std::path::PathBuf {
    roles_dir.join(role).join("defaults").join("main.yml")
}

/// Roles under `roles_dir` that ship a defaults file, sorted by name
fn list_roles(roles_dir: &std::path::Path) -> Result<Vec<RoleInfo>> {
    if !roles_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut roles = Vec::new();
    for entry in fs::read_dir(roles_dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(String::from) else {
            continue;
        };
        let defaults = defaults_file(roles_dir, &name);
        if defaults.is_file() {
            roles.push(RoleInfo {
                name,
                defaults: defaults.display().to_string(),
            });
        }
    }
    roles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::super::fakes::{FakeEngine, Harness};
    use super::super::{Action, Request};
    use super::*;
    use hk_core::traits::VaultOp;
    use hk_core::vault::is_encrypted;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_init_project_then_host() {
        let h = Harness::new();
        h.run(Request::new(Action::InitProject).project("infra"))
            .await
            .unwrap();

        let project = h.project("infra");
        assert!(project.inventory().is_file());
        assert!(project.playbook().is_file());
        assert!(project.group_vars_dir().is_dir());
        assert!(project.master_secret().is_file());

        h.run(
            Request::new(Action::InitHost)
                .project("infra")
                .host(Some("db1.example.org".into())),
        )
        .await
        .unwrap();

        assert!(project
            .inventory_hosts()
            .unwrap()
            .contains("db1.example.org"));
        let host = project.host("db1.example.org").unwrap();
        assert!(host.vars_file.is_file());
        assert!(is_encrypted(&host.vault_file).unwrap());

        // secrets were generated before encryption
        let ops = h.engine.vault_ops.lock().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].0, VaultOp::Encrypt);
        assert!(!ops[0].2.contains("CHANGEME"));
        assert!(ops[0].2.contains("db1.example.org"));
    }

    #[tokio::test]
    async fn test_init_project_is_idempotent() {
        let h = Harness::new();
        h.run(Request::new(Action::InitProject).project("infra"))
            .await
            .unwrap();
        let project = h.project("infra");
        let secret = fs::read(project.master_secret()).unwrap();

        h.run(Request::new(Action::InitProject).project("infra"))
            .await
            .unwrap();
        assert_eq!(fs::read(project.master_secret()).unwrap(), secret);
    }

    #[tokio::test]
    async fn test_init_host_requires_name() {
        let h = Harness::new();
        h.project_with_hosts("infra", &[]);
        let err = h
            .run(Request::new(Action::InitHost).project("infra"))
            .await
            .unwrap_err();
        assert!(matches!(err, HkError::HostRequired));
    }

    #[tokio::test]
    async fn test_init_host_rejects_duplicates() {
        let h = Harness::new();
        h.project_with_hosts("infra", &[]);
        let request = Request::new(Action::InitHost)
            .project("infra")
            .host(Some("db1".into()));

        h.run(request.clone()).await.unwrap();
        let err = h.run(request).await.unwrap_err();
        assert!(matches!(err, HkError::HostExists(_)));
    }

    #[tokio::test]
    async fn test_failed_encryption_leaves_no_host_behind() {
        let mut h = Harness::new();
        let project = h.project_with_hosts("infra", &[]);
        let request = Request::new(Action::InitHost)
            .project("infra")
            .host(Some("db1".into()));

        h.engine = Arc::new(FakeEngine {
            vault_fails: true,
            ..Default::default()
        });
        let err = h.run(request.clone()).await.unwrap_err();
        assert!(matches!(err, HkError::ToolFailure { .. }));

        let host = project.host("db1").unwrap();
        assert!(!project.inventory_hosts().unwrap().contains("db1"));
        assert!(!host.vault_file.exists());
        assert!(!host.dir.exists());

        // a retry with a working engine completes the host
        h.engine = Arc::default();
        h.run(request).await.unwrap();
        assert!(project.inventory_hosts().unwrap().contains("db1"));
        assert!(is_encrypted(&host.vault_file).unwrap());
    }

    #[tokio::test]
    async fn test_failed_encryption_keeps_existing_host_dir() {
        let mut h = Harness::new();
        let project = h.project_with_hosts("infra", &[]);
        let host = project.host("db1").unwrap();
        fs::create_dir_all(&host.dir).unwrap();
        fs::write(&host.vars_file, "---\nansible_user: deploy\n").unwrap();

        h.engine = Arc::new(FakeEngine {
            vault_fails: true,
            ..Default::default()
        });
        h.run(
            Request::new(Action::InitHost)
                .project("infra")
                .host(Some("db1".into())),
        )
        .await
        .unwrap_err();

        assert!(host.vars_file.is_file());
        assert!(!host.vault_file.exists());
    }

    #[tokio::test]
    async fn test_edit_group_defaults_to_all() {
        let h = Harness::new();
        let project = h.project_with_hosts("infra", &[]);
        fs::remove_dir_all(project.group_vars_dir()).unwrap();

        h.run(Request::new(Action::EditGroup).project("infra"))
            .await
            .unwrap();
        assert_eq!(
            *h.interactive.edited.lock().unwrap(),
            vec![project.group_vars_file("all")]
        );
        assert!(project.group_vars_dir().is_dir());
    }

    #[tokio::test]
    async fn test_edit_host_ambiguous() {
        let h = Harness::new();
        h.project_with_hosts("infra", &["a", "b"]);
        let err = h
            .run(Request::new(Action::EditHost).project("infra"))
            .await
            .unwrap_err();
        match err {
            HkError::HostAmbiguous { candidates, .. } => assert_eq!(candidates, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_edit_vault_goes_through_engine() {
        let h = Harness::new();
        let project = h.project_with_hosts("infra", &["db1"]);
        h.run(Request::new(Action::EditVault).project("infra"))
            .await
            .unwrap();

        let ops = h.engine.vault_ops.lock().unwrap();
        assert_eq!(ops[0].0, VaultOp::Edit);
        assert_eq!(ops[0].1, project.host("db1").unwrap().vault_file);
        assert!(h.interactive.edited.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_reinstalls_when_requirements_exist() {
        let h = Harness::new();
        h.project_with_hosts("infra", &[]);

        h.run(Request::new(Action::Upgrade).project("infra"))
            .await
            .unwrap();
        assert_eq!(h.source.syncs.lock().unwrap().len(), 1);
        assert!(h.engine.installs.lock().unwrap().is_empty());

        fs::write(h.settings.requirements_file(), "roles: []\n").unwrap();
        h.run(Request::new(Action::Upgrade).project("infra"))
            .await
            .unwrap();
        assert_eq!(
            *h.engine.installs.lock().unwrap(),
            vec![h.settings.requirements_file()]
        );
    }

    #[tokio::test]
    async fn test_show_defaults() {
        let h = Harness::new();
        let defaults = h.settings.roles_dir().join("nginx/defaults/main.yml");
        fs::create_dir_all(defaults.parent().unwrap()).unwrap();
        fs::write(&defaults, "nginx_port: 80\n").unwrap();
        fs::create_dir_all(h.settings.roles_dir().join("empty")).unwrap();

        let roles = list_roles(&h.settings.roles_dir()).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "nginx");

        let mut request = Request::new(Action::ShowDefaults);
        request.role = Some("nginx".into());
        h.run(request.clone()).await.unwrap();
        assert_eq!(*h.interactive.paged.lock().unwrap(), vec![defaults]);

        request.role = Some("empty".into());
        let err = h.run(request).await.unwrap_err();
        assert!(matches!(err, HkError::RoleNotFound { .. }));
    }
}
