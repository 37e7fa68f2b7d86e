//! Control-plane adapters backed by operator-configured shell commands.
//!
//! Version commands print the version on their first stdout line; an
//! optional second line carries the image (compute) or URL (static site).

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use vigil_core::config::{ComputeCommands, DatabaseCommands, StaticSiteCommands};
use vigil_core::{
    AdapterError, AdapterResult, ComputeAdapter, DatabaseBackupAdapter, StaticSiteAdapter,
    VersionDescriptor,
};

use crate::command::{render, run_command};

/// First line and optional second line of a version command's output.
fn split_version(output: &str, command: &str) -> AdapterResult<(String, Option<String>)> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let version = lines
        .next()
        .ok_or_else(|| AdapterError::InvalidOutput(format!("`{command}` printed no version")))?;
    Ok((version.to_string(), lines.next().map(str::to_string)))
}

fn wrong_kind(adapter: &str, version: &VersionDescriptor) -> AdapterError {
    AdapterError::InvalidOutput(format!(
        "{adapter} adapter cannot handle version {}",
        version.label()
    ))
}

pub struct CommandCompute {
    commands: ComputeCommands,
}

impl CommandCompute {
    pub fn new(commands: ComputeCommands) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl ComputeAdapter for CommandCompute {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        let output = run_command(&self.commands.current).await?;
        let (task_definition, image) = split_version(&output, &self.commands.current)?;
        Ok(VersionDescriptor::Compute {
            task_definition,
            image,
        })
    }

    async fn deploy(&self, version: &VersionDescriptor) -> AdapterResult<()> {
        let VersionDescriptor::Compute {
            task_definition,
            image,
        } = version
        else {
            return Err(wrong_kind("compute", version));
        };
        let command = render(
            &self.commands.deploy,
            &[
                ("version", task_definition.as_str()),
                ("image", image.as_deref().unwrap_or("")),
            ],
        );
        run_command(&command).await?;
        info!(%task_definition, "compute deployment updated");
        Ok(())
    }

    async fn wait_stable(&self) -> AdapterResult<()> {
        run_command(&self.commands.wait_stable).await.map(drop)
    }
}

pub struct CommandStaticSite {
    commands: StaticSiteCommands,
}

impl CommandStaticSite {
    pub fn new(commands: StaticSiteCommands) -> Self {
        Self { commands }
    }

    fn deployment_id<'a>(&self, version: &'a VersionDescriptor) -> AdapterResult<&'a str> {
        match version {
            VersionDescriptor::StaticSite { deployment_id, .. } => Ok(deployment_id),
            other => Err(wrong_kind("static-site", other)),
        }
    }
}

#[async_trait]
impl StaticSiteAdapter for CommandStaticSite {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        let output = run_command(&self.commands.current).await?;
        let (deployment_id, url) = split_version(&output, &self.commands.current)?;
        Ok(VersionDescriptor::StaticSite { deployment_id, url })
    }

    async fn rollback_to(&self, version: &VersionDescriptor) -> AdapterResult<()> {
        let Some(template) = &self.commands.rollback else {
            return Err(AdapterError::Unsupported("static-site rollback".to_string()));
        };
        let id = self.deployment_id(version)?;
        run_command(&render(template, &[("version", id)])).await.map(drop)
    }

    async fn promote(&self, version: &VersionDescriptor) -> AdapterResult<()> {
        let id = self.deployment_id(version)?;
        run_command(&render(&self.commands.promote, &[("version", id)]))
            .await
            .map(drop)
    }
}

/// Backups are written to `{backup_dir}/{id}.sql`; the path is the
/// backup reference.
pub struct CommandDatabase {
    commands: DatabaseCommands,
}

impl CommandDatabase {
    pub fn new(commands: DatabaseCommands) -> Self {
        Self { commands }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.commands.backup_dir
    }
}

#[async_trait]
impl DatabaseBackupAdapter for CommandDatabase {
    async fn current_version(&self) -> AdapterResult<VersionDescriptor> {
        let output = run_command(&self.commands.current).await?;
        let (migration_id, _) = split_version(&output, &self.commands.current)?;
        Ok(VersionDescriptor::Database {
            migration_id,
            backup_ref: None,
        })
    }

    async fn backup(&self, id: &str) -> AdapterResult<String> {
        tokio::fs::create_dir_all(&self.commands.backup_dir)
            .await
            .map_err(|e| {
                AdapterError::Other(anyhow::anyhow!(
                    "failed to create {}: {e}",
                    self.commands.backup_dir.display()
                ))
            })?;
        let file = self.commands.backup_dir.join(format!("{id}.sql"));
        let file = file.to_string_lossy().into_owned();
        run_command(&render(&self.commands.backup, &[("id", id), ("file", file.as_str())])).await?;
        info!(%file, "database backup written");
        Ok(file)
    }

    async fn restore(&self, backup_ref: &str) -> AdapterResult<()> {
        if !Path::new(backup_ref).is_file() {
            return Err(AdapterError::InvalidOutput(format!(
                "backup file not found: {backup_ref}"
            )));
        }
        run_command(&render(&self.commands.restore, &[("file", backup_ref)])).await?;
        info!(%backup_ref, "database restored");
        Ok(())
    }

    async fn reconcile_schema(&self) -> AdapterResult<()> {
        run_command(&self.commands.reconcile).await.map(drop)
    }
}
