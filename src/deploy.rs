//! Publishing assets and driving the CloudFormation stack.
//!
//! Assets go to a staging bucket first (the edge function zip and the
//! website files), then the template is created or updated with the staging
//! bucket passed as the `AssetsBucketName` parameter. All calls are
//! sequential; CloudFormation is polled until the stack settles.

use std::collections::BTreeMap;
use std::path::Path;

use aws_sdk_cloudformation::types::{Capability, OnFailure, Parameter, Stack, StackStatus};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info, warn};

use crate::assets::{self, AssetManifest, Packaging, StagedAsset};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::resources::ASSETS_BUCKET_PARAMETER;
use crate::stack::STACK_REGION;

const POLL_INTERVAL_MS: u64 = 700;

pub fn validate_stack_name(name: &str) -> Option<String> {
    if name.is_empty() || name.len() > 128 {
        return Some(format!("Invalid stack name {:?}\nMust be between 1 and 128 characters", name));
    }
    if !name.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
        return Some(format!("Invalid stack name {:?}\nMust start with a letter", name));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Some(format!("Invalid stack name {:?}\nMust contain only alphanumeric characters and hyphens", name));
    }
    None
}

/// The bucket assets are published to: `STACK_ASSETS_BUCKET` if set,
/// otherwise one named after the target account.
pub fn staging_bucket(config: &AppConfig) -> Result<String> {
    if let Some(bucket) = &config.assets_bucket {
        return Ok(bucket.clone());
    }
    match &config.account {
        Some(account) => Ok(format!("static-site-assets-{account}-{STACK_REGION}")),
        None => Err(Error::Deploy(
            "No staging bucket: set STACK_ASSETS_BUCKET or a deploy account".to_string(),
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    Complete,
    InProgress,
    Failed,
}

/// State of a stack being created or updated. A stack that ends up deleted
/// (`OnFailure::Delete` after a failed create) counts as failed.
pub fn stack_state(status: &StackStatus) -> StackState {
    match status {
        StackStatus::CreateComplete | StackStatus::UpdateComplete | StackStatus::ImportComplete => StackState::Complete,

        StackStatus::CreateInProgress
        | StackStatus::DeleteInProgress
        | StackStatus::ImportInProgress
        | StackStatus::ImportRollbackInProgress
        | StackStatus::ReviewInProgress
        | StackStatus::RollbackInProgress
        | StackStatus::UpdateCompleteCleanupInProgress
        | StackStatus::UpdateInProgress
        | StackStatus::UpdateRollbackCompleteCleanupInProgress
        | StackStatus::UpdateRollbackInProgress => StackState::InProgress,

        // rollbacks that finished still mean the change did not go through
        _ => StackState::Failed,
    }
}

/// What `create_or_update_stack` did. Created and updated stacks carry the
/// stack id to wait on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackChange {
    Created(String),
    Updated(String),
    Unchanged,
}

impl StackChange {
    pub fn stack_id(&self) -> Option<&str> {
        match self {
            StackChange::Created(id) | StackChange::Updated(id) => Some(id),
            StackChange::Unchanged => None,
        }
    }
}

pub fn outputs_of(stack: &Stack) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for output in stack.outputs().unwrap_or_default() {
        if let (Some(key), Some(val)) = (output.output_key(), output.output_value()) {
            out.insert(key.to_string(), val.to_string());
        }
    }
    out
}

pub struct Deployer {
    cfn: aws_sdk_cloudformation::Client,
    s3: aws_sdk_s3::Client,
}

impl Deployer {
    /// Clients pinned to `region`, credentials from the usual provider chain.
    pub async fn new(region: &str) -> Self {
        let region = aws_sdk_cloudformation::config::Region::new(region.to_string());
        let sdk_config = aws_config::from_env().region(region).load().await;
        Self {
            cfn: aws_sdk_cloudformation::Client::new(&sdk_config),
            s3: aws_sdk_s3::Client::new(&sdk_config),
        }
    }

    /// Creates the staging bucket if it does not exist yet.
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if self.s3.head_bucket().bucket(bucket).send().await.is_ok() {
            return Ok(());
        }
        info!(bucket, "creating staging bucket");
        self.s3
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Error::Deploy(format!("Failed to create bucket {bucket}\n{:#?}", e)))?;
        Ok(())
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.s3.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let e_str = format!("{:#?}", e);
                if e_str.contains("NotFound") {
                    return Ok(false);
                }
                Err(Error::Deploy(e_str))
            }
        }
    }

    async fn upload(&self, bucket: &str, key: &str, path: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::Io(format!("Failed to read {}\n{e}", path.display())))?;
        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Deploy(format!("Failed to upload s3://{bucket}/{key}\n{:#?}", e)))?;
        debug!(bucket, key, "uploaded");
        Ok(())
    }

    async fn publish_asset(&self, asset: &StagedAsset, bucket: &str) -> Result<()> {
        match asset.packaging {
            Packaging::ZipDirectory => {
                if self.object_exists(bucket, &asset.object_key).await? {
                    debug!(asset = %asset.id, key = %asset.object_key, "asset already published");
                    return Ok(());
                }
                let staged_path = asset
                    .staged_path
                    .as_ref()
                    .ok_or_else(|| Error::AssetNotFound(format!("{} (no staged zip)", asset.id)))?;
                self.upload(bucket, &asset.object_key, staged_path, "application/zip").await?;
            }
            Packaging::Files => {
                for (relative, path) in assets::list_files(&asset.source_path)? {
                    let key = format!("{}{relative}", asset.object_key);
                    self.upload(bucket, &key, &path, assets::content_type(&relative)).await?;
                }
            }
        }
        info!(asset = %asset.id, bucket, key = %asset.object_key, "published asset");
        Ok(())
    }

    pub async fn publish_assets(&self, manifest: &AssetManifest, bucket: &str) -> Result<()> {
        for asset in &manifest.assets {
            self.publish_asset(asset, bucket).await?;
        }
        Ok(())
    }

    pub async fn does_stack_exist(&self, name: &str) -> Result<bool> {
        match self.cfn.describe_stacks().stack_name(name).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let e_str = format!("{:#?}", e);
                if e_str.contains("does not exist") {
                    return Ok(false);
                }
                Err(Error::Deploy(e_str))
            }
        }
    }

    /// `None` when there is no stack by that name.
    pub async fn describe_stack(&self, name: &str) -> Result<Option<Stack>> {
        match self.cfn.describe_stacks().stack_name(name).send().await {
            Ok(d) => Ok(d.stacks().and_then(|stacks| stacks.first()).cloned()),
            Err(e) => {
                let e_str = format!("{:#?}", e);
                if e_str.contains("does not exist") {
                    return Ok(None);
                }
                Err(Error::Deploy(e_str))
            }
        }
    }

    pub async fn create_or_update_stack(&self, name: &str, body: &str, parameters: &[(&str, &str)]) -> Result<StackChange> {
        if let Some(e) = validate_stack_name(name) {
            return Err(Error::InvalidStackName(e));
        }
        let parameters: Vec<Parameter> = parameters
            .iter()
            .map(|(key, value)| Parameter::builder().parameter_key(*key).parameter_value(*value).build())
            .collect();
        if self.does_stack_exist(name).await? {
            info!(stack = name, "updating stack");
            let result = self
                .cfn
                .update_stack()
                .capabilities(Capability::CapabilityNamedIam)
                .capabilities(Capability::CapabilityIam)
                .stack_name(name)
                .template_body(body)
                .set_parameters(Some(parameters))
                .send()
                .await;
            match result {
                Ok(o) => Ok(StackChange::Updated(o.stack_id().unwrap_or(name).to_string())),
                Err(e) => {
                    let e_str = format!("{:#?}", e);
                    if e_str.contains("No updates are to be performed") {
                        info!(stack = name, "stack is up to date");
                        return Ok(StackChange::Unchanged);
                    }
                    Err(Error::Deploy(e_str))
                }
            }
        } else {
            info!(stack = name, "creating stack");
            let created = self
                .cfn
                .create_stack()
                .on_failure(OnFailure::Delete)
                .capabilities(Capability::CapabilityNamedIam)
                .capabilities(Capability::CapabilityIam)
                .stack_name(name)
                .template_body(body)
                .set_parameters(Some(parameters))
                .send()
                .await
                .map_err(|e| Error::Deploy(format!("{:#?}", e)))?;
            Ok(StackChange::Created(created.stack_id().unwrap_or(name).to_string()))
        }
    }

    /// Reason of the oldest failed resource event, usually the root cause of
    /// a rollback.
    async fn first_failure_reason(&self, stack_id: &str) -> Option<String> {
        let events = self.cfn.describe_stack_events().stack_name(stack_id).send().await.ok()?;
        events
            .stack_events()
            .unwrap_or_default()
            .iter()
            .rev()
            .find(|e| e.resource_status().map(|s| s.as_str().ends_with("_FAILED")).unwrap_or(false))
            .map(|e| {
                format!(
                    "{}: {}",
                    e.logical_resource_id().unwrap_or("unknown resource"),
                    e.resource_status_reason().unwrap_or("no reason given")
                )
            })
    }

    /// Polls until the stack reaches a terminal status. Polled by stack id,
    /// which keeps resolving after a failed create deleted the stack.
    pub async fn wait_for_stack(&self, stack_id: &str) -> Result<Stack> {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
            let stack = match self.describe_stack(stack_id).await? {
                Some(stack) => stack,
                None => return Err(Error::Deploy(format!("Stack {stack_id} not found"))),
            };
            let name = stack.stack_name().unwrap_or(stack_id);
            let status = match stack.stack_status() {
                Some(status) => status,
                None => return Err(Error::Deploy(format!("Stack {name} has no status"))),
            };
            match stack_state(status) {
                StackState::Complete => return Ok(stack),
                StackState::InProgress => debug!(stack = name, status = status.as_str(), "waiting"),
                StackState::Failed => {
                    let reason = match self.first_failure_reason(stack_id).await {
                        Some(reason) => reason,
                        None => stack.stack_status_reason().unwrap_or("Failed to get stack failure reason").to_string(),
                    };
                    return Err(Error::Deploy(format!("Stack {name} is {}: {reason}", status.as_str())));
                }
            }
        }
    }

    pub async fn delete_stack(&self, name: &str) -> Result<()> {
        if !self.does_stack_exist(name).await? {
            warn!(stack = name, "stack does not exist, nothing to delete");
            return Ok(());
        }
        info!(stack = name, "deleting stack");
        self.cfn
            .delete_stack()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| Error::Deploy(format!("{:#?}", e)))?;
        loop {
            tokio::time::sleep(tokio::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
            let stack = match self.describe_stack(name).await? {
                Some(stack) => stack,
                None => break,
            };
            match stack.stack_status() {
                Some(StackStatus::DeleteComplete) | None => break,
                Some(StackStatus::DeleteFailed) => {
                    let reason = stack.stack_status_reason().unwrap_or("Failed to get stack failure reason");
                    return Err(Error::Deploy(format!("Failed to delete stack {name}: {reason}")));
                }
                Some(status) => debug!(stack = name, status = status.as_str(), "waiting"),
            }
        }
        info!(stack = name, "stack deleted");
        Ok(())
    }

    pub async fn stack_outputs(&self, name: &str) -> Result<BTreeMap<String, String>> {
        match self.describe_stack(name).await? {
            Some(stack) => Ok(outputs_of(&stack)),
            None => Err(Error::Deploy(format!("Stack {name} not found"))),
        }
    }

    /// Publishes assets, then creates or updates the stack and waits for it.
    /// Returns the stack outputs.
    pub async fn deploy(&self, stack_name: &str, template_body: &str, manifest: &AssetManifest, assets_bucket: &str) -> Result<BTreeMap<String, String>> {
        if let Some(e) = validate_stack_name(stack_name) {
            return Err(Error::InvalidStackName(e));
        }
        self.ensure_bucket(assets_bucket).await?;
        self.publish_assets(manifest, assets_bucket).await?;
        let change = self
            .create_or_update_stack(stack_name, template_body, &[(ASSETS_BUCKET_PARAMETER, assets_bucket)])
            .await?;
        let stack = match change.stack_id() {
            Some(stack_id) => self.wait_for_stack(stack_id).await?,
            None => match self.describe_stack(stack_name).await? {
                Some(stack) => stack,
                None => return Err(Error::Deploy(format!("Stack {stack_name} not found"))),
            },
        };
        info!(stack = stack_name, ?change, "deploy finished");
        Ok(outputs_of(&stack))
    }
}
