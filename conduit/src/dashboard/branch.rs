//! Feature branch helpers.
//!
//! A branch gets its own family of pipelines, created by triggering the
//! branch configuration pipeline with a `Branch` environment variable. The
//! family shares an instance number that appears in every heading, e.g.
//! `BuildSE-feature-x-17`.

use super::control::DashboardControl;
use super::locators;
use super::parse::{instance_from_heading, pipeline_from_heading};
use crate::core::InstanceNumber;
use crate::errors::ConduitError;
use tracing::debug;

impl DashboardControl {
    /// Triggers the branch configuration pipeline for `branch`.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ElementNotFound`] if the configuration
    /// pipeline or its trigger modal is not shown.
    pub async fn create_pipelines_for_branch(&self, branch: &str) -> Result<(), ConduitError> {
        self.click(&locators::play_with_options(&self.config().branch_config_pipeline))
            .await?;
        self.click(&locators::environment_variables_tab()).await?;

        let input = self.locate(&locators::branch_input()).await?;
        self.driver().send_keys(&input, branch).await?;
        debug!(branch, "Typed branch name");

        self.click(&locators::modal_trigger_button()).await?;
        debug!(branch, pipeline = %self.config().branch_config_pipeline, "Triggered branch configuration");
        Ok(())
    }

    /// Reads the instance number of `branch` from its build pipeline heading.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ElementNotFound`] if the branch has no build
    /// pipeline yet.
    pub async fn instance_number_for_branch(&self, branch: &str) -> Result<InstanceNumber, ConduitError> {
        let prefix = &self.config().build_pipeline_prefix;
        let heading = self.locate(&locators::build_heading(prefix, branch)).await?;
        let text = self.driver().text(&heading).await?;

        let instance = instance_from_heading(&text, prefix, branch);
        debug!(branch, heading = %text, instance = %instance, "Instance number for branch");
        Ok(instance)
    }

    /// Lists the pipeline names of `branch`'s instance.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ElementNotFound`] if the branch has no
    /// pipelines.
    pub async fn pipelines_for_branch(&self, branch: &str) -> Result<Vec<String>, ConduitError> {
        let instance = self.instance_number_for_branch(branch).await?;
        let locator = locators::instance_headings(&instance);
        self.locate(&locator).await?;

        let mut pipelines = Vec::new();
        for element in self.driver().find_all(&locator).await? {
            let text = self.driver().text(&element).await?;
            pipelines.push(pipeline_from_heading(&text, branch, &instance));
        }

        debug!(branch, pipelines = ?pipelines, "Pipelines for branch");
        Ok(pipelines)
    }
}
