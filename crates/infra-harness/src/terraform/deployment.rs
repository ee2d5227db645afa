use shell_executor::{Launcher, LocalLauncher};
use std::fmt;
use tracing::{error, info};

use super::{Result, Terraform, TerraformError};

/// Applied infrastructure that still has to be destroyed
///
/// Destroy runs exactly once: through [`Deployment::destroy`] or
/// [`Deployment::finish`] on the normal path, or from `Drop` when the guard
/// goes away early (a panic or an early `?` return). The `Drop` path blocks
/// the current thread until terraform finishes.
pub struct Deployment<L: Launcher = LocalLauncher> {
    terraform: Terraform<L>,
    destroyed: bool,
}

impl<L: Launcher> Deployment<L> {
    /// Run `terraform init` and `terraform apply`
    ///
    /// A failed apply may still have created resources, so destroy is
    /// attempted before the apply error is returned.
    pub async fn apply(terraform: Terraform<L>) -> Result<Self> {
        let mut deployment = Self {
            terraform,
            destroyed: false,
        };

        if let Err(apply_error) = deployment.terraform.init_and_apply().await {
            error!("terraform apply failed, tearing down: {}", apply_error);
            deployment.destroyed = true;
            if let Err(destroy_error) = deployment.terraform.destroy().await {
                error!("teardown after failed apply also failed: {}", destroy_error);
            }
            return Err(apply_error);
        }

        info!(
            "Applied {}",
            deployment.terraform.options().terraform_dir.display()
        );
        Ok(deployment)
    }

    /// Read an output of the applied configuration
    pub async fn output(&self, name: &str) -> Result<String> {
        self.terraform.output(name).await
    }

    /// Destroy the infrastructure now
    pub async fn destroy(mut self) -> Result<()> {
        self.destroyed = true;
        info!(
            "Destroying {}",
            self.terraform.options().terraform_dir.display()
        );
        self.terraform.destroy().await.map(|_| ())
    }

    /// Destroy the infrastructure, then hand back `outcome`
    ///
    /// If both the body and the teardown failed, the body's error wins and
    /// the teardown error is logged.
    pub async fn finish<T, E>(self, outcome: std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<TerraformError> + fmt::Display,
    {
        let teardown = self.destroy().await;
        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(destroy_error)) => Err(destroy_error.into()),
            (Err(body_error), Ok(())) => Err(body_error),
            (Err(body_error), Err(destroy_error)) => {
                error!("teardown failed after {}: {}", body_error, destroy_error);
                Err(body_error)
            }
        }
    }
}

impl<L: Launcher> Drop for Deployment<L> {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        error!(
            "Deployment of {} dropped without teardown, destroying now",
            self.terraform.options().terraform_dir.display()
        );
        if let Err(e) = smol::block_on(self.terraform.destroy()) {
            error!("terraform destroy failed: {}", e);
        }
    }
}
