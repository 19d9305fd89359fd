use serde::{Deserialize, Serialize};

use crate::DiskSku;

/// Long-running compute operation an executor can run against one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    /// Power the VM on.
    Start,
    /// Stop the VM and release its compute allocation.
    Deallocate,
    /// Move the VM's OS disk to another storage tier.
    SetOsDiskSku {
        /// Target disk tier.
        sku: DiskSku,
    },
}

impl OperationKind {
    /// Returns a stable operation name for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Deallocate => "deallocate",
            Self::SetOsDiskSku { .. } => "set_os_disk_sku",
        }
    }
}

/// Normalized state of one provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Operation reached a successful terminal state.
    Succeeded,
    /// Operation failed or was canceled.
    Failed,
    /// Operation was accepted and is still running.
    InProgress,
}

impl OperationStatus {
    /// Maps a provider provisioning/operation status string.
    ///
    /// Unknown non-terminal values such as `Accepted`, `Running`, or `Updating`
    /// count as in progress.
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        if value.eq_ignore_ascii_case("succeeded") {
            Self::Succeeded
        } else if value.eq_ignore_ascii_case("failed") || value.eq_ignore_ascii_case("canceled") {
            Self::Failed
        } else {
            Self::InProgress
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Result of one executor invocation.
///
/// `error` is populated exactly when `status` is [`OperationStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    subject_name: String,
    resource_group: String,
    operation: OperationKind,
    status: OperationStatus,
    waited_until_completion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl OperationOutcome {
    /// Creates an outcome for an operation that ran to successful completion.
    #[must_use]
    pub fn succeeded(
        subject_name: impl Into<String>,
        resource_group: impl Into<String>,
        operation: OperationKind,
    ) -> Self {
        Self {
            subject_name: subject_name.into(),
            resource_group: resource_group.into(),
            operation,
            status: OperationStatus::Succeeded,
            waited_until_completion: true,
            error: None,
        }
    }

    /// Creates a failed outcome carrying the captured fault.
    #[must_use]
    pub fn failed(
        subject_name: impl Into<String>,
        resource_group: impl Into<String>,
        operation: OperationKind,
        waited_until_completion: bool,
        error: impl Into<String>,
    ) -> Self {
        Self {
            subject_name: subject_name.into(),
            resource_group: resource_group.into(),
            operation,
            status: OperationStatus::Failed,
            waited_until_completion,
            error: Some(error.into()),
        }
    }

    /// Creates an outcome from a status observed without waiting.
    #[must_use]
    pub fn observed(
        subject_name: impl Into<String>,
        resource_group: impl Into<String>,
        operation: OperationKind,
        status: OperationStatus,
    ) -> Self {
        let subject_name = subject_name.into();
        match status {
            OperationStatus::Failed => Self::failed(
                subject_name,
                resource_group,
                operation,
                false,
                "provider reported the operation as failed",
            ),
            status => Self {
                subject_name,
                resource_group: resource_group.into(),
                operation,
                status,
                waited_until_completion: false,
                error: None,
            },
        }
    }

    /// Returns the VM name the operation targeted.
    #[must_use]
    pub fn subject_name(&self) -> &str {
        self.subject_name.as_str()
    }

    /// Returns the resource group of the target VM.
    #[must_use]
    pub fn resource_group(&self) -> &str {
        self.resource_group.as_str()
    }

    /// Returns the operation kind.
    #[must_use]
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Returns the normalized status.
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// Returns whether the executor blocked until a terminal state.
    #[must_use]
    pub fn waited_until_completion(&self) -> bool {
        self.waited_until_completion
    }

    /// Returns the captured fault for failed outcomes.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true when the outcome is a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::{OperationKind, OperationOutcome, OperationStatus};

    #[test]
    fn provider_statuses_are_normalized() {
        assert_eq!(
            OperationStatus::from_provider("Succeeded"),
            OperationStatus::Succeeded
        );
        assert_eq!(
            OperationStatus::from_provider("Canceled"),
            OperationStatus::Failed
        );
        assert_eq!(
            OperationStatus::from_provider("Accepted"),
            OperationStatus::InProgress
        );
    }

    #[test]
    fn observed_failure_carries_an_error() {
        let outcome = OperationOutcome::observed(
            "vm-a",
            "rg",
            OperationKind::Start,
            OperationStatus::Failed,
        );

        assert!(outcome.is_failed());
        assert!(outcome.error().is_some());
        assert!(!outcome.waited_until_completion());
    }

    #[test]
    fn in_progress_outcome_has_no_error() {
        let outcome = OperationOutcome::observed(
            "vm-a",
            "rg",
            OperationKind::Deallocate,
            OperationStatus::InProgress,
        );

        assert_eq!(outcome.status(), OperationStatus::InProgress);
        assert!(outcome.error().is_none());
    }

    #[test]
    fn serializes_with_snake_case_fields() {
        let outcome = OperationOutcome::succeeded("vm-a", "rg", OperationKind::Start);
        let value = serde_json::to_value(&outcome).unwrap_or_default();

        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["waited_until_completion"], true);
        assert!(value.get("error").is_none());
    }
}
