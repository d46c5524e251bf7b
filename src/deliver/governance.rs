//! Governance policy: the plan object that can cap resolution, force a
//! watermark, or deny an operation outright. The check runs before any frame
//! is rendered.

use crate::deliver::QualityProfile;
use crate::foundation::error::{GovernanceDenial, MetavisError, MvResult};
use crate::graph::node::WatermarkSpec;

/// The user's entitlement plan, supplied by the caller.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPlan {
    /// Plan name.
    pub name: String,
    /// Maximum output height the plan allows.
    pub max_resolution_height: u32,
    /// Whether exports must carry a watermark.
    pub requires_watermark: bool,
    /// Operations this plan denies (e.g. `publish`).
    #[serde(default)]
    pub forbidden_operations: Vec<String>,
}

impl UserPlan {
    /// An unrestricted plan, useful for tests and trusted pipelines.
    pub fn unrestricted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_resolution_height: u32::MAX,
            requires_watermark: false,
            forbidden_operations: Vec::new(),
        }
    }
}

/// Outcome of a passing governance check.
#[derive(Clone, Debug)]
pub struct GovernanceOutcome {
    /// Watermark the compiler must inject, when the plan demands one.
    pub watermark: Option<WatermarkSpec>,
}

/// Governance facts recorded in the manifest.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceRecord {
    /// Plan name the export ran under.
    pub plan: String,
    /// Resolution cap at export time.
    pub max_resolution_height: u32,
    /// Whether the output is watermarked.
    pub watermarked: bool,
}

/// Check `operation` at `quality` against `plan`.
pub fn check_governance(
    plan: &UserPlan,
    quality: &QualityProfile,
    operation: &str,
) -> MvResult<GovernanceOutcome> {
    if plan
        .forbidden_operations
        .iter()
        .any(|op| op == operation)
    {
        return Err(MetavisError::Governance(
            GovernanceDenial::OperationForbidden {
                plan: plan.name.clone(),
                operation: operation.to_owned(),
            },
        ));
    }
    if quality.resolution_height > plan.max_resolution_height {
        return Err(MetavisError::Governance(
            GovernanceDenial::ResolutionNotAllowed {
                requested: quality.resolution_height,
                max_allowed: plan.max_resolution_height,
            },
        ));
    }
    let watermark = plan.requires_watermark.then(|| WatermarkSpec {
        tag: plan.name.clone(),
        opacity: 0.35,
    });
    Ok(GovernanceOutcome { watermark })
}
