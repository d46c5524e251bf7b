//! Deliverable assembly: governance, manifest, and the publish orchestrator.

/// Governance policy checks.
pub mod governance;
/// Deliverable manifest schema.
pub mod manifest;
/// Publish pipeline.
pub mod orchestrator;

pub use governance::UserPlan;
pub use manifest::{DeliverableManifest, MANIFEST_SCHEMA_VERSION, SidecarRecord};
pub use orchestrator::{DeliverableSpec, Orchestrator, PublishedDeliverable, SidecarRequest};

use crate::foundation::error::{MetavisError, MvResult};

/// Render fidelity tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    /// Fast, reduced-quality renders.
    Draft,
    /// Near-final preview.
    Preview,
    /// Full delivery quality.
    Full,
}

/// Output quality profile. Width derives from the 16:9 height unless a preset
/// overrides it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    /// Profile name.
    pub name: String,
    /// Fidelity tier.
    pub fidelity: Fidelity,
    /// Output height in pixels.
    pub resolution_height: u32,
    /// Color depth in bits (8 or 10).
    pub color_depth: u32,
    /// Explicit width override from a deliverable preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width_override: Option<u32>,
}

impl QualityProfile {
    /// Derived output width: `(height * 16) / 9`, forced even for 4:2:0.
    pub fn width(&self) -> u32 {
        let w = self
            .width_override
            .unwrap_or((self.resolution_height * 16) / 9);
        w & !1
    }

    /// Height forced even for 4:2:0.
    pub fn even_height(&self) -> u32 {
        self.resolution_height & !1
    }

    /// Validate depth and dimensions.
    pub fn validate(&self) -> MvResult<()> {
        if self.resolution_height == 0 {
            return Err(MetavisError::compile("quality resolution height must be > 0"));
        }
        if self.color_depth != 8 && self.color_depth != 10 {
            return Err(MetavisError::compile(format!(
                "color depth must be 8 or 10, got {}",
                self.color_depth
            )));
        }
        Ok(())
    }

    /// 360p draft preset.
    pub fn draft() -> Self {
        Self {
            name: "draft".into(),
            fidelity: Fidelity::Draft,
            resolution_height: 360,
            color_depth: 8,
            width_override: None,
        }
    }

    /// 720p preview preset.
    pub fn preview() -> Self {
        Self {
            name: "preview".into(),
            fidelity: Fidelity::Preview,
            resolution_height: 720,
            color_depth: 8,
            width_override: None,
        }
    }

    /// 2160p full-quality preset.
    pub fn full_uhd() -> Self {
        Self {
            name: "full-uhd".into(),
            fidelity: Fidelity::Full,
            resolution_height: 2160,
            color_depth: 8,
            width_override: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_derives_from_16_9_and_is_even() {
        assert_eq!(QualityProfile::full_uhd().width(), 3840);
        assert_eq!(QualityProfile::preview().width(), 1280);
        let odd = QualityProfile {
            resolution_height: 361,
            ..QualityProfile::draft()
        };
        // 361 * 16 / 9 = 641 -> forced even.
        assert_eq!(odd.width(), 640);
    }

    #[test]
    fn preset_override_wins() {
        let q = QualityProfile {
            width_override: Some(4096),
            ..QualityProfile::full_uhd()
        };
        assert_eq!(q.width(), 4096);
    }

    #[test]
    fn bad_depth_is_rejected() {
        let q = QualityProfile {
            color_depth: 12,
            ..QualityProfile::draft()
        };
        assert!(q.validate().is_err());
    }
}
