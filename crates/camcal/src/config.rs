//! Engine configuration and calibration requests (JSON).

use camcal_aruco::ArucoParams;
use camcal_charuco::CharucoParams;
use camcal_chessboard::ChessboardParams;
use camcal_core::{TargetConfig, TargetConfigRecord, TargetKind};
use camcal_solver::SolverOptions;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Everything the engine needs besides the images. Every section is
/// optional in JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default target for command-line runs.
    pub target: Option<TargetConfigRecord>,
    pub chessboard_min_views: usize,
    pub charuco_min_views: usize,
    /// JSON code table for predefined dictionaries.
    pub dictionary_path: Option<PathBuf>,
    /// Extract views on the rayon pool.
    pub parallel: bool,
    pub chessboard: ChessboardParams,
    pub charuco: CharucoParams,
    pub aruco: ArucoParams,
    pub solver: SolverOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target: None,
            chessboard_min_views: 10,
            charuco_min_views: 5,
            dictionary_path: None,
            parallel: true,
            chessboard: ChessboardParams::default(),
            charuco: CharucoParams::default(),
            aruco: ArucoParams::default(),
            solver: SolverOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Configured minimum number of accepted views for `kind`.
    pub fn min_views(&self, kind: TargetKind) -> usize {
        match kind {
            TargetKind::Chessboard => self.chessboard_min_views,
            TargetKind::Charuco => self.charuco_min_views,
        }
    }
}

/// One calibration run: images, target and an optional view threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRequest {
    pub image_paths: Vec<PathBuf>,
    pub target_config: TargetConfigRecord,
    /// Replaces the per-kind minimum view count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_views_override: Option<usize>,
}

impl CalibrationRequest {
    pub fn new<P: Into<PathBuf>>(
        image_paths: impl IntoIterator<Item = P>,
        target: &TargetConfig,
    ) -> Self {
        Self {
            image_paths: image_paths.into_iter().map(Into::into).collect(),
            target_config: target.into(),
            min_views_override: None,
        }
    }

    pub fn with_min_views(mut self, min_views: usize) -> Self {
        self.min_views_override = Some(min_views);
        self
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").expect("config");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.min_views(TargetKind::Chessboard), 10);
        assert_eq!(cfg.min_views(TargetKind::Charuco), 5);
        assert!(cfg.solver.fix_principal_point);
    }

    #[test]
    fn config_round_trips_through_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.json");
        let mut cfg = EngineConfig {
            chessboard_min_views: 12,
            parallel: false,
            ..EngineConfig::default()
        };
        cfg.solver.fix_principal_point = false;
        cfg.write_json(&path).expect("write");
        assert_eq!(EngineConfig::load_json(&path).expect("load"), cfg);
    }

    #[test]
    fn request_uses_camel_case_fields() {
        let json = r#"{
            "imagePaths": ["a.png", "b.png"],
            "targetConfig": {
                "kind": "chessboard",
                "innerCornersX": 9,
                "innerCornersY": 6,
                "squareSizeMM": 25.0
            },
            "minViewsOverride": 3
        }"#;
        let req: CalibrationRequest = serde_json::from_str(json).expect("request");
        assert_eq!(req.image_paths.len(), 2);
        assert_eq!(req.target_config.inner_corners_x, 9);
        assert_eq!(req.min_views_override, Some(3));

        let target = TargetConfig::chessboard(9, 6, 25.0).expect("target");
        let built = CalibrationRequest::new(["a.png", "b.png"], &target).with_min_views(3);
        assert_eq!(built, req);
    }
}
