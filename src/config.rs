// This file is part of the Toolscan project.
// src/config.rs - environment configuration for the remote services
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

const DEFAULT_DETECTOR_ENDPOINT: &str = "https://detect.roboflow.com";
const DEFAULT_WORKSPACE: &str = "trabalhoaps-wnnex";
const DEFAULT_PROJECT: &str = "constructionaps-twwga";
const DEFAULT_MODEL_VERSION: u32 = 1;
const DEFAULT_NARRATIVE_MODEL: &str = "gemini-2.5-flash";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("environment variable {0} is not set")]
  MissingVariable(&'static str),
  #[error("invalid model version '{0}': {1}")]
  InvalidVersion(String, std::num::ParseIntError),
  #[error("cannot read prompt file {path}: {source}")]
  PromptFile {
    path: PathBuf,
    source: std::io::Error,
  },
}

/// Identity of the hosted detection model. Missing API key is fatal: without
/// a detector there is nothing this service can do.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
  pub api_key: String,
  pub workspace: String,
  pub project: String,
  pub version: u32,
  pub endpoint: String,
}

impl DetectorConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    let api_key = std::env::var("API_KEY_ROBOFLOW")
      .map_err(|_| ConfigError::MissingVariable("API_KEY_ROBOFLOW"))?;
    let workspace =
      std::env::var("ROBOFLOW_WORKSPACE").unwrap_or_else(|_| DEFAULT_WORKSPACE.to_string());
    let project =
      std::env::var("ROBOFLOW_PROJECT").unwrap_or_else(|_| DEFAULT_PROJECT.to_string());
    let version = match std::env::var("ROBOFLOW_VERSION") {
      Ok(raw) => raw
        .parse::<u32>()
        .map_err(|e| ConfigError::InvalidVersion(raw, e))?,
      Err(_) => DEFAULT_MODEL_VERSION,
    };
    let endpoint = std::env::var("ROBOFLOW_ENDPOINT")
      .unwrap_or_else(|_| DEFAULT_DETECTOR_ENDPOINT.to_string());

    info!("detector model: {}/{} v{}", workspace, project, version);
    Ok(Self {
      api_key,
      workspace,
      project,
      version,
      endpoint,
    })
  }
}

/// Credentials and prompt for the narrative service. Unlike the detector,
/// a missing key or prompt file only disables the narrative stage.
#[derive(Debug, Clone)]
pub struct NarrativeConfig {
  pub api_key: String,
  pub model: String,
  pub system_instruction: String,
}

impl NarrativeConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    let api_key =
      std::env::var("API_KEY").map_err(|_| ConfigError::MissingVariable("API_KEY"))?;
    let model =
      std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_NARRATIVE_MODEL.to_string());
    let prompt_path = PathBuf::from(
      std::env::var("PROMPT_FILE").map_err(|_| ConfigError::MissingVariable("PROMPT_FILE"))?,
    );
    let system_instruction =
      std::fs::read_to_string(&prompt_path).map_err(|source| ConfigError::PromptFile {
        path: prompt_path,
        source,
      })?;

    info!("narrative model: {}", model);
    Ok(Self {
      api_key,
      model,
      system_instruction,
    })
  }
}
