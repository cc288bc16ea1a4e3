// This file is part of the Toolscan project.
// src/detect.rs - hosted object-detection client
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DetectorConfig;

/// Minimum confidence, percent. 30-40 finds more objects with more false
/// positives, 70+ keeps only near-certain hits; 60 is the balanced default.
pub const CONFIDENCE_THRESHOLD: f32 = 60.0;

/// Maximum overlap for the detector-side duplicate suppression (NMS),
/// percent. Lower is stricter about nearby boxes; 30 is the default.
pub const OVERLAP_THRESHOLD: f32 = 30.0;

const DETECT_TIMEOUT: Duration = Duration::from_secs(60);

/// One detector hit, in normalized-image coordinates: `x`/`y` are the box
/// center, `width`/`height` the box size. Field names on the wire follow the
/// result contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  #[serde(rename = "classe", alias = "class")]
  pub class: String,
  #[serde(rename = "confianca", alias = "confidence")]
  pub confidence: f32,
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

/// Detections plus the detector-reported inference time for one image.
#[derive(Debug, Clone, Default)]
pub struct DetectOutcome {
  pub detections: Vec<Detection>,
  pub inference_time_ms: f64,
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("failed to read image for detection: {0}")]
  Io(#[from] std::io::Error),
  #[error("detector request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("detector answered {status}: {body}")]
  Status {
    status: reqwest::StatusCode,
    body: String,
  },
}

/// Seam between the orchestrator and the remote detector, so the pipeline is
/// testable without the network.
pub trait Detect {
  fn detect(
    &self,
    normalized_image: &Path,
    confidence: f32,
    overlap: f32,
  ) -> Result<DetectOutcome, DetectorError>;
}

#[derive(Deserialize)]
struct InferenceResponse {
  /// Inference time in seconds, as reported by the hosted service.
  #[serde(default)]
  time: f64,
  #[serde(default)]
  predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
  x: f32,
  y: f32,
  width: f32,
  height: f32,
  confidence: f32,
  class: String,
}

/// Client for the hosted detection API. Constructed once from a validated
/// configuration and reused for every image; construction failure means the
/// service has no detector and is fatal for the process.
pub struct DetectorClient {
  http: reqwest::blocking::Client,
  config: DetectorConfig,
}

impl DetectorClient {
  pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
    let http = reqwest::blocking::Client::builder()
      .timeout(DETECT_TIMEOUT)
      .build()?;
    info!(
      "detector client ready: {}/{} v{}",
      config.workspace, config.project, config.version
    );
    Ok(Self { http, config })
  }

  fn inference_url(&self) -> String {
    format!(
      "{}/{}/{}",
      self.config.endpoint.trim_end_matches('/'),
      self.config.project,
      self.config.version
    )
  }
}

impl Detect for DetectorClient {
  fn detect(
    &self,
    normalized_image: &Path,
    confidence: f32,
    overlap: f32,
  ) -> Result<DetectOutcome, DetectorError> {
    let bytes = std::fs::read(normalized_image)?;
    let body = BASE64.encode(&bytes);
    debug!(
      "submitting {} ({} bytes) confidence={} overlap={}",
      normalized_image.display(),
      bytes.len(),
      confidence,
      overlap
    );

    let confidence_param = confidence.to_string();
    let overlap_param = overlap.to_string();
    let response = self
      .http
      .post(self.inference_url())
      .query(&[
        ("api_key", self.config.api_key.as_str()),
        ("confidence", confidence_param.as_str()),
        ("overlap", overlap_param.as_str()),
      ])
      .header("Content-Type", "application/x-www-form-urlencoded")
      .body(body)
      .send()?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().unwrap_or_default();
      return Err(DetectorError::Status { status, body });
    }

    let answer: InferenceResponse = response.json()?;
    let detections = answer
      .predictions
      .into_iter()
      .map(|p| Detection {
        class: p.class,
        confidence: p.confidence,
        x: p.x,
        y: p.y,
        width: p.width,
        height: p.height,
      })
      .collect::<Vec<_>>();

    debug!("detector returned {} objects in {:.3}s", detections.len(), answer.time);
    Ok(DetectOutcome {
      detections,
      inference_time_ms: answer.time * 1000.0,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detection_serializes_with_wire_names() {
    let detection = Detection {
      class: "alicate".to_string(),
      confidence: 0.8735,
      x: 320.0,
      y: 240.0,
      width: 100.0,
      height: 80.0,
    };
    let value = serde_json::to_value(&detection).unwrap();
    assert_eq!(value["classe"], "alicate");
    assert!((value["confianca"].as_f64().unwrap() - 0.8735).abs() < 1e-6);
    assert_eq!(value["x"], 320.0);
    assert_eq!(value["width"], 100.0);
  }

  #[test]
  fn hosted_response_parses_without_optional_fields() {
    let raw = r#"{"predictions": [
      {"x": 10.0, "y": 20.0, "width": 30.0, "height": 40.0,
       "confidence": 0.75, "class": "martelo", "class_id": 2}
    ]}"#;
    let parsed: InferenceResponse = serde_json::from_str(raw).unwrap();
    assert_eq!(parsed.time, 0.0);
    assert_eq!(parsed.predictions.len(), 1);
    assert_eq!(parsed.predictions[0].class, "martelo");
  }
}
