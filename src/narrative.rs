// This file is part of the Toolscan project.
// src/narrative.rs - narrative generation client and answer parsing
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::NarrativeConfig;

const NARRATIVE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const NARRATIVE_TIMEOUT: Duration = Duration::from_secs(60);

const MESSAGE_MARKER: &str = "**MENSAGEM:**";
const JSON_MARKER: &str = "**JSON:**";
const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// What the narrative model produced for one report: the prose message and,
/// when the model followed the instructed format, the embedded structured
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeResult {
  pub message: String,
  pub data: Option<serde_json::Value>,
}

/// Seam between the orchestrator and the narrative model. The narrative is
/// decoration on top of the detections: implementations return `None` when
/// they cannot produce one, and the pipeline carries on.
pub trait Narrate {
  fn narrate(&self, report_text: &str) -> Option<NarrativeResult>;
}

#[derive(Serialize)]
struct GenerateRequest {
  system_instruction: ContentBlock,
  contents: Vec<ContentBlock>,
}

#[derive(Serialize)]
struct ContentBlock {
  parts: Vec<TextPart>,
}

#[derive(Serialize, Deserialize)]
struct TextPart {
  text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<TextPart>,
}

/// Client for the `generateContent` narrative API.
pub struct NarrativeClient {
  http: reqwest::blocking::Client,
  config: NarrativeConfig,
}

impl NarrativeClient {
  pub fn new(config: NarrativeConfig) -> Result<Self, reqwest::Error> {
    let http = reqwest::blocking::Client::builder()
      .timeout(NARRATIVE_TIMEOUT)
      .build()?;
    Ok(Self { http, config })
  }

  fn generate_url(&self) -> String {
    format!("{}/{}:generateContent", NARRATIVE_ENDPOINT, self.config.model)
  }

  /// Sends the rendered report and returns the raw model text, or `None` on
  /// any transport or shape problem. Failures here are logged and absorbed.
  fn generate(&self, report_text: &str) -> Option<String> {
    let request = GenerateRequest {
      system_instruction: ContentBlock {
        parts: vec![TextPart {
          text: self.config.system_instruction.clone(),
        }],
      },
      contents: vec![ContentBlock {
        parts: vec![TextPart {
          text: report_text.to_string(),
        }],
      }],
    };

    let response = match self
      .http
      .post(self.generate_url())
      .query(&[("key", self.config.api_key.as_str())])
      .json(&request)
      .send()
    {
      Ok(response) => response,
      Err(e) => {
        warn!("narrative request failed: {e}");
        return None;
      }
    };

    let status = response.status();
    if !status.is_success() {
      warn!("narrative service answered {status}");
      return None;
    }

    let answer: GenerateResponse = match response.json() {
      Ok(answer) => answer,
      Err(e) => {
        warn!("unreadable narrative answer: {e}");
        return None;
      }
    };

    let text = answer
      .candidates
      .into_iter()
      .next()?
      .content
      .parts
      .into_iter()
      .next()?
      .text;
    debug!("narrative answer: {} chars", text.len());
    Some(text)
  }
}

impl Narrate for NarrativeClient {
  fn narrate(&self, report_text: &str) -> Option<NarrativeResult> {
    let raw = self.generate(report_text)?;
    let (message, data) = extract_payload(&raw);
    Some(NarrativeResult { message, data })
  }
}

/// Splits a model answer into prose and the embedded JSON payload.
///
/// The instructed format is `**MENSAGEM:** <prose> **JSON:** <object>`, with
/// the object optionally wrapped in a ```` ```json ```` fence. Answers that
/// skip the markers but still carry a fenced object are handled too. When
/// nothing parses, the whole answer becomes the message and the payload is
/// `None`; this function never fails.
pub fn extract_payload(raw: &str) -> (String, Option<serde_json::Value>) {
  if raw.contains(MESSAGE_MARKER) {
    // The marker is stripped, not split on: prose before it is kept.
    let mut parts = raw.splitn(2, JSON_MARKER);
    let message = parts
      .next()
      .unwrap_or_default()
      .replace(MESSAGE_MARKER, "")
      .trim()
      .to_string();
    match parts.next() {
      Some(json_part) => {
        let json_str = json_part
          .replace(FENCE_OPEN, "")
          .replace(FENCE_CLOSE, "")
          .trim()
          .to_string();
        match serde_json::from_str(&json_str) {
          Ok(value) => (message, Some(value)),
          Err(e) => {
            warn!("narrative payload does not parse: {e}");
            (raw.trim().to_string(), None)
          }
        }
      }
      None => (message, None),
    }
  } else if let Some(fence_start) = raw.find(FENCE_OPEN) {
    let body_start = fence_start + FENCE_OPEN.len();
    let parsed = raw[body_start..]
      .find(FENCE_CLOSE)
      .and_then(|end| serde_json::from_str(raw[body_start..body_start + end].trim()).ok());
    match parsed {
      Some(value) => (raw[..fence_start].trim().to_string(), Some(value)),
      None => {
        warn!("fenced narrative payload does not parse");
        (raw.trim().to_string(), None)
      }
    }
  } else {
    (raw.trim().to_string(), None)
  }
}
