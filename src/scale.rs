// This file is part of the Toolscan project.
// src/scale.rs - detector-space to original-space coordinate mapping
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use crate::detect::Detection;

/// A detection re-expressed as a clipped corner box in the original image's
/// pixel space. The detector only ever sees the normalized image, so every
/// box must go through this mapping before it can be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledDetection {
  pub class: String,
  pub confidence: f32,
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

/// Linear factors from the normalized detection space back to the original
/// pixel space. Both factors are positive for any non-empty image.
pub fn scale_factor(original: (u32, u32), normalized: (u32, u32)) -> (f32, f32) {
  let (original_w, original_h) = original;
  let (normalized_w, normalized_h) = normalized;
  (
    original_w as f32 / normalized_w as f32,
    original_h as f32 / normalized_h as f32,
  )
}

/// Converts a center+size detection into a corner box in original-space
/// pixels, clamped to the image bounds. After clamping `x1 <= x2` and
/// `y1 <= y2` always hold.
pub fn to_original_space(
  detection: &Detection,
  scale: (f32, f32),
  original: (u32, u32),
) -> ScaledDetection {
  let (scale_x, scale_y) = scale;
  let (original_w, original_h) = (original.0 as f32, original.1 as f32);

  let center_x = detection.x * scale_x;
  let center_y = detection.y * scale_y;
  let half_w = detection.width * scale_x / 2.0;
  let half_h = detection.height * scale_y / 2.0;

  ScaledDetection {
    class: detection.class.clone(),
    confidence: detection.confidence,
    x1: (center_x - half_w).clamp(0.0, original_w),
    y1: (center_y - half_h).clamp(0.0, original_h),
    x2: (center_x + half_w).clamp(0.0, original_w),
    y2: (center_y + half_h).clamp(0.0, original_h),
  }
}
