// This file is part of the Toolscan project.
// src/annotate.rs - detection box and label rendering
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::scale::ScaledDetection;

const BOX_COLOR: [u8; 3] = [0, 255, 0];
const TEXT_COLOR: [u8; 3] = [0, 0, 0];
const BOX_THICKNESS: i32 = 2;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 16;
const LABEL_CHAR_WIDTH: f32 = 8.0; // average glyph width, rough estimate
const LABEL_PADDING: i32 = 3;

const FONT_CANDIDATES: &[&str] = &[
  "assets/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
];

/// Draws detection boxes and class labels on the original image. The font is
/// optional: without one the boxes are still drawn and only the labels are
/// skipped, so the annotated artifact is never blocked on a font file.
pub struct Annotator {
  font: Option<FontVec>,
  box_color: [u8; 3],
  text_color: [u8; 3],
}

impl Default for Annotator {
  fn default() -> Self {
    Self {
      font: load_label_font(),
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
    }
  }
}

fn load_label_font() -> Option<FontVec> {
  let env_font = std::env::var("TOOLSCAN_FONT").ok();
  let candidates = env_font
    .iter()
    .map(String::as_str)
    .chain(FONT_CANDIDATES.iter().copied());

  for candidate in candidates {
    if let Ok(bytes) = std::fs::read(Path::new(candidate)) {
      match FontVec::try_from_vec(bytes) {
        Ok(font) => {
          debug!("label font: {candidate}");
          return Some(font);
        }
        Err(e) => warn!("unusable font {candidate}: {e}"),
      }
    }
  }
  warn!("no label font found, boxes will be drawn without labels");
  None
}

impl Annotator {
  /// Draws every detection onto `image` in place. Degenerate boxes (clamped
  /// down to zero width or height) are skipped.
  pub fn draw(&self, image: &mut RgbImage, detections: &[ScaledDetection]) {
    for detection in detections {
      self.draw_one(image, detection);
    }
  }

  fn draw_one(&self, image: &mut RgbImage, detection: &ScaledDetection) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    let x1 = (detection.x1.floor() as i32).clamp(0, w - 1);
    let y1 = (detection.y1.floor() as i32).clamp(0, h - 1);
    let x2 = (detection.x2.ceil() as i32).clamp(0, w - 1);
    let y2 = (detection.y2.ceil() as i32).clamp(0, h - 1);
    if x1 >= x2 || y1 >= y2 {
      return;
    }

    // Nested hollow rectangles for a thicker border, corners inclusive.
    for inset in 0..BOX_THICKNESS {
      let width = x2 - x1 - 2 * inset + 1;
      let height = y2 - y1 - 2 * inset + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x1 + inset, y1 + inset).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.0}%", detection.class, detection.confidence * 100.0);
    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;

    // Label background above the box, pushed inside the frame when the box
    // touches the top edge.
    let label_x = x1;
    let label_y = (y1 - LABEL_TEXT_HEIGHT - LABEL_PADDING).max(0);
    let label_width = (text_width + 2 * LABEL_PADDING).min(w - label_x);
    let label_height = LABEL_TEXT_HEIGHT + LABEL_PADDING;
    if label_width <= 0 {
      return;
    }

    let background = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, background, Rgb(self.box_color));
    draw_text_mut(
      image,
      Rgb(self.text_color),
      label_x + LABEL_PADDING,
      label_y + LABEL_PADDING / 2,
      PxScale::from(LABEL_FONT_SIZE),
      font,
      &label,
    );
  }
}
