// This file is part of the Toolscan project.
// src/args.rs - command-line arguments
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::path::PathBuf;

use clap::Parser;

use toolscan::detect::{CONFIDENCE_THRESHOLD, OVERLAP_THRESHOLD};
use toolscan::preprocess::{BlurMethod, EdgeMethod, PreprocessOptions, SegmentationMethod};

/// Hand-tool detection over a batch of images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// Images to analyze (png, jpg, jpeg, bmp, webp)
  #[arg(value_name = "IMAGE", required = true)]
  pub files: Vec<PathBuf>,

  /// Minimum detection confidence, percent (0-100)
  #[arg(long, default_value_t = CONFIDENCE_THRESHOLD, value_name = "PERCENT")]
  pub confidence: f32,

  /// Maximum box overlap for duplicate suppression, percent (0-100)
  #[arg(long, default_value_t = OVERLAP_THRESHOLD, value_name = "PERCENT")]
  pub overlap: f32,

  /// Directory for the annotated result images
  #[arg(long, default_value = "uploads", value_name = "DIR")]
  pub output_dir: PathBuf,

  /// Skip the adaptive contrast enhancement step
  #[arg(long)]
  pub no_contrast: bool,

  /// Skip the denoising step
  #[arg(long)]
  pub no_denoise: bool,

  /// Skip the intensity normalization step
  #[arg(long)]
  pub no_normalize: bool,

  /// Denoising filter: gaussian, median, bilateral or average
  #[arg(long, default_value = "gaussian", value_name = "METHOD")]
  pub blur: BlurMethod,

  /// Apply morphological opening and closing after normalization
  #[arg(long)]
  pub morphology: bool,

  /// Overlay an edge map on the normalized image
  #[arg(long)]
  pub edges: bool,

  /// Edge detector: canny, sobel or laplacian
  #[arg(long, default_value = "canny", value_name = "METHOD")]
  pub edge_method: EdgeMethod,

  /// Overlay a segmentation mask on the normalized image
  #[arg(long)]
  pub segmentation: bool,

  /// Segmentation: threshold, otsu or adaptive
  #[arg(long, default_value = "threshold", value_name = "METHOD")]
  pub segmentation_method: SegmentationMethod,
}

impl Args {
  pub fn preprocess_options(&self) -> PreprocessOptions {
    PreprocessOptions {
      enhance_contrast: !self.no_contrast,
      denoise: !self.no_denoise,
      normalize: !self.no_normalize,
      blur: self.blur,
      apply_morphology: self.morphology,
      detect_edges: self.edges,
      edge_method: self.edge_method,
      apply_segmentation: self.segmentation,
      segmentation_method: self.segmentation_method,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_the_detector_thresholds() {
    let args = Args::parse_from(["toolscan", "foto.jpg"]);
    assert_eq!(args.confidence, 60.0);
    assert_eq!(args.overlap, 30.0);
    assert_eq!(args.output_dir, PathBuf::from("uploads"));

    let options = args.preprocess_options();
    assert!(options.enhance_contrast && options.denoise && options.normalize);
    assert_eq!(options.blur, BlurMethod::Gaussian);
    assert!(!options.apply_morphology && !options.detect_edges && !options.apply_segmentation);
    assert_eq!(options.edge_method, EdgeMethod::Canny);
    assert_eq!(options.segmentation_method, SegmentationMethod::Threshold);
  }

  #[test]
  fn structural_stage_flags_are_carried_through() {
    let args = Args::parse_from([
      "toolscan",
      "--morphology",
      "--edges",
      "--edge-method",
      "sobel",
      "--segmentation",
      "--segmentation-method",
      "otsu",
      "foto.png",
    ]);
    let options = args.preprocess_options();
    assert!(options.apply_morphology);
    assert!(options.detect_edges);
    assert_eq!(options.edge_method, EdgeMethod::Sobel);
    assert!(options.apply_segmentation);
    assert_eq!(options.segmentation_method, SegmentationMethod::Otsu);
  }

  #[test]
  fn unknown_edge_method_is_rejected() {
    assert!(Args::try_parse_from(["toolscan", "--edge-method", "prewitt", "foto.png"]).is_err());
  }

  #[test]
  fn toggles_invert_the_preprocess_options() {
    let args = Args::parse_from([
      "toolscan",
      "--no-contrast",
      "--no-normalize",
      "--blur",
      "median",
      "foto.png",
    ]);
    let options = args.preprocess_options();
    assert!(!options.enhance_contrast);
    assert!(options.denoise);
    assert!(!options.normalize);
    assert_eq!(options.blur, BlurMethod::Median);
  }

  #[test]
  fn unknown_blur_method_is_rejected() {
    assert!(Args::try_parse_from(["toolscan", "--blur", "motion", "foto.png"]).is_err());
  }
}
