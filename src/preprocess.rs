// This file is part of the Toolscan project.
// src/preprocess.rs - image normalization ahead of detection
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::str::FromStr;

use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use imageproc::contrast::otsu_level;
use imageproc::edges::canny;
use imageproc::filter::{filter3x3, gaussian_blur_f32, median_filter};
use thiserror::Error;
use tracing::debug;

/// Side length of the normalized image submitted to the detector.
/// Every downstream scale computation derives from these two constants.
pub const NORMALIZED_WIDTH: u32 = 640;
pub const NORMALIZED_HEIGHT: u32 = 640;

const CLAHE_CLIP_LIMIT: f32 = 2.0;
const CLAHE_TILE_GRID: u32 = 8;

// Equivalent of a 3x3 gaussian kernel with automatic sigma.
const GAUSSIAN_SIGMA: f32 = 0.8;

const BILATERAL_RADIUS: i64 = 2; // diameter 5
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPACE: f32 = 75.0;

const CANNY_LOW_THRESHOLD: f32 = 50.0;
const CANNY_HIGH_THRESHOLD: f32 = 150.0;
const EDGE_IMAGE_WEIGHT: f32 = 0.7;
const EDGE_OVERLAY_WEIGHT: f32 = 0.3;

const FIXED_THRESHOLD: u8 = 127;
// Equivalent of an 11x11 gaussian window for the local-mean threshold.
const ADAPTIVE_SIGMA: f32 = 2.0;
const ADAPTIVE_OFFSET: f32 = 2.0;
const SEGMENT_IMAGE_WEIGHT: f32 = 0.6;
const SEGMENT_OVERLAY_WEIGHT: f32 = 0.4;

const SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];
const SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];
const LAPLACIAN: [f32; 9] = [0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0];

/// Smoothing kernel applied when denoising is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlurMethod {
  #[default]
  Gaussian,
  Median,
  Bilateral,
  Average,
}

#[derive(Error, Debug)]
#[error("unsupported blur method '{0}' (expected gaussian, median, bilateral or average)")]
pub struct UnknownBlurMethod(String);

impl FromStr for BlurMethod {
  type Err = UnknownBlurMethod;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "gaussian" => Ok(BlurMethod::Gaussian),
      "median" => Ok(BlurMethod::Median),
      "bilateral" => Ok(BlurMethod::Bilateral),
      "average" => Ok(BlurMethod::Average),
      other => Err(UnknownBlurMethod(other.to_string())),
    }
  }
}

/// Edge detector used for the optional edge overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeMethod {
  #[default]
  Canny,
  Sobel,
  Laplacian,
}

#[derive(Error, Debug)]
#[error("unsupported edge method '{0}' (expected canny, sobel or laplacian)")]
pub struct UnknownEdgeMethod(String);

impl FromStr for EdgeMethod {
  type Err = UnknownEdgeMethod;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "canny" => Ok(EdgeMethod::Canny),
      "sobel" => Ok(EdgeMethod::Sobel),
      "laplacian" => Ok(EdgeMethod::Laplacian),
      other => Err(UnknownEdgeMethod(other.to_string())),
    }
  }
}

/// Binarization used for the optional segmentation overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentationMethod {
  #[default]
  Threshold,
  Otsu,
  Adaptive,
}

#[derive(Error, Debug)]
#[error("unsupported segmentation method '{0}' (expected threshold, otsu or adaptive)")]
pub struct UnknownSegmentationMethod(String);

impl FromStr for SegmentationMethod {
  type Err = UnknownSegmentationMethod;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "threshold" => Ok(SegmentationMethod::Threshold),
      "otsu" => Ok(SegmentationMethod::Otsu),
      "adaptive" => Ok(SegmentationMethod::Adaptive),
      other => Err(UnknownSegmentationMethod(other.to_string())),
    }
  }
}

/// Toggles for the optional preprocessing stages. The resize to the target
/// size is not optional: it fixes the coordinate space the detector answers
/// in. Morphology, edges and segmentation are off by default; they trade
/// photographic detail for structure and are meant for experimentation.
#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
  pub enhance_contrast: bool,
  pub denoise: bool,
  pub normalize: bool,
  pub blur: BlurMethod,
  pub apply_morphology: bool,
  pub detect_edges: bool,
  pub edge_method: EdgeMethod,
  pub apply_segmentation: bool,
  pub segmentation_method: SegmentationMethod,
}

impl Default for PreprocessOptions {
  fn default() -> Self {
    Self {
      enhance_contrast: true,
      denoise: true,
      normalize: true,
      blur: BlurMethod::Gaussian,
      apply_morphology: false,
      detect_edges: false,
      edge_method: EdgeMethod::Canny,
      apply_segmentation: false,
      segmentation_method: SegmentationMethod::Threshold,
    }
  }
}

/// Normalizes an image for the detector: resize to `target`, then the
/// optional contrast/denoise/intensity stages, then the optional structural
/// stages (morphology, edge overlay, segmentation overlay). Pure function,
/// deterministic for a fixed set of options; output always has exactly
/// `target` dimensions.
pub fn preprocess(image: &RgbImage, target: (u32, u32), options: &PreprocessOptions) -> RgbImage {
  let (target_w, target_h) = target;
  debug!(
    "preprocessing {}x{} -> {}x{} ({:?})",
    image.width(),
    image.height(),
    target_w,
    target_h,
    options
  );

  let mut out = imageops::resize(image, target_w, target_h, imageops::FilterType::Triangle);

  if options.enhance_contrast {
    out = equalize_luminance(&out);
  }

  if options.denoise {
    out = match options.blur {
      BlurMethod::Gaussian => gaussian_blur_f32(&out, GAUSSIAN_SIGMA),
      BlurMethod::Median => median_filter(&out, 1, 1),
      BlurMethod::Bilateral => bilateral_filter(
        &out,
        BILATERAL_RADIUS,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPACE,
      ),
      BlurMethod::Average => box_mean3(&out),
    };
  }

  if options.normalize {
    out = stretch_intensity(&out);
  }

  if options.apply_morphology {
    out = morphology_open_close(&out);
  }

  if options.detect_edges {
    let edges = edge_map(&luma_plane(&out), options.edge_method);
    out = blend_overlay(&out, &edges, EDGE_IMAGE_WEIGHT, EDGE_OVERLAY_WEIGHT);
  }

  if options.apply_segmentation {
    let mask = segment_mask(&luma_plane(&out), options.segmentation_method);
    out = blend_overlay(&out, &mask, SEGMENT_IMAGE_WEIGHT, SEGMENT_OVERLAY_WEIGHT);
  }

  out
}

/// BT.601 luminance plane of an RGB image.
fn luma_plane(image: &RgbImage) -> GrayImage {
  GrayImage::from_fn(image.width(), image.height(), |x, y| {
    let [r, g, b] = image.get_pixel(x, y).0;
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    Luma([y.round().clamp(0.0, 255.0) as u8])
  })
}

/// Contrast-limited adaptive histogram equalization on the luminance channel
/// only. The chrominance is untouched: in BT.601 YCbCr every RGB channel is
/// Y plus a chroma term, so replacing Y with the equalized value is the same
/// as adding the luma delta to each channel.
fn equalize_luminance(image: &RgbImage) -> RgbImage {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return image.clone();
  }

  let luma = luma_plane(image).into_raw();
  let luts = clahe_tile_luts(&luma, width, height);
  let equalized = interpolate_tile_luts(&luma, width, height, &luts);

  let mut out = image.clone();
  for (i, pixel) in out.pixels_mut().enumerate() {
    let delta = equalized[i] as i16 - luma[i] as i16;
    for channel in pixel.0.iter_mut() {
      *channel = (*channel as i16 + delta).clamp(0, 255) as u8;
    }
  }
  out
}

/// One clipped-histogram lookup table per tile of the 8x8 grid.
fn clahe_tile_luts(luma: &[u8], width: u32, height: u32) -> Vec<[u8; 256]> {
  let grid = CLAHE_TILE_GRID;
  let tile_w = width.div_ceil(grid).max(1);
  let tile_h = height.div_ceil(grid).max(1);

  let mut luts = Vec::with_capacity((grid * grid) as usize);
  for ty in 0..grid {
    for tx in 0..grid {
      let x0 = tx * tile_w;
      let y0 = ty * tile_h;
      let x1 = (x0 + tile_w).min(width);
      let y1 = (y0 + tile_h).min(height);

      let mut histogram = [0u32; 256];
      let mut count = 0u32;
      for y in y0..y1 {
        for x in x0..x1 {
          let value = luma[(y * width + x) as usize];
          histogram[value as usize] += 1;
          count += 1;
        }
      }

      if count == 0 {
        // Tile fully outside the image on narrow inputs; identity mapping.
        let mut identity = [0u8; 256];
        for (v, slot) in identity.iter_mut().enumerate() {
          *slot = v as u8;
        }
        luts.push(identity);
        continue;
      }

      // Clip the histogram and spread the excess evenly over all bins.
      let clip = ((CLAHE_CLIP_LIMIT * count as f32 / 256.0).round() as u32).max(1);
      let mut excess = 0u32;
      for bin in histogram.iter_mut() {
        if *bin > clip {
          excess += *bin - clip;
          *bin = clip;
        }
      }
      let bonus = excess / 256;
      let mut remainder = excess % 256;
      for bin in histogram.iter_mut() {
        *bin += bonus;
        if remainder > 0 {
          *bin += 1;
          remainder -= 1;
        }
      }

      let mut lut = [0u8; 256];
      let mut cumulative = 0u32;
      for (v, slot) in lut.iter_mut().enumerate() {
        cumulative += histogram[v];
        *slot = ((cumulative as f32 * 255.0 / count as f32).round()).clamp(0.0, 255.0) as u8;
      }
      luts.push(lut);
    }
  }
  luts
}

/// Maps every pixel through the four nearest tile LUTs with bilinear weights,
/// which removes the visible seams a per-tile mapping would leave.
fn interpolate_tile_luts(luma: &[u8], width: u32, height: u32, luts: &[[u8; 256]]) -> Vec<u8> {
  let grid = CLAHE_TILE_GRID;
  let tile_w = width.div_ceil(grid).max(1) as f32;
  let tile_h = height.div_ceil(grid).max(1) as f32;
  let last = (grid - 1) as f32;

  let mut out = vec![0u8; luma.len()];
  for y in 0..height {
    let gy = ((y as f32 + 0.5) / tile_h - 0.5).clamp(0.0, last);
    let ty0 = gy.floor() as u32;
    let ty1 = (ty0 + 1).min(grid - 1);
    let fy = gy - ty0 as f32;

    for x in 0..width {
      let gx = ((x as f32 + 0.5) / tile_w - 0.5).clamp(0.0, last);
      let tx0 = gx.floor() as u32;
      let tx1 = (tx0 + 1).min(grid - 1);
      let fx = gx - tx0 as f32;

      let value = luma[(y * width + x) as usize] as usize;
      let top = luts[(ty0 * grid + tx0) as usize][value] as f32 * (1.0 - fx)
        + luts[(ty0 * grid + tx1) as usize][value] as f32 * fx;
      let bottom = luts[(ty1 * grid + tx0) as usize][value] as f32 * (1.0 - fx)
        + luts[(ty1 * grid + tx1) as usize][value] as f32 * fx;
      let mixed = top * (1.0 - fy) + bottom * fy;
      out[(y * width + x) as usize] = mixed.round().clamp(0.0, 255.0) as u8;
    }
  }
  out
}

/// Edge-preserving smoothing: weights combine spatial distance with color
/// distance so strong edges keep their contrast.
fn bilateral_filter(image: &RgbImage, radius: i64, sigma_color: f32, sigma_space: f32) -> RgbImage {
  let (width, height) = image.dimensions();
  let inv_color = -1.0 / (2.0 * sigma_color * sigma_color);
  let inv_space = -1.0 / (2.0 * sigma_space * sigma_space);

  let mut out = RgbImage::new(width, height);
  for y in 0..height as i64 {
    for x in 0..width as i64 {
      let center = image.get_pixel(x as u32, y as u32).0;
      let mut accum = [0.0f32; 3];
      let mut total_weight = 0.0f32;

      for dy in -radius..=radius {
        for dx in -radius..=radius {
          let ny = (y + dy).clamp(0, height as i64 - 1) as u32;
          let nx = (x + dx).clamp(0, width as i64 - 1) as u32;
          let neighbor = image.get_pixel(nx, ny).0;

          let mut color_dist2 = 0.0f32;
          for c in 0..3 {
            let diff = neighbor[c] as f32 - center[c] as f32;
            color_dist2 += diff * diff;
          }
          let spatial_dist2 = (dx * dx + dy * dy) as f32;
          let weight = (spatial_dist2 * inv_space + color_dist2 * inv_color).exp();

          for c in 0..3 {
            accum[c] += neighbor[c] as f32 * weight;
          }
          total_weight += weight;
        }
      }

      let pixel = out.get_pixel_mut(x as u32, y as u32);
      for c in 0..3 {
        pixel.0[c] = (accum[c] / total_weight).round().clamp(0.0, 255.0) as u8;
      }
    }
  }
  out
}

/// Plain 3x3 mean filter with clamped borders.
fn box_mean3(image: &RgbImage) -> RgbImage {
  let (width, height) = image.dimensions();
  let mut out = RgbImage::new(width, height);
  for y in 0..height as i64 {
    for x in 0..width as i64 {
      let mut accum = [0u32; 3];
      for dy in -1..=1 {
        for dx in -1..=1 {
          let ny = (y + dy).clamp(0, height as i64 - 1) as u32;
          let nx = (x + dx).clamp(0, width as i64 - 1) as u32;
          let neighbor = image.get_pixel(nx, ny).0;
          for c in 0..3 {
            accum[c] += neighbor[c] as u32;
          }
        }
      }
      let pixel = out.get_pixel_mut(x as u32, y as u32);
      for c in 0..3 {
        pixel.0[c] = ((accum[c] as f32 / 9.0).round()) as u8;
      }
    }
  }
  out
}

/// Linear min/max stretch so the observed intensity range maps onto 0..255.
fn stretch_intensity(image: &RgbImage) -> RgbImage {
  let mut min = u8::MAX;
  let mut max = u8::MIN;
  for value in image.as_raw() {
    min = min.min(*value);
    max = max.max(*value);
  }
  if max <= min {
    return image.clone();
  }

  let scale = 255.0 / (max - min) as f32;
  let mut out = image.clone();
  for value in out.iter_mut() {
    *value = ((*value - min) as f32 * scale).round().clamp(0.0, 255.0) as u8;
  }
  out
}

/// 3x3 per-channel min/max fold with clamped borders, the building block for
/// erosion (min) and dilation (max).
fn morph3(image: &RgbImage, pick: fn(u8, u8) -> u8) -> RgbImage {
  let (width, height) = image.dimensions();
  let mut out = RgbImage::new(width, height);
  for y in 0..height as i64 {
    for x in 0..width as i64 {
      let mut accum = image.get_pixel(x as u32, y as u32).0;
      for dy in -1..=1 {
        for dx in -1..=1 {
          let ny = (y + dy).clamp(0, height as i64 - 1) as u32;
          let nx = (x + dx).clamp(0, width as i64 - 1) as u32;
          let neighbor = image.get_pixel(nx, ny).0;
          for c in 0..3 {
            accum[c] = pick(accum[c], neighbor[c]);
          }
        }
      }
      out.get_pixel_mut(x as u32, y as u32).0 = accum;
    }
  }
  out
}

/// Opening (erode then dilate, drops small specks) followed by closing
/// (dilate then erode, fills small holes), 3x3 structuring element.
fn morphology_open_close(image: &RgbImage) -> RgbImage {
  let opened = morph3(&morph3(image, u8::min), u8::max);
  morph3(&morph3(&opened, u8::max), u8::min)
}

fn edge_map(gray: &GrayImage, method: EdgeMethod) -> GrayImage {
  match method {
    EdgeMethod::Canny => canny(gray, CANNY_LOW_THRESHOLD, CANNY_HIGH_THRESHOLD),
    EdgeMethod::Sobel => {
      let gx = filter3x3::<Luma<u8>, f32, f32>(gray, &SOBEL_X);
      let gy = filter3x3::<Luma<u8>, f32, f32>(gray, &SOBEL_Y);
      GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let magnitude = gx.get_pixel(x, y)[0].hypot(gy.get_pixel(x, y)[0]);
        Luma([magnitude.round().clamp(0.0, 255.0) as u8])
      })
    }
    EdgeMethod::Laplacian => {
      let lap = filter3x3::<Luma<u8>, f32, f32>(gray, &LAPLACIAN);
      GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([lap.get_pixel(x, y)[0].abs().round().clamp(0.0, 255.0) as u8])
      })
    }
  }
}

fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
  GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
    Luma([if gray.get_pixel(x, y)[0] > threshold {
      255
    } else {
      0
    }])
  })
}

fn segment_mask(gray: &GrayImage, method: SegmentationMethod) -> GrayImage {
  match method {
    SegmentationMethod::Threshold => binarize(gray, FIXED_THRESHOLD),
    SegmentationMethod::Otsu => binarize(gray, otsu_level(gray)),
    SegmentationMethod::Adaptive => {
      // Pixel vs. local gaussian-weighted mean minus a small offset, for
      // unevenly lit images.
      let local_mean = gaussian_blur_f32(gray, ADAPTIVE_SIGMA);
      GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y)[0] as f32;
        let cutoff = local_mean.get_pixel(x, y)[0] as f32 - ADAPTIVE_OFFSET;
        Luma([if value > cutoff { 255 } else { 0 }])
      })
    }
  }
}

/// Weighted blend of the image with a single-channel overlay replicated
/// across RGB.
fn blend_overlay(
  image: &RgbImage,
  overlay: &GrayImage,
  image_weight: f32,
  overlay_weight: f32,
) -> RgbImage {
  RgbImage::from_fn(image.width(), image.height(), |x, y| {
    let mixed_in = overlay.get_pixel(x, y)[0] as f32 * overlay_weight;
    let pixel = image.get_pixel(x, y).0;
    Rgb(std::array::from_fn(|c| {
      (pixel[c] as f32 * image_weight + mixed_in)
        .round()
        .clamp(0.0, 255.0) as u8
    }))
  })
}
