// This file is part of the Toolscan project.
// src/intake.rs - batch admission rules
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Extensions accepted at the batch boundary, matched case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Total size cap for one batch, 16 MiB.
pub const MAX_BATCH_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum IntakeError {
  #[error("Nenhuma imagem enviada")]
  NoFiles,
  #[error("Nenhum arquivo válido")]
  NoValidFiles,
  #[error("Lote excede o limite de {limit} bytes (recebido {total})")]
  BatchTooLarge { total: u64, limit: u64 },
  #[error("cannot stat {path}: {source}")]
  Stat {
    path: PathBuf,
    source: std::io::Error,
  },
}

fn has_allowed_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Filters a submitted batch down to the admissible files.
///
/// Files with a disallowed extension are dropped with a warning rather than
/// failing the batch; an empty submission, a batch with nothing admissible,
/// or a batch over the size cap is rejected outright.
pub fn admit_batch(paths: &[PathBuf]) -> Result<Vec<PathBuf>, IntakeError> {
  if paths.is_empty() {
    return Err(IntakeError::NoFiles);
  }

  let mut admitted = Vec::with_capacity(paths.len());
  for path in paths {
    if has_allowed_extension(path) {
      admitted.push(path.clone());
    } else {
      warn!("skipping {}: extension not allowed", path.display());
    }
  }
  if admitted.is_empty() {
    return Err(IntakeError::NoValidFiles);
  }

  let mut total = 0u64;
  for path in &admitted {
    let meta = std::fs::metadata(path).map_err(|source| IntakeError::Stat {
      path: path.clone(),
      source,
    })?;
    total += meta.len();
  }
  if total > MAX_BATCH_BYTES {
    return Err(IntakeError::BatchTooLarge {
      total,
      limit: MAX_BATCH_BYTES,
    });
  }

  Ok(admitted)
}
