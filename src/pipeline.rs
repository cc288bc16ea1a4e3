// This file is part of the Toolscan project.
// src/pipeline.rs - per-image pipeline and batch orchestration
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::annotate::Annotator;
use crate::detect::{Detect, DetectorError};
use crate::narrative::Narrate;
use crate::preprocess::{NORMALIZED_HEIGHT, NORMALIZED_WIDTH, PreprocessOptions, preprocess};
use crate::report::{build_report, render_text};
use crate::scale::{scale_factor, to_original_space};

/// Progress of one image through the pipeline. Every image ends in `Done`
/// or `Failed`; a failure never touches the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Pending,
  Preprocessed,
  Detected,
  Annotated,
  Reported,
  Narrated,
  Done,
  Failed,
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("Não foi possível carregar a imagem: {0}")]
  Unreadable(image::ImageError),
  #[error("falha ao salvar imagem: {0}")]
  Save(image::ImageError),
  #[error("falha no arquivo temporário: {0}")]
  TempFile(#[from] std::io::Error),
  #[error("falha na detecção: {0}")]
  Detector(#[from] DetectorError),
}

/// One successful image, in the batch response shape.
#[derive(Debug, Serialize)]
pub struct ImageSuccess {
  pub sucesso: bool,
  pub imagem_original: String,
  pub imagem_resultado: String,
  pub relatorio_bruto: String,
  pub mensagem_ia: String,
  pub dados_json: Option<serde_json::Value>,
  pub total_objetos: usize,
  pub tempo_ms: f64,
  pub deteccoes: Vec<crate::detect::Detection>,
}

#[derive(Debug, Serialize)]
pub struct ImageFailure {
  pub sucesso: bool,
  pub imagem_original: String,
  pub erro: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PipelineResult {
  Success(Box<ImageSuccess>),
  Failure(ImageFailure),
}

impl PipelineResult {
  pub fn succeeded(&self) -> bool {
    matches!(self, PipelineResult::Success(_))
  }
}

/// Whole-batch response shape.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
  pub success: bool,
  pub total_imagens: usize,
  pub resultados: Vec<PipelineResult>,
}

/// Runs images through preprocess, detect, annotate, report and narrate.
/// The detector and narrator come in behind trait seams; the narrator is
/// optional and its absence only leaves the narrative fields empty.
pub struct Pipeline<'a> {
  pub detector: &'a dyn Detect,
  pub narrator: Option<&'a dyn Narrate>,
  pub annotator: Annotator,
  pub options: PreprocessOptions,
  pub confidence: f32,
  pub overlap: f32,
  pub output_dir: PathBuf,
  /// Where the normalized copies live while the detector reads them.
  pub scratch_dir: PathBuf,
}

fn file_name_of(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}

impl Pipeline<'_> {
  /// Runs every admitted image and collects the per-image outcomes. The
  /// summary `success` flag describes the batch run, not the images in it.
  pub fn process_batch(&self, paths: &[PathBuf]) -> BatchSummary {
    let mut resultados = Vec::with_capacity(paths.len());
    for path in paths {
      let name = file_name_of(path);
      match self.process_single(path) {
        Ok(success) => {
          info!("{name}: {:?}", Stage::Done);
          resultados.push(PipelineResult::Success(Box::new(success)));
        }
        Err(e) => {
          error!("{name}: {:?}: {e}", Stage::Failed);
          resultados.push(PipelineResult::Failure(ImageFailure {
            sucesso: false,
            imagem_original: name,
            erro: e.to_string(),
          }));
        }
      }
    }

    BatchSummary {
      success: true,
      total_imagens: resultados.len(),
      resultados,
    }
  }

  /// Full pipeline for one image. The normalized copy sent to the detector
  /// lives in a temp file that is removed on every exit path.
  pub fn process_single(&self, path: &Path) -> Result<ImageSuccess, PipelineError> {
    let name = file_name_of(path);
    debug!("{name}: {:?}", Stage::Pending);

    let original = image::open(path)
      .map_err(PipelineError::Unreadable)?
      .to_rgb8();
    let original_size = (original.width(), original.height());

    let normalized = preprocess(
      &original,
      (NORMALIZED_WIDTH, NORMALIZED_HEIGHT),
      &self.options,
    );
    debug!("{name}: {:?}", Stage::Preprocessed);

    let temp = tempfile::Builder::new()
      .prefix("toolscan_")
      .suffix(".png")
      .tempfile_in(&self.scratch_dir)?;
    normalized
      .save_with_format(temp.path(), ImageFormat::Png)
      .map_err(PipelineError::Save)?;

    let outcome = self
      .detector
      .detect(temp.path(), self.confidence, self.overlap)?;
    debug!(
      "{name}: {:?}, {} objects in {:.2} ms",
      Stage::Detected,
      outcome.detections.len(),
      outcome.inference_time_ms
    );

    let scale = scale_factor(original_size, (NORMALIZED_WIDTH, NORMALIZED_HEIGHT));
    let scaled = outcome
      .detections
      .iter()
      .map(|d| to_original_space(d, scale, original_size))
      .collect::<Vec<_>>();

    let artifact = self.write_artifact(&original, &scaled, &name)?;
    debug!("{name}: {:?}", Stage::Annotated);

    let report = build_report(outcome.detections, &name, outcome.inference_time_ms);
    let report_text = render_text(&report);
    debug!("{name}: {:?}", Stage::Reported);

    let (mensagem_ia, dados_json) = match self.narrator {
      Some(narrator) => match narrator.narrate(&report_text) {
        Some(result) => {
          debug!("{name}: {:?}", Stage::Narrated);
          (result.message, result.data)
        }
        None => (String::new(), None),
      },
      None => (String::new(), None),
    };

    Ok(ImageSuccess {
      sucesso: true,
      imagem_original: name,
      imagem_resultado: artifact,
      relatorio_bruto: report_text,
      mensagem_ia,
      dados_json,
      total_objetos: report.total_count,
      tempo_ms: (report.inference_time_ms * 100.0).round() / 100.0,
      deteccoes: report.detections,
    })
  }

  /// Annotates a copy of the original and writes `resultado_<name>` to the
  /// output directory. Nothing is written until drawing is done, so a failed
  /// image never leaves a half-made artifact behind.
  fn write_artifact(
    &self,
    original: &RgbImage,
    scaled: &[crate::scale::ScaledDetection],
    name: &str,
  ) -> Result<String, PipelineError> {
    let mut annotated = original.clone();
    self.annotator.draw(&mut annotated, scaled);

    let artifact_name = format!("resultado_{name}");
    let artifact_path = self.output_dir.join(&artifact_name);
    annotated.save(&artifact_path).map_err(PipelineError::Save)?;
    info!("annotated image saved: {}", artifact_path.display());
    Ok(artifact_name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::{DetectOutcome, Detection};
  use crate::narrative::NarrativeResult;
  use std::io::Write as _;

  struct StubDetector {
    outcome: fn() -> DetectOutcome,
  }

  impl Detect for StubDetector {
    fn detect(
      &self,
      normalized_image: &Path,
      _confidence: f32,
      _overlap: f32,
    ) -> Result<DetectOutcome, DetectorError> {
      // The pipeline must hand the detector a readable normalized image.
      let bytes = std::fs::read(normalized_image)?;
      assert!(!bytes.is_empty());
      Ok((self.outcome)())
    }
  }

  struct FailingDetector;

  impl Detect for FailingDetector {
    fn detect(
      &self,
      _normalized_image: &Path,
      _confidence: f32,
      _overlap: f32,
    ) -> Result<DetectOutcome, DetectorError> {
      Err(DetectorError::Status {
        status: reqwest::StatusCode::FORBIDDEN,
        body: "quota exceeded".to_string(),
      })
    }
  }

  struct StubNarrator;

  impl Narrate for StubNarrator {
    fn narrate(&self, report_text: &str) -> Option<NarrativeResult> {
      assert!(report_text.contains("RELATÓRIO DE DETECÇÃO"));
      Some(NarrativeResult {
        message: "Uma ferramenta encontrada.".to_string(),
        data: Some(serde_json::json!({"total": 1})),
      })
    }
  }

  fn one_hammer() -> DetectOutcome {
    DetectOutcome {
      detections: vec![Detection {
        class: "martelo".to_string(),
        confidence: 0.91,
        x: 320.0,
        y: 320.0,
        width: 100.0,
        height: 80.0,
      }],
      inference_time_ms: 123.456,
    }
  }

  fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::new(64, 48).save(&path).unwrap();
    path
  }

  fn pipeline<'a>(
    detector: &'a dyn Detect,
    narrator: Option<&'a dyn Narrate>,
    output_dir: &Path,
  ) -> Pipeline<'a> {
    Pipeline {
      detector,
      narrator,
      annotator: Annotator::default(),
      options: PreprocessOptions::default(),
      confidence: 60.0,
      overlap: 30.0,
      output_dir: output_dir.to_path_buf(),
      scratch_dir: std::env::temp_dir(),
    }
  }

  #[test]
  fn single_image_produces_artifact_report_and_narrative() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "bancada.png");

    let detector = StubDetector { outcome: one_hammer };
    let result = pipeline(&detector, Some(&StubNarrator), out.path())
      .process_single(&image)
      .unwrap();

    assert!(result.sucesso);
    assert_eq!(result.imagem_original, "bancada.png");
    assert_eq!(result.imagem_resultado, "resultado_bancada.png");
    assert!(out.path().join("resultado_bancada.png").is_file());
    assert_eq!(result.total_objetos, 1);
    assert_eq!(result.tempo_ms, 123.46);
    assert!(result.relatorio_bruto.contains("- martelo: 1 unidade(s)"));
    assert_eq!(result.mensagem_ia, "Uma ferramenta encontrada.");
    assert_eq!(result.dados_json, Some(serde_json::json!({"total": 1})));
  }

  #[test]
  fn missing_narrator_leaves_narrative_fields_empty() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "sem_ia.png");

    let detector = StubDetector { outcome: one_hammer };
    let result = pipeline(&detector, None, out.path())
      .process_single(&image)
      .unwrap();

    assert!(result.mensagem_ia.is_empty());
    assert!(result.dados_json.is_none());
  }

  #[test]
  fn one_broken_image_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let first = write_png(dir.path(), "a.png");
    let broken = dir.path().join("b.png");
    std::fs::File::create(&broken)
      .unwrap()
      .write_all(b"not an image")
      .unwrap();
    let third = write_png(dir.path(), "c.png");

    let detector = StubDetector { outcome: one_hammer };
    let summary = pipeline(&detector, None, out.path()).process_batch(&[first, broken, third]);

    assert!(summary.success);
    assert_eq!(summary.total_imagens, 3);
    assert!(summary.resultados[0].succeeded());
    assert!(!summary.resultados[1].succeeded());
    assert!(summary.resultados[2].succeeded());
    assert!(out.path().join("resultado_a.png").is_file());
    assert!(!out.path().join("resultado_b.png").exists());
    assert!(out.path().join("resultado_c.png").is_file());

    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["total_imagens"], 3);
    assert_eq!(value["resultados"][1]["sucesso"], false);
    assert_eq!(value["resultados"][1]["imagem_original"], "b.png");
    assert!(value["resultados"][1]["erro"].as_str().unwrap().len() > 0);
  }

  #[test]
  fn no_scratch_files_survive_a_batch() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let good = write_png(dir.path(), "a.png");
    let broken = dir.path().join("b.png");
    std::fs::File::create(&broken)
      .unwrap()
      .write_all(b"not an image")
      .unwrap();

    let detector = StubDetector { outcome: one_hammer };
    let mut pipeline = pipeline(&detector, None, out.path());
    pipeline.scratch_dir = scratch.path().to_path_buf();
    let summary = pipeline.process_batch(&[good.clone(), broken]);
    assert!(summary.resultados[0].succeeded());
    assert!(!summary.resultados[1].succeeded());
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);

    // The normalized copy is removed on the detector-error path too.
    let failing = FailingDetector;
    pipeline.detector = &failing;
    let summary = pipeline.process_batch(&[good]);
    assert!(!summary.resultados[0].succeeded());
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
  }

  #[test]
  fn empty_detection_set_still_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let image = write_png(dir.path(), "vazia.png");

    let detector = StubDetector {
      outcome: DetectOutcome::default,
    };
    let result = pipeline(&detector, None, out.path())
      .process_single(&image)
      .unwrap();

    assert_eq!(result.total_objetos, 0);
    assert!(result.deteccoes.is_empty());
    assert!(
      result
        .relatorio_bruto
        .contains("Nenhum objeto das classes conhecidas foi detectado.")
    );
    assert!(out.path().join("resultado_vazia.png").is_file());
  }
}
