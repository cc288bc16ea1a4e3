// This file is part of the Toolscan project.
// src/report.rs - detection aggregation and report rendering
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

use std::fmt::Write as _;

use crate::detect::Detection;

const BANNER_WIDTH: usize = 50;
const TITLE_INDENT: usize = 15;

/// Aggregated view of one image's detections. Built once per image and not
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct Report {
  pub image_name: String,
  pub total_count: usize,
  /// Class -> count, in first-seen order. The order is part of the rendered
  /// text, which in turn is the narrative prompt payload.
  pub per_class_counts: Vec<(String, usize)>,
  pub detections: Vec<Detection>,
  pub inference_time_ms: f64,
}

/// Counts detections per class, preserving the order classes first appear in.
pub fn build_report(detections: Vec<Detection>, image_name: &str, inference_time_ms: f64) -> Report {
  let mut per_class_counts: Vec<(String, usize)> = Vec::new();
  for detection in &detections {
    match per_class_counts
      .iter_mut()
      .find(|(class, _)| *class == detection.class)
    {
      Some((_, count)) => *count += 1,
      None => per_class_counts.push((detection.class.clone(), 1)),
    }
  }

  Report {
    image_name: image_name.to_string(),
    total_count: detections.len(),
    per_class_counts,
    detections,
    inference_time_ms,
  }
}

/// Renders the fixed report template. The wording and layout are stable on
/// purpose: this text is sent verbatim to the narrative service, so changes
/// here change what the model is prompted with.
pub fn render_text(report: &Report) -> String {
  let banner = "=".repeat(BANNER_WIDTH);
  let divider = "-".repeat(BANNER_WIDTH);

  let mut text = String::new();
  let _ = writeln!(text, "{banner}");
  let _ = writeln!(text, "{}📊 RELATÓRIO DE DETECÇÃO 📊", " ".repeat(TITLE_INDENT));
  let _ = writeln!(text, "{banner}");
  let _ = writeln!(text, "🖼️ Imagem Analisada: {}", report.image_name);
  let _ = writeln!(text, "⏱️ Tempo de Análise: {:.2} ms", report.inference_time_ms);
  let _ = writeln!(text, "🔢 Total de Objetos Detectados: {}", report.total_count);
  let _ = writeln!(text, "{divider}");

  if report.per_class_counts.is_empty() {
    let _ = writeln!(text, "⚪ Nenhum objeto das classes conhecidas foi detectado.");
  } else {
    let _ = writeln!(text, "📋 Resumo por Classe:");
    for (class, count) in &report.per_class_counts {
      let _ = writeln!(text, "- {class}: {count} unidade(s)");
    }
  }

  if !report.detections.is_empty() {
    let _ = writeln!(text, "{divider}");
    let _ = writeln!(text, "🔍 Detalhes Individuais:");
    for (i, detection) in report.detections.iter().enumerate() {
      let _ = writeln!(text, " ➡️ Objeto #{}:", i + 1);
      let _ = writeln!(text, " - Classe: {}", detection.class);
      let _ = writeln!(text, " - Confiança: {:.2}%", detection.confidence * 100.0);
    }
  }

  let _ = writeln!(text, "{banner}");
  text
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(class: &str, confidence: f32) -> Detection {
    Detection {
      class: class.to_string(),
      confidence,
      x: 100.0,
      y: 100.0,
      width: 50.0,
      height: 50.0,
    }
  }

  #[test]
  fn empty_report_has_zero_total_and_the_no_objects_line() {
    let report = build_report(Vec::new(), "vazio.jpg", 12.5);
    assert_eq!(report.total_count, 0);
    assert!(report.per_class_counts.is_empty());

    let text = render_text(&report);
    assert!(text.contains("Nenhum objeto das classes conhecidas foi detectado."));
    assert!(!text.contains("Resumo por Classe"));
    assert!(!text.contains("Detalhes Individuais"));
  }

  #[test]
  fn classes_are_counted_in_first_seen_order() {
    let detections = vec![
      detection("martelo", 0.9),
      detection("alicate", 0.8),
      detection("martelo", 0.7),
      detection("chave_de_fenda", 0.95),
      detection("alicate", 0.6),
    ];
    let report = build_report(detections, "bancada.jpg", 87.3);
    assert_eq!(report.total_count, 5);
    assert_eq!(
      report.per_class_counts,
      vec![
        ("martelo".to_string(), 2),
        ("alicate".to_string(), 2),
        ("chave_de_fenda".to_string(), 1),
      ]
    );
  }

  #[test]
  fn rendered_text_carries_counts_times_and_confidences() {
    let detections = vec![detection("alicate", 0.8735), detection("alicate", 0.62)];
    let report = build_report(detections, "alicate.jpeg", 153.456);
    let text = render_text(&report);

    assert!(text.contains("🖼️ Imagem Analisada: alicate.jpeg"));
    assert!(text.contains("⏱️ Tempo de Análise: 153.46 ms"));
    assert!(text.contains("🔢 Total de Objetos Detectados: 2"));
    assert!(text.contains("- alicate: 2 unidade(s)"));
    assert!(text.contains(" ➡️ Objeto #1:"));
    assert!(text.contains(" - Confiança: 87.35%"));
    assert!(text.contains(" - Confiança: 62.00%"));
  }
}
