// This file is part of the Toolscan project.
// src/main.rs - batch entry point
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use toolscan::annotate::Annotator;
use toolscan::config::{DetectorConfig, NarrativeConfig};
use toolscan::detect::DetectorClient;
use toolscan::intake::admit_batch;
use toolscan::narrative::{Narrate, NarrativeClient};
use toolscan::pipeline::Pipeline;

fn main() -> Result<()> {
  dotenv::dotenv().ok();
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  let detector_config = DetectorConfig::from_env().context("detector configuration")?;
  let detector = DetectorClient::new(detector_config)?;

  // The narrative service is optional: without credentials or a prompt the
  // batch still runs, only the narrative fields stay empty.
  let narrator = match NarrativeConfig::from_env() {
    Ok(config) => match NarrativeClient::new(config) {
      Ok(client) => Some(client),
      Err(e) => {
        warn!("narrative client unavailable: {e}");
        None
      }
    },
    Err(e) => {
      warn!("narrative disabled: {e}");
      None
    }
  };

  let admitted = admit_batch(&args.files)?;
  std::fs::create_dir_all(&args.output_dir)
    .with_context(|| format!("cannot create {}", args.output_dir.display()))?;

  let pipeline = Pipeline {
    detector: &detector,
    narrator: narrator.as_ref().map(|n| n as &dyn Narrate),
    annotator: Annotator::default(),
    options: args.preprocess_options(),
    confidence: args.confidence,
    overlap: args.overlap,
    output_dir: args.output_dir.clone(),
    scratch_dir: std::env::temp_dir(),
  };

  let summary = pipeline.process_batch(&admitted);
  println!("{}", serde_json::to_string_pretty(&summary)?);

  if summary.resultados.iter().all(|r| r.succeeded()) {
    Ok(())
  } else {
    std::process::exit(1);
  }
}
