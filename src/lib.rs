// This file is part of the Toolscan project.
// src/lib.rs - library root
//
// This file is licensed under the Apache License, Version 2.0;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
//
// Copyright (C) 2026 Toolscan Developers

pub mod annotate;
pub mod config;
pub mod detect;
pub mod intake;
pub mod narrative;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod scale;
