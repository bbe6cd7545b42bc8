//! Shared helpers for the workspace integration tests

#![allow(dead_code)]

use image::Rgb;
use std::path::{Path, PathBuf};
use video_pipeline_codec::PlanarWriter;
use video_pipeline_common::Frame;
use video_pipeline_core::{ModuleRegistry, ModuleSpec, PipelineConfig, PipelineRequest};

/// Deterministic moving gradient
pub fn gradient(width: u32, height: u32, index: u32) -> Frame {
    Frame::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 255) / width.max(1)) as u8,
            ((y * 255) / height.max(1)) as u8,
            ((x + y + index * 16) % 256) as u8,
        ])
    })
}

/// Write `frames` gradient frames as `{stem}_{w}x{h}_{fps}.yuv` under `dir`
pub fn write_clip(dir: &Path, stem: &str, width: u32, height: u32, fps: u32, frames: u32) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{stem}_{width}x{height}_{fps}.yuv"));
    let mut writer = PlanarWriter::create(&path).unwrap();
    for i in 0..frames {
        writer.write_frame(&gradient(width, height, i)).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// Config rooted in a temporary directory
pub fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        video_dir: root.join("videos"),
        output_dir: root.join("output"),
        binaries_dir: root.join("binaries"),
        channel_capacity: 2,
        ..PipelineConfig::default()
    }
}

pub fn registry() -> ModuleRegistry {
    video_pipeline_modules::default_registry().unwrap()
}

pub fn request(modules: Vec<ModuleSpec>) -> PipelineRequest {
    PipelineRequest { modules }
}

/// Files currently in `dir`, sorted; empty when the directory is absent
pub fn files_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
