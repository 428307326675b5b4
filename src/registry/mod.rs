//! Model registry & auto-selection (spec §4.3, component C4).
//!
//! Scans a directory for GGUF models, estimates their resource cost from
//! file size and quantization tag, and scores each against detected
//! hardware to pick the best fit.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::gguf;
use crate::hardware::HardwareInfo;

const SCAN_CAP: usize = 128;

/// Bytes-per-parameter used to back out a parameter estimate from file size,
/// keyed by quantization family (spec §9 open question: "read the quant-type
/// tag from GGUF metadata and apply a per-encoding constant").
fn bytes_per_param(quant_family: &str) -> f64 {
    match quant_family {
        "i2_s" => 0.35,
        "f16" => 2.0,
        "f32" => 4.0,
        // Generic k-quant/legacy-quant average; close enough for a ranking
        // heuristic, never used for anything load-bearing.
        "quantized" => 0.6,
        _ => 0.35,
    }
}

/// A scanned, scored GGUF candidate (spec §3 `ModelEntry`). Immutable once
/// created; a scan batch is freed together when the `Vec` drops.
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub path: PathBuf,
    pub name: String,
    pub file_size_mb: f64,
    pub est_ram_mb: f64,
    pub est_params_b: f64,
    pub fits_in_ram: bool,
    pub score: f64,
}

/// Depth-first scan of `dir` for `*.gguf` files, capped at 128 entries
/// (spec §4.3), scored against `hw` and sorted by score descending.
pub fn scan(dir: &Path, hw: &HardwareInfo) -> Result<Vec<ModelEntry>> {
    let mut paths = Vec::new();
    walk(dir, &mut paths)?;

    let mut entries: Vec<ModelEntry> = paths
        .into_iter()
        .filter_map(|path| match build_entry(&path, hw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping {}: {e}", path.display());
                None
            }
        })
        .collect();

    // Stable sort: ties broken by scan order (spec §4.3).
    entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(entries)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if out.len() >= SCAN_CAP || !dir.is_dir() {
        return Ok(());
    }
    let mut read_dir: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    read_dir.sort_by_key(|e| e.file_name());

    for entry in read_dir {
        if out.len() >= SCAN_CAP {
            break;
        }
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if file_type.is_symlink() {
            // "following no symlinks implicitly" — spec §4.3.
            continue;
        }
        if file_type.is_dir() {
            walk(&path, out)?;
        } else if file_type.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some("gguf")
        {
            out.push(path);
        }
    }
    Ok(())
}

fn build_entry(path: &Path, hw: &HardwareInfo) -> Result<ModelEntry> {
    let meta = gguf::read_metadata(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let file_size_mb = meta.file_size_bytes as f64 / (1024.0 * 1024.0);
    let est_ram_mb = file_size_mb * 1.3 + 100.0;

    let quant_family = gguf::quant_family_tag(&meta);
    let bpp = bytes_per_param(quant_family);
    let est_params_b = (meta.file_size_bytes as f64 / bpp) / 1e9;

    let score = score_entry(est_ram_mb, est_params_b, &name, hw);
    let fits_in_ram = est_ram_mb <= hw.model_budget_mb as f64;

    Ok(ModelEntry {
        path: path.to_path_buf(),
        name,
        file_size_mb,
        est_ram_mb,
        est_params_b,
        fits_in_ram,
        score,
    })
}

fn quality_tier(params_b: f64) -> f64 {
    if params_b < 1.0 {
        10.0
    } else if params_b < 2.0 {
        30.0
    } else if params_b < 4.0 {
        60.0
    } else if params_b < 8.0 {
        80.0
    } else {
        100.0
    }
}

/// Score a candidate against `hw` (spec §4.3 scoring function).
fn score_entry(est_ram_mb: f64, params_b: f64, name: &str, hw: &HardwareInfo) -> f64 {
    let budget = hw.model_budget_mb as f64;
    if est_ram_mb > budget {
        return -1.0;
    }

    let mut score = 1000.0;
    score += quality_tier(params_b);
    score += 50.0 * (budget - est_ram_mb) / budget;

    let lower = name.to_lowercase();
    if ["i2_s", "1.58", "bitnet"].iter().any(|tag| lower.contains(tag)) {
        score += 25.0;
    }
    if ["instruct", "chat"].iter().any(|tag| lower.contains(tag)) {
        score += 15.0;
    }
    score
}

/// First entry with `score > 0` and `fits_in_ram`, per scan order (the list
/// is already sorted by score descending with stable ties).
pub fn select_best(entries: &[ModelEntry]) -> Option<&ModelEntry> {
    entries.iter().find(|e| e.score > 0.0 && e.fits_in_ram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn hw_with_budget(budget_mb: u64) -> HardwareInfo {
        HardwareInfo {
            cpu_name: "Test CPU".into(),
            architecture: "x86_64".into(),
            physical_cores: 8,
            logical_cores: 8,
            ram_total_mb: budget_mb + 1500,
            ram_available_mb: budget_mb + 500,
            model_budget_mb: budget_mb,
            gpu_name: String::new(),
            gpu_vram_mb: 0,
            features: crate::hardware::FeatureBits::NONE,
        }
    }

    fn write_gguf(path: &Path, name: &str, size_mb: u64) {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend_from_slice(&0x4655_4747u32.to_le_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&2u64.to_le_bytes());

        let write_string_kv = |buf: &mut Vec<u8>, key: &str, value: &str| {
            buf.extend_from_slice(&(key.len() as u64).to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(&8u32.to_le_bytes()); // GgufType::String
            buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
            buf.extend_from_slice(value.as_bytes());
        };
        write_string_kv(&mut buf, "general.architecture", "llama");
        write_string_kv(&mut buf, "general.name", name);

        // Pad to the requested file size.
        let pad = (size_mb * 1024 * 1024).saturating_sub(buf.len() as u64);
        buf.extend(std::iter::repeat(0u8).take(pad as usize));

        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }

    #[test]
    fn scan_and_select_prefers_higher_quality_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        write_gguf(
            &dir.path().join("falcon3-7b-instruct-1.58bit-i2_s.gguf"),
            "falcon3-7b-instruct-1.58bit-i2_s",
            2500,
        );
        write_gguf(
            &dir.path().join("falcon3-10b-instruct-1.58bit-i2_s.gguf"),
            "falcon3-10b-instruct-1.58bit-i2_s",
            3500,
        );

        let hw = hw_with_budget(5120);
        let entries = scan(dir.path(), &hw).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.fits_in_ram));

        let best = select_best(&entries).unwrap();
        assert!(best.name.contains("10b"));
    }

    #[test]
    fn oom_candidate_is_disqualified() {
        let dir = tempfile::tempdir().unwrap();
        write_gguf(
            &dir.path().join("falcon3-7b-instruct-1.58bit-i2_s.gguf"),
            "falcon3-7b-instruct-1.58bit-i2_s",
            2500,
        );
        write_gguf(
            &dir.path().join("falcon3-10b-instruct-1.58bit-i2_s.gguf"),
            "falcon3-10b-instruct-1.58bit-i2_s",
            3500,
        );

        let hw = hw_with_budget(3000);
        let entries = scan(dir.path(), &hw).unwrap();
        let ten_b = entries.iter().find(|e| e.name.contains("10b")).unwrap();
        let seven_b = entries.iter().find(|e| e.name.contains("7b")).unwrap();
        assert_eq!(ten_b.score, -1.0);
        assert!(seven_b.score > 0.0);

        let best = select_best(&entries).unwrap();
        assert!(best.name.contains("7b"));
    }

    #[test]
    fn scoring_monotonicity_smaller_ram_wins_on_ties() {
        let hw = hw_with_budget(5000.0 as u64);
        let a = score_entry(2000.0, 3.0, "model-a", &hw);
        let b = score_entry(3000.0, 3.0, "model-a", &hw);
        assert!(a >= b);
    }
}
