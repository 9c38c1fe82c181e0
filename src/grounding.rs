//! GUI grounding: screenshot + element description -> screen coordinate.
//!
//! The pipeline:
//! 1. Read the screenshot's pixel dimensions.
//! 2. Pick a vision-capable model from the probed Ollama listing (explicit
//!    preference order, then first vision-capable model found).
//! 3. Ask the model for the element's position as a relative `[x, y]` pair in
//!    the unit square, at temperature 0 for deterministic decoding.
//! 4. Parse the answer against an ordered pattern list (bracketed,
//!    parenthesized, bare comma-separated), accepting the first match whose
//!    components both lie in [0, 1].
//! 5. Convert relative to absolute pixels by truncating multiplication.
//!
//! An unparseable answer is a *recoverable* outcome: the result carries
//! `found: false` plus the raw model text so the calling agent can refine its
//! description and retry within its own step budget. Only infrastructure
//! failures (missing image, no vision model, timeout) are errors.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use base64::Engine;
use regex::Regex;
use serde::Serialize;

use crate::error::GroundingError;
use crate::models::ModelRegistry;
use crate::ollama;

/// Wall-clock ceiling on the vision model call.
const GROUNDING_TIMEOUT: Duration = Duration::from_secs(60);

/// Vision model preference order (smallest first: grounding favors latency).
const VISION_PREFERENCES: &[&str] = &["qwen3-vl:2b", "qwen3-vl:4b", "qwen3-vl:8b"];

/// Substrings that mark a model name as vision-capable.
const VISION_MARKERS: &[&str] = &["vision", "vl", "llava", "minicpm", "bakllava"];

/// Constrained system prompt: the model must answer with a bare coordinate.
const GROUNDING_PROMPT: &str = "You are a GUI grounding assistant. \
Given a screenshot and a text description of a UI element, \
return ONLY the coordinates of that element as [x, y] \
where x and y are relative values between 0 and 1 \
(0,0 = top-left corner, 1,1 = bottom-right corner).\n\
\n\
Return ONLY the coordinate in this exact format: [0.XX, 0.XX]\n\
No explanation, no text, just the coordinate.";

/// Coordinate patterns, tried in order.
static COORDINATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\[(\d+\.?\d*),\s*(\d+\.?\d*)\]").unwrap(),
        Regex::new(r"\((\d+\.?\d*),\s*(\d+\.?\d*)\)").unwrap(),
        Regex::new(r"(\d+\.?\d*),\s*(\d+\.?\d*)").unwrap(),
    ]
});

/// A grounding request: which image, which element.
#[derive(Debug, Clone)]
pub struct GroundingRequest {
    pub image_path: PathBuf,
    pub element: String,
}

/// Outcome of a grounding attempt. Produced and consumed within one tool
/// call; nothing here is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct GroundingResult {
    pub found: bool,
    /// Absolute pixel coordinate (only meaningful when `found`).
    pub x: u32,
    pub y: u32,
    /// Relative coordinate in the unit square.
    pub rel_x: f64,
    pub rel_y: f64,
    /// Source image dimensions.
    pub width: u32,
    pub height: u32,
    /// Raw model output, attached when parsing failed, for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl GroundingResult {
    fn not_found(width: u32, height: u32, raw: String) -> Self {
        Self {
            found: false,
            x: 0,
            y: 0,
            rel_x: 0.0,
            rel_y: 0.0,
            width,
            height,
            raw: Some(raw),
        }
    }
}

/// Locate a UI element in a screenshot.
pub async fn locate(
    registry: &ModelRegistry,
    ollama_base_url: &str,
    request: &GroundingRequest,
) -> Result<GroundingResult, GroundingError> {
    let path = &request.image_path;
    if !path.exists() {
        return Err(GroundingError::ImageNotFound { path: path.clone() });
    }

    let (width, height) = image_dimensions(path)?;

    let vision_model = detect_vision_model(registry).await?;
    tracing::info!(
        element = %request.element,
        image = %path.display(),
        model = %vision_model,
        width,
        height,
        "grounding request"
    );

    let image_bytes = tokio::fs::read(path)
        .await
        .map_err(|e| GroundingError::ImageUnreadable {
            path: path.clone(),
            message: e.to_string(),
        })?;
    let image_b64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);

    let prompt = format!("{GROUNDING_PROMPT}\n\nFind this element: {}", request.element);

    let raw = ollama::chat_with_image(
        ollama_base_url,
        &vision_model,
        &prompt,
        &image_b64,
        0.0,
        GROUNDING_TIMEOUT,
    )
    .await
    .map_err(|e| match e {
        ollama::ChatError::Timeout { secs } => GroundingError::GroundingTimeout { timeout_secs: secs },
        other => GroundingError::VisionCallFailed(other.to_string()),
    })?;

    tracing::debug!(raw = %raw, "grounding model output");

    let Some((rel_x, rel_y)) = parse_relative_coordinates(&raw) else {
        tracing::info!(element = %request.element, "grounding could not parse coordinates");
        return Ok(GroundingResult::not_found(width, height, raw));
    };

    let (x, y) = to_absolute((rel_x, rel_y), width, height);

    tracing::info!(
        element = %request.element,
        rel_x,
        rel_y,
        x,
        y,
        "element located"
    );

    Ok(GroundingResult {
        found: true,
        x,
        y,
        rel_x,
        rel_y,
        width,
        height,
        raw: None,
    })
}

/// Pick the vision model used for grounding and image analysis.
///
/// Walks [`VISION_PREFERENCES`] over the probed listing, then falls back to
/// the first vision-capable model found.
pub async fn detect_vision_model(registry: &ModelRegistry) -> Result<String, GroundingError> {
    let installed = registry.ollama_models().await;

    let vision_models: Vec<&String> = installed
        .iter()
        .filter(|m| {
            let lower = m.to_lowercase();
            VISION_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .collect();

    if vision_models.is_empty() {
        return Err(GroundingError::NoVisionModelAvailable);
    }

    for pref in VISION_PREFERENCES {
        if let Some(found) = vision_models.iter().find(|m| m.as_str() == *pref) {
            return Ok(found.to_string());
        }
    }

    let fallback = vision_models[0].to_string();
    tracing::debug!(model = %fallback, "no preferred vision model installed, using fallback");
    Ok(fallback)
}

/// Parse a relative `[x, y]` coordinate from model output.
///
/// Tries each pattern in order and accepts the first match whose components
/// both lie in the unit square. Out-of-range matches are skipped so a stray
/// pixel coordinate ("click at 960, 540") cannot be misread as relative.
pub fn parse_relative_coordinates(text: &str) -> Option<(f64, f64)> {
    for pattern in COORDINATE_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            let (Some(xm), Some(ym)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let (Ok(x), Ok(y)) = (xm.as_str().parse::<f64>(), ym.as_str().parse::<f64>()) else {
                continue;
            };
            if (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y) {
                return Some((x, y));
            }
        }
    }
    None
}

/// Convert a relative coordinate to absolute pixels (truncating).
pub fn to_absolute(rel: (f64, f64), width: u32, height: u32) -> (u32, u32) {
    ((rel.0 * width as f64) as u32, (rel.1 * height as f64) as u32)
}

/// Check that a path points at a readable image, returning its dimensions.
pub fn image_dimensions(path: &Path) -> Result<(u32, u32), GroundingError> {
    image::image_dimensions(path).map_err(|e| GroundingError::ImageUnreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
