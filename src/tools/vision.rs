//! Image analysis tool backed by a local vision model.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};

use super::{require_str, ToolCapability, ToolDescriptor, ToolRuntime, ANALYZE_IMAGE};
use crate::grounding;
use crate::ollama;

/// Image analysis is free-form generation; allow more time than grounding.
const ANALYZE_TIMEOUT: Duration = Duration::from_secs(120);

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: ANALYZE_IMAGE.to_string(),
        description: "Analyze an image with a local vision model. Describe content, extract \
                      visible text, or diagnose what is shown, guided by the prompt. \
                      Example: analyze_image(image_path='/tmp/screen.png', \
                      prompt='Extract all visible text')."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "image_path": {
                    "type": "string",
                    "description": "Absolute path of the image to analyze"
                },
                "prompt": {
                    "type": "string",
                    "description": "What to look for or describe in the image"
                }
            },
            "required": ["image_path", "prompt"]
        }),
        capabilities: vec![ToolCapability::ImageAnalysis],
    }
}

pub async fn run(args: &Value, runtime: &ToolRuntime) -> String {
    let image_path = match require_str(args, "image_path", ANALYZE_IMAGE) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let prompt = match require_str(args, "prompt", ANALYZE_IMAGE) {
        Ok(p) => p,
        Err(e) => return e,
    };

    if !Path::new(image_path).exists() {
        return json!({"error": format!("analyze_image: image not found: {image_path}")})
            .to_string();
    }

    let vision_model = match grounding::detect_vision_model(&runtime.registry).await {
        Ok(model) => model,
        Err(e) => return json!({"error": format!("analyze_image: {e}")}).to_string(),
    };

    let image_bytes = match tokio::fs::read(image_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return json!({"error": format!("analyze_image: cannot read {image_path}: {e}")})
                .to_string();
        }
    };
    let image_b64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);

    match ollama::chat_with_image(
        &runtime.config.ollama_base_url,
        &vision_model,
        prompt,
        &image_b64,
        0.2,
        ANALYZE_TIMEOUT,
    )
    .await
    {
        Ok(answer) if !answer.is_empty() => answer,
        Ok(_) => json!({"error": "analyze_image: vision model returned an empty answer"})
            .to_string(),
        Err(e) => json!({"error": format!("analyze_image: {e}")}).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_arguments_are_json_errors() {
        let config = std::sync::Arc::new(crate::config::PartialConfig::default().finalize());
        let registry = std::sync::Arc::new(crate::models::ModelRegistry::new(&config));
        let runtime = ToolRuntime { config, registry };

        let result = run(&json!({"prompt": "describe"}), &runtime).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("image_path"));

        let result = run(&json!({"image_path": "/nonexistent.png", "prompt": "x"}), &runtime).await;
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("not found"));
    }
}
