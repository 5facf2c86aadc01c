use std::path::Path;

use conversion_core::{EngineSettings, VoiceSettings};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

/// Maximum document size accepted for one conversion
pub const MAX_TEXT_LENGTH: usize = 5 * 1024 * 1024;
const MIN_PARALLEL_CHAPTERS: i64 = 1;
const MAX_PARALLEL_CHAPTERS: i64 = 10;
/// Bound on rate, volume and pitch, in either direction
const PROSODY_LIMIT: f64 = 100.0;

/// Validate a conversion request before anything is spawned
pub fn validate_conversion_request(
    text: &str,
    voice_id: &str,
    output_file: &Path,
) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} bytes)",
            MAX_TEXT_LENGTH
        )));
    }

    if !is_valid_voice_id(voice_id) {
        return Err(ApiError::InvalidInput(format!(
            "Invalid voice id: {}. Expected format: ll-CC-Name (e.g., fr-FR-HenriNeural)",
            voice_id
        )));
    }

    if !output_file.is_absolute() {
        return Err(ApiError::InvalidInput(
            "Output file must be an absolute path".to_string(),
        ));
    }
    if output_file.file_name().is_none() {
        return Err(ApiError::InvalidInput(
            "Output file must name a file".to_string(),
        ));
    }
    match output_file.parent() {
        Some(dir) if dir.is_dir() => Ok(()),
        _ => Err(ApiError::InvalidInput(format!(
            "Output directory does not exist: {}",
            output_file.display()
        ))),
    }
}

/// Voice ids look like `fr-FR-HenriNeural` or `zh-CN-liaoning-XiaobeiNeural`
fn is_valid_voice_id(voice_id: &str) -> bool {
    let parts: Vec<&str> = voice_id.split('-').collect();
    if parts.len() < 3 {
        return false;
    }
    let language = parts[0];
    let region = parts[1];
    (2..=3).contains(&language.len())
        && language.chars().all(|c| c.is_ascii_lowercase())
        && region.len() == 2
        && region.chars().all(|c| c.is_ascii_uppercase())
        && parts[2..]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Partial settings as sent by clients. Absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub max_parallel_chapters: Option<Value>,
    pub voice_settings: Option<VoiceSettingsUpdate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceSettingsUpdate {
    pub rate: Option<Value>,
    pub volume: Option<Value>,
    pub pitch: Option<Value>,
}

/// Merge `update` into `current`, clamping every value into range
pub fn apply_settings_update(
    current: &EngineSettings,
    update: SettingsUpdate,
) -> Result<EngineSettings, ApiError> {
    let mut settings = current.clone();

    if let Some(value) = update.max_parallel_chapters {
        let requested = parse_integer(&value).ok_or_else(|| {
            ApiError::InvalidInput(format!("Invalid max_parallel_chapters: {}", value))
        })?;
        settings.max_parallel_chapters =
            requested.clamp(MIN_PARALLEL_CHAPTERS, MAX_PARALLEL_CHAPTERS) as u32;
    }

    if let Some(voice) = update.voice_settings {
        let VoiceSettings {
            rate,
            volume,
            pitch,
        } = &mut settings.voice_settings;
        if let Some(value) = voice.rate {
            *rate = normalize_prosody(&value, "%");
        }
        if let Some(value) = voice.volume {
            *volume = normalize_prosody(&value, "%");
        }
        if let Some(value) = voice.pitch {
            *pitch = normalize_prosody(&value, "Hz");
        }
    }

    Ok(settings)
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `"+15%"`, `"-20"`, `35` or `"250Hz"` to a clamped, signed `"+N<unit>"`.
/// Anything unparsable becomes `"+0<unit>"`.
fn normalize_prosody(value: &Value, unit: &str) -> String {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.strip_suffix(unit).unwrap_or(s).trim().parse::<f64>().ok()
        }
        _ => None,
    };

    let amount = parsed
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(-PROSODY_LIMIT, PROSODY_LIMIT).round() as i64)
        .unwrap_or(0);
    format!("{:+}{}", amount, unit)
}
