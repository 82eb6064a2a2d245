//! Surface configuration - how remote items are mirrored and classified.

use serde::{Deserialize, Serialize};

/// Naming convention and freshness rules for the local mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Only items whose remote name starts with this prefix are mirrored.
    /// An empty prefix mirrors everything.
    #[serde(default = "MirrorConfig::default_prefix")]
    pub prefix: String,

    /// Strip the prefix when deriving display names.
    #[serde(default = "MirrorConfig::default_strip_prefix")]
    pub strip_prefix: bool,

    /// Maximum age of the classification context, e.g. "10s".
    #[serde(default = "MirrorConfig::default_context_max_age")]
    pub context_max_age: String,
}

impl MirrorConfig {
    fn default_prefix() -> String {
        "_".to_string()
    }

    fn default_strip_prefix() -> bool {
        true
    }

    pub(crate) fn default_context_max_age() -> String {
        "10s".to_string()
    }

    /// Whether a remote item name follows the naming convention.
    pub fn matches(&self, raw_name: &str) -> bool {
        raw_name.starts_with(&self.prefix)
    }

    /// Derive the display name for a remote item name.
    pub fn display_name(&self, raw_name: &str) -> String {
        if self.strip_prefix {
            raw_name
                .strip_prefix(self.prefix.as_str())
                .unwrap_or(raw_name)
                .to_string()
        } else {
            raw_name.to_string()
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            prefix: Self::default_prefix(),
            strip_prefix: Self::default_strip_prefix(),
            context_max_age: Self::default_context_max_age(),
        }
    }
}

/// Maps remote input kinds onto roles the built-in providers understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "ClassificationConfig::default_microphone_kinds")]
    pub microphone_kinds: Vec<String>,

    /// Case-insensitive name fragment that also marks an input as a microphone.
    #[serde(default = "ClassificationConfig::default_microphone_name_hint")]
    pub microphone_name_hint: String,

    #[serde(default = "ClassificationConfig::default_audio_output_kinds")]
    pub audio_output_kinds: Vec<String>,

    #[serde(default = "ClassificationConfig::default_browser_kinds")]
    pub browser_kinds: Vec<String>,

    #[serde(default = "ClassificationConfig::default_text_kinds")]
    pub text_kinds: Vec<String>,

    #[serde(default = "ClassificationConfig::default_media_kinds")]
    pub media_kinds: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl ClassificationConfig {
    fn default_microphone_kinds() -> Vec<String> {
        strings(&[
            "wasapi_input_capture",
            "pulse_input_capture",
            "coreaudio_input_capture",
        ])
    }

    fn default_microphone_name_hint() -> String {
        "microphone".to_string()
    }

    fn default_audio_output_kinds() -> Vec<String> {
        strings(&[
            "wasapi_output_capture",
            "pulse_output_capture",
            "coreaudio_output_capture",
        ])
    }

    fn default_browser_kinds() -> Vec<String> {
        strings(&["browser_source"])
    }

    fn default_text_kinds() -> Vec<String> {
        strings(&["text_gdiplus_v3", "text_ft2_source_v2"])
    }

    fn default_media_kinds() -> Vec<String> {
        strings(&["ffmpeg_source", "vlc_source"])
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            microphone_kinds: Self::default_microphone_kinds(),
            microphone_name_hint: Self::default_microphone_name_hint(),
            audio_output_kinds: Self::default_audio_output_kinds(),
            browser_kinds: Self::default_browser_kinds(),
            text_kinds: Self::default_text_kinds(),
            media_kinds: Self::default_media_kinds(),
        }
    }
}

/// All surface configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default)]
    pub mirror: MirrorConfig,

    #[serde(default)]
    pub classification: ClassificationConfig,
}
