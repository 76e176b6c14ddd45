use serde::{Deserialize, Serialize};

/// Secondary engine used by both profiles unless the advanced profile overrides it.
pub const DEFAULT_SECONDARY_ENGINE: &str = "glens";

/// Scan rate used when a profile has never stored one.
pub const DEFAULT_SCAN_RATE: f64 = 0.5;

/// Primary OCR engine the basic profile always uses on this platform.
pub fn platform_default_engine() -> &'static str {
    if cfg!(target_os = "macos") {
        "alivetext"
    } else if cfg!(target_os = "linux") {
        "meiki_text_detector"
    } else {
        "oneocr"
    }
}

/// Settings both profiles expose and edit in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedSettings {
    #[serde(rename = "twoPassOCR")]
    pub two_pass_ocr: bool,
    pub optimize_second_scan: bool,
    pub language: String,
    pub ocr_screenshots: bool,
    pub furigana_filter_sensitivity: u32,
    #[serde(rename = "manualOcrHotkey")]
    pub manual_ocr_hotkey: String,
    #[serde(rename = "areaSelectOcrHotkey")]
    pub area_select_ocr_hotkey: String,
    #[serde(rename = "globalPauseHotkey")]
    pub global_pause_hotkey: String,
    #[serde(rename = "sendToClipboard")]
    pub send_to_clipboard: bool,
    pub keep_newline: bool,
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self {
            two_pass_ocr: true,
            optimize_second_scan: true,
            language: "ja".to_string(),
            ocr_screenshots: false,
            furigana_filter_sensitivity: 0,
            manual_ocr_hotkey: "Ctrl+Shift+G".to_string(),
            area_select_ocr_hotkey: "Ctrl+Shift+O".to_string(),
            global_pause_hotkey: "Ctrl+Shift+P".to_string(),
            send_to_clipboard: false,
            keep_newline: false,
        }
    }
}

/// Canonical OCR configuration as persisted in `OCR Settings.yaml`.
///
/// `ocr1`, `ocr2` and `scan_rate` are the *effective* values the backend is
/// started with. The `*_basic` / `*_advanced` fields are the private slots of
/// each settings profile, remembered so switching profiles does not lose edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    #[serde(flatten)]
    pub shared: SharedSettings,

    pub ocr1: String,
    pub ocr2: String,
    #[serde(rename = "scanRate")]
    pub scan_rate: f64,
    #[serde(rename = "advancedMode")]
    pub advanced_mode: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr1_advanced: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr2_advanced: Option<String>,
    #[serde(rename = "scanRate_advanced", skip_serializing_if = "Option::is_none")]
    pub scan_rate_advanced: Option<f64>,
    #[serde(rename = "scanRate_basic", skip_serializing_if = "Option::is_none")]
    pub scan_rate_basic: Option<f64>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            shared: SharedSettings::default(),
            ocr1: platform_default_engine().to_string(),
            ocr2: DEFAULT_SECONDARY_ENGINE.to_string(),
            scan_rate: DEFAULT_SCAN_RATE,
            advanced_mode: false,
            ocr1_advanced: None,
            ocr2_advanced: None,
            scan_rate_advanced: None,
            scan_rate_basic: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = OcrSettings::default();
        assert_eq!(settings.ocr2, "glens");
        assert_eq!(settings.scan_rate, 0.5);
        assert_eq!(settings.shared.language, "ja");
        assert!(!settings.advanced_mode);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
twoPassOCR: false
scanRate: 0.8
scanRate_basic: 0.8
manualOcrHotkey: Alt+M
"#;
        let settings: OcrSettings = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(!settings.shared.two_pass_ocr);
        assert_eq!(settings.shared.manual_ocr_hotkey, "Alt+M");
        assert_eq!(settings.shared.global_pause_hotkey, "Ctrl+Shift+P");
        assert_eq!(settings.scan_rate_basic, Some(0.8));
        assert_eq!(settings.ocr1_advanced, None);
    }
}
