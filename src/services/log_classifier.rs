//! Classification of free-text OCR backend log lines.
//!
//! The backend's stdout is an unstructured stream; the controller only needs a
//! handful of signals from it. [`LogClassifier::classify`] is an ordered list
//! of rules over the trimmed line where the first match wins and anything
//! unrecognised falls through to [`LogEvent::Unclassified`].

use regex::Regex;
use std::sync::OnceLock;

const NOISE_MARKERS: &[&str] = &["failed to load cu", "please follow https://onnxruntime.ai"];
const SLEEPING_SUFFIX: &str = "sleeping.";
const COMPLETED_MARKER: &str = "COMMAND_FINISHED";
const DUPLICATE_MARKER: &str = "Seems like Text we already sent";
const MULTI_SOURCE_MARKER: &str = "Multiple active video sources found in OBS";
const MULTI_SOURCE_PREFIX: &str = "Multiple active video sources found in OBS. Using ";
const MULTI_SOURCE_SUFFIX: &str = " for Screenshot";
const UNKNOWN_SOURCE: &str = "Unknown Source";
const TEXT_RECOGNIZED_MARKER: &str = "Text recognized";

pub const ANSI_RESET: &str = "\x1b[0m";
pub const ANSI_YELLOW: &str = "\x1b[33m";
pub const ANSI_CYAN: &str = "\x1b[36m";
pub const ANSI_MAGENTA: &str = "\x1b[35m";

/// Engine display names and their terminal colours.
pub const ENGINE_COLORS: &[(&str, &str)] = &[
    ("OneOCR", "\x1b[36m"),
    ("Google Lens", "\x1b[92m"),
    ("Gemini", "\x1b[95m"),
    ("Bing", "\x1b[34m"),
    ("EasyOCR", "\x1b[33m"),
    ("RapidOCR", "\x1b[35m"),
    ("Manga OCR", "\x1b[95m"),
    ("WindowsOCR", "\x1b[36m"),
    ("WinRT OCR", "\x1b[36m"),
    ("Google Vision", "\x1b[92m"),
    ("Azure Image Analysis", "\x1b[96m"),
    ("OCRSpace", "\x1b[93m"),
    ("Qwen2-VL", "\x1b[90m"),
    ("Local LLM OCR", "\x1b[95m"),
    ("Meiki", "\x1b[95m"),
    ("MeikiOCR", "\x1b[95m"),
];

/// Semantic meaning of one backend log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// The backend found nothing new in the frame
    Sleeping,
    /// A frame was scanned by `engine`; `seconds` is the reported latency text
    ScanningTick { engine: String, seconds: String },
    /// The recognised text was identical to the previous result
    Duplicate,
    MultiSourceWarning { source: String },
    /// The backend finished a one-shot command
    Completed,
    Unclassified { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Known noise; raises no event at all
    Suppressed,
    Event(LogEvent),
}

/// Stateless log line classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogClassifier;

impl LogClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one raw line. Total over all inputs.
    pub fn classify(&self, raw: &str) -> Classification {
        let line = raw.trim();
        if line.is_empty() {
            return Classification::Suppressed;
        }

        let lower = line.to_lowercase();
        if NOISE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Classification::Suppressed;
        }

        let event = if line.ends_with(SLEEPING_SUFFIX) {
            LogEvent::Sleeping
        } else if line.contains(COMPLETED_MARKER) {
            LogEvent::Completed
        } else if let Some((engine, seconds)) = scanning_tick(line) {
            LogEvent::ScanningTick { engine, seconds }
        } else if line.contains(DUPLICATE_MARKER) {
            LogEvent::Duplicate
        } else if line.contains(MULTI_SOURCE_MARKER) {
            LogEvent::MultiSourceWarning {
                source: multi_source_name(line),
            }
        } else {
            LogEvent::Unclassified {
                text: line.to_string(),
            }
        };
        Classification::Event(event)
    }
}

/// Engine named in a `using <engine>:` fragment, if any.
/// `using` must stand alone, so "focusing on window: x" names no engine.
pub fn engine_name(line: &str) -> Option<&str> {
    static USING: OnceLock<Regex> = OnceLock::new();
    let re = USING.get_or_init(|| Regex::new(r"\busing\s+([^:]+)").expect("Invalid engine regex"));
    let engine = re.captures(line)?.get(1)?.as_str().trim();
    (!engine.is_empty()).then_some(engine)
}

fn scanning_tick(line: &str) -> Option<(String, String)> {
    let engine = engine_name(line)?;
    let suffix = line.strip_suffix(':')?;
    if !suffix.ends_with(engine) {
        return None;
    }

    let seconds = line
        .split_once(" in ")
        .and_then(|(_, after)| after.split('s').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("0");
    Some((engine.to_string(), seconds.to_string()))
}

fn multi_source_name(line: &str) -> String {
    line.split_once(MULTI_SOURCE_PREFIX)
        .and_then(|(_, after)| after.split(MULTI_SOURCE_SUFFIX).next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

pub fn engine_color(engine: &str) -> Option<&'static str> {
    ENGINE_COLORS
        .iter()
        .find(|(name, _)| *name == engine)
        .map(|(_, color)| *color)
}

fn engine_patterns() -> &'static [(Regex, &'static str, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        ENGINE_COLORS
            .iter()
            .filter_map(|(name, color)| {
                let pattern = format!(r"\b{}\b", regex::escape(name));
                Regex::new(&pattern).ok().map(|re| (re, *name, *color))
            })
            .collect()
    })
}

fn colorize_with(text: &str, reset: bool) -> String {
    let mut out = text.to_string();
    for (re, name, color) in engine_patterns() {
        let end = if reset { ANSI_RESET } else { "" };
        let replacement = format!("{}{}{}", color, name, end);
        out = re.replace_all(&out, regex::NoExpand(&replacement)).into_owned();
    }
    out
}

/// Wrap every known engine name in `text` with its colour.
pub fn colorize(text: &str) -> String {
    colorize_with(text, true)
}

/// Terminal rendering of a transcript line: engine names are coloured and
/// the whole line takes the colour of the engine it reports on.
///
/// Recognised-text lines keep the engine colour running to the end of the
/// line instead of resetting after the name.
pub fn render_line(line: &str) -> String {
    let body = colorize_with(line, !line.contains(TEXT_RECOGNIZED_MARKER));
    match engine_name(line).and_then(engine_color) {
        Some(color) => format!("{}{}{}", color, body, ANSI_RESET),
        None => body,
    }
}

/// Transcript rendering of a duplicate notice: the previous line in yellow.
pub fn render_duplicate(previous: &str) -> String {
    format!("{}{} (Duplicate){}", ANSI_YELLOW, previous, ANSI_RESET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event(line: &str) -> LogEvent {
        match LogClassifier::new().classify(line) {
            Classification::Event(e) => e,
            Classification::Suppressed => panic!("line was suppressed: {line}"),
        }
    }

    #[test]
    fn test_noise_is_suppressed() {
        let classifier = LogClassifier::new();
        assert_eq!(
            classifier.classify("[E] Failed to load CUDA provider"),
            Classification::Suppressed
        );
        assert_eq!(
            classifier.classify("Please follow https://onnxruntime.ai/docs for setup"),
            Classification::Suppressed
        );
        assert_eq!(classifier.classify("   "), Classification::Suppressed);
        assert_eq!(classifier.classify(""), Classification::Suppressed);
    }

    #[test]
    fn test_sleeping_and_completed() {
        assert_eq!(event("No text found, sleeping."), LogEvent::Sleeping);
        assert_eq!(event("  sleeping.  "), LogEvent::Sleeping);
        assert_eq!(event("COMMAND_FINISHED area_select"), LogEvent::Completed);
    }

    #[test]
    fn test_scanning_tick() {
        assert_eq!(
            event("Processed in 0.4s using OneOCR:"),
            LogEvent::ScanningTick {
                engine: "OneOCR".to_string(),
                seconds: "0.4".to_string()
            }
        );
        assert_eq!(
            event("Scanned using Google Lens:"),
            LogEvent::ScanningTick {
                engine: "Google Lens".to_string(),
                seconds: "0".to_string()
            }
        );
    }

    #[test]
    fn test_recognized_text_is_not_a_tick() {
        let line = "Text recognized in 0.3s using OneOCR: こんにちは";
        assert_eq!(
            event(line),
            LogEvent::Unclassified {
                text: line.to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_and_multi_source() {
        assert_eq!(event("Seems like Text we already sent, skipping"), LogEvent::Duplicate);
        assert_eq!(
            event("Multiple active video sources found in OBS. Using Game Capture for Screenshot."),
            LogEvent::MultiSourceWarning {
                source: "Game Capture".to_string()
            }
        );
        assert_eq!(
            event("Multiple active video sources found in OBS"),
            LogEvent::MultiSourceWarning {
                source: "Unknown Source".to_string()
            }
        );
    }

    #[test]
    fn test_engine_name_needs_standalone_using() {
        assert_eq!(engine_name("focusing on window: Game"), None);
        assert_eq!(engine_name("Processed in 0.4s using OneOCR:"), Some("OneOCR"));
        assert_eq!(engine_name("using Google Lens: done"), Some("Google Lens"));
        assert_eq!(engine_name("using :"), None);
        assert_eq!(
            event("Refocusing window:"),
            LogEvent::Unclassified {
                text: "Refocusing window:".to_string()
            }
        );
    }

    #[test]
    fn test_colorize_respects_word_boundaries() {
        assert_eq!(
            colorize("Switched to Bing"),
            format!("Switched to \x1b[34mBing{}", ANSI_RESET)
        );
        assert_eq!(colorize("Bingo"), "Bingo");
    }

    #[test]
    fn test_render_duplicate() {
        assert_eq!(
            render_duplicate("hello"),
            "\x1b[33mhello (Duplicate)\x1b[0m"
        );
    }

    proptest! {
        #[test]
        fn classify_is_total(line in ".*") {
            let _ = LogClassifier::new().classify(&line);
        }

        #[test]
        fn unclassified_text_is_trimmed(line in "[a-z ]{0,40}") {
            if let Classification::Event(LogEvent::Unclassified { text }) =
                LogClassifier::new().classify(&line)
            {
                prop_assert_eq!(text.as_str(), line.trim());
            }
        }
    }
}
