//! Basic and advanced views over one canonical [`OcrSettings`].
//!
//! Both settings forms edit the same shared fields. Each also owns private
//! slots (`scanRate_basic`, `ocr1_advanced`, `ocr2_advanced`,
//! `scanRate_advanced`) so that flipping between them keeps what the user
//! typed in the other one.

use crate::models::{
    DEFAULT_SCAN_RATE, DEFAULT_SECONDARY_ENGINE, OcrSettings, SharedSettings,
    platform_default_engine,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsMode {
    #[default]
    Basic,
    Advanced,
}

/// Snap a scan rate to the nearest basic-profile appearance speed.
pub fn bucket(scan_rate: f64) -> f64 {
    AppearanceSpeed::from_scan_rate(scan_rate).scan_rate()
}

/// The three text appearance speeds the basic profile offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppearanceSpeed {
    Fast,
    Normal,
    Slow,
}

impl AppearanceSpeed {
    pub fn from_scan_rate(scan_rate: f64) -> Self {
        if scan_rate <= 0.3 {
            AppearanceSpeed::Fast
        } else if scan_rate <= 0.65 {
            AppearanceSpeed::Normal
        } else {
            AppearanceSpeed::Slow
        }
    }

    pub fn scan_rate(self) -> f64 {
        match self {
            AppearanceSpeed::Fast => 0.2,
            AppearanceSpeed::Normal => 0.5,
            AppearanceSpeed::Slow => 0.8,
        }
    }
}

/// What the basic form shows.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicView {
    pub shared: SharedSettings,
    pub appearance_speed: AppearanceSpeed,
    pub ocr1: &'static str,
    pub ocr2: &'static str,
}

/// What the advanced form shows.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedView {
    pub shared: SharedSettings,
    pub ocr1: String,
    pub ocr2: String,
    pub scan_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileView {
    Basic(BasicView),
    Advanced(AdvancedView),
}

/// In-progress values of the profile-private fields of one form.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileEdits {
    Basic {
        appearance_speed: AppearanceSpeed,
    },
    Advanced {
        ocr1: String,
        ocr2: String,
        scan_rate: f64,
    },
}

impl ProfileEdits {
    pub fn mode(&self) -> SettingsMode {
        match self {
            ProfileEdits::Basic { .. } => SettingsMode::Basic,
            ProfileEdits::Advanced { .. } => SettingsMode::Advanced,
        }
    }
}

/// Owner of the canonical settings and the currently shown form.
#[derive(Debug, Clone)]
pub struct ConfigProfileStore {
    settings: OcrSettings,
    mode: SettingsMode,
}

impl ConfigProfileStore {
    pub fn new(settings: OcrSettings) -> Self {
        let mode = if settings.advanced_mode {
            SettingsMode::Advanced
        } else {
            SettingsMode::Basic
        };
        Self { settings, mode }
    }

    pub fn settings(&self) -> &OcrSettings {
        &self.settings
    }

    pub fn into_settings(self) -> OcrSettings {
        self.settings
    }

    pub fn mode(&self) -> SettingsMode {
        self.mode
    }

    pub fn basic_view(&self) -> BasicView {
        let rate = self.settings.scan_rate_basic.unwrap_or(DEFAULT_SCAN_RATE);
        BasicView {
            shared: self.settings.shared.clone(),
            appearance_speed: AppearanceSpeed::from_scan_rate(rate),
            ocr1: platform_default_engine(),
            ocr2: DEFAULT_SECONDARY_ENGINE,
        }
    }

    pub fn advanced_view(&self) -> AdvancedView {
        AdvancedView {
            shared: self.settings.shared.clone(),
            ocr1: self
                .settings
                .ocr1_advanced
                .clone()
                .unwrap_or_else(|| platform_default_engine().to_string()),
            ocr2: self
                .settings
                .ocr2_advanced
                .clone()
                .unwrap_or_else(|| DEFAULT_SECONDARY_ENGINE.to_string()),
            scan_rate: self.settings.scan_rate_advanced.unwrap_or(DEFAULT_SCAN_RATE),
        }
    }

    pub fn view(&self) -> ProfileView {
        match self.mode {
            SettingsMode::Basic => ProfileView::Basic(self.basic_view()),
            SettingsMode::Advanced => ProfileView::Advanced(self.advanced_view()),
        }
    }

    fn capture(&mut self, edits: &ProfileEdits) {
        match edits {
            ProfileEdits::Basic { appearance_speed } => {
                self.settings.scan_rate_basic = Some(appearance_speed.scan_rate());
            }
            ProfileEdits::Advanced {
                ocr1,
                ocr2,
                scan_rate,
            } => {
                self.settings.ocr1_advanced = Some(ocr1.clone());
                self.settings.ocr2_advanced = Some(ocr2.clone());
                self.settings.scan_rate_advanced = Some(*scan_rate);
            }
        }
    }

    /// Remember `edits` for the form being left, then show `target`.
    pub fn switch_mode(&mut self, target: SettingsMode, edits: &ProfileEdits) -> ProfileView {
        self.capture(edits);
        if self.mode != target {
            tracing::debug!("Settings form {:?} -> {:?}", self.mode, target);
        }
        self.mode = target;
        self.view()
    }

    /// Apply a save from the form that produced `edits`.
    ///
    /// Writes the shared fields, the form's private slots and the effective
    /// engines and scan rate the backend starts with. The basic form always
    /// runs the platform default engine with the default secondary engine.
    pub fn commit(&mut self, shared: SharedSettings, edits: ProfileEdits) -> &OcrSettings {
        self.settings.shared = shared;
        self.capture(&edits);
        self.mode = edits.mode();

        match edits {
            ProfileEdits::Basic { appearance_speed } => {
                self.settings.advanced_mode = false;
                self.settings.ocr1 = platform_default_engine().to_string();
                self.settings.ocr2 = DEFAULT_SECONDARY_ENGINE.to_string();
                self.settings.scan_rate = appearance_speed.scan_rate();
            }
            ProfileEdits::Advanced {
                ocr1,
                ocr2,
                scan_rate,
            } => {
                self.settings.advanced_mode = true;
                self.settings.ocr1 = ocr1;
                self.settings.ocr2 = ocr2;
                self.settings.scan_rate = scan_rate;
            }
        }
        &self.settings
    }
}
