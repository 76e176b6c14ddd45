//! Reference-counted visibility of the shared OCR console view.
//!
//! Several independent call sites (an OCR session, a dependency install, the
//! area selector) each open the console and close it when done. The console is
//! visible while at least one of them holds it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_BUTTON_LABEL: &str = "Stop OCR (Open Settings)";
pub const CLOSE_CONSOLE_LABEL: &str = "Close Console";
pub const DEFAULT_SETTINGS_HEADER: &str = "3. OCR Settings";
pub const RESTRICTED_SETTINGS_HEADER: &str = "OCR Settings (Some Options Hidden)";

/// Visible state of the console and the controls around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLayout {
    pub console_visible: bool,
    pub config_card_visible: bool,
    pub settings_card_visible: bool,
    pub start_controls_visible: bool,
    pub stop_controls_visible: bool,
    pub button_label: String,
    pub manual_hotkey_visible: bool,
    pub area_hotkey_visible: bool,
    pub global_pause_hotkey_visible: bool,
    pub screenshots_group_visible: bool,
    pub select_areas_visible: bool,
    pub settings_header: String,
    pub status_label: String,
}

impl Default for ConsoleLayout {
    fn default() -> Self {
        Self {
            console_visible: false,
            config_card_visible: true,
            settings_card_visible: true,
            start_controls_visible: true,
            stop_controls_visible: false,
            button_label: DEFAULT_BUTTON_LABEL.to_string(),
            manual_hotkey_visible: true,
            area_hotkey_visible: true,
            global_pause_hotkey_visible: true,
            screenshots_group_visible: true,
            select_areas_visible: false,
            settings_header: DEFAULT_SETTINGS_HEADER.to_string(),
            status_label: String::new(),
        }
    }
}

/// How a caller wants the console arranged while it holds it.
///
/// Options only ever hide controls; a later acquirer cannot re-show what an
/// earlier one hid until the console is fully released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleOptions {
    pub button_label: String,
    pub hide_config_card: bool,
    pub hide_settings_card: bool,
    pub hide_manual_hotkey: bool,
    pub hide_area_hotkey: bool,
    pub hide_global_pause_hotkey: bool,
    pub hide_screenshots_group: bool,
    pub show_select_areas_button: bool,
    pub update_settings_header: bool,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            button_label: DEFAULT_BUTTON_LABEL.to_string(),
            hide_config_card: true,
            hide_settings_card: false,
            hide_manual_hotkey: true,
            hide_area_hotkey: true,
            hide_global_pause_hotkey: true,
            hide_screenshots_group: true,
            show_select_areas_button: true,
            update_settings_header: true,
        }
    }
}

impl ConsoleOptions {
    /// A running OCR session: settings that cannot change live are hidden.
    pub fn ocr_session() -> Self {
        Self {
            update_settings_header: false,
            ..Self::default()
        }
    }

    /// Dependency installation: log only, all settings stay reachable.
    pub fn dependency_install() -> Self {
        Self {
            button_label: CLOSE_CONSOLE_LABEL.to_string(),
            hide_config_card: true,
            hide_settings_card: true,
            ..Self::passive()
        }
    }

    /// The area selector; the settings card is hidden only when the selector
    /// runs standalone.
    pub fn area_selector(hide_settings_card: bool) -> Self {
        Self {
            button_label: CLOSE_CONSOLE_LABEL.to_string(),
            hide_config_card: false,
            hide_settings_card,
            ..Self::passive()
        }
    }

    fn passive() -> Self {
        Self {
            button_label: CLOSE_CONSOLE_LABEL.to_string(),
            hide_config_card: false,
            hide_settings_card: false,
            hide_manual_hotkey: false,
            hide_area_hotkey: false,
            hide_global_pause_hotkey: false,
            hide_screenshots_group: false,
            show_select_areas_button: false,
            update_settings_header: false,
        }
    }
}

/// Reference count plus the layout it controls.
#[derive(Debug, Clone, Default)]
pub struct ConsoleResourceGuard {
    count: usize,
    layout: ConsoleLayout,
}

impl ConsoleResourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_visible(&self) -> bool {
        self.count > 0
    }

    pub fn layout(&self) -> &ConsoleLayout {
        &self.layout
    }

    /// Take a reference. Returns true if this call made the console visible.
    pub fn acquire(&mut self, options: &ConsoleOptions) -> bool {
        self.count += 1;
        let opened = self.count == 1;
        if opened {
            self.layout.console_visible = true;
            self.layout.start_controls_visible = false;
            self.layout.stop_controls_visible = true;
        }

        let layout = &mut self.layout;
        layout.button_label = options.button_label.clone();
        if options.hide_config_card {
            layout.config_card_visible = false;
        }
        if options.hide_settings_card {
            layout.settings_card_visible = false;
        }
        if options.hide_manual_hotkey {
            layout.manual_hotkey_visible = false;
        }
        if options.hide_area_hotkey {
            layout.area_hotkey_visible = false;
        }
        if options.hide_global_pause_hotkey {
            layout.global_pause_hotkey_visible = false;
        }
        if options.hide_screenshots_group {
            layout.screenshots_group_visible = false;
        }
        if options.show_select_areas_button {
            layout.select_areas_visible = true;
        }
        if options.update_settings_header {
            layout.settings_header = RESTRICTED_SETTINGS_HEADER.to_string();
        }

        tracing::debug!("Console acquired (holders: {})", self.count);
        opened
    }

    /// Drop a reference. Returns true if this call tore the console down.
    /// Releasing an unheld console does nothing.
    pub fn release(&mut self) -> bool {
        if self.count == 0 {
            tracing::debug!("Console release with no holders ignored");
            return false;
        }
        self.count -= 1;
        tracing::debug!("Console released (holders: {})", self.count);
        if self.count > 0 {
            return false;
        }

        self.layout = ConsoleLayout::default();
        true
    }

    /// Set the status line shown under the console. Cleared on teardown.
    pub fn set_status(&mut self, text: impl Into<String>) {
        self.layout.status_label = text.into();
    }
}

/// Shared handle to the one console guard.
#[derive(Debug, Clone, Default)]
pub struct ConsoleHandle {
    inner: Arc<Mutex<ConsoleResourceGuard>>,
}

impl ConsoleHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleResourceGuard> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self, options: &ConsoleOptions) -> bool {
        self.lock().acquire(options)
    }

    pub fn release(&self) -> bool {
        self.lock().release()
    }

    pub fn set_status(&self, text: impl Into<String>) {
        self.lock().set_status(text);
    }

    pub fn count(&self) -> usize {
        self.lock().count()
    }

    pub fn is_visible(&self) -> bool {
        self.lock().is_visible()
    }

    pub fn layout(&self) -> ConsoleLayout {
        self.lock().layout().clone()
    }
}
