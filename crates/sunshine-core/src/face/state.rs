//! Mode flags of the watch face.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    Visible,
    #[default]
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerMode {
    #[default]
    Interactive,
    Ambient,
}

/// Orthogonal mode flags plus the geometry chosen from window insets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaceState {
    pub visibility: Visibility,
    pub power: PowerMode,
    /// Latched from device properties
    pub low_bit_ambient: bool,
    pub is_round: bool,
    /// Flips on every tap
    pub tap_parity: bool,
    pub x_offset: i32,
    pub y_offset: i32,
}

impl FaceState {
    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    pub fn is_ambient(&self) -> bool {
        self.power == PowerMode::Ambient
    }

    /// Whether the seconds tick should run.
    pub fn tick_eligible(&self) -> bool {
        self.is_visible() && !self.is_ambient()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeekMode {
    Short,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundVisibility {
    Interruptive,
    Persistent,
}

/// How the host should present the face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchFaceStyle {
    pub peek_mode: PeekMode,
    pub background: BackgroundVisibility,
    /// The face draws its own time
    pub show_system_ui_time: bool,
    pub accepts_tap_events: bool,
}

impl Default for WatchFaceStyle {
    fn default() -> Self {
        Self {
            peek_mode: PeekMode::Variable,
            background: BackgroundVisibility::Interruptive,
            show_system_ui_time: false,
            accepts_tap_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_eligible_only_when_visible_and_interactive() {
        let mut state = FaceState::default();
        assert!(!state.tick_eligible());

        state.visibility = Visibility::Visible;
        assert!(state.tick_eligible());

        state.power = PowerMode::Ambient;
        assert!(!state.tick_eligible());
    }
}
