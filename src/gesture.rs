//! Pointer, touch, and keyboard input mapped to reader commands

/// Command produced by an input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Previous page
    Prev,
    /// Next page
    Next,
    /// Show or hide the reader chrome
    ToggleMenu,
    /// Enter or leave fullscreen
    ToggleFullscreen,
    /// Leave fullscreen
    ExitFullscreen,
}

/// Keys the reader reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Left arrow
    ArrowLeft,
    /// Right arrow
    ArrowRight,
    /// Space bar
    Space,
    /// Escape
    Escape,
    /// Any printable character
    Char(char),
}

/// Raw input events
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Finger down at (x, y) px, timestamp in ms
    TouchStart {
        /// Horizontal coordinate
        x: f32,
        /// Vertical coordinate
        y: f32,
        /// Event time in ms
        time_ms: u64,
    },
    /// Finger moved
    TouchMove {
        /// Horizontal coordinate
        x: f32,
        /// Vertical coordinate
        y: f32,
        /// Event time in ms
        time_ms: u64,
    },
    /// Finger lifted
    TouchEnd,
    /// Click or tap at `x` inside a surface of `width` px
    Tap {
        /// Horizontal coordinate relative to the surface
        x: f32,
        /// Surface width
        width: f32,
    },
    /// Key press
    Key(Key),
}

/// Swipe and tap thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    /// Minimum travel along the dominant axis, px
    pub swipe_threshold_px: f32,
    /// Maximum duration of a swipe, ms
    pub swipe_max_ms: u64,
    /// Taps left of this fraction go back
    pub prev_zone: f32,
    /// Taps right of this fraction go forward
    pub next_zone: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_threshold_px: 50.0,
            swipe_max_ms: 500,
            prev_zone: 0.2,
            next_zone: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TouchPoint {
    x: f32,
    y: f32,
    time_ms: u64,
}

/// Stateful input interpreter
#[derive(Debug, Clone, Default)]
pub struct GestureInput {
    config: GestureConfig,
    touch_start: Option<TouchPoint>,
    touch_last: Option<TouchPoint>,
    fullscreen: bool,
    input_focused: bool,
}

impl GestureInput {
    /// Interpreter with custom thresholds
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Whether fullscreen is active
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Track the fullscreen state reported by the host
    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    /// A text field has focus; every event is ignored while set
    pub fn set_input_focused(&mut self, focused: bool) {
        self.input_focused = focused;
    }

    /// Feed one event; returns the command it triggers, if any
    pub fn handle(&mut self, event: InputEvent) -> Option<Command> {
        if self.input_focused {
            return None;
        }
        match event {
            InputEvent::TouchStart { x, y, time_ms } => {
                self.touch_start = Some(TouchPoint { x, y, time_ms });
                self.touch_last = None;
                None
            }
            InputEvent::TouchMove { x, y, time_ms } => {
                if self.touch_start.is_some() {
                    self.touch_last = Some(TouchPoint { x, y, time_ms });
                }
                None
            }
            InputEvent::TouchEnd => {
                let start = self.touch_start.take();
                let last = self.touch_last.take();
                self.classify_swipe(start?, last?)
            }
            InputEvent::Tap { x, width } => self.classify_tap(x, width),
            InputEvent::Key(key) => self.classify_key(key),
        }
    }

    fn classify_swipe(&self, start: TouchPoint, end: TouchPoint) -> Option<Command> {
        if end.time_ms.saturating_sub(start.time_ms) > self.config.swipe_max_ms {
            return None;
        }
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        // vertical swipes scroll
        if dx.abs() <= dy.abs() || dx.abs() < self.config.swipe_threshold_px {
            return None;
        }
        if dx < 0.0 {
            Some(Command::Next)
        } else {
            Some(Command::Prev)
        }
    }

    fn classify_tap(&self, x: f32, width: f32) -> Option<Command> {
        if width <= 0.0 {
            return None;
        }
        let relative = x / width;
        if relative < self.config.prev_zone {
            Some(Command::Prev)
        } else if relative > self.config.next_zone {
            Some(Command::Next)
        } else {
            Some(Command::ToggleMenu)
        }
    }

    fn classify_key(&mut self, key: Key) -> Option<Command> {
        match key {
            Key::ArrowLeft => Some(Command::Prev),
            Key::ArrowRight | Key::Space => Some(Command::Next),
            Key::Escape if self.fullscreen => {
                self.fullscreen = false;
                Some(Command::ExitFullscreen)
            }
            Key::Char('f') | Key::Char('F') => {
                self.fullscreen = !self.fullscreen;
                Some(Command::ToggleFullscreen)
            }
            Key::Escape | Key::Char(_) => None,
        }
    }
}
