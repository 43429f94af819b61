//! Logical gamepad elements and the fixed calibration order table.
//!
//! An [`Element`] names an abstract control ("south button", "left stick X
//! negative half") independent of any physical device's raw numbering. Each
//! bindable element owns a slot in the session's binding array and a
//! canonical key in the mapping string.

use std::fmt::{self, Display};

/// Every logical control a mapping can describe.
///
/// Buttons come first in slot order, then the half-axis pseudo-elements.
/// `Name` and `Type` are editor-surface pseudo-elements: they address the
/// mapping's metadata fields and never carry a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    South,
    East,
    West,
    North,
    Back,
    Guide,
    Start,
    LeftStick,
    RightStick,
    LeftShoulder,
    RightShoulder,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    Misc1,
    Paddle1,
    Paddle2,
    Paddle3,
    Paddle4,
    Touchpad,
    LeftXNegative,
    LeftXPositive,
    LeftYNegative,
    LeftYPositive,
    RightXNegative,
    RightXPositive,
    RightYNegative,
    RightYPositive,
    LeftTrigger,
    RightTrigger,
    Name,
    Type,
}

/// Number of plain button elements.
pub const BUTTON_COUNT: usize = 21;

/// Number of bindable elements (buttons plus half-axis pseudo-elements).
pub const BINDABLE_COUNT: usize = 31;

/// All bindable elements in slot order.
pub const BINDABLE_ELEMENTS: [Element; BINDABLE_COUNT] = [
    Element::South,
    Element::East,
    Element::West,
    Element::North,
    Element::Back,
    Element::Guide,
    Element::Start,
    Element::LeftStick,
    Element::RightStick,
    Element::LeftShoulder,
    Element::RightShoulder,
    Element::DpadUp,
    Element::DpadDown,
    Element::DpadLeft,
    Element::DpadRight,
    Element::Misc1,
    Element::Paddle1,
    Element::Paddle2,
    Element::Paddle3,
    Element::Paddle4,
    Element::Touchpad,
    Element::LeftXNegative,
    Element::LeftXPositive,
    Element::LeftYNegative,
    Element::LeftYPositive,
    Element::RightXNegative,
    Element::RightXPositive,
    Element::RightYNegative,
    Element::RightYPositive,
    Element::LeftTrigger,
    Element::RightTrigger,
];

/// The guided calibration walk order.
///
/// Face buttons first so the forward/backward flow actions get bound before
/// anything else, then sticks with their stick-click buttons, shoulders and
/// triggers, dpad, menu cluster, paddles and finally the touchpad. `None`
/// entries are sentinels the walker skips over.
pub const BINDING_ORDER: [Option<Element>; BINDABLE_COUNT] = [
    Some(Element::South),
    Some(Element::East),
    Some(Element::North),
    Some(Element::West),
    Some(Element::LeftXNegative),
    Some(Element::LeftXPositive),
    Some(Element::LeftYNegative),
    Some(Element::LeftYPositive),
    Some(Element::LeftStick),
    Some(Element::RightXNegative),
    Some(Element::RightXPositive),
    Some(Element::RightYNegative),
    Some(Element::RightYPositive),
    Some(Element::RightStick),
    Some(Element::LeftShoulder),
    Some(Element::LeftTrigger),
    Some(Element::RightShoulder),
    Some(Element::RightTrigger),
    Some(Element::DpadUp),
    Some(Element::DpadRight),
    Some(Element::DpadDown),
    Some(Element::DpadLeft),
    Some(Element::Back),
    Some(Element::Guide),
    Some(Element::Start),
    Some(Element::Misc1),
    Some(Element::Paddle1),
    Some(Element::Paddle2),
    Some(Element::Paddle3),
    Some(Element::Paddle4),
    Some(Element::Touchpad),
];

impl Element {
    /// Canonical key used for this element in a mapping string.
    pub fn key(&self) -> &'static str {
        match self {
            Element::South => "a",
            Element::East => "b",
            Element::West => "x",
            Element::North => "y",
            Element::Back => "back",
            Element::Guide => "guide",
            Element::Start => "start",
            Element::LeftStick => "leftstick",
            Element::RightStick => "rightstick",
            Element::LeftShoulder => "leftshoulder",
            Element::RightShoulder => "rightshoulder",
            Element::DpadUp => "dpup",
            Element::DpadDown => "dpdown",
            Element::DpadLeft => "dpleft",
            Element::DpadRight => "dpright",
            Element::Misc1 => "misc1",
            Element::Paddle1 => "paddle1",
            Element::Paddle2 => "paddle2",
            Element::Paddle3 => "paddle3",
            Element::Paddle4 => "paddle4",
            Element::Touchpad => "touchpad",
            Element::LeftXNegative => "-leftx",
            Element::LeftXPositive => "+leftx",
            Element::LeftYNegative => "-lefty",
            Element::LeftYPositive => "+lefty",
            Element::RightXNegative => "-rightx",
            Element::RightXPositive => "+rightx",
            Element::RightYNegative => "-righty",
            Element::RightYPositive => "+righty",
            Element::LeftTrigger => "lefttrigger",
            Element::RightTrigger => "righttrigger",
            Element::Name => "name",
            Element::Type => "type",
        }
    }

    /// Looks an element up by its canonical mapping key.
    pub fn from_key(key: &str) -> Option<Element> {
        BINDABLE_ELEMENTS
            .iter()
            .copied()
            .find(|element| element.key() == key)
            .or(match key {
                "name" => Some(Element::Name),
                "type" => Some(Element::Type),
                _ => None,
            })
    }

    /// Slot index into a session's binding array, if this element is
    /// bindable at all.
    pub fn slot(&self) -> Option<usize> {
        BINDABLE_ELEMENTS
            .iter()
            .position(|element| element == self)
    }

    /// True for the half-axis and trigger pseudo-elements.
    pub fn is_axis(&self) -> bool {
        matches!(self.slot(), Some(slot) if slot >= BUTTON_COUNT)
    }

    pub fn is_dpad(&self) -> bool {
        matches!(
            self,
            Element::DpadUp | Element::DpadDown | Element::DpadLeft | Element::DpadRight
        )
    }
}

impl Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Legacy A/B/X/Y label swap used by mappings carrying the button-labels
/// hint. Returns the partner key, or `None` for keys outside the swap set.
pub fn legacy_swapped_key(key: &str) -> Option<&'static str> {
    match key {
        "a" => Some("b"),
        "b" => Some("a"),
        "x" => Some("y"),
        "y" => Some("x"),
        _ => None,
    }
}
