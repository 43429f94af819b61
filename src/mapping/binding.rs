//! Single-control binding values and their wire encodings.
//!
//! A [`Binding`] describes how one logical element maps onto a raw control
//! of a physical device. The wire form is the right-hand side of a
//! `key:value` mapping entry: `b3` (button), `h0.4` (hat direction),
//! `a2` / `a2~` (whole axis, optionally inverted), `-a0` / `+a0`
//! (negative / positive half-axis).

use std::fmt::{self, Display};

use crate::mapping::{AXIS_MAX, AXIS_MIN};

/// How one logical control maps to a raw control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    /// Unbound. Never participates in containment or equality as "bound".
    #[default]
    None,
    Button {
        index: u16,
    },
    /// `min`/`max` are the two observed standardized extremes. `committed`
    /// marks whether the excursion-and-release gesture finished.
    Axis {
        index: u16,
        min: i32,
        max: i32,
        committed: bool,
    },
    Hat {
        index: u16,
        mask: u8,
    },
}

impl Binding {
    pub fn is_bound(&self) -> bool {
        !matches!(self, Binding::None)
    }

    /// Whether enough evidence has been gathered to commit this binding.
    /// Buttons and hats are always definite; axes carry an explicit flag.
    pub fn is_committed(&self) -> bool {
        match self {
            Binding::None => false,
            Binding::Axis { committed, .. } => *committed,
            Binding::Button { .. } | Binding::Hat { .. } => true,
        }
    }

    /// True when `self` already covers `other`.
    ///
    /// For axis bindings that means: same physical axis, `self` committed,
    /// and `self`'s range (order-normalized) a superset of `other`'s. All
    /// other kinds require exact equality. Unbound values contain nothing.
    pub fn contains(&self, other: &Binding) -> bool {
        match (self, other) {
            (Binding::None, _) | (_, Binding::None) => false,
            (
                Binding::Axis {
                    index: index_a,
                    min: min_a,
                    max: max_a,
                    committed,
                },
                Binding::Axis {
                    index: index_b,
                    min: min_b,
                    max: max_b,
                    ..
                },
            ) => {
                if index_a != index_b || !committed {
                    return false;
                }
                let (lo_a, hi_a) = (min_a.min(max_a), min_a.max(max_a));
                let (lo_b, hi_b) = (min_b.min(max_b), min_b.max(max_b));
                lo_a <= lo_b && hi_a >= hi_b
            }
            (a, b) => a == b,
        }
    }

    /// Parses a wire-format binding value. Returns `None` for anything
    /// malformed; callers treat that as "not a binding" rather than an
    /// error.
    pub fn parse(value: &str) -> Option<Binding> {
        let (body, half) = match value.as_bytes().first()? {
            b'-' => (&value[1..], Some(AXIS_MIN)),
            b'+' => (&value[1..], Some(AXIS_MAX)),
            _ => (value, None),
        };
        let (kind, rest) = body.split_at(body.len().min(1));
        match kind {
            "b" if half.is_none() => {
                let index = rest.parse().ok()?;
                Some(Binding::Button { index })
            }
            "h" if half.is_none() => {
                let (index, mask) = rest.split_once('.')?;
                Some(Binding::Hat {
                    index: index.parse().ok()?,
                    mask: mask.parse().ok()?,
                })
            }
            "a" => {
                if let Some(extreme) = half {
                    let index = rest.parse().ok()?;
                    Some(Binding::Axis {
                        index,
                        min: 0,
                        max: extreme,
                        committed: true,
                    })
                } else {
                    let (rest, inverted) = match rest.strip_suffix('~') {
                        Some(stripped) => (stripped, true),
                        None => (rest, false),
                    };
                    let index = rest.parse().ok()?;
                    let (min, max) = if inverted {
                        (AXIS_MAX, AXIS_MIN)
                    } else {
                        (AXIS_MIN, AXIS_MAX)
                    };
                    Some(Binding::Axis {
                        index,
                        min,
                        max,
                        committed: true,
                    })
                }
            }
            _ => None,
        }
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::None => Ok(()),
            Binding::Button { index } => write!(f, "b{index}"),
            Binding::Hat { index, mask } => write!(f, "h{index}.{mask}"),
            Binding::Axis {
                index, min, max, ..
            } => {
                if *min == 0 && *max == AXIS_MIN {
                    write!(f, "-a{index}")
                } else if *min == 0 && *max == AXIS_MAX {
                    write!(f, "+a{index}")
                } else if min > max {
                    write!(f, "a{index}~")
                } else {
                    write!(f, "a{index}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_forms_round_trip() {
        for text in ["b3", "b12", "h0.4", "h1.8", "a2", "a2~", "-a0", "+a5"] {
            let binding = Binding::parse(text).unwrap();
            assert_eq!(binding.to_string(), text);
        }
    }

    #[test]
    fn malformed_values_parse_to_nothing() {
        for text in ["", "x3", "b", "bx", "h4", "h4.", "a", "-b3", "+h0.1"] {
            assert_eq!(Binding::parse(text), None, "{text:?}");
        }
    }

    #[test]
    fn containment_is_reflexive_for_committed_bindings() {
        let bindings = [
            Binding::Button { index: 3 },
            Binding::Hat { index: 0, mask: 4 },
            Binding::Axis {
                index: 1,
                min: AXIS_MIN,
                max: AXIS_MAX,
                committed: true,
            },
        ];
        for binding in bindings {
            assert!(binding.contains(&binding));
        }
    }

    #[test]
    fn axis_containment_requires_superset_range() {
        let whole = Binding::Axis {
            index: 0,
            min: AXIS_MIN,
            max: AXIS_MAX,
            committed: true,
        };
        let negative_half = Binding::Axis {
            index: 0,
            min: 0,
            max: AXIS_MIN,
            committed: true,
        };
        assert!(whole.contains(&negative_half));
        assert!(!negative_half.contains(&whole));

        let other_axis = Binding::Axis {
            index: 1,
            min: AXIS_MIN,
            max: AXIS_MAX,
            committed: true,
        };
        assert!(!whole.contains(&other_axis));
    }

    #[test]
    fn uncommitted_axis_contains_nothing() {
        let pending = Binding::Axis {
            index: 0,
            min: AXIS_MIN,
            max: AXIS_MAX,
            committed: false,
        };
        assert!(!pending.contains(&pending));
    }

    #[test]
    fn unbound_never_contains() {
        assert!(!Binding::None.contains(&Binding::None));
        assert!(!Binding::None.contains(&Binding::Button { index: 0 }));
        assert!(!Binding::Button { index: 0 }.contains(&Binding::None));
    }
}
