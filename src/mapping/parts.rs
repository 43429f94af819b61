//! Structured mapping text: parse, edit, and canonical serialization.
//!
//! A mapping string is `GUID,Name,key1:value1,key2:value2,...,` with a
//! trailing comma. Parsing is best-effort and never fails hard: truncated
//! input simply yields fewer populated parts. Editing happens on the
//! structured value and the canonical text is re-rendered on serialize,
//! which also normalizes legacy button labels and merges half-axis pairs.

use crate::mapping::binding::Binding;
use crate::mapping::element::{legacy_swapped_key, Element};

/// Hint name controlling the legacy A/B/X/Y label layout.
const BUTTON_LABEL_HINT: &str = "SDL_GAMECONTROLLER_USE_BUTTON_LABELS:=1";

/// Keys hoisted to the front of a serialized mapping. Moving them in this
/// order leaves them reading `crc`, `platform`, `type` (last moved wins the
/// front position).
const FRONT_KEYS: [&str; 3] = ["type", "platform", "crc"];

/// Keys moved behind everything else, in this relative order.
const TAIL_KEYS: [&str; 3] = ["sdk>=", "sdk<=", "hint"];

/// A parsed mapping: device identity plus an insertion-ordered entry list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingParts {
    pub guid: String,
    pub name: String,
    entries: Vec<(String, String)>,
}

impl MappingParts {
    /// Splits a mapping string into parts.
    ///
    /// The two leading fields are fixed: everything before the first comma
    /// is the GUID, everything up to the second comma is the display name.
    /// A GUID without any comma yields parts with only the GUID populated.
    /// Entry accumulation stops at the first token without a `:`.
    pub fn parse(text: &str) -> MappingParts {
        let mut parts = MappingParts::default();

        let Some((guid, rest)) = text.split_once(',') else {
            parts.guid = text.to_string();
            return parts;
        };
        parts.guid = guid.to_string();

        let Some((raw_name, rest)) = rest.split_once(',') else {
            return parts;
        };
        parts.name = sanitize_name(raw_name);

        for token in rest.split(',') {
            if token.is_empty() {
                continue;
            }
            match token.split_once(':') {
                Some((key, value)) => parts.entries.push((key.to_string(), value.to_string())),
                None => break,
            }
        }
        parts
    }

    /// Entry lookup by exact key, falling back through the legacy A/B/X/Y
    /// swap when the button-labels hint is active.
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.raw_value(key).or_else(|| {
            if self.has_active_label_hint() {
                legacy_swapped_key(key).and_then(|swapped| self.raw_value(swapped))
            } else {
                None
            }
        })
    }

    /// Overwrites the entry for `key`, appending when absent. Never leaves
    /// two entries with the same key.
    pub fn set_value(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Deletes the entry for `key` if present.
    pub fn remove_value(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Editor-surface access addressed by logical element. The metadata
    /// pseudo-elements write through to their fields: `Name` is the
    /// display name, `Type` the `type` entry.
    pub fn element_value(&self, element: Element) -> Option<&str> {
        match element {
            Element::Name => (!self.name.is_empty()).then_some(self.name.as_str()),
            _ => self.get_value(element.key()),
        }
    }

    pub fn set_element_value(&mut self, element: Element, value: &str) {
        match element {
            Element::Name => self.name = sanitize_name(value),
            _ => self.set_value(element.key(), value),
        }
    }

    fn raw_value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True when the mapping carries the button-labels hint in its active
    /// form; only then does [`MappingParts::get_value`] retry swapped keys.
    fn has_active_label_hint(&self) -> bool {
        self.raw_value("hint") == Some(BUTTON_LABEL_HINT)
    }

    fn has_label_hint(&self) -> bool {
        matches!(self.raw_value("hint"),
                 Some(value) if value.strip_prefix('!').unwrap_or(value) == BUTTON_LABEL_HINT)
    }

    /// Legacy label normalization: swaps the `a`/`b` and `x`/`y` keys and
    /// toggles the hint's polarity prefix. A mapping without the hint is
    /// never touched. Each application swaps again, so callers apply it
    /// exactly once per serialization.
    pub fn convert_baxy(&mut self) {
        if !self.has_label_hint() {
            return;
        }
        for (key, value) in &mut self.entries {
            if let Some(swapped) = legacy_swapped_key(key) {
                *key = swapped.to_string();
            } else if key.as_str() == "hint" {
                *value = match value.strip_prefix('!') {
                    Some(stripped) => stripped.to_string(),
                    None => format!("!{value}"),
                };
            }
        }
    }

    /// Merges `-<axis>`/`+<axis>` entry pairs bound to opposite-signed
    /// halves of the same physical axis into a single whole-axis entry
    /// (`a<N>`, or `a<N>~` when the signs are crossed). Pairs that do not
    /// agree on the physical axis, and lone halves, are left alone.
    pub fn combine_axes(&mut self) {
        let mut index = 0;
        while index < self.entries.len() {
            let Some(base) = self.entries[index].0.strip_prefix('-').map(str::to_string) else {
                index += 1;
                continue;
            };
            let positive_key = format!("+{base}");
            let Some(partner) = self.entries.iter().position(|(k, _)| *k == positive_key) else {
                index += 1;
                continue;
            };

            let negative = Binding::parse(&self.entries[index].1);
            let positive = Binding::parse(&self.entries[partner].1);
            if let (
                Some(Binding::Axis {
                    index: negative_axis,
                    min: 0,
                    max: negative_extreme,
                    ..
                }),
                Some(Binding::Axis {
                    index: positive_axis,
                    min: 0,
                    max: positive_extreme,
                    ..
                }),
            ) = (negative, positive)
            {
                if negative_axis == positive_axis
                    && negative_extreme.signum() == -positive_extreme.signum()
                    && negative_extreme != 0
                {
                    // Crossed signs mean the physical axis runs opposite to
                    // the logical one.
                    let merged = if negative_extreme > 0 {
                        format!("a{negative_axis}~")
                    } else {
                        format!("a{negative_axis}")
                    };
                    self.entries[index] = (base, merged);
                    self.entries.remove(partner);
                    if partner < index {
                        index -= 1;
                    }
                }
            }
            index += 1;
        }
    }

    /// Renders the canonical mapping string.
    ///
    /// Applies legacy label normalization and half-axis merging to a
    /// working copy, then orders entries: `crc`, `platform`, `type` up
    /// front, everything else sorted lexicographically, `sdk>=`, `sdk<=`
    /// and `hint` at the end. The output always closes with a comma.
    pub fn serialize(&self) -> String {
        let mut working = self.clone();
        working.convert_baxy();
        working.combine_axes();

        let mut entries = working.entries;
        let mut front = Vec::new();
        for key in FRONT_KEYS {
            if let Some(position) = entries.iter().position(|(k, _)| k == key) {
                front.insert(0, entries.remove(position));
            }
        }
        let mut tail = Vec::new();
        for key in TAIL_KEYS {
            if let Some(position) = entries.iter().position(|(k, _)| k == key) {
                tail.push(entries.remove(position));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::new();
        out.push_str(&working.guid);
        out.push(',');
        out.push_str(if working.name.is_empty() {
            "*"
        } else {
            &working.name
        });
        out.push(',');
        for (key, value) in front.iter().chain(entries.iter()).chain(tail.iter()) {
            out.push_str(key);
            out.push(':');
            out.push_str(value);
            out.push(',');
        }
        out
    }
}

/// Strips commas and surrounding whitespace from a display name. A bare
/// `*` means "no name".
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| *c != ',').collect();
    let trimmed = cleaned.trim();
    if trimmed == "*" {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Reads the checksum field embedded in a 32-hex-character GUID (third and
/// fourth byte, little endian). Returns 0 when absent or unparseable.
pub fn guid_crc(guid: &str) -> u16 {
    if guid.len() != 32 {
        return 0;
    }
    let low = guid.get(4..6).and_then(|s| u8::from_str_radix(s, 16).ok());
    let high = guid.get(6..8).and_then(|s| u8::from_str_radix(s, 16).ok());
    match (low, high) {
        (Some(low), Some(high)) => u16::from(low) | (u16::from(high) << 8),
        _ => 0,
    }
}

/// Returns the GUID with its embedded checksum field cleared, so mappings
/// match any firmware revision of the same device.
pub fn strip_guid_crc(guid: &str) -> String {
    let mut out = guid.to_string();
    if out.len() == 32 && out.is_ascii() {
        out.replace_range(4..8, "0000");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv_set(parts: &MappingParts) -> Vec<(String, String)> {
        let mut entries = parts.entries().to_vec();
        entries.sort();
        entries
    }

    #[test]
    fn parses_guid_name_and_entries() {
        let parts =
            MappingParts::parse("03000000deadbeef0000000000000000,Pad One,a:b0,leftx:a0,");
        assert_eq!(parts.guid, "03000000deadbeef0000000000000000");
        assert_eq!(parts.name, "Pad One");
        assert_eq!(parts.get_value("a"), Some("b0"));
        assert_eq!(parts.get_value("leftx"), Some("a0"));
        assert_eq!(parts.get_value("b"), None);
    }

    #[test]
    fn guid_only_input_populates_only_the_guid() {
        let parts = MappingParts::parse("03000000deadbeef0000000000000000");
        assert_eq!(parts.guid, "03000000deadbeef0000000000000000");
        assert_eq!(parts.name, "");
        assert!(parts.entries().is_empty());
    }

    #[test]
    fn starred_name_means_unnamed() {
        let parts = MappingParts::parse("*,*,a:b0,");
        assert_eq!(parts.name, "");
        assert_eq!(parts.serialize(), "*,*,a:b0,");
    }

    #[test]
    fn entry_accumulation_stops_without_colons() {
        let parts = MappingParts::parse("*,Pad,a:b0,garbage,b:b1,");
        assert_eq!(parts.get_value("a"), Some("b0"));
        assert_eq!(parts.get_value("b"), None);
    }

    #[test]
    fn set_value_overwrites_instead_of_duplicating() {
        let mut parts = MappingParts::parse("*,Pad,a:b0,");
        parts.set_value("a", "b5");
        parts.set_value("b", "b1");
        assert_eq!(parts.get_value("a"), Some("b5"));
        assert_eq!(
            parts
                .entries()
                .iter()
                .filter(|(k, _)| k == "a")
                .count(),
            1
        );
        parts.remove_value("a");
        assert_eq!(parts.get_value("a"), None);
        parts.remove_value("a"); // absent key is a no-op
        assert_eq!(parts.get_value("b"), Some("b1"));
    }

    #[test]
    fn get_value_falls_back_through_legacy_labels() {
        let baxy = "*,Pad,b:b0,hint:SDL_GAMECONTROLLER_USE_BUTTON_LABELS:=1,";
        let parts = MappingParts::parse(baxy);
        // "a" is absent but the hint makes the "b" entry answer for it.
        assert_eq!(parts.get_value("a"), Some("b0"));

        let plain = MappingParts::parse("*,Pad,b:b0,");
        assert_eq!(plain.get_value("a"), None);
    }

    #[test]
    fn convert_baxy_swaps_keys_and_inverts_hint() {
        let mut parts = MappingParts::parse(
            "*,Pad,a:b0,b:b1,x:b2,y:b3,back:b4,hint:SDL_GAMECONTROLLER_USE_BUTTON_LABELS:=1,",
        );
        parts.convert_baxy();
        assert_eq!(parts.raw_value("a"), Some("b1"));
        assert_eq!(parts.raw_value("b"), Some("b0"));
        assert_eq!(parts.raw_value("x"), Some("b3"));
        assert_eq!(parts.raw_value("y"), Some("b2"));
        assert_eq!(parts.raw_value("back"), Some("b4"));
        assert_eq!(
            parts.raw_value("hint"),
            Some("!SDL_GAMECONTROLLER_USE_BUTTON_LABELS:=1")
        );
    }

    #[test]
    fn convert_baxy_without_hint_is_a_no_op() {
        let mut parts = MappingParts::parse("*,Pad,a:b0,b:b1,");
        let before = parts.clone();
        parts.convert_baxy();
        assert_eq!(parts, before);
    }

    #[test]
    fn serialize_applies_label_conversion_exactly_once() {
        let parts = MappingParts::parse(
            "*,Pad,a:b0,b:b1,hint:SDL_GAMECONTROLLER_USE_BUTTON_LABELS:=1,",
        );
        let first = parts.serialize();
        let second = parts.serialize();
        // Serialize never mutates the source, so repeated calls agree.
        assert_eq!(first, second);
        assert!(first.contains("a:b1,"));
        assert!(first.contains("b:b0,"));
        assert!(first.contains("hint:!SDL_GAMECONTROLLER_USE_BUTTON_LABELS:=1,"));
    }

    #[test]
    fn combine_axes_merges_opposite_halves() {
        let mut parts = MappingParts::parse("*,Pad,-leftx:-a0,+leftx:+a0,");
        parts.combine_axes();
        assert_eq!(parts.get_value("leftx"), Some("a0"));
        assert_eq!(parts.get_value("-leftx"), None);
        assert_eq!(parts.get_value("+leftx"), None);
    }

    #[test]
    fn combine_axes_marks_crossed_signs_as_inverted() {
        let mut parts = MappingParts::parse("*,Pad,-lefty:+a1,+lefty:-a1,");
        parts.combine_axes();
        assert_eq!(parts.get_value("lefty"), Some("a1~"));
    }

    #[test]
    fn combine_axes_is_idempotent() {
        let mut parts = MappingParts::parse("*,Pad,-leftx:-a0,+leftx:+a0,a:b0,");
        parts.combine_axes();
        let once = parts.clone();
        parts.combine_axes();
        assert_eq!(parts, once);
    }

    #[test]
    fn lone_half_axis_is_never_merged() {
        let mut parts = MappingParts::parse("*,Pad,-leftx:-a0,");
        parts.combine_axes();
        assert_eq!(parts.get_value("-leftx"), Some("-a0"));
    }

    #[test]
    fn mismatched_physical_axes_are_left_alone() {
        let mut parts = MappingParts::parse("*,Pad,-leftx:-a0,+leftx:+a1,");
        parts.combine_axes();
        assert_eq!(parts.get_value("-leftx"), Some("-a0"));
        assert_eq!(parts.get_value("+leftx"), Some("+a1"));
    }

    #[test]
    fn serialize_orders_keys_canonically() {
        let parts = MappingParts::parse(
            "*,Pad,hint:x:=1,b:b1,sdk>=:20,a:b0,type:flightstick,crc:abcd,sdk<=:30,platform:Linux,",
        );
        assert_eq!(
            parts.serialize(),
            "*,Pad,crc:abcd,platform:Linux,type:flightstick,a:b0,b:b1,sdk>=:20,sdk<=:30,hint:x:=1,"
        );
    }

    #[test]
    fn round_trip_preserves_the_entry_set() {
        let text = "03000000deadbeef0000000000000000,Pad,dpup:h0.1,a:b0,leftx:a0,crc:1234,";
        let parsed = MappingParts::parse(text);
        let reparsed = MappingParts::parse(&parsed.serialize());
        assert_eq!(kv_set(&parsed), kv_set(&reparsed));
        assert_eq!(reparsed.guid, parsed.guid);
        assert_eq!(reparsed.name, parsed.name);
    }

    #[test]
    fn guid_crc_helpers() {
        let guid = "0300a1b2deadbeef0000000000000000";
        assert_eq!(guid_crc(guid), 0xb2a1);
        assert_eq!(strip_guid_crc(guid), "03000000deadbeef0000000000000000");
        assert_eq!(guid_crc("short"), 0);
        assert_eq!(strip_guid_crc("short"), "short");
    }

    #[test]
    fn element_addressing_reaches_metadata_fields() {
        let mut parts = MappingParts::parse("*,*,a:b0,");
        assert_eq!(parts.element_value(Element::Name), None);
        parts.set_element_value(Element::Name, " Super Pad, v2 ");
        assert_eq!(parts.element_value(Element::Name), Some("Super Pad v2"));

        parts.set_element_value(Element::Type, "flightstick");
        assert_eq!(parts.element_value(Element::Type), Some("flightstick"));
        assert_eq!(parts.element_value(Element::South), Some("b0"));
        assert!(parts.serialize().starts_with("*,Super Pad v2,type:flightstick,"));
    }

    #[test]
    fn sanitize_name_strips_commas_and_whitespace() {
        assert_eq!(sanitize_name("  Pad, One  "), "Pad One");
        assert_eq!(sanitize_name("*"), "");
    }
}
