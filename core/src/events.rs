//! Mapping from `on<Event>` prop names to platform event names.

use rivulet_str::Str;

/// Prop event names whose platform event is spelled differently.
const ALIASES: &[(&str, &str)] = &[("change", "input"), ("doubleclick", "dblclick")];

const CAPTURE_SUFFIX: &str = "Capture";

/// A platform listener derived from a prop name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    /// Platform event name, e.g. `click`.
    pub event: Str,
    /// Whether the listener runs in the capture phase.
    pub capture: bool,
}

/// Parses `onClick` / `onClickCapture` style prop names. Other names return `None`.
#[must_use]
pub fn listener(prop: &str) -> Option<Listener> {
    let name = prop.strip_prefix("on")?;
    if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return None;
    }
    let (name, capture) = match name.strip_suffix(CAPTURE_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => (stripped, true),
        _ => (name, false),
    };
    let lower = name.to_ascii_lowercase();
    let event = ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map_or_else(|| Str::from(lower.clone()), |(_, event)| Str::from(*event));
    Some(Listener { event, capture })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bubble_and_capture_listeners() {
        assert_eq!(
            listener("onClick"),
            Some(Listener {
                event: Str::from("click"),
                capture: false
            })
        );
        assert_eq!(
            listener("onKeyDownCapture"),
            Some(Listener {
                event: Str::from("keydown"),
                capture: true
            })
        );
    }

    #[test]
    fn change_listens_to_input() {
        assert_eq!(listener("onChange").map(|l| l.event), Some(Str::from("input")));
    }

    #[test]
    fn plain_props_are_not_listeners() {
        assert_eq!(listener("one"), None);
        assert_eq!(listener("class"), None);
        assert_eq!(listener("on"), None);
    }
}
