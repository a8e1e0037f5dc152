//! Status to badge lookup used by every renderer.

use serde::Serialize;

use super::status::{Status, StatusValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorClass {
    Warning,
    Primary,
    Success,
    Danger,
    /// Only used for values outside the taxonomy.
    Secondary,
}

impl ColorClass {
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Warning => "bg-warning",
            Self::Primary => "bg-primary",
            Self::Success => "bg-success",
            Self::Danger => "bg-danger",
            Self::Secondary => "bg-secondary",
        }
    }
}

/// Text color to use on top of the badge background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextContrast {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge<'a> {
    pub label: &'a str,
    pub color: ColorClass,
    pub contrast: TextContrast,
}

const fn entry(label: &'static str, color: ColorClass, contrast: TextContrast) -> Badge<'static> {
    Badge {
        label,
        color,
        contrast,
    }
}

/// Indexed by `Status as usize`; order must follow the enum declaration.
const BADGES: [Badge<'static>; 7] = [
    entry("Pending", ColorClass::Warning, TextContrast::Dark),
    entry("Starting", ColorClass::Primary, TextContrast::Light),
    entry("Running", ColorClass::Primary, TextContrast::Light),
    entry("Uploading", ColorClass::Primary, TextContrast::Light),
    entry("Completed", ColorClass::Success, TextContrast::Light),
    entry("Failed", ColorClass::Danger, TextContrast::Light),
    entry("Partial", ColorClass::Warning, TextContrast::Dark),
];

pub fn badge(status: Status) -> Badge<'static> {
    BADGES[status as usize]
}

/// Like [`badge`], but renders unrecognized values verbatim instead of failing.
pub fn badge_for(value: &StatusValue) -> Badge<'_> {
    match value {
        StatusValue::Known(status) => badge(*status),
        StatusValue::Unrecognized(raw) => Badge {
            label: raw,
            color: ColorClass::Secondary,
            contrast: TextContrast::Light,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_status_declaration() {
        for status in Status::ALL {
            let label = badge(status).label.to_lowercase();
            assert_eq!(label, status.as_str());
        }
    }

    #[test]
    fn badge_colors() {
        assert_eq!(badge(Status::Pending).color, ColorClass::Warning);
        assert_eq!(badge(Status::Running).color, ColorClass::Primary);
        assert_eq!(badge(Status::Completed).color, ColorClass::Success);
        assert_eq!(badge(Status::Failed).color, ColorClass::Danger);

        let partial = badge(Status::Partial);
        assert_eq!(partial.color, ColorClass::Warning);
        assert_eq!(partial.contrast, TextContrast::Dark);
        assert_ne!(partial, badge(Status::Failed));
    }

    #[test]
    fn unrecognized_status_falls_back_to_raw_label() {
        let value = StatusValue::Unrecognized("rebooting".to_string());
        let badge = badge_for(&value);
        assert_eq!(badge.label, "rebooting");
        assert_eq!(badge.color, ColorClass::Secondary);
        assert_eq!(badge.color.css_class(), "bg-secondary");
    }
}
