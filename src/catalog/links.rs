//! Plausibility checks for the opaque URLs carried by catalog entries.
//!
//! Links are never parsed beyond "does this look like a fetchable resource";
//! the sheet is hand-edited and routinely holds placeholders.

const PLACEHOLDERS: [&str; 5] = ["", "#", "null", "undefined", "n/a"];

const IMAGE_HINTS: [&str; 9] = [
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
    ".webp",
    "imgur.com",
    "cdn.discordapp.com",
    "imageshack.com",
    "photobucket.com",
];

fn is_placeholder(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
}

fn has_web_scheme(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://") || value.starts_with("//")
}

/// Download links must carry an explicit web scheme.
pub fn is_plausible_download_link(raw: &str) -> bool {
    let value = raw.trim();
    !is_placeholder(value) && has_web_scheme(value)
}

/// Images are also accepted when they mention a known image extension or host.
pub fn is_plausible_image_url(raw: &str) -> bool {
    let value = raw.trim();
    if is_placeholder(value) {
        return false;
    }
    has_web_scheme(value) || IMAGE_HINTS.iter().any(|hint| value.contains(hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_rejected() {
        for value in ["", "  ", "#", "null", "NULL", "undefined", "N/A", "n/a"] {
            assert!(!is_plausible_download_link(value), "{value:?}");
            assert!(!is_plausible_image_url(value), "{value:?}");
        }
    }

    #[test]
    fn download_links_need_a_scheme() {
        assert!(is_plausible_download_link("https://example.com/app.ipa"));
        assert!(is_plausible_download_link(" http://example.com "));
        assert!(is_plausible_download_link("//cdn.example.com/app.ipa"));
        assert!(!is_plausible_download_link("example.com/app.ipa"));
        assert!(!is_plausible_download_link("itms-services://?action=download"));
    }

    #[test]
    fn images_accept_known_hints() {
        assert!(is_plausible_image_url("https://example.com/icon"));
        assert!(is_plausible_image_url("i.imgur.com/abc"));
        assert!(is_plausible_image_url("static/icon.webp"));
        assert!(!is_plausible_image_url("icon"));
    }
}
