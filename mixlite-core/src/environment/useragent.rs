//! User-agent classification
//!
//! Maps a user-agent string (plus the navigator vendor) to the `$os`,
//! `$browser`, `$browser_version` and `$device` properties. Check order
//! matters: many agents embed the tokens of the ones checked later.

use regex::Regex;
use std::sync::LazyLock;

static BLACKBERRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(BlackBerry|PlayBook|BB10)").expect("valid regex"));

static BOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(bot|crawler|spider|crawling|slurp|facebookexternalhit|bingpreview)")
        .expect("valid regex")
});

/// Version patterns per browser; the `v` group holds `major[.minor]`.
static VERSION_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Internet Explorer Mobile", r"rv:(?P<v>\d+(\.\d+)?)"),
        ("Microsoft Edge", r"Edge?/(?P<v>\d+(\.\d+)?)"),
        ("Chrome", r"Chrome/(?P<v>\d+(\.\d+)?)"),
        ("Chrome iOS", r"CriOS/(?P<v>\d+(\.\d+)?)"),
        ("UC Browser", r"(UCBrowser|UCWEB)/(?P<v>\d+(\.\d+)?)"),
        ("Safari", r"Version/(?P<v>\d+(\.\d+)?)"),
        ("Mobile Safari", r"Version/(?P<v>\d+(\.\d+)?)"),
        ("Opera Mini", r"Opera Mini/(?P<v>\d+(\.\d+)?)"),
        ("Opera", r"(Opera|OPR)/(?P<v>\d+(\.\d+)?)"),
        ("Firefox", r"Firefox/(?P<v>\d+(\.\d+)?)"),
        ("Firefox iOS", r"FxiOS/(?P<v>\d+(\.\d+)?)"),
        ("Konqueror", r"Konqueror:(?P<v>\d+(\.\d+)?)"),
        ("BlackBerry", r"BlackBerry (?P<v>\d+(\.\d+)?)"),
        ("Android Mobile", r"android\s(?P<v>\d+(\.\d+)?)"),
        ("Internet Explorer", r"(rv:|MSIE )(?P<v>\d+(\.\d+)?)"),
        ("Mozilla", r"rv:(?P<v>\d+(\.\d+)?)"),
    ]
    .into_iter()
    .map(|(browser, pattern)| (browser, Regex::new(pattern).expect("valid regex")))
    .collect()
});

/// Operating system name, if recognized.
pub fn os(ua: &str) -> Option<&'static str> {
    if contains_ignore_case(ua, "Windows") {
        if ua.contains("Phone") || ua.contains("WPDesktop") {
            return Some("Windows Phone");
        }
        return Some("Windows");
    }
    if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        Some("iOS")
    } else if ua.contains("Android") {
        Some("Android")
    } else if BLACKBERRY.is_match(ua) {
        Some("BlackBerry")
    } else if contains_ignore_case(ua, "Mac") {
        Some("Mac OS X")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else if ua.contains("CrOS") {
        Some("Chrome OS")
    } else {
        None
    }
}

/// Device family, if the agent is a known mobile device.
pub fn device(ua: &str) -> Option<&'static str> {
    if contains_ignore_case(ua, "Windows Phone") || ua.contains("WPDesktop") {
        Some("Windows Phone")
    } else if ua.contains("iPad") {
        Some("iPad")
    } else if ua.contains("iPod") {
        Some("iPod Touch")
    } else if ua.contains("iPhone") {
        Some("iPhone")
    } else if BLACKBERRY.is_match(ua) {
        Some("BlackBerry")
    } else if ua.contains("Android") {
        Some("Android")
    } else {
        None
    }
}

/// Browser name, if recognized. `vendor` is the navigator vendor string.
pub fn browser(ua: &str, vendor: &str) -> Option<&'static str> {
    if ua.contains(" OPR/") || ua.starts_with("Opera") {
        if ua.contains("Mini") {
            return Some("Opera Mini");
        }
        return Some("Opera");
    }

    let name = if BLACKBERRY.is_match(ua) {
        "BlackBerry"
    } else if ua.contains("IEMobile") || ua.contains("WPDesktop") {
        "Internet Explorer Mobile"
    } else if ua.contains("Edge") || ua.contains("Edg/") {
        "Microsoft Edge"
    } else if ua.contains("FBIOS") {
        "Facebook Mobile"
    } else if ua.contains("Chrome") {
        "Chrome"
    } else if ua.contains("CriOS") {
        "Chrome iOS"
    } else if ua.contains("UCWEB") || ua.contains("UCBrowser") {
        "UC Browser"
    } else if ua.contains("FxiOS") {
        "Firefox iOS"
    } else if vendor.contains("Apple") {
        if ua.contains("Mobile") {
            "Mobile Safari"
        } else {
            "Safari"
        }
    } else if ua.contains("Android") {
        "Android Mobile"
    } else if ua.contains("Konqueror") {
        "Konqueror"
    } else if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("MSIE") || ua.contains("Trident/") {
        "Internet Explorer"
    } else if ua.contains("Gecko") {
        "Mozilla"
    } else {
        return None;
    };
    Some(name)
}

/// `major.minor` version of `browser` as advertised in `ua`.
pub fn browser_version(ua: &str, browser: &str) -> Option<f64> {
    let (_, pattern) = VERSION_PATTERNS.iter().find(|(b, _)| *b == browser)?;
    let captures = pattern.captures(ua)?;
    captures.name("v")?.as_str().parse().ok()
}

/// Headless or webdriver-controlled agents.
pub fn is_automated(ua: &str) -> bool {
    ["HeadlessChrome", "PhantomJS", "Electron", "Puppeteer", "Playwright"]
        .iter()
        .any(|marker| ua.contains(marker))
}

/// Crawlers and preview fetchers.
pub fn is_bot(ua: &str) -> bool {
    BOT.is_match(ua)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const HEADLESS: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.0.0 Safari/537.36";

    #[test]
    fn test_chrome_on_mac() {
        assert_eq!(os(CHROME_MAC), Some("Mac OS X"));
        assert_eq!(browser(CHROME_MAC, "Google Inc."), Some("Chrome"));
        assert_eq!(browser_version(CHROME_MAC, "Chrome"), Some(122.0));
        assert_eq!(device(CHROME_MAC), None);
        assert!(!is_automated(CHROME_MAC));
    }

    #[test]
    fn test_safari_on_iphone() {
        let vendor = "Apple Computer, Inc.";
        assert_eq!(os(SAFARI_IPHONE), Some("iOS"));
        assert_eq!(device(SAFARI_IPHONE), Some("iPhone"));
        assert_eq!(browser(SAFARI_IPHONE, vendor), Some("Mobile Safari"));
        assert_eq!(browser_version(SAFARI_IPHONE, "Mobile Safari"), Some(17.2));
    }

    #[test]
    fn test_firefox_on_linux() {
        assert_eq!(os(FIREFOX_LINUX), Some("Linux"));
        assert_eq!(browser(FIREFOX_LINUX, ""), Some("Firefox"));
        assert_eq!(browser_version(FIREFOX_LINUX, "Firefox"), Some(121.0));
    }

    #[test]
    fn test_headless_and_bots() {
        assert!(is_automated(HEADLESS));
        assert_eq!(browser(HEADLESS, "Google Inc."), Some("Chrome"));
        assert!(is_bot(
            "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"
        ));
        assert!(!is_bot(CHROME_MAC));
    }

    #[test]
    fn test_unknown_agent() {
        assert_eq!(os("curl/8.4.0"), None);
        assert_eq!(browser("curl/8.4.0", ""), None);
        assert_eq!(browser_version("curl/8.4.0", "Chrome"), None);
    }
}
