//! Host environment description
//!
//! An [`Environment`] tells the client whether the host is online, whether
//! the user asked not to be tracked, and which properties describe the host.
//! Two implementations ship:
//!
//! - [`BrowserContext`]: a web page (user agent, URL, referrer, screen)
//! - [`NativeContext`]: the running process (OS, library version)

pub mod campaign;
pub mod useragent;

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::Properties;

/// Automation markers added to events only when set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvironmentFlags {
    /// Driven by a webdriver, headless browser or CI job
    pub automated: bool,
    /// Crawler or link-preview fetcher
    pub bot: bool,
    /// Local development host
    pub development: bool,
}

/// Where the client runs.
pub trait Environment: Send + Sync {
    /// Current connectivity.
    fn is_online(&self) -> bool;

    /// The user opted out of tracking.
    fn do_not_track(&self) -> bool {
        false
    }

    /// Properties merged into the session baseline on init.
    fn properties(&self) -> Properties;

    fn flags(&self) -> EnvironmentFlags {
        EnvironmentFlags::default()
    }
}

/// Raw page and navigator values a browser host reports.
#[derive(Debug, Clone, Default)]
pub struct BrowserInfo {
    pub user_agent: String,
    pub vendor: String,
    /// `window.opera` is present
    pub opera: bool,
    pub current_url: String,
    pub referrer: String,
    pub screen_width: u32,
    pub screen_height: u32,
    /// `navigator.webdriver`
    pub webdriver: bool,
    /// `navigator.doNotTrack == "1"`
    pub do_not_track: bool,
}

/// Browser page environment.
#[derive(Debug)]
pub struct BrowserContext {
    info: BrowserInfo,
    online: AtomicBool,
}

impl BrowserContext {
    pub fn new(info: BrowserInfo) -> Self {
        Self {
            info,
            online: AtomicBool::new(true),
        }
    }

    pub fn info(&self) -> &BrowserInfo {
        &self.info
    }

    /// Record a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn browser(&self) -> Option<&'static str> {
        if self.info.opera {
            if self.info.user_agent.contains("Mini") {
                return Some("Opera Mini");
            }
            return Some("Opera");
        }
        useragent::browser(&self.info.user_agent, &self.info.vendor)
    }
}

impl Environment for BrowserContext {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn do_not_track(&self) -> bool {
        self.info.do_not_track
    }

    fn properties(&self) -> Properties {
        let info = &self.info;
        let ua = info.user_agent.as_str();

        let mut props = Properties::new();
        props.insert("$current_url".into(), json!(info.current_url));
        insert_opt(&mut props, "$os", useragent::os(ua));
        if let Some(browser) = self.browser() {
            props.insert("$browser".into(), json!(browser));
            if let Some(version) = useragent::browser_version(ua, browser) {
                props.insert("$browser_version".into(), json!(version));
            }
        }
        insert_opt(&mut props, "$device", useragent::device(ua));
        props.insert("$screen_height".into(), json!(info.screen_height));
        props.insert("$screen_width".into(), json!(info.screen_width));
        props.insert("$referrer".into(), json!(info.referrer));
        insert_opt(
            &mut props,
            "$referring_domain",
            campaign::referring_domain(&info.referrer),
        );

        if let Some(utm) = campaign::utm(&info.current_url) {
            props.insert("utm".into(), Value::Object(utm));
        }
        if let Some(advert) = campaign::advert(&info.current_url) {
            props.insert("advert".into(), Value::Object(advert));
        }
        props
    }

    fn flags(&self) -> EnvironmentFlags {
        let ua = self.info.user_agent.as_str();
        EnvironmentFlags {
            automated: self.info.webdriver || useragent::is_automated(ua),
            bot: useragent::is_bot(ua),
            development: is_development_url(&self.info.current_url),
        }
    }
}

/// Local hosts and file pages count as development.
fn is_development_url(current_url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(current_url) else {
        return false;
    };
    if parsed.scheme() == "file" {
        return true;
    }
    matches!(
        parsed.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("0.0.0.0")
    )
}

/// Environment of the current native process.
#[derive(Debug)]
pub struct NativeContext {
    online: AtomicBool,
    automated: bool,
    development: bool,
}

impl Default for NativeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContext {
    /// Online, automated when running under CI.
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            automated: std::env::var_os("CI").is_some(),
            development: false,
        }
    }

    pub fn with_online(self, online: bool) -> Self {
        self.online.store(online, Ordering::SeqCst);
        self
    }

    pub fn with_development(mut self, development: bool) -> Self {
        self.development = development;
        self
    }

    /// Record a connectivity change.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Environment for NativeContext {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("$os".into(), json!(os_name(std::env::consts::OS)));
        props.insert("$lib".into(), json!("mixlite"));
        props.insert("$lib_version".into(), json!(env!("CARGO_PKG_VERSION")));
        props
    }

    fn flags(&self) -> EnvironmentFlags {
        EnvironmentFlags {
            automated: self.automated,
            bot: false,
            development: self.development,
        }
    }
}

fn os_name(os: &str) -> &str {
    match os {
        "macos" => "Mac OS X",
        "ios" => "iOS",
        "windows" => "Windows",
        "linux" => "Linux",
        "android" => "Android",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

fn insert_opt<S: Into<String>>(props: &mut Properties, key: &str, value: Option<S>) {
    if let Some(value) = value {
        props.insert(key.to_string(), Value::String(value.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> BrowserInfo {
        BrowserInfo {
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1".to_string(),
            vendor: "Apple Computer, Inc.".to_string(),
            current_url: url.to_string(),
            referrer: "https://news.example.org/item?id=1".to_string(),
            screen_width: 390,
            screen_height: 844,
            ..Default::default()
        }
    }

    #[test]
    fn test_browser_properties() {
        let ctx = BrowserContext::new(page(
            "https://shop.example.com/?utm_source=ads&gclid=g-1",
        ));
        let props = ctx.properties();

        assert_eq!(props["$os"], json!("iOS"));
        assert_eq!(props["$browser"], json!("Mobile Safari"));
        assert_eq!(props["$browser_version"], json!(17.2));
        assert_eq!(props["$device"], json!("iPhone"));
        assert_eq!(props["$screen_width"], json!(390));
        assert_eq!(props["$referring_domain"], json!("news.example.org"));
        assert_eq!(props["utm"], json!({"source": "ads"}));
        assert_eq!(props["advert"], json!({"googleClickId": "g-1"}));
        assert_eq!(ctx.flags(), EnvironmentFlags::default());
    }

    #[test]
    fn test_browser_flags_and_connectivity() {
        let mut info = page("http://localhost:3000/");
        info.webdriver = true;
        info.do_not_track = true;
        let ctx = BrowserContext::new(info);

        let flags = ctx.flags();
        assert!(flags.automated);
        assert!(flags.development);
        assert!(!flags.bot);
        assert!(ctx.do_not_track());

        assert!(ctx.is_online());
        ctx.set_online(false);
        assert!(!ctx.is_online());
    }

    #[test]
    fn test_opera_global_wins() {
        let mut info = page("https://example.com/");
        info.opera = true;
        let ctx = BrowserContext::new(info);
        let props = ctx.properties();
        assert_eq!(props["$browser"], json!("Opera"));
        // the Safari token must not leak into Opera's version
        assert!(!props.contains_key("$browser_version"));

        let mut info = page("https://example.com/");
        info.opera = true;
        info.user_agent = "Opera/9.80 (Windows NT 6.1) Presto/2.12.388 Version/12.16".to_string();
        let props = BrowserContext::new(info).properties();
        assert_eq!(props["$browser"], json!("Opera"));
        assert_eq!(props["$browser_version"], json!(9.8));
    }

    #[test]
    fn test_native_context() {
        let ctx = NativeContext::new().with_online(false).with_development(true);
        assert!(!ctx.is_online());
        assert!(ctx.flags().development);

        let props = ctx.properties();
        assert_eq!(props["$lib"], json!("mixlite"));
        assert!(props.contains_key("$os"));

        ctx.set_online(true);
        assert!(ctx.is_online());
    }
}
