//! Campaign attribution from page URLs
//!
//! Extracts `utm_*` parameters and ad-network click identifiers from the
//! current URL, and the referring domain from the referrer.

use serde_json::Value;
use url::Url;

use crate::types::Properties;

const UTM_PARAMS: &[(&str, &str)] = &[
    ("utm_source", "source"),
    ("utm_medium", "medium"),
    ("utm_campaign", "campaign"),
    ("utm_term", "term"),
    ("utm_content", "content"),
];

const CLICK_ID_PARAMS: &[(&str, &str)] = &[
    ("dclid", "doubleClickId"),
    ("fbclid", "facebookClickId"),
    ("gclid", "googleClickId"),
    ("ko_click_id", "genericClickId"),
    ("li_fat_id", "linkedInClickId"),
    ("msclkid", "microsoftClickId"),
    ("ttclid", "tikTokClickId"),
    ("twclid", "twitterClickId"),
    ("wbraid", "webBrowserReferrerId"),
];

/// `utm` mapping for the URL, or `None` if it carries no utm parameters.
pub fn utm(url: &str) -> Option<Properties> {
    collect_params(url, UTM_PARAMS)
}

/// `advert` mapping of click identifiers, or `None` if there are none.
pub fn advert(url: &str) -> Option<Properties> {
    collect_params(url, CLICK_ID_PARAMS)
}

/// Host of the referrer URL, if it parses and has one.
pub fn referring_domain(referrer: &str) -> Option<String> {
    let parsed = Url::parse(referrer).ok()?;
    parsed.host_str().map(str::to_string)
}

fn collect_params(url: &str, mapping: &[(&str, &str)]) -> Option<Properties> {
    let parsed = Url::parse(url).ok()?;
    let mut found = Properties::new();

    for (key, value) in parsed.query_pairs() {
        if value.is_empty() {
            continue;
        }
        if let Some((_, name)) = mapping.iter().find(|(param, _)| *param == key) {
            found.insert(name.to_string(), Value::String(value.into_owned()));
        }
    }

    if found.is_empty() {
        None
    } else {
        Some(found)
    }
}
