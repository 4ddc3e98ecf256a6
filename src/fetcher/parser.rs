//! HTML extraction for community profile pages
//!
//! This module turns fetched page bodies into typed data:
//! - Profile attributes (level, avatar, ban marker)
//! - Friend ids from a friends page
//! - The canonical id embedded in a vanity profile page

use crate::fetcher::{BanKind, BanStatus, FetchError};
use crate::node::NodeId;
use chrono::{Days, NaiveDate};
use scraper::{Html, Selector};

const NOT_SET_UP_MARKER: &str = "This user has not yet set up their Steam Community profile";
const NOT_FOUND_MARKER: &str = "The specified profile could not be found";
const PRIVATE_MARKER: &str = "This profile is private";

/// Attributes read from a profile page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedProfile {
    pub level: u32,
    pub avatar_url: Option<String>,
    pub ban: Option<BanStatus>,
}

/// Parses a profile page body
///
/// # Arguments
///
/// * `html` - The page body
/// * `today` - Reference day for turning "N day(s) since last ban" into a date
///
/// # Returns
///
/// * `Ok(ParsedProfile)` - The page is a public profile
/// * `Err(FetchError::NotFound)` - The profile does not exist or was never set up
/// * `Err(FetchError::PrivateOrInaccessible)` - The profile is private
/// * `Err(FetchError::Malformed)` - The body is not a profile page
pub fn parse_profile_page(html: &str, today: NaiveDate) -> Result<ParsedProfile, FetchError> {
    if html.contains(NOT_SET_UP_MARKER) || html.contains(NOT_FOUND_MARKER) {
        return Err(FetchError::NotFound);
    }
    if html.contains(PRIVATE_MARKER) {
        return Err(FetchError::PrivateOrInaccessible);
    }

    let document = Html::parse_document(html);

    if first_match(&document, "div.profile_page").is_none() {
        return Err(FetchError::Malformed(
            "Profile page container missing".to_string(),
        ));
    }

    Ok(ParsedProfile {
        level: extract_level(&document),
        avatar_url: extract_avatar(&document),
        ban: extract_ban(&document, html, today),
    })
}

/// Extracts friend ids from a friends page body
///
/// Ids are returned in page order with duplicates and `owner` removed,
/// truncated to `limit`.
pub fn extract_friend_ids(html: &str, owner: NodeId, limit: usize) -> Vec<NodeId> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"a[href*="/profiles/"]"#) else {
        return Vec::new();
    };

    let mut friends = Vec::new();
    for element in document.select(&selector) {
        if friends.len() >= limit {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if let Some(id) = id_after(href, "/profiles/") {
            if id != owner && !friends.contains(&id) {
                friends.push(id);
            }
        }
    }

    friends
}

/// Finds the canonical id embedded in a profile page body
///
/// Looks for the `"steamid":"<id>"` page variable first, then for any
/// `/profiles/<id>` link.
pub fn find_profile_id(html: &str) -> Option<NodeId> {
    id_after(html, r#""steamid":""#).or_else(|| id_after(html, "/profiles/"))
}

/// Returns the first valid 17-digit id that directly follows `marker`
fn id_after(haystack: &str, marker: &str) -> Option<NodeId> {
    haystack.match_indices(marker).find_map(|(idx, _)| {
        let rest = &haystack[idx + marker.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() != 17 {
            return None;
        }
        digits
            .parse::<u64>()
            .ok()
            .and_then(|raw| NodeId::from_steamid64(raw).ok())
    })
}

fn first_match<'a>(document: &'a Html, selector: &str) -> Option<scraper::ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

fn extract_level(document: &Html) -> u32 {
    first_match(document, ".friendPlayerLevelNum")
        .map(|el| el.text().collect::<String>())
        .and_then(|text| text.trim().replace(',', "").parse().ok())
        .unwrap_or(0)
}

fn extract_avatar(document: &Html) -> Option<String> {
    // The inner container may also hold an avatar frame image; the avatar
    // itself is the direct child.
    first_match(document, ".playerAvatarAutoSizeInner > img")
        .or_else(|| first_match(document, ".playerAvatarAutoSizeInner img"))
        .and_then(|img| img.value().attr("src"))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
}

/// Markers inside the `.profile_ban_status` block
const BAN_BLOCK_MARKERS: [(&str, BanKind); 4] = [
    ("vac ban", BanKind::Vac),
    ("game ban", BanKind::Game),
    ("community ban", BanKind::Community),
    ("trade ban", BanKind::Trade),
];

/// Stricter markers for pages without a ban block, where free text such as
/// a profile summary could mention bans in passing
const BODY_MARKERS: [(&str, BanKind); 4] = [
    ("vac banned", BanKind::Vac),
    ("game banned", BanKind::Game),
    ("community banned", BanKind::Community),
    ("trade banned", BanKind::Trade),
];

fn extract_ban(document: &Html, html: &str, today: NaiveDate) -> Option<BanStatus> {
    let (text, markers) = match first_match(document, ".profile_ban_status") {
        Some(el) => (el.text().collect::<String>().to_lowercase(), &BAN_BLOCK_MARKERS),
        None => (html.to_lowercase(), &BODY_MARKERS),
    };

    let kind = markers
        .iter()
        .find(|(marker, _)| text.contains(marker))
        .map(|(_, kind)| *kind)?;

    let date = days_since_last_ban(&text).and_then(|days| today.checked_sub_days(Days::new(days)));

    Some(BanStatus { kind, date })
}

/// Reads N from "N day(s) since last ban"
fn days_since_last_ban(text: &str) -> Option<u64> {
    let idx = text.find("day(s) since last ban")?;
    let before = text[..idx].trim_end();
    let start = before
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    before[start..].parse().ok()
}
