use crate::node::{NodeId, NodeRef};
use crate::{IdError, IdResult};
use url::Url;

/// Host serving community profile pages
const COMMUNITY_HOST: &str = "steamcommunity.com";

/// Parses a community profile locator into a node reference
///
/// # Accepted Shapes
///
/// - `https://steamcommunity.com/profiles/<steamid64>` → [`NodeRef::Id`]
/// - `https://steamcommunity.com/id/<vanity>` → [`NodeRef::Alias`]
///
/// The scheme may be `http` or omitted, the host may carry a `www.` prefix,
/// and trailing path segments (`/friends/`, `/games`) are ignored.
///
/// # Examples
///
/// ```
/// use steam_ripple::node::{parse_locator, NodeId, NodeRef};
///
/// let parsed = parse_locator("http://www.steamcommunity.com/profiles/76561197960287930/").unwrap();
/// assert_eq!(parsed, NodeRef::Id(NodeId::new(76561197960287930)));
/// ```
pub fn parse_locator(input: &str) -> IdResult<NodeRef> {
    let with_scheme = if input.starts_with("http://") || input.starts_with("https://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };

    let url = Url::parse(&with_scheme).map_err(|e| IdError::Malformed(e.to_string()))?;

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or_else(|| IdError::Malformed(input.to_string()))?;
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host != COMMUNITY_HOST {
        return Err(IdError::Malformed(format!(
            "Not a community profile host: {}",
            host
        )));
    }

    let mut segments = url
        .path_segments()
        .ok_or_else(|| IdError::Malformed(input.to_string()))?
        .filter(|s| !s.is_empty());

    match (segments.next(), segments.next()) {
        (Some("profiles"), Some(raw)) => {
            let id: NodeId = raw.parse()?;
            Ok(NodeRef::Id(id))
        }
        (Some("id"), Some(vanity)) => Ok(NodeRef::Alias(vanity.to_lowercase())),
        _ => Err(IdError::Malformed(format!(
            "Expected /profiles/<id> or /id/<name>: {}",
            input
        ))),
    }
}

/// Builds the canonical profile URL for a node under the given base
pub fn profile_url(base_url: &str, id: NodeId) -> String {
    format!("{}/profiles/{}", base_url.trim_end_matches('/'), id)
}
