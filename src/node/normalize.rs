use crate::node::{is_valid_steamid64, parse_locator, NodeId, NodeRef};
use crate::{IdError, IdResult};

/// Longest vanity name the community accepts
const MAX_ALIAS_LEN: usize = 32;

/// Normalizes a raw seed identifier into a node reference
///
/// # Normalization Rules
///
/// 1. Trim surrounding whitespace; reject empty input
/// 2. Profile locators (`…steamcommunity.com/profiles/…` or `/id/…`) are
///    parsed by [`parse_locator`]
/// 3. `STEAM_X:Y:Z` (SteamID2) becomes `base + Z*2 + Y`
/// 4. `[U:1:N]` (SteamID3) becomes `base + N`
/// 5. 17-digit numbers must be valid SteamID64 values
/// 6. Numbers of up to 10 digits are 32-bit account ids
/// 7. Anything else that looks like a vanity name becomes a lowercase alias
///
/// # Examples
///
/// ```
/// use steam_ripple::node::{normalize_node_ref, NodeId, NodeRef};
///
/// let id = NodeRef::Id(NodeId::new(76561197960287930));
/// assert_eq!(normalize_node_ref("76561197960287930").unwrap(), id);
/// assert_eq!(normalize_node_ref("STEAM_0:0:11101").unwrap(), id);
/// assert_eq!(normalize_node_ref("[U:1:22202]").unwrap(), id);
/// assert_eq!(normalize_node_ref("22202").unwrap(), id);
/// ```
pub fn normalize_node_ref(input: &str) -> IdResult<NodeRef> {
    let input = input.trim();
    if input.is_empty() {
        return Err(IdError::Empty);
    }

    if input.contains('/') || input.to_lowercase().contains("steamcommunity.com") {
        return parse_locator(input);
    }

    if let Some(rest) = input.strip_prefix("STEAM_") {
        return parse_steamid2(rest).ok_or_else(|| IdError::Unrecognized(input.to_string()));
    }

    if input.starts_with("[U:") {
        return parse_steamid3(input).ok_or_else(|| IdError::Unrecognized(input.to_string()));
    }

    if input.chars().all(|c| c.is_ascii_digit()) {
        return parse_numeric(input);
    }

    if is_valid_alias(input) {
        return Ok(NodeRef::Alias(input.to_lowercase()));
    }

    Err(IdError::Unrecognized(input.to_string()))
}

/// Parses the `X:Y:Z` tail of a SteamID2
fn parse_steamid2(rest: &str) -> Option<NodeRef> {
    let mut parts = rest.split(':');
    let _universe: u8 = parts.next()?.parse().ok()?;
    let low_bit: u32 = parts.next()?.parse().ok()?;
    let high: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || low_bit > 1 {
        return None;
    }
    let account_id = high.checked_mul(2)?.checked_add(low_bit)?;
    Some(NodeRef::Id(NodeId::from_account_id(account_id)))
}

/// Parses an individual-account SteamID3 (`[U:1:N]`)
fn parse_steamid3(input: &str) -> Option<NodeRef> {
    let inner = input.strip_prefix("[U:")?.strip_suffix(']')?;
    let (_universe, account) = inner.split_once(':')?;
    let account_id: u32 = account.parse().ok()?;
    Some(NodeRef::Id(NodeId::from_account_id(account_id)))
}

fn parse_numeric(input: &str) -> IdResult<NodeRef> {
    if input.len() == 17 {
        let raw: u64 = input
            .parse()
            .map_err(|_| IdError::InvalidSteamId(input.to_string()))?;
        if is_valid_steamid64(raw) {
            return Ok(NodeRef::Id(NodeId::new(raw)));
        }
        return Err(IdError::InvalidSteamId(input.to_string()));
    }

    if input.len() <= 10 {
        if let Ok(account_id) = input.parse::<u32>() {
            return Ok(NodeRef::Id(NodeId::from_account_id(account_id)));
        }
    }

    Err(IdError::InvalidSteamId(input.to_string()))
}

fn is_valid_alias(input: &str) -> bool {
    (2..=MAX_ALIAS_LEN).contains(&input.len())
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
