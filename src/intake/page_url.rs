use crate::error::AppError;

const ID_PARAM: &str = "id";

/// Extracts the pair id from a page URL such as `https://host/display?id=pair_...`.
///
/// Input without a query, scheme or path is taken as the bare id.
pub fn pair_id_from_url(input: &str) -> Result<String, AppError> {
    let input = input.trim();

    let Some((_, rest)) = input.split_once('?') else {
        if input.is_empty() || input.contains("://") || input.contains('/') {
            return Err(AppError::MissingParameter);
        }
        return Ok(input.to_string());
    };

    let query = rest.split('#').next().unwrap_or_default();
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| percent_decode(key) == ID_PARAM)
        .map(|(_, value)| percent_decode(value))
        .filter(|id| !id.is_empty())
        .ok_or(AppError::MissingParameter)
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = match bytes[i] {
            b'%' if i + 2 < bytes.len() => hex_pair(bytes[i + 1], bytes[i + 2]),
            _ => None,
        };
        match (escaped, bytes[i]) {
            (Some(byte), _) => {
                decoded.push(byte);
                i += 2;
            }
            (None, b'+') => decoded.push(b' '),
            (None, byte) => decoded.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_pair(high: u8, low: u8) -> Option<u8> {
    let high = (high as char).to_digit(16)?;
    let low = (low as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}
