//! Phone number handling for the WhatsApp gateway, which addresses chats by
//! international digits without `+` (`97336001122@c.us`).

pub const DEFAULT_COUNTRY_CODE: &str = "973";

const CHAT_ID_SUFFIX: &str = "@c.us";

/// Normalises to international digits: non-digits stripped, a local leading
/// `0` replaced by the country code, a missing country code prepended.
pub fn normalize(phone: &str, country_code: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();

    let digits = match digits.strip_prefix('0') {
        Some(local) => format!("{country_code}{local}"),
        None => digits,
    };

    if digits.starts_with(country_code) {
        digits
    } else {
        format!("{country_code}{digits}")
    }
}

pub fn chat_id(phone: &str, country_code: &str) -> String {
    format!("{}{CHAT_ID_SUFFIX}", normalize(phone, country_code))
}

pub fn from_chat_id(chat_id: &str) -> &str {
    chat_id.strip_suffix(CHAT_ID_SUFFIX).unwrap_or(chat_id)
}

pub fn same_number(a: &str, b: &str, country_code: &str) -> bool {
    normalize(a, country_code) == normalize(b, country_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting_characters() {
        assert_eq!(normalize("+973 3600-1122", "973"), "97336001122");
    }

    #[test]
    fn local_leading_zero_becomes_country_code() {
        assert_eq!(normalize("036001122", "973"), "97336001122");
    }

    #[test]
    fn missing_country_code_is_prepended() {
        assert_eq!(normalize("36001122", "973"), "97336001122");
    }

    #[test]
    fn chat_id_round_trips_through_extraction() {
        let id = chat_id("+97300000001", "973");
        assert_eq!(id, "97300000001@c.us");
        assert_eq!(from_chat_id(&id), "97300000001");
        assert_eq!(from_chat_id("group-id@g.us"), "group-id@g.us");
    }

    #[test]
    fn same_number_ignores_formatting() {
        assert!(same_number("+97300000001", "97300000001", "973"));
        assert!(!same_number("+97300000001", "97300000002", "973"));
    }
}
