/// Header form used for matching: invisible marks stripped, whitespace,
/// underscores and hyphens collapsed to single spaces, lowercase.
pub(crate) fn normalize_header(value: &str) -> String {
    let cleaned = value
        .replace(['\u{feff}', '\u{200b}'], "")
        .replace(['_', '-'], " ");
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Position of the first header matching any alias.
pub(crate) fn find_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    let wanted: Vec<String> = aliases.iter().map(|alias| normalize_header(alias)).collect();
    headers
        .iter()
        .position(|header| wanted.contains(&normalize_header(header)))
}

/// Roster flags are set only by an explicit "Yes".
pub(crate) fn is_yes(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_match_across_spelling_variants() {
        assert_eq!(normalize_header("\u{feff}MTech  Application_No "), "mtech application no");
        assert_eq!(normalize_header("COAP-Reg-Id"), "coap reg id");
    }

    #[test]
    fn finds_the_first_matching_alias() {
        let headers = csv::StringRecord::from(vec!["Si NO", "Mtech App No", "Applicant Decision"]);
        assert_eq!(find_column(&headers, &["MTech Application No", "Mtech App No"]), Some(1));
        assert_eq!(find_column(&headers, &["COAP Reg Id"]), None);
    }

    #[test]
    fn only_yes_sets_a_flag() {
        assert!(is_yes(" YES "));
        assert!(!is_yes("Y"));
        assert!(!is_yes(""));
        assert!(!is_yes("No"));
    }
}
