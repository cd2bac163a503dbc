use crate::error::{ProberError, Result};
use crate::model::metric::TagMap;

pub fn parse_tags(raw: &str) -> Result<TagMap> {
    let mut out = TagMap::new();
    for entry in raw.split(',') {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(ProberError::TagParse(format!(
                "tag entries must use key=value syntax: {trimmed}"
            )));
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            return Err(ProberError::TagParse(format!(
                "tag key and value cannot be empty: {trimmed}"
            )));
        }
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}

pub fn format_tags(tags: &TagMap) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tags_accepts_list() {
        let tags = parse_tags("env=prod, region = eu").unwrap();
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(tags.get("region").map(String::as_str), Some("eu"));
    }

    #[test]
    fn parse_tags_blank_is_empty() {
        assert!(parse_tags("").unwrap().is_empty());
        assert!(parse_tags(" , ").unwrap().is_empty());
    }

    #[test]
    fn parse_tags_rejects_bad_entries() {
        assert!(matches!(
            parse_tags("env"),
            Err(ProberError::TagParse(_))
        ));
        assert!(parse_tags("=prod").is_err());
        assert!(parse_tags("env=").is_err());
    }

    #[test]
    fn format_tags_is_sorted() {
        let tags = parse_tags("b=2,a=1").unwrap();
        assert_eq!(format_tags(&tags), "a=1,b=2");
    }
}
