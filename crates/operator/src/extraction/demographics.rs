//! Format-specific scanners for patient demographics in free page text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bID\s*:\s*(\d+)").unwrap());
static LABELLED_DOB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:DOB|D\.O\.B\.?|Date of Birth|Born)\s*:?\s*(\d{1,2}/\d{1,2}/\d{4})").unwrap()
});
pub(crate) static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{4})\b").unwrap());
static AGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bage\s*:?\s*(\d{1,3})\b|\b(\d{1,3})\s*(?:yo|y/o|yrs?|years?(?:\s+old)?)\b)")
        .unwrap()
});
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\d])((?:\+61\s?|\(?0)[2-478]\)?(?:[\s-]?\d){8})(?:[^\d]|$)").unwrap()
});
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:[Aa]ddress\s*:?\s*)?(\d+[A-Za-z]?(?:/\d+)?\s+[^\n]*?\b(?:NSW|VIC|QLD|SA|WA|TAS|NT|ACT)\s+\d{4})\b",
    )
    .unwrap()
});
static MEDICARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)medicare[^\d\n]{0,20}(\d[\d ]{8,13}\d)(?:\s*/\s*(\d))?").unwrap());
static INSURANCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\b(?:private\s+)?(?:health\s+)?(?:insurance|fund|insurer)\s*:\s*([^\n]+)$").unwrap()
});

/// Demographics found in a block of text. Each scanner runs independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medicare: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
}

impl Demographics {
    pub fn scan(text: &str) -> Self {
        Self {
            id: first_group(&ID_RE, text),
            dob: first_group(&LABELLED_DOB_RE, text).or_else(|| first_group(&DATE_RE, text)),
            age: AGE_RE.captures(text).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .map(|m| m.as_str().to_string())
            }),
            phone: first_group(&PHONE_RE, text).map(|p| collapse_spaces(&p)),
            email: EMAIL_RE.find(text).map(|m| m.as_str().to_string()),
            address: first_group(&ADDRESS_RE, text).map(|a| collapse_spaces(&a)),
            medicare: MEDICARE_RE.captures(text).and_then(|c| {
                let number: String = c.get(1)?.as_str().split_whitespace().collect();
                Some(match c.get(2) {
                    Some(irn) => format!("{number}/{}", irn.as_str()),
                    None => number,
                })
            }),
            insurance: first_group(&INSURANCE_RE, text).map(|s| s.trim().to_string()),
        }
    }

    /// Fills fields this record lacks from `other`.
    pub fn or(self, other: Demographics) -> Self {
        Self {
            id: self.id.or(other.id),
            dob: self.dob.or(other.dob),
            age: self.age.or(other.age),
            phone: self.phone.or(other.phone),
            email: self.email.or(other.email),
            address: self.address.or(other.address),
            medicare: self.medicare.or(other.medicare),
            insurance: self.insurance.or(other.insurance),
        }
    }
}

fn first_group(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scans_a_patient_banner() {
        let text = "Mr Adrian Test\nID: 17755\nDOB: 03/04/1956 (68 yrs)\nMobile: 0412 345 678\n\
                    adrian@example.com\n12 Smith St, Richmond VIC 3121\n\
                    Medicare: 2123 45670 1 / 2\nHealth Fund: HCF";
        let found = Demographics::scan(text);
        assert_eq!(found.id.as_deref(), Some("17755"));
        assert_eq!(found.dob.as_deref(), Some("03/04/1956"));
        assert_eq!(found.age.as_deref(), Some("68"));
        assert_eq!(found.phone.as_deref(), Some("0412 345 678"));
        assert_eq!(found.email.as_deref(), Some("adrian@example.com"));
        assert_eq!(found.address.as_deref(), Some("12 Smith St, Richmond VIC 3121"));
        assert_eq!(found.medicare.as_deref(), Some("2123456701/2"));
        assert_eq!(found.insurance.as_deref(), Some("HCF"));
    }

    #[test]
    fn test_landline_with_area_code() {
        let found = Demographics::scan("Home (03) 9123 4567");
        assert_eq!(found.phone.as_deref(), Some("(03) 9123 4567"));
    }

    #[test]
    fn test_unlabelled_date_is_used_as_dob() {
        let found = Demographics::scan("Born on 07/08/1985 somewhere");
        assert_eq!(found.dob.as_deref(), Some("07/08/1985"));
    }

    #[test]
    fn test_nothing_found_in_plain_text() {
        assert_eq!(Demographics::scan("No details here"), Demographics::default());
    }
}
