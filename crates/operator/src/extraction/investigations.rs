//! Segmentation of an investigation summary into echocardiography,
//! laboratory and other buckets.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Echo,
    Lab,
    Other,
}

const ECHO_HEADINGS: &[&str] = &[
    "echo",
    "echocardiography",
    "echocardiogram",
    "tte",
    "tee",
    "toe",
    "transthoracic echo",
    "transoesophageal echo",
    "stress echo",
];
const LAB_HEADINGS: &[&str] = &[
    "bloods",
    "blood tests",
    "labs",
    "laboratory",
    "pathology",
    "biochemistry",
    "haematology",
    "lipids",
];
const OTHER_HEADINGS: &[&str] = &[
    "other",
    "other investigations",
    "imaging",
    "ecg",
    "holter",
    "ct",
    "ctca",
    "mri",
    "cmr",
    "angiogram",
    "coronary angiogram",
    "stress test",
    "exercise stress test",
    "cxr",
    "chest x-ray",
];

const ECHO_TERMS: &[&str] = &[
    "ef", "lvef", "lv", "rv", "lvedd", "lvesd", "ivs", "tapse", "rvsp", "pasp", "ava", "avmg",
    "avpg", "mvpg", "lvot", "gls", "mitral", "aortic", "tricuspid", "pulmonary", "valve",
    "regurgitation", "stenosis", "gradient", "ejection", "diastolic", "systolic", "hypokinesis",
    "akinesis", "pericardial", "septal", "annulus",
];
const LAB_TERMS: &[&str] = &[
    "creatinine", "egfr", "urea", "hb", "haemoglobin", "hemoglobin", "wcc", "plt", "platelets",
    "sodium", "potassium", "ldl", "hdl", "cholesterol", "tg", "triglycerides", "hba1c", "glucose",
    "bsl", "troponin", "trop", "bnp", "nt-probnp", "probnp", "tsh", "t4", "ferritin", "tsat",
    "inr", "aptt", "ggt", "alp", "bilirubin", "albumin", "crp", "esr", "magnesium", "calcium",
    "phosphate", "lft", "lfts", "fbc", "uec", "eucs", "b12", "folate", "urate", "ck", "lipase",
];

// Abbreviations that are also ordinary words or units. They only count when
// written as an abbreviation: all capitals, or capitalised and followed by a
// value ("Na 139", "K 4.1").
const ECHO_ABBREVIATIONS: &[&str] = &["la", "ra", "mr", "ar", "tr", "as", "ms"];
const LAB_ABBREVIATIONS: &[&str] = &["cr", "na", "k", "tc", "mg", "ca", "alt", "ast", "iron"];

/// Investigation text split by domain. Each bucket keeps its lines in input
/// order, joined with newlines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationSummary {
    pub echocardiography: String,
    pub laboratory: String,
    pub other_investigations: String,
}

/// Segments free investigation text.
///
/// A line that is only a recognised heading opens a section that the
/// following lines inherit, up to the next heading or blank line. A
/// `Heading: content` line files its content under that heading without
/// opening a section. Remaining lines are classified by keyword, and lines
/// matching no keyword land in "other".
pub fn segment_investigations(text: &str) -> InvestigationSummary {
    let mut echo = Vec::new();
    let mut lab = Vec::new();
    let mut other = Vec::new();
    let mut section: Option<Bucket> = None;

    for raw in text.lines() {
        let line = raw.trim().trim_start_matches(['-', '*', '•']).trim();
        if line.is_empty() {
            section = None;
            continue;
        }

        if let Some(bucket) = heading_bucket(line.trim_end_matches(':')) {
            section = Some(bucket);
            continue;
        }

        let inline = line
            .split_once(':')
            .and_then(|(head, rest)| heading_bucket(head).map(|bucket| (bucket, rest.trim())));
        let (bucket, content) = match inline {
            Some((_, "")) => continue,
            Some(found) => found,
            None => (section.unwrap_or_else(|| classify(line)), line),
        };

        match bucket {
            Bucket::Echo => echo.push(content),
            Bucket::Lab => lab.push(content),
            Bucket::Other => other.push(content),
        }
    }

    InvestigationSummary {
        echocardiography: echo.join("\n"),
        laboratory: lab.join("\n"),
        other_investigations: other.join("\n"),
    }
}

fn heading_bucket(candidate: &str) -> Option<Bucket> {
    let key = candidate.trim().to_lowercase();
    if ECHO_HEADINGS.contains(&key.as_str()) {
        Some(Bucket::Echo)
    } else if LAB_HEADINGS.contains(&key.as_str()) {
        Some(Bucket::Lab)
    } else if OTHER_HEADINGS.contains(&key.as_str()) {
        Some(Bucket::Other)
    } else {
        None
    }
}

fn classify(line: &str) -> Bucket {
    let tokens: Vec<&str> = line
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '.'))
        .map(|t| t.trim_matches(['-', '.']))
        .filter(|t| !t.is_empty())
        .collect();

    let mut echo_hits = usize::from(line.to_lowercase().contains("ejection fraction"));
    let mut lab_hits = 0;
    for (i, token) in tokens.iter().enumerate() {
        let lower = token.to_lowercase();
        let key = lower.as_str();
        let abbreviation = || written_as_abbreviation(token, tokens.get(i + 1).copied());
        if ECHO_TERMS.contains(&key) || (ECHO_ABBREVIATIONS.contains(&key) && abbreviation()) {
            echo_hits += 1;
        } else if LAB_TERMS.contains(&key) || (LAB_ABBREVIATIONS.contains(&key) && abbreviation()) {
            lab_hits += 1;
        }
    }

    match (echo_hits, lab_hits) {
        (0, 0) => Bucket::Other,
        (e, l) if e >= l => Bucket::Echo,
        _ => Bucket::Lab,
    }
}

fn written_as_abbreviation(token: &str, next: Option<&str>) -> bool {
    let mut letters = token.chars().filter(|c| c.is_alphabetic());
    let Some(first) = letters.next() else {
        return false;
    };
    if !first.is_uppercase() {
        return false;
    }
    let all_caps = letters.all(|c| c.is_uppercase());
    let valued = next.is_some_and(|n| n.starts_with(|c: char| c.is_ascii_digit()));
    (all_caps && token.chars().count() > 1) || valued
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_heading_then_keyword_line() {
        let summary = segment_investigations("Echo: EF 55%\nCreatinine 90");
        assert_eq!(summary.echocardiography, "EF 55%");
        assert_eq!(summary.laboratory, "Creatinine 90");
        assert_eq!(summary.other_investigations, "");
    }

    #[test]
    fn test_standalone_heading_owns_following_lines() {
        let text = "Bloods:\nHb 132\nSomething unusual\n\nEcho\nmild MR\nnormal biventricular function";
        let summary = segment_investigations(text);
        assert_eq!(summary.laboratory, "Hb 132\nSomething unusual");
        assert_eq!(summary.echocardiography, "mild MR\nnormal biventricular function");
        assert_eq!(summary.other_investigations, "");
    }

    #[test]
    fn test_unrecognised_lines_fall_through_to_other() {
        let summary = segment_investigations("CTCA: minor plaque\nSleep study pending\n- LVEF 40%");
        assert_eq!(summary.other_investigations, "minor plaque\nSleep study pending");
        assert_eq!(summary.echocardiography, "LVEF 40%");
        assert_eq!(summary.laboratory, "");
    }

    #[test]
    fn test_ordinary_words_do_not_count_as_abbreviations() {
        let summary = segment_investigations(
            "Sleep study booked as outpatient\nHolter ordered na\nTake 5 mg nightly\nMs Smith attended",
        );
        assert_eq!(summary.echocardiography, "");
        assert_eq!(summary.laboratory, "");
        assert_eq!(
            summary.other_investigations,
            "Sleep study booked as outpatient\nHolter ordered na\nTake 5 mg nightly\nMs Smith attended"
        );
    }

    #[test]
    fn test_abbreviations_in_clinical_form() {
        let summary = segment_investigations("moderate AS, mild MR\nNa 139 K 4.1\nCr 88");
        assert_eq!(summary.echocardiography, "moderate AS, mild MR");
        assert_eq!(summary.laboratory, "Na 139 K 4.1\nCr 88");
        assert_eq!(summary.other_investigations, "");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(segment_investigations(""), InvestigationSummary::default());
    }
}
