use crate::error::{AppError, Result};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const FULL_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// A calendar month of a given year; `month` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchPeriod {
    pub month: u32,
    pub year: i32,
}

impl SearchPeriod {
    pub fn new(month: u32, year: i32) -> Result<SearchPeriod> {
        if !(1..=12).contains(&month) {
            return Err(AppError::Config(format!("month out of range: {}", month)));
        }
        Ok(SearchPeriod { month, year })
    }

    /// Accepts `Jan`, `january`, `JAN` or `1`.
    pub fn parse(month: &str, year: &str) -> Result<SearchPeriod> {
        let month = month.trim();
        let month_number = match month.parse::<u32>() {
            Ok(number) => number,
            Err(_) => {
                MONTHS
                    .iter()
                    .zip(FULL_MONTHS.iter())
                    .position(|(abbrev, full)| {
                        month.eq_ignore_ascii_case(abbrev) || month.eq_ignore_ascii_case(full)
                    })
                    .map(|index| index as u32 + 1)
                    .ok_or_else(|| AppError::Config(format!("unknown month: {}", month)))?
            }
        };
        let year = year
            .trim()
            .parse::<i32>()
            .map_err(|_| AppError::Config(format!("invalid year: {}", year)))?;
        SearchPeriod::new(month_number, year)
    }

    pub fn month_abbrev(&self) -> &'static str {
        MONTHS[(self.month - 1) as usize]
    }

    /// `2024-Jan`, used for folder and file names.
    pub fn label(&self) -> String {
        format!("{}-{}", self.year, self.month_abbrev())
    }

    /// IMAP search date of the first day of the month, e.g. `1-Jan-2024`.
    pub fn first_day(&self) -> String {
        format!("1-{}-{}", self.month_abbrev(), self.year)
    }
}

pub fn next_month(period: SearchPeriod) -> SearchPeriod {
    if period.month == 12 {
        SearchPeriod {
            month: 1,
            year: period.year + 1,
        }
    } else {
        SearchPeriod {
            month: period.month + 1,
            year: period.year,
        }
    }
}

/// ORs together one `FROM/BODY/SINCE/BEFORE` clause per keyword.
pub fn build_search_criteria<S: AsRef<str>>(
    sender: &str,
    keywords: &[S],
    period: SearchPeriod,
) -> Result<String> {
    let until = next_month(period);
    let clauses: Vec<String> = keywords
        .iter()
        .map(|keyword| keyword.as_ref().trim())
        .filter(|keyword| !keyword.is_empty())
        .map(|keyword| {
            format!(
                "(FROM {} BODY \"{}\" SINCE \"{}\" BEFORE \"{}\")",
                sender,
                escape(keyword),
                period.first_day(),
                until.first_day()
            )
        })
        .collect();

    let (last, rest) = clauses
        .split_last()
        .ok_or_else(|| AppError::Config("no search keywords configured".to_string()))?;
    let mut criteria = String::new();
    for clause in rest {
        criteria.push_str("OR ");
        criteria.push_str(clause);
        criteria.push(' ');
    }
    criteria.push_str(last);
    Ok(criteria)
}

fn escape(keyword: &str) -> String {
    keyword.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_month__in_december__rolls_year() {
        let next = next_month(SearchPeriod::new(12, 2023).unwrap());
        assert_eq!(next, SearchPeriod { month: 1, year: 2024 });
        let next = next_month(SearchPeriod::new(3, 2024).unwrap());
        assert_eq!(next, SearchPeriod { month: 4, year: 2024 });
    }

    #[test]
    fn parse__accepts_abbreviations_names_and_numbers() {
        assert_eq!(SearchPeriod::parse("Jan", "2024").unwrap().month, 1);
        assert_eq!(SearchPeriod::parse("september", "2024").unwrap().month, 9);
        assert_eq!(SearchPeriod::parse("12", "2024").unwrap().month, 12);
        assert_eq!(SearchPeriod::parse("DECEMBER", "2024").unwrap().month, 12);
        assert!(SearchPeriod::parse("Ja", "2024").is_err());
        assert!(SearchPeriod::parse("Janxyz", "2024").is_err());
        assert!(SearchPeriod::parse("Mayday", "2024").is_err());
        assert!(SearchPeriod::parse("Decimal", "2024").is_err());
        assert!(SearchPeriod::parse("Sept", "2024").is_err());
        assert!(SearchPeriod::parse("Foo", "2024").is_err());
        assert!(SearchPeriod::parse("13", "2024").is_err());
        assert!(SearchPeriod::parse("Jan", "twenty").is_err());
    }

    #[test]
    fn label__uses_month_abbreviation() {
        let period = SearchPeriod::parse("march", "2025").unwrap();
        assert_eq!(period.label(), "2025-Mar");
        assert_eq!(period.first_day(), "1-Mar-2025");
    }

    #[test]
    fn build_search_criteria__with_single_keyword__has_no_or() {
        let period = SearchPeriod::new(1, 2024).unwrap();
        let criteria = build_search_criteria("tickets@rail.example", &["Paris"], period).unwrap();
        assert_eq!(
            criteria,
            "(FROM tickets@rail.example BODY \"Paris\" SINCE \"1-Jan-2024\" BEFORE \"1-Feb-2024\")"
        );
    }

    #[test]
    fn build_search_criteria__with_many_keywords__nests_prefix_or() {
        let period = SearchPeriod::new(12, 2024).unwrap();
        let criteria =
            build_search_criteria("s@x.y", &["A", " ", "B ", "C"], period).unwrap();
        let clause = |kw: &str| {
            format!(
                "(FROM s@x.y BODY \"{}\" SINCE \"1-Dec-2024\" BEFORE \"1-Jan-2025\")",
                kw
            )
        };
        assert_eq!(
            criteria,
            format!("OR {} OR {} {}", clause("A"), clause("B"), clause("C"))
        );
    }

    #[test]
    fn build_search_criteria__escapes_quotes() {
        let period = SearchPeriod::new(5, 2024).unwrap();
        let criteria = build_search_criteria("s@x.y", &["say \"hi\""], period).unwrap();
        assert!(criteria.contains(r#"BODY "say \"hi\"""#));
    }

    #[test]
    fn build_search_criteria__without_keywords__fails() {
        let period = SearchPeriod::new(5, 2024).unwrap();
        let keywords: Vec<String> = vec!["  ".to_string()];
        assert!(build_search_criteria("s@x.y", &keywords, period).is_err());
    }
}
