//! Parser for member lists pasted from spreadsheets, chat messages or notes.
//!
//! A paste is split into rows and cells, then each row is turned into a
//! [`ParsedMember`]. When the first row is a recognisable header the columns
//! are mapped by name; otherwise every cell is classified by its shape.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use utoipa::ToSchema;

use crate::dates::format_day;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ParsedMember {
    /// 1-based line in the pasted text.
    pub line: usize,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub building_address: Option<String>,
    /// `YYYY-MM-DD`, or `--MM-DD` when the paste carried no year.
    pub birthday: Option<String>,
    pub born_again: Option<bool>,
    pub bacenta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ParseIssue {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    Tab,
    Pipe,
    Semicolon,
    Comma,
    MultiSpace,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub delimiter: Delimiter,
    pub header_detected: bool,
    pub rows: Vec<ParsedMember>,
    pub issues: Vec<ParseIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    FirstName,
    LastName,
    Phone,
    Address,
    Bacenta,
    BornAgain,
    Birthday,
}

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid regex"));
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid regex"));
static DMY_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").expect("valid regex"));
static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]{3,9})\.?$").expect("valid regex")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parse pasted text into member rows.
///
/// `known_bacentas` holds the church's bacenta names; a cell matching one of
/// them (ignoring case) is read as the member's bacenta.
///
/// ```
/// use flock_api::import::parse_members;
///
/// let outcome = parse_members("Ama Mensah\t0244123456\tNorth", &["North".to_string()]);
/// let row = &outcome.rows[0];
/// assert_eq!(row.first_name, "Ama");
/// assert_eq!(row.last_name.as_deref(), Some("Mensah"));
/// assert_eq!(row.phone.as_deref(), Some("0244123456"));
/// assert_eq!(row.bacenta.as_deref(), Some("North"));
/// ```
pub fn parse_members(text: &str, known_bacentas: &[String]) -> ParseOutcome {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let delimiter = detect_delimiter(lines.first().map(|(_, line)| *line).unwrap_or(""));

    let mut outcome = ParseOutcome {
        delimiter,
        header_detected: false,
        rows: Vec::new(),
        issues: Vec::new(),
    };

    let mut rows = lines
        .iter()
        .map(|(line, raw)| (*line, split_cells(raw, delimiter)))
        .peekable();

    let header = rows
        .peek()
        .and_then(|(_, cells)| header_columns(cells));
    if header.is_some() {
        outcome.header_detected = true;
        rows.next();
    }

    for (line, cells) in rows {
        let parsed = match &header {
            Some(columns) => parse_with_header(line, &cells, columns, known_bacentas),
            None => parse_heuristically(line, &cells, known_bacentas, &mut outcome.issues),
        };

        if parsed.first_name.is_empty() {
            outcome.issues.push(ParseIssue {
                line,
                message: "no first name found".to_string(),
            });
            continue;
        }
        outcome.rows.push(parsed);
    }

    outcome
}

fn detect_delimiter(sample: &str) -> Delimiter {
    if sample.contains('\t') {
        Delimiter::Tab
    } else if sample.contains('|') {
        Delimiter::Pipe
    } else if sample.contains(';') {
        Delimiter::Semicolon
    } else if sample.contains(',') {
        Delimiter::Comma
    } else if MULTI_SPACE.is_match(sample.trim()) {
        Delimiter::MultiSpace
    } else {
        Delimiter::None
    }
}

fn split_cells(line: &str, delimiter: Delimiter) -> Vec<String> {
    let cells: Vec<&str> = match delimiter {
        Delimiter::Tab => line.split('\t').collect(),
        Delimiter::Pipe => line.split('|').collect(),
        Delimiter::Semicolon => line.split(';').collect(),
        Delimiter::Comma => line.split(',').collect(),
        Delimiter::MultiSpace => MULTI_SPACE.split(line.trim()).collect(),
        Delimiter::None => vec![line],
    };

    cells
        .into_iter()
        .map(|cell| cell.trim().trim_matches('"').trim().to_string())
        .collect()
}

fn normalize_header(cell: &str) -> String {
    cell.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn header_column(cell: &str) -> Option<Column> {
    let column = match normalize_header(cell).as_str() {
        "first name" | "firstname" | "first" | "name" | "given name" | "forename" => {
            Column::FirstName
        }
        "surname" | "last name" | "lastname" | "last" | "family name" => Column::LastName,
        "phone" | "phone number" | "contact" | "mobile" | "tel" | "telephone" => Column::Phone,
        "address" | "building" | "building address" | "residence" | "location" => {
            Column::Address
        }
        "bacenta" | "cell" | "fellowship" => Column::Bacenta,
        "born again" | "bornagain" | "saved" => Column::BornAgain,
        "birthday" | "dob" | "date of birth" | "birth date" => Column::Birthday,
        _ => return None,
    };
    Some(column)
}

/// Column mapping for a header row, or `None` when the row holds data.
fn header_columns(cells: &[String]) -> Option<Vec<Option<Column>>> {
    let columns: Vec<Option<Column>> = cells.iter().map(|cell| header_column(cell)).collect();
    let filled = cells.iter().filter(|cell| !cell.is_empty()).count();
    let matched = columns.iter().filter(|column| column.is_some()).count();

    if matched == 0 || !columns.contains(&Some(Column::FirstName)) {
        return None;
    }
    if matched >= 2 || matched == filled {
        Some(columns)
    } else {
        None
    }
}

fn parse_with_header(
    line: usize,
    cells: &[String],
    columns: &[Option<Column>],
    known_bacentas: &[String],
) -> ParsedMember {
    let mut parsed = ParsedMember {
        line,
        ..ParsedMember::default()
    };

    for (cell, column) in cells.iter().zip(columns) {
        if cell.is_empty() {
            continue;
        }
        match column {
            Some(Column::FirstName) => parsed.first_name = cell.clone(),
            Some(Column::LastName) => parsed.last_name = Some(cell.clone()),
            Some(Column::Phone) => parsed.phone = Some(cell.clone()),
            Some(Column::Address) => parsed.building_address = Some(cell.clone()),
            Some(Column::Bacenta) => {
                parsed.bacenta =
                    Some(match_bacenta(cell, known_bacentas).unwrap_or_else(|| cell.clone()))
            }
            Some(Column::BornAgain) => parsed.born_again = parse_yes_no(cell),
            Some(Column::Birthday) => parsed.birthday = parse_birthday(cell),
            None => {}
        }
    }

    if parsed.last_name.is_none() {
        split_full_name(&mut parsed);
    }
    parsed
}

fn parse_heuristically(
    line: usize,
    cells: &[String],
    known_bacentas: &[String],
    issues: &mut Vec<ParseIssue>,
) -> ParsedMember {
    let mut parsed = ParsedMember {
        line,
        ..ParsedMember::default()
    };
    let mut text_cells: Vec<&str> = Vec::new();

    for cell in cells.iter().filter(|cell| !cell.is_empty()) {
        // Dates go first: `12-05-1990` would otherwise pass as a phone number.
        if parsed.birthday.is_none() {
            if let Some(birthday) = parse_birthday(cell) {
                parsed.birthday = Some(birthday);
                continue;
            }
        }
        if is_phone_like(cell) {
            if parsed.phone.is_none() {
                parsed.phone = Some(cell.clone());
            } else {
                issues.push(ParseIssue {
                    line,
                    message: format!("extra phone number {cell} ignored"),
                });
            }
            continue;
        }
        if parsed.born_again.is_none() {
            if let Some(flag) = parse_yes_no(cell) {
                parsed.born_again = Some(flag);
                continue;
            }
        }
        if parsed.bacenta.is_none() {
            if let Some(bacenta) = match_bacenta(cell, known_bacentas) {
                parsed.bacenta = Some(bacenta);
                continue;
            }
        }
        text_cells.push(cell);
    }

    let mut text = text_cells.into_iter();
    if let Some(first) = text.next() {
        parsed.first_name = first.to_string();
    }

    let mut rest: Vec<&str> = text.collect();
    let first_is_single_word = parsed.first_name.split_whitespace().count() == 1;
    if first_is_single_word && !rest.is_empty() {
        parsed.last_name = Some(rest.remove(0).to_string());
    } else {
        split_full_name(&mut parsed);
    }

    if !rest.is_empty() {
        parsed.building_address = Some(rest.join(", "));
    }
    parsed
}

/// Split `"Ama Mensah"` held in the first-name slot into first and last name.
fn split_full_name(parsed: &mut ParsedMember) {
    let full = parsed.first_name.trim().to_string();
    if let Some((first, last)) = full.split_once(char::is_whitespace) {
        let last = last.trim();
        if !last.is_empty() {
            parsed.first_name = first.to_string();
            parsed.last_name = Some(last.to_string());
        }
    }
}

/// Characters a phone number may carry besides its digits.
const PHONE_PUNCTUATION: [char; 5] = ['+', ' ', '-', '(', ')'];

fn is_phone_like(cell: &str) -> bool {
    if !cell
        .chars()
        .all(|c| c.is_ascii_digit() || PHONE_PUNCTUATION.contains(&c))
    {
        return false;
    }
    (7..=15).contains(&phone_digits(cell).len())
}

/// The digits of a phone number, so `024 412-3456` and `0244123456` compare equal.
pub(crate) fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

fn parse_yes_no(cell: &str) -> Option<bool> {
    match cell.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" => Some(true),
        "no" | "n" | "false" => Some(false),
        _ => None,
    }
}

fn match_bacenta(cell: &str, known_bacentas: &[String]) -> Option<String> {
    known_bacentas
        .iter()
        .find(|name| name.trim().eq_ignore_ascii_case(cell.trim()))
        .cloned()
}

pub(crate) fn parse_birthday(cell: &str) -> Option<String> {
    let cell = cell.trim();

    if let Some(caps) = ISO_DATE.captures(cell) {
        let date = ymd(&caps[1], &caps[2], &caps[3])?;
        return Some(format_day(date));
    }

    if let Some(caps) = DMY_DATE.captures(cell) {
        let date = ymd(&caps[3], &caps[2], &caps[1])?;
        return Some(format_day(date));
    }

    if let Some(caps) = DAY_MONTH.captures(cell) {
        let day: u32 = caps[1].parse().ok()?;
        let name = caps[2].to_lowercase();
        let month = MONTHS
            .iter()
            .position(|prefix| name.starts_with(prefix))
            .map(|index| index as u32 + 1)?;
        // 2000 is a leap year, so 29 February is accepted.
        NaiveDate::from_ymd_opt(2000, month, day)?;
        return Some(format!("--{month:02}-{day:02}"));
    }

    None
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bacentas() -> Vec<String> {
        vec!["North".to_string(), "Legon Hall".to_string()]
    }

    #[test]
    fn detects_delimiters_in_priority_order() {
        assert_eq!(detect_delimiter("a\tb|c"), Delimiter::Tab);
        assert_eq!(detect_delimiter("a|b;c"), Delimiter::Pipe);
        assert_eq!(detect_delimiter("a;b,c"), Delimiter::Semicolon);
        assert_eq!(detect_delimiter("a,b"), Delimiter::Comma);
        assert_eq!(detect_delimiter("Ama Mensah   0244123456"), Delimiter::MultiSpace);
        assert_eq!(detect_delimiter("Ama Mensah"), Delimiter::None);
    }

    #[test]
    fn header_rows_map_columns_by_name() {
        let text = "Surname,First Name,Mobile,Cell,Born Again,DOB\n\
                    Mensah,Ama,024 412 3456,legon hall,yes,12/05/1990\n";
        let outcome = parse_members(text, &bacentas());

        assert!(outcome.header_detected);
        assert_eq!(outcome.delimiter, Delimiter::Comma);
        assert!(outcome.issues.is_empty());
        assert_eq!(
            outcome.rows,
            vec![ParsedMember {
                line: 2,
                first_name: "Ama".into(),
                last_name: Some("Mensah".into()),
                phone: Some("024 412 3456".into()),
                building_address: None,
                birthday: Some("1990-05-12".into()),
                born_again: Some(true),
                bacenta: Some("Legon Hall".into()),
            }]
        );
    }

    #[test]
    fn header_name_column_is_split_when_no_surname_column() {
        let text = "Name|Phone\nKofi Boateng|0501234567";
        let outcome = parse_members(text, &[]);

        assert!(outcome.header_detected);
        let row = &outcome.rows[0];
        assert_eq!(row.first_name, "Kofi");
        assert_eq!(row.last_name.as_deref(), Some("Boateng"));
        assert_eq!(row.phone.as_deref(), Some("0501234567"));
    }

    #[test]
    fn header_keeps_unknown_bacenta_names_verbatim() {
        let text = "first name;bacenta\nEsi;Airport";
        let outcome = parse_members(text, &bacentas());
        assert_eq!(outcome.rows[0].bacenta.as_deref(), Some("Airport"));
    }

    #[test]
    fn heuristic_mode_classifies_cells_by_shape() {
        let text = "Ama\tMensah\t+233 24 412 3456\tNorth\tno\t7 Mar\tBlock C, Room 4";
        let outcome = parse_members(text, &bacentas());

        assert!(!outcome.header_detected);
        let row = &outcome.rows[0];
        assert_eq!(row.line, 1);
        assert_eq!(row.first_name, "Ama");
        assert_eq!(row.last_name.as_deref(), Some("Mensah"));
        assert_eq!(row.phone.as_deref(), Some("+233 24 412 3456"));
        assert_eq!(row.bacenta.as_deref(), Some("North"));
        assert_eq!(row.born_again, Some(false));
        assert_eq!(row.birthday.as_deref(), Some("--03-07"));
        assert_eq!(row.building_address.as_deref(), Some("Block C, Room 4"));
    }

    #[test]
    fn heuristic_mode_splits_two_word_name_and_keeps_address() {
        let text = "Kwame Asante | 0201112223 | Hall 5";
        let outcome = parse_members(text, &[]);

        let row = &outcome.rows[0];
        assert_eq!(row.first_name, "Kwame");
        assert_eq!(row.last_name.as_deref(), Some("Asante"));
        assert_eq!(row.building_address.as_deref(), Some("Hall 5"));
    }

    #[test]
    fn dashed_dates_are_not_mistaken_for_phones() {
        let outcome = parse_members("Yaw, 12-05-1990, 0551234567", &[]);
        let row = &outcome.rows[0];
        assert_eq!(row.birthday.as_deref(), Some("1990-05-12"));
        assert_eq!(row.phone.as_deref(), Some("0551234567"));
    }

    #[test]
    fn multi_space_rows_and_blank_lines_keep_source_line_numbers() {
        let text = "\nAma Mensah   0244123456\n\n   \nKofi   Owusu   0501234567\n";
        let outcome = parse_members(text, &[]);

        assert_eq!(outcome.delimiter, Delimiter::MultiSpace);
        let lines: Vec<usize> = outcome.rows.iter().map(|row| row.line).collect();
        assert_eq!(lines, vec![2, 5]);
        assert_eq!(outcome.rows[1].last_name.as_deref(), Some("Owusu"));
    }

    #[test]
    fn rows_without_a_first_name_are_reported() {
        let text = "Ama,0244123456\n0501234567,yes\n,\nKofi,0207654321";
        let outcome = parse_members(text, &[]);

        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(
            outcome.issues,
            vec![
                ParseIssue {
                    line: 2,
                    message: "no first name found".into()
                },
                ParseIssue {
                    line: 3,
                    message: "no first name found".into()
                },
            ]
        );
    }

    #[test]
    fn phone_detection_requires_seven_to_fifteen_digits() {
        assert!(is_phone_like("0244123456"));
        assert!(is_phone_like("(024) 412-3456"));
        assert!(!is_phone_like("123456"));
        assert!(!is_phone_like("1234567890123456"));
        assert!(!is_phone_like("Room 12345678"));
        assert!(!is_phone_like("024.412.3456"));
        assert_eq!(phone_digits("+233 (24) 412-3456"), "233244123456");
    }

    #[test]
    fn a_second_phone_number_is_reported_not_read_as_a_name() {
        let outcome = parse_members("Kofi,0244123456,0501234567,Airport", &[]);
        let row = &outcome.rows[0];

        assert_eq!(row.first_name, "Kofi");
        assert_eq!(row.phone.as_deref(), Some("0244123456"));
        assert_eq!(row.last_name.as_deref(), Some("Airport"));
        assert_eq!(
            outcome.issues,
            vec![ParseIssue {
                line: 1,
                message: "extra phone number 0501234567 ignored".into()
            }]
        );
    }

    #[test]
    fn birthday_parsing_rejects_impossible_dates() {
        assert_eq!(parse_birthday("2001-02-29"), None);
        assert_eq!(parse_birthday("31/04/1999"), None);
        assert_eq!(parse_birthday("29 February").as_deref(), Some("--02-29"));
        assert_eq!(parse_birthday("3rd Sept").as_deref(), Some("--09-03"));
        assert_eq!(parse_birthday("5 Smarch"), None);
    }

    #[test]
    fn empty_input_produces_nothing() {
        let outcome = parse_members("  \n\n", &[]);
        assert!(outcome.rows.is_empty());
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.delimiter, Delimiter::None);
    }
}
