//! Natural-language date and time expressions (Spanish and English).
//!
//! Resolution is anchored to a caller-supplied local `today`; nothing here
//! reads the system clock, so the same text and anchor always resolve to the
//! same date.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateResolution {
    Resolved(NaiveDate),
    Unresolved,
}

impl DateResolution {
    pub fn date(self) -> Option<NaiveDate> {
        match self {
            Self::Resolved(date) => Some(date),
            Self::Unresolved => None,
        }
    }
}

const MONTHS: &[(&str, u32)] = &[
    ("enero", 1),
    ("january", 1),
    ("febrero", 2),
    ("february", 2),
    ("marzo", 3),
    ("march", 3),
    ("abril", 4),
    ("april", 4),
    ("mayo", 5),
    ("may", 5),
    ("junio", 6),
    ("june", 6),
    ("julio", 7),
    ("july", 7),
    ("agosto", 8),
    ("august", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("september", 9),
    ("octubre", 10),
    ("october", 10),
    ("noviembre", 11),
    ("november", 11),
    ("diciembre", 12),
    ("december", 12),
];

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("lunes", Weekday::Mon),
    ("monday", Weekday::Mon),
    ("martes", Weekday::Tue),
    ("tuesday", Weekday::Tue),
    ("miercoles", Weekday::Wed),
    ("wednesday", Weekday::Wed),
    ("jueves", Weekday::Thu),
    ("thursday", Weekday::Thu),
    ("viernes", Weekday::Fri),
    ("friday", Weekday::Fri),
    ("sabado", Weekday::Sat),
    ("saturday", Weekday::Sat),
    ("domingo", Weekday::Sun),
    ("sunday", Weekday::Sun),
];

const SMALL_NUMBERS: &[(&str, i64)] = &[
    ("un", 1),
    ("una", 1),
    ("uno", 1),
    ("one", 1),
    ("a", 1),
    ("dos", 2),
    ("two", 2),
    ("tres", 3),
    ("three", 3),
    ("cuatro", 4),
    ("four", 4),
    ("cinco", 5),
    ("five", 5),
    ("seis", 6),
    ("six", 6),
    ("siete", 7),
    ("seven", 7),
    ("diez", 10),
    ("ten", 10),
];

/// Phrases where "mañana" means "morning" rather than "tomorrow".
const MORNING_PHRASES: &[&str] =
    &[" por la manana ", " de la manana ", " en la manana ", " esta manana ", " a la manana "];

#[derive(Clone, Copy, Debug, Default)]
pub struct DateResolver;

impl DateResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, text: &str, today: NaiveDate) -> DateResolution {
        let mut phrase = format!(" {} ", normalize(text));
        for noise in MORNING_PHRASES {
            phrase = phrase.replace(noise, " ");
        }

        let mut relative = BTreeSet::new();
        for marker in [" pasado manana ", " day after tomorrow "] {
            if phrase.contains(marker) {
                relative.insert(today + Duration::days(2));
                phrase = phrase.replace(marker, " ");
            }
        }

        let tokens = phrase.split_whitespace().collect::<Vec<_>>();
        let mut weekdays_mentioned = BTreeSet::new();
        let mut explicit = BTreeSet::new();

        for (index, token) in tokens.iter().enumerate() {
            match *token {
                "manana" | "tomorrow" => {
                    relative.insert(today + Duration::days(1));
                }
                "hoy" | "today" => {
                    relative.insert(today);
                }
                _ => {}
            }

            if let Some(weekday) = weekday_named(token) {
                weekdays_mentioned.insert(weekday.num_days_from_monday());
            }

            if let Some(days) = days_from_now(&tokens, index) {
                relative.insert(today + Duration::days(days));
            }

            if let Some(date) = numeric_date(token, today) {
                explicit.insert(date);
            }

            if let Some(date) = spelled_date(&tokens, index, today) {
                explicit.insert(date);
            }
        }

        if !explicit.is_empty() {
            let mut explicit = explicit.into_iter();
            let (Some(date), None) = (explicit.next(), explicit.next()) else {
                return DateResolution::Unresolved;
            };
            let weekday_conflict = !weekdays_mentioned.is_empty()
                && !weekdays_mentioned.contains(&date.weekday().num_days_from_monday());
            let relative_conflict = relative.iter().any(|candidate| *candidate != date);
            if weekday_conflict || relative_conflict {
                return DateResolution::Unresolved;
            }
            return DateResolution::Resolved(date);
        }

        let mut candidates = relative;
        for weekday in &weekdays_mentioned {
            candidates.insert(next_weekday(today, *weekday));
        }

        let mut candidates = candidates.into_iter();
        match (candidates.next(), candidates.next()) {
            (Some(date), None) => DateResolution::Resolved(date),
            _ => DateResolution::Unresolved,
        }
    }

    /// Clock time mentioned in `text`. Bare hours 1–7 without a qualifier
    /// are read as afternoon, which is how patients talk about clinic hours.
    pub fn resolve_time(&self, text: &str) -> Option<NaiveTime> {
        let normalized = normalize(text);
        let tokens = normalized.split_whitespace().collect::<Vec<_>>();
        if tokens.is_empty() {
            return None;
        }

        if tokens.iter().any(|token| matches!(*token, "mediodia" | "noon")) {
            return NaiveTime::from_hms_opt(12, 0, 0);
        }

        // "la mañana" is the morning; a bare "mañana" is tomorrow.
        let mut meridiem = tokens.iter().enumerate().find_map(|(index, token)| match *token {
            "tarde" | "noche" | "pm" => Some(true),
            "am" => Some(false),
            "manana" if index > 0 && tokens[index - 1] == "la" => Some(false),
            _ => None,
        });

        let mut found = None;
        for (index, token) in tokens.iter().enumerate() {
            if let Some((hour, minute, suffix)) = clock_token(token) {
                found = Some((hour, minute));
                meridiem = suffix.or(meridiem);
                break;
            }
            if matches!(*token, "las" | "la" | "at") {
                if let Some(hour) = tokens.get(index + 1).and_then(|next| parse_small(next)) {
                    let minute = match (tokens.get(index + 2), tokens.get(index + 3)) {
                        (Some(&"y"), Some(&"media")) => 30,
                        (Some(&"y"), Some(&"cuarto")) => 15,
                        (Some(&"y"), Some(value)) => value.parse::<u32>().unwrap_or(0),
                        _ => 0,
                    };
                    found = Some((hour, minute));
                    break;
                }
            }
        }

        if found.is_none() && tokens.len() == 1 {
            found = tokens[0].parse::<u32>().ok().map(|hour| (hour, 0));
        }

        let (mut hour, minute) = found?;
        match meridiem {
            Some(true) if hour < 12 => hour += 12,
            Some(false) if hour == 12 => hour = 0,
            None if (1..=7).contains(&hour) => hour += 12,
            _ => {}
        }
        NaiveTime::from_hms_opt(hour, minute, 0)
    }
}

/// Lowercase, accent-free, punctuation collapsed to spaces. Keeps the
/// separators used by numeric dates and times.
pub fn normalize(text: &str) -> String {
    let folded = text
        .to_lowercase()
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            ch if ch.is_alphanumeric() || matches!(ch, '/' | '-' | ':' | '.') => ch,
            _ => ' ',
        })
        .collect::<String>();

    folded
        .split_whitespace()
        .map(|token| token.trim_matches(|ch| matches!(ch, '.' | '-' | ':' | '/')))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn weekday_named(token: &str) -> Option<Weekday> {
    WEEKDAYS.iter().find(|(name, _)| *name == token).map(|(_, weekday)| *weekday)
}

fn month_named(token: &str) -> Option<u32> {
    MONTHS.iter().find(|(name, _)| *name == token).map(|(_, month)| *month)
}

fn parse_small(token: &str) -> Option<u32> {
    token.parse::<u32>().ok().or_else(|| {
        SMALL_NUMBERS
            .iter()
            .find(|(name, _)| *name == token)
            .and_then(|(_, value)| u32::try_from(*value).ok())
    })
}

fn next_weekday(today: NaiveDate, weekday_from_monday: u32) -> NaiveDate {
    let current = today.weekday().num_days_from_monday();
    let ahead = (weekday_from_monday + 7 - current) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Duration::days(i64::from(ahead))
}

/// `en 3 dias`, `dentro de dos dias`, `in 3 days`.
fn days_from_now(tokens: &[&str], index: usize) -> Option<i64> {
    let count_at = match tokens[index] {
        "en" | "in" => index + 1,
        "dentro" if tokens.get(index + 1) == Some(&"de") => index + 2,
        _ => return None,
    };
    let count = tokens.get(count_at)?;
    let unit = tokens.get(count_at + 1)?;
    if !matches!(*unit, "dia" | "dias" | "day" | "days") {
        return None;
    }
    let count = count.parse::<i64>().ok().or_else(|| {
        SMALL_NUMBERS.iter().find(|(name, _)| name == count).map(|(_, value)| *value)
    })?;
    (0..=366).contains(&count).then_some(count)
}

/// `20/07`, `20-07-2026`, `2026-07-20`.
fn numeric_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts = token.split(['/', '-']).collect::<Vec<_>>();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    if parts.iter().any(|part| part.is_empty() || !part.chars().all(|ch| ch.is_ascii_digit())) {
        return None;
    }
    let numbers = parts.iter().map(|part| part.parse::<u32>().ok()).collect::<Option<Vec<_>>>()?;

    match (parts[0].len(), numbers.as_slice()) {
        (4, [year, month, day]) => NaiveDate::from_ymd_opt(i32::try_from(*year).ok()?, *month, *day),
        (_, [day, month]) => day_month(*day, *month, today),
        (_, [day, month, year]) => {
            let year = if *year < 100 { 2000 + *year } else { *year };
            NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, *month, *day)
        }
        _ => None,
    }
}

/// `20 de julio [de 2026]`, `20 julio`, `july 20[th] [2026]`.
fn spelled_date(tokens: &[&str], index: usize, today: NaiveDate) -> Option<NaiveDate> {
    let month = month_named(tokens[index])?;

    let before = index.checked_sub(1).and_then(|at| tokens.get(at));
    let day_before = match before {
        Some(&"de") => index.checked_sub(2).and_then(|at| tokens.get(at)).and_then(|t| day_number(t)),
        Some(token) => day_number(token),
        None => None,
    };
    let day = day_before.or_else(|| tokens.get(index + 1).and_then(|token| day_number(token)))?;

    let year_token = match tokens.get(index + 1) {
        Some(&"de") => tokens.get(index + 2),
        Some(token) if day_before.is_some() => Some(token),
        _ => tokens.get(index + 2),
    };
    let year = year_token
        .filter(|token| token.len() == 4)
        .and_then(|token| token.parse::<i32>().ok());

    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => day_month(day, month, today),
    }
}

fn day_number(token: &str) -> Option<u32> {
    let digits = token
        .trim_end_matches(|ch: char| ch.is_ascii_alphabetic() || ch == 'º')
        .parse::<u32>()
        .ok()?;
    (1..=31).contains(&digits).then_some(digits)
}

/// Day and month without a year: this year, or next year once it has passed.
fn day_month(day: u32, month: u32, today: NaiveDate) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
    match this_year {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

/// `10:30`, `10.30`, `10h`, `10h30`, `4pm`, `4:30pm`.
fn clock_token(token: &str) -> Option<(u32, u32, Option<bool>)> {
    let (body, suffix) = if let Some(body) = token.strip_suffix("pm") {
        (body, Some(true))
    } else if let Some(body) = token.strip_suffix("am") {
        (body, Some(false))
    } else {
        (token, None)
    };
    let body = body.trim_end_matches("hs").trim_end_matches('h');
    if body.is_empty() {
        return None;
    }

    let (hour, minute) = match body.split_once([':', '.', 'h']) {
        Some((hour, minute)) => (hour.parse::<u32>().ok()?, minute.parse::<u32>().ok()?),
        None if suffix.is_some() || token.ends_with('h') || token.ends_with("hs") => {
            (body.parse::<u32>().ok()?, 0)
        }
        None => return None,
    };
    (hour < 24 && minute < 60).then_some((hour, minute, suffix))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{normalize, DateResolution, DateResolver};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    fn resolve(text: &str, today: &str) -> DateResolution {
        DateResolver::new().resolve(text, date(today))
    }

    #[test]
    fn pasado_manana_is_two_days_after_anchor() {
        assert_eq!(resolve("pasado mañana", "2026-02-12"), DateResolution::Resolved(date("2026-02-14")));
        assert_eq!(
            resolve("Pasado mañana por la mañana", "2026-02-12"),
            DateResolution::Resolved(date("2026-02-14"))
        );
    }

    #[test]
    fn relative_terms_resolve_against_anchor() {
        assert_eq!(resolve("hoy", "2026-02-12"), DateResolution::Resolved(date("2026-02-12")));
        assert_eq!(resolve("mañana", "2026-02-12"), DateResolution::Resolved(date("2026-02-13")));
        assert_eq!(resolve("tomorrow please", "2026-02-12"), DateResolution::Resolved(date("2026-02-13")));
        assert_eq!(resolve("en 3 días", "2026-02-12"), DateResolution::Resolved(date("2026-02-15")));
        assert_eq!(resolve("dentro de dos dias", "2026-02-12"), DateResolution::Resolved(date("2026-02-14")));
    }

    #[test]
    fn weekday_names_roll_forward_to_next_occurrence() {
        // 2026-02-12 is a Thursday.
        assert_eq!(resolve("el lunes", "2026-02-12"), DateResolution::Resolved(date("2026-02-16")));
        assert_eq!(resolve("el próximo jueves", "2026-02-12"), DateResolution::Resolved(date("2026-02-19")));
        assert_eq!(resolve("friday", "2026-02-12"), DateResolution::Resolved(date("2026-02-13")));
        assert_eq!(resolve("mañana viernes", "2026-02-12"), DateResolution::Resolved(date("2026-02-13")));
    }

    #[test]
    fn explicit_day_month_pairs() {
        assert_eq!(resolve("el 20 de julio", "2026-02-12"), DateResolution::Resolved(date("2026-07-20")));
        assert_eq!(resolve("20/07", "2026-02-12"), DateResolution::Resolved(date("2026-07-20")));
        assert_eq!(resolve("July 20th", "2026-02-12"), DateResolution::Resolved(date("2026-07-20")));
        assert_eq!(resolve("2026-07-20", "2026-02-12"), DateResolution::Resolved(date("2026-07-20")));
        assert_eq!(resolve("20-07-26", "2026-02-12"), DateResolution::Resolved(date("2026-07-20")));
        assert_eq!(resolve("lunes 20 de julio", "2026-02-12"), DateResolution::Resolved(date("2026-07-20")));
    }

    #[test]
    fn day_month_already_past_rolls_into_next_year() {
        assert_eq!(resolve("3 de enero", "2026-02-12"), DateResolution::Resolved(date("2027-01-03")));
        assert_eq!(resolve("10/01/2026", "2026-02-12"), DateResolution::Resolved(date("2026-01-10")));
    }

    #[test]
    fn ambiguous_or_unknown_input_is_unresolved() {
        assert_eq!(resolve("cuando puedas", "2026-02-12"), DateResolution::Unresolved);
        assert_eq!(resolve("lunes o martes", "2026-02-12"), DateResolution::Unresolved);
        assert_eq!(resolve("martes 20 de julio", "2026-02-12"), DateResolution::Unresolved);
        assert_eq!(resolve("31/02", "2026-02-12"), DateResolution::Unresolved);
        assert_eq!(resolve("", "2026-02-12"), DateResolution::Unresolved);
    }

    #[test]
    fn resolution_is_idempotent_for_same_anchor() {
        let resolver = DateResolver::new();
        for text in ["pasado mañana", "el viernes", "20 de julio", "en 10 dias", "no sé"] {
            let first = resolver.resolve(text, date("2026-02-12"));
            let second = resolver.resolve(text, date("2026-02-12"));
            assert_eq!(first, second, "`{text}` resolved differently twice");
        }
    }

    #[test]
    fn clock_times_are_recognised() {
        let resolver = DateResolver::new();

        assert_eq!(resolver.resolve_time("a las 10:30"), Some(hm(10, 30)));
        assert_eq!(resolver.resolve_time("10.45"), Some(hm(10, 45)));
        assert_eq!(resolver.resolve_time("a las 4 de la tarde"), Some(hm(16, 0)));
        assert_eq!(resolver.resolve_time("a las 5 y media"), Some(hm(17, 30)));
        assert_eq!(resolver.resolve_time("las 9"), Some(hm(9, 0)));
        assert_eq!(resolver.resolve_time("4pm"), Some(hm(16, 0)));
        assert_eq!(resolver.resolve_time("11h"), Some(hm(11, 0)));
        assert_eq!(resolver.resolve_time("16"), Some(hm(16, 0)));
        assert_eq!(resolver.resolve_time("mediodía"), Some(hm(12, 0)));
        assert_eq!(resolver.resolve_time("mañana a las 5"), Some(hm(17, 0)));
        assert_eq!(resolver.resolve_time("a las 7 de la mañana"), Some(hm(7, 0)));
        assert_eq!(resolver.resolve_time("cuando sea"), None);
        assert_eq!(resolver.resolve_time("25:00"), None);
    }

    #[test]
    fn normalize_folds_accents_and_punctuation() {
        assert_eq!(normalize("¿Pasado MAÑANA, a las 10:30?"), "pasado manana a las 10:30");
        assert_eq!(normalize("Miércoles."), "miercoles");
    }
}
