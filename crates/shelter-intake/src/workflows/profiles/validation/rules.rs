use chrono::{Datelike, NaiveDate};

use super::super::domain::Profile;
use super::config::ValidationConfig;
use super::FieldError;

pub(crate) fn check_profile(
    profile: &Profile,
    config: &ValidationConfig,
    today: NaiveDate,
) -> Vec<FieldError> {
    let current_year = today.year();

    [
        required("name", &profile.name),
        required("category", &profile.category),
        description(&profile.desc_short, config),
        required("location", &profile.location),
        gallery(&profile.gallery, config),
        profile
            .birth_date
            .as_deref()
            .and_then(|raw| birth_date(raw, config, current_year)),
        profile.size.as_deref().and_then(|raw| size(raw, config)),
        profile
            .seeking_home_since
            .as_deref()
            .and_then(|raw| seeking_home_since(raw, config, current_year)),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn required(field: &'static str, value: &str) -> Option<FieldError> {
    if value.trim().is_empty() {
        Some(FieldError::new(field, "is required"))
    } else {
        None
    }
}

fn description(value: &str, config: &ValidationConfig) -> Option<FieldError> {
    let length = value.trim().chars().count();
    if length == 0 {
        return required("descShort", value);
    }
    if length < config.min_description_chars {
        return Some(FieldError::new(
            "descShort",
            format!(
                "must be at least {} characters (found {length})",
                config.min_description_chars
            ),
        ));
    }
    None
}

fn gallery(images: &[String], config: &ValidationConfig) -> Option<FieldError> {
    let usable = images.iter().filter(|key| !key.trim().is_empty()).count();
    if usable < config.min_gallery_images {
        Some(FieldError::new(
            "gallery",
            format!(
                "needs at least {} image(s) (found {usable})",
                config.min_gallery_images
            ),
        ))
    } else {
        None
    }
}

fn birth_date(raw: &str, config: &ValidationConfig, current_year: i32) -> Option<FieldError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let Some((day, month, year)) = split_strict_date(raw) else {
        return Some(FieldError::new("birthDate", "must use the format DD.MM.YYYY"));
    };

    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Some(FieldError::new("birthDate", "is not a real calendar date"));
    }

    if year < config.earliest_birth_year || year > current_year {
        return Some(FieldError::new(
            "birthDate",
            format!(
                "year must be between {} and {current_year}",
                config.earliest_birth_year
            ),
        ));
    }

    None
}

/// Accepts exactly `DD.MM.YYYY` with ASCII digits.
fn split_strict_date(raw: &str) -> Option<(u32, u32, i32)> {
    let bytes = raw.as_bytes();
    if bytes.len() != 10 || bytes[2] != b'.' || bytes[5] != b'.' {
        return None;
    }

    let digits_only = bytes
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != 2 && *index != 5)
        .all(|(_, byte)| byte.is_ascii_digit());
    if !digits_only {
        return None;
    }

    let day = raw[0..2].parse().ok()?;
    let month = raw[3..5].parse().ok()?;
    let year = raw[6..10].parse().ok()?;
    Some((day, month, year))
}

fn size(raw: &str, config: &ValidationConfig) -> Option<FieldError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match raw.parse::<u32>() {
        Ok(value) if (config.min_size_cm..=config.max_size_cm).contains(&value) => None,
        Ok(_) => Some(FieldError::new(
            "size",
            format!(
                "must be between {} and {}",
                config.min_size_cm, config.max_size_cm
            ),
        )),
        Err(_) => Some(FieldError::new("size", "must be a whole number")),
    }
}

fn seeking_home_since(
    raw: &str,
    config: &ValidationConfig,
    current_year: i32,
) -> Option<FieldError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match raw.parse::<i32>() {
        Ok(year) if (config.earliest_seeking_home_year..=current_year).contains(&year) => None,
        _ => Some(FieldError::new(
            "seekingHomeSince",
            format!(
                "must be a year between {} and {current_year}",
                config.earliest_seeking_home_year
            ),
        )),
    }
}
