use jiff::civil::{Date, DateTime};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AgeRating {
    G,
    PG,
    M,
    R13,
    R16,
    R18,
    TBC,
}

impl AgeRating {
    pub fn as_str(self) -> &'static str {
        match self {
            AgeRating::G => "G",
            AgeRating::PG => "PG",
            AgeRating::M => "M",
            AgeRating::R13 => "R13",
            AgeRating::R16 => "R16",
            AgeRating::R18 => "R18",
            AgeRating::TBC => "TBC",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortBy {
    AlphabeticalAsc,
    AlphabeticalDesc,
    #[default]
    ReleasedAsc,
    ReleasedDesc,
    RatingAsc,
    RatingDesc,
}

impl SortBy {
    pub fn is_rating(self) -> bool {
        matches!(self, SortBy::RatingAsc | SortBy::RatingDesc)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmSearchQuery {
    #[serde(default)]
    pub genre_ids: Vec<i32>,
    #[serde(default)]
    pub age_ratings: Vec<AgeRating>,
    pub q: Option<String>,
    pub director_id: Option<i32>,
    pub reviewer_id: Option<i32>,
    #[serde(default)]
    pub sort_by: SortBy,
    pub start_index: Option<u64>,
    pub count: Option<u64>,
}

impl FilmSearchQuery {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(q) = &self.q {
            check_len("q", q, 1, 64)?;
        }
        if self.count == Some(0) {
            return Err(AppError::invalid("count must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmSummary {
    pub film_id: i32,
    pub title: String,
    pub genre_id: i32,
    pub director_id: i32,
    pub director_first_name: String,
    pub director_last_name: String,
    pub release_date: String,
    pub age_rating: String,
    pub rating: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct FilmPage {
    pub films: Vec<FilmSummary>,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmDetail {
    pub film_id: i32,
    pub title: String,
    pub description: String,
    pub genre_id: i32,
    pub director_id: i32,
    pub director_first_name: String,
    pub director_last_name: String,
    pub release_date: String,
    pub age_rating: String,
    pub runtime: Option<i32>,
    pub rating: f64,
    pub num_reviews: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreView {
    pub genre_id: i32,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateFilm {
    pub title: String,
    pub description: String,
    pub release_date: Option<String>,
    pub genre_id: i32,
    pub runtime: Option<i32>,
    pub age_rating: Option<AgeRating>,
}

impl CreateFilm {
    pub fn validate(&self) -> AppResult<()> {
        check_len("title", &self.title, 1, 64)?;
        check_len("description", &self.description, 1, 512)?;
        if let Some(runtime) = self.runtime {
            check_runtime(runtime)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EditFilm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub genre_id: Option<i32>,
    pub runtime: Option<i32>,
    pub age_rating: Option<AgeRating>,
}

impl EditFilm {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(title) = &self.title {
            check_len("title", title, 1, 64)?;
        }
        if let Some(description) = &self.description {
            check_len("description", description, 1, 512)?;
        }
        if let Some(runtime) = self.runtime {
            check_runtime(runtime)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedFilm {
    pub film_id: i32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReview {
    pub rating: i32,
    pub review: Option<String>,
}

impl CreateReview {
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=10).contains(&self.rating) {
            return Err(AppError::invalid("rating must be between 1 and 10"));
        }
        if let Some(review) = &self.review {
            check_len("review", review, 0, 512)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub reviewer_id: i32,
    pub reviewer_first_name: String,
    pub reviewer_last_name: String,
    pub rating: i32,
    pub review: Option<String>,
    pub timestamp: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl RegisterUser {
    pub fn validate(&self) -> AppResult<()> {
        check_len("firstName", &self.first_name, 1, 64)?;
        check_len("lastName", &self.last_name, 1, 64)?;
        check_email(&self.email)?;
        check_len("password", &self.password, 1, 256)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> AppResult<()> {
        check_email(&self.email)?;
        check_len("password", &self.password, 1, 256)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
}

impl UpdateUser {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        if let Some(first_name) = &self.first_name {
            check_len("firstName", first_name, 1, 64)?;
        }
        if let Some(last_name) = &self.last_name {
            check_len("lastName", last_name, 1, 64)?;
        }
        if let Some(password) = &self.password {
            check_len("password", password, 1, 256)?;
            if self.current_password.is_none() {
                return Err(AppError::invalid("currentPassword is required to change password"));
            }
        }
        if let Some(current) = &self.current_password {
            check_len("currentPassword", current, 1, 256)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreated {
    pub user_id: i32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: i32,
    pub token: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::invalid(format!("{field} must be {min}..={max} characters")));
    }
    Ok(())
}

fn check_runtime(runtime: i32) -> AppResult<()> {
    if !(1..=300).contains(&runtime) {
        return Err(AppError::invalid("runtime must be between 1 and 300"));
    }
    Ok(())
}

fn check_email(email: &str) -> AppResult<()> {
    check_len("email", email, 3, 256)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        },
        _ => Err(AppError::invalid("email is not a valid address")),
    }
}

/// The server's current local civil time.
pub fn now() -> DateTime {
    jiff::Zoned::now().datetime()
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated form, or a bare date.
pub fn parse_datetime(value: &str) -> AppResult<DateTime> {
    let value = value.trim();
    let normalized = value.replacen(' ', "T", 1);
    if let Ok(dt) = normalized.parse::<DateTime>() {
        return Ok(dt);
    }
    value
        .parse::<Date>()
        .map(|d| d.to_datetime(jiff::civil::Time::midnight()))
        .map_err(|_| AppError::invalid(format!("invalid date-time: {value}")))
}

pub fn format_datetime(dt: DateTime) -> String {
    dt.strftime("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Parses a stored column value; these are always written by `format_datetime`.
pub fn stored_datetime(value: &str) -> AppResult<DateTime> {
    Ok(value.parse::<DateTime>()?)
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use super::*;

    #[test]
    fn parses_space_and_t_separated_datetimes() {
        let expected = date(2031, 5, 4).at(13, 30, 0, 0);
        assert_eq!(parse_datetime("2031-05-04 13:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("2031-05-04T13:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("2031-05-04").unwrap(), date(2031, 5, 4).at(0, 0, 0, 0));
        assert!(matches!(parse_datetime("next tuesday"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn stored_format_is_lexically_ordered() {
        let early = format_datetime(date(2029, 12, 31).at(23, 59, 59, 500));
        let late = format_datetime(date(2030, 1, 1).at(0, 0, 0, 0));
        assert_eq!(early, "2029-12-31T23:59:59");
        assert!(early < late);
        assert_eq!(stored_datetime(&late).unwrap(), date(2030, 1, 1).at(0, 0, 0, 0));
    }

    #[test]
    fn update_user_requires_current_password_for_password_change() {
        let req = UpdateUser { password: Some("hunter2".into()), ..Default::default() };
        assert!(matches!(req.validate(), Err(AppError::InvalidInput(_))));

        let req = UpdateUser {
            password: Some("hunter2".into()),
            current_password: Some("hunter1".into()),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_emails() {
        for email in ["nobody", "@example.com", "a@", "a@b@c"] {
            let req = LoginRequest { email: email.into(), password: "pw".into() };
            assert!(req.validate().is_err(), "{email} accepted");
        }
    }

    #[test]
    fn sort_by_parses_wire_names() {
        let q: SortBy = serde_json::from_str("\"RATING_DESC\"").unwrap();
        assert_eq!(q, SortBy::RatingDesc);
        assert!(q.is_rating());
        assert_eq!(SortBy::default(), SortBy::ReleasedAsc);
    }
}
